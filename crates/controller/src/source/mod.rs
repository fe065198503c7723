//! Where the desired set of credential secrets comes from.
//!
//! Both the pod driven registry and `AWSIAMRole` resources describe the
//! secrets that should exist as a list of [`Declaration`]s, so a single
//! reconcile loop serves both.

mod awsiamrole;
mod error;
mod pod;

use std::{collections::BTreeMap, time::Duration};

use chrono::{DateTime, Utc};
use k8s_openapi::{
    api::core::v1::{ObjectReference, Secret},
    apimachinery::pkg::apis::meta::v1::OwnerReference,
};

pub use self::{awsiamrole::AwsIamRoleSource, error::Error, pod::PodRoleSource};

/// A secret that should exist, and what it should contain.
#[derive(Clone, Debug, PartialEq)]
pub struct Declaration {
    pub namespace: String,
    pub secret_name: String,

    /// Role name relative to the base role ARN, or a full role ARN.
    pub role: String,
    pub session_duration: Duration,

    /// Labels the secret is written with.
    pub labels: BTreeMap<String, String>,

    /// Generation of the declaring object; `None` for declarations without a
    /// backing object.
    pub generation: Option<i64>,

    /// Owner reference the secret must carry to count as declared.
    pub owner: Option<OwnerReference>,

    /// Status last reported on the declaring object.
    pub status: Option<RoleStatus>,
}

impl Declaration {
    /// The declaring object, for attaching events.
    #[must_use]
    pub fn object_reference(&self) -> Option<ObjectReference> {
        self.owner.as_ref().map(|owner| ObjectReference {
            api_version: Some(owner.api_version.clone()),
            kind: Some(owner.kind.clone()),
            name: Some(owner.name.clone()),
            namespace: Some(self.namespace.clone()),
            uid: Some(owner.uid.clone()),
            ..ObjectReference::default()
        })
    }

    /// Whether `secret` is the one this declaration asks for.
    #[must_use]
    pub fn matches(&self, secret: &Secret) -> bool {
        secret.metadata.namespace.as_deref() == Some(self.namespace.as_str())
            && secret.metadata.name.as_deref() == Some(self.secret_name.as_str())
    }
}

/// What a declaring object reports about its secret.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct RoleStatus {
    pub observed_generation: i64,
    pub role_arn: String,
    pub expiration: DateTime<Utc>,
}

impl RoleStatus {
    /// Creates a status, keeping the expiration at the whole second precision
    /// it is stored with.
    #[must_use]
    pub fn new(observed_generation: i64, role_arn: impl Into<String>, expiration: DateTime<Utc>) -> Self {
        let expiration = DateTime::from_timestamp(expiration.timestamp(), 0).unwrap_or(expiration);
        Self { observed_generation, role_arn: role_arn.into(), expiration }
    }
}

/// A provider of [`Declaration`]s.
pub trait DesiredStateSource {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Label selector of the secrets this source may own.
    fn secret_selector(&self) -> String;

    /// Whether a secret matched by [`Self::secret_selector`] belongs to this
    /// source. Secrets not belonging to it are never touched.
    fn manages(&self, secret: &Secret) -> bool;

    /// The secrets that should currently exist.
    async fn declarations(&self) -> Result<Vec<Declaration>, Error>;

    /// Writes `status` back to the object behind `declaration`.
    async fn report(&self, declaration: &Declaration, status: &RoleStatus) -> Result<(), Error>;
}
