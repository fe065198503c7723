//! Issuing short-lived credentials for a role and shaping them for delivery.

mod error;
mod payload;
mod sts;

use std::{fmt, time::Duration};

use chrono::{DateTime, Utc};
use snafu::ResultExt;

pub use self::{
    error::Error,
    payload::format_expiration,
    sts::{StsIssuer, discover_base_role_arn, regional_sts_endpoint},
};
use crate::arn;

/// Credentials issued for one role, as stored in a secret.
#[derive(Clone, Eq, PartialEq)]
pub struct Credentials {
    pub role_arn: String,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: DateTime<Utc>,
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("role_arn", &self.role_arn)
            .field("access_key_id", &self.access_key_id)
            .field("expiration", &self.expiration)
            .finish_non_exhaustive()
    }
}

/// The raw answer of a credential issuer.
#[derive(Clone, Eq, PartialEq)]
pub struct IssuedCredentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub session_token: String,
    pub expiration: DateTime<Utc>,
}

/// An assume-role style credential issuance capability.
pub trait CredentialsIssuer {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
        duration: Duration,
    ) -> Result<IssuedCredentials, Error>;
}

/// Resolves role references to ARNs and fetches credentials for them.
#[derive(Clone, Debug)]
pub struct CredentialsFetcher<I> {
    issuer: I,
    base_role_arn: String,
    role_arn_prefix: String,
}

impl<I> CredentialsFetcher<I>
where
    I: CredentialsIssuer,
{
    pub fn new(issuer: I, base_role_arn: impl Into<String>, role_arn_prefix: impl Into<String>) -> Self {
        Self { issuer, base_role_arn: base_role_arn.into(), role_arn_prefix: role_arn_prefix.into() }
    }

    /// The ARN `role` refers to.
    #[must_use]
    pub fn role_arn(&self, role: &str) -> String {
        arn::resolve_role_arn(role, &self.base_role_arn, &self.role_arn_prefix)
    }

    /// Fetches credentials for `role`, which is either a full role ARN or a
    /// name relative to the base role ARN.
    ///
    /// # Errors
    ///
    /// Returns an error if no session name can be derived from the role ARN
    /// or if the issuer fails.
    pub async fn fetch(&self, role: &str, session_duration: Duration) -> Result<Credentials, Error> {
        let role_arn = self.role_arn(role);
        let session_name = arn::normalize_role_arn(&role_arn, &self.role_arn_prefix)
            .with_context(|_| error::SessionNameSnafu { role_arn: role_arn.clone() })?;

        let IssuedCredentials { access_key_id, secret_access_key, session_token, expiration } =
            self.issuer.assume_role(&role_arn, &session_name, session_duration).await?;

        Ok(Credentials { role_arn, access_key_id, secret_access_key, session_token, expiration })
    }
}
