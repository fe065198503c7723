use std::{collections::BTreeMap, sync::Arc};

use iamkeeper_base::consts::DEFAULT_SESSION_DURATION;
use k8s_openapi::api::core::v1::Secret;
use snafu::ensure;

use crate::{
    consts::k8s::{labels, secret},
    ext::SecretExt,
    registry::RoleStore,
    source::{Declaration, DesiredStateSource, Error, RoleStatus, error},
};

/// Declarations derived from the roles pods ask for.
///
/// Every `(role, namespace)` pair in the registry asks for a secret
/// `aws-iam-<role>` in that namespace. Secrets carrying an owner reference
/// belong to someone else and are left alone.
///
/// Until the registry has seen a full pod listing no declarations are
/// produced, so existing secrets are never taken for orphans at startup.
#[derive(Clone, Debug)]
pub struct PodRoleSource {
    roles: Arc<RoleStore>,
}

impl PodRoleSource {
    #[must_use]
    pub const fn new(roles: Arc<RoleStore>) -> Self { Self { roles } }
}

impl DesiredStateSource for PodRoleSource {
    fn name(&self) -> &'static str { "secrets" }

    fn secret_selector(&self) -> String { format!("{}={}", labels::HERITAGE, labels::HERITAGE_VALUE) }

    fn manages(&self, secret: &Secret) -> bool { !secret.has_owner() }

    async fn declarations(&self) -> Result<Vec<Declaration>, Error> {
        ensure!(self.roles.is_synced(), error::RegistryNotSyncedSnafu);

        let heritage =
            BTreeMap::from([(labels::HERITAGE.to_string(), labels::HERITAGE_VALUE.to_string())]);

        Ok(self
            .roles
            .snapshot()
            .into_iter()
            .map(|(role, namespace)| Declaration {
                namespace,
                secret_name: format!("{}{role}", secret::NAME_PREFIX),
                role,
                session_duration: DEFAULT_SESSION_DURATION,
                labels: heritage.clone(),
                generation: None,
                owner: None,
                status: None,
            })
            .collect())
    }

    async fn report(&self, _declaration: &Declaration, _status: &RoleStatus) -> Result<(), Error> {
        Ok(())
    }
}
