use std::collections::BTreeMap;

use k8s_openapi::{api::core::v1::Secret, apimachinery::pkg::apis::meta::v1::OwnerReference};
use kube::{
    Api, Resource, ResourceExt,
    api::{ListParams, Patch, PatchParams},
};
use snafu::ResultExt;

use crate::{
    consts::k8s::labels,
    crd::{AwsIamRole, AwsIamRoleStatus},
    source::{Declaration, DesiredStateSource, Error, RoleStatus, error},
};

/// Declarations backed by `AWSIAMRole` resources.
#[derive(Clone)]
pub struct AwsIamRoleSource {
    client: kube::Client,
    namespace: Option<String>,
}

impl AwsIamRoleSource {
    /// Watches resources in `namespace`, or in every namespace when `None`.
    #[must_use]
    pub const fn new(client: kube::Client, namespace: Option<String>) -> Self {
        Self { client, namespace }
    }

    fn api(&self) -> Api<AwsIamRole> {
        match self.namespace {
            Some(ref namespace) => Api::namespaced(self.client.clone(), namespace),
            None => Api::all(self.client.clone()),
        }
    }
}

impl DesiredStateSource for AwsIamRoleSource {
    fn name(&self) -> &'static str { "awsiamrole" }

    fn secret_selector(&self) -> String {
        format!(
            "{}={},{}={}",
            labels::HERITAGE,
            labels::HERITAGE_VALUE,
            labels::TYPE,
            labels::TYPE_AWSIAMROLE
        )
    }

    fn manages(&self, _secret: &Secret) -> bool { true }

    async fn declarations(&self) -> Result<Vec<Declaration>, Error> {
        let roles = self
            .api()
            .list(&ListParams::default())
            .await
            .with_context(|_| error::ListAwsIamRolesSnafu { namespace: self.namespace.clone() })?;

        Ok(roles
            .items
            .iter()
            .filter_map(|role| {
                let declaration = declaration_from(role);
                if declaration.is_none() {
                    tracing::warn!(
                        name = role.metadata.name.as_deref(),
                        "Skipping AWSIAMRole without name, namespace or UID"
                    );
                }
                declaration
            })
            .collect())
    }

    async fn report(&self, declaration: &Declaration, status: &RoleStatus) -> Result<(), Error> {
        let Declaration { namespace, secret_name: name, .. } = declaration;
        let RoleStatus { observed_generation, role_arn, expiration } = status;

        let patch = serde_json::json!({
            "status": AwsIamRoleStatus {
                observed_generation: Some(*observed_generation),
                role_arn: Some(role_arn.clone()),
                expiration: Some(*expiration),
            }
        });

        let _resource = Api::<AwsIamRole>::namespaced(self.client.clone(), namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .with_context(|_| error::UpdateStatusSnafu {
                namespace: namespace.clone(),
                name: name.clone(),
            })?;

        tracing::debug!(%namespace, %name, observed_generation, "Updated AWSIAMRole status");
        Ok(())
    }
}

/// The declaration made by `role`, or `None` if the resource lacks the
/// identity needed to own a secret.
fn declaration_from(role: &AwsIamRole) -> Option<Declaration> {
    let name = role.metadata.name.clone()?;
    let namespace = role.metadata.namespace.clone()?;
    let uid = role.metadata.uid.clone()?;

    let mut secret_labels: BTreeMap<String, String> = role.labels().clone();
    secret_labels.extend([
        (labels::HERITAGE.to_string(), labels::HERITAGE_VALUE.to_string()),
        (labels::TYPE.to_string(), labels::TYPE_AWSIAMROLE.to_string()),
    ]);

    let status = role.status.as_ref().and_then(|status| {
        Some(RoleStatus::new(
            status.observed_generation?,
            status.role_arn.clone()?,
            status.expiration?,
        ))
    });

    Some(Declaration {
        secret_name: name.clone(),
        namespace,
        role: role.spec.role_reference.clone(),
        session_duration: role.spec.session_duration(),
        labels: secret_labels,
        generation: Some(role.metadata.generation.unwrap_or_default()),
        owner: Some(OwnerReference {
            api_version: AwsIamRole::api_version(&()).into_owned(),
            kind: AwsIamRole::kind(&()).into_owned(),
            name,
            uid,
            ..OwnerReference::default()
        }),
        status,
    })
}
