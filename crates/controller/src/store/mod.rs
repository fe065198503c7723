//! Access to the secrets credentials are delivered in.

mod error;

use k8s_openapi::api::core::v1::Secret;
use kube::{
    Api,
    api::{DeleteParams, ListParams, PostParams},
};
use snafu::{OptionExt, ResultExt};

pub use self::error::Error;

/// Generic list/create/update/delete over secrets.
pub trait SecretStore {
    /// Secrets matching the label `selector`.
    async fn list(&self, selector: &str) -> Result<Vec<Secret>, Error>;

    async fn create(&self, secret: &Secret) -> Result<(), Error>;

    /// Replaces a secret. The write is rejected if `secret` carries a stale
    /// resource version.
    async fn update(&self, secret: &Secret) -> Result<(), Error>;

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error>;
}

/// [`SecretStore`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubeSecretStore {
    client: kube::Client,
    namespace: Option<String>,
}

impl KubeSecretStore {
    /// Lists secrets in `namespace`, or in every namespace when `None`.
    #[must_use]
    pub const fn new(client: kube::Client, namespace: Option<String>) -> Self {
        Self { client, namespace }
    }

    fn namespaced(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Namespace and name of `secret`.
fn identity(secret: &Secret) -> Result<(&str, &str), Error> {
    let namespace = secret
        .metadata
        .namespace
        .as_deref()
        .context(error::IncompleteSecretSnafu { field: "namespace" })?;
    let name =
        secret.metadata.name.as_deref().context(error::IncompleteSecretSnafu { field: "name" })?;
    Ok((namespace, name))
}

impl SecretStore for KubeSecretStore {
    async fn list(&self, selector: &str) -> Result<Vec<Secret>, Error> {
        let api = match self.namespace {
            Some(ref namespace) => self.namespaced(namespace),
            None => Api::all(self.client.clone()),
        };
        let secrets = api
            .list(&ListParams::default().labels(selector))
            .await
            .context(error::ListSecretsSnafu { selector })?;
        Ok(secrets.items)
    }

    async fn create(&self, secret: &Secret) -> Result<(), Error> {
        let (namespace, name) = identity(secret)?;
        let _secret = self
            .namespaced(namespace)
            .create(&PostParams::default(), secret)
            .await
            .context(error::CreateSecretSnafu { namespace, name })?;
        Ok(())
    }

    async fn update(&self, secret: &Secret) -> Result<(), Error> {
        let (namespace, name) = identity(secret)?;
        let _secret = self
            .namespaced(namespace)
            .replace(name, &PostParams::default(), secret)
            .await
            .context(error::UpdateSecretSnafu { namespace, name })?;
        Ok(())
    }

    async fn delete(&self, namespace: &str, name: &str) -> Result<(), Error> {
        let _status = self
            .namespaced(namespace)
            .delete(name, &DeleteParams::default())
            .await
            .context(error::DeleteSecretSnafu { namespace, name })?;
        Ok(())
    }
}
