use k8s_openapi::api::core::v1::Pod;

use crate::consts::k8s::secret;

pub trait PodExt {
    /// The role the pod wants credentials for, taken from the first secret
    /// volume named `aws-iam-<role>`. A bare `aws-iam-` volume names no role
    /// and later volumes are not consulted.
    fn iam_role(&self) -> Option<&str>;
}

impl PodExt for Pod {
    fn iam_role(&self) -> Option<&str> {
        self.spec
            .iter()
            .flat_map(|spec| spec.volumes.iter().flatten())
            .filter_map(|volume| volume.secret.as_ref()?.secret_name.as_deref())
            .find(|name| name.starts_with(secret::NAME_PREFIX))
            .and_then(|name| name.strip_prefix(secret::NAME_PREFIX))
            .filter(|role| !role.is_empty())
    }
}
