//! The `AWSIAMRole` custom resource.

use std::time::Duration;

use chrono::{DateTime, Utc};
use iamkeeper_base::consts::DEFAULT_SESSION_DURATION;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Declares that credentials for a role should be delivered as a secret named
/// after the resource.
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[kube(
    group = "zalando.org",
    version = "v1",
    kind = "AWSIAMRole",
    root = "AwsIamRole",
    namespaced,
    status = "AwsIamRoleStatus",
    shortname = "iamrole",
    printcolumn = r#"{"name":"RoleARN", "type":"string", "jsonPath":".status.roleARN"}"#,
    printcolumn = r#"{"name":"Expiration", "type":"string", "jsonPath":".status.expiration"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct AwsIamRoleSpec {
    /// Role name relative to the base role ARN, or a full role ARN.
    pub role_reference: String,

    /// Requested session duration in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role_session_duration: Option<i64>,
}

impl AwsIamRoleSpec {
    /// The session duration to request, falling back to one hour when unset
    /// or not positive.
    #[must_use]
    pub fn session_duration(&self) -> Duration {
        self.role_session_duration
            .and_then(|secs| u64::try_from(secs).ok())
            .filter(|secs| *secs > 0)
            .map_or(DEFAULT_SESSION_DURATION, Duration::from_secs)
    }
}

#[derive(Clone, Debug, Default, Deserialize, Eq, JsonSchema, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AwsIamRoleStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,

    #[serde(default, rename = "roleARN", skip_serializing_if = "Option::is_none")]
    pub role_arn: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use kube::{CustomResourceExt, Resource};

    use super::*;

    #[test]
    fn test_session_duration_defaults() {
        let spec = |role_session_duration| AwsIamRoleSpec {
            role_reference: "svc-a".to_string(),
            role_session_duration,
        };
        assert_eq!(spec(None).session_duration(), Duration::from_secs(3600));
        assert_eq!(spec(Some(0)).session_duration(), Duration::from_secs(3600));
        assert_eq!(spec(Some(-5)).session_duration(), Duration::from_secs(3600));
        assert_eq!(spec(Some(900)).session_duration(), Duration::from_secs(900));
    }

    #[test]
    fn test_resource_identity() {
        assert_eq!(AwsIamRole::api_version(&()), "zalando.org/v1");
        assert_eq!(AwsIamRole::kind(&()), "AWSIAMRole");
        assert_eq!(AwsIamRole::crd().spec.names.plural, "awsiamroles");
    }

    #[test]
    fn test_deserialize_resource() {
        let role: AwsIamRole = serde_json::from_value(serde_json::json!({
            "apiVersion": "zalando.org/v1",
            "kind": "AWSIAMRole",
            "metadata": {"name": "svc-a", "namespace": "default", "generation": 2},
            "spec": {"roleReference": "svc-a", "roleSessionDuration": 1800},
            "status": {
                "observedGeneration": 1,
                "roleARN": "arn:aws:iam::012345678910:role/svc-a",
                "expiration": "2024-05-01T12:30:00Z"
            }
        }))
        .expect("valid resource");

        assert_eq!(role.spec.session_duration(), Duration::from_secs(1800));
        let status = role.status.expect("status");
        assert_eq!(status.observed_generation, Some(1));
        assert_eq!(status.role_arn.as_deref(), Some("arn:aws:iam::012345678910:role/svc-a"));
    }
}
