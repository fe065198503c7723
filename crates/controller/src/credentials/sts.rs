use std::time::Duration;

use aws_config::{SdkConfig, sts::AssumeRoleProvider};
use chrono::DateTime;
use iamkeeper_base::CONTROLLER_NAME;
use serde::Deserialize;
use snafu::{OptionExt, ResultExt};

use crate::{
    arn,
    credentials::{CredentialsIssuer, Error, IssuedCredentials, error},
};

const INSTANCE_METADATA_IAM_INFO_PATH: &str = "/latest/meta-data/iam/info";

/// Issues credentials through the STS `AssumeRole` API.
#[derive(Clone, Debug)]
pub struct StsIssuer {
    client: aws_sdk_sts::Client,
}

impl StsIssuer {
    /// Builds an STS client from `sdk_config`.
    ///
    /// With `assume_role_arn` set, every request is signed with credentials
    /// obtained by assuming that role first. With `use_regional_endpoint` set
    /// and a region configured, requests go to the regional STS endpoint
    /// instead of the global one.
    pub async fn new(
        sdk_config: &SdkConfig,
        assume_role_arn: Option<&str>,
        use_regional_endpoint: bool,
    ) -> Self {
        let mut builder = aws_sdk_sts::config::Builder::from(sdk_config);

        if let Some(role_arn) = assume_role_arn {
            tracing::info!(role_arn, "Signing STS requests with an assumed role");
            let provider = AssumeRoleProvider::builder(role_arn)
                .session_name(CONTROLLER_NAME)
                .configure(sdk_config)
                .build()
                .await;
            builder = builder.credentials_provider(provider);
        }

        if use_regional_endpoint && let Some(region) = sdk_config.region() {
            let endpoint = regional_sts_endpoint(region.as_ref());
            tracing::info!(%endpoint, "Using regional STS endpoint");
            builder = builder.endpoint_url(endpoint);
        }

        Self { client: aws_sdk_sts::Client::from_conf(builder.build()) }
    }
}

impl CredentialsIssuer for StsIssuer {
    async fn assume_role(
        &self,
        role_arn: &str,
        session_name: &str,
        duration: Duration,
    ) -> Result<IssuedCredentials, Error> {
        let output = self
            .client
            .assume_role()
            .role_arn(role_arn)
            .role_session_name(session_name)
            .duration_seconds(i32::try_from(duration.as_secs()).unwrap_or(i32::MAX))
            .send()
            .await
            .context(error::AssumeRoleSnafu { role_arn })?;

        let credentials =
            output.credentials().context(error::MissingCredentialsSnafu { role_arn })?;
        let expiration = credentials.expiration();
        let expiration = DateTime::from_timestamp(expiration.secs(), expiration.subsec_nanos())
            .context(error::InvalidExpirationSnafu { role_arn })?;

        Ok(IssuedCredentials {
            access_key_id: credentials.access_key_id().to_string(),
            secret_access_key: credentials.secret_access_key().to_string(),
            session_token: credentials.session_token().to_string(),
            expiration,
        })
    }
}

/// The STS endpoint serving `region`.
#[must_use]
pub fn regional_sts_endpoint(region: &str) -> String {
    if region.starts_with("cn-") {
        format!("https://sts.{region}.amazonaws.com.cn")
    } else {
        format!("https://sts.{region}.amazonaws.com")
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "PascalCase")]
struct IamInfo {
    instance_profile_arn: String,
}

/// Derives the base role ARN from the instance profile reported by the EC2
/// instance metadata service.
///
/// # Errors
///
/// Returns an error if the metadata service is unreachable or reports no
/// usable instance profile.
pub async fn discover_base_role_arn() -> Result<String, Error> {
    let client = aws_config::imds::Client::builder().build();
    let info = client
        .get(INSTANCE_METADATA_IAM_INFO_PATH)
        .await
        .context(error::QueryInstanceMetadataSnafu)?;
    let IamInfo { instance_profile_arn } =
        serde_json::from_str::<IamInfo>(info.as_ref()).context(error::ParseInstanceMetadataSnafu)?;

    arn::base_role_arn_from_instance_profile(&instance_profile_arn)
        .context(error::InstanceProfileSnafu)
}
