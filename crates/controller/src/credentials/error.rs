use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Failed to derive a session name for role {role_arn}, error: {source}"))]
    SessionName { role_arn: String, source: crate::arn::Error },

    #[snafu(display(
        "Failed to assume role {role_arn}, error: {}",
        aws_sdk_sts::error::DisplayErrorContext(source.as_ref())
    ))]
    AssumeRole {
        role_arn: String,
        #[snafu(source(from(
            aws_sdk_sts::error::SdkError<aws_sdk_sts::operation::assume_role::AssumeRoleError>,
            Box::new
        )))]
        source: Box<aws_sdk_sts::error::SdkError<aws_sdk_sts::operation::assume_role::AssumeRoleError>>,
    },

    #[snafu(display("STS returned no credentials for role {role_arn}"))]
    MissingCredentials { role_arn: String },

    #[snafu(display("STS returned an out of range expiration for role {role_arn}"))]
    InvalidExpiration { role_arn: String },

    #[snafu(display("Failed to serialize process credentials, error: {source}"))]
    SerializeProcessCredentials { source: serde_json::Error },

    #[snafu(display("Failed to query instance metadata, error: {source}"))]
    QueryInstanceMetadata {
        #[snafu(source(from(aws_config::imds::client::error::ImdsError, Box::new)))]
        source: Box<aws_config::imds::client::error::ImdsError>,
    },

    #[snafu(display("Failed to parse instance metadata IAM info, error: {source}"))]
    ParseInstanceMetadata { source: serde_json::Error },

    #[snafu(display("{source}"))]
    InstanceProfile { source: crate::arn::Error },
}
