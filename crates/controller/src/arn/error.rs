use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("Invalid role ARN {role_arn}, expected at least one '/' separated path"))]
    InvalidRoleArn { role_arn: String },

    #[snafu(display("Failed to parse ARN {arn}, expected arn:partition:service:region:account:resource"))]
    InvalidArn { arn: String },

    #[snafu(display("Failed to determine base role ARN from instance profile {instance_profile_arn}"))]
    InvalidInstanceProfileArn { instance_profile_arn: String },
}
