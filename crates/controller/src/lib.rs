//! Issuing and rotating AWS IAM credentials as Kubernetes secrets.
//!
//! Secrets are declared either by pods mounting `aws-iam-<role>` secrets
//! ([`source::PodRoleSource`]) or by `AWSIAMRole` resources
//! ([`source::AwsIamRoleSource`]). A [`reconciler::Reconciler`] keeps the
//! secrets of one source in line with its declarations.

pub mod arn;
pub mod consts;
pub mod crd;
pub mod credentials;
pub mod drift;
pub mod ext;
pub mod recorder;
pub mod reconciler;
pub mod registry;
pub mod source;
pub mod store;
pub mod watcher;
