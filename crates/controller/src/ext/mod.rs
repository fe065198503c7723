//! Extensions to Kubernetes API types.
//!
//! These traits read the controller specific conventions out of `k8s_openapi`
//! objects: the role a pod asks for through its volumes, and the expiry and
//! generation marker recorded in a credential secret.

mod pod;
mod secret;

pub use self::{pod::PodExt, secret::SecretExt};
