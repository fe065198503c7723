use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum Error {
    #[snafu(display("{source}"))]
    Configuration { source: crate::config::Error },

    #[snafu(display("{source}"))]
    Credentials { source: iamkeeper_controller::credentials::Error },

    #[snafu(display("{source}"))]
    PodWatcher { source: iamkeeper_controller::watcher::Error },

    #[snafu(display("Invalid role ARN {role_arn}, error: {source}"))]
    RoleArn { role_arn: String, source: iamkeeper_controller::arn::Error },

    #[snafu(display("Failed to write to stdout, error: {source}"))]
    WriteStdout { source: std::io::Error },

    #[snafu(display("Failed to render the AWSIAMRole custom resource definition, error: {source}"))]
    RenderCustomResourceDefinition { source: serde_yaml::Error },

    #[snafu(display("Failed to initialize Kubernetes client configuration, error: {source}"))]
    KubeConfig {
        #[snafu(source(from(kube::Error, Box::new)))]
        source: Box<kube::Error>,
    },

    #[snafu(display("Failed to create tokio runtime, error: {source}"))]
    InitializeTokioRuntime { source: std::io::Error },
}

impl From<crate::config::Error> for Error {
    fn from(source: crate::config::Error) -> Self { Self::Configuration { source } }
}

impl From<iamkeeper_controller::credentials::Error> for Error {
    fn from(source: iamkeeper_controller::credentials::Error) -> Self { Self::Credentials { source } }
}

impl From<iamkeeper_controller::watcher::Error> for Error {
    fn from(source: iamkeeper_controller::watcher::Error) -> Self { Self::PodWatcher { source } }
}
