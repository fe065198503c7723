use snafu::Snafu;

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display(
        "Failed to list AWSIAMRole resources in {}, error: {source}",
        namespace.as_deref().unwrap_or("all namespaces")
    ))]
    ListAwsIamRoles {
        namespace: Option<String>,
        #[snafu(source(from(kube::Error, Box::new)))]
        source: Box<kube::Error>,
    },

    #[snafu(display(
        "Failed to update status of AWSIAMRole {name} in namespace {namespace}, error: {source}"
    ))]
    UpdateStatus {
        namespace: String,
        name: String,
        #[snafu(source(from(kube::Error, Box::new)))]
        source: Box<kube::Error>,
    },

    #[snafu(display("Pod roles are not known yet, waiting for the first pod listing"))]
    RegistryNotSynced,
}
