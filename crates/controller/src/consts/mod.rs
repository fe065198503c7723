pub mod k8s;

/// Shim telling AWS SDKs to source credentials from the mounted JSON document.
pub const CREDENTIALS_PROCESS_CONTENT: &str =
    "[default]\ncredential_process = cat /meta/aws-iam/credentials.json\n";
