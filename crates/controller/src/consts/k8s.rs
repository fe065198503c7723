//! Kubernetes names shared with workloads and older deployments.

pub mod labels {
    //! Labels put on managed secrets.

    /// Marks secrets written by this controller.
    pub const HERITAGE: &str = "heritage";

    /// Value of [`HERITAGE`] on every managed secret.
    pub const HERITAGE_VALUE: &str = "kube-aws-iam-controller";

    /// Distinguishes secrets backing `AWSIAMRole` resources.
    pub const TYPE: &str = "type";

    /// Value of [`TYPE`] on secrets backing `AWSIAMRole` resources.
    pub const TYPE_AWSIAMROLE: &str = "awsiamrole";
}

pub mod secret {
    //! Keys of the data stored in a credential secret.

    pub const ROLE_ARN_KEY: &str = "role-arn";
    pub const EXPIRE_KEY: &str = "expire";
    pub const CREDENTIALS_FILE_KEY: &str = "credentials";
    pub const CREDENTIALS_PROCESS_FILE_KEY: &str = "credentials.process";
    pub const CREDENTIALS_JSON_FILE_KEY: &str = "credentials.json";

    /// Generation of the `AWSIAMRole` the secret was last synced from.
    pub const GENERATION_KEY: &str = "awsiamrole-generation";

    /// Prefix of secrets requested by pods through their volumes.
    pub const NAME_PREFIX: &str = "aws-iam-";
}
