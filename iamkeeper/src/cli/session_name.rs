use std::io::Write;

use clap::Args;
use iamkeeper_controller::arn;
use snafu::ResultExt;

use crate::cli::{Error, error};

/// Prints the STS session name the controller uses for a role.
#[derive(Args, Clone)]
pub struct SessionNameCommand {
    #[arg(help = "Full ARN of the role, e.g. arn:aws:iam::012345678910:role/team/app")]
    pub role_arn: String,
}

impl SessionNameCommand {
    pub fn run(self) -> Result<(), Error> {
        let Self { role_arn } = self;
        let session_name = arn::prefix_from_arn(&role_arn)
            .and_then(|prefix| arn::normalize_role_arn(&role_arn, &prefix))
            .with_context(|_| error::RoleArnSnafu { role_arn: role_arn.clone() })?;

        std::io::stdout()
            .write_all(format!("{session_name}\n").as_bytes())
            .context(error::WriteStdoutSnafu)
    }
}
