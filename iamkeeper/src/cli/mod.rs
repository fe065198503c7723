//! Command line interface of the `iamkeeper` controller.
//!
//! ```bash
//! # Run the controller against the current kube context
//! iamkeeper run --base-role-arn arn:aws:iam::012345678910:role/
//!
//! # Show the session name used when assuming a role
//! iamkeeper session-name arn:aws:iam::012345678910:role/team/app
//!
//! # Install the AWSIAMRole custom resource definition
//! iamkeeper crd | kubectl apply -f -
//! ```

pub mod error;
mod run;
mod session_name;

use std::{io::Write, path::PathBuf};

use clap::{CommandFactory, Parser, Subcommand};
use iamkeeper_controller::crd::AwsIamRole;
use kube::CustomResourceExt;
use snafu::ResultExt;
use tokio::runtime::Runtime;

pub use self::error::Error;
use self::{run::RunCommand, session_name::SessionNameCommand};
use crate::{config::Config, shadow};

#[derive(Parser)]
#[command(
    name = iamkeeper_base::CLI_PROGRAM_NAME,
    author,
    version,
    long_version = shadow::CLAP_LONG_VERSION,
    about = "Kubernetes controller issuing and rotating AWS IAM credentials as secrets"
)]
pub struct Cli {
    #[clap(subcommand)]
    commands: Option<Commands>,

    #[clap(
        long = "config",
        short = 'c',
        env = "IAMKEEPER_CONFIG_FILE_PATH",
        help = "Specify a configuration file. Defaults to ~/.config/iamkeeper/config.yaml or \
                IAMKEEPER_CONFIG_FILE_PATH env var."
    )]
    config_file: Option<PathBuf>,

    #[clap(
        long = "log-level",
        env = "IAMKEEPER_LOG_LEVEL",
        help = "Set the logging level (e.g., info, debug, trace)."
    )]
    log_level: Option<tracing::Level>,
}

#[derive(Clone, Subcommand)]
pub enum Commands {
    #[command(about = "Display client and server version information")]
    Version {
        #[clap(long = "client", help = "If true, shows client version only (no server required).")]
        client: bool,
    },

    #[command(about = "Generate shell completion script for the specified shell (bash, zsh, fish)")]
    Completions { shell: clap_complete::Shell },

    #[command(about = "Output the default configuration in YAML format")]
    DefaultConfig,

    #[command(about = "Output the AWSIAMRole custom resource definition in YAML format")]
    Crd,

    #[command(about = "Print the STS session name used for a role ARN")]
    SessionName(SessionNameCommand),

    #[command(about = "Run the controller")]
    Run(RunCommand),
}

impl Default for Cli {
    fn default() -> Self { Self::parse() }
}

impl Cli {
    /// Loads the configuration. An explicitly given file must exist; otherwise
    /// the defaults apply when no file is found.
    fn load_config(&self) -> Result<Config, Error> {
        let mut config = match self.config_file {
            Some(ref path) => Config::load(path)?,
            None => Config::load_or_default(Config::search_config_file_path())?,
        };

        if let Some(log_level) = self.log_level {
            config.log.level = log_level;
        }

        Ok(config)
    }

    fn write_stdout(data: &[u8]) -> Result<(), Error> {
        std::io::stdout().write_all(data).context(error::WriteStdoutSnafu)
    }

    /// Dispatches the parsed subcommand and returns the exit code.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration cannot be loaded, the Kubernetes
    /// client cannot be created or the subcommand fails.
    pub fn run(self) -> Result<i32, Error> {
        let client_version = Self::command().get_version().unwrap_or_default().to_string();
        match self.commands {
            Some(Commands::Version { client }) if client => {
                Self::write_stdout(Self::command().render_long_version().as_bytes())?;
                Self::write_stdout(format!("Client Version: {client_version}\n").as_bytes())?;
                return Ok(0);
            }
            Some(Commands::Completions { shell }) => {
                let mut app = Self::command();
                let bin_name = app.get_name().to_string();
                clap_complete::generate(shell, &mut app, bin_name, &mut std::io::stdout());
                return Ok(0);
            }
            Some(Commands::DefaultConfig) => {
                Self::write_stdout(&Config::template_basic()?)?;
                return Ok(0);
            }
            Some(Commands::Crd) => {
                let crd = serde_yaml::to_string(&AwsIamRole::crd())
                    .context(error::RenderCustomResourceDefinitionSnafu)?;
                Self::write_stdout(crd.as_bytes())?;
                return Ok(0);
            }
            Some(Commands::SessionName(cmd)) => {
                cmd.run()?;
                return Ok(0);
            }
            _ => {}
        }

        let config = self.load_config()?;
        config.log.registry();

        let fut = async move {
            let kube_client = kube::Client::try_default().await.context(error::KubeConfigSnafu)?;
            match self.commands {
                Some(Commands::Version { .. }) => {
                    let server_version = kube_client.apiserver_version().await.map_or_else(
                        |_| "unknown".to_string(),
                        |info| format!("{}.{}", info.major, info.minor),
                    );
                    Self::write_stdout(Self::command().render_long_version().as_bytes())?;
                    Self::write_stdout(
                        format!(
                            "Client Version: {client_version}\nServer Version: {server_version}\n"
                        )
                        .as_bytes(),
                    )?;
                }
                Some(Commands::Run(cmd)) => cmd.run(kube_client, config).await?,
                _ => {
                    let help = Self::command().render_long_help().ansi().to_string();
                    std::io::stderr().write_all(help.as_bytes()).context(error::WriteStdoutSnafu)?;
                    return Ok(-1);
                }
            }

            Ok(0)
        };

        Runtime::new().context(error::InitializeTokioRuntimeSnafu)?.block_on(fut)
    }
}
