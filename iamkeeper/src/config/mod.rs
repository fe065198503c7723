mod error;

use std::{
    path::{Path, PathBuf},
    time::Duration,
};

use iamkeeper_base::consts::{DEFAULT_EVENT_QUEUE_SIZE, DEFAULT_INTERVAL, DEFAULT_REFRESH_LIMIT};
use iamkeeper_cli::config::LogConfig;
use resolve_path::PathResolveExt;
use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};
use snafu::ResultExt;

pub use self::error::Error;

/// Settings of the controller, read from a YAML file.
#[serde_as]
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// Time between two reconcile ticks.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_interval")]
    pub interval: Duration,

    /// Credentials expiring within this window are rotated.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(default = "default_refresh_limit")]
    pub refresh_limit: Duration,

    /// Capacity of the queue between the pod watcher and the role registry.
    #[serde(default = "default_event_queue_size")]
    pub event_queue_size: usize,

    /// Base role ARN relative role names are resolved against. Discovered from
    /// the instance metadata when unset.
    #[serde(default)]
    pub base_role_arn: Option<String>,

    /// Role assumed before every credential request.
    #[serde(default)]
    pub assume_role: Option<String>,

    /// Restricts the controller to one namespace.
    #[serde(default)]
    pub namespace: Option<String>,

    #[serde(default)]
    pub use_regional_sts_endpoint: bool,

    #[serde(default)]
    pub log: LogConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            refresh_limit: DEFAULT_REFRESH_LIMIT,
            event_queue_size: DEFAULT_EVENT_QUEUE_SIZE,
            base_role_arn: None,
            assume_role: None,
            namespace: None,
            use_regional_sts_endpoint: false,
            log: LogConfig::default(),
        }
    }
}

impl Config {
    /// The first existing config file among the default path and the fallback
    /// directories, or the default path if there is none.
    pub fn search_config_file_path() -> PathBuf {
        let paths = vec![Self::default_path()]
            .into_iter()
            .chain(iamkeeper_base::fallback_project_config_directories().into_iter().map(
                |mut path| {
                    path.push(iamkeeper_base::CLI_CONFIG_NAME);
                    path
                },
            ))
            .collect::<Vec<_>>();
        for path in paths {
            let Ok(exists) = path.try_exists() else {
                continue;
            };
            if exists {
                return path;
            }
        }
        Self::default_path()
    }

    #[inline]
    pub fn default_path() -> PathBuf {
        [iamkeeper_base::PROJECT_CONFIG_DIR.to_path_buf(), PathBuf::from(iamkeeper_base::CLI_CONFIG_NAME)]
            .into_iter()
            .collect()
    }

    /// Loads the config at `path`, or the defaults if `path` does not exist.
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        if path.as_ref().try_exists().unwrap_or(false) {
            Self::load(path)
        } else {
            tracing::debug!(path = %path.as_ref().display(), "No config file, using defaults");
            Ok(Self::default())
        }
    }

    #[inline]
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let mut config: Self = {
            let path =
                path.as_ref().try_resolve().map(|path| path.to_path_buf()).with_context(|_| {
                    error::ResolveFilePathSnafu { file_path: path.as_ref().to_path_buf() }
                })?;
            let data =
                std::fs::read(&path).context(error::OpenConfigSnafu { filename: path.clone() })?;
            serde_yaml::from_slice(&data).context(error::ParseConfigSnafu { filename: path })?
        };

        config.log.file_path = match config.log.file_path.map(|path| {
            path.try_resolve()
                .map(|path| path.to_path_buf())
                .with_context(|_| error::ResolveFilePathSnafu { file_path: path.clone() })
        }) {
            Some(Ok(path)) => Some(path),
            Some(Err(err)) => return Err(err),
            None => None,
        };

        Ok(config)
    }

    /// The defaults rendered as YAML.
    pub fn template_basic() -> Result<Vec<u8>, Error> {
        serde_yaml::to_string(&Self::default())
            .map(String::into_bytes)
            .context(error::SerializeConfigSnafu)
    }
}

const fn default_interval() -> Duration { DEFAULT_INTERVAL }

const fn default_refresh_limit() -> Duration { DEFAULT_REFRESH_LIMIT }

const fn default_event_queue_size() -> usize { DEFAULT_EVENT_QUEUE_SIZE }
