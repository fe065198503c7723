pub mod consts;

use std::{
    path::{Path, PathBuf},
    sync::LazyLock,
};

use directories::ProjectDirs;

pub const PROJECT_VERSION: &str = env!("CARGO_PKG_VERSION");

pub static PROJECT_SEMVER: LazyLock<semver::Version> = LazyLock::new(|| {
    semver::Version::parse(PROJECT_VERSION).unwrap_or(semver::Version {
        major: 0,
        minor: 0,
        patch: 0,
        pre: semver::Prerelease::EMPTY,
        build: semver::BuildMetadata::EMPTY,
    })
});

pub const PROJECT_NAME: &str = "iamkeeper";

pub const CLI_PROGRAM_NAME: &str = "iamkeeper";
pub const CLI_CONFIG_NAME: &str = "config.yaml";

/// Name reported as the `reportingComponent` of Kubernetes events.
pub const CONTROLLER_NAME: &str = "iamkeeper-controller";

pub static PROJECT_CONFIG_DIR: LazyLock<PathBuf> = LazyLock::new(|| {
    ProjectDirs::from("", PROJECT_NAME, PROJECT_NAME).map_or_else(
        || PathBuf::from("/etc").join(PROJECT_NAME),
        |dirs| dirs.config_dir().to_path_buf(),
    )
});

#[must_use]
pub fn fallback_project_config_directories() -> Vec<PathBuf> {
    let mut dirs = vec![PathBuf::from("/etc").join(PROJECT_NAME)];
    if let Some(user_dirs) = directories::UserDirs::new() {
        dirs.push(
            [user_dirs.home_dir(), Path::new(".config"), Path::new(PROJECT_NAME)].iter().collect(),
        );
        dirs.push([user_dirs.home_dir(), Path::new(&format!(".{PROJECT_NAME}"))].iter().collect());
    }
    dirs
}
