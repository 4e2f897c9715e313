//! Paths and environment variables used by the snapshot engine.

use std::path::PathBuf;

use tracing::instrument;

use crate::git::Repo;

/// The name of the environment variable which supplies an explicit label for
/// the snapshot being recorded, instead of inferring one from the process tree
/// or the reflog.
pub const MESSAGE_ENV_VAR: &str = "GIT_UNDO_MESSAGE";

/// Get the path where Git hooks are stored on disk.
#[instrument]
pub fn get_core_hooks_path(repo: &Repo) -> eyre::Result<PathBuf> {
    let config = repo.get_readonly_config()?;
    match config.get_string("core.hooksPath") {
        Ok(hooks_path) => Ok(PathBuf::from(hooks_path)),
        Err(_) => Ok(repo.get_path().join("hooks")),
    }
}

/// Environment variables which control how tests locate the Git executable.
pub mod env_vars {
    use std::path::PathBuf;

    use tracing::instrument;

    use crate::util::get_from_path;

    /// Path to the Git executable to shell out to as a subprocess when
    /// appropriate. This may be set during tests to pin a particular Git
    /// version.
    pub const TEST_GIT: &str = "TEST_GIT";

    /// Get the path to the Git executable. Prefers the `TEST_GIT` environment
    /// variable, then a `PATH` lookup, then the bare name `git`.
    #[instrument]
    pub fn get_path_to_git() -> PathBuf {
        if let Some(path_to_git) = std::env::var_os(TEST_GIT) {
            return PathBuf::from(path_to_git);
        }
        get_from_path("git").unwrap_or_else(|| PathBuf::from("git"))
    }
}
