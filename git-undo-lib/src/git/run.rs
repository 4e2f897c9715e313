use std::collections::HashMap;
use std::ffi::OsString;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};

use eyre::Context;
use itertools::Itertools;
use tracing::instrument;

use crate::git::repo::Repo;

/// The `core.hooksPath` override passed to every Git subprocess spawned by the
/// snapshot engine. Recording a snapshot from inside a hook must never fire
/// the user's hooks again, or the engine would re-enter itself.
pub fn hooks_path_override() -> &'static str {
    if cfg!(windows) {
        "core.hooksPath=NUL"
    } else {
        "core.hooksPath=/dev/null"
    }
}

/// Path to the `git` executable on disk to be executed.
#[derive(Clone)]
pub struct GitRunInfo {
    /// The path to the Git executable on disk.
    pub path_to_git: PathBuf,

    /// The working directory that the Git executable should be run in.
    pub working_directory: PathBuf,

    /// The environment variables that should be passed to the Git process.
    pub env: HashMap<OsString, OsString>,
}

impl std::fmt::Debug for GitRunInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<GitRunInfo path_to_git={:?} working_directory={:?} env=not shown>",
            self.path_to_git, self.working_directory
        )
    }
}

/// Options for invoking Git.
pub struct GitRunOpts {
    /// If set, a non-zero exit code will be treated as an error.
    pub treat_git_failure_as_error: bool,

    /// A vector of bytes to write to the Git process's stdin. If `None`,
    /// nothing is written to stdin.
    pub stdin: Option<Vec<u8>>,

    /// Extra environment variables to set for the Git process, overriding any
    /// inherited values (e.g. `GIT_INDEX_FILE` to target a scratch index).
    pub extra_env: Vec<(OsString, OsString)>,
}

impl Default for GitRunOpts {
    fn default() -> Self {
        Self {
            treat_git_failure_as_error: true,
            stdin: None,
            extra_env: Vec::new(),
        }
    }
}

/// The result of invoking Git.
#[must_use]
pub struct GitRunResult {
    /// The exit code of the process.
    pub exit_code: i32,

    /// The stdout contents written by the invocation.
    pub stdout: Vec<u8>,

    /// The stderr contents written by the invocation.
    pub stderr: Vec<u8>,
}

impl std::fmt::Debug for GitRunResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "<GitRunResult exit_code={:?} stdout={:?} stderr={:?}>",
            self.exit_code,
            String::from_utf8_lossy(&self.stdout),
            String::from_utf8_lossy(&self.stderr),
        )
    }
}

impl GitRunInfo {
    fn run_silent_inner(
        &self,
        repo: &Repo,
        args: &[&str],
        opts: GitRunOpts,
    ) -> eyre::Result<GitRunResult> {
        let GitRunInfo {
            path_to_git,
            working_directory,
            env,
        } = self;
        let GitRunOpts {
            treat_git_failure_as_error,
            stdin,
            extra_env,
        } = opts;

        // Prefer running in the working copy path to the repo path, because
        // some commands do not function correctly when run from the `.git`
        // directory.
        let repo_path = repo
            .get_working_copy_path()
            .unwrap_or_else(|| repo.get_path().to_path_buf());
        let repo_path = repo_path.to_str().ok_or_else(|| {
            eyre::eyre!(
                "Path to Git repo could not be converted to UTF-8 string: {:?}",
                repo.get_path()
            )
        })?;

        let args = {
            let mut result = vec!["-C", repo_path];
            result.extend(args);
            result
        };
        let mut command = Command::new(path_to_git);
        command.args(&args);
        command.current_dir(working_directory);
        command.env_clear();
        command.envs(env.iter());
        command.envs(extra_env.iter().map(|(k, v)| (k.clone(), v.clone())));

        if stdin.is_some() {
            command.stdin(Stdio::piped());
        }
        command.stdout(Stdio::piped());
        command.stderr(Stdio::piped());

        let mut child = command.spawn().wrap_err("Spawning Git subprocess")?;

        if let Some(stdin) = stdin {
            child
                .stdin
                .as_mut()
                .unwrap()
                .write_all(&stdin)
                .wrap_err("Writing process stdin")?;
        }

        let output = child
            .wait_with_output()
            .wrap_err("Waiting for Git subprocess")?;
        let result = GitRunResult {
            // On Unix, if the child process was terminated by a signal, we need
            // to call some Unix-specific functions to access the signal that
            // terminated it. For simplicity, just return `1` in those cases.
            exit_code: output.status.code().unwrap_or(1),
            stdout: output.stdout,
            stderr: output.stderr,
        };
        if treat_git_failure_as_error && !output.status.success() {
            eyre::bail!(
                "Git subprocess failed: git {}: {:?}",
                args.join(" "),
                result
            );
        }
        Ok(result)
    }

    /// Run Git silently (don't display output to the user).
    ///
    /// Whenever possible, use `git2`'s bindings to Git instead, as they're
    /// considerably more lightweight and reliable.
    pub fn run_silent<S: AsRef<str> + std::fmt::Debug>(
        &self,
        repo: &Repo,
        args: &[S],
        opts: GitRunOpts,
    ) -> eyre::Result<GitRunResult> {
        self.run_silent_inner(
            repo,
            args.iter().map(AsRef::as_ref).collect_vec().as_slice(),
            opts,
        )
    }

    /// Run Git silently, with the user's hooks suppressed. Every adapter
    /// operation which mutates the repository goes through here.
    #[instrument(skip(repo, opts))]
    pub fn run_hookless<S: AsRef<str> + std::fmt::Debug>(
        &self,
        repo: &Repo,
        args: &[S],
        opts: GitRunOpts,
    ) -> eyre::Result<GitRunResult> {
        let args = {
            let mut result = vec!["-c", hooks_path_override()];
            result.extend(args.iter().map(AsRef::as_ref));
            result
        };
        self.run_silent_inner(repo, args.as_slice(), opts)
    }
}
