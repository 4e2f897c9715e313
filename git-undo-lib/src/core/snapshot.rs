//! Capture of repository state into immutable snapshots.
//!
//! A snapshot records everything mutable about a repository that a user
//! action can change: the set of local references, the symbolic `HEAD`, the
//! index, and the working tree. The index and working tree are captured as
//! trees in the repository's own object database, wrapped in zero-parent
//! commits so that the host's reachability rules keep them alive once a
//! ledger entry lists them as parents.
//!
//! Untracked files are deliberately not captured. They might contain
//! sensitive data which we don't want to accidentally store in Git, or might
//! be very large and cause performance issues if committed.

use std::path::Path;

use tracing::{debug, instrument};

use crate::core::config::MESSAGE_ENV_VAR;
use crate::core::ledger::LEDGER_REF_NAME;
use crate::git::{
    CategorizedReferenceName, GitRunInfo, HeadState, NonZeroOid, ReferenceName, Repo, Signature,
};

const INDEX_COMMIT_MESSAGE: &str = "git-undo: index state";
const WORKDIR_COMMIT_MESSAGE: &str = "git-undo: working tree state";

/// The captured state of a repository at one point in time.
#[derive(Clone, Debug)]
pub struct Snapshot {
    /// The OID of the ledger commit which stores this snapshot. `None` for a
    /// freshly captured snapshot which has not been saved yet.
    pub id: Option<NonZeroOid>,

    /// A single-line, best-effort label for the user action which triggered
    /// this snapshot.
    pub message: String,

    /// Every local branch and tag, in enumeration order. Remote-tracking
    /// references and the ledger's own reference are excluded.
    pub refs: Vec<(ReferenceName, NonZeroOid)>,

    /// The symbolic `HEAD` value at capture time.
    pub head: HeadState,

    /// A zero-parent commit wrapping the tree captured from the index.
    pub index_commit: NonZeroOid,

    /// A zero-parent commit wrapping the tree captured from the working tree
    /// (unstaged changes included).
    pub workdir_commit: NonZeroOid,

    /// The tree captured from the index. Populated by capture; ledger loads
    /// leave it unset, since restoration reads the commit parents instead.
    pub index_tree: Option<NonZeroOid>,

    /// The tree captured from the working tree. Populated by capture; unset
    /// on ledger loads.
    pub workdir_tree: Option<NonZeroOid>,
}

impl Snapshot {
    /// Determine whether two snapshots record the same repository state.
    ///
    /// The `message` is ignored: re-recording an unchanged repository under a
    /// different label does not make it a different state. The `id` is
    /// likewise ignored.
    pub fn is_same_state(&self, other: &Snapshot) -> bool {
        self.refs == other.refs
            && self.head == other.head
            && self.index_commit == other.index_commit
            && self.workdir_commit == other.workdir_commit
    }
}

/// Capture the current state of the repository as an unsaved [`Snapshot`].
///
/// Returns `Ok(None)` when a rebase is in progress: rebases rewrite history
/// through many intermediate states which the user does not consider distinct
/// snapshots, and snapshotting mid-rebase risks racing with the host's own
/// index transactions.
#[instrument(skip(git_run_info))]
pub fn capture(repo: &Repo, git_run_info: &GitRunInfo) -> eyre::Result<Option<Snapshot>> {
    if repo.is_rebase_underway() {
        debug!("Rebase in progress; not capturing a snapshot");
        return Ok(None);
    }

    let scratch_index_path = repo.get_scratch_index_path();
    prepare_scratch_index(repo, &scratch_index_path)?;

    let signature = Signature::automated()?;

    // The index must be captured before the working tree: the working-tree
    // capture reuses the scratch index and stages on top of it.
    let index_tree = repo.write_tree_from_index_file(&scratch_index_path)?;
    let index_commit = repo.create_commit(&signature, INDEX_COMMIT_MESSAGE, index_tree, vec![])?;

    repo.stage_tracked_changes(git_run_info, &scratch_index_path)?;
    let workdir_tree = repo.write_tree_from_index_file(&scratch_index_path)?;
    let workdir_commit =
        repo.create_commit(&signature, WORKDIR_COMMIT_MESSAGE, workdir_tree, vec![])?;

    let refs = repo
        .list_refs()?
        .into_iter()
        .filter(|(name, _)| {
            name.as_str() != LEDGER_REF_NAME
                && !matches!(
                    CategorizedReferenceName::new(name),
                    CategorizedReferenceName::RemoteBranch { .. }
                )
        })
        .collect();
    let head = repo.read_head()?;
    let message = infer_snapshot_message(repo)?;

    Ok(Some(Snapshot {
        id: None,
        message,
        refs,
        head,
        index_commit,
        workdir_commit,
        index_tree: Some(index_tree),
        workdir_tree: Some(workdir_tree),
    }))
}

/// Set up the scratch index file from the live index.
///
/// If the host is mid-transaction, the index lock file reflects the
/// committing transaction's intent, while the main index still reflects the
/// pre-transaction state; prefer the lock file in that case.
fn prepare_scratch_index(repo: &Repo, scratch_index_path: &Path) -> eyre::Result<()> {
    let index_lock_path = repo.get_index_lock_path();
    let index_path = repo.get_index_path();
    let source_path = if index_lock_path.exists() {
        Some(index_lock_path)
    } else if index_path.exists() {
        Some(index_path)
    } else {
        None
    };

    match source_path {
        Some(source_path) => {
            std::fs::copy(&source_path, scratch_index_path)?;
        }
        None => {
            // No index yet (freshly initialized repository). Make sure no
            // stale scratch index from an earlier invocation survives.
            if scratch_index_path.exists() {
                std::fs::remove_file(scratch_index_path)?;
            }
        }
    }
    Ok(())
}

/// Produce a best-effort label for the user action being recorded.
///
/// An explicit label can be plumbed through the environment; otherwise we
/// look at the command line of the grandparent process (for a hook-triggered
/// invocation, that is the `git` command the user ran), and fall back to the
/// most recent `HEAD` reflog message. Failure at any step is not an error.
fn infer_snapshot_message(repo: &Repo) -> eyre::Result<String> {
    if let Ok(message) = std::env::var(MESSAGE_ENV_VAR) {
        if !message.trim().is_empty() {
            return Ok(collapse_to_single_line(&message));
        }
    }

    if let Some(command_line) = guess_invoking_command() {
        return Ok(collapse_to_single_line(&command_line));
    }

    match repo.latest_head_reflog_message() {
        Ok(Some(message)) => Ok(collapse_to_single_line(&message)),
        Ok(None) => Ok(String::new()),
        Err(err) => {
            debug!(?err, "Could not read HEAD reflog for snapshot message");
            Ok(String::new())
        }
    }
}

fn collapse_to_single_line(message: &str) -> String {
    message
        .split(['\n', '\r'])
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Read the command line of the grandparent process, if it looks like a `git`
/// invocation. For a hook-triggered recording the process tree is `git` →
/// hook shell → `git-undo`, so the grandparent is the command the user typed.
#[cfg(target_os = "linux")]
fn guess_invoking_command() -> Option<String> {
    fn parent_pid(pid: &str) -> Option<String> {
        let stat = std::fs::read_to_string(format!("/proc/{pid}/stat")).ok()?;
        // The second field (the command name) may contain spaces; fields
        // after the closing parenthesis are space-separated.
        let after_comm = stat.rsplit_once(')')?.1;
        let ppid = after_comm.split_whitespace().nth(1)?;
        Some(ppid.to_owned())
    }

    let ppid = parent_pid("self")?;
    let grandparent_pid = parent_pid(&ppid)?;
    let cmdline = std::fs::read(format!("/proc/{grandparent_pid}/cmdline")).ok()?;
    let args: Vec<String> = cmdline
        .split(|byte| *byte == 0)
        .filter(|arg| !arg.is_empty())
        .map(|arg| String::from_utf8_lossy(arg).into_owned())
        .collect();
    let executable = args.first()?;
    let executable_name = Path::new(executable).file_name()?.to_str()?;
    if executable_name == "git" {
        Some(args.join(" "))
    } else {
        None
    }
}

#[cfg(not(target_os = "linux"))]
fn guess_invoking_command() -> Option<String> {
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::make_git;

    #[test]
    fn test_capture_clean_repo() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;
        let repo = git.get_repo()?;

        let snapshot = capture(&repo, &git.get_git_run_info())?.expect("capture should succeed");
        assert_eq!(snapshot.id, None);
        assert_eq!(
            snapshot.head,
            HeadState::Symbolic(ReferenceName::from("refs/heads/main"))
        );

        let head_oid = repo
            .resolve_reference(&ReferenceName::from("refs/heads/main"))?
            .unwrap();
        assert_eq!(
            snapshot.refs,
            vec![(ReferenceName::from("refs/heads/main"), head_oid)]
        );

        // With a clean working copy, both captured trees equal the HEAD tree.
        let head_tree = repo.find_commit_or_fail(head_oid)?.get_tree_oid();
        assert_eq!(snapshot.index_tree, Some(head_tree));
        assert_eq!(snapshot.workdir_tree, Some(head_tree));
        Ok(())
    }

    #[test]
    fn test_capture_is_deterministic() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;
        let repo = git.get_repo()?;

        let first = capture(&repo, &git.get_git_run_info())?.unwrap();
        let second = capture(&repo, &git.get_git_run_info())?.unwrap();
        assert!(first.is_same_state(&second));
        assert_eq!(first.index_commit, second.index_commit);
        assert_eq!(first.workdir_commit, second.workdir_commit);
        Ok(())
    }

    #[test]
    fn test_capture_staged_and_unstaged_changes() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;
        let repo = git.get_repo()?;

        git.write_file_txt("staged", "staged contents\n")?;
        git.run(&["add", "."])?;
        let snapshot = capture(&repo, &git.get_git_run_info())?.unwrap();
        let head_oid = repo
            .resolve_reference(&ReferenceName::from("refs/heads/main"))?
            .unwrap();
        let head_tree = repo.find_commit_or_fail(head_oid)?.get_tree_oid();
        assert_ne!(snapshot.index_tree, Some(head_tree));
        assert_eq!(snapshot.index_tree, snapshot.workdir_tree);

        // An unstaged modification shows up in the workdir tree only.
        git.write_file_txt("initial", "updated contents\n")?;
        let snapshot = capture(&repo, &git.get_git_run_info())?.unwrap();
        assert_ne!(snapshot.index_tree, snapshot.workdir_tree);
        Ok(())
    }

    #[test]
    fn test_capture_excludes_ledger_ref() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;
        let repo = git.get_repo()?;
        let git_run_info = git.get_git_run_info();

        let mut snapshot = capture(&repo, &git_run_info)?.unwrap();
        crate::core::ledger::save(&repo, &mut snapshot)?;

        let snapshot = capture(&repo, &git_run_info)?.unwrap();
        assert!(snapshot
            .refs
            .iter()
            .all(|(name, _)| name.as_str() != LEDGER_REF_NAME));
        Ok(())
    }

    #[test]
    fn test_capture_skipped_during_rebase() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;
        let repo = git.get_repo()?;

        std::fs::create_dir_all(repo.get_path().join("rebase-merge"))?;
        let snapshot = capture(&repo, &git.get_git_run_info())?;
        assert!(snapshot.is_none());
        Ok(())
    }

    #[test]
    fn test_collapse_to_single_line() {
        assert_eq!(collapse_to_single_line("git commit -m foo"), "git commit -m foo");
        assert_eq!(collapse_to_single_line("first\nsecond\n"), "first second");
        assert_eq!(collapse_to_single_line("  padded \r\n lines "), "padded lines");
    }
}
