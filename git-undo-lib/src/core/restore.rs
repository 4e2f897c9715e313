//! Application of a target snapshot to the live repository.

use tracing::{instrument, warn};

use crate::core::diff::{diff, ChangeSet};
use crate::core::ledger;
use crate::core::snapshot::{capture, Snapshot};
use crate::git::{CategorizedReferenceName, GitRunInfo, HeadState, Repo};

/// The result of [`restore`].
#[derive(Debug)]
pub enum RestoreOutcome {
    /// The target snapshot already describes the present state; nothing was
    /// done.
    AlreadyCurrent,

    /// The target snapshot was applied. The pre-restore state was saved to
    /// the ledger first, so the restore itself can be undone.
    Restored {
        /// The changes which were applied.
        changes: ChangeSet,
    },
}

/// The result of [`undo`].
#[derive(Debug)]
pub enum UndoOutcome {
    /// No ledger entry differs from the present state; there is nothing to
    /// undo.
    NothingToUndo,

    /// The given snapshot was restored.
    Restored {
        /// The snapshot which was restored.
        snapshot: Snapshot,

        /// The changes which were applied.
        changes: ChangeSet,
    },
}

/// Restore the repository to the state recorded in the target snapshot.
///
/// The working tree and index are restored first; if that fails (e.g. because
/// a file could not be overwritten), the operation aborts before any
/// reference or `HEAD` has been touched. The pre-restore state is saved to
/// the ledger before anything is modified, so a restore is always reversible
/// with `undo`.
#[instrument(skip(git_run_info))]
pub fn restore(
    repo: &Repo,
    git_run_info: &GitRunInfo,
    target: &Snapshot,
) -> eyre::Result<RestoreOutcome> {
    let mut current = match capture(repo, git_run_info)? {
        Some(current) => current,
        None => eyre::bail!("cannot restore while a rebase is in progress"),
    };

    let changes = diff(&current, target);
    if changes.is_empty() {
        return Ok(RestoreOutcome::AlreadyCurrent);
    }

    ledger::save(repo, &mut current)?;

    let log_message = match target.id {
        Some(id) => format!("git-undo: restored snapshot {id}"),
        None => "git-undo: restored snapshot".to_owned(),
    };

    repo.restore_worktree(git_run_info, target.workdir_commit)?;
    repo.restore_index(git_run_info, target.index_commit)?;

    for (name, oid) in &target.refs {
        if !repo.has_object(*oid) {
            warn!(
                name = %name,
                oid = %oid,
                "Snapshot ref target no longer exists in the object store; skipping"
            );
            continue;
        }
        repo.write_reference(name, *oid, &log_message)?;
    }

    let target_ref_names: Vec<_> = target.refs.iter().map(|(name, _)| name).collect();
    for (name, _) in repo.list_refs()? {
        if !CategorizedReferenceName::new(&name).is_local_branch_or_tag() {
            continue;
        }
        if !target_ref_names.contains(&&name) {
            repo.delete_reference(&name)?;
        }
    }

    match &target.head {
        HeadState::Symbolic(name) => repo.set_head_symbolic(name, &log_message)?,
        HeadState::Detached(oid) => repo.set_head_detached(*oid)?,
        HeadState::Absent => {}
    }

    Ok(RestoreOutcome::Restored { changes })
}

/// Walk the ledger back to the most recent snapshot whose references or
/// `HEAD` differ from the present state, and restore it.
#[instrument(skip(git_run_info))]
pub fn undo(repo: &Repo, git_run_info: &GitRunInfo) -> eyre::Result<UndoOutcome> {
    let mut current = match capture(repo, git_run_info)? {
        Some(current) => current,
        None => eyre::bail!("cannot undo while a rebase is in progress"),
    };
    ledger::save(repo, &mut current)?;

    for snapshot in ledger::load_all(repo)? {
        let changes = diff(&current, &snapshot);
        if !changes.changes_refs_or_head() {
            continue;
        }
        return match restore(repo, git_run_info, &snapshot)? {
            RestoreOutcome::Restored { changes } => Ok(UndoOutcome::Restored { snapshot, changes }),
            RestoreOutcome::AlreadyCurrent => Ok(UndoOutcome::NothingToUndo),
        };
    }
    Ok(UndoOutcome::NothingToUndo)
}
