//! The advisory lock which keeps overlapping hook invocations from
//! interleaving.
//!
//! Git fires several hooks for a single user action (e.g. `pre-commit`,
//! `reference-transaction`, and `post-commit` for one `git commit`), and some
//! of them can overlap in wall-clock time. Each invocation of the snapshot
//! engine takes this lock before touching the ledger; if the lock is already
//! held, another invocation is recording the same or a newer state, so the
//! contended invocation simply exits successfully.

use fslock::LockFile;
use tracing::instrument;

use crate::git::Repo;

/// Guard for the per-repository snapshot lock. The lock is released when the
/// guard is dropped, including on panic or error.
pub struct SnapshotLock {
    _lock_file: LockFile,
}

impl std::fmt::Debug for SnapshotLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<SnapshotLock>")
    }
}

impl SnapshotLock {
    /// Try to acquire the snapshot lock for the given repository. Returns
    /// `None` if the lock is currently held by another process.
    #[instrument]
    pub fn try_acquire(repo: &Repo) -> eyre::Result<Option<Self>> {
        let lock_path = repo.get_snapshot_lock_path();
        let mut lock_file = LockFile::open(&lock_path)?;
        if !lock_file.try_lock_with_pid()? {
            return Ok(None);
        }
        Ok(Some(SnapshotLock {
            _lock_file: lock_file,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::make_git;

    #[test]
    fn test_lock_is_exclusive() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;
        let repo = git.get_repo()?;

        let guard = SnapshotLock::try_acquire(&repo)?;
        assert!(guard.is_some());

        let contended = SnapshotLock::try_acquire(&repo)?;
        assert!(contended.is_none());

        drop(guard);
        let reacquired = SnapshotLock::try_acquire(&repo)?;
        assert!(reacquired.is_some());
        Ok(())
    }
}
