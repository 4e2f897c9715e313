//! The append-only chain of snapshots.
//!
//! Snapshots are stored as commits on a dedicated reference, `refs/git-undo`.
//! The serialized snapshot is the commit message; the commit's tree is the
//! captured working tree (so `git log refs/git-undo` gives a walkable history
//! of working-tree states); and the captured index and working-tree commits
//! are the commit's parents, which keeps their trees alive under the host's
//! reachability rules even though no reference points at them directly.
//!
//! The reference's reflog is the temporal index over the chain, newest first.

use tracing::{instrument, warn};

use crate::core::codec;
use crate::core::snapshot::Snapshot;
use crate::git::{NonZeroOid, ReferenceName, Repo, Signature};

/// The name of the ledger reference.
pub const LEDGER_REF_NAME: &str = "refs/git-undo";

/// The reflog message recorded for each ledger update.
const LEDGER_REFLOG_MESSAGE: &str = "snapshot";

/// The outcome of saving a snapshot to the ledger.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SaveOutcome {
    /// The snapshot was appended to the ledger as a new entry.
    Saved(NonZeroOid),

    /// The snapshot records the same state as the newest ledger entry, so
    /// nothing was written.
    Unchanged(NonZeroOid),
}

impl SaveOutcome {
    /// The OID of the ledger entry recording this snapshot's state, whether
    /// it was just written or already present.
    pub fn id(&self) -> NonZeroOid {
        match self {
            SaveOutcome::Saved(oid) | SaveOutcome::Unchanged(oid) => *oid,
        }
    }
}

/// Append the snapshot to the ledger, unless it records the same state as the
/// newest existing entry. On success, the snapshot's `id` is set to the OID
/// of its ledger commit.
#[instrument]
pub fn save(repo: &Repo, snapshot: &mut Snapshot) -> eyre::Result<SaveOutcome> {
    let ledger_ref = ReferenceName::from(LEDGER_REF_NAME);
    let prior_tip = repo.resolve_reference(&ledger_ref)?;

    if let Some(prior_tip) = prior_tip {
        let prior_commit = repo.find_commit_or_fail(prior_tip)?;
        match codec::parse(&prior_commit.get_message_raw()) {
            Ok(prior_snapshot) => {
                if prior_snapshot.is_same_state(snapshot) {
                    snapshot.id = Some(prior_tip);
                    return Ok(SaveOutcome::Unchanged(prior_tip));
                }
            }
            Err(err) => {
                // A foreign or corrupt tip entry. Don't let it suppress the
                // save.
                warn!(?err, %prior_tip, "Could not parse newest ledger entry");
            }
        }
    }

    let workdir_tree = match snapshot.workdir_tree {
        Some(workdir_tree) => workdir_tree,
        None => repo
            .find_commit_or_fail(snapshot.workdir_commit)?
            .get_tree_oid(),
    };
    let signature = Signature::current()?;
    let commit_oid = repo.create_commit(
        &signature,
        &codec::serialize(snapshot),
        workdir_tree,
        vec![snapshot.index_commit, snapshot.workdir_commit],
    )?;

    if prior_tip.is_none() {
        // Git doesn't maintain reflogs for arbitrary references by default,
        // and the reflog is our temporal index, so create it explicitly
        // before the first update.
        repo.ensure_reflog_exists(&ledger_ref)?;
    }
    repo.write_reference(&ledger_ref, commit_oid, LEDGER_REFLOG_MESSAGE)?;

    snapshot.id = Some(commit_oid);
    Ok(SaveOutcome::Saved(commit_oid))
}

/// Load the snapshot stored at the given ledger commit.
#[instrument]
pub fn load(repo: &Repo, id: NonZeroOid) -> eyre::Result<Snapshot> {
    let commit = repo.find_commit_or_fail(id)?;
    let mut snapshot = codec::parse(&commit.get_message_raw())?;
    snapshot.id = Some(id);
    Ok(snapshot)
}

/// Enumerate all snapshots in the ledger, newest first, by walking the ledger
/// reference's reflog. Entries whose message is not a version-1 snapshot are
/// skipped. Returns an empty list if the ledger has never been written.
#[instrument]
pub fn load_all(repo: &Repo) -> eyre::Result<Vec<Snapshot>> {
    let ledger_ref = ReferenceName::from(LEDGER_REF_NAME);
    if repo.resolve_reference(&ledger_ref)?.is_none() {
        return Ok(Vec::new());
    }

    let mut result = Vec::new();
    for entry in repo.read_reflog(&ledger_ref)? {
        let commit = match repo.find_commit(entry.new_oid) {
            Ok(Some(commit)) => commit,
            Ok(None) => {
                warn!(oid = %entry.new_oid, "Ledger reflog entry points to a missing commit");
                continue;
            }
            Err(err) => return Err(err.into()),
        };
        let message = commit.get_message_raw();
        if !message.starts_with(codec::FORMAT_HEADER) {
            continue;
        }
        let mut snapshot = codec::parse(&message)?;
        snapshot.id = Some(entry.new_oid);
        result.push(snapshot);
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::snapshot::capture;
    use crate::testing::make_git;

    #[test]
    fn test_save_and_load() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;
        let repo = git.get_repo()?;
        let git_run_info = git.get_git_run_info();

        let mut snapshot = capture(&repo, &git_run_info)?.unwrap();
        let outcome = save(&repo, &mut snapshot)?;
        let id = match outcome {
            SaveOutcome::Saved(id) => id,
            other => panic!("expected a fresh save, got {other:?}"),
        };
        assert_eq!(snapshot.id, Some(id));

        let loaded = load(&repo, id)?;
        assert!(loaded.is_same_state(&snapshot));
        assert_eq!(loaded.id, Some(id));
        Ok(())
    }

    #[test]
    fn test_save_dedups_identical_states() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;
        let repo = git.get_repo()?;
        let git_run_info = git.get_git_run_info();

        let mut first = capture(&repo, &git_run_info)?.unwrap();
        let first_outcome = save(&repo, &mut first)?;
        assert!(matches!(first_outcome, SaveOutcome::Saved(_)));

        let mut second = capture(&repo, &git_run_info)?.unwrap();
        let second_outcome = save(&repo, &mut second)?;
        assert_eq!(second_outcome, SaveOutcome::Unchanged(first_outcome.id()));
        assert_eq!(load_all(&repo)?.len(), 1);
        Ok(())
    }

    #[test]
    fn test_load_all_newest_first() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;
        let repo = git.get_repo()?;
        let git_run_info = git.get_git_run_info();

        let mut first = capture(&repo, &git_run_info)?.unwrap();
        save(&repo, &mut first)?;

        git.commit_file("second", 1)?;
        let mut second = capture(&repo, &git_run_info)?.unwrap();
        save(&repo, &mut second)?;

        let snapshots = load_all(&repo)?;
        assert_eq!(snapshots.len(), 2);
        assert_eq!(snapshots[0].id, second.id);
        assert_eq!(snapshots[1].id, first.id);
        Ok(())
    }

    #[test]
    fn test_load_all_skips_foreign_entries() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;
        let repo = git.get_repo()?;
        let git_run_info = git.get_git_run_info();

        let mut snapshot = capture(&repo, &git_run_info)?.unwrap();
        save(&repo, &mut snapshot)?;

        // Simulate a foreign entry by pointing the ledger ref at a commit
        // whose message is not a serialized snapshot.
        let foreign_oid = repo.create_commit(
            &crate::git::Signature::current()?,
            "not a snapshot",
            snapshot.workdir_tree.unwrap(),
            vec![],
        )?;
        repo.write_reference(
            &ReferenceName::from(LEDGER_REF_NAME),
            foreign_oid,
            "snapshot",
        )?;

        let snapshots = load_all(&repo)?;
        assert_eq!(snapshots.len(), 1);
        assert_eq!(snapshots[0].id, snapshot.id);
        Ok(())
    }

    #[test]
    fn test_ledger_commit_structure() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;
        let repo = git.get_repo()?;
        let git_run_info = git.get_git_run_info();

        let mut snapshot = capture(&repo, &git_run_info)?.unwrap();
        let outcome = save(&repo, &mut snapshot)?;

        let ledger_commit = repo.find_commit_or_fail(outcome.id())?;
        assert_eq!(ledger_commit.get_tree_oid(), snapshot.workdir_tree.unwrap());
        assert_eq!(
            ledger_commit.get_parent_oids(),
            vec![snapshot.index_commit, snapshot.workdir_commit]
        );
        Ok(())
    }
}
