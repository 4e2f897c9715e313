//! The `record` subcommand, invoked by the installed Git hooks after every
//! state-changing operation.

use lib::core::config::MESSAGE_ENV_VAR;
use lib::core::ledger::{self, SaveOutcome};
use lib::core::lock::SnapshotLock;
use lib::core::snapshot::capture;
use lib::git::{GitRunInfo, Repo};
use lib::util::EyreExitOr;
use tracing::{debug, instrument, warn};

/// Capture the current repository state and append it to the ledger.
///
/// Hooks must never block the user's workflow, so every condition short of
/// failing to open the repository exits successfully: a contended lock or an
/// in-progress rebase skips the recording, and capture or save failures are
/// demoted to log lines.
#[instrument(skip(git_run_info))]
pub fn record(git_run_info: &GitRunInfo, message: Option<String>) -> EyreExitOr<()> {
    let repo = Repo::from_current_dir()?;

    if let Some(message) = message {
        // `capture` reads the label from the environment, so that hook stubs
        // can plumb one through without threading it down the call stack.
        std::env::set_var(MESSAGE_ENV_VAR, message);
    }

    let _lock = match SnapshotLock::try_acquire(&repo)? {
        Some(lock) => lock,
        None => {
            debug!("Another invocation is recording a snapshot; nothing to do");
            return Ok(Ok(()));
        }
    };

    let mut snapshot = match capture(&repo, git_run_info) {
        Ok(Some(snapshot)) => snapshot,
        Ok(None) => {
            debug!("Rebase in progress; not recording a snapshot");
            return Ok(Ok(()));
        }
        Err(err) => {
            warn!(?err, "Could not capture snapshot");
            return Ok(Ok(()));
        }
    };

    match ledger::save(&repo, &mut snapshot) {
        Ok(SaveOutcome::Saved(oid)) => {
            debug!(%oid, "Recorded snapshot");
        }
        Ok(SaveOutcome::Unchanged(oid)) => {
            debug!(%oid, "Repository state unchanged since last snapshot");
        }
        Err(err) => {
            warn!(?err, "Could not save snapshot");
        }
    }
    Ok(Ok(()))
}
