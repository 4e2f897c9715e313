//! The `undo` subcommand.

use console::style;
use lib::core::restore::{self, UndoOutcome};
use lib::git::{GitRunInfo, Repo};
use lib::util::EyreExitOr;
use tracing::instrument;

use super::restore::print_changes;

/// Walk back to the most recent snapshot which differs from the present state
/// and restore it.
#[instrument(skip(git_run_info))]
pub fn undo(git_run_info: &GitRunInfo) -> EyreExitOr<()> {
    let repo = Repo::from_current_dir()?;

    match restore::undo(&repo, git_run_info)? {
        UndoOutcome::NothingToUndo => {
            println!("Nothing to undo.");
        }
        UndoOutcome::Restored { snapshot, changes } => {
            let id = snapshot
                .id
                .map(|id| id.to_short_string())
                .unwrap_or_else(|| "?".to_owned());
            match snapshot.message.as_str() {
                "" => println!("{} snapshot {id}", style("Restored").green().bold()),
                message => println!(
                    "{} snapshot {id} ({message})",
                    style("Restored").green().bold()
                ),
            }
            print_changes(&repo, &changes)?;
        }
    }
    Ok(Ok(()))
}
