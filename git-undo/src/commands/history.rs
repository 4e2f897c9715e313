//! The `history` subcommand.

use console::style;
use lib::core::ledger;
use lib::git::{HeadState, Repo};
use lib::util::EyreExitOr;
use tracing::instrument;

/// Print the recorded snapshots, newest first.
///
/// This is the plain-text view of the ledger; the interactive browser is a
/// separate frontend built on the same data.
#[instrument]
pub fn history() -> EyreExitOr<()> {
    let repo = Repo::from_current_dir()?;
    let snapshots = ledger::load_all(&repo)?;
    if snapshots.is_empty() {
        println!("No snapshots recorded yet. Run `git-undo init` to install the hooks.");
        return Ok(Ok(()));
    }

    for snapshot in snapshots {
        let id = snapshot
            .id
            .map(|id| id.to_short_string())
            .unwrap_or_else(|| "?".to_owned());
        let head = match &snapshot.head {
            HeadState::Symbolic(name) => name.as_str().to_owned(),
            HeadState::Detached(oid) => format!("detached at {}", oid.to_short_string()),
            HeadState::Absent => "(no HEAD)".to_owned(),
        };
        println!(
            "{} {} {}",
            style(id).yellow(),
            style(head).cyan(),
            snapshot.message
        );
    }
    Ok(Ok(()))
}
