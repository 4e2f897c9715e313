//! The `restore` subcommand.

use console::style;
use eyre::Context;
use lib::core::diff::{compare, ChangeSet};
use lib::core::ledger;
use lib::core::restore::{self, RestoreOutcome};
use lib::git::{CategorizedReferenceName, GitRunInfo, HeadState, NonZeroOid, Repo};
use lib::util::EyreExitOr;
use tracing::instrument;

fn render_head(head: &HeadState) -> String {
    match head {
        HeadState::Symbolic(name) => name.as_str().to_owned(),
        HeadState::Detached(oid) => oid.to_short_string(),
        HeadState::Absent => "(none)".to_owned(),
    }
}

/// Describe the applied changes to the user, one line per reference.
pub(super) fn print_changes(repo: &Repo, changes: &ChangeSet) -> eyre::Result<()> {
    for (name, delta) in &changes.refs {
        let description = CategorizedReferenceName::new(name).friendly_describe();
        match (delta.target, delta.current) {
            (Some(target), Some(current)) => {
                println!("{description}: {}", compare(repo, target, current)?);
            }
            (Some(target), None) => {
                println!("{description}: restored at {}", target.to_short_string());
            }
            (None, Some(_)) => {
                println!("{description}: deleted");
            }
            (None, None) => {}
        }
    }
    if let Some((target, _current)) = &changes.head {
        println!("HEAD: now at {}", render_head(target));
    }
    Ok(())
}

/// Restore the repository to the snapshot with the given ID.
#[instrument(skip(git_run_info))]
pub fn restore(git_run_info: &GitRunInfo, snapshot_id: &str) -> EyreExitOr<()> {
    let repo = Repo::from_current_dir()?;
    let oid: NonZeroOid = snapshot_id
        .parse()
        .wrap_err_with(|| format!("Invalid snapshot ID: {snapshot_id}"))?;
    let snapshot = ledger::load(&repo, oid)
        .wrap_err_with(|| format!("Loading snapshot {snapshot_id}"))?;

    match restore::restore(&repo, git_run_info, &snapshot)? {
        RestoreOutcome::AlreadyCurrent => {
            println!(
                "Snapshot {} already matches the present state; nothing to restore.",
                oid.to_short_string()
            );
        }
        RestoreOutcome::Restored { changes } => {
            println!(
                "{} snapshot {}",
                style("Restored").green().bold(),
                oid.to_short_string()
            );
            print_changes(&repo, &changes)?;
        }
    }
    Ok(Ok(()))
}
