//! The command-line options for `git-undo`.

use clap::{Parser, Subcommand};
use lib::core::config::MESSAGE_ENV_VAR;

/// Undo for Git: records a snapshot of the repository state after every
/// operation, and restores any prior snapshot.
#[derive(Debug, Parser)]
#[clap(version, author)]
pub struct Opts {
    /// The subcommand to run.
    #[clap(subcommand)]
    pub command: Command,
}

/// Subcommands of `git-undo`.
#[derive(Debug, Subcommand)]
pub enum Command {
    /// Capture the current repository state and append it to the snapshot
    /// ledger. Invoked by the installed Git hooks; exits successfully even
    /// when there is nothing to record.
    Record {
        /// A label describing the operation being recorded. If not provided,
        /// one is inferred from the invoking command or the reflog.
        #[clap(short = 'm', long = "message", env = MESSAGE_ENV_VAR)]
        message: Option<String>,
    },

    /// Restore the repository to a previously recorded snapshot.
    Restore {
        /// The ID of the snapshot to restore, as shown by `git-undo history`.
        snapshot_id: String,
    },

    /// Restore the most recent snapshot whose branches, tags, or HEAD differ
    /// from the present state.
    Undo,

    /// List the recorded snapshots, newest first.
    History,

    /// Install the Git hooks which record snapshots into the current
    /// repository.
    Init {
        /// Remove the installed hooks instead.
        #[clap(long = "uninstall")]
        uninstall: bool,
    },
}
