//! Sub-commands of `git-undo`.

mod history;
mod init;
mod record;
mod restore;
mod undo;

use clap::Parser;
use eyre::Context;
use lib::core::config::env_vars::get_path_to_git;
use lib::git::GitRunInfo;
use lib::util::ExitCode;
use tracing::level_filters::LevelFilter;
use tracing_error::ErrorLayer;
use tracing_subscriber::fmt as tracing_fmt;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use crate::opts::{Command, Opts};

fn install_tracing() -> eyre::Result<()> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .parse(
            std::env::var(EnvFilter::DEFAULT_ENV)
                // Limit to first-party logs by default, in case third-party
                // packages log spuriously.
                .unwrap_or_else(|_| "git_undo=warn".to_string()),
        )?;
    let fmt_layer = tracing_fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(ErrorLayer::default())
        .with(fmt_layer.with_filter(env_filter))
        .try_init()?;
    Ok(())
}

/// Wrapper function for `main` to ensure that `Drop` is called for local
/// variables, since `std::process::exit` will skip them.
fn do_main_and_drop_locals() -> eyre::Result<i32> {
    let Opts { command } = Opts::parse();

    install_tracing()?;

    let git_run_info = GitRunInfo {
        path_to_git: get_path_to_git(),
        working_directory: std::env::current_dir().wrap_err("Getting working directory")?,
        env: std::env::vars_os().collect(),
    };

    let result = match command {
        Command::Record { message } => record::record(&git_run_info, message)?,
        Command::Restore { snapshot_id } => restore::restore(&git_run_info, &snapshot_id)?,
        Command::Undo => undo::undo(&git_run_info)?,
        Command::History => history::history()?,
        Command::Init { uninstall: false } => init::init()?,
        Command::Init { uninstall: true } => init::uninstall()?,
    };
    let exit_code = match result {
        Ok(()) => 0,
        Err(ExitCode(exit_code)) => exit_code.try_into().unwrap_or(1),
    };
    Ok(exit_code)
}

/// Main entry point for the `git-undo` executable.
pub fn main() -> i32 {
    // Install panic handler.
    color_eyre::install().expect("Could not install panic handler");
    match do_main_and_drop_locals() {
        Ok(exit_code) => exit_code,
        Err(err) => {
            eprintln!("git-undo: {err:#}");
            1
        }
    }
}
