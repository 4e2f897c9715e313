//! Install the Git hooks which record snapshots.

use std::path::{Path, PathBuf};

use eyre::Context;
use itertools::Itertools;
use lib::core::config::get_core_hooks_path;
use lib::git::Repo;
use lib::util::EyreExitOr;
use tracing::{instrument, warn};

/// A hook which records a snapshot after the triggering operation.
const RECORD_HOOK_SCRIPT: &str = r#"
DIR="$(git rev-parse --show-toplevel)" || exit
cd "$DIR" || exit
git-undo record || echo "git-undo: failed to record snapshot"
"#;

/// The `reference-transaction` hook fires for every phase of every reference
/// update; only the commit phase reflects a state the user actually reached.
const REFERENCE_TRANSACTION_HOOK_SCRIPT: &str = r#"
if [ "$1" = "committed" ]; then
    DIR="$(git rev-parse --show-toplevel)" || exit
    cd "$DIR" || exit
    git-undo record || echo "git-undo: failed to record snapshot"
fi
"#;

/// The contents of all Git hooks to install.
pub const ALL_HOOKS: &[(&str, &str)] = &[
    ("post-applypatch", RECORD_HOOK_SCRIPT),
    ("post-checkout", RECORD_HOOK_SCRIPT),
    ("pre-commit", RECORD_HOOK_SCRIPT),
    ("post-commit", RECORD_HOOK_SCRIPT),
    ("post-merge", RECORD_HOOK_SCRIPT),
    ("post-rewrite", RECORD_HOOK_SCRIPT),
    ("pre-auto-gc", RECORD_HOOK_SCRIPT),
    ("post-index-change", RECORD_HOOK_SCRIPT),
    ("reference-transaction", REFERENCE_TRANSACTION_HOOK_SCRIPT),
];

const SHEBANG: &str = "#!/bin/sh";
const UPDATE_MARKER_START: &str = "## START GIT-UNDO CONFIG";
const UPDATE_MARKER_END: &str = "## END GIT-UNDO CONFIG";

fn append_hook(new_lines: &mut String, hook_contents: &str) {
    new_lines.push_str(UPDATE_MARKER_START);
    new_lines.push('\n');
    new_lines.push_str(hook_contents);
    new_lines.push_str(UPDATE_MARKER_END);
    new_lines.push('\n');
}

fn update_between_lines(lines: &str, updated_lines: &str) -> String {
    let mut new_lines = String::new();
    let mut found_marker = false;
    let mut is_ignoring_lines = false;
    for line in lines.lines() {
        if line == UPDATE_MARKER_START {
            found_marker = true;
            is_ignoring_lines = true;
            append_hook(&mut new_lines, updated_lines);
        } else if line == UPDATE_MARKER_END {
            is_ignoring_lines = false;
        } else if !is_ignoring_lines {
            new_lines.push_str(line);
            new_lines.push('\n');
        }
    }
    if is_ignoring_lines {
        warn!("Unterminated git-undo config comment in hook");
    } else if !found_marker {
        append_hook(&mut new_lines, updated_lines);
    }
    new_lines
}

#[instrument]
fn write_script(path: &Path, contents: &str) -> eyre::Result<()> {
    let script_dir = path
        .parent()
        .ok_or_else(|| eyre::eyre!("No parent for dir {:?}", path))?;
    std::fs::create_dir_all(script_dir).wrap_err("Creating script dir")?;

    std::fs::write(path, contents).wrap_err("Writing script contents")?;

    // Setting the hook file as executable is only supported on Unix systems.
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let metadata = std::fs::metadata(path).wrap_err("Reading script permissions")?;
        let mut permissions = metadata.permissions();
        let mode = permissions.mode();
        // Set execute bits.
        let mode = mode | 0o111;
        permissions.set_mode(mode);
        std::fs::set_permissions(path, permissions)
            .wrap_err_with(|| format!("Marking {path:?} as executable"))?;
    }

    Ok(())
}

#[instrument]
fn update_hook_contents(hook_path: &PathBuf, hook_contents: &str) -> eyre::Result<()> {
    let hook_contents = match std::fs::read_to_string(hook_path) {
        Ok(lines) => update_between_lines(&lines, hook_contents),
        Err(ref err) if err.kind() == std::io::ErrorKind::NotFound => {
            format!("{SHEBANG}\n{UPDATE_MARKER_START}\n{hook_contents}{UPDATE_MARKER_END}\n")
        }
        Err(other) => {
            return Err(eyre::eyre!(other));
        }
    };

    write_script(hook_path, &hook_contents).wrap_err("Writing hook script")?;
    Ok(())
}

#[instrument]
fn install_hook(hooks_dir: &Path, hook_type: &str, hook_script: &str) -> eyre::Result<()> {
    let hook_path = hooks_dir.join(hook_type);
    update_hook_contents(&hook_path, hook_script)?;
    Ok(())
}

/// Install all snapshot hooks into the current repository.
#[instrument]
pub fn init() -> EyreExitOr<()> {
    let repo = Repo::from_current_dir()?;
    println!(
        "Installing hooks: {}",
        ALL_HOOKS
            .iter()
            .map(|(hook_type, _hook_script)| hook_type)
            .join(", ")
    );
    let hooks_dir = get_core_hooks_path(&repo)?;
    for (hook_type, hook_script) in ALL_HOOKS {
        install_hook(&hooks_dir, hook_type, hook_script)?;
    }
    Ok(Ok(()))
}

/// Remove the installed snapshot hooks from the current repository.
#[instrument]
pub fn uninstall() -> EyreExitOr<()> {
    let repo = Repo::from_current_dir()?;
    println!(
        "Uninstalling hooks: {}",
        ALL_HOOKS
            .iter()
            .map(|(hook_type, _hook_script)| hook_type)
            .join(", ")
    );
    let hooks_dir = get_core_hooks_path(&repo)?;
    for (hook_type, _hook_script) in ALL_HOOKS {
        install_hook(
            &hooks_dir,
            hook_type,
            r#"
# This hook has been uninstalled.
# Run `git-undo init` to reinstall.
"#,
        )?;
    }
    Ok(Ok(()))
}
