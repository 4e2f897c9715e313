//! An undo command for Git.
//!
//! `git-undo` hooks into Git to record a complete snapshot of the
//! repository's mutable state (branches, tags, `HEAD`, the index, and the
//! working tree) after every state-changing operation, and can restore any
//! recorded snapshot later. A botched rebase, an overzealous `git reset
//! --hard`, or a force-deleted branch can all be undone.

mod commands;
mod opts;

fn main() {
    let exit_code = commands::main();
    std::process::exit(exit_code);
}
