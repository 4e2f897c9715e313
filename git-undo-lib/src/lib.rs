//! Core functionality for git-undo.
//!
//! `git-undo` records a snapshot of a Git repository's mutable state (local
//! references, `HEAD`, the index, and the working tree) after every
//! state-changing user action, and can restore any previously recorded
//! snapshot. This crate contains the snapshot engine; the `git-undo` binary
//! crate provides the command-line interface and hook entry points.

#![warn(missing_docs)]
#![warn(
    clippy::all,
    clippy::as_conversions,
    clippy::clone_on_ref_ptr,
    clippy::dbg_macro
)]
#![allow(clippy::too_many_arguments, clippy::blocks_in_conditions)]

pub mod core;
pub mod git;
pub mod testing;
pub mod util;
