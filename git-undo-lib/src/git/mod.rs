//! Tools for interfacing with the Git repository.

mod object;
mod oid;
mod reference;
mod repo;
mod run;

pub use object::Commit;
pub use oid::{MaybeZeroOid, NonZeroOid, ParseOidError};
pub use reference::{CategorizedReferenceName, ReferenceName, ReferenceNameError};
pub use repo::{
    Error as RepoError, FirstParentWalk, HeadState, ReflogEntry, Repo, Result as RepoResult,
    Signature,
};
pub use run::{hooks_path_override, GitRunInfo, GitRunOpts, GitRunResult};
