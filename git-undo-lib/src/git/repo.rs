//! Operations on the Git repository. This module exists for a few reasons:
//!
//! - To ensure that every call to a Git operation has an associated error
//!   variant, instead of propagating raw `git2::Error`s.
//! - To improve the interface in some cases. In particular, some operations in
//!   `git2` return an `Error` with code `ENOTFOUND`, but we should really
//!   return an `Option` in those cases.
//! - To make it possible to audit all the Git operations carried out by the
//!   snapshot engine, since they have to interact carefully with a repository
//!   that the user may be mutating at the same time.

use std::io;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use thiserror::Error;
use tracing::instrument;

use crate::git::object::Commit;
use crate::git::oid::{make_non_zero_oid, NonZeroOid};
use crate::git::reference::{ReferenceName, ReferenceNameError};
use crate::git::run::{GitRunInfo, GitRunOpts};

/// The identity used for all commits created by the snapshot engine. The
/// helper commits wrapping captured trees additionally use the Unix epoch as
/// their timestamp, so that capturing the same state twice produces the same
/// commit OIDs.
const SNAPSHOT_SIGNATURE_NAME: &str = "git-undo";
const SNAPSHOT_SIGNATURE_EMAIL: &str = "git-undo@localhost";

#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum Error {
    #[error("could not open repository: {0}")]
    OpenRepo(#[source] git2::Error),

    #[error("could not read config: {0}")]
    ReadConfig(#[source] git2::Error),

    #[error("could not read reference information: {0}")]
    ReadReference(#[source] git2::Error),

    #[error("could not find reference '{}': {source}", name.as_str())]
    FindReference {
        source: git2::Error,
        name: ReferenceName,
    },

    #[error("could not create reference '{}': {source}", name.as_str())]
    CreateReference {
        source: git2::Error,
        name: ReferenceName,
    },

    #[error("could not delete reference '{}': {source}", name.as_str())]
    DeleteReference {
        source: git2::Error,
        name: ReferenceName,
    },

    #[error("could not set HEAD to {target}: {source}")]
    SetHead {
        source: git2::Error,
        target: String,
    },

    #[error("could not calculate merge-base between {lhs} and {rhs}: {source}")]
    FindMergeBase {
        source: git2::Error,
        lhs: NonZeroOid,
        rhs: NonZeroOid,
    },

    #[error("could not find commit {oid}: {source}")]
    FindCommit {
        source: git2::Error,
        oid: NonZeroOid,
    },

    #[error("could not find tree {oid}: {source}")]
    FindTree {
        source: git2::Error,
        oid: NonZeroOid,
    },

    #[error("could not create commit: {0}")]
    CreateCommit(#[source] git2::Error),

    #[error("could not create commit signature: {0}")]
    CreateSignature(#[source] git2::Error),

    #[error("could not open index file at {path}: {source}")]
    OpenIndex {
        source: git2::Error,
        path: PathBuf,
    },

    #[error("could not write index as tree: {0}")]
    WriteIndexToTree(#[source] git2::Error),

    #[error("could not read reflog for '{}': {source}", name.as_str())]
    ReadReflog {
        source: git2::Error,
        name: ReferenceName,
    },

    #[error("could not create reflog for '{}': {source}", name.as_str())]
    CreateReflog {
        source: io::Error,
        name: ReferenceName,
    },

    #[error("could not decode UTF-8 value for reference name: {0}")]
    DecodeReferenceName(#[from] ReferenceNameError),

    #[error("could not execute git: {0}")]
    ExecGit(#[source] eyre::Error),

    #[error(transparent)]
    Git(git2::Error),

    #[error(transparent)]
    Io(io::Error),
}

/// Result type.
pub type Result<T> = std::result::Result<T, Error>;

/// The current value of the `HEAD` reference, read without resolving it.
///
/// `HEAD` is typically a symbolic reference pointing to a branch. It can also
/// point directly to a commit ("detached"), or not exist at all (a repository
/// which has never had `HEAD` written, which is unusual but possible).
///
/// Note that `Symbolic` covers the "unborn branch" case: in a freshly
/// initialized repository, `HEAD` points at a branch which doesn't exist yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HeadState {
    /// `HEAD` is a symbolic reference to the given reference name.
    Symbolic(ReferenceName),

    /// `HEAD` points directly to a commit.
    Detached(NonZeroOid),

    /// The repository has no `HEAD` reference.
    Absent,
}

/// A commit signature.
pub struct Signature<'a> {
    pub(super) inner: git2::Signature<'a>,
}

impl std::fmt::Debug for Signature<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Signature name={:?}>", self.inner.name())
    }
}

impl Signature<'static> {
    /// Get the fixed signature used for the helper commits which wrap captured
    /// trees. The timestamp is pinned to the Unix epoch so that equal trees
    /// yield equal commit OIDs.
    #[instrument]
    pub fn automated() -> Result<Self> {
        let signature = git2::Signature::new(
            SNAPSHOT_SIGNATURE_NAME,
            SNAPSHOT_SIGNATURE_EMAIL,
            &git2::Time::new(0, 0),
        )
        .map_err(Error::CreateSignature)?;
        Ok(Signature { inner: signature })
    }

    /// Get the system signature with the current time, used for ledger
    /// commits, whose timestamps carry meaning for the user.
    #[instrument]
    pub fn current() -> Result<Self> {
        let signature = git2::Signature::now(SNAPSHOT_SIGNATURE_NAME, SNAPSHOT_SIGNATURE_EMAIL)
            .map_err(Error::CreateSignature)?;
        Ok(Signature { inner: signature })
    }
}

/// An entry read back from a reference's reflog.
#[derive(Clone, Debug)]
pub struct ReflogEntry {
    /// The value of the reference after the update which this entry records.
    pub new_oid: NonZeroOid,

    /// The reflog message attached to the update, if any.
    pub message: Option<String>,
}

/// Wrapper around `git2::Repository`.
pub struct Repo {
    pub(super) inner: git2::Repository,
}

impl std::fmt::Debug for Repo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "<Git repository at: {:?}>", self.get_path())
    }
}

impl Repo {
    /// Get the Git repository associated with the given directory.
    #[instrument]
    pub fn from_dir(path: &Path) -> Result<Self> {
        let repo = git2::Repository::discover(path).map_err(Error::OpenRepo)?;
        Ok(Repo { inner: repo })
    }

    /// Get the Git repository associated with the current directory.
    #[instrument]
    pub fn from_current_dir() -> Result<Self> {
        let path = std::env::current_dir().map_err(Error::Io)?;
        Repo::from_dir(&path)
    }

    /// Get the path to the `.git` directory for the repository.
    pub fn get_path(&self) -> &Path {
        self.inner.path()
    }

    /// Get the path to the working copy for this repository. If the repository
    /// is bare (has no working copy), returns `None`.
    pub fn get_working_copy_path(&self) -> Option<PathBuf> {
        self.inner.workdir().map(|path| path.to_owned())
    }

    /// Get the configuration object for the repository. This object should
    /// only be used for read operations.
    pub fn get_readonly_config(&self) -> Result<git2::Config> {
        self.inner.config().map_err(Error::ReadConfig)
    }

    /// Get the path to the live index file for this repository.
    pub fn get_index_path(&self) -> PathBuf {
        self.get_path().join("index")
    }

    /// Get the path to the lock file which the host holds while it rewrites
    /// the index as part of a transaction.
    pub fn get_index_lock_path(&self) -> PathBuf {
        self.get_path().join("index.lock")
    }

    /// Get the path to the private scratch index used during capture.
    pub fn get_scratch_index_path(&self) -> PathBuf {
        self.get_path().join("undo-index")
    }

    /// Get the path to the advisory lock which serializes snapshot
    /// invocations.
    pub fn get_snapshot_lock_path(&self) -> PathBuf {
        self.get_path().join("git-undo.lock")
    }

    /// Get the path to the reflog file for the given reference.
    pub fn get_reflog_path(&self, reference_name: &ReferenceName) -> PathBuf {
        self.get_path().join("logs").join(reference_name.as_str())
    }

    /// Enumerate all references in the repository (everything under `refs/`),
    /// in a stable name order, along with the objects they point to. Symbolic
    /// references are resolved to their targets; broken references are
    /// skipped.
    #[instrument]
    pub fn list_refs(&self) -> Result<Vec<(ReferenceName, NonZeroOid)>> {
        let mut result = Vec::new();
        for reference in self.inner.references().map_err(Error::ReadReference)? {
            let reference = reference.map_err(Error::ReadReference)?;
            let name = ReferenceName::from_bytes(reference.name_bytes().to_vec())?;
            let oid = match reference.kind() {
                Some(git2::ReferenceType::Direct) => reference.target(),
                Some(git2::ReferenceType::Symbolic) | None => {
                    match reference.resolve() {
                        Ok(resolved) => resolved.target(),
                        Err(_) => None,
                    }
                }
            };
            if let Some(oid) = oid {
                result.push((name, make_non_zero_oid(oid)));
            }
        }
        result.sort();
        Ok(result)
    }

    /// Read the current state of `HEAD`, without resolving it through to a
    /// commit.
    #[instrument]
    pub fn read_head(&self) -> Result<HeadState> {
        let head = match self.inner.find_reference("HEAD") {
            Ok(head) => head,
            Err(err) if err.code() == git2::ErrorCode::NotFound => return Ok(HeadState::Absent),
            Err(err) => {
                return Err(Error::FindReference {
                    source: err,
                    name: ReferenceName::from("HEAD"),
                })
            }
        };
        match head.kind() {
            Some(git2::ReferenceType::Symbolic) => {
                let target = head
                    .symbolic_target_bytes()
                    .expect("symbolic reference with no symbolic target");
                let name = ReferenceName::from_bytes(target.to_vec())?;
                Ok(HeadState::Symbolic(name))
            }
            Some(git2::ReferenceType::Direct) => {
                let oid = head
                    .target()
                    .expect("direct reference with no direct target");
                Ok(HeadState::Detached(make_non_zero_oid(oid)))
            }
            None => Ok(HeadState::Absent),
        }
    }

    /// Look up the object which the given reference points to. Returns `None`
    /// if the reference does not exist.
    #[instrument]
    pub fn resolve_reference(&self, name: &ReferenceName) -> Result<Option<NonZeroOid>> {
        match self.inner.find_reference(name.as_str()) {
            Ok(reference) => match reference.resolve() {
                Ok(resolved) => Ok(resolved.target().map(make_non_zero_oid)),
                Err(_) => Ok(None),
            },
            Err(err) if err.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(err) => Err(Error::FindReference {
                source: err,
                name: name.clone(),
            }),
        }
    }

    /// Create the given reference, or overwrite it if it already exists.
    #[instrument]
    pub fn write_reference(
        &self,
        name: &ReferenceName,
        oid: NonZeroOid,
        log_message: &str,
    ) -> Result<()> {
        self.inner
            .reference(name.as_str(), oid.inner, true, log_message)
            .map_err(|err| Error::CreateReference {
                source: err,
                name: name.clone(),
            })?;
        Ok(())
    }

    /// Delete the given reference. Does nothing if the reference does not
    /// exist.
    #[instrument]
    pub fn delete_reference(&self, name: &ReferenceName) -> Result<()> {
        match self.inner.find_reference(name.as_str()) {
            Ok(mut reference) => reference.delete().map_err(|err| Error::DeleteReference {
                source: err,
                name: name.clone(),
            }),
            Err(err) if err.code() == git2::ErrorCode::NotFound => Ok(()),
            Err(err) => Err(Error::FindReference {
                source: err,
                name: name.clone(),
            }),
        }
    }

    /// Make `HEAD` a symbolic reference to the given reference name. The
    /// pointed-to branch does not have to exist yet.
    #[instrument]
    pub fn set_head_symbolic(&self, name: &ReferenceName, log_message: &str) -> Result<()> {
        self.inner
            .reference_symbolic("HEAD", name.as_str(), true, log_message)
            .map_err(|err| Error::SetHead {
                source: err,
                target: name.as_str().to_owned(),
            })?;
        Ok(())
    }

    /// Detach `HEAD` by making it point directly to the provided commit. Does
    /// not touch the working copy.
    #[instrument]
    pub fn set_head_detached(&self, oid: NonZeroOid) -> Result<()> {
        self.inner
            .set_head_detached(oid.inner)
            .map_err(|err| Error::SetHead {
                source: err,
                target: oid.to_string(),
            })?;
        Ok(())
    }

    /// Find the merge-base between two commits. Returns `None` if a merge-base
    /// could not be found.
    #[instrument]
    pub fn find_merge_base(&self, lhs: NonZeroOid, rhs: NonZeroOid) -> Result<Option<NonZeroOid>> {
        match self.inner.merge_base(lhs.inner, rhs.inner) {
            Ok(merge_base_oid) => Ok(Some(make_non_zero_oid(merge_base_oid))),
            Err(err) if err.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(err) => Err(Error::FindMergeBase {
                source: err,
                lhs,
                rhs,
            }),
        }
    }

    /// Determine whether an object with the given OID exists in the object
    /// store.
    #[instrument]
    pub fn has_object(&self, oid: NonZeroOid) -> bool {
        self.inner.find_object(oid.inner, None).is_ok()
    }

    /// Look up a commit with the given OID. Returns `None` if not found.
    #[instrument]
    pub fn find_commit(&self, oid: NonZeroOid) -> Result<Option<Commit<'_>>> {
        match self.inner.find_commit(oid.inner) {
            Ok(commit) => Ok(Some(Commit { inner: commit })),
            Err(err) if err.code() == git2::ErrorCode::NotFound => Ok(None),
            Err(err) => Err(Error::FindCommit { source: err, oid }),
        }
    }

    /// Like `find_commit`, but raises a generic error if the commit could not
    /// be found.
    #[instrument]
    pub fn find_commit_or_fail(&self, oid: NonZeroOid) -> Result<Commit<'_>> {
        match self.inner.find_commit(oid.inner) {
            Ok(commit) => Ok(Commit { inner: commit }),
            Err(err) => Err(Error::FindCommit { source: err, oid }),
        }
    }

    /// Create a new commit wrapping the given tree, without updating any
    /// reference to point to it. `parents` may be empty.
    #[instrument]
    pub fn create_commit(
        &self,
        signature: &Signature,
        message: &str,
        tree_oid: NonZeroOid,
        parents: Vec<NonZeroOid>,
    ) -> Result<NonZeroOid> {
        let tree = self
            .inner
            .find_tree(tree_oid.inner)
            .map_err(|err| Error::FindTree {
                source: err,
                oid: tree_oid,
            })?;
        let parent_commits: Vec<_> = parents
            .into_iter()
            .map(|oid| self.find_commit_or_fail(oid))
            .try_collect()?;
        let parent_commits = parent_commits
            .iter()
            .map(|commit| &commit.inner)
            .collect_vec();
        let oid = self
            .inner
            .commit(
                None,
                &signature.inner,
                &signature.inner,
                message,
                &tree,
                parent_commits.as_slice(),
            )
            .map_err(Error::CreateCommit)?;
        Ok(make_non_zero_oid(oid))
    }

    /// Write the contents of the index file at the given path as a tree into
    /// the repository's object database. The index must not contain any merge
    /// conflict entries. A missing or empty index file produces the empty
    /// tree.
    #[instrument]
    pub fn write_tree_from_index_file(&self, index_path: &Path) -> Result<NonZeroOid> {
        let mut index = git2::Index::open(index_path).map_err(|err| Error::OpenIndex {
            source: err,
            path: index_path.to_path_buf(),
        })?;
        let tree_oid = index
            .write_tree_to(&self.inner)
            .map_err(Error::WriteIndexToTree)?;
        Ok(make_non_zero_oid(tree_oid))
    }

    /// Stage every change to a tracked file (the equivalent of `git add
    /// --update`) into the index file at the given path. This shells out to
    /// Git with hooks disabled, since `git2` has no way to run the equivalent
    /// operation against a scratch index.
    #[instrument(skip(git_run_info))]
    pub fn stage_tracked_changes(
        &self,
        git_run_info: &GitRunInfo,
        index_path: &Path,
    ) -> Result<()> {
        git_run_info
            .run_hookless(
                self,
                &["add", "--update"],
                GitRunOpts {
                    extra_env: vec![(
                        "GIT_INDEX_FILE".into(),
                        index_path.as_os_str().to_owned(),
                    )],
                    ..Default::default()
                },
            )
            .map_err(Error::ExecGit)?;
        Ok(())
    }

    /// Make the working tree and the index match the tree named by `oid`
    /// (which may be a commit, in which case its tree is used). Tracked files
    /// are overwritten or deleted as needed; files which are untracked in both
    /// the current and the target state are left alone. User hooks are
    /// suppressed.
    #[instrument(skip(git_run_info))]
    pub fn restore_worktree(&self, git_run_info: &GitRunInfo, oid: NonZeroOid) -> Result<()> {
        let oid = oid.to_string();
        git_run_info
            .run_hookless(
                self,
                &["read-tree", "-u", "--reset", oid.as_str()],
                Default::default(),
            )
            .map_err(Error::ExecGit)?;
        Ok(())
    }

    /// Make the index match the tree named by `oid` (which may be a commit),
    /// without touching the working tree. User hooks are suppressed.
    #[instrument(skip(git_run_info))]
    pub fn restore_index(&self, git_run_info: &GitRunInfo, oid: NonZeroOid) -> Result<()> {
        let oid = oid.to_string();
        git_run_info
            .run_hookless(self, &["read-tree", oid.as_str()], Default::default())
            .map_err(Error::ExecGit)?;
        Ok(())
    }

    /// Create the reflog file for the given reference if it does not already
    /// exist. Git only maintains reflogs for references it considers
    /// log-worthy; for our dedicated ledger reference the log file has to be
    /// created explicitly, after which every update is appended to it.
    #[instrument]
    pub fn ensure_reflog_exists(&self, name: &ReferenceName) -> Result<()> {
        let reflog_path = self.get_reflog_path(name);
        if let Some(parent) = reflog_path.parent() {
            std::fs::create_dir_all(parent).map_err(|err| Error::CreateReflog {
                source: err,
                name: name.clone(),
            })?;
        }
        std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&reflog_path)
            .map_err(|err| Error::CreateReflog {
                source: err,
                name: name.clone(),
            })?;
        Ok(())
    }

    /// Read the reflog for the given reference. Entries are returned newest
    /// first. Returns an empty list if the reference has no reflog.
    #[instrument]
    pub fn read_reflog(&self, name: &ReferenceName) -> Result<Vec<ReflogEntry>> {
        let reflog = self
            .inner
            .reflog(name.as_str())
            .map_err(|err| Error::ReadReflog {
                source: err,
                name: name.clone(),
            })?;
        let entries = reflog
            .iter()
            .filter_map(|entry| {
                let new_oid = entry.id_new();
                if new_oid.is_zero() {
                    return None;
                }
                Some(ReflogEntry {
                    new_oid: make_non_zero_oid(new_oid),
                    message: entry.message().map(|message| message.to_owned()),
                })
            })
            .collect_vec();
        Ok(entries)
    }

    /// Get the message of the most recent `HEAD` reflog entry, if there is
    /// one.
    #[instrument]
    pub fn latest_head_reflog_message(&self) -> Result<Option<String>> {
        let entries = self.read_reflog(&ReferenceName::from("HEAD"))?;
        Ok(entries
            .into_iter()
            .next()
            .and_then(|entry| entry.message))
    }

    /// Detect whether a rebase has started but not completed. Capture is
    /// skipped in that state: the intermediate steps of a rebase are not
    /// distinct snapshots from the user's point of view, and the host holds
    /// its own index transactions open while it works.
    #[instrument]
    pub fn is_rebase_underway(&self) -> bool {
        use git2::RepositoryState::*;
        match self.inner.state() {
            Rebase | RebaseInteractive | RebaseMerge => true,
            Clean | Merge | Revert | RevertSequence | CherryPick | CherryPickSequence | Bisect
            | ApplyMailbox | ApplyMailboxOrRebase => {
                // `git2` reports the state of the repository as of the last
                // time it was read; check the on-disk state directories too.
                self.get_path().join("rebase-merge").exists()
                    || self.get_path().join("rebase-apply").exists()
            }
        }
    }

    /// Walk the first-parent chain starting at `from` (inclusive), stopping
    /// before `until` (exclusive), or at a root commit if `until` is `None`
    /// or never reached.
    pub fn walk_first_parent(
        &self,
        from: NonZeroOid,
        until: Option<NonZeroOid>,
    ) -> FirstParentWalk<'_> {
        FirstParentWalk {
            repo: self,
            next: Some(from),
            until,
        }
    }

    /// Count the commits on the first-parent chain from `from` (inclusive)
    /// back to `until` (exclusive).
    #[instrument]
    pub fn count_first_parent_commits(
        &self,
        from: NonZeroOid,
        until: Option<NonZeroOid>,
    ) -> Result<usize> {
        let mut count = 0;
        for commit in self.walk_first_parent(from, until) {
            commit?;
            count += 1;
        }
        Ok(count)
    }
}

/// A lazy walk over a commit's first-parent ancestry.
pub struct FirstParentWalk<'repo> {
    repo: &'repo Repo,
    next: Option<NonZeroOid>,
    until: Option<NonZeroOid>,
}

impl<'repo> Iterator for FirstParentWalk<'repo> {
    type Item = Result<Commit<'repo>>;

    fn next(&mut self) -> Option<Self::Item> {
        let oid = self.next?;
        if Some(oid) == self.until {
            self.next = None;
            return None;
        }
        match self.repo.find_commit_or_fail(oid) {
            Ok(commit) => {
                self.next = commit.get_first_parent_oid();
                Some(Ok(commit))
            }
            Err(err) => {
                self.next = None;
                Some(Err(err))
            }
        }
    }
}
