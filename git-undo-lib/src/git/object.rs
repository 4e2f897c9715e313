use tracing::instrument;

use crate::git::oid::make_non_zero_oid;
use crate::git::NonZeroOid;

/// Represents a commit object in the Git object database.
#[derive(Clone, Debug)]
pub struct Commit<'repo> {
    pub(super) inner: git2::Commit<'repo>,
}

impl<'repo> Commit<'repo> {
    /// Get the object ID of the commit.
    #[instrument]
    pub fn get_oid(&self) -> NonZeroOid {
        NonZeroOid {
            inner: self.inner.id(),
        }
    }

    /// Get the object IDs of the parents of this commit.
    #[instrument]
    pub fn get_parent_oids(&self) -> Vec<NonZeroOid> {
        self.inner.parent_ids().map(make_non_zero_oid).collect()
    }

    /// Get the first-parent OID of this commit, if it has any parents.
    #[instrument]
    pub fn get_first_parent_oid(&self) -> Option<NonZeroOid> {
        self.inner.parent_ids().next().map(make_non_zero_oid)
    }

    /// Get the object ID of the tree wrapped by this commit.
    #[instrument]
    pub fn get_tree_oid(&self) -> NonZeroOid {
        make_non_zero_oid(self.inner.tree_id())
    }

    /// Get the summary (first line) of the commit message. Lossily decoded if
    /// the message is not valid UTF-8.
    #[instrument]
    pub fn get_summary(&self) -> String {
        match self.inner.summary_bytes() {
            Some(summary) => String::from_utf8_lossy(summary).into_owned(),
            None => String::new(),
        }
    }

    /// Get the full commit message. Lossily decoded if the message is not
    /// valid UTF-8.
    #[instrument]
    pub fn get_message_raw(&self) -> String {
        String::from_utf8_lossy(self.inner.message_raw_bytes()).into_owned()
    }
}
