use std::string::FromUtf8Error;

use thiserror::Error;

/// An error raised when decoding a reference name.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum ReferenceNameError {
    #[error("reference name was not valid UTF-8: {0}")]
    InvalidUtf8(FromUtf8Error),
}

/// The full name of a reference, like `refs/heads/master`.
#[derive(Clone, Debug, PartialOrd, Ord, PartialEq, Eq, Hash)]
pub struct ReferenceName(String);

impl ReferenceName {
    /// Create a reference name from the provided bytestring. Non-UTF-8
    /// reference names are not supported.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<ReferenceName, ReferenceNameError> {
        let reference_name = String::from_utf8(bytes).map_err(ReferenceNameError::InvalidUtf8)?;
        Ok(Self(reference_name))
    }

    /// View this reference name as a string. (This is a zero-cost conversion.)
    pub fn as_str(&self) -> &str {
        let Self(reference_name) = self;
        reference_name
    }
}

impl From<&str> for ReferenceName {
    fn from(s: &str) -> Self {
        ReferenceName(s.to_owned())
    }
}

impl From<String> for ReferenceName {
    fn from(s: String) -> Self {
        ReferenceName(s)
    }
}

impl AsRef<str> for ReferenceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReferenceName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Determine what kind of reference a name refers to. The snapshot engine
/// cares about the distinction because only local branches and tags are
/// captured and restored; remote-tracking branches belong to the remote.
#[derive(Debug)]
pub enum CategorizedReferenceName<'a> {
    /// The reference represents a local branch.
    LocalBranch {
        /// The full name of the reference.
        name: &'a str,

        /// The string `refs/heads/`.
        prefix: &'static str,
    },

    /// The reference represents a tag.
    Tag {
        /// The full name of the reference.
        name: &'a str,

        /// The string `refs/tags/`.
        prefix: &'static str,
    },

    /// The reference represents a remote-tracking branch.
    RemoteBranch {
        /// The full name of the reference.
        name: &'a str,

        /// The string `refs/remotes/`.
        prefix: &'static str,
    },

    /// Some other kind of reference.
    OtherRef {
        /// The full name of the reference.
        name: &'a str,
    },
}

impl<'a> CategorizedReferenceName<'a> {
    /// Categorize the provided reference name.
    pub fn new(name: &'a ReferenceName) -> Self {
        let name = name.as_str();
        if name.starts_with("refs/heads/") {
            Self::LocalBranch {
                name,
                prefix: "refs/heads/",
            }
        } else if name.starts_with("refs/tags/") {
            Self::Tag {
                name,
                prefix: "refs/tags/",
            }
        } else if name.starts_with("refs/remotes/") {
            Self::RemoteBranch {
                name,
                prefix: "refs/remotes/",
            }
        } else {
            Self::OtherRef { name }
        }
    }

    /// Whether this reference is a local branch or a tag, i.e. one of the
    /// references which participate in snapshot diffs and restores.
    pub fn is_local_branch_or_tag(&self) -> bool {
        match self {
            Self::LocalBranch { .. } | Self::Tag { .. } => true,
            Self::RemoteBranch { .. } | Self::OtherRef { .. } => false,
        }
    }

    /// Render only the suffix of the reference name as a `String`. The caller
    /// will usually check the type of reference and add additional information
    /// to the reference name.
    pub fn render_suffix(&self) -> String {
        let (name, prefix): (_, &'static str) = match self {
            Self::LocalBranch { name, prefix } => (name, prefix),
            Self::Tag { name, prefix } => (name, prefix),
            Self::RemoteBranch { name, prefix } => (name, prefix),
            Self::OtherRef { name } => (name, ""),
        };
        name.strip_prefix(prefix).unwrap_or(name).to_owned()
    }

    /// Render the reference name, and prepend a helpful string like `branch`
    /// to the description.
    pub fn friendly_describe(&self) -> String {
        let name = self.render_suffix();
        match self {
            Self::LocalBranch { .. } => format!("branch {name}"),
            Self::Tag { .. } => format!("tag {name}"),
            Self::RemoteBranch { .. } => format!("remote branch {name}"),
            Self::OtherRef { .. } => format!("ref {name}"),
        }
    }
}
