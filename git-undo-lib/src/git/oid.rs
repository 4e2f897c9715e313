use std::fmt::{self, Display};
use std::str::FromStr;

use thiserror::Error;

/// An error raised when parsing an object ID from a string.
#[derive(Debug, Error)]
#[error("could not parse object ID: {0}")]
pub struct ParseOidError(#[source] git2::Error);

/// The zero OID, i.e. the all-zeros hash. Used by Git to represent the absence
/// of an object, such as the old value of a newly-created reference.
#[derive(Copy, Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum MaybeZeroOid {
    /// The zero OID.
    Zero,

    /// A non-zero OID.
    NonZero(NonZeroOid),
}

impl Display for MaybeZeroOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MaybeZeroOid::Zero => write!(f, "{}", git2::Oid::zero()),
            MaybeZeroOid::NonZero(oid) => write!(f, "{oid}"),
        }
    }
}

impl FromStr for MaybeZeroOid {
    type Err = ParseOidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let oid = git2::Oid::from_str(s).map_err(ParseOidError)?;
        Ok(MaybeZeroOid::from(oid))
    }
}

impl From<git2::Oid> for MaybeZeroOid {
    fn from(oid: git2::Oid) -> Self {
        if oid.is_zero() {
            MaybeZeroOid::Zero
        } else {
            MaybeZeroOid::NonZero(NonZeroOid { inner: oid })
        }
    }
}

impl From<NonZeroOid> for MaybeZeroOid {
    fn from(oid: NonZeroOid) -> Self {
        MaybeZeroOid::NonZero(oid)
    }
}

/// An object ID which is guaranteed not to be the zero OID, i.e. which names an
/// actual object in the repository.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NonZeroOid {
    pub(super) inner: git2::Oid,
}

impl NonZeroOid {
    /// Render an abbreviated form of this OID, suitable for display.
    pub fn to_short_string(&self) -> String {
        let rendered = self.inner.to_string();
        rendered[..6].to_owned()
    }
}

impl Display for NonZeroOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner)
    }
}

impl fmt::Debug for NonZeroOid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NonZeroOid({})", self.inner)
    }
}

impl FromStr for NonZeroOid {
    type Err = ParseOidError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let oid = git2::Oid::from_str(s).map_err(ParseOidError)?;
        match MaybeZeroOid::from(oid) {
            MaybeZeroOid::NonZero(oid) => Ok(oid),
            MaybeZeroOid::Zero => Err(ParseOidError(git2::Error::from_str(
                "expected a non-zero object ID",
            ))),
        }
    }
}

pub(super) fn make_non_zero_oid(oid: git2::Oid) -> NonZeroOid {
    assert!(!oid.is_zero());
    NonZeroOid { inner: oid }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_oid_round_trip() -> eyre::Result<()> {
        let oid: NonZeroOid = "1234567812345678123456781234567812345678".parse()?;
        assert_eq!(oid.to_string(), "1234567812345678123456781234567812345678");
        assert_eq!(oid.to_short_string(), "123456");
        Ok(())
    }

    #[test]
    fn test_zero_oid_rejected() {
        let result: Result<NonZeroOid, _> = "0000000000000000000000000000000000000000".parse();
        assert!(result.is_err());

        let oid: MaybeZeroOid = "0000000000000000000000000000000000000000".parse().unwrap();
        assert_eq!(oid, MaybeZeroOid::Zero);
    }
}
