//! The serialized form of a snapshot.
//!
//! A snapshot is stored as the message of its ledger commit, as a
//! line-oriented text block:
//!
//! ```text
//! FormatVersion: 1
//! Message: git commit -m foo
//! HEAD: refs/heads/main
//! Index: <oid>
//! Workdir: <oid>
//! Refs:
//! refs/heads/main: <oid>
//! refs/tags/v1.0: <oid>
//! ```
//!
//! The parser is strict about the header keywords and their order, permissive
//! about whitespace around the colons and values. `HEAD:` with an empty value
//! means the repository had no `HEAD`. Unknown header fields are reserved for
//! future format versions and rejected for version 1.

use thiserror::Error;

use crate::core::snapshot::Snapshot;
use crate::git::{HeadState, NonZeroOid, ParseOidError, ReferenceName};

/// The format version written by this version of the codec.
pub const FORMAT_VERSION: &str = "1";

/// The first line of every serialized snapshot. Ledger entries whose message
/// does not start with this prefix belong to some other format (or another
/// tool) and are skipped when the ledger is enumerated.
pub const FORMAT_HEADER: &str = "FormatVersion: 1";

/// An error raised when parsing a serialized snapshot.
#[allow(missing_docs)]
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("missing '{expected}' header")]
    MissingHeader { expected: &'static str },

    #[error("expected '{expected}' header, but got line: {line:?}")]
    UnexpectedHeader { expected: &'static str, line: String },

    #[error("unsupported format version: {version:?}")]
    UnsupportedVersion { version: String },

    #[error("could not parse object ID {value:?}: {source}")]
    InvalidOid {
        value: String,
        source: ParseOidError,
    },

    #[error("could not parse ref line: {line:?}")]
    InvalidRefLine { line: String },
}

/// Result type.
pub type Result<T> = std::result::Result<T, CodecError>;

/// Serialize a snapshot to its canonical text form.
pub fn serialize(snapshot: &Snapshot) -> String {
    let mut result = String::new();
    result.push_str(&format!("FormatVersion: {FORMAT_VERSION}\n"));
    result.push_str(&format!("Message: {}\n", snapshot.message));
    let head = match &snapshot.head {
        HeadState::Symbolic(name) => name.as_str().to_owned(),
        HeadState::Detached(oid) => oid.to_string(),
        HeadState::Absent => String::new(),
    };
    if head.is_empty() {
        result.push_str("HEAD:\n");
    } else {
        result.push_str(&format!("HEAD: {head}\n"));
    }
    result.push_str(&format!("Index: {}\n", snapshot.index_commit));
    result.push_str(&format!("Workdir: {}\n", snapshot.workdir_commit));
    result.push_str("Refs:\n");
    for (name, oid) in &snapshot.refs {
        result.push_str(&format!("{}: {oid}\n", name.as_str()));
    }
    result
}

/// Split a header line into its keyword and value, tolerating whitespace
/// around both.
fn parse_header<'a>(line: &'a str, expected: &'static str) -> Result<&'a str> {
    let (keyword, value) = line.split_once(':').ok_or_else(|| CodecError::UnexpectedHeader {
        expected,
        line: line.to_owned(),
    })?;
    if keyword.trim() != expected {
        return Err(CodecError::UnexpectedHeader {
            expected,
            line: line.to_owned(),
        });
    }
    Ok(value.trim())
}

fn parse_oid(value: &str) -> Result<NonZeroOid> {
    value.parse().map_err(|source| CodecError::InvalidOid {
        value: value.to_owned(),
        source,
    })
}

/// Parse a serialized snapshot back into a [`Snapshot`] value.
///
/// The returned snapshot has no `id` and no captured trees; callers which
/// need the trees read them through the ledger commit's parents.
pub fn parse(text: &str) -> Result<Snapshot> {
    fn next_line<'a>(
        lines: &mut std::str::Lines<'a>,
        expected: &'static str,
    ) -> Result<&'a str> {
        lines.next().ok_or(CodecError::MissingHeader { expected })
    }

    let mut lines = text.lines();
    let version = parse_header(next_line(&mut lines, "FormatVersion")?, "FormatVersion")?;
    if version != FORMAT_VERSION {
        return Err(CodecError::UnsupportedVersion {
            version: version.to_owned(),
        });
    }

    let message = parse_header(next_line(&mut lines, "Message")?, "Message")?.to_owned();

    let head = match parse_header(next_line(&mut lines, "HEAD")?, "HEAD")? {
        "" => HeadState::Absent,
        value if value.starts_with("refs/") => HeadState::Symbolic(ReferenceName::from(value)),
        value => HeadState::Detached(parse_oid(value)?),
    };

    let index_commit = parse_oid(parse_header(next_line(&mut lines, "Index")?, "Index")?)?;
    let workdir_commit = parse_oid(parse_header(next_line(&mut lines, "Workdir")?, "Workdir")?)?;

    let refs_header = next_line(&mut lines, "Refs")?;
    if refs_header.trim() != "Refs:" {
        return Err(CodecError::UnexpectedHeader {
            expected: "Refs",
            line: refs_header.to_owned(),
        });
    }

    let mut refs = Vec::new();
    for line in lines {
        if line.trim().is_empty() {
            continue;
        }
        let (name, oid) = line
            .split_once(':')
            .ok_or_else(|| CodecError::InvalidRefLine {
                line: line.to_owned(),
            })?;
        refs.push((ReferenceName::from(name.trim()), parse_oid(oid.trim())?));
    }

    Ok(Snapshot {
        id: None,
        message,
        refs,
        head,
        index_commit,
        workdir_commit,
        index_tree: None,
        workdir_tree: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(hex_digit: char) -> NonZeroOid {
        std::iter::repeat(hex_digit)
            .take(40)
            .collect::<String>()
            .parse()
            .unwrap()
    }

    fn example_snapshot() -> Snapshot {
        Snapshot {
            id: None,
            message: "git commit -m foo".to_owned(),
            refs: vec![
                (ReferenceName::from("refs/heads/main"), oid('a')),
                (ReferenceName::from("refs/tags/v1.0"), oid('b')),
            ],
            head: HeadState::Symbolic(ReferenceName::from("refs/heads/main")),
            index_commit: oid('c'),
            workdir_commit: oid('d'),
            index_tree: None,
            workdir_tree: None,
        }
    }

    #[test]
    fn test_serialize_canonical_form() {
        insta::assert_snapshot!(serialize(&example_snapshot()), @r###"
        FormatVersion: 1
        Message: git commit -m foo
        HEAD: refs/heads/main
        Index: cccccccccccccccccccccccccccccccccccccccc
        Workdir: dddddddddddddddddddddddddddddddddddddddd
        Refs:
        refs/heads/main: aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa
        refs/tags/v1.0: bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb
        "###);
    }

    #[test]
    fn test_round_trip() -> Result<()> {
        let snapshot = example_snapshot();
        let parsed = parse(&serialize(&snapshot))?;
        assert!(parsed.is_same_state(&snapshot));
        assert_eq!(parsed.message, snapshot.message);
        Ok(())
    }

    #[test]
    fn test_round_trip_detached_head() -> Result<()> {
        let snapshot = Snapshot {
            head: HeadState::Detached(oid('e')),
            ..example_snapshot()
        };
        let parsed = parse(&serialize(&snapshot))?;
        assert_eq!(parsed.head, HeadState::Detached(oid('e')));
        Ok(())
    }

    #[test]
    fn test_empty_head_means_absent() -> Result<()> {
        let snapshot = Snapshot {
            head: HeadState::Absent,
            ..example_snapshot()
        };
        let serialized = serialize(&snapshot);
        assert!(serialized.contains("HEAD:\n"));
        let parsed = parse(&serialized)?;
        assert_eq!(parsed.head, HeadState::Absent);
        Ok(())
    }

    #[test]
    fn test_parse_tolerates_whitespace() -> Result<()> {
        let text = "\
FormatVersion:   1
Message:    git checkout main
HEAD:  refs/heads/main
Index:   cccccccccccccccccccccccccccccccccccccccc
Workdir:  dddddddddddddddddddddddddddddddddddddddd
Refs:
refs/heads/main:   aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa
";
        let parsed = parse(text)?;
        assert_eq!(parsed.message, "git checkout main");
        assert_eq!(parsed.refs.len(), 1);
        Ok(())
    }

    #[test]
    fn test_parse_rejects_other_versions() {
        let text = serialize(&example_snapshot()).replace("FormatVersion: 1", "FormatVersion: 2");
        assert!(matches!(
            parse(&text),
            Err(CodecError::UnsupportedVersion { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_unknown_headers() {
        let text = serialize(&example_snapshot())
            .replace("HEAD:", "Novelty: yes\nHEAD:");
        assert!(matches!(
            parse(&text),
            Err(CodecError::UnexpectedHeader { .. })
        ));
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert!(parse("not a snapshot").is_err());
        assert!(parse("").is_err());
    }
}
