//! Structured comparison of two snapshots, plus the human-readable summaries
//! built on top of it: divergence phrases and ASCII history diagrams.

use std::collections::BTreeMap;
use std::fmt::Write;

use itertools::Itertools;
use tracing::instrument;

use crate::core::formatting::Pluralize;
use crate::core::snapshot::Snapshot;
use crate::git::{CategorizedReferenceName, Commit, HeadState, NonZeroOid, ReferenceName, Repo};

/// Glyph marking the endpoint which would become current after a restore.
pub const TARGET_GLYPH: &str = "➤";

/// Glyph marking the endpoint which is current now.
pub const CURRENT_GLYPH: &str = "★";

const DIAGRAM_COLUMN_WIDTH: usize = 44;
const DIAGRAM_ELISION_THRESHOLD: usize = 6;

/// The old and new values of one reference which differs between two
/// snapshots.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefDelta {
    /// The value recorded in the target snapshot, or `None` if the reference
    /// does not exist there.
    pub target: Option<NonZeroOid>,

    /// The value recorded in the current snapshot, or `None` if the reference
    /// does not exist there.
    pub current: Option<NonZeroOid>,
}

/// The structured difference between two snapshots.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChangeSet {
    /// Every local branch or tag which differs, mapped to its `(target,
    /// current)` values. Only names under `refs/heads/` and `refs/tags/` are
    /// considered.
    pub refs: BTreeMap<ReferenceName, RefDelta>,

    /// The `(target, current)` values of `HEAD`, if they differ.
    pub head: Option<(HeadState, HeadState)>,

    /// The `(target, current)` index commits, if they differ.
    pub index: Option<(NonZeroOid, NonZeroOid)>,

    /// The `(target, current)` working-tree commits, if they differ.
    pub workdir: Option<(NonZeroOid, NonZeroOid)>,
}

impl ChangeSet {
    /// Whether the two snapshots record the same state.
    pub fn is_empty(&self) -> bool {
        let Self {
            refs,
            head,
            index,
            workdir,
        } = self;
        refs.is_empty() && head.is_none() && index.is_none() && workdir.is_none()
    }

    /// Whether the two snapshots differ in their references or `HEAD`.
    /// (Index-only or working-tree-only differences don't count; `undo` skips
    /// past those.)
    pub fn changes_refs_or_head(&self) -> bool {
        !self.refs.is_empty() || self.head.is_some()
    }
}

fn snapshot_ref_map(snapshot: &Snapshot) -> BTreeMap<&ReferenceName, NonZeroOid> {
    snapshot
        .refs
        .iter()
        .filter(|(name, _)| CategorizedReferenceName::new(name).is_local_branch_or_tag())
        .map(|(name, oid)| (name, *oid))
        .collect()
}

/// Compute the structured difference between the current snapshot and a
/// target snapshot.
#[instrument]
pub fn diff(current: &Snapshot, target: &Snapshot) -> ChangeSet {
    let current_refs = snapshot_ref_map(current);
    let target_refs = snapshot_ref_map(target);

    let mut refs = BTreeMap::new();
    for name in current_refs.keys().chain(target_refs.keys()).unique() {
        let current_oid = current_refs.get(name).copied();
        let target_oid = target_refs.get(name).copied();
        if current_oid != target_oid {
            refs.insert(
                (*name).clone(),
                RefDelta {
                    target: target_oid,
                    current: current_oid,
                },
            );
        }
    }

    let head = (current.head != target.head)
        .then(|| (target.head.clone(), current.head.clone()));
    let index = (current.index_commit != target.index_commit)
        .then_some((target.index_commit, current.index_commit));
    let workdir = (current.workdir_commit != target.workdir_commit)
        .then_some((target.workdir_commit, current.workdir_commit));

    ChangeSet {
        refs,
        head,
        index,
        workdir,
    }
}

/// Describe how a reference would move if it were restored from `new` back to
/// `old`, as a human phrase: "have diverged by 2 and 3 commits", "will move
/// back by 4 commits", "will move forward by 1 commit", or "is unchanged".
#[instrument]
pub fn compare(repo: &Repo, old: NonZeroOid, new: NonZeroOid) -> eyre::Result<String> {
    if old == new {
        return Ok("is unchanged".to_owned());
    }

    let base = repo.find_merge_base(old, new)?;
    let commits_to_old = repo.count_first_parent_commits(old, base)?;
    let commits_to_new = repo.count_first_parent_commits(new, base)?;

    let phrase = match (commits_to_old, commits_to_new) {
        (a, b) if a > 0 && b > 0 => format!(
            "have diverged by {a} and {}",
            Pluralize {
                amount: b,
                singular: "commit",
                plural: "commits",
            }
        ),
        (a, 0) if a > 0 => format!(
            "will move forward by {}",
            Pluralize {
                amount: a,
                singular: "commit",
                plural: "commits",
            }
        ),
        (0, b) if b > 0 => format!(
            "will move back by {}",
            Pluralize {
                amount: b,
                singular: "commit",
                plural: "commits",
            }
        ),
        (_, _) => "is unchanged".to_owned(),
    };
    Ok(phrase)
}

fn render_commit(glyph: &str, commit: &Commit) -> String {
    format!(
        "{glyph}{} {}",
        commit.get_oid().to_short_string(),
        commit.get_summary()
    )
}

fn endpoint_glyph(commit: &Commit, old: NonZeroOid, new: NonZeroOid) -> &'static str {
    let oid = commit.get_oid();
    if oid == old {
        TARGET_GLYPH
    } else if oid == new {
        CURRENT_GLYPH
    } else {
        " "
    }
}

fn first_parent_chain<'repo>(
    repo: &'repo Repo,
    from: NonZeroOid,
    until: Option<NonZeroOid>,
) -> eyre::Result<Vec<Commit<'repo>>> {
    let commits: Vec<_> = repo
        .walk_first_parent(from, until)
        .try_collect()?;
    Ok(commits)
}

/// Draw an ASCII diagram of the history between two snapshot endpoints,
/// back to their merge base. The endpoint which a restore would make current
/// is marked with [`TARGET_GLYPH`]; the currently checked-out endpoint with
/// [`CURRENT_GLYPH`].
#[instrument]
pub fn line_diagram(repo: &Repo, old: NonZeroOid, new: NonZeroOid) -> eyre::Result<String> {
    let base = match (old == new, repo.find_merge_base(old, new)?) {
        (true, _) => Some(old),
        (false, base) => base,
    };

    match base {
        Some(base) if base == old || base == new => {
            let tip = if base == old { new } else { old };
            let mut history = first_parent_chain(repo, tip, Some(base))?;
            history.push(repo.find_commit_or_fail(base)?);
            draw_linear_diagram(&history, old, new)
        }
        base => draw_diverged_diagram(repo, old, new, base),
    }
}

fn draw_linear_diagram(
    history: &[Commit],
    old: NonZeroOid,
    new: NonZeroOid,
) -> eyre::Result<String> {
    let mut result = String::new();
    if history.len() > DIAGRAM_ELISION_THRESHOLD {
        let elided = history.len() - 4;
        for commit in &history[..2] {
            writeln!(result, "{}", render_commit(endpoint_glyph(commit, old, new), commit))?;
        }
        writeln!(
            result,
            "⋮ ({} omitted)",
            Pluralize {
                amount: elided,
                singular: "commit",
                plural: "commits",
            }
        )?;
        for commit in &history[history.len() - 2..] {
            writeln!(result, "{}", render_commit(endpoint_glyph(commit, old, new), commit))?;
        }
    } else {
        for commit in history {
            writeln!(result, "{}", render_commit(endpoint_glyph(commit, old, new), commit))?;
        }
    }
    Ok(result)
}

fn draw_diverged_diagram(
    repo: &Repo,
    old: NonZeroOid,
    new: NonZeroOid,
    base: Option<NonZeroOid>,
) -> eyre::Result<String> {
    let old_commits = first_parent_chain(repo, old, base)?;
    let new_commits = first_parent_chain(repo, new, base)?;

    // Pad the shorter column with blanks at the top, so that the two columns
    // meet the shared ancestor at the bottom.
    let num_rows = old_commits.len().max(new_commits.len());
    let left_padding = num_rows - old_commits.len();
    let right_padding = num_rows - new_commits.len();

    let mut result = String::new();
    for row in 0..num_rows {
        let left = row
            .checked_sub(left_padding)
            .and_then(|index| old_commits.get(index));
        let right = row
            .checked_sub(right_padding)
            .and_then(|index| new_commits.get(index));

        let left_str = match left {
            Some(commit) => render_commit(endpoint_glyph(commit, old, new), commit),
            None => String::new(),
        };
        let right_str = match right {
            Some(commit) => render_commit(endpoint_glyph(commit, old, new), commit),
            None => String::new(),
        };
        let width = DIAGRAM_COLUMN_WIDTH;
        writeln!(result, "{left_str:width$} {right_str}")?;
    }

    if let Some(base) = base {
        let base_commit = repo.find_commit_or_fail(base)?;
        writeln!(
            result,
            "    ┬{}┬",
            " ".repeat(DIAGRAM_COLUMN_WIDTH - 1)
        )?;
        writeln!(
            result,
            "    ┝{}┘",
            "─".repeat(DIAGRAM_COLUMN_WIDTH - 1)
        )?;
        writeln!(result, "    │")?;
        writeln!(result, " {}", render_commit(" ", &base_commit))?;
    }
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::snapshot::capture;
    use crate::testing::make_git;

    fn oid(hex_digit: char) -> NonZeroOid {
        std::iter::repeat(hex_digit)
            .take(40)
            .collect::<String>()
            .parse()
            .unwrap()
    }

    fn synthetic_snapshot(refs: Vec<(&str, NonZeroOid)>, head: HeadState) -> Snapshot {
        Snapshot {
            id: None,
            message: String::new(),
            refs: refs
                .into_iter()
                .map(|(name, oid)| (ReferenceName::from(name), oid))
                .collect(),
            head,
            index_commit: oid('1'),
            workdir_commit: oid('2'),
            index_tree: None,
            workdir_tree: None,
        }
    }

    #[test]
    fn test_diff_reports_ref_changes() {
        let current = synthetic_snapshot(
            vec![("refs/heads/main", oid('a')), ("refs/heads/feature", oid('b'))],
            HeadState::Symbolic(ReferenceName::from("refs/heads/main")),
        );
        let target = synthetic_snapshot(
            vec![("refs/heads/main", oid('c'))],
            HeadState::Symbolic(ReferenceName::from("refs/heads/feature")),
        );

        let changes = diff(&current, &target);
        assert_eq!(
            changes.refs.get(&ReferenceName::from("refs/heads/main")),
            Some(&RefDelta {
                target: Some(oid('c')),
                current: Some(oid('a')),
            })
        );
        assert_eq!(
            changes.refs.get(&ReferenceName::from("refs/heads/feature")),
            Some(&RefDelta {
                target: None,
                current: Some(oid('b')),
            })
        );
        assert!(changes.head.is_some());
        assert!(changes.changes_refs_or_head());
    }

    #[test]
    fn test_diff_ignores_non_branch_refs() {
        let current = synthetic_snapshot(
            vec![("refs/notes/commits", oid('a'))],
            HeadState::Absent,
        );
        let target = synthetic_snapshot(vec![], HeadState::Absent);
        let changes = diff(&current, &target);
        assert!(changes.refs.is_empty());
    }

    #[test]
    fn test_diff_of_identical_snapshots_is_empty() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;
        let repo = git.get_repo()?;

        let snapshot = capture(&repo, &git.get_git_run_info())?.unwrap();
        let changes = diff(&snapshot, &snapshot);
        assert!(changes.is_empty());
        assert!(!changes.changes_refs_or_head());
        Ok(())
    }

    #[test]
    fn test_compare_diverged() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;
        let repo = git.get_repo()?;

        git.run(&["checkout", "-b", "old-branch"])?;
        git.commit_file("old1", 1)?;
        let old_oid = git.commit_file("old2", 2)?;

        git.run(&["checkout", "main"])?;
        git.commit_file("new1", 3)?;
        git.commit_file("new2", 4)?;
        let new_oid = git.commit_file("new3", 5)?;

        assert_eq!(
            compare(&repo, old_oid, new_oid)?,
            "have diverged by 2 and 3 commits"
        );
        Ok(())
    }

    #[test]
    fn test_compare_linear() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;
        let repo = git.get_repo()?;

        let old_oid = git.commit_file("first", 1)?;
        git.commit_file("second", 2)?;
        git.commit_file("third", 3)?;
        git.commit_file("fourth", 4)?;
        let new_oid = git.commit_file("fifth", 5)?;

        assert_eq!(compare(&repo, old_oid, new_oid)?, "will move back by 4 commits");
        assert_eq!(
            compare(&repo, new_oid, old_oid)?,
            "will move forward by 4 commits"
        );
        assert_eq!(compare(&repo, old_oid, old_oid)?, "is unchanged");
        Ok(())
    }

    #[test]
    fn test_compare_single_commit() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;
        let repo = git.get_repo()?;

        let old_oid = git.commit_file("first", 1)?;
        let new_oid = git.commit_file("second", 2)?;
        assert_eq!(compare(&repo, old_oid, new_oid)?, "will move back by 1 commit");
        Ok(())
    }

    #[test]
    fn test_line_diagram_linear() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;
        let repo = git.get_repo()?;

        let old_oid = git.commit_file("first", 1)?;
        git.commit_file("second", 2)?;
        let new_oid = git.commit_file("third", 3)?;

        let diagram = line_diagram(&repo, old_oid, new_oid)?;
        let lines: Vec<&str> = diagram.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with(CURRENT_GLYPH));
        assert!(lines[0].contains("create third.txt"));
        assert!(lines[2].starts_with(TARGET_GLYPH));
        assert!(lines[2].contains("create first.txt"));
        Ok(())
    }

    #[test]
    fn test_line_diagram_elides_long_linear_history() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;
        let repo = git.get_repo()?;

        let old_oid = git.commit_file("first", 1)?;
        let mut new_oid = old_oid;
        for time in 2..=8 {
            new_oid = git.commit_file(&format!("file{time}"), time)?;
        }

        let diagram = line_diagram(&repo, old_oid, new_oid)?;
        assert!(diagram.contains("⋮ (4 commits omitted)"));
        assert_eq!(diagram.lines().count(), 5);
        Ok(())
    }

    #[test]
    fn test_line_diagram_diverged() -> eyre::Result<()> {
        let git = make_git()?;
        git.init_repo()?;
        let repo = git.get_repo()?;

        git.run(&["checkout", "-b", "old-branch"])?;
        let old_oid = git.commit_file("old1", 1)?;
        git.run(&["checkout", "main"])?;
        git.commit_file("new1", 2)?;
        let new_oid = git.commit_file("new2", 3)?;

        let diagram = line_diagram(&repo, old_oid, new_oid)?;
        assert!(diagram.contains(TARGET_GLYPH));
        assert!(diagram.contains(CURRENT_GLYPH));
        assert!(diagram.contains("┝"));
        assert!(diagram.contains("create initial.txt"));
        Ok(())
    }
}
