use lib::core::ledger::load_all;
use lib::core::lock::SnapshotLock;
use lib::core::snapshot::capture;
use lib::git::{HeadState, ReferenceName};
use lib::testing::{make_git, GitInitOptions};

#[test]
fn test_hooks_record_snapshot_on_commit() -> eyre::Result<()> {
    let git = make_git()?;
    git.init_repo_with_options(&GitInitOptions {
        make_initial_commit: false,
        install_snapshot_hooks: true,
    })?;

    let commit_oid = git.commit_file("initial", 0)?;
    let repo = git.get_repo()?;

    let snapshots = load_all(&repo)?;
    assert!(!snapshots.is_empty());

    let newest = &snapshots[0];
    assert_eq!(
        newest.head,
        HeadState::Symbolic(ReferenceName::from("refs/heads/main"))
    );
    assert!(newest
        .refs
        .iter()
        .any(|(name, oid)| name.as_str() == "refs/heads/main" && *oid == commit_oid));
    Ok(())
}

#[test]
fn test_newest_entry_matches_fresh_capture() -> eyre::Result<()> {
    let git = make_git()?;
    git.init_repo()?;

    git.undo_command(&["record"])?;

    let repo = git.get_repo()?;
    let newest = load_all(&repo)?.remove(0);
    let fresh = capture(&repo, &git.get_git_run_info())?.unwrap();
    assert!(newest.is_same_state(&fresh));
    Ok(())
}

#[test]
fn test_record_twice_dedups() -> eyre::Result<()> {
    let git = make_git()?;
    git.init_repo()?;
    let repo = git.get_repo()?;

    git.undo_command(&["record"])?;
    let num_snapshots = load_all(&repo)?.len();

    git.undo_command(&["record"])?;
    assert_eq!(load_all(&repo)?.len(), num_snapshots);
    Ok(())
}

#[test]
fn test_record_skipped_during_rebase() -> eyre::Result<()> {
    let git = make_git()?;
    git.init_repo()?;
    let repo = git.get_repo()?;

    git.undo_command(&["record"])?;
    let num_snapshots = load_all(&repo)?.len();

    git.commit_file("extra", 1)?;
    std::fs::create_dir_all(repo.get_path().join("rebase-merge"))?;
    let (_stdout, _stderr) = git.undo_command(&["record"])?;
    assert_eq!(load_all(&repo)?.len(), num_snapshots);
    Ok(())
}

#[test]
fn test_record_exits_successfully_when_lock_contended() -> eyre::Result<()> {
    let git = make_git()?;
    git.init_repo()?;
    let repo = git.get_repo()?;

    let _guard = SnapshotLock::try_acquire(&repo)?.expect("should acquire lock");

    // The contended invocation must exit 0 without extending the ledger, so
    // that hooks never block the user's workflow.
    let (_stdout, _stderr) = git.undo_command(&["record"])?;
    assert_eq!(load_all(&repo)?.len(), 0);
    Ok(())
}

#[test]
fn test_record_with_explicit_message() -> eyre::Result<()> {
    let git = make_git()?;
    git.init_repo()?;
    let repo = git.get_repo()?;

    git.undo_command(&["record", "-m", "my special operation"])?;
    let newest = load_all(&repo)?.remove(0);
    assert_eq!(newest.message, "my special operation");
    Ok(())
}
