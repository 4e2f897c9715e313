use lib::core::ledger::load_all;
use lib::git::ReferenceName;
use lib::testing::{make_git, GitRunOptions};

#[test]
fn test_restore_removes_newer_file() -> eyre::Result<()> {
    let git = make_git()?;
    git.init_repo()?;
    let repo = git.get_repo()?;

    let commit_a_oid = git.commit_file_with_contents("a", 1, "aaaaa\n")?;
    git.undo_command(&["record"])?;
    let snapshot_id = load_all(&repo)?[0].id.unwrap().to_string();

    git.commit_file_with_contents("b", 2, "bbbbb\n")?;

    let (stdout, _stderr) = git.undo_command(&["restore", &snapshot_id])?;
    assert!(stdout.contains("Restored snapshot"));

    assert!(git.repo_path.join("a.txt").exists());
    assert!(!git.repo_path.join("b.txt").exists());

    let head_oid = repo.resolve_reference(&ReferenceName::from("HEAD"))?.unwrap();
    assert_eq!(head_oid, commit_a_oid);
    Ok(())
}

#[test]
fn test_restore_current_state_is_a_no_op() -> eyre::Result<()> {
    let git = make_git()?;
    git.init_repo()?;
    let repo = git.get_repo()?;

    git.undo_command(&["record"])?;
    let snapshot_id = load_all(&repo)?[0].id.unwrap().to_string();

    let (stdout, _stderr) = git.undo_command(&["restore", &snapshot_id])?;
    assert!(stdout.contains("nothing to restore"));
    Ok(())
}

#[test]
fn test_restore_rejects_invalid_id() -> eyre::Result<()> {
    let git = make_git()?;
    git.init_repo()?;

    let (_stdout, stderr) = git.undo_command_with_options(
        &["restore", "not-a-snapshot-id"],
        &GitRunOptions {
            expected_exit_code: 1,
            ..Default::default()
        },
    )?;
    assert!(stderr.contains("Invalid snapshot ID"));
    Ok(())
}

#[test]
fn test_restore_rejects_unknown_id() -> eyre::Result<()> {
    let git = make_git()?;
    git.init_repo()?;

    let (_stdout, stderr) = git.undo_command_with_options(
        &["restore", "1234567812345678123456781234567812345678"],
        &GitRunOptions {
            expected_exit_code: 1,
            ..Default::default()
        },
    )?;
    assert!(stderr.contains("Loading snapshot"));
    Ok(())
}
