mod common;

use shelf::*;

// ---------------------------------------------------------------------------
// restore behavior
// ---------------------------------------------------------------------------

#[test]
fn switch_restores_earlier_revision_exactly() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = common::init_workspace(dir.path());

    common::write_file(dir.path(), "a.txt", "alpha rewritten\n");
    common::write_file(dir.path(), "c.txt", "gamma\n");
    ws.commit(None, false).unwrap();

    let applied = ws.switch(0, 0, false).unwrap();
    assert_eq!(common::read_text(dir.path(), "a.txt"), "alpha\n");
    assert!(!dir.path().join("c.txt").exists());
    assert!(applied.modifications.contains_key("a.txt"));
    assert!(applied.deletions.contains_key("c.txt"));

    // Forward again to the head.
    ws.switch(0, 1, false).unwrap();
    assert_eq!(common::read_text(dir.path(), "a.txt"), "alpha rewritten\n");
    assert_eq!(common::read_text(dir.path(), "c.txt"), "gamma\n");
}

#[test]
fn switch_restores_recorded_mtime() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = common::init_workspace(dir.path());

    common::write_file(dir.path(), "a.txt", "alpha rewritten\n");
    ws.commit(None, false).unwrap();
    ws.switch(0, 0, false).unwrap();

    let recorded = common::open_store(dir.path())
        .load_revision(0, 0)
        .unwrap()
        .get("a.txt")
        .unwrap()
        .mtime;
    let meta = std::fs::metadata(dir.path().join("a.txt")).unwrap();
    assert_eq!(detect::mtime_millis(&meta), recorded);
}

#[test]
fn switch_reports_target_side_records() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = common::init_workspace(dir.path());

    common::write_file(dir.path(), "a.txt", "alpha rewritten\n");
    ws.commit(None, false).unwrap();

    // The applied changeset expresses what the live tree was moved to: the
    // modification carries the stored revision-0 record, not the live one.
    let applied = ws.switch(0, 0, false).unwrap();
    let stored = common::open_store(dir.path())
        .load_revision(0, 0)
        .unwrap()
        .get("a.txt")
        .cloned()
        .unwrap();
    assert_eq!(applied.modifications.get("a.txt"), Some(&stored));
}

#[test]
fn switch_leaves_tree_clean() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = common::init_workspace(dir.path());

    common::write_file(dir.path(), "a.txt", "alpha rewritten\n");
    common::write_file(dir.path(), "c.txt", "gamma\n");
    ws.commit(None, false).unwrap();

    ws.switch(0, 0, false).unwrap();
    assert!(ws.changes(false).unwrap().is_empty());
}

#[test]
fn switch_crosses_branches() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = common::init_workspace(dir.path());

    ws.create_branch(Some("work")).unwrap();
    common::write_file(dir.path(), "a.txt", "work version here\n");
    ws.commit(None, false).unwrap();

    ws.switch(0, 0, false).unwrap();
    assert_eq!(ws.current(), Some(0));
    assert_eq!(common::read_text(dir.path(), "a.txt"), "alpha\n");

    ws.switch(1, 1, false).unwrap();
    assert_eq!(ws.current(), Some(1));
    assert_eq!(common::read_text(dir.path(), "a.txt"), "work version here\n");
}

// ---------------------------------------------------------------------------
// dirty guard
// ---------------------------------------------------------------------------

#[test]
fn dirty_tree_blocks_switch() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = common::init_workspace(dir.path());
    common::write_file(dir.path(), "c.txt", "gamma\n");
    ws.commit(None, false).unwrap();

    common::write_file(dir.path(), "a.txt", "uncommitted edit\n");
    assert!(matches!(
        ws.switch(0, 0, false),
        Err(Error::DirtyWorkspace(_))
    ));

    // Forced switch discards the edit.
    ws.switch(0, 0, true).unwrap();
    assert_eq!(common::read_text(dir.path(), "a.txt"), "alpha\n");
}

#[test]
fn current_branch_persists_across_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = common::init_workspace(dir.path());
    ws.create_branch(Some("work")).unwrap();
    ws.switch(0, 0, false).unwrap();
    drop(ws);

    let ws = Workspace::open(dir.path()).unwrap();
    assert_eq!(ws.current(), Some(0));
}
