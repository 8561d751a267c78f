mod common;

use shelf::*;

// ---------------------------------------------------------------------------
// merge-driven update
// ---------------------------------------------------------------------------

#[test]
fn update_merges_stored_lines_into_live_edit() {
    let dir = tempfile::tempdir().unwrap();
    common::write_file(dir.path(), "f.txt", "a\nb\ncc\nd\n");
    let mut ws = Workspace::init(dir.path(), Options::default()).unwrap();

    // Live edit replaces cc with eee; the stored side wins the conflict
    // under the default policy while shared context stays put.
    common::write_file(dir.path(), "f.txt", "a\nb\neee\nd\n");
    ws.update(0, 0, &MergeOptions::default(), None, true).unwrap();
    assert_eq!(common::read_text(dir.path(), "f.txt"), "a\nb\ncc\nd\n");
}

#[test]
fn update_mine_keeps_live_side_of_conflicts() {
    let dir = tempfile::tempdir().unwrap();
    common::write_file(dir.path(), "f.txt", "a\nb\ncc\nd\n");
    let mut ws = Workspace::init(dir.path(), Options::default()).unwrap();

    common::write_file(dir.path(), "f.txt", "a\nb\neee\nd\n");
    let opts = MergeOptions {
        resolution: ConflictResolution::Mine,
        ..Default::default()
    };
    ws.update(0, 0, &opts, None, true).unwrap();
    assert_eq!(common::read_text(dir.path(), "f.txt"), "a\nb\neee\nd\n");
}

#[test]
fn update_consults_prompt_on_ask() {
    struct AlwaysTheirs;
    impl ConflictPrompt for AlwaysTheirs {
        fn resolve(&mut self, _s: &[String], _t: &[String]) -> ConflictResolution {
            ConflictResolution::Theirs
        }
    }

    let dir = tempfile::tempdir().unwrap();
    common::write_file(dir.path(), "f.txt", "a\nb\ncc\nd\n");
    let mut ws = Workspace::init(dir.path(), Options::default()).unwrap();

    common::write_file(dir.path(), "f.txt", "a\nb\neee\nd\n");
    let opts = MergeOptions {
        resolution: ConflictResolution::Ask,
        ..Default::default()
    };
    let mut prompt = AlwaysTheirs;
    ws.update(0, 0, &opts, Some(&mut prompt), true).unwrap();
    assert_eq!(common::read_text(dir.path(), "f.txt"), "a\nb\ncc\nd\n");
}

// ---------------------------------------------------------------------------
// operation flags on whole files
// ---------------------------------------------------------------------------

#[test]
fn update_remove_deletes_files_absent_from_target() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = common::init_workspace(dir.path());
    common::write_file(dir.path(), "c.txt", "gamma\n");
    ws.commit(None, false).unwrap();

    let opts = MergeOptions {
        operation: MergeOperation::REMOVE,
        ..Default::default()
    };
    let applied = ws.update(0, 0, &opts, None, false).unwrap();
    assert!(!dir.path().join("c.txt").exists());
    assert!(applied.deletions.contains_key("c.txt"));
}

#[test]
fn update_insert_only_leaves_extra_files_alone() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = common::init_workspace(dir.path());
    common::write_file(dir.path(), "c.txt", "gamma\n");
    ws.commit(None, false).unwrap();

    let opts = MergeOptions {
        operation: MergeOperation::INSERT,
        ..Default::default()
    };
    ws.update(0, 0, &opts, None, false).unwrap();
    assert!(dir.path().join("c.txt").exists());
}

#[test]
fn update_insert_restores_missing_files() {
    let dir = tempfile::tempdir().unwrap();
    let mut ws = common::init_workspace(dir.path());

    std::fs::remove_file(dir.path().join("a.txt")).unwrap();
    let opts = MergeOptions {
        operation: MergeOperation::INSERT,
        ..Default::default()
    };
    let applied = ws.update(0, 0, &opts, None, true).unwrap();
    assert_eq!(common::read_text(dir.path(), "a.txt"), "alpha\n");
    assert!(applied.additions.contains_key("a.txt"));
}

// ---------------------------------------------------------------------------
// binary content
// ---------------------------------------------------------------------------

#[test]
fn update_restores_binary_content_byte_for_byte() {
    let dir = tempfile::tempdir().unwrap();
    let stored = [0xff, 0xfe, 0x78, 0x0a, 0x80, 0x0a];
    std::fs::write(dir.path().join("blob.bin"), stored).unwrap();
    let mut ws = Workspace::init(dir.path(), Options::default()).unwrap();

    // A binary file has no line merge; under Theirs the stored bytes come
    // back exactly, with no replacement-character mangling.
    std::fs::write(dir.path().join("blob.bin"), [0x01, 0x02, 0x03]).unwrap();
    ws.update(0, 0, &MergeOptions::default(), None, true).unwrap();
    assert_eq!(std::fs::read(dir.path().join("blob.bin")).unwrap(), stored);
}

#[test]
fn update_mine_keeps_live_binary_untouched() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("blob.bin"), [0xff, 0xfe, 0x78]).unwrap();
    let mut ws = Workspace::init(dir.path(), Options::default()).unwrap();

    let live = [0x01, 0x02, 0x80, 0x03];
    std::fs::write(dir.path().join("blob.bin"), live).unwrap();
    let opts = MergeOptions {
        resolution: ConflictResolution::Mine,
        ..Default::default()
    };
    ws.update(0, 0, &opts, None, true).unwrap();
    assert_eq!(std::fs::read(dir.path().join("blob.bin")).unwrap(), live);
}

// ---------------------------------------------------------------------------
// diff
// ---------------------------------------------------------------------------

#[test]
fn diff_reports_blocks_for_textually_changed_files() {
    let dir = tempfile::tempdir().unwrap();
    common::write_file(dir.path(), "f.txt", "a\nb\ncc\nd\n");
    let ws = Workspace::init(dir.path(), Options::default()).unwrap();

    common::write_file(dir.path(), "f.txt", "a\nb\neee\nd\n");
    let diffs = ws.diff(0, 0).unwrap();
    assert_eq!(diffs.len(), 1);
    let blocks = diffs.get("f.txt").unwrap();
    assert!(blocks.iter().any(|b| b.kind == BlockKind::Modify));
}

#[test]
fn diff_skips_binary_files() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("blob.bin"), [0xff, 0xfe, 0x78]).unwrap();
    let ws = Workspace::init(dir.path(), Options::default()).unwrap();

    std::fs::write(dir.path().join("blob.bin"), [0x01, 0x02]).unwrap();
    assert!(ws.diff(0, 0).unwrap().is_empty());
}

#[test]
fn diff_skips_identical_files() {
    let dir = tempfile::tempdir().unwrap();
    let ws = common::init_workspace(dir.path());
    assert!(ws.diff(0, 0).unwrap().is_empty());
}
