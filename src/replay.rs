//! Sequential replay of a branch's revision records.
//!
//! Revision 0 is a full snapshot; every later record is a delta. The only
//! way to know the complete path set at revision N is to fold records 0..N
//! forward, which makes random access O(revisions) — the price paid for
//! halving storage on long-lived branches. [`Replay`] is the incremental
//! form (each step yields that revision's [`ChangeSet`], used by history
//! listing); [`path_set`] folds to the final accumulated map and discards
//! the intermediates.

use crate::error::Result;
use crate::model::{apply_changes, diff_path_sets, ChangeSet, PathMap};
use crate::store::Store;

/// Iterator over `(revision, ChangeSet)` steps from revision 0 to `upto`.
///
/// Revision 0 is yielded as a changeset of pure additions against an empty
/// baseline. Each subsequent delta is classified against the accumulated
/// set with [`diff_path_sets`] and folded in with the same integration rule
/// commits use, so deletions survive as tombstones and re-creations list as
/// additions.
pub struct Replay<'a> {
    store: &'a Store,
    branch: u32,
    upto: u64,
    next: u64,
    failed: bool,
    acc: PathMap,
}

impl<'a> Replay<'a> {
    pub fn new(store: &'a Store, branch: u32, upto: u64) -> Self {
        Self {
            store,
            branch,
            upto,
            next: 0,
            failed: false,
            acc: PathMap::new(),
        }
    }

    /// The path set accumulated so far (complete once the iterator is
    /// exhausted without error).
    pub fn paths(&self) -> &PathMap {
        &self.acc
    }

    pub fn into_paths(self) -> PathMap {
        self.acc
    }
}

impl Iterator for Replay<'_> {
    type Item = Result<(u64, ChangeSet)>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed || self.next > self.upto {
            return None;
        }
        let revision = self.next;
        self.next += 1;

        let delta = match self.store.load_revision(self.branch, revision) {
            Ok(delta) => delta,
            Err(e) => {
                self.failed = true;
                return Some(Err(e));
            }
        };

        let changes = diff_path_sets(&self.acc, &delta);
        apply_changes(&mut self.acc, &changes);
        Some(Ok((revision, changes)))
    }
}

/// Reconstruct the full path set of `branch` at `revision`.
pub fn path_set(store: &Store, branch: u32, revision: u64) -> Result<PathMap> {
    let mut replay = Replay::new(store, branch, revision);
    while let Some(step) = replay.next() {
        step?;
    }
    Ok(replay.into_paths())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{PathInfo, PathMap};

    fn live(path: &str, size: u64, mtime: i64) -> PathInfo {
        PathInfo::new(crate::blob::namehash(path), size, mtime, None)
    }

    fn seeded_store(dir: &std::path::Path) -> Store {
        let store = Store::new(dir.join(".shelf"), false);

        // r0: full snapshot {a, b}
        let mut r0 = PathMap::new();
        r0.insert("a".into(), live("a", 1, 10));
        r0.insert("b".into(), live("b", 2, 10));
        store.save_revision(0, 0, &r0).unwrap();

        // r1: delta — modify a, delete b, add c
        let mut r1 = PathMap::new();
        r1.insert("a".into(), live("a", 5, 20));
        r1.insert("b".into(), PathInfo::tombstone(crate::blob::namehash("b"), 10));
        r1.insert("c".into(), live("c", 3, 20));
        store.save_revision(0, 1, &r1).unwrap();

        // r2: delta — re-create b
        let mut r2 = PathMap::new();
        r2.insert("b".into(), live("b", 9, 30));
        store.save_revision(0, 2, &r2).unwrap();

        store
    }

    #[test]
    fn incremental_steps_classify_changes() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(dir.path());

        let steps: Vec<_> = Replay::new(&store, 0, 2)
            .collect::<Result<Vec<_>>>()
            .unwrap();
        assert_eq!(steps.len(), 3);

        let (rev0, cs0) = &steps[0];
        assert_eq!(*rev0, 0);
        assert_eq!(cs0.additions.len(), 2);

        let (_, cs1) = &steps[1];
        assert_eq!(cs1.modifications.len(), 1);
        assert_eq!(cs1.deletions.len(), 1);
        assert_eq!(cs1.additions.len(), 1);

        // Re-creation over the tombstone is an addition.
        let (_, cs2) = &steps[2];
        assert_eq!(cs2.additions.len(), 1);
        assert!(cs2.modifications.is_empty());
    }

    #[test]
    fn path_set_folds_to_final_state() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(dir.path());

        let at1 = path_set(&store, 0, 1).unwrap();
        assert_eq!(at1["a"].size, Some(5));
        assert!(at1["b"].is_deleted());
        assert_eq!(at1["c"].size, Some(3));

        let at2 = path_set(&store, 0, 2).unwrap();
        assert_eq!(at2["b"].size, Some(9));
    }

    #[test]
    fn missing_record_surfaces_error_and_fuses() {
        let dir = tempfile::tempdir().unwrap();
        let store = seeded_store(dir.path());
        let mut replay = Replay::new(&store, 0, 5);
        let mut saw_err = false;
        for step in &mut replay {
            if step.is_err() {
                saw_err = true;
            }
        }
        assert!(saw_err);
    }
}
