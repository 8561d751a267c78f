//! Path, changeset, branch, and commit records.
//!
//! All records are plain values with named fields and serde derives; they
//! are created fresh per operation and never mutated in place. The path set
//! for a branch revision is a [`PathMap`]; a [`ChangeSet`] is the difference
//! between two path sets (or between a path set and the live tree).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Workspace-relative slash path → file record.
///
/// `BTreeMap` keeps iteration and serialization deterministic.
pub type PathMap = BTreeMap<String, PathInfo>;

// ---------------------------------------------------------------------------
// PathInfo
// ---------------------------------------------------------------------------

/// One versioned file's record.
///
/// `size == None` is the deletion tombstone; `hash` is `None` when the file
/// is empty, deleted, or its content was not (re)hashed. `namehash` is a
/// hash of the path string — the blob's on-disk filename — not a content
/// hash, so identical content at two paths is stored twice.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PathInfo {
    pub namehash: String,
    pub size: Option<u64>,
    /// Modification time in milliseconds since the Unix epoch.
    pub mtime: i64,
    pub hash: Option<String>,
}

impl PathInfo {
    pub fn new(namehash: impl Into<String>, size: u64, mtime: i64, hash: Option<String>) -> Self {
        Self {
            namehash: namehash.into(),
            size: Some(size),
            mtime,
            hash,
        }
    }

    /// A deletion tombstone carrying the baseline's mtime.
    pub fn tombstone(namehash: impl Into<String>, mtime: i64) -> Self {
        Self {
            namehash: namehash.into(),
            size: None,
            mtime,
            hash: None,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.size.is_none()
    }

    /// Stat-level difference: size, mtime, or (when both sides were hashed)
    /// content hash. Records with one unhashed side compare by stat only.
    pub fn differs(&self, other: &PathInfo) -> bool {
        if self.size != other.size || self.mtime != other.mtime {
            return true;
        }
        match (&self.hash, &other.hash) {
            (Some(a), Some(b)) => a != b,
            _ => false,
        }
    }
}

// ---------------------------------------------------------------------------
// ChangeSet
// ---------------------------------------------------------------------------

/// Difference between a baseline path set and a newer state.
///
/// The three maps are pairwise key-disjoint; `deletions` entries always
/// carry `size = None`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeSet {
    pub additions: PathMap,
    pub deletions: PathMap,
    pub modifications: PathMap,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// `true` when nothing changed.
    pub fn is_empty(&self) -> bool {
        self.additions.is_empty() && self.deletions.is_empty() && self.modifications.is_empty()
    }

    /// Total number of changed paths.
    pub fn len(&self) -> usize {
        self.additions.len() + self.deletions.len() + self.modifications.len()
    }

    /// Merge the three maps into the single delta record persisted for a
    /// revision. Deletions appear as tombstones.
    pub fn delta(&self) -> PathMap {
        let mut out = PathMap::new();
        for (path, info) in &self.additions {
            out.insert(path.clone(), info.clone());
        }
        for (path, info) in &self.modifications {
            out.insert(path.clone(), info.clone());
        }
        for (path, info) in &self.deletions {
            out.insert(path.clone(), info.clone());
        }
        out
    }

    /// One-line human summary (used for dirty-workspace errors).
    pub fn summary(&self) -> String {
        format!(
            "{} added, {} deleted, {} modified",
            self.additions.len(),
            self.deletions.len(),
            self.modifications.len()
        )
    }
}

/// Fold a changeset into an accumulated path set.
///
/// This is the single integration rule shared by commit and sequential
/// replay: additions and modifications replace the record wholesale;
/// deletions leave a tombstone so a later re-creation is classified as an
/// addition rather than a modification.
pub fn apply_changes(paths: &mut PathMap, changes: &ChangeSet) {
    for (path, info) in &changes.additions {
        paths.insert(path.clone(), info.clone());
    }
    for (path, info) in &changes.modifications {
        paths.insert(path.clone(), info.clone());
    }
    for (path, info) in &changes.deletions {
        paths.insert(path.clone(), info.clone());
    }
}

/// Compare two path sets.
///
/// Pure function over the records: a path only in `new` (or present in
/// `old` as a tombstone) is an addition; a live `old` record facing a
/// tombstone in `new` is a deletion; records present live on both sides and
/// differing on (size, mtime, hash) yield a modification carrying the `new`
/// record. Paths only in `old` produce nothing — deciding that a path
/// vanished requires directory-listing context, which belongs to the change
/// detector.
pub fn diff_path_sets(old: &PathMap, new: &PathMap) -> ChangeSet {
    let mut changes = ChangeSet::new();

    for (path, info) in new {
        match old.get(path) {
            None => {
                if !info.is_deleted() {
                    changes.additions.insert(path.clone(), info.clone());
                }
                // Tombstone for a path the baseline never had: nothing.
            }
            Some(prev) if prev.is_deleted() => {
                // Re-creation over a tombstone is an addition, not a
                // modification; tombstone-over-tombstone is a no-op.
                if !info.is_deleted() {
                    changes.additions.insert(path.clone(), info.clone());
                }
            }
            Some(prev) => {
                if info.is_deleted() {
                    changes.deletions.insert(path.clone(), info.clone());
                } else if prev.differs(info) {
                    changes.modifications.insert(path.clone(), info.clone());
                }
            }
        }
    }

    changes
}

// ---------------------------------------------------------------------------
// BranchInfo / CommitInfo
// ---------------------------------------------------------------------------

/// One commit's metadata. Revision numbers are dense per branch starting at
/// 0; revision 0 is the branch's creation point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommitInfo {
    pub number: u64,
    /// Creation time in milliseconds since the Unix epoch.
    pub ctime: i64,
    pub message: Option<String>,
}

/// One branch's metadata, including its ordered commit map.
///
/// Branch numbers are dense, monotonic, unique per repository, and never
/// reused after removal. `insync` is an advisory flag meaning "no
/// uncommitted changes since the last sync to the outer VCS"; it is set by
/// callers outside this crate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchInfo {
    pub number: u32,
    pub ctime: i64,
    pub name: Option<String>,
    pub insync: bool,
    /// Tracked glob patterns (track/picky modes); empty in simple mode.
    pub tracked: Vec<String>,
    pub commits: BTreeMap<u64, CommitInfo>,
}

impl BranchInfo {
    pub fn new(number: u32, ctime: i64, name: Option<String>) -> Self {
        Self {
            number,
            ctime,
            name,
            insync: false,
            tracked: Vec::new(),
            commits: BTreeMap::new(),
        }
    }

    /// Highest committed revision number. Revision 0 always exists once the
    /// branch has been persisted.
    pub fn head(&self) -> u64 {
        self.commits.keys().next_back().copied().unwrap_or(0)
    }
}

/// Milliseconds since the Unix epoch, for `ctime`/`mtime` fields.
pub fn now_millis() -> i64 {
    match std::time::SystemTime::now().duration_since(std::time::UNIX_EPOCH) {
        Ok(d) => d.as_millis() as i64,
        Err(e) => -(e.duration().as_millis() as i64),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn live(nh: &str, size: u64, mtime: i64, hash: &str) -> PathInfo {
        PathInfo::new(nh, size, mtime, Some(hash.to_string()))
    }

    fn map(entries: &[(&str, PathInfo)]) -> PathMap {
        entries
            .iter()
            .map(|(p, i)| (p.to_string(), i.clone()))
            .collect()
    }

    #[test]
    fn diff_identical_is_empty() {
        let a = map(&[
            ("a.txt", live("n1", 3, 100, "h1")),
            ("b.txt", live("n2", 5, 200, "h2")),
        ]);
        let cs = diff_path_sets(&a, &a);
        assert!(cs.is_empty());
    }

    #[test]
    fn diff_new_path_is_addition() {
        let old = PathMap::new();
        let new = map(&[("a.txt", live("n1", 3, 100, "h1"))]);
        let cs = diff_path_sets(&old, &new);
        assert_eq!(cs.additions.len(), 1);
        assert!(cs.deletions.is_empty());
        assert!(cs.modifications.is_empty());
    }

    #[test]
    fn diff_resurrection_is_addition_not_modification() {
        let old = map(&[("a.txt", PathInfo::tombstone("n1", 100))]);
        let new = map(&[("a.txt", live("n1", 3, 150, "h1"))]);
        let cs = diff_path_sets(&old, &new);
        assert_eq!(cs.additions.len(), 1);
        assert!(cs.modifications.is_empty());
    }

    #[test]
    fn diff_tombstone_over_live_is_deletion() {
        let old = map(&[("a.txt", live("n1", 3, 100, "h1"))]);
        let new = map(&[("a.txt", PathInfo::tombstone("n1", 100))]);
        let cs = diff_path_sets(&old, &new);
        assert_eq!(cs.deletions.len(), 1);
        assert!(cs.deletions["a.txt"].is_deleted());
    }

    #[test]
    fn diff_tombstone_over_tombstone_is_nothing() {
        let old = map(&[("a.txt", PathInfo::tombstone("n1", 100))]);
        let new = map(&[("a.txt", PathInfo::tombstone("n1", 100))]);
        assert!(diff_path_sets(&old, &new).is_empty());
    }

    #[test]
    fn diff_old_only_path_is_ignored() {
        // Deciding a path vanished needs directory context; not this
        // function's job.
        let old = map(&[("a.txt", live("n1", 3, 100, "h1"))]);
        let new = PathMap::new();
        assert!(diff_path_sets(&old, &new).is_empty());
    }

    #[test]
    fn diff_changed_record_is_modification_with_new_side() {
        let old = map(&[("a.txt", live("n1", 3, 100, "h1"))]);
        let new = map(&[("a.txt", live("n1", 4, 150, "h2"))]);
        let cs = diff_path_sets(&old, &new);
        assert_eq!(cs.modifications.len(), 1);
        assert_eq!(cs.modifications["a.txt"].size, Some(4));
        assert_eq!(cs.modifications["a.txt"].hash.as_deref(), Some("h2"));
    }

    #[test]
    fn differs_ignores_missing_hash() {
        let a = live("n1", 3, 100, "h1");
        let mut b = a.clone();
        b.hash = None;
        assert!(!a.differs(&b));
    }

    #[test]
    fn apply_changes_keeps_tombstones() {
        let mut acc = map(&[("a.txt", live("n1", 3, 100, "h1"))]);
        let mut cs = ChangeSet::new();
        cs.deletions
            .insert("a.txt".into(), PathInfo::tombstone("n1", 100));
        apply_changes(&mut acc, &cs);
        assert!(acc["a.txt"].is_deleted());
    }

    #[test]
    fn delta_merges_all_three_maps() {
        let mut cs = ChangeSet::new();
        cs.additions.insert("a".into(), live("n1", 1, 1, "h"));
        cs.modifications.insert("b".into(), live("n2", 2, 2, "h"));
        cs.deletions.insert("c".into(), PathInfo::tombstone("n3", 3));
        let delta = cs.delta();
        assert_eq!(delta.len(), 3);
        assert!(delta["c"].is_deleted());
    }

    #[test]
    fn branch_head_is_last_commit() {
        let mut b = BranchInfo::new(0, 0, None);
        assert_eq!(b.head(), 0);
        for n in 0..3 {
            b.commits.insert(
                n,
                CommitInfo {
                    number: n,
                    ctime: 0,
                    message: None,
                },
            );
        }
        assert_eq!(b.head(), 2);
    }
}
