//! Live-tree change detection.
//!
//! [`Detector`] walks the working tree depth-first, prunes ignored
//! directories, filters ignored file names (whitelists re-include), and
//! compares every surviving file against a baseline path set. Deletions are
//! computed directory by directory: a baseline path whose directory is being
//! visited but whose basename is absent from the listing is a deletion, and
//! baseline paths whose whole directory vanished are swept up after the
//! walk.
//!
//! Identical size + mtime short-circuits without hashing; strict mode (or an
//! explicit content check) forces the hash comparison instead — the
//! performance/safety trade-off exposed to users as `--strict`.
//!
//! Filesystem errors during stat/read propagate and abort the whole
//! operation; partially materialized revision directories are not rolled
//! back.

use std::path::Path;

use log::debug;

use crate::blob;
use crate::config::META_DIR;
use crate::error::{Error, Result};
use crate::model::{ChangeSet, PathInfo, PathMap};
use crate::pattern::{IgnoreFilter, TrackPattern};
use crate::store::Store;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Per-call switches for [`Detector::find_changes`].
#[derive(Default)]
pub struct DetectOptions<'a> {
    /// Hash content even when size + mtime match (in addition to the
    /// repository-wide strict flag).
    pub check_content: bool,
    /// Restrict detection to files covered by at least one tracking pattern
    /// whose declared directory equals the file's directory.
    pub consider_only: Option<&'a [TrackPattern]>,
    /// Materialize every addition/modification's content into this
    /// `(branch, revision)` blob directory, named by namehash.
    pub materialize: Option<(u32, u64)>,
}

// ---------------------------------------------------------------------------
// Detector
// ---------------------------------------------------------------------------

/// Compares the live tree under `root` against a baseline path set.
pub struct Detector<'a> {
    root: &'a Path,
    store: &'a Store,
    baseline: &'a PathMap,
    filter: &'a IgnoreFilter,
    strict: bool,
}

impl<'a> Detector<'a> {
    pub fn new(
        root: &'a Path,
        store: &'a Store,
        baseline: &'a PathMap,
        filter: &'a IgnoreFilter,
        strict: bool,
    ) -> Self {
        Self {
            root,
            store,
            baseline,
            filter,
            strict,
        }
    }

    /// Walk the live tree and produce the changeset versus the baseline.
    pub fn find_changes(&self, opts: &DetectOptions<'_>) -> Result<ChangeSet> {
        if let Some((branch, revision)) = opts.materialize {
            self.store.create_revision(branch, revision)?;
        }

        let mut changes = ChangeSet::new();
        self.walk_dir("", opts, &mut changes)?;
        self.sweep_vanished_dirs(opts, &mut changes)?;

        debug!("detected changes: {}", changes.summary());
        Ok(changes)
    }

    fn walk_dir(
        &self,
        rel_dir: &str,
        opts: &DetectOptions<'_>,
        changes: &mut ChangeSet,
    ) -> Result<()> {
        let abs_dir = if rel_dir.is_empty() {
            self.root.to_path_buf()
        } else {
            self.root.join(rel_dir)
        };

        let mut file_names: Vec<String> = Vec::new();
        let mut sub_dirs: Vec<String> = Vec::new();

        let entries = std::fs::read_dir(&abs_dir).map_err(|e| Error::io(&abs_dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&abs_dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            let file_type = entry.file_type().map_err(|e| Error::io(entry.path(), e))?;

            if file_type.is_dir() {
                if rel_dir.is_empty() && name == META_DIR {
                    continue;
                }
                if !self.filter.skip_dir(&name) {
                    sub_dirs.push(name);
                }
            } else if file_type.is_file() {
                file_names.push(name);
            }
            // Symlinks and special files are not versioned.
        }

        // Deletions first: baseline entries of this directory whose basename
        // is gone from the listing. Presence on disk counts even when the
        // name is currently ignored.
        self.detect_deletions(rel_dir, &file_names, opts, changes);

        for name in &file_names {
            if self.filter.skip_file(name) {
                continue;
            }
            if let Some(patterns) = opts.consider_only {
                if !crate::pattern::tracked(patterns, rel_dir, name) {
                    continue;
                }
            }
            self.examine_file(rel_dir, name, opts, changes)?;
        }

        for name in &sub_dirs {
            let sub_rel = join_rel(rel_dir, name);
            self.walk_dir(&sub_rel, opts, changes)?;
        }
        Ok(())
    }

    fn detect_deletions(
        &self,
        rel_dir: &str,
        listing: &[String],
        opts: &DetectOptions<'_>,
        changes: &mut ChangeSet,
    ) {
        for (path, info) in self.baseline.range(range_of_dir(rel_dir)) {
            if info.is_deleted() || dirname(path) != rel_dir {
                continue;
            }
            let base = basename(path);
            if listing.iter().any(|n| n == base) {
                continue;
            }
            if let Some(patterns) = opts.consider_only {
                if !crate::pattern::tracked(patterns, rel_dir, base) {
                    continue;
                }
            }
            changes
                .deletions
                .insert(path.clone(), PathInfo::tombstone(&info.namehash, info.mtime));
        }
    }

    /// Baseline paths whose entire directory no longer exists never get a
    /// per-directory pass; sweep them afterwards.
    fn sweep_vanished_dirs(
        &self,
        opts: &DetectOptions<'_>,
        changes: &mut ChangeSet,
    ) -> Result<()> {
        for (path, info) in self.baseline {
            if info.is_deleted() || changes.deletions.contains_key(path) {
                continue;
            }
            let dir = dirname(path);
            if dir.is_empty() || self.root.join(dir).is_dir() {
                continue;
            }
            if let Some(patterns) = opts.consider_only {
                if !crate::pattern::tracked(patterns, dir, basename(path)) {
                    continue;
                }
            }
            changes
                .deletions
                .insert(path.clone(), PathInfo::tombstone(&info.namehash, info.mtime));
        }
        Ok(())
    }

    fn examine_file(
        &self,
        rel_dir: &str,
        name: &str,
        opts: &DetectOptions<'_>,
        changes: &mut ChangeSet,
    ) -> Result<()> {
        let rel_path = join_rel(rel_dir, name);
        let abs_path = self.root.join(&rel_path);
        let meta = std::fs::metadata(&abs_path).map_err(|e| Error::io(&abs_path, e))?;
        let size = meta.len();
        let mtime = mtime_millis(&meta);
        let nh = blob::namehash(&rel_path);

        let previous = self.baseline.get(&rel_path).filter(|p| !p.is_deleted());

        let changed = match previous {
            // Unknown, or known but previously deleted: an addition either
            // way (re-creation never resurrects as a modification).
            None => {
                let hash = self.hash_if_nonempty(&abs_path, size)?;
                changes
                    .additions
                    .insert(rel_path.clone(), PathInfo::new(&nh, size, mtime, hash));
                true
            }
            Some(prev) => {
                let stat_same = prev.size == Some(size) && prev.mtime == mtime;
                let modified = if stat_same {
                    if self.strict || opts.check_content {
                        let hash = self.hash_if_nonempty(&abs_path, size)?;
                        match (&prev.hash, &hash) {
                            (Some(a), Some(b)) => a != b,
                            _ => false,
                        }
                    } else {
                        false
                    }
                } else {
                    true
                };

                if modified {
                    let hash = self.hash_if_nonempty(&abs_path, size)?;
                    changes
                        .modifications
                        .insert(rel_path.clone(), PathInfo::new(&nh, size, mtime, hash));
                }
                modified
            }
        };

        if changed {
            if let Some((branch, revision)) = opts.materialize {
                let blob_path = self.store.blob_path(branch, revision, &nh);
                blob::write_blob(&abs_path, &blob_path, self.store.compress())?;
            }
        }
        Ok(())
    }

    fn hash_if_nonempty(&self, path: &Path, size: u64) -> Result<Option<String>> {
        if size == 0 {
            return Ok(None);
        }
        blob::content_hash(path).map(Some)
    }
}

// ---------------------------------------------------------------------------
// Path helpers
// ---------------------------------------------------------------------------

fn join_rel(dir: &str, name: &str) -> String {
    if dir.is_empty() {
        name.to_string()
    } else {
        format!("{}/{}", dir, name)
    }
}

fn dirname(path: &str) -> &str {
    path.rsplit_once('/').map(|(d, _)| d).unwrap_or("")
}

fn basename(path: &str) -> &str {
    path.rsplit_once('/').map(|(_, b)| b).unwrap_or(path)
}

/// Narrow a `BTreeMap` range to keys that can live in `dir`. Keys are
/// slash-ordered, so `"dir/"`-prefixed keys are contiguous; the root range
/// has to span everything because top-level names sort among prefixed ones.
fn range_of_dir(dir: &str) -> std::ops::RangeFrom<String> {
    if dir.is_empty() {
        String::new()..
    } else {
        format!("{}/", dir)..
    }
}

/// A file's modification time in milliseconds since the Unix epoch.
pub fn mtime_millis(meta: &std::fs::Metadata) -> i64 {
    match meta.modified() {
        Ok(t) => match t.duration_since(std::time::UNIX_EPOCH) {
            Ok(d) => d.as_millis() as i64,
            Err(e) => -(e.duration().as_millis() as i64),
        },
        Err(_) => 0,
    }
}
