//! Persistence layer for branch and revision records and their blobs.
//!
//! On-disk layout under the metadata root:
//!
//! ```text
//! .shelf/
//!   repo.json          repository root record
//!   b<N>/              one subtree per branch
//!     branch.json      branch record (ordered commit map)
//!     r<R>/            one directory per revision
//!       paths.json     path record: full snapshot at r0, delta afterwards
//!       <namehash>     content blobs for paths changed in this revision
//! ```
//!
//! A path untouched since revision K has no blob in revisions > K;
//! [`Store::find_revision`] scans backward to the nearest revision that
//! physically holds the blob. Records are only ever appended to or removed
//! wholesale with their branch subtree.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use filetime::FileTime;
use log::debug;

use crate::blob;
use crate::config::RepoMeta;
use crate::error::{Error, Result};
use crate::model::{BranchInfo, PathInfo, PathMap};

const REPO_RECORD: &str = "repo.json";
const BRANCH_RECORD: &str = "branch.json";
const PATHS_RECORD: &str = "paths.json";

/// Low-level access to one repository's metadata directory.
#[derive(Debug, Clone)]
pub struct Store {
    dir: PathBuf,
    compress: bool,
}

impl Store {
    pub fn new(dir: impl Into<PathBuf>, compress: bool) -> Self {
        Self {
            dir: dir.into(),
            compress,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn compress(&self) -> bool {
        self.compress
    }

    // -----------------------------------------------------------------
    // Layout
    // -----------------------------------------------------------------

    pub fn branch_dir(&self, branch: u32) -> PathBuf {
        self.dir.join(format!("b{}", branch))
    }

    pub fn revision_dir(&self, branch: u32, revision: u64) -> PathBuf {
        self.branch_dir(branch).join(format!("r{}", revision))
    }

    pub fn blob_path(&self, branch: u32, revision: u64, namehash: &str) -> PathBuf {
        self.revision_dir(branch, revision).join(namehash)
    }

    // -----------------------------------------------------------------
    // Root record
    // -----------------------------------------------------------------

    pub fn save_meta(&self, meta: &RepoMeta) -> Result<()> {
        std::fs::create_dir_all(&self.dir).map_err(|e| Error::io(&self.dir, e))?;
        write_record(&self.dir.join(REPO_RECORD), meta)
    }

    pub fn load_meta(&self) -> Result<RepoMeta> {
        let path = self.dir.join(REPO_RECORD);
        if !path.exists() {
            return Err(Error::NoRepository(self.dir.clone()));
        }
        let meta: RepoMeta = read_record(&path)?;
        meta.check_format()?;
        Ok(meta)
    }

    /// `true` when a repository root record exists under this directory.
    pub fn exists(&self) -> bool {
        self.dir.join(REPO_RECORD).exists()
    }

    // -----------------------------------------------------------------
    // Branch records
    // -----------------------------------------------------------------

    pub fn save_branch(&self, branch: &BranchInfo) -> Result<()> {
        let dir = self.branch_dir(branch.number);
        std::fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
        debug!("saving branch {} ({} commits)", branch.number, branch.commits.len());
        write_record(&dir.join(BRANCH_RECORD), branch)
    }

    pub fn load_branch(&self, branch: u32) -> Result<BranchInfo> {
        let path = self.branch_dir(branch).join(BRANCH_RECORD);
        if !path.exists() {
            return Err(Error::unknown_branch(branch.to_string()));
        }
        read_record(&path)
    }

    /// All branch records, ordered by branch number.
    pub fn list_branches(&self) -> Result<Vec<BranchInfo>> {
        let mut numbers: Vec<u32> = Vec::new();
        let entries = std::fs::read_dir(&self.dir).map_err(|e| Error::io(&self.dir, e))?;
        for entry in entries {
            let entry = entry.map_err(|e| Error::io(&self.dir, e))?;
            let name = entry.file_name().to_string_lossy().into_owned();
            if let Some(num) = name.strip_prefix('b') {
                if let Ok(n) = num.parse::<u32>() {
                    numbers.push(n);
                }
            }
        }
        numbers.sort_unstable();
        numbers.into_iter().map(|n| self.load_branch(n)).collect()
    }

    /// Delete a branch's entire subtree (records and blobs).
    pub fn remove_branch(&self, branch: u32) -> Result<()> {
        let dir = self.branch_dir(branch);
        debug!("removing branch subtree {}", dir.display());
        std::fs::remove_dir_all(&dir).map_err(|e| Error::io(&dir, e))
    }

    // -----------------------------------------------------------------
    // Revision records
    // -----------------------------------------------------------------

    /// Create the revision directory. Called before the change detector
    /// materializes blobs into it.
    pub fn create_revision(&self, branch: u32, revision: u64) -> Result<()> {
        let dir = self.revision_dir(branch, revision);
        std::fs::create_dir_all(&dir).map_err(|e| Error::io(&dir, e))
    }

    /// Persist a revision's path record: the full snapshot at revision 0, a
    /// pure delta for every later revision.
    pub fn save_revision(&self, branch: u32, revision: u64, paths: &PathMap) -> Result<()> {
        self.create_revision(branch, revision)?;
        let path = self.revision_dir(branch, revision).join(PATHS_RECORD);
        debug!(
            "saving revision {}/{} ({} paths)",
            branch,
            revision,
            paths.len()
        );
        write_record(&path, paths)
    }

    pub fn load_revision(&self, branch: u32, revision: u64) -> Result<PathMap> {
        let path = self.revision_dir(branch, revision).join(PATHS_RECORD);
        if !path.exists() {
            return Err(Error::unknown_revision(format!("{}/{}", branch, revision)));
        }
        read_record(&path)
    }

    // -----------------------------------------------------------------
    // Blob retrieval
    // -----------------------------------------------------------------

    /// Locate the nearest revision <= `revision` whose directory physically
    /// holds the blob named `namehash`. Underflowing below revision 0 is a
    /// storage-integrity failure: the record claims a blob that history
    /// never stored.
    pub fn find_revision(
        &self,
        branch: u32,
        revision: u64,
        namehash: &str,
    ) -> Result<(u64, PathBuf)> {
        let mut rev = revision;
        loop {
            let candidate = self.blob_path(branch, rev, namehash);
            if candidate.exists() {
                return Ok((rev, candidate));
            }
            if rev == 0 {
                return Err(Error::blob_missing(format!(
                    "{} in branch {} at or below revision {}",
                    namehash, branch, revision
                )));
            }
            rev -= 1;
        }
    }

    /// Read a versioned file's content by backward scan.
    pub fn read_versioned(&self, branch: u32, revision: u64, namehash: &str) -> Result<Vec<u8>> {
        let (_, path) = self.find_revision(branch, revision, namehash)?;
        blob::read_blob(&path, self.compress)
    }

    /// Restore a versioned file to `dest`, content and recorded mtime both.
    pub fn restore_versioned(
        &self,
        branch: u32,
        revision: u64,
        info: &PathInfo,
        dest: &Path,
    ) -> Result<()> {
        let (found, path) = self.find_revision(branch, revision, &info.namehash)?;
        debug!(
            "restoring {} from {}/{} to {}",
            info.namehash,
            branch,
            found,
            dest.display()
        );
        blob::restore_blob(&path, dest, self.compress)?;
        set_mtime(dest, info.mtime)
    }

    // -----------------------------------------------------------------
    // Branch duplication
    // -----------------------------------------------------------------

    /// Materialize `paths` — an accumulated path set of the source branch —
    /// as revision 0 of `new_branch`, physically copying every live blob.
    ///
    /// The copies keep the "revision 0 is a full snapshot" invariant
    /// independent of how deep the source branch's own history is: each
    /// blob is resolved by backward scan from `src_revision` first.
    pub fn duplicate_branch(
        &self,
        src_branch: u32,
        src_revision: u64,
        paths: &PathMap,
        new_branch: u32,
    ) -> Result<()> {
        self.create_revision(new_branch, 0)?;
        for (path, info) in paths {
            if info.is_deleted() {
                continue;
            }
            let (_, src) = self
                .find_revision(src_branch, src_revision, &info.namehash)
                .map_err(|_| Error::blob_missing(path.clone()))?;
            let dest = self.blob_path(new_branch, 0, &info.namehash);
            blob::copy_blob(&src, &dest)?;
        }
        Ok(())
    }
}

/// Apply a recorded millisecond mtime to a live file.
pub fn set_mtime(path: &Path, mtime_millis: i64) -> Result<()> {
    let secs = mtime_millis.div_euclid(1000);
    let nanos = (mtime_millis.rem_euclid(1000) as u32) * 1_000_000;
    filetime::set_file_mtime(path, FileTime::from_unix_time(secs, nanos))
        .map_err(|e| Error::io(path, e))
}

// ---------------------------------------------------------------------------
// JSON record helpers
// ---------------------------------------------------------------------------

fn write_record<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = File::create(path).map_err(|e| Error::io(path, e))?;
    serde_json::to_writer(BufWriter::new(file), value)?;
    Ok(())
}

fn read_record<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let file = File::open(path).map_err(|e| Error::io(path, e))?;
    Ok(serde_json::from_reader(BufReader::new(file))?)
}
