//! Repository options and the persisted root metadata record.
//!
//! Global flags (`strict`, `track`, `picky`, `compress`) are read once at
//! repository creation and threaded through every operation as part of an
//! explicit [`Options`] value. There is no module-level state: multiple
//! repositories with different settings can coexist in one process.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Current on-disk metadata format. Bumped on incompatible record changes.
pub const REPO_FORMAT: u32 = 1;

/// Name of the metadata directory placed beside the working tree.
pub const META_DIR: &str = ".shelf";

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Settings supplied by the (external) configuration loader when a
/// repository is created. Persisted into the repository root record and
/// reloaded unchanged on open.
#[derive(Debug, Clone)]
pub struct Options {
    /// Always hash content during change detection instead of trusting
    /// size + mtime.
    pub strict: bool,
    /// SVN-like tracking mode: only files matching tracked patterns
    /// participate in versioning.
    pub track: bool,
    /// Tracking mode that clears tracked patterns after every commit,
    /// forcing re-declaration. Implies pattern-based tracking.
    pub picky: bool,
    /// Store content blobs gzip-compressed.
    pub compress: bool,
    /// File name patterns excluded from change detection.
    pub ignores: Vec<String>,
    /// Directory name patterns pruned during the tree walk.
    pub ignore_dirs: Vec<String>,
    /// File name patterns re-included even when an ignore pattern matches.
    pub whitelist: Vec<String>,
    /// Directory name patterns re-included even when ignored.
    pub whitelist_dirs: Vec<String>,
    /// Name given to the first branch on `init`.
    pub default_branch: Option<String>,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            strict: false,
            track: false,
            picky: false,
            compress: false,
            ignores: Vec::new(),
            ignore_dirs: Vec::new(),
            whitelist: Vec::new(),
            whitelist_dirs: Vec::new(),
            default_branch: None,
        }
    }
}

impl Options {
    /// `true` when versioning is restricted to explicitly tracked patterns
    /// (either `track` or `picky` mode).
    pub fn tracking(&self) -> bool {
        self.track || self.picky
    }
}

// ---------------------------------------------------------------------------
// RepoMeta — persisted root record
// ---------------------------------------------------------------------------

/// The repository root record (`repo.json`): global flags, current branch,
/// tag list, and the filter patterns captured at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RepoMeta {
    pub format: u32,
    pub strict: bool,
    pub track: bool,
    pub picky: bool,
    pub compress: bool,
    /// Currently checked-out branch number, if any branch exists.
    pub branch: Option<u32>,
    /// Next branch number to assign. Monotonic; removed numbers are never
    /// reused.
    pub next_branch: u32,
    /// Commit messages registered as tag names.
    pub tags: Vec<String>,
    pub ignores: Vec<String>,
    pub ignore_dirs: Vec<String>,
    pub whitelist: Vec<String>,
    pub whitelist_dirs: Vec<String>,
}

impl RepoMeta {
    pub fn new(options: &Options) -> Self {
        Self {
            format: REPO_FORMAT,
            strict: options.strict,
            track: options.track,
            picky: options.picky,
            compress: options.compress,
            branch: None,
            next_branch: 0,
            tags: Vec::new(),
            ignores: options.ignores.clone(),
            ignore_dirs: options.ignore_dirs.clone(),
            whitelist: options.whitelist.clone(),
            whitelist_dirs: options.whitelist_dirs.clone(),
        }
    }

    /// Reject records written by a newer, incompatible version.
    pub fn check_format(&self) -> Result<()> {
        if self.format != REPO_FORMAT {
            return Err(Error::Format(self.format));
        }
        Ok(())
    }

    /// Rebuild the in-memory options from a loaded record.
    pub fn options(&self) -> Options {
        Options {
            strict: self.strict,
            track: self.track,
            picky: self.picky,
            compress: self.compress,
            ignores: self.ignores.clone(),
            ignore_dirs: self.ignore_dirs.clone(),
            whitelist: self.whitelist.clone(),
            whitelist_dirs: self.whitelist_dirs.clone(),
            default_branch: None,
        }
    }
}
