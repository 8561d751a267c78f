//! A self-contained, branch-aware versioned workspace store.
//!
//! `shelf` keeps delta-based revision history for a directory tree inside a
//! single `.shelf/` metadata directory beside the tree, without any daemon
//! or network dependency. Branches are numbered; each branch starts with a
//! full snapshot (revision 0) and stores every later revision as a pure
//! delta, reconstructed by sequential replay.
//!
//! # Key types
//!
//! - [`Workspace`] — opens (or creates) a repository and drives the whole
//!   lifecycle: change detection, commits, branch creation and removal,
//!   switch, merge-driven update, diff, and history.
//! - [`ChangeSet`] — additions, deletions, and modifications between a live
//!   tree and a stored baseline.
//! - [`MergeOptions`] / [`ConflictPrompt`] — policy and interactive hook
//!   for the line-oriented merge engine.
//!
//! # Quick example
//!
//! ```rust,no_run
//! use shelf::{Options, Workspace};
//!
//! let mut ws = Workspace::init("/tmp/project", Options::default()).unwrap();
//! // ... edit files under /tmp/project ...
//! let changes = ws.changes(false).unwrap();
//! if !changes.is_empty() {
//!     ws.commit(Some("first pass"), false).unwrap();
//! }
//! ```

pub mod blob;
pub mod config;
pub mod detect;
pub mod error;
pub mod merge;
pub mod model;
pub mod pattern;
pub mod replay;
pub mod repo;
pub mod store;

// Re-export primary public types at crate root.
pub use config::{Options, RepoMeta, META_DIR, REPO_FORMAT};
pub use error::{Error, Result};
pub use merge::{
    BlockKind, ConflictPrompt, ConflictResolution, DiffBlock, MergeOperation, MergeOptions,
};
pub use model::{BranchInfo, ChangeSet, CommitInfo, PathInfo, PathMap};
pub use pattern::{IgnoreFilter, TrackPattern};
pub use repo::Workspace;
pub use replay::Replay;
pub use store::Store;
