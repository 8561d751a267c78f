use std::path::PathBuf;

/// All errors produced by shelf.
///
/// User-facing abort conditions (unknown or ambiguous references, name
/// collisions, dirty workspace, tracking mistakes) are distinct variants so
/// a CLI front end can translate them into exit codes without string
/// matching. Storage-integrity and I/O failures are kept separate because
/// they indicate corrupted history or environment problems rather than
/// operator mistakes.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("no repository found: {0}")]
    NoRepository(PathBuf),

    #[error("repository already exists at {0}")]
    RepositoryExists(PathBuf),

    #[error("unknown branch: {0}")]
    UnknownBranch(String),

    #[error("ambiguous branch reference: {0}")]
    AmbiguousBranch(String),

    #[error("unknown revision: {0}")]
    UnknownRevision(String),

    #[error("branch already exists: {0}")]
    BranchExists(String),

    #[error("tag already exists: {0}")]
    TagExists(String),

    #[error("pattern already tracked: {0}")]
    AlreadyTracked(String),

    #[error("pattern not tracked: {0}")]
    NotTracked(String),

    #[error("cannot remove the only branch")]
    LastBranch,

    #[error("cannot remove the current branch")]
    CurrentBranch,

    #[error("tracking patterns require track or picky mode")]
    TrackingDisabled,

    #[error("uncommitted changes in workspace: {0}")]
    DirtyWorkspace(String),

    #[error("workspace is behind the branch head (at revision {at}, head is {head}); switch to the head before committing")]
    BehindHead { at: u64, head: u64 },

    #[error("nothing to commit")]
    EmptyCommit,

    #[error("versioned file not found: {0}")]
    BlobMissing(String),

    #[error("unsupported repository format: {0}")]
    Format(u32),

    #[error("metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

// ---------------------------------------------------------------------------
// Convenience constructors
// ---------------------------------------------------------------------------

impl Error {
    pub fn unknown_branch(name: impl Into<String>) -> Self {
        Self::UnknownBranch(name.into())
    }

    pub fn ambiguous_branch(name: impl Into<String>) -> Self {
        Self::AmbiguousBranch(name.into())
    }

    pub fn unknown_revision(spec: impl Into<String>) -> Self {
        Self::UnknownRevision(spec.into())
    }

    pub fn branch_exists(name: impl Into<String>) -> Self {
        Self::BranchExists(name.into())
    }

    pub fn tag_exists(name: impl Into<String>) -> Self {
        Self::TagExists(name.into())
    }

    pub fn already_tracked(pattern: impl Into<String>) -> Self {
        Self::AlreadyTracked(pattern.into())
    }

    pub fn not_tracked(pattern: impl Into<String>) -> Self {
        Self::NotTracked(pattern.into())
    }

    pub fn dirty(msg: impl Into<String>) -> Self {
        Self::DirtyWorkspace(msg.into())
    }

    pub fn blob_missing(what: impl Into<String>) -> Self {
        Self::BlobMissing(what.into())
    }

    pub fn io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::Io(std::io::Error::new(
            err.kind(),
            format!("{}: {}", path.into().display(), err),
        ))
    }

    /// `true` for operator mistakes a CLI should report without a backtrace.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::NoRepository(_)
                | Self::RepositoryExists(_)
                | Self::UnknownBranch(_)
                | Self::AmbiguousBranch(_)
                | Self::UnknownRevision(_)
                | Self::BranchExists(_)
                | Self::TagExists(_)
                | Self::AlreadyTracked(_)
                | Self::NotTracked(_)
                | Self::LastBranch
                | Self::CurrentBranch
                | Self::TrackingDisabled
                | Self::DirtyWorkspace(_)
                | Self::BehindHead { .. }
                | Self::EmptyCommit
        )
    }
}
