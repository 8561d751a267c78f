//! The workspace: branch and commit lifecycle over one repository.
//!
//! [`Workspace`] owns the in-memory state for a single operation: the
//! loaded root record, the branch map, and the current branch's accumulated
//! path set (reconstructed by sequential replay on open). Exactly one actor
//! is assumed to operate on a workspace at a time; there is no repository
//! lock, and the dirty-state guard is check-then-act.
//!
//! Verb mapping for the CLI collaborator: `offline` → [`Workspace::init`],
//! `branch` → [`Workspace::create_branch`], `switch`/`update`/`delete`/
//! `commit`/`changes`/`diff`/`add`/`rm`/`ls`/`log` map to the equally named
//! methods; `status` reads the accessors. Argument parsing, prompting, and
//! output formatting stay outside this crate.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, info};

use crate::config::{Options, RepoMeta, META_DIR};
use crate::detect::{DetectOptions, Detector};
use crate::error::{Error, Result};
use crate::merge::{self, ConflictPrompt, ConflictResolution, DiffBlock, MergeOptions};
use crate::model::{
    apply_changes, now_millis, BranchInfo, ChangeSet, CommitInfo, PathInfo, PathMap,
};
use crate::pattern::{IgnoreFilter, TrackPattern};
use crate::replay::{self, Replay};
use crate::store::Store;

/// A workspace with its repository metadata loaded.
pub struct Workspace {
    root: PathBuf,
    store: Store,
    options: Options,
    meta: RepoMeta,
    filter: IgnoreFilter,
    branches: BTreeMap<u32, BranchInfo>,
    /// Revision of the current branch the baseline corresponds to.
    revision: u64,
    /// Accumulated path set of the baseline (current branch at its head, or
    /// the revision last switched to within this instance).
    paths: PathMap,
}

impl Workspace {
    // -----------------------------------------------------------------
    // Open / init / find
    // -----------------------------------------------------------------

    /// Create repository metadata beside the tree at `root` and record the
    /// first branch ("go offline").
    ///
    /// In simple mode the live tree is snapshotted into the branch's
    /// revision 0; in track/picky mode revision 0 starts empty because only
    /// explicitly tracked paths are meaningful.
    pub fn init(root: impl Into<PathBuf>, options: Options) -> Result<Self> {
        let root = root.into();
        let store = Store::new(root.join(META_DIR), options.compress);
        if store.exists() {
            return Err(Error::RepositoryExists(store.dir().to_path_buf()));
        }

        let meta = RepoMeta::new(&options);
        let filter = filter_from(&options);
        let mut ws = Self {
            root,
            store,
            options,
            meta,
            filter,
            branches: BTreeMap::new(),
            revision: 0,
            paths: PathMap::new(),
        };
        ws.store.save_meta(&ws.meta)?;

        let name = ws.options.default_branch.clone();
        ws.create_branch(name.as_deref())?;
        info!("initialized repository at {}", ws.store.dir().display());
        Ok(ws)
    }

    /// Open the repository whose metadata lives beside `root`, replaying
    /// the current branch to its head.
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        let bootstrap = Store::new(root.join(META_DIR), false);
        let meta = bootstrap.load_meta()?;
        let options = meta.options();
        let store = Store::new(root.join(META_DIR), options.compress);
        let filter = filter_from(&options);

        let mut branches = BTreeMap::new();
        for branch in store.list_branches()? {
            branches.insert(branch.number, branch);
        }

        let (revision, paths) = match meta.branch {
            Some(number) => {
                let head = branches
                    .get(&number)
                    .ok_or_else(|| Error::unknown_branch(number.to_string()))?
                    .head();
                (head, replay::path_set(&store, number, head)?)
            }
            None => (0, PathMap::new()),
        };

        Ok(Self {
            root,
            store,
            options,
            meta,
            filter,
            branches,
            revision,
            paths,
        })
    }

    /// Ascend from `start` to the nearest ancestor holding repository
    /// metadata.
    pub fn find(start: impl AsRef<Path>) -> Result<PathBuf> {
        let start = start.as_ref();
        let mut dir = Some(start);
        while let Some(d) = dir {
            if Store::new(d.join(META_DIR), false).exists() {
                return Ok(d.to_path_buf());
            }
            dir = d.parent();
        }
        Err(Error::NoRepository(start.to_path_buf()))
    }

    // -----------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn options(&self) -> &Options {
        &self.options
    }

    pub fn branches(&self) -> impl Iterator<Item = &BranchInfo> {
        self.branches.values()
    }

    pub fn current(&self) -> Option<u32> {
        self.meta.branch
    }

    pub fn current_branch(&self) -> Option<&BranchInfo> {
        self.meta.branch.and_then(|n| self.branches.get(&n))
    }

    /// Revision of the current branch the baseline corresponds to.
    pub fn revision(&self) -> u64 {
        self.revision
    }

    /// The baseline path set (tombstones included).
    pub fn paths(&self) -> &PathMap {
        &self.paths
    }

    pub fn tags(&self) -> &[String] {
        &self.meta.tags
    }

    /// Known paths with their tracking status: every live baseline path, and
    /// whether a tracking pattern (or simple mode) covers it.
    pub fn ls(&self) -> Vec<(String, bool)> {
        let patterns = self.tracked_patterns();
        self.paths
            .iter()
            .filter(|(_, info)| !info.is_deleted())
            .map(|(path, _)| {
                let covered = match &patterns {
                    Some(pats) => pats.iter().any(|p| p.matches_path(path)),
                    None => true,
                };
                (path.clone(), covered)
            })
            .collect()
    }

    /// Advisory "synced to the outer VCS" flag on the current branch.
    pub fn set_insync(&mut self, insync: bool) -> Result<()> {
        let branch = self.require_current()?;
        if let Some(b) = self.branches.get_mut(&branch) {
            b.insync = insync;
            self.store.save_branch(b)?;
        }
        Ok(())
    }

    // -----------------------------------------------------------------
    // Reference resolution
    // -----------------------------------------------------------------

    /// Resolve a branch reference: exact number, exact name, then unique
    /// case-insensitive name prefix.
    pub fn resolve_branch(&self, spec: &str) -> Result<u32> {
        if let Ok(number) = spec.parse::<u32>() {
            if self.branches.contains_key(&number) {
                return Ok(number);
            }
        }
        if let Some(b) = self
            .branches
            .values()
            .find(|b| b.name.as_deref() == Some(spec))
        {
            return Ok(b.number);
        }

        let lowered = spec.to_lowercase();
        let matches: Vec<u32> = self
            .branches
            .values()
            .filter(|b| {
                b.name
                    .as_deref()
                    .map(|n| n.to_lowercase().starts_with(&lowered))
                    .unwrap_or(false)
            })
            .map(|b| b.number)
            .collect();
        match matches.len() {
            0 => Err(Error::unknown_branch(spec)),
            1 => Ok(matches[0]),
            _ => Err(Error::ambiguous_branch(spec)),
        }
    }

    /// Resolve a revision reference on `branch`. `None` means the head;
    /// negative numbers count back from it (`-1` = latest).
    pub fn resolve_revision(&self, branch: u32, spec: Option<i64>) -> Result<u64> {
        let info = self
            .branches
            .get(&branch)
            .ok_or_else(|| Error::unknown_branch(branch.to_string()))?;
        let head = info.head() as i64;
        let revision = match spec {
            None => head,
            Some(n) if n >= 0 => n,
            Some(n) => head + 1 + n,
        };
        if revision < 0 || revision > head {
            return Err(Error::unknown_revision(format!(
                "{:?} on branch {}",
                spec, branch
            )));
        }
        Ok(revision as u64)
    }

    /// Parse a `branch`, `branch/revision`, or `/revision` reference against
    /// the current branch.
    pub fn parse_ref(&self, spec: &str) -> Result<(u32, u64)> {
        let (branch_part, rev_part) = match spec.split_once('/') {
            Some((b, r)) => (b, Some(r)),
            None => (spec, None),
        };
        let branch = if branch_part.is_empty() {
            self.require_current()?
        } else {
            self.resolve_branch(branch_part)?
        };
        let revision = match rev_part {
            None | Some("") => None,
            Some(r) => Some(
                r.parse::<i64>()
                    .map_err(|_| Error::unknown_revision(spec))?,
            ),
        };
        Ok((branch, self.resolve_revision(branch, revision)?))
    }

    // -----------------------------------------------------------------
    // Change detection
    // -----------------------------------------------------------------

    /// Changeset of the live tree versus the baseline.
    pub fn changes(&self, check_content: bool) -> Result<ChangeSet> {
        let patterns = self.tracked_patterns();
        self.find_changes(&DetectOptions {
            check_content,
            consider_only: patterns.as_deref(),
            ..Default::default()
        })
    }

    fn find_changes(&self, opts: &DetectOptions<'_>) -> Result<ChangeSet> {
        Detector::new(
            &self.root,
            &self.store,
            &self.paths,
            &self.filter,
            self.options.strict,
        )
        .find_changes(opts)
    }

    /// Shared guard: abort a destructive operation when the live tree has
    /// uncommitted changes and `force` is not set. Check-then-act; a
    /// modification racing in after the check is not detected.
    pub fn exit_on_changes(&self, force: bool) -> Result<ChangeSet> {
        let changes = self.changes(false)?;
        if !changes.is_empty() && !force {
            return Err(Error::dirty(changes.summary()));
        }
        Ok(changes)
    }

    fn tracked_patterns(&self) -> Option<Vec<TrackPattern>> {
        if !self.options.tracking() {
            return None;
        }
        let patterns = self
            .current_branch()
            .map(|b| {
                b.tracked
                    .iter()
                    .map(|p| TrackPattern::parse(p))
                    .collect::<Vec<_>>()
            })
            .unwrap_or_default();
        Some(patterns)
    }

    // -----------------------------------------------------------------
    // Branch lifecycle
    // -----------------------------------------------------------------

    /// Create a new branch from the current state and switch to it.
    ///
    /// Simple mode snapshots the live tree straight into revision 0.
    /// Track/picky mode copies the current branch's accumulated state (when
    /// one exists) instead, since only tracked paths are meaningful there.
    pub fn create_branch(&mut self, name: Option<&str>) -> Result<u32> {
        if let Some(name) = name {
            if self
                .branches
                .values()
                .any(|b| b.name.as_deref() == Some(name))
            {
                return Err(Error::branch_exists(name));
            }
        }

        let number = self.meta.next_branch;
        let ctime = now_millis();
        let mut branch = BranchInfo::new(number, ctime, name.map(String::from));

        let snapshot: PathMap = if self.options.tracking() {
            match self.meta.branch {
                Some(current) => {
                    let head = self
                        .branches
                        .get(&current)
                        .ok_or_else(|| Error::unknown_branch(current.to_string()))?
                        .head();
                    branch.tracked = self
                        .branches
                        .get(&current)
                        .map(|b| b.tracked.clone())
                        .unwrap_or_default();
                    let live: PathMap = self
                        .paths
                        .iter()
                        .filter(|(_, info)| !info.is_deleted())
                        .map(|(p, i)| (p.clone(), i.clone()))
                        .collect();
                    self.store.duplicate_branch(current, head, &live, number)?;
                    live
                }
                None => PathMap::new(),
            }
        } else {
            // Fresh live-tree scan against an empty baseline, materializing
            // every file's content into the new revision 0.
            let empty = PathMap::new();
            let detector = Detector::new(
                &self.root,
                &self.store,
                &empty,
                &self.filter,
                self.options.strict,
            );
            let changes = detector.find_changes(&DetectOptions {
                materialize: Some((number, 0)),
                ..Default::default()
            })?;
            changes.delta()
        };

        self.store.save_revision(number, 0, &snapshot)?;
        branch.commits.insert(
            0,
            CommitInfo {
                number: 0,
                ctime,
                message: None,
            },
        );
        self.store.save_branch(&branch)?;

        self.meta.next_branch = number + 1;
        self.meta.branch = Some(number);
        self.store.save_meta(&self.meta)?;

        info!(
            "created branch {}{} with {} paths",
            number,
            name.map(|n| format!(" ({})", n)).unwrap_or_default(),
            snapshot.len()
        );
        self.revision = 0;
        self.paths = snapshot;
        self.branches.insert(number, branch);
        Ok(number)
    }

    /// Remove a branch and its entire on-disk subtree. Neither the current
    /// branch nor the only remaining branch can be removed.
    pub fn remove_branch(&mut self, branch: u32, force: bool) -> Result<BranchInfo> {
        if self.branches.len() <= 1 {
            return Err(Error::LastBranch);
        }
        if self.meta.branch == Some(branch) {
            return Err(Error::CurrentBranch);
        }
        if !self.branches.contains_key(&branch) {
            return Err(Error::unknown_branch(branch.to_string()));
        }
        self.exit_on_changes(force)?;

        self.store.remove_branch(branch)?;
        let removed = self
            .branches
            .remove(&branch)
            .ok_or_else(|| Error::unknown_branch(branch.to_string()))?;
        info!("removed branch {}", branch);
        Ok(removed)
    }

    // -----------------------------------------------------------------
    // Commit
    // -----------------------------------------------------------------

    /// Commit the live tree's changes as the next revision of the current
    /// branch.
    ///
    /// The persisted record is a pure delta: the changeset is folded into
    /// the in-memory path set, and only the changed paths (tombstones
    /// included) are written. A non-forced commit with no changes fails; a
    /// forced one records an empty delta rather than duplicating content.
    pub fn commit(&mut self, message: Option<&str>, force: bool) -> Result<CommitInfo> {
        let branch = self.require_current()?;
        if let Some(msg) = message {
            if self.meta.tags.iter().any(|t| t == msg) {
                return Err(Error::tag_exists(msg));
            }
        }

        let head = self
            .branches
            .get(&branch)
            .ok_or_else(|| Error::unknown_branch(branch.to_string()))?
            .head();
        // Committing against a replayed-past baseline would persist a delta
        // that no longer folds into the head state. Branch off instead.
        if self.revision != head {
            return Err(Error::BehindHead {
                at: self.revision,
                head,
            });
        }
        let revision = head + 1;

        let patterns = self.tracked_patterns();
        let changes = self.find_changes(&DetectOptions {
            consider_only: patterns.as_deref(),
            materialize: Some((branch, revision)),
            ..Default::default()
        })?;

        if changes.is_empty() && !force {
            // Nothing happened; drop the revision directory the detector
            // just created.
            let dir = self.store.revision_dir(branch, revision);
            std::fs::remove_dir_all(&dir).map_err(|e| Error::io(&dir, e))?;
            return Err(Error::EmptyCommit);
        }

        apply_changes(&mut self.paths, &changes);
        self.store.save_revision(branch, revision, &changes.delta())?;

        let commit = CommitInfo {
            number: revision,
            ctime: now_millis(),
            message: message.map(String::from),
        };
        let branch_info = self
            .branches
            .get_mut(&branch)
            .ok_or_else(|| Error::unknown_branch(branch.to_string()))?;
        branch_info.commits.insert(revision, commit.clone());
        branch_info.insync = false;
        if self.options.picky {
            branch_info.tracked.clear();
        }
        self.store.save_branch(branch_info)?;

        if let Some(msg) = message {
            self.meta.tags.push(msg.to_string());
            self.store.save_meta(&self.meta)?;
        }

        info!(
            "committed revision {}/{}: {}",
            branch,
            revision,
            changes.summary()
        );
        self.revision = revision;
        Ok(commit)
    }

    // -----------------------------------------------------------------
    // Switch / update
    // -----------------------------------------------------------------

    /// Make the live tree match `branch` at `revision` exactly: restore
    /// changed or missing files (content and recorded mtime), and delete
    /// files versioned in the old state but absent from the target.
    pub fn switch(&mut self, branch: u32, revision: u64, force: bool) -> Result<ChangeSet> {
        self.exit_on_changes(force)?;
        let target = replay::path_set(&self.store, branch, revision)?;
        let mut applied = ChangeSet::new();

        // Files the old state tracked that the target does not: delete.
        for (path, info) in &self.paths {
            if info.is_deleted() {
                continue;
            }
            let gone = target.get(path).map(|t| t.is_deleted()).unwrap_or(true);
            if gone {
                let abs = self.root.join(path);
                if abs.exists() {
                    std::fs::remove_file(&abs).map_err(|e| Error::io(&abs, e))?;
                }
                applied
                    .deletions
                    .insert(path.clone(), PathInfo::tombstone(&info.namehash, info.mtime));
            }
        }

        // Target files missing or differing on disk: restore.
        for (path, info) in &target {
            if info.is_deleted() {
                continue;
            }
            let abs = self.root.join(path);
            if !abs.exists() {
                self.store.restore_versioned(branch, revision, info, &abs)?;
                applied.additions.insert(path.clone(), info.clone());
            } else if self.live_differs(&abs, info)? {
                self.store.restore_versioned(branch, revision, info, &abs)?;
                applied.modifications.insert(path.clone(), info.clone());
            }
        }

        debug!("switch applied: {}", applied.summary());
        self.finish_checkout(branch, revision, target)?;
        Ok(applied)
    }

    /// Like [`switch`](Self::switch), but reconcile instead of overwrite:
    /// textually differing files are merged line by line under the given
    /// policy, and one-sided additions/deletions follow the operation's
    /// `INSERT`/`REMOVE` flags.
    pub fn update(
        &mut self,
        branch: u32,
        revision: u64,
        opts: &MergeOptions,
        mut prompt: Option<&mut dyn ConflictPrompt>,
        force: bool,
    ) -> Result<ChangeSet> {
        self.exit_on_changes(force)?;
        let target = replay::path_set(&self.store, branch, revision)?;
        let mut applied = ChangeSet::new();

        if opts.operation.removes() {
            for (path, info) in &self.paths {
                if info.is_deleted() {
                    continue;
                }
                let gone = target.get(path).map(|t| t.is_deleted()).unwrap_or(true);
                if gone {
                    let abs = self.root.join(path);
                    if abs.exists() {
                        std::fs::remove_file(&abs).map_err(|e| Error::io(&abs, e))?;
                    }
                    applied
                        .deletions
                        .insert(path.clone(), PathInfo::tombstone(&info.namehash, info.mtime));
                }
            }
        }

        for (path, info) in &target {
            if info.is_deleted() {
                continue;
            }
            let abs = self.root.join(path);
            if !abs.exists() {
                if opts.operation.inserts() {
                    self.store.restore_versioned(branch, revision, info, &abs)?;
                    applied.additions.insert(path.clone(), info.clone());
                }
            } else if self.live_differs(&abs, info)? {
                let stored = self.store.read_versioned(branch, revision, &info.namehash)?;
                let live = std::fs::read(&abs).map_err(|e| Error::io(&abs, e))?;
                match (std::str::from_utf8(&stored), std::str::from_utf8(&live)) {
                    (Ok(src), Ok(tgt)) => {
                        let merged = merge::merge(src, tgt, opts, prompt.as_deref_mut());
                        std::fs::write(&abs, &merged).map_err(|e| Error::io(&abs, e))?;
                        applied.modifications.insert(path.clone(), info.clone());
                    }
                    // Binary content cannot be merged line by line: the
                    // whole file follows the block resolution, and in doubt
                    // the live side stays.
                    _ => {
                        if opts.resolution == ConflictResolution::Theirs {
                            std::fs::write(&abs, &stored).map_err(|e| Error::io(&abs, e))?;
                            applied.modifications.insert(path.clone(), info.clone());
                        }
                    }
                }
            }
        }

        debug!("update applied: {}", applied.summary());
        self.finish_checkout(branch, revision, target)?;
        Ok(applied)
    }

    /// Persist the new current branch and adopt the target path set as the
    /// in-memory baseline. The persistent position is branch-granular; a
    /// reopened workspace replays the branch to its head.
    fn finish_checkout(&mut self, branch: u32, revision: u64, target: PathMap) -> Result<()> {
        if self.meta.branch != Some(branch) {
            self.meta.branch = Some(branch);
            self.store.save_meta(&self.meta)?;
        }
        self.revision = revision;
        self.paths = target;
        Ok(())
    }

    /// Stat-level comparison of a live file against a stored record, with
    /// the strict-mode hash escalation.
    fn live_differs(&self, abs: &Path, info: &PathInfo) -> Result<bool> {
        let meta = std::fs::metadata(abs).map_err(|e| Error::io(abs, e))?;
        let size = meta.len();
        if info.size != Some(size) || info.mtime != crate::detect::mtime_millis(&meta) {
            return Ok(true);
        }
        if self.options.strict && size > 0 {
            if let Some(stored) = &info.hash {
                return Ok(crate::blob::content_hash(abs)? != *stored);
            }
        }
        Ok(false)
    }

    // -----------------------------------------------------------------
    // Diff / log
    // -----------------------------------------------------------------

    /// Display-only block diffs of every live file that textually differs
    /// from its stored counterpart at `branch`/`revision`.
    pub fn diff(&self, branch: u32, revision: u64) -> Result<BTreeMap<String, Vec<DiffBlock>>> {
        let target = replay::path_set(&self.store, branch, revision)?;
        let mut out = BTreeMap::new();

        for (path, info) in &target {
            if info.is_deleted() {
                continue;
            }
            let abs = self.root.join(path);
            if !abs.exists() {
                continue;
            }
            let stored = self.store.read_versioned(branch, revision, &info.namehash)?;
            let live = std::fs::read(&abs).map_err(|e| Error::io(&abs, e))?;
            if stored == live {
                continue;
            }
            // Line blocks only make sense for text; binary files have no
            // displayable diff.
            if let (Ok(src), Ok(tgt)) = (std::str::from_utf8(&stored), std::str::from_utf8(&live))
            {
                out.insert(path.clone(), merge::diff_blocks(src, tgt));
            } else {
                debug!("skipping binary diff for {}", path);
            }
        }
        Ok(out)
    }

    /// Commit history of the current branch, oldest first, with each
    /// revision's replayed changeset.
    pub fn log(&self) -> Result<Vec<(CommitInfo, ChangeSet)>> {
        let branch = self.require_current()?;
        let info = self
            .branches
            .get(&branch)
            .ok_or_else(|| Error::unknown_branch(branch.to_string()))?;

        let mut out = Vec::with_capacity(info.commits.len());
        for step in Replay::new(&self.store, branch, info.head()) {
            let (revision, changes) = step?;
            let commit = info
                .commits
                .get(&revision)
                .cloned()
                .unwrap_or(CommitInfo {
                    number: revision,
                    ctime: 0,
                    message: None,
                });
            out.push((commit, changes));
        }
        Ok(out)
    }

    // -----------------------------------------------------------------
    // Tracking patterns
    // -----------------------------------------------------------------

    /// Add a tracking pattern to the current branch (track/picky modes).
    pub fn track(&mut self, pattern: &str) -> Result<()> {
        if !self.options.tracking() {
            return Err(Error::TrackingDisabled);
        }
        let branch = self.require_current()?;
        let normalized = TrackPattern::parse(pattern).to_string();
        let info = self
            .branches
            .get_mut(&branch)
            .ok_or_else(|| Error::unknown_branch(branch.to_string()))?;
        if info.tracked.iter().any(|p| *p == normalized) {
            return Err(Error::already_tracked(normalized));
        }
        info.tracked.push(normalized);
        self.store.save_branch(info)
    }

    /// Remove a tracking pattern from the current branch.
    pub fn untrack(&mut self, pattern: &str) -> Result<()> {
        if !self.options.tracking() {
            return Err(Error::TrackingDisabled);
        }
        let branch = self.require_current()?;
        let normalized = TrackPattern::parse(pattern).to_string();
        let info = self
            .branches
            .get_mut(&branch)
            .ok_or_else(|| Error::unknown_branch(branch.to_string()))?;
        let before = info.tracked.len();
        info.tracked.retain(|p| *p != normalized);
        if info.tracked.len() == before {
            return Err(Error::not_tracked(normalized));
        }
        self.store.save_branch(info)
    }

    fn require_current(&self) -> Result<u32> {
        self.meta
            .branch
            .ok_or_else(|| Error::unknown_branch("no current branch".to_string()))
    }
}

fn filter_from(options: &Options) -> IgnoreFilter {
    IgnoreFilter::new(
        &options.ignores,
        &options.ignore_dirs,
        &options.whitelist,
        &options.whitelist_dirs,
    )
}
