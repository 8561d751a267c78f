//! Glob matching, ignore filtering, and tracking patterns.
//!
//! Three layers share one fnmatch core:
//!
//! - [`fnmatch`] — `*`/`?` wildcard matching against a single name.
//! - [`IgnoreFilter`] — decides which file and directory names are excluded
//!   from change detection, with whitelist patterns re-including names that
//!   an ignore pattern caught.
//! - [`TrackPattern`] — a `dir/glob` pair used in track/picky modes: a file
//!   participates only if its directory equals the pattern's declared
//!   directory and its basename matches the glob.

use std::fmt;

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// fnmatch core
// ---------------------------------------------------------------------------

/// Match `name` against a shell-style pattern where `*` matches any run of
/// characters (including none) and `?` matches exactly one.
///
/// Matching is byte-wise; patterns and names are compared as given, with no
/// dotfile special-casing (an ignore pattern `*` does match `.hidden`).
pub fn fnmatch(pattern: &str, name: &str) -> bool {
    let pat = pattern.as_bytes();
    let txt = name.as_bytes();

    // Iterative backtracking matcher: remember the position of the most
    // recent `*` and retry from there when a literal mismatch occurs.
    let mut p = 0;
    let mut t = 0;
    let mut backtrack: Option<(usize, usize)> = None;

    while t < txt.len() {
        match pat.get(p) {
            Some(b'*') => {
                backtrack = Some((p, t));
                p += 1;
            }
            Some(&c) if c == b'?' || c == txt[t] => {
                p += 1;
                t += 1;
            }
            _ => match backtrack {
                Some((bp, bt)) => {
                    backtrack = Some((bp, bt + 1));
                    p = bp + 1;
                    t = bt + 1;
                }
                None => return false,
            },
        }
    }

    while pat.get(p) == Some(&b'*') {
        p += 1;
    }
    p == pat.len()
}

// ---------------------------------------------------------------------------
// IgnoreFilter
// ---------------------------------------------------------------------------

/// Name-based exclusion filter for the change detector.
///
/// A name is excluded when it matches any ignore pattern and no whitelist
/// pattern. Files and directories carry separate pattern lists because a
/// directory match prunes an entire subtree while a file match skips one
/// entry.
#[derive(Debug, Clone, Default)]
pub struct IgnoreFilter {
    ignores: Vec<String>,
    ignore_dirs: Vec<String>,
    whitelist: Vec<String>,
    whitelist_dirs: Vec<String>,
}

impl IgnoreFilter {
    pub fn new(
        ignores: &[String],
        ignore_dirs: &[String],
        whitelist: &[String],
        whitelist_dirs: &[String],
    ) -> Self {
        Self {
            ignores: ignores.to_vec(),
            ignore_dirs: ignore_dirs.to_vec(),
            whitelist: whitelist.to_vec(),
            whitelist_dirs: whitelist_dirs.to_vec(),
        }
    }

    /// Should the file named `name` be skipped during the walk?
    pub fn skip_file(&self, name: &str) -> bool {
        matches_any(&self.ignores, name) && !matches_any(&self.whitelist, name)
    }

    /// Should the directory named `name` be pruned during the walk?
    pub fn skip_dir(&self, name: &str) -> bool {
        matches_any(&self.ignore_dirs, name) && !matches_any(&self.whitelist_dirs, name)
    }
}

fn matches_any(patterns: &[String], name: &str) -> bool {
    patterns.iter().any(|p| fnmatch(p, name))
}

// ---------------------------------------------------------------------------
// TrackPattern
// ---------------------------------------------------------------------------

/// A tracking rule: a glob anchored to one directory.
///
/// `TrackPattern::parse("src/*.rs")` declares directory `"src"` and basename
/// glob `"*.rs"`; `parse("*.md")` anchors to the workspace root (empty
/// directory). The declared directory must equal a file's directory exactly;
/// tracking patterns never recurse.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackPattern {
    pub dir: String,
    pub glob: String,
}

impl TrackPattern {
    pub fn parse(pattern: &str) -> Self {
        let normalized = pattern.trim_matches('/');
        match normalized.rsplit_once('/') {
            Some((dir, glob)) => Self {
                dir: dir.to_string(),
                glob: glob.to_string(),
            },
            None => Self {
                dir: String::new(),
                glob: normalized.to_string(),
            },
        }
    }

    /// Does this pattern cover the file `basename` inside directory `dir`?
    pub fn matches(&self, dir: &str, basename: &str) -> bool {
        self.dir == dir && fnmatch(&self.glob, basename)
    }

    /// Does this pattern cover the slash-normalized relative `path`?
    pub fn matches_path(&self, path: &str) -> bool {
        match path.rsplit_once('/') {
            Some((dir, base)) => self.matches(dir, base),
            None => self.matches("", path),
        }
    }
}

impl fmt::Display for TrackPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.dir.is_empty() {
            write!(f, "{}", self.glob)
        } else {
            write!(f, "{}/{}", self.dir, self.glob)
        }
    }
}

/// `true` when at least one of `patterns` covers the file `basename` inside
/// directory `dir`.
pub fn tracked(patterns: &[TrackPattern], dir: &str, basename: &str) -> bool {
    patterns.iter().any(|p| p.matches(dir, basename))
}
