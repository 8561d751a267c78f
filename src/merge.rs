//! Line-level merge and diff-display engine.
//!
//! One LCS-based block computation backs two entry points:
//!
//! - [`diff_blocks`] — an ordered, display-only list of [`DiffBlock`]s
//!   describing how the live file ("target", "mine") differs from a stored
//!   revision's content ("source", "theirs").
//! - [`merge`] — combines source and target into new bytes, governed by a
//!   [`MergeOperation`] bit flag and a [`ConflictResolution`] policy, with
//!   separately configurable line-internal settings for
//!   [`ConflictResolution::Next`].
//!
//! End-of-line styles (LF, CRLF, CR) are detected per side; a mixed-style
//! input is flagged with a warning, and when the two sides disagree the
//! target's style is preferred — in doubt, use mine.

use log::warn;

// ---------------------------------------------------------------------------
// MergeOperation / ConflictResolution
// ---------------------------------------------------------------------------

/// Bit flag selecting which one-sided changes a merge applies.
///
/// `INSERT` adds lines present in source but absent from target without
/// deleting target-only lines; `REMOVE` deletes target lines absent from
/// source without inserting source-only lines; `BOTH` does both.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MergeOperation(u8);

impl MergeOperation {
    pub const INSERT: MergeOperation = MergeOperation(0b01);
    pub const REMOVE: MergeOperation = MergeOperation(0b10);
    pub const BOTH: MergeOperation = MergeOperation(0b11);

    pub fn inserts(self) -> bool {
        self.0 & Self::INSERT.0 != 0
    }

    pub fn removes(self) -> bool {
        self.0 & Self::REMOVE.0 != 0
    }
}

/// How a region changed on both sides is resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConflictResolution {
    /// Keep the target (live) side.
    Mine,
    /// Take the source (stored) side.
    #[default]
    Theirs,
    /// Delegate to an interactive [`ConflictPrompt`]; without one the
    /// target side wins.
    Ask,
    /// Recurse into a character-level merge of the conflicting lines using
    /// the line-internal operation/resolution settings.
    Next,
}

/// Per-conflict callback for [`ConflictResolution::Ask`]. The CLI
/// collaborator owns the actual prompting.
pub trait ConflictPrompt {
    fn resolve(&mut self, source: &[String], target: &[String]) -> ConflictResolution;
}

/// Full merge policy: block-level and line-internal settings.
#[derive(Debug, Clone, Copy)]
pub struct MergeOptions {
    pub operation: MergeOperation,
    pub resolution: ConflictResolution,
    pub line_operation: MergeOperation,
    pub line_resolution: ConflictResolution,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            operation: MergeOperation::BOTH,
            resolution: ConflictResolution::Theirs,
            line_operation: MergeOperation::BOTH,
            line_resolution: ConflictResolution::Theirs,
        }
    }
}

// ---------------------------------------------------------------------------
// EOL handling
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EolStyle {
    Lf,
    CrLf,
    Cr,
}

impl EolStyle {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Lf => "\n",
            Self::CrLf => "\r\n",
            Self::Cr => "\r",
        }
    }
}

/// Detect the dominant EOL style of `text` and whether styles are mixed.
pub fn detect_eol(text: &str) -> (Option<EolStyle>, bool) {
    let mut lf = 0usize;
    let mut crlf = 0usize;
    let mut cr = 0usize;

    let bytes = text.as_bytes();
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'\r' => {
                if bytes.get(i + 1) == Some(&b'\n') {
                    crlf += 1;
                    i += 2;
                    continue;
                }
                cr += 1;
            }
            b'\n' => lf += 1,
            _ => {}
        }
        i += 1;
    }

    let styles = [(lf, EolStyle::Lf), (crlf, EolStyle::CrLf), (cr, EolStyle::Cr)];
    let present = styles.iter().filter(|(n, _)| *n > 0).count();
    let dominant = styles
        .iter()
        .max_by_key(|(n, _)| *n)
        .filter(|(n, _)| *n > 0)
        .map(|(_, s)| *s);
    (dominant, present > 1)
}

/// Split into lines without their terminators, handling all three styles.
fn split_lines(text: &str) -> Vec<String> {
    let mut lines = Vec::new();
    let mut current = String::new();
    let mut chars = text.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\n' => lines.push(std::mem::take(&mut current)),
            '\r' => {
                if chars.peek() == Some(&'\n') {
                    chars.next();
                }
                lines.push(std::mem::take(&mut current));
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        lines.push(current);
    }
    lines
}

fn ends_with_eol(text: &str) -> bool {
    text.ends_with('\n') || text.ends_with('\r')
}

// ---------------------------------------------------------------------------
// Block computation
// ---------------------------------------------------------------------------

/// Tag of one diff block.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// Identical on both sides.
    Keep,
    /// Lines present in source, absent from target.
    Insert,
    /// Lines present in target, absent from source.
    Remove,
    /// Both sides changed; unequal line counts.
    Replace,
    /// Both sides changed line for line (equal counts).
    Modify,
    /// A removed run that reappears verbatim as an inserted run elsewhere.
    Move,
}

/// One contiguous region of the comparison.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffBlock {
    pub kind: BlockKind,
    /// Lines from the stored revision's content.
    pub source: Vec<String>,
    /// Lines from the live file.
    pub target: Vec<String>,
    /// 0-based line offset of this block within the live file.
    pub target_line: usize,
}

/// Longest common subsequence as matched index pairs, ascending in both
/// coordinates.
///
/// Hirschberg's divide-and-conquer keeps memory linear in the shorter
/// input (one DP row per half instead of the full table), with the same
/// quadratic time as the classic formulation.
fn lcs_pairs<T: PartialEq>(a: &[T], b: &[T]) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    hirschberg(a, b, 0, 0, &mut pairs);
    pairs
}

/// Last DP row: `row[j]` is the LCS length of `a` and `b[..j]`.
fn lcs_row<T: PartialEq>(a: &[T], b: &[T]) -> Vec<usize> {
    let mut prev = vec![0usize; b.len() + 1];
    let mut cur = vec![0usize; b.len() + 1];
    for x in a {
        for (j, y) in b.iter().enumerate() {
            cur[j + 1] = if x == y {
                prev[j] + 1
            } else {
                cur[j].max(prev[j + 1])
            };
        }
        std::mem::swap(&mut prev, &mut cur);
    }
    prev
}

fn hirschberg<T: PartialEq>(
    a: &[T],
    b: &[T],
    a_off: usize,
    b_off: usize,
    pairs: &mut Vec<(usize, usize)>,
) {
    if a.is_empty() || b.is_empty() {
        return;
    }
    if a.len() == 1 {
        if let Some(j) = b.iter().position(|y| *y == a[0]) {
            pairs.push((a_off, b_off + j));
        }
        return;
    }

    // Split a in half; find the b split that maximizes the combined LCS of
    // the upper-left and (reversed) lower-right quadrants.
    let mid = a.len() / 2;
    let upper = lcs_row(&a[..mid], b);
    let lower_a: Vec<&T> = a[mid..].iter().rev().collect();
    let lower_b: Vec<&T> = b.iter().rev().collect();
    let lower = lcs_row(&lower_a, &lower_b);
    let split = (0..=b.len())
        .max_by_key(|&j| upper[j] + lower[b.len() - j])
        .unwrap_or(0);

    hirschberg(&a[..mid], &b[..split], a_off, b_off, pairs);
    hirschberg(&a[mid..], &b[split..], a_off + mid, b_off + split, pairs);
}

/// Build the raw block sequence (Keep/Insert/Remove/Replace only).
fn compute_blocks(source: &[String], target: &[String]) -> Vec<DiffBlock> {
    let pairs = lcs_pairs(source, target);
    let mut blocks = Vec::new();
    let mut si = 0;
    let mut ti = 0;

    let flush_gap = |blocks: &mut Vec<DiffBlock>, si: usize, ti: usize, se: usize, te: usize| {
        let src: Vec<String> = source[si..se].to_vec();
        let tgt: Vec<String> = target[ti..te].to_vec();
        match (src.is_empty(), tgt.is_empty()) {
            (true, true) => {}
            (false, true) => blocks.push(DiffBlock {
                kind: BlockKind::Insert,
                source: src,
                target: Vec::new(),
                target_line: ti,
            }),
            (true, false) => blocks.push(DiffBlock {
                kind: BlockKind::Remove,
                source: Vec::new(),
                target: tgt,
                target_line: ti,
            }),
            (false, false) => blocks.push(DiffBlock {
                kind: BlockKind::Replace,
                source: src,
                target: tgt,
                target_line: ti,
            }),
        }
    };

    let mut k = 0;
    while k < pairs.len() {
        let (ps, pt) = pairs[k];
        flush_gap(&mut blocks, si, ti, ps, pt);

        // Extend the matched run.
        let mut run = 1;
        while k + run < pairs.len() && pairs[k + run] == (ps + run, pt + run) {
            run += 1;
        }
        blocks.push(DiffBlock {
            kind: BlockKind::Keep,
            source: source[ps..ps + run].to_vec(),
            target: target[pt..pt + run].to_vec(),
            target_line: pt,
        });
        si = ps + run;
        ti = pt + run;
        k += run;
    }
    flush_gap(&mut blocks, si, ti, source.len(), target.len());
    blocks
}

/// Display-only comparison of stored content against the live file.
///
/// Refines the raw blocks: a `Replace` whose sides have equal line counts
/// becomes `Modify`, and a `Remove` whose lines reappear verbatim as an
/// `Insert` (or vice versa) is retagged `Move` on both ends.
pub fn diff_blocks(source: &str, target: &str) -> Vec<DiffBlock> {
    let src_lines = split_lines(source);
    let tgt_lines = split_lines(target);
    let mut blocks = compute_blocks(&src_lines, &tgt_lines);

    for block in &mut blocks {
        if block.kind == BlockKind::Replace && block.source.len() == block.target.len() {
            block.kind = BlockKind::Modify;
        }
    }

    // Pair up relocated runs.
    for i in 0..blocks.len() {
        if blocks[i].kind != BlockKind::Remove {
            continue;
        }
        for j in 0..blocks.len() {
            if blocks[j].kind == BlockKind::Insert && blocks[j].source == blocks[i].target {
                blocks[i].kind = BlockKind::Move;
                blocks[j].kind = BlockKind::Move;
                break;
            }
        }
    }

    blocks
}

// ---------------------------------------------------------------------------
// Merge
// ---------------------------------------------------------------------------

/// Merge stored content ("source", "theirs") with the live file's content
/// ("target", "mine") into new bytes.
///
/// `prompt` is consulted per conflict when the effective resolution is
/// [`ConflictResolution::Ask`]; without one the target side wins.
pub fn merge(
    source: &str,
    target: &str,
    opts: &MergeOptions,
    mut prompt: Option<&mut (dyn ConflictPrompt + '_)>,
) -> Vec<u8> {
    let (src_eol, src_mixed) = detect_eol(source);
    let (tgt_eol, tgt_mixed) = detect_eol(target);
    if src_mixed || tgt_mixed {
        warn!("mixed end-of-line styles detected; merge output uses one style");
    }
    let eol = tgt_eol.or(src_eol).unwrap_or(EolStyle::Lf).as_str();

    let src_lines = split_lines(source);
    let tgt_lines = split_lines(target);
    let blocks = compute_blocks(&src_lines, &tgt_lines);

    let mut out: Vec<String> = Vec::new();
    for block in &blocks {
        match block.kind {
            BlockKind::Keep => out.extend(block.target.iter().cloned()),
            BlockKind::Insert => {
                if opts.operation.inserts() {
                    out.extend(block.source.iter().cloned());
                }
            }
            BlockKind::Remove => {
                if !opts.operation.removes() {
                    out.extend(block.target.iter().cloned());
                }
            }
            BlockKind::Replace | BlockKind::Modify | BlockKind::Move => {
                resolve_conflict(block, opts, &mut prompt, &mut out);
            }
        }
    }

    let trailing = if target.is_empty() {
        ends_with_eol(source)
    } else {
        ends_with_eol(target)
    };
    let mut bytes = out.join(eol).into_bytes();
    if trailing && !bytes.is_empty() {
        bytes.extend_from_slice(eol.as_bytes());
    }
    bytes
}

fn resolve_conflict(
    block: &DiffBlock,
    opts: &MergeOptions,
    prompt: &mut Option<&mut (dyn ConflictPrompt + '_)>,
    out: &mut Vec<String>,
) {
    // One-sided operations never ask: INSERT keeps both sides (source
    // first), REMOVE drops the region entirely.
    match (opts.operation.inserts(), opts.operation.removes()) {
        (true, false) => {
            out.extend(block.source.iter().cloned());
            out.extend(block.target.iter().cloned());
            return;
        }
        (false, true) => return,
        _ => {}
    }

    let mut resolution = opts.resolution;
    if resolution == ConflictResolution::Ask {
        resolution = match prompt.as_deref_mut() {
            Some(p) => match p.resolve(&block.source, &block.target) {
                // A prompt answering Ask again would loop; fall back.
                ConflictResolution::Ask => ConflictResolution::Mine,
                other => other,
            },
            None => {
                warn!("conflict with no prompt available; keeping mine");
                ConflictResolution::Mine
            }
        };
    }

    match resolution {
        ConflictResolution::Mine => out.extend(block.target.iter().cloned()),
        ConflictResolution::Theirs => out.extend(block.source.iter().cloned()),
        ConflictResolution::Next => {
            // Line-internal merge: pair lines up positionally, then apply
            // the block-level flags to the leftover tail.
            let shared = block.source.len().min(block.target.len());
            for i in 0..shared {
                out.push(merge_line(
                    &block.source[i],
                    &block.target[i],
                    opts.line_operation,
                    opts.line_resolution,
                ));
            }
            if opts.operation.inserts() {
                out.extend(block.source[shared..].iter().cloned());
            }
            if !opts.operation.removes() {
                out.extend(block.target[shared..].iter().cloned());
            }
        }
        ConflictResolution::Ask => unreachable!("ask resolved above"),
    }
}

/// Character-level merge of one conflicting line pair.
fn merge_line(
    source: &str,
    target: &str,
    operation: MergeOperation,
    resolution: ConflictResolution,
) -> String {
    let src: Vec<char> = source.chars().collect();
    let tgt: Vec<char> = target.chars().collect();
    let pairs = lcs_pairs(&src, &tgt);

    let mut out = String::new();
    let mut si = 0;
    let mut ti = 0;
    let emit_gap = |out: &mut String, si: usize, ti: usize, se: usize, te: usize| {
        let src_gap = &src[si..se];
        let tgt_gap = &tgt[ti..te];
        match (src_gap.is_empty(), tgt_gap.is_empty()) {
            (true, true) => {}
            (false, true) => {
                if operation.inserts() {
                    out.extend(src_gap.iter());
                }
            }
            (true, false) => {
                if !operation.removes() {
                    out.extend(tgt_gap.iter());
                }
            }
            (false, false) => match resolution {
                ConflictResolution::Theirs => out.extend(src_gap.iter()),
                // Mine also covers Ask and Next at character depth; there
                // is nothing further to recurse into.
                _ => out.extend(tgt_gap.iter()),
            },
        }
    };

    let mut k = 0;
    while k < pairs.len() {
        let (ps, pt) = pairs[k];
        emit_gap(&mut out, si, ti, ps, pt);
        out.push(src[ps]);
        si = ps + 1;
        ti = pt + 1;
        k += 1;
    }
    emit_gap(&mut out, si, ti, src.len(), tgt.len());
    out
}
