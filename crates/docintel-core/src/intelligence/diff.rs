//! Longest-matching-block sequence comparison and unified diff rendering.
//!
//! Matching follows the Ratcliff/Obershelp "gestalt" approach: find the
//! longest contiguous matching block, then recurse on both sides of it.
//! Elements of `b` that occur in more than 1% of a sequence of 200 or more
//! elements are treated as too popular to anchor a match, which keeps long
//! inputs tractable.

use std::collections::HashMap;
use std::hash::Hash;

const AUTOJUNK_MIN_LEN: usize = 200;

/// `a[a_start..a_start + size] == b[b_start..b_start + size]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct MatchBlock {
    pub a_start: usize,
    pub b_start: usize,
    pub size: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpTag {
    Equal,
    Replace,
    Delete,
    Insert,
}

/// Turns `a[a_start..a_end]` into `b[b_start..b_end]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Opcode {
    pub tag: OpTag,
    pub a_start: usize,
    pub a_end: usize,
    pub b_start: usize,
    pub b_end: usize,
}

impl Opcode {
    const fn new(tag: OpTag, a_start: usize, a_end: usize, b_start: usize, b_end: usize) -> Self {
        Self {
            tag,
            a_start,
            a_end,
            b_start,
            b_end,
        }
    }
}

pub struct SequenceMatcher<'a, T> {
    a: &'a [T],
    b: &'a [T],
    b2j: HashMap<&'a T, Vec<usize>>,
}

impl<'a, T: Eq + Hash> SequenceMatcher<'a, T> {
    #[must_use]
    pub fn new(a: &'a [T], b: &'a [T]) -> Self {
        let mut b2j: HashMap<&T, Vec<usize>> = HashMap::new();
        for (j, item) in b.iter().enumerate() {
            b2j.entry(item).or_default().push(j);
        }

        if b.len() >= AUTOJUNK_MIN_LEN {
            let limit = b.len() / 100 + 1;
            b2j.retain(|_, positions| positions.len() <= limit);
        }

        Self { a, b, b2j }
    }

    fn find_longest_match(&self, a_lo: usize, a_hi: usize, b_lo: usize, b_hi: usize) -> MatchBlock {
        let (mut best_i, mut best_j, mut best_size) = (a_lo, b_lo, 0);
        let mut run_at: HashMap<usize, usize> = HashMap::new();

        for i in a_lo..a_hi {
            let mut next_run: HashMap<usize, usize> = HashMap::new();
            if let Some(positions) = self.b2j.get(&self.a[i]) {
                for &j in positions {
                    if j < b_lo {
                        continue;
                    }
                    if j >= b_hi {
                        break;
                    }
                    let k = j
                        .checked_sub(1)
                        .and_then(|prev| run_at.get(&prev))
                        .copied()
                        .unwrap_or(0)
                        + 1;
                    next_run.insert(j, k);
                    if k > best_size {
                        best_i = i + 1 - k;
                        best_j = j + 1 - k;
                        best_size = k;
                    }
                }
            }
            run_at = next_run;
        }

        // Popular elements never anchor a match but may still extend one.
        while best_i > a_lo && best_j > b_lo && self.a[best_i - 1] == self.b[best_j - 1] {
            best_i -= 1;
            best_j -= 1;
            best_size += 1;
        }
        while best_i + best_size < a_hi
            && best_j + best_size < b_hi
            && self.a[best_i + best_size] == self.b[best_j + best_size]
        {
            best_size += 1;
        }

        MatchBlock {
            a_start: best_i,
            b_start: best_j,
            size: best_size,
        }
    }

    /// Maximal matching blocks in order, ending with a zero-size sentinel at
    /// `(a.len(), b.len())`.
    #[must_use]
    pub fn matching_blocks(&self) -> Vec<MatchBlock> {
        let (la, lb) = (self.a.len(), self.b.len());
        let mut queue = vec![(0, la, 0, lb)];
        let mut blocks = Vec::new();

        while let Some((a_lo, a_hi, b_lo, b_hi)) = queue.pop() {
            let block = self.find_longest_match(a_lo, a_hi, b_lo, b_hi);
            if block.size == 0 {
                continue;
            }
            blocks.push(block);
            if a_lo < block.a_start && b_lo < block.b_start {
                queue.push((a_lo, block.a_start, b_lo, block.b_start));
            }
            if block.a_start + block.size < a_hi && block.b_start + block.size < b_hi {
                queue.push((block.a_start + block.size, a_hi, block.b_start + block.size, b_hi));
            }
        }
        blocks.sort_unstable();

        let mut merged: Vec<MatchBlock> = Vec::with_capacity(blocks.len() + 1);
        for block in blocks {
            match merged.last_mut() {
                Some(last)
                    if last.a_start + last.size == block.a_start
                        && last.b_start + last.size == block.b_start =>
                {
                    last.size += block.size;
                }
                _ => merged.push(block),
            }
        }
        merged.push(MatchBlock {
            a_start: la,
            b_start: lb,
            size: 0,
        });
        merged
    }

    /// `2 * matched / (len(a) + len(b))`, or 1.0 when both are empty.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn ratio(&self) -> f64 {
        let total = self.a.len() + self.b.len();
        if total == 0 {
            return 1.0;
        }
        let matched: usize = self.matching_blocks().iter().map(|m| m.size).sum();
        2.0 * matched as f64 / total as f64
    }

    #[must_use]
    pub fn opcodes(&self) -> Vec<Opcode> {
        let (mut i, mut j) = (0, 0);
        let mut codes = Vec::new();

        for block in self.matching_blocks() {
            let tag = match (i < block.a_start, j < block.b_start) {
                (true, true) => Some(OpTag::Replace),
                (true, false) => Some(OpTag::Delete),
                (false, true) => Some(OpTag::Insert),
                (false, false) => None,
            };
            if let Some(tag) = tag {
                codes.push(Opcode::new(tag, i, block.a_start, j, block.b_start));
            }
            i = block.a_start + block.size;
            j = block.b_start + block.size;
            if block.size > 0 {
                codes.push(Opcode::new(OpTag::Equal, block.a_start, i, block.b_start, j));
            }
        }
        codes
    }

    /// Opcodes split into hunks with at most `context` equal elements on
    /// each side of a change.
    #[must_use]
    pub fn grouped_opcodes(&self, context: usize) -> Vec<Vec<Opcode>> {
        let mut codes = self.opcodes();
        if codes.is_empty() {
            codes.push(Opcode::new(OpTag::Equal, 0, 1, 0, 1));
        }

        if let Some(first) = codes.first_mut().filter(|c| c.tag == OpTag::Equal) {
            first.a_start = first.a_start.max(first.a_end.saturating_sub(context));
            first.b_start = first.b_start.max(first.b_end.saturating_sub(context));
        }
        if let Some(last) = codes.last_mut().filter(|c| c.tag == OpTag::Equal) {
            last.a_end = last.a_end.min(last.a_start + context);
            last.b_end = last.b_end.min(last.b_start + context);
        }

        let mut groups = Vec::new();
        let mut group = Vec::new();
        for mut code in codes {
            if code.tag == OpTag::Equal && code.a_end - code.a_start > context * 2 {
                group.push(Opcode::new(
                    OpTag::Equal,
                    code.a_start,
                    code.a_end.min(code.a_start + context),
                    code.b_start,
                    code.b_end.min(code.b_start + context),
                ));
                groups.push(std::mem::take(&mut group));
                code.a_start = code.a_start.max(code.a_end.saturating_sub(context));
                code.b_start = code.b_start.max(code.b_end.saturating_sub(context));
            }
            group.push(code);
        }
        if !(group.is_empty() || (group.len() == 1 && group[0].tag == OpTag::Equal)) {
            groups.push(group);
        }
        groups
    }
}

fn unified_range(start: usize, stop: usize) -> String {
    let length = stop - start;
    match length {
        0 => format!("{start},0"),
        1 => format!("{}", start + 1),
        _ => format!("{},{length}", start + 1),
    }
}

/// Unified diff of two line sequences without trailing newlines.
///
/// Returns nothing when the sequences are equal; otherwise `---`/`+++`
/// headers naming the two sides followed by `@@` hunks.
#[must_use]
pub fn unified_diff<S: AsRef<str> + Eq + Hash>(
    a: &[S],
    b: &[S],
    from_name: &str,
    to_name: &str,
    context: usize,
) -> Vec<String> {
    let matcher = SequenceMatcher::new(a, b);
    let mut out = Vec::new();

    for group in matcher.grouped_opcodes(context) {
        if out.is_empty() {
            out.push(format!("--- {from_name}"));
            out.push(format!("+++ {to_name}"));
        }
        let (Some(first), Some(last)) = (group.first(), group.last()) else {
            continue;
        };
        out.push(format!(
            "@@ -{} +{} @@",
            unified_range(first.a_start, last.a_end),
            unified_range(first.b_start, last.b_end)
        ));

        for code in &group {
            if code.tag == OpTag::Equal {
                out.extend(a[code.a_start..code.a_end].iter().map(|l| format!(" {}", l.as_ref())));
                continue;
            }
            if matches!(code.tag, OpTag::Replace | OpTag::Delete) {
                out.extend(a[code.a_start..code.a_end].iter().map(|l| format!("-{}", l.as_ref())));
            }
            if matches!(code.tag, OpTag::Replace | OpTag::Insert) {
                out.extend(b[code.b_start..code.b_end].iter().map(|l| format!("+{}", l.as_ref())));
            }
        }
    }
    out
}
