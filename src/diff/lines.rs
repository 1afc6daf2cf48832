//! diff::lines
//!
//! Line-level edit scripts: linear-space Myers and patience diff.
//!
//! Lines are interned to integers after whitespace normalization, so
//! both algorithms only compare `usize` tokens.

use std::collections::HashMap;
use std::ops::{Index, IndexMut};

use serde::{Deserialize, Serialize};

/// Line diff algorithm.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DiffAlgorithm {
    #[default]
    Myers,
    Patience,
}

/// Whitespace handling when comparing lines.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum WhitespaceMode {
    #[default]
    None,
    /// Ignore all whitespace.
    IgnoreAll,
    /// Treat runs of whitespace as one space and ignore trailing whitespace.
    IgnoreChange,
    /// Ignore whitespace at line end.
    IgnoreEol,
}

/// One step of an edit script, by line index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Equal { old: usize, new: usize },
    Delete { old: usize },
    Insert { new: usize },
}

/// Split into lines, each keeping its terminator.
pub fn split_lines(text: &[u8]) -> Vec<&[u8]> {
    let mut lines = Vec::new();
    let mut start = 0;
    for (i, byte) in text.iter().enumerate() {
        if *byte == b'\n' {
            lines.push(&text[start..=i]);
            start = i + 1;
        }
    }
    if start < text.len() {
        lines.push(&text[start..]);
    }
    lines
}

fn normalize(line: &[u8], mode: WhitespaceMode) -> Vec<u8> {
    let body = line.strip_suffix(b"\n").unwrap_or(line);
    match mode {
        WhitespaceMode::None => line.to_vec(),
        WhitespaceMode::IgnoreAll => body
            .iter()
            .copied()
            .filter(|b| !b.is_ascii_whitespace())
            .collect(),
        WhitespaceMode::IgnoreEol => body.trim_ascii_end().to_vec(),
        WhitespaceMode::IgnoreChange => {
            let mut out = Vec::with_capacity(body.len());
            let mut in_space = false;
            for &b in body.trim_ascii_end() {
                if b.is_ascii_whitespace() {
                    in_space = true;
                } else {
                    if in_space {
                        out.push(b' ');
                        in_space = false;
                    }
                    out.push(b);
                }
            }
            out
        }
    }
}

/// Map lines of both sides to shared integer tokens.
fn intern(old: &[&[u8]], new: &[&[u8]], mode: WhitespaceMode) -> (Vec<usize>, Vec<usize>) {
    let mut table: HashMap<Vec<u8>, usize> = HashMap::new();
    let mut token = |line: &[u8]| {
        let next = table.len();
        *table.entry(normalize(line, mode)).or_insert(next)
    };
    let a = old.iter().map(|l| token(*l)).collect();
    let b = new.iter().map(|l| token(*l)).collect();
    (a, b)
}

/// Edit script turning `old` into `new`.
pub fn diff_lines(
    old: &[&[u8]],
    new: &[&[u8]],
    algorithm: DiffAlgorithm,
    whitespace: WhitespaceMode,
) -> Vec<Op> {
    let (a, b) = intern(old, new, whitespace);
    diff_tokens(&a, &b, algorithm)
}

pub(crate) fn diff_tokens(a: &[usize], b: &[usize], algorithm: DiffAlgorithm) -> Vec<Op> {
    let mut ops = Vec::with_capacity(a.len().max(b.len()));
    match algorithm {
        DiffAlgorithm::Myers => myers(a, b, 0, 0, &mut ops),
        DiffAlgorithm::Patience => patience(a, b, 0, 0, &mut ops),
    }
    group_changes(&mut ops);
    ops
}

/// Furthest-reaching x per diagonal `k`, indexable by negative `k`.
struct Frontier {
    offset: isize,
    v: Vec<usize>,
}

impl Frontier {
    fn new(max_d: usize) -> Self {
        Self {
            offset: max_d as isize,
            v: vec![0; 2 * max_d + 1],
        }
    }
}

impl Index<isize> for Frontier {
    type Output = usize;

    fn index(&self, k: isize) -> &usize {
        &self.v[(k + self.offset) as usize]
    }
}

impl IndexMut<isize> for Frontier {
    fn index_mut(&mut self, k: isize) -> &mut usize {
        &mut self.v[(k + self.offset) as usize]
    }
}

fn common_prefix(a: &[usize], b: &[usize]) -> usize {
    a.iter().zip(b).take_while(|(x, y)| x == y).count()
}

fn common_suffix(a: &[usize], b: &[usize]) -> usize {
    a.iter()
        .rev()
        .zip(b.iter().rev())
        .take_while(|(x, y)| x == y)
        .count()
}

/// Linear-space Myers: find the middle snake of the shortest edit path,
/// then recurse on both halves. Memory is O(N + M).
struct Myers<'s> {
    a: &'s [usize],
    b: &'s [usize],
    a_off: usize,
    b_off: usize,
    forward: Frontier,
    backward: Frontier,
}

impl Myers<'_> {
    /// Split point `(x, y)` on a shortest path through `a[a_lo..a_hi]`
    /// and `b[b_lo..b_hi]`. Both ranges are non-empty and share no
    /// common prefix or suffix.
    fn middle_snake(&mut self, a_lo: usize, a_hi: usize, b_lo: usize, b_hi: usize) -> Option<(usize, usize)> {
        let n = a_hi - a_lo;
        let m = b_hi - b_lo;
        let delta = n as isize - m as isize;
        let odd = delta & 1 == 1;
        let max_d = (n + m + 1) / 2 + 1;
        self.forward[1] = 0;
        self.backward[1] = 0;

        for d in 0..max_d as isize {
            for k in (-d..=d).rev().step_by(2) {
                let mut x = if k == -d || (k != d && self.forward[k - 1] < self.forward[k + 1]) {
                    self.forward[k + 1]
                } else {
                    self.forward[k - 1] + 1
                };
                let y = (x as isize - k) as usize;
                let (x0, y0) = (x, y);
                if x < n && y < m {
                    x += common_prefix(&self.a[a_lo + x..a_hi], &self.b[b_lo + y..b_hi]);
                }
                self.forward[k] = x;
                if odd && (k - delta).abs() < d && self.forward[k] + self.backward[delta - k] >= n {
                    return Some((a_lo + x0, b_lo + y0));
                }
            }

            for k in (-d..=d).rev().step_by(2) {
                let mut x = if k == -d || (k != d && self.backward[k - 1] < self.backward[k + 1]) {
                    self.backward[k + 1]
                } else {
                    self.backward[k - 1] + 1
                };
                let mut y = (x as isize - k) as usize;
                if x < n && y < m {
                    let run = common_suffix(&self.a[a_lo..a_hi - x], &self.b[b_lo..b_hi - y]);
                    x += run;
                    y += run;
                }
                self.backward[k] = x;
                if !odd && (k - delta).abs() <= d && self.backward[k] + self.forward[delta - k] >= n {
                    return Some((a_hi - x, b_hi - y));
                }
            }
        }
        None
    }

    fn conquer(&mut self, mut a_lo: usize, mut a_hi: usize, mut b_lo: usize, mut b_hi: usize, out: &mut Vec<Op>) {
        let prefix = common_prefix(&self.a[a_lo..a_hi], &self.b[b_lo..b_hi]);
        for i in 0..prefix {
            out.push(Op::Equal {
                old: self.a_off + a_lo + i,
                new: self.b_off + b_lo + i,
            });
        }
        a_lo += prefix;
        b_lo += prefix;
        let suffix = common_suffix(&self.a[a_lo..a_hi], &self.b[b_lo..b_hi]);
        a_hi -= suffix;
        b_hi -= suffix;

        let split = if a_lo < a_hi && b_lo < b_hi {
            self.middle_snake(a_lo, a_hi, b_lo, b_hi)
        } else {
            None
        };
        match split {
            Some((x, y)) => {
                self.conquer(a_lo, x, b_lo, y, out);
                self.conquer(x, a_hi, y, b_hi, out);
            }
            None => {
                out.extend((a_lo..a_hi).map(|i| Op::Delete { old: self.a_off + i }));
                out.extend((b_lo..b_hi).map(|j| Op::Insert { new: self.b_off + j }));
            }
        }

        for i in 0..suffix {
            out.push(Op::Equal {
                old: self.a_off + a_hi + i,
                new: self.b_off + b_hi + i,
            });
        }
    }
}

/// Myers' shortest edit script. Indices in emitted ops are offset by
/// `a_off` / `b_off`.
fn myers(a: &[usize], b: &[usize], a_off: usize, b_off: usize, out: &mut Vec<Op>) {
    let max_d = (a.len() + b.len() + 1) / 2 + 1;
    let mut search = Myers {
        a,
        b,
        a_off,
        b_off,
        forward: Frontier::new(max_d),
        backward: Frontier::new(max_d),
    };
    search.conquer(0, a.len(), 0, b.len(), out);
}

/// Within each run of changes, put deletions before insertions.
fn group_changes(ops: &mut [Op]) {
    let mut start = 0;
    while start < ops.len() {
        if matches!(ops[start], Op::Equal { .. }) {
            start += 1;
            continue;
        }
        let end = ops[start..]
            .iter()
            .position(|op| matches!(op, Op::Equal { .. }))
            .map_or(ops.len(), |len| start + len);
        ops[start..end].sort_by_key(|op| match *op {
            Op::Delete { old } => (0, old),
            Op::Insert { new } => (1, new),
            Op::Equal { .. } => (2, 0),
        });
        start = end;
    }
}

/// Patience diff: anchor on lines unique to both sides, recurse between
/// anchors, fall back to Myers where no unique lines remain.
fn patience(a: &[usize], b: &[usize], a_off: usize, b_off: usize, out: &mut Vec<Op>) {
    // Common prefix and suffix.
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    for i in 0..prefix {
        out.push(Op::Equal {
            old: a_off + i,
            new: b_off + i,
        });
    }
    let a_rest = &a[prefix..];
    let b_rest = &b[prefix..];
    let suffix = a_rest
        .iter()
        .rev()
        .zip(b_rest.iter().rev())
        .take_while(|(x, y)| x == y)
        .count();
    let a_mid = &a_rest[..a_rest.len() - suffix];
    let b_mid = &b_rest[..b_rest.len() - suffix];
    let (a_mid_off, b_mid_off) = (a_off + prefix, b_off + prefix);

    if a_mid.is_empty() || b_mid.is_empty() {
        myers(a_mid, b_mid, a_mid_off, b_mid_off, out);
    } else {
        let anchors = unique_anchors(a_mid, b_mid);
        if anchors.is_empty() {
            myers(a_mid, b_mid, a_mid_off, b_mid_off, out);
        } else {
            let (mut ai, mut bi) = (0, 0);
            for (x, y) in anchors {
                patience(&a_mid[ai..x], &b_mid[bi..y], a_mid_off + ai, b_mid_off + bi, out);
                out.push(Op::Equal {
                    old: a_mid_off + x,
                    new: b_mid_off + y,
                });
                ai = x + 1;
                bi = y + 1;
            }
            patience(&a_mid[ai..], &b_mid[bi..], a_mid_off + ai, b_mid_off + bi, out);
        }
    }

    let a_suffix_start = a_off + a.len() - suffix;
    let b_suffix_start = b_off + b.len() - suffix;
    for i in 0..suffix {
        out.push(Op::Equal {
            old: a_suffix_start + i,
            new: b_suffix_start + i,
        });
    }
}

/// Longest increasing run of lines that occur exactly once on each side.
fn unique_anchors(a: &[usize], b: &[usize]) -> Vec<(usize, usize)> {
    // token -> (count in a, count in b, index in a, index in b)
    let mut counts: HashMap<usize, (usize, usize, usize, usize)> = HashMap::new();
    for (i, token) in a.iter().enumerate() {
        let entry = counts.entry(*token).or_insert((0, 0, i, 0));
        entry.0 += 1;
    }
    for (j, token) in b.iter().enumerate() {
        if let Some(entry) = counts.get_mut(token) {
            entry.1 += 1;
            entry.3 = j;
        }
    }
    let pairs: Vec<(usize, usize)> = a
        .iter()
        .filter_map(|token| match counts.get(token) {
            Some(&(1, 1, i, j)) => Some((i, j)),
            _ => None,
        })
        .collect();

    // Patience sorting for the longest increasing subsequence on b.
    let mut tails: Vec<usize> = Vec::new();
    let mut back: Vec<Option<usize>> = vec![None; pairs.len()];
    for (idx, &(_, j)) in pairs.iter().enumerate() {
        let pos = tails.partition_point(|&t| pairs[t].1 < j);
        if pos > 0 {
            back[idx] = Some(tails[pos - 1]);
        }
        if pos == tails.len() {
            tails.push(idx);
        } else {
            tails[pos] = idx;
        }
    }
    let mut chain = Vec::with_capacity(tails.len());
    let mut cursor = tails.last().copied();
    while let Some(idx) = cursor {
        chain.push(pairs[idx]);
        cursor = back[idx];
    }
    chain.reverse();
    chain
}
