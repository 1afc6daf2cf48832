//! diff::patch
//!
//! Hunks, lines and unified patch text for a single delta.

use std::fmt::Write as _;

use super::lines::Op;
use super::{Delta, DeltaStatus};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineOrigin {
    Context,
    Addition,
    Deletion,
}

impl LineOrigin {
    pub fn as_char(self) -> char {
        match self {
            LineOrigin::Context => ' ',
            LineOrigin::Addition => '+',
            LineOrigin::Deletion => '-',
        }
    }
}

/// One line of a hunk. Line numbers are 1-based.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub origin: LineOrigin,
    pub old_lineno: Option<usize>,
    pub new_lineno: Option<usize>,
    pub content: Vec<u8>,
}

impl DiffLine {
    /// False for the last line of a file that lacks a final newline.
    pub fn has_newline(&self) -> bool {
        self.content.ends_with(b"\n")
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hunk {
    pub old_start: usize,
    pub old_lines: usize,
    pub new_start: usize,
    pub new_lines: usize,
    pub lines: Vec<DiffLine>,
}

fn range_text(start: usize, count: usize) -> String {
    if count == 1 {
        start.to_string()
    } else {
        format!("{start},{count}")
    }
}

impl Hunk {
    /// `@@ -a,b +c,d @@`
    pub fn header(&self) -> String {
        format!(
            "@@ -{} +{} @@",
            range_text(self.old_start, self.old_lines),
            range_text(self.new_start, self.new_lines)
        )
    }
}

/// Group an edit script into hunks with `context` lines around changes.
/// Changes separated by at most `2 * context + interhunk` unchanged
/// lines share a hunk.
pub(crate) fn build_hunks(
    old: &[&[u8]],
    new: &[&[u8]],
    ops: &[Op],
    context: usize,
    interhunk: usize,
) -> Vec<Hunk> {
    // Lines consumed on each side before op i.
    let mut old_pos = Vec::with_capacity(ops.len() + 1);
    let mut new_pos = Vec::with_capacity(ops.len() + 1);
    let (mut o, mut n) = (0, 0);
    for op in ops {
        old_pos.push(o);
        new_pos.push(n);
        match op {
            Op::Equal { .. } => {
                o += 1;
                n += 1;
            }
            Op::Delete { .. } => o += 1,
            Op::Insert { .. } => n += 1,
        }
    }

    let changes: Vec<usize> = ops
        .iter()
        .enumerate()
        .filter(|(_, op)| !matches!(op, Op::Equal { .. }))
        .map(|(i, _)| i)
        .collect();
    let Some(&first) = changes.first() else {
        return Vec::new();
    };

    let mut groups: Vec<(usize, usize)> = vec![(first, first)];
    for &idx in &changes[1..] {
        let Some(last) = groups.last_mut() else { break };
        if idx - last.1 - 1 <= 2 * context + interhunk {
            last.1 = idx;
        } else {
            groups.push((idx, idx));
        }
    }

    groups
        .into_iter()
        .map(|(first, last)| {
            let start = first.saturating_sub(context);
            let end = (last + context + 1).min(ops.len());
            let mut hunk = Hunk {
                old_start: 0,
                old_lines: 0,
                new_start: 0,
                new_lines: 0,
                lines: Vec::with_capacity(end - start),
            };
            for op in &ops[start..end] {
                let line = match *op {
                    Op::Equal { old: i, new: j } => {
                        hunk.old_lines += 1;
                        hunk.new_lines += 1;
                        DiffLine {
                            origin: LineOrigin::Context,
                            old_lineno: Some(i + 1),
                            new_lineno: Some(j + 1),
                            content: new[j].to_vec(),
                        }
                    }
                    Op::Delete { old: i } => {
                        hunk.old_lines += 1;
                        DiffLine {
                            origin: LineOrigin::Deletion,
                            old_lineno: Some(i + 1),
                            new_lineno: None,
                            content: old[i].to_vec(),
                        }
                    }
                    Op::Insert { new: j } => {
                        hunk.new_lines += 1;
                        DiffLine {
                            origin: LineOrigin::Addition,
                            old_lineno: None,
                            new_lineno: Some(j + 1),
                            content: new[j].to_vec(),
                        }
                    }
                };
                hunk.lines.push(line);
            }
            // An empty side starts at the line before the hunk.
            hunk.old_start = old_pos[start] + usize::from(hunk.old_lines > 0);
            hunk.new_start = new_pos[start] + usize::from(hunk.new_lines > 0);
            hunk
        })
        .collect()
}

/// Line-level view of one delta.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Patch {
    pub delta: Delta,
    pub binary: bool,
    pub hunks: Vec<Hunk>,
}

impl Patch {
    pub fn additions(&self) -> usize {
        self.count(LineOrigin::Addition)
    }

    pub fn deletions(&self) -> usize {
        self.count(LineOrigin::Deletion)
    }

    fn count(&self, origin: LineOrigin) -> usize {
        self.hunks
            .iter()
            .flat_map(|h| &h.lines)
            .filter(|l| l.origin == origin)
            .count()
    }

    /// Unified diff text with a `diff --git` header.
    pub fn to_text(&self, abbrev: usize) -> String {
        let mut out = String::new();
        write_header(&mut out, &self.delta, abbrev);
        let old_path = &self.delta.old_file.path;
        let new_path = &self.delta.new_file.path;

        if self.binary {
            let _ = writeln!(out, "Binary files {} and {} differ", side_name("a", self), side_name("b", self));
            return out;
        }
        if self.hunks.is_empty() {
            return out;
        }
        if self.delta.old_file.exists() {
            let _ = writeln!(out, "--- a/{old_path}");
        } else {
            out.push_str("--- /dev/null\n");
        }
        if self.delta.new_file.exists() {
            let _ = writeln!(out, "+++ b/{new_path}");
        } else {
            out.push_str("+++ /dev/null\n");
        }
        for hunk in &self.hunks {
            out.push_str(&hunk.header());
            out.push('\n');
            for line in &hunk.lines {
                out.push(line.origin.as_char());
                out.push_str(&String::from_utf8_lossy(&line.content));
                if !line.has_newline() {
                    out.push_str("\n\\ No newline at end of file\n");
                }
            }
        }
        out
    }
}

fn side_name(prefix: &str, patch: &Patch) -> String {
    let file = if prefix == "a" {
        &patch.delta.old_file
    } else {
        &patch.delta.new_file
    };
    if file.exists() {
        format!("{prefix}/{}", file.path)
    } else {
        "/dev/null".to_string()
    }
}

fn write_header(out: &mut String, delta: &Delta, abbrev: usize) {
    let old = &delta.old_file;
    let new = &delta.new_file;
    let _ = writeln!(out, "diff --git a/{} b/{}", old.path, new.path);

    match (old.mode, new.mode) {
        (None, Some(mode)) => {
            let _ = writeln!(out, "new file mode {mode}");
        }
        (Some(mode), None) => {
            let _ = writeln!(out, "deleted file mode {mode}");
        }
        (Some(a), Some(b)) if a != b => {
            let _ = writeln!(out, "old mode {a}\nnew mode {b}");
        }
        _ => {}
    }

    match delta.status {
        DeltaStatus::Renamed => {
            let _ = writeln!(
                out,
                "similarity index {}%\nrename from {}\nrename to {}",
                delta.similarity.unwrap_or(100),
                old.path,
                new.path
            );
        }
        DeltaStatus::Copied => {
            let _ = writeln!(
                out,
                "similarity index {}%\ncopy from {}\ncopy to {}",
                delta.similarity.unwrap_or(100),
                old.path,
                new.path
            );
        }
        _ => {}
    }

    if old.oid != new.oid {
        let _ = write!(out, "index {}..{}", old.oid.short(abbrev), new.oid.short(abbrev));
        match (old.mode, new.mode) {
            (Some(a), Some(b)) if a == b => {
                let _ = writeln!(out, " {a}");
            }
            _ => out.push('\n'),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diff::lines::{diff_lines, split_lines, DiffAlgorithm, WhitespaceMode};

    fn hunks(old: &[u8], new: &[u8], context: usize) -> Vec<Hunk> {
        let a = split_lines(old);
        let b = split_lines(new);
        let ops = diff_lines(&a, &b, DiffAlgorithm::Myers, WhitespaceMode::None);
        build_hunks(&a, &b, &ops, context, 0)
    }

    #[test]
    fn distant_changes_make_separate_hunks() {
        let old = b"1\n2\n3\n4\n5\n6\n7\n8\n9\n10\n";
        let new = b"one\n2\n3\n4\n5\n6\n7\n8\n9\nten\n";
        assert_eq!(hunks(old, new, 3).len(), 2);
        assert_eq!(hunks(old, new, 4).len(), 1);

        let split = hunks(old, new, 3);
        assert_eq!(split[0].header(), "@@ -1,4 +1,4 @@");
        assert_eq!(split[1].header(), "@@ -7,4 +7,4 @@");
    }

    #[test]
    fn additions_to_empty_file() {
        let hunk = &hunks(b"", b"a\nb\n", 3)[0];
        assert_eq!(hunk.header(), "@@ -0,0 +1,2 @@");
        assert_eq!(hunk.lines[1].new_lineno, Some(2));
    }

    #[test]
    fn single_line_ranges_omit_count() {
        let hunk = &hunks(b"a\n", b"b\n", 3)[0];
        assert_eq!(hunk.header(), "@@ -1 +1 @@");
    }
}
