//! merge::file
//!
//! Line-level three-way merge (diff3).
//!
//! Ancestor, ours and theirs are aligned through two edit scripts
//! (ancestor to ours, ancestor to theirs). Ancestor lines matched on both
//! sides are stable; everything between two stable runs is a chunk that
//! changed on one side, on both sides identically, or on both sides
//! differently. Only the last kind conflicts.

use crate::core::types::FileMode;
use crate::diff::lines::{diff_lines, split_lines, Op};
use crate::diff::{DiffAlgorithm, WhitespaceMode};
use crate::object::blob::looks_binary;

use super::{ConflictStyle, MergeFavor};

const MARKER_LEN: usize = 7;

#[derive(Debug, Clone)]
pub struct FileMergeOptions {
    pub ancestor_label: String,
    pub our_label: String,
    pub their_label: String,
    pub favor: MergeFavor,
    pub style: ConflictStyle,
    pub whitespace: WhitespaceMode,
    pub algorithm: DiffAlgorithm,
}

impl Default for FileMergeOptions {
    fn default() -> Self {
        super::MergeOptions::default().file_options()
    }
}

/// One side of a file merge.
#[derive(Debug, Clone, Copy)]
pub struct MergeFileInput<'a> {
    pub content: &'a [u8],
    pub mode: FileMode,
}

impl<'a> MergeFileInput<'a> {
    pub fn new(content: &'a [u8], mode: FileMode) -> Self {
        Self { content, mode }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMergeResult {
    /// No conflicting hunks remain in `content`.
    pub automergeable: bool,
    pub content: Vec<u8>,
    pub mode: FileMode,
    /// Number of conflicting hunks written with markers.
    pub conflicts: usize,
}

/// Merge `ours` and `theirs` relative to `ancestor` (absent means empty).
///
/// Binary inputs are never merged line by line: unless one side is
/// trivially taken or `favor` picks a side, the result is ours with
/// `automergeable == false`.
pub fn merge_file(
    ancestor: Option<MergeFileInput<'_>>,
    ours: MergeFileInput<'_>,
    theirs: MergeFileInput<'_>,
    options: &FileMergeOptions,
) -> FileMergeResult {
    let base: &[u8] = ancestor.map(|a| a.content).unwrap_or_default();
    let mode = merge_mode(ancestor.map(|a| a.mode), ours.mode, theirs.mode);
    let clean = |content: &[u8]| FileMergeResult {
        automergeable: true,
        content: content.to_vec(),
        mode,
        conflicts: 0,
    };

    if ours.content == theirs.content {
        return clean(ours.content);
    }
    if ancestor.is_some() && base == ours.content {
        return clean(theirs.content);
    }
    if ancestor.is_some() && base == theirs.content {
        return clean(ours.content);
    }

    if looks_binary(base) || looks_binary(ours.content) || looks_binary(theirs.content) {
        return match options.favor {
            MergeFavor::Ours => clean(ours.content),
            MergeFavor::Theirs => clean(theirs.content),
            MergeFavor::Normal | MergeFavor::Union => FileMergeResult {
                automergeable: false,
                content: ours.content.to_vec(),
                mode,
                conflicts: 1,
            },
        };
    }

    let base_lines = split_lines(base);
    let our_lines = split_lines(ours.content);
    let their_lines = split_lines(theirs.content);
    let chunks = diff3(&base_lines, &our_lines, &their_lines, options);

    let mut out = Vec::with_capacity(ours.content.len().max(theirs.content.len()));
    let mut conflicts = 0;
    for chunk in chunks {
        match chunk {
            Chunk::Resolved(lines) => extend(&mut out, &lines),
            Chunk::Conflict { base, ours, theirs } => match options.favor {
                MergeFavor::Ours => extend(&mut out, &ours),
                MergeFavor::Theirs => extend(&mut out, &theirs),
                MergeFavor::Union => {
                    extend_terminated(&mut out, &ours);
                    extend(&mut out, &theirs);
                }
                MergeFavor::Normal => {
                    conflicts += 1;
                    write_conflict(&mut out, &base, &ours, &theirs, options);
                }
            },
        }
    }
    FileMergeResult {
        automergeable: conflicts == 0,
        content: out,
        mode,
        conflicts,
    }
}

/// A changed mode wins; when both changed differently, executable wins.
fn merge_mode(ancestor: Option<FileMode>, ours: FileMode, theirs: FileMode) -> FileMode {
    if ours == theirs || ancestor == Some(theirs) {
        ours
    } else if ancestor == Some(ours) {
        theirs
    } else if theirs == FileMode::BlobExecutable {
        theirs
    } else {
        ours
    }
}

#[derive(Debug)]
enum Chunk<'a> {
    Resolved(Vec<&'a [u8]>),
    Conflict {
        base: Vec<&'a [u8]>,
        ours: Vec<&'a [u8]>,
        theirs: Vec<&'a [u8]>,
    },
}

/// For each line of `old`, the index of the line it is matched with in `new`.
fn matches(old: &[&[u8]], new: &[&[u8]], options: &FileMergeOptions) -> Vec<Option<usize>> {
    let mut map = vec![None; old.len()];
    for op in diff_lines(old, new, options.algorithm, options.whitespace) {
        if let Op::Equal { old, new } = op {
            map[old] = Some(new);
        }
    }
    map
}

fn diff3<'a>(
    base: &[&'a [u8]],
    ours: &[&'a [u8]],
    theirs: &[&'a [u8]],
    options: &FileMergeOptions,
) -> Vec<Chunk<'a>> {
    let to_ours = matches(base, ours, options);
    let to_theirs = matches(base, theirs, options);
    let mut chunks = Vec::new();
    let mut stable: Vec<&'a [u8]> = Vec::new();
    let (mut a, mut o, mut t) = (0, 0, 0);

    loop {
        while a < base.len() && to_ours[a] == Some(o) && to_theirs[a] == Some(t) {
            stable.push(ours[o]);
            a += 1;
            o += 1;
            t += 1;
        }
        if a == base.len() && o == ours.len() && t == theirs.len() {
            break;
        }

        // Next ancestor line matched on both sides ends the unstable chunk.
        let next = (a..base.len()).find(|&k| to_ours[k].is_some() && to_theirs[k].is_some());
        let (a_end, o_end, t_end) = match next {
            Some(k) => (k, to_ours[k].unwrap_or(ours.len()), to_theirs[k].unwrap_or(theirs.len())),
            None => (base.len(), ours.len(), theirs.len()),
        };
        let base_part = &base[a..a_end];
        let our_part = &ours[o..o_end];
        let their_part = &theirs[t..t_end];

        let resolved: Option<&[&'a [u8]]> = if our_part == base_part {
            Some(their_part)
        } else if their_part == base_part || our_part == their_part {
            Some(our_part)
        } else {
            None
        };
        match resolved {
            Some(lines) => stable.extend_from_slice(lines),
            None => {
                let (prefix, suffix) = if options.style == ConflictStyle::Merge {
                    common_ends(our_part, their_part)
                } else {
                    (0, 0)
                };
                stable.extend_from_slice(&our_part[..prefix]);
                if !stable.is_empty() {
                    chunks.push(Chunk::Resolved(std::mem::take(&mut stable)));
                }
                chunks.push(Chunk::Conflict {
                    base: base_part.to_vec(),
                    ours: our_part[prefix..our_part.len() - suffix].to_vec(),
                    theirs: their_part[prefix..their_part.len() - suffix].to_vec(),
                });
                stable.extend_from_slice(&our_part[our_part.len() - suffix..]);
            }
        }
        a = a_end;
        o = o_end;
        t = t_end;
    }
    if !stable.is_empty() {
        chunks.push(Chunk::Resolved(stable));
    }
    chunks
}

/// Lengths of the shared leading and trailing runs, not overlapping.
fn common_ends(a: &[&[u8]], b: &[&[u8]]) -> (usize, usize) {
    let prefix = a.iter().zip(b).take_while(|(x, y)| x == y).count();
    let max_suffix = a.len().min(b.len()) - prefix;
    let suffix = a
        .iter()
        .rev()
        .zip(b.iter().rev())
        .take(max_suffix)
        .take_while(|(x, y)| x == y)
        .count();
    (prefix, suffix)
}

fn extend(out: &mut Vec<u8>, lines: &[&[u8]]) {
    for line in lines {
        out.extend_from_slice(line);
    }
}

/// Like [`extend`], but guarantees the output ends with a newline.
fn extend_terminated(out: &mut Vec<u8>, lines: &[&[u8]]) {
    extend(out, lines);
    if !lines.is_empty() && !out.ends_with(b"\n") {
        out.push(b'\n');
    }
}

fn marker(out: &mut Vec<u8>, ch: u8, label: &str) {
    out.extend(std::iter::repeat(ch).take(MARKER_LEN));
    if !label.is_empty() {
        out.push(b' ');
        out.extend_from_slice(label.as_bytes());
    }
    out.push(b'\n');
}

fn write_conflict(
    out: &mut Vec<u8>,
    base: &[&[u8]],
    ours: &[&[u8]],
    theirs: &[&[u8]],
    options: &FileMergeOptions,
) {
    marker(out, b'<', &options.our_label);
    extend_terminated(out, ours);
    if options.style == ConflictStyle::Diff3 {
        marker(out, b'|', &options.ancestor_label);
        extend_terminated(out, base);
    }
    marker(out, b'=', "");
    extend_terminated(out, theirs);
    marker(out, b'>', &options.their_label);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn text(content: &str) -> MergeFileInput<'_> {
        MergeFileInput::new(content.as_bytes(), FileMode::Blob)
    }

    fn merge(base: &str, ours: &str, theirs: &str, options: &FileMergeOptions) -> FileMergeResult {
        merge_file(Some(text(base)), text(ours), text(theirs), options)
    }

    const BASE: &str = "1\n2\n3\n4\n5\n6\n7\n";

    #[test]
    fn disjoint_edits_merge_cleanly() {
        let result = merge(
            BASE,
            "one\n2\n3\n4\n5\n6\n7\n",
            "1\n2\n3\n4\n5\n6\nseven\n",
            &FileMergeOptions::default(),
        );
        assert!(result.automergeable);
        assert_eq!(result.content, b"one\n2\n3\n4\n5\n6\nseven\n");
    }

    #[test]
    fn overlapping_edits_conflict() {
        let result = merge(
            BASE,
            "1\n2\nours\n4\n5\n6\n7\n",
            "1\n2\ntheirs\n4\n5\n6\n7\n",
            &FileMergeOptions::default(),
        );
        assert!(!result.automergeable);
        assert_eq!(result.conflicts, 1);
        assert_eq!(
            String::from_utf8(result.content).unwrap(),
            "1\n2\n<<<<<<< ours\nours\n=======\ntheirs\n>>>>>>> theirs\n4\n5\n6\n7\n"
        );
    }

    #[test]
    fn diff3_style_shows_ancestor() {
        let options = FileMergeOptions {
            style: ConflictStyle::Diff3,
            our_label: "HEAD".into(),
            their_label: "feature".into(),
            ..FileMergeOptions::default()
        };
        let result = merge("a\nb\nc\n", "a\nX\nc\n", "a\nY\nc\n", &options);
        assert_eq!(
            String::from_utf8(result.content).unwrap(),
            "a\n<<<<<<< HEAD\nX\n||||||| base\nb\n=======\nY\n>>>>>>> feature\nc\n"
        );
    }

    #[test]
    fn favor_settles_conflicts() {
        let ours = "a\nX\nc\n";
        let theirs = "a\nY\nc\n";
        let pick = |favor| {
            let options = FileMergeOptions {
                favor,
                ..FileMergeOptions::default()
            };
            let result = merge("a\nb\nc\n", ours, theirs, &options);
            assert!(result.automergeable);
            String::from_utf8(result.content).unwrap()
        };
        assert_eq!(pick(MergeFavor::Ours), ours);
        assert_eq!(pick(MergeFavor::Theirs), theirs);
        assert_eq!(pick(MergeFavor::Union), "a\nX\nY\nc\n");
    }

    #[test]
    fn identical_changes_and_one_sided_changes() {
        let options = FileMergeOptions::default();
        let both = merge(BASE, "x\n", "x\n", &options);
        assert!(both.automergeable);
        assert_eq!(both.content, b"x\n");

        let theirs_only = merge(BASE, BASE, "changed\n", &options);
        assert_eq!(theirs_only.content, b"changed\n");
    }

    #[test]
    fn add_add_without_ancestor() {
        let result = merge_file(None, text("a\n"), text("b\n"), &FileMergeOptions::default());
        assert!(!result.automergeable);
        let content = String::from_utf8(result.content).unwrap();
        assert!(content.starts_with("<<<<<<< ours\na\n=======\nb\n>>>>>>> theirs\n"));
    }

    #[test]
    fn missing_final_newline_inside_conflict() {
        let result = merge("a\nb", "a\nx", "a\ny", &FileMergeOptions::default());
        assert_eq!(
            String::from_utf8(result.content).unwrap(),
            "a\n<<<<<<< ours\nx\n=======\ny\n>>>>>>> theirs\n"
        );
    }

    #[test]
    fn binary_content_is_not_line_merged() {
        let base = MergeFileInput::new(b"\0base", FileMode::Blob);
        let ours = MergeFileInput::new(b"\0ours", FileMode::Blob);
        let theirs = MergeFileInput::new(b"\0theirs", FileMode::Blob);
        let result = merge_file(Some(base), ours, theirs, &FileMergeOptions::default());
        assert!(!result.automergeable);
        assert_eq!(result.content, b"\0ours");

        let options = FileMergeOptions {
            favor: MergeFavor::Theirs,
            ..FileMergeOptions::default()
        };
        let result = merge_file(Some(base), ours, theirs, &options);
        assert!(result.automergeable);
        assert_eq!(result.content, b"\0theirs");
    }

    #[test]
    fn mode_changes_merge() {
        let base = MergeFileInput::new(b"x\n", FileMode::Blob);
        let ours = MergeFileInput::new(b"x\n", FileMode::BlobExecutable);
        let theirs = MergeFileInput::new(b"y\n", FileMode::Blob);
        let result = merge_file(Some(base), ours, theirs, &FileMergeOptions::default());
        assert!(result.automergeable);
        assert_eq!(result.content, b"y\n");
        assert_eq!(result.mode, FileMode::BlobExecutable);
    }
}
