//! blame
//!
//! Attribute each line of a file to the commit that introduced it.
//!
//! History is walked newest first in topological order, so a commit is
//! only visited after every child that could hand lines down to it. Each
//! visited commit holds the lines still unexplained at some path; lines
//! that survive unchanged into a parent (by the line diff, or wholesale
//! when the blob is identical) move to that parent, and whatever is left
//! is blamed on the commit itself. The walk stops as soon as no lines are
//! pending.
//!
//! Lines that reach the oldest commit considered, a root commit, or a
//! commit outside the walk are blamed there with `boundary` set.

use std::collections::HashMap;

use tracing::debug;

use crate::core::cancel::CancelToken;
use crate::core::types::{HashAlgorithm, Oid, Signature};
use crate::diff::lines::{diff_lines, split_lines, DiffAlgorithm, Op, WhitespaceMode};
use crate::diff::{self, DeltaStatus, DiffOptions};
use crate::error::{Error, Result};
use crate::odb::Odb;
use crate::refs::RefStore;
use crate::revwalk::{RevWalk, Sort};

#[derive(Debug, Clone, Default)]
pub struct BlameOptions {
    /// Commit whose version of the file is blamed. Defaults to HEAD.
    pub newest_commit: Option<Oid>,
    /// Last commit considered; lines reaching it are blamed on it.
    pub oldest_commit: Option<Oid>,
    /// First line to blame, 1-based. 0 means the first line.
    pub min_line: usize,
    /// Last line to blame, 1-based inclusive. 0 means the last line.
    pub max_line: usize,
    pub first_parent: bool,
    /// Follow the file through renames in the tree diff.
    pub track_renames: bool,
    pub whitespace: WhitespaceMode,
    pub algorithm: DiffAlgorithm,
    pub cancel: Option<CancelToken>,
}

/// A run of consecutive lines with the same origin.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlameHunk {
    /// Commit that last changed these lines; zero for uncommitted lines.
    pub final_commit: Oid,
    pub final_signature: Option<Signature>,
    /// 1-based line in the blamed file.
    pub final_start_line: usize,
    pub lines_in_hunk: usize,
    pub orig_commit: Oid,
    pub orig_path: String,
    pub orig_signature: Option<Signature>,
    /// 1-based line in the file as `orig_commit` has it.
    pub orig_start_line: usize,
    pub boundary: bool,
}

impl BlameHunk {
    pub fn contains(&self, line: usize) -> bool {
        line >= self.final_start_line && line < self.final_start_line + self.lines_in_hunk
    }
}

/// Commit and path a set of lines came from.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Source {
    commit: Oid,
    path: String,
    signature: Option<Signature>,
    boundary: bool,
}

/// Per final line: source index and 0-based line in that source.
type LineMap = Vec<Option<(usize, usize)>>;

#[derive(Debug, Clone)]
pub struct Blame {
    path: String,
    algorithm: HashAlgorithm,
    diff_algorithm: DiffAlgorithm,
    whitespace: WhitespaceMode,
    contents: Vec<u8>,
    sources: Vec<Source>,
    lines: LineMap,
    hunks: Vec<BlameHunk>,
}

/// Lines pending at one path of one commit.
#[derive(Debug)]
struct Pending {
    path: String,
    blob: Oid,
    /// (final line, line in `blob`), both 0-based.
    lines: Vec<(usize, usize)>,
}

impl Blame {
    /// Blame `path` as of `options.newest_commit`.
    ///
    /// # Errors
    ///
    /// - `NotFound` if the newest commit has no file at `path`
    /// - `Unborn` if no newest commit is given and HEAD has no commits
    /// - `Interrupted` if the cancel token is raised
    pub fn file(odb: &Odb, refs: &RefStore, path: &str, options: &BlameOptions) -> Result<Blame> {
        let newest = match options.newest_commit {
            Some(oid) => odb.peel_to_commit(&oid)?,
            None => refs.head()?.oid,
        };
        let blob = blob_at(odb, &odb.find_commit(&newest)?.tree, path)?
            .ok_or_else(|| Error::not_found("file", path))?;
        let contents = odb.find_blob(&blob)?.data;
        let total = split_lines(&contents).len();

        let first = options.min_line.max(1) - 1;
        let last = match options.max_line {
            0 => total,
            n => n.min(total),
        };
        let mut lines: LineMap = vec![None; total];
        let mut sources = Sources::default();

        let mut pending: HashMap<Oid, Vec<Pending>> = HashMap::new();
        if first < last {
            pending.insert(
                newest,
                vec![Pending {
                    path: path.to_string(),
                    blob,
                    lines: (first..last).map(|i| (i, i)).collect(),
                }],
            );
        }

        let oldest = match options.oldest_commit {
            Some(oid) => Some(odb.peel_to_commit(&oid)?),
            None => None,
        };
        let mut walk = RevWalk::new(odb, refs);
        walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME);
        if options.first_parent {
            walk.simplify_first_parent();
        }
        if let Some(token) = &options.cancel {
            walk.set_cancel_token(token.clone());
        }
        walk.push(&newest)?;
        if let Some(oldest) = &oldest {
            for parent in &odb.find_commit(oldest)?.parents {
                walk.hide(parent)?;
            }
        }

        let mut visited = 0usize;
        while !pending.is_empty() {
            let Some(oid) = walk.next_commit()? else {
                break;
            };
            let Some(work) = pending.remove(&oid) else {
                continue;
            };
            visited += 1;
            let commit = odb.find_commit(&oid)?;
            let parents: &[Oid] = if oldest == Some(oid) {
                &[]
            } else if options.first_parent {
                &commit.parents[..commit.parents.len().min(1)]
            } else {
                &commit.parents
            };
            let boundary = parents.is_empty();

            for mut item in work {
                for parent in parents {
                    if item.lines.is_empty() {
                        break;
                    }
                    let Some((parent_path, parent_blob)) =
                        locate_in_parent(odb, parent, &commit.tree, &item.path, options)?
                    else {
                        continue;
                    };
                    let passed = if parent_blob == item.blob {
                        std::mem::take(&mut item.lines)
                    } else {
                        pass_unchanged(odb, &mut item, &parent_blob, options)?
                    };
                    if !passed.is_empty() {
                        add_pending(&mut pending, *parent, parent_path, parent_blob, passed);
                    }
                }
                if !item.lines.is_empty() {
                    let source = sources.get(oid, &item.path, Some(&commit.author), boundary);
                    for (final_line, orig_line) in item.lines {
                        lines[final_line] = Some((source, orig_line));
                    }
                }
            }
        }

        // Lines handed to commits the walk never reached.
        for (oid, work) in pending {
            let author = odb.find_commit(&oid)?.author;
            for item in work {
                let source = sources.get(oid, &item.path, Some(&author), true);
                for (final_line, orig_line) in item.lines {
                    lines[final_line] = Some((source, orig_line));
                }
            }
        }

        let sources = sources.list;
        let hunks = group(&sources, &lines);
        debug!(path, commit = %newest, visited, hunks = hunks.len(), "blame complete");
        Ok(Blame {
            path: path.to_string(),
            algorithm: odb.algorithm(),
            diff_algorithm: options.algorithm,
            whitespace: options.whitespace,
            contents,
            sources,
            lines,
            hunks,
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Content of the blamed version.
    pub fn contents(&self) -> &[u8] {
        &self.contents
    }

    pub fn hunk_count(&self) -> usize {
        self.hunks.len()
    }

    pub fn hunk(&self, index: usize) -> Option<&BlameHunk> {
        self.hunks.get(index)
    }

    /// Hunk covering 1-based `line`.
    pub fn hunk_for_line(&self, line: usize) -> Option<&BlameHunk> {
        let index = self
            .hunks
            .partition_point(|hunk| hunk.final_start_line + hunk.lines_in_hunk <= line);
        self.hunks.get(index).filter(|hunk| hunk.contains(line))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, BlameHunk> {
        self.hunks.iter()
    }

    /// Re-blame against edited `contents` of the same file.
    ///
    /// Lines unchanged from the blamed version keep their origin; new lines
    /// belong to a zero commit with no signature.
    pub fn buffer(&self, contents: &[u8]) -> Blame {
        let old = split_lines(&self.contents);
        let new = split_lines(contents);
        let mut sources = self.sources.clone();
        let uncommitted = sources.len();
        sources.push(Source {
            commit: Oid::zero(self.algorithm),
            path: self.path.clone(),
            signature: None,
            boundary: false,
        });

        let mut lines: LineMap = vec![None; new.len()];
        for op in diff_lines(&old, &new, self.diff_algorithm, self.whitespace) {
            match op {
                Op::Equal { old, new } => lines[new] = self.lines[old],
                Op::Insert { new } => lines[new] = Some((uncommitted, new)),
                Op::Delete { .. } => {}
            }
        }

        let hunks = group(&sources, &lines);
        Blame {
            path: self.path.clone(),
            algorithm: self.algorithm,
            diff_algorithm: self.diff_algorithm,
            whitespace: self.whitespace,
            contents: contents.to_vec(),
            sources,
            lines,
            hunks,
        }
    }
}

impl<'b> IntoIterator for &'b Blame {
    type Item = &'b BlameHunk;
    type IntoIter = std::slice::Iter<'b, BlameHunk>;

    fn into_iter(self) -> Self::IntoIter {
        self.hunks.iter()
    }
}

#[derive(Debug, Default)]
struct Sources {
    list: Vec<Source>,
    by_key: HashMap<(Oid, String, bool), usize>,
}

impl Sources {
    fn get(&mut self, commit: Oid, path: &str, author: Option<&Signature>, boundary: bool) -> usize {
        let key = (commit, path.to_string(), boundary);
        if let Some(index) = self.by_key.get(&key) {
            return *index;
        }
        let index = self.list.len();
        self.list.push(Source {
            commit,
            path: path.to_string(),
            signature: author.cloned(),
            boundary,
        });
        self.by_key.insert(key, index);
        index
    }
}

fn blob_at(odb: &Odb, tree: &Oid, path: &str) -> Result<Option<Oid>> {
    let entry = odb.find_tree(tree)?.entry_by_path(odb, path)?;
    Ok(entry
        .filter(|entry| entry.mode.is_blob() || entry.mode.is_link())
        .map(|entry| entry.oid))
}

/// Path and blob the file had in `parent`, following a rename if asked.
fn locate_in_parent(
    odb: &Odb,
    parent: &Oid,
    child_tree: &Oid,
    path: &str,
    options: &BlameOptions,
) -> Result<Option<(String, Oid)>> {
    let parent_tree = odb.find_commit(parent)?.tree;
    if let Some(blob) = blob_at(odb, &parent_tree, path)? {
        return Ok(Some((path.to_string(), blob)));
    }
    if !options.track_renames {
        return Ok(None);
    }
    let diff_options = DiffOptions {
        detect_renames: true,
        cancel: options.cancel.clone(),
        ..DiffOptions::default()
    };
    let diff = diff::tree_to_tree(odb, Some(&parent_tree), Some(child_tree), &diff_options)?;
    Ok(diff
        .iter()
        .find(|delta| delta.status == DeltaStatus::Renamed && delta.new_file.path == path)
        .map(|delta| (delta.old_file.path.clone(), delta.old_file.oid)))
}

/// Move lines of `item` that survive unchanged from `parent_blob`,
/// returning them keyed by their line in the parent's version.
fn pass_unchanged(
    odb: &Odb,
    item: &mut Pending,
    parent_blob: &Oid,
    options: &BlameOptions,
) -> Result<Vec<(usize, usize)>> {
    let ours = odb.find_blob(&item.blob)?.data;
    let theirs = odb.find_blob(parent_blob)?.data;
    let mut to_parent: HashMap<usize, usize> = HashMap::new();
    for op in diff_lines(
        &split_lines(&theirs),
        &split_lines(&ours),
        options.algorithm,
        options.whitespace,
    ) {
        if let Op::Equal { old, new } = op {
            to_parent.insert(new, old);
        }
    }

    let mut passed = Vec::new();
    item.lines.retain(|(final_line, line)| match to_parent.get(line) {
        Some(parent_line) => {
            passed.push((*final_line, *parent_line));
            false
        }
        None => true,
    });
    Ok(passed)
}

fn add_pending(
    pending: &mut HashMap<Oid, Vec<Pending>>,
    commit: Oid,
    path: String,
    blob: Oid,
    lines: Vec<(usize, usize)>,
) {
    let items = pending.entry(commit).or_default();
    match items.iter_mut().find(|item| item.path == path) {
        Some(item) => item.lines.extend(lines),
        None => items.push(Pending { path, blob, lines }),
    }
}

/// Merge consecutive lines with the same source and consecutive origin.
fn group(sources: &[Source], lines: &[Option<(usize, usize)>]) -> Vec<BlameHunk> {
    let mut hunks: Vec<BlameHunk> = Vec::new();
    let mut previous: Option<(usize, usize, usize)> = None;
    for (index, line) in lines.iter().enumerate() {
        let Some((source_index, orig)) = *line else {
            previous = None;
            continue;
        };
        let extends = matches!(
            previous,
            Some((s, f, o)) if s == source_index && f + 1 == index && o + 1 == orig
        );
        previous = Some((source_index, index, orig));
        if let (true, Some(hunk)) = (extends, hunks.last_mut()) {
            hunk.lines_in_hunk += 1;
            continue;
        }
        let source = &sources[source_index];
        hunks.push(BlameHunk {
            final_commit: source.commit,
            final_signature: source.signature.clone(),
            final_start_line: index + 1,
            lines_in_hunk: 1,
            orig_commit: source.commit,
            orig_path: source.path.clone(),
            orig_signature: source.signature.clone(),
            orig_start_line: orig + 1,
            boundary: source.boundary,
        });
    }
    hunks
}
