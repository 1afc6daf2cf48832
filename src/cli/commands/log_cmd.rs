//! log and merge-base commands

use anyhow::{Context as _, Result};
use std::process::ExitCode;

use super::{resolve_commit, short, Context};
use crate::core::types::Oid;
use crate::graph;
use crate::object::Commit;
use crate::repo::Repository;
use crate::revwalk::Sort;
use crate::ui::output;

#[derive(Debug, Clone, Copy, Default)]
pub struct LogFlags {
    pub max_count: Option<usize>,
    pub topo_order: bool,
    pub date_order: bool,
    pub reverse: bool,
    pub first_parent: bool,
    pub oneline: bool,
}

impl LogFlags {
    fn sort(&self) -> Sort {
        let mut sort = Sort::NONE;
        if self.topo_order {
            sort = sort | Sort::TOPOLOGICAL;
        }
        if self.date_order || !self.topo_order {
            sort = sort | Sort::TIME;
        }
        if self.reverse {
            sort = sort | Sort::REVERSE;
        }
        sort
    }
}

fn format_commit(repo: &Repository, oid: &Oid, commit: &Commit) -> Result<String> {
    let mut out = format!("commit {oid}\n");
    if commit.is_merge() {
        let parents = commit
            .parents
            .iter()
            .map(|p| short(repo, p))
            .collect::<Result<Vec<_>>>()?;
        out.push_str(&format!("Merge: {}\n", parents.join(" ")));
    }
    out.push_str(&format!("Author: {}\n", output::format_identity(&commit.author)));
    out.push_str(&format!("Date:   {}\n\n", output::format_time(commit.author.when)));
    for line in commit.message_lossy().trim_end_matches('\n').lines() {
        if line.is_empty() {
            out.push('\n');
        } else {
            out.push_str(&format!("    {line}\n"));
        }
    }
    Ok(out)
}

/// Walk history from `revs` (HEAD when empty).
///
/// `^rev` hides a commit and its ancestry; `a..b` is a range.
pub fn log(ctx: &Context, revs: &[String], flags: LogFlags) -> Result<ExitCode> {
    let repo = ctx.open()?;
    let mut walk = repo.revwalk();
    walk.set_sorting(flags.sort());
    if flags.first_parent {
        walk.simplify_first_parent();
    }
    if revs.is_empty() {
        walk.push_head().context("HEAD does not point at a commit")?;
    }
    for rev in revs {
        if rev.contains("..") {
            walk.push_range(rev)?;
        } else if let Some(hidden) = rev.strip_prefix('^') {
            walk.hide(&resolve_commit(&repo, hidden)?)?;
        } else {
            walk.push(&resolve_commit(&repo, rev)?)?;
        }
    }

    let mut first = true;
    for oid in walk.take(flags.max_count.unwrap_or(usize::MAX)) {
        let oid = oid?;
        let commit = repo.find_commit(&oid)?;
        if flags.oneline {
            output::result(format!("{} {}", short(&repo, &oid)?, commit.summary()));
            continue;
        }
        if !first {
            output::result("");
        }
        first = false;
        output::raw(format_commit(&repo, &oid, &commit)?.as_bytes())?;
    }
    Ok(ExitCode::SUCCESS)
}

/// Print the best common ancestor (or all with `--all`); exit 1 when
/// there is none. With `--is-ancestor`, only the exit code answers.
pub fn merge_base(ctx: &Context, all: bool, is_ancestor: bool, a: &str, b: &str) -> Result<ExitCode> {
    let repo = ctx.open()?;
    let a = resolve_commit(&repo, a)?;
    let b = resolve_commit(&repo, b)?;
    if is_ancestor {
        let yes = a == b || graph::descendant_of(repo.odb(), &b, &a)?;
        return Ok(if yes { ExitCode::SUCCESS } else { ExitCode::from(1) });
    }
    let bases = graph::merge_bases(repo.odb(), &a, &b)?;
    if bases.is_empty() {
        return Ok(ExitCode::from(1));
    }
    let shown = if all { bases.len() } else { 1 };
    for base in &bases[..shown] {
        output::result(base);
    }
    Ok(ExitCode::SUCCESS)
}
