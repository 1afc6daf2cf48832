//! cli::commands
//!
//! Command dispatch and handlers.
//!
//! Each handler opens the repository through [`Context`], makes the
//! library calls, and prints the result. Handlers return an exit code so
//! that "no" answers (`merge-base --is-ancestor`, a conflicted
//! `merge-tree`) are not reported as errors.

mod blame;
mod completion;
mod diff;
mod init;
mod log_cmd;
mod merge;
mod notes;
mod objects;
mod rebase;
mod refs;
mod status;

pub use blame::{blame, BlameFlags};
pub use completion::completion;
pub use diff::diff;
pub use init::init;
pub use log_cmd::{log, merge_base};
pub use merge::merge_tree;
pub use notes::notes;
pub use objects::{cat_file, commit_tree, hash_object, ls_tree, write_tree};
pub use rebase::{rebase, RebaseAction};
pub use refs::{reflog, rev_parse, symbolic_ref, update_ref};
pub use status::status;

use anyhow::{anyhow, Context as _, Result};
use std::path::PathBuf;
use std::process::ExitCode;

use crate::cli::args::Command;
use crate::core::types::Oid;
use crate::repo::Repository;
use crate::ui::output::Verbosity;

/// Per-invocation settings from the global flags.
#[derive(Debug, Clone)]
pub struct Context {
    /// `--repo`; the current directory when unset.
    pub repo: Option<PathBuf>,
    pub verbosity: Verbosity,
}

impl Context {
    fn start_dir(&self) -> Result<PathBuf> {
        match &self.repo {
            Some(path) => Ok(path.clone()),
            None => std::env::current_dir().context("cannot determine current directory"),
        }
    }

    /// Open the repository at or above the start directory.
    pub fn open(&self) -> Result<Repository> {
        let start = self.start_dir()?;
        Repository::open(&start)
            .with_context(|| format!("not a grove repository: {}", start.display()))
    }
}

/// Resolve a revision, or `rev:path` for an entry inside its tree.
pub(crate) fn resolve(repo: &Repository, spec: &str) -> Result<Oid> {
    let Some((rev, path)) = spec.split_once(':') else {
        return repo
            .revparse(spec)
            .with_context(|| format!("cannot resolve '{spec}'"));
    };
    let commitish = repo
        .revparse(if rev.is_empty() { "HEAD" } else { rev })
        .with_context(|| format!("cannot resolve '{rev}'"))?;
    let tree = repo.odb().peel_to_tree(&commitish)?;
    if path.is_empty() {
        return Ok(tree);
    }
    let entry = repo
        .find_tree(&tree)?
        .entry_by_path(repo.odb(), path)?
        .ok_or_else(|| anyhow!("path '{path}' does not exist in '{rev}'"))?;
    Ok(entry.oid)
}

/// Resolve a revision and peel it to a commit.
pub(crate) fn resolve_commit(repo: &Repository, spec: &str) -> Result<Oid> {
    let oid = resolve(repo, spec)?;
    repo.odb()
        .peel_to_commit(&oid)
        .with_context(|| format!("'{spec}' does not name a commit"))
}

/// Abbreviated id, unique in the repository.
pub(crate) fn short(repo: &Repository, oid: &Oid) -> Result<String> {
    Ok(repo
        .odb()
        .shortest_unique_prefix(oid, repo.config().abbrev())?)
}

/// Dispatch a command to its handler.
pub fn dispatch(command: Command, ctx: &Context) -> Result<ExitCode> {
    match command {
        Command::Init {
            path,
            bare,
            object_format,
            initial_branch,
        } => init(ctx, path, bare, object_format, &initial_branch),
        Command::HashObject {
            write,
            kind,
            stdin,
            files,
        } => hash_object(ctx, write, kind, stdin, &files),
        Command::CatFile {
            kind,
            size,
            pretty,
            object,
        } => cat_file(ctx, kind, size, pretty, &object),
        Command::LsTree {
            recursive,
            name_only,
            treeish,
        } => ls_tree(ctx, recursive, name_only, &treeish),
        Command::WriteTree => write_tree(ctx),
        Command::CommitTree {
            tree,
            parents,
            message,
        } => commit_tree(ctx, &tree, &parents, &message),
        Command::UpdateRef {
            delete,
            message,
            name,
            new,
            old,
        } => update_ref(ctx, delete, &message, &name, new.as_deref(), old.as_deref()),
        Command::SymbolicRef {
            short,
            name,
            target,
        } => symbolic_ref(ctx, short, &name, target.as_deref()),
        Command::RevParse { short, revs } => rev_parse(ctx, short, &revs),
        Command::Log {
            revs,
            max_count,
            topo_order,
            date_order,
            reverse,
            first_parent,
            oneline,
        } => log(
            ctx,
            &revs,
            log_cmd::LogFlags {
                max_count,
                topo_order,
                date_order,
                reverse,
                first_parent,
                oneline,
            },
        ),
        Command::MergeBase {
            all,
            is_ancestor,
            a,
            b,
        } => merge_base(ctx, all, is_ancestor, &a, &b),
        Command::Diff {
            old,
            new,
            stat,
            name_status,
            find_renames,
            rename_threshold,
            no_renames,
            context,
        } => diff(
            ctx,
            old.as_deref(),
            new.as_deref(),
            diff::DiffFlags {
                stat,
                name_status,
                find_renames,
                rename_threshold,
                no_renames,
                context,
            },
        ),
        Command::MergeTree {
            base,
            ours,
            theirs,
        } => merge_tree(ctx, base.as_deref(), &ours, &theirs),
        Command::Rebase {
            upstream,
            branch,
            onto,
            continue_op,
            abort,
            skip,
        } => {
            let action = if continue_op {
                RebaseAction::Continue
            } else if abort {
                RebaseAction::Abort
            } else if skip {
                RebaseAction::Skip
            } else {
                RebaseAction::Start {
                    upstream: upstream.ok_or_else(|| anyhow!("an upstream is required"))?,
                    branch,
                    onto,
                }
            };
            rebase(ctx, action)
        }
        Command::Status {
            no_untracked,
            find_renames,
            pathspec,
        } => status(ctx, no_untracked, find_renames, &pathspec),
        Command::Notes { notes_ref, action } => notes(ctx, notes_ref.as_deref(), action),
        Command::Blame {
            rev,
            lines,
            first_parent,
            track_renames,
            path,
        } => blame(
            ctx,
            &path,
            &BlameFlags {
                rev,
                lines,
                first_parent,
                track_renames,
            },
        ),
        Command::Reflog { name, max_count } => reflog(ctx, name.as_deref(), max_count),
        Command::Completion { shell } => {
            completion(shell)?;
            Ok(ExitCode::SUCCESS)
        }
    }
}
