//! rebase command - Replay commits onto another base

use anyhow::{anyhow, Result};
use std::process::ExitCode;

use super::{resolve_commit, short, Context};
use crate::rebase::{Rebase, RebaseOptions, RebaseStatus, RebaseStep};
use crate::repo::Repository;
use crate::revparse;
use crate::ui::output;

#[derive(Debug, Clone)]
pub enum RebaseAction {
    Start {
        upstream: String,
        branch: Option<String>,
        onto: Option<String>,
    },
    Continue,
    Skip,
    Abort,
}

/// Apply steps until the rebase finishes or stops on a conflict.
fn drive(ctx: &Context, repo: &Repository, rebase: &mut Rebase<'_>, mut step: Option<RebaseStep>) -> Result<ExitCode> {
    loop {
        match step {
            Some(RebaseStep::Applied(op, _)) => {
                output::print(format!("applied {} {}", short(repo, &op.original)?, op.summary), ctx.verbosity);
            }
            Some(RebaseStep::Skipped(op)) => {
                output::print(
                    format!("skipped {} {} (already applied)", short(repo, &op.original)?, op.summary),
                    ctx.verbosity,
                );
            }
            Some(RebaseStep::Conflicted(op, index)) => {
                for conflict in index.conflicts() {
                    output::result(format!("CONFLICT: {}", conflict.path));
                }
                output::error(format!(
                    "could not apply {} {}",
                    short(repo, &op.original)?,
                    op.summary
                ));
                output::hint(
                    "resolve the conflicts in the index, then run `gv rebase --continue`; \
                     use `gv rebase --skip` to drop the commit or `gv rebase --abort` to stop",
                    ctx.verbosity,
                );
                return Ok(ExitCode::from(1));
            }
            None => break,
        }
        step = rebase.next()?;
    }

    let tip = rebase.finish()?;
    let target = match rebase.branch() {
        Some(branch) => branch.shorthand().to_string(),
        None => "HEAD".to_string(),
    };
    output::print(
        format!("Successfully rebased {target} onto {} (now {})", short(repo, &rebase.onto())?, short(repo, &tip)?),
        ctx.verbosity,
    );
    Ok(ExitCode::SUCCESS)
}

pub fn rebase(ctx: &Context, action: RebaseAction) -> Result<ExitCode> {
    let repo = ctx.open()?;
    let options = repo.merge_options();
    match action {
        RebaseAction::Start {
            upstream,
            branch,
            onto,
        } => {
            let upstream = resolve_commit(&repo, &upstream)?;
            let onto = onto.map(|spec| resolve_commit(&repo, &spec)).transpose()?;
            let branch = match branch {
                Some(name) => Some(
                    revparse::resolve_ref_name(repo.refs(), &name)?
                        .map(|(refname, _)| refname)
                        .ok_or_else(|| anyhow!("no such branch '{name}'"))?,
                ),
                None => None,
            };
            let mut rebase = Rebase::init(
                &repo,
                branch.as_ref(),
                &upstream,
                onto.as_ref(),
                RebaseOptions {
                    merge: options,
                    committer: None,
                },
            )?;
            let first = rebase.next()?;
            drive(ctx, &repo, &mut rebase, first)
        }
        RebaseAction::Continue => {
            let mut rebase = Rebase::open(&repo, options)?;
            let first = rebase.resume(None)?;
            drive(ctx, &repo, &mut rebase, first)
        }
        RebaseAction::Skip => {
            let mut rebase = Rebase::open(&repo, options)?;
            if rebase.status() == RebaseStatus::PausedOnConflict {
                rebase.skip()?;
            }
            let first = rebase.next()?;
            drive(ctx, &repo, &mut rebase, first)
        }
        RebaseAction::Abort => {
            let mut rebase = Rebase::open(&repo, options)?;
            rebase.abort()?;
            output::print(
                format!("rebase aborted; HEAD is at {}", short(&repo, &rebase.orig_head())?),
                ctx.verbosity,
            );
            Ok(ExitCode::SUCCESS)
        }
    }
}
