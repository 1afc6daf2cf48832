//! status command - Staged, unstaged and untracked changes

use anyhow::{anyhow, Result};
use std::process::ExitCode;

use super::Context;
use crate::diff::FsWorkdir;
use crate::ui::output;

pub fn status(
    ctx: &Context,
    no_untracked: bool,
    find_renames: bool,
    pathspec: &[String],
) -> Result<ExitCode> {
    let repo = ctx.open()?;
    let root = repo
        .workdir()
        .ok_or_else(|| anyhow!("status needs a working tree; this repository is bare"))?;
    let workdir = FsWorkdir::new(root);

    let mut options = repo.status_options();
    options.include_untracked = !no_untracked;
    options.renames_head_to_index = find_renames;
    options.renames_index_to_workdir = find_renames;
    options.pathspec = pathspec.to_vec();

    let list = repo.statuses(Some(&workdir), &options)?;
    if list.is_empty() {
        output::print("nothing to commit, working tree clean", ctx.verbosity);
    }
    for entry in &list {
        output::result(entry);
    }
    Ok(ExitCode::SUCCESS)
}
