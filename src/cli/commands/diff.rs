//! diff command - Compare trees, or a tree with the index

use anyhow::{Context as _, Result};
use std::process::ExitCode;

use super::{resolve, Context};
use crate::core::types::Oid;
use crate::diff::Diff;
use crate::error::Error;
use crate::repo::Repository;
use crate::ui::output;

#[derive(Debug, Clone, Copy, Default)]
pub struct DiffFlags {
    pub stat: bool,
    pub name_status: bool,
    pub find_renames: bool,
    pub rename_threshold: Option<u8>,
    pub no_renames: bool,
    pub context: Option<u32>,
}

fn tree_of(repo: &Repository, spec: &str) -> Result<Oid> {
    repo.odb()
        .peel_to_tree(&resolve(repo, spec)?)
        .with_context(|| format!("'{spec}' does not name a tree"))
}

fn render_stat(diff: &Diff<'_>) -> Result<String, Error> {
    let patches = diff.patches()?;
    let width = patches
        .iter()
        .map(|p| p.delta.path().len())
        .max()
        .unwrap_or(0);
    let mut out = String::new();
    for patch in &patches {
        let (added, removed) = (patch.additions(), patch.deletions());
        let graph = if patch.binary {
            "Bin".to_string()
        } else {
            format!("{} {}{}", added + removed, "+".repeat(added), "-".repeat(removed))
        };
        out.push_str(&format!(" {:width$} | {}\n", patch.delta.path(), graph));
    }
    let stats = diff.stats()?;
    let plural = |n: usize, word: &str| format!("{n} {word}{}", if n == 1 { "" } else { "s" });
    out.push_str(&format!(
        " {} changed, {}(+), {}(-)\n",
        plural(stats.files_changed, "file"),
        plural(stats.insertions, "insertion"),
        plural(stats.deletions, "deletion"),
    ));
    Ok(out)
}

pub fn diff(ctx: &Context, old: Option<&str>, new: Option<&str>, flags: DiffFlags) -> Result<ExitCode> {
    let repo = ctx.open()?;
    let mut options = repo.diff_options();
    if flags.find_renames {
        options.detect_renames = true;
    }
    if let Some(threshold) = flags.rename_threshold {
        options.detect_renames = true;
        options.rename_threshold = threshold;
    }
    if flags.no_renames {
        options.detect_renames = false;
    }
    if let Some(context) = flags.context {
        options.context_lines = context;
    }

    let old_tree = match old {
        Some(spec) => Some(tree_of(&repo, spec)?),
        None => repo.head_tree()?,
    };
    let diff = match new {
        Some(spec) => {
            let new_tree = tree_of(&repo, spec)?;
            repo.diff_tree_to_tree(old_tree.as_ref(), Some(&new_tree), &options)?
        }
        None => repo.diff_tree_to_index(old_tree.as_ref(), &options)?,
    };

    let text = if flags.stat {
        if diff.is_empty() {
            String::new()
        } else {
            render_stat(&diff)?
        }
    } else if flags.name_status {
        diff.to_name_status()
    } else {
        diff.to_patch_text(repo.config().abbrev())?
    };
    output::raw(text.as_bytes())?;
    Ok(ExitCode::SUCCESS)
}
