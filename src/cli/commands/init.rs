//! init command - Create an empty repository

use anyhow::{Context as _, Result};
use std::path::PathBuf;
use std::process::ExitCode;

use super::Context;
use crate::cli::args::HashArg;
use crate::core::types::HashAlgorithm;
use crate::repo::{InitOptions, Repository};
use crate::ui::output;

/// Create a repository in `path` (the `--repo` directory, or the current
/// directory, when omitted).
pub fn init(
    ctx: &Context,
    path: Option<PathBuf>,
    bare: bool,
    object_format: HashArg,
    initial_branch: &str,
) -> Result<ExitCode> {
    let path = match path {
        Some(path) => path,
        None => ctx.start_dir()?,
    };
    std::fs::create_dir_all(&path)
        .with_context(|| format!("cannot create {}", path.display()))?;
    let options = InitOptions {
        hash: match object_format {
            HashArg::Sha1 => HashAlgorithm::Sha1,
            HashArg::Sha256 => HashAlgorithm::Sha256,
        },
        initial_branch: initial_branch.to_string(),
        bare,
    };
    let repo = Repository::init(&path, &options)
        .with_context(|| format!("cannot initialize repository in {}", path.display()))?;
    if let Some(paths) = repo.paths() {
        output::print(
            format!("Initialized empty grove repository in {}", paths.root().display()),
            ctx.verbosity,
        );
    }
    Ok(ExitCode::SUCCESS)
}
