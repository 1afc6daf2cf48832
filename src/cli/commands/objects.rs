//! Object plumbing: hash-object, cat-file, ls-tree, write-tree, commit-tree

use anyhow::{bail, Context as _, Result};
use std::io::Read;
use std::path::PathBuf;
use std::process::ExitCode;

use super::{resolve, resolve_commit, Context};
use crate::cli::args::KindArg;
use crate::core::types::{FileMode, HashAlgorithm, ObjectType, Oid};
use crate::object::tree::flatten;
use crate::object::Object;
use crate::odb::Odb;
use crate::repo::Repository;
use crate::ui::output;

fn object_type(kind: KindArg) -> ObjectType {
    match kind {
        KindArg::Blob => ObjectType::Blob,
        KindArg::Tree => ObjectType::Tree,
        KindArg::Commit => ObjectType::Commit,
        KindArg::Tag => ObjectType::Tag,
    }
}

fn tree_line(mode: FileMode, oid: &Oid, name: &str) -> String {
    format!("{:06o} {} {}\t{}", mode.raw(), mode.object_type(), oid, name)
}

/// Print the id of each input; store it with `-w`.
///
/// Outside a repository ids are computed with SHA-1.
pub fn hash_object(
    ctx: &Context,
    write: bool,
    kind: KindArg,
    stdin: bool,
    files: &[PathBuf],
) -> Result<ExitCode> {
    let kind = object_type(kind);
    let mut inputs = Vec::new();
    if stdin {
        let mut data = Vec::new();
        std::io::stdin()
            .read_to_end(&mut data)
            .context("cannot read standard input")?;
        inputs.push(data);
    }
    for file in files {
        inputs.push(std::fs::read(file).with_context(|| format!("cannot read {}", file.display()))?);
    }
    if inputs.is_empty() {
        bail!("nothing to hash; pass files or --stdin");
    }

    let repo = if write { Some(ctx.open()?) } else { ctx.open().ok() };
    let algorithm = repo
        .as_ref()
        .map_or(HashAlgorithm::Sha1, Repository::hash_algorithm);
    let scratch = Odb::in_memory(algorithm);
    for data in inputs {
        if kind != ObjectType::Blob {
            Object::parse(algorithm, kind, &data)
                .with_context(|| format!("input is not a valid {kind}"))?;
        }
        let oid = match (&repo, write) {
            (Some(repo), true) => repo.odb().write(kind, &data)?,
            _ => scratch.hash(kind, &data),
        };
        output::result(oid);
    }
    Ok(ExitCode::SUCCESS)
}

pub fn cat_file(ctx: &Context, kind: bool, size: bool, pretty: bool, object: &str) -> Result<ExitCode> {
    if !(kind || size || pretty) {
        bail!("one of -t, -s or -p is required");
    }
    let repo = ctx.open()?;
    let oid = resolve(&repo, object)?;
    if kind || size {
        let (object_type, len) = repo.odb().read_header(&oid)?;
        if kind {
            output::result(object_type);
        } else {
            output::result(len);
        }
        return Ok(ExitCode::SUCCESS);
    }

    let raw = repo.odb().read(&oid)?;
    if raw.kind == ObjectType::Tree {
        for entry in repo.find_tree(&oid)?.iter() {
            output::result(tree_line(entry.mode, &entry.oid, &entry.name));
        }
    } else {
        output::raw(&raw.data)?;
    }
    Ok(ExitCode::SUCCESS)
}

pub fn ls_tree(ctx: &Context, recursive: bool, name_only: bool, treeish: &str) -> Result<ExitCode> {
    let repo = ctx.open()?;
    let tree = repo
        .odb()
        .peel_to_tree(&resolve(&repo, treeish)?)
        .with_context(|| format!("'{treeish}' does not name a tree"))?;
    let entries: Vec<(String, FileMode, Oid)> = if recursive {
        flatten(repo.odb(), &tree)?
            .into_iter()
            .map(|(path, entry)| (path, entry.mode, entry.oid))
            .collect()
    } else {
        repo.find_tree(&tree)?
            .iter()
            .map(|entry| (entry.name.clone(), entry.mode, entry.oid))
            .collect()
    };
    for (path, mode, oid) in entries {
        if name_only {
            output::result(path);
        } else {
            output::result(tree_line(mode, &oid, &path));
        }
    }
    Ok(ExitCode::SUCCESS)
}

pub fn write_tree(ctx: &Context) -> Result<ExitCode> {
    let repo = ctx.open()?;
    let tree = repo
        .index()?
        .write_tree(repo.odb())
        .context("cannot write a tree from the index")?;
    output::result(tree);
    Ok(ExitCode::SUCCESS)
}

pub fn commit_tree(ctx: &Context, tree: &str, parents: &[String], message: &str) -> Result<ExitCode> {
    let repo = ctx.open()?;
    let tree = repo
        .odb()
        .peel_to_tree(&resolve(&repo, tree)?)
        .with_context(|| format!("'{tree}' does not name a tree"))?;
    let parents = parents
        .iter()
        .map(|p| resolve_commit(&repo, p))
        .collect::<Result<Vec<_>>>()?;
    let signature = repo.signature()?;
    let oid = repo.commit(None, &signature, &signature, message, &tree, &parents)?;
    output::result(oid);
    Ok(ExitCode::SUCCESS)
}
