//! Reference plumbing: update-ref, symbolic-ref, rev-parse, reflog

use anyhow::{anyhow, bail, Context as _, Result};
use std::process::ExitCode;

use super::{resolve, short, Context};
use crate::core::types::{Oid, RefName};
use crate::refs::RefTarget;
use crate::repo::Repository;
use crate::revparse;
use crate::ui::output;

fn ref_name(name: &str) -> Result<RefName> {
    RefName::new(name).with_context(|| format!("'{name}' is not a valid reference name"))
}

/// `None` for an all-zero id, which stands for "must not exist".
fn expected_value(repo: &Repository, spec: &str) -> Result<Option<Oid>> {
    if !spec.is_empty() && spec.bytes().all(|b| b == b'0') {
        return Ok(None);
    }
    resolve(repo, spec).map(Some)
}

pub fn update_ref(
    ctx: &Context,
    delete: bool,
    message: &str,
    name: &str,
    new: Option<&str>,
    old: Option<&str>,
) -> Result<ExitCode> {
    let repo = ctx.open()?;
    let name = ref_name(name)?;
    let refs = repo.refs();

    if delete {
        let expected = new.map(|spec| resolve(&repo, spec)).transpose()?;
        refs.delete(&name, expected)?;
        output::print(format!("deleted {name}"), ctx.verbosity);
        return Ok(ExitCode::SUCCESS);
    }

    let new = new.ok_or_else(|| anyhow!("a new value is required"))?;
    let new = resolve(&repo, new)?;
    match old {
        Some(old) => {
            let expected = expected_value(&repo, old)?;
            refs.compare_and_swap(&name, expected, new, message)
                .with_context(|| format!("cannot update {name}"))?;
        }
        None => refs.set(&name, new, message)?,
    }
    Ok(ExitCode::SUCCESS)
}

pub fn symbolic_ref(ctx: &Context, short_name: bool, name: &str, target: Option<&str>) -> Result<ExitCode> {
    let repo = ctx.open()?;
    let name = ref_name(name)?;
    if let Some(target) = target {
        let target = ref_name(target)?;
        repo.refs()
            .set_symbolic(&name, &target, &format!("symbolic-ref: moving to {target}"))?;
        return Ok(ExitCode::SUCCESS);
    }
    match repo.refs().lookup(&name)?.target {
        RefTarget::Symbolic(target) if short_name => output::result(target.shorthand()),
        RefTarget::Symbolic(target) => output::result(target),
        RefTarget::Direct(_) => bail!("{name} is not a symbolic reference"),
    }
    Ok(ExitCode::SUCCESS)
}

pub fn rev_parse(ctx: &Context, short_ids: bool, revs: &[String]) -> Result<ExitCode> {
    let repo = ctx.open()?;
    for rev in revs {
        let oid = resolve(&repo, rev)?;
        if short_ids {
            output::result(short(&repo, &oid)?);
        } else {
            output::result(oid);
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Newest entry first, as `<id> <ref>@{n}: <message>`.
pub fn reflog(ctx: &Context, name: Option<&str>, max_count: Option<usize>) -> Result<ExitCode> {
    let repo = ctx.open()?;
    let name = name.unwrap_or("HEAD");
    let refname = match revparse::resolve_ref_name(repo.refs(), name) {
        Ok(Some((refname, _))) => refname,
        // An unborn branch can already have a reflog.
        Ok(None) | Err(_) => ref_name(name)?,
    };
    let entries = repo.refs().reflog(&refname)?;
    let label = refname.shorthand();
    for (i, entry) in entries.iter().take(max_count.unwrap_or(usize::MAX)).enumerate() {
        output::result(format!(
            "{} {label}@{{{i}}}: {}",
            short(&repo, &entry.new)?,
            entry.message
        ));
    }
    Ok(ExitCode::SUCCESS)
}
