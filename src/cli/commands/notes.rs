//! notes command - Attach, show and remove notes

use anyhow::{Context as _, Result};
use std::process::ExitCode;

use super::{resolve, Context};
use crate::cli::args::NotesCommand;
use crate::core::types::Oid;
use crate::repo::Repository;
use crate::ui::output;

fn target(repo: &Repository, object: Option<&str>) -> Result<Oid> {
    resolve(repo, object.unwrap_or("HEAD"))
}

pub fn notes(ctx: &Context, notes_ref: Option<&str>, action: NotesCommand) -> Result<ExitCode> {
    let repo = ctx.open()?;
    let notes = repo.notes(notes_ref)?;
    match action {
        NotesCommand::Add {
            message,
            force,
            object,
        } => {
            let target = target(&repo, object.as_deref())?;
            let sig = repo.signature()?;
            let note = notes
                .create(&sig, &sig, &target, &message, force)
                .with_context(|| format!("cannot add a note to {target}"))?;
            output::print(format!("added note {note} to {target}"), ctx.verbosity);
        }
        NotesCommand::Show { object } => {
            let target = target(&repo, object.as_deref())?;
            let note = notes
                .read(&target)
                .with_context(|| format!("no note found for object {target}"))?;
            output::raw(&note.message)?;
        }
        NotesCommand::List => {
            for entry in notes.iter()? {
                let (note, annotated) = entry?;
                output::result(format!("{note} {annotated}"));
            }
        }
        NotesCommand::Remove { object } => {
            let target = target(&repo, object.as_deref())?;
            let sig = repo.signature()?;
            notes
                .remove(&sig, &sig, &target)
                .with_context(|| format!("cannot remove the note on {target}"))?;
            output::print(format!("removed note on {target}"), ctx.verbosity);
        }
    }
    Ok(ExitCode::SUCCESS)
}
