//! blame command - Line-by-line attribution of a file

use anyhow::{anyhow, bail, Result};
use std::process::ExitCode;

use super::{resolve_commit, short, Context};
use crate::diff::lines::split_lines;
use crate::ui::output;

#[derive(Debug, Clone, Default)]
pub struct BlameFlags {
    pub rev: Option<String>,
    pub lines: Option<String>,
    pub first_parent: bool,
    pub track_renames: bool,
}

/// `START,END` as given to `-L`.
fn parse_range(range: &str) -> Result<(usize, usize)> {
    let (start, end) = range
        .split_once(',')
        .ok_or_else(|| anyhow!("-L expects START,END, got '{range}'"))?;
    let start: usize = start.trim().parse().map_err(|_| anyhow!("bad start line '{start}'"))?;
    let end: usize = end.trim().parse().map_err(|_| anyhow!("bad end line '{end}'"))?;
    if start == 0 || end < start {
        bail!("invalid line range {start},{end}");
    }
    Ok((start, end))
}

/// One output line per file line: `<id> (<author> <date> <n>) <text>`.
///
/// Ids of boundary commits are prefixed with `^`.
pub fn blame(ctx: &Context, path: &str, flags: &BlameFlags) -> Result<ExitCode> {
    let repo = ctx.open()?;
    let mut options = repo.blame_options();
    if let Some(rev) = &flags.rev {
        options.newest_commit = Some(resolve_commit(&repo, rev)?);
    }
    if let Some(range) = &flags.lines {
        let (start, end) = parse_range(range)?;
        options.min_line = start;
        options.max_line = end;
    }
    options.first_parent = flags.first_parent;
    options.track_renames = flags.track_renames;

    let blame = repo.blame_file(path, &options)?;
    let lines = split_lines(blame.contents());
    let width = lines.len().to_string().len();
    let mut out = String::new();
    for hunk in &blame {
        let id = short(&repo, &hunk.final_commit)?;
        let marker = if hunk.boundary { "^" } else { "" };
        let (author, date) = match &hunk.final_signature {
            Some(sig) => (sig.name.clone(), output::format_time(sig.when)),
            None => ("Not Committed Yet".to_string(), String::new()),
        };
        for n in hunk.final_start_line..hunk.final_start_line + hunk.lines_in_hunk {
            let text = lines
                .get(n - 1)
                .map(|line| String::from_utf8_lossy(line).trim_end_matches('\n').to_string())
                .unwrap_or_default();
            out.push_str(&format!(
                "{marker}{id} ({author} {date} {n:>width$}) {text}\n"
            ));
        }
    }
    output::raw(out.as_bytes())?;
    Ok(ExitCode::SUCCESS)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_ranges() {
        assert_eq!(parse_range("3,7").unwrap(), (3, 7));
        assert_eq!(parse_range(" 1 , 1 ").unwrap(), (1, 1));
        assert!(parse_range("0,2").is_err());
        assert!(parse_range("5,2").is_err());
        assert!(parse_range("5").is_err());
    }
}
