//! diff::rename
//!
//! Rename and copy detection over the deltas of a diff.
//!
//! Pairing is greedy, not an optimal assignment:
//! 1. identical ids pair first (score 100), in new-path order, each
//!    taking the first unused source in old-path order;
//! 2. remaining pairs are scored by line overlap and taken best-first,
//!    ties broken by old path, then new path;
//! 3. every source and target is used at most once.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use super::{Delta, DeltaStatus, DiffFile, DiffOptions};
use crate::core::cancel;
use crate::error::Result;

/// Similarity of two texts in percent: `2 * common / (|a| + |b|)` over
/// the multisets of their lines.
pub fn similarity(a: &[u8], b: &[u8]) -> u8 {
    let a_lines = super::lines::split_lines(a);
    let b_lines = super::lines::split_lines(b);
    let total = a_lines.len() + b_lines.len();
    if total == 0 {
        return 100;
    }
    let mut counts: HashMap<&[u8], usize> = HashMap::new();
    for line in &a_lines {
        *counts.entry(*line).or_default() += 1;
    }
    let mut common = 0;
    for line in &b_lines {
        if let Some(count) = counts.get_mut(line) {
            if *count > 0 {
                *count -= 1;
                common += 1;
            }
        }
    }
    // total > 0, result in 0..=100.
    (200 * common / total) as u8
}

/// Rewrite `deltas` in place, folding matched deletions and additions
/// into renames and copies.
pub(crate) fn detect(
    deltas: &mut Vec<Delta>,
    options: &DiffOptions,
    load: &dyn Fn(&DiffFile) -> Result<Arc<[u8]>>,
) -> Result<()> {
    let copies = options.detect_copies;
    let sources: Vec<usize> = deltas
        .iter()
        .enumerate()
        .filter(|(_, d)| match d.status {
            DeltaStatus::Deleted => true,
            DeltaStatus::Modified | DeltaStatus::Unmodified => copies,
            _ => false,
        })
        .map(|(i, _)| i)
        .collect();
    let targets: Vec<usize> = deltas
        .iter()
        .enumerate()
        .filter(|(_, d)| d.status == DeltaStatus::Added)
        .map(|(i, _)| i)
        .collect();
    if sources.is_empty() || targets.is_empty() {
        return Ok(());
    }
    if sources.len() > options.rename_limit || targets.len() > options.rename_limit {
        debug!(
            sources = sources.len(),
            targets = targets.len(),
            limit = options.rename_limit,
            "too many candidates, skipping rename detection"
        );
        return Ok(());
    }

    let mut source_used = vec![false; sources.len()];
    let mut target_used = vec![false; targets.len()];
    let mut pairs: Vec<(usize, usize, u8)> = Vec::new();

    // Exact matches.
    for (t, &target) in targets.iter().enumerate() {
        let new = &deltas[target].new_file;
        if new.size == 0 {
            continue;
        }
        let found = sources.iter().enumerate().position(|(s, &source)| {
            let old = &deltas[source].old_file;
            !source_used[s]
                && old.oid == new.oid
                && old.mode.map(|m| m.class()) == new.mode.map(|m| m.class())
        });
        if let Some(s) = found {
            source_used[s] = true;
            target_used[t] = true;
            pairs.push((sources[s], target, 100));
        }
    }

    // Similarity.
    let mut source_text: Vec<Option<Arc<[u8]>>> = vec![None; sources.len()];
    let mut candidates: Vec<(u8, usize, usize)> = Vec::new();
    for (t, &target) in targets.iter().enumerate() {
        if target_used[t] {
            continue;
        }
        cancel::check(options.cancel.as_ref())?;
        let new_file = &deltas[target].new_file;
        if !new_file.mode.is_some_and(|m| m.is_blob()) {
            continue;
        }
        let new_text = load(new_file)?;
        // Empty files never pair, by id or by content.
        if new_text.is_empty() || options.classifier.is_binary(&new_file.path, &new_text) {
            continue;
        }
        for (s, &source) in sources.iter().enumerate() {
            if source_used[s] {
                continue;
            }
            let old_file = &deltas[source].old_file;
            if !old_file.mode.is_some_and(|m| m.is_blob()) {
                continue;
            }
            if source_text[s].is_none() {
                source_text[s] = Some(load(old_file)?);
            }
            let Some(old_text) = source_text[s].as_deref() else {
                continue;
            };
            if old_text.is_empty() || options.classifier.is_binary(&old_file.path, old_text) {
                continue;
            }
            let score = similarity(old_text, &new_text);
            if score >= options.rename_threshold {
                candidates.push((score, s, t));
            }
        }
    }
    candidates.sort_by(|a, b| {
        b.0.cmp(&a.0)
            .then_with(|| {
                deltas[sources[a.1]]
                    .old_file
                    .path
                    .cmp(&deltas[sources[b.1]].old_file.path)
            })
            .then_with(|| {
                deltas[targets[a.2]]
                    .new_file
                    .path
                    .cmp(&deltas[targets[b.2]].new_file.path)
            })
    });
    for (score, s, t) in candidates {
        if source_used[s] || target_used[t] {
            continue;
        }
        source_used[s] = true;
        target_used[t] = true;
        pairs.push((sources[s], targets[t], score));
    }

    let mut removed = vec![false; deltas.len()];
    for &(source, target, score) in &pairs {
        let old_file = deltas[source].old_file.clone();
        let renamed = deltas[source].status == DeltaStatus::Deleted;
        let delta = &mut deltas[target];
        delta.old_file = old_file;
        delta.similarity = Some(score);
        if renamed {
            delta.status = DeltaStatus::Renamed;
            removed[source] = true;
        } else {
            delta.status = DeltaStatus::Copied;
        }
    }
    let mut index = 0;
    deltas.retain(|_| {
        let keep = !removed[index];
        index += 1;
        keep
    });
    debug!(pairs = pairs.len(), "rename detection");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn similarity_scores() {
        assert_eq!(similarity(b"a\nb\n", b"a\nb\n"), 100);
        assert_eq!(similarity(b"a\nb\n", b"a\nc\n"), 50);
        assert_eq!(similarity(b"a\n", b"b\n"), 0);
        assert_eq!(similarity(b"", b""), 100);
        assert_eq!(similarity(b"a\na\nb\n", b"a\nb\n"), 80);
    }
}
