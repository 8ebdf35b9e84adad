//! Clause-level comparison of two lease versions

use crate::text::clauses::ClauseUnit;
use crate::utils::collapse_whitespace;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Bodies less similar than this are reported as modified
pub const DEFAULT_MODIFIED_THRESHOLD: f32 = 0.9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Added,
    Removed,
    Modified,
}

/// A single clause difference
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClauseChange {
    #[serde(rename = "type")]
    pub kind: ChangeKind,
    pub clause_no: String,
    pub before: Option<String>,
    pub after: Option<String>,
}

/// Compare numbered clauses of two documents.
///
/// Removed and modified clauses come first in base order, then added clauses in
/// compare order. Unnumbered units are ignored.
pub fn diff_clauses(base: &[ClauseUnit], compare: &[ClauseUnit], threshold: f32) -> Vec<ClauseChange> {
    let base_index = index_by_number(base);
    let compare_index = index_by_number(compare);
    let compare_lookup: HashMap<&str, &str> = compare_index
        .iter()
        .map(|(n, b)| (n.as_str(), b.as_str()))
        .collect();
    let base_numbers: HashSet<&str> = base_index.iter().map(|(n, _)| n.as_str()).collect();

    let mut changes = Vec::new();

    for (number, before) in &base_index {
        match compare_lookup.get(number.as_str()) {
            None => changes.push(ClauseChange {
                kind: ChangeKind::Removed,
                clause_no: number.clone(),
                before: Some(before.clone()),
                after: None,
            }),
            Some(after) => {
                if similarity_ratio(before, after) < threshold {
                    changes.push(ClauseChange {
                        kind: ChangeKind::Modified,
                        clause_no: number.clone(),
                        before: Some(before.clone()),
                        after: Some(after.to_string()),
                    });
                }
            }
        }
    }

    for (number, after) in &compare_index {
        if !base_numbers.contains(number.as_str()) {
            changes.push(ClauseChange {
                kind: ChangeKind::Added,
                clause_no: number.clone(),
                before: None,
                after: Some(after.clone()),
            });
        }
    }

    changes
}

/// Word-sequence similarity in [0, 1]: twice the longest common subsequence
/// over the total word count.
pub fn similarity_ratio(a: &str, b: &str) -> f32 {
    let a: Vec<&str> = a.split_whitespace().collect();
    let b: Vec<&str> = b.split_whitespace().collect();
    let total = a.len() + b.len();
    if total == 0 {
        return 1.0;
    }

    let mut prev = vec![0usize; b.len() + 1];
    let mut curr = vec![0usize; b.len() + 1];
    for word in &a {
        for (j, other) in b.iter().enumerate() {
            curr[j + 1] = if word == other {
                prev[j] + 1
            } else {
                prev[j + 1].max(curr[j])
            };
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    2.0 * prev[b.len()] as f32 / total as f32
}

/// Numbered clauses with their whitespace-collapsed bodies; the first
/// occurrence of a number wins.
fn index_by_number(units: &[ClauseUnit]) -> Vec<(String, String)> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();
    for unit in units {
        let Some(number) = &unit.number else {
            continue;
        };
        if seen.insert(number.clone()) {
            out.push((number.clone(), clause_body(&unit.text)));
        }
    }
    out
}

/// Clause text without its header line
fn clause_body(text: &str) -> String {
    let lines: Vec<&str> = text
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();
    match lines.len() {
        0 => String::new(),
        1 => collapse_whitespace(lines[0]),
        _ => collapse_whitespace(&lines[1..].join(" ")),
    }
}
