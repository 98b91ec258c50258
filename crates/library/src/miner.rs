//! Repeated-sequence discovery over a history window.
//!
//! The window is projected onto tool identifiers, interned to `u32` symbols,
//! and scanned once per candidate length with a sliding window. Counting
//! borrows slices of the symbol vector, so no per-window allocation happens
//! and the cost stays `O(window × max_length)`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use stepwise_core::{Error, HistoryEntry, Pattern, Result};
use tracing::debug;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct MiningOptions {
    pub min_count: u32,
    pub min_length: usize,
    pub max_length: usize,
}

impl Default for MiningOptions {
    fn default() -> Self {
        Self {
            min_count: 3,
            min_length: 2,
            max_length: 6,
        }
    }
}

impl MiningOptions {
    pub fn validate(&self) -> Result<()> {
        if self.min_count == 0 {
            return Err(Error::Validation("min_count must be at least 1".into()));
        }
        if self.min_length == 0 || self.min_length > self.max_length {
            return Err(Error::Validation(format!(
                "invalid length range {}..={}",
                self.min_length, self.max_length
            )));
        }
        Ok(())
    }
}

/// Find every tool subsequence that repeats at least `min_count` times.
///
/// Occurrences may overlap. A pattern is dropped when a longer emitted
/// pattern with the same count contains it. Results are ordered longest
/// first, then by count, then lexically.
pub fn mine(history: &[HistoryEntry], options: &MiningOptions) -> Result<Vec<Pattern>> {
    options.validate()?;

    let mut vocabulary: HashMap<&str, u32> = HashMap::new();
    let mut names: Vec<&str> = Vec::new();
    let symbols: Vec<u32> = history
        .iter()
        .map(|e| {
            *vocabulary.entry(e.tool.as_str()).or_insert_with(|| {
                names.push(e.tool.as_str());
                (names.len() - 1) as u32
            })
        })
        .collect();

    let n = symbols.len();
    let mut found: Vec<(&[u32], u32, f64)> = Vec::new();

    for len in options.min_length..=options.max_length.min(n) {
        let total = n - len + 1;
        let mut counts: HashMap<&[u32], u32> = HashMap::new();
        for window in symbols.windows(len) {
            *counts.entry(window).or_insert(0) += 1;
        }
        found.extend(
            counts
                .into_iter()
                .filter(|(_, count)| *count >= options.min_count)
                .map(|(seq, count)| (seq, count, f64::from(count) / total as f64)),
        );
    }

    let kept: Vec<&(&[u32], u32, f64)> = found
        .iter()
        .filter(|(seq, count, _)| {
            !found.iter().any(|(other, other_count, _)| {
                other.len() > seq.len() && other_count == count && contains(other, seq)
            })
        })
        .collect();

    let mut patterns: Vec<Pattern> = kept
        .into_iter()
        .map(|(seq, count, confidence)| Pattern {
            sequence: seq.iter().map(|&s| names[s as usize].to_string()).collect(),
            count: *count,
            confidence: *confidence,
        })
        .collect();

    patterns.sort_by(|a, b| {
        b.len()
            .cmp(&a.len())
            .then(b.count.cmp(&a.count))
            .then_with(|| a.sequence.cmp(&b.sequence))
    });

    debug!(
        window = n,
        patterns = patterns.len(),
        "Mined history window"
    );
    Ok(patterns)
}

fn contains(haystack: &[u32], needle: &[u32]) -> bool {
    haystack.windows(needle.len()).any(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use stepwise_core::{Outcome, Step};

    fn window(tools: &[&str]) -> Vec<HistoryEntry> {
        tools
            .iter()
            .enumerate()
            .map(|(i, t)| {
                let mut e = HistoryEntry::pending(&Step::new(*t), Outcome::Ok, None);
                e.seq = i as u64 + 1;
                e
            })
            .collect()
    }

    fn opts(min_count: u32, min_length: usize, max_length: usize) -> MiningOptions {
        MiningOptions {
            min_count,
            min_length,
            max_length,
        }
    }

    #[test]
    fn finds_repeated_cycle_and_drops_subsumed() {
        // click→type→submit three times, separated by noise
        let h = window(&[
            "click", "type", "submit", "scroll", "click", "type", "submit", "wait", "click",
            "type", "submit",
        ]);
        let patterns = mine(&h, &opts(3, 2, 3)).unwrap();
        assert_eq!(patterns.len(), 1, "got {patterns:?}");
        assert_eq!(patterns[0].sequence, vec!["click", "type", "submit"]);
        assert_eq!(patterns[0].count, 3);
        assert!((patterns[0].confidence - 3.0 / 9.0).abs() < 1e-9);
    }

    #[test]
    fn shorter_pattern_with_higher_count_survives() {
        let h = window(&["a", "b", "c", "a", "b", "x", "a", "b", "c"]);
        let patterns = mine(&h, &opts(2, 2, 3)).unwrap();
        let labels: Vec<_> = patterns.iter().map(|p| (p.label(), p.count)).collect();
        assert!(labels.contains(&("a → b → c".to_string(), 2)));
        assert!(labels.contains(&("a → b".to_string(), 3)));
        // b→c has the same count as a→b→c and is contained in it
        assert!(!labels.iter().any(|(l, _)| l == "b → c"));
    }

    #[test]
    fn confidence_never_decreases_with_count() {
        let sparse = window(&["a", "b", "x", "y", "a", "b", "z", "w"]);
        let dense = window(&["a", "b", "x", "a", "b", "a", "b", "w"]);
        let o = opts(2, 2, 2);
        let find = |h: &[HistoryEntry]| {
            mine(h, &o)
                .unwrap()
                .into_iter()
                .find(|p| p.sequence == ["a", "b"])
                .unwrap()
        };
        let (s, d) = (find(&sparse), find(&dense));
        assert!(d.count > s.count);
        assert!(d.confidence >= s.confidence);
    }

    #[test]
    fn window_shorter_than_min_length_is_empty() {
        assert!(mine(&window(&["a"]), &opts(1, 2, 4)).unwrap().is_empty());
        assert!(mine(&[], &MiningOptions::default()).unwrap().is_empty());
    }

    #[test]
    fn overlapping_occurrences_count() {
        let patterns = mine(&window(&["a", "a", "a", "a"]), &opts(3, 2, 2)).unwrap();
        assert_eq!(patterns[0].sequence, vec!["a", "a"]);
        assert_eq!(patterns[0].count, 3);
        assert_eq!(patterns[0].confidence, 1.0);
    }

    #[test]
    fn rejects_bad_options() {
        assert!(mine(&[], &opts(0, 2, 3)).is_err());
        assert!(mine(&[], &opts(2, 4, 3)).is_err());
        assert!(mine(&[], &opts(2, 0, 3)).is_err());
    }
}
