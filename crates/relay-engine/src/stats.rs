//! Search statistics, coverage, and the stat log.

use std::fmt::Display;
use tracing::info;

/// Per-depth transition and state counts.
#[derive(Debug, Clone, Copy, Default)]
pub struct DepthStats {
    pub depth: usize,
    /// Concrete states enumerated from the source state.
    pub num_states: usize,
    /// Concrete messages dequeued (transitions).
    pub num_messages: usize,
    /// Concrete messages after merging into one symbolic effect.
    pub num_messages_merged: usize,
    /// Distinct (target, event) combinations explored.
    pub num_messages_explored: usize,
}

/// Accumulated statistics for one search.
#[derive(Debug, Default)]
pub struct SearchStats {
    per_depth: Vec<DepthStats>,
    iteration_completed: bool,
}

impl SearchStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_depth_statistics(&mut self, stats: DepthStats) {
        self.per_depth.push(stats);
    }

    pub fn set_iteration_completed(&mut self) {
        self.iteration_completed = true;
    }

    pub fn iteration_completed(&self) -> bool {
        self.iteration_completed
    }

    pub fn max_depth(&self) -> usize {
        self.per_depth.iter().map(|d| d.depth).max().unwrap_or(0)
    }

    /// Totals across depths.
    pub fn total(&self) -> DepthStats {
        let mut out = DepthStats {
            depth: self.max_depth(),
            ..DepthStats::default()
        };
        for d in &self.per_depth {
            out.num_states += d.num_states;
            out.num_messages += d.num_messages;
            out.num_messages_merged += d.num_messages_merged;
            out.num_messages_explored += d.num_messages_explored;
        }
        out
    }

    pub fn per_depth(&self) -> &[DepthStats] {
        &self.per_depth
    }

    pub fn reset(&mut self) {
        self.per_depth.clear();
        self.iteration_completed = false;
    }
}

/// One nondeterministic choice point's coverage.
#[derive(Debug, Clone, Copy)]
pub struct ChoiceCoverage {
    pub kind: &'static str,
    /// How many candidates were available when the choice was made.
    pub candidates: usize,
}

/// Per-choice-depth record of how wide each decision was.
#[derive(Debug, Default)]
pub struct CoverageStats {
    per_choice_depth: Vec<ChoiceCoverage>,
}

impl CoverageStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, choice_depth: usize, kind: &'static str, candidates: usize) {
        let cov = ChoiceCoverage { kind, candidates };
        if choice_depth < self.per_choice_depth.len() {
            self.per_choice_depth[choice_depth] = cov;
        } else {
            self.per_choice_depth.push(cov);
        }
    }

    pub fn per_choice_depth(&self) -> &[ChoiceCoverage] {
        &self.per_choice_depth
    }

    pub fn reset(&mut self) {
        self.per_choice_depth.clear();
    }
}

/// Key-value stat sink: logs through tracing and retains pairs so tests
/// and callers can read them back.
#[derive(Debug, Default)]
pub struct StatWriter {
    entries: Vec<(String, String)>,
}

impl StatWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn log(&mut self, key: &str, value: impl Display) {
        let value = value.to_string();
        info!(target: "relay::stats", "{} = {}", key, value);
        self.entries.push((key.to_string(), value));
    }

    /// Last recorded value for `key`.
    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .rev()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn entries(&self) -> &[(String, String)] {
        &self.entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_totals() {
        let mut s = SearchStats::new();
        s.add_depth_statistics(DepthStats {
            depth: 1,
            num_states: 2,
            num_messages: 1,
            num_messages_merged: 1,
            num_messages_explored: 1,
        });
        s.add_depth_statistics(DepthStats {
            depth: 2,
            num_states: 3,
            num_messages: 2,
            num_messages_merged: 1,
            num_messages_explored: 2,
        });
        let t = s.total();
        assert_eq!(t.depth, 2);
        assert_eq!(t.num_states, 5);
        assert_eq!(t.num_messages, 3);
    }

    #[test]
    fn test_stat_writer_round_trip() {
        let mut w = StatWriter::new();
        w.log("result", "ok");
        w.log("max-depth-explored", 7);
        assert_eq!(w.get("result"), Some("ok"));
        assert_eq!(w.get("max-depth-explored"), Some("7"));
        assert_eq!(w.get("missing"), None);
    }

    #[test]
    fn test_coverage_overwrites_at_depth() {
        let mut c = CoverageStats::new();
        c.record(0, "sender", 2);
        c.record(0, "sender", 3);
        assert_eq!(c.per_choice_depth().len(), 1);
        assert_eq!(c.per_choice_depth()[0].candidates, 3);
    }
}
