//! Error taxonomy and search outcomes.
//!
//! Everything bubbles to the outermost search loop; nothing is recovered
//! inside a step. Program-level failures (assertions, model errors,
//! liveness) become [`SearchOutcome::Bug`]; resource exhaustion becomes
//! `Timeout`/`Memout`; engine invariant violations stay errors and abort
//! with a diagnostic.

use relay_values::VsError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    /// A program assertion failed under a satisfiable guard.
    #[error("assertion failed: {message}")]
    Assertion { message: String },

    /// A monitor sat in a hot state when execution finished.
    #[error("monitor {monitor} detected liveness bug in hot state {state} at the end of program execution")]
    Liveness { monitor: String, state: String },

    /// The modeled program misused a value (bad index, missing key,
    /// payload cast, unhandled event).
    #[error("model error: {0}")]
    Model(String),

    /// Value-summary model errors surface with the same severity.
    #[error("model error: {0}")]
    Value(#[from] VsError),

    #[error("search timed out after {seconds:.1}s")]
    Timeout { seconds: f64 },

    #[error("memory limit reached: {megabytes:.1} MB")]
    Memout { megabytes: f64 },

    /// A broken engine invariant. Never mapped to a program bug.
    #[error("engine invariant violated: {0}")]
    Internal(String),
}

pub type EngineResult<T> = Result<T, EngineError>;

/// Terminal classification of one search.
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    /// Search ran to completion without violations.
    Ok {
        depth: usize,
        distinct_states: usize,
    },
    /// A bug in the modeled program: assertion, model error, or liveness.
    Bug { message: String },
    /// Wall-clock limit hit; the current iteration is incomplete.
    Timeout { seconds: f64 },
    /// Memory limit hit; the current iteration is incomplete.
    Memout { megabytes: f64 },
}

impl SearchOutcome {
    pub fn result_str(&self) -> &'static str {
        match self {
            SearchOutcome::Ok { .. } => "ok",
            SearchOutcome::Bug { .. } => "bug",
            SearchOutcome::Timeout { .. } => "timeout",
            SearchOutcome::Memout { .. } => "memout",
        }
    }

    /// Process exit code for the test harness: 0 for ok, 2 for anything
    /// the harness should flag (bugs and resource exhaustion).
    pub fn exit_code(&self) -> i32 {
        match self {
            SearchOutcome::Ok { .. } => 0,
            _ => 2,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, SearchOutcome::Ok { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exit_codes() {
        let ok = SearchOutcome::Ok {
            depth: 3,
            distinct_states: 0,
        };
        assert_eq!(ok.exit_code(), 0);
        assert_eq!(ok.result_str(), "ok");
        let bug = SearchOutcome::Bug {
            message: "x".into(),
        };
        assert_eq!(bug.exit_code(), 2);
        assert_eq!(
            SearchOutcome::Timeout { seconds: 1.0 }.exit_code(),
            2
        );
    }

    #[test]
    fn test_liveness_message_names_hot_state() {
        let e = EngineError::Liveness {
            monitor: "Watcher(0)".into(),
            state: "H".into(),
        };
        assert!(e.to_string().contains("hot state"));
    }
}
