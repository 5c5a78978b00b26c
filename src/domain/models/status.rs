//! Phase outcomes and the overall verdict derived from them.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome a worker reports for one phase of a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Passed,
    Failed,
    Skipped,
    /// Any outcome string the hub does not recognize. Never matches a rule.
    #[serde(other)]
    Unknown,
}

/// `(outcome, expected-failure flag)` for a single phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PhaseStatus {
    pub outcome: Outcome,
    pub xfail: bool,
}

impl PhaseStatus {
    pub const fn new(outcome: Outcome, xfail: bool) -> Self {
        Self { outcome, xfail }
    }
}

/// Phase name to status, kept in the order phases were first reported.
pub type PhaseStatuses = IndexMap<String, PhaseStatus>;

pub const PHASE_SETUP: &str = "setup";
pub const PHASE_CALL: &str = "call";
pub const PHASE_TEARDOWN: &str = "teardown";

/// Single classification of a test across all of its phases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OverallStatus {
    Passed,
    Failed,
    Skipped,
    Error,
    Xpassed,
    Xfailed,
}

impl OverallStatus {
    pub const ALL: [Self; 6] = [
        Self::Passed,
        Self::Failed,
        Self::Skipped,
        Self::Error,
        Self::Xpassed,
        Self::Xfailed,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Passed => "passed",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Error => "error",
            Self::Xpassed => "xpassed",
            Self::Xfailed => "xfailed",
        }
    }

    /// Presentation class used by report renderers.
    pub const fn color(self) -> &'static str {
        match self {
            Self::Passed | Self::Xfailed => "success",
            Self::Failed => "warning",
            Self::Error | Self::Xpassed => "danger",
            Self::Skipped => "info",
        }
    }
}

impl fmt::Display for OverallStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reduce per-phase statuses to one verdict.
///
/// Phases are visited in insertion order and the first matching rule wins:
///
/// 1. `call` skipped with xfail → `xfailed`
/// 2. `call` failed with xfail → `xpassed`
/// 3. `setup`/`teardown` failed → `error`
/// 4. any phase skipped → `skipped`
/// 5. `call` failed → `failed`
///
/// Nothing matching yields `passed`.
pub fn classify(statuses: &PhaseStatuses) -> OverallStatus {
    for (phase, status) in statuses {
        let phase = phase.as_str();
        match (phase, status.outcome, status.xfail) {
            (PHASE_CALL, Outcome::Skipped, true) => return OverallStatus::Xfailed,
            (PHASE_CALL, Outcome::Failed, true) => return OverallStatus::Xpassed,
            (PHASE_SETUP | PHASE_TEARDOWN, Outcome::Failed, _) => return OverallStatus::Error,
            (_, Outcome::Skipped, _) => return OverallStatus::Skipped,
            (PHASE_CALL, Outcome::Failed, false) => return OverallStatus::Failed,
            _ => {}
        }
    }
    OverallStatus::Passed
}

/// Count of tests per overall status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusCounts {
    pub passed: u64,
    pub failed: u64,
    pub skipped: u64,
    pub error: u64,
    pub xpassed: u64,
    pub xfailed: u64,
}

impl StatusCounts {
    pub fn increment(&mut self, status: OverallStatus) {
        *self.slot(status) += 1;
    }

    pub const fn get(&self, status: OverallStatus) -> u64 {
        match status {
            OverallStatus::Passed => self.passed,
            OverallStatus::Failed => self.failed,
            OverallStatus::Skipped => self.skipped,
            OverallStatus::Error => self.error,
            OverallStatus::Xpassed => self.xpassed,
            OverallStatus::Xfailed => self.xfailed,
        }
    }

    pub const fn total(&self) -> u64 {
        self.passed + self.failed + self.skipped + self.error + self.xpassed + self.xfailed
    }

    /// Share of `passed` + `xfailed` among all counted tests, in percent.
    ///
    /// `None` when nothing has been counted.
    pub fn pass_percentage(&self) -> Option<f64> {
        let total = self.total();
        if total == 0 {
            return None;
        }
        #[allow(clippy::cast_precision_loss)]
        Some((self.passed + self.xfailed) as f64 / total as f64 * 100.0)
    }

    fn slot(&mut self, status: OverallStatus) -> &mut u64 {
        match status {
            OverallStatus::Passed => &mut self.passed,
            OverallStatus::Failed => &mut self.failed,
            OverallStatus::Skipped => &mut self.skipped,
            OverallStatus::Error => &mut self.error,
            OverallStatus::Xpassed => &mut self.xpassed,
            OverallStatus::Xfailed => &mut self.xfailed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn statuses(entries: &[(&str, Outcome, bool)]) -> PhaseStatuses {
        entries
            .iter()
            .map(|(phase, outcome, xfail)| ((*phase).to_string(), PhaseStatus::new(*outcome, *xfail)))
            .collect()
    }

    #[test]
    fn test_call_failed_with_xfail_is_xpassed() {
        let s = statuses(&[(PHASE_CALL, Outcome::Failed, true)]);
        assert_eq!(classify(&s), OverallStatus::Xpassed);
    }

    #[test]
    fn test_call_skipped_with_xfail_is_xfailed() {
        let s = statuses(&[(PHASE_CALL, Outcome::Skipped, true)]);
        assert_eq!(classify(&s), OverallStatus::Xfailed);
    }

    #[test]
    fn test_setup_failure_is_error_even_if_call_passed() {
        let s = statuses(&[
            (PHASE_SETUP, Outcome::Failed, false),
            (PHASE_CALL, Outcome::Passed, false),
        ]);
        assert_eq!(classify(&s), OverallStatus::Error);
    }

    #[test]
    fn test_teardown_failure_is_error() {
        let s = statuses(&[
            (PHASE_SETUP, Outcome::Passed, false),
            (PHASE_CALL, Outcome::Passed, false),
            (PHASE_TEARDOWN, Outcome::Failed, false),
        ]);
        assert_eq!(classify(&s), OverallStatus::Error);
    }

    #[test]
    fn test_plain_pass_and_skip() {
        let s = statuses(&[(PHASE_CALL, Outcome::Passed, false)]);
        assert_eq!(classify(&s), OverallStatus::Passed);

        let s = statuses(&[(PHASE_CALL, Outcome::Skipped, false)]);
        assert_eq!(classify(&s), OverallStatus::Skipped);
    }

    #[test]
    fn test_call_failed_is_failed() {
        let s = statuses(&[
            (PHASE_SETUP, Outcome::Passed, false),
            (PHASE_CALL, Outcome::Failed, false),
        ]);
        assert_eq!(classify(&s), OverallStatus::Failed);
    }

    #[test]
    fn test_setup_skip_before_failing_call_wins() {
        let s = statuses(&[
            (PHASE_SETUP, Outcome::Skipped, false),
            (PHASE_CALL, Outcome::Failed, false),
        ]);
        assert_eq!(classify(&s), OverallStatus::Skipped);
    }

    #[test]
    fn test_empty_and_unknown_outcomes_default_to_passed() {
        assert_eq!(classify(&PhaseStatuses::new()), OverallStatus::Passed);
        let s = statuses(&[(PHASE_CALL, Outcome::Unknown, true)]);
        assert_eq!(classify(&s), OverallStatus::Passed);
    }

    #[test]
    fn test_unknown_outcome_string_deserializes() {
        let status: PhaseStatus =
            serde_json::from_str(r#"{"outcome": "rerun", "xfail": false}"#).unwrap();
        assert_eq!(status.outcome, Outcome::Unknown);
    }

    #[test]
    fn test_pass_percentage() {
        let mut counts = StatusCounts::default();
        assert_eq!(counts.pass_percentage(), None);

        counts.increment(OverallStatus::Passed);
        counts.increment(OverallStatus::Xfailed);
        counts.increment(OverallStatus::Failed);
        counts.increment(OverallStatus::Skipped);
        assert_eq!(counts.total(), 4);
        assert!((counts.pass_percentage().unwrap() - 50.0).abs() < f64::EPSILON);
    }
}
