//! Results of a local run.

use serde::Serialize;

use crate::context::{ContextState, TestInfo};
use crate::diagnostics::{AssemblyError, Failure};
use crate::expand::UnitId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Passed,
    Failed,
    Skipped,
}

/// What happened to one test unit.
#[derive(Debug, Clone, Serialize)]
pub struct TestOutcome {
    pub suite: String,
    pub title: String,
    pub member: String,
    pub identity: UnitId,
    pub status: Status,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<Failure>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skip_reason: Option<String>,
    pub duration_ms: u64,
    #[serde(flatten)]
    pub state: ContextState,
}

impl TestOutcome {
    pub(crate) fn new(info: &TestInfo, status: Status) -> Self {
        Self {
            suite: info.suite.clone(),
            title: info.title.clone(),
            member: info.member.clone(),
            identity: info.identity,
            status,
            failure: None,
            skip_reason: None,
            duration_ms: 0,
            state: ContextState::default(),
        }
    }

    pub fn full_title(&self) -> String {
        format!("{} > {}", self.suite, self.title)
    }
}

/// A suite-scoped hook failure not tied to a single test, such as a failing
/// suite teardown.
#[derive(Debug, Clone, Serialize)]
pub struct SuiteFailure {
    pub suite: String,
    pub failure: Failure,
}

/// A suite that never ran because it could not be assembled.
#[derive(Debug, Clone, Serialize)]
pub struct AssemblyReport {
    pub kind: String,
    pub message: String,
}

impl From<&AssemblyError> for AssemblyReport {
    fn from(err: &AssemblyError) -> Self {
        Self {
            kind: err.error_type().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
    pub skipped: usize,
    pub outcomes: Vec<TestOutcome>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suite_failures: Vec<SuiteFailure>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assembly_errors: Vec<AssemblyReport>,
}

impl RunSummary {
    pub(crate) fn record(&mut self, outcome: TestOutcome) {
        match outcome.status {
            Status::Passed => self.passed += 1,
            Status::Failed => self.failed += 1,
            Status::Skipped => self.skipped += 1,
        }
        self.outcomes.push(outcome);
    }

    pub fn total(&self) -> usize {
        self.outcomes.len()
    }

    /// No failed test, no failed suite hook and no suite left unassembled.
    pub fn is_success(&self) -> bool {
        self.failed == 0 && self.suite_failures.is_empty() && self.assembly_errors.is_empty()
    }

    pub fn outcome(&self, title: &str) -> Option<&TestOutcome> {
        self.outcomes.iter().find(|o| o.title == title)
    }
}
