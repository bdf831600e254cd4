//! Test cases and the runner that gives each one a fresh connection.

use std::time::{Duration, Instant};

use brpnav_peer::Connection;
use serde::Serialize;
use tracing::{debug, error, info};

use crate::script::{ErrorPoint, FailureKind, NavigationScript, RunSummary, StepFailure};

/// A conformance test case run over one connection.
pub trait TestCase {
    fn name(&self) -> &str;

    fn run(&self, conn: &mut Connection) -> Result<RunSummary, StepFailure>;
}

/// The normal-operation workflow.
#[derive(Debug, Clone, Default)]
pub struct NormalOperation {
    script: NavigationScript,
}

impl NormalOperation {
    pub const NAME: &'static str = "NavigationNormalOperation";

    pub fn new(script: NavigationScript) -> Self {
        Self { script }
    }

    pub fn script(&self) -> &NavigationScript {
        &self.script
    }
}

impl TestCase for NormalOperation {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn run(&self, conn: &mut Connection) -> Result<RunSummary, StepFailure> {
        self.script.run(conn)
    }
}

/// Outcome of one case.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CaseStatus {
    Passed,
    Failed,
    /// The case could not start, e.g. the robot was unreachable.
    Error,
}

/// Report for one case.
#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub name: String,
    pub status: CaseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub point: Option<ErrorPoint>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<RunSummary>,
    #[serde(with = "crate::config::duration_ms")]
    pub elapsed: Duration,
}

impl CaseReport {
    pub fn passed(&self) -> bool {
        self.status == CaseStatus::Passed
    }

    fn from_outcome(
        name: &str,
        outcome: Result<RunSummary, StepFailure>,
        elapsed: Duration,
    ) -> Self {
        match outcome {
            Ok(summary) => Self {
                name: name.to_string(),
                status: CaseStatus::Passed,
                point: None,
                kind: None,
                message: None,
                summary: Some(summary),
                elapsed,
            },
            Err(failure) => Self {
                name: name.to_string(),
                status: CaseStatus::Failed,
                point: Some(failure.point),
                kind: Some(failure.kind()),
                message: Some(failure.to_string()),
                summary: None,
                elapsed,
            },
        }
    }
}

/// Runs cases in order, one connection per case.
pub struct Runner<F> {
    connect: F,
    cases: Vec<Box<dyn TestCase>>,
}

impl<F> Runner<F>
where
    F: FnMut() -> brpnav_peer::Result<Connection>,
{
    pub fn new(connect: F) -> Self {
        Self {
            connect,
            cases: Vec::new(),
        }
    }

    pub fn add(&mut self, case: impl TestCase + 'static) -> &mut Self {
        self.cases.push(Box::new(case));
        self
    }

    pub fn len(&self) -> usize {
        self.cases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cases.is_empty()
    }

    /// Run every case. A case that fails does not stop later ones.
    pub fn run_all(&mut self) -> Vec<CaseReport> {
        let mut reports = Vec::with_capacity(self.cases.len());
        for case in &self.cases {
            let started = Instant::now();
            let mut conn = match (self.connect)() {
                Ok(conn) => conn,
                Err(err) => {
                    error!(case = case.name(), error = %err, "could not connect");
                    reports.push(CaseReport {
                        name: case.name().to_string(),
                        status: CaseStatus::Error,
                        point: None,
                        kind: None,
                        message: Some(err.to_string()),
                        summary: None,
                        elapsed: started.elapsed(),
                    });
                    continue;
                }
            };

            info!(case = case.name(), connection = conn.id(), "running test case");
            let outcome = case.run(&mut conn);
            if let Err(err) = conn.close() {
                debug!(error = %err, "closing connection");
            }
            let report = CaseReport::from_outcome(case.name(), outcome, started.elapsed());
            info!(case = case.name(), status = ?report.status, "test case finished");
            reports.push(report);
        }
        reports
    }
}
