use chrono::{DateTime, Utc};
use itertools::Itertools;
use profiler_e2e_core::prelude::{CaseFailure, RunConfig};
use profiler_e2e_summary_model::{CaseSummary, FailureRecord};
use std::time::Duration;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// What happened to one test case.
#[derive(Debug, Clone, PartialEq)]
pub struct CaseReport {
    pub config: RunConfig,
    pub started_at: DateTime<Utc>,
    pub elapsed: Duration,
    /// Every failure of the case in the order they happened. Empty if the case passed.
    pub failures: Vec<CaseFailure>,
    /// Set if the instance was created but could not be deleted.
    pub cleanup_error: Option<String>,
}

impl CaseReport {
    pub(crate) fn new(config: RunConfig, started_at: DateTime<Utc>) -> Self {
        Self {
            config,
            started_at,
            elapsed: Duration::ZERO,
            failures: Vec::new(),
            cleanup_error: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.config.instance_name
    }

    /// A case passes when nothing failed. A failed delete does not fail the case.
    pub fn passed(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn has_failure_kind(&self, kind: &str) -> bool {
        self.failures.iter().any(|f| f.kind() == kind)
    }

    pub(crate) fn fail(&mut self, failure: CaseFailure) {
        log::error!("Test case [{}] failed: {failure}", self.name());
        self.failures.push(failure);
    }

    pub fn to_summary(&self) -> CaseSummary {
        let mut summary = CaseSummary {
            run_id: self.config.run_id.clone(),
            instance_name: self.config.instance_name.clone(),
            service: self.config.service.clone(),
            runtime_version: self.config.runtime_version.clone(),
            scenario: self.config.scenario.template_section().to_string(),
            machine_type: self.config.machine_type.clone(),
            bench_duration_s: self.config.bench_duration.as_secs(),
            started_at: self.started_at.timestamp(),
            duration_s: self.elapsed.as_secs_f64(),
            passed: self.passed(),
            failures: self
                .failures
                .iter()
                .map(|f| FailureRecord {
                    kind: f.kind().to_string(),
                    message: f.to_string(),
                })
                .collect(),
            cleanup_error: self.cleanup_error.clone(),
            labels: Default::default(),
            fingerprint: String::new(),
        };
        summary.add_label("repo", &self.config.repo);
        if let Some(fetch) = &self.config.git_ref.fetch {
            summary.add_label("fetch", fetch.refspec());
        }
        if let Some(commit) = &self.config.git_ref.commit {
            summary.add_label("commit", commit);
        }
        summary.fingerprint = summary.fingerprint();
        summary
    }
}

#[derive(Tabled)]
struct CaseRow {
    #[tabled(rename = "Case")]
    name: String,
    #[tabled(rename = "Runtime")]
    runtime_version: String,
    #[tabled(rename = "Scenario")]
    scenario: &'static str,
    #[tabled(rename = "Result")]
    result: &'static str,
    #[tabled(rename = "Duration")]
    duration: String,
    #[tabled(rename = "Failures")]
    failures: String,
    #[tabled(rename = "Cleanup")]
    cleanup: String,
}

impl From<&CaseReport> for CaseRow {
    fn from(report: &CaseReport) -> Self {
        let secs = report.elapsed.as_secs();
        Self {
            name: report.name().to_string(),
            runtime_version: report.config.runtime_version.clone(),
            scenario: report.config.scenario.template_section(),
            result: if report.passed() { "passed" } else { "FAILED" },
            duration: format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60),
            failures: report.failures.iter().map(|f| f.to_string()).join("\n"),
            cleanup: report
                .cleanup_error
                .clone()
                .unwrap_or_else(|| "ok".to_string()),
        }
    }
}

/// Render the results of all cases as a table.
pub fn format_report_table(reports: &[CaseReport]) -> String {
    let rows = reports.iter().map(CaseRow::from).collect::<Vec<_>>();

    let mut table = Table::new(&rows);
    table.with(Style::modern());

    table.to_string()
}
