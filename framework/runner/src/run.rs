use crate::case::{run_case, CaseEnvironment};
use crate::definition::{HarnessDefinition, HarnessDefinitionBuilder};
use crate::lifecycle::LifecycleDriver;
use crate::progress::CaseProgress;
use crate::report::{format_report_table, CaseReport};
use crate::shutdown::start_shutdown_listener;
use anyhow::Context;
use chrono::Utc;
use profiler_e2e_core::prelude::{CaseFailure, ShutdownHandle};
use profiler_e2e_summary_model::append_case_summary;
use std::path::Path;
use std::sync::Arc;

const RUN_ID_SUFFIX_ALPHABET: [char; 36] = [
    'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i', 'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's',
    't', 'u', 'v', 'w', 'x', 'y', 'z', '0', '1', '2', '3', '4', '5', '6', '7', '8', '9',
];

/// Create an id for this invocation of the harness.
///
/// The id is made of the current UTC time and a short random suffix. It only contains lowercase
/// letters, digits and `-` so that it can be used in instance names.
pub fn new_run_id() -> String {
    format!(
        "{}-{}",
        Utc::now().format("%Y-%m-%d-%H-%M-%S-%6f"),
        nanoid::nanoid!(6, &RUN_ID_SUFFIX_ALPHABET)
    )
}

/// The reports of every case of a run, in the order the cases were defined.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: String,
    pub reports: Vec<CaseReport>,
}

impl RunOutcome {
    pub fn passed(&self) -> bool {
        self.reports.iter().all(CaseReport::passed)
    }

    pub fn failed_cases(&self) -> impl Iterator<Item = &CaseReport> {
        self.reports.iter().filter(|r| !r.passed())
    }
}

/// Run every case of a scenario concurrently and report the results.
///
/// Returns an error if the definition is invalid. Failed cases are not an error, check
/// [RunOutcome::passed].
pub fn run(definition: HarnessDefinitionBuilder) -> anyhow::Result<RunOutcome> {
    let definition = definition.build()?;

    log::info!(
        "Running scenario {} with {} cases, run id {}",
        definition.name,
        definition.cases.len(),
        definition.run_id
    );

    let runtime = tokio::runtime::Runtime::new().context("Failed to create Tokio runtime")?;
    let shutdown_handle = start_shutdown_listener(&runtime);
    let summary_path = definition.summary_path.clone();

    let outcome = runtime.block_on(run_definition(definition, shutdown_handle));

    println!("\nSummary of test cases");
    println!("{}", format_report_table(&outcome.reports));

    if let Some(path) = summary_path {
        write_summaries(&outcome.reports, &path)?;
    }

    Ok(outcome)
}

fn write_summaries(reports: &[CaseReport], path: &Path) -> anyhow::Result<()> {
    for report in reports {
        append_case_summary(&report.to_summary(), path)
            .with_context(|| format!("Failed to append case summary to {}", path.display()))?;
    }
    log::info!("Wrote {} case summaries to {}", reports.len(), path.display());

    Ok(())
}

/// Run every case of `definition` as its own task and wait for all of them.
///
/// Cases share nothing but the read-only backends. A case that panics is reported as failed
/// without affecting the others.
pub async fn run_definition(
    definition: HarnessDefinition,
    shutdown_handle: ShutdownHandle,
) -> RunOutcome {
    let env = Arc::new(CaseEnvironment {
        driver: LifecycleDriver::new(definition.provisioner),
        querier: definition.querier,
        template: definition.template,
        project_id: definition.project_id,
        zone: definition.zone,
        image: definition.image,
        backoff_markers: definition.backoff_markers,
        poll_interval: definition.poll_interval,
    });
    let progress = CaseProgress::new(!definition.no_progress);

    let mut handles = Vec::with_capacity(definition.cases.len());
    for case in definition.cases {
        let config = case.config.clone();
        let pb = progress.add_case(case.name());
        let task = tokio::spawn(run_case(
            env.clone(),
            case,
            shutdown_handle.new_listener(),
            pb,
        ));
        handles.push((config, task));
    }

    let mut reports = Vec::with_capacity(handles.len());
    for (config, task) in handles {
        let started_at = Utc::now();
        match task.await {
            Ok(report) => reports.push(report),
            Err(e) => {
                log::error!("Test case [{}] did not finish: {e}", config.instance_name);
                let mut report = CaseReport::new(config, started_at);
                report.fail(CaseFailure::Panicked {
                    message: e.to_string(),
                });
                reports.push(report);
            }
        }
    }

    RunOutcome {
        run_id: definition.run_id,
        reports,
    }
}
