use crate::definition::TestCase;
use crate::lifecycle::LifecycleDriver;
use crate::poll::poll_for_sentinel;
use crate::progress::set_step;
use crate::report::CaseReport;
use chrono::Utc;
use indicatif::ProgressBar;
use profiler_e2e_core::prelude::{
    CaseFailure, ExpectedProfile, ImageFamily, InstanceHandle, InstanceSpec, PollResult,
    ProfileQuery, RunConfig, Scenario, ShutdownListener,
};
use profiler_e2e_profile_model::prelude::{
    check_backoffs, check_expected_profile, BackoffMarkers, ProfileQuerier,
};
use startup_script::{render_startup_script, ScriptTemplate};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

/// Read-only state shared by every case of a run.
pub(crate) struct CaseEnvironment {
    pub(crate) driver: LifecycleDriver,
    pub(crate) querier: Arc<dyn ProfileQuerier>,
    pub(crate) template: Arc<ScriptTemplate>,
    pub(crate) project_id: String,
    pub(crate) zone: String,
    pub(crate) image: ImageFamily,
    pub(crate) backoff_markers: BackoffMarkers,
    pub(crate) poll_interval: Duration,
}

/// Run one case from rendering its startup script to deleting its instance.
///
/// Failures are collected in the returned report. Once the instance is created it is deleted
/// again on every path out of this function.
pub(crate) async fn run_case(
    env: Arc<CaseEnvironment>,
    case: TestCase,
    shutdown: ShutdownListener,
    pb: Option<ProgressBar>,
) -> CaseReport {
    let started = Instant::now();
    let TestCase { config, expected } = case;
    let mut report = CaseReport::new(config.clone(), Utc::now());

    set_step(pb.as_ref(), "rendering startup script");
    let startup_script = match render_startup_script(&env.template, &config) {
        Ok(script) => script,
        Err(e) => {
            report.fail(CaseFailure::Render {
                message: e.to_string(),
            });
            return finish(report, started, pb);
        }
    };
    log::trace!("Startup script for {}:\n{startup_script}", config.instance_name);

    if shutdown.should_shutdown() {
        report.fail(CaseFailure::Cancelled);
        return finish(report, started, pb);
    }

    let spec = InstanceSpec {
        project: env.project_id.clone(),
        zone: env.zone.clone(),
        name: config.instance_name.clone(),
        machine_type: config.machine_type.clone(),
        image: env.image.clone(),
        startup_script,
    };

    set_step(pb.as_ref(), "creating instance");
    let (case_env, case_config, case_expected, case_pb) =
        (env.as_ref(), &config, expected.as_slice(), pb.as_ref());
    let scoped = env
        .driver
        .with_instance(&spec, move |handle| {
            check_instance(case_env, case_config, case_expected, handle, shutdown, case_pb)
        })
        .await;

    match scoped {
        Ok(outcome) => {
            for failure in outcome.value {
                report.fail(failure);
            }
            if let Err(e) = outcome.cleanup {
                report.cleanup_error = Some(describe(&e));
            }
        }
        Err(e) => report.fail(CaseFailure::Provisioning {
            message: describe(&e),
        }),
    }

    finish(report, started, pb)
}

/// Wait for the benchmark on `handle` and check what it produced.
async fn check_instance(
    env: &CaseEnvironment,
    config: &RunConfig,
    expected: &[ExpectedProfile],
    handle: InstanceHandle,
    mut shutdown: ShutdownListener,
    pb: Option<&ProgressBar>,
) -> Vec<CaseFailure> {
    set_step(pb, "waiting for benchmark");
    let poll = tokio::select! {
        result = poll_for_sentinel(
            env.driver.provisioner(),
            &handle,
            &config.sentinels,
            config.timeout,
            env.poll_interval,
        ) => result,
        _ = shutdown.wait_for_shutdown() => {
            log::warn!("Stopped waiting for {handle}, shutdown was requested");
            return vec![CaseFailure::Cancelled];
        }
    };

    log::info!(
        "Console output of {} ({}):\n{}",
        config.instance_name,
        poll_state(&poll),
        poll.output()
    );

    let output = match poll {
        PollResult::Completed { output } => output,
        PollResult::Failed { sentinel, .. } => {
            return vec![CaseFailure::RemoteFailure { sentinel }];
        }
        PollResult::TimedOut { .. } => {
            return vec![CaseFailure::Timeout {
                waited: config.timeout,
            }];
        }
    };

    match config.scenario {
        Scenario::Backoff {
            num_benchmarks,
            min_backed_off,
        } => {
            set_step(pb, "checking backoffs");
            match check_backoffs(&output, num_benchmarks, min_backed_off, &env.backoff_markers) {
                Ok(tally) => {
                    log::info!(
                        "{} of {num_benchmarks} benchmarks on {} received a backoff, {} retried afterwards",
                        tally.backed_off.len(),
                        config.instance_name,
                        tally.retried_after_backoff.len()
                    );
                    Vec::new()
                }
                Err(e) => vec![CaseFailure::Backoff {
                    message: e.to_string(),
                }],
            }
        }
        Scenario::Integration => {
            set_step(pb, "querying profiles");
            check_profiles(env, config, expected).await
        }
    }
}

/// Query the profiles for every expected fact and check them, collecting all failures.
async fn check_profiles(
    env: &CaseEnvironment,
    config: &RunConfig,
    expected: &[ExpectedProfile],
) -> Vec<CaseFailure> {
    let mut failures = Vec::new();
    let now = Utc::now();

    for want in expected {
        let mut query =
            ProfileQuery::last_hour(&env.project_id, &config.service, want.profile_type, now)
                .with_zone(&env.zone);
        if want.line.is_some() {
            query = query.with_profile_bytes();
        }

        let doc = match env.querier.query(&query).await {
            Ok(doc) => doc,
            Err(e) => {
                failures.push(CaseFailure::Query {
                    profile_type: want.profile_type,
                    message: describe(&e),
                });
                continue;
            }
        };
        log::debug!(
            "Got a {} {} profile for {}",
            doc.shape(),
            want.profile_type,
            config.service
        );

        failures.extend(check_expected_profile(&doc, want).into_iter().map(|failure| {
            CaseFailure::Assertion {
                profile_type: want.profile_type,
                message: failure.to_string(),
            }
        }));
    }

    failures
}

/// Render an error with all of its sources.
fn describe(e: &dyn std::error::Error) -> String {
    let mut message = e.to_string();
    let mut source = e.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

fn poll_state(poll: &PollResult) -> &'static str {
    match poll {
        PollResult::Completed { .. } => "completed",
        PollResult::Failed { .. } => "failed",
        PollResult::TimedOut { .. } => "timed out",
    }
}

fn finish(mut report: CaseReport, started: Instant, pb: Option<ProgressBar>) -> CaseReport {
    report.elapsed = started.elapsed();
    if let Some(pb) = pb {
        pb.finish_with_message(if report.passed() { "passed" } else { "failed" });
    }
    report
}
