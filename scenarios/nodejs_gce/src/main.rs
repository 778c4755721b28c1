use anyhow::Context;
use gce_client::prelude::GceClient;
use profiler_e2e_runner::prelude::*;
use profiler_query_client::prelude::ProfilerClient;
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_REPO: &str = "https://github.com/googleapis/cloud-profiler-nodejs.git";
const STARTUP_TEMPLATE: &str = include_str!("../templates/startup.toml");

const NODE_VERSIONS: [&str; 3] = ["10", "12", "14"];
const BENCH_DURATION: Duration = Duration::from_secs(600);
const TEST_TIMEOUT: Duration = Duration::from_secs(25 * 60);

// The backend only hands out backoffs once more than 32 agents share a deployment. The first
// backoff is 33 minutes, so 45 benchmarks running for 45 minutes leaves time to see agents
// retry afterwards.
const NUM_BACKOFF_BENCHMARKS: usize = 45;
const MIN_BACKED_OFF: usize = 5;
const BACKOFF_BENCH_DURATION: Duration = Duration::from_secs(45 * 60);
const BACKOFF_TEST_TIMEOUT: Duration = Duration::from_secs(60 * 60);
const BACKOFF_NODE_VERSION: &str = "12";

fn base_config(builder: &HarnessDefinitionBuilder, instance_name: String, service: String) -> RunConfig {
    RunConfig {
        run_id: builder.run_id().to_string(),
        instance_name,
        service,
        runtime_version: String::new(),
        bench_duration: BENCH_DURATION,
        timeout: TEST_TIMEOUT,
        machine_type: "n1-standard-1".to_string(),
        repo: builder.repo(),
        git_ref: builder.git_ref(),
        sentinels: Sentinels::default(),
        scenario: Scenario::Integration,
    }
}

fn integration_case(builder: &HarnessDefinitionBuilder, node_version: &str) -> TestCase {
    let run_id = builder.run_id();
    let config = RunConfig {
        runtime_version: node_version.to_string(),
        ..base_config(
            builder,
            format!("profiler-test-node{node_version}-{run_id}"),
            format!("profiler-test-node{node_version}-{run_id}-gce"),
        )
    };

    TestCase::new(config)
        .expect(ExpectedProfile::function(ProfileType::Wall, "busyLoop").in_file("busybench.ts"))
        .expect(ExpectedProfile::function(ProfileType::Heap, "benchmark").in_file("busybench.ts"))
}

fn backoff_case(builder: &HarnessDefinitionBuilder) -> TestCase {
    let name = format!(
        "profiler-backoff-test-node{BACKOFF_NODE_VERSION}-{}",
        builder.run_id()
    );
    let config = RunConfig {
        runtime_version: BACKOFF_NODE_VERSION.to_string(),
        bench_duration: BACKOFF_BENCH_DURATION,
        timeout: BACKOFF_TEST_TIMEOUT,
        // Many copies of the benchmark need more memory than an n1-standard-1 has.
        machine_type: "n1-highmem-2".to_string(),
        scenario: Scenario::Backoff {
            num_benchmarks: NUM_BACKOFF_BENCHMARKS,
            min_backed_off: MIN_BACKED_OFF,
        },
        ..base_config(builder, name.clone(), name)
    };

    TestCase::new(config)
}

/// Add every case to the builder, including the backoff case if it was asked for.
fn define_matrix(mut builder: HarnessDefinitionBuilder) -> HarnessDefinitionBuilder {
    for node_version in NODE_VERSIONS {
        let case = integration_case(&builder, node_version);
        builder = builder.add_case(case);
    }

    if builder.cli().run_backoff_test {
        let case = backoff_case(&builder);
        builder = builder.add_case(case);
    }

    builder
}

fn main() -> anyhow::Result<()> {
    let cli = init();
    let env = HarnessEnv::from_env()?;
    log::debug!("Using {env:?}");

    anyhow::ensure!(cli.git_ref().commit.is_some(), "--commit must be set");

    let provisioner = match &env.compute_api_url {
        Some(url) => GceClient::with_base_url(url.clone(), &env.access_token)?,
        None => GceClient::new(&env.access_token)?,
    };
    let querier = match &env.profiler_api_url {
        Some(url) => ProfilerClient::with_base_url(url.clone(), &env.access_token)?,
        None => ProfilerClient::new(&env.access_token)?,
    };
    let template =
        ScriptTemplate::from_toml(STARTUP_TEMPLATE).context("Invalid built-in startup template")?;

    let builder = HarnessDefinitionBuilder::new(env!("CARGO_PKG_NAME"), cli)
        .with_default_repo(DEFAULT_REPO)
        .with_template(template)
        .with_location(&env.project_id, &env.zone)
        .with_provisioner(Arc::new(provisioner))
        .with_querier(Arc::new(querier));

    let outcome = run(define_matrix(builder))?;

    let failed = outcome.failed_cases().count();
    if failed > 0 {
        anyhow::bail!(
            "{failed} of {} test cases failed in run {}",
            outcome.reports.len(),
            outcome.run_id
        );
    }

    Ok(())
}
