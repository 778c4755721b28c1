use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use profiler_e2e_profile_model::prelude::{parse_query_response, ProfileDocument};
use profiler_e2e_runner::prelude::*;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

const TEMPLATE: &str = r#"
[sections]
integration = '''
GAE_SERVICE={{ Service }} node busybench.js {{ DurationSec }} && echo "{{ FinishString }}"
'''
integration_backoff = '''
for (( i = 0; i < {{ NumBackoffBenchmarks }}; i++ )); do echo "{{ FinishString }}"; done
'''
"#;

const SUMMARIZED_RESPONSE: &str = r#"{
  "profile": {
    "functions": {
      "name": ["(root)", "benchmark", "busyLoop"],
      "sourceFile": [0, 1, 1]
    },
    "sourceFiles": {"name": ["", "busybench.ts"]},
    "samples": [1, 2, 3]
  },
  "numProfiles": 3,
  "deployments": [{"target": "svc"}]
}"#;

const EMPTY_RESPONSE: &str = r#"{"numProfiles": 0, "deployments": []}"#;

const FINISH: &str = "benchmark application(s) complete";

/// A provisioner whose instances print a scripted sequence of console outputs, one per read.
#[derive(Default)]
struct FakeProvisioner {
    outputs: HashMap<String, Vec<String>>,
    reads: Mutex<HashMap<String, usize>>,
    reject_create: Vec<String>,
    created: Mutex<Vec<String>>,
    deleted: Mutex<Vec<String>>,
}

impl FakeProvisioner {
    fn with_output(mut self, instance: &str, chunks: &[&str]) -> Self {
        self.outputs.insert(
            instance.to_string(),
            chunks.iter().map(|c| c.to_string()).collect(),
        );
        self
    }

    fn deleted(&self, instance: &str) -> usize {
        self.deleted.lock().iter().filter(|d| *d == instance).count()
    }
}

#[async_trait::async_trait]
impl Provisioner for FakeProvisioner {
    async fn create(&self, spec: &InstanceSpec) -> Result<InstanceHandle, ProvisioningError> {
        if self.reject_create.contains(&spec.name) {
            return Err(ProvisioningError::Rejected {
                instance: spec.name.clone(),
                status: 403,
                body: "QUOTA_EXCEEDED".to_string(),
            });
        }
        assert!(
            spec.startup_script.contains(FINISH),
            "startup script should be rendered: {}",
            spec.startup_script
        );
        self.created.lock().push(spec.name.clone());
        Ok(spec.handle())
    }

    async fn delete(&self, handle: &InstanceHandle) -> Result<(), ProvisioningError> {
        self.deleted.lock().push(handle.name.clone());
        Ok(())
    }

    async fn read_latest_output(&self, handle: &InstanceHandle) -> Result<String, FetchError> {
        let chunks = self.outputs.get(&handle.name).cloned().unwrap_or_default();
        let mut reads = self.reads.lock();
        let read = reads.entry(handle.name.clone()).or_default();
        let output = chunks
            .get(*read)
            .or(chunks.last())
            .cloned()
            .unwrap_or_default();
        *read += 1;
        Ok(output)
    }
}

/// A querier which answers every query for a profile type with the same canned response.
#[derive(Default)]
struct FakeQuerier {
    responses: HashMap<ProfileType, &'static str>,
    panic_on_query: bool,
    queries: Mutex<Vec<ProfileQuery>>,
}

impl FakeQuerier {
    fn answering(responses: &[(ProfileType, &'static str)]) -> Self {
        Self {
            responses: responses.iter().copied().collect(),
            ..Default::default()
        }
    }
}

#[async_trait::async_trait]
impl ProfileQuerier for FakeQuerier {
    async fn query(&self, query: &ProfileQuery) -> Result<ProfileDocument, QueryError> {
        self.queries.lock().push(query.clone());
        if self.panic_on_query {
            panic!("querier exploded");
        }
        let response = self
            .responses
            .get(&query.profile_type)
            .copied()
            .unwrap_or(EMPTY_RESPONSE);
        Ok(parse_query_response(response.as_bytes())?)
    }
}

fn sample_cli_cfg() -> HarnessCli {
    HarnessCli {
        repo: None,
        branch: Some("main".to_string()),
        pr: None,
        commit: Some("abc123".to_string()),
        run_backoff_test: false,
        no_progress: true,
        summary_path: None,
        template: None,
        poll_interval_s: 20,
    }
}

fn integration_case(builder: &HarnessDefinitionBuilder, version: &str) -> TestCase {
    let config = RunConfig {
        run_id: builder.run_id().to_string(),
        instance_name: format!("profiler-test-node{version}-{}", builder.run_id()),
        service: format!("profiler-test-node{version}-{}-gce", builder.run_id()),
        runtime_version: version.to_string(),
        bench_duration: Duration::from_secs(600),
        timeout: Duration::from_secs(25 * 60),
        machine_type: "n1-standard-1".to_string(),
        repo: builder.repo(),
        git_ref: builder.git_ref(),
        sentinels: Sentinels::default(),
        scenario: Scenario::Integration,
    };
    TestCase::new(config)
        .expect(ExpectedProfile::function(ProfileType::Wall, "busyLoop").in_file("busybench.ts"))
        .expect(ExpectedProfile::function(ProfileType::Heap, "benchmark").in_file("busybench.ts"))
}

fn builder(name: &str) -> HarnessDefinitionBuilder {
    HarnessDefinitionBuilder::new(name, sample_cli_cfg())
        .with_run_id("test-run")
        .with_default_repo("https://github.com/example/agent.git")
        .with_location("proj", "us-east1-b")
        .with_template(ScriptTemplate::from_toml(TEMPLATE).expect("Failed to parse template"))
}

async fn run_with(
    builder: HarnessDefinitionBuilder,
    provisioner: Arc<FakeProvisioner>,
    querier: Arc<FakeQuerier>,
) -> RunOutcome {
    let definition = builder
        .with_provisioner(provisioner)
        .with_querier(querier)
        .build()
        .expect("Failed to build definition");
    run_definition(definition, ShutdownHandle::new()).await
}

#[tokio::test(start_paused = true)]
async fn complete_and_check_profiles() {
    let provisioner = Arc::new(FakeProvisioner::default().with_output(
        "profiler-test-node14-test-run",
        &["booting...", "installing...", FINISH],
    ));
    let querier = Arc::new(FakeQuerier::answering(&[
        (ProfileType::Wall, SUMMARIZED_RESPONSE),
        (ProfileType::Heap, SUMMARIZED_RESPONSE),
    ]));
    let builder = builder("complete_and_check_profiles");
    let case = integration_case(&builder, "14");

    let outcome = run_with(builder.add_case(case), provisioner.clone(), querier.clone()).await;

    assert!(outcome.passed(), "{:?}", outcome.reports);
    assert_eq!(1, provisioner.deleted("profiler-test-node14-test-run"));
    assert_eq!(3, provisioner.reads.lock()["profiler-test-node14-test-run"]);

    let queries = querier.queries.lock();
    assert_eq!(2, queries.len());
    assert!(queries.iter().all(|q| q.zone.as_deref() == Some("us-east1-b")));
    assert!(queries
        .iter()
        .all(|q| q.target == "profiler-test-node14-test-run-gce"));
}

#[tokio::test(start_paused = true)]
async fn timeout_still_deletes_once() {
    let provisioner = Arc::new(FakeProvisioner::default().with_output(
        "profiler-test-node14-test-run",
        &["booting...", "installing..."],
    ));
    let querier = Arc::new(FakeQuerier::default());
    let builder = builder("timeout_still_deletes_once");
    let mut case = integration_case(&builder, "14");
    case.config.timeout = Duration::from_secs(5 * 60);

    let outcome = run_with(builder.add_case(case), provisioner.clone(), querier.clone()).await;

    let report = &outcome.reports[0];
    assert_eq!(
        vec![CaseFailure::Timeout {
            waited: Duration::from_secs(5 * 60)
        }],
        report.failures
    );
    assert_eq!(1, provisioner.deleted("profiler-test-node14-test-run"));
    assert!(querier.queries.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn remote_failure_skips_queries() {
    let provisioner = Arc::new(FakeProvisioner::default().with_output(
        "profiler-test-node14-test-run",
        &["booting...", "npm ERR!\nfailed to set up or run the benchmark"],
    ));
    let querier = Arc::new(FakeQuerier::default());
    let builder = builder("remote_failure_skips_queries");
    let case = integration_case(&builder, "14");

    let outcome = run_with(builder.add_case(case), provisioner.clone(), querier.clone()).await;

    assert_eq!(
        vec![CaseFailure::RemoteFailure {
            sentinel: "failed to set up or run the benchmark".to_string()
        }],
        outcome.reports[0].failures
    );
    assert_eq!(1, provisioner.deleted("profiler-test-node14-test-run"));
    assert!(querier.queries.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn every_expected_profile_is_checked() {
    let provisioner = Arc::new(
        FakeProvisioner::default().with_output("profiler-test-node12-test-run", &[FINISH]),
    );
    // No WALL profiles were uploaded, the HEAP check must still run.
    let querier = Arc::new(FakeQuerier::answering(&[(
        ProfileType::Heap,
        SUMMARIZED_RESPONSE,
    )]));
    let builder = builder("every_expected_profile_is_checked");
    let case = integration_case(&builder, "12")
        .expect(ExpectedProfile::function(ProfileType::Heap, "missingFunction"));

    let outcome = run_with(builder.add_case(case), provisioner.clone(), querier.clone()).await;

    let report = &outcome.reports[0];
    assert_eq!(
        vec!["query", "assertion"],
        report.failures.iter().map(CaseFailure::kind).collect::<Vec<_>>()
    );
    assert!(
        report.failures[0].to_string().contains("0 profiles"),
        "{}",
        report.failures[0]
    );
    assert_eq!(3, querier.queries.lock().len());
    assert_eq!(1, provisioner.deleted("profiler-test-node12-test-run"));
}

#[tokio::test(start_paused = true)]
async fn rejected_create_deletes_nothing() {
    let provisioner = Arc::new(FakeProvisioner {
        reject_create: vec!["profiler-test-node10-test-run".to_string()],
        ..Default::default()
    });
    let querier = Arc::new(FakeQuerier::default());
    let builder = builder("rejected_create_deletes_nothing");
    let case = integration_case(&builder, "10");

    let outcome = run_with(builder.add_case(case), provisioner.clone(), querier).await;

    assert!(outcome.reports[0].has_failure_kind("provisioning"));
    assert!(provisioner.deleted.lock().is_empty());
}

#[tokio::test(start_paused = true)]
async fn panic_after_create_still_deletes() {
    let provisioner = Arc::new(
        FakeProvisioner::default().with_output("profiler-test-node14-test-run", &[FINISH]),
    );
    let querier = Arc::new(FakeQuerier {
        panic_on_query: true,
        ..Default::default()
    });
    let builder = builder("panic_after_create_still_deletes");
    let case = integration_case(&builder, "14");

    let outcome = run_with(builder.add_case(case), provisioner.clone(), querier).await;

    assert!(outcome.reports[0].has_failure_kind("panicked"));
    assert_eq!(1, provisioner.deleted("profiler-test-node14-test-run"));
}

#[tokio::test(start_paused = true)]
async fn cases_are_isolated() {
    let provisioner = Arc::new(
        FakeProvisioner::default()
            .with_output("profiler-test-node10-test-run", &["booting..."])
            .with_output("profiler-test-node12-test-run", &["booting...", FINISH]),
    );
    let querier = Arc::new(FakeQuerier::answering(&[
        (ProfileType::Wall, SUMMARIZED_RESPONSE),
        (ProfileType::Heap, SUMMARIZED_RESPONSE),
    ]));
    let builder = builder("cases_are_isolated");
    let mut slow = integration_case(&builder, "10");
    slow.config.timeout = Duration::from_secs(60);
    let fast = integration_case(&builder, "12");

    let outcome = run_with(
        builder.add_case(slow).add_case(fast),
        provisioner.clone(),
        querier,
    )
    .await;

    assert!(!outcome.passed());
    assert_eq!(
        vec!["profiler-test-node10-test-run"],
        outcome.failed_cases().map(|r| r.name()).collect::<Vec<_>>()
    );
    assert!(outcome.reports[0].has_failure_kind("timeout"));
    assert!(outcome.reports[1].passed());
    assert_eq!(1, provisioner.deleted("profiler-test-node10-test-run"));
    assert_eq!(1, provisioner.deleted("profiler-test-node12-test-run"));
}

#[tokio::test(start_paused = true)]
async fn shutdown_cancels_and_deletes() {
    let provisioner = Arc::new(
        FakeProvisioner::default().with_output("profiler-test-node14-test-run", &["booting..."]),
    );
    let querier = Arc::new(FakeQuerier::default());
    let builder = builder("shutdown_cancels_and_deletes");
    let case = integration_case(&builder, "14");
    let definition = builder
        .add_case(case)
        .with_provisioner(provisioner.clone())
        .with_querier(querier)
        .build()
        .expect("Failed to build definition");

    let shutdown = ShutdownHandle::new();
    let trigger = shutdown.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(90)).await;
        trigger.shutdown();
    });
    let outcome = run_definition(definition, shutdown).await;

    assert_eq!(vec![CaseFailure::Cancelled], outcome.reports[0].failures);
    assert_eq!(1, provisioner.deleted("profiler-test-node14-test-run"));
}

#[tokio::test(start_paused = true)]
async fn backoff_case_checks_console_output() {
    let output = (0..45)
        .flat_map(|i| {
            let mut lines = vec![format!(
                "2024-03-01T12:00:00Z: benchmark {i}: Attempting to create profile"
            )];
            if i % 3 == 0 {
                lines.push(format!(
                    "2024-03-01T12:00:01Z: benchmark {i}: action throttled, backoff for 10m0s"
                ));
                lines.push(format!(
                    "2024-03-01T12:10:01Z: benchmark {i}: Attempting to create profile"
                ));
            }
            lines
        })
        .chain([FINISH.to_string()])
        .collect::<Vec<_>>()
        .join("\n");
    let provisioner = Arc::new(
        FakeProvisioner::default()
            .with_output("profiler-backoff-test-node12-test-run", &["booting...", &output]),
    );
    let querier = Arc::new(FakeQuerier::default());
    let builder = builder("backoff_case_checks_console_output");
    let mut config = integration_case(&builder, "12").config;
    config.instance_name = "profiler-backoff-test-node12-test-run".to_string();
    config.machine_type = "n1-highmem-2".to_string();
    config.scenario = Scenario::Backoff {
        num_benchmarks: 45,
        min_backed_off: 10,
    };

    let outcome = run_with(
        builder.add_case(TestCase::new(config)),
        provisioner.clone(),
        querier.clone(),
    )
    .await;

    assert!(outcome.passed(), "{:?}", outcome.reports);
    assert!(querier.queries.lock().is_empty());
    assert_eq!(1, provisioner.deleted("profiler-backoff-test-node12-test-run"));
}

#[test]
fn duplicate_case_names_are_rejected() {
    let builder = builder("duplicate_case_names_are_rejected");
    let case = integration_case(&builder, "14");

    let result = builder
        .add_case(case.clone())
        .add_case(case)
        .with_provisioner(Arc::new(FakeProvisioner::default()))
        .with_querier(Arc::new(FakeQuerier::default()))
        .build();

    assert!(result.is_err());
}

#[test]
fn missing_template_section_is_rejected() {
    let builder = HarnessDefinitionBuilder::new("missing_template_section", sample_cli_cfg())
        .with_location("proj", "us-east1-b")
        .with_template(
            ScriptTemplate::from_toml("[sections]\nintegration = \"echo\"\n")
                .expect("Failed to parse template"),
        );
    let mut config = integration_case(&builder, "12").config;
    config.scenario = Scenario::Backoff {
        num_benchmarks: 45,
        min_backed_off: 1,
    };

    let result = builder
        .add_case(TestCase::new(config))
        .with_provisioner(Arc::new(FakeProvisioner::default()))
        .with_querier(Arc::new(FakeQuerier::default()))
        .build();

    let err = result.err().expect("build should fail");
    assert!(err.to_string().contains("integration_backoff"), "{err}");
}
