use crate::RenderError;
use profiler_e2e_core::prelude::{RunConfig, Scenario};
use std::collections::BTreeMap;

/// Every placeholder name a template may use.
pub const KNOWN_PLACEHOLDERS: &[&str] = &[
    "Service",
    "RuntimeVersion",
    "Repo",
    "FetchRef",
    "Commit",
    "FinishString",
    "ErrorString",
    "DurationSec",
    "NumBackoffBenchmarks",
];

/// Values substituted into a template, keyed by placeholder name.
///
/// A known placeholder may have no value, for example `NumBackoffBenchmarks` outside of the
/// backoff scenario. Using it in a template is then a render error.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptParams {
    values: BTreeMap<&'static str, String>,
}

impl ScriptParams {
    /// Collect the values for a test case, failing if anything required is unset.
    pub fn from_run_config(config: &RunConfig) -> Result<Self, RenderError> {
        let required = |field: &'static str, value: &str| {
            if value.trim().is_empty() {
                Err(RenderError::MissingField { field })
            } else {
                Ok(value.to_string())
            }
        };

        let fetch = config
            .git_ref
            .fetch
            .as_ref()
            .ok_or(RenderError::MissingField {
                field: "branch or pull request",
            })?;
        let commit = config
            .git_ref
            .commit
            .as_deref()
            .ok_or(RenderError::MissingField { field: "commit" })?;

        let mut values = BTreeMap::new();
        values.insert("Service", required("service", &config.service)?);
        values.insert(
            "RuntimeVersion",
            required("runtime version", &config.runtime_version)?,
        );
        values.insert("Repo", required("repo", &config.repo)?);
        values.insert("FetchRef", required("branch", &fetch.refspec())?);
        values.insert("Commit", required("commit", commit)?);
        values.insert(
            "FinishString",
            required("finish sentinel", &config.sentinels.finish)?,
        );
        if let Some(error) = &config.sentinels.error {
            values.insert("ErrorString", required("error sentinel", error)?);
        }
        values.insert(
            "DurationSec",
            config.bench_duration.as_secs().to_string(),
        );
        if let Scenario::Backoff { num_benchmarks, .. } = config.scenario {
            values.insert("NumBackoffBenchmarks", num_benchmarks.to_string());
        }

        Ok(Self { values })
    }

    /// Set a value directly.
    pub fn with(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.values.insert(name, value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use profiler_e2e_core::prelude::{GitRef, Sentinels};
    use std::time::Duration;

    pub(crate) fn run_config() -> RunConfig {
        RunConfig {
            run_id: "2024-01-01-00-00-00".to_string(),
            instance_name: "profiler-test-node14".to_string(),
            service: "profiler-test-node14-gce".to_string(),
            runtime_version: "14".to_string(),
            bench_duration: Duration::from_secs(600),
            timeout: Duration::from_secs(25 * 60),
            machine_type: "n1-standard-1".to_string(),
            repo: "https://github.com/example/agent.git".to_string(),
            git_ref: GitRef::from_flags(Some("main".to_string()), None, Some("abc123".to_string())),
            sentinels: Sentinels::default(),
            scenario: Scenario::Integration,
        }
    }

    #[test]
    fn collect_values() {
        let params = ScriptParams::from_run_config(&run_config()).expect("valid config");

        assert_eq!(Some("main"), params.get("FetchRef"));
        assert_eq!(Some("abc123"), params.get("Commit"));
        assert_eq!(Some("600"), params.get("DurationSec"));
        assert_eq!(None, params.get("NumBackoffBenchmarks"));
    }

    #[test]
    fn missing_commit_is_an_error() {
        let mut config = run_config();
        config.git_ref.commit = None;

        assert_eq!(
            RenderError::MissingField { field: "commit" },
            ScriptParams::from_run_config(&config).unwrap_err()
        );
    }

    #[test]
    fn missing_branch_and_pr_is_an_error() {
        let mut config = run_config();
        config.git_ref.fetch = None;

        assert!(matches!(
            ScriptParams::from_run_config(&config),
            Err(RenderError::MissingField { .. })
        ));
    }

    #[test]
    fn blank_service_is_an_error() {
        let mut config = run_config();
        config.service = "  ".to_string();

        assert_eq!(
            RenderError::MissingField { field: "service" },
            ScriptParams::from_run_config(&config).unwrap_err()
        );
    }

    #[test]
    fn backoff_sets_benchmark_count() {
        let mut config = run_config();
        config.scenario = Scenario::Backoff {
            num_benchmarks: 45,
            min_backed_off: 1,
        };

        let params = ScriptParams::from_run_config(&config).expect("valid config");
        assert_eq!(Some("45"), params.get("NumBackoffBenchmarks"));
    }
}
