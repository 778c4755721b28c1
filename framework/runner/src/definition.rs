use crate::cli::HarnessCli;
use anyhow::Context;
use profiler_e2e_core::prelude::{
    ExpectedProfile, GitRef, ImageFamily, Provisioner, RunConfig, Scenario,
};
use profiler_e2e_profile_model::prelude::{BackoffMarkers, ProfileQuerier};
use startup_script::ScriptTemplate;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// One entry of the test matrix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestCase {
    pub config: RunConfig,
    /// Facts the profiles of this case must contain. Not used by the backoff scenario.
    pub expected: Vec<ExpectedProfile>,
}

impl TestCase {
    pub fn new(config: RunConfig) -> Self {
        Self {
            config,
            expected: Vec::new(),
        }
    }

    pub fn expect(mut self, expected: ExpectedProfile) -> Self {
        self.expected.push(expected);
        self
    }

    pub fn name(&self) -> &str {
        &self.config.instance_name
    }
}

/// The builder for a harness definition.
///
/// Scenarios use this to describe the test matrix and the backends to run it against.
pub struct HarnessDefinitionBuilder {
    /// The name of the scenario.
    ///
    /// Recommended value is `env!("CARGO_PKG_NAME")`.
    name: String,
    cli: HarnessCli,
    run_id: String,
    default_repo: Option<String>,
    template: Option<ScriptTemplate>,
    provisioner: Option<Arc<dyn Provisioner>>,
    querier: Option<Arc<dyn ProfileQuerier>>,
    location: Option<(String, String)>,
    image: ImageFamily,
    backoff_markers: BackoffMarkers,
    cases: Vec<TestCase>,
}

pub struct HarnessDefinition {
    pub name: String,
    pub run_id: String,
    pub project_id: String,
    pub zone: String,
    pub image: ImageFamily,
    pub template: Arc<ScriptTemplate>,
    pub provisioner: Arc<dyn Provisioner>,
    pub querier: Arc<dyn ProfileQuerier>,
    pub backoff_markers: BackoffMarkers,
    pub poll_interval: Duration,
    pub no_progress: bool,
    pub summary_path: Option<PathBuf>,
    pub cases: Vec<TestCase>,
}

impl HarnessDefinitionBuilder {
    /// Initialise a new definition from the scenario name and the parsed command line.
    ///
    /// A fresh run id is created here, get it from [HarnessDefinitionBuilder::run_id] to name
    /// instances and services.
    pub fn new(name: &str, cli: HarnessCli) -> Self {
        Self {
            name: name.to_string(),
            cli,
            run_id: crate::run::new_run_id(),
            default_repo: None,
            template: None,
            provisioner: None,
            querier: None,
            location: None,
            image: ImageFamily::default(),
            backoff_markers: BackoffMarkers::default(),
            cases: Vec::new(),
        }
    }

    pub fn cli(&self) -> &HarnessCli {
        &self.cli
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Replace the generated run id.
    pub fn with_run_id(mut self, run_id: &str) -> Self {
        self.run_id = run_id.to_string();
        self
    }

    /// The repository to use when `--repo` is not given.
    pub fn with_default_repo(mut self, repo: &str) -> Self {
        self.default_repo = Some(repo.to_string());
        self
    }

    /// The agent repository selected by the command line, or the default.
    pub fn repo(&self) -> String {
        self.cli
            .repo
            .clone()
            .or_else(|| self.default_repo.clone())
            .unwrap_or_default()
    }

    pub fn git_ref(&self) -> GitRef {
        self.cli.git_ref()
    }

    /// Set the startup script template. `--template` takes precedence over this.
    pub fn with_template(mut self, template: ScriptTemplate) -> Self {
        self.template = Some(template);
        self
    }

    pub fn with_provisioner(mut self, provisioner: Arc<dyn Provisioner>) -> Self {
        self.provisioner = Some(provisioner);
        self
    }

    pub fn with_querier(mut self, querier: Arc<dyn ProfileQuerier>) -> Self {
        self.querier = Some(querier);
        self
    }

    /// The project and zone to create instances in.
    pub fn with_location(mut self, project_id: &str, zone: &str) -> Self {
        self.location = Some((project_id.to_string(), zone.to_string()));
        self
    }

    pub fn with_image(mut self, image: ImageFamily) -> Self {
        self.image = image;
        self
    }

    pub fn with_backoff_markers(mut self, markers: BackoffMarkers) -> Self {
        self.backoff_markers = markers;
        self
    }

    /// Add a case to the matrix. Instance names must be unique within a run.
    pub fn add_case(mut self, case: TestCase) -> Self {
        self.cases.push(case);
        self
    }

    pub fn cases(&self) -> &[TestCase] {
        &self.cases
    }

    pub fn build(self) -> anyhow::Result<HarnessDefinition> {
        let template = match &self.cli.template {
            Some(path) => ScriptTemplate::load(path)
                .with_context(|| format!("Failed to load template from {}", path.display()))?,
            None => self
                .template
                .context("No startup script template was configured")?,
        };
        let provisioner = self.provisioner.context("No provisioner was configured")?;
        let querier = self.querier.context("No profile querier was configured")?;
        let (project_id, zone) = self
            .location
            .context("No project and zone were configured")?;

        if self.cases.is_empty() {
            anyhow::bail!("Scenario {} defines no test cases", self.name);
        }

        let mut names = HashSet::new();
        for case in &self.cases {
            if !names.insert(case.name()) {
                anyhow::bail!("Test case [{}] is already defined", case.name());
            }
            let section = case.config.scenario.template_section();
            if !template.has_section(section) {
                anyhow::bail!(
                    "Template has no section `{section}` needed by test case [{}]",
                    case.name()
                );
            }
            if case.config.timeout.is_zero() {
                anyhow::bail!("Test case [{}] has a zero timeout", case.name());
            }
            if let Scenario::Backoff { num_benchmarks, .. } = case.config.scenario {
                if num_benchmarks == 0 {
                    anyhow::bail!("Backoff test case [{}] runs no benchmarks", case.name());
                }
            } else if case.expected.is_empty() {
                log::warn!(
                    "Test case [{}] has no expected profiles, only the benchmark run will be checked",
                    case.name()
                );
            }
        }

        Ok(HarnessDefinition {
            name: self.name,
            run_id: self.run_id,
            project_id,
            zone,
            image: self.image,
            template: Arc::new(template),
            provisioner,
            querier,
            backoff_markers: self.backoff_markers,
            poll_interval: self.cli.poll_interval(),
            no_progress: self.cli.no_progress,
            summary_path: self.cli.summary_path.clone(),
            cases: self.cases,
        })
    }
}
