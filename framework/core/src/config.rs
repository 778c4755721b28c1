use std::time::Duration;

/// Which git ref to fetch before resetting to the commit under test.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceFetch {
    /// Fetch a named branch from the origin.
    Branch(String),
    /// Fetch the head of a pull request, `pull/<n>/head`.
    PullRequest(u32),
}

impl SourceFetch {
    /// The refspec source to pass to `git fetch origin`.
    pub fn refspec(&self) -> String {
        match self {
            SourceFetch::Branch(branch) => branch.clone(),
            SourceFetch::PullRequest(pr) => format!("pull/{pr}/head"),
        }
    }
}

/// The source revision of the agent to install on the test instance.
///
/// Both parts are optional here so that the command line can be passed through as-is. The
/// startup script renderer refuses to render when either part is missing.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GitRef {
    pub fetch: Option<SourceFetch>,
    pub commit: Option<String>,
}

impl GitRef {
    /// Build a ref from command line style flags.
    ///
    /// A pull request takes precedence over a branch when both are given. Empty strings and a
    /// pull request number of zero are treated as unset.
    pub fn from_flags(branch: Option<String>, pr: Option<u32>, commit: Option<String>) -> Self {
        let fetch = match (pr.filter(|pr| *pr > 0), branch.filter(|b| !b.is_empty())) {
            (Some(pr), _) => Some(SourceFetch::PullRequest(pr)),
            (None, Some(branch)) => Some(SourceFetch::Branch(branch)),
            (None, None) => None,
        };

        Self {
            fetch,
            commit: commit.filter(|c| !c.is_empty()),
        }
    }
}

/// Substrings written by the startup script to signal the end of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentinels {
    /// Printed once the benchmark has finished.
    pub finish: String,
    /// Printed when any step of the script fails. Not every backend surfaces one.
    pub error: Option<String>,
}

impl Default for Sentinels {
    fn default() -> Self {
        Self {
            finish: "benchmark application(s) complete".to_string(),
            error: Some("failed to set up or run the benchmark".to_string()),
        }
    }
}

/// The kind of workload the startup script runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scenario {
    /// A single benchmark, followed by profile queries.
    Integration,
    /// Many concurrent benchmarks, followed by an analysis of the backoff markers in the
    /// console output.
    Backoff {
        /// How many benchmarks to start on the instance.
        num_benchmarks: usize,
        /// How many of them must have been told to back off for the case to pass.
        min_backed_off: usize,
    },
}

impl Scenario {
    /// Name of the template section which renders this scenario.
    pub fn template_section(&self) -> &'static str {
        match self {
            Scenario::Integration => "integration",
            Scenario::Backoff { .. } => "integration_backoff",
        }
    }

    pub fn is_backoff(&self) -> bool {
        matches!(self, Scenario::Backoff { .. })
    }
}

/// Configuration for a single test case.
///
/// Constructed once per case when the test matrix is defined and never changed afterwards.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunConfig {
    /// Unique id of this harness invocation, shared by all cases.
    pub run_id: String,
    /// Name of the instance to create.
    pub instance_name: String,
    /// Service name the agent reports its profiles under.
    pub service: String,
    /// Version of the runtime to install, for example `"14"`.
    pub runtime_version: String,
    /// How long the benchmark runs for.
    pub bench_duration: Duration,
    /// How long to wait for the finish sentinel before giving up.
    pub timeout: Duration,
    /// Machine type for the instance, for example `n1-standard-1`.
    pub machine_type: String,
    /// Git repository URL of the agent.
    pub repo: String,
    pub git_ref: GitRef,
    pub sentinels: Sentinels,
    pub scenario: Scenario,
}
