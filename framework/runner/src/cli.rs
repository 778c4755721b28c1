use clap::Parser;
use profiler_e2e_core::prelude::GitRef;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Parser)]
#[command(about, long_about = None)]
pub struct HarnessCli {
    /// The git repository to install the agent from.
    ///
    /// Scenarios usually provide a default, this overrides it.
    #[clap(long)]
    pub repo: Option<String>,

    /// The branch to fetch before resetting to `--commit`. Ignored if `--pr` is set.
    #[clap(long)]
    pub branch: Option<String>,

    /// The pull request to fetch before resetting to `--commit`.
    #[clap(long)]
    pub pr: Option<u32>,

    /// The commit of the agent to test. Required.
    #[clap(long)]
    pub commit: Option<String>,

    /// Also run the long-running backoff scenario.
    #[clap(long, default_value = "false")]
    pub run_backoff_test: bool,

    /// Do not show progress spinners on the CLI.
    ///
    /// This is recommended for CI/CD environments where the spinners aren't being looked at by anyone and are just adding noise to the logs.
    #[clap(long, default_value = "false")]
    pub no_progress: bool,

    /// Append a JSON summary of every case to this file, one line per case.
    #[clap(long)]
    pub summary_path: Option<PathBuf>,

    /// Load the startup script template from this TOML file instead of the built-in one.
    #[clap(long)]
    pub template: Option<PathBuf>,

    /// The number of seconds between two reads of an instance's console output.
    #[clap(long, default_value_t = 20, value_parser = clap::value_parser!(u64).range(1..))]
    pub poll_interval_s: u64,
}

impl HarnessCli {
    /// The source revision to test, as selected by `--branch`, `--pr` and `--commit`.
    pub fn git_ref(&self) -> GitRef {
        GitRef::from_flags(self.branch.clone(), self.pr, self.commit.clone())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use profiler_e2e_core::prelude::SourceFetch;

    #[test]
    fn parse_flags() {
        let cli = HarnessCli::try_parse_from([
            "nodejs_gce",
            "--branch",
            "main",
            "--commit",
            "abc123",
            "--run-backoff-test",
            "--no-progress",
        ])
        .expect("Failed to parse flags");

        assert!(cli.run_backoff_test);
        assert!(cli.no_progress);
        assert_eq!(Duration::from_secs(20), cli.poll_interval());
        assert_eq!(
            GitRef {
                fetch: Some(SourceFetch::Branch("main".to_string())),
                commit: Some("abc123".to_string()),
            },
            cli.git_ref()
        );
    }

    #[test]
    fn pull_request_flag() {
        let cli = HarnessCli::try_parse_from([
            "nodejs_gce",
            "--branch",
            "main",
            "--pr",
            "123",
            "--commit",
            "abc123",
        ])
        .expect("Failed to parse flags");

        assert_eq!(Some(SourceFetch::PullRequest(123)), cli.git_ref().fetch);
    }

    #[test]
    fn reject_zero_poll_interval() {
        assert!(HarnessCli::try_parse_from(["nodejs_gce", "--poll-interval-s", "0"]).is_err());
    }
}
