use itertools::Itertools;
use serde::{Deserialize, Serialize};
use sha3::Digest;
use std::collections::BTreeMap;
use std::io::{BufRead, Read, Write};
use std::path::Path;

/// One problem recorded for a case.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct FailureRecord {
    /// Short name of the failure category, for example `timeout` or `assertion`.
    pub kind: String,
    pub message: String,
}

/// Summary of one test case
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct CaseSummary {
    /// The unique run id
    ///
    /// Chosen by the runner and shared by every case of one invocation.
    pub run_id: String,
    /// The name of the instance the case ran on
    pub instance_name: String,
    /// The service name the agent reported profiles under
    pub service: String,
    /// The runtime version installed on the instance
    pub runtime_version: String,
    /// The template section that was rendered for this case
    pub scenario: String,
    /// The machine type of the instance
    pub machine_type: String,
    /// The configured benchmark duration, in seconds
    pub bench_duration_s: u64,
    /// The time the case started
    ///
    /// This is a Unix timestamp in seconds.
    pub started_at: i64,
    /// How long the case took, in seconds
    pub duration_s: f64,
    /// Whether the case passed
    pub passed: bool,
    /// Every failure recorded for the case, in the order they happened
    pub failures: Vec<FailureRecord>,
    /// Set if the instance could not be deleted
    ///
    /// This does not fail the case, but the instance may have leaked.
    pub cleanup_error: Option<String>,
    /// Extra labels set by the scenario, for example the git ref under test
    #[serde(default)]
    pub labels: BTreeMap<String, String>,
    /// The [CaseSummary::fingerprint] of the case, set once the labels are complete
    #[serde(default)]
    pub fingerprint: String,
}

impl CaseSummary {
    /// Add a label
    pub fn add_label(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.labels.insert(key.into(), value.into());
    }

    /// Compute a fingerprint for this case
    ///
    /// The fingerprint identifies the configuration of the case, so that outcomes can be compared
    /// across runs. It uses the
    ///     - Scenario
    ///     - Runtime version
    ///     - Machine type
    ///     - Benchmark duration
    ///     - Labels
    ///
    /// The fingerprint is computed using [sha3::Sha3_256].
    pub fn fingerprint(&self) -> String {
        let mut hasher = sha3::Sha3_256::new();
        Digest::update(&mut hasher, self.scenario.as_bytes());
        Digest::update(&mut hasher, self.runtime_version.as_bytes());
        Digest::update(&mut hasher, self.machine_type.as_bytes());
        Digest::update(&mut hasher, self.bench_duration_s.to_le_bytes());
        self.labels
            .iter()
            .sorted_by_key(|(k, _)| k.to_owned())
            .for_each(|(k, v)| {
                Digest::update(&mut hasher, k.as_bytes());
                Digest::update(&mut hasher, v.as_bytes());
            });

        format!("{:x}", hasher.finalize())
    }
}

/// Append the case summary to a file
///
/// The summary will be serialized to JSON and output as a single line followed by a newline. The
/// recommended file extension is `.jsonl`.
pub fn append_case_summary(case_summary: &CaseSummary, path: &Path) -> anyhow::Result<()> {
    let mut file = std::fs::OpenOptions::new()
        .append(true)
        .create(true)
        .open(path)?;
    store_case_summary(case_summary, &mut file)?;
    file.write_all(b"\n")?;
    Ok(())
}

/// Serialize the case summary to a writer
pub fn store_case_summary<W: Write>(case_summary: &CaseSummary, writer: &mut W) -> anyhow::Result<()> {
    serde_json::to_writer(writer, case_summary)?;
    Ok(())
}

/// Load a case summary from a reader
pub fn load_case_summary<R: Read>(reader: R) -> anyhow::Result<CaseSummary> {
    let reader = std::io::BufReader::new(reader);
    let case_summary: CaseSummary = serde_json::from_reader(reader)?;
    Ok(case_summary)
}

/// Load case summaries from a file
///
/// The file should contain one JSON object per line. This is the format produced by
/// [append_case_summary].
pub fn load_case_summaries(path: &Path) -> anyhow::Result<Vec<CaseSummary>> {
    let file = std::fs::File::open(path)?;
    let reader = std::io::BufReader::new(file);
    let mut cases = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        cases.push(load_case_summary(line.as_bytes())?);
    }
    Ok(cases)
}
