use chrono::{DateTime, FixedOffset, TimeDelta};
use itertools::Itertools;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};

/// Substrings that identify backoff activity in console output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffMarkers {
    /// Logged by the agent when the backend told it to back off.
    pub throttled: String,
    /// Logged by the agent every time it asks the backend for a new profile.
    pub attempt: String,
    /// Every line of a benchmark is prefixed with `<prefix> <index>:`.
    pub benchmark_prefix: String,
}

impl Default for BackoffMarkers {
    fn default() -> Self {
        Self {
            throttled: "action throttled, backoff".to_string(),
            attempt: "Attempting to create profile".to_string(),
            benchmark_prefix: "benchmark".to_string(),
        }
    }
}

impl BackoffMarkers {
    /// Matches the backoff duration that follows the throttle marker, in the form the agent
    /// logs it: optional hours and minutes, then seconds.
    fn throttle_pattern(&self) -> Result<Regex, regex::Error> {
        Regex::new(&format!(
            r"{} for (?:(\d+)h)?(?:(\d+)m)?(\d+(?:\.\d+)?)s",
            regex::escape(&self.throttled)
        ))
    }
}

/// What was counted in the console output, per benchmark index.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackoffTally {
    pub benchmarks_seen: BTreeSet<usize>,
    pub backed_off: BTreeSet<usize>,
    /// Benchmarks which made their next attempt once the backoff had elapsed.
    pub retried_after_backoff: BTreeSet<usize>,
    /// Benchmarks which made their next attempt before the backoff had elapsed.
    pub retried_early: BTreeSet<usize>,
    pub throttled_lines: usize,
    pub attempt_lines: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BackoffCheckError {
    #[error("no benchmark output found in console output")]
    NoBenchmarkOutput,
    #[error("{backed_off} of {num_benchmarks} benchmarks received a backoff, wanted at least {min_backed_off}")]
    TooFewBackoffs {
        backed_off: usize,
        num_benchmarks: usize,
        min_backed_off: usize,
    },
    #[error("benchmarks {benchmarks:?} attempted to create a profile before their backoff had elapsed")]
    EarlyRetry { benchmarks: Vec<usize> },
    #[error("none of the benchmarks {backed_off:?} that received a backoff attempted to create a profile afterwards")]
    NoRetryAfterBackoff { backed_off: Vec<usize> },
    #[error("invalid throttle marker: {0}")]
    InvalidMarker(String),
}

/// A backoff a benchmark was told to honor. `None` if the time or duration is not in the line.
type PendingBackoff = Option<DateTime<FixedOffset>>;

/// Count backoff markers per benchmark in the full console output.
///
/// Lines are expected to start with an RFC 3339 timestamp followed by `: `. A throttle line
/// carries the backoff duration as `<throttled> for 1h2m3.5s`. The next attempt of the same
/// benchmark is a retry after backoff if it is logged at or after the throttle time plus the
/// duration, and an early retry otherwise. Retries whose timing cannot be read are logged and
/// not counted either way.
pub fn count_backoffs(
    output: &str,
    markers: &BackoffMarkers,
) -> Result<BackoffTally, BackoffCheckError> {
    let throttle_pattern = markers
        .throttle_pattern()
        .map_err(|e| BackoffCheckError::InvalidMarker(e.to_string()))?;
    let mut tally = BackoffTally::default();
    let mut pending = BTreeMap::<usize, PendingBackoff>::new();

    for line in output.lines() {
        let Some(index) = benchmark_index(line, &markers.benchmark_prefix) else {
            continue;
        };
        tally.benchmarks_seen.insert(index);

        if line.contains(&markers.throttled) {
            tally.throttled_lines += 1;
            tally.backed_off.insert(index);
            let backoff_until = line_timestamp(line)
                .zip(backoff_duration(&throttle_pattern, line))
                .map(|(at, backoff)| at + backoff);
            pending.insert(index, backoff_until);
        } else if line.contains(&markers.attempt) {
            tally.attempt_lines += 1;
            let Some(backoff_until) = pending.remove(&index) else {
                continue;
            };
            match backoff_until.zip(line_timestamp(line)) {
                Some((until, at)) if at >= until => {
                    tally.retried_after_backoff.insert(index);
                }
                Some((until, at)) => {
                    log::debug!("Benchmark {index} retried at {at}, its backoff lasted until {until}");
                    tally.retried_early.insert(index);
                }
                None => log::warn!(
                    "Cannot tell whether benchmark {index} waited for its backoff, the timing is missing from: {line}"
                ),
            }
        }
    }

    Ok(tally)
}

/// Check that enough of `num_benchmarks` concurrent benchmarks were told to back off, and that
/// the agents waited for the backoff before trying again.
///
/// The number of benchmarks which get throttled depends on timing, so only a minimum is
/// enforced.
pub fn check_backoffs(
    output: &str,
    num_benchmarks: usize,
    min_backed_off: usize,
    markers: &BackoffMarkers,
) -> Result<BackoffTally, BackoffCheckError> {
    let mut tally = count_backoffs(output, markers)?;

    let unexpected = tally
        .benchmarks_seen
        .iter()
        .filter(|i| **i >= num_benchmarks)
        .copied()
        .collect::<Vec<_>>();
    if !unexpected.is_empty() {
        log::warn!(
            "Ignoring output of benchmarks {} which are out of range for {num_benchmarks} benchmarks",
            unexpected.iter().join(", ")
        );
        for index in unexpected {
            tally.benchmarks_seen.remove(&index);
            tally.backed_off.remove(&index);
            tally.retried_after_backoff.remove(&index);
            tally.retried_early.remove(&index);
        }
    }

    if tally.benchmarks_seen.is_empty() {
        return Err(BackoffCheckError::NoBenchmarkOutput);
    }

    if tally.backed_off.len() < min_backed_off.max(1) {
        return Err(BackoffCheckError::TooFewBackoffs {
            backed_off: tally.backed_off.len(),
            num_benchmarks,
            min_backed_off,
        });
    }

    if !tally.retried_early.is_empty() {
        return Err(BackoffCheckError::EarlyRetry {
            benchmarks: tally.retried_early.iter().copied().collect(),
        });
    }

    if tally.retried_after_backoff.is_empty() {
        return Err(BackoffCheckError::NoRetryAfterBackoff {
            backed_off: tally.backed_off.iter().copied().collect(),
        });
    }

    Ok(tally)
}

/// The timestamp the startup script puts in front of every console line.
fn line_timestamp(line: &str) -> Option<DateTime<FixedOffset>> {
    let (stamp, _) = line.split_once(": ")?;
    DateTime::parse_from_rfc3339(stamp.trim()).ok()
}

/// Parse a backoff such as `33m0s`, `1h2.5s` or `2.5s` from a throttle line.
fn backoff_duration(pattern: &Regex, line: &str) -> Option<TimeDelta> {
    let captures = pattern.captures(line)?;
    let part = |i: usize| captures.get(i).map_or(Ok(0), |m| m.as_str().parse::<i64>());
    let hours = part(1).ok()?;
    let minutes = part(2).ok()?;
    let seconds = captures.get(3)?.as_str().parse::<f64>().ok()?;

    Some(
        TimeDelta::try_hours(hours)?
            + TimeDelta::try_minutes(minutes)?
            + TimeDelta::try_milliseconds((seconds * 1000.0).round() as i64)?,
    )
}

/// Parse the benchmark index from a line containing `<prefix> <index>:`.
fn benchmark_index(line: &str, prefix: &str) -> Option<usize> {
    let needle = format!("{prefix} ");
    line.match_indices(&needle).find_map(|(start, _)| {
        let rest = &line[start + needle.len()..];
        let digits = rest
            .find(|c: char| !c.is_ascii_digit())
            .filter(|end| *end > 0 && rest[*end..].starts_with(':'))?;
        rest[..digits].parse().ok()
    })
}
