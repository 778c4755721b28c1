use crate::profile::ProfileType;
use std::time::Duration;

/// A problem found while running one test case.
///
/// Failures are collected for the whole case rather than returned early. The fatal kinds stop
/// the remaining steps of the case, the others are reported alongside each other.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CaseFailure {
    #[error("failed to render startup script: {message}")]
    Render { message: String },
    #[error("failed to provision instance: {message}")]
    Provisioning { message: String },
    #[error("timed out after {waited:?} waiting for the benchmark to finish")]
    Timeout { waited: Duration },
    #[error("the benchmark reported a failure ({sentinel:?})")]
    RemoteFailure { sentinel: String },
    #[error("cancelled by shutdown signal")]
    Cancelled,
    #[error("failed to query {profile_type} profiles: {message}")]
    Query {
        profile_type: ProfileType,
        message: String,
    },
    #[error("{profile_type} profiles: {message}")]
    Assertion {
        profile_type: ProfileType,
        message: String,
    },
    #[error("backoff check failed: {message}")]
    Backoff { message: String },
    #[error("the case panicked: {message}")]
    Panicked { message: String },
}

impl CaseFailure {
    /// Whether this failure stops the rest of the case from running.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            CaseFailure::Render { .. }
                | CaseFailure::Provisioning { .. }
                | CaseFailure::Timeout { .. }
                | CaseFailure::RemoteFailure { .. }
                | CaseFailure::Cancelled
                | CaseFailure::Panicked { .. }
        )
    }

    /// A short stable name for the kind of failure, used in reports.
    pub fn kind(&self) -> &'static str {
        match self {
            CaseFailure::Render { .. } => "render",
            CaseFailure::Provisioning { .. } => "provisioning",
            CaseFailure::Timeout { .. } => "timeout",
            CaseFailure::RemoteFailure { .. } => "remote_failure",
            CaseFailure::Cancelled => "cancelled",
            CaseFailure::Query { .. } => "query",
            CaseFailure::Assertion { .. } => "assertion",
            CaseFailure::Backoff { .. } => "backoff",
            CaseFailure::Panicked { .. } => "panicked",
        }
    }
}
