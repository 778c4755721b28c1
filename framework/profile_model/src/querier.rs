use crate::document::ProfileDocument;
use crate::response::ResponseError;
use profiler_e2e_core::prelude::{BoxError, ProfileQuery};

#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    #[error("failed to send profile query")]
    Transport(#[source] BoxError),
    #[error("profile query was rejected with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error(transparent)]
    Response(#[from] ResponseError),
}

impl QueryError {
    /// Whether the backend answered but had no profiles for the query.
    pub fn is_empty_result(&self) -> bool {
        matches!(self, QueryError::Response(e) if e.is_empty_result())
    }
}

/// The profiling backend the harness pulls profiles from.
///
/// Implementations do not retry. Shared by all running cases.
#[async_trait::async_trait]
pub trait ProfileQuerier: Send + Sync {
    async fn query(&self, query: &ProfileQuery) -> Result<ProfileDocument, QueryError>;
}
