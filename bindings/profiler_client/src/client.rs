use crate::request::QueryRequest;
use profiler_e2e_core::prelude::ProfileQuery;
use profiler_e2e_profile_model::prelude::{
    parse_query_response, ProfileDocument, ProfileQuerier, QueryError,
};
use std::time::Duration;
use url::Url;

pub const DEFAULT_PROFILER_API_URL: &str = "https://cloudprofiler.googleapis.com/v2/";

/// Requests taking longer than this are abandoned. Polling callers retry on their own schedule.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(60);
const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, thiserror::Error)]
pub enum ClientBuildError {
    #[error("invalid API URL")]
    Url(#[from] url::ParseError),
    #[error("failed to build HTTP client")]
    Http(#[from] reqwest::Error),
}

/// A [ProfileQuerier] backed by the profiler's `profiles:query` endpoint.
///
/// Errors are returned as they happen, retrying is up to the caller.
#[derive(Clone)]
pub struct ProfilerClient {
    http: reqwest::Client,
    base_url: Url,
    access_token: String,
}

impl ProfilerClient {
    pub fn new(access_token: &str) -> Result<Self, ClientBuildError> {
        Self::with_base_url(Url::parse(DEFAULT_PROFILER_API_URL)?, access_token)
    }

    /// Create a client against a different API root, for example a local fake.
    pub fn with_base_url(base_url: Url, access_token: &str) -> Result<Self, ClientBuildError> {
        Self::with_timeout(base_url, access_token, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(
        mut base_url: Url,
        access_token: &str,
        timeout: Duration,
    ) -> Result<Self, ClientBuildError> {
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(CONNECT_TIMEOUT.min(timeout))
            .build()?;

        Ok(Self {
            http,
            base_url,
            access_token: access_token.to_string(),
        })
    }

    fn query_url(&self, project_id: &str) -> Result<Url, url::ParseError> {
        self.base_url
            .join(&format!("projects/{project_id}/profiles:query"))
    }
}

#[async_trait::async_trait]
impl ProfileQuerier for ProfilerClient {
    async fn query(&self, query: &ProfileQuery) -> Result<ProfileDocument, QueryError> {
        let url = self
            .query_url(&query.project_id)
            .map_err(|e| QueryError::Transport(Box::new(e)))?;
        let request = QueryRequest::from(query);
        log::trace!("Querying {url} with {request:?}");

        let response = self
            .http
            .post(url)
            .bearer_auth(&self.access_token)
            .json(&request)
            .send()
            .await
            .map_err(|e| QueryError::Transport(Box::new(e)))?;

        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|e| QueryError::Transport(Box::new(e)))?;
        if !status.is_success() {
            return Err(QueryError::Status {
                status: status.as_u16(),
                body: String::from_utf8_lossy(&body).into_owned(),
            });
        }

        let doc = parse_query_response(&body)?;
        log::debug!(
            "Query for {} {} profiles of {} returned a {} profile",
            query.project_id,
            query.profile_type,
            query.target,
            doc.shape()
        );
        Ok(doc)
    }
}
