use anyhow::Context;
use std::fmt::{Debug, Formatter};
use url::Url;

pub const PROJECT_ID_VAR: &str = "GCLOUD_TESTS_NODEJS_PROJECT_ID";
pub const ZONE_VAR: &str = "GCLOUD_TESTS_NODEJS_ZONE";
pub const ACCESS_TOKEN_VAR: &str = "GCLOUD_TESTS_ACCESS_TOKEN";
pub const PROFILER_API_URL_VAR: &str = "PROFILER_API_URL";
pub const COMPUTE_API_URL_VAR: &str = "COMPUTE_API_URL";

/// Settings read from the environment once at startup.
///
/// These are shared read-only by every case.
#[derive(Clone)]
pub struct HarnessEnv {
    pub project_id: String,
    pub zone: String,
    /// Bearer token for both the compute and the profiler API.
    pub access_token: String,
    /// Overrides the default profiler API endpoint.
    pub profiler_api_url: Option<Url>,
    /// Overrides the default compute API endpoint.
    pub compute_api_url: Option<Url>,
}

impl HarnessEnv {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the settings through `lookup`, which returns the value of a variable if it is set.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let required = |name: &str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .with_context(|| format!("Environment variable {name} must be set"))
        };
        let optional_url = |name: &str| -> anyhow::Result<Option<Url>> {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .map(|v| Url::parse(&v).with_context(|| format!("Invalid URL in {name}: {v}")))
                .transpose()
        };

        Ok(Self {
            project_id: required(PROJECT_ID_VAR)?,
            zone: required(ZONE_VAR)?,
            access_token: required(ACCESS_TOKEN_VAR)?,
            profiler_api_url: optional_url(PROFILER_API_URL_VAR)?,
            compute_api_url: optional_url(COMPUTE_API_URL_VAR)?,
        })
    }
}

impl Debug for HarnessEnv {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HarnessEnv")
            .field("project_id", &self.project_id)
            .field("zone", &self.zone)
            .field("access_token", &"<redacted>")
            .field("profiler_api_url", &self.profiler_api_url)
            .field("compute_api_url", &self.compute_api_url)
            .finish()
    }
}
