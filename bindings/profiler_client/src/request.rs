use chrono::SecondsFormat;
use profiler_e2e_core::prelude::ProfileQuery;
use serde::Serialize;

/// JSON body of a `profiles:query` request.
#[derive(Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub(crate) struct QueryRequest {
    start_time: String,
    end_time: String,
    profile_type: &'static str,
    target: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    deployment_labels: Option<DeploymentLabels>,
    #[serde(rename = "want_profile_bytes", skip_serializing_if = "std::ops::Not::not")]
    want_profile_bytes: bool,
}

#[derive(Debug, Serialize, PartialEq)]
pub(crate) struct DeploymentLabels {
    zone: String,
}

impl From<&ProfileQuery> for QueryRequest {
    fn from(query: &ProfileQuery) -> Self {
        Self {
            start_time: query.start_time.to_rfc3339_opts(SecondsFormat::Secs, true),
            end_time: query.end_time.to_rfc3339_opts(SecondsFormat::Secs, true),
            profile_type: query.profile_type.as_str(),
            target: query.target.clone(),
            deployment_labels: query
                .zone
                .clone()
                .map(|zone| DeploymentLabels { zone }),
            want_profile_bytes: query.want_profile_bytes,
        }
    }
}
