use crate::document::{
    FunctionTable, InvalidProfile, ProfileDocument, StructuredProfile, SummarizedProfile,
};
use crate::pprof;
use base64::Engine;
use flate2::read::GzDecoder;
use prost::Message;
use serde::Deserialize;
use std::io::Read;

const GZIP_MAGIC: [u8; 2] = [0x1f, 0x8b];

#[derive(Debug, thiserror::Error)]
pub enum ResponseError {
    #[error("response is not valid JSON")]
    Json(#[from] serde_json::Error),
    /// The backend has not received any data for the query. Kept apart from the decode
    /// failures so that callers can tell "nothing arrived" from "garbage arrived".
    #[error("response contains {num_profiles} profiles and {deployments} deployments")]
    Empty {
        num_profiles: i64,
        deployments: usize,
    },
    #[error("response has neither a function table nor profile bytes")]
    UnknownShape,
    #[error("invalid function table: {0}")]
    FunctionTable(String),
    #[error("profile bytes are not valid base64")]
    Base64(#[from] base64::DecodeError),
    #[error("failed to decompress profile bytes")]
    Gzip(#[source] std::io::Error),
    #[error("failed to decode profile bytes")]
    Protobuf(#[from] prost::DecodeError),
    #[error("invalid profile")]
    InvalidProfile(#[from] InvalidProfile),
}

impl ResponseError {
    pub fn is_empty_result(&self) -> bool {
        matches!(self, ResponseError::Empty { .. })
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawResponse {
    #[serde(default)]
    profile: Option<RawSummary>,
    #[serde(default)]
    profile_bytes: Option<String>,
    #[serde(default, deserialize_with = "number_or_string")]
    num_profiles: i64,
    #[serde(default)]
    deployments: Vec<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawSummary {
    #[serde(default)]
    samples: Vec<i64>,
    #[serde(default)]
    default_metric_type: String,
    #[serde(default)]
    functions: Option<RawFunctions>,
    #[serde(default)]
    source_files: RawSourceFiles,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawFunctions {
    #[serde(default)]
    name: Vec<String>,
    #[serde(default)]
    source_file: Vec<i64>,
}

#[derive(Debug, Default, Deserialize)]
struct RawSourceFiles {
    #[serde(default)]
    name: Vec<String>,
}

/// The JSON mapping of protobuf encodes 64 bit integers as strings, older responses use plain
/// numbers.
fn number_or_string<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: serde::Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum NumberOrString {
        Number(i64),
        String(String),
    }

    match NumberOrString::deserialize(deserializer)? {
        NumberOrString::Number(n) => Ok(n),
        NumberOrString::String(s) => s.parse().map_err(serde::de::Error::custom),
    }
}

/// Parse the body of a profile query response.
///
/// A response with no profiles or no deployments is an [ResponseError::Empty] regardless of
/// which shape it has. Raw profile bytes take precedence over a function table when both are
/// present.
pub fn parse_query_response(body: &[u8]) -> Result<ProfileDocument, ResponseError> {
    let raw: RawResponse = serde_json::from_slice(body)?;

    if raw.num_profiles <= 0 || raw.deployments.is_empty() {
        return Err(ResponseError::Empty {
            num_profiles: raw.num_profiles,
            deployments: raw.deployments.len(),
        });
    }

    if let Some(encoded) = raw.profile_bytes.filter(|b| !b.is_empty()) {
        log::trace!("Decoding {} bytes of encoded profile", encoded.len());
        return decode_profile_bytes(&encoded).map(ProfileDocument::Structured);
    }

    match raw.profile {
        Some(RawSummary {
            samples,
            default_metric_type,
            functions: Some(functions),
            source_files,
        }) => Ok(ProfileDocument::Summarized(summarize(
            samples,
            default_metric_type,
            functions,
            source_files,
        )?)),
        _ => Err(ResponseError::UnknownShape),
    }
}

fn summarize(
    samples: Vec<i64>,
    default_metric_type: String,
    functions: RawFunctions,
    source_files: RawSourceFiles,
) -> Result<SummarizedProfile, ResponseError> {
    if functions.source_file.len() > functions.name.len() {
        return Err(ResponseError::FunctionTable(format!(
            "{} source file references for {} functions",
            functions.source_file.len(),
            functions.name.len()
        )));
    }

    let source_file_indices = functions
        .source_file
        .iter()
        .map(|index| {
            usize::try_from(*index)
                .ok()
                .filter(|i| *i < source_files.name.len())
                .ok_or_else(|| {
                    ResponseError::FunctionTable(format!(
                        "source file index {index} out of range for {} source files",
                        source_files.name.len()
                    ))
                })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(SummarizedProfile {
        default_metric_type,
        samples,
        functions: FunctionTable {
            names: functions.name,
            source_files: source_file_indices,
        },
        source_files: source_files.name,
    })
}

fn decode_profile_bytes(encoded: &str) -> Result<StructuredProfile, ResponseError> {
    let bytes = base64::engine::general_purpose::STANDARD.decode(encoded)?;

    let bytes = if bytes.starts_with(&GZIP_MAGIC) {
        let mut decompressed = Vec::new();
        GzDecoder::new(bytes.as_slice())
            .read_to_end(&mut decompressed)
            .map_err(ResponseError::Gzip)?;
        decompressed
    } else {
        bytes
    };

    let profile = pprof::Profile::decode(bytes.as_slice())?;
    Ok(StructuredProfile::from_pprof(&profile)?)
}
