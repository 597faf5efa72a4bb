use std::collections::BTreeMap;

use mosaic_core::{FilterId, FilterInfo, JobId};
use serde::Deserialize;
use serde_json::Value;

/// Failure of a single remote call. No retries happen at this layer.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// No response: connection refused, DNS, TLS, timeout.
    #[error("network error: {0}")]
    Network(String),
    /// Non-success status with a JSON `{error}` body; the message is verbatim.
    #[error("{message}")]
    Remote { status: u16, message: String },
    /// Non-success status with a body that is not a JSON error envelope.
    #[error("server error {status}")]
    Protocol { status: u16 },
    /// Success status, but the payload did not have the expected shape.
    #[error("unexpected response: {0}")]
    Decode(String),
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: String,
}

/// Classifies a non-success response body.
pub(crate) fn error_from_body(status: u16, body: &str) -> TransportError {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => TransportError::Remote {
            status,
            message: envelope.error,
        },
        Err(_) => TransportError::Protocol { status },
    }
}

/// Upload answer: the issued job id plus the whole payload as a fragment.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadResponse {
    pub job_id: JobId,
    pub fragment: Value,
}

impl UploadResponse {
    pub(crate) fn from_payload(payload: Value) -> Result<Self, TransportError> {
        let job_id = payload
            .get("job_id")
            .and_then(Value::as_str)
            .map(JobId::new)
            .ok_or_else(|| TransportError::Decode("upload response without job_id".into()))?;
        Ok(Self {
            job_id,
            fragment: payload,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct BlockSizeAck {
    #[serde(default)]
    pub block_size: Option<u32>,
    #[serde(default)]
    pub message: Option<String>,
}

/// Result of the one-shot generate endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct LegacyMosaic {
    #[serde(default)]
    pub job_id: Option<JobId>,
    pub simple_mosaic_url: String,
    pub mosaic_url: String,
}

/// Accepts `{filters: {name: displayName}}` or `{filters: [{name, displayName}]}`.
pub(crate) fn parse_filter_catalog(payload: &Value) -> Result<Vec<FilterInfo>, TransportError> {
    match payload.get("filters") {
        Some(Value::Object(entries)) => Ok(entries
            .iter()
            .map(|(name, display)| FilterInfo {
                id: FilterId::new(name.as_str()),
                display_name: display.as_str().unwrap_or(name.as_str()).to_string(),
            })
            .collect()),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                let name = item.get("name").and_then(Value::as_str).ok_or_else(|| {
                    TransportError::Decode("filter entry without name".to_string())
                })?;
                let display = item
                    .get("displayName")
                    .or_else(|| item.get("display_name"))
                    .and_then(Value::as_str)
                    .unwrap_or(name);
                Ok(FilterInfo {
                    id: FilterId::new(name),
                    display_name: display.to_string(),
                })
            })
            .collect(),
        _ => Err(TransportError::Decode("missing filters catalog".to_string())),
    }
}

/// `filter_previews` map of filter name to preview URL.
pub(crate) fn parse_filter_previews(payload: &Value) -> BTreeMap<String, String> {
    payload
        .get("filter_previews")
        .and_then(Value::as_object)
        .map(|previews| {
            previews
                .iter()
                .filter_map(|(name, url)| url.as_str().map(|url| (name.clone(), url.to_string())))
                .collect()
        })
        .unwrap_or_default()
}
