use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use thiserror::Error;

use crate::config::OmniParserConfig;
use crate::perception::types::DetectionElement;

/// Longest slice of offending text attached to a decode failure.
pub const SNIPPET_LIMIT: usize = 300;

/// Image reference accepted by the service: a data URL or a fetchable URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageRef {
    url: String,
}

impl ImageRef {
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

/// Positional model parameters, in the order the procedure expects them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParseParams {
    pub box_threshold: f64,
    pub iou_threshold: f64,
    pub use_secondary_ocr: bool,
    pub image_size: u32,
}

impl ParseParams {
    pub fn from_config(cfg: &OmniParserConfig) -> Self {
        Self {
            box_threshold: cfg.box_threshold,
            iou_threshold: cfg.iou_threshold,
            use_secondary_ocr: cfg.use_secondary_ocr,
            image_size: cfg.image_size,
        }
    }
}

impl Default for ParseParams {
    fn default() -> Self {
        Self::from_config(&OmniParserConfig::default())
    }
}

/// A single parse job. Immutable once built.
#[derive(Debug, Clone, PartialEq)]
pub struct JobRequest {
    image: ImageRef,
    params: ParseParams,
}

impl JobRequest {
    pub fn new(image: ImageRef, params: ParseParams) -> Self {
        Self { image, params }
    }

    pub fn image(&self) -> &ImageRef {
        &self.image
    }

    pub fn params(&self) -> &ParseParams {
        &self.params
    }

    /// `{"data": [image, box_threshold, iou_threshold, use_secondary_ocr, image_size]}`
    pub fn to_call_body(&self) -> Value {
        json!({
            "data": [
                &self.image,
                self.params.box_threshold,
                self.params.iou_threshold,
                self.params.use_secondary_ocr,
                self.params.image_size,
            ]
        })
    }
}

/// Identifier the service returns on submission. Not `Clone`: a handle belongs
/// to exactly one job run.
#[derive(Debug, PartialEq, Eq)]
pub struct JobHandle(String);

impl JobHandle {
    pub(crate) fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One `data: ` line of a poll response body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventFrame<'a> {
    /// The `null` sentinel: no result yet.
    NoData,
    Payload(&'a str),
}

/// Outer result array. Index 0 is the marked-up image reference, index 1 the
/// element list, either inline or as a JSON-encoded string.
#[derive(Debug, Clone, PartialEq)]
pub struct RawResult {
    pub marked_image: Value,
    pub element_list: Value,
}

impl RawResult {
    /// Where the marked-up image can be found: `url`, then `path`, or a bare string.
    pub fn marked_image_location(&self) -> Option<&str> {
        match &self.marked_image {
            Value::String(s) => Some(s.as_str()),
            Value::Object(map) => map
                .get("url")
                .and_then(Value::as_str)
                .or_else(|| map.get("path").and_then(Value::as_str)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
#[error("{message}; offending text: {snippet:?}")]
pub struct DecodeFailure {
    pub message: String,
    pub snippet: String,
}

impl DecodeFailure {
    pub fn new(message: impl Into<String>, offending: &str) -> Self {
        Self {
            message: message.into(),
            snippet: snippet(offending),
        }
    }
}

/// First `SNIPPET_LIMIT` characters of `text`, for diagnostics.
pub fn snippet(text: &str) -> String {
    text.chars().take(SNIPPET_LIMIT).collect()
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("no response within {timeout_ms} ms")]
    Timeout { timeout_ms: u64 },

    #[error("unexpected status {status}: {body}")]
    Status { status: u16, body: String },
}

#[derive(Debug, Error)]
pub enum JobFailure {
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("decode error: {0}")]
    Decode(#[from] DecodeFailure),
}

/// Result of evaluating one poll response, and of a whole job run.
///
/// `RemoteJobClient::run_job` only ever returns the terminal variants.
#[derive(Debug)]
pub enum PollOutcome {
    Pending,
    Succeeded(Vec<DetectionElement>),
    Failed(JobFailure),
    /// Attempt ceiling reached with no result. `last_error` holds the most
    /// recent absorbed fetch error, if any.
    TimedOut {
        attempts: u32,
        last_error: Option<String>,
    },
    /// The caller's stop flag was raised at an attempt boundary.
    Cancelled { attempts: u32 },
}

impl PollOutcome {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, PollOutcome::Pending)
    }

    pub fn elements(&self) -> Option<&[DetectionElement]> {
        match self {
            PollOutcome::Succeeded(elements) => Some(elements),
            _ => None,
        }
    }
}
