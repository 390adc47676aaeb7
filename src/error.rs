use std::fmt;
use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

/// External service an error originated from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Service {
    Literature,
    Keywords,
    Topics,
}

impl fmt::Display for Service {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Service::Literature => write!(f, "literature"),
            Service::Keywords => write!(f, "keywords"),
            Service::Topics => write!(f, "topics"),
        }
    }
}

#[derive(Debug, Error, Diagnostic)]
pub enum RvarError {
    #[error("no groups given to merge")]
    NoGroups,

    #[error("no source files matched {pattern} for group {group}")]
    #[diagnostic(help("every group directory must contain at least one matching file"))]
    NoSourceFiles { group: String, pattern: String },

    #[error("invalid file pattern: {0}")]
    InvalidPattern(String),

    #[error("header of {path} does not match the first header read")]
    HeaderMismatch { path: PathBuf },

    #[error("conflicting records for key {key}: {existing:?} vs {incoming:?}")]
    MergeConflict {
        key: String,
        existing: Vec<String>,
        incoming: Vec<String>,
    },

    #[error("malformed row {line} in {source_name}: {message}")]
    MalformedRow {
        source_name: String,
        line: u64,
        message: String,
    },

    #[error("invalid resume key: {0}")]
    #[diagnostic(help("expected `entity,group`"))]
    InvalidResumeKey(String),

    #[error("resume key {0} does not match any unit in the input")]
    ResumeKeyNotFound(String),

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("missing credential: {0}")]
    MissingCredential(String),

    #[error("{service} service unavailable: {message}")]
    ServiceUnavailable { service: Service, message: String },

    #[error("{service} service returned status {status}: {message}")]
    ServiceStatus {
        service: Service,
        status: u16,
        message: String,
    },

    #[error("{service} service returned a malformed response: {message}")]
    MalformedResponse { service: Service, message: String },

    #[error("{service} service still failing after {attempts} attempts")]
    RetriesExhausted { service: Service, attempts: u32 },

    #[error("csv error: {0}")]
    Csv(String),

    #[error("filesystem error: {0}")]
    Filesystem(String),
}

impl RvarError {
    /// Network-level failures worth retrying after a backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, RvarError::ServiceUnavailable { .. })
    }

    /// Process exit code: 2 for precondition failures, 3 for service failures, 1 otherwise.
    pub fn exit_code(&self) -> u8 {
        match self {
            RvarError::NoGroups
            | RvarError::NoSourceFiles { .. }
            | RvarError::InvalidResumeKey(_)
            | RvarError::ResumeKeyNotFound(_)
            | RvarError::MissingCredential(_) => 2,
            RvarError::ServiceUnavailable { .. }
            | RvarError::ServiceStatus { .. }
            | RvarError::MalformedResponse { .. }
            | RvarError::RetriesExhausted { .. } => 3,
            _ => 1,
        }
    }

    pub(crate) fn from_reqwest(service: Service, err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() || err.is_request() {
            RvarError::ServiceUnavailable {
                service,
                message: err.to_string(),
            }
        } else if err.is_decode() || err.is_body() {
            RvarError::MalformedResponse {
                service,
                message: err.to_string(),
            }
        } else {
            RvarError::ServiceStatus {
                service,
                status: err.status().map(|s| s.as_u16()).unwrap_or(0),
                message: err.to_string(),
            }
        }
    }

    pub(crate) fn malformed(service: Service, message: impl Into<String>) -> Self {
        RvarError::MalformedResponse {
            service,
            message: message.into(),
        }
    }
}

impl From<csv::Error> for RvarError {
    fn from(err: csv::Error) -> Self {
        RvarError::Csv(err.to_string())
    }
}

/// Turns a non-success response into the matching error; 429 and 5xx count as transient.
pub(crate) fn check_status(
    service: Service,
    response: reqwest::blocking::Response,
) -> Result<reqwest::blocking::Response, RvarError> {
    if response.status().is_success() {
        return Ok(response);
    }
    let status = response.status().as_u16();
    let message = response
        .text()
        .unwrap_or_else(|_| format!("{service} request failed"));
    if is_retryable_status(status) {
        return Err(RvarError::ServiceUnavailable {
            service,
            message: format!("status {status}: {message}"),
        });
    }
    Err(RvarError::ServiceStatus {
        service,
        status,
        message,
    })
}

/// Reads the whole body. A connection lost part way through is transient.
pub(crate) fn read_body(
    service: Service,
    response: reqwest::blocking::Response,
) -> Result<Vec<u8>, RvarError> {
    response
        .bytes()
        .map(|body| body.to_vec())
        .map_err(|err| RvarError::ServiceUnavailable {
            service,
            message: format!("reading response body: {err}"),
        })
}

/// Parses a fully read body as JSON; only a genuine decode failure is malformed.
pub(crate) fn parse_json_body(
    service: Service,
    body: &[u8],
) -> Result<serde_json::Value, RvarError> {
    serde_json::from_slice(body)
        .map_err(|err| RvarError::malformed(service, format!("invalid JSON body: {err}")))
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}
