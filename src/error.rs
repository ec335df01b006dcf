//! Result codes and error types shared by every stage of a federated search

use serde::{Serialize, Serializer};
use std::fmt;
use thiserror::Error;

/// Stable outcome codes reported for a whole search and for each directory
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResultCode {
    Success,
    ConnectError,
    IoError,
    InvalidServiceUrl,
    DirectoryNotFoundInConfig,
    UnexpectedHttpStatus(u16),
    ResponseParseError,
    MalformedOrInvalidRequest,
    ConnectTimeout,
    ResponseTimeout,
    UnknownHost,
    NoSearchCriteria,
    NoDirectorySpecified,
    MissingOrInvalidCertificate,
    ConnectionRefused,
    TlsError,
}

impl ResultCode {
    /// Legacy numeric code, kept for log correlation with older deployments
    pub fn as_i32(&self) -> i32 {
        match self {
            ResultCode::Success => 0,
            ResultCode::ConnectError => -1,
            ResultCode::IoError => -2,
            ResultCode::InvalidServiceUrl => -3,
            ResultCode::DirectoryNotFoundInConfig => -4,
            ResultCode::UnexpectedHttpStatus(_) => -5,
            ResultCode::ResponseParseError => -6,
            ResultCode::MalformedOrInvalidRequest => -7,
            ResultCode::ConnectTimeout => -8,
            ResultCode::ResponseTimeout => -9,
            ResultCode::UnknownHost => -10,
            ResultCode::NoSearchCriteria => -11,
            ResultCode::NoDirectorySpecified => -12,
            ResultCode::MissingOrInvalidCertificate => -13,
            ResultCode::ConnectionRefused => -14,
            ResultCode::TlsError => -15,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ResultCode::Success)
    }
}

impl fmt::Display for ResultCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ResultCode::Success => write!(f, "Success"),
            ResultCode::ConnectError => write!(f, "ConnectError"),
            ResultCode::IoError => write!(f, "IOError"),
            ResultCode::InvalidServiceUrl => write!(f, "InvalidServiceURL"),
            ResultCode::DirectoryNotFoundInConfig => write!(f, "DirectoryNotFoundInConfig"),
            ResultCode::UnexpectedHttpStatus(status) => write!(f, "UnexpectedHttpStatus({})", status),
            ResultCode::ResponseParseError => write!(f, "ResponseParseError"),
            ResultCode::MalformedOrInvalidRequest => write!(f, "MalformedOrInvalidRequest"),
            ResultCode::ConnectTimeout => write!(f, "ConnectTimeout"),
            ResultCode::ResponseTimeout => write!(f, "ResponseTimeout"),
            ResultCode::UnknownHost => write!(f, "UnknownHost"),
            ResultCode::NoSearchCriteria => write!(f, "NoSearchCriteria"),
            ResultCode::NoDirectorySpecified => write!(f, "NoDirectorySpecified"),
            ResultCode::MissingOrInvalidCertificate => write!(f, "MissingOrInvalidCertificate"),
            ResultCode::ConnectionRefused => write!(f, "ConnectionRefused"),
            ResultCode::TlsError => write!(f, "TLSError"),
        }
    }
}

impl Serialize for ResultCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// Errors raised while searching a directory.
///
/// The engine turns these into a directory-scoped outcome. The one exception
/// is [`HpdError::Contract`] raised by the caller's own criteria, which is
/// returned as `Err` before any directory is contacted.
#[derive(Debug, Error)]
pub enum HpdError {
    #[error("HPD call failed due to a ServiceUnavailable response (HTTP-503)")]
    ServiceUnavailable,

    #[error("HPD call failed due to missing or invalid authorization credentials (HTTP-401)")]
    Unauthorized,

    #[error("HPD call failed due to Unsupported Media Type (HTTP-415)")]
    UnsupportedMediaType,

    #[error("HPD call failed with an unexpected HTTP status (HTTP-{0})")]
    UnexpectedStatus(u16),

    #[error("The DSML request that was submitted was malformed")]
    MalformedRequest,

    #[error("Unexpected DSML error type encountered. Type={0}")]
    UnexpectedErrorType(String),

    #[error("Invalid service URL '{0}'")]
    InvalidServiceUrl(String),

    #[error("Timed out connecting to {0}")]
    ConnectTimeout(String),

    #[error("Timed out waiting for a response from {0}")]
    ResponseTimeout(String),

    #[error("Unknown host for {0}")]
    UnknownHost(String),

    #[error("Connection refused by {0}")]
    ConnectionRefused(String),

    #[error("Failed to connect to {url}: {message}")]
    Connect { url: String, message: String },

    #[error("Missing or invalid certificate: {0}")]
    Certificate(String),

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Failed to parse directory response: {0}")]
    ResponseParse(String),

    #[error("No HPD instance found for Id '{0}'")]
    DirectoryNotFound(String),

    #[error("HPD instance '{0}' is inactive")]
    DirectoryInactive(String),

    #[error("No search criteria specified")]
    NoSearchCriteria,

    #[error("No directory specified")]
    NoDirectorySpecified,

    #[error("Invalid search request: {0}")]
    Contract(String),
}

impl HpdError {
    pub fn code(&self) -> ResultCode {
        match self {
            HpdError::ServiceUnavailable => ResultCode::UnexpectedHttpStatus(503),
            HpdError::Unauthorized => ResultCode::UnexpectedHttpStatus(401),
            HpdError::UnsupportedMediaType => ResultCode::UnexpectedHttpStatus(415),
            HpdError::UnexpectedStatus(status) => ResultCode::UnexpectedHttpStatus(*status),
            HpdError::MalformedRequest | HpdError::UnexpectedErrorType(_) => {
                ResultCode::MalformedOrInvalidRequest
            }
            HpdError::InvalidServiceUrl(_) => ResultCode::InvalidServiceUrl,
            HpdError::ConnectTimeout(_) => ResultCode::ConnectTimeout,
            HpdError::ResponseTimeout(_) => ResultCode::ResponseTimeout,
            HpdError::UnknownHost(_) => ResultCode::UnknownHost,
            HpdError::ConnectionRefused(_) => ResultCode::ConnectionRefused,
            HpdError::Connect { .. } => ResultCode::ConnectError,
            HpdError::Certificate(_) => ResultCode::MissingOrInvalidCertificate,
            HpdError::Tls(_) => ResultCode::TlsError,
            HpdError::Io(_) => ResultCode::IoError,
            HpdError::ResponseParse(_) => ResultCode::ResponseParseError,
            HpdError::DirectoryNotFound(_) | HpdError::DirectoryInactive(_) => {
                ResultCode::DirectoryNotFoundInConfig
            }
            HpdError::NoSearchCriteria => ResultCode::NoSearchCriteria,
            HpdError::NoDirectorySpecified => ResultCode::NoDirectorySpecified,
            // Reaches an outcome only when a later phase query is built from directory data.
            HpdError::Contract(_) => ResultCode::MalformedOrInvalidRequest,
        }
    }

    pub fn contract(message: impl Into<String>) -> Self {
        HpdError::Contract(message.into())
    }
}

/// Per-entry classification failures. The classifier logs and skips these.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EntryError {
    #[error("entry '{0}' is not a provider or organization")]
    NotAnEntity(String),

    #[error("entry '{0}' has no usable uid")]
    MissingUid(String),

    #[error("entry '{dn}' is missing required attribute {attribute}")]
    MissingReference { dn: String, attribute: &'static str },
}
