//! Error types for rulegate.

use thiserror::Error;

/// Error type for rulegate operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Malformed or unrecognized MRS container
    #[error("MRS format error: {0}")]
    Format(#[from] FormatError),

    /// ASN validation or resolution failure
    #[error(transparent)]
    Asn(#[from] AsnError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// YAML parsing error
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// No convertor registered for a format id
    #[error("unknown rule-set format: {0}")]
    UnknownFormat(String),

    /// Input is not a rule-set source document
    #[error("invalid rule-set source: {0}")]
    InvalidSource(String),

    /// Behavior cannot be expressed by the target format
    #[error("behavior {behavior} is not supported by {format}")]
    UnsupportedBehavior {
        format: &'static str,
        behavior: String,
    },

    /// Rule-set reference embedding failed
    #[error("embed rule-set references: {0}")]
    Embed(String),

    /// Native codec failure
    #[error("native codec error: {0}")]
    Codec(String),

    /// Remote source fetch failed
    #[error("fetch source: {0}")]
    Fetch(String),

    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// HTTP client construction failed
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Result type alias for rulegate operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error type for MRS container decoding and encoding.
#[derive(Error, Debug)]
pub enum FormatError {
    /// First four bytes are not `MRS\x01`
    #[error("invalid magic bytes: {found:02x?}")]
    InvalidMagic { found: [u8; 4] },

    /// Behavior byte is neither domain nor ipcidr
    #[error("invalid behavior: {0}")]
    InvalidBehavior(u8),

    /// Reserved length field is negative
    #[error("invalid reserved length: {0}")]
    InvalidReservedLength(i64),

    /// Stream ended inside a section
    #[error("unexpected end of stream in {section}")]
    Truncated { section: &'static str },

    /// Payload carries an unknown version byte
    #[error("unsupported {section} version: {version}")]
    UnsupportedPayloadVersion { section: &'static str, version: u8 },

    /// Payload is structurally invalid
    #[error("corrupt {section}: {reason}")]
    Corrupt {
        section: &'static str,
        reason: String,
    },

    /// Compression stream failure
    #[error("zstd stream error: {0}")]
    Compression(#[source] std::io::Error),
}

impl FormatError {
    pub(crate) fn corrupt(section: &'static str, reason: impl Into<String>) -> Self {
        FormatError::Corrupt {
            section,
            reason: reason.into(),
        }
    }

    /// Map a read failure inside `section` to a format error.
    pub(crate) fn from_read(section: &'static str, err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::UnexpectedEof {
            FormatError::Truncated { section }
        } else {
            FormatError::Compression(err)
        }
    }
}

/// Error type for ASN resolution.
#[derive(Error, Debug)]
pub enum AsnError {
    /// Identifier is not a decimal AS number
    #[error("invalid ASN {asn:?}: {reason}")]
    InvalidAsn { asn: String, reason: &'static str },

    /// A provider failed in a way that fallback cannot cover
    #[error("{provider} lookup for AS{asn}: {source}")]
    Provider {
        provider: String,
        asn: String,
        #[source]
        source: ProviderError,
    },

    /// One identifier of a batch failed; `collected` holds what was gathered
    #[error("resolve ASN {asn}: {source}")]
    Resolve {
        asn: String,
        collected: Vec<String>,
        #[source]
        source: Box<AsnError>,
    },

    /// A resolution task panicked or was cancelled
    #[error("resolution task failed: {0}")]
    Task(String),
}

/// Error type for a single registry request.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The request could not be built
    #[error("build request: {0}")]
    Request(String),

    /// Connection or protocol failure
    #[error("transport error: {0}")]
    Transport(#[source] reqwest::Error),

    /// The per-request timeout elapsed
    #[error("request timed out")]
    Timeout,

    /// Non-success HTTP status
    #[error("unexpected HTTP status: {0}")]
    Status(u16),

    /// Response body exceeded the configured limit
    #[error("response body exceeds {limit} bytes")]
    BodyTooLarge { limit: usize },

    /// Body is not the expected JSON envelope
    #[error("decode response: {0}")]
    Decode(String),

    /// Envelope status field is not "ok"
    #[error("API returned status: {0}")]
    ApiStatus(String),
}

impl ProviderError {
    /// Whether fallback to the next provider may cover this failure.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, ProviderError::Request(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncated_from_eof() {
        let err = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(
            FormatError::from_read("magic", err),
            FormatError::Truncated { section: "magic" }
        ));
    }

    #[test]
    fn test_provider_error_recoverable() {
        assert!(ProviderError::Timeout.is_recoverable());
        assert!(ProviderError::Status(503).is_recoverable());
        assert!(ProviderError::ApiStatus("error".into()).is_recoverable());
        assert!(!ProviderError::Request("bad url".into()).is_recoverable());
    }

    #[test]
    fn test_error_messages_carry_context() {
        let err = Error::from(FormatError::InvalidBehavior(7));
        assert_eq!(err.to_string(), "MRS format error: invalid behavior: 7");

        let err = AsnError::InvalidAsn {
            asn: "ASX".into(),
            reason: "not a decimal number",
        };
        assert!(err.to_string().contains("ASX"));
    }
}
