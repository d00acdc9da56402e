//! Error taxonomy for artifact resolution and validation.
//!
//! Validation-level problems are accumulated as [`PayloadError`] and
//! [`ResponseError`] values and only become an [`Error`] at an explicit
//! assert boundary. Resolution-level problems are raised immediately.

use thiserror::Error;

/// Result type for fallible service provider operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Transient network faults that qualify for the single automatic retry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NetworkFaultKind {
    /// Connection refused or reset by the peer.
    ConnectionReset,
    /// Connect or read timeout.
    Timeout,
    /// The HTTP response could not be read or decoded.
    MalformedHttp,
    /// Any other I/O error raised while talking to the IdP.
    Io,
}

impl std::fmt::Display for NetworkFaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NetworkFaultKind::ConnectionReset => write!(f, "connection reset"),
            NetworkFaultKind::Timeout => write!(f, "timeout"),
            NetworkFaultKind::MalformedHttp => write!(f, "malformed HTTP response"),
            NetworkFaultKind::Io => write!(f, "I/O error"),
        }
    }
}

/// Fatal, classified failures handed to the authentication caller.
#[derive(Debug, Error)]
pub enum Error {
    /// The AuthAccess payload failed one or more checks.
    #[error("invalid AuthAccess payload: {messages}")]
    InvalidPayload {
        /// Joined validation messages.
        messages: String,
        /// The raw payload document.
        raw_xml: String,
    },

    /// The IdP returned no response or an unsuccessful one.
    #[error("artifact resolution failed")]
    ArtifactResolutionFailure {
        /// Raw resolution response body, when one was received.
        raw_response: Option<String>,
    },

    /// The resolved SAML response failed trust or freshness checks.
    #[error("SAML response validation failed: {messages}")]
    ResponseValidationFailure {
        /// Joined validation messages.
        messages: String,
        /// The raw SAML response.
        raw_xml: String,
    },

    /// A transient network fault that persisted through the retry.
    #[error("network fault ({kind}): {message}")]
    NetworkFault {
        /// Fault classification.
        kind: NetworkFaultKind,
        /// Underlying error description.
        message: String,
    },

    /// A SAML protocol-level fault raised by the protocol library.
    #[error("SAML protocol fault: {0}")]
    ProtocolFault(String),

    /// A capability that is detected but deliberately unsupported.
    #[error("not implemented: {0}")]
    NotImplemented(&'static str),

    /// The inbound request carries no `SAMLart` parameter.
    #[error("request carries no SAML artifact")]
    MissingArtifact,

    /// Invalid service provider configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Short, stable name for the failure class, used as the notification
    /// event payload and as a log field.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidPayload { .. } => "invalid_payload",
            Self::ArtifactResolutionFailure { .. } => "artifact_resolution_failure",
            Self::ResponseValidationFailure { .. } => "response_validation_failure",
            Self::NetworkFault { .. } => "network_fault",
            Self::ProtocolFault(_) => "protocol_fault",
            Self::NotImplemented(_) => "not_implemented",
            Self::MissingArtifact => "missing_artifact",
            Self::Config(_) => "config",
        }
    }

    /// Raw document attached to the failure, for diagnostics.
    #[must_use]
    pub fn raw_document(&self) -> Option<&str> {
        match self {
            Self::InvalidPayload { raw_xml, .. }
            | Self::ResponseValidationFailure { raw_xml, .. } => Some(raw_xml),
            Self::ArtifactResolutionFailure { raw_response } => raw_response.as_deref(),
            _ => None,
        }
    }
}
