//! Display-gateway status codes and their user-facing categories.
//!
//! Graphical-family sessions report failures as `{code, message}` pairs.
//! The numeric code space is owned by the gateway and the mapping below is
//! part of the external contract: codes must map to categories verbatim.
//!
//! Codes outside the table are shown through their message, which the
//! backend base64-encodes because the transport is not safe for non-ASCII
//! text.  The message is decoded before display.  A message that is not
//! valid base64 UTF-8 is shown as received.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use tracing::warn;

/// A failure status raised by the display gateway.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorStatus {
    pub code: u16,
    /// Opaque, base64-encoded text supplied with the status.
    pub message: Option<String>,
}

impl ErrorStatus {
    pub fn new(code: u16, message: Option<String>) -> Self {
        Self { code, message }
    }

    /// Maps this status to its user-facing category.
    pub fn category(&self) -> ErrorCategory {
        ErrorCategory::classify(self)
    }
}

/// User-facing failure categories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ErrorCategory {
    UnsupportedOperation,
    UpstreamServiceFault,
    UpstreamBusy,
    UpstreamConnectTimeout,
    UpstreamProtocolFault,
    ResourceNotFound,
    ResourceConflict,
    ResourceAlreadyClosed,
    UpstreamServiceNotFound,
    UpstreamServiceUnavailable,
    SessionConflict,
    SessionConnectTimeout,
    SessionAlreadyClosed,
    NetworkUnreachable,
    UpstreamCredentialRejected,
    ClientForbidden,
    ClientConnectTimeout,
    ClientFault,
    MalformedRequest,
    TooManyClientConnections,
    SessionNotFound,
    GatewayCreationFailed,
    ForceClosedByAdministrator,
    /// Unmapped code with a message; holds the decoded text.
    Remote(String),
    /// Unmapped code without a message.
    Unknown,
}

impl ErrorCategory {
    /// Returns the fixed category for a mapped status code.
    pub fn from_code(code: u16) -> Option<Self> {
        use ErrorCategory::*;
        let category = match code {
            256 => UnsupportedOperation,
            512 => UpstreamServiceFault,
            513 => UpstreamBusy,
            514 => UpstreamConnectTimeout,
            515 => UpstreamProtocolFault,
            516 => ResourceNotFound,
            517 => ResourceConflict,
            518 => ResourceAlreadyClosed,
            519 => UpstreamServiceNotFound,
            520 => UpstreamServiceUnavailable,
            521 => SessionConflict,
            522 => SessionConnectTimeout,
            523 => SessionAlreadyClosed,
            768 => NetworkUnreachable,
            769 => UpstreamCredentialRejected,
            771 => ClientForbidden,
            776 => ClientConnectTimeout,
            781 => ClientFault,
            783 => MalformedRequest,
            797 => TooManyClientConnections,
            800 => SessionNotFound,
            801 => GatewayCreationFailed,
            802 => ForceClosedByAdministrator,
            _ => return None,
        };
        Some(category)
    }

    /// Classifies a full status, decoding the message for unmapped codes.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use bastion_core::{ErrorCategory, ErrorStatus};
    ///
    /// let status = ErrorStatus::new(800, None);
    /// assert_eq!(ErrorCategory::classify(&status), ErrorCategory::SessionNotFound);
    ///
    /// // "disk full" in base64
    /// let status = ErrorStatus::new(999, Some("ZGlzayBmdWxs".into()));
    /// assert_eq!(
    ///     ErrorCategory::classify(&status),
    ///     ErrorCategory::Remote("disk full".into())
    /// );
    /// ```
    pub fn classify(status: &ErrorStatus) -> Self {
        if let Some(category) = Self::from_code(status.code) {
            return category;
        }
        match status.message.as_deref() {
            Some(message) if !message.is_empty() => ErrorCategory::Remote(decode_message(message)),
            _ => ErrorCategory::Unknown,
        }
    }

    /// Short user-facing description.
    pub fn description(&self) -> &str {
        use ErrorCategory::*;
        match self {
            UnsupportedOperation => "unsupported operation",
            UpstreamServiceFault => "upstream service fault",
            UpstreamBusy => "upstream busy",
            UpstreamConnectTimeout => "upstream connect timeout",
            UpstreamProtocolFault => "upstream protocol fault",
            ResourceNotFound => "resource not found",
            ResourceConflict => "resource conflict",
            ResourceAlreadyClosed => "resource already closed",
            UpstreamServiceNotFound => "upstream service not found",
            UpstreamServiceUnavailable => "upstream service unavailable",
            SessionConflict => "session conflict",
            SessionConnectTimeout => "session connect timeout",
            SessionAlreadyClosed => "session already closed",
            NetworkUnreachable => "network unreachable",
            UpstreamCredentialRejected => "upstream credential rejected",
            ClientForbidden => "client forbidden",
            ClientConnectTimeout => "client connect timeout",
            ClientFault => "client fault",
            MalformedRequest => "malformed request",
            TooManyClientConnections => "too many concurrent client connections",
            SessionNotFound => "session does not exist",
            GatewayCreationFailed => "gateway/tunnel creation failed",
            ForceClosedByAdministrator => "administrator force-closed session",
            Remote(text) => text,
            Unknown => "unknown error",
        }
    }
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.description())
    }
}

fn decode_message(message: &str) -> String {
    match STANDARD
        .decode(message)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
    {
        Some(text) => text,
        None => {
            warn!("gateway status message is not base64 UTF-8; showing it as received");
            message.to_owned()
        }
    }
}
