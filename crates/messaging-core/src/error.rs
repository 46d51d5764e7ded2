use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::TransferState;

/// An integer value from the lower protocol layer that is outside the
/// closed vocabulary this build understands.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("unknown {domain} code {code}")]
pub struct InvalidCode {
    /// Which enumeration the value failed to parse into.
    pub domain: &'static str,
    pub code: i32,
}

impl InvalidCode {
    pub fn new(domain: &'static str, code: i32) -> Self {
        Self { domain, code }
    }
}

/// Failure of a dispatch hand-off to the transmission layer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DispatchError {
    /// Transport-layer failure; the entry stays queued for a later trigger.
    #[error("transport failure: {0}")]
    Transport(String),
    /// Authorization failure; the entry is marked failed and never retried.
    #[error("not allowed to send: {0}")]
    Security(String),
}

/// Failure to resolve a content reference into a usable handle.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("cannot resolve content '{reference}': {reason}")]
pub struct ResolveError {
    pub reference: String,
    pub reason: String,
}

impl ResolveError {
    pub fn new(reference: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            reference: reference.into(),
            reason: reason.into(),
        }
    }
}

/// Failure to deliver an event to one registered observer.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ObserverError {
    /// The observer endpoint is gone (host runtime reclaimed it).
    #[error("observer disconnected")]
    Disconnected,
    /// The observer failed while handling the event.
    #[error("observer failure: {0}")]
    Delivery(String),
}

/// Errors surfaced by the persistent queue store.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),
    /// A write would violate the monotonic transfer state graph.
    #[error("illegal transfer state transition for '{id}': {from:?} -> {to:?}")]
    IllegalTransition {
        id: String,
        from: TransferState,
        to: TransferState,
    },
    #[error("store backend failure: {0}")]
    Backend(String),
}

/// Stable error code carried by a transfer-error broadcast.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum TransferErrorCode {
    /// Session could not be set up with the peer.
    InitiationFailed,
    /// Invitation declined by the peer.
    InitiationDeclined,
    /// Content upload/download failed mid-flight.
    MediaTransferFailed,
    /// Lower layer reported a failure outside the known set.
    Unexpected,
}

/// Error object delivered to observers when a transfer fails.
#[derive(Debug, Error, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[error("{code:?}: {message}")]
pub struct TransferError {
    pub code: TransferErrorCode,
    pub message: String,
}

impl TransferError {
    pub fn new(code: TransferErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_code_reports_domain_and_value() {
        let err = InvalidCode::new("reason code", 42);
        assert_eq!(err.to_string(), "unknown reason code code 42");
    }

    #[test]
    fn dispatch_error_variants_format_their_cause() {
        let transport = DispatchError::Transport("socket reset".to_owned());
        assert_eq!(transport.to_string(), "transport failure: socket reset");

        let security = DispatchError::Security("blocked by policy".to_owned());
        assert_eq!(security.to_string(), "not allowed to send: blocked by policy");
    }

    #[test]
    fn illegal_transition_names_both_states() {
        let err = StoreError::IllegalTransition {
            id: "ft-1".to_owned(),
            from: TransferState::Transferred,
            to: TransferState::Started,
        };
        assert!(err.to_string().contains("Transferred"));
        assert!(err.to_string().contains("Started"));
    }
}
