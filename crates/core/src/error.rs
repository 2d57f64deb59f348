// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Closed error taxonomy shared across every component (§7).
//!
//! Unlike the teacher's open-ended `anyhow::Error` use at the process
//! boundary, domain operations here return this closed `Error` enum so the
//! (out-of-scope) HTTP boundary can map kinds to status codes without
//! downcasting.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the seven error kinds named in §7.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    NotFound,
    Conflict,
    Invariant,
    Timeout,
    External,
    Validation,
    TransientIo,
    Cancelled,
}

impl ErrorKind {
    /// The HTTP status an API boundary would map this kind to (§7).
    pub fn http_status(&self) -> u16 {
        match self {
            Self::NotFound => 404,
            Self::Conflict => 409,
            Self::Invariant | Self::Validation => 400,
            Self::External | Self::Timeout => 500,
            Self::Cancelled => 499,
            Self::TransientIo => 503,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::Invariant => "INVARIANT",
            Self::Timeout => "TIMEOUT",
            Self::External => "EXTERNAL",
            Self::Validation => "VALIDATION",
            Self::TransientIo => "TRANSIENT_IO",
            Self::Cancelled => "CANCELLED",
        }
    }

    /// Whether a polling loop should swallow this kind after logging (§7
    /// propagation policy) rather than tearing down the owning supervisor.
    pub fn is_recoverable_in_background(&self) -> bool {
        matches!(self, Self::External | Self::TransientIo)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A domain error: a kind plus a human-readable reason and optional
/// structured context (e.g. the conflicting session id).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Error {
    pub kind: ErrorKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context: Option<serde_json::Value>,
}

impl Error {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self { kind, message: message.into(), context: None }
    }

    pub fn with_context(mut self, context: serde_json::Value) -> Self {
        self.context = Some(context);
        self
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Invariant, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn external(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::External, message)
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    pub fn transient_io(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::TransientIo, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for Error {}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn http_status_maps_expected_kinds() {
        assert_eq!(ErrorKind::NotFound.http_status(), 404);
        assert_eq!(ErrorKind::Conflict.http_status(), 409);
        assert_eq!(ErrorKind::Cancelled.http_status(), 499);
    }

    #[test]
    fn external_and_transient_io_are_background_recoverable() {
        assert!(ErrorKind::External.is_recoverable_in_background());
        assert!(ErrorKind::TransientIo.is_recoverable_in_background());
        assert!(!ErrorKind::Invariant.is_recoverable_in_background());
    }

    #[test]
    fn display_includes_kind_and_message() {
        let err = Error::not_found("ticket abc123 does not exist");
        assert_eq!(err.to_string(), "NOT_FOUND: ticket abc123 does not exist");
    }

    #[test]
    fn with_context_round_trips_through_json() {
        let err = Error::conflict("ticket already in review")
            .with_context(serde_json::json!({"ticket_id": "abc123"}));
        let json = serde_json::to_string(&err).expect("serialize");
        let back: Error = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(back.kind, ErrorKind::Conflict);
        assert_eq!(back.context.unwrap()["ticket_id"], "abc123");
    }
}
