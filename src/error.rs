//! Error taxonomy and the caller-facing result contract.
//!
//! Front-ends (CLI, bot, remote transport) observe core behavior only through
//! `OperationResponse`; how that value is serialized or transported is their
//! concern, not the core's.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::quality::QualityVerdict;

/// Machine-readable error codes for every terminal outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Error)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// One discovery source failed. Recoverable: triggers fallback.
    #[error("source_unavailable")]
    SourceUnavailable,
    /// Discovery produced zero usable results. Reported, not fatal.
    #[error("no_candidates")]
    NoCandidates,
    /// No metadata match upstream for the requested title/identifiers.
    #[error("not_found")]
    NotFound,
    /// The title is already in the library. Never overridable.
    #[error("already_exists")]
    AlreadyExists,
    /// Quality gate rejection. Overridable only via explicit force.
    #[error("quality_too_low")]
    QualityTooLow,
    /// The downstream API rejected the request or was unreachable.
    #[error("add_failed")]
    AddFailed,
    /// Caller supplied neither a title nor any identifier.
    #[error("missing_identifier")]
    MissingIdentifier,
}

/// Structured response returned to every front-end for one operation.
#[derive(Debug, Clone, Serialize)]
pub struct OperationResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<ErrorCode>,
    pub message: String,
    /// Present for additions when quality analysis ran.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<QualityVerdict>,
}

impl OperationResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            code: None,
            message: message.into(),
            verdict: None,
        }
    }

    pub fn ok_with_verdict(message: impl Into<String>, verdict: QualityVerdict) -> Self {
        Self {
            success: true,
            code: None,
            message: message.into(),
            verdict: Some(verdict),
        }
    }

    pub fn failed(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(code),
            message: message.into(),
            verdict: None,
        }
    }

    /// Gate rejection carries the verdict so the caller can decide on an
    /// override without re-querying.
    pub fn rejected(verdict: QualityVerdict, message: impl Into<String>) -> Self {
        Self {
            success: false,
            code: Some(ErrorCode::QualityTooLow),
            message: message.into(),
            verdict: Some(verdict),
        }
    }
}
