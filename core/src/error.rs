// Copyright (c) 2026 Forgebase Contributors
// SPDX-License-Identifier: Apache-2.0
//! Wire-facing error taxonomy (spec §7).
//!
//! Every layer-local error enum (`ResourceError`, `WorkflowError`,
//! `RegistryError`, ...) implements [`HasErrorCode`] so it can be folded
//! into a [`CoreError`] at a service boundary without re-deriving the code
//! table in every caller.

use serde::Serialize;

/// Stable machine-readable error codes. Messages are free text; codes are not.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    InvalidSpec,
    InvalidWorkflow,
    InvalidParameters,
    NoProvider,
    CapabilityConflict,
    NoProvisioner,
    InvalidTransition,
    UnknownStepType,
    StepFailed,
    Timeout,
    Cancelled,
    ResourceNotFound,
    ExecutionNotFound,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidSpec => "INVALID_SPEC",
            ErrorCode::InvalidWorkflow => "INVALID_WORKFLOW",
            ErrorCode::InvalidParameters => "INVALID_PARAMETERS",
            ErrorCode::NoProvider => "NO_PROVIDER",
            ErrorCode::CapabilityConflict => "CAPABILITY_CONFLICT",
            ErrorCode::NoProvisioner => "NO_PROVISIONER",
            ErrorCode::InvalidTransition => "INVALID_TRANSITION",
            ErrorCode::UnknownStepType => "UNKNOWN_STEP_TYPE",
            ErrorCode::StepFailed => "STEP_FAILED",
            ErrorCode::Timeout => "TIMEOUT",
            ErrorCode::Cancelled => "CANCELLED",
            ErrorCode::ResourceNotFound => "RESOURCE_NOT_FOUND",
            ErrorCode::ExecutionNotFound => "EXECUTION_NOT_FOUND",
            ErrorCode::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A structured `{code, message, details?}` error, as sent over the wire (spec §6).
#[derive(Debug, Clone, thiserror::Error, Serialize)]
#[error("{code}: {message}")]
pub struct CoreError {
    pub code: ErrorCode,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl CoreError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into(), details: None }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

/// Implemented by every layer-local error enum so it can be mapped into a
/// [`CoreError`] without each call site re-deriving which code applies.
/// Concrete `From<X> for CoreError` impls live beside each `X` and simply
/// call [`HasErrorCode::into_core_error`].
pub trait HasErrorCode: std::fmt::Display {
    fn code(&self) -> ErrorCode;

    fn into_core_error(&self) -> CoreError {
        CoreError::new(self.code(), self.to_string())
    }
}

/// Convenience macro: `impl_core_error_from!(domain::workflow::WorkflowError);`
/// wires up `From<X> for CoreError` for an `X` that already implements
/// [`HasErrorCode`]. Keeps every layer-local error enum's conversion in one
/// line instead of hand-writing the same three lines per type.
#[macro_export]
macro_rules! impl_core_error_from {
    ($ty:ty) => {
        impl From<$ty> for $crate::error::CoreError {
            fn from(err: $ty) -> Self {
                $crate::error::HasErrorCode::into_core_error(&err)
            }
        }
    };
}
