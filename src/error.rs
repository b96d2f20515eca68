//! Unified error type. Each component raises its own `thiserror` enum;
//! `FleetError::kind()` maps every one of them onto the fixed error-kind
//! vocabulary the wire layer (ControlAPI, WorkerAgent) reports to callers.

use crate::{database::DbError, sandbox::SandboxError, secretbox::SecretBoxError};

/// Stable error classification surfaced over HTTP/WS.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ValidationError,
    UnauthorizedError,
    NotFoundError,
    ConflictError,
    IntegrityError,
    TransientUpstreamError,
    ResourceLimitError,
    TimeoutError,
    FatalInitError,
}

#[derive(Debug, thiserror::Error)]
pub enum FleetError {
    #[error("validation error: {0}")]
    Validation(String),

    #[error("unauthorized")]
    Unauthorized,

    #[error("not found: {0}")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error("integrity check failed: {0}")]
    Integrity(String),

    #[error("upstream unavailable: {0}")]
    TransientUpstream(String),

    #[error("resource limit exceeded: {0}")]
    ResourceLimit(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("fatal initialization error: {0}")]
    FatalInit(String),

    #[error(transparent)]
    Store(#[from] DbError),

    #[error(transparent)]
    Sandbox(#[from] SandboxError),

    #[error(transparent)]
    SecretBox(#[from] SecretBoxError),
}

impl FleetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            FleetError::Validation(_) => ErrorKind::ValidationError,
            FleetError::Unauthorized => ErrorKind::UnauthorizedError,
            FleetError::NotFound(_) => ErrorKind::NotFoundError,
            FleetError::Conflict(_) => ErrorKind::ConflictError,
            FleetError::Integrity(_) => ErrorKind::IntegrityError,
            FleetError::TransientUpstream(_) => ErrorKind::TransientUpstreamError,
            FleetError::ResourceLimit(_) => ErrorKind::ResourceLimitError,
            FleetError::Timeout(_) => ErrorKind::TimeoutError,
            FleetError::FatalInit(_) => ErrorKind::FatalInitError,
            FleetError::Store(_) => ErrorKind::TransientUpstreamError,
            FleetError::Sandbox(SandboxError::NoRuntime) => ErrorKind::FatalInitError,
            FleetError::Sandbox(SandboxError::NotCreated) => ErrorKind::ConflictError,
            FleetError::Sandbox(SandboxError::Runtime(_)) => ErrorKind::TransientUpstreamError,
            FleetError::SecretBox(SecretBoxError::Integrity) => ErrorKind::IntegrityError,
            FleetError::SecretBox(SecretBoxError::MalformedCiphertext(_)) => ErrorKind::ValidationError,
            FleetError::SecretBox(SecretBoxError::MissingMasterSecret) => ErrorKind::FatalInitError,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_integrity_error() {
        let e = FleetError::Integrity("tag mismatch".into());
        assert_eq!(e.kind(), ErrorKind::IntegrityError);
    }

    #[test]
    fn kind_maps_secretbox_integrity() {
        let e: FleetError = SecretBoxError::Integrity.into();
        assert_eq!(e.kind(), ErrorKind::IntegrityError);
    }
}
