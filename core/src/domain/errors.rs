// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! The closed error surface every public operation in this crate returns.
//!
//! Component-internal error types (`ContainerError`, `AdvisorError`, ...)
//! implement `From<X> for GatewayError` at the boundary where they must
//! surface to a caller; everywhere else they are swallowed into retries or
//! fallbacks before a caller ever sees them.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    #[error("unauthorized")]
    Unauthorized,
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("validation failed: {0}")]
    ValidationFailed(String),
    #[error("no tools available")]
    NoToolsAvailable,
    #[error("arguments incomplete: {fields:?}")]
    ArgumentsIncomplete { fields: Vec<String> },
    #[error("service unavailable: {0}")]
    ServiceUnavailable(String),
    #[error("container runtime unavailable: {0}")]
    RuntimeUnavailable(String),
    #[error("advisor unavailable: {0}")]
    AdvisorUnavailable(String),
    #[error("timeout")]
    Timeout,
    #[error("internal error: {0}")]
    Internal(String),
}

impl GatewayError {
    /// The `error.kind` discriminant of the Control API envelope (spec §6.1).
    pub fn kind(&self) -> ErrorKind {
        match self {
            GatewayError::Unauthorized => ErrorKind::Unauthorized,
            GatewayError::NotFound(_) => ErrorKind::NotFound,
            GatewayError::Conflict(_) => ErrorKind::Conflict,
            GatewayError::ValidationFailed(_) => ErrorKind::ValidationFailed,
            GatewayError::NoToolsAvailable => ErrorKind::NoToolsAvailable,
            GatewayError::ArgumentsIncomplete { .. } => ErrorKind::ArgumentsIncomplete,
            GatewayError::ServiceUnavailable(_) => ErrorKind::ServiceUnavailable,
            GatewayError::RuntimeUnavailable(_) => ErrorKind::RuntimeUnavailable,
            GatewayError::AdvisorUnavailable(_) => ErrorKind::AdvisorUnavailable,
            GatewayError::Timeout => ErrorKind::Timeout,
            GatewayError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        GatewayError::Internal(msg.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    Unauthorized,
    NotFound,
    Conflict,
    ValidationFailed,
    NoToolsAvailable,
    ArgumentsIncomplete,
    ServiceUnavailable,
    RuntimeUnavailable,
    AdvisorUnavailable,
    Timeout,
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{self:?}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_one_to_one() {
        assert_eq!(GatewayError::Unauthorized.kind(), ErrorKind::Unauthorized);
        assert_eq!(GatewayError::Timeout.kind(), ErrorKind::Timeout);
        assert_eq!(
            GatewayError::ArgumentsIncomplete { fields: vec!["path".into()] }.kind(),
            ErrorKind::ArgumentsIncomplete
        );
    }
}
