// Copyright 2026 Phillip Cloud
// Licensed under the Apache License, Version 2.0

use thiserror::Error;

/// Why a table fetch produced no rows. Reported through the controller's
/// error callback, never returned to the caller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureKind {
    #[error("network failure: {0}")]
    Network(String),

    #[error("server error ({status}): {}", .message.as_deref().unwrap_or("no details"))]
    Server { status: u16, message: Option<String> },

    #[error("session expired; sign in again")]
    Unauthorized,

    #[error("response matched no known payload shape")]
    MalformedResponse,
}

impl FailureKind {
    pub fn server(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Server {
            status,
            message: (!message.trim().is_empty()).then_some(message),
        }
    }

    /// Soft failures leave the table empty without an error banner.
    pub const fn is_soft(&self) -> bool {
        matches!(self, Self::MalformedResponse)
    }

    pub const fn status_code(&self) -> Option<u16> {
        match self {
            Self::Server { status, .. } => Some(*status),
            Self::Unauthorized => Some(401),
            Self::Network(_) | Self::MalformedResponse => None,
        }
    }
}
