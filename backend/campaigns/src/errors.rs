//! Application-wide error types.
//!
//! Every failure a request can hit is folded into [`ServiceError`] and
//! reported exactly once, when the handler turns it into a response.
//! Cache failures have their own type and deliberately no conversion into
//! [`ServiceError`]: they degrade to a miss and never reach the caller.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::{error, info};

/// Precondition failures that the user can correct. None of them mutate state.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("amount must be greater than zero")]
    NonPositiveAmount,

    #[error("campaign has closed")]
    DeadlinePassed,

    #[error("insufficient balance")]
    InsufficientBalance,

    #[error("amount to be donated is greater than campaign goal")]
    ExceedsGoal,

    /// Goal reached is a closing condition independent of the deadline.
    #[error("campaign has closed")]
    GoalReached,

    #[error("goal must be greater than zero")]
    NonPositiveGoal,

    #[error("deadline cannot be earlier than the current time")]
    DeadlineInPast,
}

#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("RPC error {code}: {message}")]
    Rpc { code: i64, message: String },

    #[error("campaign {0} not found")]
    CampaignNotFound(u64),

    #[error("malformed ledger response: {0}")]
    Malformed(String),

    #[error("transaction rejected: {0}")]
    Rejected(String),
}

#[derive(Debug, Error)]
pub enum KeystoreError {
    #[error("no signing key for {0}")]
    Missing(String),

    #[error("keystore I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("signing key is not valid hex: {0}")]
    Decode(#[from] hex::FromHexError),
}

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("cache unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("invalid input: {0}")]
    Input(String),

    #[error("user not found")]
    Identity,

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("ledger error: {0}")]
    Ledger(#[from] LedgerError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migrate(#[from] sqlx::migrate::MigrateError),

    #[error("unable to make transaction at this time: {0}")]
    Keystore(#[from] KeystoreError),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Coarse classification used for status mapping and logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Input,
    Identity,
    Validation,
    Upstream,
}

impl ServiceError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Input(_) => ErrorKind::Input,
            Self::Identity => ErrorKind::Identity,
            Self::Validation(_) => ErrorKind::Validation,
            Self::Ledger(_)
            | Self::Database(_)
            | Self::Migrate(_)
            | Self::Keystore(_)
            | Self::Config(_) => ErrorKind::Upstream,
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self.kind() {
            ErrorKind::Input | ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::Identity => StatusCode::NOT_FOUND,
            ErrorKind::Upstream => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

#[derive(Serialize)]
pub struct ErrorResponse {
    pub error: String,
    pub kind: ErrorKind,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let kind = self.kind();
        match kind {
            ErrorKind::Upstream => error!("Request failed: {self}"),
            _ => info!(?kind, "Request rejected: {self}"),
        }
        let body = ErrorResponse {
            error: self.to_string(),
            kind,
        };
        (self.status_code(), Json(body)).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ServiceError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closing_conditions_share_a_message() {
        assert_eq!(ValidationError::DeadlinePassed.to_string(), "campaign has closed");
        assert_eq!(ValidationError::GoalReached.to_string(), "campaign has closed");
        assert_ne!(ValidationError::DeadlinePassed, ValidationError::GoalReached);
    }

    #[test]
    fn status_mapping() {
        assert_eq!(
            ServiceError::input("bad id").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(ServiceError::Identity.status_code(), StatusCode::NOT_FOUND);
        assert_eq!(
            ServiceError::from(ValidationError::InsufficientBalance).status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::from(LedgerError::CampaignNotFound(3)).status_code(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn upstream_sources_classify_as_upstream() {
        let err = ServiceError::from(KeystoreError::Missing("alice".into()));
        assert_eq!(err.kind(), ErrorKind::Upstream);
        let err = ServiceError::from(LedgerError::Rpc {
            code: -32000,
            message: "boom".into(),
        });
        assert_eq!(err.kind(), ErrorKind::Upstream);
    }
}
