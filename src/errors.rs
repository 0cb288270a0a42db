use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to resolve required path: {0}")]
    Path(String),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Database(#[from] rusqlite::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("{0}")]
    Config(String),
    #[error("{0}")]
    Parse(String),
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("chat backend rejected the request ({status}): {message}")]
    ClientRequest { status: u16, message: String },
    #[error("chat backend unavailable after {attempts} attempts: {last_fault}")]
    UpstreamUnavailable { attempts: u32, last_fault: String },
    #[error("chat response failed schema validation: {reason}")]
    SchemaValidation { reason: String, cost_usd: f64 },
}

impl ChatError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ChatError::ClientRequest { .. } => ErrorKind::ClientRequestError,
            ChatError::UpstreamUnavailable { .. } => ErrorKind::UpstreamUnavailableError,
            ChatError::SchemaValidation { .. } => ErrorKind::SchemaValidationError,
        }
    }

    pub fn schema(reason: impl Into<String>, cost_usd: f64) -> Self {
        ChatError::SchemaValidation {
            reason: reason.into(),
            cost_usd,
        }
    }

    // Only a completed call that was billed can carry a cost.
    pub fn cost_usd(&self) -> f64 {
        match self {
            ChatError::SchemaValidation { cost_usd, .. } => *cost_usd,
            _ => 0.0,
        }
    }
}

#[derive(Debug, Error)]
#[error("trail generation failed for region {region}: {cause}")]
pub struct GenerationError {
    pub region: String,
    #[source]
    pub cause: ChatError,
}

impl GenerationError {
    pub fn new(region: impl Into<String>, cause: ChatError) -> Self {
        Self {
            region: region.into(),
            cause,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        self.cause.kind()
    }

    pub fn cost_usd(&self) -> f64 {
        self.cause.cost_usd()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    ClientRequestError,
    UpstreamUnavailableError,
    SchemaValidationError,
    StoreError,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ClientRequestError => "ClientRequestError",
            ErrorKind::UpstreamUnavailableError => "UpstreamUnavailableError",
            ErrorKind::SchemaValidationError => "SchemaValidationError",
            ErrorKind::StoreError => "StoreError",
        }
    }
}
