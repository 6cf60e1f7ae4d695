use crate::domain::booking::BookingStatus;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum MarketError {
    #[error("Validation error: {0}")]
    ValidationError(String),
    #[error("End date must be after start date.")]
    InvalidRange,
    #[error("This listing is already booked for part or all of the selected dates.")]
    DateConflict,
    #[error("Cannot {action} a booking that is {from}.")]
    InvalidTransition {
        action: &'static str,
        from: BookingStatus,
    },
    #[error("Unauthorized: {0}")]
    Unauthorized(String),
    #[error("{0} not found.")]
    NotFound(&'static str),
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Payment gateway timed out after {}s", .0.as_secs())]
    GatewayTimeout(Duration),
    #[error("Payment gateway error: {0}")]
    GatewayError(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
    #[error("CSV error: {0}")]
    CsvError(#[from] csv::Error),
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
    #[error("Internal error: {0}")]
    InternalError(Box<dyn std::error::Error + Send + Sync>),
}

pub type Result<T> = std::result::Result<T, MarketError>;

#[cfg(feature = "storage-rocksdb")]
impl From<rocksdb::Error> for MarketError {
    fn from(err: rocksdb::Error) -> Self {
        MarketError::InternalError(Box::new(err))
    }
}

impl From<validator::ValidationErrors> for MarketError {
    fn from(errors: validator::ValidationErrors) -> Self {
        let mut details: Vec<String> = errors
            .field_errors()
            .into_iter()
            .flat_map(|(field, errors)| {
                errors.iter().map(move |error| {
                    let message = error
                        .message
                        .as_ref()
                        .map(|message| message.to_string())
                        .unwrap_or_else(|| format!("failed {} check", error.code));
                    format!("{field}: {message}")
                })
            })
            .collect();
        details.sort();
        MarketError::ValidationError(details.join("; "))
    }
}

impl MarketError {
    pub(crate) fn internal(message: impl Into<String>) -> Self {
        MarketError::InternalError(Box::new(std::io::Error::other(message.into())))
    }

    /// HTTP status code the API surface answers with for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            MarketError::ValidationError(_)
            | MarketError::InvalidRange
            | MarketError::DateConflict
            | MarketError::InvalidTransition { .. }
            | MarketError::Conflict(_)
            | MarketError::GatewayTimeout(_)
            | MarketError::GatewayError(_)
            | MarketError::JsonError(_) => 400,
            MarketError::Unauthorized(_) => 403,
            MarketError::NotFound(_) => 404,
            MarketError::Config(_)
            | MarketError::CsvError(_)
            | MarketError::IoError(_)
            | MarketError::InternalError(_) => 500,
        }
    }

    /// Stable machine-readable error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            MarketError::ValidationError(_) | MarketError::JsonError(_) => "ValidationError",
            MarketError::InvalidRange => "InvalidRange",
            MarketError::DateConflict => "DateConflict",
            MarketError::InvalidTransition { .. } => "InvalidTransition",
            MarketError::Unauthorized(_) => "Unauthorized",
            MarketError::NotFound(_) => "NotFound",
            MarketError::Conflict(_) => "Conflict",
            MarketError::GatewayTimeout(_) => "GatewayTimeout",
            MarketError::GatewayError(_) => "GatewayError",
            MarketError::Config(_)
            | MarketError::CsvError(_)
            | MarketError::IoError(_)
            | MarketError::InternalError(_) => "InternalError",
        }
    }

    /// Message safe to hand back to a client. Gateway and internal failures
    /// are reported generically; their detail only goes to the log.
    pub fn public_message(&self) -> String {
        match self {
            MarketError::GatewayTimeout(_) | MarketError::GatewayError(_) => {
                "Payment gateway request failed, please try again.".to_string()
            }
            MarketError::Config(_)
            | MarketError::CsvError(_)
            | MarketError::IoError(_)
            | MarketError::InternalError(_) => "Internal server error.".to_string(),
            other => other.to_string(),
        }
    }
}
