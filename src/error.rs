use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PaymentError {
    #[error("Payment initiation failed: {0}")]
    InitiationError(String),
    #[error("No payment URL received")]
    MissingRedirectUrl,
    #[error("Payment failed")]
    TerminalFailure,
    #[error("Status check failed: {0}")]
    TransportError(String),
    #[error("Remote returned {status}: {body}")]
    Remote { status: u16, body: String },
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    #[error("HTTP error: {0}")]
    HttpError(#[from] reqwest::Error),
    #[error("Validation error: {0}")]
    ValidationError(String),
}

pub type Result<T> = std::result::Result<T, PaymentError>;
