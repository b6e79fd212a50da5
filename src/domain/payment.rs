use crate::error::PaymentError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

pub const DEFAULT_PROVIDER: &str = "Pesapal";

/// A positive monetary amount to be charged.
///
/// Wraps `rust_decimal::Decimal` and rejects zero or negative values at
/// construction. Goes over the wire as a JSON number.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize)]
#[serde(transparent)]
pub struct Amount(#[serde(with = "rust_decimal::serde::float")] Decimal);

impl Amount {
    pub fn new(value: Decimal) -> Result<Self, PaymentError> {
        if value > Decimal::ZERO {
            Ok(Self(value))
        } else {
            Err(PaymentError::ValidationError(
                "Amount must be positive".to_string(),
            ))
        }
    }
}

impl fmt::Display for Amount {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Three-letter currency code, always stored uppercase.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Currency(String);

impl Currency {
    pub fn new(code: &str) -> Result<Self, PaymentError> {
        let code = code.trim();
        if code.len() == 3 && code.chars().all(|c| c.is_ascii_alphabetic()) {
            Ok(Self(code.to_ascii_uppercase()))
        } else {
            Err(PaymentError::ValidationError(format!(
                "Invalid currency code: {code:?}"
            )))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Currency {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Payment method picked by the user (`mpesa`, `card`, ...).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct PaymentMethod(String);

impl PaymentMethod {
    pub fn new(method: &str) -> Result<Self, PaymentError> {
        let method = method.trim();
        if method.is_empty() {
            return Err(PaymentError::ValidationError(
                "Payment method must not be empty".to_string(),
            ));
        }
        Ok(Self(method.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// What the payment settles: an order or a vendor subscription, never both.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OrderRef {
    Order(String),
    Subscription(String),
}

impl OrderRef {
    fn order_id(&self) -> Option<&str> {
        match self {
            OrderRef::Order(id) => Some(id),
            OrderRef::Subscription(_) => None,
        }
    }

    fn subscription_id(&self) -> Option<&str> {
        match self {
            OrderRef::Subscription(id) => Some(id),
            OrderRef::Order(_) => None,
        }
    }
}

/// Body of the "initiate payment" call.
#[derive(Debug, Clone, PartialEq)]
pub struct InitiateRequest {
    pub user_id: String,
    pub amount: Amount,
    pub currency: Currency,
    pub method: PaymentMethod,
    pub order_ref: OrderRef,
    pub description: Option<String>,
}

#[derive(Serialize)]
struct InitiateWire<'a> {
    user_id: &'a str,
    amount: Amount,
    currency: &'a Currency,
    method: &'a PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    order_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    subscription_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    description: Option<&'a str>,
}

impl Serialize for InitiateRequest {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        InitiateWire {
            user_id: &self.user_id,
            amount: self.amount,
            currency: &self.currency,
            method: &self.method,
            order_id: self.order_ref.order_id(),
            subscription_id: self.order_ref.subscription_id(),
            description: self.description.as_deref(),
        }
        .serialize(serializer)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct InitiateResponse {
    pub transaction_id: String,
    #[serde(default)]
    pub redirect_url: Option<String>,
}

impl InitiateResponse {
    /// The redirect target, if the gateway sent a non-blank one.
    pub fn usable_redirect_url(&self) -> Option<&str> {
        self.redirect_url
            .as_deref()
            .map(str::trim)
            .filter(|url| !url.is_empty())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteStatus {
    Success,
    Failed,
    Other,
}

/// Body returned by the "payment status" call.
///
/// `status` is kept as raw JSON so that unexpected shapes are simply
/// non-terminal instead of a decode failure.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StatusResponse {
    #[serde(default)]
    pub status: serde_json::Value,
}

impl StatusResponse {
    pub fn new(status: &str) -> Self {
        Self {
            status: serde_json::Value::String(status.to_string()),
        }
    }

    pub fn outcome(&self) -> RemoteStatus {
        match self.status.as_str() {
            Some("success") => RemoteStatus::Success,
            Some("failed") => RemoteStatus::Failed,
            _ => RemoteStatus::Other,
        }
    }
}

/// One payment attempt, created after a successful initiation.
#[derive(Debug, Clone, PartialEq)]
pub struct PaymentSession {
    pub transaction_id: String,
    pub redirect_url: String,
    pub currency: Currency,
    pub amount: Amount,
    pub order_ref: OrderRef,
}

/// Payload handed to the success callback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfirmedTransaction {
    pub transaction_id: String,
    pub provider: String,
}
