//! Application layer: the payment confirmation poller.
//!
//! [`dialog::PaymentDialog`] owns one payment attempt. It initiates the session
//! through the injected gateway, polls the status endpoint on a `tokio` interval
//! and reports the outcome through the injected callbacks.

pub mod dialog;
pub mod poll;
