use super::payment::{ConfirmedTransaction, InitiateRequest, InitiateResponse, StatusResponse};
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;

/// Remote payment backend: session creation and status lookup.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initiate(&self, request: &InitiateRequest) -> Result<InitiateResponse>;
    async fn status(&self, transaction_id: &str) -> Result<StatusResponse>;
    /// Provider name reported to the success callback.
    fn provider(&self) -> &str;
}

/// Hooks exposed to the page embedding the payment dialog.
pub trait PaymentCallbacks: Send + Sync {
    fn on_success(&self, tx: ConfirmedTransaction);
    fn on_failure(&self);
    /// The dialog asks its owner to be closed.
    fn on_close_requested(&self);
}

pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;
pub type PaymentCallbacksRef = Arc<dyn PaymentCallbacks>;
