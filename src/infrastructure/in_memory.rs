use crate::domain::payment::{
    DEFAULT_PROVIDER, InitiateRequest, InitiateResponse, StatusResponse,
};
use crate::domain::ports::PaymentGateway;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use tokio::sync::Mutex;

/// A canned gateway answer, optionally delivered after some latency.
#[derive(Debug, Clone)]
pub struct ScriptedReply<T> {
    outcome: std::result::Result<T, String>,
    delay: Duration,
}

impl<T> ScriptedReply<T> {
    pub fn ok(value: T) -> Self {
        Self {
            outcome: Ok(value),
            delay: Duration::ZERO,
        }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self {
            outcome: Err(message.into()),
            delay: Duration::ZERO,
        }
    }

    pub fn after(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    async fn deliver(self, into_error: fn(String) -> PaymentError) -> Result<T> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        self.outcome.map_err(into_error)
    }
}

/// A simulated payment gateway.
///
/// Initiation always returns the same scripted reply. Status calls pop replies
/// from a FIFO queue and fall back to `pending` once it is drained. Every call is
/// counted, which makes it the test double for the poller and the backend of the
/// CLI's `--simulate` mode.
pub struct ScriptedGateway {
    provider: String,
    initiate_reply: ScriptedReply<InitiateResponse>,
    statuses: Mutex<VecDeque<ScriptedReply<StatusResponse>>>,
    fallback: StatusResponse,
    initiate_calls: AtomicUsize,
    status_calls: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new(initiate_reply: ScriptedReply<InitiateResponse>) -> Self {
        Self {
            provider: DEFAULT_PROVIDER.to_string(),
            initiate_reply,
            statuses: Mutex::new(VecDeque::new()),
            fallback: StatusResponse::new("pending"),
            initiate_calls: AtomicUsize::new(0),
            status_calls: AtomicUsize::new(0),
        }
    }

    /// A gateway that confirms with `outcome` after `pending_ticks` pending answers.
    pub fn simulated(pending_ticks: usize, outcome: &str) -> Self {
        let statuses = (0..pending_ticks)
            .map(|_| ScriptedReply::ok(StatusResponse::new("pending")))
            .chain(std::iter::once(ScriptedReply::ok(StatusResponse::new(
                outcome,
            ))));
        Self::new(ScriptedReply::ok(InitiateResponse {
            transaction_id: "SIM-0001".to_string(),
            redirect_url: Some("https://pay.invalid/checkout/SIM-0001".to_string()),
        }))
        .with_statuses(statuses)
    }

    pub fn with_statuses(
        mut self,
        replies: impl IntoIterator<Item = ScriptedReply<StatusResponse>>,
    ) -> Self {
        self.statuses.get_mut().extend(replies);
        self
    }

    pub fn with_fallback(mut self, fallback: StatusResponse) -> Self {
        self.fallback = fallback;
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    pub fn initiate_calls(&self) -> usize {
        self.initiate_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn initiate(&self, _request: &InitiateRequest) -> Result<InitiateResponse> {
        self.initiate_calls.fetch_add(1, Ordering::SeqCst);
        self.initiate_reply
            .clone()
            .deliver(PaymentError::InitiationError)
            .await
    }

    async fn status(&self, _transaction_id: &str) -> Result<StatusResponse> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        let reply = self
            .statuses
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| ScriptedReply::ok(self.fallback.clone()));
        reply.deliver(PaymentError::TransportError).await
    }

    fn provider(&self) -> &str {
        &self.provider
    }
}
