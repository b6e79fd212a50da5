use crate::application::poll::PollHandle;
use crate::config::PollerConfig;
use crate::domain::payment::{
    ConfirmedTransaction, InitiateRequest, PaymentSession, RemoteStatus, StatusResponse,
};
use crate::domain::ports::{PaymentCallbacksRef, PaymentGatewayRef};
use crate::domain::status::PaymentStatus;
use crate::error::{PaymentError, Result};
use serde::Serialize;
use std::future::{self, Future};
use std::pin::pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::Poll;
use tokio::sync::watch;
use tokio::task::JoinSet;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Snapshot of what the dialog shows to the user.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DialogView {
    pub status: PaymentStatus,
    pub status_line: &'static str,
    pub transaction_id: Option<String>,
    pub redirect_url: Option<String>,
    pub error: Option<String>,
}

#[derive(Default)]
struct DialogState {
    status: PaymentStatus,
    session: Option<PaymentSession>,
    transaction_id: Option<String>,
    redirect_url: Option<String>,
    error: Option<String>,
    closed: bool,
    poll: Option<PollHandle>,
    /// Bumped on every start and stop, so a loop can tell whether it still owns `poll`.
    poll_generation: u64,
    close_timer: Option<PollHandle>,
}

impl DialogState {
    fn view(&self) -> DialogView {
        DialogView {
            status: self.status,
            status_line: self.status.status_line(),
            transaction_id: self.transaction_id.clone(),
            redirect_url: self.redirect_url.clone(),
            error: self.error.clone(),
        }
    }

    fn owns_poll(&self, generation: u64) -> bool {
        !self.closed && self.poll_generation == generation
    }
}

struct Shared {
    state: Mutex<DialogState>,
    status_tx: watch::Sender<PaymentStatus>,
    gateway: PaymentGatewayRef,
    callbacks: PaymentCallbacksRef,
    config: PollerConfig,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, DialogState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    async fn bounded<T>(&self, call: impl Future<Output = Result<T>>) -> Result<T> {
        match self.config.request_timeout {
            Some(limit) => time::timeout(limit, call)
                .await
                .map_err(|_| PaymentError::Timeout(limit))?,
            None => call.await,
        }
    }

    /// Fatal initiation outcome. Fires the failure callback unless the dialog
    /// was closed in the meantime.
    fn fail_initiation(
        &self,
        transaction_id: Option<String>,
        error: PaymentError,
    ) -> PaymentError {
        let mut state = self.lock();
        if state.closed || !state.status.fail() {
            return error;
        }
        warn!(%error, ?transaction_id, "payment initiation failed");
        state.error = Some(error.to_string());
        if transaction_id.is_some() {
            state.transaction_id = transaction_id;
        }
        drop(state);

        self.status_tx.send_replace(PaymentStatus::Failed);
        self.callbacks.on_failure();
        error
    }

    /// Issues one status call for the loop of `generation`, or returns `None`
    /// when that loop was stopped or the dialog closed.
    ///
    /// The call is first polled under the state lock: once `close` or
    /// `stop_polling` has returned, no new request can reach the gateway.
    async fn check_status(
        &self,
        generation: u64,
        transaction_id: &str,
    ) -> Option<Result<StatusResponse>> {
        let mut call = pin!(self.bounded(self.gateway.status(transaction_id)));
        let mut issued = false;
        future::poll_fn(|cx| {
            if !issued {
                let state = self.lock();
                if !state.owns_poll(generation) {
                    return Poll::Ready(None);
                }
                issued = true;
                return call.as_mut().poll(cx).map(Some);
            }
            call.as_mut().poll(cx).map(Some)
        })
        .await
    }

    /// Applies one poll response from the loop of `generation`. Returns `true`
    /// when the loop must stop.
    fn settle(
        self: &Arc<Self>,
        generation: u64,
        transaction_id: &str,
        remote: RemoteStatus,
    ) -> bool {
        let mut state = self.lock();
        if !state.owns_poll(generation) {
            return true;
        }
        if !state.status.settle(remote) {
            return state.status.is_terminal();
        }

        let status = state.status;
        if let Some(poll) = state.poll.take() {
            poll.release();
        }
        if status == PaymentStatus::Success {
            let shared = Arc::clone(self);
            let delay = self.config.success_display_delay;
            state.close_timer = Some(PollHandle::new(tokio::spawn(async move {
                time::sleep(delay).await;
                shared.request_close();
            })));
        } else {
            state.error = Some(PaymentError::TerminalFailure.to_string());
        }
        drop(state);

        info!(transaction_id, ?status, "payment settled");
        self.status_tx.send_replace(status);
        match status {
            PaymentStatus::Success => self.callbacks.on_success(ConfirmedTransaction {
                transaction_id: transaction_id.to_string(),
                provider: self.gateway.provider().to_string(),
            }),
            _ => self.callbacks.on_failure(),
        }
        true
    }

    fn request_close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        if let Some(timer) = state.close_timer.take() {
            timer.release();
        }
        drop(state);

        debug!("requesting dialog close");
        self.callbacks.on_close_requested();
    }
}

async fn poll_loop(shared: Arc<Shared>, transaction_id: String, generation: u64) {
    let period = shared.config.poll_interval;
    let mut interval = time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
    // Ticks never wait for earlier responses; several checks may be in flight.
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            _ = interval.tick() => {
                if !shared.lock().owns_poll(generation) {
                    return;
                }
                debug!(%transaction_id, "poll tick");
                let shared = Arc::clone(&shared);
                let transaction_id = transaction_id.clone();
                in_flight.spawn(async move {
                    shared.check_status(generation, &transaction_id).await
                });
            }
            Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                match joined {
                    Ok(None) => return,
                    Ok(Some(Ok(response))) => {
                        if shared.settle(generation, &transaction_id, response.outcome()) {
                            return;
                        }
                    }
                    Ok(Some(Err(error))) => {
                        warn!(%transaction_id, %error, "status check failed, retrying on next tick");
                    }
                    Err(error) => {
                        warn!(%transaction_id, %error, "status check task did not complete");
                    }
                }
            }
        }
    }
}

/// Drives one payment dialog from initiation to a confirmed or failed payment.
///
/// A dialog owns at most one poll loop and one pending close request. Both are
/// cancelled by [`PaymentDialog::close`] and when the dialog is dropped, so no
/// timer outlives it. Create a new dialog for every new payment attempt.
pub struct PaymentDialog {
    shared: Arc<Shared>,
}

impl PaymentDialog {
    pub fn new(
        gateway: PaymentGatewayRef,
        callbacks: PaymentCallbacksRef,
        config: PollerConfig,
    ) -> Self {
        let (status_tx, _) = watch::channel(PaymentStatus::Idle);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(DialogState::default()),
                status_tx,
                gateway,
                callbacks,
                config,
            }),
        }
    }

    /// Initiates the payment session and starts polling for its outcome.
    pub async fn open(&self, request: &InitiateRequest) -> Result<DialogView> {
        let view = self.initiate(request).await?;
        if view.status == PaymentStatus::Pending
            && let Some(transaction_id) = &view.transaction_id
        {
            self.start_polling(transaction_id);
        }
        Ok(self.view())
    }

    /// Creates the remote payment session.
    ///
    /// Only the first call on a fresh dialog reaches the gateway; once a
    /// redirect URL is known, or an attempt is underway or finished, this
    /// returns the current view untouched. Failures are final for this dialog.
    pub async fn initiate(&self, request: &InitiateRequest) -> Result<DialogView> {
        {
            let mut state = self.shared.lock();
            if state.closed || state.redirect_url.is_some() || !state.status.begin() {
                debug!(status = ?state.status, "initiation skipped");
                return Ok(state.view());
            }
        }
        self.shared.status_tx.send_replace(PaymentStatus::Pending);
        info!(
            user_id = %request.user_id,
            amount = %request.amount,
            currency = %request.currency,
            method = request.method.as_str(),
            "initiating payment"
        );

        let response = match self
            .shared
            .bounded(self.shared.gateway.initiate(request))
            .await
        {
            Ok(response) => response,
            Err(error) => return Err(self.shared.fail_initiation(None, error)),
        };

        let Some(redirect_url) = response.usable_redirect_url().map(str::to_string) else {
            return Err(self.shared.fail_initiation(
                Some(response.transaction_id),
                PaymentError::MissingRedirectUrl,
            ));
        };

        let mut state = self.shared.lock();
        if state.closed {
            debug!("dialog closed during initiation, discarding session");
            return Ok(state.view());
        }
        info!(transaction_id = %response.transaction_id, "payment session created");
        state.session = Some(PaymentSession {
            transaction_id: response.transaction_id.clone(),
            redirect_url: redirect_url.clone(),
            currency: request.currency.clone(),
            amount: request.amount,
            order_ref: request.order_ref.clone(),
        });
        state.transaction_id = Some(response.transaction_id);
        state.redirect_url = Some(redirect_url);
        Ok(state.view())
    }

    /// Starts the status poll loop for `transaction_id`.
    ///
    /// Returns `false` without doing anything when a loop is already running,
    /// the payment is not pending, or the dialog is closed. Must be called from
    /// within a tokio runtime.
    pub fn start_polling(&self, transaction_id: &str) -> bool {
        let mut state = self.shared.lock();
        if state.closed
            || state.status != PaymentStatus::Pending
            || state.poll.as_ref().is_some_and(PollHandle::is_active)
        {
            return false;
        }
        info!(transaction_id, interval = ?self.shared.config.poll_interval, "polling payment status");
        state.poll_generation += 1;
        let task = tokio::spawn(poll_loop(
            Arc::clone(&self.shared),
            transaction_id.to_string(),
            state.poll_generation,
        ));
        state.poll = Some(PollHandle::new(task));
        true
    }

    /// Stops the poll loop. Returns whether one was running.
    ///
    /// Responses still in flight for the stopped loop are discarded.
    pub fn stop_polling(&self) -> bool {
        let mut state = self.shared.lock();
        state.poll_generation += 1;
        match state.poll.take() {
            Some(poll) => {
                poll.cancel();
                true
            }
            None => false,
        }
    }

    /// Closes the dialog: cancels all timers and freezes the state.
    pub fn close(&self) {
        let mut state = self.shared.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        if let Some(poll) = state.poll.take() {
            poll.cancel();
        }
        if let Some(timer) = state.close_timer.take() {
            timer.cancel();
        }
        debug!(status = ?state.status, "payment dialog closed");
    }

    pub fn status(&self) -> PaymentStatus {
        self.shared.lock().status
    }

    pub fn view(&self) -> DialogView {
        self.shared.lock().view()
    }

    pub fn session(&self) -> Option<PaymentSession> {
        self.shared.lock().session.clone()
    }

    pub fn is_polling(&self) -> bool {
        self.shared
            .lock()
            .poll
            .as_ref()
            .is_some_and(PollHandle::is_active)
    }

    pub fn is_closed(&self) -> bool {
        self.shared.lock().closed
    }

    pub fn subscribe(&self) -> watch::Receiver<PaymentStatus> {
        self.shared.status_tx.subscribe()
    }
}

impl Drop for PaymentDialog {
    fn drop(&mut self) {
        self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::payment::{
        Amount, Currency, InitiateResponse, OrderRef, PaymentMethod, StatusResponse,
    };
    use crate::domain::ports::PaymentCallbacks;
    use crate::infrastructure::in_memory::{ScriptedGateway, ScriptedReply};
    use rust_decimal_macros::dec;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Default)]
    struct Counting {
        success: AtomicUsize,
        failure: AtomicUsize,
        close: AtomicUsize,
    }

    impl PaymentCallbacks for Counting {
        fn on_success(&self, _tx: ConfirmedTransaction) {
            self.success.fetch_add(1, Ordering::SeqCst);
        }
        fn on_failure(&self) {
            self.failure.fetch_add(1, Ordering::SeqCst);
        }
        fn on_close_requested(&self) {
            self.close.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn request() -> InitiateRequest {
        InitiateRequest {
            user_id: "user-1".to_string(),
            amount: Amount::new(dec!(250)).unwrap(),
            currency: Currency::new("KES").unwrap(),
            method: PaymentMethod::new("mpesa").unwrap(),
            order_ref: OrderRef::Order("order-1".to_string()),
            description: None,
        }
    }

    fn gateway() -> Arc<ScriptedGateway> {
        Arc::new(ScriptedGateway::new(ScriptedReply::ok(InitiateResponse {
            transaction_id: "TX1".to_string(),
            redirect_url: Some("https://pay/x".to_string()),
        })))
    }

    #[tokio::test(start_paused = true)]
    async fn test_initiate_records_session_without_polling() {
        let gateway = gateway();
        let dialog = PaymentDialog::new(
            gateway.clone(),
            Arc::new(Counting::default()),
            PollerConfig::default(),
        );

        let view = dialog.initiate(&request()).await.unwrap();
        assert_eq!(view.status, PaymentStatus::Pending);
        assert_eq!(view.transaction_id.as_deref(), Some("TX1"));
        assert_eq!(view.redirect_url.as_deref(), Some("https://pay/x"));
        assert_eq!(dialog.session().unwrap().order_ref, OrderRef::Order("order-1".into()));
        assert!(!dialog.is_polling());

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(gateway.status_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_polling_is_single_loop() {
        let gateway = gateway();
        let dialog = PaymentDialog::new(
            gateway.clone(),
            Arc::new(Counting::default()),
            PollerConfig::default(),
        );
        dialog.initiate(&request()).await.unwrap();

        assert!(dialog.start_polling("TX1"));
        assert!(!dialog.start_polling("TX1"));

        tokio::time::sleep(Duration::from_millis(9500)).await;
        assert_eq!(gateway.status_calls(), 3);
    }

    #[tokio::test]
    async fn test_start_polling_requires_pending() {
        let dialog = PaymentDialog::new(
            gateway(),
            Arc::new(Counting::default()),
            PollerConfig::default(),
        );
        assert!(!dialog.start_polling("TX1"));
        assert!(!dialog.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_polling_then_restart() {
        let gateway = gateway();
        let dialog = PaymentDialog::new(
            gateway.clone(),
            Arc::new(Counting::default()),
            PollerConfig::default(),
        );
        dialog.open(&request()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(3500)).await;

        assert!(dialog.stop_polling());
        assert!(!dialog.stop_polling());
        tokio::time::sleep(Duration::from_secs(10)).await;
        assert_eq!(gateway.status_calls(), 1);

        assert!(dialog.start_polling("TX1"));
        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(gateway.status_calls(), 2);
    }

    #[tokio::test]
    async fn test_status_call_needs_owning_loop() {
        let gateway = gateway();
        let dialog = PaymentDialog::new(
            gateway.clone(),
            Arc::new(Counting::default()),
            PollerConfig::default(),
        );
        dialog.initiate(&request()).await.unwrap();
        assert!(dialog.start_polling("TX1"));
        let generation = dialog.shared.lock().poll_generation;

        assert!(dialog.shared.check_status(generation, "TX1").await.is_some());
        assert_eq!(gateway.status_calls(), 1);

        dialog.close();
        assert!(dialog.shared.check_status(generation, "TX1").await.is_none());
        assert_eq!(gateway.status_calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stale_loop_leaves_new_loop_alone() {
        let gateway = gateway();
        let callbacks = Arc::new(Counting::default());
        let dialog = PaymentDialog::new(gateway.clone(), callbacks.clone(), PollerConfig::default());
        dialog.open(&request()).await.unwrap();
        let stale = dialog.shared.lock().poll_generation;

        assert!(dialog.stop_polling());
        assert!(dialog.start_polling("TX1"));

        // A terminal response reaching the stopped loop stops only that loop.
        assert!(dialog.shared.settle(stale, "TX1", RemoteStatus::Success));
        assert!(dialog.is_polling());
        assert_eq!(dialog.status(), PaymentStatus::Pending);
        assert_eq!(callbacks.success.load(Ordering::SeqCst), 0);
        assert!(dialog.shared.check_status(stale, "TX1").await.is_none());

        dialog.close();
        assert!(!dialog.is_polling());
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(gateway.status_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_request_timeout_fails_initiation() {
        let gateway = Arc::new(ScriptedGateway::new(
            ScriptedReply::ok(InitiateResponse {
                transaction_id: "TX1".to_string(),
                redirect_url: Some("https://pay/x".to_string()),
            })
            .after(Duration::from_secs(30)),
        ));
        let callbacks = Arc::new(Counting::default());
        let dialog = PaymentDialog::new(
            gateway,
            callbacks.clone(),
            PollerConfig::default().with_request_timeout(Some(Duration::from_secs(5))),
        );

        let result = dialog.open(&request()).await;
        assert!(matches!(result, Err(PaymentError::Timeout(_))));
        assert_eq!(dialog.status(), PaymentStatus::Failed);
        assert_eq!(callbacks.failure.load(Ordering::SeqCst), 1);
        assert!(!dialog.is_polling());
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_timeout_keeps_polling() {
        let gateway = Arc::new(
            ScriptedGateway::new(ScriptedReply::ok(InitiateResponse {
                transaction_id: "TX1".to_string(),
                redirect_url: Some("https://pay/x".to_string()),
            }))
            .with_statuses([
                ScriptedReply::ok(StatusResponse::new("success")).after(Duration::from_secs(60)),
                ScriptedReply::ok(StatusResponse::new("success")),
            ]),
        );
        let callbacks = Arc::new(Counting::default());
        let dialog = PaymentDialog::new(
            gateway.clone(),
            callbacks.clone(),
            PollerConfig::default().with_request_timeout(Some(Duration::from_secs(1))),
        );
        dialog.open(&request()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(6500)).await;
        assert_eq!(dialog.status(), PaymentStatus::Success);
        assert_eq!(gateway.status_calls(), 2);
        assert_eq!(callbacks.success.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_cancels_pending_close_request() {
        let gateway = Arc::new(
            ScriptedGateway::new(ScriptedReply::ok(InitiateResponse {
                transaction_id: "TX1".to_string(),
                redirect_url: Some("https://pay/x".to_string()),
            }))
            .with_statuses([ScriptedReply::ok(StatusResponse::new("success"))]),
        );
        let callbacks = Arc::new(Counting::default());
        let dialog =
            PaymentDialog::new(gateway, callbacks.clone(), PollerConfig::default());
        dialog.open(&request()).await.unwrap();

        tokio::time::sleep(Duration::from_millis(3500)).await;
        assert_eq!(dialog.status(), PaymentStatus::Success);
        dialog.close();

        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(callbacks.close.load(Ordering::SeqCst), 0);
        assert_eq!(dialog.status(), PaymentStatus::Success);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_tears_down_poll_loop() {
        let gateway = gateway();
        {
            let dialog = PaymentDialog::new(
                gateway.clone(),
                Arc::new(Counting::default()),
                PollerConfig::default(),
            );
            dialog.open(&request()).await.unwrap();
            tokio::time::sleep(Duration::from_millis(3500)).await;
        }
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(gateway.status_calls(), 1);
    }
}
