use crate::application::dialog::DialogView;
use crate::domain::payment::ConfirmedTransaction;
use crate::domain::ports::PaymentCallbacks;
use std::io::Write;
use std::sync::{Mutex, PoisonError};
use tokio::sync::Notify;
use tracing::{info, warn};

/// Renders the user-visible status line, with the transaction id once known.
pub fn render(view: &DialogView) -> String {
    let mut line = format!("[{:?}] {}", view.status, view.status_line);
    if let Some(tx) = &view.transaction_id {
        line.push_str(&format!(" (transaction {tx})"));
    }
    if let Some(error) = &view.error {
        line.push_str(&format!(": {error}"));
    }
    line
}

/// Callbacks for a terminal session: writes outcomes to a sink (stdout in the
/// CLI) and wakes the caller once the dialog is done.
pub struct ConsoleCallbacks<W: Write + Send> {
    out: Mutex<W>,
    done: Notify,
}

impl ConsoleCallbacks<std::io::Stdout> {
    pub fn stdout() -> Self {
        Self::new(std::io::stdout())
    }
}

impl<W: Write + Send> ConsoleCallbacks<W> {
    pub fn new(out: W) -> Self {
        Self {
            out: Mutex::new(out),
            done: Notify::new(),
        }
    }

    /// Resolves once the dialog asked to be closed or the payment failed.
    pub async fn finished(&self) {
        self.done.notified().await;
    }

    pub fn print(&self, line: &str) {
        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        if let Err(error) = writeln!(out, "{line}").and_then(|()| out.flush()) {
            warn!(%error, line, "failed to write status line");
        }
    }

    pub fn into_inner(self) -> W {
        self.out
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl<W: Write + Send> PaymentCallbacks for ConsoleCallbacks<W> {
    fn on_success(&self, tx: ConfirmedTransaction) {
        info!(transaction_id = %tx.transaction_id, provider = %tx.provider, "payment confirmed");
        self.print(&format!(
            "Payment confirmed via {} (transaction {})",
            tx.provider, tx.transaction_id
        ));
    }

    fn on_failure(&self) {
        self.print("Payment failed, please try again");
        self.done.notify_one();
    }

    fn on_close_requested(&self) {
        self.done.notify_one();
    }
}
