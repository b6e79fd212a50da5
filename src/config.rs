use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(3000);
pub const DEFAULT_SUCCESS_DISPLAY_DELAY: Duration = Duration::from_millis(2000);

/// Timing knobs for a [`PaymentDialog`](crate::application::dialog::PaymentDialog).
///
/// `request_timeout` is unset by default: initiation and status calls wait as long
/// as the gateway takes, and polling keeps going until a terminal status or close.
#[derive(Debug, Clone, PartialEq)]
pub struct PollerConfig {
    /// Wall-clock period between two status calls.
    pub poll_interval: Duration,
    /// How long the confirmed state stays visible before closure is requested.
    pub success_display_delay: Duration,
    /// Optional per-request bound applied to every gateway call.
    pub request_timeout: Option<Duration>,
}

impl Default for PollerConfig {
    fn default() -> Self {
        Self {
            poll_interval: DEFAULT_POLL_INTERVAL,
            success_display_delay: DEFAULT_SUCCESS_DISPLAY_DELAY,
            request_timeout: None,
        }
    }
}

impl PollerConfig {
    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn with_success_display_delay(mut self, delay: Duration) -> Self {
        self.success_display_delay = delay;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.request_timeout = timeout;
        self
    }
}
