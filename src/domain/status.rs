use super::payment::RemoteStatus;
use serde::Serialize;

/// Presentation state of a payment dialog.
///
/// `Success` and `Failed` are terminal: once reached, every further input is
/// ignored. Nothing ever moves back to `Idle`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentStatus {
    #[default]
    Idle,
    Pending,
    Success,
    Failed,
}

impl PaymentStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, PaymentStatus::Success | PaymentStatus::Failed)
    }

    /// Enters `Pending` from `Idle`. Returns whether the state changed.
    pub fn begin(&mut self) -> bool {
        if *self == PaymentStatus::Idle {
            *self = PaymentStatus::Pending;
            true
        } else {
            false
        }
    }

    /// Applies a status reported by the gateway. Returns whether the state changed.
    pub fn settle(&mut self, remote: RemoteStatus) -> bool {
        if *self != PaymentStatus::Pending {
            return false;
        }
        match remote {
            RemoteStatus::Success => *self = PaymentStatus::Success,
            RemoteStatus::Failed => *self = PaymentStatus::Failed,
            RemoteStatus::Other => return false,
        }
        true
    }

    /// Fails a pending payment locally (initiation error).
    pub fn fail(&mut self) -> bool {
        self.settle(RemoteStatus::Failed)
    }

    pub fn status_line(self) -> &'static str {
        match self {
            PaymentStatus::Idle => "Preparing payment",
            PaymentStatus::Pending => "Waiting for payment confirmation...",
            PaymentStatus::Success => "Payment confirmed",
            PaymentStatus::Failed => "Payment failed, please try again",
        }
    }
}
