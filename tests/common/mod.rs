#![allow(dead_code)]

use payconfirm::domain::payment::{
    Amount, ConfirmedTransaction, Currency, InitiateRequest, InitiateResponse, OrderRef,
    PaymentMethod,
};
use payconfirm::domain::ports::PaymentCallbacks;
use payconfirm::infrastructure::in_memory::ScriptedReply;
use rust_decimal_macros::dec;
use std::sync::Mutex;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    Success(ConfirmedTransaction),
    Failure,
    CloseRequested,
}

/// Callbacks that remember what fired and when.
#[derive(Default)]
pub struct RecordingCallbacks {
    events: Mutex<Vec<(Instant, Event)>>,
}

impl RecordingCallbacks {
    pub fn events(&self) -> Vec<Event> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .map(|(_, event)| event.clone())
            .collect()
    }

    pub fn failures(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| **event == Event::Failure)
            .count()
    }

    pub fn successes(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| matches!(event, Event::Success(_)))
            .count()
    }

    pub fn close_requests(&self) -> usize {
        self.events()
            .iter()
            .filter(|event| **event == Event::CloseRequested)
            .count()
    }

    pub fn time_of(&self, wanted: fn(&Event) -> bool) -> Option<Instant> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .find(|(_, event)| wanted(event))
            .map(|(at, _)| *at)
    }

    fn record(&self, event: Event) {
        self.events.lock().unwrap().push((Instant::now(), event));
    }
}

impl PaymentCallbacks for RecordingCallbacks {
    fn on_success(&self, tx: ConfirmedTransaction) {
        self.record(Event::Success(tx));
    }

    fn on_failure(&self) {
        self.record(Event::Failure);
    }

    fn on_close_requested(&self) {
        self.record(Event::CloseRequested);
    }
}

pub fn order_request() -> InitiateRequest {
    InitiateRequest {
        user_id: "user-42".to_string(),
        amount: Amount::new(dec!(1250.00)).unwrap(),
        currency: Currency::new("KES").unwrap(),
        method: PaymentMethod::new("mpesa").unwrap(),
        order_ref: OrderRef::Order("order-7".to_string()),
        description: Some("Order #7".to_string()),
    }
}

pub fn session_reply(
    transaction_id: &str,
    redirect_url: Option<&str>,
) -> ScriptedReply<InitiateResponse> {
    ScriptedReply::ok(InitiateResponse {
        transaction_id: transaction_id.to_string(),
        redirect_url: redirect_url.map(str::to_string),
    })
}
