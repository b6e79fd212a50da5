use clap::{ArgGroup, Parser, ValueEnum};
use miette::{IntoDiagnostic, Result, miette};
use payconfirm::application::dialog::PaymentDialog;
use payconfirm::config::{DEFAULT_POLL_INTERVAL, DEFAULT_SUCCESS_DISPLAY_DELAY, PollerConfig};
use payconfirm::domain::payment::{
    Amount, Currency, DEFAULT_PROVIDER, InitiateRequest, OrderRef, PaymentMethod,
};
use payconfirm::domain::ports::PaymentGatewayRef;
use payconfirm::domain::status::PaymentStatus;
use payconfirm::error::PaymentError;
use payconfirm::infrastructure::http::HttpPaymentGateway;
use payconfirm::infrastructure::in_memory::ScriptedGateway;
use payconfirm::interfaces::console::{ConsoleCallbacks, render};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Clone, Copy, ValueEnum)]
enum SimulatedOutcome {
    Success,
    Failed,
}

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(group(
    ArgGroup::new("reference")
        .required(true)
        .args(["order_id", "subscription_id"])
))]
struct Cli {
    /// Paying user
    #[arg(long)]
    user_id: String,

    /// Amount to charge
    #[arg(long)]
    amount: Decimal,

    #[arg(long, default_value = "KES")]
    currency: String,

    /// Payment method (mpesa, card, ...)
    #[arg(long, default_value = "mpesa")]
    method: String,

    /// Order being paid
    #[arg(long)]
    order_id: Option<String>,

    /// Vendor subscription being paid
    #[arg(long)]
    subscription_id: Option<String>,

    #[arg(long)]
    description: Option<String>,

    /// Base URL of the hosted backend
    #[arg(long, env = "PAYMENT_GATEWAY_URL", required_unless_present = "simulate")]
    gateway_url: Option<String>,

    #[arg(long, env = "PAYMENT_API_KEY", hide_env_values = true)]
    api_key: Option<String>,

    /// Provider name reported on confirmation
    #[arg(long, default_value = DEFAULT_PROVIDER)]
    provider: String,

    /// Use a simulated gateway instead of the backend.
    #[arg(long)]
    simulate: bool,

    /// Pending answers the simulated gateway gives before settling
    #[arg(long, default_value_t = 2)]
    simulate_ticks: usize,

    #[arg(long, value_enum, default_value_t = SimulatedOutcome::Success)]
    simulate_outcome: SimulatedOutcome,

    #[arg(long, env = "PAYMENT_POLL_INTERVAL_MS", default_value_t = DEFAULT_POLL_INTERVAL.as_millis() as u64)]
    poll_interval_ms: u64,

    #[arg(long, env = "PAYMENT_SUCCESS_DELAY_MS", default_value_t = DEFAULT_SUCCESS_DISPLAY_DELAY.as_millis() as u64)]
    success_delay_ms: u64,

    /// Per-request timeout; unset means wait for the backend indefinitely
    #[arg(long, env = "PAYMENT_REQUEST_TIMEOUT_MS")]
    request_timeout_ms: Option<u64>,
}

impl Cli {
    fn request(&self) -> Result<InitiateRequest, PaymentError> {
        let order_ref = match (&self.order_id, &self.subscription_id) {
            (Some(id), _) => OrderRef::Order(id.clone()),
            (None, Some(id)) => OrderRef::Subscription(id.clone()),
            (None, None) => {
                return Err(PaymentError::ValidationError(
                    "An order or subscription id is required".to_string(),
                ));
            }
        };
        Ok(InitiateRequest {
            user_id: self.user_id.clone(),
            amount: Amount::new(self.amount)?,
            currency: Currency::new(&self.currency)?,
            method: PaymentMethod::new(&self.method)?,
            order_ref,
            description: self.description.clone(),
        })
    }

    fn poller_config(&self) -> PollerConfig {
        PollerConfig::default()
            .with_poll_interval(Duration::from_millis(self.poll_interval_ms))
            .with_success_display_delay(Duration::from_millis(self.success_delay_ms))
            .with_request_timeout(self.request_timeout_ms.map(Duration::from_millis))
    }

    fn gateway(&self) -> Result<PaymentGatewayRef> {
        if self.simulate {
            let outcome = match self.simulate_outcome {
                SimulatedOutcome::Success => "success",
                SimulatedOutcome::Failed => "failed",
            };
            let gateway = ScriptedGateway::simulated(self.simulate_ticks, outcome)
                .with_provider(self.provider.clone());
            return Ok(Arc::new(gateway));
        }

        let url = self
            .gateway_url
            .clone()
            .ok_or_else(|| miette!("--gateway-url is required unless --simulate is set"))?;
        let gateway = HttpPaymentGateway::new(url)
            .with_api_key(self.api_key.clone())
            .with_provider(self.provider.clone());
        Ok(Arc::new(gateway))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| "payconfirm=info".into()),
        )
        .init();

    let cli = Cli::parse();
    let request = cli.request().into_diagnostic()?;
    let gateway = cli.gateway()?;

    let callbacks = Arc::new(ConsoleCallbacks::stdout());
    let dialog = PaymentDialog::new(gateway, callbacks.clone(), cli.poller_config());
    let mut updates = dialog.subscribe();

    match dialog.open(&request).await {
        Ok(view) => {
            callbacks.print(&render(&view));
            if let Some(url) = &view.redirect_url {
                callbacks.print(&format!("Complete the payment at {url}"));
            }
        }
        Err(error) => {
            callbacks.print(&render(&dialog.view()));
            return Err(error).into_diagnostic();
        }
    }
    updates.borrow_and_update();

    loop {
        tokio::select! {
            _ = callbacks.finished() => break,
            changed = updates.changed() => {
                if changed.is_err() {
                    break;
                }
                callbacks.print(&render(&dialog.view()));
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, closing payment dialog");
                break;
            }
        }
    }
    dialog.close();

    match dialog.status() {
        PaymentStatus::Success => Ok(()),
        status => Err(miette!("Payment not confirmed (status: {status:?})")),
    }
}
