use crate::domain::payment::{
    DEFAULT_PROVIDER, InitiateRequest, InitiateResponse, StatusResponse,
};
use crate::domain::ports::PaymentGateway;
use crate::error::{PaymentError, Result};
use async_trait::async_trait;
use serde::Serialize;
use serde::de::DeserializeOwned;

/// Function route creating a payment session.
pub const INITIATE_PATH: &str = "functions/v1/payment-initiate";
/// Function route reporting the status of a transaction.
pub const STATUS_PATH: &str = "functions/v1/payment-status";

#[derive(Serialize)]
struct StatusQuery<'a> {
    transaction_id: &'a str,
}

/// Payment gateway backed by the hosted backend's HTTP functions.
///
/// Both calls are JSON `POST`s. When an API key is configured it is sent both
/// as a bearer token and as the `apikey` header, the way hosted
/// backend-as-a-service function gateways expect it.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    provider: String,
}

impl HttpPaymentGateway {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            api_key: None,
            provider: DEFAULT_PROVIDER.to_string(),
        }
    }

    pub fn with_api_key(mut self, api_key: Option<String>) -> Self {
        self.api_key = api_key;
        self
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = provider.into();
        self
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.base_url.trim_end_matches('/'), path)
    }

    async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized + Sync,
        T: DeserializeOwned,
    {
        let mut request = self.client.post(self.endpoint(path)).json(body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key).header("apikey", key);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(PaymentError::Remote {
                status: status.as_u16(),
                body,
            });
        }
        Ok(response.json().await?)
    }
}

#[async_trait]
impl PaymentGateway for HttpPaymentGateway {
    async fn initiate(&self, request: &InitiateRequest) -> Result<InitiateResponse> {
        self.post(INITIATE_PATH, request).await
    }

    async fn status(&self, transaction_id: &str) -> Result<StatusResponse> {
        self.post(STATUS_PATH, &StatusQuery { transaction_id }).await
    }

    fn provider(&self) -> &str {
        &self.provider
    }
}
