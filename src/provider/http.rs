//! HTTP adapter for a Stripe-compatible checkout-session API

use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use tracing::{debug, warn};
use url::Url;

use super::{CheckoutIntent, CheckoutRequest, PaymentProvider, ProviderError, SessionStatus};
use crate::config::ProviderConfig;

const SESSIONS_PATH: &str = "/v1/checkout/sessions";

pub struct CheckoutSessionsClient {
    client: Client,
    base: Url,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct SessionCreated {
    id: String,
    url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SessionRetrieved {
    payment_status: String,
    payment_intent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ApiErrorBody {
    error: ApiErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ApiErrorDetail {
    message: Option<String>,
}

impl CheckoutSessionsClient {
    pub fn new(config: &ProviderConfig) -> anyhow::Result<Self> {
        let client = Client::builder().timeout(config.request_timeout).build()?;
        let base = Url::parse(&config.api_base)?;
        Ok(Self {
            client,
            base,
            secret_key: config.secret_key.clone(),
        })
    }

    fn sessions_url(&self, session_id: Option<&str>) -> Result<Url, ProviderError> {
        let path = match session_id {
            Some(id) => format!("{}/{}", SESSIONS_PATH, id),
            None => SESSIONS_PATH.to_string(),
        };
        self.base
            .join(&path)
            .map_err(|e| ProviderError::Transport(e.to_string()))
    }

    /// Stripe form encoding for a single line item.
    fn form_fields(request: &CheckoutRequest) -> Vec<(String, String)> {
        let mut fields = vec![
            ("mode".to_string(), "payment".to_string()),
            ("payment_method_types[]".to_string(), "card".to_string()),
            ("success_url".to_string(), request.success_url.clone()),
            ("cancel_url".to_string(), request.cancel_url.clone()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            (
                "line_items[0][price_data][currency]".to_string(),
                request.currency.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]".to_string(),
                request.amount_minor_units.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]".to_string(),
                request.product_name.clone(),
            ),
        ];
        if let Some(email) = &request.customer_email {
            fields.push(("customer_email".to_string(), email.clone()));
        }
        for (key, value) in &request.metadata {
            fields.push((format!("metadata[{}]", key), value.clone()));
        }
        fields
    }

    async fn rejection(response: reqwest::Response) -> ProviderError {
        let status = response.status();
        let message = response
            .json::<ApiErrorBody>()
            .await
            .ok()
            .and_then(|b| b.error.message)
            .unwrap_or_else(|| status.to_string());
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            ProviderError::Transport(message)
        } else {
            ProviderError::Rejected(message)
        }
    }
}

fn map_transport(err: reqwest::Error) -> ProviderError {
    if err.is_timeout() {
        ProviderError::Timeout
    } else {
        ProviderError::Transport(err.to_string())
    }
}

#[async_trait]
impl PaymentProvider for CheckoutSessionsClient {
    async fn create_checkout_intent(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutIntent, ProviderError> {
        let response = self
            .client
            .post(self.sessions_url(None)?)
            .bearer_auth(&self.secret_key)
            .form(&Self::form_fields(request))
            .send()
            .await
            .map_err(map_transport)?;

        if !response.status().is_success() {
            let err = Self::rejection(response).await;
            warn!(error = %err, "Checkout session creation failed");
            return Err(err);
        }

        let created: SessionCreated = response.json().await.map_err(map_transport)?;
        debug!(session_id = %created.id, "Checkout session created");
        Ok(CheckoutIntent {
            redirect_url: created.url.unwrap_or_default(),
            session_id: created.id,
        })
    }

    async fn session_status(&self, session_id: &str) -> Result<SessionStatus, ProviderError> {
        let response = self
            .client
            .get(self.sessions_url(Some(session_id))?)
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(map_transport)?;

        if !response.status().is_success() {
            return Err(Self::rejection(response).await);
        }

        let session: SessionRetrieved = response.json().await.map_err(map_transport)?;
        if session.payment_status == "paid" {
            Ok(SessionStatus::Paid {
                provider_payment_ref: session.payment_intent,
            })
        } else {
            Ok(SessionStatus::NotPaid {
                provider_status: session.payment_status,
            })
        }
    }
}
