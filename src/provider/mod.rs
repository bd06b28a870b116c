//! External payment provider contract
//!
//! Two calls only: open a checkout intent for an amount, and read back the
//! authoritative status of a session. [`http::CheckoutSessionsClient`] speaks
//! a Stripe-compatible checkout-session API.

pub mod http;

pub use http::CheckoutSessionsClient;

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ExternalServiceError;

pub const SERVICE_NAME: &str = "payment-provider";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutRequest {
    pub amount_minor_units: i64,
    /// Lower-case ISO code, e.g. `usd`.
    pub currency: String,
    pub product_name: String,
    pub metadata: BTreeMap<String, String>,
    pub success_url: String,
    pub cancel_url: String,
    pub customer_email: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutIntent {
    pub session_id: String,
    pub redirect_url: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum SessionStatus {
    Paid { provider_payment_ref: Option<String> },
    NotPaid { provider_status: String },
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProviderError {
    #[error("request timed out")]
    Timeout,

    #[error("request rejected: {0}")]
    Rejected(String),

    #[error("transport failure: {0}")]
    Transport(String),
}

impl ProviderError {
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ProviderError::Rejected(_))
    }
}

impl From<ProviderError> for ExternalServiceError {
    fn from(err: ProviderError) -> Self {
        ExternalServiceError {
            service: SERVICE_NAME,
            retryable: err.is_retryable(),
            message: err.to_string(),
        }
    }
}

#[async_trait]
pub trait PaymentProvider: Send + Sync {
    async fn create_checkout_intent(
        &self,
        request: &CheckoutRequest,
    ) -> Result<CheckoutIntent, ProviderError>;

    async fn session_status(&self, session_id: &str) -> Result<SessionStatus, ProviderError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_mapping() {
        let timeout: ExternalServiceError = ProviderError::Timeout.into();
        assert!(timeout.retryable);
        assert_eq!(timeout.service, SERVICE_NAME);

        let rejected: ExternalServiceError = ProviderError::Rejected("invalid amount".into()).into();
        assert!(!rejected.retryable);
        assert!(rejected.message.contains("invalid amount"));
    }
}
