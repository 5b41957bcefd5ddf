//! Hosted-checkout payment provider port.

mod stripe;

use std::collections::HashMap;

use async_trait::async_trait;
use serde::Deserialize;

use crate::marketplace::domain::{Email, TuitionId};

pub use stripe::StripeGateway;

/// Line item and metadata for one hosted checkout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutRequest {
    pub tuition_id: TuitionId,
    pub subject: String,
    pub tutor_email: Email,
    pub student_email: Email,
    /// Minor currency units.
    pub amount_minor: i64,
    pub currency: String,
}

/// Provider view of a checkout session. Field names follow the provider's JSON.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckoutSession {
    pub id: String,
    #[serde(default)]
    pub url: Option<String>,
    pub payment_status: String,
    #[serde(default)]
    pub payment_intent: Option<String>,
    #[serde(default)]
    pub amount_total: Option<i64>,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub customer_email: Option<String>,
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl CheckoutSession {
    pub fn is_paid(&self) -> bool {
        self.payment_status == "paid"
    }

    pub fn metadata_value(&self, key: &str) -> Option<&str> {
        self.metadata
            .get(key)
            .map(String::as_str)
            .filter(|value| !value.is_empty())
    }
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError>;
    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, GatewayError>;
}

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("payment provider timed out")]
    Timeout,
    #[error("payment provider rejected the request ({status}): {message}")]
    Rejected { status: u16, message: String },
    #[error("checkout session not found")]
    SessionNotFound,
    #[error("payment provider unavailable: {0}")]
    Unavailable(String),
    #[error("unexpected payment provider response: {0}")]
    Malformed(String),
    #[error("payment provider misconfigured: {0}")]
    Configuration(String),
}
