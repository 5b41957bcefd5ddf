use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;

use super::{CheckoutRequest, CheckoutSession, GatewayError, PaymentGateway};
use crate::config::PaymentConfig;

#[derive(Deserialize)]
struct ProviderErrorBody {
    error: ProviderErrorDetail,
}

#[derive(Deserialize)]
struct ProviderErrorDetail {
    #[serde(default)]
    message: Option<String>,
}

/// Stripe Checkout over the form-encoded REST API.
#[derive(Debug, Clone)]
pub struct StripeGateway {
    client: reqwest::Client,
    api_base: String,
    secret_key: String,
    site_domain: String,
}

impl StripeGateway {
    pub fn new(
        api_base: impl Into<String>,
        secret_key: impl Into<String>,
        site_domain: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, GatewayError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|err| GatewayError::Configuration(format!("failed to build HTTP client: {err}")))?;
        Ok(Self {
            client,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            secret_key: secret_key.into(),
            site_domain: site_domain.into().trim_end_matches('/').to_string(),
        })
    }

    pub fn from_config(config: &PaymentConfig, timeout: Duration) -> Result<Self, GatewayError> {
        let secret = config
            .require_secret_key()
            .map_err(|err| GatewayError::Configuration(err.to_string()))?;
        Self::new(
            config.api_base.clone(),
            secret,
            config.site_domain.clone(),
            timeout,
        )
    }

    fn checkout_form(&self, request: &CheckoutRequest) -> Vec<(&'static str, String)> {
        vec![
            ("mode", "payment".to_string()),
            ("line_items[0][quantity]", "1".to_string()),
            (
                "line_items[0][price_data][currency]",
                request.currency.clone(),
            ),
            (
                "line_items[0][price_data][unit_amount]",
                request.amount_minor.to_string(),
            ),
            (
                "line_items[0][price_data][product_data][name]",
                format!("Tuition fee: {}", request.subject),
            ),
            ("customer_email", request.student_email.to_string()),
            ("metadata[tuitionId]", request.tuition_id.to_string()),
            ("metadata[subject]", request.subject.clone()),
            ("metadata[tutorEmail]", request.tutor_email.to_string()),
            ("metadata[studentEmail]", request.student_email.to_string()),
            (
                "success_url",
                format!(
                    "{}/dashboard/payment-success?session_id={{CHECKOUT_SESSION_ID}}",
                    self.site_domain
                ),
            ),
            (
                "cancel_url",
                format!("{}/dashboard/payment-cancelled", self.site_domain),
            ),
        ]
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        operation: &str,
    ) -> Result<CheckoutSession, GatewayError> {
        let response = request
            .bearer_auth(&self.secret_key)
            .send()
            .await
            .map_err(|err| transport_error(err, operation))?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Err(GatewayError::SessionNotFound);
        }
        if status.is_server_error() {
            return Err(GatewayError::Unavailable(format!("{operation}: HTTP {status}")));
        }
        if status.is_client_error() {
            let message = response
                .json::<ProviderErrorBody>()
                .await
                .ok()
                .and_then(|body| body.error.message)
                .unwrap_or_else(|| "no error message".to_string());
            return Err(GatewayError::Rejected {
                status: status.as_u16(),
                message,
            });
        }

        response.json::<CheckoutSession>().await.map_err(|err| {
            if err.is_timeout() {
                GatewayError::Timeout
            } else {
                GatewayError::Malformed(format!("{operation}: {err}"))
            }
        })
    }
}

fn transport_error(err: reqwest::Error, operation: &str) -> GatewayError {
    if err.is_timeout() {
        GatewayError::Timeout
    } else {
        GatewayError::Unavailable(format!("{operation}: {err}"))
    }
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let url = format!("{}/v1/checkout/sessions", self.api_base);
        let form = self.checkout_form(&request);
        self.send(self.client.post(&url).form(&form), "create_checkout_session")
            .await
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, GatewayError> {
        if session_id.is_empty()
            || !session_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '_')
        {
            return Err(GatewayError::SessionNotFound);
        }
        let url = format!("{}/v1/checkout/sessions/{session_id}", self.api_base);
        self.send(self.client.get(&url), "retrieve_session").await
    }
}
