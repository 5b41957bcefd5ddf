use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use etuition::config::AppConfig;
use etuition::error::AppError;
use etuition::identity::{FirebaseTokenVerifier, TokenVerifier};
use etuition::payments::{PaymentGateway, StripeGateway};
use etuition::store::{self, PgPool, Stores};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

/// Postgres when `DATABASE_URL` is set, otherwise process-local collections.
pub(crate) async fn open_stores(config: &AppConfig) -> Result<(Stores, Option<PgPool>), AppError> {
    match config.store.database_url.as_deref() {
        Some(url) => {
            let pool = store::connect(url, &config.store).await?;
            Ok((Stores::postgres(pool.clone()), Some(pool)))
        }
        None => {
            tracing::warn!("DATABASE_URL is not set; using the in-memory store");
            Ok((Stores::in_memory(), None))
        }
    }
}

pub(crate) fn token_verifier(config: &AppConfig) -> Result<Arc<dyn TokenVerifier>, AppError> {
    let verifier = FirebaseTokenVerifier::from_config(&config.identity, config.upstream_timeout)?;
    tracing::info!(project_id = verifier.project_id(), "identity provider configured");
    Ok(Arc::new(verifier))
}

pub(crate) fn payment_gateway(config: &AppConfig) -> Result<Arc<dyn PaymentGateway>, AppError> {
    let gateway = StripeGateway::from_config(&config.payments, config.upstream_timeout)?;
    Ok(Arc::new(gateway))
}
