//! Tutoring marketplace: users, tuition requests, tutor applications and payment settlement.

pub mod applications;
pub mod domain;
pub mod error;
pub mod policy;
pub mod reporting;
pub mod repository;
pub mod router;
pub mod settlement;
pub mod tuitions;
pub mod users;

#[cfg(test)]
mod tests;

use std::future::Future;
use std::time::Duration;

pub use applications::{ApplicationService, ApplyRequest};
pub use error::MarketplaceError;
pub use policy::{AccessPolicy, Caller};
pub use reporting::ReportingService;
pub use repository::RepositoryError;
pub use router::{marketplace_router, MarketplaceState};
pub use settlement::{CheckoutLink, SettlementOutcome, SettlementService};
pub use tuitions::{CreateOutcome, TuitionPage, TuitionService};
pub use users::{RegisterOutcome, Registration, UserService};

/// Runs one store call under the per-call deadline.
pub(crate) async fn bounded<T, F>(limit: Duration, call: F) -> Result<T, RepositoryError>
where
    F: Future<Output = Result<T, RepositoryError>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(RepositoryError::Timeout),
    }
}
