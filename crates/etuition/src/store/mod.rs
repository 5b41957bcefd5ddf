//! Persistence adapters for the marketplace repositories.

pub mod memory;
pub mod postgres;

use std::sync::Arc;

pub use sqlx::PgPool;

use crate::marketplace::repository::{
    ApplicationRepository, PaymentRepository, TuitionRepository, UserRepository,
};

pub use memory::{
    InMemoryApplicationRepository, InMemoryPaymentRepository, InMemoryTuitionRepository,
    InMemoryUserRepository,
};
pub use postgres::{
    connect, PgApplicationRepository, PgPaymentRepository, PgTuitionRepository, PgUserRepository,
};

/// One handle per document collection.
#[derive(Clone)]
pub struct Stores {
    pub users: Arc<dyn UserRepository>,
    pub tuitions: Arc<dyn TuitionRepository>,
    pub applications: Arc<dyn ApplicationRepository>,
    pub payments: Arc<dyn PaymentRepository>,
}

impl Stores {
    /// Process-local collections; state is lost on restart.
    pub fn in_memory() -> Self {
        Self {
            users: Arc::new(InMemoryUserRepository::default()),
            tuitions: Arc::new(InMemoryTuitionRepository::default()),
            applications: Arc::new(InMemoryApplicationRepository::default()),
            payments: Arc::new(InMemoryPaymentRepository::default()),
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self {
            users: Arc::new(PgUserRepository::new(pool.clone())),
            tuitions: Arc::new(PgTuitionRepository::new(pool.clone())),
            applications: Arc::new(PgApplicationRepository::new(pool.clone())),
            payments: Arc::new(PgPaymentRepository::new(pool)),
        }
    }
}
