use std::sync::Arc;
use std::time::Duration;

use super::bounded;
use super::domain::{ApprovalCount, Email, Page, PaymentRecord, PaymentTotal, Role};
use super::error::MarketplaceError;
use super::policy::{AccessPolicy, Caller};
use super::repository::{PaymentQuery, PaymentRepository, TuitionRepository};

/// Read-only views over payments and tuition approvals.
#[derive(Clone)]
pub struct ReportingService {
    tuitions: Arc<dyn TuitionRepository>,
    payments: Arc<dyn PaymentRepository>,
    policy: AccessPolicy,
    timeout: Duration,
}

impl ReportingService {
    pub fn new(
        tuitions: Arc<dyn TuitionRepository>,
        payments: Arc<dyn PaymentRepository>,
        policy: AccessPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            tuitions,
            payments,
            policy,
            timeout,
        }
    }

    async fn require_admin_self(&self, caller: &Caller, email: &str) -> Result<(), MarketplaceError> {
        caller.require_self(email)?;
        self.policy.require_role(caller, Role::Admin).await
    }

    async fn require_tutor_self(&self, caller: &Caller, email: &str) -> Result<(), MarketplaceError> {
        caller.require_self(email)?;
        self.policy.require_role(caller, Role::Tutor).await
    }

    pub async fn all_payments(
        &self,
        caller: &Caller,
        email: &str,
        page: Page,
    ) -> Result<Vec<PaymentRecord>, MarketplaceError> {
        self.require_admin_self(caller, email).await?;
        Ok(bounded(
            self.timeout,
            self.payments.list(&PaymentQuery::default(), page),
        )
        .await?)
    }

    /// Payments the caller made as a student.
    pub async fn student_payments(
        &self,
        caller: &Caller,
        email: &str,
        page: Page,
    ) -> Result<Vec<PaymentRecord>, MarketplaceError> {
        caller.require_self(email)?;
        let query = PaymentQuery {
            student_email: Some(caller.email.clone()),
            ..PaymentQuery::default()
        };
        Ok(bounded(self.timeout, self.payments.list(&query, page)).await?)
    }

    /// Payments the caller received as a tutor.
    pub async fn tutor_payments(
        &self,
        caller: &Caller,
        email: &str,
        page: Page,
    ) -> Result<Vec<PaymentRecord>, MarketplaceError> {
        self.require_tutor_self(caller, email).await?;
        let query = PaymentQuery {
            tutor_email: Some(caller.email.clone()),
            ..PaymentQuery::default()
        };
        Ok(bounded(self.timeout, self.payments.list(&query, page)).await?)
    }

    pub async fn payment_totals(
        &self,
        caller: &Caller,
        email: &str,
    ) -> Result<Vec<PaymentTotal>, MarketplaceError> {
        self.require_admin_self(caller, email).await?;
        Ok(bounded(self.timeout, self.payments.totals_by_status()).await?)
    }

    pub async fn tutor_earnings(
        &self,
        caller: &Caller,
        email: &str,
    ) -> Result<PaymentTotal, MarketplaceError> {
        self.require_tutor_self(caller, email).await?;
        let tutor: Email = caller.email.clone();
        Ok(bounded(self.timeout, self.payments.tutor_total(&tutor)).await?)
    }

    pub async fn approval_stats(
        &self,
        caller: &Caller,
        email: &str,
    ) -> Result<Vec<ApprovalCount>, MarketplaceError> {
        self.require_admin_self(caller, email).await?;
        Ok(bounded(self.timeout, self.tuitions.approval_counts()).await?)
    }
}
