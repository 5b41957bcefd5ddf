use std::future::Future;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use super::bounded;
use super::domain::{
    ApprovalStatus, Email, PaymentId, PaymentRecord, PaymentStatus, TuitionId, TuitionRequest,
};
use super::error::MarketplaceError;
use super::policy::{AccessPolicy, Caller};
use super::repository::{
    ApplicationRepository, PaymentRepository, RepositoryError, TuitionRepository,
};
use crate::payments::{CheckoutRequest, CheckoutSession, GatewayError, PaymentGateway};

/// Attempts for a compare-and-set that keeps losing to concurrent writers.
const CAS_ATTEMPTS: usize = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum SettlementOutcome {
    #[serde(rename_all = "camelCase")]
    Settled {
        transaction_id: String,
        payment_id: PaymentId,
        tuition_id: TuitionId,
    },
    #[serde(rename_all = "camelCase")]
    AlreadySettled { transaction_id: String },
    #[serde(rename_all = "camelCase")]
    NotPaid { payment_status: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CheckoutLink {
    pub url: String,
}

/// Hosted checkout creation and reconciliation of completed sessions.
#[derive(Clone)]
pub struct SettlementService {
    tuitions: Arc<dyn TuitionRepository>,
    applications: Arc<dyn ApplicationRepository>,
    payments: Arc<dyn PaymentRepository>,
    gateway: Arc<dyn PaymentGateway>,
    policy: AccessPolicy,
    currency: String,
    timeout: Duration,
}

impl SettlementService {
    pub fn new(
        tuitions: Arc<dyn TuitionRepository>,
        applications: Arc<dyn ApplicationRepository>,
        payments: Arc<dyn PaymentRepository>,
        gateway: Arc<dyn PaymentGateway>,
        policy: AccessPolicy,
        currency: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        Self {
            tuitions,
            applications,
            payments,
            gateway,
            policy,
            currency: currency.into(),
            timeout,
        }
    }

    async fn provider<T, F>(&self, call: F) -> Result<T, MarketplaceError>
    where
        F: Future<Output = Result<T, GatewayError>>,
    {
        match tokio::time::timeout(self.timeout, call).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(GatewayError::Timeout.into()),
        }
    }

    /// Opens a hosted checkout for the tutor currently attached to the request.
    pub async fn create_checkout(
        &self,
        caller: &Caller,
        tuition_id: TuitionId,
        fee: u64,
    ) -> Result<CheckoutLink, MarketplaceError> {
        let tuition = bounded(self.timeout, self.tuitions.fetch(&tuition_id))
            .await?
            .ok_or_else(|| MarketplaceError::not_found("tuition not found"))?;
        self.policy
            .require_owner_or_admin(caller, &tuition.student_email)
            .await?;
        if tuition.is_paid() {
            return Err(MarketplaceError::Conflict(
                "tuition has already been paid for".to_string(),
            ));
        }
        let tutor_email = tuition
            .tutor_email()
            .cloned()
            .ok_or_else(|| MarketplaceError::Conflict("no tutor has applied yet".to_string()))?;
        if tuition.approval_status == Some(ApprovalStatus::Rejected) {
            return Err(MarketplaceError::Conflict(
                "the attached tutor was rejected".to_string(),
            ));
        }
        let amount_minor = fee
            .checked_mul(100)
            .and_then(|amount| i64::try_from(amount).ok())
            .filter(|amount| *amount > 0)
            .ok_or_else(|| MarketplaceError::validation("fee must be a positive amount"))?;

        let session = self
            .provider(self.gateway.create_checkout_session(CheckoutRequest {
                tuition_id,
                subject: tuition.subject.clone(),
                tutor_email,
                student_email: tuition.student_email.clone(),
                amount_minor,
                currency: self.currency.clone(),
            }))
            .await?;
        let url = session.url.ok_or_else(|| {
            MarketplaceError::Upstream("checkout session has no redirect url".to_string())
        })?;
        tracing::info!(tuition_id = %tuition_id, session_id = %session.id, amount_minor, "checkout session created");
        Ok(CheckoutLink { url })
    }

    /// Reconciles a checkout session into local state. Safe to call repeatedly.
    pub async fn settle(&self, session_id: &str) -> Result<SettlementOutcome, MarketplaceError> {
        let session_id = session_id.trim();
        if session_id.is_empty() {
            return Err(MarketplaceError::validation("session_id is required"));
        }
        let session = self.provider(self.gateway.retrieve_session(session_id)).await?;

        if let Some(transaction_id) = session.payment_intent.as_deref() {
            if bounded(self.timeout, self.payments.find_by_transaction(transaction_id))
                .await?
                .is_some()
            {
                return Ok(SettlementOutcome::AlreadySettled {
                    transaction_id: transaction_id.to_string(),
                });
            }
        }

        if !session.is_paid() {
            tracing::info!(session_id, payment_status = %session.payment_status, "session not paid");
            return Ok(SettlementOutcome::NotPaid {
                payment_status: session.payment_status,
            });
        }

        let settlement = Settlement::from_session(&session, &self.currency)?;
        self.apply(settlement).await
    }

    async fn apply(&self, settlement: Settlement) -> Result<SettlementOutcome, MarketplaceError> {
        self.settle_tuition(&settlement).await?;

        let mut completed = vec!["tuition_settled"];
        if let Err(err) = self.approve_application(&settlement).await {
            return Err(MarketplaceError::partial(
                "settlement",
                &completed,
                "application_approved",
                err,
            ));
        }
        completed.push("application_approved");

        let record = PaymentRecord {
            id: PaymentId::new(),
            transaction_id: settlement.transaction_id.clone(),
            amount_minor: settlement.amount_minor,
            currency: settlement.currency.clone(),
            student_email: settlement.student_email.clone(),
            tutor_email: settlement.tutor_email.clone(),
            tuition_id: settlement.tuition_id,
            subject: settlement.subject.clone(),
            payment_status: PaymentStatus::Paid,
            paid_at: Utc::now(),
        };
        match bounded(self.timeout, self.payments.insert(record)).await {
            Ok(stored) => {
                tracing::info!(
                    transaction_id = %stored.transaction_id,
                    tuition_id = %stored.tuition_id,
                    amount_minor = stored.amount_minor,
                    "payment settled"
                );
                Ok(SettlementOutcome::Settled {
                    transaction_id: stored.transaction_id,
                    payment_id: stored.id,
                    tuition_id: stored.tuition_id,
                })
            }
            Err(RepositoryError::Conflict) => Ok(SettlementOutcome::AlreadySettled {
                transaction_id: settlement.transaction_id,
            }),
            Err(err) => Err(MarketplaceError::partial(
                "settlement",
                &completed,
                "payment_recorded",
                err.into(),
            )),
        }
    }

    async fn settle_tuition(&self, settlement: &Settlement) -> Result<(), MarketplaceError> {
        for _ in 0..CAS_ATTEMPTS {
            let Some(mut tuition) =
                bounded(self.timeout, self.tuitions.fetch(&settlement.tuition_id)).await?
            else {
                tracing::warn!(tuition_id = %settlement.tuition_id, "settling payment for a deleted tuition");
                return Ok(());
            };
            if tuition.tutor_email() != Some(&settlement.tutor_email) {
                tracing::error!(
                    tuition_id = %settlement.tuition_id,
                    paid_tutor = %settlement.tutor_email,
                    attached_tutor = ?tuition.tutor_email().map(Email::as_str),
                    transaction_id = %settlement.transaction_id,
                    "paid tutor is no longer attached to the tuition"
                );
                return Err(MarketplaceError::Conflict(
                    "the paid tutor is no longer attached to this tuition".to_string(),
                ));
            }
            if is_settled(&tuition) {
                return Ok(());
            }
            tuition.mark_settled();
            match bounded(self.timeout, self.tuitions.update(tuition)).await {
                Ok(_) => return Ok(()),
                Err(RepositoryError::Conflict) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(MarketplaceError::Conflict(
            "tuition kept changing during settlement".to_string(),
        ))
    }

    async fn approve_application(&self, settlement: &Settlement) -> Result<(), MarketplaceError> {
        for _ in 0..CAS_ATTEMPTS {
            let found = bounded(
                self.timeout,
                self.applications
                    .find_for_tutor(&settlement.tuition_id, &settlement.tutor_email),
            )
            .await?;
            let Some(mut application) = found else {
                tracing::warn!(
                    tuition_id = %settlement.tuition_id,
                    tutor = %settlement.tutor_email,
                    "no application to approve for settled tuition"
                );
                return Ok(());
            };
            if application.application_status == ApprovalStatus::Approved {
                return Ok(());
            }
            application.application_status = ApprovalStatus::Approved;
            match bounded(self.timeout, self.applications.update(application)).await {
                Ok(_) => return Ok(()),
                Err(RepositoryError::Conflict) => continue,
                Err(err) => return Err(err.into()),
            }
        }
        Err(MarketplaceError::Conflict(
            "application kept changing during settlement".to_string(),
        ))
    }
}

fn is_settled(tuition: &TuitionRequest) -> bool {
    tuition.is_paid() && tuition.approval_status == Some(ApprovalStatus::Approved)
}

/// Fields of a paid session needed to drive local state.
struct Settlement {
    transaction_id: String,
    tuition_id: TuitionId,
    tutor_email: Email,
    student_email: Email,
    subject: String,
    amount_minor: i64,
    currency: String,
}

impl Settlement {
    fn from_session(session: &CheckoutSession, default_currency: &str) -> Result<Self, MarketplaceError> {
        let transaction_id = session.payment_intent.clone().ok_or_else(|| {
            MarketplaceError::Upstream("paid session has no payment intent".to_string())
        })?;
        let foreign = || MarketplaceError::validation("session is not a tuition checkout");

        let tuition_id = session
            .metadata_value("tuitionId")
            .and_then(|raw| TuitionId::from_str(raw).ok())
            .ok_or_else(foreign)?;
        let tutor_email = session
            .metadata_value("tutorEmail")
            .and_then(|raw| Email::parse(raw).ok())
            .ok_or_else(foreign)?;
        let student_email = session
            .metadata_value("studentEmail")
            .or(session.customer_email.as_deref())
            .and_then(|raw| Email::parse(raw).ok())
            .ok_or_else(foreign)?;

        Ok(Self {
            transaction_id,
            tuition_id,
            tutor_email,
            student_email,
            subject: session
                .metadata_value("subject")
                .unwrap_or_default()
                .to_string(),
            amount_minor: session.amount_total.unwrap_or_default(),
            currency: session
                .currency
                .clone()
                .unwrap_or_else(|| default_currency.to_string()),
        })
    }
}
