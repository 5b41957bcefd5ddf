use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;

use super::bounded;
use super::domain::{
    ApprovalStatus, Email, ListingStatus, Page, Role, TuitionDetailsUpdate, TuitionDraft,
    TuitionId, TuitionRequest,
};
use super::error::MarketplaceError;
use super::policy::{AccessPolicy, Caller};
use super::repository::{ApplicationRepository, RepositoryError, TuitionQuery, TuitionRepository};

const RECENT_LIMIT: usize = 6;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum CreateOutcome {
    #[serde(rename_all = "camelCase")]
    Created { inserted_id: TuitionId },
    #[serde(rename_all = "camelCase")]
    Exists { existing_id: TuitionId },
}

/// One page of the public listing plus the number of approved requests overall.
#[derive(Debug, Clone, Serialize)]
pub struct TuitionPage {
    pub result: Vec<TuitionRequest>,
    pub count: u64,
}

/// Tuition-request lifecycle: creation, listing, edits and both status axes.
#[derive(Clone)]
pub struct TuitionService {
    tuitions: Arc<dyn TuitionRepository>,
    applications: Arc<dyn ApplicationRepository>,
    policy: AccessPolicy,
    timeout: Duration,
}

impl TuitionService {
    pub fn new(
        tuitions: Arc<dyn TuitionRepository>,
        applications: Arc<dyn ApplicationRepository>,
        policy: AccessPolicy,
        timeout: Duration,
    ) -> Self {
        Self {
            tuitions,
            applications,
            policy,
            timeout,
        }
    }

    async fn load(&self, id: &TuitionId) -> Result<TuitionRequest, MarketplaceError> {
        bounded(self.timeout, self.tuitions.fetch(id))
            .await?
            .ok_or_else(|| MarketplaceError::not_found("tuition not found"))
    }

    /// Creates a request unless an identical one exists, in which case the existing id
    /// is reported instead.
    pub async fn create(
        &self,
        caller: &Caller,
        draft: TuitionDraft,
    ) -> Result<CreateOutcome, MarketplaceError> {
        if draft.student_email != caller.email {
            return Err(MarketplaceError::forbidden(
                "tuitions can only be posted for yourself",
            ));
        }
        draft.validate()?;

        let key = draft.dedup_key();
        if let Some(existing) = bounded(self.timeout, self.tuitions.find_by_dedup_key(&key)).await?
        {
            return Ok(CreateOutcome::Exists {
                existing_id: existing.id,
            });
        }

        let tuition = TuitionRequest::from_draft(draft, Utc::now());
        match bounded(self.timeout, self.tuitions.insert(tuition)).await {
            Ok(stored) => {
                tracing::info!(tuition_id = %stored.id, student = %stored.student_email, "tuition posted");
                Ok(CreateOutcome::Created {
                    inserted_id: stored.id,
                })
            }
            Err(RepositoryError::Conflict) => {
                let existing = bounded(self.timeout, self.tuitions.find_by_dedup_key(&key))
                    .await?
                    .ok_or_else(|| {
                        MarketplaceError::Conflict("tuition was posted concurrently".to_string())
                    })?;
                Ok(CreateOutcome::Exists {
                    existing_id: existing.id,
                })
            }
            Err(err) => Err(err.into()),
        }
    }

    pub async fn list_all(
        &self,
        status: Option<ListingStatus>,
        search: Option<String>,
        page: Page,
    ) -> Result<TuitionPage, MarketplaceError> {
        let query = TuitionQuery {
            status,
            search: search.filter(|value| !value.trim().is_empty()),
            ..TuitionQuery::default()
        };
        let result = bounded(self.timeout, self.tuitions.list(&query, page)).await?;
        let approved = TuitionQuery {
            status: Some(ListingStatus::Approved),
            ..TuitionQuery::default()
        };
        let count = bounded(self.timeout, self.tuitions.count(&approved)).await?;
        Ok(TuitionPage { result, count })
    }

    pub async fn recent(
        &self,
        status: Option<ListingStatus>,
    ) -> Result<Vec<TuitionRequest>, MarketplaceError> {
        let query = TuitionQuery {
            status,
            ..TuitionQuery::default()
        };
        Ok(bounded(
            self.timeout,
            self.tuitions.list(&query, Page::first(RECENT_LIMIT)),
        )
        .await?)
    }

    /// The caller's own requests; `email` must be the caller's.
    pub async fn mine(
        &self,
        caller: &Caller,
        email: &str,
        status: Option<ListingStatus>,
        page: Page,
    ) -> Result<Vec<TuitionRequest>, MarketplaceError> {
        caller.require_self(email)?;
        let query = TuitionQuery {
            student_email: Some(caller.email.clone()),
            status,
            ..TuitionQuery::default()
        };
        Ok(bounded(self.timeout, self.tuitions.list(&query, page)).await?)
    }

    /// The request when `tutor_email` is the tutor attached to it; empty otherwise.
    pub async fn applied_by(
        &self,
        id: TuitionId,
        tutor_email: &str,
    ) -> Result<Vec<TuitionRequest>, MarketplaceError> {
        let Ok(tutor) = Email::parse(tutor_email) else {
            return Ok(Vec::new());
        };
        let tuition = bounded(self.timeout, self.tuitions.fetch(&id)).await?;
        Ok(tuition
            .filter(|tuition| tuition.tutor_email() == Some(&tutor))
            .into_iter()
            .collect())
    }

    /// A student's requests that currently have a pending or approved tutor.
    pub async fn applied(
        &self,
        caller: &Caller,
        student_email: &str,
        page: Page,
    ) -> Result<Vec<TuitionRequest>, MarketplaceError> {
        let student = Email::parse(student_email)?;
        self.policy.require_owner_or_admin(caller, &student).await?;
        let query = TuitionQuery {
            student_email: Some(student),
            approval_statuses: vec![ApprovalStatus::Pending, ApprovalStatus::Approved],
            ..TuitionQuery::default()
        };
        Ok(bounded(self.timeout, self.tuitions.list(&query, page)).await?)
    }

    pub async fn update_details(
        &self,
        caller: &Caller,
        id: TuitionId,
        update: TuitionDetailsUpdate,
    ) -> Result<TuitionRequest, MarketplaceError> {
        let mut tuition = self.load(&id).await?;
        self.policy
            .require_owner_or_admin(caller, &tuition.student_email)
            .await?;
        tuition.edit(update)?;
        tuition.draft().validate()?;

        let twin = bounded(
            self.timeout,
            self.tuitions.find_by_dedup_key(&tuition.dedup_key),
        )
        .await?;
        if twin.is_some_and(|other| other.id != id) {
            return Err(MarketplaceError::Conflict(
                "an identical tuition request already exists".to_string(),
            ));
        }
        Ok(bounded(self.timeout, self.tuitions.update(tuition)).await?)
    }

    /// Admin listing decision; `email` must be the caller's.
    pub async fn set_listing_status(
        &self,
        caller: &Caller,
        email: &str,
        id: TuitionId,
        status: ListingStatus,
    ) -> Result<TuitionRequest, MarketplaceError> {
        caller.require_self(email)?;
        self.policy.require_role(caller, Role::Admin).await?;
        let mut tuition = self.load(&id).await?;
        if !tuition.set_listing_status(status)? {
            return Ok(tuition);
        }
        let stored = bounded(self.timeout, self.tuitions.update(tuition)).await?;
        tracing::info!(tuition_id = %id, status = %status, by = %caller.email, "listing status changed");
        Ok(stored)
    }

    /// Rejects the attached tutor on the request, then mirrors the decision onto the
    /// tutor's application.
    pub async fn reject_applicant(
        &self,
        caller: &Caller,
        id: TuitionId,
        tutor_email: &Email,
    ) -> Result<TuitionRequest, MarketplaceError> {
        let mut tuition = self.load(&id).await?;
        self.policy
            .require_owner_or_admin(caller, &tuition.student_email)
            .await?;
        tuition.reject_applicant(tutor_email)?;
        let stored = bounded(self.timeout, self.tuitions.update(tuition)).await?;

        if let Err(err) = self.mirror_rejection(&id, tutor_email).await {
            return Err(MarketplaceError::partial(
                "reject",
                &["tuition_rejected"],
                "application_rejected",
                err,
            ));
        }
        tracing::info!(tuition_id = %id, tutor = %tutor_email, "applicant rejected");
        Ok(stored)
    }

    async fn mirror_rejection(
        &self,
        id: &TuitionId,
        tutor_email: &Email,
    ) -> Result<(), MarketplaceError> {
        let application =
            bounded(self.timeout, self.applications.find_for_tutor(id, tutor_email)).await?;
        match application {
            Some(mut application) if application.application_status != ApprovalStatus::Rejected => {
                application.application_status = ApprovalStatus::Rejected;
                bounded(self.timeout, self.applications.update(application)).await?;
                Ok(())
            }
            Some(_) => Ok(()),
            None => {
                tracing::warn!(tuition_id = %id, tutor = %tutor_email, "no application to mirror rejection onto");
                Ok(())
            }
        }
    }

    pub async fn delete(&self, caller: &Caller, id: TuitionId) -> Result<(), MarketplaceError> {
        let tuition = self.load(&id).await?;
        self.policy
            .require_owner_or_admin(caller, &tuition.student_email)
            .await?;
        bounded(self.timeout, self.tuitions.delete(&id)).await?;
        tracing::info!(tuition_id = %id, by = %caller.email, "tuition deleted");
        Ok(())
    }
}
