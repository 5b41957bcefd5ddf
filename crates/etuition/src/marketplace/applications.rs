use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use super::bounded;
use super::domain::{
    Application, ApplicationId, ApplicationUpdate, ApprovalStatus, Page, Role, TuitionId,
    TutorApplicant,
};
use super::error::MarketplaceError;
use super::policy::{AccessPolicy, Caller};
use super::repository::{
    ApplicationQuery, ApplicationRepository, RepositoryError, TuitionRepository,
};

/// Tutor profile submitted with an application.
#[derive(Debug, Clone)]
pub struct ApplyRequest {
    pub tuition_id: TuitionId,
    pub tutor_name: String,
    pub tutor_qualification: String,
    pub tutor_experience: String,
    pub tutor_expected_salary: u64,
    pub tutor_photo: Option<String>,
}

/// Tutor applications and their mirror on the tuition request.
#[derive(Clone)]
pub struct ApplicationService {
    tuitions: Arc<dyn TuitionRepository>,
    applications: Arc<dyn ApplicationRepository>,
    policy: AccessPolicy,
    timeout: Duration,
}

impl ApplicationService {
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

    /// Attaches the tutor to the request, then inserts the application document.
    /// Re-driving after a partial failure completes the missing insert.
    pub async fn apply(
        &self,
        caller: &Caller,
        request: ApplyRequest,
    ) -> Result<Application, MarketplaceError> {
        self.policy.require_role(caller, Role::Tutor).await?;

        let mut tuition = bounded(self.timeout, self.tuitions.fetch(&request.tuition_id))
            .await?
            .ok_or_else(|| MarketplaceError::not_found("tuition not found"))?;

        if bounded(
            self.timeout,
            self.applications
                .find_for_tutor(&tuition.id, &caller.email),
        )
        .await?
        .is_some()
        {
            return Err(MarketplaceError::Conflict(
                "you have already applied to this tuition".to_string(),
            ));
        }

        let applicant = TutorApplicant {
            tutor_name: request.tutor_name.trim().to_string(),
            tutor_email: caller.email.clone(),
            tutor_qualification: request.tutor_qualification.trim().to_string(),
            tutor_experience: request.tutor_experience.trim().to_string(),
            tutor_expected_salary: request.tutor_expected_salary,
            tutor_photo: request.tutor_photo,
            applied_at: Utc::now(),
        };
        applicant.validate()?;
        let application = Application::for_tuition(&tuition, &applicant);

        tuition.attach_applicant(applicant)?;
        bounded(self.timeout, self.tuitions.update(tuition)).await?;

        match bounded(self.timeout, self.applications.insert(application)).await {
            Ok(stored) => {
                tracing::info!(
                    tuition_id = %stored.tuition_id,
                    application_id = %stored.id,
                    tutor = %stored.tutor_email,
                    "tutor applied"
                );
                Ok(stored)
            }
            Err(RepositoryError::Conflict) => Err(MarketplaceError::Conflict(
                "you have already applied to this tuition".to_string(),
            )),
            Err(err) => Err(MarketplaceError::partial(
                "apply",
                &["tuition_updated"],
                "application_inserted",
                err.into(),
            )),
        }
    }

    /// The tutor's own applications, newest first; `email` must be the caller's.
    pub async fn list_for_tutor(
        &self,
        caller: &Caller,
        email: &str,
        status: Option<ApprovalStatus>,
        page: Page,
    ) -> Result<Vec<Application>, MarketplaceError> {
        caller.require_self(email)?;
        self.policy.require_role(caller, Role::Tutor).await?;
        let query = ApplicationQuery {
            tutor_email: Some(caller.email.clone()),
            status,
            ..ApplicationQuery::default()
        };
        Ok(bounded(self.timeout, self.applications.list(&query, page)).await?)
    }

    async fn load_own(
        &self,
        caller: &Caller,
        id: &ApplicationId,
    ) -> Result<Application, MarketplaceError> {
        self.policy.require_role(caller, Role::Tutor).await?;
        let application = bounded(self.timeout, self.applications.fetch(id))
            .await?
            .ok_or_else(|| MarketplaceError::not_found("application not found"))?;
        if application.tutor_email != caller.email {
            return Err(MarketplaceError::forbidden("forbidden access"));
        }
        Ok(application)
    }

    pub async fn edit(
        &self,
        caller: &Caller,
        id: ApplicationId,
        update: ApplicationUpdate,
    ) -> Result<Application, MarketplaceError> {
        let mut application = self.load_own(caller, &id).await?;
        application.revise(update)?;
        Ok(bounded(self.timeout, self.applications.update(application)).await?)
    }

    pub async fn withdraw(&self, caller: &Caller, id: ApplicationId) -> Result<(), MarketplaceError> {
        let application = self.load_own(caller, &id).await?;
        if application.application_status == ApprovalStatus::Approved {
            return Err(MarketplaceError::Conflict(
                "approved applications cannot be deleted".to_string(),
            ));
        }
        bounded(self.timeout, self.applications.delete(&id)).await?;
        tracing::info!(application_id = %id, tutor = %caller.email, "application withdrawn");
        Ok(())
    }
}
