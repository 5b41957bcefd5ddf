use async_trait::async_trait;

use super::domain::{
    Application, ApplicationId, ApprovalCount, ApprovalStatus, Email, ListingStatus, Page,
    PaymentRecord, PaymentTotal, ProfileUpdate, Role, TuitionId, TuitionRequest, User, UserId,
};

/// Filters for the tuition collection. Unset fields match everything.
#[derive(Debug, Clone, Default)]
pub struct TuitionQuery {
    pub student_email: Option<Email>,
    pub status: Option<ListingStatus>,
    /// Matches when the request's approval status is one of these.
    pub approval_statuses: Vec<ApprovalStatus>,
    /// Case-insensitive substring match on subject or class.
    pub search: Option<String>,
}

impl TuitionQuery {
    pub fn matches(&self, tuition: &TuitionRequest) -> bool {
        if let Some(email) = &self.student_email {
            if &tuition.student_email != email {
                return false;
            }
        }
        if let Some(status) = self.status {
            if tuition.status != status {
                return false;
            }
        }
        if !self.approval_statuses.is_empty() {
            match tuition.approval_status {
                Some(current) if self.approval_statuses.contains(&current) => {}
                _ => return false,
            }
        }
        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !tuition.subject.to_lowercase().contains(&needle)
                && !tuition.class.to_lowercase().contains(&needle)
            {
                return false;
            }
        }
        true
    }
}

#[derive(Debug, Clone, Default)]
pub struct ApplicationQuery {
    pub tutor_email: Option<Email>,
    pub student_email: Option<Email>,
    pub tuition_id: Option<TuitionId>,
    pub status: Option<ApprovalStatus>,
}

impl ApplicationQuery {
    pub fn matches(&self, application: &Application) -> bool {
        self.tutor_email
            .as_ref()
            .map_or(true, |email| &application.tutor_email == email)
            && self
                .student_email
                .as_ref()
                .map_or(true, |email| &application.student_email == email)
            && self
                .tuition_id
                .map_or(true, |id| application.tuition_id == id)
            && self
                .status
                .map_or(true, |status| application.application_status == status)
    }
}

#[derive(Debug, Clone, Default)]
pub struct PaymentQuery {
    pub student_email: Option<Email>,
    pub tutor_email: Option<Email>,
}

impl PaymentQuery {
    pub fn matches(&self, record: &PaymentRecord) -> bool {
        self.student_email
            .as_ref()
            .map_or(true, |email| &record.student_email == email)
            && self
                .tutor_email
                .as_ref()
                .map_or(true, |email| &record.tutor_email == email)
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserQuery {
    pub email: Option<Email>,
    pub role: Option<Role>,
    /// Case-insensitive substring match on display name or e-mail.
    pub search: Option<String>,
}

impl UserQuery {
    pub fn matches(&self, user: &User) -> bool {
        if let Some(email) = &self.email {
            if &user.email != email {
                return false;
            }
        }
        if let Some(role) = self.role {
            if user.role != Some(role) {
                return false;
            }
        }
        match &self.search {
            Some(search) => {
                let needle = search.to_lowercase();
                user.email.as_str().contains(&needle)
                    || user
                        .display_name
                        .as_deref()
                        .is_some_and(|name| name.to_lowercase().contains(&needle))
            }
            None => true,
        }
    }
}

/// User documents, unique by e-mail.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert(&self, user: User) -> Result<User, RepositoryError>;
    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError>;
    /// Newest first.
    async fn list(&self, query: &UserQuery, page: Page) -> Result<Vec<User>, RepositoryError>;
    async fn update_profile(
        &self,
        email: &Email,
        update: &ProfileUpdate,
    ) -> Result<User, RepositoryError>;
    async fn set_role(&self, id: &UserId, role: Role) -> Result<User, RepositoryError>;
    async fn delete(&self, id: &UserId) -> Result<(), RepositoryError>;
}

/// Tuition requests, unique by dedup key. Updates are compare-and-set on `revision`.
#[async_trait]
pub trait TuitionRepository: Send + Sync {
    async fn insert(&self, tuition: TuitionRequest) -> Result<TuitionRequest, RepositoryError>;
    async fn find_by_dedup_key(&self, key: &str)
        -> Result<Option<TuitionRequest>, RepositoryError>;
    async fn fetch(&self, id: &TuitionId) -> Result<Option<TuitionRequest>, RepositoryError>;
    /// Stores `tuition` if the persisted revision still equals `tuition.revision`, and
    /// returns the stored record with the bumped revision.
    async fn update(&self, tuition: TuitionRequest) -> Result<TuitionRequest, RepositoryError>;
    async fn delete(&self, id: &TuitionId) -> Result<(), RepositoryError>;
    /// Newest first.
    async fn list(
        &self,
        query: &TuitionQuery,
        page: Page,
    ) -> Result<Vec<TuitionRequest>, RepositoryError>;
    async fn count(&self, query: &TuitionQuery) -> Result<u64, RepositoryError>;
    async fn approval_counts(&self) -> Result<Vec<ApprovalCount>, RepositoryError>;
}

/// Applications, unique by (tuition, tutor).
#[async_trait]
pub trait ApplicationRepository: Send + Sync {
    async fn insert(&self, application: Application) -> Result<Application, RepositoryError>;
    async fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError>;
    async fn find_for_tutor(
        &self,
        tuition_id: &TuitionId,
        tutor_email: &Email,
    ) -> Result<Option<Application>, RepositoryError>;
    /// Most recently applied first.
    async fn list(
        &self,
        query: &ApplicationQuery,
        page: Page,
    ) -> Result<Vec<Application>, RepositoryError>;
    async fn update(&self, application: Application) -> Result<Application, RepositoryError>;
    async fn delete(&self, id: &ApplicationId) -> Result<(), RepositoryError>;
}

/// Append-only payment ledger, unique by transaction id.
#[async_trait]
pub trait PaymentRepository: Send + Sync {
    async fn insert(&self, record: PaymentRecord) -> Result<PaymentRecord, RepositoryError>;
    async fn find_by_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<PaymentRecord>, RepositoryError>;
    /// Most recently paid first.
    async fn list(
        &self,
        query: &PaymentQuery,
        page: Page,
    ) -> Result<Vec<PaymentRecord>, RepositoryError>;
    async fn totals_by_status(&self) -> Result<Vec<PaymentTotal>, RepositoryError>;
    async fn tutor_total(&self, tutor_email: &Email) -> Result<PaymentTotal, RepositoryError>;
}

/// Error enumeration for repository failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    /// Unique key taken, or a compare-and-set lost against a newer revision.
    #[error("record already exists or was modified concurrently")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("repository timed out")]
    Timeout,
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}
