use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::marketplace::domain::{
    Application, ApplicationId, ApprovalCount, Email, Page, PaymentRecord, PaymentTotal,
    ProfileUpdate, Role, TuitionId, TuitionRequest, User, UserId,
};
use crate::marketplace::repository::{
    ApplicationQuery, ApplicationRepository, PaymentQuery, PaymentRepository, RepositoryError,
    TuitionQuery, TuitionRepository, UserQuery, UserRepository,
};

fn paginate<T>(items: Vec<T>, page: Page) -> Vec<T> {
    items.into_iter().skip(page.skip).take(page.limit).collect()
}

#[derive(Default, Clone)]
pub struct InMemoryUserRepository {
    records: Arc<RwLock<HashMap<UserId, User>>>,
}

#[async_trait]
impl UserRepository for InMemoryUserRepository {
    async fn insert(&self, user: User) -> Result<User, RepositoryError> {
        let mut guard = self.records.write().await;
        if guard.values().any(|existing| existing.email == user.email) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(user.id, user.clone());
        Ok(user)
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let guard = self.records.read().await;
        Ok(guard.values().find(|user| &user.email == email).cloned())
    }

    async fn list(&self, query: &UserQuery, page: Page) -> Result<Vec<User>, RepositoryError> {
        let guard = self.records.read().await;
        let mut users: Vec<User> = guard
            .values()
            .filter(|user| query.matches(user))
            .cloned()
            .collect();
        users.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(users, page))
    }

    async fn update_profile(
        &self,
        email: &Email,
        update: &ProfileUpdate,
    ) -> Result<User, RepositoryError> {
        let mut guard = self.records.write().await;
        let user = guard
            .values_mut()
            .find(|user| &user.email == email)
            .ok_or(RepositoryError::NotFound)?;
        if let Some(name) = &update.display_name {
            user.display_name = Some(name.clone());
        }
        if let Some(photo) = &update.photo_url {
            user.photo_url = Some(photo.clone());
        }
        Ok(user.clone())
    }

    async fn set_role(&self, id: &UserId, role: Role) -> Result<User, RepositoryError> {
        let mut guard = self.records.write().await;
        let user = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        user.role = Some(role);
        Ok(user.clone())
    }

    async fn delete(&self, id: &UserId) -> Result<(), RepositoryError> {
        let mut guard = self.records.write().await;
        guard
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryTuitionRepository {
    records: Arc<RwLock<HashMap<TuitionId, TuitionRequest>>>,
}

#[async_trait]
impl TuitionRepository for InMemoryTuitionRepository {
    async fn insert(&self, tuition: TuitionRequest) -> Result<TuitionRequest, RepositoryError> {
        let mut guard = self.records.write().await;
        if guard
            .values()
            .any(|existing| existing.dedup_key == tuition.dedup_key)
        {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(tuition.id, tuition.clone());
        Ok(tuition)
    }

    async fn find_by_dedup_key(
        &self,
        key: &str,
    ) -> Result<Option<TuitionRequest>, RepositoryError> {
        let guard = self.records.read().await;
        Ok(guard
            .values()
            .find(|tuition| tuition.dedup_key == key)
            .cloned())
    }

    async fn fetch(&self, id: &TuitionId) -> Result<Option<TuitionRequest>, RepositoryError> {
        let guard = self.records.read().await;
        Ok(guard.get(id).cloned())
    }

    async fn update(&self, mut tuition: TuitionRequest) -> Result<TuitionRequest, RepositoryError> {
        let mut guard = self.records.write().await;
        if guard
            .values()
            .any(|other| other.id != tuition.id && other.dedup_key == tuition.dedup_key)
        {
            return Err(RepositoryError::Conflict);
        }
        let stored = guard.get_mut(&tuition.id).ok_or(RepositoryError::NotFound)?;
        if stored.revision != tuition.revision {
            return Err(RepositoryError::Conflict);
        }
        tuition.revision += 1;
        *stored = tuition.clone();
        Ok(tuition)
    }

    async fn delete(&self, id: &TuitionId) -> Result<(), RepositoryError> {
        let mut guard = self.records.write().await;
        guard
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }

    async fn list(
        &self,
        query: &TuitionQuery,
        page: Page,
    ) -> Result<Vec<TuitionRequest>, RepositoryError> {
        let guard = self.records.read().await;
        let mut tuitions: Vec<TuitionRequest> = guard
            .values()
            .filter(|tuition| query.matches(tuition))
            .cloned()
            .collect();
        tuitions.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(paginate(tuitions, page))
    }

    async fn count(&self, query: &TuitionQuery) -> Result<u64, RepositoryError> {
        let guard = self.records.read().await;
        Ok(guard.values().filter(|tuition| query.matches(tuition)).count() as u64)
    }

    async fn approval_counts(&self) -> Result<Vec<ApprovalCount>, RepositoryError> {
        let guard = self.records.read().await;
        let mut counts: Vec<ApprovalCount> = Vec::new();
        for tuition in guard.values() {
            match counts
                .iter_mut()
                .find(|entry| entry.approval_status == tuition.approval_status)
            {
                Some(entry) => entry.count += 1,
                None => counts.push(ApprovalCount {
                    approval_status: tuition.approval_status,
                    count: 1,
                }),
            }
        }
        counts.sort_by_key(|entry| entry.approval_status.map(|status| status.label()));
        Ok(counts)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryApplicationRepository {
    records: Arc<RwLock<HashMap<ApplicationId, Application>>>,
}

#[async_trait]
impl ApplicationRepository for InMemoryApplicationRepository {
    async fn insert(&self, application: Application) -> Result<Application, RepositoryError> {
        let mut guard = self.records.write().await;
        if guard.values().any(|existing| {
            existing.tuition_id == application.tuition_id
                && existing.tutor_email == application.tutor_email
        }) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(application.id, application.clone());
        Ok(application)
    }

    async fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        let guard = self.records.read().await;
        Ok(guard.get(id).cloned())
    }

    async fn find_for_tutor(
        &self,
        tuition_id: &TuitionId,
        tutor_email: &Email,
    ) -> Result<Option<Application>, RepositoryError> {
        let guard = self.records.read().await;
        Ok(guard
            .values()
            .find(|application| {
                &application.tuition_id == tuition_id && &application.tutor_email == tutor_email
            })
            .cloned())
    }

    async fn list(
        &self,
        query: &ApplicationQuery,
        page: Page,
    ) -> Result<Vec<Application>, RepositoryError> {
        let guard = self.records.read().await;
        let mut applications: Vec<Application> = guard
            .values()
            .filter(|application| query.matches(application))
            .cloned()
            .collect();
        applications.sort_by(|a, b| b.applied_at.cmp(&a.applied_at));
        Ok(paginate(applications, page))
    }

    async fn update(&self, mut application: Application) -> Result<Application, RepositoryError> {
        let mut guard = self.records.write().await;
        let stored = guard
            .get_mut(&application.id)
            .ok_or(RepositoryError::NotFound)?;
        if stored.revision != application.revision {
            return Err(RepositoryError::Conflict);
        }
        application.revision += 1;
        *stored = application.clone();
        Ok(application)
    }

    async fn delete(&self, id: &ApplicationId) -> Result<(), RepositoryError> {
        let mut guard = self.records.write().await;
        guard
            .remove(id)
            .map(|_| ())
            .ok_or(RepositoryError::NotFound)
    }
}

#[derive(Default, Clone)]
pub struct InMemoryPaymentRepository {
    records: Arc<RwLock<Vec<PaymentRecord>>>,
}

#[async_trait]
impl PaymentRepository for InMemoryPaymentRepository {
    async fn insert(&self, record: PaymentRecord) -> Result<PaymentRecord, RepositoryError> {
        let mut guard = self.records.write().await;
        if guard
            .iter()
            .any(|existing| existing.transaction_id == record.transaction_id)
        {
            return Err(RepositoryError::Conflict);
        }
        guard.push(record.clone());
        Ok(record)
    }

    async fn find_by_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<PaymentRecord>, RepositoryError> {
        let guard = self.records.read().await;
        Ok(guard
            .iter()
            .find(|record| record.transaction_id == transaction_id)
            .cloned())
    }

    async fn list(
        &self,
        query: &PaymentQuery,
        page: Page,
    ) -> Result<Vec<PaymentRecord>, RepositoryError> {
        let guard = self.records.read().await;
        let mut records: Vec<PaymentRecord> = guard
            .iter()
            .filter(|record| query.matches(record))
            .cloned()
            .collect();
        records.sort_by(|a, b| b.paid_at.cmp(&a.paid_at));
        Ok(paginate(records, page))
    }

    async fn totals_by_status(&self) -> Result<Vec<PaymentTotal>, RepositoryError> {
        let guard = self.records.read().await;
        let mut totals: Vec<PaymentTotal> = Vec::new();
        for record in guard.iter() {
            let group = record.payment_status.label();
            match totals.iter_mut().find(|entry| entry.group == group) {
                Some(entry) => {
                    entry.total_amount_minor += record.amount_minor;
                    entry.count += 1;
                }
                None => totals.push(PaymentTotal {
                    group: group.to_string(),
                    total_amount_minor: record.amount_minor,
                    count: 1,
                }),
            }
        }
        Ok(totals)
    }

    async fn tutor_total(&self, tutor_email: &Email) -> Result<PaymentTotal, RepositoryError> {
        let guard = self.records.read().await;
        let (total, count) = guard
            .iter()
            .filter(|record| &record.tutor_email == tutor_email)
            .fold((0_i64, 0_u64), |(total, count), record| {
                (total + record.amount_minor, count + 1)
            });
        Ok(PaymentTotal {
            group: tutor_email.to_string(),
            total_amount_minor: total,
            count,
        })
    }
}
