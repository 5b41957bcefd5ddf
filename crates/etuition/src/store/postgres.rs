use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Postgres, QueryBuilder, Row};
use std::time::Duration;
use uuid::Uuid;

use crate::config::StoreConfig;
use crate::marketplace::domain::{
    Application, ApplicationId, ApprovalCount, ApprovalStatus, Email, ListingStatus, Page,
    PaymentId, PaymentRecord, PaymentStatus, PaymentTotal, ProfileUpdate, Role, TuitionId,
    TuitionRequest, TutorApplicant, User, UserId,
};
use crate::marketplace::repository::{
    ApplicationQuery, ApplicationRepository, PaymentQuery, PaymentRepository, RepositoryError,
    TuitionQuery, TuitionRepository, UserQuery, UserRepository,
};

/// Connects to the database and applies the embedded migrations.
pub async fn connect(url: &str, config: &StoreConfig) -> Result<PgPool, sqlx::Error> {
    let pool = PgPoolOptions::new()
        .max_connections(config.max_connections)
        .acquire_timeout(Duration::from_secs(5))
        .connect(url)
        .await?;
    tracing::info!("connected to postgres");

    sqlx::migrate!("./migrations").run(&pool).await?;
    tracing::info!("database migrations applied");
    Ok(pool)
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound,
            sqlx::Error::PoolTimedOut => RepositoryError::Timeout,
            sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict,
            other => RepositoryError::Unavailable(other.to_string()),
        }
    }
}

fn corrupt(column: &str) -> RepositoryError {
    RepositoryError::Unavailable(format!("unreadable value in column {column}"))
}

fn email_column(row: &PgRow, column: &str) -> Result<Email, RepositoryError> {
    let raw: String = row.try_get(column)?;
    Email::parse(&raw).map_err(|_| corrupt(column))
}

fn amount_column(row: &PgRow, column: &str) -> Result<u64, RepositoryError> {
    let raw: i64 = row.try_get(column)?;
    u64::try_from(raw).map_err(|_| corrupt(column))
}

fn to_i64(value: u64, column: &str) -> Result<i64, RepositoryError> {
    i64::try_from(value)
        .map_err(|_| RepositoryError::Unavailable(format!("{column} exceeds the storable range")))
}

fn limit_offset(page: Page) -> (i64, i64) {
    (page.limit as i64, page.skip as i64)
}

#[derive(Clone)]
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const USER_COLUMNS: &str = "id, email, display_name, photo_url, role, created_at";

fn user_from_row(row: &PgRow) -> Result<User, RepositoryError> {
    let role: Option<String> = row.try_get("role")?;
    let role = match role {
        Some(raw) => Some(Role::parse(&raw).ok_or_else(|| corrupt("role"))?),
        None => None,
    };
    Ok(User {
        id: UserId(row.try_get("id")?),
        email: email_column(row, "email")?,
        display_name: row.try_get("display_name")?,
        photo_url: row.try_get("photo_url")?,
        role,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn insert(&self, user: User) -> Result<User, RepositoryError> {
        sqlx::query(
            "INSERT INTO users (id, email, display_name, photo_url, role, created_at)
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(user.id.0)
        .bind(user.email.as_str())
        .bind(&user.display_name)
        .bind(&user.photo_url)
        .bind(user.role.map(Role::label))
        .bind(user.created_at)
        .execute(&self.pool)
        .await?;
        Ok(user)
    }

    async fn find_by_email(&self, email: &Email) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE email = $1"))
            .bind(email.as_str())
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn list(&self, query: &UserQuery, page: Page) -> Result<Vec<User>, RepositoryError> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {USER_COLUMNS} FROM users WHERE TRUE"));
        if let Some(email) = &query.email {
            builder
                .push(" AND email = ")
                .push_bind(email.as_str().to_string());
        }
        if let Some(role) = query.role {
            builder.push(" AND role = ").push_bind(role.label());
        }
        if let Some(search) = &query.search {
            let pattern = format!("%{}%", search.to_lowercase());
            builder
                .push(" AND (email LIKE ")
                .push_bind(pattern.clone())
                .push(" OR LOWER(display_name) LIKE ")
                .push_bind(pattern)
                .push(")");
        }
        let (limit, offset) = limit_offset(page);
        builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(user_from_row).collect()
    }

    async fn update_profile(
        &self,
        email: &Email,
        update: &ProfileUpdate,
    ) -> Result<User, RepositoryError> {
        let row = sqlx::query(&format!(
            "UPDATE users
             SET display_name = COALESCE($2, display_name),
                 photo_url = COALESCE($3, photo_url)
             WHERE email = $1
             RETURNING {USER_COLUMNS}"
        ))
        .bind(email.as_str())
        .bind(&update.display_name)
        .bind(&update.photo_url)
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;
        user_from_row(&row)
    }

    async fn set_role(&self, id: &UserId, role: Role) -> Result<User, RepositoryError> {
        let row = sqlx::query(&format!(
            "UPDATE users SET role = $2 WHERE id = $1 RETURNING {USER_COLUMNS}"
        ))
        .bind(id.0)
        .bind(role.label())
        .fetch_optional(&self.pool)
        .await?
        .ok_or(RepositoryError::NotFound)?;
        user_from_row(&row)
    }

    async fn delete(&self, id: &UserId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM users WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgTuitionRepository {
    pool: PgPool,
}

impl PgTuitionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const TUITION_COLUMNS: &str = "id, student_email, student_name, subject, class, location, budget, \
     status, approval_status, payment_status, tutor_name, tutor_email, tutor_qualification, \
     tutor_experience, tutor_expected_salary, tutor_photo, tutor_applied_at, dedup_key, \
     revision, created_at";

fn tuition_from_row(row: &PgRow) -> Result<TuitionRequest, RepositoryError> {
    let status: String = row.try_get("status")?;
    let approval_status: Option<String> = row.try_get("approval_status")?;
    let payment_status: Option<String> = row.try_get("payment_status")?;
    let tutor_email: Option<String> = row.try_get("tutor_email")?;

    let applicant = match tutor_email {
        Some(raw) => {
            let salary: Option<i64> = row.try_get("tutor_expected_salary")?;
            let applied_at: Option<DateTime<Utc>> = row.try_get("tutor_applied_at")?;
            let name: Option<String> = row.try_get("tutor_name")?;
            let qualification: Option<String> = row.try_get("tutor_qualification")?;
            let experience: Option<String> = row.try_get("tutor_experience")?;
            Some(TutorApplicant {
                tutor_name: name.unwrap_or_default(),
                tutor_email: Email::parse(&raw).map_err(|_| corrupt("tutor_email"))?,
                tutor_qualification: qualification.unwrap_or_default(),
                tutor_experience: experience.unwrap_or_default(),
                tutor_expected_salary: u64::try_from(salary.unwrap_or_default())
                    .map_err(|_| corrupt("tutor_expected_salary"))?,
                tutor_photo: row.try_get("tutor_photo")?,
                applied_at: applied_at.ok_or_else(|| corrupt("tutor_applied_at"))?,
            })
        }
        None => None,
    };

    let revision: i64 = row.try_get("revision")?;
    Ok(TuitionRequest {
        id: TuitionId(row.try_get("id")?),
        student_email: email_column(row, "student_email")?,
        student_name: row.try_get("student_name")?,
        subject: row.try_get("subject")?,
        class: row.try_get("class")?,
        location: row.try_get("location")?,
        budget: amount_column(row, "budget")?,
        status: ListingStatus::parse(&status).ok_or_else(|| corrupt("status"))?,
        approval_status: match approval_status {
            Some(raw) => Some(ApprovalStatus::parse(&raw).ok_or_else(|| corrupt("approval_status"))?),
            None => None,
        },
        payment_status: match payment_status {
            Some(raw) => Some(PaymentStatus::parse(&raw).ok_or_else(|| corrupt("payment_status"))?),
            None => None,
        },
        applicant,
        created_at: row.try_get("created_at")?,
        dedup_key: row.try_get("dedup_key")?,
        revision: u64::try_from(revision).map_err(|_| corrupt("revision"))?,
    })
}

fn push_tuition_filters(builder: &mut QueryBuilder<'_, Postgres>, query: &TuitionQuery) {
    builder.push(" WHERE TRUE");
    if let Some(email) = &query.student_email {
        builder
            .push(" AND student_email = ")
            .push_bind(email.as_str().to_string());
    }
    if let Some(status) = query.status {
        builder.push(" AND status = ").push_bind(status.label());
    }
    if !query.approval_statuses.is_empty() {
        let labels: Vec<String> = query
            .approval_statuses
            .iter()
            .map(|status| status.label().to_string())
            .collect();
        builder
            .push(" AND approval_status = ANY(")
            .push_bind(labels)
            .push(")");
    }
    if let Some(search) = &query.search {
        let pattern = format!("%{}%", search.to_lowercase());
        builder
            .push(" AND (LOWER(subject) LIKE ")
            .push_bind(pattern.clone())
            .push(" OR LOWER(class) LIKE ")
            .push_bind(pattern)
            .push(")");
    }
}

#[async_trait]
impl TuitionRepository for PgTuitionRepository {
    async fn insert(&self, tuition: TuitionRequest) -> Result<TuitionRequest, RepositoryError> {
        sqlx::query(
            "INSERT INTO tuitions (id, student_email, student_name, subject, class, location,
                 budget, status, dedup_key, revision, created_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(tuition.id.0)
        .bind(tuition.student_email.as_str())
        .bind(&tuition.student_name)
        .bind(&tuition.subject)
        .bind(&tuition.class)
        .bind(&tuition.location)
        .bind(to_i64(tuition.budget, "budget")?)
        .bind(tuition.status.label())
        .bind(&tuition.dedup_key)
        .bind(to_i64(tuition.revision, "revision")?)
        .bind(tuition.created_at)
        .execute(&self.pool)
        .await?;
        Ok(tuition)
    }

    async fn find_by_dedup_key(
        &self,
        key: &str,
    ) -> Result<Option<TuitionRequest>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {TUITION_COLUMNS} FROM tuitions WHERE dedup_key = $1"
        ))
        .bind(key)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(tuition_from_row).transpose()
    }

    async fn fetch(&self, id: &TuitionId) -> Result<Option<TuitionRequest>, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {TUITION_COLUMNS} FROM tuitions WHERE id = $1"))
            .bind(id.0)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(tuition_from_row).transpose()
    }

    async fn update(&self, tuition: TuitionRequest) -> Result<TuitionRequest, RepositoryError> {
        let applicant = tuition.applicant.as_ref();
        let row = sqlx::query(&format!(
            "UPDATE tuitions
             SET student_name = $3, subject = $4, class = $5, budget = $6, status = $7,
                 approval_status = $8, payment_status = $9, tutor_name = $10,
                 tutor_email = $11, tutor_qualification = $12, tutor_experience = $13,
                 tutor_expected_salary = $14, tutor_photo = $15, tutor_applied_at = $16,
                 dedup_key = $17, revision = revision + 1
             WHERE id = $1 AND revision = $2
             RETURNING {TUITION_COLUMNS}"
        ))
        .bind(tuition.id.0)
        .bind(to_i64(tuition.revision, "revision")?)
        .bind(&tuition.student_name)
        .bind(&tuition.subject)
        .bind(&tuition.class)
        .bind(to_i64(tuition.budget, "budget")?)
        .bind(tuition.status.label())
        .bind(tuition.approval_status.map(ApprovalStatus::label))
        .bind(tuition.payment_status.map(PaymentStatus::label))
        .bind(applicant.map(|a| a.tutor_name.clone()))
        .bind(applicant.map(|a| a.tutor_email.as_str().to_string()))
        .bind(applicant.map(|a| a.tutor_qualification.clone()))
        .bind(applicant.map(|a| a.tutor_experience.clone()))
        .bind(
            applicant
                .map(|a| to_i64(a.tutor_expected_salary, "tutor_expected_salary"))
                .transpose()?,
        )
        .bind(applicant.and_then(|a| a.tutor_photo.clone()))
        .bind(applicant.map(|a| a.applied_at))
        .bind(&tuition.dedup_key)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => tuition_from_row(&row),
            None => {
                let exists = sqlx::query("SELECT 1 FROM tuitions WHERE id = $1")
                    .bind(tuition.id.0)
                    .fetch_optional(&self.pool)
                    .await?;
                Err(match exists {
                    Some(_) => RepositoryError::Conflict,
                    None => RepositoryError::NotFound,
                })
            }
        }
    }

    async fn delete(&self, id: &TuitionId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM tuitions WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn list(
        &self,
        query: &TuitionQuery,
        page: Page,
    ) -> Result<Vec<TuitionRequest>, RepositoryError> {
        let mut builder =
            QueryBuilder::<Postgres>::new(format!("SELECT {TUITION_COLUMNS} FROM tuitions"));
        push_tuition_filters(&mut builder, query);
        let (limit, offset) = limit_offset(page);
        builder
            .push(" ORDER BY created_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(tuition_from_row).collect()
    }

    async fn count(&self, query: &TuitionQuery) -> Result<u64, RepositoryError> {
        let mut builder = QueryBuilder::<Postgres>::new("SELECT COUNT(*) AS total FROM tuitions");
        push_tuition_filters(&mut builder, query);
        let row = builder.build().fetch_one(&self.pool).await?;
        let total: i64 = row.try_get("total")?;
        u64::try_from(total).map_err(|_| corrupt("total"))
    }

    async fn approval_counts(&self) -> Result<Vec<ApprovalCount>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT approval_status, COUNT(*) AS total
             FROM tuitions
             GROUP BY approval_status
             ORDER BY approval_status NULLS FIRST",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let status: Option<String> = row.try_get("approval_status")?;
                let total: i64 = row.try_get("total")?;
                Ok(ApprovalCount {
                    approval_status: match status {
                        Some(raw) => Some(
                            ApprovalStatus::parse(&raw)
                                .ok_or_else(|| corrupt("approval_status"))?,
                        ),
                        None => None,
                    },
                    count: u64::try_from(total).map_err(|_| corrupt("total"))?,
                })
            })
            .collect()
    }
}

#[derive(Clone)]
pub struct PgApplicationRepository {
    pool: PgPool,
}

impl PgApplicationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const APPLICATION_COLUMNS: &str = "id, tuition_id, tutor_email, tutor_name, student_email, \
     student_name, subject, class, location, tutor_qualification, tutor_experience, \
     tutor_expected_salary, application_status, revision, applied_at";

fn application_from_row(row: &PgRow) -> Result<Application, RepositoryError> {
    let status: String = row.try_get("application_status")?;
    let revision: i64 = row.try_get("revision")?;
    Ok(Application {
        id: ApplicationId(row.try_get("id")?),
        tuition_id: TuitionId(row.try_get("tuition_id")?),
        tutor_email: email_column(row, "tutor_email")?,
        tutor_name: row.try_get("tutor_name")?,
        student_email: email_column(row, "student_email")?,
        student_name: row.try_get("student_name")?,
        subject: row.try_get("subject")?,
        class: row.try_get("class")?,
        location: row.try_get("location")?,
        tutor_qualification: row.try_get("tutor_qualification")?,
        tutor_experience: row.try_get("tutor_experience")?,
        tutor_expected_salary: amount_column(row, "tutor_expected_salary")?,
        application_status: ApprovalStatus::parse(&status)
            .ok_or_else(|| corrupt("application_status"))?,
        applied_at: row.try_get("applied_at")?,
        revision: u64::try_from(revision).map_err(|_| corrupt("revision"))?,
    })
}

#[async_trait]
impl ApplicationRepository for PgApplicationRepository {
    async fn insert(&self, application: Application) -> Result<Application, RepositoryError> {
        sqlx::query(
            "INSERT INTO applications (id, tuition_id, tutor_email, tutor_name, student_email,
                 student_name, subject, class, location, tutor_qualification, tutor_experience,
                 tutor_expected_salary, application_status, revision, applied_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)",
        )
        .bind(application.id.0)
        .bind(application.tuition_id.0)
        .bind(application.tutor_email.as_str())
        .bind(&application.tutor_name)
        .bind(application.student_email.as_str())
        .bind(&application.student_name)
        .bind(&application.subject)
        .bind(&application.class)
        .bind(&application.location)
        .bind(&application.tutor_qualification)
        .bind(&application.tutor_experience)
        .bind(to_i64(application.tutor_expected_salary, "tutor_expected_salary")?)
        .bind(application.application_status.label())
        .bind(to_i64(application.revision, "revision")?)
        .bind(application.applied_at)
        .execute(&self.pool)
        .await?;
        Ok(application)
    }

    async fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE id = $1"
        ))
        .bind(id.0)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(application_from_row).transpose()
    }

    async fn find_for_tutor(
        &self,
        tuition_id: &TuitionId,
        tutor_email: &Email,
    ) -> Result<Option<Application>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications
             WHERE tuition_id = $1 AND tutor_email = $2"
        ))
        .bind(tuition_id.0)
        .bind(tutor_email.as_str())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(application_from_row).transpose()
    }

    async fn list(
        &self,
        query: &ApplicationQuery,
        page: Page,
    ) -> Result<Vec<Application>, RepositoryError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {APPLICATION_COLUMNS} FROM applications WHERE TRUE"
        ));
        if let Some(email) = &query.tutor_email {
            builder
                .push(" AND tutor_email = ")
                .push_bind(email.as_str().to_string());
        }
        if let Some(email) = &query.student_email {
            builder
                .push(" AND student_email = ")
                .push_bind(email.as_str().to_string());
        }
        if let Some(id) = query.tuition_id {
            builder.push(" AND tuition_id = ").push_bind(id.0);
        }
        if let Some(status) = query.status {
            builder
                .push(" AND application_status = ")
                .push_bind(status.label());
        }
        let (limit, offset) = limit_offset(page);
        builder
            .push(" ORDER BY applied_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(application_from_row).collect()
    }

    async fn update(&self, application: Application) -> Result<Application, RepositoryError> {
        let row = sqlx::query(&format!(
            "UPDATE applications
             SET tutor_qualification = $3, tutor_experience = $4, tutor_expected_salary = $5,
                 application_status = $6, revision = revision + 1
             WHERE id = $1 AND revision = $2
             RETURNING {APPLICATION_COLUMNS}"
        ))
        .bind(application.id.0)
        .bind(to_i64(application.revision, "revision")?)
        .bind(&application.tutor_qualification)
        .bind(&application.tutor_experience)
        .bind(to_i64(application.tutor_expected_salary, "tutor_expected_salary")?)
        .bind(application.application_status.label())
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => application_from_row(&row),
            None => {
                let exists = sqlx::query("SELECT 1 FROM applications WHERE id = $1")
                    .bind(application.id.0)
                    .fetch_optional(&self.pool)
                    .await?;
                Err(match exists {
                    Some(_) => RepositoryError::Conflict,
                    None => RepositoryError::NotFound,
                })
            }
        }
    }

    async fn delete(&self, id: &ApplicationId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM applications WHERE id = $1")
            .bind(id.0)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[derive(Clone)]
pub struct PgPaymentRepository {
    pool: PgPool,
}

impl PgPaymentRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const PAYMENT_COLUMNS: &str = "id, transaction_id, amount_minor, currency, student_email, \
     tutor_email, tuition_id, subject, payment_status, paid_at";

fn payment_from_row(row: &PgRow) -> Result<PaymentRecord, RepositoryError> {
    let status: String = row.try_get("payment_status")?;
    Ok(PaymentRecord {
        id: PaymentId(row.try_get::<Uuid, _>("id")?),
        transaction_id: row.try_get("transaction_id")?,
        amount_minor: row.try_get("amount_minor")?,
        currency: row.try_get("currency")?,
        student_email: email_column(row, "student_email")?,
        tutor_email: email_column(row, "tutor_email")?,
        tuition_id: TuitionId(row.try_get("tuition_id")?),
        subject: row.try_get("subject")?,
        payment_status: PaymentStatus::parse(&status).ok_or_else(|| corrupt("payment_status"))?,
        paid_at: row.try_get("paid_at")?,
    })
}

#[async_trait]
impl PaymentRepository for PgPaymentRepository {
    async fn insert(&self, record: PaymentRecord) -> Result<PaymentRecord, RepositoryError> {
        sqlx::query(
            "INSERT INTO payments (id, transaction_id, amount_minor, currency, student_email,
                 tutor_email, tuition_id, subject, payment_status, paid_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        )
        .bind(record.id.0)
        .bind(&record.transaction_id)
        .bind(record.amount_minor)
        .bind(&record.currency)
        .bind(record.student_email.as_str())
        .bind(record.tutor_email.as_str())
        .bind(record.tuition_id.0)
        .bind(&record.subject)
        .bind(record.payment_status.label())
        .bind(record.paid_at)
        .execute(&self.pool)
        .await?;
        Ok(record)
    }

    async fn find_by_transaction(
        &self,
        transaction_id: &str,
    ) -> Result<Option<PaymentRecord>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE transaction_id = $1"
        ))
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(payment_from_row).transpose()
    }

    async fn list(
        &self,
        query: &PaymentQuery,
        page: Page,
    ) -> Result<Vec<PaymentRecord>, RepositoryError> {
        let mut builder = QueryBuilder::<Postgres>::new(format!(
            "SELECT {PAYMENT_COLUMNS} FROM payments WHERE TRUE"
        ));
        if let Some(email) = &query.student_email {
            builder
                .push(" AND student_email = ")
                .push_bind(email.as_str().to_string());
        }
        if let Some(email) = &query.tutor_email {
            builder
                .push(" AND tutor_email = ")
                .push_bind(email.as_str().to_string());
        }
        let (limit, offset) = limit_offset(page);
        builder
            .push(" ORDER BY paid_at DESC LIMIT ")
            .push_bind(limit)
            .push(" OFFSET ")
            .push_bind(offset);
        let rows = builder.build().fetch_all(&self.pool).await?;
        rows.iter().map(payment_from_row).collect()
    }

    async fn totals_by_status(&self) -> Result<Vec<PaymentTotal>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT payment_status, COALESCE(SUM(amount_minor), 0)::BIGINT AS total, COUNT(*) AS n
             FROM payments
             GROUP BY payment_status
             ORDER BY payment_status",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let count: i64 = row.try_get("n")?;
                Ok(PaymentTotal {
                    group: row.try_get("payment_status")?,
                    total_amount_minor: row.try_get("total")?,
                    count: u64::try_from(count).map_err(|_| corrupt("n"))?,
                })
            })
            .collect()
    }

    async fn tutor_total(&self, tutor_email: &Email) -> Result<PaymentTotal, RepositoryError> {
        let row = sqlx::query(
            "SELECT COALESCE(SUM(amount_minor), 0)::BIGINT AS total, COUNT(*) AS n
             FROM payments
             WHERE tutor_email = $1",
        )
        .bind(tutor_email.as_str())
        .fetch_one(&self.pool)
        .await?;
        let count: i64 = row.try_get("n")?;
        Ok(PaymentTotal {
            group: tutor_email.to_string(),
            total_amount_minor: row.try_get("total")?,
            count: u64::try_from(count).map_err(|_| corrupt("n"))?,
        })
    }
}
