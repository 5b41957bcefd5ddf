use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    extract::{FromRequest, FromRequestParts, Path, Query, Request, State},
    http::{header::AUTHORIZATION, request::Parts, StatusCode},
    response::{IntoResponse, Response},
    routing::{delete, get, patch, post},
    Json, Router,
};
use serde::de::{self, DeserializeOwned, Deserializer};
use serde::Deserialize;
use serde_json::json;

use super::applications::{ApplicationService, ApplyRequest};
use super::domain::{
    ApplicationId, ApplicationUpdate, ApprovalStatus, Email, ListingStatus, Page, ProfileUpdate,
    Role, TuitionDetailsUpdate, TuitionDraft, TuitionId, UserId,
};
use super::error::MarketplaceError;
use super::policy::{AccessPolicy, Caller};
use super::reporting::ReportingService;
use super::repository::UserQuery;
use super::settlement::SettlementService;
use super::tuitions::{CreateOutcome, TuitionService};
use super::users::{RegisterOutcome, Registration, UserService};
use crate::identity::TokenVerifier;
use crate::payments::PaymentGateway;
use crate::store::Stores;

/// Services and the identity gate shared by every handler.
#[derive(Clone)]
pub struct MarketplaceState {
    pub users: Arc<UserService>,
    pub tuitions: Arc<TuitionService>,
    pub applications: Arc<ApplicationService>,
    pub settlement: Arc<SettlementService>,
    pub reporting: Arc<ReportingService>,
    verifier: Arc<dyn TokenVerifier>,
}

impl MarketplaceState {
    pub fn new(
        stores: Stores,
        verifier: Arc<dyn TokenVerifier>,
        gateway: Arc<dyn PaymentGateway>,
        currency: impl Into<String>,
        timeout: Duration,
    ) -> Self {
        let policy = AccessPolicy::new(stores.users.clone(), timeout);
        Self {
            users: Arc::new(UserService::new(stores.users.clone(), timeout)),
            tuitions: Arc::new(TuitionService::new(
                stores.tuitions.clone(),
                stores.applications.clone(),
                policy.clone(),
                timeout,
            )),
            applications: Arc::new(ApplicationService::new(
                stores.tuitions.clone(),
                stores.applications.clone(),
                policy.clone(),
                timeout,
            )),
            settlement: Arc::new(SettlementService::new(
                stores.tuitions.clone(),
                stores.applications.clone(),
                stores.payments.clone(),
                gateway,
                policy.clone(),
                currency,
                timeout,
            )),
            reporting: Arc::new(ReportingService::new(
                stores.tuitions,
                stores.payments,
                policy,
                timeout,
            )),
            verifier,
        }
    }
}

/// Identity gate: resolves the bearer credential before any handler code runs.
impl FromRequestParts<MarketplaceState> for Caller {
    type Rejection = MarketplaceError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &MarketplaceState,
    ) -> Result<Self, Self::Rejection> {
        let token = parts
            .headers
            .get(AUTHORIZATION)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.strip_prefix("Bearer "))
            .map(str::trim)
            .filter(|token| !token.is_empty())
            .ok_or_else(unauthorized)?;

        match state.verifier.verify(token).await {
            Ok(identity) => Ok(Caller::new(identity.email)),
            Err(err) if err.is_credential_error() => {
                tracing::debug!(error = %err, "credential rejected");
                Err(unauthorized())
            }
            Err(err) => Err(err.into()),
        }
    }
}

fn unauthorized() -> MarketplaceError {
    MarketplaceError::Unauthorized("unauthorized access".to_string())
}

/// JSON body whose rejections use the marketplace error envelope.
pub struct Body<T>(pub T);

impl<S, T> FromRequest<S> for Body<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = MarketplaceError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Body(value)),
            Err(rejection) => Err(MarketplaceError::Validation(rejection.body_text())),
        }
    }
}

/// Query string whose rejections use the marketplace error envelope.
pub struct Params<T>(pub T);

impl<S, T> FromRequestParts<S> for Params<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = MarketplaceError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        match Query::<T>::from_request_parts(parts, state).await {
            Ok(Query(value)) => Ok(Params(value)),
            Err(rejection) => Err(MarketplaceError::Validation(rejection.body_text())),
        }
    }
}

/// Largest amount the document store can hold.
const MAX_AMOUNT: u64 = i64::MAX as u64;

/// Accepts amounts sent either as JSON numbers or numeric strings.
fn deserialize_amount<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Whole(u64),
        Number(f64),
        Text(String),
    }

    let amount = match Raw::deserialize(deserializer)? {
        Raw::Whole(value) => value,
        Raw::Number(value) => whole_amount(value).map_err(<D::Error as de::Error>::custom)?,
        Raw::Text(text) => {
            let text = text.trim();
            match text.parse::<u64>() {
                Ok(value) => value,
                Err(_) => text
                    .parse::<f64>()
                    .map_err(|_| "amount must be numeric")
                    .and_then(whole_amount)
                    .map_err(<D::Error as de::Error>::custom)?,
            }
        }
    };
    if amount > MAX_AMOUNT {
        return Err(de::Error::custom("amount is too large"));
    }
    Ok(amount)
}

fn whole_amount(value: f64) -> Result<u64, &'static str> {
    if !value.is_finite() || value < 0.0 || value.fract() != 0.0 {
        return Err("amount must be a non-negative whole number");
    }
    if value >= MAX_AMOUNT as f64 {
        return Err("amount is too large");
    }
    Ok(value as u64)
}

fn deserialize_optional_amount<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    struct Wrapper(#[serde(deserialize_with = "deserialize_amount")] u64);

    Ok(Option::<Wrapper>::deserialize(deserializer)?.map(|Wrapper(value)| value))
}

fn parse_id<T: FromStr>(raw: &str) -> Result<T, MarketplaceError> {
    T::from_str(raw).map_err(|_| MarketplaceError::validation("malformed id"))
}

fn parse_listing_status(raw: Option<&str>) -> Result<Option<ListingStatus>, MarketplaceError> {
    match raw.map(str::trim).filter(|value| !value.is_empty()) {
        Some(value) => ListingStatus::parse(value)
            .map(Some)
            .ok_or_else(|| MarketplaceError::validation(format!("unknown status {value}"))),
        None => Ok(None),
    }
}

#[derive(Debug, Default, Deserialize)]
struct EmailParams {
    email: Option<String>,
    status: Option<String>,
    limit: Option<usize>,
    skip: Option<usize>,
}

impl EmailParams {
    fn email(&self) -> &str {
        self.email.as_deref().unwrap_or_default()
    }

    fn page(&self) -> Page {
        Page::new(self.limit, self.skip)
    }
}

#[derive(Debug, Default, Deserialize)]
struct ListingParams {
    status: Option<String>,
    search: Option<String>,
    role: Option<String>,
    email: Option<String>,
    limit: Option<usize>,
    skip: Option<usize>,
}

#[derive(Debug, Default, Deserialize)]
struct SessionParams {
    session_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewUserBody {
    email: String,
    display_name: Option<String>,
    #[serde(rename = "photoURL", alias = "photoUrl")]
    photo_url: Option<String>,
    role: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ProfileBody {
    display_name: Option<String>,
    #[serde(rename = "photoURL", alias = "photoUrl")]
    photo_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RoleBody {
    role: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct NewTuitionBody {
    student_email: String,
    student_name: String,
    subject: String,
    class: String,
    location: String,
    #[serde(deserialize_with = "deserialize_amount")]
    budget: u64,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TuitionEditBody {
    student_name: Option<String>,
    subject: Option<String>,
    class: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_amount")]
    budget: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct StatusBody {
    status: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplyBody {
    #[serde(alias = "id")]
    tuition_id: String,
    tutor_name: String,
    tutor_qualification: String,
    tutor_experience: String,
    #[serde(deserialize_with = "deserialize_amount")]
    tutor_expected_salary: u64,
    tutor_photo: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RejectBody {
    #[serde(alias = "id")]
    tuition_id: String,
    tutor_email: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApplicationEditBody {
    tutor_qualification: Option<String>,
    tutor_experience: Option<String>,
    #[serde(default, deserialize_with = "deserialize_optional_amount")]
    tutor_expected_salary: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CheckoutBody {
    tuition_id: String,
    #[serde(alias = "amount", deserialize_with = "deserialize_amount")]
    fee: u64,
}

/// Router builder exposing the marketplace HTTP surface.
pub fn marketplace_router(state: MarketplaceState) -> Router {
    Router::new()
        .route("/", get(root_handler))
        .route(
            "/users",
            get(list_users_handler)
                .post(register_handler)
                .patch(update_profile_handler),
        )
        .route("/users/{key}", delete(delete_user_handler))
        .route(
            "/users/{key}/role",
            get(user_role_handler).patch(set_role_handler),
        )
        .route("/all-tuitions", get(all_tuitions_handler))
        .route("/recent-tuitions", get(recent_tuitions_handler))
        .route("/recent-tutors", get(recent_tutors_handler))
        .route(
            "/tuitions",
            get(my_tuitions_handler).post(create_tuition_handler),
        )
        .route("/tuitions/Pending", get(pending_tuitions_handler))
        .route("/tuitions/application", get(tutor_applications_handler))
        .route("/tuitions/apply", patch(apply_handler))
        .route("/tuitions/reject", patch(reject_handler))
        .route(
            "/tuitions/approval-status/stats",
            get(approval_stats_handler),
        )
        .route(
            "/tuitions/{key}",
            patch(set_status_handler).delete(delete_tuition_handler),
        )
        .route("/tuitions/{key}/tutor", get(check_applied_handler))
        .route("/tuitions/{key}/applied", get(applied_tuitions_handler))
        .route("/tuitions/{key}/update", patch(update_tuition_handler))
        .route(
            "/applications/{id}",
            delete(delete_application_handler),
        )
        .route(
            "/applications/{id}/update",
            patch(update_application_handler),
        )
        .route("/create-checkout-session", post(checkout_handler))
        .route("/payment-success", patch(settle_handler))
        .route("/all-payments", get(all_payments_handler))
        .route("/payments", get(student_payments_handler))
        .route("/payments/tutor", get(tutor_payments_handler))
        .route("/payments/admin", get(payment_totals_handler))
        .route("/payments/total/{email}", get(tutor_total_handler))
        .with_state(state)
}

async fn root_handler() -> &'static str {
    "eTuitionBd is running!"
}

async fn user_role_handler(
    State(state): State<MarketplaceState>,
    Path(email): Path<String>,
) -> Result<Response, MarketplaceError> {
    let role = state.users.role_of(&email).await?;
    Ok(Json(json!({ "role": role })).into_response())
}

async fn list_users_handler(
    State(state): State<MarketplaceState>,
    Params(params): Params<ListingParams>,
) -> Result<Response, MarketplaceError> {
    let query = UserQuery {
        email: params.email.as_deref().map(Email::parse).transpose()?,
        role: params.role.as_deref().and_then(Role::parse),
        search: params.search.filter(|value| !value.trim().is_empty()),
    };
    let users = state
        .users
        .list(query, Page::new(params.limit, params.skip))
        .await?;
    Ok(Json(users).into_response())
}

async fn register_handler(
    State(state): State<MarketplaceState>,
    Body(body): Body<NewUserBody>,
) -> Result<Response, MarketplaceError> {
    let role = match body.role.as_deref().map(str::trim).filter(|r| !r.is_empty()) {
        Some(raw) => Some(
            Role::parse(raw)
                .ok_or_else(|| MarketplaceError::validation(format!("unknown role {raw}")))?,
        ),
        None => None,
    };
    let outcome = state
        .users
        .register(Registration {
            email: Email::parse(&body.email)?,
            display_name: body.display_name,
            photo_url: body.photo_url,
            role,
        })
        .await?;
    let status = match outcome {
        RegisterOutcome::Created { .. } => StatusCode::CREATED,
        RegisterOutcome::Exists { .. } => StatusCode::OK,
    };
    Ok((status, Json(outcome)).into_response())
}

async fn update_profile_handler(
    State(state): State<MarketplaceState>,
    caller: Caller,
    Params(params): Params<EmailParams>,
    Body(body): Body<ProfileBody>,
) -> Result<Response, MarketplaceError> {
    let user = state
        .users
        .update_profile(
            &caller,
            params.email(),
            ProfileUpdate {
                display_name: body.display_name,
                photo_url: body.photo_url,
            },
        )
        .await?;
    Ok(Json(user).into_response())
}

async fn delete_user_handler(
    State(state): State<MarketplaceState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Response, MarketplaceError> {
    let id: UserId = parse_id(&id)?;
    state.users.delete(&caller, id).await?;
    Ok(Json(json!({ "deletedCount": 1 })).into_response())
}

async fn set_role_handler(
    State(state): State<MarketplaceState>,
    caller: Caller,
    Path(id): Path<String>,
    Body(body): Body<RoleBody>,
) -> Result<Response, MarketplaceError> {
    let id: UserId = parse_id(&id)?;
    let role = Role::parse(&body.role)
        .ok_or_else(|| MarketplaceError::validation(format!("unknown role {}", body.role)))?;
    let user = state.users.set_role(&caller, id, role).await?;
    Ok(Json(user).into_response())
}

async fn all_tuitions_handler(
    State(state): State<MarketplaceState>,
    Params(params): Params<ListingParams>,
) -> Result<Response, MarketplaceError> {
    let status = parse_listing_status(params.status.as_deref())?;
    let page = state
        .tuitions
        .list_all(status, params.search, Page::new(params.limit, params.skip))
        .await?;
    Ok(Json(page).into_response())
}

async fn recent_tuitions_handler(
    State(state): State<MarketplaceState>,
    Params(params): Params<ListingParams>,
) -> Result<Response, MarketplaceError> {
    let status = parse_listing_status(params.status.as_deref())?;
    let tuitions = state.tuitions.recent(status).await?;
    Ok(Json(tuitions).into_response())
}

async fn recent_tutors_handler(
    State(state): State<MarketplaceState>,
    Params(params): Params<ListingParams>,
) -> Result<Response, MarketplaceError> {
    let role = params.role.as_deref().and_then(Role::parse);
    let users = state.users.recent(role).await?;
    Ok(Json(users).into_response())
}

async fn my_tuitions_handler(
    State(state): State<MarketplaceState>,
    caller: Caller,
    Params(params): Params<EmailParams>,
) -> Result<Response, MarketplaceError> {
    let status = parse_listing_status(params.status.as_deref())?;
    let tuitions = state
        .tuitions
        .mine(&caller, params.email(), status, params.page())
        .await?;
    Ok(Json(tuitions).into_response())
}

async fn pending_tuitions_handler(
    State(state): State<MarketplaceState>,
    caller: Caller,
    Params(params): Params<EmailParams>,
) -> Result<Response, MarketplaceError> {
    let tuitions = state
        .tuitions
        .mine(
            &caller,
            params.email(),
            Some(ListingStatus::Pending),
            params.page(),
        )
        .await?;
    Ok(Json(tuitions).into_response())
}

async fn create_tuition_handler(
    State(state): State<MarketplaceState>,
    caller: Caller,
    Body(body): Body<NewTuitionBody>,
) -> Result<Response, MarketplaceError> {
    let draft = TuitionDraft {
        student_email: Email::parse(&body.student_email)?,
        student_name: body.student_name,
        subject: body.subject,
        class: body.class,
        location: body.location,
        budget: body.budget,
    };
    let outcome = state.tuitions.create(&caller, draft).await?;
    let status = match outcome {
        CreateOutcome::Created { .. } => StatusCode::CREATED,
        CreateOutcome::Exists { .. } => StatusCode::OK,
    };
    Ok((status, Json(outcome)).into_response())
}

async fn tutor_applications_handler(
    State(state): State<MarketplaceState>,
    caller: Caller,
    Params(params): Params<EmailParams>,
) -> Result<Response, MarketplaceError> {
    let status = match params.status.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
        Some(raw) => Some(
            ApprovalStatus::parse(raw)
                .ok_or_else(|| MarketplaceError::validation(format!("unknown status {raw}")))?,
        ),
        None => None,
    };
    let applications = state
        .applications
        .list_for_tutor(&caller, params.email(), status, params.page())
        .await?;
    Ok(Json(applications).into_response())
}

async fn check_applied_handler(
    State(state): State<MarketplaceState>,
    Path(id): Path<String>,
    Params(params): Params<EmailParams>,
) -> Result<Response, MarketplaceError> {
    let id: TuitionId = parse_id(&id)?;
    let tuitions = state.tuitions.applied_by(id, params.email()).await?;
    Ok(Json(tuitions).into_response())
}

async fn applied_tuitions_handler(
    State(state): State<MarketplaceState>,
    caller: Caller,
    Path(email): Path<String>,
    Params(params): Params<EmailParams>,
) -> Result<Response, MarketplaceError> {
    let tuitions = state
        .tuitions
        .applied(&caller, &email, params.page())
        .await?;
    Ok(Json(tuitions).into_response())
}

async fn update_tuition_handler(
    State(state): State<MarketplaceState>,
    caller: Caller,
    Path(id): Path<String>,
    Body(body): Body<TuitionEditBody>,
) -> Result<Response, MarketplaceError> {
    let id: TuitionId = parse_id(&id)?;
    let tuition = state
        .tuitions
        .update_details(
            &caller,
            id,
            TuitionDetailsUpdate {
                student_name: body.student_name,
                subject: body.subject,
                class: body.class,
                budget: body.budget,
            },
        )
        .await?;
    Ok(Json(tuition).into_response())
}

async fn apply_handler(
    State(state): State<MarketplaceState>,
    caller: Caller,
    Body(body): Body<ApplyBody>,
) -> Result<Response, MarketplaceError> {
    let application = state
        .applications
        .apply(
            &caller,
            ApplyRequest {
                tuition_id: parse_id(&body.tuition_id)?,
                tutor_name: body.tutor_name,
                tutor_qualification: body.tutor_qualification,
                tutor_experience: body.tutor_experience,
                tutor_expected_salary: body.tutor_expected_salary,
                tutor_photo: body.tutor_photo,
            },
        )
        .await?;
    Ok((StatusCode::CREATED, Json(application)).into_response())
}

async fn reject_handler(
    State(state): State<MarketplaceState>,
    caller: Caller,
    Body(body): Body<RejectBody>,
) -> Result<Response, MarketplaceError> {
    let id: TuitionId = parse_id(&body.tuition_id)?;
    let tutor = Email::parse(&body.tutor_email)?;
    let tuition = state
        .tuitions
        .reject_applicant(&caller, id, &tutor)
        .await?;
    Ok(Json(tuition).into_response())
}

async fn set_status_handler(
    State(state): State<MarketplaceState>,
    caller: Caller,
    Path(id): Path<String>,
    Params(params): Params<EmailParams>,
    Body(body): Body<StatusBody>,
) -> Result<Response, MarketplaceError> {
    let id: TuitionId = parse_id(&id)?;
    let status = parse_listing_status(Some(&body.status))?
        .ok_or_else(|| MarketplaceError::validation("status is required"))?;
    let tuition = state
        .tuitions
        .set_listing_status(&caller, params.email(), id, status)
        .await?;
    Ok(Json(tuition).into_response())
}

async fn delete_tuition_handler(
    State(state): State<MarketplaceState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Response, MarketplaceError> {
    let id: TuitionId = parse_id(&id)?;
    state.tuitions.delete(&caller, id).await?;
    Ok(Json(json!({ "deletedCount": 1 })).into_response())
}

async fn update_application_handler(
    State(state): State<MarketplaceState>,
    caller: Caller,
    Path(id): Path<String>,
    Body(body): Body<ApplicationEditBody>,
) -> Result<Response, MarketplaceError> {
    let id: ApplicationId = parse_id(&id)?;
    let application = state
        .applications
        .edit(
            &caller,
            id,
            ApplicationUpdate {
                tutor_qualification: body.tutor_qualification,
                tutor_experience: body.tutor_experience,
                tutor_expected_salary: body.tutor_expected_salary,
            },
        )
        .await?;
    Ok(Json(application).into_response())
}

async fn delete_application_handler(
    State(state): State<MarketplaceState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Response, MarketplaceError> {
    let id: ApplicationId = parse_id(&id)?;
    state.applications.withdraw(&caller, id).await?;
    Ok(Json(json!({ "deletedCount": 1 })).into_response())
}

async fn checkout_handler(
    State(state): State<MarketplaceState>,
    caller: Caller,
    Body(body): Body<CheckoutBody>,
) -> Result<Response, MarketplaceError> {
    let id: TuitionId = parse_id(&body.tuition_id)?;
    let link = state
        .settlement
        .create_checkout(&caller, id, body.fee)
        .await?;
    Ok(Json(link).into_response())
}

async fn settle_handler(
    State(state): State<MarketplaceState>,
    Params(params): Params<SessionParams>,
) -> Result<Response, MarketplaceError> {
    let session_id = params.session_id.unwrap_or_default();
    let outcome = state.settlement.settle(&session_id).await?;
    Ok(Json(outcome).into_response())
}

async fn all_payments_handler(
    State(state): State<MarketplaceState>,
    caller: Caller,
    Params(params): Params<EmailParams>,
) -> Result<Response, MarketplaceError> {
    let payments = state
        .reporting
        .all_payments(&caller, params.email(), params.page())
        .await?;
    Ok(Json(payments).into_response())
}

async fn student_payments_handler(
    State(state): State<MarketplaceState>,
    caller: Caller,
    Params(params): Params<EmailParams>,
) -> Result<Response, MarketplaceError> {
    let payments = state
        .reporting
        .student_payments(&caller, params.email(), params.page())
        .await?;
    Ok(Json(payments).into_response())
}

async fn tutor_payments_handler(
    State(state): State<MarketplaceState>,
    caller: Caller,
    Params(params): Params<EmailParams>,
) -> Result<Response, MarketplaceError> {
    let payments = state
        .reporting
        .tutor_payments(&caller, params.email(), params.page())
        .await?;
    Ok(Json(payments).into_response())
}

async fn payment_totals_handler(
    State(state): State<MarketplaceState>,
    caller: Caller,
    Params(params): Params<EmailParams>,
) -> Result<Response, MarketplaceError> {
    let totals = state
        .reporting
        .payment_totals(&caller, params.email())
        .await?;
    Ok(Json(totals).into_response())
}

async fn tutor_total_handler(
    State(state): State<MarketplaceState>,
    caller: Caller,
    Path(email): Path<String>,
) -> Result<Response, MarketplaceError> {
    let total = state.reporting.tutor_earnings(&caller, &email).await?;
    Ok(Json(total).into_response())
}

async fn approval_stats_handler(
    State(state): State<MarketplaceState>,
    caller: Caller,
    Params(params): Params<EmailParams>,
) -> Result<Response, MarketplaceError> {
    let stats = state
        .reporting
        .approval_stats(&caller, params.email())
        .await?;
    Ok(Json(stats).into_response())
}
