use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::http::{header, Request};
use axum::response::Response;
use serde_json::Value;

use crate::identity::{IdentityError, TokenVerifier, VerifiedIdentity};
use crate::marketplace::domain::{
    Application, ApplicationId, Email, Page, Role, TuitionDraft, TuitionId,
};
use crate::marketplace::repository::{ApplicationQuery, ApplicationRepository, RepositoryError};
use crate::marketplace::{ApplyRequest, Caller, CreateOutcome, MarketplaceState};
use crate::payments::{CheckoutRequest, CheckoutSession, GatewayError, PaymentGateway};
use crate::store::{InMemoryApplicationRepository, Stores};

pub(super) const ADMIN: &str = "admin@x.com";
pub(super) const STUDENT: &str = "s@x.com";
pub(super) const TUTOR: &str = "t@x.com";

pub(super) fn email(raw: &str) -> Email {
    Email::parse(raw).expect("valid email")
}

pub(super) fn caller(raw: &str) -> Caller {
    Caller::new(email(raw))
}

/// Accepts any token that is itself an e-mail address.
pub(super) struct StubVerifier;

#[async_trait]
impl TokenVerifier for StubVerifier {
    async fn verify(&self, token: &str) -> Result<VerifiedIdentity, IdentityError> {
        Email::parse(token)
            .map(|email| VerifiedIdentity { email })
            .map_err(|_| IdentityError::InvalidToken("not an e-mail".to_string()))
    }
}

/// Records checkout requests and serves sessions the test marks as paid.
#[derive(Default)]
pub(super) struct StubGateway {
    sessions: Mutex<HashMap<String, CheckoutSession>>,
    requests: Mutex<Vec<CheckoutRequest>>,
    counter: AtomicUsize,
}

impl StubGateway {
    pub(super) fn requests(&self) -> Vec<CheckoutRequest> {
        self.requests.lock().expect("gateway mutex poisoned").clone()
    }

    pub(super) fn last_session_id(&self) -> String {
        format!("cs_test_{}", self.counter.load(Ordering::SeqCst))
    }

    pub(super) fn pay(&self, session_id: &str, payment_intent: &str) {
        let mut sessions = self.sessions.lock().expect("gateway mutex poisoned");
        let session = sessions.get_mut(session_id).expect("known session");
        session.payment_status = "paid".to_string();
        session.payment_intent = Some(payment_intent.to_string());
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn create_checkout_session(
        &self,
        request: CheckoutRequest,
    ) -> Result<CheckoutSession, GatewayError> {
        let number = self.counter.fetch_add(1, Ordering::SeqCst) + 1;
        let id = format!("cs_test_{number}");
        let metadata = HashMap::from([
            ("tuitionId".to_string(), request.tuition_id.to_string()),
            ("subject".to_string(), request.subject.clone()),
            ("tutorEmail".to_string(), request.tutor_email.to_string()),
            ("studentEmail".to_string(), request.student_email.to_string()),
        ]);
        let session = CheckoutSession {
            id: id.clone(),
            url: Some(format!("https://checkout.test/{id}")),
            payment_status: "unpaid".to_string(),
            payment_intent: None,
            amount_total: Some(request.amount_minor),
            currency: Some(request.currency.clone()),
            customer_email: Some(request.student_email.to_string()),
            metadata,
        };
        self.sessions
            .lock()
            .expect("gateway mutex poisoned")
            .insert(id, session.clone());
        self.requests
            .lock()
            .expect("gateway mutex poisoned")
            .push(request);
        Ok(session)
    }

    async fn retrieve_session(&self, session_id: &str) -> Result<CheckoutSession, GatewayError> {
        self.sessions
            .lock()
            .expect("gateway mutex poisoned")
            .get(session_id)
            .cloned()
            .ok_or(GatewayError::SessionNotFound)
    }
}

/// In-memory applications whose writes can be switched off to simulate an outage.
#[derive(Default)]
pub(super) struct FlakyApplications {
    inner: InMemoryApplicationRepository,
    failing: AtomicBool,
}

impl FlakyApplications {
    pub(super) fn fail_writes(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    fn check(&self) -> Result<(), RepositoryError> {
        if self.failing.load(Ordering::SeqCst) {
            Err(RepositoryError::Unavailable("database offline".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl ApplicationRepository for FlakyApplications {
    async fn insert(&self, application: Application) -> Result<Application, RepositoryError> {
        self.check()?;
        self.inner.insert(application).await
    }

    async fn fetch(&self, id: &ApplicationId) -> Result<Option<Application>, RepositoryError> {
        self.inner.fetch(id).await
    }

    async fn find_for_tutor(
        &self,
        tuition_id: &TuitionId,
        tutor_email: &Email,
    ) -> Result<Option<Application>, RepositoryError> {
        self.inner.find_for_tutor(tuition_id, tutor_email).await
    }

    async fn list(
        &self,
        query: &ApplicationQuery,
        page: Page,
    ) -> Result<Vec<Application>, RepositoryError> {
        self.inner.list(query, page).await
    }

    async fn update(&self, application: Application) -> Result<Application, RepositoryError> {
        self.check()?;
        self.inner.update(application).await
    }

    async fn delete(&self, id: &ApplicationId) -> Result<(), RepositoryError> {
        self.check()?;
        self.inner.delete(id).await
    }
}

pub(super) struct Harness {
    pub(super) state: MarketplaceState,
    pub(super) stores: Stores,
    pub(super) gateway: Arc<StubGateway>,
    pub(super) applications: Arc<FlakyApplications>,
}

/// Marketplace over in-memory stores with an admin, a student and a tutor registered.
pub(super) async fn harness() -> Harness {
    let mut stores = Stores::in_memory();
    let applications = Arc::new(FlakyApplications::default());
    stores.applications = applications.clone();
    let gateway = Arc::new(StubGateway::default());
    let state = MarketplaceState::new(
        stores.clone(),
        Arc::new(StubVerifier),
        gateway.clone(),
        "usd",
        Duration::from_secs(2),
    );

    for (address, role) in [
        (ADMIN, Role::Admin),
        (STUDENT, Role::Student),
        (TUTOR, Role::Tutor),
    ] {
        state
            .users
            .grant_role(email(address), role)
            .await
            .expect("seed user");
    }

    Harness {
        state,
        stores,
        gateway,
        applications,
    }
}

pub(super) fn draft(subject: &str) -> TuitionDraft {
    TuitionDraft {
        student_email: email(STUDENT),
        student_name: "A".to_string(),
        subject: subject.to_string(),
        class: "9".to_string(),
        location: "Dhaka".to_string(),
        budget: 500,
    }
}

pub(super) async fn post_tuition(harness: &Harness, subject: &str) -> TuitionId {
    match harness
        .state
        .tuitions
        .create(&caller(STUDENT), draft(subject))
        .await
        .expect("tuition posted")
    {
        CreateOutcome::Created { inserted_id } => inserted_id,
        CreateOutcome::Exists { existing_id } => existing_id,
    }
}

pub(super) fn apply_request(tuition_id: TuitionId) -> ApplyRequest {
    ApplyRequest {
        tuition_id,
        tutor_name: "T".to_string(),
        tutor_qualification: "BSc".to_string(),
        tutor_experience: "2 years".to_string(),
        tutor_expected_salary: 450,
        tutor_photo: None,
    }
}

pub(super) fn json_request(
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Value,
) -> Request<axum::body::Body> {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json");
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder
        .body(axum::body::Body::from(body.to_string()))
        .expect("request")
}

pub(super) fn get_request(uri: &str, token: Option<&str>) -> Request<axum::body::Body> {
    let mut builder = Request::builder().method("GET").uri(uri);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }
    builder.body(axum::body::Body::empty()).expect("request")
}

pub(super) async fn read_json_body(response: Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), 64 * 1024)
        .await
        .expect("read body");
    serde_json::from_slice(&body).expect("json payload")
}
