use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

macro_rules! document_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub Uuid);

        impl $name {
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                self.0.fmt(f)
            }
        }

        impl FromStr for $name {
            type Err = uuid::Error;

            fn from_str(raw: &str) -> Result<Self, Self::Err> {
                Uuid::parse_str(raw.trim()).map(Self)
            }
        }
    };
}

document_id!(
    /// Identifier of a persisted user document.
    UserId
);
document_id!(
    /// Identifier of a tuition request.
    TuitionId
);
document_id!(
    /// Identifier of a tutor application.
    ApplicationId
);
document_id!(PaymentId);

/// Normalized (trimmed, lower-cased) e-mail address; the identity key for every party.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Email(String);

impl Email {
    pub fn parse(raw: &str) -> Result<Self, InvalidField> {
        let normalized = raw.trim().to_ascii_lowercase();
        let valid = match normalized.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty() && !domain.is_empty() && !domain.contains('@')
            }
            None => false,
        };
        if valid && !normalized.chars().any(char::is_whitespace) {
            Ok(Self(normalized))
        } else {
            Err(InvalidField::new("email", "must be a valid e-mail address"))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for Email {
    type Error = InvalidField;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Email::parse(&value)
    }
}

impl From<Email> for String {
    fn from(value: Email) -> Self {
        value.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Request field that failed validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{field} {reason}")]
pub struct InvalidField {
    pub field: &'static str,
    pub reason: &'static str,
}

impl InvalidField {
    pub const fn new(field: &'static str, reason: &'static str) -> Self {
        Self { field, reason }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    #[serde(alias = "Student")]
    Student,
    #[serde(alias = "Tutor")]
    Tutor,
    #[serde(alias = "Admin")]
    Admin,
}

impl Role {
    pub const fn label(self) -> &'static str {
        match self {
            Role::Student => "student",
            Role::Tutor => "tutor",
            Role::Admin => "admin",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "student" => Some(Role::Student),
            "tutor" => Some(Role::Tutor),
            "admin" => Some(Role::Admin),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Admin-controlled visibility of a tuition listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ListingStatus {
    Pending,
    Approved,
    Rejected,
}

/// Accept/reject decision on the tutor currently attached to a tuition, mirrored on
/// the tutor's application document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApprovalStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PaymentStatus {
    Paid,
}

macro_rules! status_labels {
    ($name:ident { $($variant:ident),+ $(,)? }) => {
        impl $name {
            pub const fn label(self) -> &'static str {
                match self {
                    $($name::$variant => stringify!($variant),)+
                }
            }

            pub fn parse(raw: &str) -> Option<Self> {
                $(
                    if raw.trim().eq_ignore_ascii_case(stringify!($variant)) {
                        return Some($name::$variant);
                    }
                )+
                None
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.label())
            }
        }
    };
}

status_labels!(ListingStatus { Pending, Approved, Rejected });
status_labels!(ApprovalStatus { Pending, Approved, Rejected });
status_labels!(PaymentStatus { Paid });

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub email: Email,
    pub display_name: Option<String>,
    #[serde(rename = "photoURL")]
    pub photo_url: Option<String>,
    pub role: Option<Role>,
    #[serde(rename = "created_at")]
    pub created_at: DateTime<Utc>,
}

/// Profile fields a signed-in user may change about themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProfileUpdate {
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
}

impl ProfileUpdate {
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.photo_url.is_none()
    }
}

/// Student-submitted fields of a new tuition request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TuitionDraft {
    pub student_email: Email,
    pub student_name: String,
    pub subject: String,
    pub class: String,
    pub location: String,
    pub budget: u64,
}

impl TuitionDraft {
    pub fn validate(&self) -> Result<(), InvalidField> {
        require_text("studentName", &self.student_name)?;
        require_text("subject", &self.subject)?;
        require_text("class", &self.class)?;
        require_text("location", &self.location)?;
        if self.budget == 0 {
            return Err(InvalidField::new("budget", "must be greater than zero"));
        }
        Ok(())
    }

    /// Content key used to suppress duplicate postings of the same request.
    pub fn dedup_key(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [
            self.student_email.as_str(),
            &normalize(&self.student_name),
            &normalize(&self.subject),
            &normalize(&self.class),
            &normalize(&self.location),
            &self.budget.to_string(),
        ] {
            hasher.update(part.as_bytes());
            hasher.update([0x1f]);
        }
        hex::encode(hasher.finalize())
    }
}

fn normalize(value: &str) -> String {
    value
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .to_lowercase()
}

fn require_text(field: &'static str, value: &str) -> Result<(), InvalidField> {
    if value.trim().is_empty() {
        Err(InvalidField::new(field, "must not be empty"))
    } else {
        Ok(())
    }
}

/// Fields a student may edit on an existing request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TuitionDetailsUpdate {
    pub student_name: Option<String>,
    pub subject: Option<String>,
    pub class: Option<String>,
    pub budget: Option<u64>,
}

/// Tutor profile embedded on a tuition request once the tutor applies.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TutorApplicant {
    pub tutor_name: String,
    pub tutor_email: Email,
    pub tutor_qualification: String,
    pub tutor_experience: String,
    pub tutor_expected_salary: u64,
    pub tutor_photo: Option<String>,
    #[serde(rename = "applied_at")]
    pub applied_at: DateTime<Utc>,
}

impl TutorApplicant {
    pub fn validate(&self) -> Result<(), InvalidField> {
        require_text("tutorName", &self.tutor_name)?;
        require_text("tutorQualification", &self.tutor_qualification)?;
        require_text("tutorExperience", &self.tutor_experience)?;
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TuitionRequest {
    #[serde(rename = "_id")]
    pub id: TuitionId,
    pub student_email: Email,
    pub student_name: String,
    pub subject: String,
    pub class: String,
    pub location: String,
    pub budget: u64,
    pub status: ListingStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub approval_status: Option<ApprovalStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_status: Option<PaymentStatus>,
    #[serde(flatten)]
    pub applicant: Option<TutorApplicant>,
    #[serde(rename = "created_at")]
    pub created_at: DateTime<Utc>,
    #[serde(skip)]
    pub dedup_key: String,
    /// Bumped by the store on every successful update.
    #[serde(skip)]
    pub revision: u64,
}

impl TuitionRequest {
    pub fn from_draft(draft: TuitionDraft, now: DateTime<Utc>) -> Self {
        let dedup_key = draft.dedup_key();
        Self {
            id: TuitionId::new(),
            student_email: draft.student_email,
            student_name: draft.student_name.trim().to_string(),
            subject: draft.subject.trim().to_string(),
            class: draft.class.trim().to_string(),
            location: draft.location.trim().to_string(),
            budget: draft.budget,
            status: ListingStatus::Pending,
            approval_status: None,
            payment_status: None,
            applicant: None,
            created_at: now,
            dedup_key,
            revision: 0,
        }
    }

    /// Student-submitted fields as they currently stand.
    pub fn draft(&self) -> TuitionDraft {
        TuitionDraft {
            student_email: self.student_email.clone(),
            student_name: self.student_name.clone(),
            subject: self.subject.clone(),
            class: self.class.clone(),
            location: self.location.clone(),
            budget: self.budget,
        }
    }

    pub fn is_paid(&self) -> bool {
        self.payment_status == Some(PaymentStatus::Paid)
    }

    pub fn is_owned_by(&self, email: &Email) -> bool {
        &self.student_email == email
    }

    pub fn tutor_email(&self) -> Option<&Email> {
        self.applicant.as_ref().map(|applicant| &applicant.tutor_email)
    }

    /// Listing axis: Pending moves to Approved or Rejected exactly once.
    /// Returns `false` when the request already holds `target`.
    pub fn set_listing_status(&mut self, target: ListingStatus) -> Result<bool, TransitionError> {
        if target == ListingStatus::Pending {
            return Err(TransitionError::ListingTargetInvalid);
        }
        match self.status {
            ListingStatus::Pending => {
                self.status = target;
                Ok(true)
            }
            current if current == target => Ok(false),
            current => Err(TransitionError::ListingAlreadyDecided { current }),
        }
    }

    pub fn edit(&mut self, update: TuitionDetailsUpdate) -> Result<(), TransitionError> {
        if self.is_paid() {
            return Err(TransitionError::AlreadySettled);
        }
        if let Some(name) = update.student_name {
            self.student_name = name.trim().to_string();
        }
        if let Some(subject) = update.subject {
            self.subject = subject.trim().to_string();
        }
        if let Some(class) = update.class {
            self.class = class.trim().to_string();
        }
        if let Some(budget) = update.budget {
            self.budget = budget;
        }
        self.dedup_key = self.draft().dedup_key();
        Ok(())
    }

    /// Approval axis: absent/Rejected -> Pending for the applying tutor. While a tutor is
    /// Pending only that same tutor may be attached again.
    pub fn attach_applicant(&mut self, applicant: TutorApplicant) -> Result<(), TransitionError> {
        if self.is_paid() || self.approval_status == Some(ApprovalStatus::Approved) {
            return Err(TransitionError::AlreadySettled);
        }
        if self.approval_status == Some(ApprovalStatus::Pending)
            && self.tutor_email() != Some(&applicant.tutor_email)
        {
            return Err(TransitionError::ApplicantPending);
        }
        self.applicant = Some(applicant);
        self.approval_status = Some(ApprovalStatus::Pending);
        Ok(())
    }

    /// Approval axis: Pending -> Rejected for the named tutor. Re-rejecting is allowed so a
    /// half-finished reject can be driven again.
    pub fn reject_applicant(&mut self, tutor_email: &Email) -> Result<(), TransitionError> {
        if self.tutor_email() != Some(tutor_email) {
            return Err(TransitionError::ApplicantMismatch);
        }
        match self.approval_status {
            Some(ApprovalStatus::Pending) | Some(ApprovalStatus::Rejected) => {
                self.approval_status = Some(ApprovalStatus::Rejected);
                Ok(())
            }
            Some(ApprovalStatus::Approved) => Err(TransitionError::AlreadySettled),
            None => Err(TransitionError::NoApplicant),
        }
    }

    /// Records a settled payment. Idempotent.
    pub fn mark_settled(&mut self) {
        self.payment_status = Some(PaymentStatus::Paid);
        self.approval_status = Some(ApprovalStatus::Approved);
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Application {
    #[serde(rename = "_id")]
    pub id: ApplicationId,
    pub tuition_id: TuitionId,
    pub tutor_email: Email,
    pub tutor_name: String,
    pub student_email: Email,
    pub student_name: String,
    pub subject: String,
    pub class: String,
    pub location: String,
    pub tutor_qualification: String,
    pub tutor_experience: String,
    pub tutor_expected_salary: u64,
    pub application_status: ApprovalStatus,
    #[serde(rename = "applied_at")]
    pub applied_at: DateTime<Utc>,
    #[serde(skip)]
    pub revision: u64,
}

impl Application {
    pub fn for_tuition(tuition: &TuitionRequest, applicant: &TutorApplicant) -> Self {
        Self {
            id: ApplicationId::new(),
            tuition_id: tuition.id,
            tutor_email: applicant.tutor_email.clone(),
            tutor_name: applicant.tutor_name.clone(),
            student_email: tuition.student_email.clone(),
            student_name: tuition.student_name.clone(),
            subject: tuition.subject.clone(),
            class: tuition.class.clone(),
            location: tuition.location.clone(),
            tutor_qualification: applicant.tutor_qualification.clone(),
            tutor_experience: applicant.tutor_experience.clone(),
            tutor_expected_salary: applicant.tutor_expected_salary,
            application_status: ApprovalStatus::Pending,
            applied_at: applicant.applied_at,
            revision: 0,
        }
    }

    pub fn revise(&mut self, update: ApplicationUpdate) -> Result<(), TransitionError> {
        if self.application_status == ApprovalStatus::Approved {
            return Err(TransitionError::ApplicationDecided {
                status: self.application_status,
            });
        }
        if let Some(qualification) = update.tutor_qualification {
            self.tutor_qualification = qualification.trim().to_string();
        }
        if let Some(experience) = update.tutor_experience {
            self.tutor_experience = experience.trim().to_string();
        }
        if let Some(salary) = update.tutor_expected_salary {
            self.tutor_expected_salary = salary;
        }
        Ok(())
    }
}

/// Tutor-editable fields of an application.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ApplicationUpdate {
    pub tutor_qualification: Option<String>,
    pub tutor_experience: Option<String>,
    pub tutor_expected_salary: Option<u64>,
}

/// Settled external transaction. Written once per `transaction_id`, never updated.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRecord {
    #[serde(rename = "_id")]
    pub id: PaymentId,
    pub transaction_id: String,
    /// Amount in minor currency units, as charged by the provider.
    pub amount_minor: i64,
    pub currency: String,
    pub student_email: Email,
    pub tutor_email: Email,
    pub tuition_id: TuitionId,
    pub subject: String,
    pub payment_status: PaymentStatus,
    pub paid_at: DateTime<Utc>,
}

/// Aggregated payment amounts for one group.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentTotal {
    #[serde(rename = "_id")]
    pub group: String,
    pub total_amount_minor: i64,
    pub count: u64,
}

/// Number of tuitions per approval status; `None` counts requests nobody applied to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApprovalCount {
    #[serde(rename = "_id")]
    pub approval_status: Option<ApprovalStatus>,
    pub count: u64,
}

/// State-machine violations on tuition requests and applications.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("listing status is already {current}")]
    ListingAlreadyDecided { current: ListingStatus },
    #[error("listing status can only be set to Approved or Rejected")]
    ListingTargetInvalid,
    #[error("tuition has already been paid for")]
    AlreadySettled,
    #[error("no tutor has applied to this tuition")]
    NoApplicant,
    #[error("tutor is not the current applicant of this tuition")]
    ApplicantMismatch,
    #[error("another tutor's application is awaiting a decision")]
    ApplicantPending,
    #[error("application is already {status}")]
    ApplicationDecided { status: ApprovalStatus },
}

/// Offset pagination with a bounded page size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub limit: usize,
    pub skip: usize,
}

impl Page {
    pub const DEFAULT_LIMIT: usize = 10;
    pub const MAX_LIMIT: usize = 100;

    pub fn new(limit: Option<usize>, skip: Option<usize>) -> Self {
        let limit = match limit {
            Some(0) | None => Self::DEFAULT_LIMIT,
            Some(value) => value.min(Self::MAX_LIMIT),
        };
        Self {
            limit,
            skip: skip.unwrap_or(0),
        }
    }

    pub const fn first(limit: usize) -> Self {
        Self { limit, skip: 0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn email(raw: &str) -> Email {
        Email::parse(raw).expect("valid email")
    }

    fn draft() -> TuitionDraft {
        TuitionDraft {
            student_email: email("s@x.com"),
            student_name: "A".to_string(),
            subject: "Math".to_string(),
            class: "9".to_string(),
            location: "Dhaka".to_string(),
            budget: 500,
        }
    }

    fn applicant(tutor: &str) -> TutorApplicant {
        TutorApplicant {
            tutor_name: "T".to_string(),
            tutor_email: email(tutor),
            tutor_qualification: "BSc".to_string(),
            tutor_experience: "2 years".to_string(),
            tutor_expected_salary: 450,
            tutor_photo: None,
            applied_at: Utc::now(),
        }
    }

    #[test]
    fn email_is_normalized() {
        assert_eq!(email("  Student@X.com ").as_str(), "student@x.com");
        assert!(Email::parse("no-at-sign").is_err());
        assert!(Email::parse("@x.com").is_err());
        assert!(Email::parse("a b@x.com").is_err());
    }

    #[test]
    fn dedup_key_ignores_case_and_spacing() {
        let mut other = draft();
        other.subject = "  math ".to_string();
        other.student_name = "a".to_string();
        assert_eq!(draft().dedup_key(), other.dedup_key());

        other.budget = 501;
        assert_ne!(draft().dedup_key(), other.dedup_key());
    }

    #[test]
    fn draft_requires_fields_and_budget() {
        let mut invalid = draft();
        invalid.subject = " ".to_string();
        assert_eq!(
            invalid.validate(),
            Err(InvalidField::new("subject", "must not be empty"))
        );

        let mut free = draft();
        free.budget = 0;
        assert!(free.validate().is_err());
    }

    #[test]
    fn listing_status_is_decided_once() {
        let mut tuition = TuitionRequest::from_draft(draft(), Utc::now());
        assert_eq!(tuition.status, ListingStatus::Pending);

        assert_eq!(tuition.set_listing_status(ListingStatus::Approved), Ok(true));
        assert_eq!(
            tuition.set_listing_status(ListingStatus::Approved),
            Ok(false)
        );
        assert_eq!(
            tuition.set_listing_status(ListingStatus::Rejected),
            Err(TransitionError::ListingAlreadyDecided {
                current: ListingStatus::Approved
            })
        );
        assert_eq!(
            tuition.set_listing_status(ListingStatus::Pending),
            Err(TransitionError::ListingTargetInvalid)
        );
    }

    #[test]
    fn approval_axis_is_independent_of_listing_axis() {
        let mut tuition = TuitionRequest::from_draft(draft(), Utc::now());
        tuition
            .attach_applicant(applicant("t@x.com"))
            .expect("tutor can apply");
        assert_eq!(tuition.status, ListingStatus::Pending);
        assert_eq!(tuition.approval_status, Some(ApprovalStatus::Pending));

        tuition
            .set_listing_status(ListingStatus::Rejected)
            .expect("admin decides listing");
        assert_eq!(tuition.approval_status, Some(ApprovalStatus::Pending));
    }

    #[test]
    fn reject_requires_the_current_applicant() {
        let mut tuition = TuitionRequest::from_draft(draft(), Utc::now());
        assert_eq!(
            tuition.reject_applicant(&email("t@x.com")),
            Err(TransitionError::ApplicantMismatch)
        );

        tuition
            .attach_applicant(applicant("t@x.com"))
            .expect("tutor can apply");
        assert_eq!(
            tuition.reject_applicant(&email("other@x.com")),
            Err(TransitionError::ApplicantMismatch)
        );
        tuition
            .reject_applicant(&email("t@x.com"))
            .expect("student rejects");
        assert_eq!(tuition.approval_status, Some(ApprovalStatus::Rejected));
        tuition
            .reject_applicant(&email("t@x.com"))
            .expect("rejecting again is allowed");
    }

    #[test]
    fn pending_applicant_holds_the_tuition_until_rejected() {
        let mut tuition = TuitionRequest::from_draft(draft(), Utc::now());
        tuition
            .attach_applicant(applicant("t@x.com"))
            .expect("first tutor applies");
        assert_eq!(
            tuition.attach_applicant(applicant("t2@x.com")),
            Err(TransitionError::ApplicantPending)
        );
        assert_eq!(tuition.tutor_email(), Some(&email("t@x.com")));
        tuition
            .attach_applicant(applicant("t@x.com"))
            .expect("same tutor can be attached again");

        tuition
            .reject_applicant(&email("t@x.com"))
            .expect("student rejects");
        tuition
            .attach_applicant(applicant("t2@x.com"))
            .expect("next tutor applies after rejection");
        assert_eq!(tuition.tutor_email(), Some(&email("t2@x.com")));
        assert_eq!(tuition.approval_status, Some(ApprovalStatus::Pending));
    }

    #[test]
    fn edits_recompute_the_content_key() {
        let mut tuition = TuitionRequest::from_draft(draft(), Utc::now());
        let original = tuition.dedup_key.clone();
        tuition
            .edit(TuitionDetailsUpdate {
                subject: Some("Physics".to_string()),
                ..TuitionDetailsUpdate::default()
            })
            .expect("unpaid request is editable");
        assert_ne!(tuition.dedup_key, original);
        assert_eq!(tuition.dedup_key, tuition.draft().dedup_key());

        tuition
            .edit(TuitionDetailsUpdate {
                subject: Some(draft().subject),
                ..TuitionDetailsUpdate::default()
            })
            .expect("edit back");
        assert_eq!(tuition.dedup_key, original);
    }

    #[test]
    fn settled_tuition_refuses_new_applicants_and_edits() {
        let mut tuition = TuitionRequest::from_draft(draft(), Utc::now());
        tuition
            .attach_applicant(applicant("t@x.com"))
            .expect("tutor can apply");
        tuition.mark_settled();
        tuition.mark_settled();

        assert_eq!(tuition.payment_status, Some(PaymentStatus::Paid));
        assert_eq!(tuition.approval_status, Some(ApprovalStatus::Approved));
        assert_eq!(
            tuition.attach_applicant(applicant("late@x.com")),
            Err(TransitionError::AlreadySettled)
        );
        assert_eq!(
            tuition.reject_applicant(&email("t@x.com")),
            Err(TransitionError::AlreadySettled)
        );
        assert_eq!(
            tuition.edit(TuitionDetailsUpdate::default()),
            Err(TransitionError::AlreadySettled)
        );
    }

    #[test]
    fn approved_application_cannot_be_revised() {
        let tuition = TuitionRequest::from_draft(draft(), Utc::now());
        let mut application = Application::for_tuition(&tuition, &applicant("t@x.com"));
        application
            .revise(ApplicationUpdate {
                tutor_expected_salary: Some(600),
                ..ApplicationUpdate::default()
            })
            .expect("pending application is editable");
        assert_eq!(application.tutor_expected_salary, 600);

        application.application_status = ApprovalStatus::Approved;
        assert!(application.revise(ApplicationUpdate::default()).is_err());
    }

    #[test]
    fn tuition_serializes_embedded_applicant_fields() {
        let mut tuition = TuitionRequest::from_draft(draft(), Utc::now());
        let value = serde_json::to_value(&tuition).expect("serializes");
        assert_eq!(value["status"], "Pending");
        assert!(value.get("approvalStatus").is_none());
        assert!(value.get("tutorEmail").is_none());
        assert!(value.get("dedupKey").is_none());

        tuition
            .attach_applicant(applicant("t@x.com"))
            .expect("tutor can apply");
        let value = serde_json::to_value(&tuition).expect("serializes");
        assert_eq!(value["approvalStatus"], "Pending");
        assert_eq!(value["tutorEmail"], "t@x.com");
        assert!(value.get("applied_at").is_some());
    }

    #[test]
    fn page_bounds_limit() {
        assert_eq!(Page::new(None, None), Page { limit: 10, skip: 0 });
        assert_eq!(Page::new(Some(500), Some(20)), Page { limit: 100, skip: 20 });
        assert_eq!(Page::new(Some(0), None).limit, Page::DEFAULT_LIMIT);
    }

    #[test]
    fn roles_parse_case_insensitively() {
        assert_eq!(Role::parse("Admin"), Some(Role::Admin));
        assert_eq!(Role::parse("tutor"), Some(Role::Tutor));
        assert_eq!(Role::parse("guest"), None);
        assert_eq!(ListingStatus::parse("approved"), Some(ListingStatus::Approved));
    }
}
