use std::time::Duration;

use axum::http::StatusCode;
use axum::response::IntoResponse;

use super::common::*;

use crate::marketplace::bounded;
use crate::marketplace::domain::{
    ApplicationUpdate, ApprovalStatus, ListingStatus, Page, PaymentStatus, ProfileUpdate, Role,
    TuitionDetailsUpdate,
};
use crate::marketplace::repository::{
    ApplicationRepository, PaymentQuery, PaymentRepository, RepositoryError, TuitionRepository,
};
use crate::marketplace::{
    CreateOutcome, MarketplaceError, RegisterOutcome, Registration, SettlementOutcome,
};

#[tokio::test]
async fn identical_tuition_is_reported_instead_of_duplicated() {
    let harness = harness().await;
    let first = post_tuition(&harness, "Math").await;

    let mut again = draft("  math ");
    again.student_name = "a".to_string();
    let outcome = harness
        .state
        .tuitions
        .create(&caller(STUDENT), again)
        .await
        .expect("create");
    assert_eq!(outcome, CreateOutcome::Exists { existing_id: first });

    let page = harness
        .state
        .tuitions
        .list_all(None, None, Page::new(None, None))
        .await
        .expect("list");
    assert_eq!(page.result.len(), 1);
    assert_eq!(page.count, 0);
}

#[tokio::test]
async fn tuitions_can_only_be_posted_for_yourself() {
    let harness = harness().await;
    let err = harness
        .state
        .tuitions
        .create(&caller(TUTOR), draft("Math"))
        .await
        .expect_err("foreign student email");
    assert!(matches!(err, MarketplaceError::Forbidden(_)));
}

#[tokio::test]
async fn registration_is_insert_if_absent_and_never_grants_admin() {
    let harness = harness().await;
    let registration = |role| Registration {
        email: email("new@x.com"),
        display_name: Some("New".to_string()),
        photo_url: None,
        role,
    };

    let created = harness
        .state
        .users
        .register(registration(Some(Role::Student)))
        .await
        .expect("register");
    assert!(matches!(created, RegisterOutcome::Created { .. }));

    let again = harness
        .state
        .users
        .register(registration(Some(Role::Tutor)))
        .await
        .expect("register again");
    assert_eq!(
        again,
        RegisterOutcome::Exists {
            message: "User exists"
        }
    );
    assert_eq!(
        harness.state.users.role_of("NEW@x.com").await.expect("role"),
        Some(Role::Student)
    );

    let admin = harness
        .state
        .users
        .register(Registration {
            email: email("sneaky@x.com"),
            display_name: None,
            photo_url: None,
            role: Some(Role::Admin),
        })
        .await;
    assert!(matches!(admin, Err(MarketplaceError::Forbidden(_))));
}

#[tokio::test]
async fn profile_updates_are_limited_to_owner_or_admin() {
    let harness = harness().await;
    let update = ProfileUpdate {
        display_name: Some("Renamed".to_string()),
        photo_url: None,
    };

    let err = harness
        .state
        .users
        .update_profile(&caller(TUTOR), STUDENT, update.clone())
        .await
        .expect_err("tutor cannot edit student");
    assert!(matches!(err, MarketplaceError::Forbidden(_)));

    let user = harness
        .state
        .users
        .update_profile(&caller(ADMIN), STUDENT, update)
        .await
        .expect("admin edits");
    assert_eq!(user.display_name.as_deref(), Some("Renamed"));

    let empty = harness
        .state
        .users
        .update_profile(&caller(STUDENT), STUDENT, ProfileUpdate::default())
        .await;
    assert!(matches!(empty, Err(MarketplaceError::Validation(_))));
}

#[tokio::test]
async fn listing_status_requires_admin_acting_as_themselves() {
    let harness = harness().await;
    let id = post_tuition(&harness, "Math").await;

    let err = harness
        .state
        .tuitions
        .set_listing_status(&caller(STUDENT), STUDENT, id, ListingStatus::Approved)
        .await
        .expect_err("students cannot approve");
    assert!(matches!(err, MarketplaceError::Forbidden(_)));

    let err = harness
        .state
        .tuitions
        .set_listing_status(&caller(ADMIN), STUDENT, id, ListingStatus::Approved)
        .await
        .expect_err("email must match caller");
    assert!(matches!(err, MarketplaceError::Forbidden(_)));

    let approved = harness
        .state
        .tuitions
        .set_listing_status(&caller(ADMIN), ADMIN, id, ListingStatus::Approved)
        .await
        .expect("admin approves");
    assert_eq!(approved.status, ListingStatus::Approved);

    let err = harness
        .state
        .tuitions
        .set_listing_status(&caller(ADMIN), ADMIN, id, ListingStatus::Rejected)
        .await
        .expect_err("decided once");
    assert!(matches!(err, MarketplaceError::Conflict(_)));

    let page = harness
        .state
        .tuitions
        .list_all(None, None, Page::new(None, None))
        .await
        .expect("list");
    assert_eq!(page.count, 1);
}

#[tokio::test]
async fn only_tutors_apply_and_only_once() {
    let harness = harness().await;
    let id = post_tuition(&harness, "Math").await;

    let err = harness
        .state
        .applications
        .apply(&caller(STUDENT), apply_request(id))
        .await
        .expect_err("students cannot apply");
    assert!(matches!(err, MarketplaceError::Forbidden(_)));

    let application = harness
        .state
        .applications
        .apply(&caller(TUTOR), apply_request(id))
        .await
        .expect("tutor applies");
    assert_eq!(application.application_status, ApprovalStatus::Pending);
    assert_eq!(application.subject, "Math");

    let tuition = harness
        .stores
        .tuitions
        .fetch(&id)
        .await
        .expect("fetch")
        .expect("present");
    assert_eq!(tuition.approval_status, Some(ApprovalStatus::Pending));
    assert_eq!(tuition.tutor_email(), Some(&email(TUTOR)));

    let err = harness
        .state
        .applications
        .apply(&caller(TUTOR), apply_request(id))
        .await
        .expect_err("second application");
    assert!(matches!(err, MarketplaceError::Conflict(_)));

    let applied = harness
        .state
        .tuitions
        .applied_by(id, TUTOR)
        .await
        .expect("check");
    assert_eq!(applied.len(), 1);
    assert_eq!(applied[0].id, id);
    assert!(harness
        .state
        .tuitions
        .applied_by(id, "other@x.com")
        .await
        .expect("check")
        .is_empty());
}

#[tokio::test]
async fn interrupted_apply_reports_partial_failure_and_can_be_retried() {
    let harness = harness().await;
    let id = post_tuition(&harness, "Math").await;

    harness.applications.fail_writes(true);
    let err = harness
        .state
        .applications
        .apply(&caller(TUTOR), apply_request(id))
        .await
        .expect_err("application insert fails");
    match err {
        MarketplaceError::PartialFailure {
            operation,
            completed,
            failed,
            ..
        } => {
            assert_eq!(operation, "apply");
            assert_eq!(completed, vec!["tuition_updated"]);
            assert_eq!(failed, "application_inserted");
        }
        other => panic!("expected partial failure, got {other:?}"),
    }

    harness.applications.fail_writes(false);
    harness
        .state
        .applications
        .apply(&caller(TUTOR), apply_request(id))
        .await
        .expect("retry completes");
    let application = harness
        .stores
        .applications
        .find_for_tutor(&id, &email(TUTOR))
        .await
        .expect("find");
    assert!(application.is_some());
}

#[tokio::test]
async fn rejecting_a_tutor_updates_tuition_and_application() {
    let harness = harness().await;
    let id = post_tuition(&harness, "Math").await;
    harness
        .state
        .applications
        .apply(&caller(TUTOR), apply_request(id))
        .await
        .expect("apply");

    let err = harness
        .state
        .tuitions
        .reject_applicant(&caller(STUDENT), id, &email("other@x.com"))
        .await
        .expect_err("not the applicant");
    assert!(matches!(err, MarketplaceError::NotFound(_)));

    let tuition = harness
        .state
        .tuitions
        .reject_applicant(&caller(STUDENT), id, &email(TUTOR))
        .await
        .expect("reject");
    assert_eq!(tuition.approval_status, Some(ApprovalStatus::Rejected));
    assert_eq!(tuition.status, ListingStatus::Pending);

    let application = harness
        .stores
        .applications
        .find_for_tutor(&id, &email(TUTOR))
        .await
        .expect("find")
        .expect("present");
    assert_eq!(application.application_status, ApprovalStatus::Rejected);
}

#[tokio::test]
async fn failed_rejection_mirror_is_partial_and_retryable() {
    let harness = harness().await;
    let id = post_tuition(&harness, "Math").await;
    harness
        .state
        .applications
        .apply(&caller(TUTOR), apply_request(id))
        .await
        .expect("apply");

    harness.applications.fail_writes(true);
    let err = harness
        .state
        .tuitions
        .reject_applicant(&caller(STUDENT), id, &email(TUTOR))
        .await
        .expect_err("mirror fails");
    assert!(matches!(
        err,
        MarketplaceError::PartialFailure {
            failed: "application_rejected",
            ..
        }
    ));

    harness.applications.fail_writes(false);
    harness
        .state
        .tuitions
        .reject_applicant(&caller(STUDENT), id, &email(TUTOR))
        .await
        .expect("retry completes");
    let application = harness
        .stores
        .applications
        .find_for_tutor(&id, &email(TUTOR))
        .await
        .expect("find")
        .expect("present");
    assert_eq!(application.application_status, ApprovalStatus::Rejected);
}

#[tokio::test]
async fn checkout_requires_an_active_applicant() {
    let harness = harness().await;
    let id = post_tuition(&harness, "Math").await;

    let err = harness
        .state
        .settlement
        .create_checkout(&caller(STUDENT), id, 500)
        .await
        .expect_err("nobody applied");
    assert!(matches!(err, MarketplaceError::Conflict(_)));

    harness
        .state
        .applications
        .apply(&caller(TUTOR), apply_request(id))
        .await
        .expect("apply");

    let err = harness
        .state
        .settlement
        .create_checkout(&caller(TUTOR), id, 500)
        .await
        .expect_err("tutor cannot pay for student");
    assert!(matches!(err, MarketplaceError::Forbidden(_)));

    let err = harness
        .state
        .settlement
        .create_checkout(&caller(STUDENT), id, 0)
        .await
        .expect_err("zero fee");
    assert!(matches!(err, MarketplaceError::Validation(_)));

    let link = harness
        .state
        .settlement
        .create_checkout(&caller(STUDENT), id, 500)
        .await
        .expect("checkout");
    assert!(link.url.starts_with("https://checkout.test/"));

    let requests = harness.gateway.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].amount_minor, 50_000);
    assert_eq!(requests[0].tutor_email, email(TUTOR));
}

#[tokio::test]
async fn settlement_is_idempotent_per_transaction() {
    let harness = harness().await;
    let id = post_tuition(&harness, "Math").await;
    harness
        .state
        .applications
        .apply(&caller(TUTOR), apply_request(id))
        .await
        .expect("apply");
    harness
        .state
        .settlement
        .create_checkout(&caller(STUDENT), id, 500)
        .await
        .expect("checkout");
    let session_id = harness.gateway.last_session_id();

    let unpaid = harness
        .state
        .settlement
        .settle(&session_id)
        .await
        .expect("settle unpaid");
    assert_eq!(
        unpaid,
        SettlementOutcome::NotPaid {
            payment_status: "unpaid".to_string()
        }
    );

    harness.gateway.pay(&session_id, "pi_123");
    let settled = harness
        .state
        .settlement
        .settle(&session_id)
        .await
        .expect("settle");
    assert!(matches!(settled, SettlementOutcome::Settled { ref transaction_id, tuition_id, .. }
        if transaction_id == "pi_123" && tuition_id == id));

    let again = harness
        .state
        .settlement
        .settle(&session_id)
        .await
        .expect("settle again");
    assert_eq!(
        again,
        SettlementOutcome::AlreadySettled {
            transaction_id: "pi_123".to_string()
        }
    );

    let payments = harness
        .stores
        .payments
        .list(&PaymentQuery::default(), Page::new(None, None))
        .await
        .expect("payments");
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].amount_minor, 50_000);
    assert_eq!(payments[0].payment_status, PaymentStatus::Paid);

    let tuition = harness
        .stores
        .tuitions
        .fetch(&id)
        .await
        .expect("fetch")
        .expect("present");
    assert!(tuition.is_paid());
    assert_eq!(tuition.approval_status, Some(ApprovalStatus::Approved));

    let application = harness
        .stores
        .applications
        .find_for_tutor(&id, &email(TUTOR))
        .await
        .expect("find")
        .expect("present");
    assert_eq!(application.application_status, ApprovalStatus::Approved);

    let err = harness
        .state
        .applications
        .edit(
            &caller(TUTOR),
            application.id,
            ApplicationUpdate {
                tutor_expected_salary: Some(900),
                ..ApplicationUpdate::default()
            },
        )
        .await
        .expect_err("approved application is frozen");
    assert!(matches!(err, MarketplaceError::Conflict(_)));
}

#[tokio::test]
async fn unknown_session_is_not_found() {
    let harness = harness().await;
    let err = harness
        .state
        .settlement
        .settle("cs_missing")
        .await
        .expect_err("unknown session");
    assert!(matches!(err, MarketplaceError::NotFound(_)));

    let err = harness
        .state
        .settlement
        .settle("  ")
        .await
        .expect_err("blank session");
    assert!(matches!(err, MarketplaceError::Validation(_)));
}

#[tokio::test]
async fn earnings_and_stats_are_role_gated() {
    let harness = harness().await;
    let id = post_tuition(&harness, "Math").await;
    post_tuition(&harness, "Physics").await;
    harness
        .state
        .applications
        .apply(&caller(TUTOR), apply_request(id))
        .await
        .expect("apply");
    harness
        .state
        .settlement
        .create_checkout(&caller(STUDENT), id, 300)
        .await
        .expect("checkout");
    let session_id = harness.gateway.last_session_id();
    harness.gateway.pay(&session_id, "pi_earn");
    harness
        .state
        .settlement
        .settle(&session_id)
        .await
        .expect("settle");

    let total = harness
        .state
        .reporting
        .tutor_earnings(&caller(TUTOR), TUTOR)
        .await
        .expect("earnings");
    assert_eq!(total.total_amount_minor, 30_000);
    assert_eq!(total.count, 1);

    let err = harness
        .state
        .reporting
        .tutor_earnings(&caller(STUDENT), STUDENT)
        .await
        .expect_err("students have no earnings");
    assert!(matches!(err, MarketplaceError::Forbidden(_)));

    let stats = harness
        .state
        .reporting
        .approval_stats(&caller(ADMIN), ADMIN)
        .await
        .expect("stats");
    let approved = stats
        .iter()
        .find(|entry| entry.approval_status == Some(ApprovalStatus::Approved))
        .expect("approved bucket");
    assert_eq!(approved.count, 1);
    assert!(stats
        .iter()
        .any(|entry| entry.approval_status.is_none() && entry.count == 1));

    let mine = harness
        .state
        .reporting
        .student_payments(&caller(STUDENT), STUDENT, Page::new(None, None))
        .await
        .expect("student payments");
    assert_eq!(mine.len(), 1);

    let err = harness
        .state
        .reporting
        .all_payments(&caller(STUDENT), STUDENT, Page::new(None, None))
        .await
        .expect_err("admin only");
    assert!(matches!(err, MarketplaceError::Forbidden(_)));
}

#[tokio::test]
async fn edited_request_frees_its_original_content_for_a_new_posting() {
    let harness = harness().await;
    let original = post_tuition(&harness, "Math").await;

    let edited = harness
        .state
        .tuitions
        .update_details(
            &caller(STUDENT),
            original,
            TuitionDetailsUpdate {
                subject: Some("Physics".to_string()),
                ..TuitionDetailsUpdate::default()
            },
        )
        .await
        .expect("edit");
    assert_eq!(edited.subject, "Physics");

    let outcome = harness
        .state
        .tuitions
        .create(&caller(STUDENT), draft("Math"))
        .await
        .expect("repost");
    let reposted = match outcome {
        CreateOutcome::Created { inserted_id } => inserted_id,
        CreateOutcome::Exists { existing_id } => {
            panic!("original fields matched edited request {existing_id}")
        }
    };
    assert_ne!(reposted, original);

    let err = harness
        .state
        .tuitions
        .update_details(
            &caller(STUDENT),
            reposted,
            TuitionDetailsUpdate {
                subject: Some("physics".to_string()),
                ..TuitionDetailsUpdate::default()
            },
        )
        .await
        .expect_err("edit would duplicate another request");
    assert!(matches!(err, MarketplaceError::Conflict(_)));

    let unchanged = harness
        .stores
        .tuitions
        .fetch(&reposted)
        .await
        .expect("fetch")
        .expect("present");
    assert_eq!(unchanged.subject, "Math");
}

#[tokio::test]
async fn second_tutor_waits_for_a_decision_on_the_first() {
    let harness = harness().await;
    let second = "t2@x.com";
    harness
        .state
        .users
        .grant_role(email(second), Role::Tutor)
        .await
        .expect("seed second tutor");
    let id = post_tuition(&harness, "Math").await;
    harness
        .state
        .applications
        .apply(&caller(TUTOR), apply_request(id))
        .await
        .expect("first tutor applies");

    let err = harness
        .state
        .applications
        .apply(&caller(second), apply_request(id))
        .await
        .expect_err("first tutor still pending");
    assert!(matches!(err, MarketplaceError::Conflict(_)));
    assert!(harness
        .stores
        .applications
        .find_for_tutor(&id, &email(second))
        .await
        .expect("find")
        .is_none());

    harness
        .state
        .tuitions
        .reject_applicant(&caller(STUDENT), id, &email(TUTOR))
        .await
        .expect("reject first tutor");
    harness
        .state
        .applications
        .apply(&caller(second), apply_request(id))
        .await
        .expect("second tutor applies after rejection");
    let tuition = harness
        .stores
        .tuitions
        .fetch(&id)
        .await
        .expect("fetch")
        .expect("present");
    assert_eq!(tuition.tutor_email(), Some(&email(second)));
}

#[tokio::test]
async fn payment_for_a_displaced_tutor_is_refused() {
    let harness = harness().await;
    let second = "t2@x.com";
    harness
        .state
        .users
        .grant_role(email(second), Role::Tutor)
        .await
        .expect("seed second tutor");
    let id = post_tuition(&harness, "Math").await;
    harness
        .state
        .applications
        .apply(&caller(TUTOR), apply_request(id))
        .await
        .expect("first tutor applies");
    harness
        .state
        .settlement
        .create_checkout(&caller(STUDENT), id, 500)
        .await
        .expect("checkout for first tutor");
    let session_id = harness.gateway.last_session_id();

    harness
        .state
        .tuitions
        .reject_applicant(&caller(STUDENT), id, &email(TUTOR))
        .await
        .expect("reject first tutor");
    harness
        .state
        .applications
        .apply(&caller(second), apply_request(id))
        .await
        .expect("second tutor applies");

    harness.gateway.pay(&session_id, "pi_stale");
    let err = harness
        .state
        .settlement
        .settle(&session_id)
        .await
        .expect_err("paid tutor was displaced");
    assert!(matches!(err, MarketplaceError::Conflict(_)));

    let tuition = harness
        .stores
        .tuitions
        .fetch(&id)
        .await
        .expect("fetch")
        .expect("present");
    assert!(!tuition.is_paid());
    assert_eq!(tuition.tutor_email(), Some(&email(second)));
    assert_eq!(tuition.approval_status, Some(ApprovalStatus::Pending));

    for (tutor, expected) in [
        (TUTOR, ApprovalStatus::Rejected),
        (second, ApprovalStatus::Pending),
    ] {
        let application = harness
            .stores
            .applications
            .find_for_tutor(&id, &email(tutor))
            .await
            .expect("find")
            .expect("present");
        assert_eq!(application.application_status, expected, "{tutor}");
    }
    let payments = harness
        .stores
        .payments
        .list(&PaymentQuery::default(), Page::new(None, None))
        .await
        .expect("payments");
    assert!(payments.is_empty());
}

#[tokio::test]
async fn interrupted_settlement_reports_partial_failure_and_can_be_retried() {
    let harness = harness().await;
    let id = post_tuition(&harness, "Math").await;
    harness
        .state
        .applications
        .apply(&caller(TUTOR), apply_request(id))
        .await
        .expect("apply");
    harness
        .state
        .settlement
        .create_checkout(&caller(STUDENT), id, 500)
        .await
        .expect("checkout");
    let session_id = harness.gateway.last_session_id();
    harness.gateway.pay(&session_id, "pi_retry");

    harness.applications.fail_writes(true);
    let err = harness
        .state
        .settlement
        .settle(&session_id)
        .await
        .expect_err("application update fails");
    match err {
        MarketplaceError::PartialFailure {
            operation,
            completed,
            failed,
            ..
        } => {
            assert_eq!(operation, "settlement");
            assert_eq!(completed, vec!["tuition_settled"]);
            assert_eq!(failed, "application_approved");
        }
        other => panic!("expected partial failure, got {other:?}"),
    }
    let payments = harness
        .stores
        .payments
        .list(&PaymentQuery::default(), Page::new(None, None))
        .await
        .expect("payments");
    assert!(payments.is_empty());

    harness.applications.fail_writes(false);
    let settled = harness
        .state
        .settlement
        .settle(&session_id)
        .await
        .expect("retry completes");
    assert!(matches!(settled, SettlementOutcome::Settled { .. }));
    let again = harness
        .state
        .settlement
        .settle(&session_id)
        .await
        .expect("settle again");
    assert!(matches!(again, SettlementOutcome::AlreadySettled { .. }));

    let payments = harness
        .stores
        .payments
        .list(&PaymentQuery::default(), Page::new(None, None))
        .await
        .expect("payments");
    assert_eq!(payments.len(), 1);
    assert_eq!(payments[0].transaction_id, "pi_retry");
    let application = harness
        .stores
        .applications
        .find_for_tutor(&id, &email(TUTOR))
        .await
        .expect("find")
        .expect("present");
    assert_eq!(application.application_status, ApprovalStatus::Approved);
}

#[tokio::test]
async fn stalled_store_call_times_out_as_gateway_timeout() {
    let stalled = std::future::pending::<Result<(), RepositoryError>>();
    let err = bounded(Duration::from_millis(20), stalled)
        .await
        .expect_err("deadline elapses");
    assert!(matches!(err, RepositoryError::Timeout));

    let err = MarketplaceError::from(err);
    assert!(matches!(err, MarketplaceError::Timeout(_)));
    assert_eq!(err.into_response().status(), StatusCode::GATEWAY_TIMEOUT);
}
