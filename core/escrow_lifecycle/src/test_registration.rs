use rust_decimal::Decimal;
use rust_decimal_macros::dec;

use crate::audit::AuditAction;
use crate::errors::{Entity, FailureKind, GuardViolation, LifecycleError};
use crate::invariants::{
    assert_all_project_invariants, assert_identity_immutable, assert_ledger_zeroed,
    assert_valid_status_transition,
};
use crate::messages;
use crate::response::Response;
use crate::storage::{ClientStore, LedgerStore, ProjectStore};
use crate::testutils::{ctx, sample_submission, Harness, ESCROW_ACCOUNT};
use crate::types::{BucketFlag, Client, LedgerRow, Project, ProjectStatus, ProjectSubmission};
use crate::validation::{Field, FieldViolation};

fn violation_fields(err: &LifecycleError) -> Vec<Field> {
    match err {
        LifecycleError::Validation(list) => list.iter().map(|v| v.field).collect(),
        other => panic!("expected validation failure, got {other:?}"),
    }
}

#[tokio::test]
async fn test_submit_creates_submitted_project_with_allocations() {
    let h = Harness::new().await;
    let project = h
        .lifecycle
        .submit(&ctx("maker"), sample_submission("PRJ-1"))
        .await
        .unwrap();

    assert_eq!(project.status, ProjectStatus::Submitted);
    assert_eq!(project.created_by, "maker");
    assert_eq!(project.escrow_account.as_deref(), Some(ESCROW_ACCOUNT));
    assert_eq!(project.retention_value, dec!(50000));
    assert_eq!(project.marketing_value, dec!(30000));
    assert_eq!(project.construction_value, dec!(20000));
    assert!(!project.distribution_enabled);
    assert_all_project_invariants(&project);

    let bucket = h.buckets.snapshot("PRJ-1").unwrap();
    assert_eq!(bucket.bucket_flag, BucketFlag::Virtual);
    assert_eq!(bucket.escrow_account, ESCROW_ACCOUNT);

    let ledger = h.ledger.get("PRJ-1").await.unwrap().unwrap();
    assert_ledger_zeroed(&ledger);

    let entries = h.audit.entries();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].action, AuditAction::Create);
    assert!(entries[0].before.is_none());
    assert_eq!(entries[0].message, messages::PROJECT_SUBMITTED);
}

#[tokio::test]
async fn test_submit_duplicate_project_id_never_mutates_existing() {
    let h = Harness::new().await;
    h.lifecycle
        .submit(&ctx("maker"), sample_submission("PRJ-1"))
        .await
        .unwrap();
    let original = h.projects.snapshot("PRJ-1").unwrap();

    let duplicate = ProjectSubmission {
        name_en: "Different Name".into(),
        name_ar: "اسم مختلف".into(),
        value: Some(dec!(5)),
        ..sample_submission("PRJ-1")
    };
    let err = h
        .lifecycle
        .submit(&ctx("other-maker"), duplicate)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), FailureKind::StateGuard);
    assert_eq!(
        err,
        LifecycleError::Guard(GuardViolation::DuplicateProjectId("PRJ-1".into()))
    );
    assert_eq!(h.projects.snapshot("PRJ-1").unwrap(), original);
    assert_eq!(h.audit.entries().len(), 1);
}

#[tokio::test]
async fn test_submit_rejects_duplicate_names() {
    let h = Harness::new().await;
    h.lifecycle
        .submit(&ctx("maker"), sample_submission("PRJ-1"))
        .await
        .unwrap();

    let same_arabic = ProjectSubmission {
        name_en: "Another Tower".into(),
        ..sample_submission("PRJ-2")
    };
    let same_arabic = ProjectSubmission {
        name_ar: sample_submission("PRJ-1").name_ar,
        ..same_arabic
    };
    let err = h
        .lifecycle
        .submit(&ctx("maker"), same_arabic)
        .await
        .unwrap_err();
    assert_eq!(err, LifecycleError::from(GuardViolation::DuplicateArabicName));

    let same_english = ProjectSubmission {
        name_en: sample_submission("PRJ-1").name_en.to_lowercase(),
        ..sample_submission("PRJ-3")
    };
    let err = h
        .lifecycle
        .submit(&ctx("maker"), same_english)
        .await
        .unwrap_err();
    assert_eq!(err, LifecycleError::from(GuardViolation::DuplicateEnglishName));
    assert!(h.projects.snapshot("PRJ-3").is_none());
}

#[tokio::test]
async fn test_submit_requires_known_client_with_small_scheme_code() {
    let h = Harness::new().await;
    let unknown = ProjectSubmission {
        client_id: "CL-404".into(),
        ..sample_submission("PRJ-1")
    };
    let err = h.lifecycle.submit(&ctx("maker"), unknown).await.unwrap_err();
    assert_eq!(err, LifecycleError::not_found(Entity::Client, "CL-404"));

    h.clients
        .save(&Client {
            client_id: "CL-BIG".into(),
            name: "Large Scheme".into(),
            scheme_code: 100,
        })
        .await
        .unwrap();
    let big = ProjectSubmission {
        client_id: "CL-BIG".into(),
        ..sample_submission("PRJ-2")
    };
    let err = h.lifecycle.submit(&ctx("maker"), big).await.unwrap_err();
    assert_eq!(err, LifecycleError::from(GuardViolation::SchemeCodeOutOfRange(100)));
}

#[tokio::test]
async fn test_submit_reports_all_violations_at_once() {
    let h = Harness::new().await;
    for cif in ["12", "abcde12", ""] {
        let submission = ProjectSubmission {
            cif: cif.into(),
            name_en: String::new(),
            ..sample_submission("PRJ-1")
        };
        let err = h
            .lifecycle
            .submit(&ctx("maker"), submission)
            .await
            .unwrap_err();
        assert_eq!(violation_fields(&err), vec![Field::Cif, Field::NameEn]);
    }
    assert!(h.projects.snapshot("PRJ-1").is_none());
}

#[tokio::test]
async fn test_arabic_precheck_short_circuits_rule_list() {
    let h = Harness::new().await;
    let submission = ProjectSubmission {
        cif: "12".into(),
        phone: String::new(),
        name_ar: "Palm Towers".into(),
        ..sample_submission("PRJ-1")
    };
    let err = h
        .lifecycle
        .submit(&ctx("maker"), submission)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LifecycleError::Validation(vec![FieldViolation::new(
            Field::NameAr,
            "name_ar.not_arabic"
        )])
    );
}

#[tokio::test]
async fn test_submit_without_escrow_is_refused() {
    let h = Harness::new().await;
    let submission = ProjectSubmission {
        escrow: None,
        ..sample_submission("PRJ-1")
    };
    let err = h
        .lifecycle
        .submit(&ctx("maker"), submission)
        .await
        .unwrap_err();
    assert_eq!(err, LifecycleError::from(GuardViolation::EscrowAccountMissing));
}

#[tokio::test]
async fn test_draft_then_update_with_escrow_submits() {
    let h = Harness::new().await;
    let draft = h
        .lifecycle
        .save_draft(&ctx("maker"), sample_submission("PRJ-1"))
        .await
        .unwrap();
    assert_eq!(draft.status, ProjectStatus::Draft);
    assert!(draft.escrow_account.is_none());
    assert!(h.buckets.snapshot("PRJ-1").is_none());
    assert_all_project_invariants(&draft);

    let submitted = h
        .lifecycle
        .update(&ctx("maker"), "PRJ-1", sample_submission("PRJ-1"))
        .await
        .unwrap();
    assert_eq!(submitted.status, ProjectStatus::Submitted);
    assert_eq!(submitted.escrow_account.as_deref(), Some(ESCROW_ACCOUNT));
    assert!(h.buckets.snapshot("PRJ-1").is_some());
    assert_valid_status_transition(draft.status, submitted.status);
    assert_identity_immutable(&draft, &submitted);
    assert_all_project_invariants(&submitted);
}

#[tokio::test]
async fn test_update_without_escrow_keeps_draft() {
    let h = Harness::new().await;
    h.lifecycle
        .save_draft(&ctx("maker"), sample_submission("PRJ-1"))
        .await
        .unwrap();
    let still_draft = h
        .lifecycle
        .update(
            &ctx("maker"),
            "PRJ-1",
            ProjectSubmission {
                escrow: None,
                unit_count: Some(80),
                ..sample_submission("PRJ-1")
            },
        )
        .await
        .unwrap();
    assert_eq!(still_draft.status, ProjectStatus::Draft);
    assert_eq!(still_draft.unit_count, 80);
}

#[tokio::test]
async fn test_update_recomputes_allocations_and_resets_ledger() {
    let h = Harness::new().await;
    h.lifecycle
        .submit(&ctx("maker"), sample_submission("PRJ-1"))
        .await
        .unwrap();
    h.ledger
        .save(&LedgerRow {
            total_deposits: dec!(1200.50),
            available_balance: dec!(1200.50),
            ..LedgerRow::zeroed("PRJ-1")
        })
        .await
        .unwrap();

    let updated = h
        .lifecycle
        .update(
            &ctx("maker"),
            "PRJ-1",
            ProjectSubmission {
                value: Some(dec!(2000000)),
                ..sample_submission("PRJ-1")
            },
        )
        .await
        .unwrap();

    assert_eq!(updated.retention_value, dec!(100000));
    assert_eq!(updated.marketing_value, dec!(60000));
    assert_eq!(updated.construction_value, dec!(40000));
    assert_eq!(updated.status, ProjectStatus::Submitted);
    assert_ledger_zeroed(&h.ledger.get("PRJ-1").await.unwrap().unwrap());
    assert_all_project_invariants(&updated);
}

#[tokio::test]
async fn test_update_keeps_its_own_names() {
    let h = Harness::new().await;
    h.lifecycle
        .submit(&ctx("maker"), sample_submission("PRJ-1"))
        .await
        .unwrap();
    // Same names as the stored record: not a duplicate of itself.
    let result = h
        .lifecycle
        .update(&ctx("maker"), "PRJ-1", sample_submission("PRJ-1"))
        .await;
    assert!(result.is_ok());
}

#[tokio::test]
async fn test_update_path_id_wins_over_body() {
    let h = Harness::new().await;
    h.lifecycle
        .submit(&ctx("maker"), sample_submission("PRJ-1"))
        .await
        .unwrap();
    let updated = h
        .lifecycle
        .update(
            &ctx("maker"),
            "PRJ-1",
            ProjectSubmission {
                project_id: "PRJ-OTHER".into(),
                ..sample_submission("PRJ-1")
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.project_id, "PRJ-1");
    assert!(h.projects.snapshot("PRJ-OTHER").is_none());
}

#[tokio::test]
async fn test_update_refused_in_terminal_states() {
    let h = Harness::new().await;
    let project = h
        .lifecycle
        .submit(&ctx("maker"), sample_submission("PRJ-1"))
        .await
        .unwrap();

    for status in [
        ProjectStatus::RejectedConfirmed,
        ProjectStatus::PreClosed,
        ProjectStatus::PostClosed,
    ] {
        let terminal = Project {
            status,
            ..project.clone()
        };
        h.projects.save(&terminal).await.unwrap();
        let err = h
            .lifecycle
            .update(&ctx("maker"), "PRJ-1", sample_submission("PRJ-1"))
            .await
            .unwrap_err();
        assert_eq!(err, LifecycleError::from(GuardViolation::TerminalState(status)));
        assert_eq!(h.projects.snapshot("PRJ-1").unwrap(), terminal);
    }
}

#[tokio::test]
async fn test_update_of_returned_project_resubmits() {
    let h = Harness::new().await;
    h.lifecycle
        .submit(&ctx("maker"), sample_submission("PRJ-1"))
        .await
        .unwrap();
    let returned = h
        .lifecycle
        .return_for_correction(&ctx("checker"), "PRJ-1", Some("fix licence".into()))
        .await
        .unwrap();
    assert_eq!(returned.return_reason.as_deref(), Some("fix licence"));

    let resubmitted = h
        .lifecycle
        .update(
            &ctx("maker"),
            "PRJ-1",
            ProjectSubmission {
                license_number: "LIC-78".into(),
                ..sample_submission("PRJ-1")
            },
        )
        .await
        .unwrap();
    assert_eq!(resubmitted.status, ProjectStatus::Submitted);
    assert!(resubmitted.return_reason.is_none());
    assert_eq!(resubmitted.license_number, "LIC-78");
}

#[tokio::test]
async fn test_update_unknown_project() {
    let h = Harness::new().await;
    let err = h
        .lifecycle
        .update(&ctx("maker"), "NOPE", sample_submission("NOPE"))
        .await
        .unwrap_err();
    assert_eq!(err, LifecycleError::not_found(Entity::Project, "NOPE"));
}

#[tokio::test]
async fn test_validate_submission_response_codes() {
    let h = Harness::new().await;
    let maker = ctx("maker");

    let ok = h
        .lifecycle
        .validate_submission(&maker, &sample_submission("PRJ-1"))
        .await;
    let passed = Response::validation(ok, &maker);
    assert!(passed.is_success());
    assert_eq!(passed.code, messages::VALIDATION_PASSED);

    let bad = ProjectSubmission {
        value: Some(dec!(-10)),
        ..sample_submission("PRJ-1")
    };
    let failed = Response::validation(
        h.lifecycle.validate_submission(&maker, &bad).await,
        &maker,
    );
    assert!(!failed.is_success());
    assert_eq!(failed.code, messages::VALIDATION_FAILED);
    assert_eq!(failed.violations.len(), 1);
    assert_eq!(failed.violations[0].code, "value.negative");
    assert!(h.projects.snapshot("PRJ-1").is_none());
}

#[tokio::test]
async fn test_zero_value_project_has_zero_allocations() {
    let h = Harness::new().await;
    let project = h
        .lifecycle
        .submit(
            &ctx("maker"),
            ProjectSubmission {
                value: Some(Decimal::ZERO),
                ..sample_submission("PRJ-0")
            },
        )
        .await
        .unwrap();
    assert!(project.retention_value.is_zero());
    assert!(project.marketing_value.is_zero());
    assert!(project.construction_value.is_zero());
}

#[tokio::test]
async fn test_oversized_value_is_a_validation_failure() {
    let h = Harness::new().await;
    let huge = ProjectSubmission {
        value: Some(Decimal::MAX),
        ..sample_submission("PRJ-BIG")
    };
    let err = h
        .lifecycle
        .submit(&ctx("maker"), huge.clone())
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Validation);
    assert_eq!(violation_fields(&err), vec![Field::Value]);
    assert!(h.projects.snapshot("PRJ-BIG").is_none());

    h.lifecycle
        .submit(&ctx("maker"), sample_submission("PRJ-BIG"))
        .await
        .unwrap();
    let err = h
        .lifecycle
        .update(&ctx("maker"), "PRJ-BIG", huge)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Validation);
    let stored = h.projects.snapshot("PRJ-BIG").unwrap();
    assert_eq!(stored.value, sample_submission("PRJ-BIG").value.unwrap());
}

#[tokio::test]
async fn test_store_failure_surfaces_as_infrastructure() {
    let h = Harness::new().await;
    h.projects.fail_saves(true);
    let err = h
        .lifecycle
        .submit(&ctx("maker"), sample_submission("PRJ-1"))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Infrastructure);
    assert!(h.audit.entries().is_empty());
}
