use crate::audit::AuditAction;
use crate::errors::{Entity, FailureKind, GuardViolation, LifecycleError, ProvisioningStep};
use crate::invariants::{
    assert_activation_complete, assert_all_project_invariants, assert_identity_immutable,
    assert_valid_status_transition,
};
use crate::lifecycle::{DocumentRequest, InclusionRequest};
use crate::messages;
use crate::provisioning::{AccountMode, APPROVAL_CHECKLIST};
use crate::storage::{InclusionStore, ProjectStore};
use crate::testutils::{ctx, fixture_now, sample_submission, Harness, ESCROW_ACCOUNT};
use crate::types::{
    BucketFlag, BucketFunding, ClosureStage, DistributionType, DocumentLevel, EscrowDetails,
    FundType, Project, ProjectStatus, ProjectSubmission, SubAccountRole,
};

/// Submit `project_id` as `maker` and upload its approval checklist.
async fn submitted(h: &Harness, project_id: &str) -> Project {
    let project = h
        .lifecycle
        .submit(&ctx("maker"), sample_submission(project_id))
        .await
        .unwrap();
    h.upload_checklist(project_id).await;
    project
}

async fn activated(h: &Harness, project_id: &str) -> Project {
    submitted(h, project_id).await;
    h.lifecycle
        .approve(&ctx("checker"), project_id)
        .await
        .unwrap()
}

fn physical_submission(project_id: &str, distribution_type: DistributionType) -> ProjectSubmission {
    let funding = |account: &str| BucketFunding {
        account: Some(account.to_string()),
        ..BucketFunding::default()
    };
    ProjectSubmission {
        distribution_type,
        escrow: Some(EscrowDetails {
            bucket_flag: BucketFlag::Physical,
            escrow_account: ESCROW_ACCOUNT.into(),
            customer_account: None,
            construction: funding("PHY-C"),
            marketing: funding("PHY-M"),
            retention: funding("PHY-R"),
        }),
        ..sample_submission(project_id)
    }
}

// ─────────────────────────────────────────────────────────
// Approval and provisioning
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_approve_provisions_all_three_sub_accounts() {
    let h = Harness::new().await;
    let before = submitted(&h, "PRJ-1").await;

    let active = h
        .lifecycle
        .approve(&ctx("checker"), "PRJ-1")
        .await
        .unwrap();

    assert_activation_complete(&active);
    assert_all_project_invariants(&active);
    assert_identity_immutable(&before, &active);
    assert_valid_status_transition(before.status, active.status);
    assert_eq!(active.construction_account.as_deref(), Some("SUB-1"));
    assert_eq!(active.marketing_account.as_deref(), Some("SUB-2"));
    assert_eq!(active.retention_account.as_deref(), Some("SUB-3"));
    assert_eq!(active.verified_by.as_deref(), Some("checker"));
    assert_eq!(active.verified_at, Some(fixture_now()));

    assert_eq!(
        h.accounts.calls(),
        vec![
            (ESCROW_ACCOUNT.to_string(), AccountMode::CreateNew),
            ("SUB-1".to_string(), AccountMode::SuspendExisting),
            (ESCROW_ACCOUNT.to_string(), AccountMode::CreateNew),
            ("SUB-2".to_string(), AccountMode::SuspendExisting),
            (ESCROW_ACCOUNT.to_string(), AccountMode::CreateNew),
            ("SUB-3".to_string(), AccountMode::SuspendExisting),
        ]
    );

    let bucket = h.buckets.snapshot("PRJ-1").unwrap();
    assert_eq!(bucket.construction.account.as_deref(), Some("SUB-1"));
    assert_eq!(bucket.marketing.account.as_deref(), Some("SUB-2"));
    assert_eq!(bucket.retention.account.as_deref(), Some("SUB-3"));
    assert_eq!(h.projects.snapshot("PRJ-1").unwrap(), active);
}

#[tokio::test]
async fn test_approve_with_wired_sub_accounts_skips_account_service() {
    let h = Harness::new().await;
    let project = submitted(&h, "PRJ-1").await;
    let wired = SubAccountRole::ALL
        .into_iter()
        .fold(project, |p, role| {
            p.with_sub_account(role, format!("PRE-{}", role.as_str()))
        });
    h.projects.save(&wired).await.unwrap();

    let active = h
        .lifecycle
        .approve(&ctx("checker"), "PRJ-1")
        .await
        .unwrap();

    assert!(h.accounts.calls().is_empty());
    assert_activation_complete(&active);
    assert_eq!(active.construction_account.as_deref(), Some("PRE-construction"));
}

#[tokio::test]
async fn test_creator_can_never_approve() {
    let h = Harness::new().await;
    let project = submitted(&h, "PRJ-1").await;

    for status in [
        ProjectStatus::Submitted,
        ProjectStatus::Rejected,
        ProjectStatus::PreClosing,
        ProjectStatus::Active,
    ] {
        let staged = Project {
            status,
            ..project.clone()
        };
        h.projects.save(&staged).await.unwrap();
        let err = h
            .lifecycle
            .approve(&ctx("maker"), "PRJ-1")
            .await
            .unwrap_err();
        assert_eq!(err, LifecycleError::from(GuardViolation::MakerChecker));
        assert_eq!(h.projects.snapshot("PRJ-1").unwrap(), staged);
    }
    assert!(h.accounts.calls().is_empty());
}

#[tokio::test]
async fn test_approve_draft_has_nothing_to_approve() {
    let h = Harness::new().await;
    h.lifecycle
        .save_draft(&ctx("maker"), sample_submission("PRJ-1"))
        .await
        .unwrap();
    let err = h
        .lifecycle
        .approve(&ctx("checker"), "PRJ-1")
        .await
        .unwrap_err();
    assert_eq!(err, LifecycleError::from(GuardViolation::NothingToApprove));
    assert_eq!(err.kind(), FailureKind::StateGuard);
}

#[tokio::test]
async fn test_approve_active_project_has_no_approval_pending() {
    let h = Harness::new().await;
    activated(&h, "PRJ-1").await;
    let err = h
        .lifecycle
        .approve(&ctx("checker"), "PRJ-1")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LifecycleError::from(GuardViolation::NoApprovalPending(ProjectStatus::Active))
    );
}

#[tokio::test]
async fn test_approve_unknown_project() {
    let h = Harness::new().await;
    let err = h
        .lifecycle
        .approve(&ctx("checker"), "PRJ-404")
        .await
        .unwrap_err();
    assert_eq!(err, LifecycleError::not_found(Entity::Project, "PRJ-404"));
}

#[tokio::test]
async fn test_missing_documents_block_approval_before_provisioning() {
    let h = Harness::new().await;
    h.lifecycle
        .submit(&ctx("maker"), sample_submission("PRJ-1"))
        .await
        .unwrap();
    h.lifecycle
        .record_document(
            &ctx("maker"),
            "PRJ-1",
            DocumentRequest {
                document_name: APPROVAL_CHECKLIST[0].into(),
                level: DocumentLevel::Project,
                file_name: "agreement.pdf".into(),
            },
        )
        .await
        .unwrap();
    // Unit-level uploads do not count towards the checklist.
    h.lifecycle
        .record_document(
            &ctx("maker"),
            "PRJ-1",
            DocumentRequest {
                document_name: APPROVAL_CHECKLIST[1].into(),
                level: DocumentLevel::Unit,
                file_name: "permit.pdf".into(),
            },
        )
        .await
        .unwrap();

    let err = h
        .lifecycle
        .approve(&ctx("checker"), "PRJ-1")
        .await
        .unwrap_err();

    assert_eq!(
        err,
        LifecycleError::from(GuardViolation::MissingDocuments(
            APPROVAL_CHECKLIST[1..].iter().map(|s| s.to_string()).collect()
        ))
    );
    assert!(h.accounts.calls().is_empty());
    assert_eq!(
        h.projects.snapshot("PRJ-1").unwrap().status,
        ProjectStatus::Submitted
    );
}

#[tokio::test]
async fn test_nil_account_at_later_role_leaves_project_unwired() {
    let h = Harness::new().await;
    let before = submitted(&h, "PRJ-1").await;
    let bucket_before = h.buckets.snapshot("PRJ-1").unwrap();
    // Third call is the marketing create.
    h.accounts.answer(2, Some("NIL"));

    let err = h
        .lifecycle
        .approve(&ctx("checker"), "PRJ-1")
        .await
        .unwrap_err();

    assert_eq!(
        err,
        LifecycleError::Provisioning {
            role: SubAccountRole::Marketing,
            step: ProvisioningStep::Create,
            orphaned: vec!["SUB-1".into()],
        }
    );
    assert_eq!(err.kind(), FailureKind::Provisioning);
    assert_eq!(err.code(), "provisioning.marketing.create_failed");

    let after = h.projects.snapshot("PRJ-1").unwrap();
    assert_eq!(after, before);
    assert_eq!(after.unwired_roles().len(), 3);
    assert_eq!(h.buckets.snapshot("PRJ-1").unwrap(), bucket_before);
    assert_eq!(h.audit.entries().len(), 1);
}

#[tokio::test]
async fn test_missing_suspend_answer_fails_first_role() {
    let h = Harness::new().await;
    submitted(&h, "PRJ-1").await;
    h.accounts.answer(1, None);

    let err = h
        .lifecycle
        .approve(&ctx("checker"), "PRJ-1")
        .await
        .unwrap_err();

    assert_eq!(
        err,
        LifecycleError::Provisioning {
            role: SubAccountRole::Construction,
            step: ProvisioningStep::Suspend,
            orphaned: vec!["SUB-1".into()],
        }
    );
    assert_eq!(h.accounts.calls().len(), 2);
    assert!(h
        .projects
        .snapshot("PRJ-1")
        .unwrap()
        .construction_account
        .is_none());
}

#[tokio::test]
async fn test_failed_provisioning_can_be_retried() {
    let h = Harness::new().await;
    submitted(&h, "PRJ-1").await;
    h.accounts.answer(0, Some(""));

    assert!(h.lifecycle.approve(&ctx("checker"), "PRJ-1").await.is_err());
    let active = h
        .lifecycle
        .approve(&ctx("checker"), "PRJ-1")
        .await
        .unwrap();
    assert_activation_complete(&active);
}

// ─────────────────────────────────────────────────────────
// Physical buckets and inclusions
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_physical_inclusion_based_approval_verifies_inclusions() {
    let h = Harness::new().await;
    h.lifecycle
        .submit(
            &ctx("maker"),
            physical_submission("PRJ-1", DistributionType::InclusionBased),
        )
        .await
        .unwrap();
    h.upload_checklist("PRJ-1").await;
    let record = h
        .lifecycle
        .add_inclusion(
            &ctx("maker"),
            "PRJ-1",
            InclusionRequest {
                iban: "AE070331234567890123456".into(),
                fund_type: FundType::BankFinance,
                include_in_distribution: true,
            },
        )
        .await
        .unwrap();
    assert!(!record.verified);

    let active = h
        .lifecycle
        .approve(&ctx("checker"), "PRJ-1")
        .await
        .unwrap();

    assert!(h.accounts.calls().is_empty());
    assert_activation_complete(&active);
    let inclusions = h.inclusions.list_by_project("PRJ-1").await.unwrap();
    assert_eq!(inclusions.len(), 1);
    assert!(inclusions[0].verified);
    assert_eq!(
        inclusions[0].collection_account.as_deref(),
        Some(ESCROW_ACCOUNT)
    );
}

#[tokio::test]
async fn test_physical_standard_approval_leaves_inclusions_pending() {
    let h = Harness::new().await;
    h.lifecycle
        .submit(
            &ctx("maker"),
            physical_submission("PRJ-1", DistributionType::Standard),
        )
        .await
        .unwrap();
    h.upload_checklist("PRJ-1").await;
    h.lifecycle
        .add_inclusion(
            &ctx("maker"),
            "PRJ-1",
            InclusionRequest {
                iban: "AE070331234567890123456".into(),
                fund_type: FundType::Loan,
                include_in_distribution: false,
            },
        )
        .await
        .unwrap();

    h.lifecycle
        .approve(&ctx("checker"), "PRJ-1")
        .await
        .unwrap();

    let record = h
        .inclusions
        .get("PRJ-1", "AE070331234567890123456")
        .await
        .unwrap()
        .unwrap();
    assert!(!record.verified);
}

#[tokio::test]
async fn test_inclusion_guards() {
    let h = Harness::new().await;
    h.lifecycle
        .submit(
            &ctx("maker"),
            physical_submission("PRJ-1", DistributionType::InclusionBased),
        )
        .await
        .unwrap();
    let request = |iban: &str| InclusionRequest {
        iban: iban.into(),
        fund_type: FundType::SelfFinance,
        include_in_distribution: true,
    };

    h.lifecycle
        .add_inclusion(&ctx("maker"), "PRJ-1", request("IBAN-1"))
        .await
        .unwrap();
    let err = h
        .lifecycle
        .add_inclusion(&ctx("maker"), "PRJ-1", request(" IBAN-1 "))
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LifecycleError::from(GuardViolation::DuplicateInclusion("IBAN-1".into()))
    );

    for taken in [ESCROW_ACCOUNT, "PHY-M"] {
        let err = h
            .lifecycle
            .add_inclusion(&ctx("maker"), "PRJ-1", request(taken))
            .await
            .unwrap_err();
        assert_eq!(
            err,
            LifecycleError::from(GuardViolation::InclusionUsesProjectAccount(taken.into()))
        );
    }

    let err = h
        .lifecycle
        .add_inclusion(&ctx("maker"), "PRJ-1", request("  "))
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Validation);
}

// ─────────────────────────────────────────────────────────
// Reject / return
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_reject_then_approve_confirms_rejection() {
    let h = Harness::new().await;
    submitted(&h, "PRJ-1").await;

    let rejected = h
        .lifecycle
        .reject(&ctx("checker"), "PRJ-1", Some("licence expired".into()))
        .await
        .unwrap();
    assert_eq!(rejected.status, ProjectStatus::Rejected);
    assert_eq!(rejected.reject_reason.as_deref(), Some("licence expired"));

    let confirmed = h
        .lifecycle
        .approve(&ctx("second-checker"), "PRJ-1")
        .await
        .unwrap();
    assert_eq!(confirmed.status, ProjectStatus::RejectedConfirmed);
    assert!(h.accounts.calls().is_empty());
    assert_valid_status_transition(rejected.status, confirmed.status);

    let err = h
        .lifecycle
        .approve(&ctx("second-checker"), "PRJ-1")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LifecycleError::from(GuardViolation::TerminalState(
            ProjectStatus::RejectedConfirmed
        ))
    );
}

#[tokio::test]
async fn test_reject_without_reason_records_empty_reason() {
    let h = Harness::new().await;
    submitted(&h, "PRJ-1").await;
    let rejected = h
        .lifecycle
        .reject(&ctx("checker"), "PRJ-1", None)
        .await
        .unwrap();
    assert_eq!(rejected.reject_reason.as_deref(), Some(""));
}

#[tokio::test]
async fn test_reject_and_return_require_escrow_account() {
    let h = Harness::new().await;
    h.lifecycle
        .save_draft(&ctx("maker"), sample_submission("PRJ-1"))
        .await
        .unwrap();

    let err = h
        .lifecycle
        .reject(&ctx("checker"), "PRJ-1", None)
        .await
        .unwrap_err();
    assert_eq!(err, LifecycleError::from(GuardViolation::EscrowAccountMissing));

    let err = h
        .lifecycle
        .return_for_correction(&ctx("checker"), "PRJ-1", None)
        .await
        .unwrap_err();
    assert_eq!(err, LifecycleError::from(GuardViolation::EscrowAccountMissing));
}

#[tokio::test]
async fn test_return_only_from_submitted() {
    let h = Harness::new().await;
    submitted(&h, "PRJ-1").await;

    let returned = h
        .lifecycle
        .return_for_correction(&ctx("checker"), "PRJ-1", Some("missing plot".into()))
        .await
        .unwrap();
    assert_eq!(returned.status, ProjectStatus::Returned);

    let err = h
        .lifecycle
        .return_for_correction(&ctx("checker"), "PRJ-1", None)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LifecycleError::from(GuardViolation::IllegalTransition(ProjectStatus::Returned))
    );

    let rejected = h
        .lifecycle
        .reject(&ctx("checker"), "PRJ-1", None)
        .await
        .unwrap();
    assert_eq!(rejected.status, ProjectStatus::Rejected);
}

// ─────────────────────────────────────────────────────────
// Distribution and closure
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_distribution_toggle() {
    let h = Harness::new().await;
    activated(&h, "PRJ-1").await;

    let disabled = h
        .lifecycle
        .set_distribution_flag(&ctx("checker"), "PRJ-1", "D")
        .await
        .unwrap();
    assert!(!disabled.distribution_enabled);

    let err = h
        .lifecycle
        .set_distribution_flag(&ctx("checker"), "PRJ-1", "X")
        .await
        .unwrap_err();
    assert_eq!(err.kind(), FailureKind::Validation);
    assert_eq!(h.projects.snapshot("PRJ-1").unwrap(), disabled);

    let err = h
        .lifecycle
        .set_distribution_flag(&ctx("maker"), "PRJ-1", "E")
        .await
        .unwrap_err();
    assert_eq!(err, LifecycleError::from(GuardViolation::MakerChecker));

    let enabled = h
        .lifecycle
        .set_distribution_flag(&ctx("checker"), "PRJ-1", "enable")
        .await
        .unwrap();
    assert!(enabled.distribution_enabled);
}

#[tokio::test]
async fn test_closure_tracks_through_approval() {
    let h = Harness::new().await;
    activated(&h, "PRJ-1").await;

    let closing = h
        .lifecycle
        .request_closure(&ctx("maker"), "PRJ-1", ClosureStage::Pre)
        .await
        .unwrap();
    assert_eq!(closing.status, ProjectStatus::PreClosing);
    assert!(closing.closure_date.is_none());

    let closed = h
        .lifecycle
        .approve(&ctx("checker"), "PRJ-1")
        .await
        .unwrap();
    assert_eq!(closed.status, ProjectStatus::PreClosed);
    assert_eq!(closed.closure_status, Some(ClosureStage::Pre));
    assert_eq!(closed.closure_date, Some(fixture_now().date_naive()));

    let err = h
        .lifecycle
        .set_distribution_flag(&ctx("checker"), "PRJ-1", "D")
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LifecycleError::from(GuardViolation::TerminalState(ProjectStatus::PreClosed))
    );

    let post = h
        .lifecycle
        .request_closure(&ctx("maker"), "PRJ-1", ClosureStage::Post)
        .await
        .unwrap();
    assert_eq!(post.status, ProjectStatus::PostClosing);
    let final_state = h
        .lifecycle
        .approve(&ctx("checker"), "PRJ-1")
        .await
        .unwrap();
    assert_eq!(final_state.status, ProjectStatus::PostClosed);
    assert_eq!(final_state.closure_status, Some(ClosureStage::Post));

    let err = h
        .lifecycle
        .request_closure(&ctx("maker"), "PRJ-1", ClosureStage::Post)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LifecycleError::from(GuardViolation::TerminalState(ProjectStatus::PostClosed))
    );
}

#[tokio::test]
async fn test_closure_requires_active_project() {
    let h = Harness::new().await;
    submitted(&h, "PRJ-1").await;
    let err = h
        .lifecycle
        .request_closure(&ctx("maker"), "PRJ-1", ClosureStage::Pre)
        .await
        .unwrap_err();
    assert_eq!(
        err,
        LifecycleError::from(GuardViolation::IllegalTransition(ProjectStatus::Submitted))
    );
}

// ─────────────────────────────────────────────────────────
// Audit trail
// ─────────────────────────────────────────────────────────

#[tokio::test]
async fn test_every_transition_is_audited() {
    let h = Harness::new().await;
    activated(&h, "PRJ-1").await;
    h.lifecycle
        .set_distribution_flag(&ctx("checker"), "PRJ-1", "D")
        .await
        .unwrap();

    let entries = h.audit.entries();
    let screens: Vec<&str> = entries.iter().map(|e| e.screen.as_str()).collect();
    assert_eq!(
        screens,
        vec!["project.register", "project.approve", "project.distribution"]
    );
    assert_eq!(entries[1].action, AuditAction::Modify);
    assert_eq!(entries[1].actor, "checker");
    assert_eq!(entries[1].message, messages::PROJECT_APPROVED);
    assert!(entries[1].before.is_some());
    assert!(entries[1].after.is_some());
    assert_ne!(entries[1].before, entries[1].after);
}

#[tokio::test]
async fn test_recorded_document_is_audited() {
    let h = Harness::new().await;
    h.lifecycle
        .submit(&ctx("maker"), sample_submission("PRJ-1"))
        .await
        .unwrap();
    let upload = h
        .lifecycle
        .record_document(
            &ctx("maker"),
            "PRJ-1",
            DocumentRequest {
                document_name: APPROVAL_CHECKLIST[0].into(),
                level: DocumentLevel::Project,
                file_name: "agreement.pdf".into(),
            },
        )
        .await
        .unwrap();

    let entries = h.audit.entries();
    assert_eq!(entries.len(), 2);
    let entry = &entries[1];
    assert_eq!(entry.screen, "project.document");
    assert_eq!(entry.action, AuditAction::Create);
    assert_eq!(entry.actor, "maker");
    assert_eq!(entry.message, messages::DOCUMENT_RECORDED);
    assert!(entry.before.is_none());
    assert_eq!(
        entry.after,
        Some(serde_json::to_value(&upload).unwrap())
    );
}

#[tokio::test]
async fn test_audit_sink_failure_does_not_fail_the_operation() {
    use std::sync::Arc;

    use crate::lifecycle::EscrowLifecycle;
    use crate::storage::Stores;
    use crate::testutils::{FixedClock, MemoryAuditSink};

    let h = Harness::new().await;
    let lifecycle = EscrowLifecycle::new(
        Stores {
            projects: h.projects.clone(),
            clients: h.clients.clone(),
            buckets: h.buckets.clone(),
            inclusions: h.inclusions.clone(),
            ledger: h.ledger.clone(),
            documents: h.documents.clone(),
        },
        h.accounts.clone(),
        Arc::new(MemoryAuditSink::failing()),
        Arc::new(FixedClock(fixture_now())),
    );

    let project = lifecycle
        .submit(&ctx("maker"), sample_submission("PRJ-1"))
        .await
        .unwrap();
    assert_eq!(project.status, ProjectStatus::Submitted);
    assert!(h.projects.snapshot("PRJ-1").is_some());
}
