//! # Escrow lifecycle service
//!
//! Entry points for every project operation. Each one loads the records it
//! needs, checks guards through [`crate::transitions`], builds a new
//! [`Project`] value, persists it and hands before/after snapshots to the
//! audit trail.
//!
//! | Phase        | Entry point(s)                                         |
//! |--------------|--------------------------------------------------------|
//! | Registration | `submit`, `save_draft`, `update`, `validate_submission` |
//! | Decision     | `approve`, `reject`, `return_for_correction`           |
//! | Operation    | `set_distribution_flag`, `request_closure`             |
//! | Declarations | `add_inclusion`, `record_document`                     |
//! | Queries      | `get_project`, `search`                                |

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::allocation::allocate;
use crate::audit::{AuditAction, AuditRecorder, AuditSink};
use crate::errors::{Entity, GuardViolation, LifecycleError, Result};
use crate::messages;
use crate::provisioning::{
    check_mandatory_documents, provision_sub_accounts, AccountCreationService,
};
use crate::search::{self, SearchQuery, SearchResult};
use crate::storage::Stores;
use crate::transitions::{self, Action, ApprovalBranch};
use crate::types::{
    AccountBucket, BucketFlag, BucketFunding, ClosureStage, DistributionType, DocumentLevel,
    DocumentUpload, EscrowDetails, FundType, InclusionRecord, LedgerRow, Project, ProjectStatus,
    ProjectSubmission, RequestContext, SubAccountRole, MAX_SCHEME_CODE,
};
use crate::validation::{check_arabic_script, validate, Field, FieldViolation};

/// Source of the current instant.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Request to declare an inclusion account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InclusionRequest {
    pub iban: String,
    pub fund_type: FundType,
    #[serde(default = "default_true")]
    pub include_in_distribution: bool,
}

fn default_true() -> bool {
    true
}

/// Metadata for an uploaded document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentRequest {
    pub document_name: String,
    pub level: DocumentLevel,
    pub file_name: String,
}

/// Parse a distribution toggle: `D`/`disable` or `E`/`enable`.
pub fn parse_distribution_action(action: &str) -> Option<bool> {
    match action.trim().to_ascii_lowercase().as_str() {
        "d" | "disable" => Some(false),
        "e" | "enable" => Some(true),
        _ => None,
    }
}

pub struct EscrowLifecycle {
    stores: Stores,
    accounts: Arc<dyn AccountCreationService>,
    audit: Arc<dyn AuditSink>,
    clock: Arc<dyn Clock>,
}

impl EscrowLifecycle {
    pub fn new(
        stores: Stores,
        accounts: Arc<dyn AccountCreationService>,
        audit: Arc<dyn AuditSink>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            stores,
            accounts,
            audit,
            clock,
        }
    }

    fn today(&self) -> NaiveDate {
        self.clock.now().date_naive()
    }

    fn recorder(&self) -> AuditRecorder<'_> {
        AuditRecorder::new(self.audit.as_ref())
    }

    async fn load(&self, project_id: &str) -> Result<Project> {
        self.stores
            .projects
            .get_by_id(project_id)
            .await?
            .ok_or_else(|| LifecycleError::not_found(Entity::Project, project_id))
    }

    /// Persist `after` and audit it as a modification of `before`.
    async fn commit(
        &self,
        ctx: &RequestContext<'_>,
        before: &Project,
        after: Project,
        screen: &str,
        message: &str,
    ) -> Result<Project> {
        let saved = self.stores.projects.save(&after).await?;
        self.recorder()
            .record(
                Some(before),
                Some(&saved),
                AuditAction::Modify,
                screen,
                &ctx.actor,
                message,
                self.clock.now(),
            )
            .await;
        info!(
            "Project {} {} -> {} by {}",
            saved.project_id, before.status, saved.status, ctx.actor
        );
        Ok(saved)
    }

    // ─────────────────────────────────────────────────────────
    // Registration
    // ─────────────────────────────────────────────────────────

    /// Run the Arabic-script pre-check and the rule list.
    fn check_submission(&self, submission: &ProjectSubmission) -> Result<()> {
        check_arabic_script(submission).map_err(|v| LifecycleError::Validation(vec![v]))?;
        let violations = validate(submission, self.today());
        if violations.is_empty() {
            Ok(())
        } else {
            Err(LifecycleError::Validation(violations))
        }
    }

    /// Validate without persisting anything.
    pub async fn validate_submission(
        &self,
        _ctx: &RequestContext<'_>,
        submission: &ProjectSubmission,
    ) -> Result<()> {
        self.check_submission(submission)
    }

    /// Id and name uniqueness; `existing` is excluded from the name checks.
    async fn ensure_unique(
        &self,
        submission: &ProjectSubmission,
        existing: Option<&str>,
    ) -> Result<()> {
        if existing.is_none()
            && self
                .stores
                .projects
                .get_by_id(submission.project_id.trim())
                .await?
                .is_some()
        {
            return Err(
                GuardViolation::DuplicateProjectId(submission.project_id.trim().to_string()).into(),
            );
        }
        let is_other = |p: &Project| Some(p.project_id.as_str()) != existing;

        let same_ar = self
            .stores
            .projects
            .find_by_arabic_name(submission.name_ar.trim())
            .await?;
        if same_ar.iter().any(is_other) {
            return Err(GuardViolation::DuplicateArabicName.into());
        }
        let same_en = self
            .stores
            .projects
            .find_by_english_name(submission.name_en.trim())
            .await?;
        if same_en.iter().any(is_other) {
            return Err(GuardViolation::DuplicateEnglishName.into());
        }
        Ok(())
    }

    async fn ensure_client(&self, client_id: &str) -> Result<()> {
        let client = self
            .stores
            .clients
            .get_by_id(client_id)
            .await?
            .ok_or_else(|| LifecycleError::not_found(Entity::Client, client_id))?;
        if client.scheme_code > MAX_SCHEME_CODE {
            return Err(GuardViolation::SchemeCodeOutOfRange(client.scheme_code).into());
        }
        Ok(())
    }

    /// Every registration guard shared by submit and draft creation.
    async fn check_registration(&self, submission: &ProjectSubmission) -> Result<()> {
        self.check_submission(submission)?;
        self.ensure_unique(submission, None).await?;
        self.ensure_client(submission.client_id.trim()).await
    }

    async fn register(
        &self,
        ctx: &RequestContext<'_>,
        submission: ProjectSubmission,
        status: ProjectStatus,
        message: &str,
    ) -> Result<Project> {
        let now = self.clock.now();
        let project = new_project(&submission, &ctx.actor, now, status);

        self.stores
            .ledger
            .save(&LedgerRow::zeroed(&project.project_id))
            .await?;
        if let Some(escrow) = &submission.escrow {
            self.stores
                .buckets
                .save(&bucket_from(&project.project_id, escrow, None))
                .await?;
        }
        let saved = self.stores.projects.save(&project).await?;

        self.recorder()
            .record(
                None,
                Some(&saved),
                AuditAction::Create,
                "project.register",
                &ctx.actor,
                message,
                now,
            )
            .await;
        info!(
            "Project {} registered as {} by {}",
            saved.project_id, saved.status, ctx.actor
        );
        Ok(saved)
    }

    /// Register a new project with escrow wiring, landing in `Submitted`.
    pub async fn submit(
        &self,
        ctx: &RequestContext<'_>,
        submission: ProjectSubmission,
    ) -> Result<Project> {
        self.check_registration(&submission).await?;
        if submission.escrow.is_none() {
            return Err(GuardViolation::EscrowAccountMissing.into());
        }
        self.register(ctx, submission, ProjectStatus::Submitted, messages::PROJECT_SUBMITTED)
            .await
    }

    /// Register a project without escrow wiring, landing in `Draft`.
    pub async fn save_draft(
        &self,
        ctx: &RequestContext<'_>,
        submission: ProjectSubmission,
    ) -> Result<Project> {
        self.check_registration(&submission).await?;
        let submission = ProjectSubmission {
            escrow: None,
            ..submission
        };
        self.register(ctx, submission, ProjectStatus::Draft, messages::PROJECT_DRAFT_SAVED)
            .await
    }

    /// Replace every editable field of a project.
    ///
    /// Resets the ledger row. Allocations are recomputed only when the value
    /// changed. A draft that gains escrow wiring, or a returned project, is
    /// resubmitted.
    pub async fn update(
        &self,
        ctx: &RequestContext<'_>,
        project_id: &str,
        submission: ProjectSubmission,
    ) -> Result<Project> {
        let existing = self.load(project_id).await?;
        transitions::ensure_editable(existing.status)?;

        let submission = ProjectSubmission {
            project_id: existing.project_id.clone(),
            ..submission
        };
        self.check_submission(&submission)?;
        self.ensure_unique(&submission, Some(&existing.project_id))
            .await?;
        self.ensure_client(submission.client_id.trim()).await?;

        let escrow_attached = submission.escrow.is_some() || existing.escrow_account.is_some();
        let status = transitions::next(existing.status, Action::Update { escrow_attached })?;

        let mut updated = new_project(&submission, &existing.created_by, existing.created_at, status);
        if updated.value == existing.value {
            updated.retention_value = existing.retention_value;
            updated.marketing_value = existing.marketing_value;
            updated.construction_value = existing.construction_value;
        }
        let updated = Project {
            escrow_account: updated.escrow_account.or(existing.escrow_account.clone()),
            construction_account: updated
                .construction_account
                .or(existing.construction_account.clone()),
            marketing_account: updated.marketing_account.or(existing.marketing_account.clone()),
            retention_account: updated.retention_account.or(existing.retention_account.clone()),
            distribution_enabled: existing.distribution_enabled,
            reject_reason: existing.reject_reason.clone(),
            return_reason: if status == existing.status {
                existing.return_reason.clone()
            } else {
                None
            },
            closure_date: existing.closure_date,
            closure_status: existing.closure_status,
            verified_by: existing.verified_by.clone(),
            verified_at: existing.verified_at,
            ..updated
        };

        self.stores
            .ledger
            .save(&LedgerRow::zeroed(&updated.project_id))
            .await?;
        if let Some(escrow) = &submission.escrow {
            let current = self.stores.buckets.get_by_project(&updated.project_id).await?;
            self.stores
                .buckets
                .save(&bucket_from(&updated.project_id, escrow, current.as_ref()))
                .await?;
        }

        self.commit(ctx, &existing, updated, "project.update", messages::PROJECT_UPDATED)
            .await
    }

    // ─────────────────────────────────────────────────────────
    // Decisions
    // ─────────────────────────────────────────────────────────

    /// Checker approval. What it does depends on the current status; see
    /// [`ApprovalBranch`].
    pub async fn approve(&self, ctx: &RequestContext<'_>, project_id: &str) -> Result<Project> {
        let project = self.load(project_id).await?;
        if project.created_by == ctx.actor {
            return Err(GuardViolation::MakerChecker.into());
        }
        let branch = transitions::approval_branch(project.status)?;
        let now = self.clock.now();
        let before = project.clone();

        let approved = match branch {
            ApprovalBranch::Activate => self.activate(project).await?,
            ApprovalBranch::ConfirmRejection => Project {
                status: branch.target(),
                ..project
            },
            ApprovalBranch::Close(stage) => Project {
                status: branch.target(),
                closure_date: Some(now.date_naive()),
                closure_status: Some(stage),
                ..project
            },
        }
        .verified(&ctx.actor, now);

        self.commit(ctx, &before, approved, "project.approve", messages::PROJECT_APPROVED)
            .await
    }

    /// `Submitted -> Active`: document gate, provisioning, inclusion sign-off.
    async fn activate(&self, project: Project) -> Result<Project> {
        check_mandatory_documents(self.stores.documents.as_ref(), &project.project_id).await?;

        let bucket = self
            .stores
            .buckets
            .get_by_project(&project.project_id)
            .await?
            .ok_or_else(|| LifecycleError::not_found(Entity::AccountBucket, &project.project_id))?;

        let project = match bucket.bucket_flag {
            BucketFlag::Virtual => {
                provision_sub_accounts(self.accounts.as_ref(), &self.stores, project, bucket)
                    .await?
                    .0
            }
            BucketFlag::Physical => {
                if project.distribution_type == DistributionType::InclusionBased {
                    self.verify_inclusions(&project.project_id, &bucket.escrow_account)
                        .await?;
                }
                project
            }
        };

        Ok(Project {
            status: ProjectStatus::Active,
            distribution_enabled: true,
            ..project
        })
    }

    /// Mark pending inclusion records verified, collecting into `escrow_account`.
    async fn verify_inclusions(&self, project_id: &str, escrow_account: &str) -> Result<()> {
        let pending = self
            .stores
            .inclusions
            .list_by_project(project_id)
            .await?
            .into_iter()
            .filter(|r| !r.verified);
        for record in pending {
            let record = InclusionRecord {
                verified: true,
                collection_account: Some(escrow_account.to_string()),
                ..record
            };
            self.stores.inclusions.save(&record).await?;
        }
        Ok(())
    }

    pub async fn reject(
        &self,
        ctx: &RequestContext<'_>,
        project_id: &str,
        reason: Option<String>,
    ) -> Result<Project> {
        let project = self.load(project_id).await?;
        if project.escrow_account.is_none() {
            return Err(GuardViolation::EscrowAccountMissing.into());
        }
        let status = transitions::next(project.status, Action::Reject)?;
        let rejected = Project {
            status,
            reject_reason: Some(reason.unwrap_or_default()),
            ..project.clone()
        }
        .verified(&ctx.actor, self.clock.now());

        self.commit(ctx, &project, rejected, "project.reject", messages::PROJECT_REJECTED)
            .await
    }

    /// Send a submitted project back to its maker.
    pub async fn return_for_correction(
        &self,
        ctx: &RequestContext<'_>,
        project_id: &str,
        reason: Option<String>,
    ) -> Result<Project> {
        let project = self.load(project_id).await?;
        if project.escrow_account.is_none() {
            return Err(GuardViolation::EscrowAccountMissing.into());
        }
        let status = transitions::next(project.status, Action::Return)?;
        let returned = Project {
            status,
            return_reason: Some(reason.unwrap_or_default()),
            ..project.clone()
        }
        .verified(&ctx.actor, self.clock.now());

        self.commit(ctx, &project, returned, "project.return", messages::PROJECT_RETURNED)
            .await
    }

    // ─────────────────────────────────────────────────────────
    // Operation
    // ─────────────────────────────────────────────────────────

    pub async fn set_distribution_flag(
        &self,
        ctx: &RequestContext<'_>,
        project_id: &str,
        action: &str,
    ) -> Result<Project> {
        let enabled = parse_distribution_action(action).ok_or_else(|| {
            LifecycleError::Validation(vec![FieldViolation::new(
                Field::DistributionAction,
                "distribution.action.invalid",
            )])
        })?;
        let project = self.load(project_id).await?;
        if project.created_by == ctx.actor {
            return Err(GuardViolation::MakerChecker.into());
        }
        transitions::ensure_editable(project.status)?;

        let toggled = Project {
            distribution_enabled: enabled,
            ..project.clone()
        };
        self.commit(
            ctx,
            &project,
            toggled,
            "project.distribution",
            messages::DISTRIBUTION_UPDATED,
        )
        .await
    }

    /// Move an active project onto a closure track, pending checker approval.
    pub async fn request_closure(
        &self,
        ctx: &RequestContext<'_>,
        project_id: &str,
        stage: ClosureStage,
    ) -> Result<Project> {
        let project = self.load(project_id).await?;
        let status = transitions::next(project.status, Action::RequestClosure(stage))?;
        let closing = Project {
            status,
            ..project.clone()
        };
        self.commit(ctx, &project, closing, "project.closure", messages::CLOSURE_REQUESTED)
            .await
    }

    // ─────────────────────────────────────────────────────────
    // Declarations
    // ─────────────────────────────────────────────────────────

    pub async fn add_inclusion(
        &self,
        ctx: &RequestContext<'_>,
        project_id: &str,
        request: InclusionRequest,
    ) -> Result<InclusionRecord> {
        let iban = request.iban.trim().to_string();
        if iban.is_empty() {
            return Err(LifecycleError::Validation(vec![FieldViolation::new(
                Field::Iban,
                "iban.required",
            )]));
        }
        let project = self.load(project_id).await?;
        if project.uses_account(&iban) {
            return Err(GuardViolation::InclusionUsesProjectAccount(iban).into());
        }
        if self
            .stores
            .inclusions
            .get(&project.project_id, &iban)
            .await?
            .is_some()
        {
            return Err(GuardViolation::DuplicateInclusion(iban).into());
        }

        let now = self.clock.now();
        let record = InclusionRecord {
            project_id: project.project_id.clone(),
            iban,
            fund_type: request.fund_type,
            include_in_distribution: request.include_in_distribution,
            verified: false,
            collection_account: None,
            created_by: ctx.actor.clone(),
            created_at: now,
        };
        self.stores.inclusions.save(&record).await?;
        self.recorder()
            .record(
                None,
                Some(&record),
                AuditAction::Create,
                "project.inclusion",
                &ctx.actor,
                messages::INCLUSION_ADDED,
                now,
            )
            .await;
        Ok(record)
    }

    /// Record upload metadata; the file itself is stored elsewhere.
    pub async fn record_document(
        &self,
        ctx: &RequestContext<'_>,
        project_id: &str,
        request: DocumentRequest,
    ) -> Result<DocumentUpload> {
        let project = self.load(project_id).await?;
        let now = self.clock.now();
        let upload = DocumentUpload {
            project_id: project.project_id,
            document_name: request.document_name.trim().to_string(),
            level: request.level,
            file_name: request.file_name,
            uploaded_by: ctx.actor.clone(),
            uploaded_at: now,
        };
        self.stores.documents.save(&upload).await?;
        self.recorder()
            .record(
                None,
                Some(&upload),
                AuditAction::Create,
                "project.document",
                &ctx.actor,
                messages::DOCUMENT_RECORDED,
                now,
            )
            .await;
        Ok(upload)
    }

    // ─────────────────────────────────────────────────────────
    // Queries
    // ─────────────────────────────────────────────────────────

    pub async fn get_project(&self, _ctx: &RequestContext<'_>, project_id: &str) -> Result<Project> {
        self.load(project_id).await
    }

    pub async fn search(
        &self,
        ctx: &RequestContext<'_>,
        query: &SearchQuery,
    ) -> Result<SearchResult> {
        search::search(self.stores.projects.as_ref(), query, ctx.caller_class).await
    }
}

/// Build a project from a validated submission.
fn new_project(
    submission: &ProjectSubmission,
    creator: &str,
    created_at: DateTime<Utc>,
    status: ProjectStatus,
) -> Project {
    let value = submission.value.unwrap_or_default();
    let allocation = allocate(value);
    let escrow = submission.escrow.as_ref();

    Project {
        project_id: submission.project_id.trim().to_string(),
        cif: submission.cif.trim().to_string(),
        client_id: submission.client_id.trim().to_string(),
        name_en: submission.name_en.trim().to_string(),
        name_ar: submission.name_ar.trim().to_string(),
        license_number: submission.license_number.trim().to_string(),
        license_expiry: submission.license_expiry,
        start_date: submission.start_date,
        end_date: submission.end_date,
        value,
        unit_count: submission.unit_count.unwrap_or_default(),
        retention_value: allocation.retention,
        marketing_value: allocation.marketing,
        construction_value: allocation.construction,
        developer_name_en: submission.developer_name_en.trim().to_string(),
        developer_name_ar: submission.developer_name_ar.trim().to_string(),
        site_addresses: submission
            .site_addresses
            .iter()
            .map(|a| a.trim().to_string())
            .filter(|a| !a.is_empty())
            .collect(),
        email: submission.email.trim().to_string(),
        phone: submission.phone.trim().to_string(),
        commission_profile_id: non_blank(&submission.commission_profile_id),
        secondary_profile_id: non_blank(&submission.secondary_profile_id),
        profile_expiry: submission.profile_expiry,
        status,
        distribution_enabled: false,
        distribution_type: submission.distribution_type,
        escrow_account: escrow.map(|e| e.escrow_account.trim().to_string()),
        construction_account: escrow.and_then(|e| non_blank(&e.construction.account)),
        marketing_account: escrow.and_then(|e| non_blank(&e.marketing.account)),
        retention_account: escrow.and_then(|e| non_blank(&e.retention.account)),
        reject_reason: None,
        return_reason: None,
        closure_date: None,
        closure_status: None,
        created_by: creator.to_string(),
        created_at,
        verified_by: None,
        verified_at: None,
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
}

/// Build the account bucket for `escrow`, keeping sub-accounts already
/// wired on `current` when the new details leave them empty.
fn bucket_from(
    project_id: &str,
    escrow: &EscrowDetails,
    current: Option<&AccountBucket>,
) -> AccountBucket {
    let keep = |mut funding: BucketFunding, role: SubAccountRole| {
        if funding.account.is_none() {
            funding.account = current.and_then(|c| c.funding(role).account.clone());
        }
        funding
    };
    AccountBucket {
        project_id: project_id.to_string(),
        bucket_flag: escrow.bucket_flag,
        escrow_account: escrow.escrow_account.trim().to_string(),
        customer_account: escrow.customer_account.clone(),
        construction: keep(escrow.construction.clone(), SubAccountRole::Construction),
        marketing: keep(escrow.marketing.clone(), SubAccountRole::Marketing),
        retention: keep(escrow.retention.clone(), SubAccountRole::Retention),
    }
}
