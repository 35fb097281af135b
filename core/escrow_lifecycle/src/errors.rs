//! Lifecycle error types.
//!
//! Every operation in this crate returns `Result<T, LifecycleError>`. The
//! [`crate::response`] module turns that into the uniform response shape at
//! the public boundary.

use thiserror::Error;

use crate::types::{ProjectStatus, SubAccountRole};
use crate::validation::FieldViolation;

/// Raised by a collaborator (store, account service, audit sink).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("Store backend error: {0}")]
    Backend(String),

    #[error("Stored record could not be decoded: {0}")]
    Decode(String),
}

/// Which kind of record a lookup missed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Entity {
    Project,
    Client,
    AccountBucket,
}

impl Entity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Client => "client",
            Self::AccountBucket => "account_bucket",
        }
    }
}

/// Which of the two account-service calls failed during provisioning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProvisioningStep {
    Create,
    Suspend,
}

/// A transition attempted from an illegal state or by the wrong actor.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GuardViolation {
    #[error("project id {0} already exists")]
    DuplicateProjectId(String),

    #[error("a project with this Arabic name already exists")]
    DuplicateArabicName,

    #[error("a project with this English name already exists")]
    DuplicateEnglishName,

    #[error("client scheme code {0} is above the allowed maximum")]
    SchemeCodeOutOfRange(u32),

    #[error("the creator of a project cannot act as its checker")]
    MakerChecker,

    #[error("a draft project has nothing to approve")]
    NothingToApprove,

    #[error("project in status {0} has no approval pending")]
    NoApprovalPending(ProjectStatus),

    #[error("project in terminal status {0} cannot be changed")]
    TerminalState(ProjectStatus),

    #[error("transition not allowed from status {0}")]
    IllegalTransition(ProjectStatus),

    #[error("project has no escrow account attached")]
    EscrowAccountMissing,

    #[error("mandatory documents missing: {0:?}")]
    MissingDocuments(Vec<String>),

    #[error("inclusion account {0} is already declared for this project")]
    DuplicateInclusion(String),

    #[error("inclusion account {0} is already used as a project account")]
    InclusionUsesProjectAccount(String),
}

impl GuardViolation {
    /// Message catalog key.
    pub fn code(&self) -> &'static str {
        match self {
            Self::DuplicateProjectId(_) => "project.id.duplicate",
            Self::DuplicateArabicName => "project.name_ar.duplicate",
            Self::DuplicateEnglishName => "project.name_en.duplicate",
            Self::SchemeCodeOutOfRange(_) => "client.scheme_code.out_of_range",
            Self::MakerChecker => "guard.maker_checker",
            Self::NothingToApprove => "guard.nothing_to_approve",
            Self::NoApprovalPending(_) => "guard.no_approval_pending",
            Self::TerminalState(_) => "guard.terminal_state",
            Self::IllegalTransition(_) => "guard.illegal_transition",
            Self::EscrowAccountMissing => "guard.escrow_account_missing",
            Self::MissingDocuments(_) => "guard.documents_missing",
            Self::DuplicateInclusion(_) => "inclusion.duplicate",
            Self::InclusionUsesProjectAccount(_) => "inclusion.uses_project_account",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LifecycleError {
    #[error("validation failed with {} violation(s)", .0.len())]
    Validation(Vec<FieldViolation>),

    #[error("guard failed: {0}")]
    Guard(#[from] GuardViolation),

    #[error("provisioning of the {role} sub-account failed at {step:?}")]
    Provisioning {
        role: SubAccountRole,
        step: ProvisioningStep,
        /// Accounts created for earlier roles that were never recorded.
        orphaned: Vec<String>,
    },

    #[error("{} {id} not found", .entity.as_str())]
    NotFound { entity: Entity, id: String },

    #[error("infrastructure failure: {0}")]
    Infrastructure(#[from] StoreError),
}

impl LifecycleError {
    pub fn not_found(entity: Entity, id: &str) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Validation(_) => FailureKind::Validation,
            Self::Guard(_) => FailureKind::StateGuard,
            Self::Provisioning { .. } => FailureKind::Provisioning,
            Self::NotFound { .. } => FailureKind::NotFound,
            Self::Infrastructure(_) => FailureKind::Infrastructure,
        }
    }

    /// Message catalog key.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Validation(_) => crate::messages::VALIDATION_FAILED,
            Self::Guard(guard) => guard.code(),
            Self::Provisioning { role, step, .. } => match (role, step) {
                (SubAccountRole::Construction, ProvisioningStep::Create) => {
                    "provisioning.construction.create_failed"
                }
                (SubAccountRole::Construction, ProvisioningStep::Suspend) => {
                    "provisioning.construction.suspend_failed"
                }
                (SubAccountRole::Marketing, ProvisioningStep::Create) => {
                    "provisioning.marketing.create_failed"
                }
                (SubAccountRole::Marketing, ProvisioningStep::Suspend) => {
                    "provisioning.marketing.suspend_failed"
                }
                (SubAccountRole::Retention, ProvisioningStep::Create) => {
                    "provisioning.retention.create_failed"
                }
                (SubAccountRole::Retention, ProvisioningStep::Suspend) => {
                    "provisioning.retention.suspend_failed"
                }
            },
            Self::NotFound { entity, .. } => match entity {
                Entity::Project => "project.not_found",
                Entity::Client => "client.not_found",
                Entity::AccountBucket => "account_bucket.not_found",
            },
            Self::Infrastructure(_) => crate::messages::REQUEST_FAILED,
        }
    }
}

/// Coarse failure class reported to callers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Validation,
    StateGuard,
    Provisioning,
    NotFound,
    Infrastructure,
}

pub type Result<T> = std::result::Result<T, LifecycleError>;
