//! # Sub-account provisioning
//!
//! Runs when a `Submitted` project with a `Virtual` bucket is approved.
//!
//! For each role without a sub-account, in [`SubAccountRole::ALL`] order:
//!
//! 1. `create(escrow_account, CreateNew)` opens an account anchored to the
//!    escrow account;
//! 2. `create(new_account, SuspendExisting)` marks it suspended relative to
//!    the escrow account.
//!
//! A `"NIL"`, empty or missing answer at either step fails that role and the
//! whole approval. Project and bucket records are written only after every
//! role succeeded, so a failure never leaves them partially wired. Accounts
//! already opened for earlier roles are returned in the error as `orphaned`.
//!
//! Before any of that, [`check_mandatory_documents`] refuses the approval if
//! the approval checklist is incomplete.

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::errors::{GuardViolation, LifecycleError, ProvisioningStep, Result};
use crate::storage::{DocumentStore, StoreResult, Stores};
use crate::types::{AccountBucket, DocumentLevel, Project, SubAccountRole};

/// Failure sentinel returned by the account service.
pub const NIL_ACCOUNT: &str = "NIL";

/// Documents every project needs before it can be activated.
pub const APPROVAL_CHECKLIST: [&str; 4] = [
    "Escrow Agreement",
    "Building Permit",
    "Title Deed",
    "Developer Trade License",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccountMode {
    CreateNew,
    SuspendExisting,
}

impl AccountMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateNew => "create_new",
            Self::SuspendExisting => "suspend_existing",
        }
    }
}

/// External core-banking account service.
#[async_trait]
pub trait AccountCreationService: Send + Sync {
    /// Returns the resulting account number, `"NIL"`, or `None`.
    async fn create(&self, anchor_account: &str, mode: AccountMode)
        -> StoreResult<Option<String>>;
}

/// Refuse approval unless every checklist document has at least one upload.
pub async fn check_mandatory_documents(
    documents: &dyn DocumentStore,
    project_id: &str,
) -> Result<()> {
    let mut missing = Vec::new();
    for name in APPROVAL_CHECKLIST {
        let count = documents
            .count_by_project_and_name_and_level(project_id, name, DocumentLevel::Project)
            .await?;
        if count == 0 {
            missing.push(name.to_string());
        }
    }
    if missing.is_empty() {
        Ok(())
    } else {
        Err(GuardViolation::MissingDocuments(missing).into())
    }
}

fn accepted(answer: Option<String>) -> Option<String> {
    answer
        .map(|a| a.trim().to_string())
        .filter(|a| !a.is_empty() && a != NIL_ACCOUNT)
}

/// Open and suspend one sub-account for `role`.
async fn provision_role(
    accounts: &dyn AccountCreationService,
    escrow_account: &str,
    role: SubAccountRole,
    orphaned: &[String],
) -> Result<String> {
    let fail = |step| LifecycleError::Provisioning {
        role,
        step,
        orphaned: orphaned.to_vec(),
    };

    debug!("Creating {role} sub-account under {escrow_account}");
    let created = accepted(accounts.create(escrow_account, AccountMode::CreateNew).await?)
        .ok_or_else(|| fail(ProvisioningStep::Create))?;

    debug!("Suspending {role} sub-account {created}");
    accepted(accounts.create(&created, AccountMode::SuspendExisting).await?).ok_or_else(|| {
        let mut err = fail(ProvisioningStep::Suspend);
        if let LifecycleError::Provisioning { orphaned, .. } = &mut err {
            orphaned.push(created.clone());
        }
        err
    })?;

    Ok(created)
}

/// Provision every unwired role, then persist project and bucket together.
///
/// Returns the updated records. On failure nothing is written.
pub async fn provision_sub_accounts(
    accounts: &dyn AccountCreationService,
    stores: &Stores,
    project: Project,
    bucket: AccountBucket,
) -> Result<(Project, AccountBucket)> {
    let roles = project.unwired_roles();
    if roles.is_empty() {
        return Ok((project, bucket));
    }

    let escrow_account = bucket.escrow_account.clone();
    let mut opened: Vec<(SubAccountRole, String)> = Vec::with_capacity(roles.len());
    for role in roles {
        let orphaned: Vec<String> = opened.iter().map(|(_, a)| a.clone()).collect();
        match provision_role(accounts, &escrow_account, role, &orphaned).await {
            Ok(account) => opened.push((role, account)),
            Err(e) => {
                warn!(
                    "Provisioning aborted for project {} at {role}: {e}; unrecorded accounts: {orphaned:?}",
                    project.project_id
                );
                return Err(e);
            }
        }
    }

    let (project, bucket) = opened.into_iter().fold(
        (project, bucket),
        |(project, bucket), (role, account)| {
            (
                project.with_sub_account(role, account.clone()),
                bucket.with_sub_account(role, account),
            )
        },
    );

    stores.buckets.save(&bucket).await?;
    let project = stores.projects.save(&project).await?;
    info!("Sub-accounts provisioned for project {}", project.project_id);
    Ok((project, bucket))
}
