//! # Types
//!
//! Shared data structures used across all modules of the escrow lifecycle.
//!
//! ## Design decisions
//!
//! ### Derived allocations
//!
//! `retention_value`, `marketing_value` and `construction_value` on a
//! [`Project`] are always produced by [`crate::allocation::allocate`] from
//! `value`. Nothing else writes them.
//!
//! ### Status as a Finite-State Machine
//!
//! [`ProjectStatus`] has ten states:
//!
//! ```text
//! Draft ──► Submitted ──► Active ──► PreClosing ──► PreClosed ──► PostClosing ──► PostClosed
//!              │  ▲          └──────────────────────────────────►┘
//!              │  └── Returned
//!              └──► Rejected ──► RejectedConfirmed
//! ```
//!
//! The legal edges live in [`crate::transitions`]. `RejectedConfirmed`,
//! `PreClosed` and `PostClosed` refuse field edits.

use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Lifecycle status of an escrow project.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProjectStatus {
    /// Registered but not yet wired to an escrow account.
    Draft,
    /// Escrow wiring attached; awaiting a checker decision.
    Submitted,
    /// Approved; distribution may run.
    Active,
    /// Rejected by a checker, awaiting confirmation.
    Rejected,
    RejectedConfirmed,
    /// Sent back to the maker for correction.
    Returned,
    PreClosing,
    PreClosed,
    PostClosing,
    PostClosed,
}

impl ProjectStatus {
    /// Every status, in declaration order.
    pub const ALL: [ProjectStatus; 10] = [
        Self::Draft,
        Self::Submitted,
        Self::Active,
        Self::Rejected,
        Self::RejectedConfirmed,
        Self::Returned,
        Self::PreClosing,
        Self::PreClosed,
        Self::PostClosing,
        Self::PostClosed,
    ];

    /// Short identifier suitable for storage and query strings.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Submitted => "submitted",
            Self::Active => "active",
            Self::Rejected => "rejected",
            Self::RejectedConfirmed => "rejected_confirmed",
            Self::Returned => "returned",
            Self::PreClosing => "pre_closing",
            Self::PreClosed => "pre_closed",
            Self::PostClosing => "post_closing",
            Self::PostClosed => "post_closed",
        }
    }

    pub fn parse(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == raw)
    }

    /// Terminal for field edits.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            Self::RejectedConfirmed | Self::PreClosed | Self::PostClosed
        )
    }
}

impl fmt::Display for ProjectStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a project's financial flows are grouped.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BucketFlag {
    /// One pooled escrow account; sub-accounts are provisioned on approval.
    Virtual,
    /// Named sub-accounts supplied by the maker.
    Physical,
}

/// How distributions are sourced for a project.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DistributionType {
    #[default]
    Standard,
    /// Funds arrive through declared inclusion accounts.
    InclusionBased,
}

/// Which closure track a project is on.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClosureStage {
    Pre,
    Post,
}

/// Funding source declared on an inclusion record.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FundType {
    SelfFinance,
    Loan,
    BankFinance,
    Pos,
    Hafis,
}

/// The three sub-account roles every project carries.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubAccountRole {
    Construction,
    Marketing,
    Retention,
}

impl SubAccountRole {
    /// Provisioning order.
    pub const ALL: [SubAccountRole; 3] = [Self::Construction, Self::Marketing, Self::Retention];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Construction => "construction",
            Self::Marketing => "marketing",
            Self::Retention => "retention",
        }
    }
}

impl fmt::Display for SubAccountRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An escrow project record.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Project {
    /// Business identifier, unique across all projects.
    pub project_id: String,
    /// Customer information file number (5-9 digits).
    pub cif: String,
    pub client_id: String,
    pub name_en: String,
    pub name_ar: String,
    pub license_number: String,
    pub license_expiry: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub value: Decimal,
    pub unit_count: u32,
    pub retention_value: Decimal,
    pub marketing_value: Decimal,
    pub construction_value: Decimal,
    pub developer_name_en: String,
    pub developer_name_ar: String,
    pub site_addresses: Vec<String>,
    pub email: String,
    pub phone: String,
    pub commission_profile_id: Option<String>,
    pub secondary_profile_id: Option<String>,
    pub profile_expiry: Option<NaiveDate>,
    pub status: ProjectStatus,
    pub distribution_enabled: bool,
    pub distribution_type: DistributionType,
    /// Main escrow account; `None` while the project is a draft.
    pub escrow_account: Option<String>,
    pub construction_account: Option<String>,
    pub marketing_account: Option<String>,
    pub retention_account: Option<String>,
    pub reject_reason: Option<String>,
    pub return_reason: Option<String>,
    pub closure_date: Option<NaiveDate>,
    pub closure_status: Option<ClosureStage>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
    pub verified_by: Option<String>,
    pub verified_at: Option<DateTime<Utc>>,
}

impl Project {
    pub fn sub_account(&self, role: SubAccountRole) -> Option<&str> {
        match role {
            SubAccountRole::Construction => self.construction_account.as_deref(),
            SubAccountRole::Marketing => self.marketing_account.as_deref(),
            SubAccountRole::Retention => self.retention_account.as_deref(),
        }
    }

    /// Returns a copy with `account` wired to `role`.
    pub fn with_sub_account(self, role: SubAccountRole, account: String) -> Self {
        match role {
            SubAccountRole::Construction => Self {
                construction_account: Some(account),
                ..self
            },
            SubAccountRole::Marketing => Self {
                marketing_account: Some(account),
                ..self
            },
            SubAccountRole::Retention => Self {
                retention_account: Some(account),
                ..self
            },
        }
    }

    /// Roles that still have no sub-account, in provisioning order.
    pub fn unwired_roles(&self) -> Vec<SubAccountRole> {
        SubAccountRole::ALL
            .into_iter()
            .filter(|role| self.sub_account(*role).is_none())
            .collect()
    }

    /// True if `account` is the escrow account or any wired sub-account.
    pub fn uses_account(&self, account: &str) -> bool {
        self.escrow_account.as_deref() == Some(account)
            || SubAccountRole::ALL
                .iter()
                .any(|role| self.sub_account(*role) == Some(account))
    }

    /// Stamps the checker identity on a transition result.
    pub fn verified(self, actor: &str, at: DateTime<Utc>) -> Self {
        Self {
            verified_by: Some(actor.to_string()),
            verified_at: Some(at),
            ..self
        }
    }
}

/// Funding declaration for one bucket role.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
pub struct BucketFunding {
    pub source: Option<String>,
    pub percentage: Decimal,
    pub account: Option<String>,
}

/// Escrow account detail, one per project.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct AccountBucket {
    pub project_id: String,
    pub bucket_flag: BucketFlag,
    pub escrow_account: String,
    pub customer_account: Option<String>,
    pub construction: BucketFunding,
    pub marketing: BucketFunding,
    pub retention: BucketFunding,
}

impl AccountBucket {
    pub fn funding(&self, role: SubAccountRole) -> &BucketFunding {
        match role {
            SubAccountRole::Construction => &self.construction,
            SubAccountRole::Marketing => &self.marketing,
            SubAccountRole::Retention => &self.retention,
        }
    }

    pub fn with_sub_account(mut self, role: SubAccountRole, account: String) -> Self {
        let funding = match role {
            SubAccountRole::Construction => &mut self.construction,
            SubAccountRole::Marketing => &mut self.marketing,
            SubAccountRole::Retention => &mut self.retention,
        };
        funding.account = Some(account);
        self
    }
}

/// An account declared as feeding a project's distribution.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct InclusionRecord {
    pub project_id: String,
    pub iban: String,
    pub fund_type: FundType,
    pub include_in_distribution: bool,
    pub verified: bool,
    /// Designated collection account, stamped on approval.
    pub collection_account: Option<String>,
    pub created_by: String,
    pub created_at: DateTime<Utc>,
}

/// Financial balances for a project. Zeroed on creation and on full update.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct LedgerRow {
    pub project_id: String,
    pub total_deposits: Decimal,
    pub total_payments: Decimal,
    pub construction_balance: Decimal,
    pub marketing_balance: Decimal,
    pub retention_balance: Decimal,
    pub available_balance: Decimal,
}

impl LedgerRow {
    pub fn zeroed(project_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            total_deposits: Decimal::ZERO,
            total_payments: Decimal::ZERO,
            construction_balance: Decimal::ZERO,
            marketing_balance: Decimal::ZERO,
            retention_balance: Decimal::ZERO,
            available_balance: Decimal::ZERO,
        }
    }
}

/// A client a project is registered against.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Client {
    pub client_id: String,
    pub name: String,
    /// Must be at most [`MAX_SCHEME_CODE`] for new projects.
    pub scheme_code: u32,
}

/// Highest client scheme code that may register a project.
pub const MAX_SCHEME_CODE: u32 = 99;

/// Level at which a document was uploaded.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentLevel {
    Project,
    Unit,
}

impl DocumentLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Project => "project",
            Self::Unit => "unit",
        }
    }
}

/// Metadata of an uploaded file. The bytes live in external storage.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct DocumentUpload {
    pub project_id: String,
    pub document_name: String,
    pub level: DocumentLevel,
    pub file_name: String,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Escrow wiring supplied with a submission.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct EscrowDetails {
    pub bucket_flag: BucketFlag,
    pub escrow_account: String,
    pub customer_account: Option<String>,
    #[serde(default)]
    pub construction: BucketFunding,
    #[serde(default)]
    pub marketing: BucketFunding,
    #[serde(default)]
    pub retention: BucketFunding,
}

/// A project as entered by a maker, before validation.
///
/// Optional fields are optional here so that the validation engine can
/// report every missing field at once.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProjectSubmission {
    pub cif: String,
    pub commission_profile_id: Option<String>,
    pub secondary_profile_id: Option<String>,
    pub profile_expiry: Option<NaiveDate>,
    pub client_id: String,
    pub project_id: String,
    pub name_en: String,
    pub name_ar: String,
    pub license_number: String,
    pub license_expiry: Option<NaiveDate>,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub value: Option<Decimal>,
    pub unit_count: Option<u32>,
    pub developer_name_en: String,
    pub developer_name_ar: String,
    pub site_addresses: Vec<String>,
    pub email: String,
    pub phone: String,
    pub distribution_type: DistributionType,
    pub escrow: Option<EscrowDetails>,
}

/// Who is calling, in what language, and with what visibility.
pub struct RequestContext<'a> {
    pub actor: String,
    pub locale: String,
    pub caller_class: CallerClass,
    pub catalog: &'a dyn crate::messages::MessageCatalog,
}

/// Read-path visibility of a caller.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallerClass {
    #[default]
    Standard,
    /// Sees unfiltered totals in search results.
    Privileged,
}
