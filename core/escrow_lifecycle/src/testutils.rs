//! In-memory collaborators and fixtures for tests.
//!
//! Compiled under `cfg(test)` and behind the `testutils` feature so the
//! backend crate can reuse them.

#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use rust_decimal::Decimal;

use crate::audit::{AuditEntry, AuditSink};
use crate::errors::StoreError;
use crate::lifecycle::{Clock, EscrowLifecycle};
use crate::messages::KeyEchoCatalog;
use crate::provisioning::{AccountCreationService, AccountMode, APPROVAL_CHECKLIST};
use crate::storage::{
    AccountBucketStore, ClientStore, DocumentStore, InclusionStore, LedgerStore, Page,
    ProjectFilter, ProjectStore, StoreResult, Stores,
};
use crate::types::{
    AccountBucket, BucketFlag, BucketFunding, CallerClass, Client, DistributionType,
    DocumentLevel, DocumentUpload, EscrowDetails, InclusionRecord, LedgerRow, Project,
    ProjectStatus, ProjectSubmission, RequestContext,
};

fn backend_down() -> StoreError {
    StoreError::Backend("store unavailable".into())
}

// ─────────────────────────────────────────────────────────
// Stores
// ─────────────────────────────────────────────────────────

#[derive(Default)]
pub struct MemoryProjectStore {
    projects: Mutex<BTreeMap<String, Project>>,
    fail_counts: AtomicBool,
    fail_saves: AtomicBool,
}

impl MemoryProjectStore {
    /// Make the two count queries fail.
    pub fn fail_counts(&self, fail: bool) {
        self.fail_counts.store(fail, Ordering::SeqCst);
    }

    pub fn fail_saves(&self, fail: bool) {
        self.fail_saves.store(fail, Ordering::SeqCst);
    }

    pub fn snapshot(&self, project_id: &str) -> Option<Project> {
        self.projects.lock().unwrap().get(project_id).cloned()
    }

    fn matching(&self, filter: Option<&ProjectFilter>) -> Vec<Project> {
        self.projects
            .lock()
            .unwrap()
            .values()
            .filter(|p| filter.map_or(true, |f| f.matches(p)))
            .cloned()
            .collect()
    }
}

#[async_trait]
impl ProjectStore for MemoryProjectStore {
    async fn get_by_id(&self, project_id: &str) -> StoreResult<Option<Project>> {
        Ok(self.snapshot(project_id))
    }

    async fn find_by_arabic_name(&self, name_ar: &str) -> StoreResult<Vec<Project>> {
        Ok(self
            .matching(None)
            .into_iter()
            .filter(|p| p.name_ar == name_ar)
            .collect())
    }

    async fn find_by_english_name(&self, name_en: &str) -> StoreResult<Vec<Project>> {
        Ok(self
            .matching(None)
            .into_iter()
            .filter(|p| p.name_en.eq_ignore_ascii_case(name_en))
            .collect())
    }

    async fn save(&self, project: &Project) -> StoreResult<Project> {
        if self.fail_saves.load(Ordering::SeqCst) {
            return Err(backend_down());
        }
        self.projects
            .lock()
            .unwrap()
            .insert(project.project_id.clone(), project.clone());
        Ok(project.clone())
    }

    async fn list_by_filter(
        &self,
        filter: &ProjectFilter,
        page: Page,
    ) -> StoreResult<Vec<Project>> {
        Ok(self
            .matching(Some(filter))
            .into_iter()
            .skip(page.offset as usize)
            .take(page.limit as usize)
            .collect())
    }

    async fn count_by_filter(&self, filter: &ProjectFilter) -> StoreResult<u64> {
        if self.fail_counts.load(Ordering::SeqCst) {
            return Err(backend_down());
        }
        Ok(self.matching(Some(filter)).len() as u64)
    }

    async fn count_by_status(
        &self,
        filter: Option<&ProjectFilter>,
    ) -> StoreResult<Vec<(ProjectStatus, u64)>> {
        if self.fail_counts.load(Ordering::SeqCst) {
            return Err(backend_down());
        }
        let mut counts: BTreeMap<ProjectStatus, u64> = BTreeMap::new();
        for project in self.matching(filter) {
            *counts.entry(project.status).or_default() += 1;
        }
        Ok(counts.into_iter().collect())
    }
}

#[derive(Default)]
pub struct MemoryClientStore {
    clients: Mutex<HashMap<String, Client>>,
}

#[async_trait]
impl ClientStore for MemoryClientStore {
    async fn get_by_id(&self, client_id: &str) -> StoreResult<Option<Client>> {
        Ok(self.clients.lock().unwrap().get(client_id).cloned())
    }

    async fn save(&self, client: &Client) -> StoreResult<()> {
        self.clients
            .lock()
            .unwrap()
            .insert(client.client_id.clone(), client.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryBucketStore {
    buckets: Mutex<HashMap<String, AccountBucket>>,
}

impl MemoryBucketStore {
    pub fn snapshot(&self, project_id: &str) -> Option<AccountBucket> {
        self.buckets.lock().unwrap().get(project_id).cloned()
    }
}

#[async_trait]
impl AccountBucketStore for MemoryBucketStore {
    async fn get_by_project(&self, project_id: &str) -> StoreResult<Option<AccountBucket>> {
        Ok(self.snapshot(project_id))
    }

    async fn save(&self, bucket: &AccountBucket) -> StoreResult<()> {
        self.buckets
            .lock()
            .unwrap()
            .insert(bucket.project_id.clone(), bucket.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryInclusionStore {
    records: Mutex<BTreeMap<(String, String), InclusionRecord>>,
}

#[async_trait]
impl InclusionStore for MemoryInclusionStore {
    async fn get(&self, project_id: &str, iban: &str) -> StoreResult<Option<InclusionRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .get(&(project_id.to_string(), iban.to_string()))
            .cloned())
    }

    async fn list_by_project(&self, project_id: &str) -> StoreResult<Vec<InclusionRecord>> {
        Ok(self
            .records
            .lock()
            .unwrap()
            .values()
            .filter(|r| r.project_id == project_id)
            .cloned()
            .collect())
    }

    async fn save(&self, record: &InclusionRecord) -> StoreResult<()> {
        self.records.lock().unwrap().insert(
            (record.project_id.clone(), record.iban.clone()),
            record.clone(),
        );
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryLedgerStore {
    rows: Mutex<HashMap<String, LedgerRow>>,
}

#[async_trait]
impl LedgerStore for MemoryLedgerStore {
    async fn get(&self, project_id: &str) -> StoreResult<Option<LedgerRow>> {
        Ok(self.rows.lock().unwrap().get(project_id).cloned())
    }

    async fn save(&self, row: &LedgerRow) -> StoreResult<()> {
        self.rows
            .lock()
            .unwrap()
            .insert(row.project_id.clone(), row.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryDocumentStore {
    uploads: Mutex<Vec<DocumentUpload>>,
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn count_by_project_and_name_and_level(
        &self,
        project_id: &str,
        document_name: &str,
        level: DocumentLevel,
    ) -> StoreResult<u64> {
        Ok(self
            .uploads
            .lock()
            .unwrap()
            .iter()
            .filter(|u| {
                u.project_id == project_id && u.document_name == document_name && u.level == level
            })
            .count() as u64)
    }

    async fn save(&self, upload: &DocumentUpload) -> StoreResult<()> {
        self.uploads.lock().unwrap().push(upload.clone());
        Ok(())
    }
}

#[derive(Default)]
pub struct MemoryAuditSink {
    entries: Mutex<Vec<AuditEntry>>,
    failing: bool,
}

impl MemoryAuditSink {
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::default()
        }
    }

    pub fn entries(&self) -> Vec<AuditEntry> {
        self.entries.lock().unwrap().clone()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn record(&self, entry: AuditEntry) -> StoreResult<()> {
        if self.failing {
            return Err(backend_down());
        }
        self.entries.lock().unwrap().push(entry);
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────
// Account service
// ─────────────────────────────────────────────────────────

/// Account service that numbers new accounts `SUB-1`, `SUB-2`, ... and
/// echoes suspended ones, unless a call index has a scripted answer.
#[derive(Default)]
pub struct ScriptedAccountService {
    calls: Mutex<Vec<(String, AccountMode)>>,
    scripted: Mutex<HashMap<usize, Option<String>>>,
}

impl ScriptedAccountService {
    /// Answer the `index`-th call (0-based) with `answer`.
    pub fn answer(&self, index: usize, answer: Option<&str>) {
        self.scripted
            .lock()
            .unwrap()
            .insert(index, answer.map(String::from));
    }

    pub fn calls(&self) -> Vec<(String, AccountMode)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl AccountCreationService for ScriptedAccountService {
    async fn create(
        &self,
        anchor_account: &str,
        mode: AccountMode,
    ) -> StoreResult<Option<String>> {
        let mut calls = self.calls.lock().unwrap();
        let index = calls.len();
        calls.push((anchor_account.to_string(), mode));
        if let Some(answer) = self.scripted.lock().unwrap().get(&index) {
            return Ok(answer.clone());
        }
        let created = calls
            .iter()
            .filter(|(_, m)| *m == AccountMode::CreateNew)
            .count();
        Ok(Some(match mode {
            AccountMode::CreateNew => format!("SUB-{created}"),
            AccountMode::SuspendExisting => anchor_account.to_string(),
        }))
    }
}

// ─────────────────────────────────────────────────────────
// Clock & fixtures
// ─────────────────────────────────────────────────────────

/// Clock pinned to one instant.
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// 2025-03-10 09:00 UTC, the business date used across fixtures.
pub fn fixture_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 3, 10, 9, 0, 0).unwrap()
}

fn date(y: i32, m: u32, d: u32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(y, m, d)
}

pub const ESCROW_ACCOUNT: &str = "ESC-100";
pub const CLIENT_ID: &str = "CL-1";

/// A submitted project with a virtual bucket and no sub-accounts.
pub fn sample_project(project_id: &str, creator: &str) -> Project {
    Project {
        project_id: project_id.to_string(),
        cif: "1234567".into(),
        client_id: CLIENT_ID.into(),
        name_en: "Palm Towers".into(),
        name_ar: "أبراج النخيل".into(),
        license_number: "LIC-77".into(),
        license_expiry: date(2027, 1, 1),
        start_date: date(2025, 4, 1),
        end_date: date(2027, 4, 1),
        value: Decimal::from(1_000_000),
        unit_count: 120,
        retention_value: Decimal::from(50_000),
        marketing_value: Decimal::from(30_000),
        construction_value: Decimal::from(20_000),
        developer_name_en: "Gulf Builders".into(),
        developer_name_ar: "بناة الخليج".into(),
        site_addresses: vec!["Plot 12, Marina".into()],
        email: "ops@gulfbuilders.ae".into(),
        phone: "+971501234567".into(),
        commission_profile_id: None,
        secondary_profile_id: None,
        profile_expiry: None,
        status: ProjectStatus::Submitted,
        distribution_enabled: false,
        distribution_type: DistributionType::Standard,
        escrow_account: Some(ESCROW_ACCOUNT.into()),
        construction_account: None,
        marketing_account: None,
        retention_account: None,
        reject_reason: None,
        return_reason: None,
        closure_date: None,
        closure_status: None,
        created_by: creator.to_string(),
        created_at: fixture_now(),
        verified_by: None,
        verified_at: None,
    }
}

/// A submission that passes every rule on [`fixture_now`]'s date.
pub fn sample_submission(project_id: &str) -> ProjectSubmission {
    ProjectSubmission {
        cif: "1234567".into(),
        client_id: CLIENT_ID.into(),
        project_id: project_id.to_string(),
        name_en: format!("Palm Towers {project_id}"),
        name_ar: format!("أبراج النخيل {project_id}"),
        license_number: "LIC-77".into(),
        license_expiry: date(2027, 1, 1),
        start_date: date(2025, 4, 1),
        end_date: date(2027, 4, 1),
        value: Some(Decimal::from(1_000_000)),
        unit_count: Some(120),
        developer_name_en: "Gulf Builders".into(),
        developer_name_ar: "بناة الخليج".into(),
        site_addresses: vec!["Plot 12, Marina".into()],
        email: "ops@gulfbuilders.ae".into(),
        phone: "+971501234567".into(),
        escrow: Some(EscrowDetails {
            bucket_flag: BucketFlag::Virtual,
            escrow_account: ESCROW_ACCOUNT.into(),
            customer_account: Some("CUST-9".into()),
            construction: BucketFunding::default(),
            marketing: BucketFunding::default(),
            retention: BucketFunding::default(),
        }),
        ..Default::default()
    }
}

// ─────────────────────────────────────────────────────────
// Harness
// ─────────────────────────────────────────────────────────

/// A lifecycle wired to in-memory collaborators, with handles to inspect
/// each of them.
pub struct Harness {
    pub projects: Arc<MemoryProjectStore>,
    pub clients: Arc<MemoryClientStore>,
    pub buckets: Arc<MemoryBucketStore>,
    pub inclusions: Arc<MemoryInclusionStore>,
    pub ledger: Arc<MemoryLedgerStore>,
    pub documents: Arc<MemoryDocumentStore>,
    pub accounts: Arc<ScriptedAccountService>,
    pub audit: Arc<MemoryAuditSink>,
    pub lifecycle: EscrowLifecycle,
}

impl Harness {
    /// Seeds client [`CLIENT_ID`] with scheme code 10.
    pub async fn new() -> Self {
        let projects = Arc::new(MemoryProjectStore::default());
        let clients = Arc::new(MemoryClientStore::default());
        let buckets = Arc::new(MemoryBucketStore::default());
        let inclusions = Arc::new(MemoryInclusionStore::default());
        let ledger = Arc::new(MemoryLedgerStore::default());
        let documents = Arc::new(MemoryDocumentStore::default());
        let accounts = Arc::new(ScriptedAccountService::default());
        let audit = Arc::new(MemoryAuditSink::default());

        clients
            .save(&Client {
                client_id: CLIENT_ID.into(),
                name: "Gulf Builders LLC".into(),
                scheme_code: 10,
            })
            .await
            .unwrap();

        let stores = Stores {
            projects: projects.clone(),
            clients: clients.clone(),
            buckets: buckets.clone(),
            inclusions: inclusions.clone(),
            ledger: ledger.clone(),
            documents: documents.clone(),
        };
        let lifecycle = EscrowLifecycle::new(
            stores,
            accounts.clone(),
            audit.clone(),
            Arc::new(FixedClock(fixture_now())),
        );

        Self {
            projects,
            clients,
            buckets,
            inclusions,
            ledger,
            documents,
            accounts,
            audit,
            lifecycle,
        }
    }

    /// Upload one file for every approval checklist document.
    pub async fn upload_checklist(&self, project_id: &str) {
        for name in APPROVAL_CHECKLIST {
            self.documents
                .save(&DocumentUpload {
                    project_id: project_id.to_string(),
                    document_name: name.to_string(),
                    level: DocumentLevel::Project,
                    file_name: format!("{name}.pdf"),
                    uploaded_by: "maker".into(),
                    uploaded_at: fixture_now(),
                })
                .await
                .unwrap();
        }
    }
}

/// Request context for `actor` with an echoing catalog.
pub fn ctx(actor: &str) -> RequestContext<'static> {
    static CATALOG: KeyEchoCatalog = KeyEchoCatalog;
    RequestContext {
        actor: actor.to_string(),
        locale: "en".into(),
        caller_class: CallerClass::Standard,
        catalog: &CATALOG,
    }
}
