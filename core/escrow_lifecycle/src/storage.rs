//! # Storage
//!
//! Persistence collaborators consumed by the lifecycle. The core only sees
//! these traits; the backend provides SQLite implementations and
//! [`crate::testutils`] provides in-memory ones.
//!
//! | Store                  | Key                      | Record            |
//! |------------------------|--------------------------|-------------------|
//! | [`ProjectStore`]       | `project_id`             | `Project`         |
//! | [`ClientStore`]        | `client_id`              | `Client`          |
//! | [`AccountBucketStore`] | `project_id`             | `AccountBucket`   |
//! | [`InclusionStore`]     | `(project_id, iban)`     | `InclusionRecord` |
//! | [`LedgerStore`]        | `project_id`             | `LedgerRow`       |
//! | [`DocumentStore`]      | append-only              | `DocumentUpload`  |
//!
//! None of these offer transactions. The core never holds a lock on a
//! project; stores that need to stop two concurrent approvals from racing
//! must enforce row-level serialization themselves.

use std::sync::Arc;

use async_trait::async_trait;

use crate::errors::StoreError;
use crate::types::{
    AccountBucket, Client, DocumentLevel, DocumentUpload, InclusionRecord, LedgerRow, Project,
    ProjectStatus,
};

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Filter for project listings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProjectFilter {
    /// Case-insensitive substring matched against id and both names.
    pub text: Option<String>,
    pub status: Option<ProjectStatus>,
}

impl ProjectFilter {
    pub fn matches(&self, project: &Project) -> bool {
        let text_ok = match self.text.as_deref().map(str::trim) {
            None | Some("") => true,
            Some(needle) => {
                let needle = needle.to_lowercase();
                [&project.project_id, &project.name_en, &project.name_ar]
                    .iter()
                    .any(|hay| hay.to_lowercase().contains(&needle))
            }
        };
        text_ok && self.status.map_or(true, |s| s == project.status)
    }
}

/// Offset/limit window over a listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: u64,
    pub limit: u64,
}

#[async_trait]
pub trait ProjectStore: Send + Sync {
    async fn get_by_id(&self, project_id: &str) -> StoreResult<Option<Project>>;

    async fn find_by_arabic_name(&self, name_ar: &str) -> StoreResult<Vec<Project>>;

    async fn find_by_english_name(&self, name_en: &str) -> StoreResult<Vec<Project>>;

    /// Insert or replace by `project_id`.
    async fn save(&self, project: &Project) -> StoreResult<Project>;

    /// Rows matching `filter`, ordered by `project_id`.
    async fn list_by_filter(&self, filter: &ProjectFilter, page: Page)
        -> StoreResult<Vec<Project>>;

    async fn count_by_filter(&self, filter: &ProjectFilter) -> StoreResult<u64>;

    /// Per-status counts; `None` counts every project.
    async fn count_by_status(
        &self,
        filter: Option<&ProjectFilter>,
    ) -> StoreResult<Vec<(ProjectStatus, u64)>>;
}

#[async_trait]
pub trait ClientStore: Send + Sync {
    async fn get_by_id(&self, client_id: &str) -> StoreResult<Option<Client>>;

    async fn save(&self, client: &Client) -> StoreResult<()>;
}

#[async_trait]
pub trait AccountBucketStore: Send + Sync {
    async fn get_by_project(&self, project_id: &str) -> StoreResult<Option<AccountBucket>>;

    async fn save(&self, bucket: &AccountBucket) -> StoreResult<()>;
}

#[async_trait]
pub trait InclusionStore: Send + Sync {
    async fn get(&self, project_id: &str, iban: &str) -> StoreResult<Option<InclusionRecord>>;

    async fn list_by_project(&self, project_id: &str) -> StoreResult<Vec<InclusionRecord>>;

    async fn save(&self, record: &InclusionRecord) -> StoreResult<()>;
}

#[async_trait]
pub trait LedgerStore: Send + Sync {
    async fn get(&self, project_id: &str) -> StoreResult<Option<LedgerRow>>;

    /// Insert or replace the row for `row.project_id`.
    async fn save(&self, row: &LedgerRow) -> StoreResult<()>;
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn count_by_project_and_name_and_level(
        &self,
        project_id: &str,
        document_name: &str,
        level: DocumentLevel,
    ) -> StoreResult<u64>;

    async fn save(&self, upload: &DocumentUpload) -> StoreResult<()>;
}

/// All persistence collaborators, shared behind `Arc`s.
#[derive(Clone)]
pub struct Stores {
    pub projects: Arc<dyn ProjectStore>,
    pub clients: Arc<dyn ClientStore>,
    pub buckets: Arc<dyn AccountBucketStore>,
    pub inclusions: Arc<dyn InclusionStore>,
    pub ledger: Arc<dyn LedgerStore>,
    pub documents: Arc<dyn DocumentStore>,
}
