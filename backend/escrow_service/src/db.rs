//! Database layer: migrations and the SQLite implementations of every
//! persistence collaborator the lifecycle needs.
//!
//! Records are kept as JSON documents next to the handful of columns that
//! lookups and listings filter on, so decimals keep their exact string form.

use async_trait::async_trait;
use escrow_lifecycle::audit::{AuditEntry, AuditSink};
use escrow_lifecycle::storage::{
    AccountBucketStore, ClientStore, DocumentStore, InclusionStore, LedgerStore, Page,
    ProjectFilter, ProjectStore, StoreResult,
};
use escrow_lifecycle::types::{
    AccountBucket, Client, DocumentLevel, DocumentUpload, InclusionRecord, LedgerRow, Project,
    ProjectStatus,
};
use serde::de::DeserializeOwned;
use serde::Serialize;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tracing::{debug, info};

use crate::errors::{Result, ServiceError};

/// Establish a SQLite connection pool and run pending migrations.
pub async fn init_pool(database_url: &str) -> Result<SqlitePool> {
    let url = if database_url.starts_with("sqlite:") {
        database_url.to_string()
    } else {
        format!("sqlite:{database_url}")
    };
    // In-memory databases are per connection.
    let max_connections = if url.contains(":memory:") { 1 } else { 5 };

    let pool = SqlitePoolOptions::new()
        .max_connections(max_connections)
        .connect(&format!("{url}{}", create_flag(&url)))
        .await?;

    sqlx::migrate!("./migrations").run(&pool).await?;
    info!("Database migrations applied successfully");
    Ok(pool)
}

/// Make sure the file is created if it doesn't exist yet.
fn create_flag(url: &str) -> &'static str {
    if url.contains(":memory:") || url.contains("mode=") {
        ""
    } else if url.contains('?') {
        "&mode=rwc"
    } else {
        "?mode=rwc"
    }
}

fn to_json<T: Serialize>(record: &T) -> Result<String> {
    Ok(serde_json::to_string(record)?)
}

fn from_json<T: DeserializeOwned>(body: &str) -> Result<T> {
    Ok(serde_json::from_str(body)?)
}

fn parse_status(raw: &str) -> Result<ProjectStatus> {
    ProjectStatus::parse(raw).ok_or_else(|| ServiceError::Decode(format!("unknown status '{raw}'")))
}

/// `LIKE` pattern for a free-text filter, `None` when the filter is blank.
///
/// `%`, `_` and `\` in the text match literally.
fn like_pattern(filter: &ProjectFilter) -> Option<String> {
    filter
        .text
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(|t| {
            let mut pattern = String::with_capacity(t.len() + 2);
            pattern.push('%');
            for c in t.to_lowercase().chars() {
                if matches!(c, '%' | '_' | '\\') {
                    pattern.push('\\');
                }
                pattern.push(c);
            }
            pattern.push('%');
            pattern
        })
}

/// SQLite integers are signed; windows past `i64::MAX` are clamped.
fn sql_int(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

const FILTER_CLAUSE: &str = r#"
    (?1 IS NULL
        OR lower(project_id) LIKE ?1 ESCAPE '\'
        OR lower(name_en) LIKE ?1 ESCAPE '\'
        OR lower(name_ar) LIKE ?1 ESCAPE '\')
    AND (?2 IS NULL OR status = ?2)
"#;

/// One store backing every collaborator trait.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    // ─────────────────────────────────────────────────────────
    // Projects
    // ─────────────────────────────────────────────────────────

    async fn project(&self, project_id: &str) -> Result<Option<Project>> {
        let row: Option<(String,)> = sqlx::query_as("SELECT body FROM projects WHERE project_id = ?1")
            .bind(project_id)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(body,)| from_json(&body)).transpose()
    }

    async fn projects_where(&self, sql: &str, value: &str) -> Result<Vec<Project>> {
        let rows: Vec<(String,)> = sqlx::query_as(sql)
            .bind(value)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|(body,)| from_json(body)).collect()
    }

    async fn upsert_project(&self, project: &Project) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO projects (project_id, name_en, name_ar, status, body, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, datetime('now'))
            ON CONFLICT (project_id) DO UPDATE SET
                name_en    = excluded.name_en,
                name_ar    = excluded.name_ar,
                status     = excluded.status,
                body       = excluded.body,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&project.project_id)
        .bind(&project.name_en)
        .bind(&project.name_ar)
        .bind(project.status.as_str())
        .bind(to_json(project)?)
        .execute(&self.pool)
        .await?;
        debug!("Saved project {} as {}", project.project_id, project.status);
        Ok(())
    }

    async fn list_projects(&self, filter: &ProjectFilter, page: Page) -> Result<Vec<Project>> {
        let sql = format!(
            "SELECT body FROM projects WHERE {FILTER_CLAUSE} ORDER BY project_id LIMIT ?3 OFFSET ?4"
        );
        let rows: Vec<(String,)> = sqlx::query_as(&sql)
            .bind(like_pattern(filter))
            .bind(filter.status.map(|s| s.as_str()))
            .bind(sql_int(page.limit))
            .bind(sql_int(page.offset))
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(|(body,)| from_json(body)).collect()
    }

    async fn count_projects(&self, filter: &ProjectFilter) -> Result<u64> {
        let sql = format!("SELECT COUNT(*) FROM projects WHERE {FILTER_CLAUSE}");
        let (count,): (i64,) = sqlx::query_as(&sql)
            .bind(like_pattern(filter))
            .bind(filter.status.map(|s| s.as_str()))
            .fetch_one(&self.pool)
            .await?;
        Ok(count as u64)
    }

    async fn status_counts(
        &self,
        filter: Option<&ProjectFilter>,
    ) -> Result<Vec<(ProjectStatus, u64)>> {
        let everything = ProjectFilter::default();
        let filter = filter.unwrap_or(&everything);
        let sql = format!(
            "SELECT status, COUNT(*) FROM projects WHERE {FILTER_CLAUSE} GROUP BY status"
        );
        let rows: Vec<(String, i64)> = sqlx::query_as(&sql)
            .bind(like_pattern(filter))
            .bind(filter.status.map(|s| s.as_str()))
            .fetch_all(&self.pool)
            .await?;
        rows.into_iter()
            .map(|(status, count)| Ok((parse_status(&status)?, count as u64)))
            .collect()
    }

    // ─────────────────────────────────────────────────────────
    // Keyed JSON documents
    // ─────────────────────────────────────────────────────────

    async fn document_body<T: DeserializeOwned>(&self, sql: &str, key: &str) -> Result<Option<T>> {
        let row: Option<(String,)> = sqlx::query_as(sql)
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.map(|(body,)| from_json(&body)).transpose()
    }

    async fn upsert_body(&self, sql: &str, key: &str, body: String) -> Result<()> {
        sqlx::query(sql)
            .bind(key)
            .bind(body)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn inclusion(&self, project_id: &str, iban: &str) -> Result<Option<InclusionRecord>> {
        let row: Option<(String,)> =
            sqlx::query_as("SELECT body FROM inclusions WHERE project_id = ?1 AND iban = ?2")
                .bind(project_id)
                .bind(iban)
                .fetch_optional(&self.pool)
                .await?;
        row.map(|(body,)| from_json(&body)).transpose()
    }

    async fn upsert_inclusion(&self, record: &InclusionRecord) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO inclusions (project_id, iban, body) VALUES (?1, ?2, ?3)
            ON CONFLICT (project_id, iban) DO UPDATE SET body = excluded.body
            "#,
        )
        .bind(&record.project_id)
        .bind(&record.iban)
        .bind(to_json(record)?)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    // ─────────────────────────────────────────────────────────
    // Clients, documents, audit
    // ─────────────────────────────────────────────────────────

    async fn client(&self, client_id: &str) -> Result<Option<Client>> {
        let row: Option<(String, String, i64)> = sqlx::query_as(
            "SELECT client_id, name, scheme_code FROM clients WHERE client_id = ?1",
        )
        .bind(client_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|(client_id, name, scheme_code)| {
            let scheme_code = u32::try_from(scheme_code).map_err(|_| {
                ServiceError::Decode(format!("scheme code {scheme_code} of {client_id}"))
            })?;
            Ok(Client {
                client_id,
                name,
                scheme_code,
            })
        })
        .transpose()
    }

    async fn upsert_client(&self, client: &Client) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO clients (client_id, name, scheme_code) VALUES (?1, ?2, ?3)
            ON CONFLICT (client_id) DO UPDATE SET
                name        = excluded.name,
                scheme_code = excluded.scheme_code
            "#,
        )
        .bind(&client.client_id)
        .bind(&client.name)
        .bind(client.scheme_code as i64)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn count_documents(
        &self,
        project_id: &str,
        document_name: &str,
        level: DocumentLevel,
    ) -> Result<u64> {
        let (count,): (i64,) = sqlx::query_as(
            r#"
            SELECT COUNT(*) FROM documents
            WHERE  project_id = ?1 AND document_name = ?2 AND level = ?3
            "#,
        )
        .bind(project_id)
        .bind(document_name)
        .bind(level.as_str())
        .fetch_one(&self.pool)
        .await?;
        Ok(count as u64)
    }

    async fn insert_document(&self, upload: &DocumentUpload) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents
                (project_id, document_name, level, file_name, uploaded_by, uploaded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6)
            "#,
        )
        .bind(&upload.project_id)
        .bind(&upload.document_name)
        .bind(upload.level.as_str())
        .bind(&upload.file_name)
        .bind(&upload.uploaded_by)
        .bind(upload.uploaded_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn insert_audit(&self, entry: &AuditEntry) -> Result<()> {
        let before = entry.before.as_ref().map(to_json).transpose()?;
        let after = entry.after.as_ref().map(to_json).transpose()?;
        sqlx::query(
            r#"
            INSERT INTO audit_log
                (action, screen, actor, outcome, message, before_json, after_json, recorded_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
            "#,
        )
        .bind(entry.action.as_str())
        .bind(&entry.screen)
        .bind(&entry.actor)
        .bind(entry.outcome.as_str())
        .bind(&entry.message)
        .bind(before)
        .bind(after)
        .bind(entry.recorded_at.to_rfc3339())
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}

// ─────────────────────────────────────────────────────────
// Collaborator traits
// ─────────────────────────────────────────────────────────

#[async_trait]
impl ProjectStore for SqliteStore {
    async fn get_by_id(&self, project_id: &str) -> StoreResult<Option<Project>> {
        Ok(self.project(project_id).await?)
    }

    async fn find_by_arabic_name(&self, name_ar: &str) -> StoreResult<Vec<Project>> {
        Ok(self
            .projects_where("SELECT body FROM projects WHERE name_ar = ?1", name_ar)
            .await?)
    }

    async fn find_by_english_name(&self, name_en: &str) -> StoreResult<Vec<Project>> {
        Ok(self
            .projects_where(
                "SELECT body FROM projects WHERE lower(name_en) = lower(?1)",
                name_en,
            )
            .await?)
    }

    async fn save(&self, project: &Project) -> StoreResult<Project> {
        self.upsert_project(project).await?;
        Ok(project.clone())
    }

    async fn list_by_filter(
        &self,
        filter: &ProjectFilter,
        page: Page,
    ) -> StoreResult<Vec<Project>> {
        Ok(self.list_projects(filter, page).await?)
    }

    async fn count_by_filter(&self, filter: &ProjectFilter) -> StoreResult<u64> {
        Ok(self.count_projects(filter).await?)
    }

    async fn count_by_status(
        &self,
        filter: Option<&ProjectFilter>,
    ) -> StoreResult<Vec<(ProjectStatus, u64)>> {
        Ok(self.status_counts(filter).await?)
    }
}

#[async_trait]
impl ClientStore for SqliteStore {
    async fn get_by_id(&self, client_id: &str) -> StoreResult<Option<Client>> {
        Ok(self.client(client_id).await?)
    }

    async fn save(&self, client: &Client) -> StoreResult<()> {
        Ok(self.upsert_client(client).await?)
    }
}

#[async_trait]
impl AccountBucketStore for SqliteStore {
    async fn get_by_project(&self, project_id: &str) -> StoreResult<Option<AccountBucket>> {
        Ok(self
            .document_body("SELECT body FROM account_buckets WHERE project_id = ?1", project_id)
            .await?)
    }

    async fn save(&self, bucket: &AccountBucket) -> StoreResult<()> {
        let body = to_json(bucket)?;
        Ok(self
            .upsert_body(
                r#"
                INSERT INTO account_buckets (project_id, body) VALUES (?1, ?2)
                ON CONFLICT (project_id) DO UPDATE SET body = excluded.body
                "#,
                &bucket.project_id,
                body,
            )
            .await?)
    }
}

#[async_trait]
impl InclusionStore for SqliteStore {
    async fn get(&self, project_id: &str, iban: &str) -> StoreResult<Option<InclusionRecord>> {
        Ok(self.inclusion(project_id, iban).await?)
    }

    async fn list_by_project(&self, project_id: &str) -> StoreResult<Vec<InclusionRecord>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT body FROM inclusions WHERE project_id = ?1 ORDER BY iban",
        )
        .bind(project_id)
        .fetch_all(&self.pool)
        .await
        .map_err(ServiceError::from)?;
        Ok(rows
            .iter()
            .map(|(body,)| from_json(body))
            .collect::<Result<Vec<_>>>()?)
    }

    async fn save(&self, record: &InclusionRecord) -> StoreResult<()> {
        Ok(self.upsert_inclusion(record).await?)
    }
}

#[async_trait]
impl LedgerStore for SqliteStore {
    async fn get(&self, project_id: &str) -> StoreResult<Option<LedgerRow>> {
        Ok(self
            .document_body("SELECT body FROM ledger_rows WHERE project_id = ?1", project_id)
            .await?)
    }

    async fn save(&self, row: &LedgerRow) -> StoreResult<()> {
        let body = to_json(row)?;
        Ok(self
            .upsert_body(
                r#"
                INSERT INTO ledger_rows (project_id, body) VALUES (?1, ?2)
                ON CONFLICT (project_id) DO UPDATE SET body = excluded.body
                "#,
                &row.project_id,
                body,
            )
            .await?)
    }
}

#[async_trait]
impl DocumentStore for SqliteStore {
    async fn count_by_project_and_name_and_level(
        &self,
        project_id: &str,
        document_name: &str,
        level: DocumentLevel,
    ) -> StoreResult<u64> {
        Ok(self
            .count_documents(project_id, document_name, level)
            .await?)
    }

    async fn save(&self, upload: &DocumentUpload) -> StoreResult<()> {
        Ok(self.insert_document(upload).await?)
    }
}

#[async_trait]
impl AuditSink for SqliteStore {
    async fn record(&self, entry: AuditEntry) -> StoreResult<()> {
        Ok(self.insert_audit(&entry).await?)
    }
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
