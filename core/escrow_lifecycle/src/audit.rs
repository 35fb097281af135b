//! Audit trail for committed mutations.
//!
//! Entries carry full before/after snapshots rather than diffs. Recording
//! happens after the mutation is persisted; a failing sink is logged and
//! does not fail the operation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::error;

use crate::storage::StoreResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditAction {
    Create,
    Modify,
    Delete,
}

impl AuditAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Create => "create",
            Self::Modify => "modify",
            Self::Delete => "delete",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    Failure,
}

impl AuditOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

/// One append-only audit record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub before: Option<Value>,
    pub after: Option<Value>,
    pub action: AuditAction,
    /// Logical screen / operation name, e.g. `project.approve`.
    pub screen: String,
    pub actor: String,
    pub outcome: AuditOutcome,
    /// Message catalog key describing the change.
    pub message: String,
    pub recorded_at: DateTime<Utc>,
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> StoreResult<()>;
}

/// Serializes snapshots and forwards them to an [`AuditSink`].
pub struct AuditRecorder<'a> {
    sink: &'a dyn AuditSink,
}

impl<'a> AuditRecorder<'a> {
    pub fn new(sink: &'a dyn AuditSink) -> Self {
        Self { sink }
    }

    #[allow(clippy::too_many_arguments)]
    pub async fn record<T: Serialize>(
        &self,
        before: Option<&T>,
        after: Option<&T>,
        action: AuditAction,
        screen: &str,
        actor: &str,
        message: &str,
        at: DateTime<Utc>,
    ) {
        let entry = AuditEntry {
            before: before.and_then(snapshot),
            after: after.and_then(snapshot),
            action,
            screen: screen.to_string(),
            actor: actor.to_string(),
            outcome: AuditOutcome::Success,
            message: message.to_string(),
            recorded_at: at,
        };
        if let Err(e) = self.sink.record(entry).await {
            error!("Audit entry for {screen} by {actor} was not recorded: {e}");
        }
    }
}

fn snapshot<T: Serialize>(record: &T) -> Option<Value> {
    match serde_json::to_value(record) {
        Ok(value) => Some(value),
        Err(e) => {
            error!("Audit snapshot could not be serialized: {e}");
            None
        }
    }
}
