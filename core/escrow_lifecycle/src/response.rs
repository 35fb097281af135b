//! Uniform response shape returned across the public boundary.
//!
//! Every operation result, success or failure, becomes a [`Response`] with
//! its message resolved through the request's catalog. Infrastructure
//! failures are logged here and reported with the generic `request.failed`
//! message.

use serde::Serialize;
use tracing::{debug, error, warn};

use crate::errors::{FailureKind, GuardViolation, LifecycleError};
use crate::messages;
use crate::types::RequestContext;
use crate::validation::Field;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ResponseStatus {
    Success,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedViolation {
    pub field: Field,
    pub code: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Response<T> {
    pub status: ResponseStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<FailureKind>,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<T>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<ResolvedViolation>,
    /// Missing document names or unrecorded account numbers.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub notes: Vec<String>,
}

impl<T> Response<T> {
    pub fn success(detail: T, code: &str, ctx: &RequestContext<'_>) -> Self {
        Self {
            status: ResponseStatus::Success,
            kind: None,
            code: code.to_string(),
            message: ctx.catalog.resolve(code, &ctx.locale),
            detail: Some(detail),
            violations: Vec::new(),
            notes: Vec::new(),
        }
    }

    pub fn failure(err: LifecycleError, ctx: &RequestContext<'_>) -> Self {
        let code = err.code();
        match &err {
            LifecycleError::Validation(_) | LifecycleError::NotFound { .. } => {
                debug!("Request by {} refused: {err}", ctx.actor)
            }
            LifecycleError::Guard(_) | LifecycleError::Provisioning { .. } => {
                warn!("Request by {} refused: {err}", ctx.actor)
            }
            LifecycleError::Infrastructure(_) => {
                error!("Request by {} failed: {err}", ctx.actor)
            }
        }

        let violations = match &err {
            LifecycleError::Validation(list) => list
                .iter()
                .map(|v| ResolvedViolation {
                    field: v.field,
                    code: v.code.to_string(),
                    message: ctx.catalog.resolve(v.code, &ctx.locale),
                })
                .collect(),
            _ => Vec::new(),
        };
        let notes = match &err {
            LifecycleError::Guard(GuardViolation::MissingDocuments(names)) => names.clone(),
            LifecycleError::Provisioning { orphaned, .. } => orphaned.clone(),
            _ => Vec::new(),
        };

        Self {
            status: ResponseStatus::Failed,
            kind: Some(err.kind()),
            code: code.to_string(),
            message: ctx.catalog.resolve(code, &ctx.locale),
            detail: None,
            violations,
            notes,
        }
    }

    /// Convert an operation result; `success_code` names the success message.
    pub fn from_result(
        result: Result<T, LifecycleError>,
        ctx: &RequestContext<'_>,
        success_code: &str,
    ) -> Self {
        match result {
            Ok(detail) => Self::success(detail, success_code, ctx),
            Err(err) => Self::failure(err, ctx),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResponseStatus::Success
    }
}

impl Response<()> {
    /// Standalone validation: `validation.passed` or `validation.failed`.
    pub fn validation(result: Result<(), LifecycleError>, ctx: &RequestContext<'_>) -> Self {
        Self::from_result(result, ctx, messages::VALIDATION_PASSED)
    }
}
