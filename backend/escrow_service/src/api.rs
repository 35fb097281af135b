//! Axum REST API handlers.
//!
//! Every handler builds a [`RequestContext`] from the request headers, runs
//! one lifecycle operation and answers with the uniform
//! [`escrow_lifecycle::Response`] body.
//!
//! | Header           | Meaning                                      |
//! |------------------|----------------------------------------------|
//! | `x-actor`        | acting user, required                        |
//! | `x-locale`       | message locale, defaults to `DEFAULT_LOCALE` |
//! | `x-caller-class` | `privileged` for unfiltered search totals    |

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::{HeaderMap, StatusCode},
    response::{IntoResponse, Response as HttpResponse},
    Json,
};
use escrow_lifecycle::errors::{FailureKind, LifecycleError};
use escrow_lifecycle::messages::{self, MessageCatalog};
use escrow_lifecycle::search::SearchQuery;
use escrow_lifecycle::storage::ProjectFilter;
use escrow_lifecycle::types::{CallerClass, ClosureStage, ProjectStatus};
use escrow_lifecycle::validation::{Field, FieldViolation};
use escrow_lifecycle::{
    DocumentRequest, EscrowLifecycle, InclusionRequest, ProjectSubmission, RequestContext,
    Response, ResponseStatus,
};
use serde::{Deserialize, Serialize};

const ACTOR_MISSING: &str = "request.actor_missing";

pub struct ApiState {
    pub lifecycle: EscrowLifecycle,
    pub catalog: Arc<dyn MessageCatalog>,
    pub default_locale: String,
}

// ─────────────────────────────────────────────────────────
// Request shapes
// ─────────────────────────────────────────────────────────

#[derive(Debug, Default, Deserialize)]
pub struct ReasonBody {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct DistributionBody {
    pub action: String,
}

#[derive(Debug, Deserialize)]
pub struct ClosureBody {
    pub stage: ClosureStage,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchParams {
    pub q: Option<String>,
    pub status: Option<String>,
    #[serde(default)]
    pub offset: u64,
    #[serde(default)]
    pub limit: u64,
}

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
}

// ─────────────────────────────────────────────────────────
// Plumbing
// ─────────────────────────────────────────────────────────

fn header<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
}

/// Build the request context, or the 400 answer when `x-actor` is missing.
fn context<'a>(
    state: &'a ApiState,
    headers: &HeaderMap,
) -> Result<RequestContext<'a>, HttpResponse> {
    let locale = header(headers, "x-locale")
        .unwrap_or(state.default_locale.as_str())
        .to_string();
    let caller_class = match header(headers, "x-caller-class") {
        Some(class) if class.eq_ignore_ascii_case("privileged") => CallerClass::Privileged,
        _ => CallerClass::Standard,
    };

    match header(headers, "x-actor") {
        Some(actor) => Ok(RequestContext {
            actor: actor.to_string(),
            locale,
            caller_class,
            catalog: state.catalog.as_ref(),
        }),
        None => {
            let body: Response<()> = Response {
                status: ResponseStatus::Failed,
                kind: Some(FailureKind::Validation),
                code: ACTOR_MISSING.to_string(),
                message: state.catalog.resolve(ACTOR_MISSING, &locale),
                detail: None,
                violations: Vec::new(),
                notes: Vec::new(),
            };
            Err((StatusCode::BAD_REQUEST, Json(body)).into_response())
        }
    }
}

fn status_for(kind: Option<FailureKind>, success: StatusCode) -> StatusCode {
    match kind {
        None => success,
        Some(FailureKind::Validation) => StatusCode::UNPROCESSABLE_ENTITY,
        Some(FailureKind::StateGuard) => StatusCode::CONFLICT,
        Some(FailureKind::Provisioning) => StatusCode::BAD_GATEWAY,
        Some(FailureKind::NotFound) => StatusCode::NOT_FOUND,
        Some(FailureKind::Infrastructure) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn respond<T: Serialize>(response: Response<T>, success: StatusCode) -> HttpResponse {
    (status_for(response.kind, success), Json(response)).into_response()
}

macro_rules! context_or_return {
    ($state:expr, $headers:expr) => {
        match context(&$state, &$headers) {
            Ok(ctx) => ctx,
            Err(rejection) => return rejection,
        }
    };
}

// ─────────────────────────────────────────────────────────
// Handlers
// ─────────────────────────────────────────────────────────

/// `GET /health`
pub async fn health() -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        version: env!("CARGO_PKG_VERSION"),
    })
}

/// `POST /projects`
pub async fn submit(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(submission): Json<ProjectSubmission>,
) -> HttpResponse {
    let ctx = context_or_return!(state, headers);
    let result = state.lifecycle.submit(&ctx, submission).await;
    respond(
        Response::from_result(result, &ctx, messages::PROJECT_SUBMITTED),
        StatusCode::CREATED,
    )
}

/// `POST /projects/drafts`
pub async fn save_draft(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(submission): Json<ProjectSubmission>,
) -> HttpResponse {
    let ctx = context_or_return!(state, headers);
    let result = state.lifecycle.save_draft(&ctx, submission).await;
    respond(
        Response::from_result(result, &ctx, messages::PROJECT_DRAFT_SAVED),
        StatusCode::CREATED,
    )
}

/// `POST /projects/validate`
///
/// Runs the field rules without persisting anything.
pub async fn validate(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Json(submission): Json<ProjectSubmission>,
) -> HttpResponse {
    let ctx = context_or_return!(state, headers);
    let result = state.lifecycle.validate_submission(&ctx, &submission).await;
    respond(Response::validation(result, &ctx), StatusCode::OK)
}

/// `GET /projects?q=&status=&offset=&limit=`
pub async fn search(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Query(params): Query<SearchParams>,
) -> HttpResponse {
    let ctx = context_or_return!(state, headers);
    let status = match params.status.as_deref().map(str::trim) {
        None | Some("") => None,
        Some(raw) => match ProjectStatus::parse(&raw.to_ascii_lowercase()) {
            Some(status) => Some(status),
            None => {
                let err = LifecycleError::Validation(vec![FieldViolation::new(
                    Field::Status,
                    "status.invalid",
                )]);
                return respond(Response::<()>::failure(err, &ctx), StatusCode::OK);
            }
        },
    };
    let query = SearchQuery {
        filter: ProjectFilter {
            text: params.q,
            status,
        },
        offset: params.offset,
        limit: params.limit,
    };
    let result = state.lifecycle.search(&ctx, &query).await;
    respond(
        Response::from_result(result, &ctx, messages::SEARCH_COMPLETED),
        StatusCode::OK,
    )
}

/// `GET /projects/:id`
pub async fn get_project(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
) -> HttpResponse {
    let ctx = context_or_return!(state, headers);
    let result = state.lifecycle.get_project(&ctx, &project_id).await;
    respond(
        Response::from_result(result, &ctx, messages::PROJECT_FOUND),
        StatusCode::OK,
    )
}

/// `PUT /projects/:id`
pub async fn update(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    Json(submission): Json<ProjectSubmission>,
) -> HttpResponse {
    let ctx = context_or_return!(state, headers);
    let result = state.lifecycle.update(&ctx, &project_id, submission).await;
    respond(
        Response::from_result(result, &ctx, messages::PROJECT_UPDATED),
        StatusCode::OK,
    )
}

/// `POST /projects/:id/approve`
pub async fn approve(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
) -> HttpResponse {
    let ctx = context_or_return!(state, headers);
    let result = state.lifecycle.approve(&ctx, &project_id).await;
    respond(
        Response::from_result(result, &ctx, messages::PROJECT_APPROVED),
        StatusCode::OK,
    )
}

/// `POST /projects/:id/reject`
pub async fn reject(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    body: Option<Json<ReasonBody>>,
) -> HttpResponse {
    let ctx = context_or_return!(state, headers);
    let reason = body.map(|Json(b)| b.reason).unwrap_or_default();
    let result = state.lifecycle.reject(&ctx, &project_id, reason).await;
    respond(
        Response::from_result(result, &ctx, messages::PROJECT_REJECTED),
        StatusCode::OK,
    )
}

/// `POST /projects/:id/return`
pub async fn return_for_correction(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    body: Option<Json<ReasonBody>>,
) -> HttpResponse {
    let ctx = context_or_return!(state, headers);
    let reason = body.map(|Json(b)| b.reason).unwrap_or_default();
    let result = state
        .lifecycle
        .return_for_correction(&ctx, &project_id, reason)
        .await;
    respond(
        Response::from_result(result, &ctx, messages::PROJECT_RETURNED),
        StatusCode::OK,
    )
}

/// `POST /projects/:id/distribution`
pub async fn set_distribution(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    Json(body): Json<DistributionBody>,
) -> HttpResponse {
    let ctx = context_or_return!(state, headers);
    let result = state
        .lifecycle
        .set_distribution_flag(&ctx, &project_id, &body.action)
        .await;
    respond(
        Response::from_result(result, &ctx, messages::DISTRIBUTION_UPDATED),
        StatusCode::OK,
    )
}

/// `POST /projects/:id/closure`
pub async fn request_closure(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    Json(body): Json<ClosureBody>,
) -> HttpResponse {
    let ctx = context_or_return!(state, headers);
    let result = state
        .lifecycle
        .request_closure(&ctx, &project_id, body.stage)
        .await;
    respond(
        Response::from_result(result, &ctx, messages::CLOSURE_REQUESTED),
        StatusCode::OK,
    )
}

/// `POST /projects/:id/inclusions`
pub async fn add_inclusion(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    Json(request): Json<InclusionRequest>,
) -> HttpResponse {
    let ctx = context_or_return!(state, headers);
    let result = state.lifecycle.add_inclusion(&ctx, &project_id, request).await;
    respond(
        Response::from_result(result, &ctx, messages::INCLUSION_ADDED),
        StatusCode::CREATED,
    )
}

/// `POST /projects/:id/documents`
pub async fn record_document(
    State(state): State<Arc<ApiState>>,
    headers: HeaderMap,
    Path(project_id): Path<String>,
    Json(request): Json<DocumentRequest>,
) -> HttpResponse {
    let ctx = context_or_return!(state, headers);
    let result = state
        .lifecycle
        .record_document(&ctx, &project_id, request)
        .await;
    respond(
        Response::from_result(result, &ctx, messages::DOCUMENT_RECORDED),
        StatusCode::CREATED,
    )
}

// ─────────────────────────────────────────────────────────
// Unit tests
// ─────────────────────────────────────────────────────────
