use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post, put},
    Json, Router,
};
use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::json;
use tracing::warn;

use super::catalog::StandardsCatalog;
use super::domain::{EmployeeId, EventId, GroupKey, StandardCode, YearMonth};
use super::error::ScoringError;
use super::recorder::EventDraft;
use super::repository::{LedgerRepository, RepositoryError};
use super::responsibility::ResponsibilityChecklist;
use super::service::{AssessmentService, EmployeeRegistration};

#[derive(Debug, Clone, Deserialize)]
pub struct CreateEventRequest {
    pub employee_id: EmployeeId,
    pub standard_code: StandardCode,
    pub event_date: NaiveDate,
    #[serde(default)]
    pub description: String,
    /// Raw answers; a length other than nine is rejected as a validation error.
    #[serde(default)]
    pub checklist: Option<Vec<bool>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChangeDateRequest {
    pub event_date: NaiveDate,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReassessRequest {
    pub checklist: Vec<bool>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MonthlyRewardRequest {
    pub month: YearMonth,
    /// Restricts the run to one employee.
    #[serde(default)]
    pub employee_id: Option<EmployeeId>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnnualResetRequest {
    pub year: i32,
}

/// Router exposing the scoring operations and their read models.
pub fn assessment_router<R, C>(service: Arc<AssessmentService<R, C>>) -> Router
where
    R: LedgerRepository + 'static,
    C: StandardsCatalog + 'static,
{
    Router::new()
        .route("/api/v1/employees", post(register_handler::<R, C>))
        .route("/api/v1/events", post(create_event_handler::<R, C>))
        .route(
            "/api/v1/events/:event_id/delete",
            post(soft_delete_handler::<R, C>),
        )
        .route(
            "/api/v1/events/:event_id/restore",
            post(restore_handler::<R, C>),
        )
        .route(
            "/api/v1/events/:event_id/date",
            put(change_date_handler::<R, C>),
        )
        .route(
            "/api/v1/events/:event_id/responsibility",
            put(reassess_handler::<R, C>),
        )
        .route(
            "/api/v1/groups/recalculate",
            post(recalculate_handler::<R, C>),
        )
        .route(
            "/api/v1/employees/:employee_id/ledger/:year",
            get(ledger_handler::<R, C>),
        )
        .route(
            "/api/v1/employees/:employee_id/rewards",
            get(reward_history_handler::<R, C>),
        )
        .route("/api/v1/rewards/monthly", post(monthly_rewards_handler::<R, C>))
        .route("/api/v1/resets/annual", post(annual_reset_handler::<R, C>))
        .route("/api/v1/standards", get(standards_handler::<R, C>))
        .with_state(service)
}

pub(crate) async fn register_handler<R, C>(
    State(service): State<Arc<AssessmentService<R, C>>>,
    Json(registration): Json<EmployeeRegistration>,
) -> Response
where
    R: LedgerRepository + 'static,
    C: StandardsCatalog + 'static,
{
    match run(service, move |service| service.register_employee(registration)).await {
        Ok(record) => (StatusCode::CREATED, Json(record)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn create_event_handler<R, C>(
    State(service): State<Arc<AssessmentService<R, C>>>,
    Json(request): Json<CreateEventRequest>,
) -> Response
where
    R: LedgerRepository + 'static,
    C: StandardsCatalog + 'static,
{
    let checklist = match request.checklist.map(ResponsibilityChecklist::try_from).transpose() {
        Ok(checklist) => checklist,
        Err(error) => return error_response(error.into()),
    };
    let draft = EventDraft {
        employee_id: request.employee_id,
        standard_code: request.standard_code,
        event_date: request.event_date,
        description: request.description,
        checklist,
    };

    match run(service, move |service| service.create_event(draft)).await {
        Ok(outcome) => (StatusCode::CREATED, Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn soft_delete_handler<R, C>(
    State(service): State<Arc<AssessmentService<R, C>>>,
    Path(event_id): Path<String>,
) -> Response
where
    R: LedgerRepository + 'static,
    C: StandardsCatalog + 'static,
{
    let Some(id) = parse_event_id(&event_id) else {
        return bad_event_id(&event_id);
    };
    match run(service, move |service| service.soft_delete(id)).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn restore_handler<R, C>(
    State(service): State<Arc<AssessmentService<R, C>>>,
    Path(event_id): Path<String>,
) -> Response
where
    R: LedgerRepository + 'static,
    C: StandardsCatalog + 'static,
{
    let Some(id) = parse_event_id(&event_id) else {
        return bad_event_id(&event_id);
    };
    match run(service, move |service| service.restore(id)).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn change_date_handler<R, C>(
    State(service): State<Arc<AssessmentService<R, C>>>,
    Path(event_id): Path<String>,
    Json(request): Json<ChangeDateRequest>,
) -> Response
where
    R: LedgerRepository + 'static,
    C: StandardsCatalog + 'static,
{
    let Some(id) = parse_event_id(&event_id) else {
        return bad_event_id(&event_id);
    };
    match run(service, move |service| {
        service.change_event_date(id, request.event_date)
    })
    .await
    {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn reassess_handler<R, C>(
    State(service): State<Arc<AssessmentService<R, C>>>,
    Path(event_id): Path<String>,
    Json(request): Json<ReassessRequest>,
) -> Response
where
    R: LedgerRepository + 'static,
    C: StandardsCatalog + 'static,
{
    let Some(id) = parse_event_id(&event_id) else {
        return bad_event_id(&event_id);
    };
    let checklist = match ResponsibilityChecklist::try_from(request.checklist) {
        Ok(checklist) => checklist,
        Err(error) => return error_response(error.into()),
    };
    match run(service, move |service| service.reassess(id, checklist)).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn recalculate_handler<R, C>(
    State(service): State<Arc<AssessmentService<R, C>>>,
    Json(key): Json<GroupKey>,
) -> Response
where
    R: LedgerRepository + 'static,
    C: StandardsCatalog + 'static,
{
    match run(service, move |service| service.recalculate(&key)).await {
        Ok(outcome) => (StatusCode::OK, Json(outcome)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn ledger_handler<R, C>(
    State(service): State<Arc<AssessmentService<R, C>>>,
    Path((employee_id, year)): Path<(String, i32)>,
) -> Response
where
    R: LedgerRepository + 'static,
    C: StandardsCatalog + 'static,
{
    let id = EmployeeId(employee_id);
    match service.ledger_for_year(&id, year) {
        Ok(ledger) => (StatusCode::OK, Json(ledger)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn reward_history_handler<R, C>(
    State(service): State<Arc<AssessmentService<R, C>>>,
    Path(employee_id): Path<String>,
) -> Response
where
    R: LedgerRepository + 'static,
    C: StandardsCatalog + 'static,
{
    let id = EmployeeId(employee_id);
    match service.reward_history(&id) {
        Ok(records) => {
            let payload = json!({
                "employee_id": id,
                "records": records,
            });
            (StatusCode::OK, Json(payload)).into_response()
        }
        Err(error) => error_response(error),
    }
}

pub(crate) async fn monthly_rewards_handler<R, C>(
    State(service): State<Arc<AssessmentService<R, C>>>,
    Json(request): Json<MonthlyRewardRequest>,
) -> Response
where
    R: LedgerRepository + 'static,
    C: StandardsCatalog + 'static,
{
    let MonthlyRewardRequest { month, employee_id } = request;
    let result = match employee_id {
        Some(employee_id) => run(service, move |service| {
            service
                .evaluate_monthly_reward(&employee_id, month)
                .map(|evaluation| json!(evaluation))
        })
        .await,
        None => run(service, move |service| {
            service.evaluate_monthly_rewards(month).map(|run| json!(run))
        })
        .await,
    };

    match result {
        Ok(payload) => (StatusCode::OK, Json(payload)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn annual_reset_handler<R, C>(
    State(service): State<Arc<AssessmentService<R, C>>>,
    Json(request): Json<AnnualResetRequest>,
) -> Response
where
    R: LedgerRepository + 'static,
    C: StandardsCatalog + 'static,
{
    match run(service, move |service| service.annual_reset(request.year)).await {
        Ok(run) => (StatusCode::OK, Json(run)).into_response(),
        Err(error) => error_response(error),
    }
}

pub(crate) async fn standards_handler<R, C>(
    State(service): State<Arc<AssessmentService<R, C>>>,
) -> Response
where
    R: LedgerRepository + 'static,
    C: StandardsCatalog + 'static,
{
    (StatusCode::OK, Json(service.standards())).into_response()
}

/// Status and JSON body for a failed scoring operation.
pub fn error_response(error: ScoringError) -> Response {
    let status = match &error {
        ScoringError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ScoringError::NotFound(_) => StatusCode::NOT_FOUND,
        ScoringError::Concurrency { .. } => StatusCode::SERVICE_UNAVAILABLE,
        ScoringError::Consistency(_) | ScoringError::Repository(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    let payload = json!({
        "error": error.to_string(),
        "retryable": error.is_transient(),
    });
    (status, Json(payload)).into_response()
}

/// Runs a blocking ledger operation off the async workers; lock waits may take seconds.
async fn run<R, C, T, F>(service: Arc<AssessmentService<R, C>>, work: F) -> Result<T, ScoringError>
where
    R: LedgerRepository + 'static,
    C: StandardsCatalog + 'static,
    T: Send + 'static,
    F: FnOnce(&AssessmentService<R, C>) -> Result<T, ScoringError> + Send + 'static,
{
    match tokio::task::spawn_blocking(move || work(&service)).await {
        Ok(result) => result,
        Err(join) => {
            warn!(error = %join, "scoring task aborted");
            Err(RepositoryError::Unavailable(join.to_string()).into())
        }
    }
}

/// Accepts both the bare sequence number and the `evt-000042` display form.
pub(crate) fn parse_event_id(raw: &str) -> Option<EventId> {
    let digits = raw.strip_prefix("evt-").unwrap_or(raw);
    digits.parse().ok().map(EventId)
}

fn bad_event_id(raw: &str) -> Response {
    let payload = json!({
        "error": format!("invalid event id {raw}"),
    });
    (StatusCode::BAD_REQUEST, Json(payload)).into_response()
}
