use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Router,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;

use super::assignment::{AssignmentError, AssignmentRepository};
use super::batch::{BatchError, BillingError, BulkSubmission, BulkVerificationService};
use super::client::VerificationTransport;
use super::domain::{Assignment, AssignmentId, AssignmentStatus, BatchId, UserId, VerificationId};
use super::processor::{ManualVerdict, NewAssignment, ProcessingError, ProcessingService};
use super::repository::{RepositoryError, VerificationRequestRepository};
use super::response::ResponseRepository;

/// Shared state handed to every verification endpoint.
pub struct VerificationState<A, R, V, T, B> {
    pub processing: Arc<ProcessingService<A, R, V, T>>,
    pub bulk: Arc<BulkVerificationService<B, V>>,
}

impl<A, R, V, T, B> Clone for VerificationState<A, R, V, T, B> {
    fn clone(&self) -> Self {
        Self {
            processing: Arc::clone(&self.processing),
            bulk: Arc::clone(&self.bulk),
        }
    }
}

/// Router builder exposing the four upstream trigger contracts plus the
/// read views dashboards consume.
pub fn verification_router<A, R, V, T, B>(state: VerificationState<A, R, V, T, B>) -> Router
where
    A: AssignmentRepository + 'static,
    R: ResponseRepository + 'static,
    V: VerificationRequestRepository + 'static,
    T: VerificationTransport + 'static,
    B: super::batch::BatchRepository + 'static,
{
    Router::new()
        .route(
            "/api/v1/verifications/assignments",
            post(assign_handler::<A, R, V, T, B>).get(workload_handler::<A, R, V, T, B>),
        )
        .route(
            "/api/v1/verifications/assignments/:assignment_id/process",
            post(process_api_handler::<A, R, V, T, B>),
        )
        .route(
            "/api/v1/verifications/assignments/:assignment_id/manual",
            post(process_manual_handler::<A, R, V, T, B>),
        )
        .route(
            "/api/v1/verifications/:verification_id/response",
            get(response_handler::<A, R, V, T, B>),
        )
        .route(
            "/api/v1/verifications/bulk",
            post(bulk_submit_handler::<A, R, V, T, B>),
        )
        .route(
            "/api/v1/verifications/bulk/:batch_id",
            get(bulk_progress_handler::<A, R, V, T, B>),
        )
        .with_state(state)
}

#[derive(Debug, Deserialize)]
pub(crate) struct ProcessRequest {
    pub(crate) assignee_id: UserId,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ManualRequest {
    pub(crate) assignee_id: UserId,
    pub(crate) verdict: ManualVerdict,
}

#[derive(Debug, Deserialize)]
pub(crate) struct WorkloadQuery {
    pub(crate) assignee: String,
    #[serde(default)]
    pub(crate) status: Option<AssignmentStatus>,
}

#[derive(Debug, Deserialize)]
pub(crate) struct BulkRequest {
    pub(crate) submitted_by: UserId,
    pub(crate) file_name: String,
    /// CSV contents submitted inline, one record per line.
    pub(crate) csv: String,
}

#[derive(Debug, serde::Serialize)]
pub(crate) struct WorkloadEntry {
    #[serde(flatten)]
    pub(crate) assignment: Assignment,
    pub(crate) overdue: bool,
}

pub(crate) async fn assign_handler<A, R, V, T, B>(
    State(state): State<VerificationState<A, R, V, T, B>>,
    axum::Json(intent): axum::Json<NewAssignment>,
) -> Response
where
    A: AssignmentRepository + 'static,
    R: ResponseRepository + 'static,
    V: VerificationRequestRepository + 'static,
    T: VerificationTransport + 'static,
    B: super::batch::BatchRepository + 'static,
{
    match state.processing.assign(intent) {
        Ok(assignment) => (StatusCode::CREATED, axum::Json(assignment)).into_response(),
        Err(err) => processing_error_response(err),
    }
}

pub(crate) async fn workload_handler<A, R, V, T, B>(
    State(state): State<VerificationState<A, R, V, T, B>>,
    Query(query): Query<WorkloadQuery>,
) -> Response
where
    A: AssignmentRepository + 'static,
    R: ResponseRepository + 'static,
    V: VerificationRequestRepository + 'static,
    T: VerificationTransport + 'static,
    B: super::batch::BatchRepository + 'static,
{
    let assignee = UserId(query.assignee);
    match state.processing.workload(&assignee, query.status) {
        Ok(assignments) => {
            let now = Utc::now();
            let entries: Vec<WorkloadEntry> = assignments
                .into_iter()
                .map(|assignment| WorkloadEntry {
                    overdue: assignment.is_overdue(now),
                    assignment,
                })
                .collect();
            (StatusCode::OK, axum::Json(entries)).into_response()
        }
        Err(err) => processing_error_response(err),
    }
}

pub(crate) async fn process_api_handler<A, R, V, T, B>(
    State(state): State<VerificationState<A, R, V, T, B>>,
    Path(assignment_id): Path<String>,
    axum::Json(request): axum::Json<ProcessRequest>,
) -> Response
where
    A: AssignmentRepository + 'static,
    R: ResponseRepository + 'static,
    V: VerificationRequestRepository + 'static,
    T: VerificationTransport + 'static,
    B: super::batch::BatchRepository + 'static,
{
    let id = AssignmentId(assignment_id);
    match state.processing.process_api(&id, &request.assignee_id).await {
        Ok(response) => (StatusCode::OK, axum::Json(response)).into_response(),
        Err(err) => processing_error_response(err),
    }
}

pub(crate) async fn process_manual_handler<A, R, V, T, B>(
    State(state): State<VerificationState<A, R, V, T, B>>,
    Path(assignment_id): Path<String>,
    axum::Json(request): axum::Json<ManualRequest>,
) -> Response
where
    A: AssignmentRepository + 'static,
    R: ResponseRepository + 'static,
    V: VerificationRequestRepository + 'static,
    T: VerificationTransport + 'static,
    B: super::batch::BatchRepository + 'static,
{
    let id = AssignmentId(assignment_id);
    match state
        .processing
        .process_manual(&id, request.verdict, &request.assignee_id)
    {
        Ok(response) => (StatusCode::OK, axum::Json(response)).into_response(),
        Err(err) => processing_error_response(err),
    }
}

pub(crate) async fn response_handler<A, R, V, T, B>(
    State(state): State<VerificationState<A, R, V, T, B>>,
    Path(verification_id): Path<String>,
) -> Response
where
    A: AssignmentRepository + 'static,
    R: ResponseRepository + 'static,
    V: VerificationRequestRepository + 'static,
    T: VerificationTransport + 'static,
    B: super::batch::BatchRepository + 'static,
{
    let id = VerificationId(verification_id);
    match state.processing.response_for(&id) {
        Ok(Some(response)) => (StatusCode::OK, axum::Json(response)).into_response(),
        Ok(None) => {
            let payload = json!({
                "verification_id": id.0,
                "error": "no institution response recorded",
            });
            (StatusCode::NOT_FOUND, axum::Json(payload)).into_response()
        }
        Err(err) => processing_error_response(err),
    }
}

pub(crate) async fn bulk_submit_handler<A, R, V, T, B>(
    State(state): State<VerificationState<A, R, V, T, B>>,
    axum::Json(request): axum::Json<BulkRequest>,
) -> Response
where
    A: AssignmentRepository + 'static,
    R: ResponseRepository + 'static,
    V: VerificationRequestRepository + 'static,
    T: VerificationTransport + 'static,
    B: super::batch::BatchRepository + 'static,
{
    let submission = BulkSubmission {
        submitted_by: request.submitted_by,
        file_name: request.file_name,
    };
    match state.bulk.submit(submission, request.csv.as_bytes()) {
        Ok(batch_id) => {
            let payload = json!({ "batch_id": batch_id.0, "status": "processing" });
            (StatusCode::ACCEPTED, axum::Json(payload)).into_response()
        }
        Err(err) => batch_error_response(err),
    }
}

pub(crate) async fn bulk_progress_handler<A, R, V, T, B>(
    State(state): State<VerificationState<A, R, V, T, B>>,
    Path(batch_id): Path<String>,
) -> Response
where
    A: AssignmentRepository + 'static,
    R: ResponseRepository + 'static,
    V: VerificationRequestRepository + 'static,
    T: VerificationTransport + 'static,
    B: super::batch::BatchRepository + 'static,
{
    let id = BatchId(batch_id);
    match state.bulk.progress(&id) {
        Ok(batch) => (StatusCode::OK, axum::Json(batch)).into_response(),
        Err(err) => batch_error_response(err),
    }
}

fn processing_error_response(err: ProcessingError) -> Response {
    let status = match &err {
        ProcessingError::Assignment(AssignmentError::NotOwner { .. }) => StatusCode::FORBIDDEN,
        ProcessingError::Assignment(AssignmentError::InvalidState { .. }) => StatusCode::CONFLICT,
        ProcessingError::Assignment(AssignmentError::NotFound(_))
        | ProcessingError::VerificationNotFound(_) => StatusCode::NOT_FOUND,
        ProcessingError::Assignment(AssignmentError::Repository(source)) => {
            repository_status(source)
        }
        ProcessingError::MissingApiConfig(_) => StatusCode::UNPROCESSABLE_ENTITY,
        ProcessingError::Client(_) => StatusCode::BAD_GATEWAY,
        ProcessingError::Repository(source) => repository_status(source),
        ProcessingError::Directory(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    let payload = json!({ "error": err.to_string() });
    (status, axum::Json(payload)).into_response()
}

fn batch_error_response(err: BatchError) -> Response {
    let status = match &err {
        BatchError::Intake(_) => StatusCode::BAD_REQUEST,
        BatchError::Billing(BillingError::InsufficientFunds { .. }) => {
            StatusCode::PAYMENT_REQUIRED
        }
        BatchError::Billing(BillingError::Unavailable(_)) | BatchError::Upload(_) => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
        BatchError::Repository(source) => repository_status(source),
        BatchError::NotFound(_) => StatusCode::NOT_FOUND,
    };

    let payload = json!({ "error": err.to_string() });
    (status, axum::Json(payload)).into_response()
}

fn repository_status(err: &RepositoryError) -> StatusCode {
    match err {
        RepositoryError::Conflict => StatusCode::CONFLICT,
        RepositoryError::NotFound => StatusCode::NOT_FOUND,
        RepositoryError::Unavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}
