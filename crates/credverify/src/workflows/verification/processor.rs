//! Single-record processors: orchestrate the assignment tracker, external
//! verification client (or human input), scoring engine, response store, and
//! the verification request's status, atomically from the caller's
//! perspective.

use std::collections::BTreeSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Deserialize;
use serde_json::Value;
use tracing::error;

use super::assignment::{AssignmentError, AssignmentRepository};
use super::client::{ClientError, ExternalVerificationClient, VerificationTransport};
use super::domain::{
    Assignment, AssignmentId, AssignmentStatus, ConnectionType, DiscrepancyFlag, InstitutionId,
    InstitutionResponse, Priority, ResponseStatus, ResponseType, UserId, VerificationId,
    VerificationStatus,
};
use super::institutions::{
    parse_api_payload, DirectoryError, InstitutionDirectory, VerificationPayload,
};
use super::repository::{RepositoryError, VerificationRequestRepository};
use super::response::{ResponseContext, ResponseRepository};
use super::scoring::{timeliness_from_elapsed, ScoringEngine};

static ASSIGNMENT_SEQUENCE: AtomicU64 = AtomicU64::new(1);
static RESPONSE_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_assignment_id() -> AssignmentId {
    let id = ASSIGNMENT_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    AssignmentId(format!("asg-{id:06}"))
}

fn next_response_id() -> String {
    let id = RESPONSE_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    format!("resp-{id:06}")
}

/// Routing intent produced by the upstream "assign to reviewer" trigger.
#[derive(Debug, Clone, Deserialize)]
pub struct NewAssignment {
    pub verification_id: VerificationId,
    pub assignee_id: UserId,
    pub assigned_by: UserId,
    pub institution_id: InstitutionId,
    pub priority: Priority,
    pub connection_type: ConnectionType,
    #[serde(default)]
    pub due_date: Option<DateTime<Utc>>,
}

/// Human-entered verdict for the manual path. The reviewer's scores and
/// flags are trusted as-is.
#[derive(Debug, Clone, Deserialize)]
pub struct ManualVerdict {
    pub verification_score: u8,
    #[serde(default)]
    pub confidence_score: Option<u8>,
    #[serde(default)]
    pub flags: BTreeSet<DiscrepancyFlag>,
    #[serde(default)]
    pub notes: Option<String>,
    /// Verification status the reviewer chose; defaults to `completed`.
    #[serde(default)]
    pub verification_status: Option<VerificationStatus>,
}

/// Errors surfaced by the single-record processors to their immediate
/// caller.
#[derive(Debug, thiserror::Error)]
pub enum ProcessingError {
    #[error(transparent)]
    Assignment(#[from] AssignmentError),
    #[error("verification {0} not found")]
    VerificationNotFound(VerificationId),
    #[error("no API configuration for institution {0}")]
    MissingApiConfig(InstitutionId),
    #[error(transparent)]
    Client(#[from] ClientError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error(transparent)]
    Directory(#[from] DirectoryError),
}

/// Service composing the repositories, institution directory, external
/// client, and scoring engine.
pub struct ProcessingService<A, R, V, T> {
    assignments: Arc<A>,
    responses: Arc<R>,
    verifications: Arc<V>,
    directory: Arc<dyn InstitutionDirectory>,
    client: ExternalVerificationClient<T>,
    engine: ScoringEngine,
}

impl<A, R, V, T> ProcessingService<A, R, V, T>
where
    A: AssignmentRepository + 'static,
    R: ResponseRepository + 'static,
    V: VerificationRequestRepository + 'static,
    T: VerificationTransport,
{
    pub fn new(
        assignments: Arc<A>,
        responses: Arc<R>,
        verifications: Arc<V>,
        directory: Arc<dyn InstitutionDirectory>,
        client: ExternalVerificationClient<T>,
    ) -> Self {
        Self {
            assignments,
            responses,
            verifications,
            directory,
            client,
            engine: ScoringEngine::new(),
        }
    }

    /// Routes a verification request to a reviewer, creating the assignment
    /// and parking the request in `pending_assignment`.
    pub fn assign(&self, intent: NewAssignment) -> Result<Assignment, ProcessingError> {
        let verification = self
            .verifications
            .fetch(&intent.verification_id)?
            .ok_or_else(|| ProcessingError::VerificationNotFound(intent.verification_id.clone()))?;

        let assignment = Assignment {
            id: next_assignment_id(),
            verification_id: intent.verification_id,
            assignee_id: intent.assignee_id,
            assigned_by: intent.assigned_by,
            assigned_at: Utc::now(),
            due_date: intent.due_date,
            priority: intent.priority,
            connection_type: intent.connection_type,
            institution_id: intent.institution_id,
            status: AssignmentStatus::Pending,
        };

        let stored = self.assignments.create(assignment)?;
        self.verifications
            .update_status(&verification.id, VerificationStatus::PendingAssignment)?;
        Ok(stored)
    }

    /// API path: claims the assignment, calls the institution endpoint with
    /// retry, reconciles the answer, and persists the verdict.
    pub async fn process_api(
        &self,
        assignment_id: &AssignmentId,
        assignee: &UserId,
    ) -> Result<InstitutionResponse, ProcessingError> {
        let assignment = self.assignments.claim(
            assignment_id,
            assignee,
            AssignmentStatus::Pending,
            AssignmentStatus::Processing,
        )?;

        match self.run_api_verification(&assignment).await {
            Ok(response) => Ok(response),
            Err(err @ ProcessingError::MissingApiConfig(_)) => {
                // The work is handed back instead of being stranded in
                // `processing`: a human can still route it manually.
                self.revert_claim(&assignment.id);
                Err(err)
            }
            Err(err) => {
                self.record_failure(&assignment, &err.to_string());
                Err(err)
            }
        }
    }

    async fn run_api_verification(
        &self,
        assignment: &Assignment,
    ) -> Result<InstitutionResponse, ProcessingError> {
        let verification = self
            .verifications
            .fetch(&assignment.verification_id)?
            .ok_or_else(|| {
                ProcessingError::VerificationNotFound(assignment.verification_id.clone())
            })?;

        let config = self
            .directory
            .api_config(&assignment.institution_id)?
            .ok_or_else(|| ProcessingError::MissingApiConfig(assignment.institution_id.clone()))?;

        let payload =
            VerificationPayload::from_submission(&verification.id, &verification.submission);
        let outcome = self.client.call_with_retry(&config, &payload).await?;

        let record = parse_api_payload(outcome.data.as_ref());
        let complete = record.is_complete();

        let mut report = self.engine.score(&verification.submission, &record);
        report.timeliness_score =
            timeliness_from_elapsed(outcome.elapsed, self.client.timeout_for(&config));

        let raw_response = outcome
            .data
            .clone()
            .or_else(|| outcome.raw_response.clone().map(Value::String));

        let response = self.upsert_response(InstitutionResponse::from_report(
            self.response_context(assignment),
            &report,
            record,
            raw_response,
            Some(payload.reference),
            ResponseType::ApiAuto,
        ))?;

        self.assignments
            .update_status(&assignment.id, AssignmentStatus::Completed)?;

        let verification_status = if complete {
            VerificationStatus::Completed
        } else {
            VerificationStatus::Processing
        };
        self.verifications
            .update_status(&verification.id, verification_status)?;

        Ok(response)
    }

    /// Manual path: same ownership/state guard as the API path, no network
    /// call, no scoring engine.
    pub fn process_manual(
        &self,
        assignment_id: &AssignmentId,
        verdict: ManualVerdict,
        assignee: &UserId,
    ) -> Result<InstitutionResponse, ProcessingError> {
        let assignment = self.assignments.claim(
            assignment_id,
            assignee,
            AssignmentStatus::Pending,
            AssignmentStatus::Processing,
        )?;

        match self.run_manual_verification(&assignment, verdict) {
            Ok(response) => Ok(response),
            Err(err) => {
                self.record_failure(&assignment, &err.to_string());
                Err(err)
            }
        }
    }

    fn run_manual_verification(
        &self,
        assignment: &Assignment,
        verdict: ManualVerdict,
    ) -> Result<InstitutionResponse, ProcessingError> {
        let verification_status = verdict
            .verification_status
            .unwrap_or(VerificationStatus::Completed);

        let response = self.upsert_response(InstitutionResponse::manual(
            self.response_context(assignment),
            verdict.verification_score,
            verdict.confidence_score,
            verdict.flags,
            verdict.notes,
        ))?;

        self.assignments
            .update_status(&assignment.id, AssignmentStatus::Completed)?;
        self.verifications
            .update_status(&assignment.verification_id, verification_status)?;

        Ok(response)
    }

    /// Reviewer work queue, optionally narrowed to one status.
    pub fn workload(
        &self,
        assignee: &UserId,
        status: Option<AssignmentStatus>,
    ) -> Result<Vec<Assignment>, ProcessingError> {
        let assignments = match status {
            Some(status) => self
                .assignments
                .find_by_assignee_and_status(assignee, status)?,
            None => self.assignments.find_by_assignee(assignee)?,
        };
        Ok(assignments)
    }

    pub fn assignment_for(
        &self,
        verification_id: &VerificationId,
    ) -> Result<Option<Assignment>, ProcessingError> {
        Ok(self.assignments.find_by_verification(verification_id)?)
    }

    pub fn response_for(
        &self,
        verification_id: &VerificationId,
    ) -> Result<Option<InstitutionResponse>, ProcessingError> {
        Ok(self.responses.find_by_verification(verification_id)?)
    }

    pub fn responses_with_status(
        &self,
        status: ResponseStatus,
    ) -> Result<Vec<InstitutionResponse>, ProcessingError> {
        Ok(self.responses.find_by_status(status)?)
    }

    fn response_context(&self, assignment: &Assignment) -> ResponseContext {
        ResponseContext {
            id: next_response_id(),
            verification_id: assignment.verification_id.clone(),
            institution_id: assignment.institution_id.clone(),
            processed_by: assignment.assignee_id.clone(),
            processed_at: Utc::now(),
        }
    }

    /// Create-or-update, preserving the one-response-per-verification
    /// invariant when a retried processor call resubmits after a partial
    /// prior success.
    fn upsert_response(
        &self,
        response: InstitutionResponse,
    ) -> Result<InstitutionResponse, RepositoryError> {
        match self.responses.find_by_verification(&response.verification_id)? {
            Some(existing) => {
                let mut replacement = response;
                replacement.id = existing.id;
                self.responses.update(replacement.clone())?;
                Ok(replacement)
            }
            None => self.responses.create(response),
        }
    }

    fn revert_claim(&self, assignment_id: &AssignmentId) {
        if let Err(err) = self
            .assignments
            .update_status(assignment_id, AssignmentStatus::Pending)
        {
            error!(assignment = %assignment_id.0, %err, "failed to revert assignment claim");
        }
    }

    /// Compensating write, not a rollback: the failed assignment and the
    /// failed verdict must both exist so the work item is visibly
    /// retriable.
    fn record_failure(&self, assignment: &Assignment, reason: &str) {
        if let Err(err) = self
            .assignments
            .update_status(&assignment.id, AssignmentStatus::Failed)
        {
            error!(assignment = %assignment.id.0, %err, "failed to mark assignment failed");
        }

        let response_type = match assignment.connection_type {
            ConnectionType::Api => ResponseType::ApiAuto,
            ConnectionType::Manual => ResponseType::Manual,
        };
        let failure = InstitutionResponse::failure(
            self.response_context(assignment),
            response_type,
            reason,
        );
        if let Err(err) = self.upsert_response(failure) {
            error!(assignment = %assignment.id.0, %err, "failed to persist failure verdict");
        }

        if let Err(err) = self
            .verifications
            .update_status(&assignment.verification_id, VerificationStatus::Failed)
        {
            error!(verification = %assignment.verification_id.0, %err, "failed to mark verification failed");
        }
    }
}
