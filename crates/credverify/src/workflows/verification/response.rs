//! Institution response store: owns the lifecycle of the verdict record.
//!
//! The store enforces the one-response-per-verification invariant as a last
//! line of defense even though processors check `find_by_verification`
//! before writing. `status` and `is_verified` are derived at construction;
//! the constructors below are the only way this crate builds a verdict.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};

use super::domain::{
    DiscrepancyFlag, InstitutionId, InstitutionRecord, InstitutionResponse, ResponseStatus,
    ResponseType, UserId, VerificationId,
};
use super::repository::RepositoryError;
use super::scoring::{confidence_for, status_for_score, MatchReport, VERIFIED_THRESHOLD};

/// Storage abstraction for institution responses.
pub trait ResponseRepository: Send + Sync {
    /// Persists a new verdict. Must reject with `Conflict` when the
    /// verification already has one.
    fn create(
        &self,
        response: InstitutionResponse,
    ) -> Result<InstitutionResponse, RepositoryError>;

    /// At most one result, by the uniqueness invariant.
    fn find_by_verification(
        &self,
        verification_id: &VerificationId,
    ) -> Result<Option<InstitutionResponse>, RepositoryError>;

    fn update(&self, response: InstitutionResponse) -> Result<(), RepositoryError>;

    fn find_by_status(
        &self,
        status: ResponseStatus,
    ) -> Result<Vec<InstitutionResponse>, RepositoryError>;
}

/// Identity and audit fields shared by every verdict constructor.
#[derive(Debug, Clone)]
pub struct ResponseContext {
    pub id: String,
    pub verification_id: VerificationId,
    pub institution_id: InstitutionId,
    pub processed_by: UserId,
    pub processed_at: DateTime<Utc>,
}

impl InstitutionResponse {
    /// Verdict for a scored API result. An incomplete institution record
    /// (no verification-status indicator) can never band to `completed`;
    /// it lands in `requires_review` instead.
    pub fn from_report(
        ctx: ResponseContext,
        report: &MatchReport,
        record: InstitutionRecord,
        raw_response: Option<serde_json::Value>,
        request_id: Option<String>,
        response_type: ResponseType,
    ) -> Self {
        let mut status = status_for_score(report.verification_score);
        if !record.is_complete() && status == ResponseStatus::Completed {
            status = ResponseStatus::RequiresReview;
        }

        Self {
            id: ctx.id,
            verification_id: ctx.verification_id,
            institution_id: ctx.institution_id,
            request_id,
            response_data: Some(record),
            raw_response,
            status,
            response_type,
            verification_score: report.verification_score,
            confidence_score: report.confidence_score,
            data_quality_score: report.data_quality_score,
            completeness_score: report.completeness_score,
            timeliness_score: report.timeliness_score,
            flags: report.flags.clone(),
            is_verified: report.is_verified(),
            processed_by: ctx.processed_by,
            processed_at: ctx.processed_at,
            cost_cents: None,
            currency: None,
            notes: None,
        }
    }

    /// Verdict entered by a human reviewer. The supplied scores are trusted
    /// as-is; only the derived fields are computed here.
    pub fn manual(
        ctx: ResponseContext,
        verification_score: u8,
        confidence_score: Option<u8>,
        flags: BTreeSet<DiscrepancyFlag>,
        notes: Option<String>,
    ) -> Self {
        Self {
            id: ctx.id,
            verification_id: ctx.verification_id,
            institution_id: ctx.institution_id,
            request_id: None,
            response_data: None,
            raw_response: None,
            status: status_for_score(verification_score),
            response_type: ResponseType::Manual,
            verification_score,
            confidence_score: confidence_score.unwrap_or_else(|| confidence_for(verification_score)),
            data_quality_score: 0,
            completeness_score: 0,
            timeliness_score: 100,
            flags,
            is_verified: verification_score >= VERIFIED_THRESHOLD,
            processed_by: ctx.processed_by,
            processed_at: ctx.processed_at,
            cost_cents: None,
            currency: None,
            notes,
        }
    }

    /// Compensating verdict persisted when processing fails, so the failed
    /// work item stays auditable and re-actionable.
    pub fn failure(ctx: ResponseContext, response_type: ResponseType, error: &str) -> Self {
        Self {
            id: ctx.id,
            verification_id: ctx.verification_id,
            institution_id: ctx.institution_id,
            request_id: None,
            response_data: None,
            raw_response: None,
            status: ResponseStatus::Failed,
            response_type,
            verification_score: 0,
            confidence_score: 0,
            data_quality_score: 0,
            completeness_score: 0,
            timeliness_score: 0,
            flags: BTreeSet::new(),
            is_verified: false,
            processed_by: ctx.processed_by,
            processed_at: ctx.processed_at,
            cost_cents: None,
            currency: None,
            notes: Some(error.to_string()),
        }
    }
}
