//! Batch processor: fans a bulk submission out into per-record verification
//! attempts, tracking outcomes and aggregate counters on the parent batch.
//!
//! Acceptance (affordability check, upload, batch creation) happens inside
//! the caller's request; the record loop runs fire-and-forget afterwards.
//! Per-record failures land in the result log and never abort sibling
//! records; only an orchestration failure (the batch store itself erroring)
//! drives the batch to `failed`.

mod intake;

pub use intake::{parse_rows, BulkRow, IntakeError};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::Utc;
use serde::Deserialize;
use tracing::{error, info};

use super::domain::{
    BatchId, BatchStatus, BulkBatch, BulkRecordOutcome, BulkRecordStatus, CandidateSubmission,
    UserId, VerificationId, VerificationRequest, VerificationStatus,
};
use super::institutions::{DirectoryError, Institution, InstitutionDirectory};
use super::repository::{RepositoryError, VerificationRequestRepository};

/// Confidence at or above which a bulk record counts as verified.
pub const BULK_CONFIDENCE_THRESHOLD: f32 = 0.85;

static BATCH_SEQUENCE: AtomicU64 = AtomicU64::new(1);

fn next_batch_id() -> BatchId {
    let id = BATCH_SEQUENCE.fetch_add(1, Ordering::Relaxed);
    BatchId(format!("batch-{id:06}"))
}

/// Storage abstraction for bulk batches. `record_outcome` must append the
/// entry, bump the matching counter, and advance `processed_count` as one
/// update; `processed_count` only ever moves forward.
pub trait BatchRepository: Send + Sync {
    fn create(&self, batch: BulkBatch) -> Result<BulkBatch, RepositoryError>;
    fn fetch(&self, id: &BatchId) -> Result<Option<BulkBatch>, RepositoryError>;
    fn record_outcome(
        &self,
        id: &BatchId,
        outcome: BulkRecordOutcome,
    ) -> Result<(), RepositoryError>;
    fn finalize(&self, id: &BatchId, status: BatchStatus) -> Result<(), RepositoryError>;
}

/// Affordability collaborator. Wallet bookkeeping lives elsewhere; the batch
/// processor only refuses submissions the caller cannot fund.
pub trait BillingGateway: Send + Sync {
    fn ensure_funds(&self, user: &UserId, amount_cents: u64) -> Result<(), BillingError>;
}

#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    #[error("insufficient funds: {required_cents} cents required")]
    InsufficientFunds { required_cents: u64 },
    #[error("billing gateway unavailable: {0}")]
    Unavailable(String),
}

/// Durable home for the uploaded bulk file; returns the storage key kept on
/// the batch record.
pub trait UploadStore: Send + Sync {
    fn store(&self, file_name: &str, contents: &[u8]) -> Result<String, UploadError>;
}

#[derive(Debug, thiserror::Error)]
pub enum UploadError {
    #[error("upload store failed: {0}")]
    Store(String),
}

/// Opaque document-analysis oracle consulted per bulk record. Its internals
/// (OCR, authenticity models) are out of scope; only the confidence it
/// reports matters here.
pub trait VerificationOracle: Send + Sync {
    fn assess(
        &self,
        submission: &CandidateSubmission,
        institution: &Institution,
    ) -> Result<OracleAssessment, OracleError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct OracleAssessment {
    /// Confidence in [0, 1].
    pub confidence: f32,
}

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("verification oracle failed: {0}")]
    Unavailable(String),
}

/// Metadata accompanying a bulk upload.
#[derive(Debug, Clone, Deserialize)]
pub struct BulkSubmission {
    pub submitted_by: UserId,
    pub file_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum BatchError {
    #[error(transparent)]
    Intake(#[from] IntakeError),
    #[error(transparent)]
    Billing(#[from] BillingError),
    #[error(transparent)]
    Upload(#[from] UploadError),
    #[error(transparent)]
    Repository(#[from] RepositoryError),
    #[error("batch {0} not found")]
    NotFound(BatchId),
}

/// Service orchestrating bulk submissions end to end.
pub struct BulkVerificationService<B, V> {
    batches: Arc<B>,
    verifications: Arc<V>,
    directory: Arc<dyn InstitutionDirectory>,
    billing: Arc<dyn BillingGateway>,
    uploads: Arc<dyn UploadStore>,
    oracle: Arc<dyn VerificationOracle>,
    unit_fee_cents: u32,
}

impl<B, V> Clone for BulkVerificationService<B, V> {
    fn clone(&self) -> Self {
        Self {
            batches: Arc::clone(&self.batches),
            verifications: Arc::clone(&self.verifications),
            directory: Arc::clone(&self.directory),
            billing: Arc::clone(&self.billing),
            uploads: Arc::clone(&self.uploads),
            oracle: Arc::clone(&self.oracle),
            unit_fee_cents: self.unit_fee_cents,
        }
    }
}

impl<B, V> BulkVerificationService<B, V>
where
    B: BatchRepository + 'static,
    V: VerificationRequestRepository + 'static,
{
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        batches: Arc<B>,
        verifications: Arc<V>,
        directory: Arc<dyn InstitutionDirectory>,
        billing: Arc<dyn BillingGateway>,
        uploads: Arc<dyn UploadStore>,
        oracle: Arc<dyn VerificationOracle>,
        unit_fee_cents: u32,
    ) -> Self {
        Self {
            batches,
            verifications,
            directory,
            billing,
            uploads,
            oracle,
            unit_fee_cents,
        }
    }

    /// Validates and registers a bulk submission without running it:
    /// affordability first, then the upload, then the batch record in
    /// `processing`. Returns the stored batch and the parsed rows.
    pub fn accept(
        &self,
        submission: BulkSubmission,
        file: &[u8],
    ) -> Result<(BulkBatch, Vec<BulkRow>), BatchError> {
        let rows = parse_rows(file)?;

        let required = rows.len() as u64 * u64::from(self.unit_fee_cents);
        self.billing
            .ensure_funds(&submission.submitted_by, required)?;

        let file_key = self.uploads.store(&submission.file_name, file)?;

        let batch = BulkBatch {
            id: next_batch_id(),
            submitted_by: submission.submitted_by,
            file_key,
            total_records: rows.len(),
            processed_count: 0,
            success_count: 0,
            failed_count: 0,
            results: Vec::new(),
            status: BatchStatus::Processing,
            created_at: Utc::now(),
        };
        let stored = self.batches.create(batch)?;

        Ok((stored, rows))
    }

    /// Fire-and-forget entry point: returns the batch id as soon as the
    /// batch record exists; the record loop proceeds independently of the
    /// caller's request cycle.
    pub fn submit(&self, submission: BulkSubmission, file: &[u8]) -> Result<BatchId, BatchError> {
        let (batch, rows) = self.accept(submission, file)?;
        let batch_id = batch.id.clone();

        let service = self.clone();
        let spawned_id = batch_id.clone();
        tokio::spawn(async move {
            if let Err(err) = service.drive(&spawned_id, rows).await {
                error!(batch = %spawned_id.0, %err, "bulk verification batch aborted");
            }
        });

        Ok(batch_id)
    }

    /// Runs the record loop to completion. Public so callers that need a
    /// deterministic end (the demo, tests, a reconciliation watchdog
    /// re-driving a stuck batch) can await it directly. Records already
    /// counted in `processed_count` are skipped, so re-driving after a
    /// restart resumes instead of double-processing.
    pub async fn drive(&self, batch_id: &BatchId, rows: Vec<BulkRow>) -> Result<(), BatchError> {
        let batch = self
            .batches
            .fetch(batch_id)?
            .ok_or_else(|| BatchError::NotFound(batch_id.clone()))?;
        if batch.is_terminal() {
            return Ok(());
        }

        for (index, row) in rows.iter().enumerate().skip(batch.processed_count) {
            let outcome = self.process_record(batch_id, index, row);

            if let Err(err) = self.batches.record_outcome(batch_id, outcome) {
                // Orchestration failure: the batch store itself is broken.
                // Unlike a per-record failure this aborts the batch.
                if let Err(finalize_err) = self.batches.finalize(batch_id, BatchStatus::Failed) {
                    error!(batch = %batch_id.0, %finalize_err, "failed to mark aborted batch");
                }
                return Err(BatchError::Repository(err));
            }
        }

        self.batches.finalize(batch_id, BatchStatus::Completed)?;
        info!(batch = %batch_id.0, records = rows.len(), "bulk verification batch completed");
        Ok(())
    }

    /// Eventually-consistent progress view for dashboards.
    pub fn progress(&self, batch_id: &BatchId) -> Result<BulkBatch, BatchError> {
        self.batches
            .fetch(batch_id)?
            .ok_or_else(|| BatchError::NotFound(batch_id.clone()))
    }

    fn process_record(&self, batch_id: &BatchId, index: usize, row: &BulkRow) -> BulkRecordOutcome {
        match self.verify_record(batch_id, index, row) {
            Ok(confidence) if confidence >= BULK_CONFIDENCE_THRESHOLD => BulkRecordOutcome {
                index,
                institution_name: row.institution_name.clone(),
                student_name: row.student_name(),
                status: BulkRecordStatus::Verified,
                confidence: Some(confidence),
                error: None,
                recorded_at: Utc::now(),
            },
            Ok(confidence) => BulkRecordOutcome {
                index,
                institution_name: row.institution_name.clone(),
                student_name: row.student_name(),
                status: BulkRecordStatus::Failed,
                confidence: Some(confidence),
                error: Some(format!(
                    "confidence {confidence:.2} below threshold {BULK_CONFIDENCE_THRESHOLD}"
                )),
                recorded_at: Utc::now(),
            },
            Err(reason) => BulkRecordOutcome {
                index,
                institution_name: row.institution_name.clone(),
                student_name: row.student_name(),
                status: BulkRecordStatus::Failed,
                confidence: None,
                error: Some(reason),
                recorded_at: Utc::now(),
            },
        }
    }

    /// One record attempt: resolve the institution, spawn the verification
    /// request, consult the oracle. Any error is reported as a string so it
    /// can be logged on the batch without aborting siblings.
    fn verify_record(
        &self,
        batch_id: &BatchId,
        index: usize,
        row: &BulkRow,
    ) -> Result<f32, String> {
        let institution = self
            .directory
            .find_by_name(&row.institution_name)
            .map_err(|err: DirectoryError| err.to_string())?
            .ok_or_else(|| format!("institution '{}' not found", row.institution_name))?;

        let verification = VerificationRequest {
            id: VerificationId(format!("{}-rec-{:03}", batch_id.0, index + 1)),
            institution_id: institution.id.clone(),
            submission: row.submission(),
            status: VerificationStatus::Processing,
            submitted_at: Utc::now(),
        };
        let verification = self
            .verifications
            .create(verification)
            .map_err(|err: RepositoryError| err.to_string())?;

        let assessment = match self.oracle.assess(&verification.submission, &institution) {
            Ok(assessment) => assessment,
            Err(err) => {
                self.settle_record(&verification.id, VerificationStatus::Failed);
                return Err(err.to_string());
            }
        };

        let status = if assessment.confidence >= BULK_CONFIDENCE_THRESHOLD {
            VerificationStatus::Completed
        } else {
            VerificationStatus::RequiresReview
        };
        self.settle_record(&verification.id, status);

        Ok(assessment.confidence)
    }

    fn settle_record(&self, verification_id: &VerificationId, status: VerificationStatus) {
        if let Err(err) = self.verifications.update_status(verification_id, status) {
            error!(verification = %verification_id.0, %err, "failed to settle bulk record status");
        }
    }
}
