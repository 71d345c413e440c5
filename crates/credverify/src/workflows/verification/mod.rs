//! Credential verification routing, reconciliation, and scoring.
//!
//! A verification request enters this core when it is routed to a reviewer
//! (an [`Assignment`](domain::Assignment)), travels down the API or manual
//! path, and leaves as an [`InstitutionResponse`](domain::InstitutionResponse)
//! verdict plus a status update on the request itself. Bulk submissions fan
//! out into per-record attempts tracked on a parent batch.

pub mod assignment;
pub mod batch;
pub mod client;
pub mod domain;
pub mod institutions;
pub mod processor;
pub mod repository;
pub mod response;
pub mod router;
pub mod scoring;

#[cfg(test)]
mod tests;

pub use assignment::{AssignmentError, AssignmentRepository};
pub use batch::{
    BatchError, BatchRepository, BillingError, BillingGateway, BulkRow, BulkSubmission,
    BulkVerificationService, IntakeError, OracleAssessment, OracleError, UploadError, UploadStore,
    VerificationOracle, BULK_CONFIDENCE_THRESHOLD,
};
pub use client::{
    CallOutcome, ClientError, ClientEvent, ClientObserver, ExternalVerificationClient,
    HttpVerificationTransport, RetryPolicy, TracingObserver, VerificationTransport,
};
pub use domain::{
    Assignment, AssignmentId, AssignmentStatus, BatchId, BatchStatus, BulkBatch,
    BulkRecordOutcome, BulkRecordStatus, CandidateSubmission, ConnectionType, DiscrepancyFlag,
    InstitutionId, InstitutionRecord, InstitutionResponse, Priority, ResponseStatus, ResponseType,
    UserId, VerificationId, VerificationRequest, VerificationStatus,
};
pub use institutions::{
    ApiEndpointConfig, DirectoryError, Institution, InstitutionDirectory, ResponseFormat,
    VerificationPayload,
};
pub use processor::{ManualVerdict, NewAssignment, ProcessingError, ProcessingService};
pub use repository::{RepositoryError, VerificationRequestRepository};
pub use response::{ResponseContext, ResponseRepository};
pub use router::{verification_router, VerificationState};
pub use scoring::{MatchReport, ScoringEngine, VERIFIED_THRESHOLD};
