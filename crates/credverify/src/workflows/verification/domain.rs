use std::collections::BTreeSet;
use std::fmt;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Identifier wrapper for verification requests.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct VerificationId(pub String);

/// Identifier wrapper for routing assignments.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AssignmentId(pub String);

/// Identifier wrapper for issuing institutions.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InstitutionId(pub String);

/// Identifier wrapper for bulk submission batches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchId(pub String);

/// Identifier for platform users: reviewers, admins, and bulk submitters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UserId(pub String);

impl fmt::Display for VerificationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for AssignmentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for InstitutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for BatchId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for UserId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Lifecycle of a verification request as exposed to dashboards and
/// notification senders. Mutated only through the processing services.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VerificationStatus {
    Pending,
    PendingAssignment,
    Processing,
    RequiresReview,
    UnderReview,
    Completed,
    Failed,
}

impl VerificationStatus {
    pub const fn label(self) -> &'static str {
        match self {
            VerificationStatus::Pending => "pending",
            VerificationStatus::PendingAssignment => "pending_assignment",
            VerificationStatus::Processing => "processing",
            VerificationStatus::RequiresReview => "requires_review",
            VerificationStatus::UnderReview => "under_review",
            VerificationStatus::Completed => "completed",
            VerificationStatus::Failed => "failed",
        }
    }
}

/// Applicant-submitted fields the institution record is reconciled against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CandidateSubmission {
    pub first_name: String,
    pub last_name: String,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub course_name: Option<String>,
    #[serde(default)]
    pub degree_type: Option<String>,
    #[serde(default)]
    pub classification: Option<String>,
    #[serde(default)]
    pub graduation_year: Option<i32>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
}

/// A credential verification request. Owned by the surrounding application;
/// this core only advances its `status`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VerificationRequest {
    pub id: VerificationId,
    pub institution_id: InstitutionId,
    pub submission: CandidateSubmission,
    pub status: VerificationStatus,
    pub submitted_at: DateTime<Utc>,
}

/// Routing urgency attached to an assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    Low,
    Medium,
    High,
    Urgent,
}

impl Priority {
    pub const fn label(self) -> &'static str {
        match self {
            Priority::Low => "low",
            Priority::Medium => "medium",
            Priority::High => "high",
            Priority::Urgent => "urgent",
        }
    }
}

/// Which path the assignment routes the verification down.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionType {
    Api,
    Manual,
}

impl ConnectionType {
    pub const fn label(self) -> &'static str {
        match self {
            ConnectionType::Api => "api",
            ConnectionType::Manual => "manual",
        }
    }
}

/// Assignment lifecycle. `pending -> processing -> {completed | failed}`;
/// terminal states never transition again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl AssignmentStatus {
    pub const fn label(self) -> &'static str {
        match self {
            AssignmentStatus::Pending => "pending",
            AssignmentStatus::Processing => "processing",
            AssignmentStatus::Completed => "completed",
            AssignmentStatus::Failed => "failed",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, AssignmentStatus::Completed | AssignmentStatus::Failed)
    }
}

impl fmt::Display for AssignmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// One unit of routing work binding a verification request to a reviewer
/// and an institution. Kept forever as audit trail.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub id: AssignmentId,
    pub verification_id: VerificationId,
    pub assignee_id: UserId,
    pub assigned_by: UserId,
    pub assigned_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<DateTime<Utc>>,
    pub priority: Priority,
    pub connection_type: ConnectionType,
    pub institution_id: InstitutionId,
    pub status: AssignmentStatus,
}

impl Assignment {
    /// Derived read: a due date exists and has passed.
    pub fn is_overdue(&self, now: DateTime<Utc>) -> bool {
        match self.due_date {
            Some(due) => due < now,
            None => false,
        }
    }
}

/// Structured student data returned by an institution, normalized into the
/// common comparison model regardless of wire format.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstitutionRecord {
    #[serde(default)]
    pub first_name: Option<String>,
    #[serde(default)]
    pub last_name: Option<String>,
    #[serde(default)]
    pub student_id: Option<String>,
    #[serde(default)]
    pub course_name: Option<String>,
    #[serde(default)]
    pub degree_type: Option<String>,
    #[serde(default)]
    pub classification: Option<String>,
    #[serde(default)]
    pub graduation_year: Option<i32>,
    #[serde(default)]
    pub date_of_birth: Option<NaiveDate>,
    /// Institution-reported verification outcome. Its absence marks the
    /// parsed result as incomplete.
    #[serde(default)]
    pub verification_status: Option<String>,
}

impl InstitutionRecord {
    pub fn is_complete(&self) -> bool {
        self.verification_status.is_some()
    }
}

/// Verdict lifecycle for an institution response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseStatus {
    Pending,
    Processing,
    Completed,
    Failed,
    RequiresReview,
    Discrepancy,
}

impl ResponseStatus {
    pub const fn label(self) -> &'static str {
        match self {
            ResponseStatus::Pending => "pending",
            ResponseStatus::Processing => "processing",
            ResponseStatus::Completed => "completed",
            ResponseStatus::Failed => "failed",
            ResponseStatus::RequiresReview => "requires_review",
            ResponseStatus::Discrepancy => "discrepancy",
        }
    }
}

/// How the verdict was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseType {
    Manual,
    ApiAuto,
    ApiManual,
}

/// Tag naming a specific field mismatch between submitted and
/// institution-returned data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiscrepancyFlag {
    NameMismatch,
    IdMismatch,
    DobMismatch,
    CourseMismatch,
    YearMismatch,
}

impl DiscrepancyFlag {
    pub const fn label(self) -> &'static str {
        match self {
            DiscrepancyFlag::NameMismatch => "name_mismatch",
            DiscrepancyFlag::IdMismatch => "id_mismatch",
            DiscrepancyFlag::DobMismatch => "dob_mismatch",
            DiscrepancyFlag::CourseMismatch => "course_mismatch",
            DiscrepancyFlag::YearMismatch => "year_mismatch",
        }
    }
}

/// The persisted verdict for one verification request. At most one exists
/// per verification; `status` and `is_verified` are derived at construction
/// and never independently settable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstitutionResponse {
    pub id: String,
    pub verification_id: VerificationId,
    pub institution_id: InstitutionId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_data: Option<InstitutionRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_response: Option<serde_json::Value>,
    pub status: ResponseStatus,
    pub response_type: ResponseType,
    pub verification_score: u8,
    pub confidence_score: u8,
    pub data_quality_score: u8,
    pub completeness_score: u8,
    pub timeliness_score: u8,
    pub flags: BTreeSet<DiscrepancyFlag>,
    pub is_verified: bool,
    pub processed_by: UserId,
    pub processed_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cost_cents: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub currency: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

/// Per-record line in a bulk batch's result log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkRecordOutcome {
    pub index: usize,
    pub institution_name: String,
    pub student_name: String,
    pub status: BulkRecordStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub recorded_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BulkRecordStatus {
    Verified,
    Failed,
}

impl BulkRecordStatus {
    pub const fn label(self) -> &'static str {
        match self {
            BulkRecordStatus::Verified => "verified",
            BulkRecordStatus::Failed => "failed",
        }
    }
}

/// Overall state of a bulk submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BatchStatus {
    Processing,
    Completed,
    Failed,
}

impl BatchStatus {
    pub const fn label(self) -> &'static str {
        match self {
            BatchStatus::Processing => "processing",
            BatchStatus::Completed => "completed",
            BatchStatus::Failed => "failed",
        }
    }
}

/// Parent record for a bulk submission. `processed_count` only moves
/// forward; the batch is terminal once every record was attempted or the
/// orchestration itself failed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BulkBatch {
    pub id: BatchId,
    pub submitted_by: UserId,
    pub file_key: String,
    pub total_records: usize,
    pub processed_count: usize,
    pub success_count: usize,
    pub failed_count: usize,
    pub results: Vec<BulkRecordOutcome>,
    pub status: BatchStatus,
    pub created_at: DateTime<Utc>,
}

impl BulkBatch {
    pub fn is_terminal(&self) -> bool {
        !matches!(self.status, BatchStatus::Processing)
    }
}
