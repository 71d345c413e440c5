//! Assignment tracker: owns the lifecycle of a single unit of routing work.
//!
//! The `claim` operation is the mutual-exclusion point guaranteeing
//! at-most-one active worker per assignment. Implementations must perform it
//! as one atomic conditional update (transition only if the current status
//! still equals `expected` and the caller is the recorded assignee), never as
//! a read followed by a write.

use super::domain::{Assignment, AssignmentId, AssignmentStatus, UserId, VerificationId};
use super::repository::RepositoryError;

/// Storage abstraction for assignments. Assignments are never deleted; they
/// remain queryable as audit trail after reaching a terminal status.
pub trait AssignmentRepository: Send + Sync {
    /// Persists a new assignment. Rejects with `Conflict` when the
    /// verification already has a non-terminal assignment.
    fn create(&self, assignment: Assignment) -> Result<Assignment, RepositoryError>;

    fn fetch(&self, id: &AssignmentId) -> Result<Option<Assignment>, RepositoryError>;

    fn find_by_assignee(&self, assignee: &UserId) -> Result<Vec<Assignment>, RepositoryError>;

    fn find_by_assignee_and_status(
        &self,
        assignee: &UserId,
        status: AssignmentStatus,
    ) -> Result<Vec<Assignment>, RepositoryError>;

    fn find_by_verification(
        &self,
        verification_id: &VerificationId,
    ) -> Result<Option<Assignment>, RepositoryError>;

    /// Unconditional status write. Reserved for paths that already hold the
    /// claim (complete/fail) and for reverting a claim after a
    /// configuration failure.
    fn update_status(
        &self,
        id: &AssignmentId,
        status: AssignmentStatus,
    ) -> Result<(), RepositoryError>;

    /// Atomic compare-and-swap transition: succeeds only when the assignment
    /// exists, `assignee` is its recorded owner, and its status still equals
    /// `expected`. Returns the updated assignment.
    fn claim(
        &self,
        id: &AssignmentId,
        assignee: &UserId,
        expected: AssignmentStatus,
        next: AssignmentStatus,
    ) -> Result<Assignment, AssignmentError>;
}

/// Ownership/state violations around assignment transitions. Always
/// rejected, never retried automatically.
#[derive(Debug, thiserror::Error)]
pub enum AssignmentError {
    #[error("assignment {0} not found")]
    NotFound(AssignmentId),
    #[error("assignment {assignment} is not owned by {assignee}")]
    NotOwner {
        assignment: AssignmentId,
        assignee: UserId,
    },
    #[error("assignment {assignment} is {actual}, expected {expected}")]
    InvalidState {
        assignment: AssignmentId,
        expected: AssignmentStatus,
        actual: AssignmentStatus,
    },
    #[error(transparent)]
    Repository(#[from] RepositoryError),
}
