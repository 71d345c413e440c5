use super::domain::{VerificationId, VerificationRequest, VerificationStatus};

/// Error enumeration for record-store failures.
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("record already exists")]
    Conflict,
    #[error("record not found")]
    NotFound,
    #[error("record store unavailable: {0}")]
    Unavailable(String),
}

/// Storage abstraction over the durable verification-request store. The
/// surrounding application owns these records; this core only reads them and
/// advances their status.
pub trait VerificationRequestRepository: Send + Sync {
    fn create(&self, request: VerificationRequest) -> Result<VerificationRequest, RepositoryError>;
    fn fetch(&self, id: &VerificationId) -> Result<Option<VerificationRequest>, RepositoryError>;
    fn update_status(
        &self,
        id: &VerificationId,
        status: VerificationStatus,
    ) -> Result<(), RepositoryError>;
}
