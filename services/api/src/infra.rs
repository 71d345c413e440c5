//! In-memory infrastructure standing in for the durable record store and the
//! external collaborators while the platform's storage services are wired up
//! separately.

use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::Utc;
use metrics_exporter_prometheus::PrometheusHandle;

use credverify::workflows::verification::{
    ApiEndpointConfig, Assignment, AssignmentError, AssignmentId, AssignmentRepository,
    AssignmentStatus, BatchId, BatchRepository, BatchStatus, BillingError, BillingGateway,
    BulkBatch, BulkRecordOutcome, BulkRecordStatus, CallOutcome, CandidateSubmission,
    DirectoryError, Institution, InstitutionDirectory, InstitutionId, InstitutionResponse,
    OracleAssessment, OracleError, RepositoryError, ResponseFormat, ResponseRepository,
    ResponseStatus, UploadError, UploadStore, UserId, VerificationId, VerificationOracle,
    VerificationPayload, VerificationRequest, VerificationRequestRepository, VerificationStatus,
    VerificationTransport,
};

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) readiness: Arc<AtomicBool>,
    pub(crate) metrics: Arc<PrometheusHandle>,
}

#[derive(Default)]
pub(crate) struct InMemoryVerifications {
    records: Mutex<HashMap<VerificationId, VerificationRequest>>,
}

impl InMemoryVerifications {
    pub(crate) fn seed(&self, request: VerificationRequest) {
        self.records
            .lock()
            .expect("verification mutex poisoned")
            .insert(request.id.clone(), request);
    }
}

impl VerificationRequestRepository for InMemoryVerifications {
    fn create(&self, request: VerificationRequest) -> Result<VerificationRequest, RepositoryError> {
        let mut guard = self.records.lock().expect("verification mutex poisoned");
        if guard.contains_key(&request.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(request.id.clone(), request.clone());
        Ok(request)
    }

    fn fetch(&self, id: &VerificationId) -> Result<Option<VerificationRequest>, RepositoryError> {
        let guard = self.records.lock().expect("verification mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn update_status(
        &self,
        id: &VerificationId,
        status: VerificationStatus,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("verification mutex poisoned");
        let request = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        request.status = status;
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct InMemoryAssignments {
    records: Mutex<HashMap<AssignmentId, Assignment>>,
}

impl AssignmentRepository for InMemoryAssignments {
    fn create(&self, assignment: Assignment) -> Result<Assignment, RepositoryError> {
        let mut guard = self.records.lock().expect("assignment mutex poisoned");
        let duplicate = guard.values().any(|existing| {
            existing.verification_id == assignment.verification_id
                && !existing.status.is_terminal()
        });
        if duplicate || guard.contains_key(&assignment.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(assignment.id.clone(), assignment.clone());
        Ok(assignment)
    }

    fn fetch(&self, id: &AssignmentId) -> Result<Option<Assignment>, RepositoryError> {
        let guard = self.records.lock().expect("assignment mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn find_by_assignee(&self, assignee: &UserId) -> Result<Vec<Assignment>, RepositoryError> {
        let guard = self.records.lock().expect("assignment mutex poisoned");
        Ok(guard
            .values()
            .filter(|assignment| &assignment.assignee_id == assignee)
            .cloned()
            .collect())
    }

    fn find_by_assignee_and_status(
        &self,
        assignee: &UserId,
        status: AssignmentStatus,
    ) -> Result<Vec<Assignment>, RepositoryError> {
        Ok(self
            .find_by_assignee(assignee)?
            .into_iter()
            .filter(|assignment| assignment.status == status)
            .collect())
    }

    fn find_by_verification(
        &self,
        verification_id: &VerificationId,
    ) -> Result<Option<Assignment>, RepositoryError> {
        let guard = self.records.lock().expect("assignment mutex poisoned");
        Ok(guard
            .values()
            .find(|assignment| &assignment.verification_id == verification_id)
            .cloned())
    }

    fn update_status(
        &self,
        id: &AssignmentId,
        status: AssignmentStatus,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("assignment mutex poisoned");
        let assignment = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        assignment.status = status;
        Ok(())
    }

    fn claim(
        &self,
        id: &AssignmentId,
        assignee: &UserId,
        expected: AssignmentStatus,
        next: AssignmentStatus,
    ) -> Result<Assignment, AssignmentError> {
        // Compare and swap under one lock so no two workers can both win.
        let mut guard = self.records.lock().expect("assignment mutex poisoned");
        let assignment = guard
            .get_mut(id)
            .ok_or_else(|| AssignmentError::NotFound(id.clone()))?;
        if &assignment.assignee_id != assignee {
            return Err(AssignmentError::NotOwner {
                assignment: id.clone(),
                assignee: assignee.clone(),
            });
        }
        if assignment.status != expected {
            return Err(AssignmentError::InvalidState {
                assignment: id.clone(),
                expected,
                actual: assignment.status,
            });
        }
        assignment.status = next;
        Ok(assignment.clone())
    }
}

#[derive(Default)]
pub(crate) struct InMemoryResponses {
    records: Mutex<HashMap<VerificationId, InstitutionResponse>>,
}

impl ResponseRepository for InMemoryResponses {
    fn create(
        &self,
        response: InstitutionResponse,
    ) -> Result<InstitutionResponse, RepositoryError> {
        let mut guard = self.records.lock().expect("response mutex poisoned");
        if guard.contains_key(&response.verification_id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(response.verification_id.clone(), response.clone());
        Ok(response)
    }

    fn find_by_verification(
        &self,
        verification_id: &VerificationId,
    ) -> Result<Option<InstitutionResponse>, RepositoryError> {
        let guard = self.records.lock().expect("response mutex poisoned");
        Ok(guard.get(verification_id).cloned())
    }

    fn update(&self, response: InstitutionResponse) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("response mutex poisoned");
        if !guard.contains_key(&response.verification_id) {
            return Err(RepositoryError::NotFound);
        }
        guard.insert(response.verification_id.clone(), response);
        Ok(())
    }

    fn find_by_status(
        &self,
        status: ResponseStatus,
    ) -> Result<Vec<InstitutionResponse>, RepositoryError> {
        let guard = self.records.lock().expect("response mutex poisoned");
        Ok(guard
            .values()
            .filter(|response| response.status == status)
            .cloned()
            .collect())
    }
}

#[derive(Default)]
pub(crate) struct InMemoryBatches {
    records: Mutex<HashMap<BatchId, BulkBatch>>,
}

impl BatchRepository for InMemoryBatches {
    fn create(&self, batch: BulkBatch) -> Result<BulkBatch, RepositoryError> {
        let mut guard = self.records.lock().expect("batch mutex poisoned");
        if guard.contains_key(&batch.id) {
            return Err(RepositoryError::Conflict);
        }
        guard.insert(batch.id.clone(), batch.clone());
        Ok(batch)
    }

    fn fetch(&self, id: &BatchId) -> Result<Option<BulkBatch>, RepositoryError> {
        let guard = self.records.lock().expect("batch mutex poisoned");
        Ok(guard.get(id).cloned())
    }

    fn record_outcome(
        &self,
        id: &BatchId,
        outcome: BulkRecordOutcome,
    ) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("batch mutex poisoned");
        let batch = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        match outcome.status {
            BulkRecordStatus::Verified => batch.success_count += 1,
            BulkRecordStatus::Failed => batch.failed_count += 1,
        }
        batch.processed_count += 1;
        batch.results.push(outcome);
        Ok(())
    }

    fn finalize(&self, id: &BatchId, status: BatchStatus) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("batch mutex poisoned");
        let batch = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        batch.status = status;
        Ok(())
    }
}

/// Directory seeded from a static roster until institution onboarding lands.
pub(crate) struct SeededDirectory {
    institutions: Vec<Institution>,
    configs: HashMap<InstitutionId, ApiEndpointConfig>,
}

impl SeededDirectory {
    pub(crate) fn standard(default_timeout: Duration) -> Self {
        let acme = Institution {
            id: InstitutionId("inst-acme".to_string()),
            name: "Acme University".to_string(),
        };
        let state = Institution {
            id: InstitutionId("inst-state".to_string()),
            name: "State Polytechnic".to_string(),
        };
        // State Polytechnic has no API integration yet; its verifications
        // must go down the manual path.
        let mut configs = HashMap::new();
        configs.insert(
            acme.id.clone(),
            ApiEndpointConfig {
                endpoint_url: "https://registry.acme.edu/api/v2/verify".to_string(),
                auth_headers: vec![("x-api-key".to_string(), "demo-key".to_string())],
                response_format: ResponseFormat::Json,
                timeout: Some(default_timeout),
            },
        );

        Self {
            institutions: vec![acme, state],
            configs,
        }
    }
}

impl InstitutionDirectory for SeededDirectory {
    fn find_by_id(&self, id: &InstitutionId) -> Result<Option<Institution>, DirectoryError> {
        Ok(self
            .institutions
            .iter()
            .find(|institution| &institution.id == id)
            .cloned())
    }

    fn find_by_name(&self, name: &str) -> Result<Option<Institution>, DirectoryError> {
        Ok(self
            .institutions
            .iter()
            .find(|institution| institution.name.eq_ignore_ascii_case(name.trim()))
            .cloned())
    }

    fn api_config(&self, id: &InstitutionId) -> Result<Option<ApiEndpointConfig>, DirectoryError> {
        Ok(self.configs.get(id).cloned())
    }
}

/// Billing stand-in approving everything below a generous ceiling.
pub(crate) struct PrepaidBilling {
    pub(crate) ceiling_cents: u64,
}

impl BillingGateway for PrepaidBilling {
    fn ensure_funds(&self, _user: &UserId, amount_cents: u64) -> Result<(), BillingError> {
        if amount_cents > self.ceiling_cents {
            return Err(BillingError::InsufficientFunds {
                required_cents: amount_cents,
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub(crate) struct InMemoryUploads {
    stored: AtomicUsize,
}

impl UploadStore for InMemoryUploads {
    fn store(&self, file_name: &str, _contents: &[u8]) -> Result<String, UploadError> {
        let n = self.stored.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("uploads/{n:04}-{file_name}"))
    }
}

/// Document-analysis stand-in: confidence tracks how much of the record the
/// submitter filled in, so complete rows verify and sparse rows queue for
/// review.
pub(crate) struct CompletenessOracle;

impl VerificationOracle for CompletenessOracle {
    fn assess(
        &self,
        submission: &CandidateSubmission,
        _institution: &Institution,
    ) -> Result<OracleAssessment, OracleError> {
        let optional_fields = [
            submission.student_id.is_some(),
            submission.course_name.is_some(),
            submission.degree_type.is_some(),
            submission.classification.is_some(),
            submission.graduation_year.is_some(),
            submission.date_of_birth.is_some(),
        ];
        let present = optional_fields.iter().filter(|present| **present).count();
        let confidence = 0.4 + 0.1 * present as f32;
        Ok(OracleAssessment {
            confidence: confidence.min(1.0),
        })
    }
}

/// Offline transport for demos: answers every call as the institution
/// registry would, confirming the submitted record.
pub(crate) struct EchoRegistryTransport;

impl VerificationTransport for EchoRegistryTransport {
    fn dispatch(
        &self,
        _config: &ApiEndpointConfig,
        payload: &VerificationPayload,
        _timeout: Duration,
    ) -> impl Future<Output = CallOutcome> + Send {
        let body = serde_json::json!({
            "verificationStatus": "verified",
            "requestReference": payload.reference,
            "studentData": {
                "firstName": payload.first_name,
                "lastName": payload.last_name,
                "studentId": payload.student_id,
                "courseName": payload.course_name,
                "degreeType": payload.degree_type,
                "graduationYear": payload.graduation_year,
                "dateOfBirth": payload.date_of_birth,
            }
        });
        async move {
            CallOutcome::succeeded(
                Some(body.clone()),
                Some(body.to_string()),
                200,
                Duration::from_millis(25),
            )
        }
    }
}

/// Seeds a few pending verification requests so the service and demo have
/// work to route.
pub(crate) fn seed_verifications(repository: &InMemoryVerifications) {
    let requests = [
        ("vr-1001", "Jane", "Doe", Some("S1"), Some("CS"), Some(2022)),
        (
            "vr-1002",
            "John",
            "Smith",
            Some("S2"),
            Some("Mathematics"),
            Some(2021),
        ),
        ("vr-1003", "Ada", "Lovelace", None, Some("CS"), None),
    ];

    for (id, first, last, student_id, course, year) in requests {
        repository.seed(VerificationRequest {
            id: VerificationId(id.to_string()),
            institution_id: InstitutionId("inst-acme".to_string()),
            submission: CandidateSubmission {
                first_name: first.to_string(),
                last_name: last.to_string(),
                student_id: student_id.map(str::to_string),
                course_name: course.map(str::to_string),
                degree_type: Some("BSc".to_string()),
                classification: None,
                graduation_year: year,
                date_of_birth: chrono::NaiveDate::from_ymd_opt(2000, 1, 1),
            },
            status: VerificationStatus::Pending,
            submitted_at: Utc::now(),
        });
    }
}
