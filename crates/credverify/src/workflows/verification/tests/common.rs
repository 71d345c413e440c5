use std::collections::{HashMap, VecDeque};
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use chrono::{NaiveDate, TimeZone, Utc};

use crate::workflows::verification::assignment::{AssignmentError, AssignmentRepository};
use crate::workflows::verification::batch::{
    BatchRepository, BillingError, BillingGateway, OracleAssessment, OracleError, UploadError,
    UploadStore, VerificationOracle,
};
use crate::workflows::verification::client::{
    CallOutcome, ClientEvent, ClientObserver, ExternalVerificationClient, RetryPolicy,
    VerificationTransport,
};
use crate::workflows::verification::domain::{
    Assignment, AssignmentId, AssignmentStatus, BatchId, BatchStatus, BulkBatch,
    BulkRecordOutcome, BulkRecordStatus, CandidateSubmission, ConnectionType, InstitutionId,
    InstitutionRecord, InstitutionResponse, Priority, UserId, VerificationId, VerificationRequest,
    VerificationStatus,
};
use crate::workflows::verification::institutions::{
    ApiEndpointConfig, DirectoryError, Institution, InstitutionDirectory, ResponseFormat,
    VerificationPayload,
};
use crate::workflows::verification::processor::ProcessingService;
use crate::workflows::verification::repository::{RepositoryError, VerificationRequestRepository};
use crate::workflows::verification::response::ResponseRepository;

// ---------- sample data ----------

pub(super) fn submission() -> CandidateSubmission {
    CandidateSubmission {
        first_name: "Jane".to_string(),
        last_name: "Doe".to_string(),
        student_id: Some("S1".to_string()),
        course_name: Some("CS".to_string()),
        degree_type: Some("BSc".to_string()),
        classification: Some("First".to_string()),
        graduation_year: Some(2022),
        date_of_birth: NaiveDate::from_ymd_opt(2000, 1, 1),
    }
}

pub(super) fn matching_record() -> InstitutionRecord {
    InstitutionRecord {
        first_name: Some("Jane".to_string()),
        last_name: Some("Doe".to_string()),
        student_id: Some("S1".to_string()),
        course_name: Some("CS".to_string()),
        degree_type: Some("BSc".to_string()),
        classification: Some("First".to_string()),
        graduation_year: Some(2022),
        date_of_birth: NaiveDate::from_ymd_opt(2000, 1, 1),
        verification_status: Some("verified".to_string()),
    }
}

pub(super) fn institution_id() -> InstitutionId {
    InstitutionId("inst-acme".to_string())
}

pub(super) fn verification_request(id: &str) -> VerificationRequest {
    VerificationRequest {
        id: VerificationId(id.to_string()),
        institution_id: institution_id(),
        submission: submission(),
        status: VerificationStatus::Pending,
        submitted_at: Utc.with_ymd_and_hms(2026, 3, 1, 9, 0, 0).unwrap(),
    }
}

pub(super) fn assignment(id: &str, verification: &str, assignee: &str) -> Assignment {
    Assignment {
        id: AssignmentId(id.to_string()),
        verification_id: VerificationId(verification.to_string()),
        assignee_id: UserId(assignee.to_string()),
        assigned_by: UserId("admin-1".to_string()),
        assigned_at: Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap(),
        due_date: None,
        priority: Priority::Medium,
        connection_type: ConnectionType::Api,
        institution_id: institution_id(),
        status: AssignmentStatus::Pending,
    }
}

pub(super) fn endpoint_config() -> ApiEndpointConfig {
    ApiEndpointConfig {
        endpoint_url: "https://registry.acme.edu/verify".to_string(),
        auth_headers: vec![("x-api-key".to_string(), "secret".to_string())],
        response_format: ResponseFormat::Json,
        timeout: Some(Duration::from_secs(5)),
    }
}

pub(super) fn success_payload() -> serde_json::Value {
    serde_json::json!({
        "verificationStatus": "verified",
        "studentData": {
            "firstName": "Jane",
            "lastName": "Doe",
            "studentId": "S1",
            "courseName": "CS",
            "graduationYear": 2022,
            "dateOfBirth": "2000-01-01"
        }
    })
}

pub(super) fn success_outcome() -> CallOutcome {
    CallOutcome::succeeded(
        Some(success_payload()),
        Some(success_payload().to_string()),
        200,
        Duration::from_millis(120),
    )
}

pub(super) fn failure_outcome(error: &str) -> CallOutcome {
    CallOutcome::failed(error, None, Some(503), Duration::from_millis(40))
}

/// Retry policy shrunk so suites exercising backoff stay fast.
pub(super) fn fast_policy() -> RetryPolicy {
    RetryPolicy {
        max_attempts: 3,
        backoff_unit: Duration::from_millis(1),
    }
}

// ---------- repositories ----------

#[derive(Default)]
pub(super) struct MemoryVerifications {
    records: Mutex<HashMap<VerificationId, VerificationRequest>>,
}

impl MemoryVerifications {
    pub(super) fn with(requests: Vec<VerificationRequest>) -> Self {
        let map = requests
            .into_iter()
            .map(|request| (request.id.clone(), request))
            .collect();
        Self {
            records: Mutex::new(map),
        }
    }

    pub(super) fn status_of(&self, id: &str) -> Option<VerificationStatus> {
        let guard = self.records.lock().expect("verification mutex poisoned");
        guard
            .get(&VerificationId(id.to_string()))
            .map(|request| request.status)
    }
}

impl VerificationRequestRepository for MemoryVerifications {
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
pub(super) struct MemoryAssignments {
    records: Mutex<HashMap<AssignmentId, Assignment>>,
}

impl MemoryAssignments {
    pub(super) fn with(assignments: Vec<Assignment>) -> Self {
        let map = assignments
            .into_iter()
            .map(|assignment| (assignment.id.clone(), assignment))
            .collect();
        Self {
            records: Mutex::new(map),
        }
    }

    pub(super) fn status_of(&self, id: &str) -> Option<AssignmentStatus> {
        let guard = self.records.lock().expect("assignment mutex poisoned");
        guard
            .get(&AssignmentId(id.to_string()))
            .map(|assignment| assignment.status)
    }
}

impl AssignmentRepository for MemoryAssignments {
    fn create(&self, assignment: Assignment) -> Result<Assignment, RepositoryError> {
        let mut guard = self.records.lock().expect("assignment mutex poisoned");
        if guard.contains_key(&assignment.id) {
            return Err(RepositoryError::Conflict);
        }
        let duplicate = guard.values().any(|existing| {
            existing.verification_id == assignment.verification_id
                && !existing.status.is_terminal()
        });
        if duplicate {
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
        let guard = self.records.lock().expect("assignment mutex poisoned");
        Ok(guard
            .values()
            .filter(|assignment| {
                &assignment.assignee_id == assignee && assignment.status == status
            })
            .cloned()
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
        // Single lock scope: the compare and the swap are one atomic step.
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
pub(super) struct MemoryResponses {
    records: Mutex<HashMap<VerificationId, InstitutionResponse>>,
}

impl MemoryResponses {
    pub(super) fn count(&self) -> usize {
        self.records.lock().expect("response mutex poisoned").len()
    }
}

impl ResponseRepository for MemoryResponses {
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
        status: crate::workflows::verification::domain::ResponseStatus,
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
pub(super) struct MemoryBatches {
    records: Mutex<HashMap<BatchId, BulkBatch>>,
    /// When set, `record_outcome` fails once this many outcomes were stored.
    fail_after: Mutex<Option<usize>>,
    stored: AtomicUsize,
}

impl MemoryBatches {
    pub(super) fn failing_after(count: usize) -> Self {
        Self {
            fail_after: Mutex::new(Some(count)),
            ..Self::default()
        }
    }

    pub(super) fn clear_outage(&self) {
        *self.fail_after.lock().expect("batch mutex poisoned") = None;
    }

    pub(super) fn reopen(&self, id: &BatchId) {
        let mut guard = self.records.lock().expect("batch mutex poisoned");
        if let Some(batch) = guard.get_mut(id) {
            batch.status = BatchStatus::Processing;
        }
    }

    pub(super) fn get(&self, id: &BatchId) -> Option<BulkBatch> {
        self.records
            .lock()
            .expect("batch mutex poisoned")
            .get(id)
            .cloned()
    }

    pub(super) fn count(&self) -> usize {
        self.records.lock().expect("batch mutex poisoned").len()
    }
}

impl BatchRepository for MemoryBatches {
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
        if let Some(limit) = *self.fail_after.lock().expect("batch mutex poisoned") {
            if self.stored.load(Ordering::SeqCst) >= limit {
                return Err(RepositoryError::Unavailable("batch store offline".to_string()));
            }
        }

        let mut guard = self.records.lock().expect("batch mutex poisoned");
        let batch = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        match outcome.status {
            BulkRecordStatus::Verified => batch.success_count += 1,
            BulkRecordStatus::Failed => batch.failed_count += 1,
        }
        batch.processed_count += 1;
        batch.results.push(outcome);
        self.stored.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn finalize(&self, id: &BatchId, status: BatchStatus) -> Result<(), RepositoryError> {
        let mut guard = self.records.lock().expect("batch mutex poisoned");
        let batch = guard.get_mut(id).ok_or(RepositoryError::NotFound)?;
        batch.status = status;
        Ok(())
    }
}

// ---------- collaborators ----------

#[derive(Default)]
pub(super) struct StaticDirectory {
    institutions: Vec<Institution>,
    configs: HashMap<InstitutionId, ApiEndpointConfig>,
}

impl StaticDirectory {
    pub(super) fn with_api(institution: Institution, config: ApiEndpointConfig) -> Self {
        let mut configs = HashMap::new();
        configs.insert(institution.id.clone(), config);
        Self {
            institutions: vec![institution],
            configs,
        }
    }

    pub(super) fn without_configs(institutions: Vec<Institution>) -> Self {
        Self {
            institutions,
            configs: HashMap::new(),
        }
    }
}

impl InstitutionDirectory for StaticDirectory {
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
            .find(|institution| institution.name.eq_ignore_ascii_case(name))
            .cloned())
    }

    fn api_config(&self, id: &InstitutionId) -> Result<Option<ApiEndpointConfig>, DirectoryError> {
        Ok(self.configs.get(id).cloned())
    }
}

pub(super) fn acme_institution() -> Institution {
    Institution {
        id: institution_id(),
        name: "Acme University".to_string(),
    }
}

/// Transport answering from a queue of scripted outcomes; counts dispatches.
pub(super) struct ScriptedTransport {
    script: Mutex<VecDeque<CallOutcome>>,
    pub(super) calls: AtomicUsize,
}

impl ScriptedTransport {
    pub(super) fn new(outcomes: Vec<CallOutcome>) -> Self {
        Self {
            script: Mutex::new(outcomes.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub(super) fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl VerificationTransport for ScriptedTransport {
    fn dispatch(
        &self,
        _config: &ApiEndpointConfig,
        _payload: &VerificationPayload,
        _timeout: Duration,
    ) -> impl Future<Output = CallOutcome> + Send {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let outcome = self
            .script
            .lock()
            .expect("transport mutex poisoned")
            .pop_front()
            .unwrap_or_else(|| failure_outcome("transport script exhausted"));
        async move { outcome }
    }
}

#[derive(Default)]
pub(super) struct RecordingObserver {
    events: Arc<Mutex<Vec<ClientEvent>>>,
}

impl RecordingObserver {
    pub(super) fn handle(&self) -> Arc<Mutex<Vec<ClientEvent>>> {
        Arc::clone(&self.events)
    }
}

impl ClientObserver for RecordingObserver {
    fn on_event(&self, event: &ClientEvent) {
        self.events
            .lock()
            .expect("observer mutex poisoned")
            .push(event.clone());
    }
}

/// Oracle answering from a queue; falls back to a confident assessment.
pub(super) struct ScriptedOracle {
    script: Mutex<VecDeque<Result<OracleAssessment, OracleError>>>,
}

impl ScriptedOracle {
    pub(super) fn new(script: Vec<Result<OracleAssessment, OracleError>>) -> Self {
        Self {
            script: Mutex::new(script.into()),
        }
    }

    pub(super) fn confident() -> Self {
        Self::new(Vec::new())
    }
}

impl VerificationOracle for ScriptedOracle {
    fn assess(
        &self,
        _submission: &CandidateSubmission,
        _institution: &Institution,
    ) -> Result<OracleAssessment, OracleError> {
        self.script
            .lock()
            .expect("oracle mutex poisoned")
            .pop_front()
            .unwrap_or(Ok(OracleAssessment { confidence: 0.95 }))
    }
}

/// Billing gateway approving up to a fixed limit.
pub(super) struct FundsGuard {
    pub(super) limit_cents: u64,
}

impl BillingGateway for FundsGuard {
    fn ensure_funds(&self, _user: &UserId, amount_cents: u64) -> Result<(), BillingError> {
        if amount_cents > self.limit_cents {
            return Err(BillingError::InsufficientFunds {
                required_cents: amount_cents,
            });
        }
        Ok(())
    }
}

#[derive(Default)]
pub(super) struct MemoryUploads {
    stored: AtomicUsize,
}

impl UploadStore for MemoryUploads {
    fn store(&self, file_name: &str, _contents: &[u8]) -> Result<String, UploadError> {
        let n = self.stored.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!("uploads/{n:04}-{file_name}"))
    }
}

// ---------- service wiring ----------

pub(super) struct ProcessorHarness {
    pub(super) assignments: Arc<MemoryAssignments>,
    pub(super) responses: Arc<MemoryResponses>,
    pub(super) verifications: Arc<MemoryVerifications>,
    pub(super) transport: Arc<ScriptedTransport>,
    pub(super) service: ProcessingService<
        MemoryAssignments,
        MemoryResponses,
        MemoryVerifications,
        Arc<ScriptedTransport>,
    >,
}

pub(super) fn processor_harness(
    outcomes: Vec<CallOutcome>,
    directory: StaticDirectory,
    assignments: Vec<Assignment>,
    verifications: Vec<VerificationRequest>,
) -> ProcessorHarness {
    let assignments = Arc::new(MemoryAssignments::with(assignments));
    let responses = Arc::new(MemoryResponses::default());
    let verifications = Arc::new(MemoryVerifications::with(verifications));
    let transport = Arc::new(ScriptedTransport::new(outcomes));

    let client =
        ExternalVerificationClient::new(Arc::clone(&transport)).with_policy(fast_policy());

    let service = ProcessingService::new(
        Arc::clone(&assignments),
        Arc::clone(&responses),
        Arc::clone(&verifications),
        Arc::new(directory),
        client,
    );

    ProcessorHarness {
        assignments,
        responses,
        verifications,
        transport,
        service,
    }
}
