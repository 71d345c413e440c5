//! Institution directory collaborator and the wire-level details of talking
//! to an institution's verification endpoint: request payload shape,
//! per-institution endpoint configuration, and normalization of whatever the
//! endpoint returned into the common comparison model.

use std::time::Duration;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::domain::{CandidateSubmission, InstitutionId, InstitutionRecord, VerificationId};

/// An institution known to the platform. Onboarding and credential
/// provisioning happen elsewhere; this core only reads the directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Institution {
    pub id: InstitutionId,
    pub name: String,
}

/// Wire format tag for an institution endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseFormat {
    Json,
    Xml,
}

/// Per-institution verification endpoint configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiEndpointConfig {
    pub endpoint_url: String,
    /// Pre-built auth headers (name, value). Credential provisioning is an
    /// external concern; the processors only forward these.
    pub auth_headers: Vec<(String, String)>,
    pub response_format: ResponseFormat,
    /// Per-institution override; the client falls back to its configured
    /// default when unset.
    pub timeout: Option<Duration>,
}

/// Lookup interface to the institution registry.
pub trait InstitutionDirectory: Send + Sync {
    fn find_by_id(&self, id: &InstitutionId) -> Result<Option<Institution>, DirectoryError>;
    fn find_by_name(&self, name: &str) -> Result<Option<Institution>, DirectoryError>;
    fn api_config(&self, id: &InstitutionId) -> Result<Option<ApiEndpointConfig>, DirectoryError>;
}

#[derive(Debug, thiserror::Error)]
pub enum DirectoryError {
    #[error("institution directory unavailable: {0}")]
    Unavailable(String),
}

/// Canonical request body sent to institution endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationPayload {
    pub reference: String,
    pub first_name: String,
    pub last_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub student_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub course_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub degree_type: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graduation_year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub date_of_birth: Option<NaiveDate>,
}

impl VerificationPayload {
    pub fn from_submission(
        verification_id: &VerificationId,
        submission: &CandidateSubmission,
    ) -> Self {
        Self {
            reference: format!("req-{}", verification_id.0),
            first_name: submission.first_name.clone(),
            last_name: submission.last_name.clone(),
            student_id: submission.student_id.clone(),
            course_name: submission.course_name.clone(),
            degree_type: submission.degree_type.clone(),
            graduation_year: submission.graduation_year,
            date_of_birth: submission.date_of_birth,
        }
    }
}

/// Normalizes a successful endpoint payload into the common data model.
///
/// Tolerant by contract: unrecognized shapes produce an empty record rather
/// than an error, and a record without a verification-status indicator is
/// treated as incomplete downstream. XML bodies arrive unparsed (`None`) and
/// take the same incomplete path.
pub fn parse_api_payload(payload: Option<&Value>) -> InstitutionRecord {
    let Some(payload) = payload else {
        return InstitutionRecord::default();
    };

    let student = payload
        .get("studentData")
        .or_else(|| payload.get("student"))
        .or_else(|| payload.get("data").and_then(|data| data.get("student")))
        .unwrap_or(payload);

    InstitutionRecord {
        first_name: string_field(student, &["firstName", "first_name"]),
        last_name: string_field(student, &["lastName", "last_name"]),
        student_id: string_field(student, &["studentId", "student_id"]),
        course_name: string_field(student, &["courseName", "course_name", "course"]),
        degree_type: string_field(student, &["degreeType", "degree_type", "degree"]),
        classification: string_field(student, &["classification", "grade"]),
        graduation_year: year_field(student, &["graduationYear", "graduation_year"]),
        date_of_birth: date_field(student, &["dateOfBirth", "date_of_birth", "dob"]),
        verification_status: string_field(payload, &["verificationStatus", "verification_status", "status"]),
    }
}

fn string_field(value: &Value, keys: &[&str]) -> Option<String> {
    keys.iter().find_map(|key| {
        value
            .get(key)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|text| !text.is_empty())
            .map(str::to_string)
    })
}

fn year_field(value: &Value, keys: &[&str]) -> Option<i32> {
    keys.iter().find_map(|key| {
        let field = value.get(key)?;
        if let Some(year) = field.as_i64() {
            return i32::try_from(year).ok();
        }
        field.as_str()?.trim().parse::<i32>().ok()
    })
}

fn date_field(value: &Value, keys: &[&str]) -> Option<NaiveDate> {
    keys.iter().find_map(|key| {
        let raw = value.get(key)?.as_str()?;
        NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
    })
}
