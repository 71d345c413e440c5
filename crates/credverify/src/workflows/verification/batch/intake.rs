use std::io::Read;

use chrono::NaiveDate;
use serde::{Deserialize, Deserializer};

use super::super::domain::CandidateSubmission;

/// One parsed line of a bulk submission file.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkRow {
    pub institution_name: String,
    pub first_name: String,
    pub last_name: String,
    pub student_id: Option<String>,
    pub course_name: Option<String>,
    pub degree_type: Option<String>,
    pub classification: Option<String>,
    pub graduation_year: Option<i32>,
    pub date_of_birth: Option<NaiveDate>,
}

impl BulkRow {
    pub fn submission(&self) -> CandidateSubmission {
        CandidateSubmission {
            first_name: self.first_name.clone(),
            last_name: self.last_name.clone(),
            student_id: self.student_id.clone(),
            course_name: self.course_name.clone(),
            degree_type: self.degree_type.clone(),
            classification: self.classification.clone(),
            graduation_year: self.graduation_year,
            date_of_birth: self.date_of_birth,
        }
    }

    pub fn student_name(&self) -> String {
        format!("{} {}", self.first_name, self.last_name)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum IntakeError {
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error("bulk file contains no records")]
    EmptyFile,
}

pub fn parse_rows<R: Read>(reader: R) -> Result<Vec<BulkRow>, IntakeError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(reader);
    let mut rows = Vec::new();

    for record in csv_reader.deserialize::<BulkFileRow>() {
        let raw = record?;
        rows.push(BulkRow {
            graduation_year: raw.graduation_year(),
            date_of_birth: raw.date_of_birth(),
            institution_name: raw.institution,
            first_name: raw.first_name,
            last_name: raw.last_name,
            student_id: raw.student_id,
            course_name: raw.course,
            degree_type: raw.degree,
            classification: raw.classification,
        });
    }

    if rows.is_empty() {
        return Err(IntakeError::EmptyFile);
    }

    Ok(rows)
}

#[derive(Debug, Deserialize)]
struct BulkFileRow {
    #[serde(rename = "Institution")]
    institution: String,
    #[serde(rename = "First Name")]
    first_name: String,
    #[serde(rename = "Last Name")]
    last_name: String,
    #[serde(rename = "Student ID", default, deserialize_with = "empty_string_as_none")]
    student_id: Option<String>,
    #[serde(rename = "Course", default, deserialize_with = "empty_string_as_none")]
    course: Option<String>,
    #[serde(rename = "Degree", default, deserialize_with = "empty_string_as_none")]
    degree: Option<String>,
    #[serde(rename = "Classification", default, deserialize_with = "empty_string_as_none")]
    classification: Option<String>,
    #[serde(
        rename = "Graduation Year",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    graduation_year: Option<String>,
    #[serde(
        rename = "Date of Birth",
        default,
        deserialize_with = "empty_string_as_none"
    )]
    date_of_birth: Option<String>,
}

impl BulkFileRow {
    fn graduation_year(&self) -> Option<i32> {
        self.graduation_year
            .as_deref()
            .and_then(|raw| raw.trim().parse::<i32>().ok())
    }

    fn date_of_birth(&self) -> Option<NaiveDate> {
        self.date_of_birth
            .as_deref()
            .and_then(|raw| NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok())
    }
}

fn empty_string_as_none<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let opt = Option::<String>::deserialize(deserializer)?;
    Ok(opt.filter(|value| !value.trim().is_empty()))
}
