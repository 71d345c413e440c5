//! Weighted reconciliation of applicant-submitted data against the record an
//! institution returned. Pure and deterministic: the same pair of inputs
//! always yields the same report, and missing fields are non-matches rather
//! than errors.

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::domain::{CandidateSubmission, DiscrepancyFlag, InstitutionRecord, ResponseStatus};

pub const WEIGHT_FIRST_NAME: u8 = 20;
pub const WEIGHT_LAST_NAME: u8 = 20;
pub const WEIGHT_STUDENT_ID: u8 = 25;
pub const WEIGHT_DATE_OF_BIRTH: u8 = 15;
pub const WEIGHT_COURSE_NAME: u8 = 10;
pub const WEIGHT_GRADUATION_YEAR: u8 = 10;

/// Score at or above which a response counts as verified. Independent of the
/// status banding below.
pub const VERIFIED_THRESHOLD: u8 = 80;

const COMPARED_FIELDS: usize = 6;

/// Output of one reconciliation run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchReport {
    pub verification_score: u8,
    pub confidence_score: u8,
    pub data_quality_score: u8,
    pub completeness_score: u8,
    pub timeliness_score: u8,
    pub flags: BTreeSet<DiscrepancyFlag>,
}

impl MatchReport {
    pub fn is_verified(&self) -> bool {
        self.verification_score >= VERIFIED_THRESHOLD
    }
}

/// Stateless comparator applying the fixed field weights.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScoringEngine;

impl ScoringEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn score(
        &self,
        submitted: &CandidateSubmission,
        returned: &InstitutionRecord,
    ) -> MatchReport {
        let mut verification_score: u8 = 0;
        let mut matched: usize = 0;
        let mut present: usize = 0;
        let mut flags = BTreeSet::new();

        let checks: [(u8, bool, bool, DiscrepancyFlag); COMPARED_FIELDS] = [
            (
                WEIGHT_FIRST_NAME,
                text_matches(Some(&submitted.first_name), returned.first_name.as_deref()),
                text_present(returned.first_name.as_deref()),
                DiscrepancyFlag::NameMismatch,
            ),
            (
                WEIGHT_LAST_NAME,
                text_matches(Some(&submitted.last_name), returned.last_name.as_deref()),
                text_present(returned.last_name.as_deref()),
                DiscrepancyFlag::NameMismatch,
            ),
            (
                WEIGHT_STUDENT_ID,
                text_matches(submitted.student_id.as_deref(), returned.student_id.as_deref()),
                text_present(returned.student_id.as_deref()),
                DiscrepancyFlag::IdMismatch,
            ),
            (
                WEIGHT_DATE_OF_BIRTH,
                value_matches(submitted.date_of_birth, returned.date_of_birth),
                returned.date_of_birth.is_some(),
                DiscrepancyFlag::DobMismatch,
            ),
            (
                WEIGHT_COURSE_NAME,
                text_matches(submitted.course_name.as_deref(), returned.course_name.as_deref()),
                text_present(returned.course_name.as_deref()),
                DiscrepancyFlag::CourseMismatch,
            ),
            (
                WEIGHT_GRADUATION_YEAR,
                value_matches(submitted.graduation_year, returned.graduation_year),
                returned.graduation_year.is_some(),
                DiscrepancyFlag::YearMismatch,
            ),
        ];

        for (weight, field_matched, field_present, flag) in checks {
            if field_present {
                present += 1;
            }
            if field_matched {
                verification_score = verification_score.saturating_add(weight).min(100);
                matched += 1;
            } else {
                flags.insert(flag);
            }
        }

        MatchReport {
            verification_score,
            confidence_score: confidence_for(verification_score),
            data_quality_score: ratio_score(present, COMPARED_FIELDS),
            completeness_score: ratio_score(matched, COMPARED_FIELDS),
            timeliness_score: 100,
            flags,
        }
    }
}

/// `confidence = min(score + 10, 100)`.
pub fn confidence_for(verification_score: u8) -> u8 {
    verification_score.saturating_add(10).min(100)
}

/// Status banding applied by processors. Total and non-overlapping over
/// [0, 100].
pub fn status_for_score(score: u8) -> ResponseStatus {
    match score {
        90.. => ResponseStatus::Completed,
        70..=89 => ResponseStatus::RequiresReview,
        50..=69 => ResponseStatus::Discrepancy,
        _ => ResponseStatus::Failed,
    }
}

/// Derates the pure report's timeliness from the observed call latency:
/// prompt answers keep 100, answers within the configured timeout drop to
/// 75, anything slower to 40.
pub fn timeliness_from_elapsed(elapsed: Duration, timeout: Duration) -> u8 {
    if elapsed * 6 <= timeout {
        100
    } else if elapsed <= timeout {
        75
    } else {
        40
    }
}

fn ratio_score(count: usize, total: usize) -> u8 {
    ((count * 100) / total) as u8
}

fn text_present(value: Option<&str>) -> bool {
    value.is_some_and(|text| !text.trim().is_empty())
}

fn text_matches(submitted: Option<&str>, returned: Option<&str>) -> bool {
    match (submitted, returned) {
        (Some(a), Some(b)) => {
            let a = a.trim();
            let b = b.trim();
            !a.is_empty() && a.eq_ignore_ascii_case(b)
        }
        _ => false,
    }
}

fn value_matches<T: PartialEq>(submitted: Option<T>, returned: Option<T>) -> bool {
    match (submitted, returned) {
        (Some(a), Some(b)) => a == b,
        _ => false,
    }
}
