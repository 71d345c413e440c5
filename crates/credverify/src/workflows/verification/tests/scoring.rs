use std::time::Duration;

use super::common::{matching_record, submission};
use crate::workflows::verification::domain::{DiscrepancyFlag, InstitutionRecord, ResponseStatus};
use crate::workflows::verification::scoring::{
    confidence_for, status_for_score, timeliness_from_elapsed, ScoringEngine,
};

#[test]
fn identical_data_scores_a_perfect_match() {
    let report = ScoringEngine::new().score(&submission(), &matching_record());

    assert_eq!(report.verification_score, 100);
    assert_eq!(report.confidence_score, 100);
    assert_eq!(report.completeness_score, 100);
    assert_eq!(report.data_quality_score, 100);
    assert!(report.is_verified());
    assert!(report.flags.is_empty());
    assert_eq!(
        status_for_score(report.verification_score),
        ResponseStatus::Completed
    );
}

#[test]
fn student_id_mismatch_drops_its_weight_and_flags_it() {
    let mut returned = matching_record();
    returned.student_id = Some("S2".to_string());

    let report = ScoringEngine::new().score(&submission(), &returned);

    assert_eq!(report.verification_score, 75);
    assert_eq!(report.confidence_score, 85);
    assert_eq!(
        report.flags.iter().copied().collect::<Vec<_>>(),
        vec![DiscrepancyFlag::IdMismatch]
    );
    assert_eq!(
        status_for_score(report.verification_score),
        ResponseStatus::RequiresReview
    );
}

#[test]
fn score_is_the_sum_of_matched_field_weights() {
    // Only the two name fields agree: 20 + 20.
    let returned = InstitutionRecord {
        first_name: Some("Jane".to_string()),
        last_name: Some("Doe".to_string()),
        ..InstitutionRecord::default()
    };

    let report = ScoringEngine::new().score(&submission(), &returned);

    assert_eq!(report.verification_score, 40);
    assert_eq!(report.completeness_score, 33);
    assert!(report.flags.contains(&DiscrepancyFlag::IdMismatch));
    assert!(report.flags.contains(&DiscrepancyFlag::DobMismatch));
    assert!(report.flags.contains(&DiscrepancyFlag::CourseMismatch));
    assert!(report.flags.contains(&DiscrepancyFlag::YearMismatch));
    assert!(!report.flags.contains(&DiscrepancyFlag::NameMismatch));
}

#[test]
fn missing_fields_are_non_matches_not_errors() {
    let report = ScoringEngine::new().score(&submission(), &InstitutionRecord::default());

    assert_eq!(report.verification_score, 0);
    assert_eq!(report.data_quality_score, 0);
    assert_eq!(report.completeness_score, 0);
    assert!(!report.is_verified());
    assert_eq!(report.flags.len(), 5);
}

#[test]
fn comparison_ignores_case_and_surrounding_whitespace() {
    let mut returned = matching_record();
    returned.first_name = Some("  JANE ".to_string());
    returned.last_name = Some("doe".to_string());

    let report = ScoringEngine::new().score(&submission(), &returned);

    assert_eq!(report.verification_score, 100);
    assert!(report.flags.is_empty());
}

#[test]
fn confidence_is_score_plus_ten_capped_at_one_hundred() {
    for score in [0u8, 35, 50, 89, 90, 95, 100] {
        let expected = (u16::from(score) + 10).min(100) as u8;
        assert_eq!(confidence_for(score), expected, "score {score}");
    }
}

#[test]
fn banding_is_total_and_non_overlapping() {
    for score in 0u8..=100 {
        let status = status_for_score(score);
        let expected = if score >= 90 {
            ResponseStatus::Completed
        } else if score >= 70 {
            ResponseStatus::RequiresReview
        } else if score >= 50 {
            ResponseStatus::Discrepancy
        } else {
            ResponseStatus::Failed
        };
        assert_eq!(status, expected, "score {score}");
    }
}

#[test]
fn banding_boundaries() {
    assert_eq!(status_for_score(49), ResponseStatus::Failed);
    assert_eq!(status_for_score(50), ResponseStatus::Discrepancy);
    assert_eq!(status_for_score(69), ResponseStatus::Discrepancy);
    assert_eq!(status_for_score(70), ResponseStatus::RequiresReview);
    assert_eq!(status_for_score(89), ResponseStatus::RequiresReview);
    assert_eq!(status_for_score(90), ResponseStatus::Completed);
}

#[test]
fn timeliness_derates_with_latency() {
    let timeout = Duration::from_secs(30);
    assert_eq!(timeliness_from_elapsed(Duration::from_secs(2), timeout), 100);
    assert_eq!(timeliness_from_elapsed(Duration::from_secs(20), timeout), 75);
    assert_eq!(timeliness_from_elapsed(Duration::from_secs(31), timeout), 40);
}

#[test]
fn scoring_is_deterministic() {
    let engine = ScoringEngine::new();
    let first = engine.score(&submission(), &matching_record());
    let second = engine.score(&submission(), &matching_record());
    assert_eq!(first, second);
}
