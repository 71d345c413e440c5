//! Scripted end-to-end walkthrough of the verification pipeline against the
//! in-memory infrastructure. Institution calls are answered by the offline
//! echo transport, so the demo runs without network access.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use clap::Args;

use crate::infra::{
    seed_verifications, CompletenessOracle, EchoRegistryTransport, InMemoryAssignments,
    InMemoryBatches, InMemoryResponses, InMemoryUploads, InMemoryVerifications, PrepaidBilling,
    SeededDirectory,
};
use credverify::error::AppError;
use credverify::workflows::verification::{
    BulkSubmission, BulkVerificationService, ConnectionType, DiscrepancyFlag,
    ExternalVerificationClient, InstitutionId, ManualVerdict, NewAssignment, Priority,
    ProcessingService, UserId, VerificationId,
};

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Skip the bulk submission portion of the demo.
    #[arg(long)]
    pub(crate) skip_bulk: bool,
}

pub(crate) async fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let verifications = Arc::new(InMemoryVerifications::default());
    seed_verifications(&verifications);
    let directory = Arc::new(SeededDirectory::standard(Duration::from_secs(30)));

    let client = ExternalVerificationClient::new(EchoRegistryTransport);
    let processing = ProcessingService::new(
        Arc::new(InMemoryAssignments::default()),
        Arc::new(InMemoryResponses::default()),
        Arc::clone(&verifications),
        directory.clone(),
        client,
    );

    let bulk = BulkVerificationService::new(
        Arc::new(InMemoryBatches::default()),
        Arc::clone(&verifications),
        directory,
        Arc::new(PrepaidBilling {
            ceiling_cents: 1_000_000,
        }),
        Arc::new(InMemoryUploads::default()),
        Arc::new(CompletenessOracle),
        250,
    );

    let reviewer = UserId("rev-demo".to_string());
    let admin = UserId("admin-demo".to_string());

    println!("== API path ==");
    let assignment = processing.assign(NewAssignment {
        verification_id: VerificationId("vr-1001".to_string()),
        assignee_id: reviewer.clone(),
        assigned_by: admin.clone(),
        institution_id: InstitutionId("inst-acme".to_string()),
        priority: Priority::High,
        connection_type: ConnectionType::Api,
        due_date: None,
    })?;
    println!(
        "routed {} to {} ({} priority)",
        assignment.verification_id.0,
        assignment.assignee_id.0,
        assignment.priority.label()
    );

    let verdict = processing.process_api(&assignment.id, &reviewer).await?;
    println!(
        "institution answered: score={} confidence={} verified={} status={}",
        verdict.verification_score,
        verdict.confidence_score,
        verdict.is_verified,
        verdict.status.label()
    );

    println!("\n== Manual path ==");
    let assignment = processing.assign(NewAssignment {
        verification_id: VerificationId("vr-1002".to_string()),
        assignee_id: reviewer.clone(),
        assigned_by: admin,
        institution_id: InstitutionId("inst-state".to_string()),
        priority: Priority::Medium,
        connection_type: ConnectionType::Manual,
        due_date: None,
    })?;

    let mut flags = BTreeSet::new();
    flags.insert(DiscrepancyFlag::CourseMismatch);
    let verdict = processing.process_manual(
        &assignment.id,
        ManualVerdict {
            verification_score: 85,
            confidence_score: None,
            flags,
            notes: Some("course title differs from transcript wording".to_string()),
            verification_status: None,
        },
        &reviewer,
    )?;
    println!(
        "reviewer verdict stored: score={} verified={} flags={:?}",
        verdict.verification_score,
        verdict.is_verified,
        verdict
            .flags
            .iter()
            .map(|flag| flag.label())
            .collect::<Vec<_>>()
    );

    if !args.skip_bulk {
        println!("\n== Bulk path ==");
        let csv = "Institution,First Name,Last Name,Student ID,Course,Degree,Classification,Graduation Year,Date of Birth\n\
                   Acme University,Jane,Doe,S1,CS,BSc,First,2022,2000-01-01\n\
                   Nowhere College,John,Smith,S2,Maths,BSc,Second,2021,1999-05-20\n\
                   Acme University,Ada,Lovelace,S3,CS,MSc,First,2020,1998-12-10\n";

        let (batch, rows) = bulk.accept(
            BulkSubmission {
                submitted_by: UserId("user-demo".to_string()),
                file_name: "demo-intake.csv".to_string(),
            },
            csv.as_bytes(),
        )?;
        println!(
            "accepted batch {} with {} records",
            batch.id.0, batch.total_records
        );

        bulk.drive(&batch.id, rows).await?;

        let finished = bulk.progress(&batch.id)?;
        println!(
            "batch {}: processed={} success={} failed={}",
            finished.status.label(),
            finished.processed_count,
            finished.success_count,
            finished.failed_count
        );
        for outcome in &finished.results {
            match &outcome.error {
                Some(error) => println!(
                    "  [{}] {} @ {} -> {} ({error})",
                    outcome.index,
                    outcome.student_name,
                    outcome.institution_name,
                    outcome.status.label()
                ),
                None => println!(
                    "  [{}] {} @ {} -> {} (confidence {:.2})",
                    outcome.index,
                    outcome.student_name,
                    outcome.institution_name,
                    outcome.status.label(),
                    outcome.confidence.unwrap_or_default()
                ),
            }
        }
    }

    Ok(())
}
