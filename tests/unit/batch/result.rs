use super::*;

fn outcome(id: u32, status: JobStatus) -> JobOutcome {
    JobOutcome {
        job_id: JobId(id),
        input: PathBuf::from(format!("m{id}.sbs")),
        material: format!("m{id}"),
        variant_index: None,
        status,
        stages: Vec::new(),
        seed: None,
        error: (status == JobStatus::Failed)
            .then(|| JobFailure::new(JobId(id), &MatflowError::validation("bad"))),
    }
}

#[test]
fn outcomes_sorted_and_counted() {
    let result = BatchResult::from_outcomes(vec![
        outcome(3, JobStatus::Succeeded),
        outcome(0, JobStatus::CacheHit),
        outcome(2, JobStatus::Failed),
        outcome(1, JobStatus::Succeeded),
    ]);
    let ids: Vec<_> = result.outcomes.iter().map(|o| o.job_id.0).collect();
    assert_eq!(ids, [0, 1, 2, 3]);
    assert_eq!(result.status, BatchStatus::CompletedWithErrors);
    assert_eq!(result.summary.succeeded, 2);
    assert_eq!(result.summary.cached, 1);
    assert_eq!(result.summary.failed, 1);
    assert!((result.summary.success_rate - 75.0).abs() < 1e-9);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].job_id, JobId(2));
    assert_eq!(result.errors[0].kind, "validation");
}

#[test]
fn cancellation_dominates_status() {
    let result = BatchResult::from_outcomes(vec![
        outcome(0, JobStatus::Failed),
        outcome(1, JobStatus::Cancelled),
    ]);
    assert_eq!(result.status, BatchStatus::Cancelled);
    assert_eq!(result.summary.cancelled, 1);
}

#[test]
fn all_success_and_empty() {
    let result = BatchResult::from_outcomes(vec![outcome(0, JobStatus::CacheHit)]);
    assert_eq!(result.status, BatchStatus::Success);
    assert!((result.summary.success_rate - 100.0).abs() < 1e-9);

    let empty = BatchResult::from_outcomes(Vec::new());
    assert_eq!(empty.status, BatchStatus::Success);
    assert_eq!(empty.summary.success_rate, 0.0);
}
