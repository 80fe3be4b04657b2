use std::path::Path;

use anyhow::{Context, Result};
use flexer_alloc::{DefaultAllocator, PageAllocator, SystemAllocator, TrackingAllocator};

use crate::workload::{AllocatorKind, StepReport, Workload};

pub fn run(workload: String, keep_going: bool, json: bool) -> Result<()> {
    let workload = Workload::load(Path::new(&workload))?;
    let reports = execute(&workload, keep_going)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&reports)?);
    } else {
        print_table(&reports);
    }
    Ok(())
}

/// Runs `workload` on the allocator it asks for.
pub fn execute(workload: &Workload, keep_going: bool) -> Result<Vec<StepReport>> {
    log::info!(
        "running {} steps with {:?} allocator",
        workload.steps.len(),
        workload.allocator
    );
    let reports = match workload.allocator {
        AllocatorKind::Default => workload.execute(DefaultAllocator::default(), keep_going),
        AllocatorKind::System => workload.execute(SystemAllocator, keep_going),
        AllocatorKind::Page => workload.execute(PageAllocator::default(), keep_going),
        AllocatorKind::Tracking { budget } => {
            let tracker = match budget {
                Some(budget) => TrackingAllocator::with_budget(budget),
                None => TrackingAllocator::new(),
            };
            let reports = workload.execute(&tracker, keep_going);
            log::info!(
                "tracking allocator: {} allocations, {} failures, {} bytes still live",
                tracker.total_allocations(),
                tracker.failures(),
                tracker.live_bytes()
            );
            reports
        }
    }
    .context("workload failed")?;
    Ok(reports)
}

fn print_table(reports: &[StepReport]) {
    println!(
        "{:>5}  {:<16}  {:>10}  {:>10}  {:<6}  {}",
        "step", "op", "used", "capacity", "local", "note"
    );
    for report in reports {
        let note = match (&report.error, &report.popped) {
            (Some(error), _) => format!("error: {error}"),
            (None, Some(popped)) => format!("popped {} bytes", popped.len()),
            (None, None) if !report.allocated => "no storage".to_string(),
            (None, None) => String::new(),
        };
        println!(
            "{:>5}  {:<16}  {:>10}  {:>10}  {:<6}  {}",
            report.index, report.op, report.used, report.capacity, report.local, note
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::workload::WorkloadError;

    #[test]
    fn test_execute_with_each_allocator() {
        for kind in ["default", "system", "page"] {
            let workload = Workload::parse(&format!(
                r#"{{
                    "allocator": {{ "kind": "{kind}" }},
                    "steps": [
                        {{ "op": "push", "data": {{ "len": 5000, "byte": 1 }} }},
                        {{ "op": "pop", "len": 100 }}
                    ]
                }}"#
            ))
            .unwrap();
            let reports = execute(&workload, false).unwrap();
            assert_eq!(reports[0].used, 5000);
            assert!(reports[0].capacity >= 5000);
            assert_eq!(reports[1].used, 4900);
        }
    }

    #[test]
    fn test_execute_tracking_budget() {
        let workload = Workload::parse(
            r#"{
                "allocator": { "kind": "tracking", "budget": 64 },
                "initial": { "mode": "sized", "size": 32 },
                "steps": [ { "op": "push", "data": { "len": 100 } } ]
            }"#,
        )
        .unwrap();
        assert!(execute(&workload, false).is_err());

        let reports = execute(&workload, true).unwrap();
        assert_eq!(reports[0].used, 0);
        assert!(reports[0].error.is_some());
    }

    #[test]
    fn test_run_missing_file() {
        let err = run("/no/such/workload.json".to_string(), false, false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WorkloadError>(),
            Some(WorkloadError::Read { .. })
        ));

        let dir = tempfile::tempdir().unwrap();
        let err = run(dir.path().to_str().unwrap().to_string(), false, false).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<WorkloadError>(),
            Some(WorkloadError::Read { .. })
        ));
    }

    #[test]
    fn test_run_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workload.json");
        std::fs::write(
            &path,
            r#"{ "steps": [ { "op": "push", "data": "hello" }, { "op": "clear" } ] }"#,
        )
        .unwrap();
        run(path.to_str().unwrap().to_string(), false, true).unwrap();
        run(path.to_str().unwrap().to_string(), false, false).unwrap();
    }
}
