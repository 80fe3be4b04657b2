//! Workload descriptions: which allocator, how the buffer starts, and what to do
//! with it.

use std::path::Path;

use flexer::{AllocError, Allocator, FlexBuffer, MIN_SIZE};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("reading workload '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("parsing workload '{path}': {source}")]
    Parse {
        path: String,
        source: serde_json::Error,
    },
    #[error("invalid workload: {0}")]
    Invalid(String),
    #[error("step {index} ({op}) failed: {source}")]
    Step {
        index: usize,
        op: &'static str,
        source: AllocError,
    },
}

#[derive(Debug, Deserialize)]
pub struct Workload {
    #[serde(default)]
    pub allocator: AllocatorKind,
    #[serde(default)]
    pub initial: Initial,
    #[serde(default)]
    pub steps: Vec<Step>,
}

#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AllocatorKind {
    /// Whatever allocator the build links as the default.
    #[default]
    Default,
    System,
    Page,
    /// The system allocator behind a byte budget.
    Tracking { budget: Option<u64> },
}

#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum Initial {
    #[default]
    Default,
    Sized {
        size: usize,
    },
    Unallocated,
    /// Starts on caller-owned memory of `size` bytes.
    Adopt {
        size: usize,
    },
}

#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Step {
    Push { data: Payload },
    Append { data: Payload },
    Pop { len: usize },
    Reserve { len: usize },
    Reset,
    Clear,
    Resize { size: usize },
    Duplicate,
    ReleaseStorage,
}

impl Step {
    pub fn name(&self) -> &'static str {
        match self {
            Step::Push { .. } => "push",
            Step::Append { .. } => "append",
            Step::Pop { .. } => "pop",
            Step::Reserve { .. } => "reserve",
            Step::Reset => "reset",
            Step::Clear => "clear",
            Step::Resize { .. } => "resize",
            Step::Duplicate => "duplicate",
            Step::ReleaseStorage => "release_storage",
        }
    }
}

/// Bytes for push and append: either literal text or `len` copies of `byte`.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(untagged)]
pub enum Payload {
    Text(String),
    Fill {
        len: usize,
        #[serde(default)]
        byte: u8,
    },
}

impl Payload {
    pub fn to_bytes(&self) -> Vec<u8> {
        match self {
            Payload::Text(text) => text.as_bytes().to_vec(),
            Payload::Fill { len, byte } => vec![*byte; *len],
        }
    }
}

/// Buffer state after one step.
#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
pub struct StepReport {
    pub index: usize,
    pub op: &'static str,
    pub used: usize,
    pub capacity: usize,
    pub local: bool,
    pub allocated: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub popped: Option<Vec<u8>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl Workload {
    pub fn load(path: &Path) -> Result<Workload, WorkloadError> {
        let display = path.display().to_string();
        log::debug!("reading workload from {display}");
        let contents = std::fs::read_to_string(path).map_err(|source| WorkloadError::Read {
            path: display.clone(),
            source,
        })?;
        Workload::parse(&contents).map_err(|source| WorkloadError::Parse {
            path: display,
            source,
        })
    }

    pub fn parse(contents: &str) -> Result<Workload, serde_json::Error> {
        serde_json::from_str(contents)
    }

    /// Runs every step against a buffer backed by `alloc`.
    ///
    /// With `keep_going`, failed steps are recorded in their report and execution
    /// continues; otherwise the first failure ends the run.
    pub fn execute<A>(&self, alloc: A, keep_going: bool) -> Result<Vec<StepReport>, WorkloadError>
    where
        A: Allocator + Clone,
    {
        let mut external = match self.initial {
            Initial::Adopt { size } if size < MIN_SIZE => {
                return Err(WorkloadError::Invalid(format!(
                    "adopted memory must hold at least {MIN_SIZE} bytes, got {size}"
                )));
            }
            Initial::Adopt { size } => vec![0u8; size],
            _ => Vec::new(),
        };
        let mut buf = match self.initial {
            Initial::Default => FlexBuffer::new_in(alloc),
            Initial::Sized { size } => FlexBuffer::with_capacity_in(size, alloc),
            Initial::Unallocated => Ok(FlexBuffer::unallocated_in(alloc)),
            Initial::Adopt { .. } => Ok(FlexBuffer::adopt_in(&mut external, alloc)),
        }
        .map_err(|source| WorkloadError::Step {
            index: 0,
            op: "create",
            source,
        })?;
        log::info!(
            "created buffer: capacity={} local={}",
            buf.capacity(),
            buf.is_local()
        );

        let mut reports = Vec::with_capacity(self.steps.len());
        for (i, step) in self.steps.iter().enumerate() {
            let index = i + 1;
            let (popped, result) = apply(&mut buf, step);
            if let Err(source) = result {
                log::warn!("step {index} ({}) failed: {source}", step.name());
                if !keep_going {
                    return Err(WorkloadError::Step {
                        index,
                        op: step.name(),
                        source,
                    });
                }
            }
            let report = StepReport {
                index,
                op: step.name(),
                used: buf.used(),
                capacity: buf.capacity(),
                local: buf.is_local(),
                allocated: buf.is_allocated(),
                popped,
                error: result.err().map(|e| e.to_string()),
            };
            log::debug!("{report:?}");
            reports.push(report);
        }
        Ok(reports)
    }
}

fn apply<A>(buf: &mut FlexBuffer<'_, A>, step: &Step) -> (Option<Vec<u8>>, Result<(), AllocError>)
where
    A: Allocator + Clone,
{
    let result = match step {
        Step::Push { data } => buf.push(&data.to_bytes()),
        Step::Append { data } => {
            if !buf.is_allocated() {
                log::warn!("append on a buffer without storage; allocating as push would");
                buf.push(&data.to_bytes())
            } else {
                buf.append(&data.to_bytes())
            }
        }
        Step::Pop { len } => {
            let popped = buf.pop_bytes(*len).map(<[u8]>::to_vec);
            if popped.is_none() {
                log::info!("pop of {len} bytes skipped: only {} in use", buf.used());
            }
            return (popped, Ok(()));
        }
        Step::Reserve { len } => buf.reserve(*len).map(|_| ()),
        Step::Reset => {
            buf.reset();
            Ok(())
        }
        Step::Clear => {
            buf.clear();
            Ok(())
        }
        Step::Resize { size } => buf.resize(*size),
        Step::Duplicate => buf.duplicate().map(|dup| {
            log::info!(
                "duplicate: used={} capacity={}",
                dup.used(),
                dup.capacity()
            );
        }),
        Step::ReleaseStorage => {
            buf.release_storage();
            Ok(())
        }
    };
    (None, result)
}

#[cfg(test)]
mod tests {
    use flexer::{DEFAULT_SIZE, TrackingAllocator};

    use super::*;

    const SCENARIO: &str = r#"{
        "allocator": { "kind": "system" },
        "initial": { "mode": "sized", "size": 12 },
        "steps": [
            { "op": "push", "data": "text\u0000" },
            { "op": "reset" },
            { "op": "resize", "size": 16 },
            { "op": "push", "data": "text\u0000" },
            { "op": "pop", "len": 5 },
            { "op": "pop", "len": 1 }
        ]
    }"#;

    #[test]
    fn test_parse_workload() {
        let workload = Workload::parse(SCENARIO).unwrap();
        assert_eq!(workload.allocator, AllocatorKind::System);
        assert_eq!(workload.initial, Initial::Sized { size: 12 });
        assert_eq!(workload.steps.len(), 6);
        assert_eq!(
            workload.steps[0],
            Step::Push {
                data: Payload::Text("text\0".to_string())
            }
        );

        let workload = Workload::parse(
            r#"{ "steps": [ { "op": "append", "data": { "len": 3, "byte": 7 } }, { "op": "release_storage" } ] }"#,
        )
        .unwrap();
        assert_eq!(workload.allocator, AllocatorKind::Default);
        assert_eq!(workload.initial, Initial::Default);
        assert_eq!(
            workload.steps[0],
            Step::Append {
                data: Payload::Fill { len: 3, byte: 7 }
            }
        );
        assert_eq!(workload.steps[1], Step::ReleaseStorage);
    }

    #[test]
    fn test_parse_rejects_unknown_op() {
        assert!(Workload::parse(r#"{ "steps": [ { "op": "shrink" } ] }"#).is_err());
    }

    #[test]
    fn test_execute_scenario() {
        let workload = Workload::parse(SCENARIO).unwrap();
        let reports = workload.execute(flexer::SystemAllocator, false).unwrap();

        let states: Vec<_> = reports.iter().map(|r| (r.used, r.capacity)).collect();
        assert_eq!(states, [(5, 12), (0, 12), (0, 16), (5, 16), (0, 16), (0, 16)]);
        assert_eq!(reports[4].popped.as_deref(), Some(&b"text\0"[..]));
        assert_eq!(reports[5].popped, None);
    }

    #[test]
    fn test_execute_adopted_buffer() {
        let workload = Workload::parse(
            r#"{
                "initial": { "mode": "adopt", "size": 16 },
                "steps": [
                    { "op": "push", "data": { "len": 10 } },
                    { "op": "push", "data": { "len": 10 } },
                    { "op": "duplicate" },
                    { "op": "clear" }
                ]
            }"#,
        )
        .unwrap();
        let tracker = TrackingAllocator::new();
        let reports = workload.execute(&tracker, false).unwrap();
        assert!(reports[0].local);
        assert!(!reports[1].local);
        assert_eq!(reports[1].capacity, 32);
        assert_eq!(reports[3].used, 0);
        assert_eq!(tracker.live_allocations(), 0);
    }

    #[test]
    fn test_execute_budget_failure() {
        let workload = Workload::parse(
            r#"{
                "initial": { "mode": "unallocated" },
                "steps": [
                    { "op": "push", "data": "abc" },
                    { "op": "reserve", "len": 100 },
                    { "op": "append", "data": "d" }
                ]
            }"#,
        )
        .unwrap();

        let tracker = TrackingAllocator::with_budget(DEFAULT_SIZE as u64);
        let err = workload.execute(&tracker, false).unwrap_err();
        assert!(matches!(
            err,
            WorkloadError::Step {
                index: 2,
                op: "reserve",
                ..
            }
        ));

        let reports = workload.execute(&tracker, true).unwrap();
        assert_eq!(reports.len(), 3);
        assert!(reports[1].error.is_some());
        assert_eq!(reports[1].used, 3);
        assert_eq!(reports[2].used, 4);
        assert_eq!(tracker.live_bytes(), 0);
    }

    #[test]
    fn test_execute_rejects_tiny_adoption() {
        let workload = Workload::parse(r#"{ "initial": { "mode": "adopt", "size": 1 } }"#).unwrap();
        let err = workload.execute(flexer::SystemAllocator, false).unwrap_err();
        assert!(matches!(err, WorkloadError::Invalid(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = Workload::load(Path::new("/no/such/workload.json")).unwrap_err();
        assert!(matches!(err, WorkloadError::Read { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("workload.json");
        std::fs::write(&path, SCENARIO).unwrap();
        let workload = Workload::load(&path).unwrap();
        assert_eq!(workload.steps.len(), 6);

        std::fs::write(&path, "{ not json").unwrap();
        assert!(matches!(
            Workload::load(&path).unwrap_err(),
            WorkloadError::Parse { .. }
        ));
    }
}
