//! Runtime graph items: `Data`, `Task`, and `Cycle` records produced by the
//! workflow builder.

use serde::Serialize;

use crate::config::{CliArgElement, DataKind, ReferenceSpec};
use crate::coord::Coordinate;
use crate::store::GraphItem;

/// A data node: either an `available` input present before the workflow
/// runs, or `generated` by some task during a cycle.
#[derive(Clone, Debug, Serialize)]
pub struct Data {
    pub name: String,
    pub coordinate: Coordinate,
    pub kind: DataKind,
    pub src: String,
    pub available: bool,
}

impl GraphItem for Data {
    fn item_name(&self) -> &str {
        &self.name
    }
    fn coordinate(&self) -> &Coordinate {
        &self.coordinate
    }
}

/// Plugin-specific payload for a Task, discriminated by `config.plugin`.
#[derive(Clone, Debug, Serialize)]
pub enum TaskSpec {
    Shell {
        command: Option<String>,
        cli_arguments: Option<Vec<CliArgElement>>,
        env_source_files: Vec<String>,
    },
    Icon {
        uenv: Option<String>,
        namelists: Vec<String>,
    },
}

/// A reference to another Task, already resolved: a value clone of the
/// referenced (already-immutable) Task record, not a back-pointer into the
/// Store.
#[derive(Clone, Debug, Serialize)]
pub struct TaskRef {
    pub name: String,
    pub coordinate: Coordinate,
}

impl From<&Task> for TaskRef {
    fn from(task: &Task) -> Self {
        Self {
            name: task.name.clone(),
            coordinate: task.coordinate.clone(),
        }
    }
}

/// A task node. Immutable after construction except for the one-time
/// `wait_on` transition performed by pass 4 of the builder, which is modeled
/// as replacing this record (see [`Task::with_wait_on`]) rather than
/// mutating it in place.
#[derive(Clone, Debug, Serialize)]
pub struct Task {
    pub name: String,
    pub coordinate: Coordinate,
    pub spec: TaskSpec,
    pub host: Option<String>,
    pub account: Option<String>,
    pub nodes: Option<u32>,
    pub walltime: Option<String>,
    pub inputs: Vec<Data>,
    pub outputs: Vec<Data>,
    pub wait_on: Vec<TaskRef>,
}

impl Task {
    /// Returns a new record identical to `self` but with `wait_on` set. This
    /// is the only post-construction "mutation" a Task ever undergoes, and it
    /// happens exactly once, during pass 4.
    pub fn with_wait_on(self, wait_on: Vec<TaskRef>) -> Self {
        Self { wait_on, ..self }
    }
}

impl GraphItem for Task {
    fn item_name(&self) -> &str {
        &self.name
    }
    fn coordinate(&self) -> &Coordinate {
        &self.coordinate
    }
}

/// A cycle instance: one replay of a cycle's task-refs at a given date (or
/// no date, for a dateless cycle).
#[derive(Clone, Debug, Serialize)]
pub struct Cycle {
    pub name: String,
    pub coordinate: Coordinate,
    pub tasks: Vec<TaskRef>,
}

impl GraphItem for Cycle {
    fn item_name(&self) -> &str {
        &self.name
    }
    fn coordinate(&self) -> &Coordinate {
        &self.coordinate
    }
}

/// Pending wait-on specs for one task, recorded during pass 3 and drained by
/// pass 4. Keyed by the task's own coordinate-qualified identity.
pub struct PendingWaitOn {
    pub task_name: String,
    pub task_coordinate: Coordinate,
    pub specs: Vec<ReferenceSpec>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coord::CoordValue;

    #[test]
    fn with_wait_on_replaces_only_that_field() {
        let task = Task {
            name: "t".to_string(),
            coordinate: Coordinate::new(),
            spec: TaskSpec::Shell {
                command: Some("echo hi".to_string()),
                cli_arguments: None,
                env_source_files: vec![],
            },
            host: None,
            account: None,
            nodes: None,
            walltime: None,
            inputs: vec![],
            outputs: vec![],
            wait_on: vec![],
        };
        let other = Task {
            name: "u".to_string(),
            coordinate: {
                let mut c = Coordinate::new();
                c.insert("date", CoordValue::Date(crate::temporal::parse_date("2025-01-01").unwrap()));
                c
            },
            spec: TaskSpec::Shell {
                command: None,
                cli_arguments: None,
                env_source_files: vec![],
            },
            host: None,
            account: None,
            nodes: None,
            walltime: None,
            inputs: vec![],
            outputs: vec![],
            wait_on: vec![],
        };
        let linked = task.with_wait_on(vec![TaskRef::from(&other)]);
        assert_eq!(linked.wait_on.len(), 1);
        assert_eq!(linked.name, "t");
    }
}
