//! The four-pass workflow builder: unrolls a [`WorkflowConfig`] into a fully
//! resolved, coordinate-indexed [`Workflow`].

use indexmap::IndexMap;
use tracing::{debug, info, instrument, warn};

use crate::config::{CycleDecl, DataDecl, ParamDecl, TaskDecl, WorkflowConfig};
use crate::coord::{CoordSpace, Coordinate, CoordValue};
use crate::error::{CoreError, Result};
use crate::graph_items::{Cycle, Data, PendingWaitOn, Task, TaskRef, TaskSpec};
use crate::plugin::PluginRegistry;
use crate::store::Store;
use crate::temporal::Date;

/// The fully unrolled workflow: three coordinate-indexed Stores plus the
/// parameter declarations they were built against.
#[derive(Clone, Debug)]
pub struct Workflow {
    pub name: String,
    pub parameters: IndexMap<String, ParamDecl>,
    pub tasks: Store<Task>,
    pub data: Store<Data>,
    pub cycles: Store<Cycle>,
}

impl Workflow {
    pub fn from_yaml_str(raw: &str) -> Result<Self> {
        let config = WorkflowConfig::from_yaml_str(raw)?;
        Self::build(&config)
    }

    pub fn from_yaml_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml_str(&raw)
    }

    /// Runs the four-pass unrolling algorithm against an already-validated
    /// configuration. Never panics on malformed-but-well-typed input; every
    /// failure is returned as a `CoreError` and no partial Workflow escapes.
    #[instrument(skip(config), fields(workflow = %config.name))]
    pub fn build(config: &WorkflowConfig) -> Result<Self> {
        let registry = PluginRegistry::with_builtins();

        let tasks_by_name: IndexMap<&str, &TaskDecl> =
            config.tasks.iter().map(|t| (t.name.as_str(), t)).collect();
        let generated_by_name: IndexMap<&str, &DataDecl> =
            config.generated_data.iter().map(|d| (d.name.as_str(), d)).collect();

        let mut data_store: Store<Data> = Store::new();
        let mut tasks_store: Store<Task> = Store::new();
        let mut cycles_store: Store<Cycle> = Store::new();
        let mut pending: Vec<PendingWaitOn> = Vec::new();

        info!(count = config.available_data.len(), "pass 1: available data");
        for decl in &config.available_data {
            let axes = resolve_axes(&decl.parameters, &config.parameters, "available data")?;
            let space = CoordSpace::new(axes, None);
            for coord in space.iter() {
                debug!(name = %decl.name, %coord, "available data instance");
                data_store.add(data_from_decl(decl, coord))?;
            }
        }

        info!(count = config.cycles.len(), "pass 2: generated data");
        for cycle in &config.cycles {
            for date in cycle_dates(cycle) {
                for task_ref in &cycle.tasks {
                    for output_spec in &task_ref.outputs {
                        let decl = generated_by_name.get(output_spec.name.as_str()).ok_or_else(|| {
                            CoreError::NotFound {
                                what: "generated data",
                                name: output_spec.name.clone(),
                            }
                        })?;
                        let axes = resolve_axes(&decl.parameters, &config.parameters, "generated data")?;
                        let space = CoordSpace::new(axes, Some(date));
                        for coord in space.iter() {
                            debug!(name = %decl.name, %coord, "generated data instance");
                            data_store.add(data_from_decl(decl, coord))?;
                        }
                    }
                }
            }
        }

        info!("pass 3: tasks and cycles");
        for cycle in &config.cycles {
            for date in cycle_dates(cycle) {
                let mut cycle_tasks = Vec::new();
                for task_ref in &cycle.tasks {
                    let decl = *tasks_by_name.get(task_ref.name.as_str()).ok_or_else(|| CoreError::NotFound {
                        what: "task",
                        name: task_ref.name.clone(),
                    })?;
                    let kind = registry.resolve(&decl.plugin)?;
                    let axes = resolve_axes(&decl.parameters, &config.parameters, "task")?;
                    let space = CoordSpace::new(axes, Some(date));
                    for coord in space.iter() {
                        let mut inputs = Vec::new();
                        for input_spec in &task_ref.inputs {
                            let resolved = data_store.iter_from_spec(input_spec, &coord)?;
                            inputs.extend(resolved.into_iter().cloned());
                        }
                        let mut outputs = Vec::new();
                        for output_spec in &task_ref.outputs {
                            let item = data_store.get(&output_spec.name, &coord).map_err(|_| {
                                CoreError::UnresolvedOutput {
                                    task: decl.name.clone(),
                                    output: output_spec.name.clone(),
                                    coord: coord.clone(),
                                }
                            })?;
                            outputs.push(item.clone());
                        }
                        let task = Task {
                            name: decl.name.clone(),
                            coordinate: coord.clone(),
                            spec: task_spec_from_decl(kind, decl),
                            host: decl.host.clone(),
                            account: decl.account.clone(),
                            nodes: decl.nodes,
                            walltime: decl.walltime.clone(),
                            inputs,
                            outputs,
                            wait_on: Vec::new(),
                        };
                        debug!(name = %decl.name, %coord, "task instance");
                        tasks_store.add(task)?;
                        cycle_tasks.push(TaskRef {
                            name: decl.name.clone(),
                            coordinate: coord.clone(),
                        });
                        if !task_ref.wait_on.is_empty() {
                            pending.push(PendingWaitOn {
                                task_name: decl.name.clone(),
                                task_coordinate: coord,
                                specs: task_ref.wait_on.clone(),
                            });
                        }
                    }
                }
                let mut cycle_coord = Coordinate::new();
                cycle_coord.insert("date", CoordValue::Date(date));
                cycles_store.add(Cycle {
                    name: cycle.name.clone(),
                    coordinate: cycle_coord,
                    tasks: cycle_tasks,
                })?;
            }
        }

        info!(count = pending.len(), "pass 4: wait-on linking");
        for item in &pending {
            let mut wait_on = Vec::new();
            for spec in &item.specs {
                let resolved = tasks_store.iter_from_spec(spec, &item.task_coordinate)?;
                if resolved.is_empty() {
                    warn!(task = %item.task_name, target = %spec.name, "wait-on guard excluded all targets");
                }
                wait_on.extend(resolved.into_iter().map(TaskRef::from));
            }
            let current = tasks_store.get(&item.task_name, &item.task_coordinate)?.clone();
            let linked = current.with_wait_on(wait_on);
            tasks_store.replace(&item.task_name, &item.task_coordinate, linked)?;
        }

        Ok(Workflow {
            name: config.name.clone(),
            parameters: config.parameters.clone(),
            tasks: tasks_store,
            data: data_store,
            cycles: cycles_store,
        })
    }
}

fn data_from_decl(decl: &DataDecl, coordinate: Coordinate) -> Data {
    Data {
        name: decl.name.clone(),
        coordinate,
        kind: decl.kind,
        src: decl.src.clone(),
        available: decl.available,
    }
}

fn task_spec_from_decl(kind: crate::config::PluginKind, decl: &TaskDecl) -> TaskSpec {
    match kind {
        crate::config::PluginKind::Shell => TaskSpec::Shell {
            command: decl.command.clone(),
            cli_arguments: decl.cli_arguments.clone(),
            env_source_files: decl.env_source_files.clone(),
        },
        crate::config::PluginKind::Icon => TaskSpec::Icon {
            uenv: decl.uenv.clone(),
            namelists: decl.namelists.clone(),
        },
    }
}

fn resolve_axes<'a>(
    names: &[String],
    parameters: &'a IndexMap<String, ParamDecl>,
    context: &str,
) -> Result<Vec<&'a ParamDecl>> {
    names
        .iter()
        .map(|n| {
            parameters.get(n).ok_or_else(|| {
                CoreError::ConfigInvalid(crate::config::ConfigError::Invalid {
                    context: context.to_string(),
                    message: format!("unknown parameter \"{n}\""),
                })
            })
        })
        .collect()
}

/// Yields `start_date`, then advances by `period` while the next date lands
/// strictly inside `[start_date, end_date)`. A cycle with no period produces
/// exactly one instance.
fn cycle_dates(cycle: &CycleDecl) -> Vec<Date> {
    let mut dates = vec![cycle.start_date];
    if let Some(period) = cycle.period {
        let mut current = cycle.start_date;
        loop {
            let next = current + period;
            if next < cycle.end_date {
                dates.push(next);
                current = next;
            } else {
                break;
            }
        }
    }
    dates
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(yaml: &str) -> Result<Workflow> {
        Workflow::from_yaml_str(yaml)
    }

    #[test]
    fn scalar_pass_through() {
        let yaml = r#"
name: scalar
data:
  available:
    - a: {type: file, src: a.nc}
  generated:
    - b: {type: file, src: b.nc}
tasks:
  - t: {plugin: shell, command: echo hi}
cycles:
  - main:
      start_date: "2025-01-01T00:00:00"
      end_date: "2025-01-01T00:00:00"
      tasks:
        - t:
            inputs: [a]
            outputs: [b]
"#;
        let wf = build(yaml).unwrap();
        assert_eq!(wf.tasks.len(), 1);
        let task = wf.tasks.iter().next().unwrap();
        assert_eq!(task.inputs.len(), 1);
        assert_eq!(task.outputs.len(), 1);
        assert!(task.wait_on.is_empty());
    }

    #[test]
    fn two_step_periodic_wait_on_guarded() {
        let yaml = r#"
name: periodic
data:
  generated:
    - restart: {type: file, src: restart.nc}
tasks:
  - preproc: {plugin: shell, command: echo pre}
  - icon: {plugin: icon}
cycles:
  - main:
      start_date: "2025-01-01"
      end_date: "2025-07-01"
      period: P2M
      tasks:
        - preproc:
            outputs: [restart]
        - icon:
            wait_on:
              - preproc:
                  lag: -P2M
                  when:
                    after: "2025-01-01"
"#;
        let wf = build(yaml).unwrap();
        let first_date = crate::temporal::parse_date("2025-01-01").unwrap();
        let third_date = crate::temporal::parse_date("2025-05-01").unwrap();

        let mut first_coord = Coordinate::new();
        first_coord.insert("date", CoordValue::Date(first_date));
        let icon_first = wf.tasks.get("icon", &first_coord).unwrap();
        assert!(icon_first.wait_on.is_empty());

        let mut third_coord = Coordinate::new();
        third_coord.insert("date", CoordValue::Date(third_date));
        let icon_third = wf.tasks.get("icon", &third_coord).unwrap();
        assert_eq!(icon_third.wait_on.len(), 1);
    }

    #[test]
    fn parameter_broadcast_preserves_declared_order() {
        let yaml = r#"
name: broadcast
parameters:
  member: [a, b, c]
data:
  generated:
    - d: {type: file, src: d.nc, parameters: [member]}
tasks:
  - t: {plugin: shell, command: echo hi, parameters: [member]}
cycles:
  - main:
      start_date: "2025-01-01"
      end_date: "2025-01-01"
      tasks:
        - t:
            inputs:
              - d:
                  parameters: {member: all}
            outputs: [d]
"#;
        let wf = build(yaml).unwrap();
        // one task instance per member value; each sees the full broadcast.
        assert_eq!(wf.tasks.len(), 3);
        for task in wf.tasks.iter() {
            assert_eq!(task.inputs.len(), 3);
        }
    }

    #[test]
    fn duplicate_available_data_rejected() {
        let yaml = r#"
data:
  available:
    - a: {type: file, src: a.nc}
    - a: {type: file, src: a2.nc}
tasks: []
cycles: []
"#;
        let err = build(yaml).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateKey { .. }));
    }

    #[test]
    fn date_dim_misuse_rejected() {
        let yaml = r#"
data:
  available:
    - a: {type: file, src: a.nc}
tasks:
  - t: {plugin: shell, command: echo hi}
cycles:
  - main:
      start_date: "2025-01-01"
      end_date: "2025-01-01"
      tasks:
        - t:
            inputs:
              - a:
                  lag: P1D
"#;
        let err = build(yaml).unwrap_err();
        assert!(matches!(err, CoreError::DateDimMissing(_)));
    }

    #[test]
    fn period_absent_yields_one_instance() {
        let yaml = r#"
data: {}
tasks:
  - t: {plugin: shell, command: echo hi}
cycles:
  - main:
      start_date: "2025-01-01"
      end_date: "2025-12-31"
      tasks:
        - t: {}
"#;
        let wf = build(yaml).unwrap();
        assert_eq!(wf.cycles.len(), 1);
        assert_eq!(wf.tasks.len(), 1);
    }
}
