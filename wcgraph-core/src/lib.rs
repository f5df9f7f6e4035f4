//! wcgraph-core - periodic workflow unroller and dependency resolver
//!
//! This crate compiles a declarative description of a periodic scientific
//! workflow into a fully unrolled, statically resolvable dependency graph.
//!
//! # Overview
//!
//! - **config**: validated declarations of tasks, data, cycles, parameters,
//!   and reference specs, deserialized from the frozen YAML shape.
//! - **temporal**: ISO-8601 dates and durations.
//! - **coord**: coordinates and the coordinate-space cartesian-product
//!   enumerator.
//! - **array** / **store**: the coordinate-indexed containers every graph
//!   item lives in.
//! - **graph_items**: `Task`, `Data`, `Cycle` runtime records.
//! - **plugin**: the task-kind registry (`shell`, `icon`, ...).
//! - **builder**: the four-pass unrolling algorithm.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use wcgraph_core::Workflow;
//!
//! fn main() -> wcgraph_core::Result<()> {
//!     let workflow = Workflow::from_yaml_file("workflow.yml")?;
//!     for task in workflow.tasks.iter() {
//!         println!("{} @ {}", task.name, task.coordinate);
//!     }
//!     Ok(())
//! }
//! ```

pub mod array;
pub mod builder;
pub mod config;
pub mod coord;
pub mod error;
pub mod graph_items;
pub mod plugin;
pub mod store;
pub mod temporal;

pub use builder::Workflow;
pub use config::{ConfigError, WorkflowConfig};
pub use coord::{Coordinate, CoordSpace, CoordValue};
pub use error::{CoreError, Result};
pub use graph_items::{Cycle, Data, Task, TaskRef, TaskSpec};
pub use store::{GraphItem, Store};
pub use temporal::{Date, IsoDuration, TemporalError};
