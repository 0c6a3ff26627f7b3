//! Task module - the plan graph data model.
//!
//! A plan is a flat collection of nodes. Composite nodes name their children
//! by id, and dependencies are ids as well, so the whole plan lives in one
//! `TaskGraph` arena that the scheduler mutates in place.

mod graph;
mod node;
mod render;

pub use graph::{GraphError, TaskGraph};
pub use node::{TaskId, TaskKind, TaskNode, TaskStatus};
pub use render::{render_plan, render_summary};
