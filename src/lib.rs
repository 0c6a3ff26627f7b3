//! # kyros
//!
//! Desktop task automation driven by planned task graphs.
//!
//! This library provides:
//! - A task graph model: composite tasks, tool calls and replan markers
//! - A sequential scheduler honoring subtasks and dependencies
//! - Screen-change verification around tasks whose success must be visible
//! - A retry/replan driver around an LLM planner
//!
//! ## Architecture
//!
//! ```text
//!        ┌──────────────────────────────────┐
//!        │             Driver               │
//!        │  (attempts, history, replanning) │
//!        └───────┬──────────────────┬───────┘
//!                │                  │
//!                ▼                  ▼
//!        ┌──────────────┐   ┌──────────────┐
//!        │   Planner    │   │  Scheduler   │──► ChangeOracle
//!        │ (LLM, JSON)  │   │ (task graph) │
//!        └──────────────┘   └──────┬───────┘
//!                                  ▼
//!                           ┌──────────────┐
//!                           │ ToolRegistry │
//!                           └──────────────┘
//! ```
//!
//! ## Modules
//! - `task`: Task nodes, the graph arena and rendering
//! - `executor`: The scheduler and progress board
//! - `verify`: Screen-change oracles
//! - `tools`: Tool trait, registry and desktop/shell tools
//! - `planner`: Planner trait, attempt history and the LLM planner
//! - `driver`: Retry/replan loop
//! - `llm`: OpenRouter client
//! - `config`: Environment configuration

pub mod config;
pub mod driver;
pub mod executor;
pub mod llm;
pub mod planner;
pub mod task;
pub mod tools;
pub mod verify;

#[cfg(test)]
pub(crate) mod testing;

pub use config::Config;
pub use driver::Driver;
pub use executor::{Outcome, ProgressBoard, Scheduler, SchedulerConfig};
pub use planner::{History, LlmPlanner, Planner};
pub use task::{TaskGraph, TaskId, TaskKind, TaskNode, TaskStatus};
pub use tools::{Tool, ToolRegistry};
