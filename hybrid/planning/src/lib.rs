#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Hierarchical task-and-motion refinement planner: a best-first search over symbolic
//! skeletons and their continuous refinements, with predicate-driven trajectory repair.

/// Domain configuration and robot layouts.
#[path = "../config.rs"]
pub mod config;
/// Plan data model.
#[path = "../model/main.rs"]
pub mod model;
/// Identifiers, poses, errors and failure records.
#[path = "../module.rs"]
pub mod module;
/// Collaborator contracts.
#[path = "../oracle.rs"]
pub mod oracle;
/// Predicate contract and repair strategies.
#[path = "../predicate.rs"]
pub mod predicate;
/// Symbolic problems and plan prefixes.
#[path = "../problem.rs"]
pub mod problem;
/// Constraint-violation repair.
#[path = "../repair/main.rs"]
pub mod repair;
/// Planning runtime entry points.
#[path = "../main.rs"]
pub mod runtime;
/// Hybrid search driver.
#[path = "../search/main.rs"]
pub mod search;
/// Gantry reference collaborators.
#[path = "../sim/main.rs"]
pub mod sim;
/// Telemetry helpers for planning.
#[path = "../telemetry.rs"]
pub mod telemetry;

#[cfg(test)]
#[path = "../testing.rs"]
mod testing;

pub use config::{DomainConfig, RepairSettings, RobotLayout, SearchSettings};
pub use model::{Plan, PlanBuilder, SamplingTraceEntry};
pub use module::{Failure, FailureReport, PlanningError, Pose};
pub use oracle::{GeometryOracle, HlTranslator, LlRefiner, SubproblemBuilder};
pub use predicate::{Predicate, ResampleStrategy};
pub use problem::{FailureSubproblemBuilder, SymbolicProblem};
pub use repair::{RepairOutcome, Repairer};
pub use runtime::{plan, HybridPlanner};
pub use search::{Collaborators, SearchDriver, SearchOutcome, SearchReport};
pub use sim::Scene;
pub use telemetry::{PlanningTelemetry, PlanningTelemetryBuilder};
