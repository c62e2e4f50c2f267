use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    model::Plan,
    module::{Configuration, ParamId, PlanningError},
    oracle::GeometryOracle,
};

/// Offsets widening the steps a predicate constrains around its evaluation step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActiveRange {
    /// Offset of the first constrained step (usually `<= 0`).
    pub start: isize,
    /// Offset of the last constrained step (usually `>= 0`).
    pub end: isize,
}

impl ActiveRange {
    /// Constrains only the evaluation step.
    pub const POINT: Self = Self { start: 0, end: 0 };

    /// Creates a range.
    #[must_use]
    pub const fn new(start: isize, end: isize) -> Self {
        Self { start, end }
    }
}

impl Default for ActiveRange {
    fn default() -> Self {
        Self::POINT
    }
}

/// Repair strategy a predicate exposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResampleStrategy {
    /// Movement endpoints: re-plan the action's path to a (possibly new) target configuration.
    Transit,
    /// Grasp or placement pose: sweep end-effector orientations around the target.
    GraspPose,
    /// Approach/retreat window around a fixed end-effector pose.
    EeReachable {
        /// Robot parameter.
        robot: ParamId,
        /// Fixed end-effector pose symbol.
        ee_pose: ParamId,
        /// Putdown semantics (approach and retreat axes swapped).
        inverse: bool,
    },
    /// Collision with a known symbolic obstacle.
    Obstructs {
        /// Robot parameter.
        robot: ParamId,
    },
    /// Self-collision or collision with the static environment.
    EnvCollision {
        /// Robot parameter.
        robot: ParamId,
    },
}

impl ResampleStrategy {
    /// Short label for logs and reports.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Transit => "transit",
            Self::GraspPose => "grasp",
            Self::EeReachable { .. } => "ee_reachable",
            Self::Obstructs { .. } => "obstructs",
            Self::EnvCollision { .. } => "env_collision",
        }
    }
}

/// Read-only view handed to predicate tests.
#[derive(Clone, Copy)]
pub struct PredicateContext<'a> {
    /// Plan under test.
    pub plan: &'a Plan,
    /// Geometry oracle.
    pub oracle: &'a dyn GeometryOracle,
}

impl fmt::Debug for PredicateContext<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PredicateContext")
            .field("plan", &self.plan.id())
            .finish_non_exhaustive()
    }
}

impl<'a> PredicateContext<'a> {
    /// Creates a context.
    #[must_use]
    pub fn new(plan: &'a Plan, oracle: &'a dyn GeometryOracle) -> Self {
        Self { plan, oracle }
    }

    /// Full configuration of a robot at a step.
    pub fn configuration(&self, robot: ParamId, step: usize) -> Result<Configuration, PlanningError> {
        self.plan.configuration(robot, step)
    }
}

/// Boolean test over one time step of a plan, optionally repairable.
pub trait Predicate: fmt::Debug + Send + Sync {
    /// Predicate name (e.g. `EEReachable`).
    fn name(&self) -> &str;

    /// Steps constrained around the evaluation step.
    fn active_range(&self) -> ActiveRange {
        ActiveRange::POINT
    }

    /// Whether this predicate bounds how far in time a repair may reach.
    fn spatial_anchor(&self) -> bool {
        false
    }

    /// Evaluates the predicate at `step`. Undefined values evaluate to `false`.
    fn test(&self, ctx: &PredicateContext<'_>, step: usize) -> bool;

    /// Repair strategy, if the predicate can be resampled.
    fn resample(&self) -> Option<ResampleStrategy> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Always;

    impl Predicate for Always {
        fn name(&self) -> &str {
            "Always"
        }

        fn test(&self, _ctx: &PredicateContext<'_>, _step: usize) -> bool {
            true
        }
    }

    #[test]
    fn defaults_are_point_non_anchor_without_resample() {
        let pred = Always;
        assert_eq!(pred.active_range(), ActiveRange::POINT);
        assert!(!pred.spatial_anchor());
        assert!(pred.resample().is_none());
    }

    #[test]
    fn strategy_labels() {
        assert_eq!(ResampleStrategy::Transit.label(), "transit");
        assert_eq!(
            ResampleStrategy::EnvCollision { robot: ParamId(0) }.label(),
            "env_collision"
        );
    }
}
