//! Collaborator contracts: geometry oracle, HL translator, LL refiner and the
//! failure-driven subproblem constructor.

use serde::{Deserialize, Serialize};

use crate::{
    model::Plan,
    module::{Configuration, Failure, Frame, PlanningError},
    problem::{PlanPrefix, SymbolicProblem},
};

/// Collision query result.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CollisionReport {
    /// No contact with the environment or self.
    pub free: bool,
    /// Distance to the nearest collision (negative when penetrating).
    pub distance: f64,
}

impl CollisionReport {
    /// True when free and at least `dsafe` away from any collision.
    #[must_use]
    pub fn clear_of(&self, dsafe: f64) -> bool {
        self.free && self.distance > dsafe
    }
}

/// Kinematics and collision oracle. `None` means infeasible, which is an expected
/// outcome rather than an error.
pub trait GeometryOracle: Send + Sync {
    /// Solves inverse kinematics for a manipulator frame with the base held at `base`.
    /// Returns arm joints only.
    fn solve_ik(&self, base: &[f64], target: &Frame, seed: &[f64]) -> Option<Configuration>;

    /// Plans a collision-free path between full configurations, endpoints included.
    fn plan_path(&self, start: &[f64], end: &[f64]) -> Option<Vec<Configuration>>;

    /// Collision status of a full configuration.
    fn test_collision(&self, config: &[f64]) -> CollisionReport;
}

/// Result of one refinement pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefineOutcome {
    /// Every free cell is assigned and every predicate holds.
    Solved,
    /// Earliest violated predicate.
    Failed(Failure),
}

/// Low-level refiner assigning values to free trajectory cells.
pub trait LlRefiner: Send {
    /// Refines `plan` in place. Locked cells must not be changed.
    fn refine(
        &mut self,
        plan: &mut Plan,
        oracle: &dyn GeometryOracle,
    ) -> Result<RefineOutcome, PlanningError>;
}

/// Translation request for one HL node expansion.
#[derive(Debug, Clone, Copy)]
pub struct TranslationRequest<'a> {
    /// Symbolic problem of the node.
    pub problem: &'a SymbolicProblem,
    /// How many skeletons this node already produced.
    pub revisit: usize,
    /// Repaired plan carried by a failure-derived node.
    pub seed: Option<&'a Plan>,
}

/// High-level translator producing plan skeletons.
pub trait HlTranslator: Send {
    /// Produces the next skeleton, or `None` once no further skeleton exists.
    fn translate(&mut self, request: TranslationRequest<'_>) -> Result<Option<Plan>, PlanningError>;
}

/// Builds the symbolic problem for a failure-derived HL node.
pub trait SubproblemBuilder: Send + Sync {
    /// Derives a problem from the committed prefix and the failure.
    fn build(
        &self,
        parent: &SymbolicProblem,
        prefix: &PlanPrefix,
        failure: &Failure,
    ) -> SymbolicProblem;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn clearance_requires_margin() {
        let report = CollisionReport {
            free: true,
            distance: 0.004,
        };
        assert!(!report.clear_of(5e-3));
        assert!(report.clear_of(1e-3));
        let touching = CollisionReport {
            free: false,
            distance: 1.0,
        };
        assert!(!touching.clear_of(0.0));
    }
}
