use std::fmt;

use glam::{DMat3, DVec3, EulerRot};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Joint-space configuration (base dimensions followed by arm joints).
pub type Configuration = Vec<f64>;

/// Index of a parameter inside its owning plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ParamId(pub usize);

/// Index of an action inside its owning plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ActionId(pub usize);

/// Index of a predicate binding inside its owning plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BindingId(pub usize);

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "param#{}", self.0)
    }
}

impl fmt::Display for ActionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action#{}", self.0)
    }
}

/// Rigid pose: position plus yaw/pitch/roll rotation (ZYX Euler angles).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Pose {
    /// Cartesian position.
    pub position: DVec3,
    /// Yaw, pitch, roll in radians.
    pub rotation: DVec3,
}

impl Pose {
    /// Creates a pose.
    #[must_use]
    pub const fn new(position: DVec3, rotation: DVec3) -> Self {
        Self { position, rotation }
    }

    /// Builds a pose from flat `[x, y, z]` and `[yaw, pitch, roll]` slices.
    pub fn from_slices(position: &[f64], rotation: &[f64]) -> Result<Self, PlanningError> {
        if position.len() != 3 || rotation.len() != 3 {
            return Err(PlanningError::DimensionMismatch {
                what: "pose".into(),
                expected: 3,
                actual: if position.len() == 3 {
                    rotation.len()
                } else {
                    position.len()
                },
            });
        }
        Ok(Self::new(
            DVec3::new(position[0], position[1], position[2]),
            DVec3::new(rotation[0], rotation[1], rotation[2]),
        ))
    }

    /// Rotation matrix of the pose frame.
    #[must_use]
    pub fn basis(&self) -> DMat3 {
        DMat3::from_euler(
            EulerRot::ZYX,
            self.rotation.x,
            self.rotation.y,
            self.rotation.z,
        )
    }
}

/// Position plus orientation matrix, as handed to inverse kinematics.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Origin.
    pub position: DVec3,
    /// Columns are the frame axes in world coordinates.
    pub basis: DMat3,
}

impl Frame {
    /// Creates a frame.
    #[must_use]
    pub const fn new(position: DVec3, basis: DMat3) -> Self {
        Self { position, basis }
    }

    /// Frame of a pose.
    #[must_use]
    pub fn of(pose: &Pose) -> Self {
        Self::new(pose.position, pose.basis())
    }

    /// Same orientation, moved by `offset`.
    #[must_use]
    pub fn translated(&self, offset: DVec3) -> Self {
        Self::new(self.position + offset, self.basis)
    }
}

/// Contract violations and configuration faults. Expected geometric infeasibility is
/// never reported through this type.
#[derive(Debug, Error, Clone, PartialEq)]
pub enum PlanningError {
    /// A parameter name or id does not exist in the plan.
    #[error("unknown parameter: {0}")]
    UnknownParameter(String),
    /// The parameter has no attribute with that name.
    #[error("parameter {param} has no attribute {attr}")]
    UnknownAttribute {
        /// Parameter name.
        param: String,
        /// Missing attribute.
        attr: String,
    },
    /// A time step falls outside the plan horizon.
    #[error("time step {step} outside horizon {horizon}")]
    StepOutOfRange {
        /// Offending step.
        step: usize,
        /// Plan horizon.
        horizon: usize,
    },
    /// Vector lengths disagree with the attribute layout.
    #[error("{what}: expected dimension {expected}, got {actual}")]
    DimensionMismatch {
        /// Context of the mismatch.
        what: String,
        /// Expected length.
        expected: usize,
        /// Provided length.
        actual: usize,
    },
    /// Action ranges are empty, unordered, or overlap beyond a shared boundary.
    #[error("malformed action {action}: {reason}")]
    MalformedAction {
        /// Action name.
        action: String,
        /// Description.
        reason: String,
    },
    /// An action lacks the operand a repair strategy needs.
    #[error("action {action} is missing operand {role}")]
    MissingOperand {
        /// Action name.
        action: String,
        /// Operand role.
        role: &'static str,
    },
    /// Robot layout table has no entry for the requested robot.
    #[error("no attribute layout for robot type {0}")]
    UnknownLayout(String),
    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    Config(String),
}

/// Terminal outcome of a search that did not return a plan.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureReport {
    /// The initial problem already satisfies its goal; nothing to plan.
    GoalAlreadySatisfied,
    /// `max_iter` expansions ran without success.
    IterationLimitReached,
    /// Every node was exhausted without a refinable skeleton.
    NoFeasibleRefinement,
    /// Cooperative cancellation was requested between iterations.
    Cancelled,
}

impl FailureReport {
    /// Human-readable reason.
    #[must_use]
    pub const fn reason(self) -> &'static str {
        match self {
            Self::GoalAlreadySatisfied => "goal already satisfied",
            Self::IterationLimitReached => "iteration limit reached",
            Self::NoFeasibleRefinement => "no feasible refinement",
            Self::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for FailureReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.reason())
    }
}

/// Earliest violated predicate found by refinement.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    /// Violated binding.
    pub binding: BindingId,
    /// Predicate name, for reporting.
    pub predicate: String,
    /// Time step of the violation.
    pub step: usize,
    /// Action whose range contains the step.
    pub action: ActionId,
    /// Name of that action.
    pub action_name: String,
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} violated at t={} in {}",
            self.predicate, self.step, self.action_name
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn basis_applies_yaw_first() {
        let pose = Pose::new(DVec3::ZERO, DVec3::new(FRAC_PI_2, 0.0, 0.0));
        let x = pose.basis() * DVec3::X;
        assert!((x - DVec3::Y).length() < 1e-9);
    }

    #[test]
    fn from_slices_rejects_short_input() {
        let err = Pose::from_slices(&[0.0, 1.0], &[0.0, 0.0, 0.0]).unwrap_err();
        assert!(matches!(err, PlanningError::DimensionMismatch { actual: 2, .. }));
    }

    #[test]
    fn reasons_are_stable() {
        assert_eq!(
            FailureReport::GoalAlreadySatisfied.to_string(),
            "goal already satisfied"
        );
        assert_eq!(
            FailureReport::NoFeasibleRefinement.reason(),
            "no feasible refinement"
        );
    }
}
