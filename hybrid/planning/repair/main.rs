//! Constraint-violation repair: proposes new values for a bounded set of trajectory
//! cells around a failed predicate, using the geometry oracle.

/// Pick/place orientation sweep.
pub mod grasp;
/// Geometry and angle helpers shared by the strategies.
pub mod helper;
/// Random joint perturbation for collision predicates.
pub mod perturb;
/// Approach/retreat windows around an end-effector pose.
pub mod reachable;
/// Arc-length path resampling.
pub mod resample;
/// Movement endpoint re-planning.
pub mod transit;

use rand::{rngs::SmallRng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::json;

use plan_logging::LogLevel;

use crate::{
    config::RepairSettings,
    model::{CellWrite, Plan, SamplingTraceEntry},
    module::{Failure, ParamId, PlanningError},
    oracle::GeometryOracle,
    predicate::ResampleStrategy,
    telemetry::PlanningTelemetry,
};

pub use resample::{linear_interpolation, resample_path};

/// Why a predicate could not be repaired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Infeasibility {
    /// Predicate name.
    pub predicate: String,
    /// Violation step.
    pub step: usize,
    /// Action containing the step.
    pub action: String,
    /// Description.
    pub reason: String,
}

/// Cells changed by a successful repair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepairReport {
    /// Repaired predicate name.
    pub predicate: String,
    /// Strategy label.
    pub strategy: String,
    /// Violation step.
    pub step: usize,
    /// Written (and locked) cells.
    pub writes: Vec<CellWrite>,
}

impl RepairReport {
    /// Number of cells written.
    #[must_use]
    pub fn cells(&self) -> usize {
        self.writes.iter().map(|write| write.rows.len()).sum()
    }
}

/// Result of a repair call. Only contract violations surface as errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RepairOutcome {
    /// New values were written and locked.
    Repaired(RepairReport),
    /// This strategy gave up; another predicate failing at the same step may still be tried.
    Declined(Infeasibility),
    /// No repair is possible at this step; stop trying.
    Infeasible(Infeasibility),
}

impl RepairOutcome {
    /// True for [`RepairOutcome::Repaired`].
    #[must_use]
    pub const fn is_repaired(&self) -> bool {
        matches!(self, Self::Repaired(_))
    }

    /// Infeasibility details, if any.
    #[must_use]
    pub const fn infeasibility(&self) -> Option<&Infeasibility> {
        match self {
            Self::Repaired(_) => None,
            Self::Declined(info) | Self::Infeasible(info) => Some(info),
        }
    }
}

/// One strategy invocation: the failure being repaired and the shared inputs.
pub struct Attempt<'a> {
    /// Repair constants.
    pub settings: &'a RepairSettings,
    /// Geometry oracle.
    pub oracle: &'a dyn GeometryOracle,
    /// Binding and step under repair.
    pub failure: Failure,
}

impl Attempt<'_> {
    fn infeasibility(&self, reason: impl Into<String>) -> Infeasibility {
        Infeasibility {
            predicate: self.failure.predicate.clone(),
            step: self.failure.step,
            action: self.failure.action_name.clone(),
            reason: reason.into(),
        }
    }

    /// Strategy gave up.
    #[must_use]
    pub fn declined(&self, reason: impl Into<String>) -> RepairOutcome {
        RepairOutcome::Declined(self.infeasibility(reason))
    }

    /// Repair is impossible at this step.
    #[must_use]
    pub fn infeasible(&self, reason: impl Into<String>) -> RepairOutcome {
        RepairOutcome::Infeasible(self.infeasibility(reason))
    }

    /// Successful repair.
    #[must_use]
    pub fn repaired(&self, strategy: &str, ledger: Ledger) -> RepairOutcome {
        RepairOutcome::Repaired(RepairReport {
            predicate: self.failure.predicate.clone(),
            strategy: strategy.into(),
            step: self.failure.step,
            writes: ledger.writes,
        })
    }

    /// Trace entry for a proposal on `target`.
    #[must_use]
    pub fn trace_entry(&self, target: &str) -> SamplingTraceEntry {
        SamplingTraceEntry::new(
            target,
            self.failure.step,
            &self.failure.predicate,
            &self.failure.action_name,
        )
    }
}

/// Cells written during one attempt, locked together on commit.
#[derive(Debug, Default)]
pub struct Ledger {
    writes: Vec<CellWrite>,
}

impl Ledger {
    /// Records writes.
    pub fn extend(&mut self, writes: impl IntoIterator<Item = CellWrite>) {
        self.writes
            .extend(writes.into_iter().filter(|write| !write.is_empty()));
    }

    /// Locks every recorded cell.
    pub fn commit(&self, plan: &mut Plan) -> Result<(), PlanningError> {
        for write in &self.writes {
            plan.lock(write)?;
        }
        Ok(())
    }

    /// Recorded writes.
    #[must_use]
    pub fn writes(&self) -> &[CellWrite] {
        &self.writes
    }
}

pub(crate) fn all_finite(values: &[f64]) -> bool {
    values.iter().all(|value| value.is_finite())
}

pub(crate) fn join_config(base: &[f64], arm: &[f64]) -> Vec<f64> {
    let mut config = base.to_vec();
    config.extend_from_slice(arm);
    config
}

pub(crate) fn robot_name(plan: &Plan, robot: ParamId) -> Result<String, PlanningError> {
    Ok(plan.param(robot)?.name().to_string())
}

/// Dispatches a failure to the repair strategy of its predicate category.
pub struct Repairer {
    settings: RepairSettings,
    rng: SmallRng,
    telemetry: Option<PlanningTelemetry>,
}

impl std::fmt::Debug for Repairer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Repairer")
            .field("settings", &self.settings)
            .finish_non_exhaustive()
    }
}

impl Repairer {
    /// Creates a repairer with an entropy-seeded generator.
    #[must_use]
    pub fn new(settings: RepairSettings) -> Self {
        Self {
            settings,
            rng: SmallRng::from_entropy(),
            telemetry: None,
        }
    }

    /// Creates a repairer with a fixed seed, for reproducible perturbations.
    #[must_use]
    pub fn with_seed(settings: RepairSettings, seed: u64) -> Self {
        Self {
            settings,
            rng: SmallRng::seed_from_u64(seed),
            telemetry: None,
        }
    }

    /// Attaches telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: PlanningTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Repair constants.
    #[must_use]
    pub const fn settings(&self) -> &RepairSettings {
        &self.settings
    }

    /// Repairs the failed binding, falling back to the other bindings failing at the same
    /// step. A declined strategy moves on; a repair or outright infeasibility returns.
    pub fn repair(
        &mut self,
        plan: &mut Plan,
        failure: &Failure,
        oracle: &dyn GeometryOracle,
    ) -> Result<RepairOutcome, PlanningError> {
        let mut candidates = vec![failure.binding];
        candidates.extend(
            plan.failing_at(failure.step, oracle)
                .into_iter()
                .filter(|id| *id != failure.binding),
        );

        let mut declined = None;
        for binding in candidates {
            let current = plan
                .failure_for(binding, failure.step)
                .ok_or_else(|| PlanningError::Config(format!("unknown binding {}", binding.0)))?;
            let Some(strategy) = plan.binding(binding)?.predicate.resample() else {
                continue;
            };
            let attempt = Attempt {
                settings: &self.settings,
                oracle,
                failure: current,
            };
            let outcome = match strategy {
                ResampleStrategy::Transit => transit::repair(plan, &attempt)?,
                ResampleStrategy::GraspPose => grasp::repair(plan, &attempt)?,
                ResampleStrategy::EeReachable {
                    robot,
                    ee_pose,
                    inverse,
                } => reachable::repair(plan, &attempt, robot, ee_pose, inverse)?,
                ResampleStrategy::Obstructs { robot } => {
                    perturb::obstructs(plan, &attempt, robot, &mut self.rng)?
                }
                ResampleStrategy::EnvCollision { robot } => {
                    perturb::env_collision(plan, &attempt, robot, &mut self.rng)?
                }
            };
            self.log_outcome(strategy, &attempt.failure, &outcome);
            match outcome {
                RepairOutcome::Declined(info) => declined = Some(info),
                other => return Ok(other),
            }
        }

        Ok(RepairOutcome::Declined(declined.unwrap_or_else(|| {
            Infeasibility {
                predicate: failure.predicate.clone(),
                step: failure.step,
                action: failure.action_name.clone(),
                reason: "no resamplable predicate".into(),
            }
        })))
    }

    fn log_outcome(&self, strategy: ResampleStrategy, failure: &Failure, outcome: &RepairOutcome) {
        let Some(telemetry) = &self.telemetry else {
            return;
        };
        let (level, status) = match outcome {
            RepairOutcome::Repaired(_) => (LogLevel::Info, "repaired"),
            RepairOutcome::Declined(_) => (LogLevel::Debug, "declined"),
            RepairOutcome::Infeasible(_) => (LogLevel::Warn, "infeasible"),
        };
        let _ = telemetry.log(
            level,
            &format!("repair.{}.{status}", strategy.label()),
            json!({
                "predicate": failure.predicate,
                "step": failure.step,
                "action": failure.action_name,
                "reason": outcome.infeasibility().map(|info| info.reason.clone()),
                "cells": match outcome {
                    RepairOutcome::Repaired(report) => report.cells(),
                    _ => 0,
                },
            }),
        );
    }
}
