use std::{
    f64::consts::FRAC_PI_3,
    fs,
    path::{Path, PathBuf},
};

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::module::PlanningError;

/// Name and width of one trajectory attribute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttrSpec {
    /// Attribute name as stored on parameters (e.g. `rArmPose`).
    pub attr: String,
    /// Number of rows.
    pub dim: usize,
}

/// Arm attribute with joint limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArmSpec {
    /// Attribute name.
    pub attr: String,
    /// Lower joint limits, one per joint.
    pub lower: Vec<f64>,
    /// Upper joint limits, one per joint.
    pub upper: Vec<f64>,
    /// Indices of revolute joints, wrapped when comparing IK solutions.
    #[serde(default)]
    pub revolute: Vec<usize>,
}

impl ArmSpec {
    /// Number of arm joints.
    #[must_use]
    pub fn dim(&self) -> usize {
        self.lower.len()
    }

    /// Per-joint range divided by `divisor`.
    #[must_use]
    pub fn joint_step(&self, divisor: f64) -> Vec<f64> {
        self.lower
            .iter()
            .zip(&self.upper)
            .map(|(lo, hi)| (hi - lo) / divisor)
            .collect()
    }
}

/// Per-robot attribute layout, supplied as data rather than per-robot code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotLayout {
    /// Base pose attribute (leading entries of a configuration).
    pub base: AttrSpec,
    /// Arm joint attribute.
    pub arm: ArmSpec,
    /// Optional gripper aperture attribute.
    #[serde(default)]
    pub gripper: Option<AttrSpec>,
}

impl RobotLayout {
    /// Width of a full configuration (`base ++ arm`).
    #[must_use]
    pub fn config_dim(&self) -> usize {
        self.base.dim + self.arm.dim()
    }

    /// Attribute names and widths in storage order.
    #[must_use]
    pub fn attributes(&self) -> Vec<(String, usize)> {
        let mut attrs = vec![
            (self.base.attr.clone(), self.base.dim),
            (self.arm.attr.clone(), self.arm.dim()),
        ];
        if let Some(gripper) = &self.gripper {
            attrs.push((gripper.attr.clone(), gripper.dim));
        }
        attrs
    }

    /// Checks limits and widths.
    pub fn validate(&self, name: &str) -> Result<(), PlanningError> {
        if self.arm.lower.len() != self.arm.upper.len() {
            return Err(PlanningError::Config(format!(
                "robot {name}: {} lower limits vs {} upper limits",
                self.arm.lower.len(),
                self.arm.upper.len()
            )));
        }
        if self.arm.dim() == 0 {
            return Err(PlanningError::Config(format!("robot {name}: arm has no joints")));
        }
        if self
            .arm
            .lower
            .iter()
            .zip(&self.arm.upper)
            .any(|(lo, hi)| lo > hi)
        {
            return Err(PlanningError::Config(format!(
                "robot {name}: lower limit above upper limit"
            )));
        }
        if let Some(joint) = self.arm.revolute.iter().find(|joint| **joint >= self.arm.dim()) {
            return Err(PlanningError::Config(format!(
                "robot {name}: revolute joint {joint} out of range"
            )));
        }
        if self.base.attr == self.arm.attr {
            return Err(PlanningError::Config(format!(
                "robot {name}: base and arm share attribute {}",
                self.arm.attr
            )));
        }
        Ok(())
    }
}

/// Constants used by the repair strategies.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RepairSettings {
    /// Offset per approach step.
    pub approach_dist: f64,
    /// Offset per retreat step.
    pub retreat_dist: f64,
    /// Approach and retreat steps on each side of a grasp step.
    pub ee_reachable_steps: usize,
    /// Number of grasp orientations swept around a target.
    pub ee_angle_samples: usize,
    /// First angle of the sweep.
    pub ee_angle_phase: f64,
    /// Joint range divisor for obstruction perturbations.
    pub obstruct_joint_divisor: f64,
    /// Initial joint range divisor for environment-collision perturbations.
    pub collision_joint_divisor: f64,
    /// Failed attempts between step reductions.
    pub collision_attempts_per_decay: usize,
    /// Step reduction factor.
    pub collision_step_decay: f64,
    /// Half width of the re-interpolation window.
    pub collision_window: usize,
    /// Bound on perturbation attempts for a single repair.
    pub max_perturbation_attempts: usize,
    /// Safety distance for collision checks.
    pub dsafe: f64,
    /// Numeric tolerance for equality tests.
    pub tolerance: f64,
}

impl Default for RepairSettings {
    fn default() -> Self {
        Self {
            approach_dist: 0.025,
            retreat_dist: 0.025,
            ee_reachable_steps: 3,
            ee_angle_samples: 8,
            ee_angle_phase: FRAC_PI_3,
            obstruct_joint_divisor: 20.0,
            collision_joint_divisor: 20.0,
            collision_attempts_per_decay: 7,
            collision_step_decay: 2.0,
            collision_window: 5,
            max_perturbation_attempts: 500,
            dsafe: 5e-3,
            tolerance: 1e-4,
        }
    }
}

impl RepairSettings {
    fn validate(&self) -> Result<()> {
        if self.ee_angle_samples == 0 {
            bail!("ee_angle_samples must be positive");
        }
        if self.collision_step_decay <= 1.0 {
            bail!("collision_step_decay must exceed 1.0");
        }
        if self.obstruct_joint_divisor <= 0.0 || self.collision_joint_divisor <= 0.0 {
            bail!("joint divisors must be positive");
        }
        if self.collision_attempts_per_decay == 0 || self.max_perturbation_attempts == 0 {
            bail!("attempt counts must be positive");
        }
        Ok(())
    }
}

/// Search budget settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchSettings {
    /// Default expansion budget.
    pub max_iterations: usize,
    /// Refinement attempts before an LL node is retired.
    pub max_refine_attempts: usize,
}

impl Default for SearchSettings {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            max_refine_attempts: 3,
        }
    }
}

/// Domain-level configuration: robot layouts plus planner constants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DomainConfig {
    /// Domain name.
    pub name: String,
    /// Robot type -> attribute layout.
    #[serde(default)]
    pub robots: IndexMap<String, RobotLayout>,
    /// Repair constants.
    #[serde(default)]
    pub repair: RepairSettings,
    /// Search budgets.
    #[serde(default)]
    pub search: SearchSettings,
    #[serde(skip)]
    source_dir: Option<PathBuf>,
}

impl DomainConfig {
    /// Creates a domain with default settings and no robots.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            robots: IndexMap::new(),
            repair: RepairSettings::default(),
            search: SearchSettings::default(),
            source_dir: None,
        }
    }

    /// Adds a robot layout.
    #[must_use]
    pub fn with_robot(mut self, robot_type: impl Into<String>, layout: RobotLayout) -> Self {
        self.robots.insert(robot_type.into(), layout);
        self
    }

    /// Loads and validates a TOML domain file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading domain config {}", path.display()))?;
        let mut config = Self::from_toml(&raw).with_context(|| format!("parsing {}", path.display()))?;
        config.source_dir = Some(
            path.parent()
                .map_or_else(|| PathBuf::from("."), Path::to_path_buf),
        );
        Ok(config)
    }

    /// Parses and validates TOML text.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Validates every layout and the repair constants.
    pub fn validate(&self) -> Result<()> {
        if self.robots.is_empty() {
            bail!("domain {} declares no robot layouts", self.name);
        }
        for (name, layout) in &self.robots {
            layout.validate(name)?;
        }
        self.repair.validate()?;
        if self.search.max_refine_attempts == 0 {
            bail!("max_refine_attempts must be positive");
        }
        Ok(())
    }

    /// Looks up a robot layout.
    pub fn layout(&self, robot_type: &str) -> Result<&RobotLayout, PlanningError> {
        self.robots
            .get(robot_type)
            .ok_or_else(|| PlanningError::UnknownLayout(robot_type.into()))
    }

    /// Resolves a path relative to the file the domain was loaded from.
    #[must_use]
    pub fn resolve_path(&self, candidate: impl AsRef<Path>) -> PathBuf {
        let candidate = candidate.as_ref();
        match &self.source_dir {
            Some(dir) if candidate.is_relative() => dir.join(candidate),
            _ => candidate.to_path_buf(),
        }
    }
}
