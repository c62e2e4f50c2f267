use std::{fs, path::Path, sync::Arc};

use anyhow::{bail, Context, Result};
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use super::{
    predicates::{EeReachable, EnvCollision, GraspPose, Obstructs, RobotAt},
    GantryOracle, Sphere, YawBand,
};
use crate::{
    config::DomainConfig,
    model::{Operands, Plan, PlanBuilder, ROTATION, VALUE},
    module::PlanningError,
    problem::SymbolicProblem,
};

/// Robot placed in the scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SceneRobot {
    /// Parameter name.
    pub name: String,
    /// Robot type, keyed into the domain layouts.
    #[serde(rename = "type")]
    pub robot_type: String,
}

/// Known robot configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RobotPoseSpec {
    /// Base values.
    pub base: Vec<f64>,
    /// Arm joints.
    pub arm: Vec<f64>,
}

/// Known object pose.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TargetSpec {
    /// Position.
    pub value: [f64; 3],
    /// Yaw, pitch, roll.
    #[serde(default)]
    pub rotation: [f64; 3],
}

/// Oracle geometry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OracleSpec {
    /// Optional heading restriction `[center, half_width]`.
    #[serde(default)]
    pub yaw_band: Option<[f64; 2]>,
    /// Tool height for lift-over paths.
    #[serde(default)]
    pub lift_height: Option<f64>,
    /// Spherical obstacles.
    #[serde(default)]
    pub obstacles: Vec<Sphere>,
}

/// Action kinds the scene translator knows how to ground.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    /// Base and arm move between two robot poses.
    Moveto,
    /// Grasp at a target with a free end-effector pose.
    Grasp,
    /// Put down at a target.
    Putdown,
}

/// One grounded action of a skeleton.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionSpec {
    /// Action name.
    pub name: String,
    /// Kind.
    pub kind: ActionKind,
    /// First step.
    pub start: usize,
    /// Last step.
    pub end: usize,
    /// Start robot pose (movement) or working pose (manipulation).
    pub from: String,
    /// End robot pose; defaults to `from`.
    #[serde(default)]
    pub to: Option<String>,
    /// Target symbol (manipulation).
    #[serde(default)]
    pub target: Option<String>,
    /// End-effector pose symbol (manipulation).
    #[serde(default)]
    pub ee: Option<String>,
    /// Adds the approach/retreat predicate around the grasp step.
    #[serde(default)]
    pub approach: bool,
}

/// Alternative action sequence offered on successive translations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkeletonSpec {
    /// Actions in order.
    pub actions: Vec<ActionSpec>,
}

/// Problem file: symbolic facts plus the geometry needed to ground skeletons.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scene {
    /// Problem name.
    pub name: String,
    /// Plan horizon.
    pub horizon: usize,
    /// The robot.
    pub robot: SceneRobot,
    /// Initial facts.
    #[serde(default)]
    pub init: Vec<String>,
    /// Goal facts.
    #[serde(default)]
    pub goal: Vec<String>,
    /// Geometry oracle settings.
    #[serde(default)]
    pub oracle: OracleSpec,
    /// Robot-pose symbols; the one used by the first action is the start state.
    #[serde(default)]
    pub poses: IndexMap<String, RobotPoseSpec>,
    /// Target symbols.
    #[serde(default)]
    pub targets: IndexMap<String, TargetSpec>,
    /// Skeletons, tried in order.
    #[serde(default)]
    pub skeletons: Vec<SkeletonSpec>,
}

impl Scene {
    /// Loads a TOML scene.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .with_context(|| format!("reading scene {}", path.display()))?;
        Self::from_toml(&raw).with_context(|| format!("parsing {}", path.display()))
    }

    /// Parses and validates TOML text.
    pub fn from_toml(raw: &str) -> Result<Self> {
        let scene: Self = toml::from_str(raw)?;
        scene.validate()?;
        Ok(scene)
    }

    fn validate(&self) -> Result<()> {
        if self.horizon == 0 {
            bail!("scene {} has a zero horizon", self.name);
        }
        for (idx, skeleton) in self.skeletons.iter().enumerate() {
            if skeleton.actions.is_empty() {
                bail!("skeleton {idx} has no actions");
            }
            for action in &skeleton.actions {
                self.check_pose(&action.from)?;
                if let Some(to) = &action.to {
                    self.check_pose(to)?;
                }
                match action.kind {
                    ActionKind::Moveto => {}
                    ActionKind::Grasp | ActionKind::Putdown => {
                        let Some(target) = &action.target else {
                            bail!("action {} needs a target", action.name);
                        };
                        if !self.targets.contains_key(target) {
                            bail!("action {} refers to unknown target {target}", action.name);
                        }
                        if action.ee.is_none() {
                            bail!("action {} needs an end-effector pose", action.name);
                        }
                    }
                }
            }
        }
        Ok(())
    }

    fn check_pose(&self, name: &str) -> Result<()> {
        if self.poses.contains_key(name) {
            Ok(())
        } else {
            bail!("unknown robot pose {name}")
        }
    }

    fn pose_spec(&self, name: &str) -> Result<&RobotPoseSpec, PlanningError> {
        self.poses
            .get(name)
            .ok_or_else(|| PlanningError::UnknownParameter(name.into()))
    }

    /// Symbolic problem of the scene.
    #[must_use]
    pub fn problem(&self) -> SymbolicProblem {
        SymbolicProblem::new(&self.name, self.init.iter(), self.goal.iter())
    }

    /// Geometry oracle for the scene robot.
    pub fn oracle(&self, domain: &DomainConfig) -> Result<GantryOracle, PlanningError> {
        let layout = domain.layout(&self.robot.robot_type)?;
        let mut oracle = GantryOracle::new(layout.arm.clone())
            .with_obstacles(self.oracle.obstacles.iter().cloned());
        if let Some([center, half_width]) = self.oracle.yaw_band {
            oracle = oracle.with_yaw_band(YawBand { center, half_width });
        }
        if let Some(height) = self.oracle.lift_height {
            oracle = oracle.with_lift_height(height);
        }
        Ok(oracle)
    }

    /// Grounds skeleton `index` into a plan, or `None` past the last skeleton.
    ///
    /// The robot is committed to the first action's start pose at step 0 and its base is
    /// held at the working pose throughout every manipulation action.
    pub fn skeleton(&self, domain: &DomainConfig, index: usize) -> Result<Option<Plan>, PlanningError> {
        let Some(spec) = self.skeletons.get(index) else {
            return Ok(None);
        };
        let settings = &domain.repair;
        let robot_type = self.robot.robot_type.as_str();
        let layout = domain.layout(robot_type)?.clone();
        let mut builder = PlanBuilder::new(Arc::new(domain.robots.clone()), self.horizon);
        let robot = builder.robot(&self.robot.name, robot_type)?;

        let mut poses = IndexMap::new();
        for (name, pose) in &self.poses {
            let id = builder.robot_pose(name, robot_type)?;
            builder.fix(id, &layout.base.attr, 0, &pose.base)?;
            builder.fix(id, &layout.arm.attr, 0, &pose.arm)?;
            poses.insert(name.clone(), id);
        }
        let mut targets = IndexMap::new();
        for (name, target) in &self.targets {
            let id = builder.pose_symbol(name, "Target")?;
            builder.fix(id, VALUE, 0, &target.value)?;
            builder.fix(id, ROTATION, 0, &target.rotation)?;
            targets.insert(name.clone(), id);
        }
        let symbolic: Vec<Sphere> = self
            .oracle
            .obstacles
            .iter()
            .filter(|sphere| sphere.symbolic)
            .cloned()
            .collect();

        let lookup = |map: &IndexMap<String, _>, name: &str| {
            map.get(name)
                .copied()
                .ok_or_else(|| PlanningError::UnknownParameter(name.into()))
        };
        let mut ee_symbols = IndexMap::new();
        for (idx, action) in spec.actions.iter().enumerate() {
            let from = lookup(&poses, &action.from)?;
            let to = match &action.to {
                Some(to) => lookup(&poses, to)?,
                None => from,
            };
            if idx == 0 {
                let start = self.pose_spec(&action.from)?;
                builder.fix(robot, &layout.base.attr, action.start, &start.base)?;
                builder.fix(robot, &layout.arm.attr, action.start, &start.arm)?;
            }
            match action.kind {
                ActionKind::Moveto => {
                    let id = builder.action(
                        &action.name,
                        action.start,
                        action.end,
                        Operands::robot(robot).with_poses(from, to),
                    );
                    builder.bind(
                        id,
                        Arc::new(RobotAt::new(robot, from, settings.tolerance)),
                        (action.start, action.start),
                    );
                    builder.bind(
                        id,
                        Arc::new(RobotAt::new(robot, to, settings.tolerance)),
                        (action.end, action.end),
                    );
                    for sphere in &symbolic {
                        builder.bind_over(
                            id,
                            Arc::new(Obstructs::new(robot, sphere.clone(), settings.dsafe)),
                        );
                    }
                    builder.bind_over(id, Arc::new(EnvCollision::new(robot, settings.dsafe)));
                }
                ActionKind::Grasp | ActionKind::Putdown => {
                    let target_name = action.target.as_deref().unwrap_or_default();
                    let target = lookup(&targets, target_name)?;
                    let ee_name = action.ee.as_deref().unwrap_or_default();
                    let ee = match ee_symbols.get(ee_name) {
                        Some(id) => *id,
                        None => {
                            let id = builder.pose_symbol(ee_name, "EEPose")?;
                            ee_symbols.insert(ee_name.to_string(), id);
                            id
                        }
                    };
                    let base = &self.pose_spec(&action.from)?.base;
                    for t in action.start..=action.end.min(self.horizon.saturating_sub(1)) {
                        builder.fix(robot, &layout.base.attr, t, base)?;
                    }
                    let id = builder.action(
                        &action.name,
                        action.start,
                        action.end,
                        Operands::robot(robot)
                            .with_poses(from, to)
                            .with_target(target)
                            .with_ee_pose(ee),
                    );
                    let at = (action.start + settings.ee_reachable_steps).min(action.end);
                    if action.approach {
                        let inverse = action.kind == ActionKind::Putdown;
                        builder.bind(
                            id,
                            Arc::new(EeReachable::new(robot, ee, inverse, settings)),
                            (at, at),
                        );
                    }
                    builder.bind(
                        id,
                        Arc::new(GraspPose::new(robot, ee, target, settings.tolerance)),
                        (at, at),
                    );
                    builder.bind_over(id, Arc::new(EnvCollision::new(robot, settings.dsafe)));
                }
            }
        }
        builder.build().map(Some)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        oracle::GeometryOracle,
        testing::{GANTRY_DOMAIN as DOMAIN, GRASP_SCENE as SCENE},
    };

    #[test]
    fn grounds_the_first_skeleton() {
        let domain = DomainConfig::from_toml(DOMAIN).unwrap();
        let scene = Scene::from_toml(SCENE).unwrap();
        let plan = scene.skeleton(&domain, 0).unwrap().unwrap();
        assert_eq!(plan.horizon(), 12);
        assert_eq!(plan.actions().len(), 2);
        // RobotAt x2 + EnvCollision on the move, GraspPose + EnvCollision on the grasp
        assert_eq!(plan.bindings().len(), 5);
        let robot = plan.param_id("gantry0").unwrap();
        assert!(plan.param(robot).unwrap().is_fixed(0).unwrap());
        assert_eq!(plan.base(robot, 9).unwrap(), &[0.4]);
        assert!(scene.skeleton(&domain, 1).unwrap().is_none());
        assert!(!scene.problem().goal_test());
    }

    #[test]
    fn approach_flag_adds_reachability() {
        let domain = DomainConfig::from_toml(DOMAIN).unwrap();
        let raw = SCENE.replace("ee = \"ee0\" }", "ee = \"ee0\", approach = true }");
        let scene = Scene::from_toml(&raw).unwrap();
        let plan = scene.skeleton(&domain, 0).unwrap().unwrap();
        assert_eq!(plan.bindings().len(), 6);
        assert_eq!(plan.bindings()[3].predicate.name(), "EEReachable");
        assert_eq!(plan.bindings()[3].window, (7, 7));
    }

    #[test]
    fn rejects_unknown_targets() {
        let raw = SCENE.replace("target = \"target0\"", "target = \"target9\"");
        assert!(Scene::from_toml(&raw).is_err());
    }

    #[test]
    fn oracle_honours_the_scene() {
        let domain = DomainConfig::from_toml(DOMAIN).unwrap();
        let scene = Scene::from_toml(SCENE).unwrap();
        let oracle = scene.oracle(&domain).unwrap();
        assert!(!oracle.test_collision(&[0.0, 0.2, 0.6, 0.5]).free);
        assert!(oracle.test_collision(&[0.4, 0.1, 0.0, 0.9]).free);
    }

    #[test]
    fn short_grasp_cannot_fit_its_approach() {
        let domain = DomainConfig::from_toml(DOMAIN).unwrap();
        let raw = SCENE
            .replace("horizon = 12", "horizon = 7")
            .replace("start = 4, end = 11", "start = 4, end = 6")
            .replace("ee = \"ee0\" }", "ee = \"ee0\", approach = true }");
        let scene = Scene::from_toml(&raw).unwrap();
        assert!(matches!(
            scene.skeleton(&domain, 0),
            Err(PlanningError::MalformedAction { action, .. }) if action == "grasp"
        ));
    }
}
