//! Fixtures shared by unit tests: a scriptable oracle, a one-robot gantry plan and
//! predicates with fixed verdicts.

use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

use indexmap::IndexMap;

use crate::{
    config::{ArmSpec, AttrSpec, RobotLayout},
    model::{Operands, Plan, PlanBuilder, ROTATION, VALUE},
    module::{Configuration, Frame, ParamId},
    oracle::{CollisionReport, GeometryOracle},
    predicate::{ActiveRange, Predicate, PredicateContext, ResampleStrategy},
};

/// Oracle whose IK places the tool at the target relative to a 1-D base.
#[derive(Debug)]
pub struct FakeOracle {
    pub reach_z: f64,
    pub paths: bool,
    /// `(config index, lo, hi)`: values strictly inside the band collide.
    pub collision_band: Option<(usize, f64, f64)>,
    pub always_colliding: bool,
    pub ik_calls: AtomicUsize,
}

impl Default for FakeOracle {
    fn default() -> Self {
        Self {
            reach_z: 1.5,
            paths: true,
            collision_band: None,
            always_colliding: false,
            ik_calls: AtomicUsize::new(0),
        }
    }
}

impl GeometryOracle for FakeOracle {
    fn solve_ik(&self, base: &[f64], target: &Frame, _seed: &[f64]) -> Option<Configuration> {
        self.ik_calls.fetch_add(1, Ordering::SeqCst);
        let p = target.position;
        if p.z > self.reach_z {
            return None;
        }
        let x0 = base.first().copied().unwrap_or(0.0);
        Some(vec![p.x - x0, p.y, p.z])
    }

    fn plan_path(&self, start: &[f64], end: &[f64]) -> Option<Vec<Configuration>> {
        self.paths.then(|| vec![start.to_vec(), end.to_vec()])
    }

    fn test_collision(&self, config: &[f64]) -> CollisionReport {
        if self.always_colliding {
            return CollisionReport {
                free: false,
                distance: -1.0,
            };
        }
        match self.collision_band {
            Some((idx, lo, hi)) => {
                let value = config.get(idx).copied().unwrap_or(f64::NAN);
                let distance = (value - lo).abs().min((value - hi).abs());
                if value > lo && value < hi {
                    CollisionReport {
                        free: false,
                        distance: -distance,
                    }
                } else {
                    CollisionReport {
                        free: true,
                        distance,
                    }
                }
            }
            None => CollisionReport {
                free: true,
                distance: 1.0,
            },
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Verdict {
    Fixed(bool),
    ArmClear { robot: ParamId, radius: f64 },
    CollisionFree { robot: ParamId, dsafe: f64 },
}

/// Predicate with a scripted verdict and optional repair strategy.
#[derive(Debug, Clone)]
pub struct Scripted {
    name: &'static str,
    range: ActiveRange,
    anchor: bool,
    strategy: Option<ResampleStrategy>,
    verdict: Verdict,
}

impl Scripted {
    /// Always-true spatial anchor.
    pub const fn anchor(name: &'static str, range: ActiveRange) -> Self {
        Self {
            name,
            range,
            anchor: true,
            strategy: None,
            verdict: Verdict::Fixed(true),
        }
    }

    /// Always-false predicate repaired with `strategy`.
    pub const fn failing(name: &'static str, strategy: Option<ResampleStrategy>) -> Self {
        Self {
            name,
            range: ActiveRange::POINT,
            anchor: false,
            strategy,
            verdict: Verdict::Fixed(false),
        }
    }

    /// Holds while the oracle reports the robot clear by `dsafe`.
    pub const fn env_collision(robot: ParamId, dsafe: f64) -> Self {
        Self {
            name: "Collides",
            range: ActiveRange::POINT,
            anchor: false,
            strategy: Some(ResampleStrategy::EnvCollision { robot }),
            verdict: Verdict::CollisionFree { robot, dsafe },
        }
    }

    /// Environment-collision predicate stricter than the oracle: holds while the first
    /// arm joint stays outside `radius` of zero.
    pub const fn env_clearance(robot: ParamId, radius: f64) -> Self {
        Self {
            name: "Collides",
            range: ActiveRange::POINT,
            anchor: false,
            strategy: Some(ResampleStrategy::EnvCollision { robot }),
            verdict: Verdict::ArmClear { robot, radius },
        }
    }

    /// Holds while the first arm joint stays outside `radius` of an obstacle at zero.
    pub const fn obstructs(robot: ParamId, radius: f64) -> Self {
        Self {
            name: "Obstructs",
            range: ActiveRange::POINT,
            anchor: false,
            strategy: Some(ResampleStrategy::Obstructs { robot }),
            verdict: Verdict::ArmClear { robot, radius },
        }
    }
}

impl Predicate for Scripted {
    fn name(&self) -> &str {
        self.name
    }

    fn active_range(&self) -> ActiveRange {
        self.range
    }

    fn spatial_anchor(&self) -> bool {
        self.anchor
    }

    fn test(&self, ctx: &PredicateContext<'_>, step: usize) -> bool {
        match self.verdict {
            Verdict::Fixed(verdict) => verdict,
            Verdict::ArmClear { robot, radius } => ctx
                .plan
                .arm(robot, step)
                .is_ok_and(|arm| arm.first().is_some_and(|x| x.abs() > radius)),
            Verdict::CollisionFree { robot, dsafe } => ctx
                .configuration(robot, step)
                .is_ok_and(|config| ctx.oracle.test_collision(&config).clear_of(dsafe)),
        }
    }

    fn resample(&self) -> Option<ResampleStrategy> {
        self.strategy
    }
}

/// Gantry layout: one base axis and a three-joint Cartesian arm.
pub fn gantry_layouts() -> Arc<IndexMap<String, RobotLayout>> {
    let mut map = IndexMap::new();
    map.insert(
        "gantry".to_string(),
        RobotLayout {
            base: AttrSpec {
                attr: "pose".into(),
                dim: 1,
            },
            arm: ArmSpec {
                attr: "arm".into(),
                lower: vec![-1.0, -1.0, 0.0],
                upper: vec![1.0, 1.0, 1.5],
                revolute: Vec::new(),
            },
            gripper: None,
        },
    );
    Arc::new(map)
}

/// Plan fixture with one gantry robot.
pub struct GantryPlan {
    pub builder: PlanBuilder,
    pub robot: ParamId,
    unlocked_arm: Vec<(usize, Vec<f64>)>,
}

impl GantryPlan {
    /// `moveto [0, 4]` then `grasp [4, horizon-1]` of `target0` at `(0.5, 0, 0.9)`.
    /// The robot starts at base 0 and is committed to base 0.4 from step 4 on.
    /// Bindings: `RobotAt` (transit) on the move, `GraspPose` on the grasp.
    pub fn moveto_then_grasp(ee_fixed: bool, horizon: usize) -> Self {
        let mut builder = PlanBuilder::new(gantry_layouts(), horizon);
        let robot = builder.robot("gantry0", "gantry").unwrap();
        let init = builder.robot_pose("robot_init_pose", "gantry").unwrap();
        let end = builder.robot_pose("robot_end_pose", "gantry").unwrap();
        let target = builder.pose_symbol("target0", "Target").unwrap();
        let ee = builder.pose_symbol("ee0", "EEPose").unwrap();

        builder.fix(init, "pose", 0, &[0.0]).unwrap();
        builder.fix(init, "arm", 0, &[0.0, 0.0, 1.0]).unwrap();
        builder.fix(end, "pose", 0, &[0.4]).unwrap();
        builder.fix(end, "arm", 0, &[0.1, 0.0, 1.0]).unwrap();
        builder.fix(robot, "pose", 0, &[0.0]).unwrap();
        builder.fix(robot, "arm", 0, &[0.0, 0.0, 1.0]).unwrap();
        for t in 4..horizon {
            builder.fix(robot, "pose", t, &[0.4]).unwrap();
        }
        builder.fix(robot, "arm", 4, &[0.1, 0.0, 1.0]).unwrap();
        builder.fix(target, VALUE, 0, &[0.5, 0.0, 0.9]).unwrap();
        builder.fix(target, ROTATION, 0, &[0.0, 0.0, 0.0]).unwrap();
        if ee_fixed {
            builder.fix(ee, VALUE, 0, &[0.5, 0.0, 0.9]).unwrap();
            builder.fix(ee, ROTATION, 0, &[0.0, 0.0, 0.0]).unwrap();
        }

        let moveto = builder.action(
            "moveto",
            0,
            4,
            Operands::robot(robot).with_poses(init, end),
        );
        let grasp = builder.action(
            "grasp",
            4,
            horizon - 1,
            Operands::robot(robot)
                .with_poses(end, end)
                .with_target(target)
                .with_ee_pose(ee),
        );
        builder.bind_over(
            moveto,
            Arc::new(Scripted::failing("RobotAt", Some(ResampleStrategy::Transit))),
        );
        builder.bind_over(
            grasp,
            Arc::new(Scripted::failing("GraspPose", Some(ResampleStrategy::GraspPose))),
        );
        Self {
            builder,
            robot,
            unlocked_arm: Vec::new(),
        }
    }

    /// A single `moveto` over the horizon with the base committed at 0 and the arm drafted
    /// (unlocked) at `[0, t/100, 1]`.
    pub fn straight_line(horizon: usize) -> Self {
        let mut builder = PlanBuilder::new(gantry_layouts(), horizon);
        let robot = builder.robot("gantry0", "gantry").unwrap();
        builder.fix_all(robot, "pose", &[0.0]).unwrap();
        builder.action("moveto", 0, horizon - 1, Operands::robot(robot));
        #[allow(clippy::cast_precision_loss)]
        let unlocked_arm = (0..horizon)
            .map(|t| (t, vec![0.0, t as f64 / 100.0, 1.0]))
            .collect();
        Self {
            builder,
            robot,
            unlocked_arm,
        }
    }

    /// Builds the plan and writes the drafted cells.
    pub fn build(self) -> Plan {
        let mut plan = self.builder.build().unwrap();
        for (t, arm) in &self.unlocked_arm {
            plan.write_arm(self.robot, *t, arm).unwrap();
        }
        plan
    }
}

/// Domain with one gantry robot type.
pub const GANTRY_DOMAIN: &str = r#"
name = "gantry_pick"

[robots.gantry]
base = { attr = "pose", dim = 1 }
arm = { attr = "arm", lower = [-1.0, -1.0, 0.0], upper = [1.0, 1.0, 1.5] }
"#;

/// Move next to `target0` at `(0.5, 0, 0.9)`, then grasp it.
pub const GRASP_SCENE: &str = r#"
name = "grasp_can0"
horizon = 12
robot = { name = "gantry0", type = "gantry" }
init = ["(RobotAt gantry0 robot_init_pose)"]
goal = ["(InGripper gantry0 can0)"]

[oracle]
lift_height = 1.2

[[oracle.obstacles]]
name = "shelf"
center = [0.2, 0.6, 0.5]
radius = 0.1

[poses.robot_init_pose]
base = [0.0]
arm = [0.0, 0.0, 1.0]

[poses.robot_end_pose]
base = [0.4]
arm = [0.1, 0.0, 1.0]

[targets.target0]
value = [0.5, 0.0, 0.9]

[[skeletons]]
actions = [
    { name = "moveto", kind = "moveto", start = 0, end = 4, from = "robot_init_pose", to = "robot_end_pose" },
    { name = "grasp", kind = "grasp", start = 4, end = 11, from = "robot_end_pose", target = "target0", ee = "ee0" },
]
"#;
