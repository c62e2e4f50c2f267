use crate::{
    config::RepairSettings,
    module::ParamId,
    predicate::{ActiveRange, Predicate, PredicateContext, ResampleStrategy},
    repair::helper::{approach_retreat_dirs, ik_frame},
};

use super::{GantryOracle, Sphere};

fn close(a: &[f64], b: &[f64], tolerance: f64) -> bool {
    a.len() == b.len()
        && a
            .iter()
            .zip(b)
            .all(|(x, y)| x.is_finite() && y.is_finite() && (x - y).abs() <= tolerance)
}

fn step_isize(step: usize) -> isize {
    isize::try_from(step).unwrap_or(isize::MAX)
}

/// Robot configuration equals a robot-pose symbol.
#[derive(Debug, Clone)]
pub struct RobotAt {
    robot: ParamId,
    pose: ParamId,
    tolerance: f64,
}

impl RobotAt {
    /// Binds `robot` to the configuration stored in `pose`.
    #[must_use]
    pub const fn new(robot: ParamId, pose: ParamId, tolerance: f64) -> Self {
        Self {
            robot,
            pose,
            tolerance,
        }
    }
}

impl Predicate for RobotAt {
    fn name(&self) -> &str {
        "RobotAt"
    }

    fn spatial_anchor(&self) -> bool {
        true
    }

    fn test(&self, ctx: &PredicateContext<'_>, step: usize) -> bool {
        match (
            ctx.configuration(self.robot, step),
            ctx.configuration(self.pose, step),
        ) {
            (Ok(actual), Ok(expected)) => close(&actual, &expected, self.tolerance),
            _ => false,
        }
    }

    fn resample(&self) -> Option<ResampleStrategy> {
        Some(ResampleStrategy::Transit)
    }
}

/// End-effector pose sits on the target and the tool is there.
#[derive(Debug, Clone)]
pub struct GraspPose {
    robot: ParamId,
    ee: ParamId,
    target: ParamId,
    tolerance: f64,
}

impl GraspPose {
    /// Creates the predicate.
    #[must_use]
    pub const fn new(robot: ParamId, ee: ParamId, target: ParamId, tolerance: f64) -> Self {
        Self {
            robot,
            ee,
            target,
            tolerance,
        }
    }
}

impl Predicate for GraspPose {
    fn name(&self) -> &str {
        "GraspPose"
    }

    fn test(&self, ctx: &PredicateContext<'_>, step: usize) -> bool {
        let ee = ctx.plan.param(self.ee).and_then(|param| param.pose(0));
        let target = ctx.plan.param(self.target).and_then(|param| param.pose(0));
        let tool = ctx
            .configuration(self.robot, step)
            .ok()
            .and_then(|config| GantryOracle::tool_position(&config));
        match (ee, target, tool) {
            (Ok(ee), Ok(target), Some(tool)) => {
                let ee = ee.position.to_array();
                close(&ee, &target.position.to_array(), self.tolerance)
                    && close(&ee, &tool.to_array(), self.tolerance)
            }
            _ => false,
        }
    }

    fn resample(&self) -> Option<ResampleStrategy> {
        Some(ResampleStrategy::GraspPose)
    }
}

/// Approach, grasp and retreat positions line up around a fixed end-effector pose.
#[derive(Debug, Clone)]
pub struct EeReachable {
    robot: ParamId,
    ee: ParamId,
    inverse: bool,
    steps: usize,
    approach_dist: f64,
    retreat_dist: f64,
    tolerance: f64,
}

impl EeReachable {
    /// Window and offsets come from the repair constants so the predicate agrees with its
    /// repair.
    #[must_use]
    pub const fn new(robot: ParamId, ee: ParamId, inverse: bool, settings: &RepairSettings) -> Self {
        Self {
            robot,
            ee,
            inverse,
            steps: settings.ee_reachable_steps,
            approach_dist: settings.approach_dist,
            retreat_dist: settings.retreat_dist,
            tolerance: settings.tolerance,
        }
    }

    fn tool_at(&self, ctx: &PredicateContext<'_>, step: usize) -> Option<[f64; 3]> {
        ctx.configuration(self.robot, step)
            .ok()
            .and_then(|config| GantryOracle::tool_position(&config))
            .map(|tool| tool.to_array())
    }
}

impl Predicate for EeReachable {
    fn name(&self) -> &str {
        if self.inverse {
            "EEReachableRot"
        } else {
            "EEReachable"
        }
    }

    fn active_range(&self) -> ActiveRange {
        let steps = step_isize(self.steps);
        ActiveRange::new(-steps, steps)
    }

    fn spatial_anchor(&self) -> bool {
        true
    }

    fn test(&self, ctx: &PredicateContext<'_>, step: usize) -> bool {
        if step < self.steps || step + self.steps >= ctx.plan.horizon() {
            return false;
        }
        let Ok(ee) = ctx.plan.param(self.ee).and_then(|param| param.pose(0)) else {
            return false;
        };
        let frame = ik_frame(&ee);
        let (approach, retreat) =
            approach_retreat_dirs(frame.basis, self.inverse, self.approach_dist, self.retreat_dist);
        let mut expected = Vec::with_capacity(2 * self.steps + 1);
        for i in 0..self.steps {
            #[allow(clippy::cast_precision_loss)]
            let scale = (self.steps - i) as f64;
            expected.push((step - self.steps + i, ee.position + approach * scale));
        }
        expected.push((step, ee.position));
        for i in 0..self.steps {
            #[allow(clippy::cast_precision_loss)]
            let scale = (i + 1) as f64;
            expected.push((step + 1 + i, ee.position + retreat * scale));
        }
        expected.into_iter().all(|(t, point)| {
            self.tool_at(ctx, t)
                .is_some_and(|tool| close(&tool, &point.to_array(), self.tolerance))
        })
    }

    fn resample(&self) -> Option<ResampleStrategy> {
        Some(ResampleStrategy::EeReachable {
            robot: self.robot,
            ee_pose: self.ee,
            inverse: self.inverse,
        })
    }
}

/// The tool keeps `dsafe` away from a known symbolic obstacle.
#[derive(Debug, Clone)]
pub struct Obstructs {
    robot: ParamId,
    obstacle: Sphere,
    dsafe: f64,
}

impl Obstructs {
    /// Creates the predicate.
    #[must_use]
    pub const fn new(robot: ParamId, obstacle: Sphere, dsafe: f64) -> Self {
        Self {
            robot,
            obstacle,
            dsafe,
        }
    }
}

impl Predicate for Obstructs {
    fn name(&self) -> &str {
        "Obstructs"
    }

    // negated form: holds while the obstacle is clear
    fn test(&self, ctx: &PredicateContext<'_>, step: usize) -> bool {
        ctx.configuration(self.robot, step)
            .ok()
            .and_then(|config| GantryOracle::tool_position(&config))
            .is_some_and(|tool| self.obstacle.distance(tool) > self.dsafe)
    }

    fn resample(&self) -> Option<ResampleStrategy> {
        Some(ResampleStrategy::Obstructs { robot: self.robot })
    }
}

/// The oracle reports the robot clear of the static environment.
#[derive(Debug, Clone)]
pub struct EnvCollision {
    robot: ParamId,
    dsafe: f64,
}

impl EnvCollision {
    /// Creates the predicate.
    #[must_use]
    pub const fn new(robot: ParamId, dsafe: f64) -> Self {
        Self { robot, dsafe }
    }
}

impl Predicate for EnvCollision {
    fn name(&self) -> &str {
        "Collides"
    }

    fn test(&self, ctx: &PredicateContext<'_>, step: usize) -> bool {
        ctx.configuration(self.robot, step)
            .is_ok_and(|config| ctx.oracle.test_collision(&config).clear_of(self.dsafe))
    }

    fn resample(&self) -> Option<ResampleStrategy> {
        Some(ResampleStrategy::EnvCollision { robot: self.robot })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::ArmSpec,
        model::{Operands, Plan, PlanBuilder, ROTATION, VALUE},
        testing::gantry_layouts,
    };

    struct Fixture {
        plan: Plan,
        robot: ParamId,
        pose: ParamId,
        ee: ParamId,
        target: ParamId,
    }

    fn fixture(ee_at: [f64; 3]) -> Fixture {
        let mut builder = PlanBuilder::new(gantry_layouts(), 9);
        let robot = builder.robot("gantry0", "gantry").unwrap();
        let pose = builder.robot_pose("robot_end_pose", "gantry").unwrap();
        let ee = builder.pose_symbol("ee0", "EEPose").unwrap();
        let target = builder.pose_symbol("target0", "Target").unwrap();
        builder.fix(pose, "pose", 0, &[0.4]).unwrap();
        builder.fix(pose, "arm", 0, &[0.1, 0.0, 0.9]).unwrap();
        builder.fix(ee, VALUE, 0, &ee_at).unwrap();
        builder.fix(ee, ROTATION, 0, &[0.0; 3]).unwrap();
        builder.fix(target, VALUE, 0, &[0.5, 0.0, 0.9]).unwrap();
        builder.fix(target, ROTATION, 0, &[0.0; 3]).unwrap();
        builder.fix_all(robot, "pose", &[0.4]).unwrap();
        builder.action("grasp", 0, 8, Operands::robot(robot));
        Fixture {
            plan: builder.build().unwrap(),
            robot,
            pose,
            ee,
            target,
        }
    }

    fn oracle() -> GantryOracle {
        GantryOracle::new(ArmSpec {
            attr: "arm".into(),
            lower: vec![-1.0, -1.0, 0.0],
            upper: vec![1.0, 1.0, 1.5],
            revolute: Vec::new(),
        })
    }

    #[test]
    fn robot_at_compares_full_configuration() {
        let mut fx = fixture([0.5, 0.0, 0.9]);
        let oracle = oracle();
        let pred = RobotAt::new(fx.robot, fx.pose, 1e-4);
        assert!(!pred.test(&PredicateContext::new(&fx.plan, &oracle), 2));
        fx.plan.write_arm(fx.robot, 2, &[0.1, 0.0, 0.9]).unwrap();
        assert!(pred.test(&PredicateContext::new(&fx.plan, &oracle), 2));
        assert!(pred.spatial_anchor());
    }

    #[test]
    fn grasp_pose_needs_tool_on_target() {
        let mut fx = fixture([0.5, 0.0, 0.9]);
        let oracle = oracle();
        let pred = GraspPose::new(fx.robot, fx.ee, fx.target, 1e-4);
        fx.plan.write_arm(fx.robot, 4, &[0.1, 0.0, 0.9]).unwrap();
        fx.plan.write_arm(fx.robot, 5, &[0.1, 0.0, 1.0]).unwrap();
        let ctx = PredicateContext::new(&fx.plan, &oracle);
        assert!(pred.test(&ctx, 4));
        assert!(!pred.test(&ctx, 5));
        assert!(!pred.test(&ctx, 6));

        let off = fixture([0.6, 0.0, 0.9]);
        let pred = GraspPose::new(off.robot, off.ee, off.target, 1e-4);
        assert!(!pred.test(&PredicateContext::new(&off.plan, &oracle), 4));
    }

    #[test]
    fn ee_reachable_checks_the_whole_window() {
        let mut fx = fixture([0.5, 0.0, 0.9]);
        let oracle = oracle();
        let settings = RepairSettings::default();
        let pred = EeReachable::new(fx.robot, fx.ee, false, &settings);
        assert_eq!(pred.active_range(), ActiveRange::new(-3, 3));
        let ee = fx.plan.param(fx.ee).unwrap().pose(0).unwrap();
        let (approach, retreat) = approach_retreat_dirs(ik_frame(&ee).basis, false, 0.025, 0.025);
        let mut place = |t: usize, offset: glam::DVec3| {
            let p = ee.position + offset;
            fx.plan.write_arm(fx.robot, t, &[p.x - 0.4, p.y, p.z]).unwrap();
        };
        for i in 0..3 {
            #[allow(clippy::cast_precision_loss)]
            let scale = (3 - i) as f64;
            place(1 + i, approach * scale);
            #[allow(clippy::cast_precision_loss)]
            let scale = (i + 1) as f64;
            place(5 + i, retreat * scale);
        }
        place(4, glam::DVec3::ZERO);
        let ctx = PredicateContext::new(&fx.plan, &oracle);
        assert!(pred.test(&ctx, 4));
        assert!(!pred.test(&ctx, 2));
        assert!(!pred.test(&ctx, 7));
    }

    #[test]
    fn obstacle_and_environment_clearance() {
        let mut fx = fixture([0.5, 0.0, 0.9]);
        fx.plan.write_arm(fx.robot, 0, &[0.1, 0.0, 0.9]).unwrap();
        fx.plan.write_arm(fx.robot, 1, &[0.6, 0.0, 0.9]).unwrap();
        let can = Sphere {
            name: "can1".into(),
            center: [1.0, 0.0, 0.9],
            radius: 0.05,
            symbolic: true,
        };
        let blocked = Obstructs::new(fx.robot, can.clone(), 5e-3);
        let oracle = oracle().with_obstacles([Sphere {
            symbolic: false,
            ..can
        }]);
        let ctx = PredicateContext::new(&fx.plan, &oracle);
        assert!(blocked.test(&ctx, 0));
        assert!(!blocked.test(&ctx, 1));
        let env = EnvCollision::new(fx.robot, 5e-3);
        assert!(env.test(&ctx, 0));
        assert!(!env.test(&ctx, 1));
        assert!(!env.test(&ctx, 2));
        assert_eq!(env.name(), "Collides");
    }
}
