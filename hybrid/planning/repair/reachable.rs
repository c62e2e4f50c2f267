use super::{
    all_finite,
    helper::{approach_retreat_dirs, closer_joint_angles, ik_frame},
    join_config, resample_path, Attempt, Ledger, RepairOutcome,
};
use crate::{
    model::Plan,
    module::{ParamId, PlanningError},
};

/// Solves the approach/grasp/retreat window around a fixed end-effector pose and
/// connects it to the committed start of the containing action.
///
/// A binding that was already repaired once connects from the previous action's start
/// instead. When any offset pose is unreachable the feasible cells keep their values
/// but nothing is locked.
pub fn repair(
    plan: &mut Plan,
    attempt: &Attempt<'_>,
    robot: ParamId,
    ee: ParamId,
    inverse: bool,
) -> Result<RepairOutcome, PlanningError> {
    let settings = attempt.settings;
    let steps = settings.ee_reachable_steps;
    let t = attempt.failure.step;
    if t < steps || t + steps >= plan.horizon() {
        return Err(PlanningError::StepOutOfRange {
            step: if t < steps { 0 } else { t + steps },
            horizon: plan.horizon(),
        });
    }
    let layout = plan.layout_of(robot)?.clone();
    let ee_param = plan.param(ee)?;
    let ee_name = ee_param.name().to_string();
    let ee_pose = ee_param.pose(0)?;
    if !all_finite(&ee_pose.position.to_array()) || !all_finite(&ee_pose.rotation.to_array()) {
        return Ok(attempt.declined("end-effector pose undefined"));
    }
    let base = plan.base(robot, t)?.to_vec();
    if !all_finite(&base) {
        return Ok(attempt.declined("base undefined at grasp step"));
    }
    let seed = plan.arm(robot, t)?.to_vec();

    let frame = ik_frame(&ee_pose);
    let Some(grasp_arm) = attempt.oracle.solve_ik(&base, &frame, &seed) else {
        return Ok(attempt.declined("no IK solution at the end-effector pose"));
    };
    let grasp_arm = closer_joint_angles(&grasp_arm, &seed, &layout.arm.revolute);
    let (approach, retreat) = approach_retreat_dirs(
        frame.basis,
        inverse,
        settings.approach_dist,
        settings.retreat_dist,
    );

    let mut ledger = Ledger::default();
    ledger.extend(plan.write_configuration(robot, t, &join_config(&base, &grasp_arm))?);
    let mut offsets = Vec::with_capacity(2 * steps);
    for i in 0..steps {
        #[allow(clippy::cast_precision_loss)]
        let scale = (steps - i) as f64;
        offsets.push((t - steps + i, approach * scale));
    }
    for i in 0..steps {
        #[allow(clippy::cast_precision_loss)]
        let scale = (i + 1) as f64;
        offsets.push((t + 1 + i, retreat * scale));
    }

    let mut unreachable = Vec::new();
    for (step, offset) in offsets {
        match attempt
            .oracle
            .solve_ik(&base, &frame.translated(offset), &grasp_arm)
        {
            Some(arm) => {
                let arm = closer_joint_angles(&arm, &grasp_arm, &layout.arm.revolute);
                ledger.extend(plan.write_configuration(robot, step, &join_config(&base, &arm))?);
            }
            None => unreachable.push(step),
        }
    }
    let proposal = plan.record_trace(
        attempt
            .trace_entry(&ee_name)
            .propose(&layout.base.attr, &base)
            .propose(&layout.arm.attr, &grasp_arm),
    );
    if !unreachable.is_empty() {
        plan.fail_trace(proposal);
        return Ok(attempt.infeasible(format!(
            "approach/retreat unreachable at steps {unreachable:?}"
        )));
    }

    for step in t - steps..=t + steps {
        plan.lock_configuration(robot, step)?;
    }

    let containing = plan.last_action_at(t).ok_or(PlanningError::StepOutOfRange {
        step: t,
        horizon: plan.horizon(),
    })?;
    let init = match containing.0.checked_sub(1) {
        Some(prev) if plan.reachable_repaired(attempt.failure.binding) => plan.actions()[prev].start,
        _ => plan.action(containing)?.start,
    };
    let window_start = t - steps;
    if init < window_start {
        let start = plan.configuration(robot, init)?;
        let end = plan.configuration(robot, window_start)?;
        if !all_finite(&start) {
            plan.fail_trace(proposal);
            return Ok(attempt.declined("connection start undefined"));
        }
        let Some(raw) = attempt.oracle.plan_path(&start, &end) else {
            plan.fail_trace(proposal);
            return Ok(attempt.declined("no path to the approach window"));
        };
        let waypoints = resample_path(&raw, window_start - init + 1);
        for (offset, config) in waypoints.iter().enumerate().skip(1) {
            ledger.extend(plan.write_configuration(robot, init + offset, config)?);
        }
    }
    ledger.commit(plan)?;
    plan.remember_reachable(attempt.failure.binding);
    Ok(attempt.repaired("ee_reachable", ledger))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::RepairSettings,
        module::{ActionId, BindingId, Failure},
        testing::{FakeOracle, GantryPlan},
    };

    fn failure() -> Failure {
        Failure {
            binding: BindingId(2),
            predicate: "EEReachable".into(),
            step: 5,
            action: ActionId(1),
            action_name: "grasp".into(),
        }
    }

    fn plan() -> (Plan, ParamId, ParamId) {
        let plan = GantryPlan::moveto_then_grasp(true, 10).build();
        let robot = plan.param_id("gantry0").unwrap();
        let ee = plan.param_id("ee0").unwrap();
        (plan, robot, ee)
    }

    #[test]
    fn locks_window_and_offsets_linearly() {
        let (mut plan, robot, ee) = plan();
        let oracle = FakeOracle::default();
        let settings = RepairSettings::default();
        let attempt = Attempt {
            settings: &settings,
            oracle: &oracle,
            failure: failure(),
        };
        let outcome = repair(&mut plan, &attempt, robot, ee, false).unwrap();
        assert!(outcome.is_repaired());
        for step in 2..=8 {
            assert!(plan.param(robot).unwrap().is_fixed(step).unwrap());
        }
        // approach runs along -z for a level end effector; step 4 was committed earlier
        let z: Vec<f64> = [2, 3, 5].iter().map(|t| plan.arm(robot, *t).unwrap()[2]).collect();
        for (got, want) in z.iter().zip([0.825, 0.85, 0.9]) {
            assert!((got - want).abs() < 1e-9, "{got} vs {want}");
        }
        assert!(plan.reachable_repaired(BindingId(2)));
        assert_eq!(plan.trace().len(), 1);
    }

    #[test]
    fn unreachable_offset_writes_values_but_locks_nothing() {
        let (mut plan, robot, ee) = plan();
        let oracle = FakeOracle {
            reach_z: 0.91,
            ..FakeOracle::default()
        };
        let settings = RepairSettings {
            approach_dist: -0.025,
            ..RepairSettings::default()
        };
        let attempt = Attempt {
            settings: &settings,
            oracle: &oracle,
            failure: failure(),
        };
        let before = plan.locked_cells();
        let outcome = repair(&mut plan, &attempt, robot, ee, false).unwrap();
        assert!(matches!(outcome, RepairOutcome::Infeasible(_)));
        assert_eq!(plan.locked_cells(), before);
        assert!(plan.trace()[0].failed());
        // retreat offsets stay at grasp height and were still written
        assert!(plan.arm(robot, 6).unwrap()[2].is_finite());
    }

    #[test]
    fn window_outside_horizon_is_a_contract_error() {
        let (mut plan, robot, ee) = plan();
        let oracle = FakeOracle::default();
        let settings = RepairSettings::default();
        let mut bad = failure();
        bad.step = 8;
        let attempt = Attempt {
            settings: &settings,
            oracle: &oracle,
            failure: bad,
        };
        assert!(matches!(
            repair(&mut plan, &attempt, robot, ee, false),
            Err(PlanningError::StepOutOfRange { .. })
        ));
    }

    #[test]
    fn second_repair_connects_from_previous_action() {
        let (mut plan, robot, ee) = plan();
        plan.remember_reachable(BindingId(2));
        let oracle = FakeOracle::default();
        let settings = RepairSettings::default();
        let attempt = Attempt {
            settings: &settings,
            oracle: &oracle,
            failure: failure(),
        };
        assert!(repair(&mut plan, &attempt, robot, ee, false)
            .unwrap()
            .is_repaired());
        assert!(plan.param(robot).unwrap().is_fixed(1).unwrap());
    }
}
