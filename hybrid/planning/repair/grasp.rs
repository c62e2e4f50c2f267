use super::{
    all_finite,
    helper::{closer_joint_angles, ee_candidates_around_target, ik_frame},
    join_config, resample_path, Attempt, Ledger, RepairOutcome,
};
use crate::{
    model::{Plan, ROTATION, VALUE},
    module::PlanningError,
};

/// Sweeps end-effector orientations around the action's target and connects the first
/// reachable one to the trajectory.
///
/// The connection starts at the previous action's start when the failure falls in the
/// first half of the action, otherwise at the action's own start.
pub fn repair(plan: &mut Plan, attempt: &Attempt<'_>) -> Result<RepairOutcome, PlanningError> {
    let settings = attempt.settings;
    let action_id = attempt.failure.action;
    let action = plan.action(action_id)?.clone();
    let operands = action.operands;
    let missing = |role| PlanningError::MissingOperand {
        action: action.name.clone(),
        role,
    };
    let target = operands.target.ok_or_else(|| missing("target"))?;
    let ee = operands.ee_pose.ok_or_else(|| missing("ee_pose"))?;
    let robot = operands.robot;
    let t = attempt.failure.step;
    let layout = plan.layout_of(robot)?.clone();

    let target_pose = plan.param(target)?.pose(0)?;
    let ee_name = plan.param(ee)?.name().to_string();
    let base = plan.base(robot, t)?.to_vec();
    if !all_finite(&base) {
        return Ok(attempt.declined("base undefined at grasp step"));
    }
    let seed = plan.arm(robot, t)?.to_vec();

    let candidates = ee_candidates_around_target(
        &target_pose,
        settings.ee_angle_samples,
        settings.ee_angle_phase,
    );
    let found = candidates.iter().find_map(|candidate| {
        attempt
            .oracle
            .solve_ik(&base, &ik_frame(candidate), &seed)
            .map(|arm| (*candidate, arm))
    });
    let Some((ee_pose, arm)) = found else {
        let entry = attempt
            .trace_entry(&ee_name)
            .propose(VALUE, &target_pose.position.to_array())
            .propose(ROTATION, &target_pose.rotation.to_array());
        let idx = plan.record_trace(entry);
        plan.fail_trace(idx);
        return Ok(attempt.infeasible(format!(
            "no IK solution among {} orientations",
            candidates.len()
        )));
    };
    let arm = closer_joint_angles(&arm, &seed, &layout.arm.revolute);

    let mut ledger = Ledger::default();
    ledger.extend([
        plan.write(ee, VALUE, 0, &ee_pose.position.to_array())?,
        plan.write(ee, ROTATION, 0, &ee_pose.rotation.to_array())?,
    ]);
    let entry = attempt
        .trace_entry(&ee_name)
        .propose(VALUE, &ee_pose.position.to_array())
        .propose(ROTATION, &ee_pose.rotation.to_array())
        .propose(&layout.arm.attr, &arm);
    let proposal = plan.record_trace(entry);

    let offset = t
        .checked_sub(action.start)
        .ok_or_else(|| PlanningError::StepOutOfRange {
            step: t,
            horizon: plan.horizon(),
        })?;
    let early = offset < action.len() / 2;
    let init = match action_id.0.checked_sub(1) {
        Some(prev) if early => plan.actions()[prev].start,
        _ => action.start,
    };
    let grasp = join_config(&base, &arm);
    let start = plan.configuration(robot, init)?;
    if !all_finite(&start) {
        plan.fail_trace(proposal);
        return Ok(attempt.declined("connection start undefined"));
    }
    let Some(raw) = attempt.oracle.plan_path(&start, &grasp) else {
        plan.fail_trace(proposal);
        return Ok(attempt.declined("no path to grasp configuration"));
    };

    let waypoints = resample_path(&raw, t - init + 1);
    for (offset, config) in waypoints.iter().enumerate().skip(1) {
        ledger.extend(plan.write_configuration(robot, init + offset, config)?);
    }
    ledger.extend(plan.write_configuration(robot, t, &grasp)?);
    ledger.commit(plan)?;

    if init != action.start {
        if let Some(symbol) = operands.start {
            let committed = plan.configuration(robot, action.start)?;
            if all_finite(&committed) {
                let writes = plan.write_configuration(symbol, 0, &committed)?;
                for write in &writes {
                    plan.lock(write)?;
                }
                ledger.extend(writes);
            }
        }
    }
    Ok(attempt.repaired("grasp", ledger))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::RepairSettings,
        module::{ActionId, BindingId, Failure},
        testing::{FakeOracle, GantryPlan},
    };
    use std::sync::atomic::Ordering;

    fn failure(step: usize) -> Failure {
        Failure {
            binding: BindingId(1),
            predicate: "GraspPose".into(),
            step,
            action: ActionId(1),
            action_name: "grasp".into(),
        }
    }

    #[test]
    fn unreachable_target_exhausts_every_orientation() {
        let mut plan = GantryPlan::moveto_then_grasp(false, 8).build();
        let oracle = FakeOracle {
            reach_z: 0.8,
            ..FakeOracle::default()
        };
        let settings = RepairSettings::default();
        let attempt = Attempt {
            settings: &settings,
            oracle: &oracle,
            failure: failure(5),
        };
        let before = plan.locked_cells();
        let outcome = repair(&mut plan, &attempt).unwrap();
        assert!(matches!(outcome, RepairOutcome::Infeasible(_)));
        assert_eq!(oracle.ik_calls.load(Ordering::SeqCst), 8);
        assert_eq!(plan.trace().len(), 1);
        assert_eq!(plan.trace()[0].reward, Some(-1.0));
        assert_eq!(plan.trace()[0].proposal["value"], vec![0.5, 0.0, 0.9]);
        assert_eq!(plan.locked_cells(), before);
    }

    #[test]
    fn early_failure_connects_from_previous_action() {
        let mut plan = GantryPlan::moveto_then_grasp(false, 8).build();
        let oracle = FakeOracle::default();
        let settings = RepairSettings::default();
        let attempt = Attempt {
            settings: &settings,
            oracle: &oracle,
            failure: failure(5),
        };
        let RepairOutcome::Repaired(report) = repair(&mut plan, &attempt).unwrap() else {
            panic!("expected repair");
        };
        assert_eq!(report.strategy, "grasp");
        let robot = plan.param_id("gantry0").unwrap();
        for t in 1..=5 {
            assert!(plan.param(robot).unwrap().attr("arm").unwrap().is_locked(t).unwrap());
        }
        assert!(!plan.param(robot).unwrap().attr("arm").unwrap().is_locked(6).unwrap());
        let ee = plan.param_id("ee0").unwrap();
        assert!(plan.param(ee).unwrap().is_fixed(0).unwrap());
        assert!(!plan.trace()[0].failed());
    }

    #[test]
    fn late_failure_connects_from_own_start() {
        let mut plan = GantryPlan::moveto_then_grasp(false, 8).build();
        let oracle = FakeOracle::default();
        let settings = RepairSettings::default();
        let attempt = Attempt {
            settings: &settings,
            oracle: &oracle,
            failure: failure(6),
        };
        assert!(repair(&mut plan, &attempt).unwrap().is_repaired());
        let robot = plan.param_id("gantry0").unwrap();
        let arm = plan.param(robot).unwrap().attr("arm").unwrap();
        assert!(!arm.is_locked(3).unwrap());
        assert!(arm.is_locked(5).unwrap());
        assert!(arm.is_locked(6).unwrap());
    }

    #[test]
    fn path_failure_declines_and_marks_trace() {
        let mut plan = GantryPlan::moveto_then_grasp(false, 8).build();
        let oracle = FakeOracle {
            paths: false,
            ..FakeOracle::default()
        };
        let settings = RepairSettings::default();
        let attempt = Attempt {
            settings: &settings,
            oracle: &oracle,
            failure: failure(6),
        };
        assert!(matches!(
            repair(&mut plan, &attempt).unwrap(),
            RepairOutcome::Declined(_)
        ));
        assert!(plan.trace()[0].failed());
    }

    #[test]
    fn failure_before_the_action_is_a_contract_error() {
        let mut plan = GantryPlan::moveto_then_grasp(false, 8).build();
        let oracle = FakeOracle::default();
        let settings = RepairSettings::default();
        let attempt = Attempt {
            settings: &settings,
            oracle: &oracle,
            failure: failure(0),
        };
        assert!(matches!(
            repair(&mut plan, &attempt),
            Err(PlanningError::StepOutOfRange { step: 0, horizon: 8 })
        ));
    }
}
