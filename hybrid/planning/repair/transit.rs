use super::{
    all_finite,
    helper::{closer_joint_angles, ik_frame},
    join_config, resample_path, robot_name, Attempt, Ledger, RepairOutcome,
};
use crate::{model::Plan, module::PlanningError};

/// Re-plans a movement action between its locked start and its target configuration.
///
/// When the following action already has a fixed end-effector pose, the target comes
/// from IK on that pose (with the base held where it stands mid-way through the next
/// action); otherwise the action's own end symbol is used.
pub fn repair(plan: &mut Plan, attempt: &Attempt<'_>) -> Result<RepairOutcome, PlanningError> {
    let action_id = attempt.failure.action;
    let action = plan.action(action_id)?.clone();
    let robot = action.operands.robot;
    let layout = plan.layout_of(robot)?.clone();

    let start = plan.configuration(robot, action.start)?;
    if !all_finite(&start) {
        return Ok(attempt.infeasible("start configuration undefined"));
    }

    let next = plan
        .actions()
        .get(action_id.0 + 1)
        .and_then(|next| next.operands.ee_pose.map(|ee| (next.clone(), ee)));
    let alternate = match next {
        Some((next, ee)) if plan.param(ee)?.is_fixed(0)? => Some((next, ee)),
        _ => None,
    };

    let mut ledger = Ledger::default();
    let mut proposal = None;
    let target = if let Some((next, ee)) = alternate {
        let ee_pose = plan.param(ee)?.pose(0)?;
        let base = plan.base(robot, next.midpoint())?.to_vec();
        let seed = plan.arm(robot, attempt.failure.step)?.to_vec();
        if !all_finite(&base) {
            return Ok(attempt.declined("base undefined for next action"));
        }
        let Some(arm) = attempt.oracle.solve_ik(&base, &ik_frame(&ee_pose), &seed) else {
            return Ok(attempt.declined("no IK solution for next end-effector pose"));
        };
        let arm = closer_joint_angles(&arm, &seed, &layout.arm.revolute);
        let config = join_config(&base, &arm);
        let target_name = match action.operands.end {
            Some(end) => {
                let writes = plan.write_configuration(end, 0, &config)?;
                for write in &writes {
                    plan.lock(write)?;
                }
                ledger.extend(writes);
                plan.param(end)?.name().to_string()
            }
            None => robot_name(plan, robot)?,
        };
        let entry = attempt
            .trace_entry(&target_name)
            .propose(&layout.base.attr, &base)
            .propose(&layout.arm.attr, &arm);
        proposal = Some(plan.record_trace(entry));
        config
    } else {
        let end = action
            .operands
            .end
            .ok_or_else(|| PlanningError::MissingOperand {
                action: action.name.clone(),
                role: "end",
            })?;
        let symbol = plan.configuration(end, 0)?;
        if all_finite(&symbol) {
            symbol
        } else {
            let fallback = plan.configuration(robot, action.end)?;
            if !all_finite(&fallback) {
                return Ok(attempt.infeasible("no target configuration"));
            }
            fallback
        }
    };

    let Some(raw) = attempt.oracle.plan_path(&start, &target) else {
        return Ok(match proposal {
            Some(idx) => {
                plan.fail_trace(idx);
                attempt.declined("no path to the next action's pose")
            }
            None => attempt.infeasible("no collision-free path"),
        });
    };

    let waypoints = resample_path(&raw, action.len());
    for (offset, config) in waypoints.iter().enumerate().skip(1) {
        ledger.extend(plan.write_configuration(robot, action.start + offset, config)?);
    }
    ledger.commit(plan)?;
    Ok(attempt.repaired("transit", ledger))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::RepairSettings,
        module::{ActionId, BindingId, Failure},
        testing::{FakeOracle, GantryPlan},
    };

    fn failure(step: usize) -> Failure {
        Failure {
            binding: BindingId(0),
            predicate: "RobotAt".into(),
            step,
            action: ActionId(0),
            action_name: "moveto".into(),
        }
    }

    #[test]
    fn resamples_path_into_action_steps() {
        let mut plan = GantryPlan::moveto_then_grasp(false, 8).build();
        let oracle = FakeOracle::default();
        let settings = RepairSettings::default();
        let attempt = Attempt {
            settings: &settings,
            oracle: &oracle,
            failure: failure(4),
        };
        let outcome = repair(&mut plan, &attempt).unwrap();
        assert!(outcome.is_repaired());
        let robot = plan.param_id("gantry0").unwrap();
        // start base 0.0, end base 0.4 over 5 steps
        let bases: Vec<f64> = (0..5).map(|t| plan.base(robot, t).unwrap()[0]).collect();
        for (got, want) in bases.iter().zip([0.0, 0.1, 0.2, 0.3, 0.4]) {
            assert!((got - want).abs() < 1e-9);
        }
        assert!(plan.param(robot).unwrap().is_fixed(3).unwrap());
        assert!(plan.trace().is_empty());
    }

    #[test]
    fn missing_path_without_alternate_is_infeasible() {
        let mut plan = GantryPlan::moveto_then_grasp(false, 8).build();
        let oracle = FakeOracle {
            paths: false,
            ..FakeOracle::default()
        };
        let settings = RepairSettings::default();
        let attempt = Attempt {
            settings: &settings,
            oracle: &oracle,
            failure: failure(2),
        };
        let outcome = repair(&mut plan, &attempt).unwrap();
        assert!(matches!(outcome, RepairOutcome::Infeasible(_)));
    }

    #[test]
    fn alternate_target_failure_is_declined_with_failed_trace() {
        let mut plan = GantryPlan::moveto_then_grasp(true, 8).build();
        let oracle = FakeOracle {
            paths: false,
            ..FakeOracle::default()
        };
        let settings = RepairSettings::default();
        let attempt = Attempt {
            settings: &settings,
            oracle: &oracle,
            failure: failure(2),
        };
        let outcome = repair(&mut plan, &attempt).unwrap();
        assert!(matches!(outcome, RepairOutcome::Declined(_)));
        assert_eq!(plan.trace().len(), 1);
        assert!(plan.trace()[0].failed());
    }

    #[test]
    fn alternate_target_comes_from_next_end_effector_pose() {
        let mut plan = GantryPlan::moveto_then_grasp(true, 8).build();
        let oracle = FakeOracle::default();
        let settings = RepairSettings::default();
        let attempt = Attempt {
            settings: &settings,
            oracle: &oracle,
            failure: failure(2),
        };
        assert!(repair(&mut plan, &attempt).unwrap().is_repaired());
        // fake IK places the tool at the end-effector position relative to the base
        let proposal = &plan.trace()[0].proposal;
        assert!((proposal["arm"][0] - 0.1).abs() < 1e-9);
        assert!((proposal["arm"][2] - 0.9).abs() < 1e-9);
        assert!(!plan.trace()[0].failed());
    }
}
