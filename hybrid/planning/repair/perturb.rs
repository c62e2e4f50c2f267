use rand::Rng;

use super::{all_finite, join_config, linear_interpolation, Attempt, Ledger, RepairOutcome};
use crate::{
    model::Plan,
    module::{BindingId, ParamId, PlanningError},
    predicate::ResampleStrategy,
};

fn perturb<R: Rng + ?Sized>(original: &[f64], step: &[f64], rng: &mut R) -> Vec<f64> {
    original
        .iter()
        .zip(step)
        .map(|(value, delta)| if rng.gen::<bool>() { value + delta } else { value - delta })
        .collect()
}

fn env_guards(plan: &Plan, robot: ParamId, t: usize, skip: BindingId) -> Vec<BindingId> {
    plan.bindings()
        .iter()
        .filter(|binding| binding.id != skip && binding.covers(t))
        .filter(|binding| {
            matches!(
                binding.predicate.resample(),
                Some(ResampleStrategy::EnvCollision { robot: other }) if other == robot
            )
        })
        .map(|binding| binding.id)
        .collect()
}

/// Steps the arm at the failure step away from a known obstacle until the predicate and
/// any environment-collision predicate on the same robot both hold. Only that step is
/// locked.
pub fn obstructs<R: Rng + ?Sized>(
    plan: &mut Plan,
    attempt: &Attempt<'_>,
    robot: ParamId,
    rng: &mut R,
) -> Result<RepairOutcome, PlanningError> {
    let settings = attempt.settings;
    let t = attempt.failure.step;
    let layout = plan.layout_of(robot)?.clone();
    let original = plan.arm(robot, t)?.to_vec();
    if !all_finite(&original) {
        return Ok(attempt.declined("arm undefined at failure step"));
    }
    if plan.param(robot)?.attr(&layout.arm.attr)?.is_locked(t)? {
        return Ok(attempt.declined("arm already committed at failure step"));
    }
    let step = layout.arm.joint_step(settings.obstruct_joint_divisor);
    let binding = attempt.failure.binding;
    let guards = env_guards(plan, robot, t, binding);

    for _ in 0..settings.max_perturbation_attempts {
        let candidate = perturb(&original, &step, rng);
        let write = plan.write_arm(robot, t, &candidate)?;
        let clear = plan.test_binding(binding, t, attempt.oracle)?
            && guards.iter().try_fold(true, |ok, guard| {
                Ok::<_, PlanningError>(ok && plan.test_binding(*guard, t, attempt.oracle)?)
            })?;
        if clear {
            let mut ledger = Ledger::default();
            ledger.extend([write]);
            ledger.commit(plan)?;
            return Ok(attempt.repaired("obstructs", ledger));
        }
    }
    plan.write_arm(robot, t, &original)?;
    Ok(attempt.infeasible(format!(
        "still obstructed after {} perturbations",
        settings.max_perturbation_attempts
    )))
}

/// Inclusive re-interpolation window around `t`: bounded by the nearest spatial-anchor
/// windows on either side, then by `half_width` steps.
#[must_use]
pub fn anchor_window(plan: &Plan, t: usize, half_width: usize) -> (usize, usize) {
    let last = plan.horizon().saturating_sub(1);
    let mut start = 0;
    let mut end = last;
    for binding in plan.bindings() {
        if !binding.predicate.spatial_anchor() {
            continue;
        }
        let (lo, hi) = binding.active_steps();
        if let Ok(lo) = usize::try_from(lo) {
            if lo > t {
                end = end.min(lo);
            }
        }
        if let Ok(hi) = usize::try_from(hi) {
            if hi < t {
                start = start.max(hi);
            }
        }
    }
    (
        start.max(t.saturating_sub(half_width)),
        end.min(t + half_width).min(last),
    )
}

/// Perturbs the arm out of environment or self collision with a shrinking step, then
/// re-interpolates the cells strictly inside the anchor window through the new pose.
pub fn env_collision<R: Rng + ?Sized>(
    plan: &mut Plan,
    attempt: &Attempt<'_>,
    robot: ParamId,
    rng: &mut R,
) -> Result<RepairOutcome, PlanningError> {
    let settings = attempt.settings;
    let t = attempt.failure.step;
    let layout = plan.layout_of(robot)?.clone();
    let original = plan.arm(robot, t)?.to_vec();
    let base = plan.base(robot, t)?.to_vec();
    if !all_finite(&original) || !all_finite(&base) {
        return Ok(attempt.declined("configuration undefined at failure step"));
    }
    if plan.param(robot)?.attr(&layout.arm.attr)?.is_locked(t)? {
        return Ok(attempt.declined("arm already committed at failure step"));
    }

    let mut step = layout.arm.joint_step(settings.collision_joint_divisor);
    let binding = attempt.failure.binding;
    let mut accepted = None;
    let mut written = false;
    for tries in 0..settings.max_perturbation_attempts {
        if tries > 0 && tries % settings.collision_attempts_per_decay == 0 {
            for delta in &mut step {
                *delta /= settings.collision_step_decay;
            }
        }
        let candidate = perturb(&original, &step, rng);
        let report = attempt.oracle.test_collision(&join_config(&base, &candidate));
        if !report.clear_of(settings.dsafe) {
            continue;
        }
        plan.write_arm(robot, t, &candidate)?;
        written = true;
        if plan.test_binding(binding, t, attempt.oracle)? {
            accepted = Some(candidate);
            break;
        }
    }
    let Some(arm) = accepted else {
        if written {
            plan.write_arm(robot, t, &original)?;
        }
        return Ok(attempt.infeasible(format!(
            "no collision-free perturbation after {} attempts",
            settings.max_perturbation_attempts
        )));
    };

    let mut ledger = Ledger::default();
    ledger.extend([plan.write_arm(robot, t, &arm)?]);

    let (start, end) = anchor_window(plan, t, settings.collision_window);
    let boundary = |plan: &Plan, step: usize| -> Result<Vec<f64>, PlanningError> {
        let values = plan.arm(robot, step)?.to_vec();
        Ok(if all_finite(&values) { values } else { arm.clone() })
    };
    let from = boundary(plan, start)?;
    let to = boundary(plan, end)?;
    let inbound = linear_interpolation(&from, &arm, t - start);
    let outbound = linear_interpolation(&arm, &to, end - t);
    for (offset, values) in inbound.iter().enumerate().skip(1) {
        let step = start + offset;
        if step < t {
            ledger.extend([plan.write_arm(robot, step, values)?]);
        }
    }
    for (offset, values) in outbound.iter().enumerate().skip(1) {
        let step = t + offset;
        if step < end {
            ledger.extend([plan.write_arm(robot, step, values)?]);
        }
    }
    ledger.commit(plan)?;
    Ok(attempt.repaired("env_collision", ledger))
}
