use std::f64::consts::{FRAC_PI_2, PI, TAU};

use glam::{DMat3, DQuat, DVec3, EulerRot};

use crate::module::{Configuration, Frame, Pose};

/// Wraps an angle into `(-pi, pi]`.
#[must_use]
pub fn smaller_angle(angle: f64) -> f64 {
    let wrapped = (angle + PI).rem_euclid(TAU) - PI;
    if wrapped <= -PI {
        wrapped + TAU
    } else {
        wrapped
    }
}

/// Equivalent of `angle` (modulo a full turn) nearest to `reference`.
#[must_use]
pub fn closer_angle(angle: f64, reference: f64) -> f64 {
    reference + smaller_angle(angle - reference)
}

/// Replaces revolute joints of `joints` with the equivalent angle closest to `seed`.
#[must_use]
pub fn closer_joint_angles(joints: &[f64], seed: &[f64], revolute: &[usize]) -> Configuration {
    joints
        .iter()
        .enumerate()
        .map(|(idx, value)| match seed.get(idx) {
            Some(reference) if revolute.contains(&idx) && reference.is_finite() => {
                closer_angle(*value, *reference)
            }
            _ => *value,
        })
        .collect()
}

/// Candidate with the least squared displacement from `seed`. Undefined seed entries
/// are ignored.
#[must_use]
pub fn closest_configuration<'a>(
    candidates: &'a [Configuration],
    seed: &[f64],
) -> Option<&'a Configuration> {
    let cost = |candidate: &Configuration| -> f64 {
        candidate
            .iter()
            .zip(seed)
            .filter(|(_, reference)| reference.is_finite())
            .map(|(value, reference)| (value - reference).powi(2))
            .sum()
    };
    candidates
        .iter()
        .min_by(|a, b| cost(a).total_cmp(&cost(b)))
}

/// Yaw, pitch, roll of a rotation matrix.
#[must_use]
pub fn euler_of(basis: DMat3) -> DVec3 {
    let (yaw, pitch, roll) = DQuat::from_mat3(&basis).to_euler(EulerRot::ZYX);
    DVec3::new(yaw, pitch, roll)
}

/// Manipulator frame of an end-effector pose: the pose frame turned a quarter turn
/// about its y axis.
#[must_use]
pub fn ik_basis(ee: &Pose) -> DMat3 {
    ee.basis() * DMat3::from_rotation_y(FRAC_PI_2)
}

/// Frame handed to the IK solver for an end-effector pose.
#[must_use]
pub fn ik_frame(ee: &Pose) -> Frame {
    Frame::new(ee.position, ik_basis(ee))
}

/// End-effector poses around `target`, rotating its frame about the local z axis over
/// `samples` evenly spaced angles from `phase` to `phase + 2pi` inclusive.
#[must_use]
pub fn ee_candidates_around_target(target: &Pose, samples: usize, phase: f64) -> Vec<Pose> {
    let basis = target.basis();
    (0..samples)
        .map(|idx| {
            let angle = if samples > 1 {
                #[allow(clippy::cast_precision_loss)]
                let frac = idx as f64 / (samples - 1) as f64;
                phase + TAU * frac
            } else {
                phase
            };
            Pose::new(
                target.position,
                euler_of(basis * DMat3::from_rotation_z(angle)),
            )
        })
        .collect()
}

/// Approach and retreat offsets for a manipulator frame. Grasps approach against the
/// frame's x axis and retreat along its negative z axis; putdowns swap the two.
#[must_use]
pub fn approach_retreat_dirs(
    basis: DMat3,
    inverse: bool,
    approach_dist: f64,
    retreat_dist: f64,
) -> (DVec3, DVec3) {
    let x_axis = (basis * DVec3::NEG_X).normalize();
    let z_axis = (basis * DVec3::NEG_Z).normalize();
    if inverse {
        (z_axis * approach_dist, -x_axis * retreat_dist)
    } else {
        (-x_axis * approach_dist, z_axis * retreat_dist)
    }
}
