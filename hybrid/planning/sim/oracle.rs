use glam::DVec3;
use serde::{Deserialize, Serialize};

use crate::{
    config::ArmSpec,
    module::{Configuration, Frame},
    oracle::{CollisionReport, GeometryOracle},
    repair::helper::smaller_angle,
};

/// Spherical obstacle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    /// Obstacle name.
    pub name: String,
    /// Center.
    pub center: [f64; 3],
    /// Radius.
    pub radius: f64,
    /// Known symbolic obstacle (checked by `Obstructs`) rather than static environment.
    #[serde(default)]
    pub symbolic: bool,
}

impl Sphere {
    /// Signed distance from `point` to the surface.
    #[must_use]
    pub fn distance(&self, point: DVec3) -> f64 {
        point.distance(DVec3::from_array(self.center)) - self.radius
    }
}

/// Allowed tool headings: `center ± half_width` radians.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct YawBand {
    /// Band center.
    pub center: f64,
    /// Half width.
    pub half_width: f64,
}

impl YawBand {
    /// True when `yaw` lies in the band, modulo a full turn.
    #[must_use]
    pub fn contains(&self, yaw: f64) -> bool {
        smaller_angle(yaw - self.center).abs() <= self.half_width
    }
}

/// Cartesian gantry: a rail axis carrying a three-axis `[dx, dy, z]` tool stage, with
/// the tool always pointing down. Configurations are `[rail, dx, dy, z]`.
#[derive(Debug, Clone)]
pub struct GantryOracle {
    arm: ArmSpec,
    obstacles: Vec<Sphere>,
    yaw_band: Option<YawBand>,
    lift_height: f64,
    resolution: f64,
    tolerance: f64,
}

impl GantryOracle {
    /// Oracle for an arm with the given limits and no obstacles.
    #[must_use]
    pub fn new(arm: ArmSpec) -> Self {
        Self {
            arm,
            obstacles: Vec::new(),
            yaw_band: None,
            lift_height: 1.2,
            resolution: 0.02,
            tolerance: 1e-6,
        }
    }

    /// Adds static-environment obstacles. Symbolic ones are ignored by collision checks.
    #[must_use]
    pub fn with_obstacles(mut self, obstacles: impl IntoIterator<Item = Sphere>) -> Self {
        self.obstacles
            .extend(obstacles.into_iter().filter(|sphere| !sphere.symbolic));
        self
    }

    /// Restricts tool headings.
    #[must_use]
    pub const fn with_yaw_band(mut self, band: YawBand) -> Self {
        self.yaw_band = Some(band);
        self
    }

    /// Tool height used when a straight path is blocked.
    #[must_use]
    pub const fn with_lift_height(mut self, height: f64) -> Self {
        self.lift_height = height;
        self
    }

    /// Tool position of a full configuration.
    #[must_use]
    pub fn tool_position(config: &[f64]) -> Option<DVec3> {
        match config {
            [rail, dx, dy, z, ..] => Some(DVec3::new(rail + dx, *dy, *z)),
            _ => None,
        }
    }

    fn within_limits(&self, arm: &[f64]) -> bool {
        arm.iter()
            .zip(self.arm.lower.iter().zip(&self.arm.upper))
            .all(|(value, (lo, hi))| *value >= lo - self.tolerance && *value <= hi + self.tolerance)
    }

    fn segment_free(&self, from: &[f64], to: &[f64]) -> bool {
        let span = Self::tool_position(from)
            .zip(Self::tool_position(to))
            .map_or(0.0, |(a, b)| a.distance(b));
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let samples = ((span / self.resolution).ceil() as usize).max(1);
        (0..=samples).all(|idx| {
            #[allow(clippy::cast_precision_loss)]
            let frac = idx as f64 / samples as f64;
            let point: Vec<f64> = from
                .iter()
                .zip(to)
                .map(|(a, b)| a + (b - a) * frac)
                .collect();
            self.test_collision(&point).free
        })
    }

    fn lifted(&self, config: &[f64]) -> Configuration {
        let mut lifted = config.to_vec();
        if let Some(z) = lifted.last_mut() {
            *z = z.max(self.lift_height);
        }
        lifted
    }
}

impl GeometryOracle for GantryOracle {
    fn solve_ik(&self, base: &[f64], target: &Frame, _seed: &[f64]) -> Option<Configuration> {
        let tool_axis = target.basis * DVec3::X;
        if tool_axis.dot(DVec3::NEG_Z) < 1.0 - 1e-6 {
            return None;
        }
        if let Some(band) = self.yaw_band {
            let heading = target.basis * DVec3::Z;
            if !band.contains(heading.y.atan2(heading.x)) {
                return None;
            }
        }
        let rail = *base.first()?;
        let p = target.position;
        let arm = vec![p.x - rail, p.y, p.z];
        self.within_limits(&arm).then_some(arm)
    }

    fn plan_path(&self, start: &[f64], end: &[f64]) -> Option<Vec<Configuration>> {
        if start.len() != end.len() || Self::tool_position(start).is_none() {
            return None;
        }
        if self.segment_free(start, end) {
            return Some(vec![start.to_vec(), end.to_vec()]);
        }
        let up = self.lifted(start);
        let over = self.lifted(end);
        if !self.within_limits(&up[1..]) || !self.within_limits(&over[1..]) {
            return None;
        }
        (self.segment_free(start, &up) && self.segment_free(&up, &over) && self.segment_free(&over, end))
            .then(|| vec![start.to_vec(), up, over, end.to_vec()])
    }

    fn test_collision(&self, config: &[f64]) -> CollisionReport {
        let tool = Self::tool_position(config)
            .filter(|tool| config.iter().all(|value| value.is_finite()) && tool.is_finite());
        let Some(tool) = tool else {
            return CollisionReport {
                free: false,
                distance: f64::NEG_INFINITY,
            };
        };
        let distance = self
            .obstacles
            .iter()
            .map(|sphere| sphere.distance(tool))
            .fold(f64::INFINITY, f64::min);
        CollisionReport {
            free: distance > 0.0,
            distance,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{module::Pose, repair::helper::ik_frame};

    fn arm() -> ArmSpec {
        ArmSpec {
            attr: "arm".into(),
            lower: vec![-1.0, -1.0, 0.0],
            upper: vec![1.0, 1.0, 1.5],
            revolute: Vec::new(),
        }
    }

    fn level(x: f64, y: f64, z: f64, yaw: f64) -> Frame {
        ik_frame(&Pose::new(DVec3::new(x, y, z), DVec3::new(yaw, 0.0, 0.0)))
    }

    #[test]
    fn ik_is_relative_to_the_rail() {
        let oracle = GantryOracle::new(arm());
        let arm = oracle.solve_ik(&[0.4], &level(0.5, 0.0, 0.9, 0.3), &[]).unwrap();
        assert!((arm[0] - 0.1).abs() < 1e-9);
        assert!((arm[2] - 0.9).abs() < 1e-9);
        assert!(oracle.solve_ik(&[0.4], &level(0.5, 0.0, 1.9, 0.3), &[]).is_none());
    }

    #[test]
    fn yaw_band_rejects_other_headings() {
        let oracle = GantryOracle::new(arm()).with_yaw_band(YawBand {
            center: 0.0,
            half_width: 0.2,
        });
        assert!(oracle.solve_ik(&[0.0], &level(0.1, 0.0, 0.9, 0.1), &[]).is_some());
        assert!(oracle.solve_ik(&[0.0], &level(0.1, 0.0, 0.9, 1.0), &[]).is_none());
    }

    #[test]
    fn blocked_path_lifts_over_obstacle() {
        let oracle = GantryOracle::new(arm()).with_obstacles([Sphere {
            name: "crate".into(),
            center: [0.25, 0.0, 0.5],
            radius: 0.1,
            symbolic: false,
        }]);
        let start = [0.0, 0.0, 0.0, 0.5];
        let end = [0.5, 0.0, 0.0, 0.5];
        let path = oracle.plan_path(&start, &end).unwrap();
        assert_eq!(path.len(), 4);
        assert!((path[1][3] - 1.2).abs() < 1e-12);
        assert!(!oracle.test_collision(&[0.25, 0.0, 0.0, 0.5]).free);
        assert!(oracle.test_collision(&[0.25, 0.0, 0.0, 0.5]).distance < 0.0);
    }

    #[test]
    fn symbolic_obstacles_are_not_environment() {
        let oracle = GantryOracle::new(arm()).with_obstacles([Sphere {
            name: "can1".into(),
            center: [0.0, 0.0, 1.0],
            radius: 0.1,
            symbolic: true,
        }]);
        assert!(oracle.test_collision(&[0.0, 0.0, 0.0, 1.0]).free);
    }

    #[test]
    fn undefined_configuration_is_never_clear() {
        let oracle = GantryOracle::new(arm());
        let report = oracle.test_collision(&[0.0, f64::NAN, 0.0, 1.0]);
        assert!(!report.free);
        assert!(report.distance.is_infinite() && report.distance < 0.0);
        assert!(oracle.test_collision(&[0.0, 0.0, 0.0, 1.0]).free);
    }
}
