//! Reference collaborators for a Cartesian gantry: geometry oracle, predicate family,
//! scene-driven translator and an interpolating refiner.

/// Gantry kinematics, path planning and collision checks.
pub mod oracle;
/// Predicates over gantry plans.
pub mod predicates;
/// TOML scene files and skeleton grounding.
pub mod scene;

use std::sync::Arc;

use crate::{
    config::DomainConfig,
    model::Plan,
    module::PlanningError,
    oracle::{GeometryOracle, HlTranslator, LlRefiner, RefineOutcome, TranslationRequest},
};

pub use oracle::{GantryOracle, Sphere, YawBand};
pub use predicates::{EeReachable, EnvCollision, GraspPose, Obstructs, RobotAt};
pub use scene::{ActionKind, ActionSpec, Scene, SkeletonSpec};

/// Offers the scene's skeletons in order. A failure-derived node gets its repaired plan
/// back once and nothing else.
#[derive(Debug, Clone)]
pub struct ScriptedTranslator {
    scene: Arc<Scene>,
    domain: Arc<DomainConfig>,
}

impl ScriptedTranslator {
    /// Creates the translator.
    #[must_use]
    pub fn new(scene: Arc<Scene>, domain: Arc<DomainConfig>) -> Self {
        Self { scene, domain }
    }
}

impl HlTranslator for ScriptedTranslator {
    fn translate(&mut self, request: TranslationRequest<'_>) -> Result<Option<Plan>, PlanningError> {
        match request.seed {
            Some(seed) => Ok((request.revisit == 0).then(|| seed.clone())),
            None => self.scene.skeleton(&self.domain, request.revisit),
        }
    }
}

/// Fills every undefined free cell by linear interpolation between the nearest defined
/// steps (holding the edge value past the last one), then reports the earliest violation.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterpolatingRefiner;

impl LlRefiner for InterpolatingRefiner {
    fn refine(
        &mut self,
        plan: &mut Plan,
        oracle: &dyn GeometryOracle,
    ) -> Result<RefineOutcome, PlanningError> {
        fill_undefined(plan)?;
        Ok(plan
            .first_failure(oracle)
            .map_or(RefineOutcome::Solved, RefineOutcome::Failed))
    }
}

/// Interpolates undefined trajectory cells row by row; returns the number of cells written.
pub fn fill_undefined(plan: &mut Plan) -> Result<usize, PlanningError> {
    let horizon = plan.horizon();
    let ids: Vec<_> = plan.param_ids().collect();
    let mut filled = 0;
    for id in ids {
        let param = plan.param(id)?;
        if param.is_symbol() {
            continue;
        }
        let attrs: Vec<String> = param.attr_names().map(str::to_string).collect();
        for attr in attrs {
            let columns = (0..horizon)
                .map(|t| plan.param(id)?.values(&attr, t).map(<[f64]>::to_vec))
                .collect::<Result<Vec<_>, _>>()?;
            let rows = columns.first().map_or(0, Vec::len);
            let mut updated = columns.clone();
            for row in 0..rows {
                let known: Vec<(usize, f64)> = columns
                    .iter()
                    .enumerate()
                    .filter_map(|(t, column)| column[row].is_finite().then_some((t, column[row])))
                    .collect();
                if known.is_empty() {
                    continue;
                }
                for (t, column) in updated.iter_mut().enumerate() {
                    if column[row].is_finite() {
                        continue;
                    }
                    let after = known.partition_point(|(step, _)| *step < t);
                    column[row] = match (after.checked_sub(1).map(|idx| known[idx]), known.get(after)) {
                        (Some((t0, v0)), Some(&(t1, v1))) => {
                            #[allow(clippy::cast_precision_loss)]
                            let frac = (t - t0) as f64 / (t1 - t0) as f64;
                            v0 + (v1 - v0) * frac
                        }
                        (Some((_, value)), None) | (None, Some(&(_, value))) => value,
                        (None, None) => continue,
                    };
                }
            }
            for (t, (before, after)) in columns.iter().zip(&updated).enumerate() {
                let changed = before
                    .iter()
                    .zip(after)
                    .filter(|(old, new)| !old.is_finite() && new.is_finite())
                    .count();
                if changed > 0 {
                    plan.write(id, &attr, t, after)?;
                    filled += changed;
                }
            }
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        model::FAILED_REWARD,
        module::FailureReport,
        problem::FailureSubproblemBuilder,
        repair::Repairer,
        search::{Collaborators, SearchDriver},
        testing::{GantryPlan, GANTRY_DOMAIN, GRASP_SCENE},
    };

    fn driver(scene: Scene) -> SearchDriver {
        let domain = DomainConfig::from_toml(GANTRY_DOMAIN).unwrap();
        let oracle = Arc::new(scene.oracle(&domain).unwrap());
        let settings = domain.search.clone();
        let repairer = Repairer::with_seed(domain.repair.clone(), 7);
        SearchDriver::new(
            Collaborators {
                translator: Box::new(ScriptedTranslator::new(Arc::new(scene), Arc::new(domain))),
                refiner: Box::new(InterpolatingRefiner),
                oracle,
                subproblems: Arc::new(FailureSubproblemBuilder),
            },
            repairer,
            settings,
        )
    }

    #[test]
    fn fill_interpolates_between_defined_steps() {
        let mut plan = GantryPlan::moveto_then_grasp(false, 8).build();
        let robot = plan.param_id("gantry0").unwrap();
        let filled = fill_undefined(&mut plan).unwrap();
        assert!(filled > 0);
        assert!((plan.base(robot, 2).unwrap()[0] - 0.2).abs() < 1e-12);
        // arm known at 0 and 4 only: lerp between, hold after
        assert!((plan.arm(robot, 2).unwrap()[0] - 0.05).abs() < 1e-12);
        assert_eq!(plan.arm(robot, 7).unwrap(), &[0.1, 0.0, 1.0]);
        let ee = plan.param(plan.param_id("ee0").unwrap()).unwrap();
        assert!(ee.values(crate::model::VALUE, 0).unwrap()[0].is_nan());
        assert!(!plan.param(robot).unwrap().is_fixed(2).unwrap());
    }

    #[test]
    fn scene_grasp_is_refined_through_repairs() {
        let scene = Scene::from_toml(GRASP_SCENE).unwrap();
        let problem = scene.problem();
        let report = driver(scene).plan(problem, 100).unwrap();
        assert!(report.is_solved());
        assert_eq!(report.stats.iterations, 9);
        assert_eq!(report.stats.repairs, 3);
        let plan = report.plan().unwrap();
        let robot = plan.param_id("gantry0").unwrap();
        let grasp = plan.configuration(robot, 7).unwrap();
        for (value, expected) in grasp.iter().zip([0.4, 0.1, 0.0, 0.9]) {
            assert!((value - expected).abs() < 1e-9);
        }
        let ee = plan.param(plan.param_id("ee0").unwrap()).unwrap();
        assert!(ee.is_fixed(0).unwrap());
        assert_eq!(plan.trace().len(), 1);
        assert!(!plan.trace()[0].failed());
    }

    #[test]
    fn unreachable_headings_end_without_refinement() {
        let raw = GRASP_SCENE.replace(
            "lift_height = 1.2",
            "lift_height = 1.2\nyaw_band = [3.141592653589793, 0.2]",
        );
        let scene = Scene::from_toml(&raw).unwrap();
        let problem = scene.problem();
        let report = driver(scene).plan(problem, 100).unwrap();
        assert_eq!(report.failure(), Some(FailureReport::NoFeasibleRefinement));
        assert_eq!(report.stats.iterations, 7);
        let trace = report.trace();
        assert_eq!(trace.len(), 1);
        assert_eq!(trace[0].reward, Some(FAILED_REWARD));
    }

    #[test]
    fn seeded_translation_is_offered_once() {
        let domain = Arc::new(DomainConfig::from_toml(GANTRY_DOMAIN).unwrap());
        let scene = Arc::new(Scene::from_toml(GRASP_SCENE).unwrap());
        let problem = scene.problem();
        let seed = scene.skeleton(&domain, 0).unwrap().unwrap();
        let mut translator = ScriptedTranslator::new(scene, domain);
        let first = translator
            .translate(TranslationRequest {
                problem: &problem,
                revisit: 0,
                seed: Some(&seed),
            })
            .unwrap();
        assert_eq!(first.map(|plan| plan.id()), Some(seed.id()));
        let second = translator
            .translate(TranslationRequest {
                problem: &problem,
                revisit: 1,
                seed: Some(&seed),
            })
            .unwrap();
        assert!(second.is_none());
    }
}
