use std::sync::Arc;

use anyhow::{Context, Result};
use serde_json::json;

use plan_logging::LogLevel;

use crate::{
    config::DomainConfig,
    module::FailureReport,
    problem::{FailureSubproblemBuilder, SymbolicProblem},
    repair::Repairer,
    search::{CancelFlag, Collaborators, SearchDriver, SearchReport},
    sim::{InterpolatingRefiner, Scene, ScriptedTranslator},
    telemetry::PlanningTelemetry,
};

/// Planning runtime: owns the domain, builds the repairer and search driver for each
/// request and reports through telemetry.
pub struct HybridPlanner {
    domain: Arc<DomainConfig>,
    telemetry: Option<PlanningTelemetry>,
    seed: Option<u64>,
    cancel: CancelFlag,
}

impl HybridPlanner {
    /// Creates a runtime for a validated domain.
    #[must_use]
    pub fn new(domain: DomainConfig) -> Self {
        Self {
            domain: Arc::new(domain),
            telemetry: None,
            seed: None,
            cancel: CancelFlag::default(),
        }
    }

    /// Injects telemetry.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: PlanningTelemetry) -> Self {
        self.telemetry = Some(telemetry);
        self
    }

    /// Seeds the repair perturbations.
    #[must_use]
    pub const fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    /// Domain in use.
    #[must_use]
    pub fn domain(&self) -> &DomainConfig {
        &self.domain
    }

    /// Cancels the running and any later search.
    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    fn repairer(&self) -> Repairer {
        let settings = self.domain.repair.clone();
        match self.seed {
            Some(seed) => Repairer::with_seed(settings, seed),
            None => Repairer::new(settings),
        }
    }

    /// Searches with caller-supplied collaborators. `max_iter` defaults to the domain's
    /// search budget.
    pub fn plan_with(
        &self,
        problem: SymbolicProblem,
        collaborators: Collaborators,
        max_iter: Option<usize>,
    ) -> Result<SearchReport> {
        let max_iter = max_iter.unwrap_or(self.domain.search.max_iterations);
        let mut driver = SearchDriver::new(collaborators, self.repairer(), self.domain.search.clone())
            .with_cancel_flag(self.cancel.clone());
        if let Some(telemetry) = &self.telemetry {
            driver = driver.with_telemetry(telemetry.clone());
        }
        let name = problem.name.clone();
        let report = driver
            .plan(problem, max_iter)
            .with_context(|| format!("planning {name}"))?;
        self.log(
            if report.is_solved() {
                LogLevel::Info
            } else {
                LogLevel::Warn
            },
            "planner.completed",
            json!({
                "problem": name,
                "domain": self.domain.name,
                "solved": report.is_solved(),
                "reason": report.failure().map(FailureReport::reason),
                "iterations": report.stats.iterations,
                "repairs": report.stats.repairs,
            }),
        );
        Ok(report)
    }

    /// Searches a scene with the gantry collaborators.
    pub fn plan_scene(&self, scene: &Scene, max_iter: Option<usize>) -> Result<SearchReport> {
        let oracle = scene
            .oracle(&self.domain)
            .with_context(|| format!("building oracle for {}", scene.name))?;
        let collaborators = Collaborators {
            translator: Box::new(ScriptedTranslator::new(
                Arc::new(scene.clone()),
                Arc::clone(&self.domain),
            )),
            refiner: Box::new(InterpolatingRefiner),
            oracle: Arc::new(oracle),
            subproblems: Arc::new(FailureSubproblemBuilder),
        };
        self.log(
            LogLevel::Debug,
            "planner.scene.loaded",
            json!({
                "scene": scene.name,
                "horizon": scene.horizon,
                "skeletons": scene.skeletons.len(),
                "obstacles": scene.oracle.obstacles.len(),
            }),
        );
        self.plan_with(scene.problem(), collaborators, max_iter)
    }

    fn log(&self, level: LogLevel, message: &str, metadata: serde_json::Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.log(level, message, metadata);
        }
    }
}

/// Plans `scene` in `domain` within `max_iter` expansions.
pub fn plan(domain: &DomainConfig, scene: &Scene, max_iter: usize) -> Result<SearchReport> {
    HybridPlanner::new(domain.clone()).plan_scene(scene, Some(max_iter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        telemetry::PlanningTelemetryBuilder,
        testing::{GANTRY_DOMAIN, GRASP_SCENE},
    };
    use plan_events::MemoryEventBus;
    use plan_logging::MemoryLogger;
    use tempfile::tempdir;

    #[test]
    fn runtime_plans_scene_and_reports() {
        let temp = tempdir().unwrap();
        let bus = Arc::new(MemoryEventBus::new(64));
        let sink = Arc::new(MemoryLogger::new(256));
        let telemetry = PlanningTelemetryBuilder::new("planning-tests")
            .event_publisher(bus.clone())
            .log_path(temp.path().join("plan.log"))
            .sink(sink.clone())
            .run_id("scene-run")
            .build()
            .unwrap();
        let planner = HybridPlanner::new(DomainConfig::from_toml(GANTRY_DOMAIN).unwrap())
            .with_seed(11)
            .with_telemetry(telemetry);
        let scene = Scene::from_toml(GRASP_SCENE).unwrap();
        let report = planner.plan_scene(&scene, None).unwrap();
        assert!(report.is_solved());
        let events = bus.run("scene-run");
        assert_eq!(events.first().unwrap().event_type, "search.started");
        assert_eq!(events.last().unwrap().event_type, "search.finished");
        assert_eq!(sink.matching("planner.completed").len(), 1);
        let written = std::fs::read_to_string(temp.path().join("plan.log")).unwrap();
        assert!(written.contains("repair.grasp.repaired"));
    }

    #[test]
    fn entry_point_reports_iteration_limit() {
        let domain = DomainConfig::from_toml(GANTRY_DOMAIN).unwrap();
        let scene = Scene::from_toml(GRASP_SCENE).unwrap();
        let report = plan(&domain, &scene, 3).unwrap();
        assert_eq!(report.failure(), Some(FailureReport::IterationLimitReached));
        assert_eq!(report.stats.iterations, 3);
    }

    #[test]
    fn satisfied_goal_needs_no_search() {
        let domain = DomainConfig::from_toml(GANTRY_DOMAIN).unwrap();
        let raw = GRASP_SCENE.replace(
            "goal = [\"(InGripper gantry0 can0)\"]",
            "goal = [\"(RobotAt gantry0 robot_init_pose)\"]",
        );
        let scene = Scene::from_toml(&raw).unwrap();
        let report = plan(&domain, &scene, 10).unwrap();
        assert_eq!(report.failure(), Some(FailureReport::GoalAlreadySatisfied));
        assert_eq!(report.stats.iterations, 0);
    }

    #[test]
    fn cancelled_planner_stops_immediately() {
        let planner = HybridPlanner::new(DomainConfig::from_toml(GANTRY_DOMAIN).unwrap());
        planner.cancel_flag().cancel();
        let scene = Scene::from_toml(GRASP_SCENE).unwrap();
        let report = planner.plan_scene(&scene, Some(10)).unwrap();
        assert_eq!(report.failure(), Some(FailureReport::Cancelled));
    }
}
