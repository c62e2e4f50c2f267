//! Best-first search over hybrid HL/LL nodes.

/// Search node variants.
pub mod node;
/// Min-priority queue with FIFO tie-breaking.
pub mod queue;

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use plan_logging::LogLevel;

use crate::{
    config::SearchSettings,
    model::{Plan, SamplingTraceEntry},
    module::{FailureReport, PlanningError},
    oracle::{
        GeometryOracle, HlTranslator, LlRefiner, RefineOutcome, SubproblemBuilder,
        TranslationRequest,
    },
    problem::SymbolicProblem,
    repair::{RepairOutcome, Repairer},
    telemetry::PlanningTelemetry,
};

pub use node::{HlNode, LlNode, NodeKind, SearchNode};
pub use queue::NodeQueue;

/// External collaborators consumed by the driver.
pub struct Collaborators {
    /// Skeleton producer.
    pub translator: Box<dyn HlTranslator>,
    /// Continuous refiner.
    pub refiner: Box<dyn LlRefiner>,
    /// Kinematics and collision oracle.
    pub oracle: Arc<dyn GeometryOracle>,
    /// Failure-driven subproblem constructor.
    pub subproblems: Arc<dyn SubproblemBuilder>,
}

/// Cooperative cancellation, checked between iterations.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Requests cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// True once cancellation was requested.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Counters for one search run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchStats {
    /// Nodes popped.
    pub iterations: usize,
    /// HL expansions that produced a skeleton.
    pub translations: usize,
    /// Refinement passes.
    pub refinements: usize,
    /// Successful repairs.
    pub repairs: usize,
    /// Failure-derived HL nodes queued.
    pub children: usize,
    /// Largest queue length observed.
    pub peak_queue: usize,
}

/// Plan or failure reason.
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    /// Fully refined plan.
    Solved(Box<Plan>),
    /// Search ended without a plan.
    Failed(FailureReport),
}

/// Result of [`SearchDriver::plan`].
#[derive(Debug, Clone)]
pub struct SearchReport {
    /// Plan or failure reason.
    pub outcome: SearchOutcome,
    /// Counters.
    pub stats: SearchStats,
    /// Most recently refined plan, kept for its repair trace.
    pub last_plan: Option<Box<Plan>>,
}

impl SearchReport {
    /// True when a plan was found.
    #[must_use]
    pub const fn is_solved(&self) -> bool {
        matches!(self.outcome, SearchOutcome::Solved(_))
    }

    /// Failure reason, if the search failed.
    #[must_use]
    pub const fn failure(&self) -> Option<FailureReport> {
        match self.outcome {
            SearchOutcome::Solved(_) => None,
            SearchOutcome::Failed(report) => Some(report),
        }
    }

    /// Solved plan.
    #[must_use]
    pub fn plan(&self) -> Option<&Plan> {
        match &self.outcome {
            SearchOutcome::Solved(plan) => Some(plan),
            SearchOutcome::Failed(_) => None,
        }
    }

    /// Repair trace of the solved plan, or of the last refined plan on failure.
    #[must_use]
    pub fn trace(&self) -> &[SamplingTraceEntry] {
        self.plan()
            .or(self.last_plan.as_deref())
            .map_or(&[][..], Plan::trace)
    }

    /// Converts into `Ok(plan)` or `Err(reason)`.
    pub fn into_result(self) -> Result<Plan, FailureReport> {
        match self.outcome {
            SearchOutcome::Solved(plan) => Ok(*plan),
            SearchOutcome::Failed(report) => Err(report),
        }
    }
}

/// Best-first driver interleaving translation, refinement and repair.
pub struct SearchDriver {
    collaborators: Collaborators,
    repairer: Repairer,
    settings: SearchSettings,
    telemetry: Option<PlanningTelemetry>,
    cancel: CancelFlag,
}

struct Run {
    queue: NodeQueue<SearchNode>,
    stats: SearchStats,
    last_plan: Option<Box<Plan>>,
    iteration: u64,
}

impl Run {
    fn push(&mut self, node: SearchNode) {
        self.queue.push(node.heuristic(), node);
        self.stats.peak_queue = self.stats.peak_queue.max(self.queue.len());
    }
}

impl SearchDriver {
    /// Creates a driver.
    #[must_use]
    pub fn new(collaborators: Collaborators, repairer: Repairer, settings: SearchSettings) -> Self {
        Self {
            collaborators,
            repairer,
            settings,
            telemetry: None,
            cancel: CancelFlag::default(),
        }
    }

    /// Attaches telemetry to the driver and its repairer.
    #[must_use]
    pub fn with_telemetry(mut self, telemetry: PlanningTelemetry) -> Self {
        self.repairer = self.repairer.with_telemetry(telemetry.clone());
        self.telemetry = Some(telemetry);
        self
    }

    /// Shares an existing cancellation flag.
    #[must_use]
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    /// Handle for cancelling a running search from another thread.
    #[must_use]
    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Searches for a refined plan within `max_iter` expansions.
    ///
    /// Only contract violations are returned as errors; every search failure is a
    /// [`SearchOutcome::Failed`] report.
    pub fn plan(
        &mut self,
        problem: SymbolicProblem,
        max_iter: usize,
    ) -> Result<SearchReport, PlanningError> {
        let problem = Arc::new(problem);
        let mut run = Run {
            queue: NodeQueue::new(),
            stats: SearchStats::default(),
            last_plan: None,
            iteration: 0,
        };
        self.event(
            "search.started",
            json!({ "problem": problem.name, "max_iter": max_iter }),
        );
        if problem.goal_test() {
            return Ok(self.finish(run, SearchOutcome::Failed(FailureReport::GoalAlreadySatisfied)));
        }
        run.push(SearchNode::root(problem));

        for iteration in 0..max_iter {
            if self.cancel.is_cancelled() {
                return Ok(self.finish(run, SearchOutcome::Failed(FailureReport::Cancelled)));
            }
            let Some((key, node)) = run.queue.pop() else {
                return Ok(self.finish(
                    run,
                    SearchOutcome::Failed(FailureReport::NoFeasibleRefinement),
                ));
            };
            run.iteration = u64::try_from(iteration).unwrap_or(u64::MAX);
            run.stats.iterations += 1;
            self.log(
                run.iteration,
                LogLevel::Debug,
                "search.node.expanded",
                json!({
                    "node": node.id,
                    "kind": node.label(),
                    "priority": node.priority,
                    "heuristic": key,
                    "queued": run.queue.len(),
                }),
            );
            let SearchNode {
                id,
                priority,
                problem,
                kind,
            } = node;
            match kind {
                NodeKind::Hl(hl) => self.expand_hl(&mut run, id, priority, problem, hl)?,
                NodeKind::Ll(ll) => {
                    if let Some(plan) = self.expand_ll(&mut run, id, priority, problem, ll)? {
                        return Ok(self.finish(run, SearchOutcome::Solved(plan)));
                    }
                }
            }
        }
        Ok(self.finish(
            run,
            SearchOutcome::Failed(FailureReport::IterationLimitReached),
        ))
    }

    fn expand_hl(
        &mut self,
        run: &mut Run,
        id: uuid::Uuid,
        priority: usize,
        problem: Arc<SymbolicProblem>,
        mut hl: HlNode,
    ) -> Result<(), PlanningError> {
        let skeleton = self.collaborators.translator.translate(TranslationRequest {
            problem: &problem,
            revisit: hl.revisits,
            seed: hl.seed.as_deref(),
        })?;
        let Some(plan) = skeleton else {
            self.log(
                run.iteration,
                LogLevel::Debug,
                "search.hl.exhausted",
                json!({ "node": id, "revisits": hl.revisits }),
            );
            return Ok(());
        };
        run.stats.translations += 1;
        self.event(
            "search.hl.translated",
            json!({
                "node": id,
                "revisit": hl.revisits,
                "actions": plan.actions().iter().map(|action| action.name.as_str()).collect::<Vec<_>>(),
                "horizon": plan.horizon(),
            }),
        );
        hl.revisits += 1;
        // the LL node goes in first so it wins the tie with its re-queued parent
        run.push(SearchNode::ll(Arc::clone(&problem), priority + 1, plan));
        run.push(SearchNode {
            id,
            priority,
            problem,
            kind: NodeKind::Hl(hl),
        });
        Ok(())
    }

    fn expand_ll(
        &mut self,
        run: &mut Run,
        id: uuid::Uuid,
        priority: usize,
        problem: Arc<SymbolicProblem>,
        mut ll: LlNode,
    ) -> Result<Option<Box<Plan>>, PlanningError> {
        let oracle = Arc::clone(&self.collaborators.oracle);
        ll.attempts += 1;
        run.stats.refinements += 1;
        let outcome = self.collaborators.refiner.refine(&mut ll.plan, oracle.as_ref())?;
        let failure = match outcome {
            RefineOutcome::Solved => {
                self.event(
                    "search.ll.refined",
                    json!({ "plan": ll.plan.id(), "attempt": ll.attempts, "solved": true }),
                );
                return Ok(Some(ll.plan));
            }
            RefineOutcome::Failed(failure) => failure,
        };
        self.event(
            "search.ll.refined",
            json!({
                "plan": ll.plan.id(),
                "attempt": ll.attempts,
                "solved": false,
                "failure": failure,
            }),
        );

        let repair = self.repairer.repair(&mut ll.plan, &failure, oracle.as_ref())?;
        let retry = ll.attempts < self.settings.max_refine_attempts;
        match repair {
            RepairOutcome::Repaired(report) => {
                run.stats.repairs += 1;
                self.event(
                    "search.ll.repaired",
                    json!({
                        "plan": ll.plan.id(),
                        "predicate": report.predicate,
                        "strategy": report.strategy,
                        "step": report.step,
                        "cells": report.cells(),
                    }),
                );
                let prefix = ll.plan.prefix(failure.step);
                let child_problem = self
                    .collaborators
                    .subproblems
                    .build(&problem, &prefix, &failure);
                let child = SearchNode::hl(
                    Arc::new(child_problem),
                    priority + 1,
                    HlNode {
                        prefix: Some(prefix),
                        revisits: 0,
                        seed: Some(ll.plan.clone()),
                    },
                );
                run.stats.children += 1;
                self.event(
                    "search.child.queued",
                    json!({
                        "node": child.id,
                        "problem": child.problem.name,
                        "priority": child.priority,
                        "committed_step": failure.step,
                    }),
                );
                run.push(child);
            }
            RepairOutcome::Declined(info) => {
                self.log(
                    run.iteration,
                    LogLevel::Info,
                    "search.ll.repair_declined",
                    json!({ "predicate": info.predicate, "step": info.step, "reason": info.reason }),
                );
            }
            RepairOutcome::Infeasible(info) => {
                self.log(
                    run.iteration,
                    LogLevel::Warn,
                    "search.ll.dropped",
                    json!({ "predicate": info.predicate, "step": info.step, "reason": info.reason }),
                );
                run.last_plan = Some(ll.plan);
                return Ok(None);
            }
        }

        run.last_plan = Some(ll.plan.clone());
        ll.last_failure = Some(failure);
        if retry {
            run.push(SearchNode {
                id,
                priority,
                problem,
                kind: NodeKind::Ll(ll),
            });
        }
        Ok(None)
    }

    fn finish(&self, run: Run, outcome: SearchOutcome) -> SearchReport {
        let (solved, reason) = match &outcome {
            SearchOutcome::Solved(_) => (true, None),
            SearchOutcome::Failed(report) => (false, Some(report.reason())),
        };
        self.event(
            "search.finished",
            json!({ "solved": solved, "reason": reason, "stats": run.stats }),
        );
        let level = if solved { LogLevel::Info } else { LogLevel::Warn };
        self.log(
            run.iteration,
            level,
            "search.finished",
            json!({ "reason": reason, "iterations": run.stats.iterations }),
        );
        SearchReport {
            outcome,
            stats: run.stats,
            last_plan: run.last_plan,
        }
    }

    fn log(&self, iteration: u64, level: LogLevel, message: &str, metadata: Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.log_at(iteration, level, message, metadata);
        }
    }

    fn event(&self, event_type: &str, payload: Value) {
        if let Some(tel) = &self.telemetry {
            let _ = tel.event(event_type, payload);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::RepairSettings,
        module::{BindingId, Failure},
        problem::FailureSubproblemBuilder,
        testing::{FakeOracle, GantryPlan, Scripted},
    };
    use plan_events::MemoryEventBus;
    use plan_logging::MemoryLogger;
    use std::sync::atomic::AtomicUsize;

    struct Skeletons {
        plans: Vec<Plan>,
        endless: bool,
        calls: Arc<AtomicUsize>,
    }

    impl HlTranslator for Skeletons {
        fn translate(
            &mut self,
            request: TranslationRequest<'_>,
        ) -> Result<Option<Plan>, PlanningError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if let (Some(seed), 0) = (request.seed, request.revisit) {
                return Ok(Some(seed.clone()));
            }
            if self.endless {
                return Ok(self.plans.first().cloned());
            }
            Ok(self.plans.get(request.revisit).cloned())
        }
    }

    /// Reports the scripted failures in order, then solves.
    struct Script(Vec<(BindingId, usize)>);

    impl LlRefiner for Script {
        fn refine(
            &mut self,
            plan: &mut Plan,
            _oracle: &dyn GeometryOracle,
        ) -> Result<RefineOutcome, PlanningError> {
            if self.0.is_empty() {
                return Ok(RefineOutcome::Solved);
            }
            let (binding, step) = self.0.remove(0);
            let failure: Failure = plan
                .failure_for(binding, step)
                .ok_or_else(|| PlanningError::Config("scripted binding missing".into()))?;
            Ok(RefineOutcome::Failed(failure))
        }
    }

    /// Always reports the same failure.
    struct Stuck(BindingId, usize);

    impl LlRefiner for Stuck {
        fn refine(
            &mut self,
            plan: &mut Plan,
            _oracle: &dyn GeometryOracle,
        ) -> Result<RefineOutcome, PlanningError> {
            Ok(RefineOutcome::Failed(
                plan.failure_for(self.0, self.1)
                    .ok_or_else(|| PlanningError::Config("missing binding".into()))?,
            ))
        }
    }

    fn undecided_plan() -> Plan {
        let mut fixture = GantryPlan::straight_line(6);
        fixture.builder.bind_over(
            crate::module::ActionId(0),
            Arc::new(Scripted::failing("RobotAt", None)),
        );
        fixture.build()
    }

    fn problem() -> SymbolicProblem {
        SymbolicProblem::new(
            "grasp_can0",
            ["(RobotAt gantry0 robot_init_pose)"],
            ["(InGripper gantry0 can0)"],
        )
    }

    fn driver(
        plans: Vec<Plan>,
        endless: bool,
        refiner: Box<dyn LlRefiner>,
        oracle: Arc<FakeOracle>,
    ) -> (SearchDriver, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let collaborators = Collaborators {
            translator: Box::new(Skeletons {
                plans,
                endless,
                calls: Arc::clone(&calls),
            }),
            refiner,
            oracle,
            subproblems: Arc::new(FailureSubproblemBuilder),
        };
        let driver = SearchDriver::new(
            collaborators,
            Repairer::with_seed(RepairSettings::default(), 11),
            SearchSettings::default(),
        );
        (driver, calls)
    }

    #[test]
    fn satisfied_goal_short_circuits_before_translation() {
        let (mut driver, calls) = driver(
            vec![undecided_plan()],
            false,
            Box::new(Script(Vec::new())),
            Arc::new(FakeOracle::default()),
        );
        let done = SymbolicProblem::new("noop", ["(At can0 target0)"], ["(At can0 target0)"]);
        let report = driver.plan(done, 10).unwrap();
        assert_eq!(report.failure(), Some(FailureReport::GoalAlreadySatisfied));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(report.stats.iterations, 0);
    }

    #[test]
    fn solves_after_declined_repair() {
        let (mut driver, calls) = driver(
            vec![undecided_plan()],
            false,
            Box::new(Script(vec![(BindingId(0), 2)])),
            Arc::new(FakeOracle::default()),
        );
        let report = driver.plan(problem(), 10).unwrap();
        assert!(report.is_solved());
        // hl, ll (declined), hl (exhausted), ll (solved)
        assert_eq!(report.stats.iterations, 4);
        assert_eq!(report.stats.refinements, 2);
        assert_eq!(report.stats.repairs, 0);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
        assert_eq!(report.into_result().unwrap().horizon(), 6);
    }

    #[test]
    fn stops_at_iteration_limit() {
        let (mut driver, _) = driver(
            vec![undecided_plan()],
            true,
            Box::new(Stuck(BindingId(0), 1)),
            Arc::new(FakeOracle::default()),
        );
        let report = driver.plan(problem(), 25).unwrap();
        assert_eq!(report.failure(), Some(FailureReport::IterationLimitReached));
        assert_eq!(report.stats.iterations, 25);
    }

    #[test]
    fn cancelled_search_stops_before_expanding() {
        let (mut driver, calls) = driver(
            vec![undecided_plan()],
            true,
            Box::new(Stuck(BindingId(0), 1)),
            Arc::new(FakeOracle::default()),
        );
        driver.cancel_flag().cancel();
        let report = driver.plan(problem(), 25).unwrap();
        assert_eq!(report.failure(), Some(FailureReport::Cancelled));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn repair_queues_failure_derived_child() {
        let mut fixture = GantryPlan::straight_line(6);
        let robot = fixture.robot;
        fixture.builder.bind_over(
            crate::module::ActionId(0),
            Arc::new(Scripted::obstructs(robot, 0.05)),
        );
        let plan = fixture.build();
        let bus = Arc::new(MemoryEventBus::new(64));
        let telemetry = PlanningTelemetry::builder("search-tests")
            .event_publisher(bus.clone())
            .run_id("child")
            .build()
            .unwrap();
        let (driver, _) = driver(
            vec![plan],
            false,
            Box::new(Stuck(BindingId(0), 3)),
            Arc::new(FakeOracle::default()),
        );
        let mut driver = driver.with_telemetry(telemetry);
        let report = driver.plan(problem(), 2).unwrap();
        assert_eq!(report.failure(), Some(FailureReport::IterationLimitReached));
        assert_eq!(report.stats.repairs, 1);
        assert_eq!(report.stats.children, 1);
        let events = bus.run("child");
        let queued: Vec<_> = events
            .iter()
            .filter(|event| event.event_type == "search.child.queued")
            .collect();
        assert_eq!(queued.len(), 1);
        assert_eq!(queued[0].payload["committed_step"], 3);
        assert_eq!(queued[0].payload["problem"], "grasp_can0@3");
        assert!(events.iter().any(|event| event.event_type == "search.finished"));
    }

    #[test]
    fn unreachable_grasp_exhausts_candidates() {
        let plan = GantryPlan::moveto_then_grasp(false, 8).build();
        let oracle = Arc::new(FakeOracle {
            reach_z: 0.8,
            ..FakeOracle::default()
        });
        let (mut driver, _) = driver(
            vec![plan],
            false,
            Box::new(Stuck(BindingId(1), 5)),
            Arc::clone(&oracle),
        );
        let report = driver.plan(problem(), 50).unwrap();
        assert_eq!(report.failure(), Some(FailureReport::NoFeasibleRefinement));
        assert_eq!(report.failure().unwrap().reason(), "no feasible refinement");
        assert_eq!(oracle.ik_calls.load(Ordering::SeqCst), 8);
        assert_eq!(report.trace().len(), 1);
        assert_eq!(report.trace()[0].reward, Some(-1.0));
        assert_eq!(report.stats.iterations, 3);
    }

    #[test]
    fn expansion_follows_heuristic_order() {
        let sink = Arc::new(MemoryLogger::new(64));
        let telemetry = PlanningTelemetry::builder("search-tests")
            .sink(sink.clone())
            .build()
            .unwrap();
        let (driver, _) = driver(
            vec![undecided_plan()],
            false,
            Box::new(Stuck(BindingId(0), 1)),
            Arc::new(FakeOracle::default()),
        );
        let mut driver = driver.with_telemetry(telemetry);
        let report = driver.plan(problem(), 20).unwrap();
        assert_eq!(report.failure(), Some(FailureReport::NoFeasibleRefinement));
        assert_eq!(report.stats.iterations, 5);

        let expanded = sink.matching("search.node.expanded");
        let keys: Vec<f64> = expanded
            .iter()
            .map(|record| record.metadata["heuristic"].as_f64().unwrap())
            .collect();
        assert_eq!(keys, vec![0.0, 1.0, 1.0, 2.0, 3.0]);
        let kinds: Vec<&str> = expanded
            .iter()
            .map(|record| record.metadata["kind"].as_str().unwrap())
            .collect();
        // the fresh LL node wins the tie with its re-queued parent
        assert_eq!(kinds, vec!["hl", "ll", "hl", "ll", "ll"]);
        let ll_ids: Vec<&serde_json::Value> = expanded
            .iter()
            .filter(|record| record.metadata["kind"] == "ll")
            .map(|record| &record.metadata["node"])
            .collect();
        assert!(ll_ids.windows(2).all(|pair| pair[0] == pair[1]));
    }
}
