use std::{
    fs,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use hybrid_planning::{
    model::TraceSummary, DomainConfig, FailureReport, HybridPlanner, PlanningTelemetry,
    SamplingTraceEntry, Scene, SearchReport,
};
use plan_events::FileEventPublisher;
use plan_logging::{JsonLogger, LogLevel};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(name = "hpr", version, about = "Hybrid task-and-motion refinement planner")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Plans a problem scene in a domain.
    Plan(PlanArgs),
    /// Validates a domain and grounds every skeleton of a scene.
    Check {
        #[arg(long)]
        domain: PathBuf,
        #[arg(long)]
        problem: PathBuf,
    },
    /// Summarizes an exported sampling trace.
    Trace {
        file: PathBuf,
    },
}

#[derive(Parser, Debug)]
struct PlanArgs {
    #[arg(long)]
    domain: PathBuf,
    #[arg(long)]
    problem: PathBuf,
    /// Defaults to the domain's search budget.
    #[arg(long)]
    max_iter: Option<usize>,
    #[arg(long)]
    seed: Option<u64>,
    /// JSON-lines log file.
    #[arg(long)]
    log: Option<PathBuf>,
    #[arg(long, value_parser = parse_level, default_value = "info")]
    log_level: LogLevel,
    /// JSON-lines event file.
    #[arg(long)]
    events: Option<PathBuf>,
    /// Writes the repair trace of the final plan as JSON.
    #[arg(long)]
    trace_out: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
struct PlanSummaryOut<'a> {
    run_id: &'a str,
    problem: &'a str,
    solved: bool,
    reason: Option<&'static str>,
    stats: hybrid_planning::search::SearchStats,
    plan: Option<hybrid_planning::model::PlanSummary>,
    trace: TraceSummary,
}

fn parse_level(raw: &str) -> Result<LogLevel, String> {
    LogLevel::parse(raw).ok_or_else(|| format!("unknown log level {raw}"))
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Commands::Plan(args) => handle_plan(&args),
        Commands::Check { domain, problem } => handle_check(&domain, &problem),
        Commands::Trace { file } => handle_trace(&file),
    }
}

fn load(domain: &Path, problem: &Path) -> Result<(DomainConfig, Scene)> {
    let domain = DomainConfig::load(domain)?;
    let problem = if problem.exists() {
        problem.to_path_buf()
    } else {
        domain.resolve_path(problem)
    };
    let scene = Scene::load(&problem)?;
    Ok((domain, scene))
}

fn handle_plan(args: &PlanArgs) -> Result<()> {
    let (domain, scene) = load(&args.domain, &args.problem)?;
    let run_id = format!("hpr-{}", Uuid::new_v4());
    let mut builder = PlanningTelemetry::builder("hpr").run_id(&run_id);
    if let Some(path) = &args.log {
        ensure_parent(path)?;
        builder = builder.sink(Arc::new(
            JsonLogger::new(path)
                .with_context(|| format!("opening log {}", path.display()))?
                .with_min_level(args.log_level),
        ));
    }
    if let Some(path) = &args.events {
        ensure_parent(path)?;
        builder = builder.event_publisher(Arc::new(FileEventPublisher::new(path)?));
    }
    let telemetry = builder.build()?;
    let _ = telemetry.log(
        LogLevel::Info,
        "hpr.plan.started",
        json!({ "domain": domain.name, "problem": scene.name, "seed": args.seed }),
    );

    let mut planner = HybridPlanner::new(domain).with_telemetry(telemetry);
    if let Some(seed) = args.seed {
        planner = planner.with_seed(seed);
    }
    let report = planner.plan_scene(&scene, args.max_iter)?;

    if let Some(path) = &args.trace_out {
        ensure_parent(path)?;
        fs::write(path, serde_json::to_string_pretty(report.trace())?)
            .with_context(|| format!("writing trace {}", path.display()))?;
    }
    print_report(&run_id, &scene, &report)?;
    if !report.is_solved() {
        std::process::exit(2);
    }
    Ok(())
}

fn print_report(run_id: &str, scene: &Scene, report: &SearchReport) -> Result<()> {
    let out = PlanSummaryOut {
        run_id,
        problem: &scene.name,
        solved: report.is_solved(),
        reason: report.failure().map(FailureReport::reason),
        stats: report.stats,
        plan: report.plan().map(hybrid_planning::Plan::summary),
        trace: TraceSummary::of(report.trace()),
    };
    println!("{}", serde_json::to_string_pretty(&out)?);
    if let Some(plan) = report.plan() {
        let robot = plan.param_id(&scene.robot.name)?;
        for (t, config) in plan.robot_trajectory(robot)?.iter().enumerate() {
            let cells: Vec<String> = config.iter().map(|value| format!("{value:.4}")).collect();
            println!("t={t:>3} [{}]", cells.join(", "));
        }
    }
    Ok(())
}

fn handle_check(domain: &Path, problem: &Path) -> Result<()> {
    let (domain, scene) = load(domain, problem)?;
    println!(
        "domain {} ok: {} robot layout(s)",
        domain.name,
        domain.robots.len()
    );
    scene
        .oracle(&domain)
        .with_context(|| format!("scene {} robot", scene.name))?;
    if scene.skeletons.is_empty() {
        bail!("scene {} has no skeletons", scene.name);
    }
    for index in 0..scene.skeletons.len() {
        let Some(plan) = scene
            .skeleton(&domain, index)
            .with_context(|| format!("grounding skeleton {index}"))?
        else {
            continue;
        };
        let actions: Vec<String> = plan
            .actions()
            .iter()
            .map(|action| format!("{}[{}..{}]", action.name, action.start, action.end))
            .collect();
        println!(
            "skeleton {index}: {} | {} binding(s) | {} locked cell(s)",
            actions.join(" -> "),
            plan.bindings().len(),
            plan.locked_cells()
        );
    }
    let problem = scene.problem();
    if problem.goal_test() {
        println!("goal already satisfied by the initial state");
    } else {
        println!("open goals: {}", problem.open_goals().join(", "));
    }
    Ok(())
}

fn handle_trace(file: &Path) -> Result<()> {
    let raw = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    let entries: Vec<SamplingTraceEntry> =
        serde_json::from_str(&raw).with_context(|| format!("parsing {}", file.display()))?;
    let summary = TraceSummary::of(&entries);
    println!(
        "{} proposal(s), {} failed",
        summary.proposals, summary.failed
    );
    for (predicate, count) in &summary.by_predicate {
        println!("  {predicate}: {count}");
    }
    for entry in &entries {
        let status = if entry.failed() { "failed" } else { "ok" };
        println!(
            "{} t={:>3} {:<14} {:<10} {:<8} {}",
            stamp(entry.recorded_at),
            entry.step,
            entry.predicate,
            entry.action,
            status,
            entry.target
        );
    }
    Ok(())
}

fn stamp(at: DateTime<Utc>) -> String {
    at.format("%H:%M:%S%.3f").to_string()
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating {}", parent.display()))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    const DOMAIN: &str = include_str!("../demos/gantry_domain.toml");

    fn run(scene: &str) -> SearchReport {
        let domain = DomainConfig::from_toml(DOMAIN).unwrap();
        let scene = Scene::from_toml(scene).unwrap();
        HybridPlanner::new(domain)
            .with_seed(7)
            .plan_scene(&scene, None)
            .unwrap()
    }

    #[test]
    fn demo_grasp_is_solved() {
        let report = run(include_str!("../demos/grasp_scene.toml"));
        assert!(report.is_solved());
        assert_eq!(TraceSummary::of(report.trace()).failed, 0);
    }

    #[test]
    fn demo_blocked_heading_has_no_refinement() {
        let report = run(include_str!("../demos/blocked_heading_scene.toml"));
        assert_eq!(report.failure(), Some(FailureReport::NoFeasibleRefinement));
    }

    #[test]
    fn cli_parses_plan_flags() {
        let cli = Cli::try_parse_from([
            "hpr",
            "plan",
            "--domain",
            "d.toml",
            "--problem",
            "p.toml",
            "--max-iter",
            "5",
            "--log-level",
            "debug",
        ])
        .unwrap();
        let Commands::Plan(args) = cli.command else {
            panic!("expected plan");
        };
        assert_eq!(args.max_iter, Some(5));
        assert_eq!(args.log_level, LogLevel::Debug);
        assert!(args.trace_out.is_none());
    }
}
