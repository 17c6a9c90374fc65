use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use engine::{
    ExecutionEngine, FixedVerdict, PlanSource, SessionCapability, VerificationCollaborator,
};
use events::{Event, EventBus};
use interop_core::{ExecutionPlan, OverallStatus, SessionRole, StepStatus, TestResult};
use report::TestRailSink;

mod config;
mod plan_file;
mod sim;
mod standard_plan;
mod verify;

use config::RunnerConfig;

#[derive(Parser)]
#[command(name = "interop-runner")]
#[command(about = "Two-session browser interop test runner", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (defaults to ./interop.toml when present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Execute a plan against two sessions
    Run {
        /// Plan JSON file; the built-in standard plan when omitted
        #[arg(short, long)]
        plan: Option<PathBuf>,

        /// Drive simulated sessions instead of real browsers
        #[arg(long)]
        simulate: bool,

        /// Failure injection rate for simulated sessions, 0.0 to 1.0
        #[arg(long, default_value_t = 0.0)]
        flake_rate: f64,

        /// Skip the interactive prompt and record a passing verdict
        #[arg(long)]
        auto_pass: bool,

        /// Do not publish the result even if reporting is configured
        #[arg(long)]
        no_report: bool,

        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        channel: Option<String>,
    },
    /// Check a plan file without executing it
    Validate { plan: PathBuf },
    /// Print the built-in standard plan as JSON
    Template {
        /// Write to this file instead of stdout
        output: Option<PathBuf>,

        #[arg(long)]
        url: Option<String>,

        #[arg(long)]
        channel: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = RunnerConfig::load_or_default(cli.config.as_deref()).await?;

    match cli.command {
        Commands::Run {
            plan,
            simulate,
            flake_rate,
            auto_pass,
            no_report,
            url,
            channel,
        } => {
            init_tracing();
            let plan = resolve_plan(&config, plan, url, channel).await?;
            run(config, plan, simulate, flake_rate, auto_pass, no_report).await
        }
        Commands::Validate { plan } => validate(&plan).await,
        Commands::Template {
            output,
            url,
            channel,
        } => template(&config, output, url, channel).await,
    }
}

async fn resolve_plan(
    config: &RunnerConfig,
    plan: Option<PathBuf>,
    url: Option<String>,
    channel: Option<String>,
) -> Result<ExecutionPlan> {
    match plan {
        Some(path) => Ok(plan_file::FilePlanSource::new(path).load().await?),
        None => {
            let url = url.as_deref().unwrap_or(&config.plan.url);
            let channel = channel.as_deref().unwrap_or(&config.plan.channel);
            Ok(standard_plan::build(url, channel))
        }
    }
}

async fn run(
    config: RunnerConfig,
    plan: ExecutionPlan,
    simulate: bool,
    flake_rate: f64,
    auto_pass: bool,
    no_report: bool,
) -> Result<()> {
    if !simulate {
        bail!("no browser driver is configured in this build; run with --simulate");
    }

    let mut engine = ExecutionEngine::new(config.engine_config());
    if !no_report {
        if let Some(report_config) = config.report_config() {
            engine = engine.with_sink(Arc::new(TestRailSink::new(report_config)?));
        }
    }

    let cancel = engine.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!();
            eprintln!("Interrupted, shutting sessions down...");
            cancel.cancel();
        }
    });

    let progress = tokio::spawn(print_progress(engine.events().clone()));

    let seed = config.engine.jitter_seed;
    let publisher: Box<dyn SessionCapability> = Box::new(
        sim::SimulatedSession::new(SessionRole::Publisher).with_flake_rate(flake_rate, seed),
    );
    let subscriber: Box<dyn SessionCapability> = Box::new(
        sim::SimulatedSession::new(SessionRole::Subscriber)
            .with_flake_rate(flake_rate, seed.wrapping_add(1)),
    );

    let verifier: Box<dyn VerificationCollaborator> = if auto_pass {
        Box::new(FixedVerdict::passing("auto-pass enabled"))
    } else {
        Box::new(verify::TerminalVerifier)
    };

    let result = engine.run(plan, publisher, subscriber, &*verifier).await?;
    progress.abort();

    print_summary(&result);

    if result.overall != OverallStatus::Pass {
        std::process::exit(1);
    }
    Ok(())
}

async fn validate(path: &PathBuf) -> Result<()> {
    let plan = plan_file::load(path).await?;
    plan.validate()?;

    println!("Plan '{}' is valid ({} steps):", plan.name, plan.steps.len());
    for step in &plan.steps {
        let fallbacks = if step.fallbacks.is_empty() {
            String::new()
        } else {
            format!(" ({} fallback(s))", step.fallbacks.len())
        };
        println!(
            "  {:<12} {:<20} {}{}",
            step.target.as_str(),
            step.id,
            step.action.class(),
            fallbacks
        );
    }
    Ok(())
}

async fn template(
    config: &RunnerConfig,
    output: Option<PathBuf>,
    url: Option<String>,
    channel: Option<String>,
) -> Result<()> {
    let url = url.as_deref().unwrap_or(&config.plan.url);
    let channel = channel.as_deref().unwrap_or(&config.plan.channel);
    let json = plan_file::to_json(&standard_plan::build(url, channel))?;

    match output {
        Some(path) => {
            tokio::fs::write(&path, json).await?;
            println!("Wrote standard plan to {}", path.display());
        }
        None => println!("{json}"),
    }
    Ok(())
}

async fn print_progress(events: EventBus) {
    let mut receiver = events.subscribe();
    loop {
        let envelope = match receiver.recv().await {
            Ok(envelope) => envelope,
            Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
            Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
        };
        match envelope.event {
            Event::RunStarted {
                plan_name, steps, ..
            } => {
                println!();
                println!("{} {} ({} steps)", "Running".bold(), plan_name, steps);
            }
            Event::StepStarted {
                step_id,
                role,
                action_class,
            } => {
                println!(
                    "  {} [{}] {} ({})",
                    "→".dimmed(),
                    role.as_str(),
                    step_id,
                    action_class.dimmed()
                );
            }
            Event::StepAttemptFailed {
                step_id,
                attempt,
                category,
                ..
            } => {
                println!(
                    "    {} attempt {} of {} failed: {}",
                    "!".yellow(),
                    attempt,
                    step_id,
                    category.as_str().yellow()
                );
            }
            Event::FallbackEngaged {
                step_id,
                strategy_id,
                ..
            } => {
                println!(
                    "    {} {} falling back to '{}'",
                    "↻".yellow(),
                    step_id,
                    strategy_id
                );
            }
            Event::StepFinished {
                step_id, status, ..
            } => {
                let marker = match status {
                    StepStatus::Succeeded => "✓".green(),
                    StepStatus::Failed => "✗".red(),
                    StepStatus::Skipped => "○".dimmed(),
                };
                println!("  {marker} {step_id}");
            }
            Event::BreakerStateChanged {
                operation_class,
                from,
                to,
            } => {
                println!(
                    "    {} breaker {operation_class}: {from} -> {to}",
                    "⚡".magenta()
                );
            }
            Event::BarrierReached { role } => {
                println!(
                    "  {} [{}] waiting at barrier",
                    "┄".dimmed(),
                    role.as_str()
                );
            }
            Event::VerdictCollected { passed, .. } => {
                let text = if passed {
                    "verdict: pass".green()
                } else {
                    "verdict: fail".red()
                };
                println!("  {text}");
            }
            Event::Error { message, .. } => {
                println!("  {} {message}", "error:".red());
            }
            Event::RunFinished { .. }
            | Event::SessionStateChanged { .. }
            | Event::VerificationRequested { .. } => {}
        }
    }
}

fn print_summary(result: &TestResult) {
    let overall = match result.overall {
        OverallStatus::Pass => "PASS".green().bold(),
        OverallStatus::Fail => "FAIL".red().bold(),
        OverallStatus::Inconclusive => "INCONCLUSIVE".yellow().bold(),
        OverallStatus::Aborted => "ABORTED".yellow().bold(),
    };

    println!();
    println!("{} {}", overall, result.plan_name);
    println!(
        "  steps: {} succeeded, {} failed, {} skipped",
        result.succeeded_steps(),
        result.failed_steps(),
        result.skipped_steps()
    );
    println!(
        "  retries: {}, fallbacks used: {}",
        result.retries, result.fallbacks_used
    );
    if let Some(verdict) = &result.verdict {
        println!("  observer: {}", verdict.comment);
    }
    println!("  run id: {}", result.run_id);
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "interop_runner=info,engine=warn,report=info".into()),
        )
        .init();
}
