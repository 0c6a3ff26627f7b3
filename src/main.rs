//! kyros - command-line entry point.
//!
//! `run` plans and executes a task with the LLM planner, `exec` executes a
//! task file once, `tools` lists the registered tools.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use kyros::config::{ComparatorKind, Config};
use kyros::llm::{LlmClient, OpenRouterClient};
use kyros::task::{render_plan, render_summary, TaskStatus};
use kyros::verify::{
    ChangeOracle, DigestComparator, ScreenComparator, ScreenshotOracle, VisionComparator,
};
use kyros::{
    Driver, History, LlmPlanner, Outcome, ProgressBoard, Scheduler, TaskGraph, ToolRegistry,
};

#[derive(Parser)]
#[command(name = "kyros", version, about = "Plan and execute desktop tasks")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Plan a task with the model and execute it, replanning as needed.
    Run {
        /// What to do, in plain language.
        task: String,
        /// Planning attempts before giving up (default: KYROS_MAX_ATTEMPTS).
        #[arg(long)]
        max_attempts: Option<u32>,
    },
    /// Execute a task graph from a JSON file once.
    Exec {
        /// Path to a `{"tasks": [...]}` document.
        file: PathBuf,
    },
    /// List the registered tools.
    Tools,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "kyros=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    match run(Cli::parse()).await {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("{:#}", err);
            std::process::exit(1);
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<bool> {
    let config = Config::from_env()?;
    let tools = Arc::new(ToolRegistry::new());

    match cli.command {
        Command::Tools => {
            for tool in tools.list_tools() {
                println!("{:<20} {}", tool.name, tool.description);
            }
            Ok(true)
        }
        Command::Exec { file } => {
            let text = tokio::fs::read_to_string(&file)
                .await
                .with_context(|| format!("read {}", file.display()))?;
            let mut graph = TaskGraph::from_json(&text)
                .with_context(|| format!("parse {}", file.display()))?;

            println!("{}", render_plan(&graph));
            let scheduler = Scheduler::new(tools, oracle(&config)?, config.scheduler_config());
            let outcome = scheduler.execute(&mut graph).await;
            println!("{}", render_summary(&graph));
            Ok(outcome == Outcome::Success)
        }
        Command::Run { task, max_attempts } => {
            let llm: Arc<dyn LlmClient> =
                Arc::new(OpenRouterClient::new(config.require_api_key()?.to_string()));
            info!(model = %config.model, "Loaded configuration");

            let planner = Arc::new(LlmPlanner::new(
                llm,
                config.model.clone(),
                tools.tool_schemas(),
            ));
            let board = ProgressBoard::new();
            let scheduler = Scheduler::new(tools, oracle(&config)?, config.scheduler_config())
                .with_progress(board.clone());
            let driver = Driver::new(planner, scheduler);
            let watcher = tokio::spawn(watch_progress(board));

            let mut history = History::new();
            let attempts = max_attempts.unwrap_or(config.max_attempts);
            let succeeded = driver.run(&task, attempts, &mut history).await;
            watcher.abort();
            Ok(succeeded)
        }
    }
}

fn oracle(config: &Config) -> anyhow::Result<Arc<dyn ChangeOracle>> {
    let comparator: Arc<dyn ScreenComparator> = match config.comparator {
        ComparatorKind::Digest => Arc::new(DigestComparator),
        ComparatorKind::Vision => {
            let llm = Arc::new(OpenRouterClient::new(config.require_api_key()?.to_string()));
            Arc::new(VisionComparator::new(llm, config.vision_model.clone()))
        }
    };
    Ok(Arc::new(ScreenshotOracle::new(
        &config.workspace,
        config.display.clone(),
        config.settle,
        comparator,
    )))
}

/// Log per-status task counts whenever they change.
async fn watch_progress(board: ProgressBoard) {
    let mut last = (0, 0, 0);
    loop {
        tokio::time::sleep(Duration::from_secs(1)).await;
        let snapshot = board.snapshot().await;
        let count = |status: TaskStatus| snapshot.values().filter(|p| p.status == status).count();
        let current = (
            count(TaskStatus::Success),
            count(TaskStatus::Error),
            snapshot.len(),
        );
        if current != last {
            info!(
                succeeded = current.0,
                failed = current.1,
                total = current.2,
                "Progress"
            );
            last = current;
        }
    }
}
