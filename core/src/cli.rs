use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::EngineConfig;
use crate::interpreter::{Datum, Evaluator, Expr, Program, Step, Val};

#[derive(Parser)]
#[command(name = "tempo")]
#[command(about = "Tempo - evaluate reactive programs against live streams", long_about = None)]
pub struct Cli {
    /// Path to config file (overrides default search)
    #[arg(long, global = true)]
    pub config: Option<String>,

    /// Frame depth limit (overrides config file and env vars)
    #[arg(long, global = true)]
    pub max_frame_depth: Option<usize>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Evaluate a program, then apply scripted stream pushes
    Run {
        /// Syntax tree of the main source (JSON)
        program: PathBuf,

        /// Additional source the program may borrow, as name=path
        #[arg(long = "source", value_parser = parse_source)]
        sources: Vec<(String, PathBuf)>,

        /// Value to push, as stream=literal (e.g. Time=500ms)
        #[arg(long = "push")]
        pushes: Vec<String>,

        /// Flush once after all pushes instead of after each one
        #[arg(long)]
        pooled: bool,
    },

    /// Evaluate a program while a timer drives the Time stream
    Live {
        /// Syntax tree of the main source (JSON)
        program: PathBuf,

        #[arg(long = "source", value_parser = parse_source)]
        sources: Vec<(String, PathBuf)>,

        /// Milliseconds between ticks
        #[arg(long, default_value = "100")]
        tick_ms: u64,

        /// Number of ticks before exiting
        #[arg(long, default_value = "10")]
        ticks: u64,
    },

    /// Print the effective configuration
    Config,
}

/// Run the CLI by parsing process arguments
pub async fn run_cli() -> Result<()> {
    let cli = Cli::parse();
    run_cli_with_args(cli).await
}

/// Run the CLI with provided arguments
pub async fn run_cli_from_args(args: Vec<String>) -> Result<()> {
    let cli = Cli::parse_from(args);
    run_cli_with_args(cli).await
}

async fn run_cli_with_args(cli: Cli) -> Result<()> {
    dotenvy::dotenv().ok();

    let config = EngineConfig::builder()
        .config_path(cli.config.as_ref().map(PathBuf::from))
        .max_frame_depth(cli.max_frame_depth)
        .build()?;
    init_logging(&config.log_filter);

    match cli.command {
        Commands::Run {
            program,
            sources,
            pushes,
            pooled,
        } => {
            let program = load_program(&program, &sources)?;
            let budget = config.run_budget;
            let mut evaluator = Evaluator::with_config(program, config);
            drive(&mut evaluator, budget)?;
            print_latest(&evaluator);

            for push in &pushes {
                let (stream, literal) = split_assignment(push)?;
                evaluator.push(stream, Val::from(Datum::parse_literal(literal)))?;
                if !pooled {
                    evaluator.flush()?;
                    print_latest(&evaluator);
                }
            }
            if pooled && !pushes.is_empty() {
                evaluator.flush()?;
                print_latest(&evaluator);
            }
            evaluator.stop();
        }

        Commands::Live {
            program,
            sources,
            tick_ms,
            ticks,
        } => {
            let program = load_program(&program, &sources)?;
            let mut evaluator = Evaluator::with_config(program, config);
            println!("{}", evaluator.run()?);

            let sender = evaluator.stream_sender();
            let (tick_tx, mut tick_rx) = tokio::sync::mpsc::channel::<u64>(16);
            let timer = tokio::spawn(async move {
                let mut interval = tokio::time::interval(Duration::from_millis(tick_ms));
                // The first tick completes immediately
                interval.tick().await;
                for tick in 1..=ticks {
                    interval.tick().await;
                    let elapsed = Datum::measure((tick * tick_ms) as f64, "ms");
                    if let Err(e) = sender.send("Time", elapsed) {
                        warn!(error = %e, "timer stopped");
                        break;
                    }
                    if tick_tx.send(tick).await.is_err() {
                        break;
                    }
                }
            });

            while let Some(tick) = tick_rx.recv().await {
                evaluator.flush()?;
                if let Some(value) = evaluator.latest_result() {
                    println!("[{tick}] {value}");
                }
            }
            timer.await.context("Timer task failed")?;
            evaluator.stop();
            info!(ticks, "live run finished");
        }

        Commands::Config => {
            print!("{}", config.to_toml()?);
        }
    }

    Ok(())
}

fn init_logging(default_filter: &str) {
    // Ignore the error when a subscriber is already installed
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .try_init();
}

/// Run the main program in slices of `budget` steps
fn drive(evaluator: &mut Evaluator, budget: usize) -> Result<()> {
    evaluator.start()?;
    let mut slices = 1;
    while evaluator.run_for(budget)? == Step::Yield {
        slices += 1;
    }
    debug!(slices, budget, "program evaluated");
    Ok(())
}

fn read_expr(path: &Path) -> Result<Expr> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid syntax tree in {}", path.display()))
}

fn load_program(main: &Path, sources: &[(String, PathBuf)]) -> Result<Program> {
    let mut program = Program::new(&read_expr(main)?);
    for (name, path) in sources {
        program = program.with_source(name.clone(), &read_expr(path)?);
    }
    Ok(program)
}

fn print_latest(evaluator: &Evaluator) {
    match evaluator.latest_result() {
        Some(value) => println!("{value}"),
        None => println!("(no value)"),
    }
}

fn split_assignment(text: &str) -> Result<(&str, &str)> {
    text.split_once('=')
        .filter(|(name, _)| !name.is_empty())
        .ok_or_else(|| anyhow!("Expected name=value, got {text:?}"))
}

fn parse_source(text: &str) -> Result<(String, PathBuf), String> {
    split_assignment(text)
        .map(|(name, path)| (name.to_string(), PathBuf::from(path)))
        .map_err(|e| e.to_string())
}
