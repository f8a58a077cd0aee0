#![forbid(unsafe_code)]

mod cmd;
mod output;

use std::env;

use clap::{Parser, Subcommand};
use output::OutputMode;
use tracing::debug;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "gossip: simulate the gossip problem under different calling strategies",
    long_about = None
)]
struct Cli {
    /// Enable verbose logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Output format. Defaults to pretty on a terminal, text when piped.
    #[arg(long, global = true, value_enum)]
    format: Option<OutputMode>,

    /// Alias for `--format json`.
    #[arg(long, global = true, hide = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

impl Cli {
    fn output_mode(&self) -> OutputMode {
        output::resolve_output_mode(self.format, self.json)
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    #[command(
        about = "Run one configuration across many seeds",
        long_about = "Run a gossip simulation once per seed, report the mean and sample\n\
                      standard deviation of time-steps to completion, and check every\n\
                      run against the gossip invariants.",
        after_help = "EXAMPLES:\n    # 100 Random runs with 10 agents\n    gossip run\n\n\
                      # Call-Me-Once under the Not-Standard protocol\n    gossip run --agents 20 --strategy Call-Me-Once --protocol Not-Standard\n\n\
                      # Save per-run records\n    gossip run --seeds 500 --out results.jsonl"
    )]
    Run(cmd::run::RunArgs),

    #[command(
        about = "Replay a single seed with detailed trace output",
        long_about = "Replay one seed to get its time-steps, final agent states, oracle\n\
                      results and, with --rounds, every round's pairings.",
        after_help = "EXAMPLES:\n    # Replay seed 42\n    gossip replay --seed 42\n\n\
                      # Show the Bubble schedule for 8 agents\n    gossip replay --seed 0 --agents 8 --strategy Bubble --rounds"
    )]
    Replay(cmd::replay::ReplayArgs),

    #[command(
        about = "Compare strategies across population sizes",
        after_help = "EXAMPLES:\n    # All strategies for N=4,8,16,32\n    gossip sweep\n\n\
                      # Two strategies, machine-readable\n    gossip sweep --strategies Random,Divide --agents 10,50 --format json"
    )]
    Sweep(cmd::sweep::SweepArgs),

    #[command(about = "List the available strategies")]
    Strategies,
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("GOSSIP_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "gossip=debug,info"
        } else {
            "gossip=info,warn"
        })
    });

    let format = env::var("GOSSIP_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);

    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let output = cli.output_mode();
    debug!(?output, "resolved output mode");

    let result = match &cli.command {
        Commands::Run(args) => cmd::run::run_run(args, output),
        Commands::Replay(args) => cmd::replay::run_replay(args, output),
        Commands::Sweep(args) => cmd::sweep::run_sweep_cmd(args, output),
        Commands::Strategies => cmd::strategies::run_strategies(output),
    };

    if let Some(sim_err) = result
        .as_ref()
        .err()
        .and_then(|err| err.downcast_ref::<gossip_sim::SimError>())
    {
        let code = sim_err.code();
        eprintln!("[{}] {}", code.code(), code.hint().unwrap_or("see --help"));
    }
    result
}
