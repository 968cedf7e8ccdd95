use std::io;
use std::time::Duration;

use clap::{Parser, Subcommand};
use montecarlo_chess::search::{self, SearchConfig};
use montecarlo_chess::Engine;
use tracing_subscriber::EnvFilter;

/// Monte-Carlo Tree Search chess engine speaking the UCI protocol on
/// stdin/stdout.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Exploration constant of the UCT formula.
    #[arg(long, default_value_t = search::DEFAULT_EXPLORATION_WEIGHT)]
    exploration_weight: f64,
    /// Thinking time per move in milliseconds, unless the GUI provides the
    /// clock.
    #[arg(long, default_value_t = 10_000)]
    think_time_ms: u64,
    /// Seed of the random playouts for reproducible games.
    #[arg(long)]
    seed: Option<u64>,
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Runs a fixed search on a few positions and reports the speed.
    Bench,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(io::stderr)
        .init();

    if cli.exploration_weight.is_nan() || cli.exploration_weight < 0.0 {
        anyhow::bail!(
            "exploration weight must be non-negative, got {}",
            cli.exploration_weight
        );
    }

    if matches!(cli.command, Some(Command::Bench)) {
        return search::openbench(&mut io::stdout().lock());
    }

    let config = SearchConfig {
        exploration_weight: cli.exploration_weight,
        think_time: Duration::from_millis(cli.think_time_ms),
        seed: cli.seed,
    };
    montecarlo_chess::print_engine_info(&config);
    montecarlo_chess::print_binary_info();

    let mut input = io::stdin().lock();
    let mut output = io::stdout().lock();
    Engine::new(config, &mut input, &mut output).uci_loop()
}
