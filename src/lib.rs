//! Chess engine driven by [Monte Carlo Tree Search]. Instead of evaluating
//! positions with hand-crafted heuristics, the engine plays many random games
//! from the current position and picks the move that scored best.
//!
//! The search is generic: [`search::Mcts`] works with any two-player game
//! implementing [`game::GameState`]. [`chess::ChessState`] provides the chess
//! rules and [`Engine`] exposes the search through the UCI protocol.
//!
//! [Monte Carlo Tree Search]: https://www.chessprogramming.org/Monte-Carlo_Tree_Search

pub mod chess;
pub mod game;
pub mod search;

mod engine;
pub use engine::Engine;
use shadow_rs::shadow;

shadow!(build);

/// Build target and profile. Produced by `build.rs`.
const TARGET: &str = include_str!(concat!(env!("OUT_DIR"), "/target"));

/// Returns the full engine version that can be used to identify how it was
/// built in the first place.
fn engine_version() -> String {
    format!(
        "{} (commit {}, branch {})",
        build::PKG_VERSION,
        build::SHORT_COMMIT,
        build::BRANCH
    )
}

/// Prints informations about the engine version and the search settings on
/// engine startup.
pub fn print_engine_info(config: &search::SearchConfig) {
    eprintln!("Montecarlo chess engine {}", engine_version());
    eprintln!(
        "Exploration weight: {}, think time: {} ms",
        config.exploration_weight,
        config.think_time.as_millis()
    );
}

/// Prints information the build type, target and whether the build is clean
/// on engine startup.
pub fn print_binary_info() {
    eprintln!("Release build: {}", !shadow_rs::is_debug());
    eprintln!("Target: {TARGET}");
    if !shadow_rs::git_clean() {
        eprintln!("Warning: built with uncommitted changes");
    }
    eprintln!();
}
