//! [Search] looks ahead into possible continuations of the position to pick
//! the move to play. The engine uses [Monte Carlo Tree Search] with random
//! playouts: the statistics accumulated over many simulated games decide
//! which move is the strongest.
//!
//! [`think`] is the "thinking" driver: it runs rollouts until the budget is
//! exhausted and then commits to a move.
//!
//! [Search]: https://www.chessprogramming.org/Search
//! [Monte Carlo Tree Search]: https://www.chessprogramming.org/Monte-Carlo_Tree_Search

use std::io::Write;
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::debug;

use crate::chess::ChessState;
use crate::game::{GameError, GameState};

mod mcts;
mod tree;

pub use mcts::Mcts;

/// Thinking time per move unless the caller asks otherwise.
pub const DEFAULT_THINK_TIME: Duration = Duration::from_secs(10);

/// Default exploration constant of the UCT formula.
pub const DEFAULT_EXPLORATION_WEIGHT: f64 = 1.0;

/// Adding reserve time to ensure that the engine does not exceed the time
/// limit: the deadline is only checked between rollouts.
const RESERVE: Duration = Duration::from_millis(100);

/// Failures of the search operations.
#[derive(Debug, Error)]
pub enum SearchError {
    /// There are no legal moves to choose from.
    #[error("cannot move from terminal position {0}")]
    TerminalState(String),
    /// The rules implementation rejected a query.
    #[error(transparent)]
    Game(#[from] GameError),
}

/// Parameters of the search.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SearchConfig {
    /// Exploration/exploitation balance of the UCT formula, non-negative.
    pub exploration_weight: f64,
    /// Time budget for a single move.
    pub think_time: Duration,
    /// Seed of the random source. `None` seeds from the system entropy.
    pub seed: Option<u64>,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            exploration_weight: DEFAULT_EXPLORATION_WEIGHT,
            think_time: DEFAULT_THINK_TIME,
            seed: None,
        }
    }
}

/// Budget of a single [`think`] call. When both limits are set, whichever is
/// reached first stops the search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Limits {
    /// Wall-clock budget.
    pub time: Option<Duration>,
    /// Maximum number of rollouts.
    pub rollouts: Option<u64>,
}

impl Limits {
    /// Search for the given amount of time.
    #[must_use]
    pub const fn time(time: Duration) -> Self {
        Self {
            time: Some(time),
            rollouts: None,
        }
    }

    /// Search for the given number of rollouts.
    #[must_use]
    pub const fn rollouts(rollouts: u64) -> Self {
        Self {
            time: None,
            rollouts: Some(rollouts),
        }
    }

    /// Time after which no new rollout is started. An unlimited search would
    /// never return, so it falls back to [`DEFAULT_THINK_TIME`].
    fn deadline(&self) -> Option<Duration> {
        let budget = match (self.time, self.rollouts) {
            (None, None) => DEFAULT_THINK_TIME,
            (None, Some(_)) => return None,
            (Some(time), _) => time,
        };
        Some(budget - RESERVE.min(budget / 10))
    }
}

impl Default for Limits {
    fn default() -> Self {
        Self::time(DEFAULT_THINK_TIME)
    }
}

/// Outcome of [`think`].
#[derive(Debug, Clone)]
pub struct Thought<S> {
    /// Position after the chosen move.
    pub state: S,
    /// Number of rollouts performed by this call.
    pub rollouts: u64,
    /// Time spent thinking.
    pub elapsed: Duration,
    /// Rollouts accumulated by the chosen position, including the ones from
    /// earlier searches.
    pub visits: u64,
    /// Reward accumulated by the chosen position.
    pub total_reward: f64,
}

/// Runs rollouts from `root` until the budget is exhausted and returns the
/// best known successor. At least one rollout is performed.
///
/// The deadline is checked before each rollout, never during one: a rollout
/// always completes.
///
/// # Errors
///
/// Returns [`SearchError::TerminalState`] if there is no move to make and
/// propagates failures of the [`GameState`] implementation.
pub fn think<S: GameState>(
    mcts: &mut Mcts<S>,
    root: &S,
    limits: &Limits,
) -> Result<Thought<S>, SearchError> {
    if root.is_terminal() {
        return Err(SearchError::TerminalState(format!("{root:?}")));
    }

    let timer = Instant::now();
    let deadline = limits.deadline();
    let max_rollouts = limits.rollouts.unwrap_or(u64::MAX);

    let mut rollouts = 0;
    loop {
        mcts.rollout(root)?;
        rollouts += 1;
        if rollouts >= max_rollouts {
            break;
        }
        if let Some(deadline) = deadline {
            if timer.elapsed() >= deadline {
                break;
            }
        }
    }

    let state = mcts.choose(root)?;
    let elapsed = timer.elapsed();
    let thought = Thought {
        visits: mcts.visits(&state),
        total_reward: mcts.total_reward(&state),
        state,
        rollouts,
        elapsed,
    };
    debug!(
        rollouts,
        elapsed_ms = elapsed.as_millis(),
        visits = thought.visits,
        reward = thought.total_reward,
        known_positions = mcts.len(),
        "search finished"
    );
    Ok(thought)
}

/// Rollouts per position in [`openbench`].
const BENCH_ROLLOUTS: u64 = 200;
const BENCH_SEED: u64 = 42;

/// Runs search on a small set of positions to provide an estimate of engine's
/// performance.
///
/// Implementing `bench` CLI command is a [requirement for OpenBench]. The
/// number of nodes has to be deterministic: the search is seeded and limited
/// by the number of rollouts.
///
/// NOTE: This function **has to run less than 60 seconds**.
///
/// See <https://github.com/AndyGrant/OpenBench/blob/master/Client/bench.py> for
/// more details.
///
/// # Errors
///
/// Fails if the output can not be written.
///
/// [requirement for OpenBench]: https://github.com/AndyGrant/OpenBench/wiki/Requirements-For-Public-Engines#basic-requirements
pub fn openbench(output: &mut impl Write) -> anyhow::Result<()> {
    let mut total_nodes = 0;
    let timer = Instant::now();

    for fen in [
        "rnbqkbnr/pppppppp/8/8/8/8/PPPPPPPP/RNBQKBNR w KQkq - 0 1",
        "r3k2r/p1ppqpb1/bn2pnp1/3PN3/1p2P3/2N2Q1p/PPPBBPPP/R3K2R w KQkq - 0 1",
        "8/2p5/3p4/KP5r/1R3p1k/8/4P1P1/8 w - - 0 1",
    ] {
        let root = ChessState::from_fen(fen)?;
        let mut mcts = Mcts::with_seed(DEFAULT_EXPLORATION_WEIGHT, BENCH_SEED);
        let _ = think(&mut mcts, &root, &Limits::rollouts(BENCH_ROLLOUTS))?;
        total_nodes += mcts.len();
    }

    let elapsed = timer.elapsed();
    writeln!(
        output,
        "{} nodes {} nps",
        total_nodes,
        (total_nodes as f64 / elapsed.as_secs_f64()) as u64,
    )?;
    Ok(())
}
