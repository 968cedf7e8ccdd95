//! Interface for the rules of a two-player, turn-based game. The search never
//! inspects moves directly: it only walks from one [`GameState`] to its
//! successors and reads the outcome once the game is over.
//!
//! The concrete chess rules live in [`crate::chess`].

use std::fmt::Debug;
use std::hash::Hash;
use std::ops::Not;

use rand::seq::SliceRandom;
use rand::Rng;
use thiserror::Error;

/// Result of the game from the perspective of the player to move.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    Win,
    Draw,
    Loss,
}

impl GameResult {
    /// Converts the result into the reward used by the search: 1.0 for a win,
    /// 0.5 for a draw and 0.0 for a loss.
    #[must_use]
    pub const fn reward(self) -> f64 {
        match self {
            Self::Win => 1.0,
            Self::Draw => 0.5,
            Self::Loss => 0.0,
        }
    }
}

impl Not for GameResult {
    type Output = Self;

    /// Mirrors the result to the other player's perspective.
    fn not(self) -> Self::Output {
        match self {
            Self::Win => Self::Loss,
            Self::Draw => Self::Draw,
            Self::Loss => Self::Win,
        }
    }
}

/// Contract violations of the [`GameState`] capabilities.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GameError {
    /// There is no successor to pick: the position is terminal.
    #[error("no legal moves in terminal position {0}")]
    Terminal(String),
    /// Reward is only defined once the game is over.
    #[error("reward is undefined for non-terminal position {0}")]
    NotTerminal(String),
}

/// An immutable position of the game.
///
/// Two values are equal iff they describe the same logical position, which is
/// what the search uses to share statistics between transpositions. All
/// queries must be pure functions of the position: calling them repeatedly
/// yields the same answers.
pub trait GameState: Clone + Eq + Hash + Debug {
    /// Returns all positions reachable by one legal move. The result contains
    /// no duplicates and is empty iff the position is terminal.
    fn successors(&self) -> Vec<Self>;

    /// Returns `true` iff no further moves are possible.
    fn is_terminal(&self) -> bool;

    /// Returns the outcome of a finished game in `[0, 1]` from the perspective
    /// of the player to move: 1.0 is a win, 0.0 a loss and 0.5 a draw.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::NotTerminal`] if the game is not over yet.
    fn reward(&self) -> Result<f64, GameError>;

    /// Picks one of the [`GameState::successors`] uniformly at random. The
    /// random source is owned by the caller.
    ///
    /// # Errors
    ///
    /// Returns [`GameError::Terminal`] if there are no successors.
    fn random_successor<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Self, GameError> {
        self.successors()
            .choose(rng)
            .cloned()
            .ok_or_else(|| GameError::Terminal(format!("{self:?}")))
    }
}
