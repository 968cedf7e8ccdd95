//! Chess rules for the search, backed by the [shakmaty] rules engine.
//!
//! [`ChessState`] identifies a position by its [Forsyth-Edwards Notation]
//! (FEN). Move generation, terminal detection and the outcome are computed
//! lazily and memoized inside the value, so the search can query the same
//! position many times during tree traversal without redoing the work.
//!
//! [shakmaty]: https://docs.rs/shakmaty
//! [Forsyth-Edwards Notation]: https://www.chessprogramming.org/Forsyth-Edwards_Notation

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, OnceLock};

use anyhow::{anyhow, bail};
use rand::seq::SliceRandom;
use rand::Rng;
use shakmaty::fen::Fen;
use shakmaty::{CastlingMode, Chess, Color, EnPassantMode, Move, Position};

use crate::game::{GameError, GameResult, GameState};

/// Positions where 75 full moves were made without a capture or a pawn move
/// are drawn automatically.
const SEVENTY_FIVE_MOVE_RULE: u32 = 150;

struct Inner {
    position: Chess,
    fen: OnceLock<String>,
    moves: OnceLock<Vec<Move>>,
    outcome: OnceLock<Option<GameResult>>,
    successors: OnceLock<Vec<ChessState>>,
}

/// Immutable chess position. Cloning is cheap: clones share the position and
/// everything derived from it.
///
/// `ChessState::try_from()` accepts both complete FEN and the trimmed
/// version without move counters.
#[derive(Clone)]
pub struct ChessState(Arc<Inner>);

impl ChessState {
    fn new(position: Chess) -> Self {
        Self(Arc::new(Inner {
            position,
            fen: OnceLock::new(),
            moves: OnceLock::new(),
            outcome: OnceLock::new(),
            successors: OnceLock::new(),
        }))
    }

    /// Creates the starting position of the standard chess.
    #[must_use]
    pub fn starting() -> Self {
        Self::new(Chess::default())
    }

    /// Parses the position from FEN.
    ///
    /// # Errors
    ///
    /// Returns an error if the input is not a valid FEN or describes an
    /// illegal position.
    pub fn from_fen(input: &str) -> anyhow::Result<Self> {
        let input = input.trim();
        let fen: Fen = input
            .parse()
            .map_err(|e| anyhow!("invalid FEN '{input}': {e}"))?;
        let position: Chess = fen
            .into_position(CastlingMode::Standard)
            .map_err(|e| anyhow!("illegal position '{input}': {e}"))?;
        Ok(Self::new(position))
    }

    /// Canonical FEN of the position. En passant square is only included when
    /// the capture is actually legal, so transpositions compare equal.
    #[must_use]
    pub fn fen(&self) -> &str {
        self.0
            .fen
            .get_or_init(|| Fen::from_position(self.0.position.clone(), EnPassantMode::Legal).to_string())
    }

    /// Player to move.
    #[must_use]
    pub fn turn(&self) -> Color {
        self.0.position.turn()
    }

    fn moves(&self) -> &[Move] {
        self.0
            .moves
            .get_or_init(|| self.0.position.legal_moves().to_vec())
    }

    /// Moves that continue the game: none once it is over, even if the rules
    /// engine still generates some (e.g. after the seventy-five-move rule).
    fn successor_moves(&self) -> &[Move] {
        if self.is_terminal() {
            &[]
        } else {
            self.moves()
        }
    }

    fn play(&self, next_move: &Move) -> Self {
        let mut position = self.0.position.clone();
        position.play_unchecked(next_move);
        Self::new(position)
    }

    /// Returns the outcome from the perspective of the player to move or
    /// `None` if the game continues.
    #[must_use]
    pub fn outcome(&self) -> Option<GameResult> {
        *self.0.outcome.get_or_init(|| {
            let position = &self.0.position;
            if self.moves().is_empty() {
                return if position.is_check() {
                    Some(GameResult::Loss)
                } else {
                    Some(GameResult::Draw)
                };
            }
            if position.is_insufficient_material()
                || position.halfmoves() >= SEVENTY_FIVE_MOVE_RULE
            {
                return Some(GameResult::Draw);
            }
            None
        })
    }

    /// Applies a move in [UCI notation] (e.g. `e2e4`, `e7e8q`).
    ///
    /// # Errors
    ///
    /// Returns an error if the move is not legal in this position.
    ///
    /// [UCI notation]: https://www.chessprogramming.org/Algebraic_Chess_Notation#Pure_coordinate_notation
    pub fn play_uci(&self, uci: &str) -> anyhow::Result<Self> {
        let uci = uci.trim();
        if self.is_terminal() {
            bail!("cannot play {uci}: the game is over in position {self}");
        }
        match self
            .moves()
            .iter()
            .find(|m| m.to_uci(CastlingMode::Standard).to_string() == uci)
        {
            Some(next_move) => Ok(self.play(next_move)),
            None => bail!("illegal move {uci} in position {self}"),
        }
    }

    /// Finds the move that transforms this position into `next` and returns it
    /// in UCI notation.
    ///
    /// The search picks positions, not moves: this recovers the move to send
    /// to the opponent.
    ///
    /// # Errors
    ///
    /// Returns an error if `next` is not reachable by a single legal move.
    pub fn move_to(&self, next: &Self) -> anyhow::Result<String> {
        for candidate in self.successor_moves() {
            if self.play(candidate) == *next {
                return Ok(candidate.to_uci(CastlingMode::Standard).to_string());
            }
        }
        bail!("trying to make illegal move: {self} -> {next}")
    }
}

impl GameState for ChessState {
    fn successors(&self) -> Vec<Self> {
        self.0
            .successors
            .get_or_init(|| self.successor_moves().iter().map(|m| self.play(m)).collect())
            .clone()
    }

    fn is_terminal(&self) -> bool {
        self.outcome().is_some()
    }

    fn reward(&self) -> Result<f64, GameError> {
        self.outcome()
            .map(GameResult::reward)
            .ok_or_else(|| GameError::NotTerminal(self.to_string()))
    }

    // Playouts only need one successor: skip building all of them.
    fn random_successor<R: Rng + ?Sized>(&self, rng: &mut R) -> Result<Self, GameError> {
        self.successor_moves()
            .choose(rng)
            .map(|m| self.play(m))
            .ok_or_else(|| GameError::Terminal(self.to_string()))
    }
}

impl TryFrom<&str> for ChessState {
    type Error = anyhow::Error;

    fn try_from(input: &str) -> anyhow::Result<Self> {
        Self::from_fen(input)
    }
}

impl PartialEq for ChessState {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.fen() == other.fen()
    }
}

impl Eq for ChessState {}

impl Hash for ChessState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fen().hash(state);
    }
}

impl fmt::Display for ChessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.fen())
    }
}

impl fmt::Debug for ChessState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChessState({})", self.fen())
    }
}
