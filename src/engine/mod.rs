//! The engine puts all pieces together. It implements the [Universal Chess
//! Interface] (UCI) for communication with the client (e.g. tournament runner
//! with other engines or GUI/Lichess endpoint).
//!
//! [`Engine::uci_loop`] is the "main loop" of the engine which communicates
//! with the environment and executes commands from the input stream.
//!
//! [Universal Chess Interface]: https://www.chessprogramming.org/UCI

use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::Context;
use shakmaty::Color;
use tracing::{debug, info};

use crate::chess::ChessState;
use crate::engine::uci::{Command, EngineOption, Go, OptionValue};
use crate::search::{think, Limits, Mcts, SearchConfig, SearchError};

mod uci;

/// Share of the remaining clock time spent on a single move.
const MOVES_TO_GO: u64 = 20;

/// The Engine connects everything together and handles commands sent by UCI
/// server, including I/O.
///
/// The search tree is kept between `go` commands of the same game: when the
/// next root was explored during an earlier search, its statistics are reused.
pub struct Engine<'a, R: BufRead, W: Write> {
    position: ChessState,
    search: Mcts<ChessState>,
    config: SearchConfig,
    input: &'a mut R,
    output: &'a mut W,
}

impl<'a, R: BufRead, W: Write> Engine<'a, R, W> {
    /// Creates a new instance of the engine with starting position and provided
    /// I/O.
    #[must_use]
    pub fn new(config: SearchConfig, input: &'a mut R, output: &'a mut W) -> Self {
        Self {
            position: ChessState::starting(),
            search: Mcts::from_config(&config),
            config,
            input,
            output,
        }
    }

    /// Continuously reads the input stream and executes sent UCI commands until
    /// "quit" is sent or the input is closed.
    ///
    /// The implementation here does not aim to be complete and exhaustive,
    /// because the main goal is to make the engine work in relatively
    /// simple setups. Commands are executed one at a time: `go` blocks until
    /// the move is chosen, so `stop` has nothing to interrupt.
    ///
    /// Malformed commands, positions and moves are reported through
    /// `info string` and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Fails if the input can not be read or the output can not be written.
    pub fn uci_loop(&mut self) -> anyhow::Result<()> {
        loop {
            let mut line = String::new();
            if self
                .input
                .read_line(&mut line)
                .context("reading UCI input")?
                == 0
            {
                break;
            }
            let command = Command::parse(&line);
            debug!(?command, "received");
            match command {
                Command::Uci => self.handle_uci()?,
                Command::IsReady => self.handle_isready()?,
                Command::SetOption { option, value } => self.handle_setoption(&option, &value)?,
                Command::SetPosition { fen, moves } => {
                    self.handle_position(fen.as_deref(), &moves)?;
                },
                Command::NewGame => self.handle_ucinewgame(),
                Command::Go(go) => self.handle_go(&go)?,
                Command::Stop => {},
                Command::Quit => break,
                Command::Unknown(command) if command.is_empty() => {},
                Command::Unknown(command) => {
                    writeln!(self.output, "info string Unsupported command: {command}")?;
                },
            }
            self.output.flush()?;
        }
        Ok(())
    }

    /// Responds to the `uci` handshake command by identifying the engine.
    fn handle_uci(&mut self) -> anyhow::Result<()> {
        writeln!(
            self.output,
            "id name {} {}",
            env!("CARGO_PKG_NAME"),
            crate::engine_version()
        )?;
        writeln!(self.output, "id author {}", env!("CARGO_PKG_AUTHORS"))?;
        writeln!(
            self.output,
            "option name ExplorationWeight type string default {}",
            self.config.exploration_weight
        )?;
        writeln!(
            self.output,
            "option name ThinkTime type spin default {} min 1 max {}",
            self.config.think_time.as_millis(),
            u32::MAX
        )?;
        writeln!(self.output, "uciok")?;
        Ok(())
    }

    /// Syncs with the UCI server by responding with `readyok`.
    fn handle_isready(&mut self) -> anyhow::Result<()> {
        writeln!(self.output, "readyok")?;
        Ok(())
    }

    fn handle_setoption(&mut self, option: &EngineOption, value: &OptionValue) -> anyhow::Result<()> {
        match (option, value) {
            (EngineOption::ExplorationWeight, &OptionValue::Float(weight)) => {
                self.config.exploration_weight = weight;
                self.search.set_exploration_weight(weight);
            },
            (EngineOption::ThinkTime, &OptionValue::Integer(millis)) => {
                self.config.think_time = Duration::from_millis(millis);
            },
            _ => {
                writeln!(
                    self.output,
                    "info string Invalid value {value:?} for option {option:?}"
                )?;
                return Ok(());
            },
        }
        info!(?option, ?value, "option set");
        Ok(())
    }

    /// Forgets everything learned during the previous game.
    fn handle_ucinewgame(&mut self) {
        self.search.clear();
        self.position = ChessState::starting();
        info!("new game");
    }

    /// Changes the position of the board to the one specified in the command.
    /// Nothing changes if the position or one of the moves is invalid.
    fn handle_position(&mut self, fen: Option<&str>, moves: &[String]) -> anyhow::Result<()> {
        match replay(fen, moves) {
            Ok(position) => self.position = position,
            Err(e) => writeln!(self.output, "info string {e:#}")?,
        }
        Ok(())
    }

    /// Converts the `go` parameters into the search budget.
    fn limits(&self, go: &Go) -> Limits {
        let (remaining, increment) = match self.position.turn() {
            Color::White => (go.wtime, go.winc),
            Color::Black => (go.btime, go.binc),
        };
        let time = if let Some(movetime) = go.movetime {
            Some(Duration::from_millis(movetime))
        } else if go.infinite {
            Some(self.config.think_time)
        } else if let Some(remaining) = remaining {
            let share = Duration::from_millis(remaining / MOVES_TO_GO + increment.unwrap_or(0));
            Some(share.min(self.config.think_time))
        } else if go.nodes.is_some() {
            None
        } else {
            Some(self.config.think_time)
        };
        Limits {
            time,
            rollouts: go.nodes,
        }
    }

    /// Searches the current position and replies with the best move. The
    /// engine then continues from the position after that move.
    fn handle_go(&mut self, go: &Go) -> anyhow::Result<()> {
        let limits = self.limits(go);
        let thought = match think(&mut self.search, &self.position, &limits) {
            Ok(thought) => thought,
            Err(SearchError::TerminalState(_)) => {
                writeln!(self.output, "info string The game is over")?;
                writeln!(self.output, "bestmove 0000")?;
                return Ok(());
            },
            Err(e) => return Err(e.into()),
        };
        let best_move = self.position.move_to(&thought.state)?;
        writeln!(
            self.output,
            "info nodes {} time {}",
            thought.rollouts,
            thought.elapsed.as_millis()
        )?;
        writeln!(
            self.output,
            "info string visits {} reward {:.1}",
            thought.visits, thought.total_reward
        )?;
        writeln!(self.output, "bestmove {best_move}")?;
        info!(%best_move, rollouts = thought.rollouts, "move chosen");
        self.position = thought.state;
        Ok(())
    }
}

/// Plays the moves from the given position (or the starting one).
fn replay(fen: Option<&str>, moves: &[String]) -> anyhow::Result<ChessState> {
    let mut position = match fen {
        Some(fen) => ChessState::from_fen(fen)?,
        None => ChessState::starting(),
    };
    for next_move in moves {
        position = position.play_uci(next_move)?;
    }
    Ok(position)
}
