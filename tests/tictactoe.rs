//! The search knows nothing about chess: a tiny game is enough to check that
//! it finds forced wins.

use montecarlo_chess::game::{GameError, GameState};
use montecarlo_chess::search::{think, Limits, Mcts, SearchError};
use pretty_assertions::assert_eq;

const LINES: [[usize; 3]; 8] = [
    [0, 1, 2],
    [3, 4, 5],
    [6, 7, 8],
    [0, 3, 6],
    [1, 4, 7],
    [2, 5, 8],
    [0, 4, 8],
    [2, 4, 6],
];

/// Cells are listed row by row: `X`, `O` or `.` for an empty one. `X` moves
/// first.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
struct Board([u8; 9]);

impl Board {
    fn parse(cells: &str) -> Self {
        let cells: Vec<u8> = cells.bytes().filter(|c| !c.is_ascii_whitespace()).collect();
        Self(cells.try_into().expect("9 cells"))
    }

    fn count(&self, player: u8) -> usize {
        self.0.iter().filter(|&&cell| cell == player).count()
    }

    fn to_move(&self) -> u8 {
        if self.count(b'X') == self.count(b'O') {
            b'X'
        } else {
            b'O'
        }
    }

    fn has_line(&self) -> bool {
        LINES
            .iter()
            .any(|line| self.0[line[0]] != b'.' && line.iter().all(|&i| self.0[i] == self.0[line[0]]))
    }

    fn play(&self, cell: usize) -> Self {
        assert_eq!(self.0[cell], b'.');
        let mut next = *self;
        next.0[cell] = self.to_move();
        next
    }
}

impl GameState for Board {
    fn successors(&self) -> Vec<Self> {
        if self.is_terminal() {
            return Vec::new();
        }
        (0..9)
            .filter(|&cell| self.0[cell] == b'.')
            .map(|cell| self.play(cell))
            .collect()
    }

    fn is_terminal(&self) -> bool {
        self.has_line() || self.count(b'.') == 0
    }

    fn reward(&self) -> Result<f64, GameError> {
        if self.has_line() {
            // The line belongs to the player who just moved.
            Ok(0.0)
        } else if self.count(b'.') == 0 {
            Ok(0.5)
        } else {
            Err(GameError::NotTerminal(format!("{self:?}")))
        }
    }
}

#[test]
fn rules() {
    let board = Board::parse("XX. OO. ...");
    assert_eq!(board.to_move(), b'X');
    assert_eq!(board.successors().len(), 5);
    assert!(!board.is_terminal());
    assert!(matches!(board.reward(), Err(GameError::NotTerminal(_))));

    let won = board.play(2);
    assert!(won.is_terminal());
    assert!(won.successors().is_empty());
    assert!(won.reward().unwrap().abs() < f64::EPSILON);

    let drawn = Board::parse("XOX XOO OXX");
    assert!(drawn.is_terminal());
    assert!((drawn.reward().unwrap() - 0.5).abs() < f64::EPSILON);
}

#[test]
fn takes_immediate_win() {
    let board = Board::parse("XX. OO. ...");
    for seed in 0..3 {
        let mut mcts = Mcts::with_seed(1.0, seed);
        for _ in 0..500 {
            mcts.rollout(&board).unwrap();
        }
        assert_eq!(mcts.choose(&board).unwrap(), board.play(2), "seed {seed}");
    }
}

#[test]
fn blocks_opponent() {
    // O threatens to complete the middle row.
    let board = Board::parse("X.. OO. X..");
    let thought = think(&mut Mcts::with_seed(1.0, 0), &board, &Limits::rollouts(2000)).unwrap();
    assert_eq!(thought.state, board.play(5));
}

#[test]
fn visit_accounting() {
    let board = Board::parse("XX. OO. ...");
    let mut mcts = Mcts::with_seed(1.0, 3);
    let rollouts = 300;
    for _ in 0..rollouts {
        mcts.rollout(&board).unwrap();
    }
    assert_eq!(mcts.visits(&board), rollouts);
    // Every rollout but the first one descends into exactly one child.
    let children = mcts.children(&board).unwrap();
    assert_eq!(children, board.successors());
    let child_visits: u64 = children.iter().map(|child| mcts.visits(child)).sum();
    assert_eq!(child_visits, rollouts - 1);
}

#[test]
fn chosen_state_is_successor() {
    let board = Board::parse("... ... ...");
    let mut mcts = Mcts::with_seed(1.0, 11);
    for _ in 0..100 {
        mcts.rollout(&board).unwrap();
    }
    let choice = mcts.choose(&board).unwrap();
    assert!(board.successors().contains(&choice));
    assert!(mcts.score(&choice) >= mcts.score(&board.play(0)));
}

#[test]
fn no_moves_after_game_over() {
    let board = Board::parse("XXX OO. ...");
    let mut mcts = Mcts::with_seed(1.0, 0);
    assert!(matches!(
        mcts.choose(&board),
        Err(SearchError::TerminalState(_))
    ));
    assert!(matches!(
        think(&mut mcts, &board, &Limits::rollouts(1)),
        Err(SearchError::TerminalState(_))
    ));
}
