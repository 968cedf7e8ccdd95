//! Implements [Monte Carlo Tree Search] (MCTS) with [UCT] selection and
//! uniformly random playouts.
//!
//! Each [`Mcts::rollout`] is one search iteration:
//!
//! 1. Selection: walk down from the root, preferring children that were never
//!    expanded and otherwise following the UCT formula.
//! 2. Expansion: enumerate the successors of the last node on the path.
//! 3. Simulation: play random moves until the game is over.
//! 4. Backpropagation: update the statistics of every node on the path,
//!    flipping the reward at each ply.
//!
//! The statistics of a node are accumulated from the perspective of the player
//! who moved into it, so the parent simply picks the child with the highest
//! score.
//!
//! [Monte Carlo Tree Search]: https://en.wikipedia.org/wiki/Monte_Carlo_tree_search
//! [UCT]: https://www.chessprogramming.org/UCT

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use tracing::trace;

use super::tree::{NodeId, Tree};
use super::{SearchConfig, SearchError};
use crate::game::GameState;

/// Search tree together with the parameters and the random source used to
/// grow it.
///
/// The tree survives between moves: after the opponent replies, the new root
/// is usually already known and its statistics are reused.
pub struct Mcts<S: GameState> {
    tree: Tree<S>,
    exploration_weight: f64,
    rng: ChaCha8Rng,
}

impl<S: GameState> Mcts<S> {
    /// Creates an empty search seeded from the system entropy source.
    #[must_use]
    pub fn new(exploration_weight: f64) -> Self {
        Self::with_rng(exploration_weight, ChaCha8Rng::from_entropy())
    }

    /// Creates an empty search with a reproducible random source.
    #[must_use]
    pub fn with_seed(exploration_weight: f64, seed: u64) -> Self {
        Self::with_rng(exploration_weight, ChaCha8Rng::seed_from_u64(seed))
    }

    /// Creates an empty search from the engine configuration.
    #[must_use]
    pub fn from_config(config: &SearchConfig) -> Self {
        match config.seed {
            Some(seed) => Self::with_seed(config.exploration_weight, seed),
            None => Self::new(config.exploration_weight),
        }
    }

    fn with_rng(exploration_weight: f64, rng: ChaCha8Rng) -> Self {
        assert!(
            exploration_weight >= 0.0,
            "exploration weight must be non-negative, got {exploration_weight}"
        );
        Self {
            tree: Tree::new(),
            exploration_weight,
            rng,
        }
    }

    /// Exploration constant of the UCT formula.
    #[must_use]
    pub const fn exploration_weight(&self) -> f64 {
        self.exploration_weight
    }

    /// Changes the exploration constant. Accumulated statistics are kept.
    pub fn set_exploration_weight(&mut self, exploration_weight: f64) {
        assert!(exploration_weight >= 0.0);
        self.exploration_weight = exploration_weight;
    }

    /// Number of known positions.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tree.len()
    }

    /// Returns `true` if no rollout was performed yet.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tree.len() == 0
    }

    /// Forgets all statistics.
    pub fn clear(&mut self) {
        self.tree.clear();
    }

    /// Number of rollouts that went through the position.
    #[must_use]
    pub fn visits(&self, state: &S) -> u64 {
        self.tree.find(state).map_or(0, |id| self.tree.get(id).visits)
    }

    /// Sum of the rewards backpropagated through the position.
    #[must_use]
    pub fn total_reward(&self, state: &S) -> f64 {
        self.tree
            .find(state)
            .map_or(0.0, |id| self.tree.get(id).total_reward)
    }

    /// Successors of the position, if it was expanded.
    #[must_use]
    pub fn children(&self, state: &S) -> Option<Vec<S>> {
        let id = self.tree.find(state)?;
        self.tree.get(id).children.as_ref().map(|children| {
            children
                .iter()
                .map(|&child| self.tree.get(child).state.clone())
                .collect()
        })
    }

    /// Average reward of the position. Unvisited positions score negative
    /// infinity so that they never win over a visited sibling.
    #[must_use]
    pub fn score(&self, state: &S) -> f64 {
        self.tree
            .find(state)
            .map_or(f64::NEG_INFINITY, |id| self.node_score(id))
    }

    fn node_score(&self, id: NodeId) -> f64 {
        let node = self.tree.get(id);
        if node.visits == 0 {
            return f64::NEG_INFINITY;
        }
        node.total_reward / node.visits as f64
    }

    /// Picks the best known successor of `root`. If `root` was never expanded
    /// there is nothing to go on and a random legal successor is returned.
    ///
    /// # Errors
    ///
    /// Returns [`SearchError::TerminalState`] if the game is over at `root`.
    pub fn choose(&mut self, root: &S) -> Result<S, SearchError> {
        if root.is_terminal() {
            return Err(SearchError::TerminalState(format!("{root:?}")));
        }
        let Some(children) = self
            .tree
            .find(root)
            .and_then(|id| self.tree.get(id).children.as_ref())
        else {
            return Ok(root.random_successor(&mut self.rng)?);
        };
        children
            .iter()
            .copied()
            .max_by(|&lhs, &rhs| self.node_score(lhs).total_cmp(&self.node_score(rhs)))
            .map(|best| self.tree.get(best).state.clone())
            .ok_or_else(|| SearchError::TerminalState(format!("{root:?}")))
    }

    /// Runs one select, simulate, expand and backpropagate iteration from
    /// `root`.
    ///
    /// The iteration either completes or leaves the statistics untouched:
    /// the only fallible phase is the simulation, which runs before the leaf
    /// is expanded and before any visit is recorded. An expanded node always
    /// has at least one visit.
    ///
    /// # Errors
    ///
    /// Propagates failures of the [`GameState`] implementation.
    pub fn rollout(&mut self, root: &S) -> Result<(), SearchError> {
        let path = self.select(root);
        let leaf = *path.last().expect("selected path always contains the root");
        let reward = self.simulate(leaf)?;
        self.expand(leaf);
        self.backpropagate(&path, reward);
        Ok(())
    }

    fn select(&mut self, root: &S) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut current = self.tree.intern(root.clone());
        loop {
            path.push(current);
            let children = match &self.tree.get(current).children {
                Some(children) if !children.is_empty() => children,
                // Unexplored or terminal.
                _ => return path,
            };
            if let Some(&unexplored) = children
                .iter()
                .find(|&&child| !self.tree.get(child).is_expanded())
            {
                path.push(unexplored);
                return path;
            }
            current = self.uct_select(current);
        }
    }

    fn expand(&mut self, id: NodeId) {
        if self.tree.get(id).is_expanded() {
            return;
        }
        let successors = self.tree.get(id).state.successors();
        let children: Vec<NodeId> = successors
            .into_iter()
            .map(|state| self.tree.intern(state))
            .collect();
        trace!(node = id, children = children.len(), "expanded");
        self.tree.get_mut(id).children = Some(children);
    }

    /// Plays uniformly random moves from the node until the game ends and
    /// returns the reward from the perspective of the player who moved into
    /// the node.
    fn simulate(&mut self, id: NodeId) -> Result<f64, SearchError> {
        let mut state = self.tree.get(id).state.clone();
        let mut invert = true;
        while !state.is_terminal() {
            state = state.random_successor(&mut self.rng)?;
            invert = !invert;
        }
        let reward = state.reward()?;
        Ok(if invert { 1.0 - reward } else { reward })
    }

    fn backpropagate(&mut self, path: &[NodeId], mut reward: f64) {
        for &id in path.iter().rev() {
            let node = self.tree.get_mut(id);
            node.total_reward += reward;
            node.visits += 1;
            // The parent was reached by the other player.
            reward = 1.0 - reward;
        }
    }

    fn uct(&self, log_visits: f64, id: NodeId) -> f64 {
        let node = self.tree.get(id);
        let visits = node.visits as f64;
        self.exploration_weight
            .mul_add((log_visits / visits).sqrt(), node.total_reward / visits)
    }

    /// Picks the child with the best exploration/exploitation balance. All
    /// children have to be expanded.
    fn uct_select(&self, id: NodeId) -> NodeId {
        let node = self.tree.get(id);
        let children = node
            .children
            .as_deref()
            .expect("UCT select on unexpanded node");
        assert!(
            children.iter().all(|&child| self.tree.get(child).is_expanded()),
            "UCT select on a node with unexpanded children"
        );
        assert!(node.visits > 0, "UCT select on unvisited node");
        let log_visits = (node.visits as f64).ln();
        children
            .iter()
            .copied()
            .max_by(|&lhs, &rhs| {
                self.uct(log_visits, lhs)
                    .total_cmp(&self.uct(log_visits, rhs))
            })
            .expect("UCT select on node without children")
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::game::GameError;

    /// Players alternate taking one or two stones, the one who takes the last
    /// stone wins. Multiples of three are lost for the player to move.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    struct Stones(u8);

    impl GameState for Stones {
        fn successors(&self) -> Vec<Self> {
            (1..=2)
                .filter(|&take| take <= self.0)
                .map(|take| Self(self.0 - take))
                .collect()
        }

        fn is_terminal(&self) -> bool {
            self.0 == 0
        }

        fn reward(&self) -> Result<f64, GameError> {
            if self.is_terminal() {
                Ok(0.0)
            } else {
                Err(GameError::NotTerminal(format!("{self:?}")))
            }
        }
    }

    fn close(lhs: f64, rhs: f64) -> bool {
        (lhs - rhs).abs() < 1e-9
    }

    fn is_negative_infinity(value: f64) -> bool {
        value.is_infinite() && value.is_sign_negative()
    }

    #[test]
    fn unvisited_score() {
        let mut mcts = Mcts::with_seed(1.0, 0);
        assert!(is_negative_infinity(mcts.score(&Stones(5))));
        let id = mcts.tree.intern(Stones(5));
        assert!(is_negative_infinity(mcts.score(&Stones(5))));

        let node = mcts.tree.get_mut(id);
        node.visits = 4;
        node.total_reward = 1.0;
        assert!(close(mcts.score(&Stones(5)), 0.25));
        mcts.tree.get_mut(id).total_reward = 3.0;
        assert!(close(mcts.score(&Stones(5)), 0.75));
    }

    #[test]
    fn choose_without_statistics_is_random_successor() {
        let mut mcts = Mcts::with_seed(1.0, 0);
        for _ in 0..10 {
            let next = mcts.choose(&Stones(7)).unwrap();
            assert!(Stones(7).successors().contains(&next));
        }
        assert!(mcts.is_empty());
    }

    #[test]
    fn choose_in_terminal_state() {
        let mut mcts = Mcts::with_seed(1.0, 0);
        assert!(matches!(
            mcts.choose(&Stones(0)),
            Err(SearchError::TerminalState(_))
        ));
        // Even after the terminal state was explored.
        mcts.rollout(&Stones(0)).unwrap();
        assert!(matches!(
            mcts.choose(&Stones(0)),
            Err(SearchError::TerminalState(_))
        ));
    }

    #[test]
    fn rollout_from_terminal_root() {
        let mut mcts = Mcts::with_seed(1.0, 0);
        mcts.rollout(&Stones(0)).unwrap();
        mcts.rollout(&Stones(0)).unwrap();
        assert_eq!(mcts.visits(&Stones(0)), 2);
        // The player who moved into the final position won both times.
        assert!(close(mcts.total_reward(&Stones(0)), 2.0));
        assert_eq!(mcts.children(&Stones(0)), Some(Vec::new()));
    }

    #[test]
    fn first_rollout_only_visits_root() {
        let mut mcts = Mcts::with_seed(1.0, 0);
        mcts.rollout(&Stones(4)).unwrap();
        assert_eq!(mcts.visits(&Stones(4)), 1);
        assert_eq!(mcts.children(&Stones(4)), Some(vec![Stones(3), Stones(2)]));
        assert_eq!(mcts.visits(&Stones(3)), 0);
        assert_eq!(mcts.visits(&Stones(2)), 0);
        assert_eq!(mcts.children(&Stones(3)), None);
    }

    #[test]
    fn unexplored_children_first() {
        let mut mcts = Mcts::with_seed(1.0, 0);
        for _ in 0..3 {
            mcts.rollout(&Stones(4)).unwrap();
        }
        assert_eq!(mcts.visits(&Stones(4)), 3);
        assert_eq!(mcts.visits(&Stones(3)), 1);
        assert_eq!(mcts.visits(&Stones(2)), 1);
        assert!(mcts.children(&Stones(3)).is_some());
        assert!(mcts.children(&Stones(2)).is_some());
    }

    #[test]
    fn reward_alternates_between_plies() {
        let mut mcts = Mcts::with_seed(1.0, 0);
        let path = [
            mcts.tree.intern(Stones(2)),
            mcts.tree.intern(Stones(1)),
            mcts.tree.intern(Stones(0)),
        ];
        mcts.backpropagate(&path, 1.0);
        assert!(close(mcts.total_reward(&Stones(0)), 1.0));
        assert!(close(mcts.total_reward(&Stones(1)), 0.0));
        assert!(close(mcts.total_reward(&Stones(2)), 1.0));
        for state in [Stones(0), Stones(1), Stones(2)] {
            assert_eq!(mcts.visits(&state), 1);
        }
    }

    #[test]
    fn simulation_perspective() {
        let mut mcts = Mcts::with_seed(1.0, 0);
        // Taking the last stone wins.
        let terminal = mcts.tree.intern(Stones(0));
        assert!(close(mcts.simulate(terminal).unwrap(), 1.0));
        // The only continuation hands the last stone to the player to move.
        let one = mcts.tree.intern(Stones(1));
        assert!(close(mcts.simulate(one).unwrap(), 0.0));
    }

    #[test]
    fn idempotent_expansion() {
        let mut mcts = Mcts::with_seed(1.0, 0);
        let id = mcts.tree.intern(Stones(5));
        mcts.expand(id);
        let children = mcts.tree.get(id).children.clone();
        let len = mcts.len();
        mcts.expand(id);
        assert_eq!(mcts.tree.get(id).children, children);
        assert_eq!(mcts.len(), len);
    }

    #[test]
    fn transpositions_share_nodes() {
        let mut mcts = Mcts::with_seed(1.0, 0);
        for _ in 0..100 {
            mcts.rollout(&Stones(6)).unwrap();
        }
        // One node per distinct position.
        assert_eq!(mcts.len(), 7);
    }

    #[test]
    fn uct_formula() {
        let mut mcts = Mcts::with_seed(2.0, 0);
        let parent = mcts.tree.intern(Stones(4));
        let exploited = mcts.tree.intern(Stones(3));
        let explored = mcts.tree.intern(Stones(2));
        for (id, visits, reward) in [(parent, 20, 10.0), (exploited, 16, 12.0), (explored, 4, 1.0)] {
            let node = mcts.tree.get_mut(id);
            node.visits = visits;
            node.total_reward = reward;
            node.children = Some(Vec::new());
        }
        mcts.tree.get_mut(parent).children = Some(vec![exploited, explored]);

        let log_visits = 20.0_f64.ln();
        let exploited_uct = 2.0f64.mul_add((log_visits / 16.0).sqrt(), 0.75);
        let explored_uct = 2.0f64.mul_add((log_visits / 4.0).sqrt(), 0.25);
        assert!(close(mcts.uct(log_visits, exploited), exploited_uct));
        assert!(close(mcts.uct(log_visits, explored), explored_uct));
        assert!(explored_uct > exploited_uct);
        assert_eq!(mcts.uct_select(parent), explored);

        // Without exploration the better average wins.
        mcts.set_exploration_weight(0.0);
        assert_eq!(mcts.uct_select(parent), exploited);
    }

    #[test]
    #[should_panic(expected = "UCT select on a node with unexpanded children")]
    fn uct_select_requires_expanded_children() {
        let mut mcts = Mcts::with_seed(1.0, 0);
        let parent = mcts.tree.intern(Stones(2));
        mcts.tree.get_mut(parent).visits = 1;
        mcts.expand(parent);
        let _ = mcts.uct_select(parent);
    }

    #[test]
    fn root_visits_count_rollouts() {
        let mut mcts = Mcts::with_seed(1.0, 7);
        for _ in 0..200 {
            mcts.rollout(&Stones(10)).unwrap();
        }
        assert_eq!(mcts.visits(&Stones(10)), 200);
    }

    #[test]
    fn finds_winning_move() {
        for seed in 0..5 {
            let mut mcts = Mcts::with_seed(1.0, seed);
            for _ in 0..500 {
                mcts.rollout(&Stones(7)).unwrap();
            }
            // Leaving a multiple of three stones forces the win.
            assert_eq!(mcts.choose(&Stones(7)).unwrap(), Stones(6), "seed {seed}");
            assert!(mcts.score(&Stones(6)) > mcts.score(&Stones(5)));
        }
    }

    /// Rules implementation that can not score finished games.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    struct Unscored(u8);

    impl GameState for Unscored {
        fn successors(&self) -> Vec<Self> {
            if self.0 == 0 {
                Vec::new()
            } else {
                vec![Self(self.0 - 1)]
            }
        }

        fn is_terminal(&self) -> bool {
            self.0 == 0
        }

        fn reward(&self) -> Result<f64, GameError> {
            Err(GameError::NotTerminal(format!("{self:?}")))
        }
    }

    #[test]
    fn failed_simulation_keeps_tree_consistent() {
        let mut mcts = Mcts::with_seed(1.0, 0);
        for _ in 0..3 {
            assert!(matches!(
                mcts.rollout(&Unscored(3)),
                Err(SearchError::Game(GameError::NotTerminal(_)))
            ));
            assert_eq!(mcts.children(&Unscored(3)), None);
            assert_eq!(mcts.visits(&Unscored(3)), 0);
        }
        assert_eq!(mcts.len(), 1);
    }

    #[test]
    #[should_panic(expected = "exploration weight must be non-negative")]
    fn negative_exploration_weight() {
        drop(Mcts::<Stones>::with_seed(-1.0, 0));
    }
}
