use std::collections::HashMap;

use crate::game::GameState;

/// Index of the node in [`Tree::nodes`].
pub(super) type NodeId = usize;

// TODO: Measure the performance and see if storing rewards as win/draw/loss
// counters instead of a float sum makes backpropagation faster.
pub(super) struct Node<S> {
    pub(super) state: S,
    /// Number of rollouts that went through this node.
    pub(super) visits: u64,
    /// Sum of the backpropagated rewards.
    pub(super) total_reward: f64,
    /// `None` until the successors are enumerated. Terminal states hold an
    /// empty list once expanded.
    pub(super) children: Option<Vec<NodeId>>,
}

impl<S> Node<S> {
    const fn new(state: S) -> Self {
        Self {
            state,
            visits: 0,
            total_reward: 0.0,
            children: None,
        }
    }

    #[must_use]
    pub(super) const fn is_expanded(&self) -> bool {
        self.children.is_some()
    }
}

/// Arena of search nodes with a lookup table from position to node.
///
/// Every distinct position owns exactly one node, so transpositions share
/// their statistics.
pub(super) struct Tree<S> {
    nodes: Vec<Node<S>>,
    index: HashMap<S, NodeId>,
}

impl<S: GameState> Tree<S> {
    #[must_use]
    pub(super) fn new() -> Self {
        Self {
            nodes: Vec::new(),
            index: HashMap::new(),
        }
    }

    #[must_use]
    pub(super) fn find(&self, state: &S) -> Option<NodeId> {
        self.index.get(state).copied()
    }

    /// Returns the node of the given position, creating an unexpanded one if
    /// the position was never seen.
    pub(super) fn intern(&mut self, state: S) -> NodeId {
        if let Some(id) = self.find(&state) {
            return id;
        }
        let id = self.nodes.len();
        self.nodes.push(Node::new(state.clone()));
        let _ = self.index.insert(state, id);
        id
    }

    #[must_use]
    pub(super) fn get(&self, id: NodeId) -> &Node<S> {
        &self.nodes[id]
    }

    #[must_use]
    pub(super) fn get_mut(&mut self, id: NodeId) -> &mut Node<S> {
        &mut self.nodes[id]
    }

    #[must_use]
    pub(super) fn len(&self) -> usize {
        self.nodes.len()
    }

    pub(super) fn clear(&mut self) {
        self.nodes.clear();
        self.index.clear();
    }
}
