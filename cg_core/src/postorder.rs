//! Dependency-ordered traversal of an expression graph.

use std::collections::HashSet;

use crate::node::{Expr, NodeId};

/// Lazy postorder iterator: every child is yielded before its parents, and a
/// node reachable along several paths is yielded once.
///
/// Siblings are visited in child-list order. The visited set belongs to the
/// iterator, so each call to [`postorder`] starts a fresh traversal.
#[derive(Debug, Clone)]
pub struct Postorder {
    /// Nodes whose children are still being expanded, with the next child index.
    stack: Vec<(Expr, usize)>,
    visited: HashSet<NodeId>,
}

impl Postorder {
    pub(crate) fn new(root: &Expr) -> Self {
        let mut visited = HashSet::new();
        visited.insert(root.id());
        Postorder {
            stack: vec![(root.clone(), 0)],
            visited,
        }
    }
}

impl Iterator for Postorder {
    type Item = Expr;

    fn next(&mut self) -> Option<Expr> {
        loop {
            let next_child = {
                let (node, idx) = self.stack.last_mut()?;
                let child = node.children().get(*idx).cloned();
                if child.is_some() {
                    *idx += 1;
                }
                child
            };

            match next_child {
                Some(child) => {
                    // A node already visited has been yielded: the graph is acyclic.
                    if self.visited.insert(child.id()) {
                        self.stack.push((child, 0));
                    }
                }
                None => return self.stack.pop().map(|(node, _)| node),
            }
        }
    }
}

/// Iterate over every node reachable from `root`, children before parents.
pub fn postorder(root: &Expr) -> Postorder {
    Postorder::new(root)
}
