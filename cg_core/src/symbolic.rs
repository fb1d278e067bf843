//! Symbolic reverse-mode differentiation.
//!
//! Same traversal as the numeric backward pass, but adjoints are expressions:
//! each contribution is `parent_adjoint * local_partial`, and multiple
//! contributions to one node are combined with `sum`. The resulting expressions
//! are ordinary graphs, so they can be differentiated again.

use std::collections::HashMap;
use std::ops::Index;

use log::debug;

use crate::error::Result;
use crate::node::{Expr, NodeId};
use crate::ops::local_gradient_exprs;

/// Derivative expressions of one output with respect to every reachable node.
#[derive(Debug, Clone)]
pub struct SymbolicGradients {
    derivatives: HashMap<NodeId, Expr>,
}

impl SymbolicGradients {
    /// Get d(output)/d(expr), or `None` if `expr` is not reachable.
    pub fn wrt(&self, expr: &Expr) -> Option<&Expr> {
        self.derivatives.get(&expr.id())
    }

    /// Iterate over (node id, derivative) pairs in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (NodeId, &Expr)> {
        self.derivatives.iter().map(|(id, d)| (*id, d))
    }

    pub fn len(&self) -> usize {
        self.derivatives.len()
    }

    pub fn is_empty(&self) -> bool {
        self.derivatives.is_empty()
    }
}

impl Index<&Expr> for SymbolicGradients {
    type Output = Expr;

    /// Panics if `expr` is not reachable from the differentiated output.
    fn index(&self, expr: &Expr) -> &Expr {
        match self.wrt(expr) {
            Some(d) => d,
            None => panic!("node {:?} is not reachable from the differentiated expression", expr.id()),
        }
    }
}

/// Build derivative expressions of `output` with respect to every node it depends on.
pub fn symbolic_gradient(output: &Expr) -> Result<SymbolicGradients> {
    let order: Vec<Expr> = output.postorder().collect();

    let mut contributions: HashMap<NodeId, Vec<Expr>> = HashMap::with_capacity(order.len());
    contributions.insert(output.id(), vec![Expr::constant(1.0)]);

    let mut derivatives: HashMap<NodeId, Expr> = HashMap::with_capacity(order.len());

    // Reverse postorder: every parent is finished before its children.
    for expr in order.iter().rev() {
        let Some(mut terms) = contributions.remove(&expr.id()) else {
            continue;
        };
        let adjoint = if terms.len() == 1 {
            terms.remove(0)
        } else {
            Expr::sum(terms)
        };

        if !expr.is_leaf() {
            let partials = local_gradient_exprs(expr)?;
            for (child, partial) in expr.children().iter().zip(partials) {
                contributions
                    .entry(child.id())
                    .or_default()
                    .push(&adjoint * partial);
            }
        }

        derivatives.insert(expr.id(), adjoint);
    }

    debug!("built symbolic derivatives for {} nodes", derivatives.len());

    Ok(SymbolicGradients { derivatives })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::value;
    use crate::value::{Bindings, Value};
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_symbolic_mul() {
        let x = Expr::symbol("x");
        let y = Expr::symbol("y");
        let f = &x * &y;

        let d = symbolic_gradient(&f).unwrap();
        let b = Bindings::new().with(&x, 2.0).with(&y, 3.0);
        assert_abs_diff_eq!(value(&d[&x], &b).unwrap(), Value::Scalar(3.0));
        assert_abs_diff_eq!(value(&d[&y], &b).unwrap(), Value::Scalar(2.0));
    }

    #[test]
    fn test_every_reachable_node_has_a_derivative() {
        let x = Expr::symbol("x");
        let inner = x.sin();
        let f = &inner * 2.0;

        let d = symbolic_gradient(&f).unwrap();
        assert_eq!(d.len(), f.postorder().count());
        assert!(d.wrt(&inner).is_some());
        assert!(d.wrt(&Expr::symbol("z")).is_none());
    }

    #[test]
    fn test_multiple_contributions_are_summed() {
        let x = Expr::symbol("x");
        let f = &x * &x;

        let d = symbolic_gradient(&f).unwrap();
        assert!(matches!(d[&x].op(), crate::node::Op::Sum));
        let b = Bindings::new().with(&x, 3.0);
        assert_abs_diff_eq!(value(&d[&x], &b).unwrap(), Value::Scalar(6.0));
    }

    #[test]
    fn test_input_graph_unchanged() {
        let x = Expr::symbol("x");
        let f = x.exp() + &x;
        let before: Vec<NodeId> = f.postorder().map(|n| n.id()).collect();
        let _ = symbolic_gradient(&f).unwrap();
        let after: Vec<NodeId> = f.postorder().map(|n| n.id()).collect();
        assert_eq!(before, after);
    }
}
