//! Algebraic simplification of expression graphs.
//!
//! Rules are applied bottom-up. Results are memoized by node identity, so a
//! shared subexpression is simplified once and stays shared in the output.

use std::collections::HashMap;

use log::{debug, log_enabled, Level};

use crate::node::{Expr, NodeId, Op};
use crate::ops;
use crate::value::Value;

/// True iff `expr` is a constant equal to `value`.
pub fn is_const(expr: &Expr, value: f64) -> bool {
    expr.const_value() == Some(value)
}

/// Number of non-leaf nodes reachable from `expr`, each shared node counted once.
pub fn complexity(expr: &Expr) -> usize {
    expr.postorder().filter(|n| !n.is_leaf()).count()
}

/// Return an equivalent graph with no more non-leaf nodes than `expr`.
///
/// The input is never modified. Leaves and untouched subgraphs are reused as-is.
pub fn simplify(expr: &Expr) -> Expr {
    let mut memo: HashMap<NodeId, Expr> = HashMap::new();

    for node in expr.postorder() {
        let simplified = if node.is_leaf() {
            node.clone()
        } else {
            let children: Vec<Expr> = node.children().iter().map(|c| memo[&c.id()].clone()).collect();
            rewrite(&node, children)
        };
        memo.insert(node.id(), simplified);
    }

    let out = memo[&expr.id()].clone();
    if log_enabled!(Level::Debug) {
        debug!(
            "simplified graph: {} -> {} non-leaf nodes",
            complexity(expr),
            complexity(&out)
        );
    }
    out
}

/// Apply local rules to `node` whose operands have already been simplified.
fn rewrite(node: &Expr, children: Vec<Expr>) -> Expr {
    if let Some(folded) = fold_constants(node.op(), &children) {
        return folded;
    }

    match node.op() {
        Op::Add | Op::Sum => {
            // A sum of repeated constant leaves is handled by folding above.
            let mut terms: Vec<Expr> = children.into_iter().filter(|c| !is_const(c, 0.0)).collect();
            match terms.len() {
                0 => Expr::constant(0.0),
                1 => terms.swap_remove(0),
                _ => rebuild(node, terms),
            }
        }

        Op::Mul => {
            let (a, b) = (&children[0], &children[1]);
            if is_const(a, 0.0) || is_const(b, 0.0) {
                Expr::constant(0.0)
            } else if is_const(a, 1.0) {
                b.clone()
            } else if is_const(b, 1.0) {
                a.clone()
            } else {
                rebuild(node, children)
            }
        }

        Op::Sub if is_const(&children[1], 0.0) => children[0].clone(),

        Op::Div | Op::Pow if is_const(&children[1], 1.0) => children[0].clone(),

        Op::Neg if matches!(children[0].op(), Op::Neg) => children[0].children()[0].clone(),

        _ => rebuild(node, children),
    }
}

/// Replace an operation on constants with a single constant.
fn fold_constants(op: &Op, children: &[Expr]) -> Option<Expr> {
    let values: Vec<Value> = children
        .iter()
        .map(|c| c.const_value().map(Value::Scalar))
        .collect::<Option<_>>()?;
    let args: Vec<&Value> = values.iter().collect();
    let folded = ops::forward(op, &args).ok()?;
    folded.as_scalar().map(Expr::constant)
}

/// Reuse `node` when its operands are unchanged, otherwise build a fresh node.
fn rebuild(node: &Expr, children: Vec<Expr>) -> Expr {
    let unchanged = children.len() == node.children().len()
        && children.iter().zip(node.children()).all(|(a, b)| a == b);
    if unchanged {
        node.clone()
    } else {
        Expr::new_op(node.op().clone(), children)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::eval::value;
    use crate::symbolic::symbolic_gradient;
    use crate::value::Bindings;

    #[test]
    fn test_add_zero() {
        let x = Expr::symbol("x");
        assert_eq!(simplify(&(&x + 0.0)), x);
        assert_eq!(simplify(&(0.0 + &x)), x);
    }

    #[test]
    fn test_mul_identity_and_annihilator() {
        let x = Expr::symbol("x");
        assert_eq!(simplify(&(&x * 1.0)), x);
        assert_eq!(simplify(&(1.0 * &x)), x);
        assert!(is_const(&simplify(&(&x * 0.0)), 0.0));
        assert!(is_const(&simplify(&(0.0 * &x)), 0.0));
    }

    #[test]
    fn test_constant_folding() {
        let f = (Expr::constant(2.0) + 3.0) * Expr::constant(4.0).sqrt();
        assert!(is_const(&simplify(&f), 10.0));
    }

    #[test]
    fn test_other_identities() {
        let x = Expr::symbol("x");
        assert_eq!(simplify(&(&x - 0.0)), x);
        assert_eq!(simplify(&(&x / 1.0)), x);
        assert_eq!(simplify(&x.powf(1.0)), x);
        assert_eq!(simplify(&-(-&x)), x);
        let s = simplify(&Expr::sum([x.clone(), Expr::constant(0.0), x.clone()]));
        assert_eq!(s.children().len(), 2);
    }

    #[test]
    fn test_untouched_graph_is_reused() {
        let x = Expr::symbol("x");
        let f = x.sin() * x.cos();
        assert_eq!(simplify(&f), f);
    }

    #[test]
    fn test_sharing_is_preserved() {
        let x = Expr::symbol("x");
        let y = Expr::symbol("y");
        let shared = (&x + 0.0) * &y;
        let f = (&shared + 1.0) * &shared;

        let s = simplify(&f);
        // (x*y + 1) * (x*y): mul, add, mul
        assert_eq!(complexity(&s), 3);
        assert_eq!(s.children()[0].children()[0], s.children()[1]);
    }

    #[test]
    fn test_five_fold_self_sum_derivative() {
        let x = Expr::symbol("x");
        let f = &x + &x + &x + &x + &x;
        let d = symbolic_gradient(&f).unwrap();
        let dx = simplify(&d[&x]);
        assert_eq!(complexity(&dx), 0);
        assert!(is_const(&dx, 5.0));
    }

    #[test]
    fn test_value_preserved() {
        let x = Expr::symbol("x");
        let f = (&x * 1.0 + 0.0).sin() * (Expr::constant(2.0) * 3.0);
        let s = simplify(&f);
        let b = Bindings::new().with(&x, vec![0.1, 0.7, 2.0]);
        assert_eq!(value(&f, &b).unwrap(), value(&s, &b).unwrap());
        assert!(complexity(&s) < complexity(&f));
    }

    #[test]
    fn test_collapsed_batch_expression_keeps_its_value() {
        let x = Expr::symbol("x");
        let y = Expr::symbol("y");
        let b = Bindings::new().with(&x, vec![1.0, 2.0, 3.0]).with(&y, 5.0);

        let f = &x * 0.0;
        let s = simplify(&f);
        assert!(is_const(&s, 0.0));
        assert_eq!(value(&f, &b).unwrap(), value(&s, &b).unwrap());

        let g = (&x * 0.0 + 1.0) * &y;
        let s = simplify(&g);
        assert_eq!(s, y);
        assert_eq!(value(&g, &b).unwrap(), Value::batch(vec![5.0, 5.0, 5.0]));
        assert_eq!(value(&g, &b).unwrap(), value(&s, &b).unwrap());
    }

    #[test]
    fn test_is_const() {
        let x = Expr::symbol("x");
        assert!(is_const(&Expr::constant(5.0), 5.0));
        assert!(!is_const(&Expr::constant(4.0), 5.0));
        assert!(!is_const(&x, 5.0));
        assert!(!is_const(&(Expr::constant(2.0) + 3.0), 5.0));
    }
}
