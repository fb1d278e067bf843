//! Numeric reverse-mode differentiation.
//!
//! The backward pass computes gradients by:
//! 1. Evaluating the graph forward, keeping every node's value
//! 2. Traversing in reverse postorder, accumulating adjoints from output to leaves
//!
//! A node used by several parents (or several times by one parent) receives one
//! contribution per use; its adjoint is their sum.

use std::collections::HashMap;

use log::{debug, trace};

use crate::error::Result;
use crate::eval::{forward_pass, EvalConfig};
use crate::node::{Expr, NodeId, Op};
use crate::ops::local_gradients;
use crate::value::{Bindings, Value};

/// Adjoints computed by a backward pass.
///
/// Provides methods to query gradients by symbol or by name.
#[derive(Debug)]
pub struct Gradients {
    /// Value of the differentiated expression at the same bindings.
    value: Value,
    /// Map from node ID to its adjoint, for every node reachable from the output.
    adjoints: HashMap<NodeId, Value>,
    /// Map from symbol name to (NodeId, gradient) for symbols with that name.
    /// Distinct symbols may share a name.
    name_to_grads: HashMap<String, Vec<(NodeId, Value)>>,
}

impl Gradients {
    /// Value of the differentiated expression, from the forward pass.
    pub fn value(&self) -> &Value {
        &self.value
    }

    /// Get the gradient with respect to a symbol.
    ///
    /// Returns `None` if `expr` is not a symbol or is not reachable from the
    /// differentiated expression.
    pub fn wrt(&self, expr: &Expr) -> Option<&Value> {
        if !expr.is_symbol() {
            return None;
        }
        self.adjoints.get(&expr.id())
    }

    /// Get the adjoint of any reachable node, symbol or not.
    pub fn node(&self, expr: &Expr) -> Option<&Value> {
        self.adjoints.get(&expr.id())
    }

    /// Get the gradient for a symbol by name.
    ///
    /// If multiple symbols share the name, returns the gradient of the first one
    /// found. Use [`Gradients::wrt`] to pick a specific symbol.
    pub fn by_name(&self, name: &str) -> Option<&Value> {
        self.name_to_grads
            .get(name)
            .and_then(|grads| grads.first().map(|(_, g)| g))
    }

    /// Get all named gradients as a map from symbol name to gradient.
    ///
    /// If multiple symbols share the same name, their gradients are summed.
    pub fn all_named_grads(&self) -> Result<HashMap<String, Value>> {
        let mut named = HashMap::with_capacity(self.name_to_grads.len());
        for (name, grads) in &self.name_to_grads {
            let mut total = Value::Scalar(0.0);
            for (_, g) in grads {
                total = total.zip_with(g, |a, b| a + b)?;
            }
            named.insert(name.clone(), total);
        }
        Ok(named)
    }

    /// Get gradients for a list of symbols, in order.
    ///
    /// Symbols that do not influence the output get a scalar zero.
    pub fn wrt_many(&self, exprs: &[Expr]) -> Vec<Value> {
        exprs
            .iter()
            .map(|e| self.wrt(e).cloned().unwrap_or(Value::Scalar(0.0)))
            .collect()
    }

    /// Number of nodes holding an adjoint.
    pub fn len(&self) -> usize {
        self.adjoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.adjoints.is_empty()
    }
}

/// Compute numeric gradients of `output` at `bindings`.
pub fn gradient(output: &Expr, bindings: &Bindings) -> Result<Gradients> {
    gradient_with(output, bindings, EvalConfig::default())
}

/// Compute numeric gradients of `output` at `bindings`, evaluating with `config`.
pub fn gradient_with(output: &Expr, bindings: &Bindings, config: EvalConfig) -> Result<Gradients> {
    // Step 1: Forward pass; postorder is a valid topological order
    let pass = forward_pass(output, bindings, config)?;

    // Step 2: Seed the output adjoint with ones shaped like the output
    let mut adjoints: HashMap<NodeId, Value> = HashMap::with_capacity(pass.order.len());
    adjoints.insert(output.id(), pass.value_of(output).full_like(1.0));

    // Step 3: Traverse in reverse order (parents before children)
    for expr in pass.order.iter().rev() {
        if expr.is_leaf() {
            continue;
        }
        let Some(node_adjoint) = adjoints.get(&expr.id()).cloned() else {
            continue;
        };

        let args: Vec<&Value> = expr.children().iter().map(|c| pass.value_of(c)).collect();
        let local_grads = local_gradients(expr.op(), &args, pass.value_of(expr))?;

        for (child, local) in expr.children().iter().zip(&local_grads) {
            // Chain rule: child_adjoint += node_adjoint * local_gradient
            let contribution = node_adjoint.zip_with(local, |a, g| a * g)?;
            match adjoints.get_mut(&child.id()) {
                Some(existing) => *existing = existing.zip_with(&contribution, |a, b| a + b)?,
                None => {
                    adjoints.insert(child.id(), contribution);
                }
            }
        }
        trace!("propagated adjoint of node {:?} ({})", expr.id(), expr.op().name());
    }

    // Step 4: Build name -> gradients map for symbol lookup
    let mut name_to_grads: HashMap<String, Vec<(NodeId, Value)>> = HashMap::new();
    for expr in &pass.order {
        if let Op::Symbol { name } = expr.op() {
            if let Some(grad) = adjoints.get(&expr.id()) {
                name_to_grads
                    .entry(name.clone())
                    .or_default()
                    .push((expr.id(), grad.clone()));
            }
        }
    }

    debug!(
        "backward pass over {} nodes, {} symbol(s)",
        pass.order.len(),
        name_to_grads.values().map(Vec::len).sum::<usize>()
    );

    Ok(Gradients {
        value: pass.value_of(output).clone(),
        adjoints,
        name_to_grads,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_backward_simple_add() {
        let x = Expr::symbol("x");
        let y = Expr::symbol("y");
        let z = &x + &y;

        let b = Bindings::new().with(&x, 2.0).with(&y, 3.0);
        let grads = gradient(&z, &b).unwrap();

        assert_eq!(grads.value(), &Value::Scalar(5.0));
        assert_eq!(grads.wrt(&x), Some(&Value::Scalar(1.0)));
        assert_eq!(grads.wrt(&y), Some(&Value::Scalar(1.0)));
    }

    #[test]
    fn test_backward_chain() {
        // z = (x + 1)^2
        // dz/dx = 2(x + 1)
        let x = Expr::symbol("x");
        let z = (&x + 1.0).powf(2.0);

        let b = Bindings::new().with(&x, 2.0);
        let grads = gradient(&z, &b).unwrap();

        // At x=2: dz/dx = 2 * 3 = 6
        assert_abs_diff_eq!(*grads.wrt(&x).unwrap(), Value::Scalar(6.0), epsilon = 1e-10);
    }

    #[test]
    fn test_backward_reused_child_in_one_parent() {
        let x = Expr::symbol("x");
        let y = Expr::symbol("y");
        let f = Expr::sum([&x, &y, &x, &y]);

        let b = Bindings::new().with(&x, 2.0).with(&y, 3.0);
        let grads = gradient(&f, &b).unwrap();

        assert_eq!(grads.wrt(&x), Some(&Value::Scalar(2.0)));
        assert_eq!(grads.wrt(&y), Some(&Value::Scalar(2.0)));
    }

    #[test]
    fn test_backward_intermediate_nodes_and_constants() {
        let x = Expr::symbol("x");
        let c = Expr::constant(3.0);
        let inner = &x * &c;
        let f = inner.sin();

        let b = Bindings::new().with(&x, 0.5);
        let grads = gradient(&f, &b).unwrap();

        assert_abs_diff_eq!(*grads.node(&inner).unwrap(), Value::Scalar(1.5_f64.cos()), epsilon = 1e-12);
        assert!(grads.wrt(&inner).is_none());
        assert!(grads.wrt(&c).is_none());
        assert!(grads.node(&c).is_some());
    }

    #[test]
    fn test_grad_by_name() {
        let x = Expr::symbol("x");
        let y = Expr::symbol("y");
        let z = &x * &y;

        let b = Bindings::new().with(&x, 2.0).with(&y, 3.0);
        let grads = gradient(&z, &b).unwrap();
        assert_eq!(grads.by_name("x"), Some(&Value::Scalar(3.0)));
        assert_eq!(grads.by_name("y"), Some(&Value::Scalar(2.0)));
        assert!(grads.by_name("nonexistent").is_none());
    }

    #[test]
    fn test_all_named_grads_sums_same_name() {
        let a = Expr::symbol("x");
        let b = Expr::symbol("x");
        let f = &a * 2.0 + &b * 5.0;

        let bindings = Bindings::new().with(&a, 1.0).with(&b, 1.0);
        let grads = gradient(&f, &bindings).unwrap();
        let named = grads.all_named_grads().unwrap();
        assert_eq!(named["x"], Value::Scalar(7.0));
    }

    #[test]
    fn test_wrt_many_fills_unreachable_with_zero() {
        let x = Expr::symbol("x");
        let unused = Expr::symbol("u");
        let f = x.exp();

        let b = Bindings::new().with(&x, 0.0);
        let grads = gradient(&f, &b).unwrap();
        assert_eq!(
            grads.wrt_many(&[x.clone(), unused]),
            vec![Value::Scalar(1.0), Value::Scalar(0.0)]
        );
    }

    #[test]
    fn test_gradient_with_strict_domain() {
        use crate::error::Error;

        let x = Expr::symbol("x");
        let f = x.log() * 2.0;

        let b = Bindings::new().with(&x, vec![1.0, -1.0]);
        let err = gradient_with(&f, &b, EvalConfig::strict()).unwrap_err();
        assert!(matches!(err, Error::Domain { op: "log", .. }));

        // The default policy lets the NaN through to the gradient.
        let grads = gradient(&f, &b).unwrap();
        assert_eq!(grads.wrt(&x), Some(&Value::batch(vec![2.0, -2.0])));

        let b = Bindings::new().with(&x, 2.0);
        let grads = gradient_with(&f, &b, EvalConfig::strict()).unwrap();
        assert_abs_diff_eq!(*grads.wrt(&x).unwrap(), Value::Scalar(1.0));
    }
}
