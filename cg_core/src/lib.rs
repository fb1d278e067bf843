//! # cg_core - Symbolic Expression Graphs with Reverse-mode Differentiation
//!
//! This crate builds expression graphs from algebraic operations, evaluates them
//! numerically (on scalars or elementwise over batches), and differentiates them
//! in reverse mode, either numerically or symbolically. Symbolic derivatives are
//! themselves expression graphs, so they can be evaluated, simplified, or
//! differentiated again.
//!
//! ## Quick Start
//!
//! ```
//! use cg_core::{symbol, value, gradient, Bindings, Value};
//!
//! // Symbols are the free variables of an expression
//! let x = symbol("x");
//! let y = symbol("y");
//!
//! // Build an expression: f = (x*y + 1) * x*y, with x*y shared
//! let xy = &x * &y;
//! let f = (&xy + 1.0) * &xy;
//!
//! let b = Bindings::new().with(&x, 2.0).with(&y, 3.0);
//! assert_eq!(value(&f, &b).unwrap(), Value::Scalar(42.0));
//!
//! // Reverse-mode gradients
//! let grads = gradient(&f, &b).unwrap();
//! assert_eq!(grads.wrt(&x), Some(&Value::Scalar(39.0)));
//! assert_eq!(grads.wrt(&y), Some(&Value::Scalar(26.0)));
//! ```
//!
//! ## Symbolic derivatives
//!
//! ```
//! use cg_core::{symbol, symbolic_gradient, simplify, is_const};
//!
//! let x = symbol("x");
//! let f = &x + &x + &x + &x + &x;
//!
//! let d = symbolic_gradient(&f).unwrap();
//! let dx = simplify(&d[&x]);
//! assert!(is_const(&dx, 5.0));
//! ```
//!
//! ## Supported Operations
//!
//! | Category | Operations |
//! |----------|------------|
//! | Arithmetic | `+`, `-`, `*`, `/`, unary `-`, [`sum`] |
//! | Power | [`Expr::pow`], [`Expr::powf`] |
//! | Transcendental | [`exp`], [`log`], [`sqrt`], [`sin`], [`cos`] |
//! | Piecewise | [`min`], [`max`] (symbolic partials are NaN where the operands tie) |
//!
//! ## Architecture
//!
//! - **[`Expr`]**: Reference-counted handle to an immutable graph node. Cloning is O(1)
//!   and shares the node; identity is the node's [`NodeId`].
//! - **[`postorder`]**: Lazy dependency-ordered traversal, each shared node once.
//! - **[`value`]**: Forward evaluation, caching each node's value for the call.
//! - **[`gradient`]** / **[`symbolic_gradient`]**: Reverse-mode differentiation.
//! - **[`simplify`]**: Identity, annihilator and constant-folding rewrites.
//! - **[`Function`]**: An expression with a fixed positional parameter order.
//!
//! All per-call state (visited sets, value caches, adjoints, memo tables) is local
//! to the call, so graphs can be shared read-only across threads.

mod backward;
mod error;
mod eval;
mod finite_diff;
mod function;
mod node;
mod ops;
mod postorder;
mod simplify;
mod symbolic;
mod value;

pub use backward::{gradient, gradient_with, Gradients};
pub use error::{Error, Result};
pub use eval::{value, value_with, DomainPolicy, EvalConfig};
pub use finite_diff::{finite_diff_grad, max_grad_error};
pub use function::{Evaluation, Function, FunctionOptions};
pub use node::{Expr, Node, NodeId, Op};
pub use ops::{forward, local_gradient_exprs, local_gradients};
pub use postorder::{postorder, Postorder};
pub use simplify::{complexity, is_const, simplify};
pub use symbolic::{symbolic_gradient, SymbolicGradients};
pub use value::{Bindings, Value};

/// Create a new symbol with the given name.
///
/// Each call creates a symbol with a unique identity, even if the name is the same.
pub fn symbol(name: &str) -> Expr {
    Expr::symbol(name)
}

/// Create a constant expression.
pub fn constant(value: f64) -> Expr {
    Expr::constant(value)
}

/// Natural logarithm.
pub fn log(x: impl Into<Expr>) -> Expr {
    x.into().log()
}

pub fn exp(x: impl Into<Expr>) -> Expr {
    x.into().exp()
}

pub fn sqrt(x: impl Into<Expr>) -> Expr {
    x.into().sqrt()
}

pub fn sin(x: impl Into<Expr>) -> Expr {
    x.into().sin()
}

pub fn cos(x: impl Into<Expr>) -> Expr {
    x.into().cos()
}

/// Sum of one or more operands. Panics on an empty sequence; see [`Expr::try_sum`].
pub fn sum<I, E>(terms: I) -> Expr
where
    I: IntoIterator<Item = E>,
    E: Into<Expr>,
{
    Expr::sum(terms)
}

/// Elementwise minimum.
pub fn min(a: impl Into<Expr>, b: impl Into<Expr>) -> Expr {
    a.into().min(b)
}

/// Elementwise maximum.
pub fn max(a: impl Into<Expr>, b: impl Into<Expr>) -> Expr {
    a.into().max(b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    fn at(pairs: &[(&Expr, f64)]) -> Bindings {
        pairs.iter().map(|(e, v)| (*e, *v)).collect()
    }

    fn scalar(v: &Value) -> f64 {
        v.as_scalar().unwrap()
    }

    #[test]
    fn test_basic_arithmetic() {
        let x = symbol("x");
        let y = symbol("y");
        let b = at(&[(&x, 2.0), (&y, 3.0)]);

        assert_abs_diff_eq!(scalar(&value(&(&x + &y), &b).unwrap()), 5.0);
        assert_abs_diff_eq!(scalar(&value(&(&x - &y), &b).unwrap()), -1.0);
        assert_abs_diff_eq!(scalar(&value(&(&x * &y), &b).unwrap()), 6.0);
        assert_abs_diff_eq!(scalar(&value(&(&x / &y), &b).unwrap()), 2.0 / 3.0);
        assert_abs_diff_eq!(scalar(&value(&-&x, &b).unwrap()), -2.0);
        assert_abs_diff_eq!(scalar(&value(&x.pow(&y), &b).unwrap()), 8.0);
    }

    #[test]
    fn test_transcendental_functions() {
        let x = symbol("x");
        let b = at(&[(&x, 1.0)]);

        assert_abs_diff_eq!(scalar(&value(&exp(&x), &b).unwrap()), 1.0_f64.exp());
        assert_abs_diff_eq!(scalar(&value(&log(&x), &b).unwrap()), 0.0);
        assert_abs_diff_eq!(scalar(&value(&sin(&x), &b).unwrap()), 1.0_f64.sin());
        assert_abs_diff_eq!(scalar(&value(&cos(&x), &b).unwrap()), 1.0_f64.cos());
        assert_abs_diff_eq!(scalar(&value(&sqrt(&x), &b).unwrap()), 1.0);
    }

    #[test]
    fn test_chain_rule() {
        // z = sin(x^2)
        // dz/dx = cos(x^2) * 2x
        let x = symbol("x");
        let z = x.powf(2.0).sin();

        let grads = gradient(&z, &at(&[(&x, 2.0)])).unwrap();
        let expected = 4.0_f64.cos() * 4.0;
        assert_abs_diff_eq!(scalar(grads.wrt(&x).unwrap()), expected, epsilon = 1e-10);
    }

    #[test]
    fn test_diamond_graph() {
        // z = (x + y) * (x - y) = x^2 - y^2
        // dz/dx = 2x, dz/dy = -2y
        let x = symbol("x");
        let y = symbol("y");
        let a = &x + &y;
        let b = &x - &y;
        let z = &a * &b;

        let grads = gradient(&z, &at(&[(&x, 3.0), (&y, 2.0)])).unwrap();
        assert_abs_diff_eq!(scalar(grads.wrt(&x).unwrap()), 6.0);
        assert_abs_diff_eq!(scalar(grads.wrt(&y).unwrap()), -4.0);
    }

    #[test]
    fn test_min_max_free_functions() {
        let x = symbol("x");
        let b = at(&[(&x, 2.0)]);
        assert_abs_diff_eq!(scalar(&value(&min(&x, 1.0), &b).unwrap()), 1.0);
        assert_abs_diff_eq!(scalar(&value(&max(&x, 1.0), &b).unwrap()), 2.0);
        assert_abs_diff_eq!(scalar(&value(&sum([&x, &x]), &b).unwrap()), 4.0);
    }

    #[test]
    fn test_finite_diff_random_graph() {
        use rand::Rng;
        let mut rng = rand::thread_rng();

        let x_val: f64 = rng.gen_range(-2.0..2.0);
        let y_val: f64 = rng.gen_range(0.5..2.0); // positive for log

        let x = symbol("x");
        let y = symbol("y");

        // exp(x) * log(y) + sin(x*y)
        let z = exp(&x) * log(&y) + sin(&x * &y);
        let b = at(&[(&x, x_val), (&y, y_val)]);

        let grads = gradient(&z, &b).unwrap();
        let ad = grads.wrt_many(&[x.clone(), y.clone()]);
        let fd = finite_diff_grad(&z, &b, &[x, y], 1e-7).unwrap();

        let err = max_grad_error(&ad, &fd).unwrap();
        assert!(err < 1e-5, "autodiff={:?}, fd={:?}", ad, fd);
    }
}
