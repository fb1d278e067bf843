//! Finite difference utilities for gradient verification.
//!
//! Provides numerical gradient computation for testing reverse-mode correctness.

use crate::error::{Error, Result};
use crate::eval::value;
use crate::node::Expr;
use crate::value::{Bindings, Value};

/// Compute gradients of `expr` using central finite differences.
///
/// # Arguments
/// * `expr` - Expression to differentiate
/// * `bindings` - The point at which to compute gradients; must bind every symbol
/// * `symbols` - Symbols to differentiate with respect to
/// * `eps` - Step size for finite differences (typically 1e-7 to 1e-5)
///
/// # Returns
/// One gradient per symbol, in order. Batched bindings are perturbed elementwise,
/// so each element of a batch gradient is the partial at that element.
///
/// # Example
/// ```
/// use cg_core::{finite_diff_grad, symbol, Bindings};
///
/// // f(x, y) = x^2 + y^2
/// // df/dx = 2x, df/dy = 2y
/// let x = symbol("x");
/// let y = symbol("y");
/// let f = &x * &x + &y * &y;
/// let b = Bindings::new().with(&x, 3.0).with(&y, 4.0);
/// let grads = finite_diff_grad(&f, &b, &[x, y], 1e-7).unwrap();
///
/// assert!((grads[0].as_scalar().unwrap() - 6.0).abs() < 1e-5); // df/dx at x=3
/// assert!((grads[1].as_scalar().unwrap() - 8.0).abs() < 1e-5); // df/dy at y=4
/// ```
pub fn finite_diff_grad(
    expr: &Expr,
    bindings: &Bindings,
    symbols: &[Expr],
    eps: f64,
) -> Result<Vec<Value>> {
    let mut grads = Vec::with_capacity(symbols.len());
    let mut perturbed = bindings.clone();

    for symbol in symbols {
        let base = bindings
            .get(symbol)
            .cloned()
            .ok_or_else(|| Error::UnboundSymbol {
                name: symbol.symbol_name().unwrap_or("<expr>").to_string(),
            })?;

        // Central difference: (f(x + eps) - f(x - eps)) / (2 * eps)
        perturbed.bind(symbol, base.map(|v| v + eps));
        let f_plus = value(expr, &perturbed)?;

        perturbed.bind(symbol, base.map(|v| v - eps));
        let f_minus = value(expr, &perturbed)?;

        perturbed.bind(symbol, base); // restore

        grads.push(f_plus.zip_with(&f_minus, |p, m| (p - m) / (2.0 * eps))?);
    }

    Ok(grads)
}

/// Compute the maximum absolute elementwise difference between two gradient lists.
///
/// Useful for comparing reverse-mode gradients against finite differences.
/// Fails with [`Error::ArityMismatch`] if the lists differ in length.
pub fn max_grad_error(grad1: &[Value], grad2: &[Value]) -> Result<f64> {
    if grad1.len() != grad2.len() {
        return Err(Error::ArityMismatch {
            expected: grad1.len(),
            actual: grad2.len(),
        });
    }
    let mut max_err: f64 = 0.0;
    for (a, b) in grad1.iter().zip(grad2) {
        let diff = a.zip_with(b, |x, y| (x - y).abs())?;
        max_err = diff.to_vec().into_iter().fold(max_err, f64::max);
    }
    Ok(max_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn test_finite_diff_quadratic() {
        // f(x, y) = x^2 + 2*x*y + y^2
        // df/dx = 2x + 2y
        // df/dy = 2x + 2y
        let x = Expr::symbol("x");
        let y = Expr::symbol("y");
        let f = &x * &x + 2.0 * &x * &y + &y * &y;
        let b = Bindings::new().with(&x, 1.0).with(&y, 2.0);
        let grads = finite_diff_grad(&f, &b, &[x, y], 1e-7).unwrap();

        assert_abs_diff_eq!(grads[0], Value::Scalar(6.0), epsilon = 1e-5); // 2*1 + 2*2 = 6
        assert_abs_diff_eq!(grads[1], Value::Scalar(6.0), epsilon = 1e-5);
    }

    #[test]
    fn test_finite_diff_batch() {
        // f(x) = sin(x) * exp(x)
        // df/dx = (cos(x) + sin(x)) * exp(x)
        let x = Expr::symbol("x");
        let f = x.sin() * x.exp();
        let points = [0.5, 1.0, 1.5];
        let b = Bindings::new().with(&x, points.to_vec());
        let grads = finite_diff_grad(&f, &b, &[x], 1e-7).unwrap();

        let expected: Vec<f64> = points.iter().map(|v| (v.cos() + v.sin()) * v.exp()).collect();
        assert_abs_diff_eq!(grads[0], Value::batch(expected), epsilon = 1e-5);
    }

    #[test]
    fn test_unbound_symbol_is_reported() {
        let x = Expr::symbol("x");
        let err = finite_diff_grad(&x.sin(), &Bindings::new(), &[x], 1e-7).unwrap_err();
        assert!(matches!(err, Error::UnboundSymbol { .. }));
    }

    #[test]
    fn test_max_grad_error() {
        let g1 = vec![Value::Scalar(1.0), Value::batch(vec![2.0, 3.0])];
        let g2 = vec![Value::Scalar(1.1), Value::batch(vec![2.0, 2.8])];

        let err = max_grad_error(&g1, &g2).unwrap();
        assert_abs_diff_eq!(err, 0.2, epsilon = 1e-10);
    }

    #[test]
    fn test_max_grad_error_length_mismatch() {
        let g1 = vec![Value::Scalar(1.0), Value::Scalar(2.0)];
        let g2 = vec![Value::Scalar(1.0)];
        assert_eq!(
            max_grad_error(&g1, &g2).unwrap_err(),
            Error::ArityMismatch {
                expected: 2,
                actual: 1
            }
        );
    }
}
