//! Per-operation definitions: forward function and local partial derivatives.
//!
//! Each operation knows how to compute its output from its operands, and how to
//! compute d(output)/d(operand_i) both as numbers (for numeric reverse mode) and
//! as new expressions (for symbolic reverse mode). The two forms must agree.

use crate::error::{Error, Result};
use crate::node::{Expr, Op};
use crate::value::Value;

fn unsupported(op: &Op, operands: usize) -> Error {
    Error::UnsupportedOperation {
        op: format!("{} with {} operand(s)", op.name(), operands),
    }
}

/// Reject operand counts the operation does not accept.
fn check_arity(op: &Op, operands: usize) -> Result<()> {
    let ok = match op.arity() {
        _ if op.is_leaf() => false,
        Some(n) => n == operands,
        None => operands > 0,
    };
    if ok {
        Ok(())
    } else {
        Err(unsupported(op, operands))
    }
}

/// Compute the output of `op` applied elementwise to `args`.
pub fn forward(op: &Op, args: &[&Value]) -> Result<Value> {
    check_arity(op, args.len())?;

    match op {
        Op::Add | Op::Sum => {
            let mut acc = args[0].clone();
            for arg in &args[1..] {
                acc = acc.zip_with(arg, |a, b| a + b)?;
            }
            Ok(acc)
        }
        Op::Sub => args[0].zip_with(args[1], |a, b| a - b),
        Op::Mul => args[0].zip_with(args[1], |a, b| a * b),
        Op::Div => args[0].zip_with(args[1], |a, b| a / b),
        Op::Pow => args[0].zip_with(args[1], f64::powf),
        Op::Min => args[0].zip_with(args[1], f64::min),
        Op::Max => args[0].zip_with(args[1], f64::max),
        Op::Neg => Ok(args[0].map(|a| -a)),
        Op::Log => Ok(args[0].map(f64::ln)),
        Op::Exp => Ok(args[0].map(f64::exp)),
        Op::Sqrt => Ok(args[0].map(f64::sqrt)),
        Op::Sin => Ok(args[0].map(f64::sin)),
        Op::Cos => Ok(args[0].map(f64::cos)),
        Op::Const(_) | Op::Symbol { .. } => Err(unsupported(op, args.len())),
    }
}

/// Compute local gradients d(output)/d(args[i]) at the given operand values.
///
/// `output` is the already-computed forward value of the node, reused where
/// the derivative is expressed in terms of it (exp, sqrt, pow).
pub fn local_gradients(op: &Op, args: &[&Value], output: &Value) -> Result<Vec<Value>> {
    check_arity(op, args.len())?;

    let grads = match op {
        Op::Add | Op::Sum => {
            // z = a + b + ...
            // dz/da = 1 for every operand
            vec![Value::Scalar(1.0); args.len()]
        }

        Op::Sub => {
            // z = a - b
            // dz/da = 1, dz/db = -1
            vec![Value::Scalar(1.0), Value::Scalar(-1.0)]
        }

        Op::Mul => {
            // z = a * b
            // dz/da = b, dz/db = a
            vec![args[1].clone(), args[0].clone()]
        }

        Op::Div => {
            // z = a / b
            // dz/da = 1/b, dz/db = -a/b^2
            vec![
                args[1].map(|b| 1.0 / b),
                args[0].zip_with(args[1], |a, b| -a / (b * b))?,
            ]
        }

        Op::Neg => vec![Value::Scalar(-1.0)],

        Op::Pow => {
            // z = a^b
            // dz/da = b * a^(b-1)
            // dz/db = a^b * ln(a), only defined for a > 0
            vec![
                args[0].zip_with(args[1], |a, b| b * a.powf(b - 1.0))?,
                output.zip_with(args[0], |z, a| z * a.ln())?,
            ]
        }

        Op::Log => vec![args[0].map(|a| 1.0 / a)],

        // d(exp(a))/da = exp(a), which is the output
        Op::Exp => vec![output.clone()],

        // d(sqrt(a))/da = 1 / (2 * sqrt(a))
        Op::Sqrt => vec![output.map(|z| 0.5 / z)],

        Op::Sin => vec![args[0].map(f64::cos)],

        Op::Cos => vec![args[0].map(|a| -a.sin())],

        Op::Max => {
            // Subgradient: the larger operand gets 1, ties go to the left.
            vec![
                args[0].zip_with(args[1], |a, b| if a >= b { 1.0 } else { 0.0 })?,
                args[0].zip_with(args[1], |a, b| if b > a { 1.0 } else { 0.0 })?,
            ]
        }

        Op::Min => {
            // Subgradient: the smaller operand gets 1, ties go to the left.
            vec![
                args[0].zip_with(args[1], |a, b| if a <= b { 1.0 } else { 0.0 })?,
                args[0].zip_with(args[1], |a, b| if b < a { 1.0 } else { 0.0 })?,
            ]
        }

        Op::Const(_) | Op::Symbol { .. } => return Err(unsupported(op, args.len())),
    };

    Ok(grads)
}

/// Build expressions for d(node)/d(child_i) in terms of the operand nodes.
///
/// The returned expressions share structure with `node`: operands are reused,
/// never copied, and `node` itself appears where the derivative refers to the
/// output (exp, sqrt, pow, min, max).
///
/// Min and max have no comparison opcode to select an operand with, so their
/// partials are `(m - b) / (a - b)` and `(m - a) / (b - a)`. These are exactly 1
/// or 0 where the operands differ but NaN where they are equal, unlike
/// [`local_gradients`], which credits the left operand at a tie. A NaN partial
/// spreads into every derivative that sums over it, e.g. `max(x, 0)` at `x = 0`.
pub fn local_gradient_exprs(node: &Expr) -> Result<Vec<Expr>> {
    let op = node.op();
    let c = node.children();
    check_arity(op, c.len())?;

    let grads = match op {
        Op::Add | Op::Sum => c.iter().map(|_| Expr::constant(1.0)).collect(),

        Op::Sub => vec![Expr::constant(1.0), Expr::constant(-1.0)],

        Op::Mul => vec![c[1].clone(), c[0].clone()],

        Op::Div => {
            // 1/b, -a/(b*b)
            vec![1.0 / &c[1], -&c[0] / (&c[1] * &c[1])]
        }

        Op::Neg => vec![Expr::constant(-1.0)],

        Op::Pow => {
            // b * a^(b-1), a^b * ln(a)
            let b_minus_one = &c[1] - 1.0;
            vec![&c[1] * c[0].pow(b_minus_one), node * c[0].log()]
        }

        Op::Log => vec![1.0 / &c[0]],

        Op::Exp => vec![node.clone()],

        Op::Sqrt => vec![1.0 / (2.0 * node)],

        Op::Sin => vec![c[0].cos()],

        Op::Cos => vec![-c[0].sin()],

        Op::Max | Op::Min => {
            // Value-comparison rule written with existing operations:
            // (m - b) / (a - b) is 1 where m == a, 0 where m == b, and NaN at ties.
            vec![
                (node - &c[1]) / (&c[0] - &c[1]),
                (node - &c[0]) / (&c[1] - &c[0]),
            ]
        }

        Op::Const(_) | Op::Symbol { .. } => return Err(unsupported(op, c.len())),
    };

    Ok(grads)
}
