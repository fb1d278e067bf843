//! Forward evaluation of an expression graph.

use std::collections::HashMap;

use log::{debug, trace};

use crate::error::{Error, Result};
use crate::node::{Expr, NodeId, Op};
use crate::ops;
use crate::value::{Bindings, Value};

/// How invalid elementwise results are handled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DomainPolicy {
    /// IEEE-754 behaviour: NaN and infinities flow through unchanged.
    #[default]
    Propagate,
    /// Fail with [`Error::Domain`] when an operation produces NaN from non-NaN
    /// operands, or an infinity from finite operands.
    Strict,
}

/// Options for evaluation and numeric differentiation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EvalConfig {
    pub domain: DomainPolicy,
}

impl EvalConfig {
    /// Configuration that rejects domain errors.
    pub fn strict() -> Self {
        EvalConfig {
            domain: DomainPolicy::Strict,
        }
    }
}

/// Values of every node reachable from a root, in postorder.
#[derive(Debug)]
pub(crate) struct ForwardPass {
    pub order: Vec<Expr>,
    pub values: HashMap<NodeId, Value>,
}

impl ForwardPass {
    pub fn value_of(&self, expr: &Expr) -> &Value {
        &self.values[&expr.id()]
    }
}

/// Evaluate `expr` at `bindings` with the default configuration.
pub fn value(expr: &Expr, bindings: &Bindings) -> Result<Value> {
    value_with(expr, bindings, EvalConfig::default())
}

/// Evaluate `expr` at `bindings`.
///
/// Each node is computed once, even when shared by several parents.
pub fn value_with(expr: &Expr, bindings: &Bindings, config: EvalConfig) -> Result<Value> {
    let pass = forward_pass(expr, bindings, config)?;
    Ok(pass.value_of(expr).clone())
}

pub(crate) fn forward_pass(
    expr: &Expr,
    bindings: &Bindings,
    config: EvalConfig,
) -> Result<ForwardPass> {
    let order: Vec<Expr> = expr.postorder().collect();
    debug!("evaluating graph with {} nodes", order.len());

    check_batch_lengths(&order, bindings)?;

    let mut values: HashMap<NodeId, Value> = HashMap::with_capacity(order.len());
    for node in &order {
        let out = match node.op() {
            Op::Const(v) => Value::Scalar(*v),
            Op::Symbol { name } => bindings
                .get_id(node.id())
                .cloned()
                .ok_or_else(|| Error::UnboundSymbol { name: name.clone() })?,
            op => {
                let args: Vec<&Value> = node.children().iter().map(|c| &values[&c.id()]).collect();
                let out = ops::forward(op, &args)?;
                if config.domain == DomainPolicy::Strict {
                    check_domain(op, &args, &out)?;
                }
                out
            }
        };
        trace!("node {:?} ({}) evaluated", node.id(), node.op().name());
        values.insert(node.id(), out);
    }

    Ok(ForwardPass { order, values })
}

/// All bound batches reachable from the root must share one length.
fn check_batch_lengths(order: &[Expr], bindings: &Bindings) -> Result<()> {
    let mut expected: Option<usize> = None;
    for node in order.iter().filter(|n| n.is_symbol()) {
        let Some(len) = bindings.get(node).and_then(Value::batch_len) else {
            continue;
        };
        match expected {
            None => expected = Some(len),
            Some(e) if e != len => {
                return Err(Error::ShapeMismatch {
                    expected: e,
                    actual: len,
                })
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn check_domain(op: &Op, args: &[&Value], out: &Value) -> Result<()> {
    let nan_in = args.iter().any(|a| a.any(f64::is_nan));
    if !nan_in && out.any(f64::is_nan) {
        return Err(Error::Domain {
            op: op.name(),
            detail: "result is NaN".to_string(),
        });
    }

    let finite_in = args.iter().all(|a| !a.any(|v| !v.is_finite()));
    if finite_in && out.any(f64::is_infinite) {
        return Err(Error::Domain {
            op: op.name(),
            detail: "result is infinite".to_string(),
        });
    }

    Ok(())
}
