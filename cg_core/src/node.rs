//! Core data structures for the expression graph.
//!
//! The graph is built from `Expr` handles, which are reference-counted pointers
//! to immutable `Node` structures. Cloning a handle shares the node, so the same
//! subexpression may appear under several parents: the graph is a DAG, not a tree.
//!
//! Node identity is a `NodeId` assigned at construction. Two handles refer to the
//! same node only if their ids match; structurally equal nodes built separately
//! are distinct.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::postorder::Postorder;

/// Global counter for generating unique node IDs.
/// Uses AtomicU64 so graphs can be built from several threads.
static NODE_ID_COUNTER: AtomicU64 = AtomicU64::new(0);

fn next_node_id() -> u64 {
    NODE_ID_COUNTER.fetch_add(1, Ordering::Relaxed)
}

/// Unique identifier for a node in the expression graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u64);

/// What a node computes.
#[derive(Debug, Clone)]
pub enum Op {
    /// A literal value.
    Const(f64),
    /// A free variable, looked up in the bindings at evaluation time.
    Symbol { name: String },
    /// Sum of all children (binary when built with `+`).
    Add,
    /// children[0] - children[1]
    Sub,
    /// children[0] * children[1]
    Mul,
    /// children[0] / children[1]
    Div,
    /// -children[0]
    Neg,
    /// children[0] ^ children[1]
    Pow,
    /// Natural logarithm.
    Log,
    Exp,
    /// N-ary sum, one or more children.
    Sum,
    Sqrt,
    /// Elementwise minimum of two children.
    Min,
    /// Elementwise maximum of two children.
    Max,
    Sin,
    Cos,
}

impl Op {
    /// Short lowercase name, used in error messages and rendering.
    pub fn name(&self) -> &'static str {
        match self {
            Op::Const(_) => "const",
            Op::Symbol { .. } => "symbol",
            Op::Add => "add",
            Op::Sub => "sub",
            Op::Mul => "mul",
            Op::Div => "div",
            Op::Neg => "neg",
            Op::Pow => "pow",
            Op::Log => "log",
            Op::Exp => "exp",
            Op::Sum => "sum",
            Op::Sqrt => "sqrt",
            Op::Min => "min",
            Op::Max => "max",
            Op::Sin => "sin",
            Op::Cos => "cos",
        }
    }

    /// Number of operands, or `None` for the n-ary operations.
    pub fn arity(&self) -> Option<usize> {
        match self {
            Op::Const(_) | Op::Symbol { .. } => Some(0),
            Op::Add | Op::Sum => None,
            Op::Neg | Op::Log | Op::Exp | Op::Sqrt | Op::Sin | Op::Cos => Some(1),
            Op::Sub | Op::Mul | Op::Div | Op::Pow | Op::Min | Op::Max => Some(2),
        }
    }

    pub fn is_leaf(&self) -> bool {
        matches!(self, Op::Const(_) | Op::Symbol { .. })
    }
}

/// Internal node structure holding the operation and its operands.
#[derive(Debug)]
pub struct Node {
    pub id: NodeId,
    pub op: Op,
    /// Operands, in order. Shared with any other parent that uses them.
    pub children: Vec<Expr>,
}

impl Drop for Node {
    // Unlink uniquely owned descendants onto a local stack so a long chain
    // is released in a loop instead of one stack frame per level.
    fn drop(&mut self) {
        let mut pending = std::mem::take(&mut self.children);
        while let Some(child) = pending.pop() {
            if let Some(mut node) = Arc::into_inner(child.0) {
                pending.append(&mut node.children);
            }
        }
    }
}

/// A handle to a node in the expression graph.
///
/// Cloning is O(1). Equality and hashing go by node identity, so an `Expr` can
/// key a map directly.
#[derive(Debug, Clone)]
pub struct Expr(pub(crate) Arc<Node>);

impl Expr {
    /// Create a named symbol. Every call creates a distinct symbol, even if
    /// the name is reused.
    pub fn symbol(name: &str) -> Self {
        Expr::new_op(
            Op::Symbol {
                name: name.to_string(),
            },
            vec![],
        )
    }

    /// Create a constant.
    pub fn constant(value: f64) -> Self {
        Expr::new_op(Op::Const(value), vec![])
    }

    /// Create a node with the given operation and children. Nothing is evaluated.
    pub(crate) fn new_op(op: Op, children: Vec<Expr>) -> Self {
        Expr(Arc::new(Node {
            id: NodeId(next_node_id()),
            op,
            children,
        }))
    }

    pub fn id(&self) -> NodeId {
        self.0.id
    }

    pub fn op(&self) -> &Op {
        &self.0.op
    }

    pub fn children(&self) -> &[Expr] {
        &self.0.children
    }

    /// True for constants and symbols.
    pub fn is_leaf(&self) -> bool {
        self.0.op.is_leaf()
    }

    pub fn is_symbol(&self) -> bool {
        matches!(self.0.op, Op::Symbol { .. })
    }

    /// Get the symbol name, if this is a symbol.
    pub fn symbol_name(&self) -> Option<&str> {
        match &self.0.op {
            Op::Symbol { name } => Some(name),
            _ => None,
        }
    }

    /// Get the literal, if this is a constant.
    pub fn const_value(&self) -> Option<f64> {
        match self.0.op {
            Op::Const(v) => Some(v),
            _ => None,
        }
    }

    /// Iterate over every node reachable from `self`, children before parents.
    pub fn postorder(&self) -> Postorder {
        Postorder::new(self)
    }

    // === Unary operations ===

    pub fn exp(&self) -> Expr {
        Expr::new_op(Op::Exp, vec![self.clone()])
    }

    /// Natural logarithm: ln(self)
    pub fn log(&self) -> Expr {
        Expr::new_op(Op::Log, vec![self.clone()])
    }

    pub fn sqrt(&self) -> Expr {
        Expr::new_op(Op::Sqrt, vec![self.clone()])
    }

    pub fn sin(&self) -> Expr {
        Expr::new_op(Op::Sin, vec![self.clone()])
    }

    pub fn cos(&self) -> Expr {
        Expr::new_op(Op::Cos, vec![self.clone()])
    }

    // === Binary operations ===

    /// Raise to a power: self ^ exponent. The exponent may be an expression.
    pub fn pow(&self, exponent: impl Into<Expr>) -> Expr {
        Expr::new_op(Op::Pow, vec![self.clone(), exponent.into()])
    }

    /// Raise to a constant power.
    pub fn powf(&self, exponent: f64) -> Expr {
        self.pow(Expr::constant(exponent))
    }

    /// Elementwise minimum.
    pub fn min(&self, other: impl Into<Expr>) -> Expr {
        Expr::new_op(Op::Min, vec![self.clone(), other.into()])
    }

    /// Elementwise maximum.
    pub fn max(&self, other: impl Into<Expr>) -> Expr {
        Expr::new_op(Op::Max, vec![self.clone(), other.into()])
    }

    // === N-ary operations ===

    /// Sum of one or more operands. Repeated operands stay as separate children.
    pub fn try_sum<I, E>(terms: I) -> Result<Expr>
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        let children: Vec<Expr> = terms.into_iter().map(Into::into).collect();
        if children.is_empty() {
            return Err(Error::EmptySum);
        }
        Ok(Expr::new_op(Op::Sum, children))
    }

    /// Like [`Expr::try_sum`], panicking on an empty sequence.
    pub fn sum<I, E>(terms: I) -> Expr
    where
        I: IntoIterator<Item = E>,
        E: Into<Expr>,
    {
        let children: Vec<Expr> = terms.into_iter().map(Into::into).collect();
        assert!(!children.is_empty(), "sum requires at least one operand");
        Expr::new_op(Op::Sum, children)
    }
}

impl PartialEq for Expr {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl Eq for Expr {}

impl Hash for Expr {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id().hash(state);
    }
}

impl From<f64> for Expr {
    fn from(value: f64) -> Self {
        Expr::constant(value)
    }
}

impl From<i32> for Expr {
    fn from(value: i32) -> Self {
        Expr::constant(f64::from(value))
    }
}

impl From<&Expr> for Expr {
    fn from(expr: &Expr) -> Self {
        expr.clone()
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let c = self.children();
        let infix = |f: &mut fmt::Formatter<'_>, sym: &str| write!(f, "({} {} {})", c[0], sym, c[1]);
        match self.op() {
            Op::Const(v) => write!(f, "{}", v),
            Op::Symbol { name } => write!(f, "{}", name),
            Op::Neg => write!(f, "-{}", c[0]),
            Op::Sub => infix(f, "-"),
            Op::Mul => infix(f, "*"),
            Op::Div => infix(f, "/"),
            Op::Pow => infix(f, "^"),
            Op::Add if c.len() == 2 => infix(f, "+"),
            op => {
                write!(f, "{}(", op.name())?;
                for (i, child) in c.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", child)?;
                }
                write!(f, ")")
            }
        }
    }
}

// === Operator overloads ===
//
// Literal operands on either side become `Const` children; nothing is folded.

impl std::ops::Neg for &Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::new_op(Op::Neg, vec![self.clone()])
    }
}

impl std::ops::Neg for Expr {
    type Output = Expr;

    fn neg(self) -> Expr {
        Expr::new_op(Op::Neg, vec![self])
    }
}

macro_rules! impl_binary_op {
    ($trait:ident, $method:ident, $op:expr) => {
        impl std::ops::$trait<Expr> for Expr {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::new_op($op, vec![self, rhs])
            }
        }

        impl std::ops::$trait<&Expr> for Expr {
            type Output = Expr;

            fn $method(self, rhs: &Expr) -> Expr {
                Expr::new_op($op, vec![self, rhs.clone()])
            }
        }

        impl std::ops::$trait<Expr> for &Expr {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::new_op($op, vec![self.clone(), rhs])
            }
        }

        impl std::ops::$trait<&Expr> for &Expr {
            type Output = Expr;

            fn $method(self, rhs: &Expr) -> Expr {
                Expr::new_op($op, vec![self.clone(), rhs.clone()])
            }
        }

        impl std::ops::$trait<f64> for Expr {
            type Output = Expr;

            fn $method(self, rhs: f64) -> Expr {
                Expr::new_op($op, vec![self, Expr::constant(rhs)])
            }
        }

        impl std::ops::$trait<f64> for &Expr {
            type Output = Expr;

            fn $method(self, rhs: f64) -> Expr {
                Expr::new_op($op, vec![self.clone(), Expr::constant(rhs)])
            }
        }

        impl std::ops::$trait<Expr> for f64 {
            type Output = Expr;

            fn $method(self, rhs: Expr) -> Expr {
                Expr::new_op($op, vec![Expr::constant(self), rhs])
            }
        }

        impl std::ops::$trait<&Expr> for f64 {
            type Output = Expr;

            fn $method(self, rhs: &Expr) -> Expr {
                Expr::new_op($op, vec![Expr::constant(self), rhs.clone()])
            }
        }
    };
}

impl_binary_op!(Add, add, Op::Add);
impl_binary_op!(Sub, sub, Op::Sub);
impl_binary_op!(Mul, mul, Op::Mul);
impl_binary_op!(Div, div, Op::Div);
