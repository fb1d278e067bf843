//! Numeric values flowing through evaluation: scalars or 1-d batches.
//!
//! Every operation is applied elementwise. A scalar broadcasts against a batch;
//! two batches must have the same length.

use std::collections::HashMap;
use std::fmt;

use approx::{AbsDiffEq, RelativeEq};
use ndarray::Array1;

use crate::error::{Error, Result};
use crate::node::{Expr, NodeId};

/// A scalar or an elementwise batch of scalars.
#[derive(Debug, Clone)]
pub enum Value {
    Scalar(f64),
    Batch(Array1<f64>),
}

impl Value {
    /// Create a batch value from a vector of scalars.
    pub fn batch(values: Vec<f64>) -> Self {
        Value::Batch(Array1::from_vec(values))
    }

    /// Batch length, or `None` for a scalar.
    pub fn batch_len(&self) -> Option<usize> {
        match self {
            Value::Scalar(_) => None,
            Value::Batch(a) => Some(a.len()),
        }
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Value::Scalar(_))
    }

    /// The scalar held by this value. A batch of length one also counts.
    pub fn as_scalar(&self) -> Option<f64> {
        match self {
            Value::Scalar(v) => Some(*v),
            Value::Batch(a) if a.len() == 1 => Some(a[0]),
            Value::Batch(_) => None,
        }
    }

    /// Copy the elements out. A scalar yields a single element.
    pub fn to_vec(&self) -> Vec<f64> {
        match self {
            Value::Scalar(v) => vec![*v],
            Value::Batch(a) => a.to_vec(),
        }
    }

    /// A value with the same shape as `self`, every element set to `fill`.
    pub fn full_like(&self, fill: f64) -> Value {
        match self {
            Value::Scalar(_) => Value::Scalar(fill),
            Value::Batch(a) => Value::Batch(Array1::from_elem(a.len(), fill)),
        }
    }

    /// Apply a unary function elementwise.
    pub fn map<F>(&self, f: F) -> Value
    where
        F: Fn(f64) -> f64,
    {
        match self {
            Value::Scalar(v) => Value::Scalar(f(*v)),
            Value::Batch(a) => Value::Batch(a.mapv(f)),
        }
    }

    /// Apply a binary function elementwise, broadcasting scalars.
    pub fn zip_with<F>(&self, other: &Value, f: F) -> Result<Value>
    where
        F: Fn(f64, f64) -> f64,
    {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => Ok(Value::Scalar(f(*a, *b))),
            (Value::Scalar(a), Value::Batch(b)) => Ok(Value::Batch(b.mapv(|y| f(*a, y)))),
            (Value::Batch(a), Value::Scalar(b)) => Ok(Value::Batch(a.mapv(|x| f(x, *b)))),
            (Value::Batch(a), Value::Batch(b)) => {
                if a.len() != b.len() {
                    return Err(Error::ShapeMismatch {
                        expected: a.len(),
                        actual: b.len(),
                    });
                }
                Ok(Value::Batch(ndarray::Zip::from(a).and(b).map_collect(|&x, &y| f(x, y))))
            }
        }
    }

    /// True if any element satisfies `pred`.
    pub fn any<P>(&self, pred: P) -> bool
    where
        P: Fn(f64) -> bool,
    {
        match self {
            Value::Scalar(v) => pred(*v),
            Value::Batch(a) => a.iter().any(|&v| pred(v)),
        }
    }

    /// Compare elementwise. A scalar is compared against every element of a
    /// batch, as it would be broadcast by [`Value::zip_with`].
    fn all_pairs<F>(&self, other: &Value, eq: F) -> bool
    where
        F: Fn(f64, f64) -> bool,
    {
        match (self, other) {
            (Value::Scalar(a), Value::Scalar(b)) => eq(*a, *b),
            (Value::Scalar(a), Value::Batch(b)) => b.iter().all(|&y| eq(*a, y)),
            (Value::Batch(a), Value::Scalar(b)) => a.iter().all(|&x| eq(x, *b)),
            (Value::Batch(a), Value::Batch(b)) => {
                a.len() == b.len() && a.iter().zip(b.iter()).all(|(&x, &y)| eq(x, y))
            }
        }
    }
}

/// Elementwise equality with scalar broadcasting: `Scalar(0.0)` equals a batch
/// of zeros of any length.
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        self.all_pairs(other, |a, b| a == b)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Scalar(v) => write!(f, "{}", v),
            Value::Batch(a) => write!(f, "{}", a),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Scalar(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Scalar(f64::from(v))
    }
}

impl From<Vec<f64>> for Value {
    fn from(v: Vec<f64>) -> Self {
        Value::batch(v)
    }
}

impl From<&[f64]> for Value {
    fn from(v: &[f64]) -> Self {
        Value::batch(v.to_vec())
    }
}

impl<const N: usize> From<[f64; N]> for Value {
    fn from(v: [f64; N]) -> Self {
        Value::batch(v.to_vec())
    }
}

impl From<Array1<f64>> for Value {
    fn from(v: Array1<f64>) -> Self {
        Value::Batch(v)
    }
}

impl AbsDiffEq for Value {
    type Epsilon = f64;

    fn default_epsilon() -> f64 {
        f64::default_epsilon()
    }

    fn abs_diff_eq(&self, other: &Self, epsilon: f64) -> bool {
        self.all_pairs(other, |a, b| a.abs_diff_eq(&b, epsilon))
    }
}

impl RelativeEq for Value {
    fn default_max_relative() -> f64 {
        f64::default_max_relative()
    }

    fn relative_eq(&self, other: &Self, epsilon: f64, max_relative: f64) -> bool {
        self.all_pairs(other, |a, b| a.relative_eq(&b, epsilon, max_relative))
    }
}

/// Values bound to symbols for one evaluation, keyed by node identity.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    values: HashMap<NodeId, Value>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `symbol` to `value`, replacing any earlier binding.
    pub fn bind(&mut self, symbol: &Expr, value: impl Into<Value>) -> &mut Self {
        self.values.insert(symbol.id(), value.into());
        self
    }

    /// Builder-style variant of [`Bindings::bind`].
    pub fn with(mut self, symbol: &Expr, value: impl Into<Value>) -> Self {
        self.bind(symbol, value);
        self
    }

    pub fn get(&self, symbol: &Expr) -> Option<&Value> {
        self.values.get(&symbol.id())
    }

    pub(crate) fn get_id(&self, id: NodeId) -> Option<&Value> {
        self.values.get(&id)
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl<V: Into<Value>> FromIterator<(Expr, V)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (Expr, V)>>(iter: I) -> Self {
        let mut bindings = Bindings::new();
        for (symbol, value) in iter {
            bindings.bind(&symbol, value);
        }
        bindings
    }
}

impl<'a, V: Into<Value>> FromIterator<(&'a Expr, V)> for Bindings {
    fn from_iter<I: IntoIterator<Item = (&'a Expr, V)>>(iter: I) -> Self {
        let mut bindings = Bindings::new();
        for (symbol, value) in iter {
            bindings.bind(symbol, value);
        }
        bindings
    }
}
