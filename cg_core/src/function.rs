//! A callable wrapper binding an expression to an ordered parameter list.

use std::collections::HashSet;

use crate::backward::gradient_with;
use crate::error::{Error, Result};
use crate::eval::{value_with, EvalConfig};
use crate::node::Expr;
use crate::value::{Bindings, Value};

/// Options controlling what a [`Function`] call computes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FunctionOptions {
    /// Also compute the gradient with respect to each parameter.
    pub compute_gradient: bool,
    pub eval: EvalConfig,
}

/// Result of [`Function::invoke`].
#[derive(Debug, Clone, PartialEq)]
pub struct Evaluation {
    pub value: Value,
    /// One gradient per parameter, in parameter order, when requested.
    pub gradients: Option<Vec<Value>>,
}

/// An expression with a fixed positional parameter order.
///
/// ```
/// use cg_core::{symbol, Function};
///
/// let x = symbol("x");
/// let y = symbol("y");
/// let f = Function::new(&x * &y + 3.0, [x, y]).unwrap();
///
/// let v = f.call([2.0, 1.0]).unwrap();
/// assert_eq!(v.as_scalar(), Some(5.0));
///
/// let (v, g) = f.call_with_gradient([vec![2.0, 3.0], vec![1.0, 2.0]]).unwrap();
/// assert_eq!(v.to_vec(), vec![5.0, 9.0]);
/// assert_eq!(g[0].to_vec(), vec![1.0, 2.0]);
/// assert_eq!(g[1].to_vec(), vec![2.0, 3.0]);
/// ```
#[derive(Debug, Clone)]
pub struct Function {
    expr: Expr,
    params: Vec<Expr>,
    options: FunctionOptions,
}

impl Function {
    /// Bind `expr` to the symbols in `params`; argument `i` of every call is
    /// bound to `params[i]`.
    ///
    /// Fails with [`Error::InvalidParameter`] if a parameter is not a symbol or
    /// the same symbol is listed twice.
    pub fn new<I>(expr: Expr, params: I) -> Result<Self>
    where
        I: IntoIterator<Item = Expr>,
    {
        let params: Vec<Expr> = params.into_iter().collect();
        let mut seen = HashSet::with_capacity(params.len());
        for (index, param) in params.iter().enumerate() {
            let Some(name) = param.symbol_name() else {
                return Err(Error::InvalidParameter {
                    index,
                    reason: format!("{} is not a symbol", param),
                });
            };
            if !seen.insert(param.id()) {
                return Err(Error::InvalidParameter {
                    index,
                    reason: format!("symbol {} is already a parameter", name),
                });
            }
        }

        Ok(Function {
            expr,
            params,
            options: FunctionOptions::default(),
        })
    }

    /// Request gradients from [`Function::invoke`].
    pub fn compute_gradient(mut self, enabled: bool) -> Self {
        self.options.compute_gradient = enabled;
        self
    }

    /// Evaluate with the given configuration.
    pub fn with_config(mut self, config: EvalConfig) -> Self {
        self.options.eval = config;
        self
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }

    pub fn params(&self) -> &[Expr] {
        &self.params
    }

    pub fn options(&self) -> FunctionOptions {
        self.options
    }

    fn bind<I, V>(&self, args: I) -> Result<Bindings>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let values: Vec<Value> = args.into_iter().map(Into::into).collect();
        if values.len() != self.params.len() {
            return Err(Error::ArityMismatch {
                expected: self.params.len(),
                actual: values.len(),
            });
        }
        Ok(self.params.iter().zip(values).collect())
    }

    /// Evaluate, computing gradients if the options ask for them.
    pub fn invoke<I, V>(&self, args: I) -> Result<Evaluation>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let bindings = self.bind(args)?;
        if self.options.compute_gradient {
            let grads = gradient_with(&self.expr, &bindings, self.options.eval)?;
            Ok(Evaluation {
                value: grads.value().clone(),
                gradients: Some(grads.wrt_many(&self.params)),
            })
        } else {
            Ok(Evaluation {
                value: value_with(&self.expr, &bindings, self.options.eval)?,
                gradients: None,
            })
        }
    }

    /// Evaluate the expression only.
    pub fn call<I, V>(&self, args: I) -> Result<Value>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let bindings = self.bind(args)?;
        value_with(&self.expr, &bindings, self.options.eval)
    }

    /// Evaluate and return the gradient with respect to each parameter, in order.
    pub fn call_with_gradient<I, V>(&self, args: I) -> Result<(Value, Vec<Value>)>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let bindings = self.bind(args)?;
        let grads = gradient_with(&self.expr, &bindings, self.options.eval)?;
        Ok((grads.value().clone(), grads.wrt_many(&self.params)))
    }
}
