// Comparison, boolean connectives and `if`.

use std::cmp::Ordering;

use sharegrid_common::{CellType, Value};

use super::utils::{comparable, numeric_return, promote};
use crate::context::EvalContext;
use crate::func_caps;
use crate::function::{ArgumentHandle, Arity, Function, TypeSet};

/* ───────────────────────── comparisons ─────────────────────────── */

macro_rules! comparison_fn {
    ($ty:ident, $name:literal, $test:expr) => {
        #[derive(Debug)]
        pub struct $ty;
        impl Function for $ty {
            func_caps!(PURE);
            fn name(&self) -> &'static str {
                $name
            }
            fn arity(&self) -> Arity {
                Arity::Exact(2)
            }
            fn return_type(&self, args: &[CellType]) -> Option<CellType> {
                comparable(args).then_some(CellType::Bool)
            }
            fn eval(&self, args: &[ArgumentHandle<'_>], _: &EvalContext) -> Value {
                let ord = args[0].value().compare(&args[1].value());
                let test: fn(Option<Ordering>) -> bool = $test;
                Value::Bool(test(ord))
            }
        }
    };
}

comparison_fn!(GtFn, "gt", |o| o == Some(Ordering::Greater));
comparison_fn!(GeFn, "ge", |o| matches!(o, Some(Ordering::Greater | Ordering::Equal)));
comparison_fn!(LtFn, "lt", |o| o == Some(Ordering::Less));
comparison_fn!(LeFn, "le", |o| matches!(o, Some(Ordering::Less | Ordering::Equal)));
comparison_fn!(EqFn, "eq", |o| o == Some(Ordering::Equal));
comparison_fn!(NeFn, "ne", |o| o != Some(Ordering::Equal));

/* ─────────────────────────── AND / OR ──────────────────────────── */

#[derive(Debug)]
pub struct AndFn;
impl Function for AndFn {
    func_caps!(PURE | REDUCTION);
    fn name(&self) -> &'static str {
        "and"
    }
    fn arity(&self) -> Arity {
        Arity::AtLeast(1)
    }
    fn arg_types(&self, _: usize) -> TypeSet {
        TypeSet::BOOL
    }
    fn return_type(&self, _: &[CellType]) -> Option<CellType> {
        Some(CellType::Bool)
    }
    fn eval(&self, args: &[ArgumentHandle<'_>], _: &EvalContext) -> Value {
        Value::Bool(args.iter().all(|a| a.value().as_bool().unwrap_or(false)))
    }
}

#[derive(Debug)]
pub struct OrFn;
impl Function for OrFn {
    func_caps!(PURE | REDUCTION);
    fn name(&self) -> &'static str {
        "or"
    }
    fn arity(&self) -> Arity {
        Arity::AtLeast(1)
    }
    fn arg_types(&self, _: usize) -> TypeSet {
        TypeSet::BOOL
    }
    fn return_type(&self, _: &[CellType]) -> Option<CellType> {
        Some(CellType::Bool)
    }
    fn eval(&self, args: &[ArgumentHandle<'_>], _: &EvalContext) -> Value {
        Value::Bool(args.iter().any(|a| a.value().as_bool().unwrap_or(false)))
    }
}

#[derive(Debug)]
pub struct NotFn;
impl Function for NotFn {
    func_caps!(PURE);
    fn name(&self) -> &'static str {
        "not"
    }
    fn arity(&self) -> Arity {
        Arity::Exact(1)
    }
    fn arg_types(&self, _: usize) -> TypeSet {
        TypeSet::BOOL
    }
    fn return_type(&self, _: &[CellType]) -> Option<CellType> {
        Some(CellType::Bool)
    }
    fn eval(&self, args: &[ArgumentHandle<'_>], _: &EvalContext) -> Value {
        Value::Bool(!args[0].value().as_bool().unwrap_or(false))
    }
}

/* ───────────────────────────── IF ──────────────────────────────── */

/// `(if cond then else)`; only the chosen branch is evaluated.
#[derive(Debug)]
pub struct IfFn;
impl Function for IfFn {
    func_caps!(PURE);
    fn name(&self) -> &'static str {
        "if"
    }
    fn arity(&self) -> Arity {
        Arity::Exact(3)
    }
    fn arg_types(&self, index: usize) -> TypeSet {
        if index == 0 {
            TypeSet::BOOL
        } else {
            TypeSet::ANY
        }
    }
    fn return_type(&self, args: &[CellType]) -> Option<CellType> {
        match args {
            [_, a, b] if a == b => Some(*a),
            [_, a, b] => numeric_return(&[*a, *b]),
            _ => None,
        }
    }
    fn eval(&self, args: &[ArgumentHandle<'_>], _: &EvalContext) -> Value {
        let kind = self
            .return_type(&[CellType::Bool, args[1].cell_type(), args[2].cell_type()])
            .unwrap_or(CellType::Integer);
        let branch = if args[0].value().as_bool().unwrap_or(false) {
            &args[1]
        } else {
            &args[2]
        };
        promote(branch.value(), kind)
    }
}

pub fn register_builtins(reg: &mut crate::function_registry::FunctionRegistry) {
    crate::register_functions!(
        reg;
        GtFn, GeFn, LtFn, LeFn, EqFn, NeFn, AndFn, OrFn, NotFn, IfFn
    );
}
