use sharegrid_common::{CellType, Value};

use super::utils::{fold_numeric, numeric_kind, numeric_return, promote};
use crate::context::EvalContext;
use crate::func_caps;
use crate::function::{ArgumentHandle, Arity, Function, TypeSet};

#[derive(Debug)]
pub struct SumFn;
impl Function for SumFn {
    func_caps!(PURE | REDUCTION);
    fn name(&self) -> &'static str {
        "sum"
    }
    fn arity(&self) -> Arity {
        Arity::AtLeast(1)
    }
    fn arg_types(&self, _: usize) -> TypeSet {
        TypeSet::NUMERIC
    }
    fn return_type(&self, args: &[CellType]) -> Option<CellType> {
        numeric_return(args)
    }
    fn eval(&self, args: &[ArgumentHandle<'_>], _: &EvalContext) -> Value {
        fold_numeric(args, Value::add)
    }
}

#[derive(Debug)]
pub struct DiffFn;
impl Function for DiffFn {
    func_caps!(PURE);
    fn name(&self) -> &'static str {
        "diff"
    }
    fn aliases(&self) -> &'static [&'static str] {
        &["sub"]
    }
    fn arity(&self) -> Arity {
        Arity::Exact(2)
    }
    fn arg_types(&self, _: usize) -> TypeSet {
        TypeSet::NUMERIC
    }
    fn return_type(&self, args: &[CellType]) -> Option<CellType> {
        numeric_return(args)
    }
    fn eval(&self, args: &[ArgumentHandle<'_>], _: &EvalContext) -> Value {
        fold_numeric(args, Value::sub)
    }
}

#[derive(Debug)]
pub struct MulFn;
impl Function for MulFn {
    func_caps!(PURE | REDUCTION);
    fn name(&self) -> &'static str {
        "mul"
    }
    fn aliases(&self) -> &'static [&'static str] {
        &["prod"]
    }
    fn arity(&self) -> Arity {
        Arity::AtLeast(1)
    }
    fn arg_types(&self, _: usize) -> TypeSet {
        TypeSet::NUMERIC
    }
    fn return_type(&self, args: &[CellType]) -> Option<CellType> {
        numeric_return(args)
    }
    fn eval(&self, args: &[ArgumentHandle<'_>], _: &EvalContext) -> Value {
        fold_numeric(args, Value::mul)
    }
}

/// Integer operands divide with truncation; division by zero yields 0.
#[derive(Debug)]
pub struct DivFn;
impl Function for DivFn {
    func_caps!(PURE);
    fn name(&self) -> &'static str {
        "div"
    }
    fn arity(&self) -> Arity {
        Arity::Exact(2)
    }
    fn arg_types(&self, _: usize) -> TypeSet {
        TypeSet::NUMERIC
    }
    fn return_type(&self, args: &[CellType]) -> Option<CellType> {
        numeric_return(args)
    }
    fn eval(&self, args: &[ArgumentHandle<'_>], _: &EvalContext) -> Value {
        fold_numeric(args, Value::div)
    }
}

fn extremum(args: &[ArgumentHandle<'_>], want: std::cmp::Ordering) -> Value {
    let kind = numeric_kind(args);
    let best = args
        .iter()
        .map(|a| a.value())
        .reduce(|best, v| {
            if v.compare(&best) == Some(want) {
                v
            } else {
                best
            }
        });
    match best {
        Some(v) => promote(v, kind),
        None => kind.undefined_value(),
    }
}

#[derive(Debug)]
pub struct MinFn;
impl Function for MinFn {
    func_caps!(PURE | REDUCTION);
    fn name(&self) -> &'static str {
        "min"
    }
    fn arity(&self) -> Arity {
        Arity::AtLeast(1)
    }
    fn arg_types(&self, _: usize) -> TypeSet {
        TypeSet::NUMERIC
    }
    fn return_type(&self, args: &[CellType]) -> Option<CellType> {
        numeric_return(args)
    }
    fn eval(&self, args: &[ArgumentHandle<'_>], _: &EvalContext) -> Value {
        extremum(args, std::cmp::Ordering::Less)
    }
}

#[derive(Debug)]
pub struct MaxFn;
impl Function for MaxFn {
    func_caps!(PURE | REDUCTION);
    fn name(&self) -> &'static str {
        "max"
    }
    fn arity(&self) -> Arity {
        Arity::AtLeast(1)
    }
    fn arg_types(&self, _: usize) -> TypeSet {
        TypeSet::NUMERIC
    }
    fn return_type(&self, args: &[CellType]) -> Option<CellType> {
        numeric_return(args)
    }
    fn eval(&self, args: &[ArgumentHandle<'_>], _: &EvalContext) -> Value {
        extremum(args, std::cmp::Ordering::Greater)
    }
}

#[derive(Debug)]
pub struct AvgFn;
impl Function for AvgFn {
    func_caps!(PURE | REDUCTION);
    fn name(&self) -> &'static str {
        "avg"
    }
    fn aliases(&self) -> &'static [&'static str] {
        &["average"]
    }
    fn arity(&self) -> Arity {
        Arity::AtLeast(1)
    }
    fn arg_types(&self, _: usize) -> TypeSet {
        TypeSet::NUMERIC
    }
    fn return_type(&self, args: &[CellType]) -> Option<CellType> {
        numeric_return(args).map(|_| CellType::Real)
    }
    fn eval(&self, args: &[ArgumentHandle<'_>], _: &EvalContext) -> Value {
        let total: f64 = args.iter().filter_map(|a| a.value().as_f64()).sum();
        Value::Real(total / args.len() as f64)
    }
}

#[derive(Debug)]
pub struct NegFn;
impl Function for NegFn {
    func_caps!(PURE);
    fn name(&self) -> &'static str {
        "neg"
    }
    fn arity(&self) -> Arity {
        Arity::Exact(1)
    }
    fn arg_types(&self, _: usize) -> TypeSet {
        TypeSet::NUMERIC
    }
    fn return_type(&self, args: &[CellType]) -> Option<CellType> {
        numeric_return(args)
    }
    fn eval(&self, args: &[ArgumentHandle<'_>], _: &EvalContext) -> Value {
        let v = args[0].value();
        v.neg().unwrap_or(v)
    }
}

#[derive(Debug)]
pub struct AbsFn;
impl Function for AbsFn {
    func_caps!(PURE);
    fn name(&self) -> &'static str {
        "abs"
    }
    fn arity(&self) -> Arity {
        Arity::Exact(1)
    }
    fn arg_types(&self, _: usize) -> TypeSet {
        TypeSet::NUMERIC
    }
    fn return_type(&self, args: &[CellType]) -> Option<CellType> {
        numeric_return(args)
    }
    fn eval(&self, args: &[ArgumentHandle<'_>], _: &EvalContext) -> Value {
        match args[0].value() {
            Value::Integer(i) => Value::Integer(i.wrapping_abs()),
            Value::Real(r) => Value::Real(r.abs()),
            other => other,
        }
    }
}

/// Round half away from zero to the nearest Integer.
#[derive(Debug)]
pub struct RoundFn;
impl Function for RoundFn {
    func_caps!(PURE);
    fn name(&self) -> &'static str {
        "round"
    }
    fn arity(&self) -> Arity {
        Arity::Exact(1)
    }
    fn arg_types(&self, _: usize) -> TypeSet {
        TypeSet::NUMERIC
    }
    fn return_type(&self, _: &[CellType]) -> Option<CellType> {
        Some(CellType::Integer)
    }
    fn eval(&self, args: &[ArgumentHandle<'_>], _: &EvalContext) -> Value {
        match args[0].value() {
            Value::Real(r) if r.is_finite() => Value::Integer(r.round() as i64),
            Value::Integer(i) => Value::Integer(i),
            _ => Value::Integer(0),
        }
    }
}

#[derive(Debug)]
pub struct ToRealFn;
impl Function for ToRealFn {
    func_caps!(PURE);
    fn name(&self) -> &'static str {
        "toReal"
    }
    fn aliases(&self) -> &'static [&'static str] {
        &["toreal"]
    }
    fn arity(&self) -> Arity {
        Arity::Exact(1)
    }
    fn arg_types(&self, _: usize) -> TypeSet {
        TypeSet::NUMERIC
    }
    fn return_type(&self, _: &[CellType]) -> Option<CellType> {
        Some(CellType::Real)
    }
    fn eval(&self, args: &[ArgumentHandle<'_>], _: &EvalContext) -> Value {
        Value::Real(args[0].value().as_f64().unwrap_or(0.0))
    }
}

pub fn register_builtins(reg: &mut crate::function_registry::FunctionRegistry) {
    crate::register_functions!(
        reg;
        SumFn, DiffFn, MulFn, DivFn, MinFn, MaxFn, AvgFn, NegFn, AbsFn, RoundFn, ToRealFn
    );
}
