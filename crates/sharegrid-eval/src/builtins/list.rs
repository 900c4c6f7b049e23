// Integer list construction and queries.

use sharegrid_common::{CellType, Value};

use crate::context::EvalContext;
use crate::func_caps;
use crate::function::{ArgumentHandle, Arity, Function, TypeSet};

#[derive(Debug)]
pub struct IListFn;
impl Function for IListFn {
    func_caps!(PURE | REDUCTION);
    fn name(&self) -> &'static str {
        "ilist"
    }
    fn arity(&self) -> Arity {
        Arity::AtLeast(0)
    }
    fn arg_types(&self, _: usize) -> TypeSet {
        TypeSet::INTEGER
    }
    fn return_type(&self, _: &[CellType]) -> Option<CellType> {
        Some(CellType::IntegerList)
    }
    fn eval(&self, args: &[ArgumentHandle<'_>], _: &EvalContext) -> Value {
        let items: Vec<i64> = args.iter().filter_map(|a| a.value().as_i64()).collect();
        Value::integer_list(items)
    }
}

#[derive(Debug)]
pub struct ILenFn;
impl Function for ILenFn {
    func_caps!(PURE);
    fn name(&self) -> &'static str {
        "ilen"
    }
    fn arity(&self) -> Arity {
        Arity::Exact(1)
    }
    fn arg_types(&self, _: usize) -> TypeSet {
        TypeSet::INTEGER_LIST
    }
    fn return_type(&self, _: &[CellType]) -> Option<CellType> {
        Some(CellType::Integer)
    }
    fn eval(&self, args: &[ArgumentHandle<'_>], _: &EvalContext) -> Value {
        let len = args[0].value().as_list().map_or(0, <[i64]>::len);
        Value::Integer(len as i64)
    }
}

#[derive(Debug)]
pub struct IIncludesFn;
impl Function for IIncludesFn {
    func_caps!(PURE);
    fn name(&self) -> &'static str {
        "iincludes"
    }
    fn arity(&self) -> Arity {
        Arity::Exact(2)
    }
    fn arg_types(&self, index: usize) -> TypeSet {
        if index == 0 {
            TypeSet::INTEGER_LIST
        } else {
            TypeSet::INTEGER
        }
    }
    fn return_type(&self, _: &[CellType]) -> Option<CellType> {
        Some(CellType::Bool)
    }
    fn eval(&self, args: &[ArgumentHandle<'_>], _: &EvalContext) -> Value {
        let list = args[0].value();
        let needle = args[1].value().as_i64();
        let found = match (list.as_list(), needle) {
            (Some(items), Some(n)) => items.contains(&n),
            _ => false,
        };
        Value::Bool(found)
    }
}

#[derive(Debug)]
pub struct ISumFn;
impl Function for ISumFn {
    func_caps!(PURE);
    fn name(&self) -> &'static str {
        "isum"
    }
    fn arity(&self) -> Arity {
        Arity::Exact(1)
    }
    fn arg_types(&self, _: usize) -> TypeSet {
        TypeSet::INTEGER_LIST
    }
    fn return_type(&self, _: &[CellType]) -> Option<CellType> {
        Some(CellType::Integer)
    }
    fn eval(&self, args: &[ArgumentHandle<'_>], _: &EvalContext) -> Value {
        let total = args[0]
            .value()
            .as_list()
            .map_or(0, |items| items.iter().fold(0i64, |acc, i| acc.wrapping_add(*i)));
        Value::Integer(total)
    }
}

pub fn register_builtins(reg: &mut crate::function_registry::FunctionRegistry) {
    crate::register_functions!(reg; IListFn, ILenFn, IIncludesFn, ISumFn);
}
