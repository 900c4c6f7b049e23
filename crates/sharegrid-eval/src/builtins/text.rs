use sharegrid_common::{CellType, Value};

use crate::context::EvalContext;
use crate::func_caps;
use crate::function::{ArgumentHandle, Arity, Function};

/// Concatenates the display form of every argument.
#[derive(Debug)]
pub struct ConcatFn;
impl Function for ConcatFn {
    func_caps!(PURE | REDUCTION);
    fn name(&self) -> &'static str {
        "concat"
    }
    fn arity(&self) -> Arity {
        Arity::AtLeast(1)
    }
    fn return_type(&self, _: &[CellType]) -> Option<CellType> {
        Some(CellType::String)
    }
    fn eval(&self, args: &[ArgumentHandle<'_>], _: &EvalContext) -> Value {
        let mut out = String::new();
        for arg in args {
            match arg.value() {
                Value::String(s) => out.push_str(&s),
                other => out.push_str(&other.to_string()),
            }
        }
        Value::string(out)
    }
}

pub fn register_builtins(reg: &mut crate::function_registry::FunctionRegistry) {
    crate::register_functions!(reg; ConcatFn);
}
