// Clock-dependent functions. Their results only change when the clock
// moves, so formulas using them need a time trigger to stay fresh.

use sharegrid_common::{CellType, EPOCH, Value, to_epoch_millis};

use crate::context::EvalContext;
use crate::func_caps;
use crate::function::{ArgumentHandle, Arity, Function};

/// Seconds elapsed since the argument was last written; 0 for cells that
/// were never written.
#[derive(Debug)]
pub struct AgeFn;
impl Function for AgeFn {
    func_caps!(VOLATILE | METADATA);
    fn name(&self) -> &'static str {
        "age"
    }
    fn arity(&self) -> Arity {
        Arity::Exact(1)
    }
    fn return_type(&self, _: &[CellType]) -> Option<CellType> {
        Some(CellType::Integer)
    }
    fn eval(&self, args: &[ArgumentHandle<'_>], ctx: &EvalContext) -> Value {
        let cell = args[0].cell();
        if cell.date == EPOCH {
            return Value::Integer(0);
        }
        Value::Integer((ctx.now() - cell.date).num_seconds().max(0))
    }
}

/// Evaluation clock as epoch milliseconds.
#[derive(Debug)]
pub struct NowFn;
impl Function for NowFn {
    func_caps!(VOLATILE);
    fn name(&self) -> &'static str {
        "now"
    }
    fn arity(&self) -> Arity {
        Arity::Exact(0)
    }
    fn return_type(&self, _: &[CellType]) -> Option<CellType> {
        Some(CellType::Integer)
    }
    fn eval(&self, _: &[ArgumentHandle<'_>], ctx: &EvalContext) -> Value {
        Value::Integer(to_epoch_millis(&ctx.now()))
    }
}

pub fn register_builtins(reg: &mut crate::function_registry::FunctionRegistry) {
    crate::register_functions!(reg; AgeFn, NowFn);
}

#[cfg(test)]
mod tests {
    use crate::test_utils::{NOW_MS, eval, numbers};
    use sharegrid_common::{CellType, Value};

    #[test]
    fn clock_functions() {
        let n = numbers();
        assert_eq!(eval(&n, CellType::Integer, "(now)"), Value::Integer(NOW_MS));
        // every fixture cell is written at t=1s
        assert_eq!(
            eval(&n, CellType::Integer, "(age a)"),
            Value::Integer((NOW_MS - 1_000) / 1_000)
        );
        assert_eq!(eval(&n, CellType::Integer, "(age empty)"), Value::Integer(0));
    }
}
