//! The core `Function` trait, its capability flags, and argument typing.

use std::fmt;

use sharegrid_common::{CellType, CellValue, Value};

use crate::compiler::ExprNode;
use crate::context::EvalContext;

bitflags::bitflags! {
    /// Properties of a function the compiler and scheduler care about.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
    pub struct FnCaps: u8 {
        /// Same output for the same inputs.
        const PURE      = 0b0000_0001;
        /// Output depends on the evaluation clock; formulas using it only
        /// refresh when a time trigger fires.
        const VOLATILE  = 0b0000_0010;
        /// Folds any number of arguments into one value.
        const REDUCTION = 0b0000_0100;
        /// Reads cell metadata (timestamps) rather than just payloads.
        const METADATA  = 0b0000_1000;
    }
}

bitflags::bitflags! {
    /// Set of cell types accepted at an argument position.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
    pub struct TypeSet: u8 {
        const INTEGER      = 0b0000_0001;
        const REAL         = 0b0000_0010;
        const BOOL         = 0b0000_0100;
        const STRING       = 0b0000_1000;
        const INTEGER_LIST = 0b0001_0000;
        const NUMERIC      = Self::INTEGER.bits() | Self::REAL.bits();
        const ANY          = 0b0001_1111;
    }
}

impl TypeSet {
    pub fn of(t: CellType) -> Self {
        match t {
            CellType::Integer => TypeSet::INTEGER,
            CellType::Real => TypeSet::REAL,
            CellType::Bool => TypeSet::BOOL,
            CellType::String => TypeSet::STRING,
            CellType::IntegerList => TypeSet::INTEGER_LIST,
        }
    }

    pub fn accepts(self, t: CellType) -> bool {
        self.contains(TypeSet::of(t))
    }
}

impl fmt::Display for TypeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == TypeSet::ANY {
            return f.write_str("any");
        }
        let names: Vec<&str> = CellType::ALL
            .iter()
            .filter(|t| self.accepts(**t))
            .map(|t| t.name())
            .collect();
        f.write_str(&names.join("|"))
    }
}

/// Accepted argument counts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arity {
    Exact(usize),
    AtLeast(usize),
    Range(usize, usize),
}

impl Arity {
    pub fn accepts(self, n: usize) -> bool {
        match self {
            Arity::Exact(k) => n == k,
            Arity::AtLeast(k) => n >= k,
            Arity::Range(lo, hi) => (lo..=hi).contains(&n),
        }
    }
}

impl fmt::Display for Arity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Arity::Exact(k) => write!(f, "{k}"),
            Arity::AtLeast(k) => write!(f, "at least {k}"),
            Arity::Range(lo, hi) => write!(f, "{lo} to {hi}"),
        }
    }
}

/// Lazy handle to one compiled argument.
///
/// Functions that short-circuit (`and`, `or`, `if`) only evaluate the
/// handles they need.
pub struct ArgumentHandle<'a> {
    node: &'a ExprNode,
    ctx: &'a EvalContext,
}

impl<'a> ArgumentHandle<'a> {
    pub(crate) fn new(node: &'a ExprNode, ctx: &'a EvalContext) -> Self {
        Self { node, ctx }
    }

    pub fn value(&self) -> Value {
        self.node.eval(self.ctx).value
    }

    /// Value together with the timestamp of the cell it came from.
    pub fn cell(&self) -> CellValue {
        self.node.eval(self.ctx)
    }

    pub fn cell_type(&self) -> CellType {
        self.node.cell_type()
    }
}

/// A typed builtin.
///
/// Type checking happens once at compile time through `arity`, `arg_types`
/// and `return_type`; `eval` then never sees ill-typed arguments and cannot
/// fail.
pub trait Function: Send + Sync + 'static {
    fn caps(&self) -> FnCaps {
        FnCaps::PURE
    }

    fn name(&self) -> &'static str;

    /// Alternative names resolving to this function.
    fn aliases(&self) -> &'static [&'static str] {
        &[]
    }

    fn arity(&self) -> Arity;

    /// Types accepted at argument position `index`.
    fn arg_types(&self, _index: usize) -> TypeSet {
        TypeSet::ANY
    }

    /// Result type for the given argument types, `None` when the
    /// combination is not allowed even though each argument is.
    fn return_type(&self, args: &[CellType]) -> Option<CellType>;

    fn eval(&self, args: &[ArgumentHandle<'_>], ctx: &EvalContext) -> Value;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_sets() {
        assert!(TypeSet::NUMERIC.accepts(CellType::Real));
        assert!(!TypeSet::NUMERIC.accepts(CellType::Bool));
        assert!(TypeSet::ANY.accepts(CellType::IntegerList));
        assert_eq!(TypeSet::NUMERIC.to_string(), "integer|real");
        assert_eq!(TypeSet::ANY.to_string(), "any");
    }

    #[test]
    fn arity_checks() {
        assert!(Arity::Exact(2).accepts(2));
        assert!(!Arity::Exact(2).accepts(3));
        assert!(Arity::AtLeast(1).accepts(9));
        assert!(!Arity::AtLeast(1).accepts(0));
        assert!(Arity::Range(1, 2).accepts(2));
        assert_eq!(Arity::AtLeast(1).to_string(), "at least 1");
    }
}
