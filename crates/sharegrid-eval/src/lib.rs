//! Formula compilation, evaluation and change orchestration for one
//! ShareGrid node.

pub mod builtins;
pub mod column_data;
pub mod compiler;
pub mod context;
pub mod error;
pub mod filter;
pub mod formula;
pub mod function;
pub mod function_registry;
pub mod node;
pub mod schema;
pub mod trigger;
pub mod updater;

#[macro_use]
mod macros;
#[cfg(test)]
pub mod test_utils;

#[cfg(test)]
mod tests;

pub use column_data::{ColumnData, ColumnDataChange, TiePolicy};
pub use compiler::{Compiler, ExprNode};
pub use context::EvalContext;
pub use error::{ChangeError, CompileError, SchemaError};
pub use filter::UpdateFilter;
pub use formula::{CellFormula, ConstraintKey, ConstraintSpec, FormulaSet, ConstraintSet, FormulaSpec};
pub use function::{ArgumentHandle, Arity, FnCaps, Function, TypeSet};
pub use function_registry::FunctionRegistry;
pub use node::Node;
pub use schema::{CellRef, Column, ColumnList, ColumnSpec, Row, RowList, RowSpec};
pub use trigger::TimeTrigger;
pub use updater::{
    ChangeSource, ConstraintChanges, ConstraintResult, EvalConfig, UpdateResult, Updater,
};
