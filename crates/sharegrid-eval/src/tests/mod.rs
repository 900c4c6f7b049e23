mod orchestration;

use sharegrid_common::{CellType, CellValue, ColumnId, RowId, Value};

use crate::column_data::ColumnDataChange;
use crate::formula::{ConstraintSpec, FormulaSpec};
use crate::function_registry::builtins;
use crate::node::Node;
use crate::test_utils::{TestNode, at};
use crate::updater::{EvalConfig, UpdateResult, Updater};

/// Node `/n` (upstream `/up`) owning `/in`, `/calc` and `/report`; `/remote`
/// belongs to `/peer`. Inputs `/in:a = 1`, `/in:b = 2`, `/in:limit = 100`
/// are written at t=1s.
pub(crate) fn ledger() -> Node {
    TestNode::new("/n")
        .upstream("/up")
        .column("/report")
        .column("/in")
        .column("/calc")
        .foreign_column("/remote", "/peer")
        .row("a", CellType::Integer)
        .row("b", CellType::Integer)
        .row("total", CellType::Integer)
        .row("double", CellType::Integer)
        .row("rate", CellType::Real)
        .row("clock", CellType::Integer)
        .row("tock", CellType::Integer)
        .locked_row("limit", CellType::Integer)
        .cell("/in", "a", 1i64, 1_000)
        .cell("/in", "b", 2i64, 1_000)
        .cell("/in", "limit", 100i64, 1_000)
        .build()
}

pub(crate) fn ledger_formulas() -> Vec<FormulaSpec> {
    vec![
        FormulaSpec::new("/calc", "total", "(sum /in:a /in:b)"),
        FormulaSpec::new("/report", "double", "(mul /calc:total 2)"),
    ]
}

/// Compile and initialize at t=1s.
pub(crate) fn start(
    node: &Node,
    formulas: &[FormulaSpec],
    constraints: &[ConstraintSpec],
) -> (Updater, UpdateResult) {
    let mut updater = Updater::compile(
        node,
        builtins(),
        formulas,
        constraints,
        EvalConfig::default(),
    )
    .unwrap_or_else(|e| panic!("compile: {e}"));
    let init = updater.initialize(node, at(1_000));
    (updater, init)
}

pub(crate) fn change(column: &str, by: &str, cells: &[(&str, Value, i64)]) -> ColumnDataChange {
    ColumnDataChange::new(
        ColumnId::new(column),
        by,
        cells
            .iter()
            .map(|(r, v, ms)| (RowId::new(*r), CellValue::new(v.clone(), at(*ms))))
            .collect(),
    )
}

pub(crate) fn value(node: &Node, column: &str, row: &str) -> Option<Value> {
    node.cell_value(column, row).map(|c| c.value.clone())
}
