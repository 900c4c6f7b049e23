#![cfg(test)]

pub mod test_node;

pub use test_node::TestNode;

use sharegrid_common::{CellType, ColumnId, RowId, Timestamp, Value, from_epoch_millis};

use crate::compiler::Compiler;
use crate::context::EvalContext;
use crate::function_registry::builtins;
use crate::node::Node;

/// Clock used by [`eval`].
pub const NOW_MS: i64 = 61_000;

pub fn at(ms: i64) -> Timestamp {
    from_epoch_millis(ms)
}

/// Node `/n` owning column `/c` (column `/d` belongs to `/other`), with
/// a small typed row set and every input written at t=1s:
///
/// | row  | /c       | /d |
/// |------|----------|----|
/// | a    | 5        | 5  |
/// | b, c | 10, 15   |    |
/// | x    | 2.5      |    |
/// | flag | true     |    |
/// | name | "abc"    |    |
/// | list | [1,2,3]  |    |
/// | v0-2 | 1, 2, 3  |    |
///
/// Row `empty` and the `out_<type>` rows are never written.
pub fn numbers() -> Node {
    let mut t = TestNode::new("/n")
        .column("/c")
        .foreign_column("/d", "/other");
    for r in ["a", "b", "c", "empty", "v0", "v1", "v2"] {
        t = t.row(r, CellType::Integer);
    }
    t = t
        .row("x", CellType::Real)
        .row("flag", CellType::Bool)
        .row("name", CellType::String)
        .row("list", CellType::IntegerList);
    for ty in CellType::ALL {
        t = t.row(&format!("out_{}", ty.name()), ty);
    }
    t.cell("/c", "a", 5i64, 1_000)
        .cell("/c", "b", 10i64, 1_000)
        .cell("/c", "c", 15i64, 1_000)
        .cell("/c", "x", 2.5, 1_000)
        .cell("/c", "flag", true, 1_000)
        .cell("/c", "name", "abc", 1_000)
        .cell("/c", "list", vec![1i64, 2, 3], 1_000)
        .cell("/c", "v0", 1i64, 1_000)
        .cell("/c", "v1", 2i64, 1_000)
        .cell("/c", "v2", 3i64, 1_000)
        .cell("/d", "a", 5i64, 1_000)
        .build()
}

/// Compile `src` for `/c:out_<ty>` and evaluate it at [`NOW_MS`].
pub fn eval(node: &Node, ty: CellType, src: &str) -> Value {
    let column = node.column("/c").expect("fixture column").clone();
    let row = node
        .row(&format!("out_{}", ty.name()))
        .expect("fixture row")
        .clone();
    let expr = Compiler::new(node, builtins())
        .compile(src, &column, &row)
        .unwrap_or_else(|e| panic!("{src}: {e}"));
    let mut ctx = EvalContext::new(node.clone(), at(NOW_MS));
    ctx.set_current_column(&ColumnId::new("/c"));
    ctx.set_current_row(&row.id);
    expr.eval(&ctx).value
}

/// Compile `src` for `/c:out_<ty>`, expecting failure; returns the message.
pub fn compile_error(node: &Node, ty: CellType, src: &str) -> String {
    let column = node.column("/c").expect("fixture column").clone();
    let row = node
        .row(&format!("out_{}", ty.name()))
        .expect("fixture row")
        .clone();
    match Compiler::new(node, builtins()).compile(src, &column, &row) {
        Ok(e) => panic!("{src} compiled to {e}"),
        Err(e) => e.to_string(),
    }
}

pub fn row(id: &str) -> RowId {
    RowId::new(id)
}
