use sharegrid_common::{CellType, EPOCH, Value};
use sharegrid_eval::{Column, ColumnList, Compiler, EvalContext, FunctionRegistry, Node, Row, RowList};

/// Evaluate a self-contained formula in a one-cell node and return the
/// value. The evaluation clock is the epoch.
///
/// # Example
///
/// ```rust
/// # use sharegrid::{CellType, Value};
/// # use sharegrid::doc_examples::eval_scalar;
/// let value = eval_scalar("(sum 1 2 3)", CellType::Integer)?;
/// assert_eq!(value, Value::Integer(6));
/// # Ok::<(), Box<dyn std::error::Error + Send + Sync>>(())
/// ```
pub fn eval_scalar(src: &str, cell_type: CellType) -> Result<Value, Box<dyn std::error::Error + Send + Sync>> {
    let column = Column::new("/doc");
    let row = Row::new("out", cell_type);
    let node = Node::new(
        "/doc",
        None,
        ColumnList::new("columns", EPOCH, [column.clone()])?,
        RowList::new("rows", EPOCH, [row.clone()])?,
    );
    let registry = FunctionRegistry::with_builtins();
    let expr = Compiler::new(&node, &registry).compile(src, &column, &row)?;
    let mut ctx = EvalContext::new(node, EPOCH);
    ctx.set_current_column(&column.id);
    ctx.set_current_row(&row.id);
    Ok(expr.eval(&ctx).value)
}
