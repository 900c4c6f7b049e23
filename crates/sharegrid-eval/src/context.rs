use rustc_hash::FxHashMap;
use sharegrid_common::{CellValue, ColumnId, EPOCH, RowId, Timestamp};

use crate::column_data::{ColumnDataChange, TiePolicy};
use crate::node::Node;
use crate::schema::CellRef;

/// Evaluation surface for one pass.
///
/// The context is bound to one current column at a time. Writes to the
/// current column stay in a working overlay until [`commit`](Self::commit)
/// publishes them as a new `Node`; reads of any other column see that
/// column's published snapshot only.
#[derive(Debug)]
pub struct EvalContext {
    node: Node,
    now: Timestamp,
    eval_date: Timestamp,
    column: Option<ColumnId>,
    row: Option<RowId>,
    working: FxHashMap<RowId, CellValue>,
    log: Vec<(RowId, CellValue)>,
}

impl EvalContext {
    pub fn new(node: Node, now: Timestamp) -> Self {
        EvalContext {
            node,
            now,
            eval_date: now,
            column: None,
            row: None,
            working: FxHashMap::default(),
            log: Vec::new(),
        }
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn into_node(self) -> Node {
        self.node
    }

    /// Clock used by time functions.
    pub fn now(&self) -> Timestamp {
        self.now
    }

    /// Date stamped on values computed in this evaluation.
    pub fn eval_date(&self) -> Timestamp {
        self.eval_date
    }

    pub fn set_eval_date(&mut self, date: Timestamp) {
        self.eval_date = date;
    }

    /// Bind `column`, discarding uncommitted writes.
    pub fn set_current_column(&mut self, column: &ColumnId) {
        self.column = Some(column.clone());
        self.row = None;
        self.working.clear();
        self.log.clear();
    }

    pub fn current_column(&self) -> Option<&ColumnId> {
        self.column.as_ref()
    }

    pub fn set_current_row(&mut self, row: &RowId) {
        self.row = Some(row.clone());
    }

    pub fn current_row(&self) -> Option<&RowId> {
        self.row.as_ref()
    }

    /// Current cell, or the row's undefined sentinel when absent. `None`
    /// only when no column/row is bound or the row is unknown.
    pub fn current_cell(&self) -> Option<CellValue> {
        let column = self.column.as_ref()?;
        let row = self.node.row(self.row.as_ref()?)?;
        Some(self.lookup(column, &row.id).unwrap_or_else(|| row.undefined_value()))
    }

    /// Write the current cell into the working overlay and change log.
    pub fn set_current_cell(&mut self, value: CellValue) {
        let Some(row) = self.row.clone() else {
            return;
        };
        self.working.insert(row.clone(), value.clone());
        self.log.push((row, value));
    }

    /// Read any cell. The current column reads through the working overlay.
    pub fn cell_value(&self, cell: &CellRef) -> CellValue {
        self.lookup(&cell.column, &cell.row)
            .unwrap_or_else(|| cell.cell_type.undefined())
    }

    fn lookup(&self, column: &ColumnId, row: &RowId) -> Option<CellValue> {
        if self.column.as_ref() == Some(column)
            && let Some(v) = self.working.get(row)
        {
            return Some(v.clone());
        }
        self.node.cell_value(column, row).cloned()
    }

    /// Newest timestamp among `cells`, `EPOCH` for none.
    pub fn newest<'a>(&self, cells: impl IntoIterator<Item = &'a CellRef>) -> Timestamp {
        cells
            .into_iter()
            .map(|c| self.cell_value(c).date)
            .max()
            .unwrap_or(EPOCH)
    }

    pub fn has_changes(&self) -> bool {
        !self.log.is_empty()
    }

    pub fn changes(&self) -> &[(RowId, CellValue)] {
        &self.log
    }

    /// Publish the current column's writes, returning the applied change.
    /// The overlay and log are cleared either way.
    pub fn commit(&mut self) -> Option<ColumnDataChange> {
        let column = self.column.clone()?;
        let log = std::mem::take(&mut self.log);
        self.working.clear();
        if log.is_empty() {
            return None;
        }
        let applied = self
            .node
            .column_data(&column)?
            .apply(&log, TiePolicy::Overwrite)?;
        self.node = self.node.with_column_data(applied.data);
        Some(ColumnDataChange::new(
            column,
            self.node.id.clone(),
            applied.changes,
        ))
    }
}
