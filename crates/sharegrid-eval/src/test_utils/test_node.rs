use sharegrid_common::{CellType, CellValue, ColumnId, EPOCH, NodeId, RowId, Value, from_epoch_millis};

use crate::column_data::ColumnData;
use crate::filter::UpdateFilter;
use crate::node::Node;
use crate::schema::{Column, ColumnList, LOCKED, Row, RowList};

/// Builder for small nodes in tests.
pub struct TestNode {
    id: NodeId,
    upstream: Option<NodeId>,
    columns: Vec<Column>,
    rows: Vec<Row>,
    cells: Vec<(ColumnId, RowId, CellValue)>,
}

impl TestNode {
    pub fn new(id: &str) -> Self {
        TestNode {
            id: NodeId::new(id),
            upstream: None,
            columns: Vec::new(),
            rows: Vec::new(),
            cells: Vec::new(),
        }
    }

    pub fn upstream(mut self, id: &str) -> Self {
        self.upstream = Some(NodeId::new(id));
        self
    }

    /// Column owned by this node.
    pub fn column(mut self, id: &str) -> Self {
        self.columns.push(Column::new(id).with_node(self.id.clone()));
        self
    }

    pub fn foreign_column(mut self, id: &str, owner: &str) -> Self {
        self.columns.push(Column::new(id).with_node(owner));
        self
    }

    pub fn filtered_column(mut self, id: &str, owner: &str, filter: UpdateFilter) -> Self {
        self.columns
            .push(Column::new(id).with_node(owner).with_filter(filter));
        self
    }

    pub fn row(mut self, id: &str, cell_type: CellType) -> Self {
        self.rows.push(Row::new(id, cell_type));
        self
    }

    pub fn locked_row(mut self, id: &str, cell_type: CellType) -> Self {
        self.rows.push(Row::new(id, cell_type).with_attr(LOCKED));
        self
    }

    pub fn filtered_row(mut self, id: &str, cell_type: CellType, filter: UpdateFilter) -> Self {
        self.rows.push(Row::new(id, cell_type).with_filter(filter));
        self
    }

    pub fn cell(mut self, column: &str, row: &str, value: impl Into<Value>, ms: i64) -> Self {
        self.cells.push((
            ColumnId::new(column),
            RowId::new(row),
            CellValue::new(value, from_epoch_millis(ms)),
        ));
        self
    }

    pub fn build(self) -> Node {
        let columns = ColumnList::new("columns", EPOCH, self.columns).expect("test columns");
        let rows = RowList::new("rows", EPOCH, self.rows).expect("test rows");
        let mut node = Node::new(self.id, self.upstream, columns, rows);
        let ids: Vec<ColumnId> = node.column_list.iter().map(|c| c.id.clone()).collect();
        for id in ids {
            let cells: Vec<(RowId, CellValue)> = self
                .cells
                .iter()
                .filter(|(c, _, _)| *c == id)
                .map(|(_, r, v)| (r.clone(), v.clone()))
                .collect();
            if cells.is_empty() {
                continue;
            }
            let data = ColumnData::new(id, "columns", "rows").with_cells(cells);
            node = node.with_column_data(data);
        }
        node
    }
}
