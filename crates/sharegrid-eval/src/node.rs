use std::sync::Arc;

use rustc_hash::FxHashMap;
use sharegrid_common::{CellValue, ColumnId, NodeId};

use crate::column_data::ColumnData;
use crate::schema::{Column, ColumnList, Row, RowList};

/// Immutable snapshot of one node's catalogs and data.
///
/// Updates produce a new `Node` sharing untouched column data with the
/// previous one.
#[derive(Clone, Debug)]
pub struct Node {
    pub id: NodeId,
    pub upstream_id: Option<NodeId>,
    pub column_list: Arc<ColumnList>,
    pub row_list: Arc<RowList>,
    column_datas: FxHashMap<ColumnId, Arc<ColumnData>>,
}

impl Node {
    /// A node with an empty `ColumnData` for every column.
    pub fn new(
        id: impl Into<NodeId>,
        upstream_id: Option<NodeId>,
        column_list: ColumnList,
        row_list: RowList,
    ) -> Self {
        let column_datas = column_list
            .iter()
            .map(|c| {
                let data = ColumnData::new(c.id.clone(), &column_list.id, &row_list.id);
                (c.id.clone(), Arc::new(data))
            })
            .collect();
        Node {
            id: id.into(),
            upstream_id,
            column_list: Arc::new(column_list),
            row_list: Arc::new(row_list),
            column_datas,
        }
    }

    pub fn column(&self, id: &str) -> Option<&Arc<Column>> {
        self.column_list.get(id)
    }

    pub fn row(&self, id: &str) -> Option<&Arc<Row>> {
        self.row_list.get(id)
    }

    pub fn column_data(&self, id: &str) -> Option<&Arc<ColumnData>> {
        self.column_datas.get(id)
    }

    pub fn cell_value(&self, column: &str, row: &str) -> Option<&CellValue> {
        self.column_datas.get(column)?.get(row)
    }

    /// Stored value, or the row's undefined sentinel when absent.
    /// `None` only for unknown rows.
    pub fn cell_value_or_undefined(&self, column: &str, row: &str) -> Option<CellValue> {
        let row = self.row(row)?;
        Some(
            self.cell_value(column, &row.id)
                .cloned()
                .unwrap_or_else(|| row.undefined_value()),
        )
    }

    pub fn is_own_column(&self, column: &Column) -> bool {
        column.node == self.id
    }

    pub fn is_upstream(&self, peer: &str) -> bool {
        self.upstream_id.as_ref().is_some_and(|u| u == peer)
    }

    /// Copy of this node with `data` replacing the column's current grid.
    pub fn with_column_data(&self, data: ColumnData) -> Node {
        let mut column_datas = self.column_datas.clone();
        column_datas.insert(data.id.clone(), Arc::new(data));
        Node {
            id: self.id.clone(),
            upstream_id: self.upstream_id.clone(),
            column_list: Arc::clone(&self.column_list),
            row_list: Arc::clone(&self.row_list),
            column_datas,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharegrid_common::{CellType, EPOCH, RowId, Value, from_epoch_millis};

    fn node() -> Node {
        let columns = ColumnList::new(
            "cols",
            EPOCH,
            vec![Column::new("/a"), Column::new("/b").with_node("/n")],
        )
        .unwrap();
        let rows = RowList::new("rows", EPOCH, vec![Row::new("/r", CellType::Real)]).unwrap();
        Node::new("/n", Some(NodeId::new("/up")), columns, rows)
    }

    #[test]
    fn starts_with_empty_columns() {
        let n = node();
        assert!(n.column_data("/a").unwrap().is_empty());
        assert_eq!(
            n.cell_value_or_undefined("/a", "/r").unwrap().value,
            Value::Real(0.0)
        );
        assert!(n.cell_value_or_undefined("/a", "/zz").is_none());
    }

    #[test]
    fn ownership_and_upstream() {
        let n = node();
        assert!(!n.is_own_column(n.column("/a").unwrap()));
        assert!(n.is_own_column(n.column("/b").unwrap()));
        assert!(n.is_upstream("/up"));
        assert!(!n.is_upstream("/n"));
    }

    #[test]
    fn structural_copy_shares_untouched_columns() {
        let n = node();
        let data = n
            .column_data("/a")
            .unwrap()
            .as_ref()
            .clone()
            .with_cells([(RowId::new("/r"), CellValue::new(2.5, from_epoch_millis(10)))]);
        let m = n.with_column_data(data);
        assert!(n.cell_value("/a", "/r").is_none());
        assert_eq!(m.cell_value("/a", "/r").unwrap().value, Value::Real(2.5));
        assert!(Arc::ptr_eq(
            n.column_data("/b").unwrap(),
            m.column_data("/b").unwrap()
        ));
    }
}
