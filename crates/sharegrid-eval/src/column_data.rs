//! Versioned per-column value grids and the deltas that update them.

use rustc_hash::FxHashMap;
use sharegrid_common::{CellValue, ColumnId, EPOCH, NodeId, RowId, Timestamp};

use crate::schema::{Row, RowList};

/// How to settle an incoming cell whose timestamp equals the stored one
/// while the values differ.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TiePolicy {
    /// Take the incoming value.
    Overwrite,
    /// Keep the stored value. Used by the owning node for changes it did
    /// not author.
    KeepCurrent,
}

/// Result of [`ColumnData::apply`].
#[derive(Clone, Debug)]
pub struct Applied {
    pub data: ColumnData,
    /// Cells that actually replaced the stored ones, in change order.
    pub changes: Vec<(RowId, CellValue)>,
    /// Rows where equal timestamps carried different values.
    pub conflicts: Vec<RowId>,
}

/// One column's cells.
///
/// `date` is never older than any contained cell. Instances are replaced
/// wholesale on update.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnData {
    pub id: ColumnId,
    pub date: Timestamp,
    pub row_list_id: String,
    pub column_list_id: String,
    cells: FxHashMap<RowId, CellValue>,
}

impl ColumnData {
    pub fn new(
        id: impl Into<ColumnId>,
        column_list_id: impl Into<String>,
        row_list_id: impl Into<String>,
    ) -> Self {
        ColumnData {
            id: id.into(),
            date: EPOCH,
            row_list_id: row_list_id.into(),
            column_list_id: column_list_id.into(),
            cells: FxHashMap::default(),
        }
    }

    /// Build from stored cells, deriving the column date.
    pub fn with_cells(mut self, cells: impl IntoIterator<Item = (RowId, CellValue)>) -> Self {
        for (row, value) in cells {
            self.date = self.date.max(value.date);
            self.cells.insert(row, value);
        }
        self
    }

    pub fn get(&self, row: &str) -> Option<&CellValue> {
        self.cells.get(row)
    }

    pub fn get_or_undefined(&self, row: &Row) -> CellValue {
        self.cells
            .get(&row.id)
            .cloned()
            .unwrap_or_else(|| row.undefined_value())
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cells(&self) -> impl Iterator<Item = (&RowId, &CellValue)> {
        self.cells.iter()
    }

    /// Cells newer than `since`, in row-list order, limited to rows
    /// accepted by `include`.
    pub fn changed_since(
        &self,
        since: Timestamp,
        rows: &RowList,
        mut include: impl FnMut(&Row) -> bool,
    ) -> Vec<(RowId, CellValue)> {
        rows.iter()
            .filter(|row| include(row))
            .filter_map(|row| {
                self.cells
                    .get(&row.id)
                    .filter(|v| v.date > since)
                    .map(|v| (row.id.clone(), v.clone()))
            })
            .collect()
    }

    /// Per-row timestamps of stored cells, in row-list order.
    pub fn row_dates(
        &self,
        rows: &RowList,
        mut include: impl FnMut(&Row) -> bool,
    ) -> Vec<(RowId, Timestamp)> {
        rows.iter()
            .filter(|row| include(row))
            .filter_map(|row| self.cells.get(&row.id).map(|v| (row.id.clone(), v.date)))
            .collect()
    }

    /// Cells strictly newer than the peer's timestamp for the same row.
    /// Rows the peer does not list count as never written.
    pub fn rows_newer_than(
        &self,
        peer: &FxHashMap<RowId, Timestamp>,
        rows: &RowList,
        mut include: impl FnMut(&Row) -> bool,
    ) -> Vec<(RowId, CellValue)> {
        rows.iter()
            .filter(|row| include(row))
            .filter_map(|row| {
                let value = self.cells.get(&row.id)?;
                let theirs = peer.get(&row.id).copied().unwrap_or(EPOCH);
                (value.date > theirs).then(|| (row.id.clone(), value.clone()))
            })
            .collect()
    }

    /// Apply incoming cells. A cell replaces the stored one when it is
    /// newer, or when it has the same date and a different value and
    /// `ties` allows it. Returns `None` when nothing changed.
    pub fn apply(&self, changes: &[(RowId, CellValue)], ties: TiePolicy) -> Option<Applied> {
        let mut cells = self.cells.clone();
        let mut date = self.date;
        let mut applied = Vec::new();
        let mut conflicts = Vec::new();
        for (row, incoming) in changes {
            let replace = match cells.get(row) {
                None => incoming.date > EPOCH || !incoming.is_undefined(),
                Some(current) if incoming.date > current.date => true,
                Some(current) if incoming.date == current.date => {
                    if current.value_eq(incoming) {
                        false
                    } else {
                        conflicts.push(row.clone());
                        ties == TiePolicy::Overwrite
                    }
                }
                Some(_) => false,
            };
            if replace {
                date = date.max(incoming.date);
                cells.insert(row.clone(), incoming.clone());
                applied.push((row.clone(), incoming.clone()));
            }
        }
        if applied.is_empty() {
            return None;
        }
        Some(Applied {
            data: ColumnData {
                id: self.id.clone(),
                date,
                row_list_id: self.row_list_id.clone(),
                column_list_id: self.column_list_id.clone(),
                cells,
            },
            changes: applied,
            conflicts,
        })
    }
}

/// A delta for one column, the unit of propagation.
#[derive(Clone, Debug, PartialEq)]
pub struct ColumnDataChange {
    pub column_id: ColumnId,
    /// Node that produced the change.
    pub change_node_id: NodeId,
    pub date: Timestamp,
    pub changed_values: Vec<(RowId, CellValue)>,
}

impl ColumnDataChange {
    pub fn new(
        column_id: impl Into<ColumnId>,
        change_node_id: impl Into<NodeId>,
        changed_values: Vec<(RowId, CellValue)>,
    ) -> Self {
        let date = changed_values
            .iter()
            .map(|(_, v)| v.date)
            .max()
            .unwrap_or(EPOCH);
        ColumnDataChange {
            column_id: column_id.into(),
            change_node_id: change_node_id.into(),
            date,
            changed_values,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.changed_values.is_empty()
    }

    /// Copy limited to rows accepted by `include`; `None` if nothing remains.
    pub fn filter_rows(&self, mut include: impl FnMut(&RowId) -> bool) -> Option<Self> {
        let changed_values: Vec<_> = self
            .changed_values
            .iter()
            .filter(|(row, _)| include(row))
            .cloned()
            .collect();
        if changed_values.is_empty() {
            return None;
        }
        Some(ColumnDataChange {
            column_id: self.column_id.clone(),
            change_node_id: self.change_node_id.clone(),
            date: self.date,
            changed_values,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sharegrid_common::{CellType, Value, from_epoch_millis};

    fn rows() -> RowList {
        RowList::new(
            "rows",
            EPOCH,
            vec![
                Row::new("/a", CellType::Integer),
                Row::new("/b", CellType::Integer),
                Row::new("/c", CellType::Integer),
            ],
        )
        .unwrap()
    }

    fn at(ms: i64, v: i64) -> CellValue {
        CellValue::new(v, from_epoch_millis(ms))
    }

    fn data() -> ColumnData {
        ColumnData::new("/x", "cols", "rows")
            .with_cells([(RowId::new("/a"), at(100, 1)), (RowId::new("/c"), at(300, 3))])
    }

    #[test]
    fn date_tracks_newest_cell() {
        assert_eq!(data().date, from_epoch_millis(300));
    }

    #[test]
    fn newer_cells_overwrite_older_are_ignored() {
        let d = data();
        let out = d
            .apply(
                &[(RowId::new("/a"), at(200, 10)), (RowId::new("/c"), at(250, 30))],
                TiePolicy::Overwrite,
            )
            .unwrap();
        assert_eq!(out.changes.len(), 1);
        assert_eq!(out.data.get("/a").unwrap().value, Value::Integer(10));
        assert_eq!(out.data.get("/c").unwrap().value, Value::Integer(3));
        assert_eq!(out.data.date, from_epoch_millis(300));
    }

    #[test]
    fn redundant_delivery_is_a_no_op() {
        let d = data();
        assert!(d.apply(&[(RowId::new("/a"), at(100, 1))], TiePolicy::Overwrite).is_none());
    }

    #[test]
    fn ties_follow_policy() {
        let d = data();
        let change = [(RowId::new("/a"), at(100, 7))];
        let out = d.apply(&change, TiePolicy::Overwrite).unwrap();
        assert_eq!(out.conflicts, vec![RowId::new("/a")]);
        assert_eq!(out.data.get("/a").unwrap().value, Value::Integer(7));
        assert!(d.apply(&change, TiePolicy::KeepCurrent).is_none());
    }

    #[test]
    fn diffs_against_date_and_vector() {
        let d = data();
        let rows = rows();
        let since = d.changed_since(from_epoch_millis(150), &rows, |_| true);
        assert_eq!(since, vec![(RowId::new("/c"), at(300, 3))]);

        let mut peer = FxHashMap::default();
        peer.insert(RowId::new("/a"), from_epoch_millis(100));
        let newer = d.rows_newer_than(&peer, &rows, |_| true);
        assert_eq!(newer, vec![(RowId::new("/c"), at(300, 3))]);

        let dates = d.row_dates(&rows, |r| r.id != "/c");
        assert_eq!(dates, vec![(RowId::new("/a"), from_epoch_millis(100))]);
    }

    #[test]
    fn change_filtering() {
        let cdc = ColumnDataChange::new(
            "/x",
            "/n",
            vec![(RowId::new("/a"), at(5, 1)), (RowId::new("/b"), at(9, 2))],
        );
        assert_eq!(cdc.date, from_epoch_millis(9));
        let only_b = cdc.filter_rows(|r| r == "/b").unwrap();
        assert_eq!(only_b.changed_values.len(), 1);
        assert!(cdc.filter_rows(|_| false).is_none());
    }
}
