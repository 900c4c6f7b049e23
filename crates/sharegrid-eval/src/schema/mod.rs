//! Column and row catalogs.

mod spec;

pub use spec::{ColumnSpec, RowSpec};

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use sharegrid_common::{CellType, CellValue, ColumnId, EPOCH, NodeId, PathPattern, RowId, Timestamp};

use crate::error::SchemaError;
use crate::filter::UpdateFilter;

/// Attribute marking a row as writable only by formulas.
pub const LOCKED: &str = "locked";

/// A data owner/provider.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    pub id: ColumnId,
    pub info: String,
    /// Node authoritative for this column.
    pub node: NodeId,
    pub filter: UpdateFilter,
    pub attrs: BTreeSet<String>,
}

impl Column {
    pub fn new(id: impl Into<ColumnId>) -> Self {
        let id = id.into();
        Column {
            node: NodeId::new(id.as_str()),
            id,
            info: String::new(),
            filter: UpdateFilter::default(),
            attrs: BTreeSet::new(),
        }
    }

    pub fn with_node(mut self, node: impl Into<NodeId>) -> Self {
        self.node = node.into();
        self
    }

    pub fn with_filter(mut self, filter: UpdateFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn has_attr(&self, attr: &str) -> bool {
        self.attrs.contains(attr)
    }
}

/// A typed data slot present in every column.
#[derive(Clone, Debug, PartialEq)]
pub struct Row {
    pub id: RowId,
    pub info: String,
    pub cell_type: CellType,
    pub filter: UpdateFilter,
    pub attrs: BTreeSet<String>,
}

impl Row {
    pub fn new(id: impl Into<RowId>, cell_type: CellType) -> Self {
        Row {
            id: id.into(),
            info: String::new(),
            cell_type,
            filter: UpdateFilter::default(),
            attrs: BTreeSet::new(),
        }
    }

    pub fn with_filter(mut self, filter: UpdateFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn with_attr(mut self, attr: impl Into<String>) -> Self {
        self.attrs.insert(attr.into());
        self
    }

    pub fn is_locked(&self) -> bool {
        self.attrs.contains(LOCKED)
    }

    pub fn cell_ref(&self, column: &ColumnId) -> CellRef {
        CellRef {
            column: column.clone(),
            row: self.id.clone(),
            cell_type: self.cell_type,
        }
    }

    pub fn undefined_value(&self) -> CellValue {
        self.cell_type.undefined()
    }
}

/// A resolved, typed cell address.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct CellRef {
    pub column: ColumnId,
    pub row: RowId,
    pub cell_type: CellType,
}

impl fmt::Display for CellRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.column, self.row)
    }
}

pub trait CatalogEntry {
    const KIND: &'static str;
    fn key(&self) -> &str;
}

impl CatalogEntry for Column {
    const KIND: &'static str = "column";
    fn key(&self) -> &str {
        &self.id
    }
}

impl CatalogEntry for Row {
    const KIND: &'static str = "row";
    fn key(&self) -> &str {
        &self.id
    }
}

/// Ordered, id-unique list of schema entries.
///
/// Definition order drives evaluation scheduling and glob expansion.
#[derive(Clone, Debug)]
pub struct Catalog<T> {
    pub id: String,
    pub date: Timestamp,
    entries: Vec<Arc<T>>,
    index: FxHashMap<Arc<str>, usize>,
}

pub type ColumnList = Catalog<Column>;
pub type RowList = Catalog<Row>;

impl<T: CatalogEntry> Catalog<T> {
    pub fn new(
        id: impl Into<String>,
        date: Timestamp,
        entries: impl IntoIterator<Item = T>,
    ) -> Result<Self, SchemaError> {
        let mut catalog = Catalog {
            id: id.into(),
            date,
            entries: Vec::new(),
            index: FxHashMap::default(),
        };
        for entry in entries {
            let key: Arc<str> = Arc::from(entry.key());
            if catalog.index.contains_key(&key) {
                return Err(SchemaError::DuplicateId {
                    kind: T::KIND,
                    id: key.to_string(),
                });
            }
            catalog.index.insert(key, catalog.entries.len());
            catalog.entries.push(Arc::new(entry));
        }
        Ok(catalog)
    }

    pub fn empty(id: impl Into<String>) -> Self {
        Catalog {
            id: id.into(),
            date: EPOCH,
            entries: Vec::new(),
            index: FxHashMap::default(),
        }
    }

    pub fn get(&self, id: &str) -> Option<&Arc<T>> {
        self.index.get(id).map(|&i| &self.entries[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn index_of(&self, id: &str) -> Option<usize> {
        self.index.get(id).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<T>> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries whose id matches `pattern`, in definition order.
    pub fn matching<'a, 'p>(
        &'a self,
        pattern: &'p PathPattern,
    ) -> impl Iterator<Item = &'a Arc<T>> + use<'a, 'p, T> {
        self.entries.iter().filter(|e| pattern.is_match(e.key()))
    }
}

impl ColumnList {
    pub fn from_specs(
        id: impl Into<String>,
        date: Timestamp,
        specs: &[ColumnSpec],
    ) -> Result<Self, SchemaError> {
        let columns = specs
            .iter()
            .map(ColumnSpec::build)
            .collect::<Result<Vec<_>, _>>()?;
        Catalog::new(id, date, columns)
    }
}

impl RowList {
    pub fn from_specs(
        id: impl Into<String>,
        date: Timestamp,
        specs: &[RowSpec],
    ) -> Result<Self, SchemaError> {
        let rows = specs
            .iter()
            .map(RowSpec::build)
            .collect::<Result<Vec<_>, _>>()?;
        Catalog::new(id, date, rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rows() -> RowList {
        RowList::new(
            "rows",
            EPOCH,
            vec![
                Row::new("/data/a", CellType::Integer),
                Row::new("/data/b", CellType::Real),
                Row::new("/meta/c", CellType::String).with_attr(LOCKED),
            ],
        )
        .unwrap()
    }

    #[test]
    fn lookup_preserves_definition_order() {
        let rows = rows();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows.index_of("/data/b"), Some(1));
        assert!(rows.contains("/meta/c"));
        assert!(rows.get("/nope").is_none());
        let ids: Vec<_> = rows.iter().map(|r| r.id.to_string()).collect();
        assert_eq!(ids, ["/data/a", "/data/b", "/meta/c"]);
    }

    #[test]
    fn glob_matching() {
        let rows = rows();
        let p = PathPattern::new("/data/*").unwrap();
        let ids: Vec<_> = rows.matching(&p).map(|r| r.id.to_string()).collect();
        assert_eq!(ids, ["/data/a", "/data/b"]);
    }

    #[test]
    fn matches_outlive_the_pattern() {
        let rows = rows();
        let selected: Vec<&Arc<Row>> = {
            let p = PathPattern::new("/meta/*").unwrap();
            rows.matching(&p).collect()
        };
        assert_eq!(selected.len(), 1);
        assert_eq!(selected[0].id, "/meta/c");
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let err = ColumnList::new("cols", EPOCH, vec![Column::new("/x"), Column::new("/x")])
            .unwrap_err();
        assert!(matches!(err, SchemaError::DuplicateId { kind: "column", .. }));
    }

    #[test]
    fn rows_build_typed_refs() {
        let rows = rows();
        let row = rows.get("/data/b").unwrap();
        let r = row.cell_ref(&ColumnId::new("/x"));
        assert_eq!(r.cell_type, CellType::Real);
        assert_eq!(r.to_string(), "/x:/data/b");
        assert!(rows.get("/meta/c").unwrap().is_locked());
        assert!(row.undefined_value().is_undefined());
    }

    #[test]
    fn column_owner_defaults_to_its_id() {
        let c = Column::new("/providers/p1");
        assert_eq!(c.node, "/providers/p1");
        assert_eq!(c.with_node("/hub").node, "/hub");
    }
}
