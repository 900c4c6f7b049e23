use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use sharegrid_common::{CellType, ColumnId, NodeId, RowId};

use super::{Column, Row};
use crate::error::SchemaError;
use crate::filter::UpdateFilter;

fn all() -> String {
    "<all>".to_string()
}

/// Serializable column definition as produced by catalog loaders.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnSpec {
    pub id: String,
    #[serde(default)]
    pub info: String,
    /// Owning node; defaults to the column id.
    #[serde(default)]
    pub node: Option<String>,
    #[serde(default = "all")]
    pub send: String,
    #[serde(default = "all")]
    pub receive: String,
    #[serde(default)]
    pub attrs: Vec<String>,
}

impl ColumnSpec {
    pub fn new(id: impl Into<String>) -> Self {
        ColumnSpec {
            id: id.into(),
            info: String::new(),
            node: None,
            send: all(),
            receive: all(),
            attrs: Vec::new(),
        }
    }

    pub fn build(&self) -> Result<Column, SchemaError> {
        let id = ColumnId::new(&self.id);
        Ok(Column {
            node: NodeId::new(self.node.as_deref().unwrap_or(&self.id)),
            filter: UpdateFilter::new(&self.send, &self.receive, &self.id)?,
            info: self.info.clone(),
            attrs: self.attrs.iter().cloned().collect::<BTreeSet<_>>(),
            id,
        })
    }
}

/// Serializable row definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RowSpec {
    pub id: String,
    #[serde(default)]
    pub info: String,
    #[serde(rename = "type")]
    pub cell_type: String,
    #[serde(default = "all")]
    pub send: String,
    #[serde(default = "all")]
    pub receive: String,
    #[serde(default)]
    pub attrs: Vec<String>,
}

impl RowSpec {
    pub fn new(id: impl Into<String>, cell_type: CellType) -> Self {
        RowSpec {
            id: id.into(),
            info: String::new(),
            cell_type: cell_type.name().to_string(),
            send: all(),
            receive: all(),
            attrs: Vec::new(),
        }
    }

    pub fn build(&self) -> Result<Row, SchemaError> {
        let cell_type = self
            .cell_type
            .parse::<CellType>()
            .map_err(|source| SchemaError::CellType {
                row: self.id.clone(),
                source,
            })?;
        Ok(Row {
            id: RowId::new(&self.id),
            info: self.info.clone(),
            cell_type,
            filter: UpdateFilter::new(&self.send, &self.receive, &self.id)?,
            attrs: self.attrs.iter().cloned().collect(),
        })
    }
}
