//! Wire messages exchanged between neighbouring nodes.
//!
//! Every message is a JSON object tagged with `type`:
//!
//! ```json
//! {"type": "ColumnDataChange", "columnId": "/providers/p1", "changeNodeId": "/providers/p1",
//!  "date": 1700000000000, "cells": {"load": {"value": 5}, "peak": {"value": 9, "date": 1699999990000}}}
//! ```
//!
//! Dates are epoch milliseconds. A cell without its own `date` takes the
//! message date.

use std::collections::BTreeMap;

use chrono::serde::ts_milliseconds;
use serde::{Deserialize, Serialize};
use sharegrid_common::{
    CellValue, ColumnId, NodeId, RowId, Timestamp, Value, from_epoch_millis, to_epoch_millis,
};
use sharegrid_eval::{ColumnDataChange, Node, updater::expected_type};

use crate::error::SyncError;

/// Epoch milliseconds.
pub type Millis = i64;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum SyncMessage {
    NodeState(NodeState),
    ColumnDataChange(ChangeMessage),
    Ping(Ping),
    Pong(Pong),
}

impl SyncMessage {
    pub fn to_json(&self) -> Result<String, SyncError> {
        Ok(serde_json::to_string(self)?)
    }

    pub fn from_json(src: &str) -> Result<Self, SyncError> {
        Ok(serde_json::from_str(src)?)
    }

    pub fn kind(&self) -> &'static str {
        match self {
            SyncMessage::NodeState(_) => "NodeState",
            SyncMessage::ColumnDataChange(_) => "ColumnDataChange",
            SyncMessage::Ping(_) => "Ping",
            SyncMessage::Pong(_) => "Pong",
        }
    }
}

/// A node's data-freshness summary for one peer.
///
/// Sent by the downstream side to open a handshake; sent back by the
/// upstream side, listing what it found outdated on its end, to close it.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NodeState {
    pub node_id: NodeId,
    pub row_list_id: String,
    #[serde(with = "ts_milliseconds")]
    pub row_list_date: Timestamp,
    pub column_list_id: String,
    #[serde(with = "ts_milliseconds")]
    pub column_list_date: Timestamp,
    /// Columns the sender only consumes, with their column date.
    #[serde(default)]
    pub read_only_columns: BTreeMap<ColumnId, Millis>,
    /// Columns the sender also writes, with per-row dates.
    #[serde(default)]
    pub read_write_columns: BTreeMap<ColumnId, BTreeMap<RowId, Millis>>,
}

impl NodeState {
    /// A summary with no column entries.
    pub fn empty(node: &Node) -> Self {
        NodeState {
            node_id: node.id.clone(),
            row_list_id: node.row_list.id.clone(),
            row_list_date: node.row_list.date,
            column_list_id: node.column_list.id.clone(),
            column_list_date: node.column_list.date,
            read_only_columns: BTreeMap::new(),
            read_write_columns: BTreeMap::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.read_only_columns.is_empty() && self.read_write_columns.is_empty()
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct WireCell {
    pub value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date: Option<Millis>,
}

/// Wire form of a [`ColumnDataChange`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChangeMessage {
    pub column_id: ColumnId,
    pub change_node_id: NodeId,
    pub date: Millis,
    pub cells: BTreeMap<RowId, WireCell>,
}

impl From<&ColumnDataChange> for ChangeMessage {
    fn from(change: &ColumnDataChange) -> Self {
        let date = to_epoch_millis(&change.date);
        let cells = change
            .changed_values
            .iter()
            .map(|(row, cv)| {
                let cell_date = to_epoch_millis(&cv.date);
                let cell = WireCell {
                    value: cv.value.clone(),
                    date: (cell_date != date).then_some(cell_date),
                };
                (row.clone(), cell)
            })
            .collect();
        ChangeMessage {
            column_id: change.column_id.clone(),
            change_node_id: change.change_node_id.clone(),
            date,
            cells,
        }
    }
}

impl ChangeMessage {
    /// Rebuild the change against `node`'s catalogs: cells come back in
    /// row-list order (unknown rows last) and numeric payloads take the
    /// row's type, so `5` lands as a Real in a Real row.
    pub fn decode(&self, node: &Node) -> ColumnDataChange {
        let mut cells: Vec<(Option<usize>, RowId, CellValue)> = self
            .cells
            .iter()
            .map(|(row, cell)| {
                let value = match expected_type(node, row) {
                    Some(t) => cell.value.clone().coerce_to(t).unwrap_or_else(|| cell.value.clone()),
                    None => cell.value.clone(),
                };
                let date = from_epoch_millis(cell.date.unwrap_or(self.date));
                (node.row_list.index_of(row), row.clone(), CellValue::new(value, date))
            })
            .collect();
        cells.sort_by_key(|(index, _, _)| index.unwrap_or(usize::MAX));
        ColumnDataChange {
            column_id: self.column_id.clone(),
            change_node_id: self.change_node_id.clone(),
            date: from_epoch_millis(self.date),
            changed_values: cells.into_iter().map(|(_, r, v)| (r, v)).collect(),
        }
    }
}

/// Liveness probe.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Ping {
    pub sender: NodeId,
    pub receiver: NodeId,
    pub request: u64,
    #[serde(with = "ts_milliseconds")]
    pub date: Timestamp,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pong {
    #[serde(with = "ts_milliseconds")]
    pub date: Timestamp,
    pub ping: Ping,
}
