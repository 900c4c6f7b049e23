//! Handshake reconciliation.
//!
//! The downstream side opens with [`NodeState::for_peer`]. The upstream
//! side answers with [`reconcile`]: the changes the peer lacks, followed by
//! a terminating `NodeState` listing what the peer has that is newer. The
//! downstream side closes the round with [`respond_to_outdated`].
//!
//! Columns are classified per peer. A column we may send to the peer is
//! read-write and reconciled row by row; a column we may only receive from
//! it is read-only and compared by column date. Anything else is not
//! exchanged.

use std::collections::BTreeMap;

use rustc_hash::FxHashMap;
use sharegrid_common::{EPOCH, NodeId, RowId, Timestamp, from_epoch_millis, to_epoch_millis};
use sharegrid_eval::{Column, ColumnDataChange, Node, Row, UpdateFilter};

use crate::message::NodeState;
use crate::state::PeerRole;

/// Whether `filter` lets data flow from us to `peer`.
pub fn may_send(filter: &UpdateFilter, role: PeerRole, peer: &str) -> bool {
    match role {
        PeerRole::Upstream => filter.send_to_upstream(peer),
        PeerRole::Downstream => filter.send_to_downstream(peer),
    }
}

/// Whether `filter` accepts data from `peer` about data owned by `owner`.
pub fn may_receive(filter: &UpdateFilter, role: PeerRole, peer: &str, owner: &str) -> bool {
    match role {
        PeerRole::Upstream => filter.receive_from_upstream(peer),
        PeerRole::Downstream => filter.receive_from_downstream(peer, owner),
    }
}

/// Rows of `column` that may travel to `peer`.
fn sendable<'a>(role: PeerRole, peer: &'a str) -> impl FnMut(&Row) -> bool + 'a {
    move |row| may_send(&row.filter, role, peer)
}

impl NodeState {
    /// Summary of `node` as seen by `peer`.
    pub fn for_peer(node: &Node, peer: &NodeId, role: PeerRole) -> NodeState {
        let mut state = NodeState::empty(node);
        for column in node.column_list.iter() {
            let Some(data) = node.column_data(&column.id) else {
                continue;
            };
            if may_send(&column.filter, role, peer) {
                let rows = data
                    .row_dates(&node.row_list, sendable(role, peer))
                    .into_iter()
                    .map(|(row, date)| (row, to_epoch_millis(&date)))
                    .collect();
                state.read_write_columns.insert(column.id.clone(), rows);
            } else if may_receive(&column.filter, role, peer, &column.node) {
                state
                    .read_only_columns
                    .insert(column.id.clone(), to_epoch_millis(&data.date));
            }
        }
        state
    }
}

/// Outcome of answering a peer's `NodeState`.
#[derive(Clone, Debug)]
pub struct Reconciliation {
    /// Changes the peer lacks, one per column.
    pub changes: Vec<ColumnDataChange>,
    /// Entries where the peer is newer, carrying our dates. Always sent,
    /// even when empty, to terminate the round.
    pub outdated: NodeState,
}

/// Compare `state` (sent by `peer`) against `node`.
#[tracing::instrument(level = "debug", skip_all, fields(node = %node.id, peer = %state.node_id))]
pub fn reconcile(node: &Node, state: &NodeState, role: PeerRole) -> Reconciliation {
    let peer = &state.node_id;
    if state.row_list_id != node.row_list.id || state.column_list_id != node.column_list.id {
        tracing::warn!(
            rows = %state.row_list_id,
            columns = %state.column_list_id,
            "peer uses different catalogs"
        );
    }

    let mut changes = Vec::new();
    let mut outdated = NodeState::empty(node);

    for (column_id, &theirs) in &state.read_only_columns {
        let (Some(column), Some(data)) = (node.column(column_id), node.column_data(column_id))
        else {
            tracing::warn!(column = %column_id, "peer listed an unknown column");
            continue;
        };
        let theirs = from_epoch_millis(theirs);
        if theirs < data.date && may_send(&column.filter, role, peer) {
            let cells = data.changed_since(theirs, &node.row_list, sendable(role, peer));
            if !cells.is_empty() {
                changes.push(ColumnDataChange::new(column.id.clone(), node.id.clone(), cells));
            }
        } else if theirs > data.date && may_receive(&column.filter, role, peer, &column.node) {
            outdated
                .read_only_columns
                .insert(column.id.clone(), to_epoch_millis(&data.date));
        }
    }

    for (column_id, rows) in &state.read_write_columns {
        let Some(column) = node.column(column_id) else {
            tracing::warn!(column = %column_id, "peer listed an unknown column");
            continue;
        };
        let theirs: FxHashMap<RowId, Timestamp> = rows
            .iter()
            .map(|(row, &ms)| (row.clone(), from_epoch_millis(ms)))
            .collect();
        if let Some(change) = rows_to_send(node, column, &theirs, peer, role) {
            changes.push(change);
        }
        let requested = rows_to_request(node, column, &theirs, peer, role);
        if !requested.is_empty() {
            outdated.read_write_columns.insert(column.id.clone(), requested);
        }
    }

    tracing::debug!(
        changes = changes.len(),
        outdated = outdated.read_only_columns.len() + outdated.read_write_columns.len(),
        "reconciled"
    );
    Reconciliation { changes, outdated }
}

/// Our cells the peer lacks: rows it does not list, rows where we are
/// newer, and on equal dates the rows of a column we own.
fn rows_to_send(
    node: &Node,
    column: &Column,
    theirs: &FxHashMap<RowId, Timestamp>,
    peer: &NodeId,
    role: PeerRole,
) -> Option<ColumnDataChange> {
    if !may_send(&column.filter, role, peer) {
        return None;
    }
    let data = node.column_data(&column.id)?;
    let own = node.is_own_column(column);
    let cells: Vec<_> = node
        .row_list
        .iter()
        .filter(|row| may_send(&row.filter, role, peer))
        .filter_map(|row| {
            let ours = data.get(&row.id)?;
            let send = match theirs.get(&row.id) {
                None => true,
                Some(t) => ours.date > *t || (ours.date == *t && own),
            };
            send.then(|| (row.id.clone(), ours.clone()))
        })
        .collect();
    (!cells.is_empty()).then(|| ColumnDataChange::new(column.id.clone(), node.id.clone(), cells))
}

/// Rows where the peer is newer, or ties on a column the peer owns, with
/// our date for each.
fn rows_to_request(
    node: &Node,
    column: &Column,
    theirs: &FxHashMap<RowId, Timestamp>,
    peer: &NodeId,
    role: PeerRole,
) -> BTreeMap<RowId, i64> {
    let mut out = BTreeMap::new();
    if !may_receive(&column.filter, role, peer, &column.node) {
        return out;
    }
    let peer_owns = column.node == *peer;
    for (row_id, their_date) in theirs {
        let Some(row) = node.row(row_id) else {
            tracing::trace!(row = %row_id, "peer listed an unknown row");
            continue;
        };
        if !may_receive(&row.filter, role, peer, &column.node) {
            continue;
        }
        let ours = node
            .cell_value(&column.id, &row.id)
            .map_or(EPOCH, |v| v.date);
        if *their_date > ours || (*their_date == ours && peer_owns && *their_date > EPOCH) {
            out.insert(row.id.clone(), to_epoch_millis(&ours));
        }
    }
    out
}

/// Answer the peer's terminating `NodeState`: send every listed entry we
/// hold at least as new as the date the peer recorded.
#[tracing::instrument(level = "debug", skip_all, fields(node = %node.id, peer = %outdated.node_id))]
pub fn respond_to_outdated(
    node: &Node,
    outdated: &NodeState,
    role: PeerRole,
) -> Vec<ColumnDataChange> {
    let peer = &outdated.node_id;
    let mut changes = Vec::new();

    for (column_id, &since) in &outdated.read_only_columns {
        let (Some(column), Some(data)) = (node.column(column_id), node.column_data(column_id))
        else {
            tracing::warn!(column = %column_id, "peer requested an unknown column");
            continue;
        };
        if !may_send(&column.filter, role, peer) {
            continue;
        }
        let cells = data.changed_since(from_epoch_millis(since), &node.row_list, sendable(role, peer));
        if !cells.is_empty() {
            changes.push(ColumnDataChange::new(column.id.clone(), node.id.clone(), cells));
        }
    }

    for (column_id, rows) in &outdated.read_write_columns {
        let (Some(column), Some(data)) = (node.column(column_id), node.column_data(column_id))
        else {
            tracing::warn!(column = %column_id, "peer requested an unknown column");
            continue;
        };
        if !may_send(&column.filter, role, peer) {
            continue;
        }
        let cells: Vec<_> = node
            .row_list
            .iter()
            .filter(|row| may_send(&row.filter, role, peer))
            .filter_map(|row| {
                let since = from_epoch_millis(*rows.get(&row.id)?);
                let ours = data.get(&row.id)?;
                (ours.date >= since).then(|| (row.id.clone(), ours.clone()))
            })
            .collect();
        if !cells.is_empty() {
            changes.push(ColumnDataChange::new(column.id.clone(), node.id.clone(), cells));
        }
    }
    changes
}
