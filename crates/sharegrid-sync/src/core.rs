//! Sans-IO protocol driver for one node.
//!
//! [`NodeCore::handle`] consumes one [`Input`] and returns the messages to
//! send and the events to publish. The caller owns transport and timers.

use chrono::TimeDelta;
use sharegrid_common::{NodeId, Timestamp};
use sharegrid_eval::{
    ChangeError, ChangeSource, ColumnDataChange, ConstraintChanges, ConstraintSpec, FormulaSpec,
    FunctionRegistry, Node, UpdateResult, Updater,
};

use crate::config::SyncConfig;
use crate::error::SyncError;
use crate::message::{ChangeMessage, NodeState, Pong, SyncMessage};
use crate::reconcile::{may_send, reconcile, respond_to_outdated};
use crate::state::{PeerRole, Phase, SyncState};

#[derive(Clone, Debug)]
pub enum Input {
    PeerConnected(NodeId),
    PeerDisconnected(NodeId),
    Message { peer: NodeId, msg: SyncMessage },
    /// Explicit change entered on this node.
    LocalChange(ColumnDataChange),
    /// Run the time-triggered pass.
    Tick,
    /// Ping every synchronized peer.
    PingPeers,
}

/// Notification for local observers.
#[derive(Clone, Debug)]
pub enum NodeEvent {
    /// Changes applied to the node, in application order.
    Updated(Vec<ColumnDataChange>),
    Constraints(ConstraintChanges),
    Rejected {
        source: String,
        errors: Vec<ChangeError>,
    },
    PeerSynced(NodeId),
    PeerLost(NodeId),
    RoundTrip { peer: NodeId, rtt: TimeDelta },
}

#[derive(Clone, Debug)]
pub enum Output {
    Send { peer: NodeId, msg: SyncMessage },
    Event(NodeEvent),
}

/// A node, its orchestration state, and its peers.
#[derive(Debug)]
pub struct NodeCore {
    node: Node,
    updater: Updater,
    sync: SyncState,
}

impl NodeCore {
    pub fn new(node: Node, updater: Updater) -> Self {
        let sync = SyncState::new(node.id.clone(), node.upstream_id.clone());
        NodeCore {
            node,
            updater,
            sync,
        }
    }

    /// Compile `formulas` and `constraints` against `node`.
    pub fn compile(
        node: Node,
        registry: &FunctionRegistry,
        formulas: &[FormulaSpec],
        constraints: &[ConstraintSpec],
        config: &SyncConfig,
    ) -> Result<Self, SyncError> {
        if node.id != config.node_id {
            return Err(SyncError::Config(format!(
                "config is for {} but the node is {}",
                config.node_id, node.id
            )));
        }
        if node.upstream_id != config.upstream_id {
            return Err(SyncError::Config(format!(
                "config names upstream {} but {} has upstream {}",
                display_upstream(config.upstream_id.as_ref()),
                node.id,
                display_upstream(node.upstream_id.as_ref()),
            )));
        }
        let updater = Updater::compile(&node, registry, formulas, constraints, config.eval.clone())?;
        Ok(Self::new(node, updater))
    }

    pub fn node(&self) -> &Node {
        &self.node
    }

    pub fn updater(&self) -> &Updater {
        &self.updater
    }

    pub fn sync_state(&self) -> &SyncState {
        &self.sync
    }

    /// Arm triggers and compute never-written formula cells. No peers are
    /// connected yet, so only events come back.
    pub fn initialize(&mut self, now: Timestamp) -> Vec<Output> {
        let result = self.updater.initialize(&self.node, now);
        let mut out = Vec::new();
        self.publish(result, None, &mut out);
        out
    }

    pub fn handle(&mut self, input: Input, now: Timestamp) -> Vec<Output> {
        let mut out = Vec::new();
        match input {
            Input::PeerConnected(peer) => self.on_connected(peer, now, &mut out),
            Input::PeerDisconnected(peer) => {
                if self.sync.disconnect(&peer).is_some() {
                    tracing::info!(%peer, "peer disconnected");
                    out.push(Output::Event(NodeEvent::PeerLost(peer)));
                }
            }
            Input::Message { peer, msg } => self.on_message(peer, msg, now, &mut out),
            Input::LocalChange(change) => {
                let result =
                    self.updater
                        .apply_change(&self.node, &change, &ChangeSource::Device, now);
                self.publish(result, None, &mut out);
            }
            Input::Tick => {
                if !self.sync.upstream_ready() {
                    tracing::debug!("upstream not synchronized, skipping time-triggered pass");
                } else {
                    let result = self.updater.tick(&self.node, now);
                    self.publish(result, None, &mut out);
                }
            }
            Input::PingPeers => {
                let peers: Vec<NodeId> = self.sync.synced_peers().map(|(p, _)| p.clone()).collect();
                for peer in peers {
                    let ping = self.sync.ping(&peer, now);
                    out.push(Output::Send {
                        peer,
                        msg: SyncMessage::Ping(ping),
                    });
                }
            }
        }
        out
    }

    fn on_connected(&mut self, peer: NodeId, now: Timestamp, out: &mut Vec<Output>) {
        let role = self.sync.connect(&peer, now);
        tracing::info!(%peer, %role, "peer connected");
        // the downstream side opens the handshake
        if role == PeerRole::Upstream {
            let state = NodeState::for_peer(&self.node, &peer, role);
            out.push(Output::Send {
                peer,
                msg: SyncMessage::NodeState(state),
            });
        }
    }

    fn on_message(&mut self, peer: NodeId, msg: SyncMessage, now: Timestamp, out: &mut Vec<Output>) {
        let Some((role, phase)) = self.sync.peer(&peer).map(|p| (p.role, p.phase)) else {
            tracing::warn!(%peer, kind = msg.kind(), "message from unknown peer dropped");
            return;
        };
        match msg {
            SyncMessage::NodeState(state) => {
                if state.node_id != peer {
                    tracing::warn!(%peer, claimed = %state.node_id, "NodeState sender mismatch");
                }
                let state = NodeState {
                    node_id: peer.clone(),
                    ..state
                };
                self.on_node_state(peer, role, &state, out);
            }
            SyncMessage::ColumnDataChange(_)
                if role == PeerRole::Downstream && phase == Phase::Handshaking =>
            {
                tracing::warn!(%peer, "change before handshake dropped");
            }
            SyncMessage::ColumnDataChange(change) => {
                let change = change.decode(&self.node);
                let source = match role {
                    PeerRole::Upstream => ChangeSource::Upstream(peer.clone()),
                    PeerRole::Downstream => ChangeSource::Downstream(peer.clone()),
                };
                let result = self.updater.apply_change(&self.node, &change, &source, now);
                self.publish(result, Some(&peer), out);
            }
            SyncMessage::Ping(ping) => {
                if ping.receiver != self.node.id {
                    tracing::warn!(%peer, receiver = %ping.receiver, "ping addressed to another node");
                }
                out.push(Output::Send {
                    peer,
                    msg: SyncMessage::Pong(Pong { date: now, ping }),
                });
            }
            SyncMessage::Pong(pong) => match self.sync.pong(&peer, &pong, now) {
                Ok(rtt) => {
                    tracing::trace!(%peer, rtt_ms = rtt.num_milliseconds(), "pong");
                    out.push(Output::Event(NodeEvent::RoundTrip { peer, rtt }));
                }
                Err(mismatch) => tracing::warn!(%peer, ?mismatch, "unexpected pong"),
            },
        }
    }

    fn on_node_state(&mut self, peer: NodeId, role: PeerRole, state: &NodeState, out: &mut Vec<Output>) {
        match role {
            // a downstream peer opened the handshake
            PeerRole::Downstream => {
                let rec = reconcile(&self.node, state, role);
                for change in &rec.changes {
                    out.push(send_change(&peer, change));
                }
                out.push(Output::Send {
                    peer: peer.clone(),
                    msg: SyncMessage::NodeState(rec.outdated),
                });
            }
            // our upstream closed the handshake
            PeerRole::Upstream => {
                for change in respond_to_outdated(&self.node, state, role) {
                    out.push(send_change(&peer, &change));
                }
                for change in self.sync.take_backlog(&peer) {
                    out.push(send_change(&peer, &change));
                }
            }
        }
        if self.sync.mark_synced(&peer) {
            tracing::info!(%peer, %role, "handshake complete");
            out.push(Output::Event(NodeEvent::PeerSynced(peer)));
        }
    }

    /// Adopt `result` and fan its changes out. The explicit change (the
    /// first) is not echoed back to `origin`.
    fn publish(&mut self, result: UpdateResult, origin: Option<&NodeId>, out: &mut Vec<Output>) {
        let UpdateResult {
            node,
            changes,
            constraint_changes,
            rejected,
        } = result;
        self.node = node;

        if !rejected.is_empty() {
            let source = origin.map_or_else(|| "device".to_string(), |p| p.to_string());
            out.push(Output::Event(NodeEvent::Rejected {
                source,
                errors: rejected,
            }));
        }
        for (i, change) in changes.iter().enumerate() {
            let skip = if i == 0 { origin } else { None };
            self.distribute(change, skip, out);
        }
        if !changes.is_empty() {
            out.push(Output::Event(NodeEvent::Updated(changes)));
        }
        if !constraint_changes.is_empty() {
            out.push(Output::Event(NodeEvent::Constraints(constraint_changes)));
        }
    }

    /// Queue `change` for every synchronized peer allowed to see it,
    /// limited to the rows each may see. Changes for an upstream still
    /// handshaking are held back until the handshake closes.
    fn distribute(&mut self, change: &ColumnDataChange, skip: Option<&NodeId>, out: &mut Vec<Output>) {
        let Some(column) = self.node.column(&change.column_id).cloned() else {
            return;
        };
        let targets: Vec<(NodeId, PeerRole, Phase)> = self
            .sync
            .peers()
            .filter(|(peer, _)| Some(*peer) != skip)
            .map(|(peer, p)| (peer.clone(), p.role, p.phase))
            .collect();
        for (peer, role, phase) in targets {
            if !may_send(&column.filter, role, &peer) {
                continue;
            }
            let node = &self.node;
            let Some(rows) = change.filter_rows(|row| {
                node.row(row)
                    .is_some_and(|r| may_send(&r.filter, role, &peer))
            }) else {
                continue;
            };
            match (phase, role) {
                (Phase::Synced, _) => out.push(send_change(&peer, &rows)),
                (Phase::Handshaking, PeerRole::Upstream) => self.sync.defer(&peer, rows),
                (Phase::Handshaking, PeerRole::Downstream) => {}
            }
        }
    }
}

fn display_upstream(id: Option<&NodeId>) -> &str {
    id.map_or("<none>", |id| id.as_str())
}

fn send_change(peer: &NodeId, change: &ColumnDataChange) -> Output {
    Output::Send {
        peer: peer.clone(),
        msg: SyncMessage::ColumnDataChange(ChangeMessage::from(change)),
    }
}

/// Convenience for callers that only need the messages.
pub fn messages_for<'a>(
    outputs: &'a [Output],
    peer: &NodeId,
) -> impl Iterator<Item = &'a SyncMessage> + use<'a> {
    let peer = peer.clone();
    outputs.iter().filter_map(move |o| match o {
        Output::Send { peer: p, msg } if *p == peer => Some(msg),
        _ => None,
    })
}
