//! Peer bookkeeping, free of I/O.

use std::collections::BTreeMap;
use std::fmt;

use chrono::TimeDelta;
use rustc_hash::FxHashMap;
use sharegrid_common::{NodeId, Timestamp};
use sharegrid_eval::ColumnDataChange;

use crate::message::{Ping, Pong};

/// Where a peer sits relative to this node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PeerRole {
    Upstream,
    Downstream,
}

impl fmt::Display for PeerRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            PeerRole::Upstream => "upstream",
            PeerRole::Downstream => "downstream",
        })
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Connected, handshake not complete. Incremental changes are neither
    /// forwarded to nor accepted from the peer, except the handshake's own.
    Handshaking,
    Synced,
}

#[derive(Clone, Debug)]
pub struct PeerState {
    pub role: PeerRole,
    pub phase: Phase,
    pub connected_at: Timestamp,
    pub last_rtt: Option<TimeDelta>,
    /// Local changes made while the handshake was open.
    backlog: Vec<ColumnDataChange>,
}

/// Why a pong was not accepted.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PongMismatch {
    /// No ping with this request number is outstanding.
    Unsolicited(u64),
    /// The pong echoes a ping sent to someone else.
    WrongPeer { expected: NodeId, found: NodeId },
}

/// Connected peers, their handshake progress, and outstanding pings.
#[derive(Clone, Debug)]
pub struct SyncState {
    own_id: NodeId,
    upstream_id: Option<NodeId>,
    peers: BTreeMap<NodeId, PeerState>,
    next_request: u64,
    pending: FxHashMap<u64, NodeId>,
}

impl SyncState {
    pub fn new(own_id: NodeId, upstream_id: Option<NodeId>) -> Self {
        SyncState {
            own_id,
            upstream_id,
            peers: BTreeMap::new(),
            next_request: 1,
            pending: FxHashMap::default(),
        }
    }

    pub fn own_id(&self) -> &NodeId {
        &self.own_id
    }

    pub fn upstream_id(&self) -> Option<&NodeId> {
        self.upstream_id.as_ref()
    }

    pub fn role_for(&self, peer: &NodeId) -> PeerRole {
        if self.upstream_id.as_ref() == Some(peer) {
            PeerRole::Upstream
        } else {
            PeerRole::Downstream
        }
    }

    /// Register `peer`, restarting its handshake if it was already known.
    pub fn connect(&mut self, peer: &NodeId, now: Timestamp) -> PeerRole {
        let role = self.role_for(peer);
        self.pending.retain(|_, p| p != peer);
        self.peers.insert(
            peer.clone(),
            PeerState {
                role,
                phase: Phase::Handshaking,
                connected_at: now,
                last_rtt: None,
                backlog: Vec::new(),
            },
        );
        role
    }

    pub fn disconnect(&mut self, peer: &NodeId) -> Option<PeerState> {
        self.pending.retain(|_, p| p != peer);
        self.peers.remove(peer)
    }

    pub fn peer(&self, peer: &NodeId) -> Option<&PeerState> {
        self.peers.get(peer)
    }

    pub fn peers(&self) -> impl Iterator<Item = (&NodeId, &PeerState)> {
        self.peers.iter()
    }

    /// Returns `false` for unknown peers.
    pub fn mark_synced(&mut self, peer: &NodeId) -> bool {
        match self.peers.get_mut(peer) {
            Some(p) => {
                p.phase = Phase::Synced;
                true
            }
            None => false,
        }
    }

    /// Hold `change` for `peer` until [`take_backlog`](Self::take_backlog).
    pub fn defer(&mut self, peer: &NodeId, change: ColumnDataChange) {
        if let Some(p) = self.peers.get_mut(peer) {
            p.backlog.push(change);
        }
    }

    pub fn take_backlog(&mut self, peer: &NodeId) -> Vec<ColumnDataChange> {
        self.peers
            .get_mut(peer)
            .map(|p| std::mem::take(&mut p.backlog))
            .unwrap_or_default()
    }

    pub fn is_synced(&self, peer: &NodeId) -> bool {
        self.peers.get(peer).is_some_and(|p| p.phase == Phase::Synced)
    }

    pub fn synced_peers(&self) -> impl Iterator<Item = (&NodeId, PeerRole)> {
        self.peers
            .iter()
            .filter(|(_, p)| p.phase == Phase::Synced)
            .map(|(id, p)| (id, p.role))
    }

    /// True unless an upstream is configured and not yet synchronized.
    pub fn upstream_ready(&self) -> bool {
        match &self.upstream_id {
            None => true,
            Some(up) => self.is_synced(up),
        }
    }

    pub fn ping(&mut self, peer: &NodeId, now: Timestamp) -> Ping {
        let request = self.next_request;
        self.next_request += 1;
        self.pending.insert(request, peer.clone());
        Ping {
            sender: self.own_id.clone(),
            receiver: peer.clone(),
            request,
            date: now,
        }
    }

    /// Match a pong against its ping and record the round trip.
    pub fn pong(&mut self, from: &NodeId, pong: &Pong, now: Timestamp) -> Result<TimeDelta, PongMismatch> {
        let request = pong.ping.request;
        let Some(expected) = self.pending.get(&request) else {
            return Err(PongMismatch::Unsolicited(request));
        };
        if expected != from || pong.ping.receiver != *from {
            return Err(PongMismatch::WrongPeer {
                expected: expected.clone(),
                found: from.clone(),
            });
        }
        self.pending.remove(&request);
        let rtt = now - pong.ping.date;
        if let Some(p) = self.peers.get_mut(from) {
            p.last_rtt = Some(rtt);
        }
        Ok(rtt)
    }
}
