//! Tokio runtime for a [`NodeCore`].
//!
//! The actor owns the core and runs a select loop over:
//! 1. commands from [`NodeHandle`]s,
//! 2. the time-triggered evaluation interval,
//! 3. the ping interval.
//!
//! Each connected peer gets a bounded outgoing queue. A peer whose queue is
//! full or closed is disconnected; reconnecting starts a fresh handshake,
//! which recovers anything it missed.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sharegrid_common::{NodeId, Timestamp, truncate_millis};
use sharegrid_eval::{ChangeError, ColumnDataChange, Node};
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

use crate::config::SyncConfig;
use crate::core::{Input, NodeCore, NodeEvent, Output};
use crate::error::SyncError;
use crate::message::SyncMessage;

/// Source of the current time, truncated to milliseconds.
pub type Clock = Arc<dyn Fn() -> Timestamp + Send + Sync>;

pub fn system_clock() -> Clock {
    Arc::new(|| truncate_millis(Utc::now()))
}

#[derive(Debug)]
pub enum NodeMsg {
    PeerConnected {
        peer: NodeId,
        outbox: mpsc::Sender<SyncMessage>,
    },
    PeerMessage {
        peer: NodeId,
        msg: SyncMessage,
    },
    PeerDisconnected {
        peer: NodeId,
    },
    LocalChange {
        change: ColumnDataChange,
        resp: oneshot::Sender<Vec<ChangeError>>,
    },
    /// Run the time-triggered pass now.
    Tick,
    Snapshot {
        resp: oneshot::Sender<Node>,
    },
    Shutdown {
        resp: oneshot::Sender<()>,
    },
}

pub struct NodeActor {
    core: NodeCore,
    inbox: mpsc::Receiver<NodeMsg>,
    peers: BTreeMap<NodeId, mpsc::Sender<SyncMessage>>,
    events: broadcast::Sender<NodeEvent>,
    clock: Clock,
    tick_interval: Duration,
    ping_interval: Duration,
}

impl fmt::Debug for NodeActor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeActor")
            .field("node", &self.core.node().id)
            .field("peers", &self.peers.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl NodeActor {
    /// Start `core` on the current runtime with the system clock.
    pub fn spawn(core: NodeCore, config: &SyncConfig) -> (NodeHandle, JoinHandle<()>) {
        Self::spawn_with_clock(core, config, system_clock())
    }

    pub fn spawn_with_clock(
        core: NodeCore,
        config: &SyncConfig,
        clock: Clock,
    ) -> (NodeHandle, JoinHandle<()>) {
        let (tx, inbox) = mpsc::channel(config.inbox_capacity);
        let (events, _) = broadcast::channel(config.event_capacity);
        let handle = NodeHandle {
            node_id: core.node().id.clone(),
            tx,
            events: events.clone(),
            outbox_capacity: config.outbox_capacity,
        };
        let actor = NodeActor {
            core,
            inbox,
            peers: BTreeMap::new(),
            events,
            clock,
            tick_interval: config.tick_interval(),
            ping_interval: config.ping_interval(),
        };
        (handle, tokio::spawn(actor.run()))
    }

    fn now(&self) -> Timestamp {
        (self.clock)()
    }

    #[tracing::instrument(level = "info", skip_all, fields(node = %self.core.node().id))]
    async fn run(mut self) {
        let outputs = self.core.initialize(self.now());
        self.dispatch(outputs);

        let mut tick = tokio::time::interval_at(Instant::now() + self.tick_interval, self.tick_interval);
        tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut ping = tokio::time::interval_at(Instant::now() + self.ping_interval, self.ping_interval);
        ping.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                msg = self.inbox.recv() => match msg {
                    Some(NodeMsg::Shutdown { resp }) => {
                        let _ = resp.send(());
                        break;
                    }
                    Some(msg) => self.on_msg(msg),
                    None => break,
                },
                _ = tick.tick() => self.step(Input::Tick),
                _ = ping.tick() => self.step(Input::PingPeers),
            }
        }
        tracing::info!("node actor stopped");
    }

    fn step(&mut self, input: Input) {
        let outputs = self.core.handle(input, self.now());
        self.dispatch(outputs);
    }

    fn on_msg(&mut self, msg: NodeMsg) {
        match msg {
            NodeMsg::PeerConnected { peer, outbox } => {
                self.peers.insert(peer.clone(), outbox);
                self.step(Input::PeerConnected(peer));
            }
            NodeMsg::PeerMessage { peer, msg } => {
                if !self.peers.contains_key(&peer) {
                    tracing::warn!(%peer, kind = msg.kind(), "message from unconnected peer dropped");
                    return;
                }
                self.step(Input::Message { peer, msg });
            }
            NodeMsg::PeerDisconnected { peer } => {
                self.peers.remove(&peer);
                self.step(Input::PeerDisconnected(peer));
            }
            NodeMsg::LocalChange { change, resp } => {
                let outputs = self.core.handle(Input::LocalChange(change), self.now());
                let rejected = outputs
                    .iter()
                    .find_map(|o| match o {
                        Output::Event(NodeEvent::Rejected { errors, .. }) => Some(errors.clone()),
                        _ => None,
                    })
                    .unwrap_or_default();
                self.dispatch(outputs);
                let _ = resp.send(rejected);
            }
            NodeMsg::Tick => self.step(Input::Tick),
            NodeMsg::Snapshot { resp } => {
                let _ = resp.send(self.core.node().clone());
            }
            NodeMsg::Shutdown { resp } => {
                let _ = resp.send(());
            }
        }
    }

    fn dispatch(&mut self, outputs: Vec<Output>) {
        let mut dropped: Vec<NodeId> = Vec::new();
        for output in outputs {
            match output {
                Output::Send { peer, msg } => {
                    if dropped.contains(&peer) {
                        continue;
                    }
                    let Some(outbox) = self.peers.get(&peer) else {
                        tracing::trace!(%peer, "no outbox for peer");
                        continue;
                    };
                    match outbox.try_send(msg) {
                        Ok(()) => {}
                        Err(TrySendError::Full(_)) => {
                            tracing::warn!(%peer, "outbox full, disconnecting peer");
                            dropped.push(peer);
                        }
                        Err(TrySendError::Closed(_)) => {
                            tracing::debug!(%peer, "outbox closed");
                            dropped.push(peer);
                        }
                    }
                }
                Output::Event(event) => {
                    // no subscribers is fine
                    let _ = self.events.send(event);
                }
            }
        }
        for peer in dropped {
            self.peers.remove(&peer);
            self.step(Input::PeerDisconnected(peer));
        }
    }
}

/// Cloneable front end of a running [`NodeActor`].
#[derive(Clone, Debug)]
pub struct NodeHandle {
    node_id: NodeId,
    tx: mpsc::Sender<NodeMsg>,
    events: broadcast::Sender<NodeEvent>,
    outbox_capacity: usize,
}

impl NodeHandle {
    pub fn node_id(&self) -> &NodeId {
        &self.node_id
    }

    /// Register `peer`. Messages for it arrive on the returned receiver;
    /// the caller carries them over whatever transport links the two.
    pub async fn connect(&self, peer: impl Into<NodeId>) -> Result<mpsc::Receiver<SyncMessage>, SyncError> {
        let (outbox, rx) = mpsc::channel(self.outbox_capacity);
        self.tx
            .send(NodeMsg::PeerConnected {
                peer: peer.into(),
                outbox,
            })
            .await?;
        Ok(rx)
    }

    pub async fn deliver(&self, peer: impl Into<NodeId>, msg: SyncMessage) -> Result<(), SyncError> {
        self.tx
            .send(NodeMsg::PeerMessage {
                peer: peer.into(),
                msg,
            })
            .await?;
        Ok(())
    }

    pub async fn deliver_json(&self, peer: impl Into<NodeId>, json: &str) -> Result<(), SyncError> {
        let msg = SyncMessage::from_json(json)?;
        self.deliver(peer, msg).await
    }

    pub async fn disconnect(&self, peer: impl Into<NodeId>) -> Result<(), SyncError> {
        self.tx
            .send(NodeMsg::PeerDisconnected { peer: peer.into() })
            .await?;
        Ok(())
    }

    /// Apply a change entered on this node and return the cells it refused.
    pub async fn local_change(&self, change: ColumnDataChange) -> Result<Vec<ChangeError>, SyncError> {
        let (resp, rx) = oneshot::channel();
        self.tx.send(NodeMsg::LocalChange { change, resp }).await?;
        Ok(rx.await?)
    }

    pub async fn tick(&self) -> Result<(), SyncError> {
        self.tx.send(NodeMsg::Tick).await?;
        Ok(())
    }

    pub async fn snapshot(&self) -> Result<Node, SyncError> {
        let (resp, rx) = oneshot::channel();
        self.tx.send(NodeMsg::Snapshot { resp }).await?;
        Ok(rx.await?)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<NodeEvent> {
        self.events.subscribe()
    }

    pub async fn shutdown(&self) -> Result<(), SyncError> {
        let (resp, rx) = oneshot::channel();
        self.tx.send(NodeMsg::Shutdown { resp }).await?;
        Ok(rx.await?)
    }
}

/// Connect two in-process nodes and pump messages between them until
/// either side drops its queue.
pub async fn link(a: &NodeHandle, b: &NodeHandle) -> Result<(JoinHandle<()>, JoinHandle<()>), SyncError> {
    // register both sides before the first handshake message can arrive
    let to_b = a.connect(b.node_id().clone()).await?;
    let to_a = b.connect(a.node_id().clone()).await?;
    Ok((pump(to_b, a.node_id().clone(), b.clone()), pump(to_a, b.node_id().clone(), a.clone())))
}

fn pump(mut rx: mpsc::Receiver<SyncMessage>, from: NodeId, to: NodeHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            if to.deliver(from.clone(), msg).await.is_err() {
                break;
            }
        }
        tracing::debug!(%from, to = %to.node_id(), "link closed");
    })
}
