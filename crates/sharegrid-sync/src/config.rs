use std::time::Duration;

use serde::{Deserialize, Serialize};
use sharegrid_common::NodeId;
use sharegrid_eval::EvalConfig;

use crate::error::SyncError;

fn default_tick_ms() -> u64 {
    1_000
}

fn default_ping_ms() -> u64 {
    30_000
}

fn default_inbox() -> usize {
    256
}

fn default_outbox() -> usize {
    1_024
}

fn default_events() -> usize {
    256
}

/// Runtime settings for one node.
///
/// ```yaml
/// nodeId: /providers/region1
/// upstreamId: /hub
/// tickIntervalMs: 500
/// eval:
///   maxCascadePasses: 8
/// ```
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncConfig {
    pub node_id: NodeId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub upstream_id: Option<NodeId>,
    /// Period of the time-triggered evaluation pass.
    #[serde(default = "default_tick_ms")]
    pub tick_interval_ms: u64,
    #[serde(default = "default_ping_ms")]
    pub ping_interval_ms: u64,
    /// Capacity of the actor's inbox.
    #[serde(default = "default_inbox")]
    pub inbox_capacity: usize,
    /// Capacity of each peer's outgoing queue. A peer that falls this far
    /// behind is disconnected and has to handshake again.
    #[serde(default = "default_outbox")]
    pub outbox_capacity: usize,
    #[serde(default = "default_events")]
    pub event_capacity: usize,
    #[serde(default)]
    pub eval: EvalConfig,
}

impl SyncConfig {
    pub fn new(node_id: impl Into<NodeId>) -> Self {
        SyncConfig {
            node_id: node_id.into(),
            upstream_id: None,
            tick_interval_ms: default_tick_ms(),
            ping_interval_ms: default_ping_ms(),
            inbox_capacity: default_inbox(),
            outbox_capacity: default_outbox(),
            event_capacity: default_events(),
            eval: EvalConfig::default(),
        }
    }

    pub fn with_upstream(mut self, upstream: impl Into<NodeId>) -> Self {
        self.upstream_id = Some(upstream.into());
        self
    }

    pub fn from_json(src: &str) -> Result<Self, SyncError> {
        let config: SyncConfig = serde_json::from_str(src)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_yaml(src: &str) -> Result<Self, SyncError> {
        let config: SyncConfig = serde_yaml::from_str(src)?;
        config.validate()?;
        Ok(config)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn ping_interval(&self) -> Duration {
        Duration::from_millis(self.ping_interval_ms)
    }

    pub fn validate(&self) -> Result<(), SyncError> {
        if self.node_id.is_empty() {
            return Err(SyncError::Config("nodeId is empty".into()));
        }
        if self.upstream_id.as_ref() == Some(&self.node_id) {
            return Err(SyncError::Config(format!(
                "node {} cannot be its own upstream",
                self.node_id
            )));
        }
        if self.tick_interval_ms == 0 || self.ping_interval_ms == 0 {
            return Err(SyncError::Config("intervals must be positive".into()));
        }
        if self.inbox_capacity == 0 || self.outbox_capacity == 0 || self.event_capacity == 0 {
            return Err(SyncError::Config("channel capacities must be positive".into()));
        }
        Ok(())
    }
}
