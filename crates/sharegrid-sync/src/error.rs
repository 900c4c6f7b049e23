use sharegrid_common::NodeId;
use sharegrid_eval::CompileError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("unknown peer {0}")]
    UnknownPeer(NodeId),

    #[error("node actor has stopped")]
    ChannelClosed,

    #[error("invalid config: {0}")]
    Config(String),

    #[error("malformed JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("malformed YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error(transparent)]
    Compile(#[from] CompileError),
}

impl<T> From<tokio::sync::mpsc::error::SendError<T>> for SyncError {
    fn from(_: tokio::sync::mpsc::error::SendError<T>) -> Self {
        SyncError::ChannelClosed
    }
}

impl From<tokio::sync::oneshot::error::RecvError> for SyncError {
    fn from(_: tokio::sync::oneshot::error::RecvError) -> Self {
        SyncError::ChannelClosed
    }
}
