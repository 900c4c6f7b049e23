//! Meta crate re-exporting the ShareGrid building blocks. Depend on this
//! crate and pick layers with feature flags, or reach into the member
//! crates for deeper integration.

pub use sharegrid_common as common;
pub use sharegrid_common::{
    CellType, CellValue, ColumnId, NodeId, RowId, Timestamp, Value, from_epoch_millis,
    to_epoch_millis,
};

#[cfg(feature = "parse")]
pub use sharegrid_parse as parse;

#[cfg(feature = "eval")]
pub use sharegrid_eval as eval;

#[cfg(feature = "eval")]
pub use sharegrid_eval::{
    ChangeError, ChangeSource, ColumnDataChange, ColumnList, ColumnSpec, CompileError,
    ConstraintSpec, EvalConfig, FormulaSpec, FunctionRegistry, Node, RowList, RowSpec,
    UpdateFilter, UpdateResult, Updater,
};

#[cfg(feature = "sync")]
pub use sharegrid_sync as sync;

#[cfg(feature = "sync")]
pub use sharegrid_sync::{NodeActor, NodeCore, NodeEvent, NodeHandle, SyncConfig, SyncError, SyncMessage};

#[cfg(feature = "eval")]
pub mod doc_examples;
