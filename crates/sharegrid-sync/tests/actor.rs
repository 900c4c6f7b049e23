//! Node actors wired together in-process.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};
use std::time::Duration;

use sharegrid_common::{CellValue, EPOCH, NodeId, RowId, Value, from_epoch_millis};
use sharegrid_eval::{
    ChangeError, ColumnDataChange, ColumnList, ColumnSpec, FormulaSpec, FunctionRegistry, Node,
    RowList, RowSpec,
};
use sharegrid_sync::{
    Clock, NodeActor, NodeCore, NodeEvent, NodeHandle, NodeState, SyncConfig, SyncError, link,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tokio::task::JoinHandle;

const COLUMNS: &str = r#"
- id: /a/x
  node: /a
  send: <down>
- id: /b/y
  node: /b
"#;

const ROWS: &str = r#"
- id: r1
  type: int
- id: clock
  type: int
"#;

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn manual_clock(ms: &Arc<AtomicI64>) -> Clock {
    let ms = Arc::clone(ms);
    Arc::new(move || from_epoch_millis(ms.load(Ordering::SeqCst)))
}

fn spawn(config: SyncConfig, formulas: &[FormulaSpec], clock: Clock) -> (NodeHandle, JoinHandle<()>) {
    let columns: Vec<ColumnSpec> = serde_yaml::from_str(COLUMNS).unwrap();
    let rows: Vec<RowSpec> = serde_yaml::from_str(ROWS).unwrap();
    let node = Node::new(
        config.node_id.clone(),
        config.upstream_id.clone(),
        ColumnList::from_specs("columns", EPOCH, &columns).unwrap(),
        RowList::from_specs("rows", EPOCH, &rows).unwrap(),
    );
    let core = NodeCore::compile(node, &FunctionRegistry::with_builtins(), formulas, &[], &config)
        .unwrap_or_else(|e| panic!("{e}"));
    NodeActor::spawn_with_clock(core, &config, clock)
}

fn set(column: &str, node: &str, row: &str, v: i64, ms: i64) -> ColumnDataChange {
    ColumnDataChange::new(
        column,
        node,
        vec![(RowId::new(row), CellValue::new(v, from_epoch_millis(ms)))],
    )
}

async fn wait_for(
    events: &mut broadcast::Receiver<NodeEvent>,
    mut pred: impl FnMut(&NodeEvent) -> bool,
) -> NodeEvent {
    let found = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(RecvError::Lagged(_)) => {}
                Err(RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await;
    found.expect("timed out waiting for event")
}

#[tokio::test]
async fn linked_actors_replicate_owner_changes() {
    init_tracing();
    let ms = Arc::new(AtomicI64::new(1_000));
    let (a, a_task) = spawn(SyncConfig::new("/a"), &[], manual_clock(&ms));
    let (b, b_task) = spawn(SyncConfig::new("/b").with_upstream("/a"), &[], manual_clock(&ms));

    let mut b_events = b.subscribe();
    link(&a, &b).await.unwrap();
    wait_for(&mut b_events, |e| matches!(e, NodeEvent::PeerSynced(p) if p == "/a")).await;

    ms.store(2_000, Ordering::SeqCst);
    let rejected = a.local_change(set("/a/x", "/a", "r1", 5, 2_000)).await.unwrap();
    assert!(rejected.is_empty(), "{rejected:?}");

    wait_for(&mut b_events, |e| {
        matches!(e, NodeEvent::Updated(changes) if changes.iter().any(|c| c.column_id == "/a/x"))
    })
    .await;
    let node = b.snapshot().await.unwrap();
    assert_eq!(
        node.cell_value("/a/x", "r1"),
        Some(&CellValue::new(5i64, from_epoch_millis(2_000)))
    );

    // /b/y flows back up
    let mut a_events = a.subscribe();
    b.local_change(set("/b/y", "/b", "r1", 7, 2_500)).await.unwrap();
    wait_for(&mut a_events, |e| matches!(e, NodeEvent::Updated(_))).await;
    let node = a.snapshot().await.unwrap();
    assert_eq!(node.cell_value("/b/y", "r1").unwrap().value, Value::Integer(7));

    a.shutdown().await.unwrap();
    b.shutdown().await.unwrap();
    a_task.await.unwrap();
    b_task.await.unwrap();
}

#[tokio::test]
async fn local_change_reports_rejections() {
    let ms = Arc::new(AtomicI64::new(1_000));
    let (a, _task) = spawn(SyncConfig::new("/a"), &[], manual_clock(&ms));
    let rejected = a.local_change(set("/nowhere", "/a", "r1", 1, 1_000)).await.unwrap();
    assert!(matches!(&rejected[..], [ChangeError::UnknownColumn(c)] if c == "/nowhere"));
}

#[tokio::test]
async fn slow_peer_is_disconnected() {
    init_tracing();
    let ms = Arc::new(AtomicI64::new(1_000));
    let config = SyncConfig {
        outbox_capacity: 1,
        ..SyncConfig::new("/a")
    };
    let (a, _task) = spawn(config, &[], manual_clock(&ms));
    let mut events = a.subscribe();
    a.local_change(set("/a/x", "/a", "r1", 5, 500)).await.unwrap();

    // never drained
    let _outbox = a.connect("/c").await.unwrap();
    let mut state = NodeState::empty(&a.snapshot().await.unwrap());
    state.node_id = NodeId::new("/c");
    state.read_only_columns.insert("/a/x".into(), 0);
    a.deliver("/c", sharegrid_sync::SyncMessage::NodeState(state))
        .await
        .unwrap();

    // one change and the closing NodeState do not fit
    wait_for(&mut events, |e| matches!(e, NodeEvent::PeerLost(p) if p == "/c")).await;
}

#[tokio::test]
async fn malformed_json_is_refused() {
    let ms = Arc::new(AtomicI64::new(1_000));
    let (a, _task) = spawn(SyncConfig::new("/a"), &[], manual_clock(&ms));
    assert!(matches!(
        a.deliver_json("/c", r#"{"type":"Gossip"}"#).await,
        Err(SyncError::Json(_))
    ));
    a.deliver_json("/c", r#"{"type":"Ping","sender":"/c","receiver":"/a","request":1,"date":5}"#)
        .await
        .unwrap();
    // unconnected sender, dropped without a reply
    assert!(a.snapshot().await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn interval_drives_time_triggers() {
    let ms = Arc::new(AtomicI64::new(1_000));
    let formulas = [FormulaSpec::new("/a/x", "clock", "(now)").with_trigger("every 10s")];
    let (a, _task) = spawn(SyncConfig::new("/a"), &formulas, manual_clock(&ms));
    let mut events = a.subscribe();

    let node = a.snapshot().await.unwrap();
    assert_eq!(node.cell_value("/a/x", "clock").unwrap().value, Value::Integer(1_000));

    // the bootstrap Updated may still be queued; wait for the tick's
    ms.store(12_000, Ordering::SeqCst);
    wait_for(&mut events, |e| {
        matches!(e, NodeEvent::Updated(changes) if changes.iter().any(|c| {
            c.changed_values
                .iter()
                .any(|(row, v)| row == "clock" && v.value == Value::Integer(12_000))
        }))
    })
    .await;
    let node = a.snapshot().await.unwrap();
    assert_eq!(node.cell_value("/a/x", "clock").unwrap().value, Value::Integer(12_000));
}

#[tokio::test]
async fn handle_fails_after_shutdown() {
    let ms = Arc::new(AtomicI64::new(1_000));
    let (a, task) = spawn(SyncConfig::new("/a"), &[], manual_clock(&ms));
    a.shutdown().await.unwrap();
    task.await.unwrap();
    assert!(matches!(a.snapshot().await, Err(SyncError::ChannelClosed)));
}
