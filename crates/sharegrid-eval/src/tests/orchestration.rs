use sharegrid_common::{CellType, NodeId, Value};

use super::{change, ledger, ledger_formulas, start, value};
use crate::error::ChangeError;
use crate::filter::UpdateFilter;
use crate::test_utils::{TestNode, at};
use crate::updater::ChangeSource;

fn upstream() -> ChangeSource {
    ChangeSource::Upstream(NodeId::new("/up"))
}

#[test]
fn initialize_computes_never_written_cells() {
    let node = ledger();
    let (_, init) = start(&node, &ledger_formulas(), &[]);
    assert_eq!(value(&init.node, "/calc", "total"), Some(Value::Integer(3)));
    assert_eq!(value(&init.node, "/report", "double"), Some(Value::Integer(6)));
    // derived dates follow the newest input, not the clock
    assert_eq!(init.node.cell_value("/calc", "total").unwrap().date, at(1_000));
    let columns: Vec<&str> = init.changes.iter().map(|c| c.column_id.as_str()).collect();
    assert_eq!(columns, ["/calc", "/report"]);
}

#[test]
fn initialize_is_quiet_when_results_are_current() {
    let node = ledger();
    let (mut updater, init) = start(&node, &ledger_formulas(), &[]);
    let again = updater.initialize(&init.node, at(2_000));
    assert!(again.is_unchanged());
}

#[test]
fn device_change_cascades_across_columns() {
    let node = ledger();
    let (mut updater, init) = start(&node, &ledger_formulas(), &[]);

    let res = updater.apply_change(
        &init.node,
        &change("/in", "/n", &[("a", Value::Integer(10), 5_000)]),
        &ChangeSource::Device,
        at(5_000),
    );
    assert!(res.rejected.is_empty());
    let columns: Vec<&str> = res.changes.iter().map(|c| c.column_id.as_str()).collect();
    // `/report` precedes `/calc` in the catalog so it settles on the second sweep
    assert_eq!(columns, ["/in", "/calc", "/report"]);
    assert_eq!(value(&res.node, "/calc", "total"), Some(Value::Integer(12)));
    assert_eq!(value(&res.node, "/report", "double"), Some(Value::Integer(24)));
    assert_eq!(res.node.cell_value("/report", "double").unwrap().date, at(5_000));
    // derived changes are attributed to this node
    assert!(res.changes.iter().all(|c| c.change_node_id == "/n"));
}

#[test]
fn unchanged_result_does_not_propagate() {
    let node = ledger();
    let (mut updater, init) = start(&node, &ledger_formulas(), &[]);
    // a + b stays 3
    let res = updater.apply_change(
        &init.node,
        &change(
            "/in",
            "/n",
            &[("a", Value::Integer(2), 5_000), ("b", Value::Integer(1), 5_000)],
        ),
        &ChangeSource::Device,
        at(5_000),
    );
    assert_eq!(res.changes.len(), 1);
    assert_eq!(
        res.node.cell_value("/calc", "total").unwrap().date,
        at(1_000)
    );
}

#[test]
fn stale_change_is_ignored() {
    let node = ledger();
    let (mut updater, init) = start(&node, &ledger_formulas(), &[]);
    let res = updater.apply_change(
        &init.node,
        &change("/in", "/up", &[("a", Value::Integer(50), 500)]),
        &upstream(),
        at(5_000),
    );
    assert!(res.is_unchanged());
    assert!(res.rejected.is_empty());
    assert_eq!(value(&res.node, "/in", "a"), Some(Value::Integer(1)));
}

#[test]
fn locked_rows_reject_device_input_only() {
    let node = ledger();
    let (mut updater, init) = start(&node, &ledger_formulas(), &[]);

    let c = change("/in", "/n", &[("limit", Value::Integer(5), 5_000)]);
    let res = updater.apply_change(&init.node, &c, &ChangeSource::Device, at(5_000));
    assert_eq!(res.rejected, [ChangeError::LockedRow("limit".into())]);
    assert!(res.is_unchanged());

    let c = change("/in", "/up", &[("limit", Value::Integer(5), 5_000)]);
    let res = updater.apply_change(&init.node, &c, &upstream(), at(5_000));
    assert!(res.rejected.is_empty());
    assert_eq!(value(&res.node, "/in", "limit"), Some(Value::Integer(5)));
}

#[test]
fn partial_rejection_keeps_valid_cells() {
    let node = ledger();
    let (mut updater, init) = start(&node, &ledger_formulas(), &[]);
    let c = change(
        "/in",
        "/n",
        &[
            ("a", Value::Integer(4), 5_000),
            ("nope", Value::Integer(1), 5_000),
            ("b", Value::Bool(true), 5_000),
        ],
    );
    let res = updater.apply_change(&init.node, &c, &ChangeSource::Device, at(5_000));
    assert_eq!(res.rejected.len(), 2);
    assert!(matches!(res.rejected[0], ChangeError::UnknownRow { .. }));
    assert_eq!(
        res.rejected[1],
        ChangeError::TypeMismatch {
            row: "b".into(),
            expected: CellType::Integer,
            found: CellType::Bool,
        }
    );
    assert_eq!(res.changes[0].changed_values.len(), 1);
    assert_eq!(value(&res.node, "/calc", "total"), Some(Value::Integer(6)));
}

#[test]
fn unknown_column_is_rejected() {
    let node = ledger();
    let (mut updater, init) = start(&node, &ledger_formulas(), &[]);
    let c = change("/missing", "/n", &[("a", Value::Integer(1), 5_000)]);
    let res = updater.apply_change(&init.node, &c, &ChangeSource::Device, at(5_000));
    assert_eq!(res.rejected, [ChangeError::UnknownColumn("/missing".into())]);
}

#[test]
fn integers_widen_for_real_rows() {
    let node = ledger();
    let (mut updater, init) = start(&node, &ledger_formulas(), &[]);
    let c = change("/in", "/n", &[("rate", Value::Integer(3), 5_000)]);
    let res = updater.apply_change(&init.node, &c, &ChangeSource::Device, at(5_000));
    assert!(res.rejected.is_empty());
    assert_eq!(value(&res.node, "/in", "rate"), Some(Value::Real(3.0)));
}

#[test]
fn column_filter_limits_sources() {
    let node = TestNode::new("/n")
        .upstream("/up")
        .filtered_column(
            "/guarded",
            "/n",
            UpdateFilter::new("<all>", "<up>", "/guarded").unwrap(),
        )
        .row("a", CellType::Integer)
        .build();
    let (mut updater, init) = start(&node, &[], &[]);
    let c = change("/guarded", "/x", &[("a", Value::Integer(1), 5_000)]);

    let res = updater.apply_change(&init.node, &c, &ChangeSource::Device, at(5_000));
    assert!(matches!(&res.rejected[..], [ChangeError::ColumnFiltered { .. }]));

    let res = updater.apply_change(
        &init.node,
        &c,
        &ChangeSource::Downstream(NodeId::new("/child")),
        at(5_000),
    );
    assert!(matches!(&res.rejected[..], [ChangeError::ColumnFiltered { .. }]));

    let res = updater.apply_change(&init.node, &c, &upstream(), at(5_000));
    assert!(res.rejected.is_empty());
    assert_eq!(value(&res.node, "/guarded", "a"), Some(Value::Integer(1)));
}

#[test]
fn row_filter_applies_per_cell() {
    let node = TestNode::new("/n")
        .upstream("/up")
        .column("/c")
        .row("open", CellType::Integer)
        .filtered_row(
            "local",
            CellType::Integer,
            UpdateFilter::new("<none>", "<self>", "local").unwrap(),
        )
        .build();
    let (mut updater, init) = start(&node, &[], &[]);
    let c = change(
        "/c",
        "/up",
        &[("open", Value::Integer(1), 5_000), ("local", Value::Integer(2), 5_000)],
    );
    let res = updater.apply_change(&init.node, &c, &upstream(), at(5_000));
    assert!(matches!(
        &res.rejected[..],
        [ChangeError::Filtered { row, .. }] if row == "local"
    ));
    assert_eq!(value(&res.node, "/c", "open"), Some(Value::Integer(1)));
    assert_eq!(value(&res.node, "/c", "local"), None);

    let res = updater.apply_change(&init.node, &c, &ChangeSource::Device, at(5_000));
    assert!(res.rejected.is_empty());
    assert_eq!(value(&res.node, "/c", "local"), Some(Value::Integer(2)));
}

#[test]
fn owner_keeps_its_value_on_timestamp_ties() {
    let node = ledger();
    let (mut updater, init) = start(&node, &ledger_formulas(), &[]);

    // `/in` is ours: a foreign write with an equal date loses
    let foreign = change("/in", "/up", &[("a", Value::Integer(7), 1_000)]);
    let res = updater.apply_change(&init.node, &foreign, &upstream(), at(5_000));
    assert!(res.is_unchanged());
    assert_eq!(value(&res.node, "/in", "a"), Some(Value::Integer(1)));

    // `/remote` is not ours: the incoming value wins
    let node = res.node;
    let first = change("/remote", "/peer", &[("a", Value::Integer(1), 1_000)]);
    let node = updater
        .apply_change(&node, &first, &upstream(), at(5_000))
        .node;
    let tie = change("/remote", "/peer", &[("a", Value::Integer(9), 1_000)]);
    let res = updater.apply_change(&node, &tie, &upstream(), at(5_000));
    assert_eq!(value(&res.node, "/remote", "a"), Some(Value::Integer(9)));
    assert_eq!(res.changes[0].change_node_id, "/peer");
}
