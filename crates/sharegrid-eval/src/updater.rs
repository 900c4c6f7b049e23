//! Change orchestration: apply explicit changes, re-evaluate dependent
//! formulas, check constraints, and run the time-triggered pass.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use sharegrid_common::{CellType, CellValue, ColumnId, EPOCH, NodeId, RowId, Timestamp};

use crate::column_data::{ColumnDataChange, TiePolicy};
use crate::context::EvalContext;
use crate::error::{ChangeError, CompileError};
use crate::filter::UpdateFilter;
use crate::formula::{ConstraintKey, ConstraintSet, ConstraintSpec, FormulaSet, FormulaSpec};
use crate::function_registry::FunctionRegistry;
use crate::node::Node;

/// Orchestration settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EvalConfig {
    /// Upper bound on sweeps over all formula columns per change. Each
    /// sweep re-evaluates formulas whose inputs got newer during the
    /// previous one.
    pub max_cascade_passes: usize,
    /// Compute never-written formula cells at startup.
    pub bootstrap: bool,
}

impl Default for EvalConfig {
    fn default() -> Self {
        Self {
            max_cascade_passes: 16,
            bootstrap: true,
        }
    }
}

/// Where an explicit change came from.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum ChangeSource {
    /// Local input on this node.
    Device,
    Upstream(NodeId),
    Downstream(NodeId),
}

impl ChangeSource {
    fn admits(&self, filter: &UpdateFilter, own: &NodeId, target: &NodeId) -> bool {
        match self {
            ChangeSource::Device => filter.receive_from_device(own, target),
            ChangeSource::Upstream(peer) => filter.receive_from_upstream(peer),
            ChangeSource::Downstream(peer) => filter.receive_from_downstream(peer, target),
        }
    }

    pub fn peer(&self) -> Option<&NodeId> {
        match self {
            ChangeSource::Device => None,
            ChangeSource::Upstream(p) | ChangeSource::Downstream(p) => Some(p),
        }
    }
}

impl fmt::Display for ChangeSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeSource::Device => f.write_str("device"),
            ChangeSource::Upstream(p) => write!(f, "upstream {p}"),
            ChangeSource::Downstream(p) => write!(f, "downstream {p}"),
        }
    }
}

/// A constraint transition.
#[derive(Clone, Debug, PartialEq)]
pub struct ConstraintResult {
    pub key: ConstraintKey,
    pub info: Arc<str>,
    pub date: Timestamp,
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstraintChanges {
    pub violated: Vec<ConstraintResult>,
    pub resolved: Vec<ConstraintResult>,
}

impl ConstraintChanges {
    pub fn is_empty(&self) -> bool {
        self.violated.is_empty() && self.resolved.is_empty()
    }

    fn extend(&mut self, other: ConstraintChanges) {
        self.violated.extend(other.violated);
        self.resolved.extend(other.resolved);
    }
}

/// Outcome of one orchestration step.
#[derive(Clone, Debug)]
pub struct UpdateResult {
    pub node: Node,
    /// Applied changes in application order: explicit first, then derived.
    pub changes: Vec<ColumnDataChange>,
    pub constraint_changes: ConstraintChanges,
    pub rejected: Vec<ChangeError>,
}

impl UpdateResult {
    fn unchanged(node: &Node) -> Self {
        UpdateResult {
            node: node.clone(),
            changes: Vec::new(),
            constraint_changes: ConstraintChanges::default(),
            rejected: Vec::new(),
        }
    }

    pub fn is_unchanged(&self) -> bool {
        self.changes.is_empty() && self.constraint_changes.is_empty()
    }
}

/// Owns a node's compiled formulas and constraints plus constraint state,
/// and drives every update of that node.
#[derive(Clone, Debug)]
pub struct Updater {
    formulas: FormulaSet,
    constraints: ConstraintSet,
    violated: FxHashSet<ConstraintKey>,
    config: EvalConfig,
}

impl Updater {
    pub fn new(formulas: FormulaSet, constraints: ConstraintSet, config: EvalConfig) -> Self {
        Updater {
            formulas,
            constraints,
            violated: FxHashSet::default(),
            config,
        }
    }

    /// Compile both tables against `node`.
    pub fn compile(
        node: &Node,
        registry: &FunctionRegistry,
        formulas: &[FormulaSpec],
        constraints: &[ConstraintSpec],
        config: EvalConfig,
    ) -> Result<Self, CompileError> {
        Ok(Self::new(
            FormulaSet::compile(node, registry, formulas)?,
            ConstraintSet::compile(node, registry, constraints)?,
            config,
        ))
    }

    pub fn formulas(&self) -> &FormulaSet {
        &self.formulas
    }

    pub fn constraints(&self) -> &ConstraintSet {
        &self.constraints
    }

    pub fn config(&self) -> &EvalConfig {
        &self.config
    }

    /// Currently violated constraints.
    pub fn violations(&self) -> impl Iterator<Item = &ConstraintKey> {
        self.violated.iter()
    }

    /// Arm every trigger and compute formula cells that were never written.
    #[tracing::instrument(level = "debug", skip_all, fields(node = %node.id))]
    pub fn initialize(&mut self, node: &Node, now: Timestamp) -> UpdateResult {
        for f in self.formulas.iter_mut() {
            if let Some(t) = f.trigger.as_mut() {
                t.arm(now);
            }
        }
        for c in self.constraints.iter_mut() {
            if let Some(t) = c.trigger.as_mut() {
                t.arm(now);
            }
        }

        let mut ctx = EvalContext::new(node.clone(), now);
        let mut changes = Vec::new();
        if self.config.bootstrap {
            let columns: Vec<ColumnId> = self.formulas.column_ids().cloned().collect();
            for column in &columns {
                ctx.set_current_column(column);
                for f in self.formulas.column(column).unwrap_or_default() {
                    let stored = ctx.node().cell_value(&f.column, &f.row).is_some();
                    if stored || (!f.is_time_triggered() && !f.dependencies.is_empty()) {
                        continue;
                    }
                    ctx.set_current_row(&f.row);
                    ctx.set_eval_date(now);
                    let value = f.evaluate(&ctx);
                    ctx.set_current_cell(value);
                }
                changes.extend(ctx.commit());
            }
        }

        let (node, derived) = self.evaluate_dependents(ctx.into_node(), None, now);
        changes.extend(derived);
        let constraint_changes = self.check_constraints(&node, now, Pass::Startup);
        tracing::debug!(changes = changes.len(), "initialized");
        UpdateResult {
            node,
            changes,
            constraint_changes,
            rejected: Vec::new(),
        }
    }

    /// Apply an explicit change and everything that follows from it.
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(column = %change.column_id, source = %source)
    )]
    pub fn apply_change(
        &mut self,
        node: &Node,
        change: &ColumnDataChange,
        source: &ChangeSource,
        now: Timestamp,
    ) -> UpdateResult {
        let mut result = UpdateResult::unchanged(node);

        let Some(column) = node.column(&change.column_id) else {
            let err = ChangeError::UnknownColumn(change.column_id.to_string());
            tracing::warn!(%err, "rejected change");
            result.rejected.push(err);
            return result;
        };
        if !source.admits(&column.filter, &node.id, &column.node) {
            let err = ChangeError::ColumnFiltered {
                column: column.id.to_string(),
                source_kind: source.to_string(),
            };
            tracing::warn!(%err, "rejected change");
            result.rejected.push(err);
            return result;
        }

        let mut accepted: Vec<(RowId, CellValue)> = Vec::with_capacity(change.changed_values.len());
        for (row_id, value) in &change.changed_values {
            match self.validate_cell(node, column.id.as_str(), &column.node, row_id, value, source) {
                Ok(v) => accepted.push((row_id.clone(), v)),
                Err(err) => {
                    tracing::warn!(%err, "rejected cell");
                    result.rejected.push(err);
                }
            }
        }
        if accepted.is_empty() {
            return result;
        }

        let ties = if node.is_own_column(column) && change.change_node_id != node.id {
            TiePolicy::KeepCurrent
        } else {
            TiePolicy::Overwrite
        };
        let Some(data) = node.column_data(&column.id) else {
            return result;
        };
        let Some(applied) = data.apply(&accepted, ties) else {
            tracing::trace!("change carried nothing new");
            return result;
        };
        for row in &applied.conflicts {
            tracing::warn!(
                column = %column.id,
                %row,
                kept_own = ties == TiePolicy::KeepCurrent,
                "equal timestamps with different values"
            );
        }

        let column_id = column.id.clone();
        let explicit = ColumnDataChange {
            column_id: column_id.clone(),
            change_node_id: change.change_node_id.clone(),
            date: change.date,
            changed_values: applied.changes,
        };
        let updated = node.with_column_data(applied.data);
        let (updated, derived) = self.evaluate_dependents(updated, Some(&column_id), now);

        result.changes.push(explicit);
        result.changes.extend(derived);
        result.constraint_changes = self.check_constraints(&updated, now, Pass::Values);
        result.node = updated;
        result
    }

    fn validate_cell(
        &self,
        node: &Node,
        column: &str,
        owner: &NodeId,
        row_id: &RowId,
        value: &CellValue,
        source: &ChangeSource,
    ) -> Result<CellValue, ChangeError> {
        let Some(row) = node.row(row_id) else {
            return Err(ChangeError::UnknownRow {
                column: column.to_string(),
                row: row_id.to_string(),
            });
        };
        if *source == ChangeSource::Device && row.is_locked() {
            return Err(ChangeError::LockedRow(row_id.to_string()));
        }
        if !source.admits(&row.filter, &node.id, owner) {
            return Err(ChangeError::Filtered {
                column: column.to_string(),
                row: row_id.to_string(),
                source_kind: source.to_string(),
            });
        }
        let found = value.cell_type();
        match value.value.clone().coerce_to(row.cell_type) {
            Some(v) => Ok(CellValue::new(v, value.date)),
            None => Err(ChangeError::TypeMismatch {
                row: row_id.to_string(),
                expected: row.cell_type,
                found,
            }),
        }
    }

    /// Time-triggered pass: evaluate every due formula unconditionally,
    /// then cascade and check constraints, including due time-triggered
    /// ones.
    #[tracing::instrument(level = "debug", skip_all, fields(node = %node.id))]
    pub fn tick(&mut self, node: &Node, now: Timestamp) -> UpdateResult {
        let mut ctx = EvalContext::new(node.clone(), now);
        ctx.set_eval_date(now);
        let mut changes = Vec::new();
        let columns: Vec<ColumnId> = self.formulas.column_ids().cloned().collect();
        for column in &columns {
            let Some(formulas) = self.formulas.column_mut(column) else {
                continue;
            };
            ctx.set_current_column(column);
            for f in formulas.iter_mut() {
                let Some(trigger) = f.trigger.as_mut() else {
                    continue;
                };
                if !trigger.is_due(now) {
                    continue;
                }
                trigger.fire(now);
                ctx.set_current_row(&f.row);
                let value = f.evaluate(&ctx);
                ctx.set_current_cell(value);
            }
            changes.extend(ctx.commit());
        }

        let first = changes.first().map(|c| c.column_id.clone());
        let (node, derived) = self.evaluate_dependents(ctx.into_node(), first.as_ref(), now);
        changes.extend(derived);
        let mut constraint_changes = self.check_constraints(&node, now, Pass::Values);
        constraint_changes.extend(self.check_constraints(&node, now, Pass::Timed));
        if !changes.is_empty() {
            tracing::debug!(changes = changes.len(), "time-triggered pass");
        }
        UpdateResult {
            node,
            changes,
            constraint_changes,
            rejected: Vec::new(),
        }
    }

    /// Re-evaluate value-triggered formulas whose dependencies are newer
    /// than their cell, sweeping columns until nothing changes. `first`
    /// is evaluated first in the initial sweep.
    fn evaluate_dependents(
        &self,
        node: Node,
        first: Option<&ColumnId>,
        now: Timestamp,
    ) -> (Node, Vec<ColumnDataChange>) {
        let mut order: Vec<&ColumnId> = Vec::new();
        if let Some(first) = first.and_then(|f| self.formulas.column_ids().find(|c| *c == f)) {
            order.push(first);
        }
        order.extend(self.formulas.column_ids().filter(|c| Some(*c) != first));

        let mut ctx = EvalContext::new(node, now);
        let mut changes = Vec::new();
        for pass in 0..self.config.max_cascade_passes {
            let mut changed = false;
            for column in &order {
                ctx.set_current_column(column);
                for f in self.formulas.column(column).unwrap_or_default() {
                    if f.is_time_triggered() {
                        continue;
                    }
                    ctx.set_current_row(&f.row);
                    let Some(current) = ctx.current_cell() else {
                        continue;
                    };
                    let newest = ctx.newest(&f.dependencies);
                    if newest <= current.date {
                        continue;
                    }
                    ctx.set_eval_date(newest);
                    let value = f.evaluate(&ctx);
                    if value.value_eq(&current) && current.date != EPOCH {
                        continue;
                    }
                    tracing::trace!(cell = %format_args!("{}:{}", f.column, f.row), %value, "evaluated");
                    ctx.set_current_cell(value);
                }
                if let Some(change) = ctx.commit() {
                    changes.push(change);
                    changed = true;
                }
            }
            if !changed {
                return (ctx.into_node(), changes);
            }
            tracing::trace!(pass, "cascade pass changed cells");
        }
        tracing::warn!(
            passes = self.config.max_cascade_passes,
            "formula cascade did not settle"
        );
        (ctx.into_node(), changes)
    }

    /// Evaluate constraints and record transitions. With `timed` unset,
    /// value-triggered constraints run when a dependency is newer than at
    /// their last check; with `timed` set, due time-triggered ones run.
    fn check_constraints(&mut self, node: &Node, now: Timestamp, pass: Pass) -> ConstraintChanges {
        let mut out = ConstraintChanges::default();
        let mut ctx = EvalContext::new(node.clone(), now);
        for c in self.constraints.iter_mut() {
            let newest = ctx.newest(&c.dependencies);
            match (c.trigger.as_mut(), pass) {
                (Some(t), Pass::Timed) if t.is_due(now) => t.fire(now),
                // dependency-free constraints are checked once
                (None, Pass::Startup) if c.dependencies.is_empty() => {}
                (None, Pass::Startup | Pass::Values) if newest > c.last_checked => {}
                _ => continue,
            }
            c.last_checked = newest.max(c.last_checked);

            ctx.set_current_column(&c.key.column);
            ctx.set_current_row(&c.key.row);
            ctx.set_eval_date(now);
            let holds = c.expr.eval(&ctx).value.as_bool().unwrap_or(true);
            let transition = ConstraintResult {
                key: c.key.clone(),
                info: Arc::clone(&c.info),
                date: now,
            };
            if !holds && self.violated.insert(c.key.clone()) {
                tracing::warn!(constraint = %c.key, info = %c.info, "constraint violated");
                out.violated.push(transition);
            } else if holds && self.violated.remove(&c.key) {
                tracing::info!(constraint = %c.key, "constraint resolved");
                out.resolved.push(transition);
            }
        }
        out
    }
}

/// Which constraints a check considers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Pass {
    Startup,
    Values,
    Timed,
}

/// Type of the value a change to `row` must carry, if the row exists.
pub fn expected_type(node: &Node, row: &str) -> Option<CellType> {
    node.row(row).map(|r| r.cell_type)
}
