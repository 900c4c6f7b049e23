//! Compiled formula and constraint tables.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use sharegrid_common::{CellValue, ColumnId, EPOCH, PathPattern, RowId, Timestamp, is_glob};

use crate::compiler::{Compiler, ExprNode};
use crate::context::EvalContext;
use crate::error::CompileError;
use crate::function_registry::FunctionRegistry;
use crate::node::Node;
use crate::schema::{Catalog, CatalogEntry, CellRef};
use crate::trigger::TimeTrigger;

/// A formula definition as loaded from the node's formula table.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FormulaSpec {
    pub column_pattern: String,
    pub row_pattern: String,
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
}

impl FormulaSpec {
    pub fn new(
        column_pattern: impl Into<String>,
        row_pattern: impl Into<String>,
        src: impl Into<String>,
    ) -> Self {
        FormulaSpec {
            column_pattern: column_pattern.into(),
            row_pattern: row_pattern.into(),
            src: src.into(),
            trigger: None,
        }
    }

    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }
}

/// A constraint definition.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstraintSpec {
    pub id: String,
    #[serde(default)]
    pub info: String,
    pub column_pattern: String,
    pub row_pattern: String,
    pub src: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trigger: Option<String>,
}

impl ConstraintSpec {
    pub fn new(
        id: impl Into<String>,
        column_pattern: impl Into<String>,
        row_pattern: impl Into<String>,
        src: impl Into<String>,
    ) -> Self {
        ConstraintSpec {
            id: id.into(),
            info: String::new(),
            column_pattern: column_pattern.into(),
            row_pattern: row_pattern.into(),
            src: src.into(),
            trigger: None,
        }
    }

    pub fn with_trigger(mut self, trigger: impl Into<String>) -> Self {
        self.trigger = Some(trigger.into());
        self
    }
}

/// A compiled expression bound to one cell.
#[derive(Clone, Debug)]
pub struct CellFormula {
    pub column: ColumnId,
    pub row: RowId,
    pub src: Arc<str>,
    pub expr: ExprNode,
    pub dependencies: BTreeSet<CellRef>,
    pub trigger: Option<TimeTrigger>,
}

impl CellFormula {
    /// Evaluate in `ctx`, stamping the result with the context's
    /// evaluation date.
    pub fn evaluate(&self, ctx: &EvalContext) -> CellValue {
        CellValue::new(self.expr.eval(ctx).value, ctx.eval_date())
    }

    pub fn is_time_triggered(&self) -> bool {
        self.trigger.is_some()
    }
}

/// Identity of one constraint instance.
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ConstraintKey {
    pub id: Arc<str>,
    pub column: ColumnId,
    pub row: RowId,
}

impl fmt::Display for ConstraintKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}:{}", self.id, self.column, self.row)
    }
}

#[derive(Clone, Debug)]
pub struct ConstraintFormula {
    pub key: ConstraintKey,
    pub info: Arc<str>,
    pub src: Arc<str>,
    pub expr: ExprNode,
    pub dependencies: BTreeSet<CellRef>,
    pub trigger: Option<TimeTrigger>,
    /// Newest dependency date seen at the last check.
    pub last_checked: Timestamp,
}

fn parse_trigger(spec: Option<&str>) -> Result<Option<TimeTrigger>, CompileError> {
    spec.map(str::parse::<TimeTrigger>).transpose()
}

/// Entries of `catalog` selected by `pattern`: every glob match, or the one
/// exact id (none if absent).
fn select<'a, T: CatalogEntry>(
    catalog: &'a Catalog<T>,
    pattern: &str,
) -> Result<Vec<&'a Arc<T>>, CompileError> {
    if is_glob(pattern) {
        let glob = PathPattern::new(pattern).map_err(|source| CompileError::Pattern {
            pattern: pattern.to_string(),
            source,
        })?;
        return Ok(catalog.matching(&glob).collect::<Vec<_>>());
    }
    Ok(catalog.get(pattern).into_iter().collect())
}

/// Value-triggered and time-triggered formulas of the node's own columns,
/// grouped by column in catalog order, rows in catalog order.
#[derive(Clone, Debug, Default)]
pub struct FormulaSet {
    columns: Vec<(ColumnId, Vec<CellFormula>)>,
}

impl FormulaSet {
    /// Compile every spec for the owned columns it selects. A later spec
    /// replaces an earlier one for the same cell.
    pub fn compile(
        node: &Node,
        registry: &FunctionRegistry,
        specs: &[FormulaSpec],
    ) -> Result<Self, CompileError> {
        let compiler = Compiler::new(node, registry);
        let mut by_cell: FxHashMap<(ColumnId, RowId), CellFormula> = FxHashMap::default();
        for spec in specs {
            let columns = select(&node.column_list, &spec.column_pattern)?;
            let rows = select(&node.row_list, &spec.row_pattern)?;
            for column in columns.into_iter().filter(|c| node.is_own_column(c)) {
                for row in &rows {
                    let expr = compiler
                        .compile(&spec.src, column, row)
                        .map_err(|e| e.in_cell(&column.id, &row.id))?;
                    let trigger = parse_trigger(spec.trigger.as_deref())
                        .map_err(|e| e.in_cell(&column.id, &row.id))?;
                    if trigger.is_none() && expr.is_volatile() {
                        tracing::warn!(
                            cell = %format_args!("{}:{}", column.id, row.id),
                            src = %spec.src,
                            "clock-dependent formula without a time trigger"
                        );
                    }
                    let formula = CellFormula {
                        column: column.id.clone(),
                        row: row.id.clone(),
                        src: Arc::from(spec.src.as_str()),
                        dependencies: expr.dependencies(),
                        expr,
                        trigger,
                    };
                    by_cell.insert((column.id.clone(), row.id.clone()), formula);
                }
            }
        }

        let mut columns = Vec::new();
        for column in node.column_list.iter() {
            let formulas: Vec<CellFormula> = node
                .row_list
                .iter()
                .filter_map(|row| by_cell.remove(&(column.id.clone(), row.id.clone())))
                .collect();
            if !formulas.is_empty() {
                columns.push((column.id.clone(), formulas));
            }
        }
        tracing::debug!(
            columns = columns.len(),
            formulas = columns.iter().map(|(_, f)| f.len()).sum::<usize>(),
            "compiled formulas"
        );
        Ok(FormulaSet { columns })
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn len(&self) -> usize {
        self.columns.iter().map(|(_, f)| f.len()).sum()
    }

    pub fn column_ids(&self) -> impl Iterator<Item = &ColumnId> {
        self.columns.iter().map(|(c, _)| c)
    }

    pub fn column(&self, id: &str) -> Option<&[CellFormula]> {
        self.columns
            .iter()
            .find(|(c, _)| c.as_str() == id)
            .map(|(_, f)| f.as_slice())
    }

    pub fn column_mut(&mut self, id: &str) -> Option<&mut Vec<CellFormula>> {
        self.columns
            .iter_mut()
            .find(|(c, _)| c.as_str() == id)
            .map(|(_, f)| f)
    }

    pub fn get(&self, column: &str, row: &str) -> Option<&CellFormula> {
        self.column(column)?.iter().find(|f| f.row == row)
    }

    pub fn iter(&self) -> impl Iterator<Item = &CellFormula> {
        self.columns.iter().flat_map(|(_, f)| f.iter())
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut CellFormula> {
        self.columns.iter_mut().flat_map(|(_, f)| f.iter_mut())
    }
}

/// Compiled constraints in spec order, then column and row order.
#[derive(Clone, Debug, Default)]
pub struct ConstraintSet {
    constraints: Vec<ConstraintFormula>,
}

impl ConstraintSet {
    /// Compile each spec for every column it selects, owned or not.
    pub fn compile(
        node: &Node,
        registry: &FunctionRegistry,
        specs: &[ConstraintSpec],
    ) -> Result<Self, CompileError> {
        let compiler = Compiler::new(node, registry);
        let mut constraints = Vec::new();
        for spec in specs {
            let columns = select(&node.column_list, &spec.column_pattern)?;
            let rows = select(&node.row_list, &spec.row_pattern)?;
            for column in &columns {
                for row in &rows {
                    let at = |e: CompileError| e.in_cell(&column.id, &row.id);
                    let expr = compiler
                        .compile_constraint(&spec.src, column, row)
                        .map_err(at)?;
                    let trigger = parse_trigger(spec.trigger.as_deref()).map_err(at)?;
                    constraints.push(ConstraintFormula {
                        key: ConstraintKey {
                            id: Arc::from(spec.id.as_str()),
                            column: column.id.clone(),
                            row: row.id.clone(),
                        },
                        info: Arc::from(spec.info.as_str()),
                        src: Arc::from(spec.src.as_str()),
                        dependencies: expr.dependencies(),
                        expr,
                        trigger,
                        last_checked: EPOCH,
                    });
                }
            }
        }
        Ok(ConstraintSet { constraints })
    }

    pub fn is_empty(&self) -> bool {
        self.constraints.is_empty()
    }

    pub fn len(&self) -> usize {
        self.constraints.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConstraintFormula> {
        self.constraints.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = &mut ConstraintFormula> {
        self.constraints.iter_mut()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_utils::numbers;

    fn reg() -> FunctionRegistry {
        FunctionRegistry::with_builtins()
    }

    #[test]
    fn formulas_compile_for_owned_columns_in_catalog_order() {
        let node = numbers();
        let specs = [
            FormulaSpec::new("/*", "out_integer", "(sum a b)"),
            FormulaSpec::new("/c", "out_real", "(sum a x)"),
        ];
        let set = FormulaSet::compile(&node, &reg(), &specs).unwrap();
        // /d is not owned by the fixture node
        assert_eq!(set.column_ids().map(|c| c.to_string()).collect::<Vec<_>>(), ["/c"]);
        let rows: Vec<_> = set.iter().map(|f| f.row.to_string()).collect();
        assert_eq!(rows, ["out_integer", "out_real"]);
    }

    #[test]
    fn later_specs_override_earlier_ones() {
        let node = numbers();
        let specs = [
            FormulaSpec::new("/c", "out_integer", "(sum a b)"),
            FormulaSpec::new("/c", "out_integer", "(diff b a)"),
        ];
        let set = FormulaSet::compile(&node, &reg(), &specs).unwrap();
        assert_eq!(set.len(), 1);
        assert_eq!(&*set.get("/c", "out_integer").unwrap().src, "(diff b a)");
    }

    #[test]
    fn errors_name_the_cell() {
        let node = numbers();
        let err = FormulaSet::compile(
            &node,
            &reg(),
            &[FormulaSpec::new("/c", "out_integer", "(sum nope)")],
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "/c:out_integer: unknown row 'nope'");

        let err = FormulaSet::compile(
            &node,
            &reg(),
            &[FormulaSpec::new("/c", "out_integer", "(now)").with_trigger("every never")],
        )
        .unwrap_err();
        assert!(matches!(err, CompileError::InCell { .. }));
    }

    #[test]
    fn constraints_compile_for_every_matching_column() {
        let node = numbers();
        let specs = [ConstraintSpec::new("positive", "/*", "a", "(gt . 0)")];
        let set = ConstraintSet::compile(&node, &reg(), &specs).unwrap();
        let keys: Vec<_> = set.iter().map(|c| c.key.to_string()).collect();
        assert_eq!(keys, ["positive@/c:a", "positive@/d:a"]);
    }

    #[test]
    fn specs_load_from_yaml() {
        let specs: Vec<FormulaSpec> = serde_yaml::from_str(
            "- columnPattern: /c\n  rowPattern: out_integer\n  src: (now)\n  trigger: every 1m\n",
        )
        .unwrap();
        let set = FormulaSet::compile(&numbers(), &reg(), &specs).unwrap();
        assert!(set.get("/c", "out_integer").unwrap().is_time_triggered());
    }
}
