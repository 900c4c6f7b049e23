//! Turns parsed formula text into typed, dependency-annotated expressions.
//!
//! References are resolved against the node's catalogs at compile time.
//! A reference part (column or row) is looked up first as a literal id and
//! then relative to the target cell's column or row, treated as a
//! directory (`.` is the target itself, `../b` a sibling). Glob parts fan
//! out into one argument per matching cell, columns outer and rows inner,
//! in catalog order, skipping the target cell itself.

use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;
use sharegrid_common::{CellType, CellValue, EPOCH, PathPattern, Value, is_glob, resolve_path};
use sharegrid_parse::{ASTNode, ASTNodeType, CellReference, Literal, parse};

use crate::builtins::numeric::ToRealFn;
use crate::context::EvalContext;
use crate::error::CompileError;
use crate::function::{ArgumentHandle, FnCaps, Function};
use crate::function_registry::FunctionRegistry;
use crate::node::Node;
use crate::schema::{Catalog, CatalogEntry, CellRef, Column, Row};

/// A compiled expression.
#[derive(Clone)]
pub enum ExprNode {
    Const(CellValue),
    Ref(CellRef),
    Call {
        func: Arc<dyn Function>,
        args: Vec<ExprNode>,
        cell_type: CellType,
    },
}

impl ExprNode {
    pub fn cell_type(&self) -> CellType {
        match self {
            ExprNode::Const(v) => v.cell_type(),
            ExprNode::Ref(r) => r.cell_type,
            ExprNode::Call { cell_type, .. } => *cell_type,
        }
    }

    /// Every cell reachable from this node.
    pub fn dependencies(&self) -> BTreeSet<CellRef> {
        let mut deps = BTreeSet::new();
        self.collect_dependencies(&mut deps);
        deps
    }

    fn collect_dependencies(&self, deps: &mut BTreeSet<CellRef>) {
        match self {
            ExprNode::Const(_) => {}
            ExprNode::Ref(r) => {
                deps.insert(r.clone());
            }
            ExprNode::Call { args, .. } => {
                for arg in args {
                    arg.collect_dependencies(deps);
                }
            }
        }
    }

    /// Whether any call depends on the evaluation clock.
    pub fn is_volatile(&self) -> bool {
        match self {
            ExprNode::Call { func, args, .. } => {
                func.caps().contains(FnCaps::VOLATILE) || args.iter().any(ExprNode::is_volatile)
            }
            _ => false,
        }
    }

    /// Evaluate against `ctx`. References yield the stored cell; calls are
    /// stamped with the context's evaluation date.
    pub fn eval(&self, ctx: &EvalContext) -> CellValue {
        match self {
            ExprNode::Const(v) => v.clone(),
            ExprNode::Ref(r) => ctx.cell_value(r),
            ExprNode::Call { func, args, .. } => {
                let handles: SmallVec<[ArgumentHandle<'_>; 4]> =
                    args.iter().map(|a| ArgumentHandle::new(a, ctx)).collect();
                CellValue::new(func.eval(&handles, ctx), ctx.eval_date())
            }
        }
    }
}

impl fmt::Debug for ExprNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprNode::Const(v) => write!(f, "Const({v})"),
            ExprNode::Ref(r) => write!(f, "Ref({r})"),
            ExprNode::Call {
                func,
                args,
                cell_type,
            } => f
                .debug_struct("Call")
                .field("func", &func.name())
                .field("args", args)
                .field("cell_type", cell_type)
                .finish(),
        }
    }
}

impl fmt::Display for ExprNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExprNode::Const(v) => match &v.value {
                Value::String(s) => write!(f, "{s:?}"),
                other => write!(f, "{other}"),
            },
            ExprNode::Ref(r) => write!(f, "{r}"),
            ExprNode::Call { func, args, .. } => {
                write!(f, "({}", func.name())?;
                for arg in args {
                    write!(f, " {arg}")?;
                }
                f.write_str(")")
            }
        }
    }
}

/// Compiles formula sources for cells of one node.
pub struct Compiler<'a> {
    node: &'a Node,
    registry: &'a FunctionRegistry,
}

impl<'a> Compiler<'a> {
    pub fn new(node: &'a Node, registry: &'a FunctionRegistry) -> Self {
        Self { node, registry }
    }

    /// Compile `src` as the formula of `column:row`. Integer results are
    /// promoted for Real rows; any other type mismatch is an error.
    pub fn compile(&self, src: &str, column: &Column, row: &Row) -> Result<ExprNode, CompileError> {
        let ast = parse(src)?;
        let expr = self.compile_root(&ast, column, row)?;
        match (expr.cell_type(), row.cell_type) {
            (found, expected) if found == expected => Ok(expr),
            (CellType::Integer, CellType::Real) => Ok(ExprNode::Call {
                func: Arc::new(ToRealFn),
                args: vec![expr],
                cell_type: CellType::Real,
            }),
            (found, expected) => Err(CompileError::ResultType { expected, found }),
        }
    }

    /// Compile `src` as a constraint evaluated at `column:row`; the result
    /// must be Bool.
    pub fn compile_constraint(
        &self,
        src: &str,
        column: &Column,
        row: &Row,
    ) -> Result<ExprNode, CompileError> {
        let ast = parse(src)?;
        let expr = self.compile_root(&ast, column, row)?;
        match expr.cell_type() {
            CellType::Bool => Ok(expr),
            other => Err(CompileError::NonBooleanConstraint(other)),
        }
    }

    fn compile_root(&self, ast: &ASTNode, column: &Column, row: &Row) -> Result<ExprNode, CompileError> {
        if let ASTNodeType::Reference { reference, .. } = &ast.node_type
            && reference.is_pattern()
        {
            return Err(CompileError::PatternAtRoot(reference.to_string()));
        }
        let mut nodes = self.compile_arg(ast, column, row)?;
        match nodes.pop() {
            Some(node) if nodes.is_empty() => Ok(node),
            _ => Err(CompileError::PatternAtRoot(ast.to_string())),
        }
    }

    fn compile_arg(
        &self,
        ast: &ASTNode,
        column: &Column,
        row: &Row,
    ) -> Result<Vec<ExprNode>, CompileError> {
        match &ast.node_type {
            ASTNodeType::Literal(lit) => Ok(vec![ExprNode::Const(literal_value(lit))]),
            ASTNodeType::Reference { reference, .. } => self.resolve_reference(reference, column, row),
            ASTNodeType::Function { name, args } => {
                let func = self
                    .registry
                    .get(name)
                    .ok_or_else(|| CompileError::UnknownFunction(name.clone()))?;
                let mut compiled = Vec::with_capacity(args.len());
                for arg in args {
                    compiled.extend(self.compile_arg(arg, column, row)?);
                }
                Ok(vec![typed_call(func, compiled)?])
            }
        }
    }

    fn resolve_reference(
        &self,
        reference: &CellReference,
        column: &Column,
        row: &Row,
    ) -> Result<Vec<ExprNode>, CompileError> {
        let columns = match &reference.column {
            None => vec![Arc::new(column.clone())],
            Some(spec) => lookup(&self.node.column_list, spec, &column.id)?
                .ok_or_else(|| CompileError::UnknownColumn(spec.clone()))?,
        };
        let rows = lookup(&self.node.row_list, &reference.row, &row.id)?
            .ok_or_else(|| CompileError::UnknownRow(reference.row.clone()))?;

        let pattern = reference.is_pattern();
        let mut out = Vec::with_capacity(columns.len() * rows.len());
        for c in &columns {
            for r in &rows {
                if pattern && c.id == column.id && r.id == row.id {
                    continue;
                }
                out.push(ExprNode::Ref(r.cell_ref(&c.id)));
            }
        }
        if out.is_empty() {
            return Err(CompileError::EmptyPattern(reference.to_string()));
        }
        Ok(out)
    }
}

/// Type-check a call against the function's declared signature.
fn typed_call(func: Arc<dyn Function>, args: Vec<ExprNode>) -> Result<ExprNode, CompileError> {
    if !func.arity().accepts(args.len()) {
        return Err(CompileError::Arity {
            function: func.name().to_string(),
            expected: func.arity(),
            found: args.len(),
        });
    }
    let types: Vec<CellType> = args.iter().map(ExprNode::cell_type).collect();
    for (index, found) in types.iter().enumerate() {
        let expected = func.arg_types(index);
        if !expected.accepts(*found) {
            return Err(CompileError::ArgumentType {
                function: func.name().to_string(),
                index,
                expected,
                found: *found,
            });
        }
    }
    let cell_type = func
        .return_type(&types)
        .ok_or_else(|| CompileError::IncompatibleArguments {
            function: func.name().to_string(),
            found: types.clone(),
        })?;
    Ok(ExprNode::Call {
        func,
        args,
        cell_type,
    })
}

/// Resolve `spec` against `catalog`. Globs yield every match (possibly
/// none); exact ids yield one entry or `None` when unknown.
fn lookup<T: CatalogEntry>(
    catalog: &Catalog<T>,
    spec: &str,
    base: &str,
) -> Result<Option<Vec<Arc<T>>>, CompileError> {
    if is_glob(spec) {
        let pattern = PathPattern::resolved(base, spec).map_err(|source| CompileError::Pattern {
            pattern: spec.to_string(),
            source,
        })?;
        return Ok(Some(catalog.matching(&pattern).cloned().collect()));
    }
    if let Some(entry) = catalog.get(spec) {
        return Ok(Some(vec![Arc::clone(entry)]));
    }
    let resolved = resolve_path(base, spec);
    Ok(catalog.get(&resolved).map(|e| vec![Arc::clone(e)]))
}

fn literal_value(lit: &Literal) -> CellValue {
    let value = match lit {
        Literal::Integer(i) => Value::Integer(*i),
        Literal::Real(r) => Value::Real(*r),
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Text(s) => Value::string(s),
    };
    CellValue::new(value, EPOCH)
}
