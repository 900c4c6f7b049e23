use sharegrid_common::CellType;
use sharegrid_common::value::UnknownCellType;
use sharegrid_parse::ParserError;
use thiserror::Error;

use crate::function::{Arity, TypeSet};

/// Invalid column or row catalogs.
#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("duplicate {kind} id '{id}'")]
    DuplicateId { kind: &'static str, id: String },

    #[error("row '{row}': {source}")]
    CellType {
        row: String,
        #[source]
        source: UnknownCellType,
    },

    #[error("invalid filter token '{token}' in '{filter}'")]
    FilterToken { filter: String, token: String },

    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },
}

/// Formula or constraint source that cannot be turned into an executable
/// expression for its target cell.
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("syntax error: {0}")]
    Parse(#[from] ParserError),

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("unknown row '{0}'")]
    UnknownRow(String),

    #[error("pattern '{0}' matches no cells")]
    EmptyPattern(String),

    #[error("pattern '{0}' is only allowed as a function argument")]
    PatternAtRoot(String),

    #[error("invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: globset::Error,
    },

    #[error("{function}: expected {expected} arguments, got {found}")]
    Arity {
        function: String,
        expected: Arity,
        found: usize,
    },

    #[error("{function}: argument {index} is {found}, expected {expected}")]
    ArgumentType {
        function: String,
        index: usize,
        expected: TypeSet,
        found: CellType,
    },

    #[error("{function}: incompatible argument types {found:?}")]
    IncompatibleArguments {
        function: String,
        found: Vec<CellType>,
    },

    #[error("result is {found} but row holds {expected}")]
    ResultType { expected: CellType, found: CellType },

    #[error("constraint must yield bool, found {0}")]
    NonBooleanConstraint(CellType),

    #[error("invalid time trigger '{spec}': {reason}")]
    Trigger { spec: String, reason: String },

    #[error("{column}:{row}: {source}")]
    InCell {
        column: String,
        row: String,
        #[source]
        source: Box<CompileError>,
    },
}

impl CompileError {
    pub(crate) fn in_cell(self, column: &str, row: &str) -> Self {
        CompileError::InCell {
            column: column.to_string(),
            row: row.to_string(),
            source: Box::new(self),
        }
    }
}

/// Reasons a change (or part of one) was not applied.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChangeError {
    #[error("unknown column '{0}'")]
    UnknownColumn(String),

    #[error("unknown row '{row}' in change for column '{column}'")]
    UnknownRow { column: String, row: String },

    #[error("row '{0}' is locked")]
    LockedRow(String),

    #[error("row '{row}' holds {expected}, change carries {found}")]
    TypeMismatch {
        row: String,
        expected: CellType,
        found: CellType,
    },

    #[error("{source_kind} may not update {column}:{row}")]
    Filtered {
        column: String,
        row: String,
        source_kind: String,
    },

    #[error("{source_kind} may not update column '{column}'")]
    ColumnFiltered { column: String, source_kind: String },
}
