use std::cmp::Ordering;
use std::fmt::{self, Display};
use std::str::FromStr;
use std::sync::Arc;

use crate::time::{EPOCH, Timestamp};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/* ───────────────────────────── CellType ───────────────────────────── */

/// The closed set of value variants a row can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "lowercase"))]
pub enum CellType {
    Integer,
    Real,
    Bool,
    String,
    IntegerList,
}

impl CellType {
    pub const ALL: [CellType; 5] = [
        CellType::Integer,
        CellType::Real,
        CellType::Bool,
        CellType::String,
        CellType::IntegerList,
    ];

    /// The undefined sentinel of this variant: zero/empty payload, epoch date.
    pub fn undefined(self) -> CellValue {
        CellValue::new(self.undefined_value(), EPOCH)
    }

    pub fn undefined_value(self) -> Value {
        match self {
            CellType::Integer => Value::Integer(0),
            CellType::Real => Value::Real(0.0),
            CellType::Bool => Value::Bool(false),
            CellType::String => Value::String(Arc::from("")),
            CellType::IntegerList => Value::IntegerList(Arc::from(Vec::new())),
        }
    }

    pub fn is_numeric(self) -> bool {
        matches!(self, CellType::Integer | CellType::Real)
    }

    pub fn name(self) -> &'static str {
        match self {
            CellType::Integer => "integer",
            CellType::Real => "real",
            CellType::Bool => "bool",
            CellType::String => "string",
            CellType::IntegerList => "integerlist",
        }
    }
}

impl Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownCellType(pub String);

impl Display for UnknownCellType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown cell type '{}'", self.0)
    }
}

impl std::error::Error for UnknownCellType {}

impl FromStr for CellType {
    type Err = UnknownCellType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "integer" | "int" | "long" => Ok(CellType::Integer),
            "real" | "double" | "float" => Ok(CellType::Real),
            "bool" | "boolean" => Ok(CellType::Bool),
            "string" | "text" => Ok(CellType::String),
            "integerlist" | "intlist" | "integer_list" => Ok(CellType::IntegerList),
            _ => Err(UnknownCellType(s.to_string())),
        }
    }
}

/* ─────────────────────────────── Value ────────────────────────────── */

/// Payload of a cell, without its timestamp.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(untagged))]
pub enum Value {
    Integer(i64),
    Real(f64),
    Bool(bool),
    String(Arc<str>),
    IntegerList(Arc<[i64]>),
}

impl Value {
    pub fn string(s: impl AsRef<str>) -> Self {
        Value::String(Arc::from(s.as_ref()))
    }

    pub fn integer_list(items: impl Into<Vec<i64>>) -> Self {
        Value::IntegerList(Arc::from(items.into()))
    }

    pub fn cell_type(&self) -> CellType {
        match self {
            Value::Integer(_) => CellType::Integer,
            Value::Real(_) => CellType::Real,
            Value::Bool(_) => CellType::Bool,
            Value::String(_) => CellType::String,
            Value::IntegerList(_) => CellType::IntegerList,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view with Integer→Real promotion.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[i64]> {
        match self {
            Value::IntegerList(l) => Some(l),
            _ => None,
        }
    }

    pub fn is_undefined(&self) -> bool {
        self.value_eq(&self.cell_type().undefined_value())
    }

    /// Convert into `target`, promoting Integer to Real. Other conversions
    /// are not implicit.
    pub fn coerce_to(self, target: CellType) -> Option<Value> {
        match (self, target) {
            (Value::Integer(i), CellType::Real) => Some(Value::Real(i as f64)),
            (v, t) if v.cell_type() == t => Some(v),
            _ => None,
        }
    }

    /// Equality of payloads. Unlike `==`, NaN equals NaN so that recomputing
    /// an unchanged NaN result is not treated as a change.
    pub fn value_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Real(a), Value::Real(b)) => a == b || (a.is_nan() && b.is_nan()),
            _ => self == other,
        }
    }

    /// Ordering with numeric promotion; `None` for incomparable variants.
    pub fn compare(&self, other: &Value) -> Option<Ordering> {
        match (self, other) {
            (Value::Integer(a), Value::Integer(b)) => Some(a.cmp(b)),
            (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
            (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
            (Value::IntegerList(a), Value::IntegerList(b)) => Some(a.cmp(b)),
            (a, b) => match (a.as_f64(), b.as_f64()) {
                (Some(x), Some(y)) => x.partial_cmp(&y),
                _ => None,
            },
        }
    }

    pub fn add(&self, other: &Value) -> Option<Value> {
        numeric_op(self, other, i64::wrapping_add, |a, b| a + b)
    }

    pub fn sub(&self, other: &Value) -> Option<Value> {
        numeric_op(self, other, i64::wrapping_sub, |a, b| a - b)
    }

    pub fn mul(&self, other: &Value) -> Option<Value> {
        numeric_op(self, other, i64::wrapping_mul, |a, b| a * b)
    }

    /// Division; integer division by zero yields the undefined integer.
    pub fn div(&self, other: &Value) -> Option<Value> {
        match (self, other) {
            (Value::Integer(_), Value::Integer(0)) => Some(Value::Integer(0)),
            _ => numeric_op(self, other, i64::wrapping_div, |a, b| a / b),
        }
    }

    pub fn neg(&self) -> Option<Value> {
        match self {
            Value::Integer(i) => Some(Value::Integer(i.wrapping_neg())),
            Value::Real(r) => Some(Value::Real(-r)),
            _ => None,
        }
    }
}

/// Integer arithmetic wraps so that a result keeps the variant the formula
/// compiler inferred for it.
fn numeric_op(
    a: &Value,
    b: &Value,
    int_op: fn(i64, i64) -> i64,
    real_op: fn(f64, f64) -> f64,
) -> Option<Value> {
    match (a, b) {
        (Value::Integer(x), Value::Integer(y)) => Some(Value::Integer(int_op(*x, *y))),
        _ => Some(Value::Real(real_op(a.as_f64()?, b.as_f64()?))),
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Integer(i) => write!(f, "{i}"),
            Value::Real(r) => write!(f, "{r}"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::String(s) => write!(f, "{s}"),
            Value::IntegerList(l) => {
                f.write_str("[")?;
                for (i, v) in l.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{v}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::string(v)
    }
}

impl From<Vec<i64>> for Value {
    fn from(v: Vec<i64>) -> Self {
        Value::integer_list(v)
    }
}

/* ───────────────────────────── CellValue ──────────────────────────── */

/// An immutable, timestamped cell value.
///
/// `==` is structural (payload and date). Use [`CellValue::value_eq`] to
/// compare payloads only.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CellValue {
    pub value: Value,
    #[cfg_attr(feature = "serde", serde(with = "chrono::serde::ts_milliseconds"))]
    pub date: Timestamp,
}

impl CellValue {
    pub fn new(value: impl Into<Value>, date: Timestamp) -> Self {
        Self {
            value: value.into(),
            date,
        }
    }

    pub fn cell_type(&self) -> CellType {
        self.value.cell_type()
    }

    pub fn is_undefined(&self) -> bool {
        self.date == EPOCH && self.value.is_undefined()
    }

    pub fn value_eq(&self, other: &CellValue) -> bool {
        self.value.value_eq(&other.value)
    }

    pub fn with_date(&self, date: Timestamp) -> Self {
        Self {
            value: self.value.clone(),
            date,
        }
    }

    pub fn is_newer_than(&self, date: &Timestamp) -> bool {
        self.date > *date
    }
}

impl Display for CellValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.value, self.date.timestamp_millis())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::time::from_epoch_millis;

    #[test]
    fn undefined_sentinels_per_variant() {
        for ty in CellType::ALL {
            let u = ty.undefined();
            assert_eq!(u.cell_type(), ty);
            assert_eq!(u.date, EPOCH);
            assert!(u.is_undefined());
        }
    }

    #[test]
    fn value_equality_ignores_date() {
        let a = CellValue::new(5i64, from_epoch_millis(100));
        let b = CellValue::new(5i64, from_epoch_millis(200));
        assert!(a.value_eq(&b));
        assert_ne!(a, b);
        assert_eq!(a, a.with_date(from_epoch_millis(100)));
    }

    #[test]
    fn arithmetic_promotes_integers() {
        let i = Value::Integer(3);
        let r = Value::Real(0.5);
        assert_eq!(i.add(&Value::Integer(4)), Some(Value::Integer(7)));
        assert_eq!(i.add(&r), Some(Value::Real(3.5)));
        assert_eq!(i.mul(&r), Some(Value::Real(1.5)));
        assert_eq!(Value::Integer(7).div(&Value::Integer(2)), Some(Value::Integer(3)));
        assert_eq!(Value::Integer(7).div(&Value::Integer(0)), Some(Value::Integer(0)));
        assert_eq!(Value::Bool(true).add(&i), None);
    }

    #[test]
    fn integer_overflow_keeps_variant() {
        let v = Value::Integer(i64::MAX).add(&Value::Integer(1)).unwrap();
        assert_eq!(v, Value::Integer(i64::MIN));
    }

    #[test]
    fn comparisons() {
        assert_eq!(
            Value::Integer(5).compare(&Value::Real(3.0)),
            Some(Ordering::Greater)
        );
        assert_eq!(
            Value::string("a").compare(&Value::string("b")),
            Some(Ordering::Less)
        );
        assert_eq!(Value::Bool(true).compare(&Value::Integer(1)), None);
    }

    #[test]
    fn nan_is_value_equal_to_itself() {
        let nan = Value::Real(f64::NAN);
        assert!(nan.value_eq(&Value::Real(f64::NAN)));
        assert_ne!(nan, Value::Real(f64::NAN));
    }

    #[test]
    fn parse_cell_type_names() {
        assert_eq!("Integer".parse::<CellType>().unwrap(), CellType::Integer);
        assert_eq!("double".parse::<CellType>().unwrap(), CellType::Real);
        assert_eq!("intlist".parse::<CellType>().unwrap(), CellType::IntegerList);
        assert!("date".parse::<CellType>().is_err());
    }

    #[test]
    fn coercion_only_promotes_integers() {
        assert_eq!(
            Value::Integer(2).coerce_to(CellType::Real),
            Some(Value::Real(2.0))
        );
        assert_eq!(Value::Real(2.0).coerce_to(CellType::Integer), None);
        assert_eq!(
            Value::Bool(true).coerce_to(CellType::Bool),
            Some(Value::Bool(true))
        );
    }

    #[test]
    fn display_lists() {
        assert_eq!(Value::integer_list(vec![1, 2, 3]).to_string(), "[1,2,3]");
    }
}
