use sharegrid_common::{CellType, Value};

use crate::function::ArgumentHandle;

/// Integer when every argument is Integer, Real when any is Real, `None`
/// when a non-numeric type is present.
pub fn numeric_return(args: &[CellType]) -> Option<CellType> {
    if !args.iter().all(|t| t.is_numeric()) {
        return None;
    }
    Some(if args.contains(&CellType::Real) {
        CellType::Real
    } else {
        CellType::Integer
    })
}

/// Result type computed from the handles' static types.
pub fn numeric_kind(args: &[ArgumentHandle<'_>]) -> CellType {
    if args.iter().any(|a| a.cell_type() == CellType::Real) {
        CellType::Real
    } else {
        CellType::Integer
    }
}

/// Two arguments that compare: same type, or both numeric.
pub fn comparable(args: &[CellType]) -> bool {
    match args {
        [a, b] => a == b || (a.is_numeric() && b.is_numeric()),
        _ => false,
    }
}

/// Promote `v` to `kind`, falling back to the undefined value of `kind`.
pub fn promote(v: Value, kind: CellType) -> Value {
    v.coerce_to(kind).unwrap_or_else(|| kind.undefined_value())
}

/// Left fold of a numeric binary operator over every argument.
pub fn fold_numeric(
    args: &[ArgumentHandle<'_>],
    op: impl Fn(&Value, &Value) -> Option<Value>,
) -> Value {
    let kind = numeric_kind(args);
    let mut iter = args.iter().map(|a| a.value());
    let Some(first) = iter.next() else {
        return kind.undefined_value();
    };
    let acc = iter.fold(first, |acc, v| op(&acc, &v).unwrap_or(acc));
    promote(acc, kind)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_promotion() {
        assert_eq!(
            numeric_return(&[CellType::Integer, CellType::Integer]),
            Some(CellType::Integer)
        );
        assert_eq!(
            numeric_return(&[CellType::Integer, CellType::Real]),
            Some(CellType::Real)
        );
        assert_eq!(numeric_return(&[CellType::Integer, CellType::Bool]), None);
    }

    #[test]
    fn comparability() {
        assert!(comparable(&[CellType::Integer, CellType::Real]));
        assert!(comparable(&[CellType::String, CellType::String]));
        assert!(!comparable(&[CellType::String, CellType::Integer]));
    }
}
