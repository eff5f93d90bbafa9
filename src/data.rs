use rusqlite::types::{ToSql, ToSqlOutput, ValueRef};

use crate::schema::ColumnType;

#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Integer(i64),
    Real(f64),
    Text(String),
}

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Integer(i) => ToSqlOutput::Borrowed(ValueRef::Integer(*i)),
            Value::Real(f) => ToSqlOutput::Borrowed(ValueRef::Real(*f)),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// Converts a raw cell into the value stored for a column of type `ty`.
///
/// Empty or absent cells become `None`. Numeric parsing is best effort: text
/// that does not parse is passed through trimmed rather than rejected.
pub fn coerce_value(raw: Option<&str>, ty: ColumnType) -> Option<Value> {
    let trimmed = raw?.trim();
    if trimmed.is_empty() {
        return None;
    }
    let value = match ty {
        ColumnType::Integer => coerce_integer(trimmed),
        ColumnType::Numeric | ColumnType::Real => coerce_numeric(trimmed),
        ColumnType::Text => Value::Text(trimmed.to_string()),
    };
    Some(value)
}

fn coerce_integer(value: &str) -> Value {
    if let Ok(parsed) = value.parse::<i64>() {
        return Value::Integer(parsed);
    }
    match value.parse::<f64>().ok().and_then(truncate_to_i64) {
        Some(truncated) => Value::Integer(truncated),
        None => Value::Text(value.to_string()),
    }
}

fn coerce_numeric(value: &str) -> Value {
    let parsed = match value.parse::<f64>() {
        Ok(parsed) if parsed.is_finite() => parsed,
        _ => return Value::Text(value.to_string()),
    };
    // Integral values written without a decimal point are ids, not measurements.
    if parsed.fract() == 0.0
        && !value.contains('.')
        && let Some(integral) = truncate_to_i64(parsed)
    {
        return Value::Integer(integral);
    }
    Value::Real(parsed)
}

fn truncate_to_i64(value: f64) -> Option<i64> {
    const LIMIT: f64 = 9_223_372_036_854_775_808.0; // 2^63
    if !value.is_finite() {
        return None;
    }
    let truncated = value.trunc();
    if truncated >= -LIMIT && truncated < LIMIT {
        Some(truncated as i64)
    } else {
        None
    }
}

/// Coerces a row positionally against `types`, one slot per column.
pub fn coerce_row<'a, I>(cells: I, types: &[ColumnType]) -> Vec<Option<Value>>
where
    I: IntoIterator<Item = Option<&'a str>>,
{
    cells
        .into_iter()
        .zip(types.iter())
        .map(|(cell, ty)| coerce_value(cell, *ty))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_absent_cells_are_null_for_every_type() {
        for ty in [
            ColumnType::Integer,
            ColumnType::Real,
            ColumnType::Numeric,
            ColumnType::Text,
        ] {
            assert_eq!(coerce_value(Some(""), ty), None);
            assert_eq!(coerce_value(Some("   "), ty), None);
            assert_eq!(coerce_value(None, ty), None);
        }
    }

    #[test]
    fn integer_columns_trim_and_parse() {
        assert_eq!(
            coerce_value(Some("  42  "), ColumnType::Integer),
            Some(Value::Integer(42))
        );
        assert_eq!(
            coerce_value(Some("-7"), ColumnType::Integer),
            Some(Value::Integer(-7))
        );
    }

    #[test]
    fn integer_columns_truncate_float_text() {
        assert_eq!(
            coerce_value(Some("12.9"), ColumnType::Integer),
            Some(Value::Integer(12))
        );
        assert_eq!(
            coerce_value(Some("-3.7"), ColumnType::Integer),
            Some(Value::Integer(-3))
        );
    }

    #[test]
    fn integer_columns_pass_through_unparsable_text() {
        assert_eq!(
            coerce_value(Some("abc"), ColumnType::Integer),
            Some(Value::Text("abc".to_string()))
        );
        assert_eq!(
            coerce_value(Some(" inf "), ColumnType::Integer),
            Some(Value::Text("inf".to_string()))
        );
    }

    #[test]
    fn numeric_columns_keep_integral_ids_as_integers() {
        assert_eq!(
            coerce_value(Some("3"), ColumnType::Numeric),
            Some(Value::Integer(3))
        );
        assert_eq!(
            coerce_value(Some("1e3"), ColumnType::Real),
            Some(Value::Integer(1000))
        );
    }

    #[test]
    fn numeric_columns_keep_decimal_point_values_as_reals() {
        assert_eq!(
            coerce_value(Some("3.0"), ColumnType::Numeric),
            Some(Value::Real(3.0))
        );
        assert_eq!(
            coerce_value(Some("3.50"), ColumnType::Numeric),
            Some(Value::Real(3.5))
        );
    }

    #[test]
    fn numeric_columns_pass_through_unparsable_text() {
        assert_eq!(
            coerce_value(Some("N/A"), ColumnType::Numeric),
            Some(Value::Text("N/A".to_string()))
        );
        assert_eq!(
            coerce_value(Some("NaN"), ColumnType::Real),
            Some(Value::Text("NaN".to_string()))
        );
    }

    #[test]
    fn text_columns_are_trimmed_only() {
        assert_eq!(
            coerce_value(Some(" 007 "), ColumnType::Text),
            Some(Value::Text("007".to_string()))
        );
    }

    #[test]
    fn coerce_row_is_positional() {
        let types = [ColumnType::Integer, ColumnType::Text, ColumnType::Real];
        let row = coerce_row([Some("1"), None, Some("2.5")], &types);
        assert_eq!(
            row,
            vec![Some(Value::Integer(1)), None, Some(Value::Real(2.5))]
        );
    }
}
