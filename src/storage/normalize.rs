// Cell Value Normalization
// Converts fetched source cells into values the destination store accepts

use rusqlite::types::{ToSql, ToSqlOutput, Value};
use rust_decimal::prelude::ToPrimitive;

use crate::config::BinaryMode;
use crate::db::traits::SourceValue;

/// A value ready to bind into a destination insert
#[derive(Debug, Clone, PartialEq)]
pub enum DestinationValue {
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
    Blob(Vec<u8>),
}

impl ToSql for DestinationValue {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            DestinationValue::Null => ToSqlOutput::Owned(Value::Null),
            DestinationValue::Integer(i) => ToSqlOutput::from(*i),
            DestinationValue::Real(f) => ToSqlOutput::from(*f),
            DestinationValue::Text(s) => ToSqlOutput::from(s.as_str()),
            DestinationValue::Blob(b) => ToSqlOutput::from(b.as_slice()),
        })
    }
}

/// Per-cell value conversion
#[derive(Debug, Clone, Copy, Default)]
pub struct ValueNormalizer {
    binary_mode: BinaryMode,
}

impl ValueNormalizer {
    pub fn new(binary_mode: BinaryMode) -> Self {
        Self { binary_mode }
    }

    /// Decimals become f64 and lose precision beyond ~15 significant digits.
    /// Binary cells become `b"..."` escaped text unless blob mode is on; that
    /// text form is not reversible.
    pub fn normalize(&self, value: SourceValue) -> DestinationValue {
        match value {
            SourceValue::Null => DestinationValue::Null,
            SourceValue::Bool(b) => DestinationValue::Integer(i64::from(b)),
            SourceValue::Int(i) => DestinationValue::Integer(i),
            SourceValue::Float(f) => DestinationValue::Real(f),
            SourceValue::Decimal(d) => match d.to_f64() {
                Some(f) => DestinationValue::Real(f),
                None => DestinationValue::Text(d.to_string()),
            },
            SourceValue::String(s) => DestinationValue::Text(s),
            SourceValue::DateTime(s) => DestinationValue::Text(s),
            SourceValue::Binary(bytes) => match self.binary_mode {
                BinaryMode::DebugText => {
                    DestinationValue::Text(format!("b\"{}\"", bytes.escape_ascii()))
                }
                BinaryMode::Blob => DestinationValue::Blob(bytes),
            },
        }
    }

    pub fn normalize_row(&self, row: Vec<SourceValue>) -> Vec<DestinationValue> {
        row.into_iter().map(|v| self.normalize(v)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::str::FromStr;

    #[test]
    fn test_pass_through_kinds() {
        let n = ValueNormalizer::default();
        assert_eq!(n.normalize(SourceValue::Null), DestinationValue::Null);
        assert_eq!(n.normalize(SourceValue::Int(7)), DestinationValue::Integer(7));
        assert_eq!(n.normalize(SourceValue::Float(1.5)), DestinationValue::Real(1.5));
        assert_eq!(
            n.normalize(SourceValue::String("Ada".to_string())),
            DestinationValue::Text("Ada".to_string())
        );
        assert_eq!(
            n.normalize(SourceValue::DateTime("2024-01-31 10:00:00".to_string())),
            DestinationValue::Text("2024-01-31 10:00:00".to_string())
        );
        assert_eq!(n.normalize(SourceValue::Bool(true)), DestinationValue::Integer(1));
    }

    #[test]
    fn test_decimal_becomes_float() {
        let n = ValueNormalizer::default();
        let value = SourceValue::Decimal(Decimal::from_str("1234.56").unwrap());
        assert_eq!(n.normalize(value), DestinationValue::Real(1234.56));

        // Beyond f64 precision the value is approximated
        let value = SourceValue::Decimal(Decimal::from_str("12345678901234567.89").unwrap());
        match n.normalize(value) {
            DestinationValue::Real(f) => assert!((f - 12345678901234567.89).abs() < 10.0),
            other => panic!("unexpected: {:?}", other),
        }
    }

    #[test]
    fn test_binary_debug_text() {
        let n = ValueNormalizer::new(BinaryMode::DebugText);
        assert_eq!(
            n.normalize(SourceValue::Binary(b"AB\x00\xff\"".to_vec())),
            DestinationValue::Text("b\"AB\\x00\\xff\\\"\"".to_string())
        );
    }

    #[test]
    fn test_binary_blob() {
        let n = ValueNormalizer::new(BinaryMode::Blob);
        assert_eq!(
            n.normalize(SourceValue::Binary(vec![0, 255])),
            DestinationValue::Blob(vec![0, 255])
        );
    }

    #[test]
    fn test_normalize_row_keeps_order() {
        let n = ValueNormalizer::default();
        let row = n.normalize_row(vec![SourceValue::Int(1), SourceValue::Null]);
        assert_eq!(row, vec![DestinationValue::Integer(1), DestinationValue::Null]);
    }
}
