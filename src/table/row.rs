//! Row values (spec §6: "Rows carry typed values... as a tagged union").

use crate::table::schema::ColumnType;

/// A single column value, or null.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    TinyInt(i8),
    SmallInt(i16),
    Int(i32),
    BigInt(i64),
    Float(f32),
    Double(f64),
    Char(String),
    VarChar(String),
    /// Days since epoch, matching `ColumnType::Date`'s 3-byte storage.
    Date(i32),
    /// Milliseconds since midnight.
    Time(i32),
    /// Milliseconds since epoch.
    DateTime(i64),
    Json(String),
    Blob(Vec<u8>),
}

impl Value {
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "NULL",
            Value::TinyInt(_) => "TINYINT",
            Value::SmallInt(_) => "SMALLINT",
            Value::Int(_) => "INT",
            Value::BigInt(_) => "BIGINT",
            Value::Float(_) => "FLOAT",
            Value::Double(_) => "DOUBLE",
            Value::Char(_) => "CHAR",
            Value::VarChar(_) => "VARCHAR",
            Value::Date(_) => "DATE",
            Value::Time(_) => "TIME",
            Value::DateTime(_) => "DATETIME",
            Value::Json(_) => "JSON",
            Value::Blob(_) => "BLOB",
        }
    }

    pub fn matches_type(&self, column_type: ColumnType) -> bool {
        matches!(
            (self, column_type),
            (Value::Null, _)
                | (Value::TinyInt(_), ColumnType::TinyInt)
                | (Value::SmallInt(_), ColumnType::SmallInt)
                | (Value::Int(_), ColumnType::Int)
                | (Value::BigInt(_), ColumnType::BigInt)
                | (Value::Float(_), ColumnType::Float)
                | (Value::Double(_), ColumnType::Double)
                | (Value::Char(_), ColumnType::Char(_))
                | (Value::VarChar(_), ColumnType::VarChar(_))
                | (Value::Date(_), ColumnType::Date)
                | (Value::Time(_), ColumnType::Time)
                | (Value::DateTime(_), ColumnType::DateTime)
                | (Value::Json(_), ColumnType::Json)
                | (Value::Blob(_), ColumnType::Blob)
        )
    }
}

/// An ordered set of column values matching some `Schema`.
#[derive(Debug, Clone, PartialEq)]
pub struct Row {
    pub values: Vec<Value>,
}

impl Row {
    pub fn new(values: Vec<Value>) -> Self {
        Self { values }
    }

    /// Byte-wise concatenation of the primary-key columns, used for
    /// ordering and secondary-index back-references (spec §9 open
    /// question: no per-column collation is applied by the core).
    pub fn key_bytes(&self, primary_key: &[usize]) -> Vec<u8> {
        let mut out = Vec::new();
        for &idx in primary_key {
            crate::storage::record::encode_value_for_key(&self.values[idx], &mut out);
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_matches_type() {
        assert!(Value::Int(5).matches_type(ColumnType::Int));
        assert!(!Value::Int(5).matches_type(ColumnType::BigInt));
        assert!(Value::Null.matches_type(ColumnType::Int));
    }
}
