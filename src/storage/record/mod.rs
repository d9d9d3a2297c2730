//! Record codec (spec §4.4, §9 "tagged union plus per-variant encode/decode").
//!
//! Six record shapes share the 5-byte [`RecordHeader`] and dispatch on its
//! `record_type` field instead of going through a trait object: clustered
//! leaf/internal, secondary leaf/internal, and the fixed infimum/supremum
//! sentinels.

mod header;

pub use header::{RecordHeader, RecordType};

use crate::common::TrxId;
use crate::table::row::{Row, Value};
use crate::table::schema::{ColumnType, Schema};

/// Body bytes of the infimum sentinel (spec §4.4: fixed 8-byte "infimum\0").
pub const INFIMUM_BODY: &[u8; 8] = b"infimum\0";
/// Body bytes of the supremum sentinel.
pub const SUPREMUM_BODY: &[u8; 8] = b"supremum";

/// A decoded record, tagged by which variant it came from.
#[derive(Debug, Clone, PartialEq)]
pub enum Record {
    ClusteredLeaf {
        row: Row,
        trx_id: TrxId,
        roll_ptr: [u8; 7],
    },
    ClusteredInternal {
        key_prefix: Vec<u8>,
        child_page: u32,
    },
    SecondaryLeaf {
        key: Vec<u8>,
        primary_key: Vec<u8>,
    },
    SecondaryInternal {
        key_prefix: Vec<u8>,
        child_page: u32,
    },
    Infimum,
    Supremum,
}

/// Encode one value's byte-ordered key representation, used for both the
/// record codec's variable-length columns and `Row::key_bytes`.
///
/// Integers are written big-endian with the sign bit flipped so that
/// byte-wise comparison matches numeric ordering (spec §9: "byte-wise
/// concatenation", collation left to the metadata layer).
pub fn encode_value_for_key(value: &Value, out: &mut Vec<u8>) {
    match value {
        Value::Null => {}
        Value::TinyInt(v) => out.push((*v as u8) ^ 0x80),
        Value::SmallInt(v) => out.extend_from_slice(&((*v as u16) ^ 0x8000).to_be_bytes()),
        Value::Int(v) => out.extend_from_slice(&((*v as u32) ^ 0x8000_0000).to_be_bytes()),
        Value::BigInt(v) => {
            out.extend_from_slice(&((*v as u64) ^ 0x8000_0000_0000_0000).to_be_bytes())
        }
        Value::Float(v) => out.extend_from_slice(&v.to_be_bytes()),
        Value::Double(v) => out.extend_from_slice(&v.to_be_bytes()),
        Value::Char(s) | Value::VarChar(s) | Value::Json(s) => out.extend_from_slice(s.as_bytes()),
        Value::Date(v) => out.extend_from_slice(&v.to_be_bytes()[1..4]),
        Value::Time(v) => out.extend_from_slice(&v.to_be_bytes()[1..4]),
        Value::DateTime(v) => out.extend_from_slice(&v.to_be_bytes()),
        Value::Blob(b) => out.extend_from_slice(b),
    }
}

fn value_fixed_bytes(value: &Value, column_type: ColumnType) -> Vec<u8> {
    match (value, column_type) {
        (Value::Null, _) => vec![0u8; column_type.fixed_width().unwrap_or(0)],
        (Value::TinyInt(v), ColumnType::TinyInt) => vec![*v as u8],
        (Value::SmallInt(v), ColumnType::SmallInt) => v.to_le_bytes().to_vec(),
        (Value::Int(v), ColumnType::Int) => v.to_le_bytes().to_vec(),
        (Value::BigInt(v), ColumnType::BigInt) => v.to_le_bytes().to_vec(),
        (Value::Float(v), ColumnType::Float) => v.to_le_bytes().to_vec(),
        (Value::Double(v), ColumnType::Double) => v.to_le_bytes().to_vec(),
        (Value::Char(s), ColumnType::Char(width)) => {
            let mut bytes = s.as_bytes().to_vec();
            bytes.resize(width as usize, 0);
            bytes
        }
        (Value::Date(v), ColumnType::Date) => v.to_le_bytes()[0..3].to_vec(),
        (Value::Time(v), ColumnType::Time) => v.to_le_bytes()[0..3].to_vec(),
        (Value::DateTime(v), ColumnType::DateTime) => v.to_le_bytes().to_vec(),
        (other, expected) => panic!(
            "value {} does not match fixed column type {expected:?}",
            other.type_name()
        ),
    }
}

fn variable_bytes(value: &Value) -> Vec<u8> {
    match value {
        Value::Null => Vec::new(),
        Value::VarChar(s) | Value::Json(s) => s.as_bytes().to_vec(),
        Value::Blob(b) => b.clone(),
        other => panic!("value {} is not a variable-length type", other.type_name()),
    }
}

fn decode_fixed(column_type: ColumnType, bytes: &[u8]) -> Value {
    match column_type {
        ColumnType::TinyInt => Value::TinyInt(bytes[0] as i8),
        ColumnType::SmallInt => Value::SmallInt(i16::from_le_bytes(bytes[0..2].try_into().unwrap())),
        ColumnType::Int => Value::Int(i32::from_le_bytes(bytes[0..4].try_into().unwrap())),
        ColumnType::BigInt => Value::BigInt(i64::from_le_bytes(bytes[0..8].try_into().unwrap())),
        ColumnType::Float => Value::Float(f32::from_le_bytes(bytes[0..4].try_into().unwrap())),
        ColumnType::Double => Value::Double(f64::from_le_bytes(bytes[0..8].try_into().unwrap())),
        ColumnType::Char(width) => {
            let s = String::from_utf8_lossy(&bytes[0..width as usize])
                .trim_end_matches('\0')
                .to_string();
            Value::Char(s)
        }
        ColumnType::Date => {
            let mut buf = [0u8; 4];
            buf[0..3].copy_from_slice(&bytes[0..3]);
            Value::Date(i32::from_le_bytes(buf))
        }
        ColumnType::Time => {
            let mut buf = [0u8; 4];
            buf[0..3].copy_from_slice(&bytes[0..3]);
            Value::Time(i32::from_le_bytes(buf))
        }
        ColumnType::DateTime => Value::DateTime(i64::from_le_bytes(bytes[0..8].try_into().unwrap())),
        ColumnType::VarChar(_) | ColumnType::Json | ColumnType::Blob => {
            unreachable!("decode_fixed called on variable-length column")
        }
    }
}

fn decode_variable(column_type: ColumnType, bytes: &[u8]) -> Value {
    match column_type {
        ColumnType::VarChar(_) => Value::VarChar(String::from_utf8_lossy(bytes).to_string()),
        ColumnType::Json => Value::Json(String::from_utf8_lossy(bytes).to_string()),
        ColumnType::Blob => Value::Blob(bytes.to_vec()),
        _ => unreachable!("decode_variable called on fixed column"),
    }
}

/// Encode a row's column payload: `[var-len lengths, reverse schema
/// order][null bitmap][columns in schema order]`. Null columns occupy
/// zero bytes in the column area; their presence is carried only in the
/// bitmap.
fn encode_row_payload(row: &Row, schema: &Schema) -> Vec<u8> {
    let mut var_lengths_reversed = Vec::new();
    let mut null_bitmap = vec![0u8; schema.null_bitmap_bytes()];
    let mut columns = Vec::new();

    let mut nullable_idx = 0usize;
    for (i, col) in schema.columns.iter().enumerate() {
        let value = &row.values[i];
        let is_null = matches!(value, Value::Null);

        if col.nullable {
            if is_null {
                null_bitmap[nullable_idx / 8] |= 1 << (nullable_idx % 8);
            }
            nullable_idx += 1;
        }

        if col.column_type.is_variable_length() {
            let bytes = if is_null { Vec::new() } else { variable_bytes(value) };
            var_lengths_reversed.push(bytes.len() as u16);
            columns.extend_from_slice(&bytes);
        } else if !is_null {
            columns.extend_from_slice(&value_fixed_bytes(value, col.column_type));
        } else {
            columns.extend_from_slice(&vec![0u8; col.column_type.fixed_width().unwrap()]);
        }
    }
    var_lengths_reversed.reverse();

    let mut out = Vec::new();
    for len in &var_lengths_reversed {
        out.extend_from_slice(&len.to_le_bytes());
    }
    out.extend_from_slice(&null_bitmap);
    out.extend_from_slice(&columns);
    out
}

struct DecodedPayload {
    row: Row,
    consumed: usize,
}

fn decode_row_payload(data: &[u8], schema: &Schema) -> DecodedPayload {
    let n_variable = schema
        .columns
        .iter()
        .filter(|c| c.column_type.is_variable_length())
        .count();

    let lengths_bytes = n_variable * 2;
    let mut var_lengths_reversed = Vec::with_capacity(n_variable);
    for i in 0..n_variable {
        let bytes = &data[i * 2..i * 2 + 2];
        var_lengths_reversed.push(u16::from_le_bytes(bytes.try_into().unwrap()));
    }
    var_lengths_reversed.reverse();

    let bitmap_offset = lengths_bytes;
    let bitmap_len = schema.null_bitmap_bytes();
    let null_bitmap = &data[bitmap_offset..bitmap_offset + bitmap_len];

    let mut cursor = bitmap_offset + bitmap_len;
    let mut values = Vec::with_capacity(schema.columns.len());
    let mut nullable_idx = 0usize;
    let mut var_idx = 0usize;

    for col in &schema.columns {
        let is_null = if col.nullable {
            let bit = null_bitmap[nullable_idx / 8] & (1 << (nullable_idx % 8)) != 0;
            nullable_idx += 1;
            bit
        } else {
            false
        };

        if col.column_type.is_variable_length() {
            let len = var_lengths_reversed[var_idx] as usize;
            var_idx += 1;
            let bytes = &data[cursor..cursor + len];
            cursor += len;
            values.push(if is_null {
                Value::Null
            } else {
                decode_variable(col.column_type, bytes)
            });
        } else {
            let width = col.column_type.fixed_width().unwrap();
            let bytes = &data[cursor..cursor + width];
            cursor += width;
            values.push(if is_null {
                Value::Null
            } else {
                decode_fixed(col.column_type, bytes)
            });
        }
    }

    DecodedPayload {
        row: Row::new(values),
        consumed: cursor,
    }
}

/// Encode a clustered-leaf record: header, row payload, 6-byte trx-id,
/// 7-byte roll-pointer.
pub fn encode_clustered_leaf(
    header: RecordHeader,
    row: &Row,
    schema: &Schema,
    trx_id: TrxId,
    roll_ptr: [u8; 7],
) -> Vec<u8> {
    assert_eq!(header.record_type, RecordType::ClusteredLeaf);
    let mut out = Vec::new();
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(&encode_row_payload(row, schema));
    out.extend_from_slice(&trx_id.0.to_le_bytes()[0..6]);
    out.extend_from_slice(&roll_ptr);
    out
}

pub fn decode_clustered_leaf(data: &[u8], schema: &Schema) -> Record {
    let header = RecordHeader::from_bytes(data);
    assert_eq!(header.record_type, RecordType::ClusteredLeaf);

    let body = &data[RecordHeader::SIZE..];
    let decoded = decode_row_payload(body, schema);

    let trx_bytes = &body[decoded.consumed..decoded.consumed + 6];
    let mut trx_buf = [0u8; 8];
    trx_buf[0..6].copy_from_slice(trx_bytes);
    let trx_id = TrxId::new(u64::from_le_bytes(trx_buf));

    let mut roll_ptr = [0u8; 7];
    roll_ptr.copy_from_slice(&body[decoded.consumed + 6..decoded.consumed + 13]);

    Record::ClusteredLeaf {
        row: decoded.row,
        trx_id,
        roll_ptr,
    }
}

/// Encode a secondary-leaf record: header, index-key payload, primary
/// key reference.
pub fn encode_secondary_leaf(header: RecordHeader, key: &[u8], primary_key: &[u8]) -> Vec<u8> {
    assert_eq!(header.record_type, RecordType::SecondaryLeaf);
    let mut out = Vec::new();
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(&(key.len() as u16).to_le_bytes());
    out.extend_from_slice(key);
    out.extend_from_slice(&(primary_key.len() as u16).to_le_bytes());
    out.extend_from_slice(primary_key);
    out
}

pub fn decode_secondary_leaf(data: &[u8]) -> Record {
    let header = RecordHeader::from_bytes(data);
    assert_eq!(header.record_type, RecordType::SecondaryLeaf);

    let mut cursor = RecordHeader::SIZE;
    let key_len = u16::from_le_bytes(data[cursor..cursor + 2].try_into().unwrap()) as usize;
    cursor += 2;
    let key = data[cursor..cursor + key_len].to_vec();
    cursor += key_len;

    let pk_len = u16::from_le_bytes(data[cursor..cursor + 2].try_into().unwrap()) as usize;
    cursor += 2;
    let primary_key = data[cursor..cursor + pk_len].to_vec();

    Record::SecondaryLeaf { key, primary_key }
}

/// Encode a clustered- or secondary-internal record: header, key
/// prefix, 4-byte child page pointer.
pub fn encode_internal(header: RecordHeader, key_prefix: &[u8], child_page: u32) -> Vec<u8> {
    assert!(matches!(
        header.record_type,
        RecordType::ClusteredInternal | RecordType::SecondaryInternal
    ));
    let mut out = Vec::new();
    out.extend_from_slice(&header.to_bytes());
    out.extend_from_slice(&(key_prefix.len() as u16).to_le_bytes());
    out.extend_from_slice(key_prefix);
    out.extend_from_slice(&child_page.to_le_bytes());
    out
}

pub fn decode_internal(data: &[u8]) -> Record {
    let header = RecordHeader::from_bytes(data);
    let mut cursor = RecordHeader::SIZE;
    let key_len = u16::from_le_bytes(data[cursor..cursor + 2].try_into().unwrap()) as usize;
    cursor += 2;
    let key_prefix = data[cursor..cursor + key_len].to_vec();
    cursor += key_len;
    let child_page = u32::from_le_bytes(data[cursor..cursor + 4].try_into().unwrap());

    match header.record_type {
        RecordType::ClusteredInternal => Record::ClusteredInternal { key_prefix, child_page },
        RecordType::SecondaryInternal => Record::SecondaryInternal { key_prefix, child_page },
        other => panic!("decode_internal called on record_type {other:?}"),
    }
}

/// Build the fixed infimum record (header + 8-byte "infimum\0" body).
pub fn encode_infimum(heap_no: u16, next_offset: i16) -> Vec<u8> {
    let mut header = RecordHeader::new(RecordType::Infimum, heap_no);
    header.next_offset = next_offset;
    let mut out = header.to_bytes().to_vec();
    out.extend_from_slice(INFIMUM_BODY);
    out
}

/// Build the fixed supremum record (header + 8-byte "supremum" body).
pub fn encode_supremum(heap_no: u16) -> Vec<u8> {
    let header = RecordHeader::new(RecordType::Supremum, heap_no);
    let mut out = header.to_bytes().to_vec();
    out.extend_from_slice(SUPREMUM_BODY);
    out
}
