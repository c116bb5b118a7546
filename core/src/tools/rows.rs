//! Dynamic PgRow -> JSON decoding for statements whose shape is not known
//! ahead of time (execute_sql, track_activity).

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde_json::{Map, Value};
use sqlx::postgres::PgRow;
use sqlx::{Column, Row, TypeInfo};

/// Decodes a result set into an array of column-name keyed objects.
/// Columns with types we cannot decode become null rather than failing
/// the whole payload.
pub fn rows_to_json(rows: &[PgRow]) -> Value {
    Value::Array(rows.iter().map(row_to_json).collect())
}

fn row_to_json(row: &PgRow) -> Value {
    let mut object = Map::new();
    for (i, col) in row.columns().iter().enumerate() {
        object.insert(col.name().to_string(), decode_column(row, i));
    }
    Value::Object(object)
}

fn decode_column(row: &PgRow, i: usize) -> Value {
    let type_name = row.columns()[i].type_info().name().to_uppercase();
    match type_name.as_str() {
        "TEXT" | "VARCHAR" | "CHAR" | "BPCHAR" | "NAME" => row
            .try_get::<Option<String>, _>(i)
            .map(|v| v.map(Value::String).unwrap_or(Value::Null))
            .unwrap_or(Value::Null),
        "INT2" => row
            .try_get::<Option<i16>, _>(i)
            .map(|v| v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null))
            .unwrap_or(Value::Null),
        "INT4" | "SERIAL" => row
            .try_get::<Option<i32>, _>(i)
            .map(|v| v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null))
            .unwrap_or(Value::Null),
        "INT8" | "BIGSERIAL" => row
            .try_get::<Option<i64>, _>(i)
            .map(|v| v.map(|n| Value::Number(n.into())).unwrap_or(Value::Null))
            .unwrap_or(Value::Null),
        "FLOAT4" => row
            .try_get::<Option<f32>, _>(i)
            .ok()
            .flatten()
            .and_then(|v| serde_json::Number::from_f64(f64::from(v)))
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "FLOAT8" => row
            .try_get::<Option<f64>, _>(i)
            .ok()
            .flatten()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or(Value::Null),
        "BOOL" => row
            .try_get::<Option<bool>, _>(i)
            .map(|v| v.map(Value::Bool).unwrap_or(Value::Null))
            .unwrap_or(Value::Null),
        "TIMESTAMP" => row
            .try_get::<Option<NaiveDateTime>, _>(i)
            .map(|v| {
                v.map(|t| Value::String(t.format("%Y-%m-%d %H:%M:%S").to_string()))
                    .unwrap_or(Value::Null)
            })
            .unwrap_or(Value::Null),
        "TIMESTAMPTZ" => row
            .try_get::<Option<DateTime<Utc>>, _>(i)
            .map(|v| {
                v.map(|t| Value::String(t.format("%Y-%m-%d %H:%M:%S%:z").to_string()))
                    .unwrap_or(Value::Null)
            })
            .unwrap_or(Value::Null),
        "DATE" => row
            .try_get::<Option<NaiveDate>, _>(i)
            .map(|v| {
                v.map(|d| Value::String(d.format("%Y-%m-%d").to_string()))
                    .unwrap_or(Value::Null)
            })
            .unwrap_or(Value::Null),
        "JSON" | "JSONB" => row
            .try_get::<Option<Value>, _>(i)
            .map(|v| v.unwrap_or(Value::Null))
            .unwrap_or(Value::Null),
        // NUMERIC and anything exotic: try text, otherwise give up on the cell.
        _ => row
            .try_get::<Option<String>, _>(i)
            .map(|v| v.map(Value::String).unwrap_or(Value::Null))
            .unwrap_or(Value::Null),
    }
}
