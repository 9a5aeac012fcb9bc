// SPDX-FileCopyrightText: 2026 Apiary Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Execution of gatekeeper-approved dynamic SQL.
//!
//! Only statements that passed [`apiary_dsl::sqlgate::validate`] reach
//! this module; the prepared form carries `?N` placeholders and the
//! ordered bind names, and the caller supplies the matching values from
//! its action scope. Failures here are `sql_error`s recovered by the
//! action executor, not availability problems.

use apiary_core::ApiaryError;
use apiary_dsl::PreparedSql;
use rusqlite::params_from_iter;
use rusqlite::types::Value as SqlValue;
use serde_json::{Map, Value};

use crate::database::Database;

/// Run a read statement; returns one JSON object per row.
pub async fn run_query(
    db: &Database,
    prepared: &PreparedSql,
    binds: Vec<Value>,
) -> Result<Vec<Value>, ApiaryError> {
    let sql = prepared.sql.clone();
    let values: Vec<SqlValue> = binds.into_iter().map(to_sql_value).collect();
    db.connection()
        .call(move |conn| -> Result<Vec<Value>, tokio_rusqlite::Error> {
            let mut stmt = conn.prepare(&sql)?;
            let columns: Vec<String> =
                stmt.column_names().iter().map(|c| c.to_string()).collect();
            let mut rows = stmt.query(params_from_iter(values))?;
            let mut out = Vec::new();
            while let Some(row) = rows.next()? {
                let mut object = Map::new();
                for (index, column) in columns.iter().enumerate() {
                    object.insert(column.clone(), from_sql_ref(row.get_ref(index)?));
                }
                out.push(Value::Object(object));
            }
            Ok(out)
        })
        .await
        .map_err(|e| ApiaryError::SqlFailed(e.to_string()))
}

/// Run a mutating statement; returns the affected row count.
pub async fn run_exec(
    db: &Database,
    prepared: &PreparedSql,
    binds: Vec<Value>,
) -> Result<usize, ApiaryError> {
    let sql = prepared.sql.clone();
    let values: Vec<SqlValue> = binds.into_iter().map(to_sql_value).collect();
    db.connection()
        .call(move |conn| -> Result<usize, tokio_rusqlite::Error> {
            let n = conn.execute(&sql, params_from_iter(values))?;
            Ok(n)
        })
        .await
        .map_err(|e| ApiaryError::SqlFailed(e.to_string()))
}

/// Scope value to driver value. Non-scalar values travel as their JSON
/// text, which keeps them greppable in the example-domain tables.
fn to_sql_value(value: Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(b as i64),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else {
                SqlValue::Real(n.as_f64().unwrap_or(0.0))
            }
        }
        Value::String(s) => SqlValue::Text(s),
        other => SqlValue::Text(other.to_string()),
    }
}

fn from_sql_ref(value: rusqlite::types::ValueRef<'_>) -> Value {
    use rusqlite::types::ValueRef;
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Value::from(f),
        ValueRef::Text(bytes) => Value::String(String::from_utf8_lossy(bytes).into_owned()),
        ValueRef::Blob(_) => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use apiary_dsl::{sqlgate, SqlMode};

    #[tokio::test]
    async fn exec_then_query_round_trip_through_the_gatekeeper() {
        let db = Database::open_in_memory().await.unwrap();
        let vars = vec!["service".to_string(), "slot".to_string()];

        let insert = sqlgate::validate(
            "INSERT INTO bookings (bot_id, user_id, service, slot)
             VALUES (:bot_id, :user_id, :service, :slot)",
            SqlMode::Exec,
            &vars,
        )
        .unwrap();
        let n = run_exec(
            &db,
            &insert,
            vec![
                Value::from("b-1"),
                Value::from(7),
                Value::from("massage"),
                Value::from("2025-01-15 14:00"),
            ],
        )
        .await
        .unwrap();
        assert_eq!(n, 1);

        let select = sqlgate::validate(
            "SELECT service, slot FROM bookings WHERE bot_id = :bot_id AND user_id = :user_id",
            SqlMode::Query,
            &[],
        )
        .unwrap();
        let rows = run_query(&db, &select, vec![Value::from("b-1"), Value::from(7)])
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["service"], "massage");
        assert_eq!(rows[0]["slot"], "2025-01-15 14:00");
    }

    #[tokio::test]
    async fn execution_failure_maps_to_sql_error() {
        let db = Database::open_in_memory().await.unwrap();
        let select = sqlgate::validate(
            "SELECT x FROM table_that_is_not_there WHERE bot_id = :bot_id",
            SqlMode::Query,
            &[],
        )
        .unwrap();
        let err = run_query(&db, &select, vec![Value::from("b-1")])
            .await
            .unwrap_err();
        assert_eq!(err.code(), "sql_error");
    }
}
