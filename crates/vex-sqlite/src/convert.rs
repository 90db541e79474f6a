//! Conversions between vex values/errors and their rusqlite counterparts

use rusqlite::types::Value as SqlValue;
use rusqlite::{ffi, ErrorCode};
use vex_core::{Value, VexError};

pub fn to_sql(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Integer(i) => SqlValue::Integer(*i),
        Value::Real(f) => SqlValue::Real(*f),
        Value::Text(t) => SqlValue::Text(t.clone()),
        Value::Blob(b) => SqlValue::Blob(b.clone()),
    }
}

pub fn from_sql(value: SqlValue) -> Value {
    match value {
        SqlValue::Null => Value::Null,
        SqlValue::Integer(i) => Value::Integer(i),
        SqlValue::Real(f) => Value::Real(f),
        SqlValue::Text(t) => Value::Text(t),
        SqlValue::Blob(b) => Value::Blob(b),
    }
}

/// Map a rusqlite error into the vex error space.
///
/// SQLite constraint failures keep their meaning; everything else is storage.
pub fn storage_error(err: rusqlite::Error) -> VexError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            VexError::ConstraintViolation(err.to_string())
        }
        _ => VexError::Storage(err.to_string()),
    }
}

/// Map a vex error into the host convention at the virtual table boundary.
pub fn host_error(err: VexError) -> rusqlite::Error {
    match err {
        VexError::ConstraintViolation(msg) => rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_CONSTRAINT),
            Some(format!("vec0 constraint violation: {}", msg)),
        ),
        other => rusqlite::Error::ModuleError(format!("vec0: {}", other)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_value_conversions() {
        let values = vec![
            Value::Null,
            Value::Integer(-3),
            Value::Real(1.5),
            Value::from("text"),
            Value::Blob(vec![1, 2, 3]),
        ];
        for value in values {
            assert_eq!(from_sql(to_sql(&value)), value);
        }
    }

    #[test]
    fn test_constraint_errors_keep_their_kind() {
        let failure = rusqlite::Error::SqliteFailure(
            ffi::Error::new(ffi::SQLITE_CONSTRAINT_PRIMARYKEY),
            Some("UNIQUE constraint failed".into()),
        );
        assert!(matches!(storage_error(failure), VexError::ConstraintViolation(_)));
        assert!(matches!(
            storage_error(rusqlite::Error::InvalidQuery),
            VexError::Storage(_)
        ));

        match host_error(VexError::ConstraintViolation("dup".into())) {
            rusqlite::Error::SqliteFailure(e, Some(msg)) => {
                assert_eq!(e.code, ErrorCode::ConstraintViolation);
                assert!(msg.contains("dup"));
            }
            other => panic!("unexpected {:?}", other),
        }
        assert!(matches!(
            host_error(VexError::Format("bad".into())),
            rusqlite::Error::ModuleError(_)
        ));
    }
}
