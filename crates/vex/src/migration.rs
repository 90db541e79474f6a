//! Migration helpers for creating vec0 tables

use crate::types::VectorConfig;
use rusqlite::Connection;
use vex_core::{Result, VexError};
use vex_sqlite::convert::storage_error;

/// Create a vec0 table with one vector column plus extra declarations
///
/// `extra_columns` are passed through as vec0 declarations, for example
/// `"user_id integer partition key"`, `"year integer"` or `"+body text"`.
///
/// # Example
///
/// ```no_run
/// use rusqlite::Connection;
/// use vex::{create_vector_table, VectorConfig};
///
/// # fn example() -> vex::Result<()> {
/// let conn = Connection::open_in_memory().map_err(vex_sqlite::convert::storage_error)?;
/// vex_sqlite::register(&conn)?;
/// create_vector_table(
///     &conn,
///     "documents",
///     "embedding",
///     VectorConfig::default(),
///     &["doc_id integer primary key", "+body text"],
/// )?;
/// # Ok(())
/// # }
/// ```
pub fn create_vector_table(
    conn: &Connection,
    table_name: &str,
    vector_column: &str,
    config: VectorConfig,
    extra_columns: &[&str],
) -> Result<()> {
    // Validate table name and column name (prevent SQL injection)
    if !is_valid_identifier(table_name) {
        return Err(VexError::Config(format!("Invalid table name: {}", table_name)));
    }
    if !is_valid_identifier(vector_column) {
        return Err(VexError::Config(format!(
            "Invalid column name: {}",
            vector_column
        )));
    }
    config.validate()?;

    let mut declarations = vec![config.column_declaration(vector_column)];
    for extra in extra_columns {
        if extra.contains(|c| matches!(c, '(' | ')' | ';' | ',')) {
            return Err(VexError::Config(format!(
                "Invalid column declaration: {}",
                extra
            )));
        }
        declarations.push(extra.trim().to_string());
    }

    let sql = format!(
        "CREATE VIRTUAL TABLE {} USING vec0({})",
        table_name,
        declarations.join(", ")
    );
    conn.execute_batch(&sql).map_err(storage_error)?;

    tracing::info!(
        "Created vec0 table {} with vector column {} ({}[{}], {})",
        table_name,
        vector_column,
        config.element_type,
        config.dimension,
        config.metric
    );

    Ok(())
}

/// Drop a vec0 table and its stored rows, if it exists
pub fn drop_vector_table(conn: &Connection, table_name: &str) -> Result<()> {
    if !is_valid_identifier(table_name) {
        return Err(VexError::Config(format!("Invalid table name: {}", table_name)));
    }
    conn.execute_batch(&format!("DROP TABLE IF EXISTS {}", table_name))
        .map_err(storage_error)?;
    tracing::info!("Dropped vec0 table {}", table_name);
    Ok(())
}

/// Validate SQL identifier (table/column name)
///
/// Allows alphanumeric, underscore, and must start with letter/underscore
pub fn is_valid_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) if first.is_ascii_alphabetic() || first == '_' => {}
        _ => return false,
    }
    name.len() <= 128 && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
