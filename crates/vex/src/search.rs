//! Vector similarity search API

use crate::migration::is_valid_identifier;
use crate::types::{SearchResult, Vector};
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use std::sync::Arc;
use tracing::debug;
use vex_core::{Result, VexError};
use vex_sqlite::convert::storage_error;
use vex_sqlite::SqliteVecStore;

fn validate_sql_identifier(name: &str, kind: &str) -> Result<()> {
    if is_valid_identifier(name) {
        Ok(())
    } else {
        Err(VexError::Config(format!(
            "{} name '{}' must match [A-Za-z_][A-Za-z0-9_]* and be at most 128 characters",
            kind, name
        )))
    }
}

fn run_knn(conn: &Connection, sql: &str, params: Vec<SqlValue>) -> Result<Vec<SearchResult>> {
    let mut stmt = conn.prepare(sql).map_err(storage_error)?;
    let results = stmt
        .query_map(params_from_iter(params), |row| {
            Ok(SearchResult {
                rowid: row.get(0)?,
                distance: row.get::<_, f64>(1)? as f32,
            })
        })
        .map_err(storage_error)?
        .collect::<rusqlite::Result<Vec<_>>>()
        .map_err(storage_error)?;
    Ok(results)
}

/// Vector search builder over one vec0 table
///
/// Every query runs as a KNN scan inside the table; the distance metric is
/// the one declared on the column.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use vex::{SqliteVecStore, StoreConfig, Vector, VectorSearch};
///
/// # async fn example() -> vex::Result<()> {
/// let store = Arc::new(SqliteVecStore::open(StoreConfig::new("./data/vectors.db"))?);
///
/// let query = Vector::new(vec![0.1, 0.2, 0.3]);
/// let search = VectorSearch::new(store, "embeddings", "vector")?;
///
/// let results = search.knn(&query, 10).await?;
/// # Ok(())
/// # }
/// ```
pub struct VectorSearch {
    store: Arc<SqliteVecStore>,
    table: String,
    column: String,
}

impl VectorSearch {
    /// Create a new vector search builder
    ///
    /// # Errors
    ///
    /// Returns `Config` if `table` or `column` contain characters other than
    /// ASCII alphanumeric and underscore, or don't start with a letter/underscore.
    pub fn new(
        store: Arc<SqliteVecStore>,
        table: impl Into<String>,
        column: impl Into<String>,
    ) -> Result<Self> {
        let table = table.into();
        let column = column.into();
        validate_sql_identifier(&table, "Table")?;
        validate_sql_identifier(&column, "Column")?;
        Ok(Self {
            store,
            table,
            column,
        })
    }

    fn base_sql(&self) -> String {
        format!(
            "SELECT rowid, distance FROM {} WHERE {} MATCH ?1 AND k = ?2",
            self.table, self.column
        )
    }

    async fn run(&self, sql: String, params: Vec<SqlValue>) -> Result<Vec<SearchResult>> {
        debug!(table = %self.table, column = %self.column, "vector search");
        self.store
            .query_async(move |conn| run_knn(conn, &sql, params))
            .await
    }

    fn knn_params(query: &Vector, k: usize) -> Result<Vec<SqlValue>> {
        Ok(vec![
            SqlValue::Blob(query.to_blob()?),
            SqlValue::Integer(k as i64),
        ])
    }

    /// Perform k-nearest neighbors search
    ///
    /// Returns up to `k` results ordered by ascending distance, ties broken
    /// by ascending rowid.
    pub async fn knn(&self, query: &Vector, k: usize) -> Result<Vec<SearchResult>> {
        let sql = format!("{} ORDER BY distance", self.base_sql());
        self.run(sql, Self::knn_params(query, k)?).await
    }

    /// Search with distance threshold
    ///
    /// The bound is applied inside the scan, so rows beyond `max_distance`
    /// never take one of the `k` slots.
    pub async fn threshold(
        &self,
        query: &Vector,
        max_distance: f32,
        k: usize,
    ) -> Result<Vec<SearchResult>> {
        let sql = format!("{} AND distance <= ?3 ORDER BY distance", self.base_sql());
        let mut params = Self::knn_params(query, k)?;
        params.push(SqlValue::Real(max_distance as f64));
        self.run(sql, params).await
    }

    /// KNN restricted to rows whose partition key equals `value`
    pub async fn knn_in_partition(
        &self,
        query: &Vector,
        k: usize,
        partition_column: &str,
        value: impl Into<SqlValue>,
    ) -> Result<Vec<SearchResult>> {
        validate_sql_identifier(partition_column, "Column")?;
        let sql = format!(
            "{} AND {} = ?3 ORDER BY distance",
            self.base_sql(),
            partition_column
        );
        let mut params = Self::knn_params(query, k)?;
        params.push(value.into());
        self.run(sql, params).await
    }

    /// Search with custom SQL filter
    ///
    /// Filters on metadata and partition columns run inside the KNN scan.
    /// Filters on anything else are applied by SQLite to the `k` nearest
    /// rows, so fewer than `k` results may come back.
    ///
    /// # Safety (SQL Injection)
    ///
    /// The `filter` string is interpolated into the WHERE clause of the query.
    /// **Always use `?` placeholders** for values and pass them via `filter_params`.
    /// Never interpolate user input directly into the filter string.
    ///
    /// # Example
    ///
    /// ```no_run
    /// # use vex::{VectorSearch, Vector};
    /// # async fn example(search: VectorSearch) -> vex::Result<()> {
    /// let query = Vector::new(vec![0.1, 0.2, 0.3]);
    ///
    /// // GOOD: parameterized filter
    /// let results = search
    ///     .knn_filtered(&query, 10, "category = ?", vec!["tech".to_string().into()])
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn knn_filtered(
        &self,
        query: &Vector,
        k: usize,
        filter: &str,
        filter_params: Vec<SqlValue>,
    ) -> Result<Vec<SearchResult>> {
        let sql = format!("{} AND ({}) ORDER BY distance", self.base_sql(), filter);
        let mut params = Self::knn_params(query, k)?;
        params.extend(filter_params);
        self.run(sql, params).await
    }

    /// Get the underlying store
    pub fn store(&self) -> &Arc<SqliteVecStore> {
        &self.store
    }

    /// Get the table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Get the column name
    pub fn column(&self) -> &str {
        &self.column
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_store() -> Arc<SqliteVecStore> {
        Arc::new(SqliteVecStore::open_in_memory().unwrap())
    }

    #[test]
    fn test_search_builder() {
        let store = make_store();
        let search = VectorSearch::new(store, "test", "vector").unwrap();
        assert_eq!(search.table(), "test");
        assert_eq!(search.column(), "vector");
        assert_eq!(
            search.base_sql(),
            "SELECT rowid, distance FROM test WHERE vector MATCH ?1 AND k = ?2"
        );
    }

    #[test]
    fn test_identifier_validation_rejects_injection() {
        let store = make_store();

        assert!(VectorSearch::new(store.clone(), "x; DROP TABLE y; --", "vector").is_err());
        assert!(VectorSearch::new(store.clone(), "test", "v'; DROP TABLE y; --").is_err());
        assert!(VectorSearch::new(store.clone(), "", "vector").is_err());
        assert!(VectorSearch::new(store.clone(), "123table", "vector").is_err());

        assert!(VectorSearch::new(store.clone(), "my_table", "embedding_col").is_ok());
        assert!(VectorSearch::new(store, "_private", "_col").is_ok());
    }

    #[tokio::test]
    async fn test_partition_column_is_validated() {
        let search = VectorSearch::new(make_store(), "items", "embedding").unwrap();
        let result = search
            .knn_in_partition(&Vector::new(vec![1.0]), 1, "user; --", 1i64)
            .await;
        assert!(matches!(result, Err(VexError::Config(_))));
    }

    // Full integration tests in tests/ directory
}
