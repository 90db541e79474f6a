//! Integration tests for vex
//!
//! Every test opens a real store in a temporary directory, creates vec0
//! tables through the public helpers and queries them with `VectorSearch`.

use rusqlite::types::Value as SqlValue;
use std::collections::HashSet;
use std::sync::{Arc, Once};
use tempfile::TempDir;
use vex::{
    create_vector_table, ElementType, Metric, ReadPoolConfig, SqliteVecStore, StoreConfig,
    Vector, VectorConfig, VectorExtension, VectorSearch, VexError,
};
use vex_sqlite::convert::storage_error;

static TRACING: Once = Once::new();

fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
            )
            .with_test_writer()
            .try_init();
    });
}

fn setup_db(read_pool: Option<usize>) -> (Arc<SqliteVecStore>, TempDir) {
    init_tracing();
    let dir = tempfile::tempdir().unwrap();
    let mut config = StoreConfig::new(dir.path().join("vectors.db"));
    if let Some(size) = read_pool {
        config = config.with_read_pool(ReadPoolConfig::enabled(size));
    }
    (Arc::new(SqliteVecStore::open(config).unwrap()), dir)
}

fn cosine3() -> VectorConfig {
    VectorConfig::new(ElementType::Float32, 3, Metric::Cosine)
}

fn insert(store: &SqliteVecStore, sql: &str, params: Vec<SqlValue>) {
    store
        .transaction(|conn| {
            conn.execute(sql, rusqlite::params_from_iter(params))
                .map_err(storage_error)
        })
        .unwrap();
}

#[test]
fn test_extension_available() {
    let (store, _dir) = setup_db(None);
    assert!(store.has_vector_support());
    assert!(store.vector_version().unwrap().starts_with('v'));
}

#[tokio::test]
async fn test_basic_search() {
    let (store, _dir) = setup_db(None);
    store
        .execute(|conn| {
            create_vector_table(conn, "embeddings", "vector", cosine3(), &["+label text"])
        })
        .unwrap();

    let vectors = vec![
        (Vector::new(vec![1.0, 0.0, 0.0]), "x-axis"),
        (Vector::new(vec![0.0, 1.0, 0.0]), "y-axis"),
        (Vector::new(vec![0.0, 0.0, 1.0]), "z-axis"),
        (Vector::new(vec![0.7, 0.7, 0.0]), "xy-plane"),
    ];
    for (i, (vector, label)) in vectors.iter().enumerate() {
        insert(
            &store,
            "INSERT INTO embeddings (rowid, vector, label) VALUES (?, ?, ?)",
            vec![
                SqlValue::Integer(i as i64 + 1),
                SqlValue::Blob(vector.to_blob().unwrap()),
                SqlValue::Text(label.to_string()),
            ],
        );
    }

    let query = Vector::new(vec![0.9, 0.1, 0.0]);
    let search = VectorSearch::new(store.clone(), "embeddings", "vector").unwrap();
    let results = search.knn(&query, 2).await.unwrap();

    let rowids: Vec<i64> = results.iter().map(|r| r.rowid).collect();
    assert_eq!(rowids, vec![1, 4]);
    assert!(results[0].distance < results[1].distance);
    assert!(results[0].similarity(Metric::Cosine) > 0.99);

    let label: String = store
        .query(|conn| {
            conn.query_row(
                "SELECT label FROM embeddings WHERE rowid = ?",
                [results[1].rowid],
                |row| row.get(0),
            )
            .map_err(storage_error)
        })
        .unwrap();
    assert_eq!(label, "xy-plane");
}

#[tokio::test]
async fn test_filtered_search() {
    let (store, _dir) = setup_db(None);
    store
        .execute(|conn| {
            create_vector_table(
                conn,
                "items",
                "vector",
                cosine3(),
                &["category text", "in_stock boolean"],
            )
        })
        .unwrap();

    let items = vec![
        (vec![1.0, 0.0, 0.0], "electronics", 1),
        (vec![0.9, 0.1, 0.0], "electronics", 1),
        (vec![0.0, 1.0, 0.0], "books", 1),
        (vec![0.8, 0.2, 0.0], "electronics", 0),
    ];
    for (i, (vector, category, in_stock)) in items.into_iter().enumerate() {
        insert(
            &store,
            "INSERT INTO items (rowid, vector, category, in_stock) VALUES (?, ?, ?, ?)",
            vec![
                SqlValue::Integer(i as i64 + 1),
                SqlValue::Blob(Vector::new(vector).to_blob().unwrap()),
                SqlValue::Text(category.to_string()),
                SqlValue::Integer(in_stock),
            ],
        );
    }

    let query = Vector::new(vec![0.95, 0.05, 0.0]);
    let search = VectorSearch::new(store.clone(), "items", "vector").unwrap();
    let results = search
        .knn_filtered(
            &query,
            10,
            "category = ? AND in_stock = ?",
            vec![SqlValue::Text("electronics".into()), SqlValue::Integer(1)],
        )
        .await
        .unwrap();

    let rowids: HashSet<i64> = results.iter().map(|r| r.rowid).collect();
    assert_eq!(rowids, HashSet::from([1, 2]), "got {:?}", results);
}

#[tokio::test]
async fn test_threshold_search() {
    let (store, _dir) = setup_db(None);
    store.vector_init("docs", "vector", cosine3()).unwrap();

    for (i, vector) in [[1.0, 0.0, 0.0], [0.5, 0.5, 0.0], [0.0, 1.0, 0.0]]
        .into_iter()
        .enumerate()
    {
        insert(
            &store,
            "INSERT INTO docs (rowid, vector) VALUES (?, ?)",
            vec![
                SqlValue::Integer(i as i64 + 1),
                SqlValue::Blob(Vector::new(vector.to_vec()).to_blob().unwrap()),
            ],
        );
    }

    let query = Vector::new(vec![0.9, 0.1, 0.0]);
    let search = VectorSearch::new(store.clone(), "docs", "vector").unwrap();

    let results = search.threshold(&query, 0.4, 10).await.unwrap();
    let rowids: Vec<i64> = results.iter().map(|r| r.rowid).collect();
    assert_eq!(rowids, vec![1, 2]);
    assert!(results.iter().all(|r| r.distance <= 0.4));

    assert!(search.threshold(&query, 0.4, 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_partitioned_search_through_read_pool() {
    let (store, _dir) = setup_db(Some(2));
    store
        .execute(|conn| {
            create_vector_table(
                conn,
                "notes",
                "embedding",
                VectorConfig::float32(2),
                &["tenant text partition key"],
            )
        })
        .unwrap();

    for (rowid, x, tenant) in [(1, 0.0, "a"), (2, 1.0, "b"), (3, 2.0, "a"), (4, 3.0, "b")] {
        insert(
            &store,
            "INSERT INTO notes (rowid, embedding, tenant) VALUES (?, ?, ?)",
            vec![
                SqlValue::Integer(rowid),
                SqlValue::Blob(Vector::new(vec![x, 0.0]).to_blob().unwrap()),
                SqlValue::Text(tenant.into()),
            ],
        );
    }

    let search = VectorSearch::new(store.clone(), "notes", "embedding").unwrap();
    let query = Vector::new(vec![0.0, 0.0]);

    let in_b = search
        .knn_in_partition(&query, 5, "tenant", SqlValue::Text("b".into()))
        .await
        .unwrap();
    assert_eq!(in_b.iter().map(|r| r.rowid).collect::<Vec<_>>(), vec![2, 4]);
    assert_eq!(in_b[0].distance, 1.0);

    let nowhere = search
        .knn_in_partition(&query, 5, "tenant", SqlValue::Text("c".into()))
        .await
        .unwrap();
    assert!(nowhere.is_empty());
}

#[tokio::test]
async fn test_query_errors_surface() {
    let (store, _dir) = setup_db(None);
    store.vector_init("docs", "vector", cosine3()).unwrap();
    let search = VectorSearch::new(store.clone(), "docs", "vector").unwrap();

    let wrong_dimension = Vector::new(vec![1.0, 0.0]);
    let err = search.knn(&wrong_dimension, 3).await.unwrap_err();
    assert!(matches!(err, VexError::Storage(_)), "{:?}", err);

    let missing = VectorSearch::new(store, "nope", "vector").unwrap();
    assert!(missing.knn(&Vector::new(vec![1.0, 0.0, 0.0]), 3).await.is_err());
}
