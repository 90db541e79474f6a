use rusqlite::Connection;
use std::sync::Once;

static TRACING: Once = Once::new();

/// Install a test subscriber that honors `RUST_LOG`.
pub fn init_tracing() {
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

/// In-memory connection with vex registered.
#[allow(dead_code)]
pub fn connection() -> Connection {
    init_tracing();
    let conn = Connection::open_in_memory().unwrap();
    vex_sqlite::register(&conn).unwrap();
    conn
}

/// Little-endian float32 bytes for a query parameter.
#[allow(dead_code)]
pub fn f32_blob(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}
