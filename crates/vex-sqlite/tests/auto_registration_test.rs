//! Process-wide auto-registration
//!
//! Kept in its own test binary: the hook affects every connection the process
//! opens afterwards.

mod common;

use rusqlite::Connection;
use vex_sqlite::AutoRegistration;

#[test]
fn test_auto_registration_lifecycle() {
    common::init_tracing();

    let auto = AutoRegistration::activate().unwrap();
    assert!(AutoRegistration::is_active());
    assert!(AutoRegistration::activate().is_err());

    let conn = Connection::open_in_memory().unwrap();
    conn.execute_batch(
        "CREATE VIRTUAL TABLE items USING vec0(embedding float[2]);
         INSERT INTO items(rowid, embedding) VALUES (1, '[1, 0]'), (2, '[0, 1]');",
    )
    .unwrap();
    let nearest: i64 = conn
        .query_row(
            "SELECT rowid FROM items WHERE embedding MATCH '[0.1, 0.9]' ORDER BY distance LIMIT 1",
            [],
            |r| r.get(0),
        )
        .unwrap();
    assert_eq!(nearest, 2);

    auto.deactivate();
    assert!(!AutoRegistration::is_active());

    // Connections opened before deactivation keep their registration.
    let n: i64 = conn
        .query_row("SELECT COUNT(*) FROM items", [], |r| r.get(0))
        .unwrap();
    assert_eq!(n, 2);

    let fresh = Connection::open_in_memory().unwrap();
    assert!(fresh.query_row("SELECT vec_version()", [], |r| r.get::<_, String>(0)).is_err());

    // Dropping the handle removes the hook just like deactivate().
    {
        let _auto = AutoRegistration::activate().unwrap();
        let hooked = Connection::open_in_memory().unwrap();
        assert!(hooked.query_row("SELECT vec_version()", [], |r| r.get::<_, String>(0)).is_ok());
    }
    assert!(!AutoRegistration::is_active());
    let unhooked = Connection::open_in_memory().unwrap();
    assert!(unhooked.query_row("SELECT vec_version()", [], |r| r.get::<_, String>(0)).is_err());

    let again = AutoRegistration::activate().unwrap();
    again.deactivate();
    assert!(!AutoRegistration::is_active());
}
