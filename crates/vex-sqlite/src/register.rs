//! Installing vex on connections
//!
//! [`register`] installs the `vec0` module, the `vec_each` table-valued
//! function and the scalar functions on one connection. [`AutoRegistration`] hooks every connection opened afterwards
//! in this process.

use crate::convert::storage_error;
use crate::functions::register_functions;
use crate::{each, vtab};
use rusqlite::{ffi, Connection};
use std::ffi::{c_void, CString};
use std::os::raw::{c_char, c_int};
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, info, warn};
use vex_core::{Result, VexError};

/// Install the `vec0` module, `vec_each` and all vector functions on `conn`.
pub fn register(conn: &Connection) -> Result<()> {
    vtab::register_module(conn).map_err(storage_error)?;
    each::register_module(conn).map_err(storage_error)?;
    register_functions(conn).map_err(storage_error)?;
    debug!("Registered vec0, vec_each and vector functions");
    Ok(())
}

static AUTO_ACTIVE: AtomicBool = AtomicBool::new(false);

unsafe extern "C" fn auto_register(
    db: *mut ffi::sqlite3,
    pz_err_msg: *mut *mut c_char,
    _api: *const c_void,
) -> c_int {
    // SAFETY: SQLite hands the entry point a live handle it keeps ownership of.
    let result = unsafe { Connection::from_handle(db) }
        .map_err(storage_error)
        .and_then(|conn| register(&conn));

    match result {
        Ok(()) => ffi::SQLITE_OK,
        Err(e) => {
            warn!("vec0 auto-registration failed: {}", e);
            if !pz_err_msg.is_null() {
                if let Ok(msg) = CString::new(e.to_string()) {
                    // SAFETY: SQLite frees the message with sqlite3_free.
                    unsafe {
                        *pz_err_msg = ffi::sqlite3_mprintf(
                            b"%s\0".as_ptr() as *const c_char,
                            msg.as_ptr(),
                        );
                    }
                }
            }
            ffi::SQLITE_ERROR
        }
    }
}

/// Process-wide auto-registration of vex on every new connection
///
/// Only one handle can be live at a time. The hook stays installed for as
/// long as the handle lives; dropping it (or calling
/// [`AutoRegistration::deactivate`]) removes the hook.
///
/// # Example
///
/// ```ignore
/// let auto = AutoRegistration::activate()?;
/// let conn = Connection::open_in_memory()?;
/// conn.execute_batch("CREATE VIRTUAL TABLE v USING vec0(embedding float[4])")?;
/// auto.deactivate();
/// ```
#[must_use = "auto-registration is removed as soon as the handle is dropped"]
#[derive(Debug)]
pub struct AutoRegistration {
    _private: (),
}

impl AutoRegistration {
    /// Install the auto-extension hook, returning the only live handle.
    pub fn activate() -> Result<Self> {
        if AUTO_ACTIVE
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(VexError::Config(
                "vec0 auto-registration is already active".into(),
            ));
        }

        // SAFETY: the entry point matches SQLite's extension init signature.
        let rc = unsafe {
            ffi::sqlite3_auto_extension(Some(std::mem::transmute(auto_register as *const ())))
        };
        if rc != ffi::SQLITE_OK {
            AUTO_ACTIVE.store(false, Ordering::SeqCst);
            return Err(VexError::Storage(format!(
                "sqlite3_auto_extension failed with code {}",
                rc
            )));
        }

        info!("vec0 auto-registration activated");
        Ok(Self { _private: () })
    }

    /// Remove the hook. Connections already opened keep their registration.
    pub fn deactivate(self) {
        drop(self);
    }

    pub fn is_active() -> bool {
        AUTO_ACTIVE.load(Ordering::SeqCst)
    }
}

impl Drop for AutoRegistration {
    fn drop(&mut self) {
        // SAFETY: same entry point that was registered in `activate`.
        let removed = unsafe {
            ffi::sqlite3_cancel_auto_extension(Some(std::mem::transmute(
                auto_register as *const (),
            )))
        };
        AUTO_ACTIVE.store(false, Ordering::SeqCst);
        if removed == 0 {
            warn!("vec0 auto-registration hook was not installed");
        }
        info!("vec0 auto-registration deactivated");
    }
}
