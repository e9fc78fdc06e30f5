//! Raw `SQLite` handles.
//!
//! Prepared statements here outlive any single call and keep their cursor
//! between steps, which rusqlite's borrowing `Statement`/`Rows` pair cannot
//! express across queue round trips. The handles below are therefore built
//! directly on `rusqlite::ffi`.
//!
//! Neither type is `Send`: both are created, used and dropped on the worker
//! thread that owns the connection.

#![allow(unsafe_code)]

use super::{EngineResult, StepOutcome};
use crate::models::{ReplyError, Value};
use rusqlite::ffi;
use std::ffi::{CStr, c_char, c_int, c_void};
use std::ptr::{self, NonNull};

/// An open engine connection.
#[derive(Debug)]
pub struct Database {
    raw: NonNull<ffi::sqlite3>,
}

impl Database {
    /// Opens (creating if needed) the database at `path`.
    ///
    /// A partially opened handle is closed before the error is returned.
    ///
    /// # Errors
    ///
    /// Returns [`ReplyError::Engine`] with the engine's error text.
    pub fn open(path: &CStr) -> EngineResult<Self> {
        let mut raw: *mut ffi::sqlite3 = ptr::null_mut();
        // SAFETY: `path` is NUL-terminated and `raw` is a valid out-pointer.
        let rc = unsafe { ffi::sqlite3_open(path.as_ptr(), &mut raw) };
        if rc != ffi::SQLITE_OK {
            // SAFETY: `raw` is null or a handle sqlite3_open just returned.
            let err = unsafe { error_for(raw, rc) };
            if !raw.is_null() {
                // SAFETY: the handle has no statements yet.
                unsafe { ffi::sqlite3_close(raw) };
            }
            return Err(err);
        }
        NonNull::new(raw)
            .map(|raw| Self { raw })
            .ok_or_else(|| engine_error(ffi::SQLITE_NOMEM, "out of memory"))
    }

    /// Runs SQL that needs no parameters and returns no rows.
    ///
    /// # Errors
    ///
    /// Returns [`ReplyError::Engine`] with the engine's error text.
    pub fn exec(&self, sql: &CStr) -> EngineResult<()> {
        // SAFETY: the handle is open and `sql` is NUL-terminated; no callback
        // and no error out-pointer are passed.
        let rc = unsafe {
            ffi::sqlite3_exec(
                self.raw.as_ptr(),
                sql.as_ptr(),
                None,
                ptr::null_mut(),
                ptr::null_mut(),
            )
        };
        self.check(rc)
    }

    /// Compiles one statement. A single attempt; busy handling is the caller's.
    ///
    /// Returns `Ok(None)` when `sql` holds no statement (empty or only
    /// comments).
    ///
    /// # Errors
    ///
    /// Returns [`ReplyError::Engine`] with the engine's error text.
    pub fn prepare(&self, sql: &CStr) -> EngineResult<Option<PreparedStatement>> {
        let len = c_int::try_from(sql.to_bytes().len())
            .map_err(|_| engine_error(ffi::SQLITE_TOOBIG, "SQL text too long"))?;
        let mut raw: *mut ffi::sqlite3_stmt = ptr::null_mut();
        // SAFETY: `sql` is valid for `len` bytes and outlives the call; the
        // tail out-pointer is not requested.
        let rc = unsafe {
            ffi::sqlite3_prepare_v2(
                self.raw.as_ptr(),
                sql.as_ptr(),
                len,
                &mut raw,
                ptr::null_mut(),
            )
        };
        self.check(rc)?;
        Ok(NonNull::new(raw).map(|raw| PreparedStatement { raw, db: self.raw }))
    }

    /// Closes the handle.
    ///
    /// The engine refuses while statements are still unfinalized; the handle
    /// is then returned with the error so it stays usable.
    ///
    /// # Errors
    ///
    /// Returns the still-open handle and the engine's error.
    pub fn close(self) -> std::result::Result<(), (Self, ReplyError)> {
        // SAFETY: the handle is open; on failure it remains open.
        let rc = unsafe { ffi::sqlite3_close(self.raw.as_ptr()) };
        if rc == ffi::SQLITE_OK {
            std::mem::forget(self);
            Ok(())
        } else {
            let err = self.error(rc);
            Err((self, err))
        }
    }

    fn check(&self, rc: c_int) -> EngineResult<()> {
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(self.error(rc))
        }
    }

    fn error(&self, rc: c_int) -> ReplyError {
        // SAFETY: the handle is open.
        unsafe { error_for(self.raw.as_ptr(), rc) }
    }
}

impl Drop for Database {
    fn drop(&mut self) {
        // Every statement is finalized before the handle drops: the worker
        // clears its registry first and declares it ahead of `db`.
        // SAFETY: the handle is open and never used again.
        unsafe { ffi::sqlite3_close(self.raw.as_ptr()) };
    }
}

/// A compiled statement. Finalized on drop.
#[derive(Debug)]
pub struct PreparedStatement {
    raw: NonNull<ffi::sqlite3_stmt>,
    db: NonNull<ffi::sqlite3>,
}

impl PreparedStatement {
    /// Number of parameters the statement declares.
    #[must_use]
    pub fn parameter_count(&self) -> usize {
        // SAFETY: the statement is live.
        let count = unsafe { ffi::sqlite3_bind_parameter_count(self.raw.as_ptr()) };
        usize::try_from(count).unwrap_or(0)
    }

    /// Resets the statement so it can run again. Bindings are kept.
    pub fn reset(&mut self) {
        // The return code repeats the last step's error, which was already
        // reported.
        // SAFETY: the statement is live.
        unsafe { ffi::sqlite3_reset(self.raw.as_ptr()) };
    }

    /// Binds `value` to the 1-based parameter `index`.
    ///
    /// # Errors
    ///
    /// Returns [`ReplyError::Engine`] with the engine's error text.
    pub fn bind(&mut self, index: usize, value: &Value) -> EngineResult<()> {
        let index = c_int::try_from(index)
            .map_err(|_| engine_error(ffi::SQLITE_RANGE, "bind index out of range"))?;
        let stmt = self.raw.as_ptr();
        // SAFETY: the statement is live; text and blob bytes are copied by the
        // engine (SQLITE_TRANSIENT) before the call returns.
        let rc = unsafe {
            match value {
                Value::Null => ffi::sqlite3_bind_null(stmt, index),
                Value::Integer(v) => ffi::sqlite3_bind_int64(stmt, index, *v),
                Value::Real(v) => ffi::sqlite3_bind_double(stmt, index, *v),
                Value::Text(s) => ffi::sqlite3_bind_text(
                    stmt,
                    index,
                    s.as_ptr().cast::<c_char>(),
                    byte_len(s.len())?,
                    ffi::SQLITE_TRANSIENT(),
                ),
                Value::Blob(b) => ffi::sqlite3_bind_blob(
                    stmt,
                    index,
                    b.as_ptr().cast::<c_void>(),
                    byte_len(b.len())?,
                    ffi::SQLITE_TRANSIENT(),
                ),
                Value::Unrecognized(code) => {
                    return Err(engine_error(
                        ffi::SQLITE_MISMATCH,
                        &format!("cannot bind unrecognized value type {code}"),
                    ));
                },
            }
        };
        self.check(rc)
    }

    /// Advances the statement by one step.
    ///
    /// # Errors
    ///
    /// Returns [`ReplyError::Engine`] for any status other than row, done
    /// or busy.
    pub fn step(&mut self) -> EngineResult<StepOutcome> {
        // SAFETY: the statement is live.
        let rc = unsafe { ffi::sqlite3_step(self.raw.as_ptr()) };
        match rc {
            ffi::SQLITE_ROW => Ok(StepOutcome::Row(self.row())),
            ffi::SQLITE_DONE => Ok(StepOutcome::Done),
            _ if rc & 0xff == ffi::SQLITE_BUSY => Ok(StepOutcome::Busy),
            _ => Err(self.error(rc)),
        }
    }

    /// Column names in declaration order.
    #[must_use]
    pub fn column_names(&self) -> Vec<String> {
        (0..self.column_count())
            .map(|i| {
                // SAFETY: the statement is live and `i` is in range; the name
                // is copied before any other call on the statement.
                unsafe {
                    let name = ffi::sqlite3_column_name(self.raw.as_ptr(), i);
                    if name.is_null() {
                        String::new()
                    } else {
                        CStr::from_ptr(name).to_string_lossy().into_owned()
                    }
                }
            })
            .collect()
    }

    fn column_count(&self) -> c_int {
        // SAFETY: the statement is live.
        unsafe { ffi::sqlite3_column_count(self.raw.as_ptr()) }
    }

    fn row(&self) -> Vec<Value> {
        (0..self.column_count())
            .map(|i| self.column_value(i))
            .collect()
    }

    fn column_value(&self, i: c_int) -> Value {
        let stmt = self.raw.as_ptr();
        // SAFETY: the statement sits on a row and `i` is in range. Text and
        // blob pointers are read before `sqlite3_column_bytes`, as the engine
        // requires, and copied before the next call on the statement.
        unsafe {
            match ffi::sqlite3_column_type(stmt, i) {
                ffi::SQLITE_INTEGER => Value::Integer(ffi::sqlite3_column_int64(stmt, i)),
                ffi::SQLITE_FLOAT => Value::Real(ffi::sqlite3_column_double(stmt, i)),
                ffi::SQLITE_TEXT => {
                    let text = ffi::sqlite3_column_text(stmt, i);
                    let len = usize::try_from(ffi::sqlite3_column_bytes(stmt, i)).unwrap_or(0);
                    if text.is_null() || len == 0 {
                        Value::Text(String::new())
                    } else {
                        let bytes = std::slice::from_raw_parts(text, len);
                        Value::Text(String::from_utf8_lossy(bytes).into_owned())
                    }
                },
                ffi::SQLITE_BLOB => {
                    let blob = ffi::sqlite3_column_blob(stmt, i);
                    let len = usize::try_from(ffi::sqlite3_column_bytes(stmt, i)).unwrap_or(0);
                    if blob.is_null() || len == 0 {
                        Value::Blob(Vec::new())
                    } else {
                        Value::Blob(std::slice::from_raw_parts(blob.cast::<u8>(), len).to_vec())
                    }
                },
                ffi::SQLITE_NULL => Value::Null,
                other => Value::Unrecognized(other),
            }
        }
    }

    fn check(&self, rc: c_int) -> EngineResult<()> {
        if rc == ffi::SQLITE_OK {
            Ok(())
        } else {
            Err(self.error(rc))
        }
    }

    fn error(&self, rc: c_int) -> ReplyError {
        // SAFETY: the owning connection outlives its statements.
        unsafe { error_for(self.db.as_ptr(), rc) }
    }
}

impl Drop for PreparedStatement {
    fn drop(&mut self) {
        // SAFETY: the statement is live and never used again.
        unsafe { ffi::sqlite3_finalize(self.raw.as_ptr()) };
    }
}

fn byte_len(len: usize) -> EngineResult<c_int> {
    c_int::try_from(len).map_err(|_| engine_error(ffi::SQLITE_TOOBIG, "value too large"))
}

fn engine_error(code: c_int, message: &str) -> ReplyError {
    ReplyError::Engine {
        code,
        message: message.to_string(),
    }
}

/// Builds an engine error from a result code and the handle's last message.
///
/// # Safety
///
/// `db` must be null or a live connection handle.
unsafe fn error_for(db: *mut ffi::sqlite3, rc: c_int) -> ReplyError {
    // SAFETY: guaranteed by the caller; both functions return static or
    // handle-owned strings that are copied immediately.
    let message = unsafe {
        let msg = if db.is_null() {
            ffi::sqlite3_errstr(rc)
        } else {
            ffi::sqlite3_errmsg(db)
        };
        if msg.is_null() {
            String::new()
        } else {
            CStr::from_ptr(msg).to_string_lossy().into_owned()
        }
    };
    ReplyError::Engine { code: rc, message }
}
