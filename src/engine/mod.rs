//! Synchronous storage-engine interface used by connection workers.
//!
//! Everything in this module blocks and is only ever called from a worker
//! thread. Engine failures are reported as [`ReplyError::Engine`] carrying
//! the engine's own result code and error text.

mod sqlite;

pub use sqlite::{Database, PreparedStatement};

use crate::models::{ReplyError, Value};

/// Result of an engine call.
pub type EngineResult<T> = std::result::Result<T, ReplyError>;

/// Outcome of advancing a statement by one step.
#[derive(Debug, Clone, PartialEq)]
pub enum StepOutcome {
    /// A materialized row.
    Row(Vec<Value>),
    /// No more rows.
    Done,
    /// The engine could not take a lock right now.
    Busy,
}

/// Primary result code the engine uses for a transient lock conflict.
pub const BUSY: i32 = rusqlite::ffi::SQLITE_BUSY;
