//! Name-based operation dispatch.
//!
//! Hosts that invoke operations by name with loosely typed arguments go
//! through [`invoke`]. It resolves the name to an [`Operation`], checks the
//! target kind and the argument count, parses the correlation token and
//! then calls the typed method on [`Connection`] or [`Statement`]. Every
//! shape problem is a synchronous [`Error::InvalidInput`]; nothing is queued
//! in that case, so no reply follows.
//!
//! ```text
//! invoke("bind", token, mailbox, [[1, "a"]])
//!   ├── Operation::from_str      unknown name   -> InvalidInput
//!   ├── arity / target kind      mismatch       -> InvalidInput
//!   ├── Token::parse             malformed      -> InvalidToken
//!   └── Statement::bind          queued         -> Ok(())
//! ```

use crate::handle::{Connection, Statement};
use crate::mailbox::Mailbox;
use crate::models::Token;
use crate::{Error, Result};
use std::fmt;
use std::str::FromStr;

/// Operations a caller can request by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    /// Open the database at a path.
    Open,
    /// Run parameterless SQL.
    Exec,
    /// Compile a statement.
    Prepare,
    /// Bind a value list to a statement.
    Bind,
    /// Advance a statement by one row.
    Step,
    /// List a statement's column names.
    ColumnNames,
    /// Close the database.
    Close,
}

/// Kind of handle an operation addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    /// A [`Connection`].
    Connection,
    /// A [`Statement`].
    Statement,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connection => f.write_str("connection"),
            Self::Statement => f.write_str("statement"),
        }
    }
}

impl Operation {
    /// Every operation, in declaration order.
    pub const ALL: [Self; 7] = [
        Self::Open,
        Self::Exec,
        Self::Prepare,
        Self::Bind,
        Self::Step,
        Self::ColumnNames,
        Self::Close,
    ];

    /// Returns the operation name.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Exec => "exec",
            Self::Prepare => "prepare",
            Self::Bind => "bind",
            Self::Step => "step",
            Self::ColumnNames => "column_names",
            Self::Close => "close",
        }
    }

    /// Number of arguments after target, token and mailbox.
    #[must_use]
    pub const fn arity(self) -> usize {
        match self {
            Self::Open | Self::Exec | Self::Prepare | Self::Bind => 1,
            Self::Step | Self::ColumnNames | Self::Close => 0,
        }
    }

    /// The kind of handle this operation is sent to.
    #[must_use]
    pub const fn target_kind(self) -> TargetKind {
        match self {
            Self::Open | Self::Exec | Self::Prepare | Self::Close => TargetKind::Connection,
            Self::Bind | Self::Step | Self::ColumnNames => TargetKind::Statement,
        }
    }
}

impl FromStr for Operation {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "open" => Ok(Self::Open),
            "exec" => Ok(Self::Exec),
            "prepare" => Ok(Self::Prepare),
            "bind" => Ok(Self::Bind),
            "step" => Ok(Self::Step),
            "column_names" | "columns" => Ok(Self::ColumnNames),
            "close" => Ok(Self::Close),
            unknown => Err(Error::InvalidInput(format!("unknown operation '{unknown}'"))),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The handle an operation is invoked on.
#[derive(Debug, Clone, Copy)]
pub enum Target<'a> {
    /// A connection.
    Connection(&'a Connection),
    /// A prepared statement.
    Statement(&'a Statement),
}

impl Target<'_> {
    /// Returns the kind of handle.
    #[must_use]
    pub const fn kind(&self) -> TargetKind {
        match self {
            Self::Connection(_) => TargetKind::Connection,
            Self::Statement(_) => TargetKind::Statement,
        }
    }
}

impl<'a> From<&'a Connection> for Target<'a> {
    fn from(connection: &'a Connection) -> Self {
        Self::Connection(connection)
    }
}

impl<'a> From<&'a Statement> for Target<'a> {
    fn from(statement: &'a Statement) -> Self {
        Self::Statement(statement)
    }
}

/// Invokes an operation by name.
///
/// `args` holds the operation-specific arguments: a path string for
/// `open`, an SQL string for `exec` and `prepare`, a value list for `bind`,
/// and nothing for the rest.
///
/// # Errors
///
/// - [`Error::InvalidInput`] for an unknown name, the wrong number of
///   arguments, the wrong target kind or a non-string path/SQL argument
/// - [`Error::InvalidToken`] if `token` is not a valid token
/// - any error of the typed method that is called
pub fn invoke(
    target: Target<'_>,
    operation: &str,
    token: &str,
    reply_to: &Mailbox,
    args: &[serde_json::Value],
) -> Result<()> {
    let operation: Operation = operation.parse()?;
    if args.len() != operation.arity() {
        return Err(Error::InvalidInput(format!(
            "'{operation}' takes {} argument(s), got {}",
            operation.arity(),
            args.len()
        )));
    }
    if operation.target_kind() != target.kind() {
        return Err(Error::InvalidInput(format!(
            "'{operation}' applies to a {}, not a {}",
            operation.target_kind(),
            target.kind()
        )));
    }
    let token = Token::parse(token)?;

    match (operation, target, args) {
        (Operation::Open, Target::Connection(conn), [path]) => {
            conn.open(token, reply_to, text_arg(path, "path")?)
        },
        (Operation::Exec, Target::Connection(conn), [sql]) => {
            conn.exec(token, reply_to, text_arg(sql, "sql")?)
        },
        (Operation::Prepare, Target::Connection(conn), [sql]) => {
            conn.prepare(token, reply_to, text_arg(sql, "sql")?)
        },
        (Operation::Close, Target::Connection(conn), []) => conn.close(token, reply_to),
        (Operation::Bind, Target::Statement(stmt), [values]) => stmt.bind(token, reply_to, values),
        (Operation::Step, Target::Statement(stmt), []) => stmt.step(token, reply_to),
        (Operation::ColumnNames, Target::Statement(stmt), []) => stmt.column_names(token, reply_to),
        // Arity and target kind were checked above, so only an `Operation`
        // added without its arm lands here.
        (operation, target, args) => Err(Error::InvalidInput(format!(
            "'{operation}' cannot be invoked on a {} with {} argument(s)",
            target.kind(),
            args.len()
        ))),
    }
}

fn text_arg<'a>(value: &'a serde_json::Value, what: &str) -> Result<&'a str> {
    value
        .as_str()
        .ok_or_else(|| Error::InvalidInput(format!("{what} must be a string")))
}
