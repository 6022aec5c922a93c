#![warn(missing_docs)]

//! # maria-rs
//!
//! Statement-execution and result-materialization core for MySQL-family
//! databases, with an Oracle-compatible dialect mode over the same wire
//! format.
//!
//! The crate turns a classified SQL template plus typed parameter rows into
//! on-wire requests, and turns the server's row stream back into typed,
//! randomly-navigable, optionally-mutable result cursors. Transport and
//! authentication, connection-string parsing, pooling, and SQL analysis are
//! external collaborators consumed behind traits; the core receives a live,
//! authenticated, byte-oriented session.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use maria_rs::{
//!     CursorMode, MySqlDialect, NoRowLocks, QueryOptions, Session, SqlType, Value,
//! };
//! # fn example(
//! #     transport: impl maria_rs::SessionTransport,
//! #     classifier: Box<dyn maria_rs::StatementClassifier>,
//! # ) -> maria_rs::Result<()> {
//! let mut session = Session::new(
//!     transport,
//!     classifier,
//!     Box::new(NoRowLocks),
//!     Box::new(MySqlDialect),
//! );
//!
//! let stmt = session.prepare("SELECT id, name FROM users WHERE dept = ?")?;
//! session.bind(stmt, 1, Value::Int(10), SqlType::Int)?;
//! let cursor = session.execute_query(
//!     stmt,
//!     QueryOptions::new().with_mode(CursorMode::ScrollInsensitive),
//! )?;
//!
//! while session.cursor_next(cursor)? {
//!     let id = session.get_value(cursor, 0, SqlType::BigInt)?;
//!     let name = session.get_value(cursor, 1, SqlType::Varchar)?;
//!     println!("{}: {}", id, name);
//! }
//! session.close_cursor(cursor)?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Batch Operations
//!
//! ```rust,no_run
//! use maria_rs::{BatchOptions, SqlType, Value};
//! # fn example(
//! #     session: &mut maria_rs::Session<impl maria_rs::SessionTransport>,
//! # ) -> maria_rs::Result<()> {
//! let stmt = session.prepare("INSERT INTO users (id, name) VALUES (?, ?)")?;
//! for (id, name) in [(1, "Alice"), (2, "Bob"), (3, "Charlie")] {
//!     session.bind(stmt, 1, Value::Int(id), SqlType::Int)?;
//!     session.bind(stmt, 2, Value::from(name), SqlType::Varchar)?;
//!     session.add_row(stmt)?;
//! }
//! let outcomes = session.execute_batch(stmt, BatchOptions::new())?;
//! println!("{} rows dispatched", outcomes.len());
//! # Ok(())
//! # }
//! ```
//!
//! The dispatcher picks the cheapest strategy the session supports (native
//! bulk frames, multi-row VALUES rewriting, multi-statement frames, or
//! one-row-at-a-time) while preserving per-row outcome attribution wherever
//! the chosen strategy can provide it.

pub mod binder;
pub mod buffer;
pub mod capabilities;
pub mod coerce;
pub mod constants;
pub mod cursor;
pub mod dialect;
pub mod dispatch;
pub mod error;
pub mod protocol;
pub mod row;
pub mod session;
pub mod statement;
pub mod transport;
pub mod types;

// Re-export commonly used types
pub use binder::{BindContext, BoundValue, ParamBinder, TransferMode};
pub use capabilities::SessionCapabilities;
pub use coerce::{coerce, SqlType};
pub use constants::{FetchOrientation, FieldType};
pub use cursor::{Concurrency, Cursor, CursorMode, Position, UpdateTarget};
pub use dialect::{DialectRules, MySqlDialect, OracleModeDialect};
pub use dispatch::{BatchOptions, BatchStrategy, RowOutcome, ServerFailure};
pub use error::{Error, Result};
pub use row::{Row, Value};
pub use session::{QueryOptions, Session, DEFAULT_FETCH_SIZE};
pub use statement::{ColumnInfo, Statement, StatementClassifier, StatementInfo, StatementKind};
pub use transport::{NoRowLocks, RowLockContext, SessionTransport};
pub use types::{
    ArrayValue, DateTimeValue, Decimal, DecodePolicy, IntervalDayTime, IntervalYearMonth,
    LobContent, LobHandle, LobKind, LobLocator, LobOrigin, StructValue, TimeZoneSpec,
};
