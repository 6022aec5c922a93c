//! Batch dispatch strategy selection and outcome bookkeeping
//!
//! A multi-row operation goes to the server one of four ways, tried in
//! priority order:
//!
//! 1. **Bulk**: one native batch frame, one outcome per row from the server
//! 2. **Rewrite**: rows folded into multi-row VALUES commands, chunked so no
//!    command exceeds the session's frame size; per-row counts are not
//!    available inside a successful chunk
//! 3. **Multi-statement**: N inlined statements in one frame, one reply each
//! 4. **One-by-one**: always available, always attributable, always slowest
//!
//! The session drives the wire round trips; this module owns the pure parts:
//! which strategy applies, how rewrite/multi-statement frames are chunked
//! (a chunk boundary never splits a row), and the outcome types.

use tracing::debug;

use crate::capabilities::SessionCapabilities;
use crate::dialect::DialectRules;
use crate::error::{Error, Result};
use crate::protocol::command::render_literal;
use crate::protocol::execute::BulkExecuteMessage;
use crate::row::Value;
use crate::statement::Statement;

/// A server-reported failure attributed to one batch row
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerFailure {
    /// Server error code
    pub code: u16,
    /// SQLSTATE
    pub sqlstate: String,
    /// Error message
    pub message: String,
}

impl ServerFailure {
    /// Capture a dispatch error as a per-row failure record
    pub fn from_error(err: &Error) -> Self {
        match err {
            Error::Server {
                code,
                sqlstate,
                message,
            } => Self {
                code: *code,
                sqlstate: sqlstate.clone(),
                message: message.clone(),
            },
            other => Self {
                code: 0,
                sqlstate: "HY000".to_string(),
                message: other.to_string(),
            },
        }
    }
}

impl std::fmt::Display for ServerFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({}): {}", self.code, self.sqlstate, self.message)
    }
}

/// Outcome of one submitted batch row
#[derive(Debug, Clone, PartialEq)]
pub enum RowOutcome {
    /// The row executed; this many rows were affected
    RowsAffected(u64),
    /// The row executed inside a folded rewrite chunk; the server reported
    /// one combined count for the chunk, so this row's own count is unknown
    SuccessUnknownCount,
    /// The row failed
    Failed(ServerFailure),
}

impl RowOutcome {
    /// Whether this row executed successfully
    pub fn is_success(&self) -> bool {
        !matches!(self, RowOutcome::Failed(_))
    }
}

/// Options governing batch dispatch
#[derive(Debug, Clone, Copy, Default)]
pub struct BatchOptions {
    /// Allow folding rewritable statements into multi-row VALUES commands
    pub rewrite_enabled: bool,
    /// Record failed rows and continue instead of aborting at the first error
    pub continue_on_error: bool,
}

impl BatchOptions {
    /// Default options: no rewrite, abort on first error
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable the rewrite strategy
    pub fn with_rewrite(mut self) -> Self {
        self.rewrite_enabled = true;
        self
    }

    /// Continue past failed rows, recording each failure
    pub fn with_continue_on_error(mut self) -> Self {
        self.continue_on_error = true;
        self
    }
}

/// The send strategy chosen for a batch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStrategy {
    /// Native batch frame, per-row outcomes from the server
    Bulk,
    /// Multi-row VALUES folding over the text protocol
    Rewrite,
    /// Concatenated statements in one text frame
    MultiStatement,
    /// Independent request per row
    OneByOne,
}

/// Choose the send strategy for a batch, in priority order
pub fn select_strategy(
    statement: &Statement,
    rows: &[Vec<Value>],
    caps: &SessionCapabilities,
    options: &BatchOptions,
    dialect: &dyn DialectRules,
) -> BatchStrategy {
    let strategy = if caps.supports_bulk
        && caps.binary_protocol
        && !statement.uses_text_protocol()
        && statement.is_dml()
        && statement.info().single_table.is_some()
        && BulkExecuteMessage::uniform_types(rows, dialect).is_some()
    {
        BatchStrategy::Bulk
    } else if options.rewrite_enabled && statement.is_rewritable() {
        BatchStrategy::Rewrite
    } else if caps.supports_multi_statement {
        BatchStrategy::MultiStatement
    } else {
        BatchStrategy::OneByOne
    };
    debug!(?strategy, rows = rows.len(), "selected batch strategy");
    strategy
}

/// A frame-sized slice of a rewritten or concatenated batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchChunk {
    /// The command text for this chunk
    pub sql: String,
    /// Index of the first member row (0-based, into the submitted rows)
    pub first_row: usize,
    /// Number of member rows
    pub row_count: usize,
}

/// Fold batch rows into multi-row VALUES chunks
///
/// A rewritable template ends in its VALUES tuple, so further rows append as
/// `, (literal, ...)`. Chunks are bounded by `max_frame_size` (including the
/// one-byte command header) and never split a row; a single row that cannot
/// fit a frame on its own fails with [`Error::BufferOverflow`].
pub fn build_rewrite_chunks(
    template: &str,
    rows: &[Vec<Value>],
    dialect: &dyn DialectRules,
    max_frame_size: usize,
) -> Result<Vec<BatchChunk>> {
    let budget = max_frame_size.saturating_sub(1);
    let mut chunks = Vec::new();
    let mut current: Option<BatchChunk> = None;

    for (idx, row) in rows.iter().enumerate() {
        let tuple = render_values_tuple(row, dialect)?;
        let fits = matches!(&current, Some(chunk) if chunk.sql.len() + tuple.len() <= budget);
        if fits {
            if let Some(chunk) = current.as_mut() {
                chunk.sql.push_str(&tuple);
                chunk.row_count += 1;
            }
            continue;
        }
        if let Some(done) = current.take() {
            chunks.push(done);
        }
        // this row opens a chunk as the full base statement
        let base =
            crate::protocol::command::QueryMessage::with_inlined_params(template, row, dialect)?
                .sql()
                .to_string();
        if base.len() > budget {
            return Err(Error::BufferOverflow {
                needed: base.len(),
                available: budget,
            });
        }
        current = Some(BatchChunk {
            sql: base,
            first_row: idx,
            row_count: 1,
        });
    }
    chunks.extend(current);
    debug!(chunks = chunks.len(), rows = rows.len(), "built rewrite chunks");
    Ok(chunks)
}

/// `, (literal, ...)`: the form a row takes when appended to an open chunk
fn render_values_tuple(row: &[Value], dialect: &dyn DialectRules) -> Result<String> {
    let mut tuple = String::from(", (");
    for (i, value) in row.iter().enumerate() {
        if i > 0 {
            tuple.push_str(", ");
        }
        tuple.push_str(&render_literal(value, dialect)?);
    }
    tuple.push(')');
    Ok(tuple)
}

/// Concatenate per-row statements into multi-statement frames
///
/// Each row is inlined into a full statement; statements join with the
/// protocol's `;` separator. Chunks are bounded by `max_frame_size` and never
/// split a statement.
pub fn build_multi_statement_chunks(
    template: &str,
    rows: &[Vec<Value>],
    dialect: &dyn DialectRules,
    max_frame_size: usize,
) -> Result<Vec<BatchChunk>> {
    const SEPARATOR: &str = "; ";
    let budget = max_frame_size.saturating_sub(1);
    let mut chunks = Vec::new();
    let mut current: Option<BatchChunk> = None;

    for (idx, row) in rows.iter().enumerate() {
        let rendered =
            crate::protocol::command::QueryMessage::with_inlined_params(template, row, dialect)?
                .sql()
                .to_string();
        if rendered.len() > budget {
            return Err(Error::BufferOverflow {
                needed: rendered.len(),
                available: budget,
            });
        }
        let fits = matches!(
            &current,
            Some(chunk) if chunk.sql.len() + SEPARATOR.len() + rendered.len() <= budget
        );
        if fits {
            if let Some(chunk) = current.as_mut() {
                chunk.sql.push_str(SEPARATOR);
                chunk.sql.push_str(&rendered);
                chunk.row_count += 1;
            }
        } else {
            if let Some(done) = current.take() {
                chunks.push(done);
            }
            current = Some(BatchChunk {
                sql: rendered,
                first_row: idx,
                row_count: 1,
            });
        }
    }
    chunks.extend(current);
    Ok(chunks)
}

/// Wrap a partial outcome sequence into the single batch error
///
/// `row_index` is the 0-based index of the row that failed; the outcome
/// sequence holds exactly the rows processed before it.
pub fn batch_abort(outcomes: Vec<RowOutcome>, row_index: usize, cause: Error) -> Error {
    Error::Batch {
        row_index,
        outcomes,
        source: Box::new(cause),
    }
}
