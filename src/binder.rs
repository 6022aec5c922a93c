//! Parameter binding
//!
//! A binder accumulates one or more parameter rows for a statement template.
//! Binding validates the ordinal against the template's declared placeholder
//! count immediately (an out-of-range bind is a caller programming error);
//! completeness (every declared ordinal bound) is validated when a row is
//! frozen or the statement is dispatched. Each bound value carries a transfer
//! mode: inlined as a SQL literal on the text path, encoded with a wire type
//! tag on the binary path, or streamed in pieces ahead of execution when the
//! content is too large for one frame.

use bytes::Bytes;
use tracing::trace;

use crate::coerce::SqlType;
use crate::error::{Error, Result};
use crate::row::Value;
use crate::types::LobContent;

/// How a bound value travels to the server
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    /// Rendered as a dialect-quoted SQL literal (text protocol)
    Inline,
    /// Encoded with an explicit wire type tag (binary protocol)
    Binary,
    /// Sent in pieces ahead of the execute command
    Streamed,
}

/// Session facts consulted when selecting a transfer mode
#[derive(Debug, Clone, Copy)]
pub struct BindContext {
    /// The statement executes over the text protocol (no binary sub-protocol,
    /// or the documented prepared-path fallback)
    pub text_protocol: bool,
    /// Maximum size of a single frame this session may send
    pub max_frame_size: usize,
}

impl BindContext {
    /// Pick the transfer mode for a value under this session's constraints
    pub fn select_mode(&self, value: &Value) -> TransferMode {
        if self.text_protocol {
            return TransferMode::Inline;
        }
        let oversized = match value {
            Value::Lob(lob) => lob.len() as usize > self.max_frame_size,
            Value::Bytes(b) => b.len() > self.max_frame_size,
            Value::Text(s) => s.len() > self.max_frame_size,
            _ => false,
        };
        if oversized {
            TransferMode::Streamed
        } else {
            TransferMode::Binary
        }
    }
}

/// A value bound to one placeholder ordinal
#[derive(Debug, Clone)]
pub struct BoundValue {
    /// The value itself
    pub value: Value,
    /// The SQL type the caller declared for it
    pub declared_type: SqlType,
    /// How the value travels to the server
    pub mode: TransferMode,
}

/// Accumulates parameter rows for one statement
#[derive(Debug, Default)]
pub struct ParamBinder {
    /// Placeholder count declared by the template
    placeholder_count: usize,
    /// The row currently being bound, ordinal-indexed
    current: Vec<Option<BoundValue>>,
    /// Rows frozen by `add_row`, awaiting dispatch
    pending: Vec<Vec<BoundValue>>,
}

impl ParamBinder {
    /// Create a binder for a template declaring `placeholder_count` ordinals
    pub fn new(placeholder_count: usize) -> Self {
        Self {
            placeholder_count,
            current: vec![None; placeholder_count],
            pending: Vec::new(),
        }
    }

    /// Placeholder count declared by the template
    pub fn placeholder_count(&self) -> usize {
        self.placeholder_count
    }

    /// Record a value for `ordinal` (1-based) in the current row
    ///
    /// Fails immediately with [`Error::ParameterIndex`] when the ordinal is
    /// outside the template's declared range; re-binding an ordinal replaces
    /// the previous value.
    pub fn bind(
        &mut self,
        ordinal: usize,
        value: Value,
        declared_type: SqlType,
        ctx: &BindContext,
    ) -> Result<()> {
        self.check_ordinal(ordinal)?;
        let mode = ctx.select_mode(&value);
        self.current[ordinal - 1] = Some(BoundValue {
            value,
            declared_type,
            mode,
        });
        Ok(())
    }

    /// Record a caller-supplied length-bounded stream for `ordinal`
    ///
    /// The content is always sent piecewise, regardless of its size.
    pub fn bind_streamed(
        &mut self,
        ordinal: usize,
        content: Bytes,
        declared_type: SqlType,
    ) -> Result<()> {
        self.check_ordinal(ordinal)?;
        self.current[ordinal - 1] = Some(BoundValue {
            value: Value::Bytes(content),
            declared_type,
            mode: TransferMode::Streamed,
        });
        Ok(())
    }

    fn check_ordinal(&self, ordinal: usize) -> Result<()> {
        if ordinal == 0 || ordinal > self.placeholder_count {
            return Err(Error::ParameterIndex {
                index: ordinal,
                count: self.placeholder_count,
            });
        }
        Ok(())
    }

    /// Whether any ordinal of the current row has been bound
    pub fn has_current_bindings(&self) -> bool {
        self.current.iter().any(Option::is_some)
    }

    /// Number of rows frozen and awaiting dispatch
    pub fn pending_row_count(&self) -> usize {
        self.pending.len()
    }

    /// Fail with [`Error::MissingParameter`] unless every ordinal is bound
    pub fn check_complete(&self) -> Result<()> {
        for (idx, slot) in self.current.iter().enumerate() {
            if slot.is_none() {
                return Err(Error::MissingParameter { ordinal: idx + 1 });
            }
        }
        Ok(())
    }

    /// Freeze the current row into the pending batch and open a new one
    pub fn add_row(&mut self) -> Result<()> {
        self.check_complete()?;
        let row = std::mem::replace(&mut self.current, vec![None; self.placeholder_count])
            .into_iter()
            .flatten()
            .collect();
        self.pending.push(row);
        trace!(rows = self.pending.len(), "froze parameter row");
        Ok(())
    }

    /// Validate and take the current row for single execution
    ///
    /// The current row is cleared; frozen batch rows are untouched.
    pub fn take_current(&mut self) -> Result<Vec<BoundValue>> {
        self.check_complete()?;
        let row = std::mem::replace(&mut self.current, vec![None; self.placeholder_count]);
        Ok(row.into_iter().flatten().collect())
    }

    /// Take all frozen rows for batch dispatch
    pub fn take_rows(&mut self) -> Vec<Vec<BoundValue>> {
        std::mem::take(&mut self.pending)
    }

    /// Drop all pending rows and current bindings
    pub fn reset(&mut self) {
        self.pending.clear();
        self.current = vec![None; self.placeholder_count];
    }
}

/// Project the plain values out of a bound row
pub fn row_values(row: &[BoundValue]) -> Vec<Value> {
    row.iter().map(|b| b.value.clone()).collect()
}

/// Split a bound row into execute values and streamed pieces
///
/// Streamed parameters are sent piecewise ahead of the execute command; their
/// execute-frame slot carries an empty placeholder the server completes from
/// the accumulated pieces. Returns the execute values plus `(ordinal0, bytes)`
/// per streamed parameter.
pub fn split_streamed(row: &[BoundValue]) -> Result<(Vec<Value>, Vec<(u16, Bytes)>)> {
    let mut values = Vec::with_capacity(row.len());
    let mut streamed = Vec::new();
    for (idx, bound) in row.iter().enumerate() {
        if bound.mode != TransferMode::Streamed {
            values.push(bound.value.clone());
            continue;
        }
        let content = match &bound.value {
            Value::Bytes(b) => b.clone(),
            Value::Text(s) => Bytes::copy_from_slice(s.as_bytes()),
            Value::Lob(lob) => match lob.content() {
                LobContent::Loaded { .. } => lob.read_loaded(0, lob.len())?,
                LobContent::Locator(_) => {
                    return Err(Error::NotSupported(
                        "locator-backed LOBs cannot be streamed as parameters".to_string(),
                    ))
                }
            },
            other => {
                return Err(Error::Internal(format!(
                    "{} is not streamable",
                    other.type_name()
                )))
            }
        };
        streamed.push((idx as u16, content));
        values.push(Value::Bytes(Bytes::new()));
    }
    Ok((values, streamed))
}
