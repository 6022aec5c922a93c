//! Result cursor navigation and mutation state
//!
//! A cursor's mode (forward-only, scroll-insensitive, scroll-sensitive) and
//! concurrency (read-only, updatable) are fixed at creation. Position is one
//! of before-first, on-row (1-based), or after-last; an empty result set is a
//! degenerate state where both boundary flags read false.
//!
//! Scroll-insensitive cursors hold a full client-side snapshot and navigate
//! by index arithmetic. Scroll-sensitive cursors use the same position
//! bookkeeping over the row count captured at open; the session re-fetches
//! the target row after each move. Forward-only cursors hold a sliding
//! window of at most `fetch_size` rows; the session refills it from the live
//! server cursor. Navigation past a boundary clamps and returns `false`;
//! the error channel is reserved for operations illegal in the cursor's mode.
//!
//! The cursor itself is passive: it never touches the transport. The session
//! drives fetches, refreshes, and staged mutations through it.

use tracing::trace;

use crate::error::{Error, Result};
use crate::row::{Row, Value};
use crate::statement::ColumnInfo;

/// Staging-row slots with no staged value read as NULL
static NULL_CELL: Value = Value::Null;

/// Navigation family, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorMode {
    /// Only `next()` is legal; rows stream through a fetch window
    ForwardOnly,
    /// Full client-side snapshot; immune to concurrent server-side writes
    ScrollInsensitive,
    /// Position bookkeeping over the open-time count; each navigation
    /// re-fetches the target row's current values
    ScrollSensitive,
}

impl CursorMode {
    /// Name used in navigation errors
    pub fn name(self) -> &'static str {
        match self {
            CursorMode::ForwardOnly => "forward-only",
            CursorMode::ScrollInsensitive => "scroll-insensitive",
            CursorMode::ScrollSensitive => "scroll-sensitive",
        }
    }

    /// Whether random-access navigation is legal
    pub fn is_scrollable(self) -> bool {
        !matches!(self, CursorMode::ForwardOnly)
    }
}

/// Mutation family, fixed at creation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Concurrency {
    /// Cell reads only
    ReadOnly,
    /// Staged row mutations against the base table's key
    Updatable,
}

/// Cursor position
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    /// Before the first row
    BeforeFirst,
    /// On row `i`, 1-based
    OnRow(usize),
    /// After the last row
    AfterLast,
}

/// The base table and key a mutable cursor writes through
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateTarget {
    /// The single base table the query resolves to
    pub table: String,
    /// Usable key columns of that table
    pub key_columns: Vec<String>,
}

/// What a forward-only `next()` found in the window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowStep {
    /// Advanced onto a buffered row
    Row,
    /// The window is drained and the server cursor is not exhausted
    NeedFetch,
    /// No more rows; position moved to after-last
    End,
}

#[derive(Debug)]
enum RowBuffer {
    /// Full client-side materialization (insensitive and sensitive modes)
    Snapshot(Vec<Row>),
    /// Sliding window over a live server cursor
    Window {
        rows: Vec<Row>,
        /// Absolute 1-based index of `rows[0]`
        start: usize,
        /// The server reported no rows remain past this window
        exhausted: bool,
    },
}

/// A result cursor
#[derive(Debug)]
pub struct Cursor {
    id: u64,
    statement_handle: u32,
    mode: CursorMode,
    concurrency: Concurrency,
    fetch_size: u32,
    columns: Vec<ColumnInfo>,
    position: Position,
    buffer: RowBuffer,
    /// Known row count: snapshot length, or the final count once a forward
    /// cursor exhausts
    row_count: Option<usize>,
    /// Prepared statement id when a live server cursor backs this cursor
    server_statement_id: Option<u32>,
    open: bool,
    /// Updatable mode silently degraded at open because the statement does
    /// not resolve to one table with a usable key
    degraded: bool,
    update_target: Option<UpdateTarget>,
    /// Staged column mutations; `None` entries are untouched columns
    staging: Vec<Option<Value>>,
    on_insert_row: bool,
    current_deleted: bool,
}

impl Cursor {
    /// Create a snapshot-backed cursor (insensitive or sensitive modes)
    #[allow(clippy::too_many_arguments)]
    pub fn new_snapshot(
        id: u64,
        statement_handle: u32,
        mode: CursorMode,
        concurrency: Concurrency,
        fetch_size: u32,
        columns: Vec<ColumnInfo>,
        rows: Vec<Row>,
        server_statement_id: Option<u32>,
        update_target: Option<UpdateTarget>,
    ) -> Self {
        let count = rows.len();
        let degraded = concurrency == Concurrency::Updatable && update_target.is_none();
        let concurrency = if degraded {
            Concurrency::ReadOnly
        } else {
            concurrency
        };
        trace!(id, mode = mode.name(), rows = count, degraded, "opened snapshot cursor");
        Self {
            id,
            statement_handle,
            mode,
            concurrency,
            fetch_size,
            staging: vec![None; columns.len()],
            columns,
            position: Position::BeforeFirst,
            buffer: RowBuffer::Snapshot(rows),
            row_count: Some(count),
            server_statement_id,
            open: true,
            degraded,
            update_target,
            on_insert_row: false,
            current_deleted: false,
        }
    }

    /// Create a forward-only cursor over a live server cursor
    pub fn new_forward(
        id: u64,
        statement_handle: u32,
        fetch_size: u32,
        columns: Vec<ColumnInfo>,
        initial_rows: Vec<Row>,
        exhausted: bool,
        server_statement_id: Option<u32>,
    ) -> Self {
        let row_count = if exhausted {
            Some(initial_rows.len())
        } else {
            None
        };
        trace!(id, window = initial_rows.len(), exhausted, "opened forward cursor");
        Self {
            id,
            statement_handle,
            mode: CursorMode::ForwardOnly,
            concurrency: Concurrency::ReadOnly,
            fetch_size,
            staging: vec![None; columns.len()],
            columns,
            position: Position::BeforeFirst,
            buffer: RowBuffer::Window {
                rows: initial_rows,
                start: 1,
                exhausted,
            },
            row_count,
            server_statement_id,
            open: true,
            degraded: false,
            update_target: None,
            on_insert_row: false,
            current_deleted: false,
        }
    }

    // =========================================================================
    // Accessors
    // =========================================================================

    /// Cursor id, unique within the session
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Handle of the statement that produced this cursor
    pub fn statement_handle(&self) -> u32 {
        self.statement_handle
    }

    /// Navigation mode
    pub fn mode(&self) -> CursorMode {
        self.mode
    }

    /// Effective concurrency (after any silent degrade at open)
    pub fn concurrency(&self) -> Concurrency {
        self.concurrency
    }

    /// Whether updatable mode was silently degraded to read-only at open
    pub fn degraded_to_read_only(&self) -> bool {
        self.degraded
    }

    /// Rows pulled per fetch round trip
    pub fn fetch_size(&self) -> u32 {
        self.fetch_size
    }

    /// Column metadata
    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    /// The base table and key for staged mutations, when resolvable
    pub fn update_target(&self) -> Option<&UpdateTarget> {
        self.update_target.as_ref()
    }

    /// Prepared statement id of the live server cursor, if one is open
    pub fn server_statement_id(&self) -> Option<u32> {
        self.server_statement_id
    }

    /// Whether the cursor is open
    pub fn is_open(&self) -> bool {
        self.open
    }

    /// Mark the cursor closed (server resources released by the session)
    pub fn mark_closed(&mut self) {
        self.open = false;
    }

    /// Current position
    pub fn position(&self) -> Position {
        self.position
    }

    /// Known row count: snapshot length, or the total once a forward cursor
    /// exhausts
    pub fn row_count(&self) -> Option<usize> {
        self.row_count
    }

    fn known_empty(&self) -> bool {
        self.row_count == Some(0)
    }

    /// Whether the cursor sits before the first row
    ///
    /// On an empty result set this is false: the set has no first row to be
    /// before.
    pub fn is_before_first(&self) -> bool {
        !self.known_empty() && self.position == Position::BeforeFirst
    }

    /// Whether the cursor sits after the last row
    ///
    /// False on an empty result set, matching [`Cursor::is_before_first`].
    pub fn is_after_last(&self) -> bool {
        !self.known_empty() && self.position == Position::AfterLast
    }

    /// Whether the staging row is active
    pub fn on_insert_row(&self) -> bool {
        self.on_insert_row
    }

    /// Whether the current row was deleted through this cursor
    ///
    /// Cell reads keep returning the last-known values until the position
    /// moves away.
    pub fn current_row_deleted(&self) -> bool {
        self.current_deleted
    }

    // =========================================================================
    // Row access
    // =========================================================================

    /// The row under the cursor, if positioned on one
    pub fn current_row(&self) -> Option<&Row> {
        let index = match self.position {
            Position::OnRow(i) => i,
            _ => return None,
        };
        match &self.buffer {
            RowBuffer::Snapshot(rows) => rows.get(index - 1),
            RowBuffer::Window { rows, start, .. } => rows.get(index.checked_sub(*start)?),
        }
    }

    /// Read a cell of the current row, honoring the staging row
    pub fn cell(&self, column: usize) -> Result<&Value> {
        if self.on_insert_row {
            return match self.staging.get(column) {
                Some(Some(value)) => Ok(value),
                Some(None) => Ok(&NULL_CELL),
                None => Err(Error::Internal(format!("column {} out of range", column))),
            };
        }
        let row = self.current_row().ok_or(Error::NoCurrentRow)?;
        row.get(column)
            .ok_or_else(|| Error::Internal(format!("column {} out of range", column)))
    }

    /// Overwrite the current row's values (sensitive re-fetch, refresh)
    pub fn replace_current_row(&mut self, row: Row) -> Result<()> {
        let index = match self.position {
            Position::OnRow(i) => i,
            _ => return Err(Error::NoCurrentRow),
        };
        match &mut self.buffer {
            RowBuffer::Snapshot(rows) => {
                rows[index - 1] = row;
                Ok(())
            }
            RowBuffer::Window { rows, start, .. } => {
                rows[index - *start] = row;
                Ok(())
            }
        }
    }

    // =========================================================================
    // Scrollable navigation (index arithmetic over the open-time count)
    // =========================================================================

    fn require_scrollable(&self, operation: &'static str) -> Result<()> {
        if !self.mode.is_scrollable() {
            return Err(Error::UnsupportedNavigation {
                operation,
                mode: self.mode.name(),
            });
        }
        Ok(())
    }

    fn snapshot_len(&self) -> usize {
        self.row_count.unwrap_or(0)
    }

    /// Index view of the position: 0 is before-first, N+1 is after-last
    fn nav_index(&self) -> usize {
        match self.position {
            Position::BeforeFirst => 0,
            Position::OnRow(i) => i,
            Position::AfterLast => self.snapshot_len() + 1,
        }
    }

    fn leave_row(&mut self) {
        self.current_deleted = false;
        self.on_insert_row = false;
        self.staging.iter_mut().for_each(|slot| *slot = None);
    }

    fn settle(&mut self, target: i64) -> bool {
        let n = self.snapshot_len() as i64;
        if target <= 0 {
            self.position = Position::BeforeFirst;
            false
        } else if target > n {
            self.position = Position::AfterLast;
            false
        } else {
            self.position = Position::OnRow(target as usize);
            true
        }
    }

    /// Move to absolute row `k`
    ///
    /// `k > 0` counts from the front, `k < 0` from the end (`-1` is the last
    /// row), `k = 0` is before-first. Out-of-range targets clamp to a
    /// boundary and return false. On an empty set every call returns false.
    pub fn absolute(&mut self, k: i64) -> Result<bool> {
        self.require_scrollable("absolute")?;
        self.leave_row();
        let n = self.snapshot_len() as i64;
        if n == 0 {
            return Ok(false);
        }
        let target = if k < 0 { n + k + 1 } else { k };
        Ok(self.settle(target))
    }

    /// Move `n` rows from the current position, with absolute clamping
    pub fn relative(&mut self, n: i64) -> Result<bool> {
        self.require_scrollable("relative")?;
        self.leave_row();
        if self.snapshot_len() == 0 {
            return Ok(false);
        }
        let target = self.nav_index() as i64 + n;
        Ok(self.settle(target))
    }

    /// Move to the first row
    pub fn first(&mut self) -> Result<bool> {
        self.require_scrollable("first")?;
        self.absolute(1)
    }

    /// Move to the last row
    pub fn last(&mut self) -> Result<bool> {
        self.require_scrollable("last")?;
        self.absolute(-1)
    }

    /// Move to the previous row
    pub fn previous(&mut self) -> Result<bool> {
        self.require_scrollable("previous")?;
        self.relative(-1)
    }

    /// Move before the first row
    pub fn before_first(&mut self) -> Result<()> {
        self.require_scrollable("beforeFirst")?;
        self.leave_row();
        self.position = Position::BeforeFirst;
        Ok(())
    }

    /// Move after the last row
    pub fn after_last(&mut self) -> Result<()> {
        self.require_scrollable("afterLast")?;
        self.leave_row();
        self.position = Position::AfterLast;
        Ok(())
    }

    /// Scrollable `next()`: one row forward with clamping
    pub fn scroll_next(&mut self) -> Result<bool> {
        self.require_scrollable("next")?;
        self.relative(1)
    }

    // =========================================================================
    // Forward-only window stepping
    // =========================================================================

    /// Step a forward-only cursor onto the next row
    ///
    /// Returns [`WindowStep::NeedFetch`] when the window is drained and the
    /// session must pull the next window before calling again.
    pub fn forward_next(&mut self) -> WindowStep {
        self.leave_row();
        let next = self.nav_index_forward() + 1;
        let (have, exhausted, seen) = match &self.buffer {
            RowBuffer::Window {
                rows,
                start,
                exhausted,
            } => (
                next >= *start && next < *start + rows.len(),
                *exhausted,
                *start + rows.len() - 1,
            ),
            RowBuffer::Snapshot(_) => return WindowStep::End,
        };
        if have {
            self.position = Position::OnRow(next);
            WindowStep::Row
        } else if exhausted {
            self.row_count = Some(seen);
            self.position = Position::AfterLast;
            WindowStep::End
        } else {
            WindowStep::NeedFetch
        }
    }

    fn nav_index_forward(&self) -> usize {
        match self.position {
            Position::BeforeFirst => 0,
            Position::OnRow(i) => i,
            Position::AfterLast => self.row_count.unwrap_or(0),
        }
    }

    /// Replace the drained window with a freshly fetched one
    pub fn refill_window(&mut self, fetched: Vec<Row>, exhausted: bool) -> Result<()> {
        let next = self.nav_index_forward() + 1;
        match &mut self.buffer {
            RowBuffer::Window {
                rows,
                start,
                exhausted: done,
            } => {
                *start = next;
                *rows = fetched;
                *done = exhausted;
                Ok(())
            }
            RowBuffer::Snapshot(_) => Err(Error::Internal(
                "refill_window on a snapshot cursor".to_string(),
            )),
        }
    }

    // =========================================================================
    // Updatable staging
    // =========================================================================

    fn require_updatable(&self, operation: &'static str) -> Result<()> {
        if self.concurrency != Concurrency::Updatable {
            return Err(Error::NotSupported(format!(
                "{} requires an updatable cursor",
                operation
            )));
        }
        Ok(())
    }

    /// Open the staging row, decoupled from the current position
    pub fn move_to_insert_row(&mut self) -> Result<()> {
        self.require_updatable("moveToInsertRow")?;
        self.on_insert_row = true;
        self.staging.iter_mut().for_each(|slot| *slot = None);
        Ok(())
    }

    /// Leave the staging row, discarding staged values
    pub fn move_to_current_row(&mut self) -> Result<()> {
        self.require_updatable("moveToCurrentRow")?;
        self.on_insert_row = false;
        self.staging.iter_mut().for_each(|slot| *slot = None);
        Ok(())
    }

    /// Stage a column mutation (against the staging row or the current row)
    pub fn stage_update(&mut self, column: usize, value: Value) -> Result<()> {
        self.require_updatable("update")?;
        if column >= self.columns.len() {
            return Err(Error::Internal(format!("column {} out of range", column)));
        }
        if !self.on_insert_row && self.current_row().is_none() {
            return Err(Error::NoCurrentRow);
        }
        self.staging[column] = Some(value);
        Ok(())
    }

    /// The staged mutations, by column index
    pub fn staged(&self) -> &[Option<Value>] {
        &self.staging
    }

    /// Whether any column has a staged mutation
    pub fn has_staged(&self) -> bool {
        self.staging.iter().any(Option::is_some)
    }

    /// Drop staged mutations without leaving the staging row
    pub fn clear_staging(&mut self) {
        self.staging.iter_mut().for_each(|slot| *slot = None);
    }

    /// Fold staged values into the current row after a committed update
    pub fn apply_staged_to_current(&mut self) -> Result<()> {
        let staged: Vec<(usize, Value)> = self
            .staging
            .iter()
            .enumerate()
            .filter_map(|(idx, slot)| slot.clone().map(|v| (idx, v)))
            .collect();
        let index = match self.position {
            Position::OnRow(i) => i,
            _ => return Err(Error::NoCurrentRow),
        };
        if let RowBuffer::Snapshot(rows) = &mut self.buffer {
            if let Some(row) = rows.get_mut(index - 1) {
                for (idx, value) in staged {
                    row.set(idx, value);
                }
            }
        }
        self.clear_staging();
        Ok(())
    }

    /// Record that the current row was deleted through this cursor
    ///
    /// Position is unchanged; reads keep serving the pre-delete values until
    /// the position moves away.
    pub fn mark_current_deleted(&mut self) -> Result<()> {
        if self.current_row().is_none() {
            return Err(Error::NoCurrentRow);
        }
        self.current_deleted = true;
        Ok(())
    }
}
