//! The session facade
//!
//! A [`Session`] owns the transport, the dialect rules, the statement
//! registry, and the open cursors, and drives every wire round trip: prepare,
//! bind, batch dispatch, query execution, cursor navigation and mutation, and
//! LOB piece operations.
//!
//! The engine is synchronous: one logical session, one in-flight request.
//! Server-side cursors are a scarce per-session resource: opening a cursor
//! while a previous forward-only cursor is unexhausted invalidates that
//! cursor, and re-executing a statement invalidates its previous cursor. A
//! transport-level cancel or timeout poisons the session; every subsequent
//! call fails with [`Error::SessionMustReset`] until
//! [`Session::reset_after_failure`].

use std::collections::HashMap;

use bytes::Bytes;
use tracing::{debug, trace, warn};

use crate::binder::{row_values, split_streamed, BindContext, ParamBinder};
use crate::buffer::WriteBuffer;
use crate::capabilities::SessionCapabilities;
use crate::coerce::{coerce, SqlType};
use crate::constants::{Command, FetchOrientation};
use crate::cursor::{Concurrency, Cursor, CursorMode, Position, UpdateTarget, WindowStep};
use crate::dialect::DialectRules;
use crate::dispatch::{
    batch_abort, build_multi_statement_chunks, build_rewrite_chunks, select_strategy,
    BatchChunk, BatchOptions, BatchStrategy, RowOutcome, ServerFailure,
};
use crate::error::{Error, Result};
use crate::protocol::command::{parse_err_packet, render_literal};
use crate::protocol::{
    frame::{read_reply_packets, write_command_frame},
    BulkExecuteMessage, ExecOutcome, ExecuteMessage, ExecuteOptions, FetchMessage, FetchReply,
    LobOpAck, LobOpMessage, LobPieceData, LongDataMessage, PrepareMessage, PrepareResponse,
    QueryMessage, ResultSet, StmtCloseMessage,
};
use crate::protocol::resultset::RowCodecOptions;
use crate::row::{Row, Value};
use crate::statement::{Statement, StatementClassifier};
use crate::transport::{RowLockContext, SessionTransport};
use crate::types::{DecodePolicy, LobContent, LobHandle, LobKind, LobOrigin};

/// Default rows pulled per cursor fetch round trip
pub const DEFAULT_FETCH_SIZE: u32 = 100;

/// Options for opening a cursor over a query
#[derive(Debug, Clone, Copy)]
pub struct QueryOptions {
    /// Navigation mode
    pub mode: CursorMode,
    /// Mutation family
    pub concurrency: Concurrency,
    /// Rows per fetch window
    pub fetch_size: u32,
}

impl QueryOptions {
    /// Forward-only, read-only, default fetch size
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the navigation mode
    pub fn with_mode(mut self, mode: CursorMode) -> Self {
        self.mode = mode;
        self
    }

    /// Request an updatable cursor
    pub fn updatable(mut self) -> Self {
        self.concurrency = Concurrency::Updatable;
        self
    }

    /// Set the fetch window size
    pub fn with_fetch_size(mut self, fetch_size: u32) -> Self {
        self.fetch_size = fetch_size.max(1);
        self
    }
}

impl Default for QueryOptions {
    fn default() -> Self {
        Self {
            mode: CursorMode::ForwardOnly,
            concurrency: Concurrency::ReadOnly,
            fetch_size: DEFAULT_FETCH_SIZE,
        }
    }
}

/// A prepared statement plus its binder and live cursor
#[derive(Debug)]
struct StatementEntry {
    statement: Statement,
    binder: ParamBinder,
    /// Cursor produced by the last execution, invalidated on re-execution
    cursor: Option<u64>,
}

/// A live database session: the engine's public surface
pub struct Session<T: SessionTransport> {
    transport: T,
    classifier: Box<dyn StatementClassifier>,
    locks: Box<dyn RowLockContext>,
    dialect: Box<dyn DialectRules>,
    caps: SessionCapabilities,
    statements: HashMap<u32, StatementEntry>,
    next_handle: u32,
    cursors: HashMap<u64, Cursor>,
    next_cursor_id: u64,
    /// Forward-only cursor with a live, unexhausted server cursor
    active_forward_cursor: Option<u64>,
    must_reset: bool,
    decode_policy: DecodePolicy,
}

impl<T: SessionTransport> Session<T> {
    /// Create a session over a live, authenticated transport
    pub fn new(
        transport: T,
        classifier: Box<dyn StatementClassifier>,
        locks: Box<dyn RowLockContext>,
        dialect: Box<dyn DialectRules>,
    ) -> Self {
        let mut caps = SessionCapabilities::client_default();
        caps.adjust_for_server(transport.negotiated_capabilities());
        debug!(dialect = dialect.name(), flags = caps.flags, "session opened");
        Self {
            transport,
            classifier,
            locks,
            dialect,
            caps,
            statements: HashMap::new(),
            next_handle: 1,
            cursors: HashMap::new(),
            next_cursor_id: 1,
            active_forward_cursor: None,
            must_reset: false,
            decode_policy: DecodePolicy::default(),
        }
    }

    /// The capabilities this session negotiated
    pub fn capabilities(&self) -> &SessionCapabilities {
        &self.caps
    }

    /// Whether a transport fault left the session unusable
    pub fn must_reset(&self) -> bool {
        self.must_reset
    }

    /// Clear the poisoned state after the owning pool reset the transport
    ///
    /// All cursors are invalidated and pending parameter rows dropped; the
    /// server-side state they referenced is gone with the old connection.
    pub fn reset_after_failure(&mut self) {
        self.must_reset = false;
        for cursor in self.cursors.values_mut() {
            cursor.mark_closed();
        }
        self.cursors.clear();
        self.active_forward_cursor = None;
        for entry in self.statements.values_mut() {
            entry.binder.reset();
            entry.cursor = None;
            entry.statement.clear();
        }
        debug!("session reset after failure");
    }

    fn guard(&self) -> Result<()> {
        if self.must_reset {
            Err(Error::SessionMustReset)
        } else {
            Ok(())
        }
    }

    /// One blocking round trip, poisoning the session on transport faults
    fn send(&mut self, frame: Bytes) -> Result<Vec<Bytes>> {
        match self.transport.send(frame) {
            Ok(reply) => read_reply_packets(reply),
            Err(err) => {
                if err.poisons_session() {
                    warn!(error = %err, "transport fault; session poisoned");
                    self.must_reset = true;
                }
                Err(err)
            }
        }
    }

    fn row_codec(&self, binary: bool) -> RowCodecOptions {
        RowCodecOptions {
            binary,
            lob_locators: self.caps.supports_lob_locators,
            policy: self.decode_policy,
        }
    }

    fn entry(&self, handle: u32) -> Result<&StatementEntry> {
        self.statements
            .get(&handle)
            .ok_or(Error::UnknownStatement(handle))
    }

    fn entry_mut(&mut self, handle: u32) -> Result<&mut StatementEntry> {
        self.statements
            .get_mut(&handle)
            .ok_or(Error::UnknownStatement(handle))
    }

    // =========================================================================
    // Prepare & bind
    // =========================================================================

    /// Prepare SQL for execution, returning a statement handle
    ///
    /// Preparing identical SQL again returns the existing handle (and its
    /// server-side prepared id). Statements the prepared sub-protocol cannot
    /// express fall back to the text protocol; the fallback is observable via
    /// [`Session::statement_uses_text_protocol`], not an error.
    pub fn prepare(&mut self, sql: &str) -> Result<u32> {
        self.guard()?;
        if let Some((&handle, _)) = self
            .statements
            .iter()
            .find(|(_, entry)| entry.statement.sql() == sql)
        {
            trace!(handle, "reusing prepared statement");
            return Ok(handle);
        }

        let info = self.classifier.classify(sql);
        let placeholder_count = info.placeholder_count;
        let mut statement = Statement::new(sql, info);

        if self.caps.binary_protocol && statement.info().preparable {
            let request = PrepareMessage::new(sql).build_request()?;
            let packets = self.send(request)?;
            let response = PrepareResponse::parse(&packets)?;
            statement.set_prepared_id(response.statement_id);
            statement.set_columns(response.columns);
        } else {
            statement.set_text_fallback(true);
        }

        let handle = self.next_handle;
        self.next_handle += 1;
        self.statements.insert(
            handle,
            StatementEntry {
                statement,
                binder: ParamBinder::new(placeholder_count),
                cursor: None,
            },
        );
        debug!(handle, "prepared statement");
        Ok(handle)
    }

    /// The statement's template text
    pub fn statement_sql(&self, handle: u32) -> Result<&str> {
        Ok(self.entry(handle)?.statement.sql())
    }

    /// Whether the statement executes over the text protocol
    pub fn statement_uses_text_protocol(&self, handle: u32) -> Result<bool> {
        Ok(self.entry(handle)?.statement.uses_text_protocol())
    }

    fn bind_context(&self, handle: u32) -> Result<BindContext> {
        let text_protocol = self.entry(handle)?.statement.uses_text_protocol();
        Ok(BindContext {
            text_protocol,
            max_frame_size: self.transport.max_frame_size(),
        })
    }

    /// Bind a value to placeholder `ordinal` (1-based) of the current row
    pub fn bind(&mut self, handle: u32, ordinal: usize, value: Value, declared: SqlType) -> Result<()> {
        self.guard()?;
        let ctx = self.bind_context(handle)?;
        self.entry_mut(handle)?.binder.bind(ordinal, value, declared, &ctx)
    }

    /// Bind a length-bounded stream; the content is always sent piecewise
    pub fn bind_streamed(
        &mut self,
        handle: u32,
        ordinal: usize,
        content: Bytes,
        declared: SqlType,
    ) -> Result<()> {
        self.guard()?;
        self.entry_mut(handle)?
            .binder
            .bind_streamed(ordinal, content, declared)
    }

    /// Freeze the current parameter row into the pending batch
    pub fn add_row(&mut self, handle: u32) -> Result<()> {
        self.guard()?;
        self.entry_mut(handle)?.binder.add_row()
    }

    /// Drop all pending rows and current bindings
    pub fn reset_binds(&mut self, handle: u32) -> Result<()> {
        self.guard()?;
        self.entry_mut(handle)?.binder.reset();
        Ok(())
    }

    // =========================================================================
    // Batch dispatch
    // =========================================================================

    /// Execute the pending batch rows, one outcome per processed row
    ///
    /// Without `continue_on_error` the first failure aborts the batch: the
    /// call fails with [`Error::Batch`] whose payload holds the outcomes of
    /// exactly the rows processed before the failing row. With it, failures
    /// are recorded as [`RowOutcome::Failed`] and dispatch continues, so the
    /// outcome sequence length always equals the submitted row count.
    pub fn execute_batch(&mut self, handle: u32, options: BatchOptions) -> Result<Vec<RowOutcome>> {
        self.guard()?;
        self.invalidate_statement_cursor(handle)?;

        let entry = self.entry_mut(handle)?;
        let bound_rows = entry.binder.take_rows();
        if bound_rows.is_empty() {
            return Ok(Vec::new());
        }
        let rows: Vec<Vec<Value>> = bound_rows.iter().map(|r| row_values(r)).collect();
        let sql = entry.statement.sql().to_string();
        let prepared_id = entry.statement.prepared_id();
        let text_protocol = entry.statement.uses_text_protocol();

        let strategy = select_strategy(
            &self.entry(handle)?.statement,
            &rows,
            &self.caps,
            &options,
            self.dialect.as_ref(),
        );
        match strategy {
            BatchStrategy::Bulk => self.run_bulk(prepared_id, &rows, &options),
            BatchStrategy::Rewrite => self.run_rewrite(&sql, &rows, &options),
            BatchStrategy::MultiStatement => self.run_multi_statement(&sql, &rows, &options),
            BatchStrategy::OneByOne => {
                self.run_one_by_one(&sql, prepared_id, text_protocol, &rows, 0, &options)
            }
        }
    }

    fn run_bulk(
        &mut self,
        prepared_id: u32,
        rows: &[Vec<Value>],
        options: &BatchOptions,
    ) -> Result<Vec<RowOutcome>> {
        let request =
            BulkExecuteMessage::new(prepared_id, rows).build_request(self.dialect.as_ref())?;
        let packets = self.send(request)?;

        // unit results: one OK/ERR per submitted row, in order
        let mut outcomes = Vec::with_capacity(rows.len());
        for payload in packets {
            if payload.first() == Some(&crate::constants::packet_header::EOF) && payload.len() < 9 {
                continue;
            }
            match parse_reply_outcome(payload) {
                Ok(ok) => outcomes.push(RowOutcome::RowsAffected(ok.rows_affected)),
                Err(err) => {
                    if options.continue_on_error {
                        outcomes.push(RowOutcome::Failed(ServerFailure::from_error(&err)));
                    } else {
                        let row_index = outcomes.len();
                        return Err(batch_abort(outcomes, row_index, err));
                    }
                }
            }
        }
        Ok(outcomes)
    }

    fn run_rewrite(
        &mut self,
        template: &str,
        rows: &[Vec<Value>],
        options: &BatchOptions,
    ) -> Result<Vec<RowOutcome>> {
        let chunks = build_rewrite_chunks(
            template,
            rows,
            self.dialect.as_ref(),
            self.transport.max_frame_size(),
        )?;
        let mut outcomes = Vec::with_capacity(rows.len());
        for chunk in chunks {
            let request = QueryMessage::new(chunk.sql.clone()).build_request()?;
            match self.exec_outcome(request) {
                Ok(_) => {
                    // one combined server count for the folded chunk; rows in
                    // a successful chunk report success with count unknown
                    for _ in 0..chunk.row_count {
                        outcomes.push(RowOutcome::SuccessUnknownCount);
                    }
                }
                Err(err) if err.poisons_session() => return Err(err),
                Err(err) => {
                    if !options.continue_on_error {
                        return Err(batch_abort(outcomes, chunk.first_row, err));
                    }
                    // replay the failing chunk one row at a time to attribute
                    // the error; confirmed rows keep the unknown-count report
                    self.replay_chunk(template, rows, &chunk, &mut outcomes)?;
                }
            }
        }
        Ok(outcomes)
    }

    fn replay_chunk(
        &mut self,
        template: &str,
        rows: &[Vec<Value>],
        chunk: &BatchChunk,
        outcomes: &mut Vec<RowOutcome>,
    ) -> Result<()> {
        for row in rows.iter().skip(chunk.first_row).take(chunk.row_count) {
            let message =
                QueryMessage::with_inlined_params(template, row, self.dialect.as_ref())?;
            match self.exec_outcome(message.build_request()?) {
                Ok(_) => outcomes.push(RowOutcome::SuccessUnknownCount),
                Err(err) if err.poisons_session() => return Err(err),
                Err(err) => outcomes.push(RowOutcome::Failed(ServerFailure::from_error(&err))),
            }
        }
        Ok(())
    }

    fn run_multi_statement(
        &mut self,
        template: &str,
        rows: &[Vec<Value>],
        options: &BatchOptions,
    ) -> Result<Vec<RowOutcome>> {
        let chunks = build_multi_statement_chunks(
            template,
            rows,
            self.dialect.as_ref(),
            self.transport.max_frame_size(),
        )?;
        let mut outcomes = Vec::with_capacity(rows.len());
        for chunk in chunks {
            let request = QueryMessage::new(chunk.sql.clone()).build_request()?;
            let packets = self.send(request)?;

            let mut replies = 0usize;
            let mut failed = false;
            for payload in packets {
                match parse_reply_outcome(payload) {
                    Ok(ok) => {
                        outcomes.push(RowOutcome::RowsAffected(ok.rows_affected));
                        replies += 1;
                    }
                    Err(err) => {
                        if !options.continue_on_error {
                            let row_index = chunk.first_row + replies;
                            return Err(batch_abort(outcomes, row_index, err));
                        }
                        outcomes.push(RowOutcome::Failed(ServerFailure::from_error(&err)));
                        replies += 1;
                        failed = true;
                        break;
                    }
                }
            }
            // the server stops a multi-statement frame at the first error;
            // remaining member rows resubmit individually
            if failed && replies < chunk.row_count {
                let rest = self.run_one_by_one(
                    template,
                    0,
                    true,
                    &rows[chunk.first_row + replies..chunk.first_row + chunk.row_count],
                    chunk.first_row + replies,
                    options,
                )?;
                outcomes.extend(rest);
            }
        }
        Ok(outcomes)
    }

    fn run_one_by_one(
        &mut self,
        template: &str,
        prepared_id: u32,
        text_protocol: bool,
        rows: &[Vec<Value>],
        base_index: usize,
        options: &BatchOptions,
    ) -> Result<Vec<RowOutcome>> {
        let mut outcomes = Vec::with_capacity(rows.len());
        for (offset, row) in rows.iter().enumerate() {
            let request = if text_protocol || prepared_id == 0 {
                QueryMessage::with_inlined_params(template, row, self.dialect.as_ref())?
                    .build_request()?
            } else {
                ExecuteMessage::new(prepared_id, row, ExecuteOptions::for_snapshot())
                    .build_request(self.dialect.as_ref())?
            };
            match self.exec_outcome(request) {
                Ok(ok) => outcomes.push(RowOutcome::RowsAffected(ok.rows_affected)),
                Err(err) if err.poisons_session() => return Err(err),
                Err(err) => {
                    if !options.continue_on_error {
                        return Err(batch_abort(outcomes, base_index + offset, err));
                    }
                    outcomes.push(RowOutcome::Failed(ServerFailure::from_error(&err)));
                }
            }
        }
        Ok(outcomes)
    }

    /// Send a command and parse the single OK/ERR reply
    fn exec_outcome(&mut self, request: Bytes) -> Result<ExecOutcome> {
        let packets = self.send(request)?;
        let payload = packets
            .first()
            .ok_or_else(|| Error::Protocol("empty command reply".to_string()))?;
        parse_reply_outcome(payload.clone())
    }

    // =========================================================================
    // Query execution & cursors
    // =========================================================================

    /// Execute a query, opening a cursor
    ///
    /// Opening a cursor invalidates the statement's previous cursor, and any
    /// unexhausted forward-only cursor on this session. A scroll-sensitive
    /// request degrades to scroll-insensitive when the server lacks
    /// scroll-orientation fetch; an updatable request degrades to read-only
    /// when the statement does not resolve to one table with a usable key.
    pub fn execute_query(&mut self, handle: u32, options: QueryOptions) -> Result<u64> {
        self.guard()?;
        self.invalidate_statement_cursor(handle)?;
        self.invalidate_active_forward_cursor()?;

        let bound = self.entry_mut(handle)?.binder.take_current()?;
        let (values, streamed) = split_streamed(&bound)?;

        let entry = self.entry(handle)?;
        let sql = entry.statement.sql().to_string();
        let prepared_id = entry.statement.prepared_id();
        let text_protocol = entry.statement.uses_text_protocol();

        let mode = if options.mode == CursorMode::ScrollSensitive
            && (text_protocol || !self.caps.supports_scrollable_cursors)
        {
            debug!("scroll-sensitive degraded to scroll-insensitive");
            CursorMode::ScrollInsensitive
        } else {
            options.mode
        };

        let cursor_id = if text_protocol {
            self.open_text_cursor(handle, &sql, &values, mode, options)?
        } else {
            self.send_long_data(prepared_id, &streamed)?;
            self.open_binary_cursor(handle, prepared_id, &values, mode, options)?
        };

        self.entry_mut(handle)?.cursor = Some(cursor_id);
        debug!(handle, cursor_id, mode = mode.name(), "cursor opened");
        Ok(cursor_id)
    }

    fn send_long_data(&mut self, prepared_id: u32, streamed: &[(u16, Bytes)]) -> Result<()> {
        let piece_size = self.transport.max_frame_size().saturating_sub(16).max(1);
        for (ordinal, content) in streamed {
            let mut offset = 0;
            while offset < content.len() || content.is_empty() {
                let end = (offset + piece_size).min(content.len());
                let request =
                    LongDataMessage::new(prepared_id, *ordinal, &content[offset..end])
                        .build_request()?;
                self.send(request)?;
                if end == content.len() {
                    break;
                }
                offset = end;
            }
            trace!(ordinal, bytes = content.len(), "streamed parameter");
        }
        Ok(())
    }

    fn open_text_cursor(
        &mut self,
        handle: u32,
        sql: &str,
        values: &[Value],
        mode: CursorMode,
        options: QueryOptions,
    ) -> Result<u64> {
        let message = if values.is_empty() {
            QueryMessage::new(sql)
        } else {
            QueryMessage::with_inlined_params(sql, values, self.dialect.as_ref())?
        };
        let packets = self.send(message.build_request()?)?;
        let mut pos = 0;
        let rs = ResultSet::parse_at(&packets, &mut pos, &self.row_codec(false))?;
        self.entry_mut(handle)?.statement.set_columns(rs.columns.clone());

        let id = self.allocate_cursor_id();
        let cursor = match mode {
            CursorMode::ForwardOnly => Cursor::new_forward(
                id,
                handle,
                options.fetch_size,
                rs.columns,
                rs.rows,
                true,
                None,
            ),
            _ => {
                let target = self.resolve_update_target(handle, &rs.columns)?;
                Cursor::new_snapshot(
                    id,
                    handle,
                    mode,
                    options.concurrency,
                    options.fetch_size,
                    rs.columns,
                    rs.rows,
                    None,
                    target,
                )
            }
        };
        self.cursors.insert(id, cursor);
        Ok(id)
    }

    fn open_binary_cursor(
        &mut self,
        handle: u32,
        prepared_id: u32,
        values: &[Value],
        mode: CursorMode,
        options: QueryOptions,
    ) -> Result<u64> {
        let exec_options = match (mode, options.concurrency) {
            (_, Concurrency::Updatable) => ExecuteOptions::for_updatable(),
            (CursorMode::ForwardOnly, _) => ExecuteOptions::for_cursor(),
            (CursorMode::ScrollInsensitive, _) => ExecuteOptions::for_snapshot(),
            (CursorMode::ScrollSensitive, _) => ExecuteOptions::for_scrollable(),
        };
        let request =
            ExecuteMessage::new(prepared_id, values, exec_options).build_request(self.dialect.as_ref())?;
        let packets = self.send(request)?;
        let mut pos = 0;
        let rs = ResultSet::parse_at(&packets, &mut pos, &self.row_codec(true))?;
        let cursor_open = rs.status & crate::constants::status::CURSOR_EXISTS != 0;
        self.entry_mut(handle)?.statement.set_columns(rs.columns.clone());

        let id = self.allocate_cursor_id();
        let cursor = match mode {
            CursorMode::ForwardOnly => {
                if cursor_open {
                    let cursor = Cursor::new_forward(
                        id,
                        handle,
                        options.fetch_size,
                        rs.columns,
                        rs.rows,
                        false,
                        Some(prepared_id),
                    );
                    self.active_forward_cursor = Some(id);
                    cursor
                } else {
                    Cursor::new_forward(
                        id,
                        handle,
                        options.fetch_size,
                        rs.columns,
                        rs.rows,
                        true,
                        None,
                    )
                }
            }
            CursorMode::ScrollInsensitive | CursorMode::ScrollSensitive => {
                let mut rows = rs.rows;
                if cursor_open {
                    rows.extend(self.drain_server_cursor(
                        prepared_id,
                        &rs.columns,
                        options.fetch_size,
                    )?);
                }
                let target = self.resolve_update_target(handle, &rs.columns)?;
                let server_id = if mode == CursorMode::ScrollSensitive && cursor_open {
                    Some(prepared_id)
                } else {
                    None
                };
                Cursor::new_snapshot(
                    id,
                    handle,
                    mode,
                    options.concurrency,
                    options.fetch_size,
                    rs.columns,
                    rows,
                    server_id,
                    target,
                )
            }
        };
        self.cursors.insert(id, cursor);
        Ok(id)
    }

    fn drain_server_cursor(
        &mut self,
        prepared_id: u32,
        columns: &[crate::statement::ColumnInfo],
        fetch_size: u32,
    ) -> Result<Vec<Row>> {
        let mut rows = Vec::new();
        loop {
            let request = FetchMessage::new(prepared_id, fetch_size).build_request()?;
            let packets = self.send(request)?;
            let reply = FetchReply::parse(&packets, columns, &self.row_codec(true))?;
            let done = reply.last_row_sent() || reply.rows.is_empty();
            rows.extend(reply.rows);
            if done {
                return Ok(rows);
            }
        }
    }

    fn resolve_update_target(
        &self,
        handle: u32,
        columns: &[crate::statement::ColumnInfo],
    ) -> Result<Option<UpdateTarget>> {
        let info = self.entry(handle)?.statement.info();
        let table = match &info.single_table {
            Some(table) if !info.key_columns.is_empty() => table.clone(),
            _ => return Ok(None),
        };
        let all_present = info.key_columns.iter().all(|key| {
            columns
                .iter()
                .any(|col| col.name.eq_ignore_ascii_case(key))
        });
        if !all_present {
            return Ok(None);
        }
        Ok(Some(UpdateTarget {
            table,
            key_columns: info.key_columns.clone(),
        }))
    }

    fn allocate_cursor_id(&mut self) -> u64 {
        let id = self.next_cursor_id;
        self.next_cursor_id += 1;
        id
    }

    fn invalidate_statement_cursor(&mut self, handle: u32) -> Result<()> {
        let previous = self.entry_mut(handle)?.cursor.take();
        if let Some(id) = previous {
            self.release_cursor(id)?;
        }
        Ok(())
    }

    fn invalidate_active_forward_cursor(&mut self) -> Result<()> {
        if let Some(id) = self.active_forward_cursor.take() {
            debug!(id, "implicitly invalidating unexhausted forward cursor");
            self.release_cursor(id)?;
        }
        Ok(())
    }

    /// Release a cursor's server resources and mark it closed
    fn release_cursor(&mut self, id: u64) -> Result<()> {
        if self.active_forward_cursor == Some(id) {
            self.active_forward_cursor = None;
        }
        let server_id = match self.cursors.get_mut(&id) {
            Some(cursor) if cursor.is_open() => {
                cursor.mark_closed();
                cursor.server_statement_id()
            }
            _ => None,
        };
        if let Some(stmt_id) = server_id {
            let mut buf = WriteBuffer::new();
            buf.write_u8(Command::StmtReset as u8)?;
            buf.write_u32_le(stmt_id)?;
            let request = write_command_frame(buf.as_slice())?;
            self.send(request)?;
        }
        Ok(())
    }

    /// Close a cursor, releasing any live server cursor it holds
    pub fn close_cursor(&mut self, id: u64) -> Result<()> {
        self.guard()?;
        self.release_cursor(id)?;
        if let Some(cursor) = self.cursors.remove(&id) {
            if let Some(entry) = self.statements.get_mut(&cursor.statement_handle()) {
                if entry.cursor == Some(id) {
                    entry.cursor = None;
                }
            }
        }
        Ok(())
    }

    /// Close a statement: its cursor, its server-side prepared id, everything
    pub fn close_statement(&mut self, handle: u32) -> Result<()> {
        self.guard()?;
        if let Some(id) = self.entry(handle)?.cursor {
            self.close_cursor(id)?;
        }
        let entry = self
            .statements
            .remove(&handle)
            .ok_or(Error::UnknownStatement(handle))?;
        if entry.statement.prepared_id() != 0 {
            let request = StmtCloseMessage::new(entry.statement.prepared_id()).build_request()?;
            self.send(request)?;
        }
        Ok(())
    }

    // =========================================================================
    // Cursor navigation
    // =========================================================================

    fn cursor(&self, id: u64) -> Result<&Cursor> {
        match self.cursors.get(&id) {
            Some(cursor) if cursor.is_open() => Ok(cursor),
            Some(_) => Err(Error::CursorClosed),
            None => Err(Error::CursorInvalidated),
        }
    }

    fn cursor_mut(&mut self, id: u64) -> Result<&mut Cursor> {
        match self.cursors.get_mut(&id) {
            Some(cursor) if cursor.is_open() => Ok(cursor),
            Some(_) => Err(Error::CursorClosed),
            None => Err(Error::CursorInvalidated),
        }
    }

    /// Advance to the next row
    pub fn cursor_next(&mut self, id: u64) -> Result<bool> {
        self.guard()?;
        let cursor = self.cursor_mut(id)?;
        if cursor.mode() != CursorMode::ForwardOnly {
            let moved = cursor.scroll_next()?;
            if moved {
                self.refetch_if_sensitive(id)?;
            }
            return Ok(moved);
        }
        loop {
            match self.cursor_mut(id)?.forward_next() {
                WindowStep::Row => return Ok(true),
                WindowStep::End => {
                    if self.active_forward_cursor == Some(id) {
                        self.active_forward_cursor = None;
                    }
                    return Ok(false);
                }
                WindowStep::NeedFetch => {
                    let (stmt_id, fetch_size, columns) = {
                        let cursor = self.cursor(id)?;
                        let stmt_id = cursor.server_statement_id().ok_or_else(|| {
                            Error::Internal("window drained with no server cursor".to_string())
                        })?;
                        (stmt_id, cursor.fetch_size(), cursor.columns().to_vec())
                    };
                    let request = FetchMessage::new(stmt_id, fetch_size).build_request()?;
                    let packets = self.send(request)?;
                    let reply = FetchReply::parse(&packets, &columns, &self.row_codec(true))?;
                    let exhausted = reply.last_row_sent() || reply.rows.is_empty();
                    self.cursor_mut(id)?.refill_window(reply.rows, exhausted)?;
                }
            }
        }
    }

    /// Move to the previous row
    pub fn cursor_previous(&mut self, id: u64) -> Result<bool> {
        self.guard()?;
        let moved = self.cursor_mut(id)?.previous()?;
        if moved {
            self.refetch_if_sensitive(id)?;
        }
        Ok(moved)
    }

    /// Move to the first row
    pub fn cursor_first(&mut self, id: u64) -> Result<bool> {
        self.cursor_absolute(id, 1)
    }

    /// Move to the last row
    pub fn cursor_last(&mut self, id: u64) -> Result<bool> {
        self.cursor_absolute(id, -1)
    }

    /// Move to absolute row `k` (`k < 0` counts from the end)
    pub fn cursor_absolute(&mut self, id: u64, k: i64) -> Result<bool> {
        self.guard()?;
        let moved = self.cursor_mut(id)?.absolute(k)?;
        if moved {
            self.refetch_if_sensitive(id)?;
        }
        Ok(moved)
    }

    /// Move `n` rows relative to the current position
    pub fn cursor_relative(&mut self, id: u64, n: i64) -> Result<bool> {
        self.guard()?;
        let moved = self.cursor_mut(id)?.relative(n)?;
        if moved {
            self.refetch_if_sensitive(id)?;
        }
        Ok(moved)
    }

    /// Move before the first row
    pub fn cursor_before_first(&mut self, id: u64) -> Result<()> {
        self.guard()?;
        self.cursor_mut(id)?.before_first()
    }

    /// Move after the last row
    pub fn cursor_after_last(&mut self, id: u64) -> Result<()> {
        self.guard()?;
        self.cursor_mut(id)?.after_last()
    }

    /// Whether the cursor sits before the first row (false on an empty set)
    pub fn cursor_is_before_first(&self, id: u64) -> Result<bool> {
        Ok(self.cursor(id)?.is_before_first())
    }

    /// Whether the cursor sits after the last row (false on an empty set)
    pub fn cursor_is_after_last(&self, id: u64) -> Result<bool> {
        Ok(self.cursor(id)?.is_after_last())
    }

    /// Scroll-sensitive cursors re-fetch the target row after each move
    fn refetch_if_sensitive(&mut self, id: u64) -> Result<()> {
        let (stmt_id, index, columns) = {
            let cursor = self.cursor(id)?;
            if cursor.mode() != CursorMode::ScrollSensitive {
                return Ok(());
            }
            let stmt_id = match cursor.server_statement_id() {
                Some(stmt_id) => stmt_id,
                None => return Ok(()),
            };
            let index = match cursor.position() {
                Position::OnRow(i) => i,
                _ => return Ok(()),
            };
            (stmt_id, index, cursor.columns().to_vec())
        };
        let request =
            FetchMessage::with_orientation(stmt_id, 1, FetchOrientation::Absolute, index as i64)
                .build_request()?;
        let packets = self.send(request)?;
        let reply = FetchReply::parse(&packets, &columns, &self.row_codec(true))?;
        let row = match reply.rows.into_iter().next() {
            Some(row) => row,
            // deleted externally since open: surface a NULL-filled row rather
            // than shrinking the open-time count
            None => Row::new(vec![Value::Null; columns.len()]),
        };
        self.cursor_mut(id)?.replace_current_row(row)
    }

    // =========================================================================
    // Cell access
    // =========================================================================

    /// Read a cell of the current row, coerced to the requested type
    pub fn get_value(&self, id: u64, column: usize, target: SqlType) -> Result<Value> {
        let cursor = self.cursor(id)?;
        let value = cursor.cell(column)?;
        let column_info = cursor.columns().get(column);
        coerce(value, target, column_info, self.dialect.as_ref())
    }

    /// Read a cell of the current row in its canonical representation
    pub fn get_raw(&self, id: u64, column: usize) -> Result<Value> {
        Ok(self.cursor(id)?.cell(column)?.clone())
    }

    // =========================================================================
    // Cursor mutation
    // =========================================================================

    /// Re-fetch the current row's values from the server without moving
    ///
    /// Uses the current-row orientation fetch when a live server cursor
    /// backs this cursor, and a generated keyed SELECT otherwise.
    pub fn refresh_row(&mut self, id: u64) -> Result<()> {
        self.guard()?;
        let (server_id, select, columns) = {
            let cursor = self.cursor(id)?;
            if cursor.mode() == CursorMode::ForwardOnly
                || cursor.concurrency() == Concurrency::ReadOnly
            {
                return Err(Error::NotSupported(format!(
                    "refreshRow on a {} read-only cursor",
                    cursor.mode().name()
                )));
            }
            let target = cursor.update_target().ok_or_else(|| {
                Error::NotSupported(
                    "refreshRow requires a single-table query with a usable key".to_string(),
                )
            })?;
            if !matches!(cursor.position(), Position::OnRow(_)) {
                return Err(Error::NoCurrentRow);
            }
            let select = match cursor.server_statement_id() {
                Some(_) => None,
                None => Some(self.keyed_select(cursor, target)?),
            };
            (
                cursor.server_statement_id(),
                select,
                cursor.columns().to_vec(),
            )
        };
        let refreshed = match (server_id, select) {
            (Some(stmt_id), _) => {
                let request =
                    FetchMessage::with_orientation(stmt_id, 1, FetchOrientation::Current, 0)
                        .build_request()?;
                let packets = self.send(request)?;
                FetchReply::parse(&packets, &columns, &self.row_codec(true))?
                    .rows
                    .into_iter()
                    .next()
            }
            (None, Some(select)) => {
                let packets = self.send(QueryMessage::new(select).build_request()?)?;
                let mut pos = 0;
                let rs = ResultSet::parse_at(&packets, &mut pos, &self.row_codec(false))?;
                rs.rows.into_iter().next()
            }
            (None, None) => None,
        };
        let row = refreshed.unwrap_or_else(|| Row::new(vec![Value::Null; columns.len()]));
        self.cursor_mut(id)?.replace_current_row(row)
    }

    /// Stage a column mutation against the current or staging row
    pub fn update_value(&mut self, id: u64, column: usize, value: Value) -> Result<()> {
        self.guard()?;
        self.cursor_mut(id)?.stage_update(column, value)
    }

    /// Open the staging row
    pub fn move_to_insert_row(&mut self, id: u64) -> Result<()> {
        self.guard()?;
        self.cursor_mut(id)?.move_to_insert_row()
    }

    /// Leave the staging row, discarding staged values
    pub fn move_to_current_row(&mut self, id: u64) -> Result<()> {
        self.guard()?;
        self.cursor_mut(id)?.move_to_current_row()
    }

    /// Commit staged column mutations against the current row's key
    pub fn update_row(&mut self, id: u64) -> Result<()> {
        self.guard()?;
        let sql = {
            let cursor = self.cursor(id)?;
            if cursor.on_insert_row() {
                return Err(Error::NotSupported(
                    "updateRow is illegal on the staging row".to_string(),
                ));
            }
            if !cursor.has_staged() {
                return Ok(());
            }
            let target = cursor
                .update_target()
                .ok_or_else(|| Error::NotSupported("cursor is not updatable".to_string()))?;
            self.keyed_update(cursor, target)?
        };
        self.exec_outcome(QueryMessage::new(sql).build_request()?)?;
        self.cursor_mut(id)?.apply_staged_to_current()
    }

    /// Insert the staging row into the base table
    pub fn insert_row(&mut self, id: u64) -> Result<()> {
        self.guard()?;
        let sql = {
            let cursor = self.cursor(id)?;
            if !cursor.on_insert_row() {
                return Err(Error::NotSupported(
                    "insertRow requires the staging row".to_string(),
                ));
            }
            let target = cursor
                .update_target()
                .ok_or_else(|| Error::NotSupported("cursor is not updatable".to_string()))?;
            self.staged_insert(cursor, target)?
        };
        self.exec_outcome(QueryMessage::new(sql).build_request()?)?;
        self.cursor_mut(id)?.clear_staging();
        Ok(())
    }

    /// Delete the current row through the base table's key
    ///
    /// Position is unchanged; cell reads keep returning the pre-delete values
    /// until the position moves away.
    pub fn delete_row(&mut self, id: u64) -> Result<()> {
        self.guard()?;
        let sql = {
            let cursor = self.cursor(id)?;
            if cursor.on_insert_row() {
                return Err(Error::NotSupported(
                    "deleteRow is illegal on the staging row".to_string(),
                ));
            }
            let target = cursor
                .update_target()
                .ok_or_else(|| Error::NotSupported("cursor is not updatable".to_string()))?;
            let filter = self.key_filter(cursor, target)?;
            format!(
                "DELETE FROM {} WHERE {}",
                self.dialect.quote_identifier(&target.table),
                filter
            )
        };
        self.exec_outcome(QueryMessage::new(sql).build_request()?)?;
        self.cursor_mut(id)?.mark_current_deleted()
    }

    fn column_index(cursor: &Cursor, name: &str) -> Result<usize> {
        cursor
            .columns()
            .iter()
            .position(|col| col.name.eq_ignore_ascii_case(name))
            .ok_or_else(|| Error::Internal(format!("key column {} missing from result", name)))
    }

    /// `key = literal AND ...` over the current row's key values
    fn key_filter(&self, cursor: &Cursor, target: &UpdateTarget) -> Result<String> {
        let row = cursor.current_row().ok_or(Error::NoCurrentRow)?;
        let mut filter = String::new();
        for (i, key) in target.key_columns.iter().enumerate() {
            if i > 0 {
                filter.push_str(" AND ");
            }
            let index = Self::column_index(cursor, key)?;
            let value = row
                .get(index)
                .ok_or_else(|| Error::Internal(format!("key column {} out of range", key)))?;
            filter.push_str(&self.dialect.quote_identifier(key));
            filter.push_str(" = ");
            filter.push_str(&render_literal(value, self.dialect.as_ref())?);
        }
        Ok(filter)
    }

    fn keyed_select(&self, cursor: &Cursor, target: &UpdateTarget) -> Result<String> {
        let mut columns = String::new();
        for (i, col) in cursor.columns().iter().enumerate() {
            if i > 0 {
                columns.push_str(", ");
            }
            columns.push_str(&self.dialect.quote_identifier(&col.name));
        }
        Ok(format!(
            "SELECT {} FROM {} WHERE {}",
            columns,
            self.dialect.quote_identifier(&target.table),
            self.key_filter(cursor, target)?
        ))
    }

    fn keyed_update(&self, cursor: &Cursor, target: &UpdateTarget) -> Result<String> {
        let mut assignments = String::new();
        for (index, staged) in cursor.staged().iter().enumerate() {
            let value = match staged {
                Some(value) => value,
                None => continue,
            };
            if !assignments.is_empty() {
                assignments.push_str(", ");
            }
            assignments.push_str(&self.dialect.quote_identifier(&cursor.columns()[index].name));
            assignments.push_str(" = ");
            assignments.push_str(&render_literal(value, self.dialect.as_ref())?);
        }
        Ok(format!(
            "UPDATE {} SET {} WHERE {}",
            self.dialect.quote_identifier(&target.table),
            assignments,
            self.key_filter(cursor, target)?
        ))
    }

    fn staged_insert(&self, cursor: &Cursor, target: &UpdateTarget) -> Result<String> {
        let mut names = String::new();
        let mut literals = String::new();
        for (index, staged) in cursor.staged().iter().enumerate() {
            let value = match staged {
                Some(value) => value,
                None => continue,
            };
            if !names.is_empty() {
                names.push_str(", ");
                literals.push_str(", ");
            }
            names.push_str(&self.dialect.quote_identifier(&cursor.columns()[index].name));
            literals.push_str(&render_literal(value, self.dialect.as_ref())?);
        }
        if names.is_empty() {
            return Err(Error::NotSupported(
                "insertRow with no staged columns".to_string(),
            ));
        }
        Ok(format!(
            "INSERT INTO {} ({}) VALUES ({})",
            self.dialect.quote_identifier(&target.table),
            names,
            literals
        ))
    }

    // =========================================================================
    // LOB operations
    // =========================================================================

    /// Open a large-object handle over the current row's cell
    ///
    /// Handles from distinct reads of the same cell are independent value
    /// copies keyed back to their origin, never references into the cursor.
    pub fn open_lob(&self, id: u64, column: usize) -> Result<LobHandle> {
        let cursor = self.cursor(id)?;
        let origin = match cursor.position() {
            Position::OnRow(i) => LobOrigin {
                cursor_id: id,
                row: i - 1,
                column,
            },
            _ => return Err(Error::NoCurrentRow),
        };
        let handle = match cursor.cell(column)? {
            Value::Lob(lob) => lob.clone(),
            Value::Bytes(bytes) => LobHandle::loaded(LobKind::Blob, bytes.clone()),
            Value::Text(text) => {
                LobHandle::loaded(LobKind::Clob, Bytes::copy_from_slice(text.as_bytes()))
            }
            other => {
                return Err(Error::NotSupported(format!(
                    "column holds {}, not large-object content",
                    other.type_name()
                )))
            }
        };
        Ok(handle.with_origin(origin))
    }

    /// Read up to `length` bytes at `offset`
    ///
    /// Reading beyond the current length returns the available remainder,
    /// never pads. Each call is an independent short-lived read reflecting
    /// the content at call time.
    pub fn lob_read(&mut self, handle: &LobHandle, offset: u64, length: u64) -> Result<Bytes> {
        self.guard()?;
        match handle.content() {
            LobContent::Loaded { .. } => handle.read_loaded(offset, length),
            LobContent::Locator(locator) => {
                let request = LobOpMessage::read(locator, offset, length).build_request()?;
                let packets = self.send(request)?;
                Ok(LobPieceData::parse(&packets)?.data)
            }
        }
    }

    /// Write `data` in place at `offset`, returning the resulting length
    ///
    /// Legal only on a locator-backed handle while the owning row is held
    /// under a row lock.
    pub fn lob_write(&mut self, handle: &mut LobHandle, offset: u64, data: &[u8]) -> Result<u64> {
        self.guard()?;
        let locator = handle
            .as_locator()
            .ok_or(Error::LobNotLocator("write"))?
            .clone();
        locator.require_row_lock(self.locks.as_ref())?;
        let request = LobOpMessage::write(&locator, offset, data).build_request()?;
        let packets = self.send(request)?;
        let ack = LobOpAck::parse(&packets)?;
        handle.set_locator_size(ack.length);
        Ok(ack.length)
    }

    /// Truncate to `new_length` bytes, returning the resulting length
    pub fn lob_truncate(&mut self, handle: &mut LobHandle, new_length: u64) -> Result<u64> {
        self.guard()?;
        let locator = handle
            .as_locator()
            .ok_or(Error::LobNotLocator("truncate"))?
            .clone();
        locator.require_row_lock(self.locks.as_ref())?;
        let request = LobOpMessage::trim(&locator, new_length).build_request()?;
        let packets = self.send(request)?;
        let ack = LobOpAck::parse(&packets)?;
        handle.set_locator_size(ack.length);
        Ok(ack.length)
    }

    /// Query the server for the LOB's current length
    pub fn lob_length(&mut self, handle: &mut LobHandle) -> Result<u64> {
        self.guard()?;
        match handle.content() {
            LobContent::Loaded { .. } => Ok(handle.len()),
            LobContent::Locator(locator) => {
                let request = LobOpMessage::get_length(locator).build_request()?;
                let packets = self.send(request)?;
                let ack = LobOpAck::parse(&packets)?;
                handle.set_locator_size(ack.length);
                Ok(ack.length)
            }
        }
    }

    /// Release a locator's server-side resources
    pub fn lob_free(&mut self, handle: LobHandle) -> Result<()> {
        self.guard()?;
        if let LobContent::Locator(locator) = handle.content() {
            let request = LobOpMessage::free(locator).build_request()?;
            self.send(request)?;
        }
        Ok(())
    }
}

/// Parse one command reply packet: OK yields the outcome, ERR the server error
fn parse_reply_outcome(payload: Bytes) -> Result<ExecOutcome> {
    if payload.first() == Some(&crate::constants::packet_header::ERR) {
        return Err(parse_err_packet(payload)?);
    }
    ExecOutcome::parse(payload)
}
