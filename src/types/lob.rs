//! Large-object handles
//!
//! A LOB cell materializes in one of two states: fully loaded (an immutable
//! byte view, supporting zero-copy sub-views) or locator-backed (a server-side
//! reference whose content is fetched and pushed in pieces). Mutation is only
//! legal on a locator-backed handle while the owning row is held under a row
//! lock; the [`RowLockContext`](crate::transport::RowLockContext) collaborator
//! answers that question.
//!
//! A handle obtained from a cursor cell carries only a `(cursor, row, column)`
//! lookup key back to its origin, never a reference into the cursor's buffers,
//! so cursors can be closed and reused without dangling handles.

use bytes::Bytes;

use crate::error::{Error, Result};
use crate::transport::RowLockContext;

/// Content family of a large object
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LobKind {
    /// Binary content
    Blob,
    /// Character content
    Clob,
}

/// Origin lookup key of a handle read from a cursor cell
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LobOrigin {
    /// Owning cursor's id
    pub cursor_id: u64,
    /// Row index within that cursor (0-based)
    pub row: usize,
    /// Column index within the row (0-based)
    pub column: usize,
}

/// Server-side locator for piecewise LOB access
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobLocator {
    /// Opaque locator token issued by the server
    pub(crate) token: Bytes,
    /// Current LOB length in bytes (chars for character LOBs)
    pub(crate) size: u64,
    /// Preferred piece size for read/write round trips
    pub(crate) chunk_size: u32,
    /// Content family
    pub(crate) kind: LobKind,
    /// Owning table, for the row-lock check
    pub(crate) table: String,
    /// Owning row key, for the row-lock check
    pub(crate) key: String,
}

impl LobLocator {
    /// Create a locator from its parts
    pub fn new(
        token: Bytes,
        size: u64,
        chunk_size: u32,
        kind: LobKind,
        table: impl Into<String>,
        key: impl Into<String>,
    ) -> Self {
        Self {
            token,
            size,
            chunk_size,
            kind,
            table: table.into(),
            key: key.into(),
        }
    }

    /// Current length
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Preferred piece size
    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    /// The opaque locator token
    pub fn token(&self) -> &[u8] {
        &self.token
    }

    /// Owning table name
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Owning row key
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Fail unless the owning row is locked
    pub fn require_row_lock(&self, locks: &dyn RowLockContext) -> Result<()> {
        if locks.is_row_locked(&self.table, &self.key) {
            Ok(())
        } else {
            Err(Error::RowNotLocked {
                table: self.table.clone(),
                key: self.key.clone(),
            })
        }
    }
}

/// Materialization state of a LOB handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LobContent {
    /// Fully loaded content: an immutable offset+length view of a byte buffer
    Loaded {
        /// Backing bytes (shared, never copied by sub-views)
        data: Bytes,
        /// View start within `data`
        offset: usize,
        /// View length
        len: usize,
    },
    /// Server-side locator; content moves in pieces
    Locator(LobLocator),
}

/// A large-object value handle
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LobHandle {
    kind: LobKind,
    content: LobContent,
    origin: Option<LobOrigin>,
}

impl LobHandle {
    /// Create a fully loaded handle viewing the whole buffer
    pub fn loaded(kind: LobKind, data: Bytes) -> Self {
        let len = data.len();
        Self {
            kind,
            content: LobContent::Loaded {
                data,
                offset: 0,
                len,
            },
            origin: None,
        }
    }

    /// Create a locator-backed handle
    pub fn locator(locator: LobLocator) -> Self {
        Self {
            kind: locator.kind,
            content: LobContent::Locator(locator),
            origin: None,
        }
    }

    /// Attach the cursor-cell origin key
    pub fn with_origin(mut self, origin: LobOrigin) -> Self {
        self.origin = Some(origin);
        self
    }

    /// Content family
    pub fn kind(&self) -> LobKind {
        self.kind
    }

    /// The origin lookup key, if this handle came from a cursor cell
    pub fn origin(&self) -> Option<LobOrigin> {
        self.origin
    }

    /// The materialization state
    pub fn content(&self) -> &LobContent {
        &self.content
    }

    /// The locator, if locator-backed
    pub fn as_locator(&self) -> Option<&LobLocator> {
        match &self.content {
            LobContent::Locator(loc) => Some(loc),
            LobContent::Loaded { .. } => None,
        }
    }

    /// Current length of the content
    pub fn len(&self) -> u64 {
        match &self.content {
            LobContent::Loaded { len, .. } => *len as u64,
            LobContent::Locator(loc) => loc.size,
        }
    }

    /// Check if the content is empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Zero-copy sub-view of a fully loaded handle
    ///
    /// The view is clamped to the available content; a sub-view at or past
    /// the end is empty. Locator-backed handles cannot be sub-viewed (their
    /// reads already take an offset).
    pub fn sub_view(&self, offset: u64, length: u64) -> Result<LobHandle> {
        match &self.content {
            LobContent::Loaded {
                data,
                offset: base,
                len,
            } => {
                let start = (offset as usize).min(*len);
                let avail = *len - start;
                let take = (length as usize).min(avail);
                Ok(LobHandle {
                    kind: self.kind,
                    content: LobContent::Loaded {
                        data: data.clone(),
                        offset: base + start,
                        len: take,
                    },
                    origin: None,
                })
            }
            LobContent::Locator(_) => Err(Error::NotSupported(
                "sub-views apply to fully loaded LOBs only".to_string(),
            )),
        }
    }

    /// Read from a fully loaded handle
    ///
    /// Reading beyond the current length returns the available remainder,
    /// never pads. Locator-backed handles read through the session instead.
    pub fn read_loaded(&self, offset: u64, length: u64) -> Result<Bytes> {
        match &self.content {
            LobContent::Loaded {
                data,
                offset: base,
                len,
            } => {
                let start = (offset as usize).min(*len);
                let end = start + ((length as usize).min(*len - start));
                Ok(data.slice(base + start..base + end))
            }
            LobContent::Locator(_) => Err(Error::NotSupported(
                "locator-backed LOB reads go through the session".to_string(),
            )),
        }
    }

    /// Record the server-acknowledged length after a write or truncate
    pub(crate) fn set_locator_size(&mut self, size: u64) {
        if let LobContent::Locator(locator) = &mut self.content {
            locator.size = size;
        }
    }
}
