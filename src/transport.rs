//! Session transport collaborator interface
//!
//! Transport and session establishment are outside this crate; the core
//! receives a live, authenticated, byte-oriented session behind the
//! [`SessionTransport`] trait. One `send` is one blocking round trip: the
//! request bytes are a fully framed command, and the returned bytes carry the
//! server's entire reply for that round trip (one or more wire packets, which
//! the protocol layer slices apart).

use bytes::Bytes;

use crate::error::Result;

/// A live, authenticated session transport
///
/// Implementations block the calling thread until the server responds or the
/// network times out. A caller-initiated cancel races the server timeout; the
/// transport surfaces whichever signal it observes first as
/// [`Error::Cancelled`](crate::Error::Cancelled) or
/// [`Error::Timeout`](crate::Error::Timeout), after which the owning session
/// is poisoned and must be reset.
pub trait SessionTransport {
    /// Send one framed request and block for the complete reply
    fn send(&mut self, frame: Bytes) -> Result<Bytes>;

    /// The capability bit set agreed during the handshake
    fn negotiated_capabilities(&self) -> u64;

    /// Maximum size of a single frame this session may send
    fn max_frame_size(&self) -> usize;
}

/// Row-lock context collaborator
///
/// Consulted by LOB mutation paths: a locator-backed write or truncate is only
/// legal while the owning row is held under an explicit row lock (for example
/// a preceding `SELECT ... FOR UPDATE` in the same transaction).
pub trait RowLockContext {
    /// Whether the given row is currently locked by this session's transaction
    fn is_row_locked(&self, table: &str, key: &str) -> bool;
}

/// A lock context for sessions that never lock rows; all LOB mutations fail
#[derive(Debug, Default)]
pub struct NoRowLocks;

impl RowLockContext for NoRowLocks {
    fn is_row_locked(&self, _table: &str, _key: &str) -> bool {
        false
    }
}
