//! Session capability negotiation results
//!
//! The transport collaborator hands the core the capability bit set agreed
//! during the (out-of-scope) handshake; this module decodes it into the flags
//! the dispatcher and binder consult, adjusted against what the server
//! actually advertised.

use crate::constants::capability;

/// Capabilities negotiated between client and server, as consumed by the core
#[derive(Debug, Clone)]
pub struct SessionCapabilities {
    /// Raw negotiated capability bit set
    pub flags: u64,
    /// Whether the binary/prepared sub-protocol is in use
    pub binary_protocol: bool,
    /// Whether the server executes native bulk batches
    pub supports_bulk: bool,
    /// Whether multiple statements may share one text frame
    pub supports_multi_statement: bool,
    /// Whether the server supports scroll-orientation fetch on open cursors
    pub supports_scrollable_cursors: bool,
    /// Whether the server supports the large-object piece sub-protocol
    pub supports_lob_locators: bool,
    /// Whether the trailing EOF packet is replaced by an OK packet
    pub deprecate_eof: bool,
}

impl SessionCapabilities {
    /// Decode a negotiated capability bit set
    pub fn from_flags(flags: u64) -> Self {
        Self {
            flags,
            binary_protocol: flags & capability::BINARY_PROTOCOL != 0,
            supports_bulk: flags & capability::STMT_BULK_OPERATIONS != 0,
            supports_multi_statement: flags & capability::MULTI_STATEMENTS != 0,
            supports_scrollable_cursors: flags & capability::SCROLLABLE_CURSORS != 0,
            supports_lob_locators: flags & capability::LOB_LOCATORS != 0,
            deprecate_eof: flags & capability::DEPRECATE_EOF != 0,
        }
    }

    /// Client-default capabilities: everything the core can drive
    pub fn client_default() -> Self {
        Self::from_flags(
            capability::PROTOCOL_41
                | capability::MULTI_STATEMENTS
                | capability::MULTI_RESULTS
                | capability::PS_MULTI_RESULTS
                | capability::DEPRECATE_EOF
                | capability::BINARY_PROTOCOL
                | capability::STMT_BULK_OPERATIONS
                | capability::SCROLLABLE_CURSORS
                | capability::LOB_LOCATORS,
        )
    }

    /// Intersect with the flags the server advertised; features the server
    /// lacks are dropped
    pub fn adjust_for_server(&mut self, server_flags: u64) {
        self.flags &= server_flags | capability::PROTOCOL_41;
        *self = Self::from_flags(self.flags);
    }
}

impl Default for SessionCapabilities {
    fn default() -> Self {
        Self::client_default()
    }
}
