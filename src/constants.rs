//! Protocol constants for the MySQL-family wire format
//!
//! Command bytes, column type tags, capability and status flags, and the
//! dialect error-code tables used by the coercion matrix.

/// Wire packet header size: 3-byte length + 1-byte sequence id
pub const PACKET_HEADER_SIZE: usize = 4;

/// Maximum payload of a single wire packet; a payload of exactly this size
/// is followed by a continuation packet
pub const MAX_PACKET_PAYLOAD: usize = 0xFF_FFFF;

/// Command bytes sent as the first payload byte of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Command {
    /// Text-protocol query
    Query = 0x03,
    /// Prepare a statement for binary execution
    StmtPrepare = 0x16,
    /// Execute a prepared statement
    StmtExecute = 0x17,
    /// Stream a long parameter value in pieces
    StmtSendLongData = 0x18,
    /// Close a prepared statement
    StmtClose = 0x19,
    /// Reset a prepared statement's accumulated long data
    StmtReset = 0x1a,
    /// Fetch rows from an open server cursor
    StmtFetch = 0x1c,
    /// MariaDB bulk execution (one frame, many parameter rows)
    StmtBulkExecute = 0xfa,
    /// Large-object piece operation (Oracle-compatibility sub-protocol)
    LobPiece = 0xfb,
}

/// Column / parameter type tags on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum FieldType {
    /// Legacy decimal
    Decimal = 0,
    /// 1-byte integer
    Tiny = 1,
    /// 2-byte integer
    Short = 2,
    /// 4-byte integer
    Long = 3,
    /// 4-byte float
    Float = 4,
    /// 8-byte float
    Double = 5,
    /// Explicit NULL
    Null = 6,
    /// Timestamp
    Timestamp = 7,
    /// 8-byte integer
    LongLong = 8,
    /// 3-byte integer
    Int24 = 9,
    /// Date
    Date = 10,
    /// Time / interval day-to-second
    Time = 11,
    /// Datetime
    DateTime = 12,
    /// Year
    Year = 13,
    /// Varchar
    Varchar = 15,
    /// Bit field
    Bit = 16,
    /// JSON document
    Json = 245,
    /// Exact decimal
    NewDecimal = 246,
    /// Enum
    Enum = 247,
    /// Set
    Set = 248,
    /// Tiny blob
    TinyBlob = 249,
    /// Medium blob
    MediumBlob = 250,
    /// Long blob
    LongBlob = 251,
    /// Blob
    Blob = 252,
    /// Variable string
    VarString = 253,
    /// Fixed string (CHAR)
    String = 254,
    /// Geometry
    Geometry = 255,
}

impl FieldType {
    /// Decode a wire type tag
    pub fn from_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => FieldType::Decimal,
            1 => FieldType::Tiny,
            2 => FieldType::Short,
            3 => FieldType::Long,
            4 => FieldType::Float,
            5 => FieldType::Double,
            6 => FieldType::Null,
            7 => FieldType::Timestamp,
            8 => FieldType::LongLong,
            9 => FieldType::Int24,
            10 => FieldType::Date,
            11 => FieldType::Time,
            12 => FieldType::DateTime,
            13 => FieldType::Year,
            15 => FieldType::Varchar,
            16 => FieldType::Bit,
            245 => FieldType::Json,
            246 => FieldType::NewDecimal,
            247 => FieldType::Enum,
            248 => FieldType::Set,
            249 => FieldType::TinyBlob,
            250 => FieldType::MediumBlob,
            251 => FieldType::LongBlob,
            252 => FieldType::Blob,
            253 => FieldType::VarString,
            254 => FieldType::String,
            255 => FieldType::Geometry,
            _ => return None,
        })
    }

    /// Check if this is a large-object carrying type
    pub fn is_lob(self) -> bool {
        matches!(
            self,
            FieldType::TinyBlob | FieldType::MediumBlob | FieldType::LongBlob | FieldType::Blob
        )
    }
}

/// Session capability flag bits (negotiated at handshake, consumed here)
pub mod capability {
    /// Client speaks the 4.1+ protocol
    pub const PROTOCOL_41: u64 = 1 << 9;
    /// Multiple statements may share one text frame
    pub const MULTI_STATEMENTS: u64 = 1 << 16;
    /// Multiple result sets per reply
    pub const MULTI_RESULTS: u64 = 1 << 17;
    /// Prepared statements may return multiple result sets
    pub const PS_MULTI_RESULTS: u64 = 1 << 18;
    /// OK packet replaces the trailing EOF packet
    pub const DEPRECATE_EOF: u64 = 1 << 24;
    /// Binary/prepared sub-protocol is in use for this session
    pub const BINARY_PROTOCOL: u64 = 1 << 32;
    /// Server supports native bulk batch execution
    pub const STMT_BULK_OPERATIONS: u64 = 1 << 34;
    /// Server supports scroll-orientation fetch on server cursors
    pub const SCROLLABLE_CURSORS: u64 = 1 << 36;
    /// Server supports the large-object piece sub-protocol
    pub const LOB_LOCATORS: u64 = 1 << 37;
}

/// Server status flag bits carried in OK/EOF packets
pub mod status {
    /// More result sets follow in this reply
    pub const MORE_RESULTS_EXISTS: u16 = 0x0008;
    /// A server-side cursor was opened for the statement
    pub const CURSOR_EXISTS: u16 = 0x0040;
    /// The open cursor is exhausted
    pub const LAST_ROW_SENT: u16 = 0x0080;
}

/// Cursor-type flags for the binary execute command
pub mod cursor_type {
    /// No server cursor; rows stream back immediately
    pub const NO_CURSOR: u8 = 0x00;
    /// Read-only server cursor, rows pulled via fetch
    pub const READ_ONLY: u8 = 0x01;
    /// Cursor opened for update
    pub const FOR_UPDATE: u8 = 0x02;
    /// Cursor supports scroll-orientation fetch
    pub const SCROLLABLE: u8 = 0x04;
}

/// Scroll orientation codes for the fetch command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FetchOrientation {
    /// Next window (default, forward-only)
    Next = 0,
    /// Absolute 1-based row position
    Absolute = 1,
    /// Offset relative to current position
    Relative = 2,
    /// First row
    First = 3,
    /// Last row
    Last = 4,
    /// Re-fetch the current row without moving
    Current = 5,
}

/// Per-row parameter indicator bytes for the bulk execute command
pub mod bulk_indicator {
    /// Value follows
    pub const NONE: u8 = 0;
    /// NULL value, nothing follows
    pub const NULL: u8 = 1;
    /// Use the column default, nothing follows
    pub const DEFAULT: u8 = 2;
}

/// Bulk execute option flags
pub mod bulk_flags {
    /// Parameter type tags are sent ahead of the rows
    pub const SEND_TYPES: u16 = 0x0080;
    /// Server returns one outcome packet per row
    pub const UNIT_RESULTS: u16 = 0x0040;
}

/// Large-object piece operation codes
pub mod lob_op {
    /// Read a piece
    pub const READ: u8 = 1;
    /// Write a piece in place
    pub const WRITE: u8 = 2;
    /// Truncate to a new length
    pub const TRIM: u8 = 3;
    /// Query current length
    pub const GET_LENGTH: u8 = 4;
    /// Release the locator
    pub const FREE: u8 = 5;
}

/// Response packet header bytes
pub mod packet_header {
    /// OK packet
    pub const OK: u8 = 0x00;
    /// EOF packet (legacy resultset terminator)
    pub const EOF: u8 = 0xfe;
    /// ERR packet
    pub const ERR: u8 = 0xff;
    /// NULL cell marker in text-protocol rows
    pub const NULL_CELL: u8 = 0xfb;
}

/// Column definition flag bits
pub mod column_flags {
    /// NOT NULL column
    pub const NOT_NULL: u16 = 0x0001;
    /// Part of the primary key
    pub const PRI_KEY: u16 = 0x0002;
    /// Unsigned numeric column
    pub const UNSIGNED: u16 = 0x0020;
    /// Binary collation (BLOB vs TEXT distinction)
    pub const BINARY: u16 = 0x0080;
}

/// Overflow/truncation error codes per dialect (carried by `Error::Overflow`)
pub mod error_code {
    /// MySQL-family: ER_WARN_DATA_OUT_OF_RANGE
    pub const MYSQL_OUT_OF_RANGE: u16 = 1264;
    /// MySQL-family: ER_DATA_TOO_LONG
    pub const MYSQL_DATA_TOO_LONG: u16 = 1406;
    /// Oracle mode: numeric overflow (ORA-01426)
    pub const ORACLE_NUMERIC_OVERFLOW: u16 = 1426;
    /// Oracle mode: value larger than specified precision (ORA-01438)
    pub const ORACLE_VALUE_TOO_LARGE: u16 = 1438;
}
