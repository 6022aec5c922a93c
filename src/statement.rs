//! SQL statement templates and classification
//!
//! SQL analysis is an external collaborator: the [`StatementClassifier`]
//! reports, for raw SQL, the placeholder count, whether the statement is
//! rewritable into one multi-row command, and its broad kind. The core never
//! lexes SQL itself. A [`Statement`] couples the immutable template text with
//! that classification and the execution-side state the session maintains for
//! it (prepared-statement id, column metadata, text-protocol fallback flag).

use crate::constants::FieldType;

/// Broad statement kind, as reported by the external classifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatementKind {
    /// Unknown or unclassified statement
    #[default]
    Unknown,
    /// Data query (SELECT)
    Dql,
    /// Data manipulation (INSERT, UPDATE, DELETE, MERGE)
    Dml,
    /// Data definition (CREATE, ALTER, DROP, ...)
    Ddl,
    /// Procedure call
    Call,
}

/// Classification of a raw SQL text, produced by the external analyzer
#[derive(Debug, Clone, Default)]
pub struct StatementInfo {
    /// Number of placeholder positions the template declares
    pub placeholder_count: usize,
    /// Whether the statement can be folded into one multi-row VALUES command
    pub rewritable: bool,
    /// Broad statement kind
    pub kind: StatementKind,
    /// Whether the statement contains constructs the prepared sub-protocol
    /// cannot express (forces the documented text-protocol fallback)
    pub preparable: bool,
    /// Base table name, when the statement resolves to exactly one table
    pub single_table: Option<String>,
    /// Primary-key column names of that table, when usable for keyed mutation
    pub key_columns: Vec<String>,
}

/// External SQL analysis collaborator
pub trait StatementClassifier {
    /// Classify raw SQL text
    fn classify(&self, sql: &str) -> StatementInfo;
}

/// Metadata for a column in a result set
#[derive(Debug, Clone)]
pub struct ColumnInfo {
    /// Column name
    pub name: String,
    /// Originating table name
    pub table: String,
    /// Wire data type
    pub field_type: FieldType,
    /// Declared column length (characters for text types)
    pub length: u32,
    /// Decimal scale
    pub decimals: u8,
    /// Column definition flags
    pub flags: u16,
}

impl ColumnInfo {
    /// Create a new column with minimal info
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            table: String::new(),
            field_type,
            length: 0,
            decimals: 0,
            flags: 0,
        }
    }

    /// Check if this column is part of the primary key
    pub fn is_primary_key(&self) -> bool {
        self.flags & crate::constants::column_flags::PRI_KEY != 0
    }

    /// Check if this column is unsigned
    pub fn is_unsigned(&self) -> bool {
        self.flags & crate::constants::column_flags::UNSIGNED != 0
    }

    /// Check if this is a fixed-width CHAR column
    pub fn is_fixed_char(&self) -> bool {
        self.field_type == FieldType::String
    }

    /// Check if this column carries large-object content
    pub fn is_lob(&self) -> bool {
        self.field_type.is_lob()
    }
}

/// A statement template plus its session-side execution state
#[derive(Debug, Clone)]
pub struct Statement {
    /// The original SQL text
    sql: String,
    /// Classification from the external analyzer
    info: StatementInfo,
    /// Server-assigned prepared statement id (0 = not prepared)
    prepared_id: u32,
    /// Whether execution fell back to the text protocol
    text_fallback: bool,
    /// Column metadata from the last prepare/execute
    columns: Vec<ColumnInfo>,
}

impl Statement {
    /// Create a statement from SQL text and its classification
    pub fn new(sql: impl Into<String>, info: StatementInfo) -> Self {
        Self {
            sql: sql.into(),
            info,
            prepared_id: 0,
            text_fallback: false,
            columns: Vec::new(),
        }
    }

    /// Get the SQL text
    pub fn sql(&self) -> &str {
        &self.sql
    }

    /// Get the classification
    pub fn info(&self) -> &StatementInfo {
        &self.info
    }

    /// Number of placeholders the template declares
    pub fn placeholder_count(&self) -> usize {
        self.info.placeholder_count
    }

    /// Whether the statement can be rewritten into one multi-row command
    pub fn is_rewritable(&self) -> bool {
        self.info.rewritable
    }

    /// Check if this is a query
    pub fn is_query(&self) -> bool {
        self.info.kind == StatementKind::Dql
    }

    /// Check if this is a DML statement
    pub fn is_dml(&self) -> bool {
        self.info.kind == StatementKind::Dml
    }

    /// Server-assigned prepared statement id (0 if not prepared)
    pub fn prepared_id(&self) -> u32 {
        self.prepared_id
    }

    /// Record the server-assigned prepared statement id
    pub fn set_prepared_id(&mut self, id: u32) {
        self.prepared_id = id;
    }

    /// Whether execution uses the text protocol
    ///
    /// True either because the session never negotiated the binary
    /// sub-protocol, or because the template contains constructs the prepared
    /// path cannot express. The fallback is documented behavior, not an
    /// error, and is observable here.
    pub fn uses_text_protocol(&self) -> bool {
        self.text_fallback || !self.info.preparable
    }

    /// Record that execution fell back to the text protocol
    pub fn set_text_fallback(&mut self, fallback: bool) {
        self.text_fallback = fallback;
    }

    /// Column metadata from the last prepare/execute
    pub fn columns(&self) -> &[ColumnInfo] {
        &self.columns
    }

    /// Set column metadata
    pub fn set_columns(&mut self, columns: Vec<ColumnInfo>) {
        self.columns = columns;
    }

    /// Clear execution state for re-execution
    pub fn clear(&mut self) {
        self.prepared_id = 0;
        self.columns.clear();
        self.text_fallback = false;
    }
}
