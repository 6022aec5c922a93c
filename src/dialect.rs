//! Dialect rules for the two supported SQL type systems
//!
//! The session runs in one of two dialects: the native MySQL-family dialect
//! or the Oracle-compatible emulation mode. Everything that varies between
//! them (wire type-tag mapping, literal quoting, identifier quoting, the
//! error codes carried by narrowing-coercion failures, fixed-width CHAR read
//! semantics) lives behind the [`DialectRules`] trait, selected once per
//! session and passed explicitly to the coercion matrix and the dispatcher.

use crate::constants::{error_code, FieldType};
use crate::row::Value;

/// Capability interface for per-dialect behavior
pub trait DialectRules: std::fmt::Debug + Send {
    /// Short name for diagnostics
    fn name(&self) -> &'static str;

    /// Wire type tag used when binding this value through the binary protocol
    fn bind_type_tag(&self, value: &Value) -> FieldType;

    /// Error code carried by a numeric narrowing overflow
    fn overflow_code(&self) -> u16;

    /// Error code carried by a character-length overflow
    fn length_overflow_code(&self) -> u16;

    /// Quote an identifier for generated DML
    fn quote_identifier(&self, ident: &str) -> String;

    /// Render a string as a quoted SQL literal
    fn quote_string_literal(&self, s: &str) -> String;

    /// Render a byte array as a SQL literal
    fn bytes_literal(&self, bytes: &[u8]) -> String;
}

/// Native MySQL-family dialect
#[derive(Debug, Default)]
pub struct MySqlDialect;

/// Oracle-compatible emulation dialect
#[derive(Debug, Default)]
pub struct OracleModeDialect;

fn common_bind_type_tag(value: &Value) -> FieldType {
    match value {
        Value::Null => FieldType::Null,
        Value::Int(_) => FieldType::LongLong,
        Value::UInt(_) => FieldType::LongLong,
        Value::Float(_) => FieldType::Float,
        Value::Double(_) => FieldType::Double,
        Value::Decimal(_) => FieldType::NewDecimal,
        Value::Text(_) => FieldType::VarString,
        Value::Bytes(_) => FieldType::Blob,
        Value::DateTime(_) => FieldType::DateTime,
        Value::IntervalYearMonth(_) => FieldType::VarString,
        Value::IntervalDayTime(_) => FieldType::Time,
        Value::Struct(_) => FieldType::VarString,
        Value::Array(_) => FieldType::VarString,
        Value::Lob(_) => FieldType::LongBlob,
    }
}

fn escape_single_quotes(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    for ch in s.chars() {
        match ch {
            '\'' => out.push_str("''"),
            '\\' => out.push_str("\\\\"),
            _ => out.push(ch),
        }
    }
    out
}

impl DialectRules for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn bind_type_tag(&self, value: &Value) -> FieldType {
        common_bind_type_tag(value)
    }

    fn overflow_code(&self) -> u16 {
        error_code::MYSQL_OUT_OF_RANGE
    }

    fn length_overflow_code(&self) -> u16 {
        error_code::MYSQL_DATA_TOO_LONG
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("`{}`", ident.replace('`', "``"))
    }

    fn quote_string_literal(&self, s: &str) -> String {
        format!("'{}'", escape_single_quotes(s))
    }

    fn bytes_literal(&self, bytes: &[u8]) -> String {
        let mut out = String::with_capacity(bytes.len() * 2 + 3);
        out.push_str("x'");
        for b in bytes {
            out.push_str(&format!("{:02x}", b));
        }
        out.push('\'');
        out
    }
}

impl DialectRules for OracleModeDialect {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn bind_type_tag(&self, value: &Value) -> FieldType {
        match value {
            // Oracle mode has no native unsigned types; everything numeric
            // travels as NUMBER text to preserve precision
            Value::Decimal(_) | Value::UInt(_) => FieldType::NewDecimal,
            v => common_bind_type_tag(v),
        }
    }

    fn overflow_code(&self) -> u16 {
        error_code::ORACLE_NUMERIC_OVERFLOW
    }

    fn length_overflow_code(&self) -> u16 {
        error_code::ORACLE_VALUE_TOO_LARGE
    }

    fn quote_identifier(&self, ident: &str) -> String {
        format!("\"{}\"", ident.replace('"', "\"\""))
    }

    fn quote_string_literal(&self, s: &str) -> String {
        // Oracle string literals double embedded quotes and have no backslash escape
        format!("'{}'", s.replace('\'', "''"))
    }

    fn bytes_literal(&self, bytes: &[u8]) -> String {
        let mut out = String::with_capacity(bytes.len() * 2 + 12);
        out.push_str("HEXTORAW('");
        for b in bytes {
            out.push_str(&format!("{:02X}", b));
        }
        out.push_str("')");
        out
    }
}
