//! The on-read type-coercion matrix
//!
//! Every accessor view of a stored value is derived here from its canonical
//! representation. The rules:
//!
//! - narrowing numeric coercions fail with [`Error::Overflow`] (carrying the
//!   session dialect's error code) when the value exceeds the target's range;
//!   they never silently wrap
//! - string coercion of NULL yields NULL, not an error
//! - fixed-width CHAR columns pad on read to their declared width with
//!   trailing spaces, regardless of how many bytes were stored
//! - decimal-to-floating coercion is lossy by design; decimal-to-string
//!   preserves the stored scale exactly

use crate::dialect::DialectRules;
use crate::error::{Error, Result};
use crate::row::Value;
use crate::statement::ColumnInfo;
use crate::types::{DateTimeValue, Decimal, IntervalDayTime, IntervalYearMonth};

/// Coercion target types
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlType {
    /// 1-byte signed integer
    TinyInt,
    /// 2-byte signed integer
    SmallInt,
    /// 4-byte signed integer
    Int,
    /// 8-byte signed integer
    BigInt,
    /// 4-byte float
    Float,
    /// 8-byte float
    Double,
    /// Exact decimal
    Decimal,
    /// Character data
    Varchar,
    /// Binary data
    Bytes,
    /// Date/time
    Timestamp,
    /// Interval, year-to-month
    IntervalYearMonth,
    /// Interval, day-to-second
    IntervalDayTime,
}

impl SqlType {
    /// Name used in conversion errors
    pub fn name(self) -> &'static str {
        match self {
            SqlType::TinyInt => "TINYINT",
            SqlType::SmallInt => "SMALLINT",
            SqlType::Int => "INT",
            SqlType::BigInt => "BIGINT",
            SqlType::Float => "FLOAT",
            SqlType::Double => "DOUBLE",
            SqlType::Decimal => "DECIMAL",
            SqlType::Varchar => "VARCHAR",
            SqlType::Bytes => "BYTES",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::IntervalYearMonth => "INTERVAL YEAR TO MONTH",
            SqlType::IntervalDayTime => "INTERVAL DAY TO SECOND",
        }
    }

    fn integer_range(self) -> Option<(i64, i64)> {
        match self {
            SqlType::TinyInt => Some((i8::MIN as i64, i8::MAX as i64)),
            SqlType::SmallInt => Some((i16::MIN as i64, i16::MAX as i64)),
            SqlType::Int => Some((i32::MIN as i64, i32::MAX as i64)),
            SqlType::BigInt => Some((i64::MIN, i64::MAX)),
            _ => None,
        }
    }
}

/// Coerce a stored value to the requested target type
///
/// `column` supplies declared-width metadata when the value came from a
/// result column (CHAR padding); pass `None` for detached values.
pub fn coerce(
    value: &Value,
    target: SqlType,
    column: Option<&ColumnInfo>,
    dialect: &dyn DialectRules,
) -> Result<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match target {
        SqlType::TinyInt | SqlType::SmallInt | SqlType::Int | SqlType::BigInt => {
            coerce_integer(value, target, dialect)
        }
        SqlType::Float => Ok(Value::Float(to_double(value, target)? as f32)),
        SqlType::Double => Ok(Value::Double(to_double(value, target)?)),
        SqlType::Decimal => coerce_decimal(value, target),
        SqlType::Varchar => coerce_string(value, column),
        SqlType::Bytes => coerce_bytes(value, target),
        SqlType::Timestamp => coerce_timestamp(value, target),
        SqlType::IntervalYearMonth => coerce_interval_ym(value, target),
        SqlType::IntervalDayTime => coerce_interval_ds(value, target),
    }
}

fn overflow(value: impl std::fmt::Display, target: SqlType, dialect: &dyn DialectRules) -> Error {
    Error::Overflow {
        value: value.to_string(),
        target: target.name(),
        code: dialect.overflow_code(),
    }
}

fn conversion(value: &Value, target: SqlType) -> Error {
    Error::Conversion {
        from: value.type_name(),
        to: target.name(),
    }
}

fn coerce_integer(value: &Value, target: SqlType, dialect: &dyn DialectRules) -> Result<Value> {
    let (min, max) = target
        .integer_range()
        .ok_or_else(|| Error::Internal(format!("{} is not an integer target", target.name())))?;
    let v: i64 = match value {
        Value::Int(i) => *i,
        Value::UInt(u) => {
            i64::try_from(*u).map_err(|_| overflow(u, target, dialect))?
        }
        Value::Decimal(d) => d
            .to_i64()
            .ok_or_else(|| overflow(d, target, dialect))?,
        Value::Float(f) => float_to_i64(*f as f64, value, target, dialect)?,
        Value::Double(f) => float_to_i64(*f, value, target, dialect)?,
        Value::Text(s) => {
            let d = Decimal::parse(s.trim())?;
            d.to_i64().ok_or_else(|| overflow(&d, target, dialect))?
        }
        _ => return Err(conversion(value, target)),
    };
    if v < min || v > max {
        return Err(overflow(v, target, dialect));
    }
    Ok(Value::Int(v))
}

fn float_to_i64(f: f64, value: &Value, target: SqlType, dialect: &dyn DialectRules) -> Result<i64> {
    if !f.is_finite() {
        return Err(conversion(value, target));
    }
    let truncated = f.trunc();
    if truncated < i64::MIN as f64 || truncated > i64::MAX as f64 {
        return Err(overflow(f, target, dialect));
    }
    Ok(truncated as i64)
}

fn to_double(value: &Value, target: SqlType) -> Result<f64> {
    match value {
        Value::Int(i) => Ok(*i as f64),
        Value::UInt(u) => Ok(*u as f64),
        Value::Float(f) => Ok(*f as f64),
        Value::Double(f) => Ok(*f),
        // lossy by design
        Value::Decimal(d) => Ok(d.to_f64()),
        Value::Text(s) => s
            .trim()
            .parse()
            .map_err(|_| Error::format("DOUBLE", s.clone(), "not a numeric literal")),
        _ => Err(conversion(value, target)),
    }
}

fn coerce_decimal(value: &Value, target: SqlType) -> Result<Value> {
    let d = match value {
        Value::Decimal(d) => d.clone(),
        Value::Int(i) => Decimal::from_i64(*i),
        Value::UInt(u) => Decimal::parse(&u.to_string())?,
        Value::Float(f) => Decimal::parse(&format!("{}", f))?,
        Value::Double(f) => Decimal::parse(&format!("{}", f))?,
        Value::Text(s) => Decimal::parse(s.trim())?,
        _ => return Err(conversion(value, target)),
    };
    Ok(Value::Decimal(d))
}

fn coerce_string(value: &Value, column: Option<&ColumnInfo>) -> Result<Value> {
    let mut s = match value {
        Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        Value::Lob(_) => {
            return Err(Error::NotSupported(
                "LOB content is read through openLob, not string coercion".to_string(),
            ))
        }
        // Display renders every canonical form (decimal keeps its stored scale)
        other => other.to_string(),
    };
    if let Some(col) = column {
        if col.is_fixed_char() {
            let declared = col.length as usize;
            let stored = s.chars().count();
            if stored < declared {
                s.extend(std::iter::repeat(' ').take(declared - stored));
            }
        }
    }
    Ok(Value::Text(s))
}

fn coerce_bytes(value: &Value, target: SqlType) -> Result<Value> {
    match value {
        Value::Bytes(b) => Ok(Value::Bytes(b.clone())),
        Value::Text(s) => Ok(Value::Bytes(bytes::Bytes::copy_from_slice(s.as_bytes()))),
        _ => Err(conversion(value, target)),
    }
}

fn coerce_timestamp(value: &Value, target: SqlType) -> Result<Value> {
    match value {
        Value::DateTime(dt) => Ok(Value::DateTime(*dt)),
        Value::Text(s) => Ok(Value::DateTime(DateTimeValue::parse(s)?)),
        _ => Err(conversion(value, target)),
    }
}

fn coerce_interval_ym(value: &Value, target: SqlType) -> Result<Value> {
    match value {
        Value::IntervalYearMonth(iv) => Ok(Value::IntervalYearMonth(*iv)),
        Value::Text(s) => Ok(Value::IntervalYearMonth(IntervalYearMonth::parse(s)?)),
        _ => Err(conversion(value, target)),
    }
}

fn coerce_interval_ds(value: &Value, target: SqlType) -> Result<Value> {
    match value {
        Value::IntervalDayTime(iv) => Ok(Value::IntervalDayTime(*iv)),
        Value::Text(s) => Ok(Value::IntervalDayTime(IntervalDayTime::parse(s)?)),
        _ => Err(conversion(value, target)),
    }
}
