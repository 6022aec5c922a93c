//! Interval values for the Oracle-compatible dialect
//!
//! Two families: year-to-month and day-to-second. Parsing is strict: each
//! field is range-checked (months 0..=11, hours 0..=23, minutes and seconds
//! 0..=59) and ill-formed input fails with a `Format` error naming the
//! offending field rather than silently truncating.
//!
//! Canonical text forms:
//! - year-to-month: `+YY-MM` (e.g. `+2-03`)
//! - day-to-second: `+D HH:MM:SS.FFFFFF` (e.g. `+100 00:01:02.022200`)
//!
//! The binary forms follow the wire's little-endian time layout: a sign
//! byte followed by the fixed-width fields.

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::error::{Error, Result};

/// An INTERVAL YEAR TO MONTH value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalYearMonth {
    /// Whether the interval is negative
    pub negative: bool,
    /// Whole years
    pub years: u32,
    /// Months within the year, 0..=11
    pub months: u8,
}

impl IntervalYearMonth {
    /// Construct with range validation
    pub fn new(negative: bool, years: u32, months: u8) -> Result<Self> {
        if months > 11 {
            return Err(Error::format(
                "INTERVAL YEAR TO MONTH",
                format!("{}-{}", years, months),
                format!("month {} out of range 0..=11", months),
            ));
        }
        Ok(Self {
            negative: negative && (years != 0 || months != 0),
            years,
            months,
        })
    }

    /// Parse the canonical text form `[+-]YY-MM`
    pub fn parse(input: &str) -> Result<Self> {
        let trimmed = input.trim();
        let (negative, rest) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            Some(_) => (false, trimmed),
            None => return Err(Error::format("INTERVAL YEAR TO MONTH", input, "empty literal")),
        };

        let (years_s, months_s) = rest.split_once('-').ok_or_else(|| {
            Error::format("INTERVAL YEAR TO MONTH", input, "expected YY-MM form")
        })?;
        let years: u32 = parse_field(years_s, "year", input, "INTERVAL YEAR TO MONTH")?;
        let months: u32 = parse_field(months_s, "month", input, "INTERVAL YEAR TO MONTH")?;
        if months > 11 {
            return Err(Error::format(
                "INTERVAL YEAR TO MONTH",
                input,
                format!("month {} out of range 0..=11", months),
            ));
        }
        Ok(Self {
            negative: negative && (years != 0 || months != 0),
            years,
            months: months as u8,
        })
    }

    /// Return the same magnitude with the sign flipped
    pub fn negated(&self) -> Self {
        Self {
            negative: !self.negative && (self.years != 0 || self.months != 0),
            ..*self
        }
    }

    /// Encode the fixed-width binary form: sign byte, years u32, months u8
    pub fn encode(&self, buf: &mut WriteBuffer) -> Result<()> {
        buf.write_u8(if self.negative { 1 } else { 0 })?;
        buf.write_u32_le(self.years)?;
        buf.write_u8(self.months)
    }

    /// Decode the fixed-width binary form
    pub fn decode(buf: &mut ReadBuffer) -> Result<Self> {
        let negative = buf.read_u8()? != 0;
        let years = buf.read_u32_le()?;
        let months = buf.read_u8()?;
        Self::new(negative, years, months)
    }
}

impl std::fmt::Display for IntervalYearMonth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{}-{:02}",
            if self.negative { '-' } else { '+' },
            self.years,
            self.months
        )
    }
}

/// An INTERVAL DAY TO SECOND value
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntervalDayTime {
    /// Whether the interval is negative
    pub negative: bool,
    /// Whole days
    pub days: u32,
    /// Hours within the day, 0..=23
    pub hours: u8,
    /// Minutes, 0..=59
    pub minutes: u8,
    /// Seconds, 0..=59
    pub seconds: u8,
    /// Fractional seconds in microseconds, 0..=999_999
    pub microseconds: u32,
}

impl IntervalDayTime {
    /// Construct with range validation
    pub fn new(
        negative: bool,
        days: u32,
        hours: u8,
        minutes: u8,
        seconds: u8,
        microseconds: u32,
    ) -> Result<Self> {
        let display = format!("{} {}:{}:{}.{}", days, hours, minutes, seconds, microseconds);
        if hours > 23 {
            return Err(Error::format(
                "INTERVAL DAY TO SECOND",
                display,
                format!("hour {} out of range 0..=23", hours),
            ));
        }
        if minutes > 59 {
            return Err(Error::format(
                "INTERVAL DAY TO SECOND",
                display,
                format!("minute {} out of range 0..=59", minutes),
            ));
        }
        if seconds > 59 {
            return Err(Error::format(
                "INTERVAL DAY TO SECOND",
                display,
                format!("second {} out of range 0..=59", seconds),
            ));
        }
        if microseconds > 999_999 {
            return Err(Error::format(
                "INTERVAL DAY TO SECOND",
                display,
                format!("fraction {} out of range 0..=999999", microseconds),
            ));
        }
        let zero = days == 0 && hours == 0 && minutes == 0 && seconds == 0 && microseconds == 0;
        Ok(Self {
            negative: negative && !zero,
            days,
            hours,
            minutes,
            seconds,
            microseconds,
        })
    }

    /// Parse the text form `[+-]D HH:MM:SS[.F...]`
    ///
    /// Field widths are flexible on input (`0:1:2.0222` is accepted); the
    /// canonical rendering is fixed-width with a six-digit fraction.
    pub fn parse(input: &str) -> Result<Self> {
        const TYPE: &str = "INTERVAL DAY TO SECOND";
        let trimmed = input.trim();
        let (negative, rest) = match trimmed.as_bytes().first() {
            Some(b'-') => (true, &trimmed[1..]),
            Some(b'+') => (false, &trimmed[1..]),
            Some(_) => (false, trimmed),
            None => return Err(Error::format(TYPE, input, "empty literal")),
        };

        let (days_s, time_s) = rest
            .split_once(' ')
            .ok_or_else(|| Error::format(TYPE, input, "expected D HH:MM:SS form"))?;
        let days: u32 = parse_field(days_s, "day", input, TYPE)?;

        let mut time_parts = time_s.splitn(3, ':');
        let hours_s = time_parts
            .next()
            .ok_or_else(|| Error::format(TYPE, input, "missing hour field"))?;
        let minutes_s = time_parts
            .next()
            .ok_or_else(|| Error::format(TYPE, input, "missing minute field"))?;
        let seconds_full = time_parts
            .next()
            .ok_or_else(|| Error::format(TYPE, input, "missing second field"))?;

        let (seconds_s, fraction_s) = match seconds_full.split_once('.') {
            Some((s, f)) => (s, Some(f)),
            None => (seconds_full, None),
        };

        let hours: u32 = parse_field(hours_s, "hour", input, TYPE)?;
        if hours > 23 {
            return Err(Error::format(
                TYPE,
                input,
                format!("hour {} out of range 0..=23", hours),
            ));
        }
        let minutes: u32 = parse_field(minutes_s, "minute", input, TYPE)?;
        if minutes > 59 {
            return Err(Error::format(
                TYPE,
                input,
                format!("minute {} out of range 0..=59", minutes),
            ));
        }
        let seconds: u32 = parse_field(seconds_s, "second", input, TYPE)?;
        if seconds > 59 {
            return Err(Error::format(
                TYPE,
                input,
                format!("second {} out of range 0..=59", seconds),
            ));
        }

        let microseconds = match fraction_s {
            None => 0,
            Some(f) => {
                if f.is_empty() || f.len() > 6 || !f.bytes().all(|b| b.is_ascii_digit()) {
                    return Err(Error::format(
                        TYPE,
                        input,
                        format!("fraction {:?} must be 1 to 6 digits", f),
                    ));
                }
                let mut padded = f.to_string();
                while padded.len() < 6 {
                    padded.push('0');
                }
                padded.parse::<u32>().map_err(|_| {
                    Error::format(TYPE, input, format!("fraction {:?} is not numeric", f))
                })?
            }
        };

        Self::new(
            negative,
            days,
            hours as u8,
            minutes as u8,
            seconds as u8,
            microseconds,
        )
    }

    /// Return the same magnitude with the sign flipped
    pub fn negated(&self) -> Self {
        let zero = self.days == 0
            && self.hours == 0
            && self.minutes == 0
            && self.seconds == 0
            && self.microseconds == 0;
        Self {
            negative: !self.negative && !zero,
            ..*self
        }
    }

    /// Encode the wire time layout: sign byte, days u32, h/m/s, micros u32
    pub fn encode(&self, buf: &mut WriteBuffer) -> Result<()> {
        buf.write_u8(if self.negative { 1 } else { 0 })?;
        buf.write_u32_le(self.days)?;
        buf.write_u8(self.hours)?;
        buf.write_u8(self.minutes)?;
        buf.write_u8(self.seconds)?;
        buf.write_u32_le(self.microseconds)
    }

    /// Decode the wire time layout
    pub fn decode(buf: &mut ReadBuffer) -> Result<Self> {
        let negative = buf.read_u8()? != 0;
        let days = buf.read_u32_le()?;
        let hours = buf.read_u8()?;
        let minutes = buf.read_u8()?;
        let seconds = buf.read_u8()?;
        let microseconds = buf.read_u32_le()?;
        Self::new(negative, days, hours, minutes, seconds, microseconds)
    }
}

impl std::fmt::Display for IntervalDayTime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}{} {:02}:{:02}:{:02}.{:06}",
            if self.negative { '-' } else { '+' },
            self.days,
            self.hours,
            self.minutes,
            self.seconds,
            self.microseconds
        )
    }
}

fn parse_field(s: &str, field: &str, input: &str, type_name: &'static str) -> Result<u32> {
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::format(
            type_name,
            input,
            format!("{} field {:?} is not numeric", field, s),
        ));
    }
    s.parse()
        .map_err(|_| Error::format(type_name, input, format!("{} field {:?} too large", field, s)))
}
