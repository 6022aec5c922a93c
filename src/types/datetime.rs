//! Date/time values, including the two zoned timestamp forms
//!
//! The wire binary layout is the protocol's variable-length datetime: a
//! length byte (0, 4, 7 or 11) followed by year/month/day, optional
//! hour/minute/second, optional microseconds. Zoned timestamps append either
//! an explicit offset (hours excess-20, minutes excess-60, the idiom used for
//! timezone bytes throughout this family of drivers) or a session-local
//! marker byte.

use crate::buffer::{ReadBuffer, WriteBuffer};
use crate::error::{Error, Result};

/// Time zone attachment of a timestamp value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TimeZoneSpec {
    /// No zone (plain DATETIME)
    #[default]
    None,
    /// Explicit offset from UTC
    Offset {
        /// Hours, -12..=14
        hours: i8,
        /// Minutes, -59..=59 (same sign as hours)
        minutes: i8,
    },
    /// Value is interpreted in the session-local time zone; no offset travels
    /// on the wire
    SessionLocal,
}

/// A date/time value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct DateTimeValue {
    /// Year (e.g. 2024)
    pub year: u16,
    /// Month, 1..=12
    pub month: u8,
    /// Day, 1..=31
    pub day: u8,
    /// Hour, 0..=23
    pub hour: u8,
    /// Minute, 0..=59
    pub minute: u8,
    /// Second, 0..=59
    pub second: u8,
    /// Microseconds, 0..=999_999
    pub microsecond: u32,
    /// Zone attachment
    pub zone: TimeZoneSpec,
}

/// Excess applied to the wire's zone-hour byte
const TZ_HOUR_EXCESS: i16 = 20;
/// Excess applied to the wire's zone-minute byte
const TZ_MINUTE_EXCESS: i16 = 60;
/// Marker byte for the session-local zone form
const TZ_SESSION_LOCAL: u8 = 0xff;

impl DateTimeValue {
    /// Construct with range validation
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
        microsecond: u32,
        zone: TimeZoneSpec,
    ) -> Result<Self> {
        const TYPE: &str = "TIMESTAMP";
        let display = format!(
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
            year, month, day, hour, minute, second, microsecond
        );
        if month == 0 || month > 12 {
            return Err(Error::format(TYPE, display, format!("month {} out of range 1..=12", month)));
        }
        if day == 0 || day > 31 {
            return Err(Error::format(TYPE, display, format!("day {} out of range 1..=31", day)));
        }
        if hour > 23 {
            return Err(Error::format(TYPE, display, format!("hour {} out of range 0..=23", hour)));
        }
        if minute > 59 {
            return Err(Error::format(TYPE, display, format!("minute {} out of range 0..=59", minute)));
        }
        if second > 59 {
            return Err(Error::format(TYPE, display, format!("second {} out of range 0..=59", second)));
        }
        if microsecond > 999_999 {
            return Err(Error::format(
                TYPE,
                display,
                format!("fraction {} out of range 0..=999999", microsecond),
            ));
        }
        if let TimeZoneSpec::Offset { hours, minutes } = zone {
            if !(-12..=14).contains(&hours) || minutes.abs() > 59 {
                return Err(Error::format(
                    TYPE,
                    display,
                    format!("zone offset {:+03}:{:02} out of range", hours, minutes.abs()),
                ));
            }
        }
        Ok(Self {
            year,
            month,
            day,
            hour,
            minute,
            second,
            microsecond,
            zone,
        })
    }

    /// Create a date-only value (time set to 00:00:00)
    pub fn date(year: u16, month: u8, day: u8) -> Result<Self> {
        Self::new(year, month, day, 0, 0, 0, 0, TimeZoneSpec::None)
    }

    /// Whether the value carries any zone attachment
    pub fn has_zone(&self) -> bool {
        self.zone != TimeZoneSpec::None
    }

    /// Parse the canonical text form
    ///
    /// `YYYY-MM-DD[ HH:MM:SS[.F...]][ +HH:MM | LOCAL]`
    pub fn parse(input: &str) -> Result<Self> {
        const TYPE: &str = "TIMESTAMP";
        let trimmed = input.trim();

        let mut zone = TimeZoneSpec::None;
        let mut body = trimmed;
        if let Some(stripped) = trimmed.strip_suffix(" LOCAL") {
            zone = TimeZoneSpec::SessionLocal;
            body = stripped;
        } else if trimmed.len() > 6 && trimmed.is_char_boundary(trimmed.len() - 6) {
            let tail = &trimmed[trimmed.len() - 6..];
            let tb = tail.as_bytes();
            if (tb[0] == b'+' || tb[0] == b'-') && tb[3] == b':' {
                let hours: i8 = tail[..3]
                    .parse()
                    .map_err(|_| Error::format(TYPE, input, "malformed zone offset"))?;
                let minutes_abs: i8 = tail[4..]
                    .parse()
                    .map_err(|_| Error::format(TYPE, input, "malformed zone offset"))?;
                let minutes = if hours < 0 { -minutes_abs } else { minutes_abs };
                zone = TimeZoneSpec::Offset { hours, minutes };
                body = trimmed[..trimmed.len() - 6].trim_end();
            }
        }

        let (date_s, time_s) = match body.split_once(' ') {
            Some((d, t)) => (d, Some(t)),
            None => (body, None),
        };

        let mut date_parts = date_s.splitn(3, '-');
        let year = date_part(date_parts.next(), "year", input)?;
        let month = date_part(date_parts.next(), "month", input)?;
        let day = date_part(date_parts.next(), "day", input)?;

        let (mut hour, mut minute, mut second, mut micro) = (0u32, 0u32, 0u32, 0u32);
        if let Some(t) = time_s {
            let mut tp = t.splitn(3, ':');
            hour = date_part(tp.next(), "hour", input)?;
            minute = date_part(tp.next(), "minute", input)?;
            let sec_full = tp
                .next()
                .ok_or_else(|| Error::format(TYPE, input, "missing second field"))?;
            let (sec_s, frac_s) = match sec_full.split_once('.') {
                Some((s, f)) => (s, Some(f)),
                None => (sec_full, None),
            };
            second = date_part(Some(sec_s), "second", input)?;
            if let Some(f) = frac_s {
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
                micro = padded
                    .parse()
                    .map_err(|_| Error::format(TYPE, input, "fraction is not numeric"))?;
            }
        }

        if year > u16::MAX as u32 || month > 255 || day > 255 || hour > 255 || minute > 255 || second > 255 {
            return Err(Error::format(TYPE, input, "field value too large"));
        }
        Self::new(
            year as u16,
            month as u8,
            day as u8,
            hour as u8,
            minute as u8,
            second as u8,
            micro,
            zone,
        )
    }

    /// Encode the wire binary form
    ///
    /// Length byte then fields; zoned values always carry the full 11-byte
    /// body plus the zone bytes.
    pub fn encode(&self, buf: &mut WriteBuffer) -> Result<()> {
        let zone_len: u8 = match self.zone {
            TimeZoneSpec::None => 0,
            TimeZoneSpec::Offset { .. } => 2,
            TimeZoneSpec::SessionLocal => 1,
        };
        let body_len: u8 = if zone_len > 0 || self.microsecond != 0 {
            11
        } else if self.hour != 0 || self.minute != 0 || self.second != 0 {
            7
        } else {
            4
        };
        buf.write_u8(body_len + zone_len)?;
        buf.write_u16_le(self.year)?;
        buf.write_u8(self.month)?;
        buf.write_u8(self.day)?;
        if body_len >= 7 {
            buf.write_u8(self.hour)?;
            buf.write_u8(self.minute)?;
            buf.write_u8(self.second)?;
        }
        if body_len == 11 {
            buf.write_u32_le(self.microsecond)?;
        }
        match self.zone {
            TimeZoneSpec::None => {}
            TimeZoneSpec::Offset { hours, minutes } => {
                buf.write_u8((hours as i16 + TZ_HOUR_EXCESS) as u8)?;
                buf.write_u8((minutes as i16 + TZ_MINUTE_EXCESS) as u8)?;
            }
            TimeZoneSpec::SessionLocal => {
                buf.write_u8(TZ_SESSION_LOCAL)?;
            }
        }
        Ok(())
    }

    /// Decode the wire binary form
    pub fn decode(buf: &mut ReadBuffer) -> Result<Self> {
        let len = buf.read_u8()?;
        if len == 0 {
            return Self::new(0, 1, 1, 0, 0, 0, 0, TimeZoneSpec::None);
        }
        if !matches!(len, 4 | 7 | 11 | 12 | 13) {
            return Err(Error::Protocol(format!("invalid datetime length byte {}", len)));
        }
        let year = buf.read_u16_le()?;
        let month = buf.read_u8()?;
        let day = buf.read_u8()?;
        let (mut hour, mut minute, mut second, mut micro) = (0, 0, 0, 0);
        if len >= 7 {
            hour = buf.read_u8()?;
            minute = buf.read_u8()?;
            second = buf.read_u8()?;
        }
        if len >= 11 {
            micro = buf.read_u32_le()?;
        }
        let zone = match len {
            12 => {
                let marker = buf.read_u8()?;
                if marker != TZ_SESSION_LOCAL {
                    return Err(Error::Protocol(format!(
                        "invalid session-local zone marker {:#04x}",
                        marker
                    )));
                }
                TimeZoneSpec::SessionLocal
            }
            13 => {
                let hours = buf.read_u8()? as i16 - TZ_HOUR_EXCESS;
                let minutes = buf.read_u8()? as i16 - TZ_MINUTE_EXCESS;
                TimeZoneSpec::Offset {
                    hours: hours as i8,
                    minutes: minutes as i8,
                }
            }
            _ => TimeZoneSpec::None,
        };
        Self::new(year, month, day, hour, minute, second, micro, zone)
    }
}

fn date_part(part: Option<&str>, field: &str, input: &str) -> Result<u32> {
    let s = part.ok_or_else(|| {
        Error::format("TIMESTAMP", input, format!("missing {} field", field))
    })?;
    if s.is_empty() || !s.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::format(
            "TIMESTAMP",
            input,
            format!("{} field {:?} is not numeric", field, s),
        ));
    }
    s.parse()
        .map_err(|_| Error::format("TIMESTAMP", input, format!("{} field {:?} too large", field, s)))
}

impl std::fmt::Display for DateTimeValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{:04}-{:02}-{:02} {:02}:{:02}:{:02}.{:06}",
            self.year, self.month, self.day, self.hour, self.minute, self.second, self.microsecond
        )?;
        match self.zone {
            TimeZoneSpec::None => Ok(()),
            TimeZoneSpec::Offset { hours, minutes } => {
                write!(f, " {:+03}:{:02}", hours, minutes.abs())
            }
            TimeZoneSpec::SessionLocal => write!(f, " LOCAL"),
        }
    }
}
