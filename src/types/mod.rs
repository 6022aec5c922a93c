//! Typed value representations beyond the primitive scalars
//!
//! Exact decimals, date/time values, the two interval families, structured
//! and array values, and large-object handles.

mod composite;
mod datetime;
mod decimal;
mod interval;
mod lob;

pub use composite::{ArrayValue, DecodePolicy, StructValue};
pub use datetime::{DateTimeValue, TimeZoneSpec};
pub use decimal::Decimal;
pub use interval::{IntervalDayTime, IntervalYearMonth};
pub use lob::{LobContent, LobHandle, LobKind, LobLocator, LobOrigin};
