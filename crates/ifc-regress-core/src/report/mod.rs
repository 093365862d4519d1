pub mod console;
pub mod schema;
pub mod set;

pub use set::ResultSet;

use chrono::{DateTime, TimeZone};

/// Report name prefix used by earlier XbimRegression runs; keeping it lets a
/// new run pick up their reports as its baseline.
pub const DEFAULT_REPORT_PREFIX: &str = "XbimRegression";

pub const REPORT_EXTENSION: &str = "csv";

/// Timestamp layout in report names (`YYYYMMDD-HHmmss`, 24-hour clock).
pub const REPORT_TIMESTAMP_FORMAT: &str = "%Y%m%d-%H%M%S";

pub fn report_file_name<Tz>(prefix: &str, at: &DateTime<Tz>) -> String
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    format!(
        "{}_{}.{}",
        prefix,
        at.format(REPORT_TIMESTAMP_FORMAT),
        REPORT_EXTENSION
    )
}
