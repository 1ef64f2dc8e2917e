//! Resolution of a form's local date and time into an absolute instant.

use chrono::{DateTime, Duration, LocalResult, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

/// Resolve `date` (`YYYY-MM-DD`) and `time` (`HH:MM[:SS]`) in `zone`.
///
/// A repeated wall time (clocks going back) takes the earlier instant. A
/// skipped wall time (clocks going forward) is moved one hour later.
pub fn resolve_local(date: &str, time: &str, zone: Tz) -> Result<DateTime<Utc>, String> {
    let date = NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
        .map_err(|_| format!("Invalid schedule date: {date}"))?;
    let time = NaiveTime::parse_from_str(time.trim(), "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(time.trim(), "%H:%M:%S"))
        .map_err(|_| format!("Invalid schedule time: {time}"))?;
    resolve_naive(date.and_time(time), zone)
}

fn resolve_naive(local: NaiveDateTime, zone: Tz) -> Result<DateTime<Utc>, String> {
    let resolved = match zone.from_local_datetime(&local) {
        LocalResult::Single(t) => Some(t),
        LocalResult::Ambiguous(earlier, _) => Some(earlier),
        LocalResult::None => zone
            .from_local_datetime(&(local + Duration::hours(1)))
            .earliest(),
    };
    resolved
        .map(|t| t.with_timezone(&Utc))
        .ok_or_else(|| format!("{local} does not exist in {zone}"))
}
