use chrono::format::strftime::StrftimeItems;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;
use tracing::warn;

pub fn format_rfc822(datetime: DateTime<Utc>) -> String {
    let format = StrftimeItems::new("%a, %d %b %Y %H:%M:%S %z");
    datetime.format_with_items(format).to_string()
}

/// Parses `date_str` with a strftime `format`.
///
/// Formats with an offset (`%z`, `%:z`) are taken as is. Anything without
/// one is read as a local time in `tz`, and a bare date means midnight.
pub fn parse_custom_date(
    date_str: &str,
    format: &str,
    tz: Tz,
) -> Result<DateTime<Utc>, chrono::ParseError> {
    if let Ok(datetime) = DateTime::parse_from_str(date_str, format) {
        return Ok(datetime.with_timezone(&Utc));
    }

    let naive = match NaiveDateTime::parse_from_str(date_str, format) {
        Ok(naive) => naive,
        Err(err) => match NaiveDate::parse_from_str(date_str, format) {
            Ok(date) => NaiveDateTime::new(date, NaiveTime::MIN),
            Err(_) => return Err(err),
        },
    };

    // A wall time skipped by a DST jump has no mapping; fall back to UTC.
    let local = tz
        .from_local_datetime(&naive)
        .earliest()
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_else(|| naive.and_utc());

    Ok(local)
}

/// Like [`parse_custom_date`], but never fails: unparsable input becomes
/// the current time.
pub fn parse_or_now(date_str: &str, format: &str, tz: Tz) -> DateTime<Utc> {
    match parse_custom_date(date_str, format, tz) {
        Ok(datetime) => datetime,
        Err(err) => {
            warn!(
                date = %date_str,
                format = %format,
                error = %err,
                "failed to parse date, using current time"
            );
            Utc::now()
        }
    }
}
