//! Time/date resolution: ambiguous user tokens → absolute UTC instant.
//!
//! Pure functions throughout — identical inputs always produce identical
//! output, which is what makes the same-day/next-day rule testable and lets
//! confirmations re-derive the local rendering safely.

use chrono::{DateTime, Datelike, Duration, LocalResult, NaiveDate, NaiveTime, TimeZone, Utc};
use chrono_tz::Tz;

use crate::error::{CommandError, Result};

/// Resolve `(time_token, date_token?, timezone_id, now)` to a UTC instant.
///
/// Without a date token, applies the same-day/next-day rule: if the wall
/// clock at `time_token` is still ahead of the owner's current wall clock
/// today, schedule today; otherwise tomorrow. The comparison happens in the
/// owner's timezone, not UTC — a user in Tokyo at 5 a.m. scheduling `at 6am`
/// gets today even though UTC is still on yesterday's date.
///
/// With an explicit date, an instant that is not strictly in the future is
/// rejected with [`CommandError::PastInstant`].
pub fn resolve(
    time_token: &str,
    date_token: Option<&str>,
    timezone_id: &str,
    now_utc: DateTime<Utc>,
) -> Result<DateTime<Utc>> {
    let tz: Tz = timezone_id
        .parse()
        .map_err(|_| CommandError::InvalidTimezone(timezone_id.to_string()))?;
    let (hour, minute) = parse_time_token(time_token)?;
    let time = NaiveTime::from_hms_opt(hour, minute, 0)
        .ok_or_else(|| CommandError::InvalidTimeFormat(time_token.to_string()))?;
    let now_local = now_utc.with_timezone(&tz);

    match date_token {
        Some(tok) => {
            let date = parse_date_token(tok, now_local.year())?;
            let at = local_to_utc(tz, date, time)
                .ok_or_else(|| CommandError::InvalidDateFormat(tok.to_string()))?;
            if at <= now_utc {
                return Err(CommandError::PastInstant);
            }
            Ok(at)
        }
        None => {
            let today = now_local.date_naive();
            if let Some(candidate) = local_to_utc(tz, today, time) {
                if candidate > now_utc {
                    return Ok(candidate);
                }
            }
            let tomorrow = today
                .succ_opt()
                .ok_or_else(|| CommandError::InvalidDateFormat("date overflow".into()))?;
            local_to_utc(tz, tomorrow, time)
                .ok_or_else(|| CommandError::InvalidTimeFormat(time_token.to_string()))
        }
    }
}

/// Interpret a local wall-clock date+time in `tz`, using the offset in force
/// on that calendar date.
///
/// DST handling: an ambiguous wall clock (fall-back hour occurs twice) takes
/// the first occurrence; a nonexistent wall clock (spring-forward gap) is
/// shifted forward by the skipped hour.
fn local_to_utc(tz: Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Utc>> {
    let naive = date.and_time(time);
    match tz.from_local_datetime(&naive) {
        LocalResult::Single(dt) => Some(dt.with_timezone(&Utc)),
        LocalResult::Ambiguous(first, _) => Some(first.with_timezone(&Utc)),
        LocalResult::None => {
            let shifted = naive + Duration::hours(1);
            tz.from_local_datetime(&shifted)
                .earliest()
                .map(|dt| dt.with_timezone(&Utc))
        }
    }
}

/// Parse `HH:MM` (24-hour) or `H[:MM](am|pm)` into (hour, minute).
fn parse_time_token(tok: &str) -> Result<(u32, u32)> {
    let invalid = || CommandError::InvalidTimeFormat(tok.to_string());
    let lower = tok.to_ascii_lowercase();

    if let Some(body) = lower
        .strip_suffix("am")
        .or_else(|| lower.strip_suffix("pm"))
    {
        let pm = lower.ends_with("pm");
        let (h_str, m_str) = match body.split_once(':') {
            Some((h, m)) => (h, Some(m)),
            None => (body, None),
        };
        let hour12 = parse_digits(h_str, 1, 2).ok_or_else(invalid)?;
        if !(1..=12).contains(&hour12) {
            return Err(invalid());
        }
        let minute = match m_str {
            Some(m) => parse_digits(m, 2, 2).ok_or_else(invalid)?,
            None => 0,
        };
        if minute > 59 {
            return Err(invalid());
        }
        let hour = match (hour12, pm) {
            (12, false) => 0,
            (12, true) => 12,
            (h, false) => h,
            (h, true) => h + 12,
        };
        Ok((hour, minute))
    } else {
        let (h_str, m_str) = lower.split_once(':').ok_or_else(invalid)?;
        let hour = parse_digits(h_str, 1, 2).ok_or_else(invalid)?;
        let minute = parse_digits(m_str, 2, 2).ok_or_else(invalid)?;
        if hour > 23 || minute > 59 {
            return Err(invalid());
        }
        Ok((hour, minute))
    }
}

/// Parse `YYYY-MM-DD`, or `MM/DD` with the year taken from the owner's
/// current year. Impossible calendar dates are rejected.
fn parse_date_token(tok: &str, current_year: i32) -> Result<NaiveDate> {
    let invalid = || CommandError::InvalidDateFormat(tok.to_string());

    if tok.contains('-') {
        let mut parts = tok.splitn(3, '-');
        let y = parts.next().ok_or_else(invalid)?;
        let m = parts.next().ok_or_else(invalid)?;
        let d = parts.next().ok_or_else(invalid)?;
        if y.len() != 4 {
            return Err(invalid());
        }
        let year: i32 = y.parse().map_err(|_| invalid())?;
        let month = parse_digits(m, 1, 2).ok_or_else(invalid)?;
        let day = parse_digits(d, 1, 2).ok_or_else(invalid)?;
        NaiveDate::from_ymd_opt(year, month, day).ok_or_else(invalid)
    } else if let Some((m, d)) = tok.split_once('/') {
        let month = parse_digits(m, 1, 2).ok_or_else(invalid)?;
        let day = parse_digits(d, 1, 2).ok_or_else(invalid)?;
        NaiveDate::from_ymd_opt(current_year, month, day).ok_or_else(invalid)
    } else {
        Err(invalid())
    }
}

fn parse_digits(s: &str, min_len: usize, max_len: usize) -> Option<u32> {
    if s.len() < min_len || s.len() > max_len || !s.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    s.parse().ok()
}
