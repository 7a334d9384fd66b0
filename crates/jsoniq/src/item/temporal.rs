//! Lexical handling and calendar helpers for date, time and dateTime items.

use chrono::{Datelike, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};

use super::duration::LexicalError;

/// Reference day used to place zone-aware times on a timeline.
const REFERENCE_DATE: (i32, u32, u32) = (1972, 12, 31);

// Splits a trailing `Z` / `+hh:mm` / `-hh:mm` zone designator.
fn split_timezone(s: &str) -> Result<(&str, Option<FixedOffset>), LexicalError> {
    if let Some(body) = s.strip_suffix('Z') {
        return Ok((body, FixedOffset::east_opt(0)));
    }
    let bytes = s.as_bytes();
    let n = bytes.len();
    if n >= 6 && (bytes[n - 6] == b'+' || bytes[n - 6] == b'-') && bytes[n - 3] == b':' {
        let hours: i32 = s[n - 5..n - 3].parse().map_err(|_| LexicalError)?;
        let minutes: i32 = s[n - 2..].parse().map_err(|_| LexicalError)?;
        if hours > 14 || minutes > 59 || (hours == 14 && minutes != 0) {
            return Err(LexicalError);
        }
        let mut secs = hours * 3600 + minutes * 60;
        if bytes[n - 6] == b'-' {
            secs = -secs;
        }
        let tz = FixedOffset::east_opt(secs).ok_or(LexicalError)?;
        return Ok((&s[..n - 6], Some(tz)));
    }
    Ok((s, None))
}

fn check_date_shape(s: &str) -> Result<(), LexicalError> {
    let digits = s.strip_prefix('-').unwrap_or(s);
    let parts: Vec<&str> = digits.split('-').collect();
    if parts.len() != 3 || parts[0].len() < 4 || parts[1].len() != 2 || parts[2].len() != 2 {
        return Err(LexicalError);
    }
    if !parts.iter().all(|p| p.bytes().all(|b| b.is_ascii_digit())) {
        return Err(LexicalError);
    }
    Ok(())
}

fn check_time_shape(s: &str) -> Result<(), LexicalError> {
    let (hms, frac) = match s.split_once('.') {
        Some((h, f)) => (h, Some(f)),
        None => (s, None),
    };
    let parts: Vec<&str> = hms.split(':').collect();
    if parts.len() != 3 || parts.iter().any(|p| p.len() != 2 || !p.bytes().all(|b| b.is_ascii_digit())) {
        return Err(LexicalError);
    }
    if let Some(f) = frac
        && (f.is_empty() || !f.bytes().all(|b| b.is_ascii_digit()))
    {
        return Err(LexicalError);
    }
    Ok(())
}

pub fn parse_date(s: &str) -> Result<(NaiveDate, Option<FixedOffset>), LexicalError> {
    let (body, tz) = split_timezone(s.trim())?;
    check_date_shape(body)?;
    let date = NaiveDate::parse_from_str(body, "%Y-%m-%d").map_err(|_| LexicalError)?;
    Ok((date, tz))
}

pub fn parse_time(s: &str) -> Result<(NaiveTime, Option<FixedOffset>), LexicalError> {
    let (body, tz) = split_timezone(s.trim())?;
    check_time_shape(body)?;
    let time = NaiveTime::parse_from_str(body, "%H:%M:%S%.f").map_err(|_| LexicalError)?;
    Ok((time, tz))
}

pub fn parse_date_time(s: &str) -> Result<(NaiveDateTime, Option<FixedOffset>), LexicalError> {
    let (body, tz) = split_timezone(s.trim())?;
    let (date_part, time_part) = body.split_once('T').ok_or(LexicalError)?;
    check_date_shape(date_part)?;
    check_time_shape(time_part)?;
    let date = NaiveDate::parse_from_str(date_part, "%Y-%m-%d").map_err(|_| LexicalError)?;
    let time = NaiveTime::parse_from_str(time_part, "%H:%M:%S%.f").map_err(|_| LexicalError)?;
    Ok((date.and_time(time), tz))
}

pub fn format_timezone(tz: Option<FixedOffset>) -> String {
    let Some(tz) = tz else {
        return String::new();
    };
    let secs = tz.local_minus_utc();
    if secs == 0 {
        return "Z".to_string();
    }
    let sign = if secs < 0 { '-' } else { '+' };
    let abs = secs.abs();
    format!("{sign}{:02}:{:02}", abs / 3600, (abs % 3600) / 60)
}

pub fn format_date(date: NaiveDate, tz: Option<FixedOffset>) -> String {
    format!("{}{}", date.format("%Y-%m-%d"), format_timezone(tz))
}

pub fn format_time(time: NaiveTime, tz: Option<FixedOffset>) -> String {
    format!("{}{}", time.format("%H:%M:%S%.f"), format_timezone(tz))
}

pub fn format_date_time(value: NaiveDateTime, tz: Option<FixedOffset>) -> String {
    format!("{}{}", value.format("%Y-%m-%dT%H:%M:%S%.f"), format_timezone(tz))
}

/// Add `delta_months` to `date`, clamping the day to the end of the target month.
pub fn add_months_saturating(date: NaiveDate, delta_months: i32) -> Option<NaiveDate> {
    let total = date.year().checked_mul(12)?.checked_add(date.month0() as i32)?.checked_add(delta_months)?;
    let year = total.div_euclid(12);
    let month = (total.rem_euclid(12) + 1) as u32;
    let last_day = match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ => {
            let leap = (year % 4 == 0 && year % 100 != 0) || (year % 400 == 0);
            if leap { 29 } else { 28 }
        }
    };
    NaiveDate::from_ymd_opt(year, month, date.day().min(last_day))
}

/// Shift a local date-time by whole months and an exact delta.
pub fn shift_date_time(value: NaiveDateTime, months: i32, delta: TimeDelta) -> Option<NaiveDateTime> {
    let date = add_months_saturating(value.date(), months)?;
    date.and_time(value.time()).checked_add_signed(delta)
}

/// UTC instant of a local value, using `implicit` when the value carries no zone.
pub fn to_instant(value: NaiveDateTime, tz: Option<FixedOffset>, implicit: FixedOffset) -> NaiveDateTime {
    let offset = tz.unwrap_or(implicit).local_minus_utc();
    value - TimeDelta::seconds(i64::from(offset))
}

/// Place a time of day on the reference date so two times can be subtracted.
pub fn time_on_reference_date(time: NaiveTime) -> NaiveDateTime {
    let (y, m, d) = REFERENCE_DATE;
    NaiveDate::from_ymd_opt(y, m, d).map_or(NaiveDateTime::MIN, |date| date.and_time(time))
}
