//! Date restriction parsing.
//!
//! A date restriction is `<range-op><value>` where the value is either a
//! 4-to-14-digit ANSI date prefix (`YYYY[MM[DD[HH[MM[SS]]]]]`) or a
//! natural-language name like `today`, `lastweek`, `monday`, `january`.
//! Values normalize to a packed 14-digit `YYYYMMDDHHMMSS` number.

use chrono::{Datelike, Duration, NaiveDate, Weekday};

use crate::error::{CallunaError, Result};

/// Pack a date into the 14-digit ANSI number, midnight time.
fn pack(date: NaiveDate) -> u64 {
    (date.year() as u64) * 10_000_000_000
        + (date.month() as u64) * 100_000_000
        + (date.day() as u64) * 1_000_000
}

/// Normalize a date value against a reference date (today).
pub fn normalize_date_value(value: &str, today: NaiveDate) -> Result<u64> {
    let value = value.trim();
    if value.is_empty() {
        return Err(CallunaError::InvalidDate);
    }

    if value.chars().all(|c| c.is_ascii_digit()) {
        return normalize_numeric(value);
    }
    normalize_named(&value.to_lowercase(), today)
}

/// Normalize a numeric ANSI date prefix. Missing month and day fill with
/// `01`, missing time with zeros.
fn normalize_numeric(digits: &str) -> Result<u64> {
    let packed = match digits.len() {
        4 => format!("{digits}0101000000"),
        6 => format!("{digits}01000000"),
        8 => format!("{digits}000000"),
        10 => format!("{digits}0000"),
        12 => format!("{digits}00"),
        14 => digits.to_string(),
        _ => return Err(CallunaError::InvalidDate),
    };

    let number: u64 = packed.parse().map_err(|_| CallunaError::InvalidDate)?;

    // Validate the calendar part.
    let year = (number / 10_000_000_000) as i32;
    let month = (number / 100_000_000 % 100) as u32;
    let day = (number / 1_000_000 % 100) as u32;
    if NaiveDate::from_ymd_opt(year, month, day).is_none() {
        return Err(CallunaError::InvalidDate);
    }
    let hour = number / 10_000 % 100;
    let minute = number / 100 % 100;
    let second = number % 100;
    if hour > 23 || minute > 59 || second > 59 {
        return Err(CallunaError::InvalidDate);
    }

    Ok(number)
}

fn normalize_named(name: &str, today: NaiveDate) -> Result<u64> {
    if let Some(weekday) = weekday_of(name) {
        return Ok(pack(most_recent_weekday(today, weekday)));
    }
    if let Some(month) = month_of(name) {
        let date = NaiveDate::from_ymd_opt(today.year(), month, 1)
            .ok_or(CallunaError::InvalidDate)?;
        return Ok(pack(date));
    }

    let date = match name {
        "today" => today,
        "yesterday" => today - Duration::days(1),
        "thisweek" => most_recent_weekday(today, Weekday::Mon),
        "lastweek" => today - Duration::days(7),
        "thismonth" => NaiveDate::from_ymd_opt(today.year(), today.month(), 1)
            .ok_or(CallunaError::InvalidDate)?,
        "lastmonth" => {
            let (year, month) = if today.month() == 1 {
                (today.year() - 1, 12)
            } else {
                (today.year(), today.month() - 1)
            };
            NaiveDate::from_ymd_opt(year, month, 1).ok_or(CallunaError::InvalidDate)?
        }
        "thisyear" => {
            NaiveDate::from_ymd_opt(today.year(), 1, 1).ok_or(CallunaError::InvalidDate)?
        }
        "lastyear" => {
            NaiveDate::from_ymd_opt(today.year() - 1, 1, 1).ok_or(CallunaError::InvalidDate)?
        }
        _ => return Err(CallunaError::InvalidDate),
    };
    Ok(pack(date))
}

/// The most recent date falling on `weekday`, today included.
fn most_recent_weekday(today: NaiveDate, weekday: Weekday) -> NaiveDate {
    let back = (today.weekday().num_days_from_monday() + 7
        - weekday.num_days_from_monday())
        % 7;
    today - Duration::days(back as i64)
}

fn weekday_of(name: &str) -> Option<Weekday> {
    match name {
        "monday" => Some(Weekday::Mon),
        "tuesday" => Some(Weekday::Tue),
        "wednesday" => Some(Weekday::Wed),
        "thursday" => Some(Weekday::Thu),
        "friday" => Some(Weekday::Fri),
        "saturday" => Some(Weekday::Sat),
        "sunday" => Some(Weekday::Sun),
        _ => None,
    }
}

fn month_of(name: &str) -> Option<u32> {
    match name {
        "january" => Some(1),
        "february" => Some(2),
        "march" => Some(3),
        "april" => Some(4),
        "may" => Some(5),
        "june" => Some(6),
        "july" => Some(7),
        "august" => Some(8),
        "september" => Some(9),
        "october" => Some(10),
        "november" => Some(11),
        "december" => Some(12),
    _ => None,
    }
}
