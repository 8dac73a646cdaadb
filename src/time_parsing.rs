use crate::errors::{AppError, AppResult};
use crate::models::DEFAULT_REMIND_BEFORE_MINUTES;
use chrono::{DateTime, Local, NaiveDateTime, TimeZone};
use once_cell::sync::Lazy;
use regex::Regex;

pub const DUE_FORMAT: &str = "%Y-%m-%d %H:%M";

static OFFSET_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^([+-]?(?:\d+(?:\.\d*)?|\.\d+))([hm]?)$").expect("valid reminder offset regex")
});

/// Parses `YYYY-MM-DD HH:MM` in the local zone. Blank input means "no due date".
pub fn parse_due_date_time(text: &str) -> AppResult<Option<DateTime<Local>>> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let naive = NaiveDateTime::parse_from_str(trimmed, DUE_FORMAT).map_err(|_| {
        AppError::Format(format!(
            "Due date must be YYYY-MM-DD HH:MM (example: 2026-01-20 21:30), got '{trimmed}'"
        ))
    })?;
    local_from_naive(naive).map(Some)
}

pub(crate) fn local_from_naive(naive: NaiveDateTime) -> AppResult<DateTime<Local>> {
    Local.from_local_datetime(&naive).single().ok_or_else(|| {
        AppError::Format(format!(
            "{} is not a single valid local time (daylight saving transition)",
            naive.format(DUE_FORMAT)
        ))
    })
}

/// Parses `90`, `60m`, `1.5h` and friends into whole minutes. Blank means 60.
pub fn parse_reminder_offset(text: &str) -> AppResult<u32> {
    let compact: String = text
        .chars()
        .filter(|ch| !ch.is_whitespace())
        .collect::<String>()
        .to_lowercase();
    if compact.is_empty() {
        return Ok(DEFAULT_REMIND_BEFORE_MINUTES);
    }

    let invalid = || {
        AppError::Format(format!(
            "Remind Before must be like 12h or 60m (example: 1.5h), got '{}'",
            text.trim()
        ))
    };
    let caps = OFFSET_RE.captures(&compact).ok_or_else(invalid)?;
    let number: f64 = caps[1].parse().map_err(|_| invalid())?;
    let minutes = match &caps[2] {
        "h" => number * 60.0,
        _ => number,
    };

    Ok(minutes.trunc().clamp(0.0, f64::from(u32::MAX)) as u32)
}

pub fn format_due(due_at: &DateTime<Local>) -> String {
    due_at.format(DUE_FORMAT).to_string()
}

/// Renders an offset the way a user would type it back into the form.
pub fn format_reminder_offset(minutes: u32) -> String {
    if minutes % 60 == 0 {
        format!("{}h", minutes / 60)
    } else {
        format!("{minutes}m")
    }
}
