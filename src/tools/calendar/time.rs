//! Day and time resolution for booking requests.
//!
//! Days resolve against an explicit `today` so results are deterministic:
//! a weekday name means its next occurrence strictly after today.

use std::sync::LazyLock;

use chrono::{Datelike, Duration, NaiveDate, NaiveTime, Weekday};
use regex::Regex;

/// Named slots and their start times.
pub const TIME_SLOTS: [(&str, u32); 3] = [("morning", 9), ("afternoon", 14), ("evening", 17)];

static CLOCK: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^(\d{1,2})\s*[:：]\s*(\d{1,2})$").ok());
static LOOSE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"(\d{1,2})(?:\s*[:：点時时]\s*(\d{1,2}))?").ok());

/// Resolve `day` to a calendar date.
///
/// Accepts weekday names (English, optionally prefixed with `next`/`this`,
/// or Chinese `周五`/`星期五`), `today`/`tomorrow`/`day after tomorrow` and
/// their Chinese forms, and ISO dates (`2025-03-14` or `2025/03/14`).
///
/// # Errors
/// Returns a description of the problem when `day` is not recognized.
pub fn resolve_day(day: &str, today: NaiveDate) -> Result<NaiveDate, String> {
    let raw = day.trim().to_lowercase();
    let stripped = raw
        .strip_prefix("next ")
        .or_else(|| raw.strip_prefix("this "))
        .unwrap_or(raw.as_str())
        .trim();

    let relative = match stripped {
        "today" | "今天" => Some(0),
        "tomorrow" | "明天" => Some(1),
        "day after tomorrow" | "后天" => Some(2),
        _ => None,
    };
    if let Some(days) = relative {
        return Ok(today + Duration::days(days));
    }

    if let Some(weekday) = parse_weekday(stripped) {
        return Ok(next_weekday(today, weekday));
    }

    NaiveDate::parse_from_str(stripped, "%Y-%m-%d")
        .or_else(|_| NaiveDate::parse_from_str(stripped, "%Y/%m/%d"))
        .map_err(|_| format!("unrecognized day `{day}`; use a weekday, today/tomorrow, or YYYY-MM-DD"))
}

/// First date strictly after `today` falling on `weekday`.
#[must_use]
pub fn next_weekday(today: NaiveDate, weekday: Weekday) -> NaiveDate {
    let current = i64::from(today.weekday().num_days_from_monday());
    let target = i64::from(weekday.num_days_from_monday());
    let mut days_ahead = target - current;
    if days_ahead <= 0 {
        days_ahead += 7;
    }
    today + Duration::days(days_ahead)
}

fn parse_weekday(raw: &str) -> Option<Weekday> {
    let chinese = raw
        .strip_prefix("星期")
        .or_else(|| raw.strip_prefix("周"))
        .or_else(|| raw.strip_prefix("礼拜"));
    if let Some(suffix) = chinese {
        return match suffix {
            "一" => Some(Weekday::Mon),
            "二" => Some(Weekday::Tue),
            "三" => Some(Weekday::Wed),
            "四" => Some(Weekday::Thu),
            "五" => Some(Weekday::Fri),
            "六" => Some(Weekday::Sat),
            "日" | "天" => Some(Weekday::Sun),
            _ => None,
        };
    }
    // chrono accepts full names and three-letter abbreviations.
    raw.parse::<Weekday>().ok()
}

/// Start time from an explicit `start_time` or a `time_slot`.
///
/// `start_time` wins when both are given. A slot that is not a named slot
/// is parsed as a free-form time.
///
/// # Errors
/// Returns a description of the problem when no valid time results.
pub fn resolve_start(time_slot: Option<&str>, start_time: Option<&str>) -> Result<NaiveTime, String> {
    if let Some(raw) = start_time {
        return normalize_time(raw)
            .ok_or_else(|| format!("start_time `{raw}` is not a valid time such as 17:00 or 09:30"));
    }
    let slot = time_slot.unwrap_or("afternoon").trim().to_lowercase();
    if let Some((_, hour)) = TIME_SLOTS.iter().find(|(name, _)| *name == slot) {
        return NaiveTime::from_hms_opt(*hour, 0, 0).ok_or_else(|| format!("invalid slot hour {hour}"));
    }
    normalize_time(&slot)
        .ok_or_else(|| format!("time_slot `{slot}` must be morning, afternoon, evening, or a time such as 17:30"))
}

/// Parse "17:30", "5pm", "5:30 pm", "下午5点", "晚上5点30" and the like.
#[must_use]
pub fn normalize_time(value: &str) -> Option<NaiveTime> {
    let raw = value.trim();
    if raw.is_empty() {
        return None;
    }

    if let Some(caps) = CLOCK.as_ref().and_then(|re| re.captures(raw)) {
        let hour = caps.get(1)?.as_str().parse().ok()?;
        let minute = caps.get(2)?.as_str().parse().ok()?;
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }

    let lowered = raw.to_lowercase();
    let is_pm = ["pm", "p.m.", "下午", "晚上", "傍晚"].iter().any(|k| lowered.contains(k));
    let is_am = ["am", "a.m.", "上午", "早上"].iter().any(|k| lowered.contains(k));

    let caps = LOOSE.as_ref()?.captures(&lowered)?;
    let mut hour: u32 = caps.get(1)?.as_str().parse().ok()?;
    let minute: u32 = match caps.get(2) {
        Some(m) => m.as_str().parse().ok()?,
        None if lowered.contains("半") => 30,
        None => 0,
    };

    if is_pm && hour < 12 {
        hour += 12;
    }
    if is_am && hour == 12 {
        hour = 0;
    }
    NaiveTime::from_hms_opt(hour, minute, 0)
}
