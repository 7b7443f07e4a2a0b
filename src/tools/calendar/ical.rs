//! iCalendar (RFC 5545) rendering of bookings.

use chrono::{DateTime, Duration, Utc};

use crate::tools::calendar::booking_store::Booking;

/// Render `bookings` as a `VCALENDAR` with one `VEVENT` each, CRLF line
/// endings. Times are floating local times.
#[must_use]
pub fn render_calendar(calendar_name: &str, bookings: &[Booking], now: DateTime<Utc>) -> String {
    let stamp = now.format("%Y%m%dT%H%M%SZ").to_string();
    let mut lines = vec![
        "BEGIN:VCALENDAR".to_string(),
        "VERSION:2.0".to_string(),
        "PRODID:-//Digital Employee//Meeting Rooms//EN".to_string(),
        "CALSCALE:GREGORIAN".to_string(),
        "METHOD:PUBLISH".to_string(),
        format!("X-WR-CALNAME:{}", escape_text(calendar_name)),
    ];

    for booking in bookings {
        let start = booking.date.and_time(booking.start);
        let end = start + Duration::hours(i64::from(booking.duration_hours));
        let room = escape_text(&booking.room);
        lines.extend([
            "BEGIN:VEVENT".to_string(),
            format!("UID:{}@digital-employee", booking.id),
            format!("DTSTAMP:{stamp}"),
            format!("DTSTART:{}", start.format("%Y%m%dT%H%M%S")),
            format!("DTEND:{}", end.format("%Y%m%dT%H%M%S")),
            format!("SUMMARY:Meeting room booking - {room}"),
            format!("LOCATION:{room}"),
            format!("DESCRIPTION:Booked by {} through the digital employee", escape_text(&booking.user_id)),
            "STATUS:CONFIRMED".to_string(),
            "END:VEVENT".to_string(),
        ]);
    }

    lines.push("END:VCALENDAR".to_string());
    let mut out = lines.join("\r\n");
    out.push_str("\r\n");
    out
}

fn escape_text(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace(';', "\\;")
        .replace(',', "\\,")
        .replace('\n', "\\n")
}
