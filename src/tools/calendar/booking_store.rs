//! Meeting-room bookings persisted in `SQLite`.
//!
//! A room is taken for a window when any booking (from any user) on the same
//! date overlaps it. The availability check and the insert run in one
//! transaction.

use chrono::{DateTime, NaiveDate, NaiveTime, TimeZone, Timelike, Utc};
use rusqlite::params;
use serde::Serialize;
use serde_json::{Value, json};
use tokio_rusqlite::Connection;
use tracing::{debug, info};

use crate::config::StorageConfig;
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::memory::core::ids::BookingId;

const MINUTES_PER_DAY: u32 = 24 * 60;

/// A confirmed booking.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Booking {
    /// Booking identifier.
    pub id: BookingId,
    /// Who booked.
    pub user_id: String,
    /// Room name.
    pub room: String,
    /// Booking date.
    pub date: NaiveDate,
    /// Start time.
    pub start: NaiveTime,
    /// Length in whole hours.
    pub duration_hours: u32,
    /// When the booking was made.
    pub created_at: DateTime<Utc>,
}

impl Booking {
    /// JSON shape returned to the reasoning model.
    #[must_use]
    pub fn to_json(&self) -> Value {
        json!({
            "booking_id": self.id.to_string(),
            "room": self.room,
            "date": self.date.format("%Y-%m-%d").to_string(),
            "time": self.start.format("%H:%M").to_string(),
            "duration_hours": self.duration_hours,
        })
    }
}

/// A booking attempt.
#[derive(Clone, Debug)]
pub struct BookingRequest {
    /// Who is booking.
    pub user_id: String,
    /// Rooms to try, in order; the first free one is taken.
    pub rooms: Vec<String>,
    /// Date.
    pub date: NaiveDate,
    /// Start time.
    pub start: NaiveTime,
    /// Length in whole hours.
    pub duration_hours: u32,
}

/// Result of a booking attempt.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BookingOutcome {
    /// A room was free and is now booked.
    Confirmed(Booking),
    /// Every requested room overlaps an existing booking.
    Conflict {
        /// Existing bookings blocking the request.
        blocking: Vec<Booking>,
    },
}

/// `SQLite`-backed booking store.
pub struct SqliteBookingStore {
    conn: Connection,
    table: String,
}

type RawBooking = (String, String, String, String, i64, i64, i64);

impl SqliteBookingStore {
    /// Open (or create) the bookings table in the configured database.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or the schema
    /// cannot be created.
    pub async fn open(config: &StorageConfig) -> MemoryResult<Self> {
        let conn = Connection::open(&config.sqlite_path).await?;
        Self::init(conn, &config.booking_table).await
    }

    /// Open a private in-memory store.
    ///
    /// # Errors
    /// Same as [`SqliteBookingStore::open`].
    pub async fn open_in_memory() -> MemoryResult<Self> {
        let conn = Connection::open_in_memory().await?;
        Self::init(conn, "room_bookings").await
    }

    async fn init(conn: Connection, table: &str) -> MemoryResult<Self> {
        let table = table.to_string();
        {
            let table = table.clone();
            conn.call(move |conn| {
                conn.execute_batch(&format!(
                    "CREATE TABLE IF NOT EXISTS {table} (
                        id TEXT PRIMARY KEY,
                        user_id TEXT NOT NULL,
                        room TEXT NOT NULL,
                        date TEXT NOT NULL,
                        start_minute INTEGER NOT NULL,
                        duration_hours INTEGER NOT NULL,
                        created_at INTEGER NOT NULL
                    );
                    CREATE INDEX IF NOT EXISTS {table}_room_date_idx ON {table}(room, date);
                    CREATE INDEX IF NOT EXISTS {table}_user_idx ON {table}(user_id, date);"
                ))?;
                Ok(())
            })
            .await?;
        }
        info!(table = %table, "booking store ready");
        Ok(Self { conn, table })
    }

    /// Book the first free room of `request.rooms`.
    ///
    /// # Errors
    /// Returns a validation error when no room is given, the duration is
    /// zero, or the booking would run past midnight; otherwise a storage
    /// error.
    pub async fn book(&self, request: BookingRequest) -> MemoryResult<BookingOutcome> {
        if request.rooms.is_empty() {
            return Err(MemoryError::validation("no room to book"));
        }
        let start_minute = request.start.hour() * 60 + request.start.minute();
        if request.duration_hours == 0 || start_minute + request.duration_hours * 60 > MINUTES_PER_DAY {
            return Err(MemoryError::validation("booking must end on the same day"));
        }

        let booking_id = BookingId::new();
        let created_at = Utc::now();
        let table = self.table.clone();
        let date = request.date.format("%Y-%m-%d").to_string();
        let rooms = request.rooms.clone();
        let user_id = request.user_id.clone();
        let duration_hours = request.duration_hours;
        let id = booking_id.to_string();
        let created_ms = created_at.timestamp_millis();

        let (chosen, rows) = self
            .conn
            .call(move |conn| {
                let tx = conn.transaction()?;
                let mut blocking: Vec<RawBooking> = Vec::new();
                let mut chosen = None;
                for room in &rooms {
                    let existing = {
                        let mut stmt = tx.prepare(&format!(
                            "SELECT id, user_id, room, date, start_minute, duration_hours, created_at
                             FROM {table} WHERE room = ?1 AND date = ?2"
                        ))?;
                        let rows = stmt.query_map(params![room, date], raw_booking)?;
                        rows.collect::<Result<Vec<_>, _>>()?
                    };
                    let taken: Vec<RawBooking> = existing
                        .into_iter()
                        .filter(|row| windows_overlap(row.4, row.5, start_minute, duration_hours))
                        .collect();
                    if taken.is_empty() {
                        tx.execute(
                            &format!(
                                "INSERT INTO {table} (id, user_id, room, date, start_minute, duration_hours, created_at)
                                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)"
                            ),
                            params![id, user_id, room, date, start_minute, duration_hours, created_ms],
                        )?;
                        chosen = Some(room.clone());
                        break;
                    }
                    blocking.extend(taken);
                }
                tx.commit()?;
                Ok((chosen, blocking))
            })
            .await?;

        match chosen {
            Some(room) => {
                debug!(user_id = %request.user_id, room = %room, "room booked");
                Ok(BookingOutcome::Confirmed(Booking {
                    id: booking_id,
                    user_id: request.user_id,
                    room,
                    date: request.date,
                    start: request.start,
                    duration_hours,
                    created_at,
                }))
            }
            None => Ok(BookingOutcome::Conflict {
                blocking: rows.into_iter().map(decode_booking).collect::<MemoryResult<_>>()?,
            }),
        }
    }

    /// Bookings, optionally filtered by user and date, ordered by date and
    /// start time.
    ///
    /// # Errors
    /// Returns a storage error or a decoding error for corrupt rows.
    pub async fn list(&self, user_id: Option<&str>, date: Option<NaiveDate>) -> MemoryResult<Vec<Booking>> {
        let table = self.table.clone();
        let user_id = user_id.map(str::to_string);
        let date = date.map(|d| d.format("%Y-%m-%d").to_string());
        let rows = self
            .conn
            .call(move |conn| {
                let mut stmt = conn.prepare(&format!(
                    "SELECT id, user_id, room, date, start_minute, duration_hours, created_at
                     FROM {table}
                     WHERE (?1 IS NULL OR user_id = ?1) AND (?2 IS NULL OR date = ?2)
                     ORDER BY date, start_minute, room"
                ))?;
                let rows = stmt.query_map(params![user_id, date], raw_booking)?;
                Ok(rows.collect::<Result<Vec<_>, _>>()?)
            })
            .await?;
        rows.into_iter().map(decode_booking).collect()
    }

    /// Cancel the user's bookings of `room` on `date`; returns how many were
    /// removed.
    ///
    /// # Errors
    /// Returns a storage error.
    pub async fn cancel(&self, user_id: &str, room: &str, date: NaiveDate) -> MemoryResult<usize> {
        let table = self.table.clone();
        let user_id = user_id.to_string();
        let room = room.to_string();
        let date = date.format("%Y-%m-%d").to_string();
        let removed = self
            .conn
            .call(move |conn| {
                Ok(conn.execute(
                    &format!("DELETE FROM {table} WHERE user_id = ?1 AND room = ?2 AND date = ?3"),
                    params![user_id, room, date],
                )?)
            })
            .await?;
        Ok(removed)
    }
}

fn raw_booking(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawBooking> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
    ))
}

fn windows_overlap(start_minute: i64, duration_hours: i64, other_start: u32, other_hours: u32) -> bool {
    let end = start_minute + duration_hours * 60;
    let other_start = i64::from(other_start);
    let other_end = other_start + i64::from(other_hours) * 60;
    start_minute < other_end && other_start < end
}

fn decode_booking(raw: RawBooking) -> MemoryResult<Booking> {
    let (id, user_id, room, date, start_minute, duration_hours, created_at) = raw;
    let corrupt = |what: &str| MemoryError::CorruptRow(format!("booking {id}: bad {what}"));
    let id_parsed = id.parse::<BookingId>().map_err(|_| corrupt("id"))?;
    let date = NaiveDate::parse_from_str(&date, "%Y-%m-%d").map_err(|_| corrupt("date"))?;
    let start_minute = u32::try_from(start_minute).map_err(|_| corrupt("start"))?;
    let start = NaiveTime::from_hms_opt(start_minute / 60, start_minute % 60, 0).ok_or_else(|| corrupt("start"))?;
    let duration_hours = u32::try_from(duration_hours).map_err(|_| corrupt("duration"))?;
    let created_at = Utc
        .timestamp_millis_opt(created_at)
        .single()
        .ok_or_else(|| corrupt("created_at"))?;
    Ok(Booking {
        id: id_parsed,
        user_id,
        room,
        date,
        start,
        duration_hours,
        created_at,
    })
}
