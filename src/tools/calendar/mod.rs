//! Meeting-room calendar tools: book, query, cancel, and the iCal feed.

pub mod booking_store;
pub mod ical;
pub mod time;

use std::sync::Arc;

use chrono::{Local, NaiveDate, Utc};
use serde_json::{Value, json};

use crate::config::CalendarConfig;
use crate::llm::error::ProviderError;
use crate::memory::core::errors::{MemoryError, MemoryResult};
use crate::tools::error::ToolError;
use crate::tools::registry::{Tool, ToolFuture};
use crate::tools::schema::{ArgKind, ArgSpec, Arguments, ToolSpec};

pub use booking_store::{Booking, BookingOutcome, BookingRequest, SqliteBookingStore};
pub use ical::render_calendar;
pub use time::{normalize_time, resolve_day, resolve_start};

const SERVICE: &str = "calendar";

/// Booking tool name.
pub const BOOK_TOOL: &str = "book_meeting_room";
/// Query tool name.
pub const QUERY_TOOL: &str = "query_meeting_rooms";
/// Cancel tool name.
pub const CANCEL_TOOL: &str = "cancel_meeting_room";

/// Room catalogue and booking store shared by the calendar tools.
pub struct Calendar {
    store: Arc<SqliteBookingStore>,
    rooms: Vec<String>,
    calendar_name: String,
    today: Option<NaiveDate>,
}

impl Calendar {
    /// Calendar over `store` with the configured rooms.
    #[must_use]
    pub fn new(store: Arc<SqliteBookingStore>, config: &CalendarConfig) -> Self {
        Self {
            store,
            rooms: config.rooms.clone(),
            calendar_name: config.calendar_name.clone(),
            today: None,
        }
    }

    /// Pin "today" instead of reading the local clock.
    #[must_use]
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// Date that relative days resolve against.
    #[must_use]
    pub fn today(&self) -> NaiveDate {
        self.today.unwrap_or_else(|| Local::now().date_naive())
    }

    /// Configured rooms, in preference order.
    #[must_use]
    pub fn rooms(&self) -> &[String] {
        &self.rooms
    }

    /// All bookings as an iCalendar document.
    ///
    /// # Errors
    /// Returns a storage error.
    pub async fn ical_feed(&self) -> MemoryResult<String> {
        let bookings = self.store.list(None, None).await?;
        Ok(render_calendar(&self.calendar_name, &bookings, Utc::now()))
    }

    /// The three calendar tools.
    #[must_use]
    pub fn tools(self: &Arc<Self>) -> Vec<Arc<dyn Tool>> {
        vec![
            Arc::new(BookMeetingRoom::new(Arc::clone(self))),
            Arc::new(QueryMeetingRooms::new(Arc::clone(self))),
            Arc::new(CancelMeetingRoom::new(Arc::clone(self))),
        ]
    }

    /// Match a room by full name or by its leading number, ignoring case.
    fn find_room(&self, tool: &str, requested: &str) -> Result<String, ToolError> {
        let needle = requested.trim().to_lowercase();
        self.rooms
            .iter()
            .find(|room| room.to_lowercase() == needle)
            .or_else(|| {
                self.rooms
                    .iter()
                    .find(|room| room.split_whitespace().next().is_some_and(|n| n.to_lowercase() == needle))
            })
            .cloned()
            .ok_or_else(|| {
                ToolError::argument(tool, format!("unknown room `{requested}`; rooms: {}", self.rooms.join(", ")))
            })
    }
}

fn store_error(tool: &str, err: MemoryError) -> ToolError {
    if err.is_validation() {
        ToolError::argument(tool, err.to_string())
    } else {
        ToolError::execution(tool, ProviderError::transport(SERVICE, err.to_string()))
    }
}

fn day_arg(calendar: &Calendar, tool: &str, raw: &str) -> Result<NaiveDate, ToolError> {
    resolve_day(raw, calendar.today()).map_err(|message| ToolError::argument(tool, message))
}

/// `book_meeting_room(day, time_slot?, start_time?, duration_hours?, room?)`.
pub struct BookMeetingRoom {
    calendar: Arc<Calendar>,
    spec: ToolSpec,
}

impl BookMeetingRoom {
    /// Booking tool over `calendar`.
    #[must_use]
    pub fn new(calendar: Arc<Calendar>) -> Self {
        Self {
            calendar,
            spec: ToolSpec {
                name: BOOK_TOOL,
                description: "Book a meeting room. Picks the first free room unless `room` is given.",
                args: vec![
                    ArgSpec::required(
                        "day",
                        "Weekday (e.g. friday), today, tomorrow, or a date YYYY-MM-DD",
                        ArgKind::String { max_len: 40 },
                    ),
                    ArgSpec::optional(
                        "time_slot",
                        "morning (09:00), afternoon (14:00), evening (17:00), or a time like 17:30",
                        ArgKind::String { max_len: 20 },
                    ),
                    ArgSpec::optional(
                        "start_time",
                        "Explicit start time HH:MM (24h); overrides time_slot",
                        ArgKind::String { max_len: 20 },
                    ),
                    ArgSpec::optional(
                        "duration_hours",
                        "Length in hours, default 1",
                        ArgKind::Integer { min: 1, max: 8 },
                    ),
                    ArgSpec::optional("room", "Specific room name", ArgKind::String { max_len: 60 }),
                ],
            },
        }
    }

    async fn run(&self, user_id: &str, args: Arguments) -> Result<Value, ToolError> {
        let calendar = &self.calendar;
        let date = day_arg(calendar, BOOK_TOOL, args.str("day").unwrap_or_default())?;
        let start = resolve_start(args.str("time_slot"), args.str("start_time"))
            .map_err(|message| ToolError::argument(BOOK_TOOL, message))?;
        let duration_hours = args
            .int("duration_hours")
            .map_or(Ok(1), u32::try_from)
            .map_err(|_| ToolError::argument(BOOK_TOOL, "`duration_hours` out of range"))?;
        let requested_room = args.str("room").map(|room| calendar.find_room(BOOK_TOOL, room)).transpose()?;
        let rooms = requested_room
            .clone()
            .map_or_else(|| calendar.rooms().to_vec(), |room| vec![room]);

        let outcome = calendar
            .store
            .book(BookingRequest {
                user_id: user_id.to_string(),
                rooms,
                date,
                start,
                duration_hours,
            })
            .await
            .map_err(|err| store_error(BOOK_TOOL, err))?;

        let date_text = date.format("%Y-%m-%d").to_string();
        let time_text = start.format("%H:%M").to_string();
        Ok(match outcome {
            BookingOutcome::Confirmed(booking) => {
                let mut value = booking.to_json();
                if let Some(object) = value.as_object_mut() {
                    object.insert("status".to_string(), Value::from("confirmed"));
                    object.insert(
                        "message".to_string(),
                        Value::from(format!(
                            "Booked {} on {date_text} at {time_text} for {duration_hours} hour(s).",
                            booking.room
                        )),
                    );
                }
                value
            }
            BookingOutcome::Conflict { blocking } => json!({
                "status": "conflict",
                "date": date_text,
                "time": time_text,
                "duration_hours": duration_hours,
                "requested_room": requested_room,
                "blocking": blocking.iter().map(Booking::to_json).collect::<Vec<_>>(),
                "message": match &requested_room {
                    Some(room) => format!("{room} is already booked on {date_text} around {time_text}."),
                    None => format!("Every room is already booked on {date_text} around {time_text}."),
                },
            }),
        })
    }
}

impl Tool for BookMeetingRoom {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn call<'a>(&'a self, user_id: &'a str, args: Arguments) -> ToolFuture<'a> {
        Box::pin(self.run(user_id, args))
    }
}

/// `query_meeting_rooms(date?)`: the user's bookings.
pub struct QueryMeetingRooms {
    calendar: Arc<Calendar>,
    spec: ToolSpec,
}

impl QueryMeetingRooms {
    /// Query tool over `calendar`.
    #[must_use]
    pub fn new(calendar: Arc<Calendar>) -> Self {
        Self {
            calendar,
            spec: ToolSpec {
                name: QUERY_TOOL,
                description: "List the user's meeting room bookings, optionally for one day.",
                args: vec![ArgSpec::optional(
                    "date",
                    "Day filter: weekday, today, tomorrow, or YYYY-MM-DD",
                    ArgKind::String { max_len: 40 },
                )],
            },
        }
    }

    async fn run(&self, user_id: &str, args: Arguments) -> Result<Value, ToolError> {
        let date = args
            .str("date")
            .map(|raw| day_arg(&self.calendar, QUERY_TOOL, raw))
            .transpose()?;
        let bookings = self
            .calendar
            .store
            .list(Some(user_id), date)
            .await
            .map_err(|err| store_error(QUERY_TOOL, err))?;
        let message = if bookings.is_empty() {
            "No bookings found.".to_string()
        } else {
            format!("Found {} booking(s).", bookings.len())
        };
        Ok(json!({
            "bookings": bookings.iter().map(Booking::to_json).collect::<Vec<_>>(),
            "message": message,
        }))
    }
}

impl Tool for QueryMeetingRooms {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn call<'a>(&'a self, user_id: &'a str, args: Arguments) -> ToolFuture<'a> {
        Box::pin(self.run(user_id, args))
    }
}

/// `cancel_meeting_room(room, date)`.
pub struct CancelMeetingRoom {
    calendar: Arc<Calendar>,
    spec: ToolSpec,
}

impl CancelMeetingRoom {
    /// Cancel tool over `calendar`.
    #[must_use]
    pub fn new(calendar: Arc<Calendar>) -> Self {
        Self {
            calendar,
            spec: ToolSpec {
                name: CANCEL_TOOL,
                description: "Cancel the user's booking of a room on a day.",
                args: vec![
                    ArgSpec::required("room", "Room name", ArgKind::String { max_len: 60 }),
                    ArgSpec::required(
                        "date",
                        "Weekday, today, tomorrow, or YYYY-MM-DD",
                        ArgKind::String { max_len: 40 },
                    ),
                ],
            },
        }
    }

    async fn run(&self, user_id: &str, args: Arguments) -> Result<Value, ToolError> {
        let calendar = &self.calendar;
        let room = calendar.find_room(CANCEL_TOOL, args.str("room").unwrap_or_default())?;
        let date = day_arg(calendar, CANCEL_TOOL, args.str("date").unwrap_or_default())?;
        let cancelled = calendar
            .store
            .cancel(user_id, &room, date)
            .await
            .map_err(|err| store_error(CANCEL_TOOL, err))?;
        let date_text = date.format("%Y-%m-%d");
        Ok(json!({
            "success": cancelled > 0,
            "cancelled": cancelled,
            "message": if cancelled > 0 {
                format!("Cancelled booking for {room} on {date_text}.")
            } else {
                format!("No booking found for {room} on {date_text}.")
            },
        }))
    }
}

impl Tool for CancelMeetingRoom {
    fn spec(&self) -> &ToolSpec {
        &self.spec
    }

    fn call<'a>(&'a self, user_id: &'a str, args: Arguments) -> ToolFuture<'a> {
        Box::pin(self.run(user_id, args))
    }
}
