use chrono::{DateTime, Days, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::engine::EngineError;

/// Date-only value. The only date type the availability model compares.
pub type CalendarDate = NaiveDate;

pub type ProductId = Ulid;
pub type BookingId = Ulid;
pub type UserId = Ulid;
pub type ReviewId = Ulid;

/// Normalize an instant to the calendar date in its own offset.
///
/// Going through UTC first would move late-evening instants west of Greenwich
/// onto the next day.
pub fn calendar_date<Tz: TimeZone>(instant: &DateTime<Tz>) -> CalendarDate {
    instant.date_naive()
}

/// Inclusive date range `[start, end]` during which a product can be booked.
///
/// `start <= end` holds for every value, including deserialized ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawWindow")]
pub struct BookingWindow {
    start: CalendarDate,
    end: CalendarDate,
}

#[derive(Deserialize)]
struct RawWindow {
    start: CalendarDate,
    end: CalendarDate,
}

impl TryFrom<RawWindow> for BookingWindow {
    type Error = EngineError;

    fn try_from(raw: RawWindow) -> Result<Self, Self::Error> {
        BookingWindow::new(raw.start, raw.end)
    }
}

impl BookingWindow {
    pub fn new(start: CalendarDate, end: CalendarDate) -> Result<Self, EngineError> {
        if start > end {
            return Err(EngineError::InvalidDate(format!("window starts {start} after it ends {end}")));
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> CalendarDate {
        self.start
    }

    pub fn end(&self) -> CalendarDate {
        self.end
    }

    pub fn contains(&self, date: CalendarDate) -> bool {
        self.start <= date && date <= self.end
    }

    /// Number of calendar days in the window, both ends included.
    pub fn len_days(&self) -> u64 {
        u64::try_from((self.end - self.start).num_days()).map_or(0, |days| days + 1)
    }

    /// Every date of the window in ascending order.
    pub fn days(&self) -> impl Iterator<Item = CalendarDate> + '_ {
        (0..self.len_days()).filter_map(|offset| self.start.checked_add_days(Days::new(offset)))
    }
}

/// Free-text rental slot. Full-day exclusivity means the slot never partitions a date today.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimeSlot(pub String);

impl TimeSlot {
    pub const MORNING: &'static str = "Morning (9-12 PM)";
    pub const AFTERNOON: &'static str = "Afternoon (12-5 PM)";
    pub const EVENING: &'static str = "Evening (5-8 PM)";
    pub const FULL_DAY: &'static str = "Full Day";

    pub fn new(label: impl Into<String>) -> Self {
        Self(label.into())
    }

    pub fn full_day() -> Self {
        Self::new(Self::FULL_DAY)
    }

    /// Slots offered on the product page.
    pub fn standard() -> Vec<TimeSlot> {
        [Self::MORNING, Self::AFTERNOON, Self::EVENING, Self::FULL_DAY]
            .into_iter()
            .map(TimeSlot::new)
            .collect()
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for TimeSlot {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// One externally recorded reservation of a product on a date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BookedDateEntry {
    pub date: CalendarDate,
    pub time_slot: TimeSlot,
    pub booking_id: BookingId,
}

/// How a calendar cell should be rendered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DayState {
    OutOfWindow,
    Booked,
    Available,
}

// ── Catalog ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Ghagra,
    Jewellery,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    pub category: Category,
    pub image_url: String,
    pub color: String,
    /// Rental price in whole rupees.
    pub price: u32,
    pub available: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Admin product form after the image has been uploaded by the storage collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProductDraft {
    pub name: String,
    pub category: Category,
    pub image_url: String,
    pub color: String,
    pub price: u32,
}

// ── Bookings ─────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BookingStatus {
    Pending,
    Accepted,
    Cancelled,
}

impl BookingStatus {
    /// Only pending requests can be decided; decisions are final.
    pub fn can_transition_to(self, next: BookingStatus) -> bool {
        matches!(
            (self, next),
            (BookingStatus::Pending, BookingStatus::Accepted)
                | (BookingStatus::Pending, BookingStatus::Cancelled)
        )
    }

    /// Whether a booking in this state still holds its date.
    pub fn holds_date(self) -> bool {
        !matches!(self, BookingStatus::Cancelled)
    }
}

impl std::fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            BookingStatus::Pending => "pending",
            BookingStatus::Accepted => "accepted",
            BookingStatus::Cancelled => "cancelled",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Booking {
    pub id: BookingId,
    pub product_id: ProductId,
    pub user_id: UserId,
    pub booking_date: CalendarDate,
    pub time_slot: TimeSlot,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewBooking {
    pub product_id: ProductId,
    pub user_id: UserId,
    pub date: CalendarDate,
    pub time_slot: TimeSlot,
}

// ── Users ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub name: String,
    pub email: String,
    pub mobile: Option<String>,
    pub address: Option<String>,
    pub college: Option<String>,
    #[serde(default)]
    pub is_admin: bool,
}

// ── Reviews ──────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Review {
    pub id: ReviewId,
    pub product_id: ProductId,
    pub user_id: UserId,
    /// Stars, 1 to 5.
    pub rating: u8,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewReview {
    pub product_id: ProductId,
    pub user_id: UserId,
    pub rating: u8,
    pub comment: Option<String>,
}

// ── Change feed ──────────────────────────────────────────────────

/// Change notifications delivered per product by the backend's realtime feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeEvent {
    BookingRequested {
        product_id: ProductId,
        booking_id: BookingId,
        date: CalendarDate,
    },
    BookingStatusChanged {
        product_id: ProductId,
        booking_id: BookingId,
        status: BookingStatus,
    },
    AvailabilityReleased {
        product_id: ProductId,
        booking_id: BookingId,
        date: CalendarDate,
    },
    SnapshotReloaded {
        product_id: ProductId,
    },
}

impl ChangeEvent {
    pub fn product_id(&self) -> ProductId {
        match self {
            ChangeEvent::BookingRequested { product_id, .. }
            | ChangeEvent::BookingStatusChanged { product_id, .. }
            | ChangeEvent::AvailabilityReleased { product_id, .. }
            | ChangeEvent::SnapshotReloaded { product_id } => *product_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::FixedOffset;

    fn date(y: i32, m: u32, d: u32) -> CalendarDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    #[test]
    fn window_contains_is_inclusive() {
        let w = BookingWindow::new(date(2024, 9, 20), date(2024, 10, 10)).unwrap();
        assert!(w.contains(date(2024, 9, 20)));
        assert!(w.contains(date(2024, 10, 10)));
        assert!(!w.contains(date(2024, 9, 19)));
        assert!(!w.contains(date(2024, 10, 11)));
    }

    #[test]
    fn window_days_cover_both_ends() {
        let w = BookingWindow::new(date(2024, 9, 20), date(2024, 10, 10)).unwrap();
        let days: Vec<_> = w.days().collect();
        assert_eq!(w.len_days(), 21);
        assert_eq!(days.len(), 21);
        assert_eq!(days.first(), Some(&date(2024, 9, 20)));
        assert_eq!(days.last(), Some(&date(2024, 10, 10)));
    }

    #[test]
    fn single_day_window() {
        let d = date(2025, 1, 1);
        let w = BookingWindow::new(d, d).unwrap();
        assert_eq!(w.days().collect::<Vec<_>>(), vec![d]);
    }

    #[test]
    fn inverted_window_rejected() {
        let result = BookingWindow::new(date(2024, 10, 10), date(2024, 9, 20));
        assert!(matches!(result, Err(EngineError::InvalidDate(_))));
    }

    #[test]
    fn inverted_window_not_deserialized() {
        let result = serde_json::from_str::<BookingWindow>(r#"{"start":"2024-10-10","end":"2024-09-20"}"#);
        assert!(result.is_err());

        let w: BookingWindow = serde_json::from_str(r#"{"start":"2024-09-20","end":"2024-10-10"}"#).unwrap();
        assert_eq!(w.len_days(), 21);
        assert_eq!(serde_json::to_string(&w).unwrap(), r#"{"start":"2024-09-20","end":"2024-10-10"}"#);
    }

    #[test]
    fn calendar_date_uses_local_offset() {
        // 23:30 in UTC-5 is already the next day in UTC.
        let offset = FixedOffset::west_opt(5 * 3600).unwrap();
        let instant = offset.with_ymd_and_hms(2024, 9, 25, 23, 30, 0).unwrap();
        assert_eq!(calendar_date(&instant), date(2024, 9, 25));
        assert_eq!(calendar_date(&instant.with_timezone(&Utc)), date(2024, 9, 26));
    }

    #[test]
    fn status_transitions() {
        use BookingStatus::*;
        assert!(Pending.can_transition_to(Accepted));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(!Accepted.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Accepted));
        assert!(!Pending.can_transition_to(Pending));
        assert!(Accepted.holds_date());
        assert!(!Cancelled.holds_date());
    }

    #[test]
    fn wire_names_match_backend_tables() {
        assert_eq!(serde_json::to_string(&Category::Jewellery).unwrap(), "\"JEWELLERY\"");
        assert_eq!(serde_json::to_string(&BookingStatus::Accepted).unwrap(), "\"accepted\"");
        assert_eq!(serde_json::to_string(&TimeSlot::full_day()).unwrap(), "\"Full Day\"");
    }

    #[test]
    fn change_event_product() {
        let pid = Ulid::new();
        let event = ChangeEvent::AvailabilityReleased {
            product_id: pid,
            booking_id: Ulid::new(),
            date: date(2024, 9, 25),
        };
        assert_eq!(event.product_id(), pid);
    }
}
