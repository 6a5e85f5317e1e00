use std::fmt;
use std::str::FromStr;

use chrono::{Datelike, NaiveDate};
use serde::{Deserialize, Serialize};

use crate::limits::*;
use crate::model::{BookingWindow, CalendarDate};

use super::EngineError;

// ── Season boundaries ─────────────────────────────────────────────

/// A month/day pair without a year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub struct MonthDay {
    pub month: u32,
    pub day: u32,
}

impl MonthDay {
    pub const fn new(month: u32, day: u32) -> Self {
        Self { month, day }
    }

    fn in_year(self, year: i32) -> Result<CalendarDate, EngineError> {
        NaiveDate::from_ymd_opt(year, self.month, self.day)
            .ok_or_else(|| EngineError::InvalidDate(format!("{year}-{self}")))
    }
}

impl fmt::Display for MonthDay {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}-{:02}", self.month, self.day)
    }
}

impl FromStr for MonthDay {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || EngineError::InvalidDate(format!("expected MM-DD, got {s:?}"));
        let (month, day) = s.trim().split_once('-').ok_or_else(invalid)?;
        let month = month.parse().map_err(|_| invalid())?;
        let day = day.parse().map_err(|_| invalid())?;
        Ok(Self::new(month, day))
    }
}

/// The yearly month/day range during which rentals are taken.
///
/// `end` may fall in the following calendar year (e.g. `12-20..01-10`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSeason")]
pub struct Season {
    start: MonthDay,
    end: MonthDay,
}

#[derive(Deserialize)]
struct RawSeason {
    start: MonthDay,
    end: MonthDay,
}

impl TryFrom<RawSeason> for Season {
    type Error = EngineError;

    fn try_from(raw: RawSeason) -> Result<Self, Self::Error> {
        Season::new(raw.start, raw.end)
    }
}

impl Default for Season {
    /// 20 September through 10 October.
    fn default() -> Self {
        Self {
            start: MonthDay::new(9, 20),
            end: MonthDay::new(10, 10),
        }
    }
}

impl Season {
    pub fn new(start: MonthDay, end: MonthDay) -> Result<Self, EngineError> {
        for boundary in [start, end] {
            // 29 February only exists every fourth year; check against a leap year
            // so every other real month/day passes.
            if boundary == MonthDay::new(2, 29) {
                return Err(EngineError::InvalidDate(
                    "29 February cannot bound a yearly season".into(),
                ));
            }
            boundary.in_year(2000)?;
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> MonthDay {
        self.start
    }

    pub fn end(&self) -> MonthDay {
        self.end
    }

    pub fn wraps_year(&self) -> bool {
        self.end < self.start
    }

    /// The window whose start falls in `year`.
    fn anchored_at(&self, year: i32) -> Result<BookingWindow, EngineError> {
        let start = self.start.in_year(year)?;
        let end_year = if self.wraps_year() { year + 1 } else { year };
        let end = self.end.in_year(end_year)?;
        BookingWindow::new(start, end)
    }
}

impl fmt::Display for Season {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

impl FromStr for Season {
    type Err = EngineError;

    /// Parses `MM-DD..MM-DD`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (start, end) = s
            .split_once("..")
            .ok_or_else(|| EngineError::InvalidDate(format!("expected MM-DD..MM-DD, got {s:?}")))?;
        Season::new(start.parse()?, end.parse()?)
    }
}

// ── Window computation ───────────────────────────────────────────

/// Reject dates outside the range the model supports.
pub fn validate_date(date: CalendarDate) -> Result<CalendarDate, EngineError> {
    if !(MIN_CALENDAR_YEAR..=MAX_CALENDAR_YEAR).contains(&date.year()) {
        return Err(EngineError::InvalidDate(format!("{date} out of supported range")));
    }
    Ok(date)
}

/// Parse a `YYYY-MM-DD` calendar date.
pub fn parse_date(s: &str) -> Result<CalendarDate, EngineError> {
    let date = NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
        .map_err(|e| EngineError::InvalidDate(format!("{s:?}: {e}")))?;
    validate_date(date)
}

/// Compute the booking window active on `reference_now`.
///
/// The current year's window is used until its last day has passed; from then on
/// the same month/day range in the following year applies. For seasons crossing
/// new year the window that began the previous year is tried first.
pub fn compute_window(season: &Season, reference_now: CalendarDate) -> Result<BookingWindow, EngineError> {
    validate_date(reference_now)?;
    let year = reference_now.year();
    let first_anchor = if season.wraps_year() { year - 1 } else { year };

    let window = season.anchored_at(first_anchor)?;
    if reference_now <= window.end() {
        return Ok(window);
    }
    season.anchored_at(first_anchor + 1)
}
