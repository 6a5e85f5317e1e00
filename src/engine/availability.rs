use std::collections::BTreeMap;

use crate::model::*;

// ── Availability Model ────────────────────────────────────────────

/// Booked-date entries for one product, indexed by date.
///
/// Built in one piece from a fetch result and never patched in place.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AvailabilitySet {
    by_date: BTreeMap<CalendarDate, Vec<BookedDateEntry>>,
    len: usize,
}

impl AvailabilitySet {
    pub fn from_entries(entries: impl IntoIterator<Item = BookedDateEntry>) -> Self {
        let mut by_date: BTreeMap<CalendarDate, Vec<BookedDateEntry>> = BTreeMap::new();
        let mut len = 0;
        for entry in entries {
            by_date.entry(entry.date).or_default().push(entry);
            len += 1;
        }
        Self { by_date, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn entries(&self) -> impl Iterator<Item = &BookedDateEntry> {
        self.by_date.values().flatten()
    }

    /// Entries recorded on `date`, any slot.
    pub fn bookings_on(&self, date: CalendarDate) -> &[BookedDateEntry] {
        self.by_date.get(&date).map(Vec::as_slice).unwrap_or(&[])
    }

    /// Exact match on date and slot.
    pub fn is_date_booked(&self, date: CalendarDate, time_slot: &TimeSlot) -> bool {
        self.bookings_on(date).iter().any(|e| &e.time_slot == time_slot)
    }

    /// A single reservation consumes the whole date (full-day exclusivity).
    pub fn is_date_fully_booked(&self, date: CalendarDate) -> bool {
        !self.bookings_on(date).is_empty()
    }

    /// Dates with at least one entry inside `window`, ascending.
    pub fn booked_dates_within(&self, window: &BookingWindow) -> Vec<CalendarDate> {
        self.by_date.range(window.start()..=window.end()).map(|(d, _)| *d).collect()
    }
}

/// A booking window combined with the booked dates of one product.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Availability {
    window: BookingWindow,
    set: AvailabilitySet,
}

impl Availability {
    pub fn new(window: BookingWindow, set: AvailabilitySet) -> Self {
        Self { window, set }
    }

    pub fn window(&self) -> &BookingWindow {
        &self.window
    }

    pub fn set(&self) -> &AvailabilitySet {
        &self.set
    }

    pub fn is_within_window(&self, date: CalendarDate) -> bool {
        self.window.contains(date)
    }

    pub fn is_date_booked(&self, date: CalendarDate, time_slot: &TimeSlot) -> bool {
        self.set.is_date_booked(date, time_slot)
    }

    pub fn is_date_fully_booked(&self, date: CalendarDate) -> bool {
        self.set.is_date_fully_booked(date)
    }

    /// Inside the window and not taken. The one predicate a calendar needs for enabled/disabled.
    pub fn is_selectable(&self, date: CalendarDate) -> bool {
        self.is_within_window(date) && !self.is_date_fully_booked(date)
    }

    pub fn day_state(&self, date: CalendarDate) -> DayState {
        if !self.is_within_window(date) {
            DayState::OutOfWindow
        } else if self.is_date_fully_booked(date) {
            DayState::Booked
        } else {
            DayState::Available
        }
    }

    pub fn window_days(&self) -> impl Iterator<Item = (CalendarDate, DayState)> + '_ {
        self.window.days().map(|d| (d, self.day_state(d)))
    }

    /// First selectable date on or after `from`.
    pub fn first_selectable(&self, from: CalendarDate) -> Option<CalendarDate> {
        self.window
            .days()
            .filter(|d| *d >= from)
            .find(|d| !self.is_date_fully_booked(*d))
    }

    pub fn available_count(&self) -> usize {
        self.window_days().filter(|(_, s)| *s == DayState::Available).count()
    }
}
