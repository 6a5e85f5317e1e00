use super::*;
use crate::notify::NotifyHub;

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use chrono::NaiveDate;
use tokio::sync::Semaphore;
use ulid::Ulid;

fn date(y: i32, m: u32, d: u32) -> CalendarDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

fn entry(d: CalendarDate, slot: &str) -> BookedDateEntry {
    BookedDateEntry {
        date: d,
        time_slot: TimeSlot::new(slot),
        booking_id: Ulid::new(),
    }
}

/// Source whose contents, failures and fetch timing are driven by the test.
struct ScriptedSource {
    hub: Arc<NotifyHub>,
    entries: Mutex<Vec<BookedDateEntry>>,
    fail: AtomicBool,
    /// When set, every fetch waits for one permit after reading its entries.
    gate: Option<Semaphore>,
    fetches: AtomicUsize,
}

impl ScriptedSource {
    fn new(entries: Vec<BookedDateEntry>) -> Arc<Self> {
        Arc::new(Self {
            hub: Arc::new(NotifyHub::new()),
            entries: Mutex::new(entries),
            fail: AtomicBool::new(false),
            gate: None,
            fetches: AtomicUsize::new(0),
        })
    }

    fn gated(entries: Vec<BookedDateEntry>) -> Arc<Self> {
        Arc::new(Self {
            hub: Arc::new(NotifyHub::new()),
            entries: Mutex::new(entries),
            fail: AtomicBool::new(false),
            gate: Some(Semaphore::new(0)),
            fetches: AtomicUsize::new(0),
        })
    }

    fn release_fetches(&self, n: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(n);
        }
    }

    fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Change the backend without telling anyone.
    fn book_silently(&self, e: BookedDateEntry) {
        self.entries.lock().unwrap().push(e);
    }

    fn book(&self, product_id: ProductId, e: BookedDateEntry) {
        let event = ChangeEvent::BookingRequested {
            product_id,
            booking_id: e.booking_id,
            date: e.date,
        };
        self.book_silently(e);
        self.hub.send(&event);
    }

    fn release_all(&self, product_id: ProductId) {
        let released: Vec<_> = self.entries.lock().unwrap().drain(..).collect();
        for e in released {
            self.hub.send(&ChangeEvent::AvailabilityReleased {
                product_id,
                booking_id: e.booking_id,
                date: e.date,
            });
        }
    }

    fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }
}

#[async_trait]
impl AvailabilitySource for ScriptedSource {
    async fn fetch_booked_entries(&self, _product_id: ProductId) -> Result<Vec<BookedDateEntry>, SourceError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let snapshot = self.entries.lock().unwrap().clone();
        if let Some(gate) = &self.gate {
            gate.acquire().await.unwrap().forget();
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable("connection reset".into()));
        }
        Ok(snapshot)
    }

    fn subscribe(&self, product_id: ProductId) -> Result<Subscription, SourceError> {
        Ok(self.hub.subscribe(product_id))
    }
}

async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

async fn wait_view(
    engine: &AvailabilityEngine,
    predicate: impl FnMut(&Arc<AvailabilityView>) -> bool,
) -> Arc<AvailabilityView> {
    tokio::time::timeout(Duration::from_secs(5), engine.wait_for(predicate))
        .await
        .expect("view not published in time")
        .unwrap()
}

fn open(source: &Arc<ScriptedSource>, product_id: ProductId, today: CalendarDate) -> AvailabilityEngine {
    AvailabilityEngine::open(source.clone(), product_id, &Season::default(), today).unwrap()
}

// ── Loading ──────────────────────────────────────────────

#[tokio::test]
async fn first_fetch_publishes_fresh_view() {
    let pid = Ulid::new();
    let source = ScriptedSource::new(vec![entry(date(2024, 9, 25), TimeSlot::FULL_DAY)]);
    let engine = open(&source, pid, date(2024, 9, 15));

    assert_eq!(engine.window(), BookingWindow::new(date(2024, 9, 20), date(2024, 10, 10)).unwrap());

    let view = engine.ready().await.unwrap();
    assert!(view.is_fresh());
    assert_eq!(view.generation, 1);
    assert!(view.refreshed_at.is_some());
    assert_eq!(view.product_id, pid);

    assert!(!view.is_selectable(date(2024, 9, 18)).unwrap());
    assert!(view.is_date_fully_booked(date(2024, 9, 25)).unwrap());
    assert!(!view.is_selectable(date(2024, 9, 25)).unwrap());
    assert!(!view.is_date_fully_booked(date(2024, 9, 26)).unwrap());
    assert!(view.is_selectable(date(2024, 9, 26)).unwrap());
    assert!(view.is_date_booked(date(2024, 9, 25), &TimeSlot::full_day()).unwrap());
    assert!(!view.is_date_booked(date(2024, 9, 25), &TimeSlot::new(TimeSlot::MORNING)).unwrap());
    assert_eq!(view.day_state(date(2024, 9, 25)).unwrap(), DayState::Booked);
    assert_eq!(view.day_state(date(2024, 10, 11)).unwrap(), DayState::OutOfWindow);
    engine.close().await;
}

#[tokio::test]
async fn window_after_season_end_is_next_year() {
    let source = ScriptedSource::new(vec![]);
    let engine = open(&source, Ulid::new(), date(2024, 10, 15));
    assert_eq!(engine.window(), BookingWindow::new(date(2025, 9, 20), date(2025, 10, 10)).unwrap());

    let view = engine.ready().await.unwrap();
    assert!(!view.is_selectable(date(2024, 10, 15)).unwrap());
    assert!(view.is_selectable(date(2025, 9, 20)).unwrap());
    engine.close().await;
}

#[tokio::test]
async fn predicates_fail_closed_before_first_fetch() {
    let source = ScriptedSource::gated(vec![]);
    let engine = open(&source, Ulid::new(), date(2024, 9, 15));

    let view = engine.view();
    assert_eq!(view.status, RefreshStatus::Loading);
    assert!(!view.is_loaded());
    assert_eq!(view.is_selectable(date(2024, 9, 25)), Err(EngineError::NotLoaded));
    assert!(!view.is_selectable_or_closed(date(2024, 9, 25)));
    // Window bounds need no fetch.
    assert_eq!(view.is_within_window(date(2024, 9, 25)), Ok(true));
    engine.close().await;
}

#[tokio::test]
async fn out_of_range_dates_rejected() {
    let source = ScriptedSource::new(vec![]);
    let engine = open(&source, Ulid::new(), date(2024, 9, 15));
    let view = engine.ready().await.unwrap();

    assert!(matches!(
        view.is_selectable(date(1969, 12, 31)),
        Err(EngineError::InvalidDate(_))
    ));
    assert!(matches!(
        view.is_within_window(date(9999, 1, 1)),
        Err(EngineError::InvalidDate(_))
    ));
    engine.close().await;
}

#[tokio::test]
async fn open_rejects_unrepresentable_today() {
    let source = ScriptedSource::new(vec![]);
    let result = AvailabilityEngine::open(source.clone(), Ulid::new(), &Season::default(), date(9999, 12, 1));
    assert!(matches!(result, Err(EngineError::InvalidDate(_))));
    assert_eq!(source.fetches(), 0);
}

// ── Change feed ──────────────────────────────────────────

#[tokio::test]
async fn notification_triggers_refetch() {
    let pid = Ulid::new();
    let source = ScriptedSource::new(vec![]);
    let engine = open(&source, pid, date(2024, 9, 15));
    engine.ready().await.unwrap();

    source.book(pid, entry(date(2024, 9, 30), TimeSlot::EVENING));
    let view = wait_view(&engine, |v| v.generation >= 2).await;
    assert!(view.is_date_fully_booked(date(2024, 9, 30)).unwrap());
    assert!(!view.is_selectable(date(2024, 9, 30)).unwrap());

    source.release_all(pid);
    let view = wait_view(&engine, |v| v.is_selectable_or_closed(date(2024, 9, 30))).await;
    assert!(view.is_fresh());
    engine.close().await;
}

#[tokio::test]
async fn notifications_during_fetch_coalesce_into_one_refetch() {
    let pid = Ulid::new();
    let source = ScriptedSource::gated(vec![]);
    let engine = open(&source, pid, date(2024, 9, 15));

    // First fetch has read the empty set and is parked on the gate.
    wait_until(|| source.fetches() == 1).await;
    for day in 21..=25 {
        source.book(pid, entry(date(2024, 9, day), TimeSlot::FULL_DAY));
    }

    source.release_fetches(1);
    let stale = wait_view(&engine, |v| v.generation == 1).await;
    assert!(stale.is_selectable(date(2024, 9, 21)).unwrap());

    wait_until(|| source.fetches() == 2).await;
    source.release_fetches(1);
    let view = wait_view(&engine, |v| v.generation == 2).await;
    for day in 21..=25 {
        assert!(view.is_date_fully_booked(date(2024, 9, day)).unwrap());
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(source.fetches(), 2);
    engine.close().await;
}

#[tokio::test]
async fn lagged_feed_counts_as_change() {
    let pid = Ulid::new();
    let source = ScriptedSource::gated(vec![]);
    let engine = open(&source, pid, date(2024, 9, 15));
    wait_until(|| source.fetches() == 1).await;

    source.book_silently(entry(date(2024, 10, 1), TimeSlot::FULL_DAY));
    for _ in 0..400 {
        source.hub.send(&ChangeEvent::SnapshotReloaded { product_id: pid });
    }
    source.release_fetches(2);

    let view = wait_view(&engine, |v| v.generation == 2).await;
    assert!(view.is_date_fully_booked(date(2024, 10, 1)).unwrap());
    engine.close().await;
}

#[tokio::test]
async fn other_products_do_not_trigger_refetch() {
    let pid = Ulid::new();
    let source = ScriptedSource::new(vec![]);
    let engine = open(&source, pid, date(2024, 9, 15));
    engine.ready().await.unwrap();

    source.hub.send(&ChangeEvent::SnapshotReloaded { product_id: Ulid::new() });
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(source.fetches(), 1);
    assert_eq!(engine.view().generation, 1);
    engine.close().await;
}

// ── Failure ──────────────────────────────────────────────

#[tokio::test]
async fn failed_first_fetch_surfaces_error() {
    let source = ScriptedSource::new(vec![]);
    source.set_failing(true);
    let engine = open(&source, Ulid::new(), date(2024, 9, 15));

    let err = engine.ready().await.unwrap_err();
    assert_eq!(
        err,
        EngineError::FetchFailed(SourceError::Unavailable("connection reset".into()))
    );
    let view = engine.view();
    assert!(!view.is_loaded());
    assert!(!view.is_selectable_or_closed(date(2024, 9, 25)));
    engine.close().await;
}

#[tokio::test]
async fn failed_refresh_keeps_last_known_set_and_marks_stale() {
    let pid = Ulid::new();
    let source = ScriptedSource::new(vec![entry(date(2024, 9, 25), TimeSlot::FULL_DAY)]);
    let engine = open(&source, pid, date(2024, 9, 15));
    engine.ready().await.unwrap();

    source.set_failing(true);
    source.book(pid, entry(date(2024, 9, 26), TimeSlot::FULL_DAY));
    let view = wait_view(&engine, |v| matches!(v.status, RefreshStatus::Stale(_))).await;

    assert!(matches!(view.current(), Err(EngineError::FetchFailed(_))));
    assert!(view.is_selectable(date(2024, 9, 27)).is_err());
    assert!(!view.is_selectable_or_closed(date(2024, 9, 27)));
    let last = view.last_known().unwrap();
    assert!(last.is_date_fully_booked(date(2024, 9, 25)));
    assert!(!last.is_date_fully_booked(date(2024, 9, 26)));

    // No retry on its own.
    tokio::time::sleep(Duration::from_millis(30)).await;
    assert_eq!(source.fetches(), 2);

    source.set_failing(false);
    let view = engine.refresh().await.unwrap();
    assert!(view.is_fresh());
    assert!(view.is_date_fully_booked(date(2024, 9, 26)).unwrap());
    engine.close().await;
}

#[tokio::test]
async fn refresh_reports_fetch_failure() {
    let source = ScriptedSource::new(vec![]);
    let engine = open(&source, Ulid::new(), date(2024, 9, 15));
    engine.ready().await.unwrap();

    source.set_failing(true);
    let result = engine.refresh().await;
    assert!(matches!(result, Err(EngineError::FetchFailed(_))));
    engine.close().await;
}

// ── On demand ────────────────────────────────────────────

#[tokio::test]
async fn refresh_picks_up_unannounced_changes() {
    let source = ScriptedSource::new(vec![]);
    let engine = open(&source, Ulid::new(), date(2024, 9, 15));
    engine.ready().await.unwrap();

    source.book_silently(entry(date(2024, 10, 10), TimeSlot::FULL_DAY));
    assert!(engine.view().is_selectable(date(2024, 10, 10)).unwrap());

    let view = engine.refresh().await.unwrap();
    assert!(!view.is_selectable(date(2024, 10, 10)).unwrap());
    assert!(view.generation >= 2);
    engine.close().await;
}

#[tokio::test]
async fn selectable_is_stable_between_refreshes() {
    let source = ScriptedSource::new(vec![entry(date(2024, 9, 22), TimeSlot::MORNING)]);
    let engine = open(&source, Ulid::new(), date(2024, 9, 15));
    let view = engine.ready().await.unwrap();
    for d in view.window.days() {
        assert_eq!(view.is_selectable(d), view.is_selectable(d));
    }
    assert_eq!(view.current().unwrap().available_count(), 20);
    engine.close().await;
}

// ── Teardown ─────────────────────────────────────────────

#[tokio::test]
async fn close_discards_in_flight_fetch() {
    let pid = Ulid::new();
    let source = ScriptedSource::gated(vec![entry(date(2024, 9, 25), TimeSlot::FULL_DAY)]);
    let engine = open(&source, pid, date(2024, 9, 15));
    let views = engine.watch();

    wait_until(|| source.fetches() == 1).await;
    assert_eq!(source.hub.subscriber_count(&pid), 1);

    engine.close().await;
    source.release_fetches(1);
    tokio::time::sleep(Duration::from_millis(20)).await;

    assert_eq!(views.borrow().status, RefreshStatus::Loading);
    assert_eq!(views.borrow().generation, 0);
    assert_eq!(source.hub.subscriber_count(&pid), 0);
}

#[tokio::test]
async fn dropping_engine_unsubscribes() {
    let pid = Ulid::new();
    let source = ScriptedSource::new(vec![]);
    let engine = open(&source, pid, date(2024, 9, 15));
    engine.ready().await.unwrap();
    assert!(!engine.is_closed());
    assert_eq!(source.hub.subscriber_count(&pid), 1);

    drop(engine);
    wait_until(|| source.hub.subscriber_count(&pid) == 0).await;
    assert!(source.hub.products().is_empty());
}

#[tokio::test]
async fn waiting_refresh_is_answered_on_close() {
    let source = ScriptedSource::gated(vec![]);
    let engine = Arc::new(open(&source, Ulid::new(), date(2024, 9, 15)));
    wait_until(|| source.fetches() == 1).await;

    let pending = tokio::spawn({
        let engine = engine.clone();
        async move { engine.refresh().await }
    });
    tokio::time::sleep(Duration::from_millis(10)).await;
    engine.cancel.cancel();

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(EngineError::Closed)));
}

#[tokio::test]
async fn sessions_for_different_products_are_independent() {
    let (a, b) = (Ulid::new(), Ulid::new());
    let source = ScriptedSource::new(vec![]);
    let first = open(&source, a, date(2024, 9, 15));
    let second = open(&source, b, date(2024, 9, 15));
    first.ready().await.unwrap();
    second.ready().await.unwrap();

    source.book(a, entry(date(2024, 9, 28), TimeSlot::FULL_DAY));
    wait_view(&first, |v| v.generation == 2).await;
    tokio::time::sleep(Duration::from_millis(20)).await;
    assert_eq!(second.view().generation, 1);

    first.close().await;
    second.close().await;
}

#[test]
fn default_season_window_spans_three_weeks() {
    let window = compute_window(&Season::default(), date(2024, 9, 15)).unwrap();
    assert_eq!(window.len_days(), 21);
}
