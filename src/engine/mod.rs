mod availability;
mod error;
#[cfg(test)]
mod tests;
mod window;

pub use availability::{Availability, AvailabilitySet};
pub use error::EngineError;
pub use window::{compute_window, parse_date, validate_date, MonthDay, Season};

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::limits::SESSION_COMMAND_QUEUE;
use crate::model::*;
use crate::notify::{Notification, Subscription};
use crate::source::{AvailabilitySource, SourceError};

// ── Published view ───────────────────────────────────────

/// Freshness of the published availability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RefreshStatus {
    /// No fetch has completed yet.
    Loading,
    Fresh,
    /// The last fetch failed. Any previous set is kept but must not be trusted.
    Stale(EngineError),
}

/// Snapshot of a product's availability as last derived by its session.
#[derive(Debug, Clone)]
pub struct AvailabilityView {
    pub product_id: ProductId,
    pub window: BookingWindow,
    pub status: RefreshStatus,
    /// Completed fetches, successful or not.
    pub generation: u64,
    pub refreshed_at: Option<DateTime<Utc>>,
    last_known: Option<Availability>,
}

impl AvailabilityView {
    fn loading(product_id: ProductId, window: BookingWindow) -> Self {
        Self {
            product_id,
            window,
            status: RefreshStatus::Loading,
            generation: 0,
            refreshed_at: None,
            last_known: None,
        }
    }

    fn refreshed(&self, set: AvailabilitySet) -> Self {
        Self {
            status: RefreshStatus::Fresh,
            generation: self.generation + 1,
            refreshed_at: Some(Utc::now()),
            last_known: Some(Availability::new(self.window, set)),
            ..self.clone()
        }
    }

    fn failed(&self, error: EngineError) -> Self {
        Self {
            status: RefreshStatus::Stale(error),
            generation: self.generation + 1,
            ..self.clone()
        }
    }

    pub fn is_loaded(&self) -> bool {
        self.last_known.is_some()
    }

    pub fn is_fresh(&self) -> bool {
        self.status == RefreshStatus::Fresh
    }

    /// The availability to answer from, or why there is none to trust.
    pub fn current(&self) -> Result<&Availability, EngineError> {
        match (&self.status, &self.last_known) {
            (RefreshStatus::Fresh, Some(availability)) => Ok(availability),
            (RefreshStatus::Stale(error), _) => Err(error.clone()),
            _ => Err(EngineError::NotLoaded),
        }
    }

    /// Last successfully fetched availability, even if a later refresh failed.
    pub fn last_known(&self) -> Option<&Availability> {
        self.last_known.as_ref()
    }

    pub fn is_within_window(&self, date: CalendarDate) -> Result<bool, EngineError> {
        validate_date(date)?;
        Ok(self.window.contains(date))
    }

    pub fn is_date_booked(&self, date: CalendarDate, time_slot: &TimeSlot) -> Result<bool, EngineError> {
        validate_date(date)?;
        Ok(self.current()?.is_date_booked(date, time_slot))
    }

    pub fn is_date_fully_booked(&self, date: CalendarDate) -> Result<bool, EngineError> {
        validate_date(date)?;
        Ok(self.current()?.is_date_fully_booked(date))
    }

    pub fn is_selectable(&self, date: CalendarDate) -> Result<bool, EngineError> {
        validate_date(date)?;
        Ok(self.current()?.is_selectable(date))
    }

    /// Fail-closed predicate for calendar cells: unknown availability is unselectable.
    pub fn is_selectable_or_closed(&self, date: CalendarDate) -> bool {
        self.is_selectable(date).unwrap_or(false)
    }

    pub fn day_state(&self, date: CalendarDate) -> Result<DayState, EngineError> {
        validate_date(date)?;
        Ok(self.current()?.day_state(date))
    }
}

// ── Session task ─────────────────────────────────────────

enum EngineCommand {
    Refresh {
        response: oneshot::Sender<Result<(), EngineError>>,
    },
}

struct SessionTask {
    source: Arc<dyn AvailabilitySource>,
    product_id: ProductId,
    subscription: Subscription,
    commands: mpsc::Receiver<EngineCommand>,
    view_tx: watch::Sender<Arc<AvailabilityView>>,
    cancel: CancellationToken,
}

impl SessionTask {
    /// Fetch, publish, then sleep until a notification or refresh request arrives.
    ///
    /// Everything queued while a fetch is in flight is coalesced into one follow-up fetch,
    /// so the published set converges to the backend's latest state.
    async fn run(mut self) {
        metrics::gauge!(crate::observability::SESSIONS_ACTIVE).increment(1.0);
        let mut waiting: Vec<oneshot::Sender<Result<(), EngineError>>> = Vec::new();
        let mut feed_open = true;

        loop {
            self.take_queued_commands(&mut waiting);

            let fetch_start = Instant::now();
            let fetched = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                result = self.source.fetch_booked_entries(self.product_id) => result,
            };
            if self.cancel.is_cancelled() {
                debug!(product = %self.product_id, "discarding fetch result after teardown");
                break;
            }
            metrics::histogram!(crate::observability::FETCH_DURATION_SECONDS)
                .record(fetch_start.elapsed().as_secs_f64());

            let outcome = self.publish(fetched);
            for response in waiting.drain(..) {
                let _ = response.send(outcome.clone());
            }

            if !self.wait_for_trigger(&mut waiting, &mut feed_open).await {
                break;
            }
        }

        for response in waiting.drain(..) {
            let _ = response.send(Err(EngineError::Closed));
        }
        metrics::gauge!(crate::observability::SESSIONS_ACTIVE).decrement(1.0);
        debug!(product = %self.product_id, "availability session ended");
    }

    /// Block until something asks for a refetch. `false` means the session is over.
    async fn wait_for_trigger(
        &mut self,
        waiting: &mut Vec<oneshot::Sender<Result<(), EngineError>>>,
        feed_open: &mut bool,
    ) -> bool {
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return false,
                command = self.commands.recv() => match command {
                    Some(EngineCommand::Refresh { response }) => {
                        waiting.push(response);
                        return true;
                    }
                    None => return false,
                },
                notification = self.subscription.recv(), if *feed_open => match notification {
                    Some(notification) => {
                        let coalesced = 1 + self.subscription.drain();
                        if let Notification::Lagged(n) = notification {
                            debug!(product = %self.product_id, dropped = n, "change feed lagged");
                        }
                        metrics::counter!(crate::observability::NOTIFICATIONS_TOTAL)
                            .increment(coalesced as u64);
                        debug!(product = %self.product_id, coalesced, "booked dates changed, refetching");
                        return true;
                    }
                    None => {
                        warn!(product = %self.product_id, "change feed closed, refreshing on demand only");
                        *feed_open = false;
                    }
                },
            }
        }
    }

    fn take_queued_commands(&mut self, waiting: &mut Vec<oneshot::Sender<Result<(), EngineError>>>) {
        while let Ok(EngineCommand::Refresh { response }) = self.commands.try_recv() {
            waiting.push(response);
        }
    }

    /// Replace the published view in one step.
    fn publish(&self, fetched: Result<Vec<BookedDateEntry>, SourceError>) -> Result<(), EngineError> {
        let previous = self.view_tx.borrow().clone();
        let (next, outcome) = match fetched {
            Ok(entries) => {
                let set = AvailabilitySet::from_entries(entries);
                debug!(product = %self.product_id, entries = set.len(), "availability refreshed");
                metrics::counter!(crate::observability::REFRESHES_TOTAL, "status" => "ok").increment(1);
                (previous.refreshed(set), Ok(()))
            }
            Err(e) => {
                warn!(product = %self.product_id, "availability refresh failed: {e}");
                metrics::counter!(crate::observability::REFRESHES_TOTAL, "status" => "error").increment(1);
                let error = EngineError::FetchFailed(e);
                (previous.failed(error.clone()), Err(error))
            }
        };
        self.view_tx.send_replace(Arc::new(next));
        outcome
    }
}

// ── Engine handle ────────────────────────────────────────

/// Availability for one product-viewing session.
///
/// Owns a background task that keeps the booked-date set in step with the
/// backend's change feed. Closing or dropping the engine unsubscribes and
/// discards any fetch still in flight.
pub struct AvailabilityEngine {
    product_id: ProductId,
    window: BookingWindow,
    view_rx: watch::Receiver<Arc<AvailabilityView>>,
    commands: mpsc::Sender<EngineCommand>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl AvailabilityEngine {
    /// Compute the window for `today`, subscribe to the product's change feed and start the first fetch.
    pub fn open(
        source: Arc<dyn AvailabilitySource>,
        product_id: ProductId,
        season: &Season,
        today: CalendarDate,
    ) -> Result<Self, EngineError> {
        let window = compute_window(season, today)?;
        let subscription = source.subscribe(product_id)?;

        let (view_tx, view_rx) = watch::channel(Arc::new(AvailabilityView::loading(product_id, window)));
        let (commands_tx, commands_rx) = mpsc::channel(SESSION_COMMAND_QUEUE);
        let cancel = CancellationToken::new();

        let task = SessionTask {
            source,
            product_id,
            subscription,
            commands: commands_rx,
            view_tx,
            cancel: cancel.clone(),
        };
        let handle = tokio::spawn(task.run());
        info!(product = %product_id, start = %window.start(), end = %window.end(), "availability session opened");

        Ok(Self {
            product_id,
            window,
            view_rx,
            commands: commands_tx,
            cancel,
            task: Some(handle),
        })
    }

    pub fn product_id(&self) -> ProductId {
        self.product_id
    }

    pub fn window(&self) -> BookingWindow {
        self.window
    }

    /// The most recently published view.
    pub fn view(&self) -> Arc<AvailabilityView> {
        self.view_rx.borrow().clone()
    }

    /// Receiver for collaborators that re-render on every published view.
    pub fn watch(&self) -> watch::Receiver<Arc<AvailabilityView>> {
        self.view_rx.clone()
    }

    /// Wait for the first fetch to complete.
    pub async fn ready(&self) -> Result<Arc<AvailabilityView>, EngineError> {
        let view = self.wait_for(|view| view.status != RefreshStatus::Loading).await?;
        match &view.status {
            RefreshStatus::Stale(error) => Err(error.clone()),
            _ => Ok(view),
        }
    }

    /// Wait until a published view satisfies `predicate`.
    pub async fn wait_for(
        &self,
        predicate: impl FnMut(&Arc<AvailabilityView>) -> bool,
    ) -> Result<Arc<AvailabilityView>, EngineError> {
        let mut rx = self.view_rx.clone();
        let view = rx.wait_for(predicate).await.map_err(|_| EngineError::Closed)?;
        Ok(view.clone())
    }

    /// Fetch again now. Resolves once a fetch that started after this call has been published.
    pub async fn refresh(&self) -> Result<Arc<AvailabilityView>, EngineError> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(EngineCommand::Refresh { response: tx })
            .await
            .map_err(|_| EngineError::Closed)?;
        rx.await.map_err(|_| EngineError::Closed)??;
        Ok(self.view())
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// End the session and wait for its task to stop.
    pub async fn close(mut self) {
        self.cancel.cancel();
        if let Some(handle) = self.task.take()
            && let Err(e) = handle.await
        {
            warn!(product = %self.product_id, "availability session task failed: {e}");
        }
        info!(product = %self.product_id, "availability session closed");
    }
}

impl Drop for AvailabilityEngine {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
