//! Booking workflow: customer submission, admin response, dashboard figures.

use futures::future::try_join_all;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};

use crate::engine::{AvailabilityEngine, EngineError};
use crate::limits::{DASHBOARD_RECENT_PENDING, MAX_TIME_SLOT_LEN};
use crate::model::*;
use crate::session::Session;
use crate::source::{optional, BookingSource, CatalogSource, IdentityProvider, SourceError};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum BookingError {
    #[error("sign in to request a booking")]
    LoginRequired,
    #[error("select a {0}")]
    MissingSelection(&'static str),
    #[error("time slot is longer than {max} characters")]
    TimeSlotTooLong { max: usize },
    #[error("{0} is not available for booking")]
    DateUnavailable(CalendarDate),
    #[error("booking is {from} and cannot become {to}")]
    InvalidTransition { from: BookingStatus, to: BookingStatus },
    #[error("not allowed")]
    Forbidden,
    #[error(transparent)]
    Engine(#[from] EngineError),
    #[error(transparent)]
    Source(#[from] SourceError),
}

/// What the product page collects before submitting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BookingRequest {
    pub product_id: ProductId,
    pub date: Option<CalendarDate>,
    pub time_slot: Option<TimeSlot>,
}

/// Submit a rental request for the date picked in `engine`'s calendar.
///
/// The date must be selectable in the engine's current view. The backend
/// still has the last word; a lost race also surfaces as `DateUnavailable`,
/// while other refusals (e.g. a withdrawn product) pass through as `Source`.
pub async fn submit_booking(
    session: Option<&Session>,
    engine: &AvailabilityEngine,
    bookings: &dyn BookingSource,
    request: BookingRequest,
) -> Result<Booking, BookingError> {
    let session = session.ok_or(BookingError::LoginRequired)?;
    let date = request.date.ok_or(BookingError::MissingSelection("date"))?;
    let time_slot = request
        .time_slot
        .filter(|slot| !slot.as_str().trim().is_empty())
        .ok_or(BookingError::MissingSelection("time slot"))?;
    if time_slot.as_str().len() > MAX_TIME_SLOT_LEN {
        return Err(BookingError::TimeSlotTooLong { max: MAX_TIME_SLOT_LEN });
    }
    if request.product_id != engine.product_id() {
        return Err(BookingError::Forbidden);
    }

    if !engine.view().is_selectable(date)? {
        return Err(BookingError::DateUnavailable(date));
    }

    let result = bookings
        .create_booking(NewBooking {
            product_id: request.product_id,
            user_id: session.user_id(),
            date,
            time_slot,
        })
        .await;
    metrics::counter!(
        crate::observability::BOOKINGS_SUBMITTED_TOTAL,
        "status" => crate::observability::outcome_label(&result)
    )
    .increment(1);

    match result {
        Ok(booking) => {
            info!(booking = %booking.id, user = %booking.user_id, date = %booking.booking_date, "booking submitted");
            Ok(booking)
        }
        Err(SourceError::Conflict(reason)) => {
            warn!(product = %request.product_id, %date, "booking lost race: {reason}");
            Err(BookingError::DateUnavailable(date))
        }
        Err(e) => Err(e.into()),
    }
}

/// Admin accepts or cancels a pending booking.
pub async fn respond_to_booking(
    session: &Session,
    bookings: &dyn BookingSource,
    id: BookingId,
    status: BookingStatus,
) -> Result<Booking, BookingError> {
    if !session.is_admin() {
        return Err(BookingError::Forbidden);
    }
    let current = bookings.get_booking(id).await?;
    transition(current, status, bookings).await
}

/// A customer withdraws their own pending request.
pub async fn cancel_own_booking(
    session: &Session,
    bookings: &dyn BookingSource,
    id: BookingId,
) -> Result<Booking, BookingError> {
    let current = bookings.get_booking(id).await?;
    if current.user_id != session.user_id() {
        return Err(BookingError::Forbidden);
    }
    transition(current, BookingStatus::Cancelled, bookings).await
}

async fn transition(
    current: Booking,
    status: BookingStatus,
    bookings: &dyn BookingSource,
) -> Result<Booking, BookingError> {
    if !current.status.can_transition_to(status) {
        return Err(BookingError::InvalidTransition {
            from: current.status,
            to: status,
        });
    }
    let updated = bookings.set_booking_status(current.id, status).await?;
    info!(booking = %updated.id, status = %updated.status, "booking updated");
    Ok(updated)
}

// ── Dashboard ────────────────────────────────────────────

/// Headline counts for the admin dashboard.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub total_bookings: usize,
    pub pending_bookings: usize,
    pub accepted_bookings: usize,
    pub total_products: usize,
}

impl DashboardStats {
    pub fn compute(bookings: &[Booking], total_products: usize) -> Self {
        let count = |status| bookings.iter().filter(|b| b.status == status).count();
        Self {
            total_bookings: bookings.len(),
            pending_bookings: count(BookingStatus::Pending),
            accepted_bookings: count(BookingStatus::Accepted),
            total_products,
        }
    }
}

/// The first pending bookings of a newest-first list, at most [`DASHBOARD_RECENT_PENDING`].
pub fn recent_pending(bookings: &[Booking]) -> Vec<&Booking> {
    bookings
        .iter()
        .filter(|b| b.status == BookingStatus::Pending)
        .take(DASHBOARD_RECENT_PENDING)
        .collect()
}

/// A booking with its product and customer, where they still exist.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookingDetails {
    pub booking: Booking,
    pub product: Option<Product>,
    pub customer: Option<UserProfile>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Dashboard {
    pub stats: DashboardStats,
    pub bookings: Vec<BookingDetails>,
}

/// Every booking, newest first, joined with product and customer.
pub async fn load_dashboard(
    session: &Session,
    bookings: &dyn BookingSource,
    catalog: &dyn CatalogSource,
    identity: &dyn IdentityProvider,
) -> Result<Dashboard, BookingError> {
    if !session.is_admin() {
        return Err(BookingError::Forbidden);
    }
    let all = bookings.list_bookings(None).await?;
    let products = catalog.list_products(&Default::default()).await?;
    let stats = DashboardStats::compute(&all, products.len());

    let details = try_join_all(all.into_iter().map(|booking| async move {
        let product = optional(catalog.get_product(booking.product_id).await)?;
        let customer = optional(identity.profile(booking.user_id).await)?;
        Ok::<_, SourceError>(BookingDetails {
            booking,
            product,
            customer,
        })
    }))
    .await?;

    Ok(Dashboard {
        stats,
        bookings: details,
    })
}
