//! Seams to the hosted backend.
//!
//! Authentication, persistence and the realtime feed live outside this crate.
//! Everything the core needs from them goes through these traits.

use async_trait::async_trait;
use thiserror::Error;
use ulid::Ulid;

use crate::catalog::ProductFilters;
use crate::model::*;
use crate::notify::Subscription;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SourceError {
    #[error("backend unavailable: {0}")]
    Unavailable(String),
    #[error("not found: {0}")]
    NotFound(Ulid),
    #[error("rejected by backend: {0}")]
    Rejected(String),
    /// The write lost to a concurrent one, e.g. the date was taken meanwhile.
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("invalid credentials")]
    InvalidCredentials,
    #[error("malformed backend data: {0}")]
    Parse(String),
}

impl From<std::io::Error> for SourceError {
    fn from(err: std::io::Error) -> Self {
        SourceError::Unavailable(err.to_string())
    }
}

impl From<serde_json::Error> for SourceError {
    fn from(err: serde_json::Error) -> Self {
        SourceError::Parse(err.to_string())
    }
}

/// Treat a missing record as absent rather than as a failure.
pub(crate) fn optional<T>(result: Result<T, SourceError>) -> Result<Option<T>, SourceError> {
    match result {
        Ok(value) => Ok(Some(value)),
        Err(SourceError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

/// Booked dates of a product and their change feed.
#[async_trait]
pub trait AvailabilitySource: Send + Sync {
    /// Currently booked entries for `product_id`.
    async fn fetch_booked_entries(&self, product_id: ProductId) -> Result<Vec<BookedDateEntry>, SourceError>;

    /// Register for change notifications on `product_id`. Dropping the handle unsubscribes.
    fn subscribe(&self, product_id: ProductId) -> Result<Subscription, SourceError>;
}

#[async_trait]
pub trait BookingSource: Send + Sync {
    /// Insert a pending booking and record its date as booked.
    ///
    /// A date that is already booked yields [`SourceError::Conflict`].
    async fn create_booking(&self, booking: NewBooking) -> Result<Booking, SourceError>;

    async fn get_booking(&self, id: BookingId) -> Result<Booking, SourceError>;

    /// All bookings, or only those of `user_id`, newest first.
    async fn list_bookings(&self, user_id: Option<UserId>) -> Result<Vec<Booking>, SourceError>;

    /// Move a booking to `status`. Cancelling releases the booked date.
    async fn set_booking_status(&self, id: BookingId, status: BookingStatus) -> Result<Booking, SourceError>;
}

#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Products matching `filters`, newest first.
    async fn list_products(&self, filters: &ProductFilters) -> Result<Vec<Product>, SourceError>;

    async fn get_product(&self, id: ProductId) -> Result<Product, SourceError>;

    async fn insert_product(&self, draft: ProductDraft) -> Result<Product, SourceError>;

    async fn set_product_available(&self, id: ProductId, available: bool) -> Result<Product, SourceError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[async_trait]
pub trait IdentityProvider: Send + Sync {
    async fn authenticate(&self, credentials: &Credentials) -> Result<UserProfile, SourceError>;

    /// Create an account. A taken email or a blank name or email is `Rejected`.
    async fn register(&self, profile: UserProfile, password: &str) -> Result<UserProfile, SourceError>;

    async fn profile(&self, user_id: UserId) -> Result<UserProfile, SourceError>;
}

#[async_trait]
pub trait ReviewSource: Send + Sync {
    /// Reviews of `product_id`, newest first.
    async fn list_reviews(&self, product_id: ProductId) -> Result<Vec<Review>, SourceError>;

    async fn add_review(&self, review: NewReview) -> Result<Review, SourceError>;
}
