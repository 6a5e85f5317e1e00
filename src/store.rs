//! In-process backend implementing every source trait.
//!
//! Stands in for the hosted service in tests, the bench and the demo binary.
//! Every mutation publishes a [`ChangeEvent`] on its product's channel.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tracing::{debug, info, warn};
use ulid::Ulid;

use crate::catalog::{filter_products, ProductFilters};
use crate::limits::MAX_REVIEW_RATING;
use crate::model::*;
use crate::notify::{NotifyHub, Subscription};
use crate::source::*;

pub struct MemoryBackend {
    products: DashMap<ProductId, Product>,
    bookings: DashMap<BookingId, Booking>,
    /// Booked-date entries per product.
    booked: DashMap<ProductId, Vec<BookedDateEntry>>,
    profiles: DashMap<UserId, UserProfile>,
    /// email → (password, user)
    accounts: DashMap<String, (String, UserId)>,
    reviews: DashMap<ProductId, Vec<Review>>,
    notify: Arc<NotifyHub>,
}

impl Default for MemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self {
            products: DashMap::new(),
            bookings: DashMap::new(),
            booked: DashMap::new(),
            profiles: DashMap::new(),
            accounts: DashMap::new(),
            reviews: DashMap::new(),
            notify: Arc::new(NotifyHub::new()),
        }
    }

    pub fn notify(&self) -> &Arc<NotifyHub> {
        &self.notify
    }

    // ── Availability records ─────────────────────────────────

    /// Record a booked date directly, as an admin import would.
    pub fn record_booked_date(&self, product_id: ProductId, entry: BookedDateEntry) {
        let event = ChangeEvent::BookingRequested {
            product_id,
            booking_id: entry.booking_id,
            date: entry.date,
        };
        self.booked.entry(product_id).or_default().push(entry);
        self.notify.send(&event);
    }

    fn release_booked_date(&self, booking: &Booking) {
        if let Some(mut entries) = self.booked.get_mut(&booking.product_id) {
            entries.retain(|e| e.booking_id != booking.id);
        }
        self.notify.send(&ChangeEvent::AvailabilityReleased {
            product_id: booking.product_id,
            booking_id: booking.id,
            date: booking.booking_date,
        });
    }

    pub fn booked_count(&self, product_id: &ProductId) -> usize {
        self.booked.get(product_id).map_or(0, |e| e.len())
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }
}

#[async_trait]
impl AvailabilitySource for MemoryBackend {
    async fn fetch_booked_entries(&self, product_id: ProductId) -> Result<Vec<BookedDateEntry>, SourceError> {
        Ok(self
            .booked
            .get(&product_id)
            .map(|e| e.value().clone())
            .unwrap_or_default())
    }

    fn subscribe(&self, product_id: ProductId) -> Result<Subscription, SourceError> {
        Ok(self.notify.subscribe(product_id))
    }
}

#[async_trait]
impl BookingSource for MemoryBackend {
    async fn create_booking(&self, new: NewBooking) -> Result<Booking, SourceError> {
        let product = self
            .products
            .get(&new.product_id)
            .map(|p| p.value().clone())
            .ok_or(SourceError::NotFound(new.product_id))?;
        if !product.available {
            return Err(SourceError::Rejected(format!("{} is not available for rent", product.name)));
        }
        if !self.profiles.contains_key(&new.user_id) {
            return Err(SourceError::NotFound(new.user_id));
        }

        let now = Utc::now();
        let booking = Booking {
            id: Ulid::new(),
            product_id: new.product_id,
            user_id: new.user_id,
            booking_date: new.date,
            time_slot: new.time_slot,
            status: BookingStatus::Pending,
            created_at: now,
            updated_at: now,
        };

        // Check and insert under one shard lock so two requests cannot take the same date.
        {
            let mut entries = self.booked.entry(new.product_id).or_default();
            if entries.iter().any(|e| e.date == new.date) {
                return Err(SourceError::Conflict(format!("{} is already booked", new.date)));
            }
            entries.push(BookedDateEntry {
                date: booking.booking_date,
                time_slot: booking.time_slot.clone(),
                booking_id: booking.id,
            });
        }
        self.bookings.insert(booking.id, booking.clone());
        info!(booking = %booking.id, product = %booking.product_id, date = %booking.booking_date, "booking requested");

        self.notify.send(&ChangeEvent::BookingRequested {
            product_id: booking.product_id,
            booking_id: booking.id,
            date: booking.booking_date,
        });
        Ok(booking)
    }

    async fn get_booking(&self, id: BookingId) -> Result<Booking, SourceError> {
        self.bookings
            .get(&id)
            .map(|b| b.value().clone())
            .ok_or(SourceError::NotFound(id))
    }

    async fn list_bookings(&self, user_id: Option<UserId>) -> Result<Vec<Booking>, SourceError> {
        let mut bookings: Vec<Booking> = self
            .bookings
            .iter()
            .filter(|b| user_id.is_none_or(|u| b.user_id == u))
            .map(|b| b.value().clone())
            .collect();
        bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at).then(b.id.cmp(&a.id)));
        Ok(bookings)
    }

    async fn set_booking_status(&self, id: BookingId, status: BookingStatus) -> Result<Booking, SourceError> {
        let updated = {
            let mut booking = self.bookings.get_mut(&id).ok_or(SourceError::NotFound(id))?;
            if !booking.status.can_transition_to(status) {
                return Err(SourceError::Rejected(format!(
                    "booking {id} is {} and cannot become {status}",
                    booking.status
                )));
            }
            booking.status = status;
            booking.updated_at = Utc::now();
            booking.clone()
        };
        debug!(booking = %id, %status, "booking status changed");

        if status.holds_date() {
            self.notify.send(&ChangeEvent::BookingStatusChanged {
                product_id: updated.product_id,
                booking_id: id,
                status,
            });
        } else {
            self.release_booked_date(&updated);
        }
        Ok(updated)
    }
}

#[async_trait]
impl CatalogSource for MemoryBackend {
    async fn list_products(&self, filters: &ProductFilters) -> Result<Vec<Product>, SourceError> {
        let products: Vec<Product> = self.products.iter().map(|p| p.value().clone()).collect();
        Ok(filter_products(&products, filters))
    }

    async fn get_product(&self, id: ProductId) -> Result<Product, SourceError> {
        self.products
            .get(&id)
            .map(|p| p.value().clone())
            .ok_or(SourceError::NotFound(id))
    }

    async fn insert_product(&self, draft: ProductDraft) -> Result<Product, SourceError> {
        draft
            .validate()
            .map_err(|e| SourceError::Rejected(e.to_string()))?;
        let now = Utc::now();
        let product = Product {
            id: Ulid::new(),
            name: draft.name.trim().to_string(),
            category: draft.category,
            image_url: draft.image_url,
            color: draft.color.trim().to_string(),
            price: draft.price,
            available: true,
            created_at: now,
            updated_at: now,
        };
        self.products.insert(product.id, product.clone());
        info!(product = %product.id, name = %product.name, "product added");
        Ok(product)
    }

    async fn set_product_available(&self, id: ProductId, available: bool) -> Result<Product, SourceError> {
        let mut product = self.products.get_mut(&id).ok_or(SourceError::NotFound(id))?;
        product.available = available;
        product.updated_at = Utc::now();
        Ok(product.clone())
    }
}

#[async_trait]
impl IdentityProvider for MemoryBackend {
    async fn authenticate(&self, credentials: &Credentials) -> Result<UserProfile, SourceError> {
        let email = credentials.email.trim().to_lowercase();
        let user_id = match self.accounts.get(&email) {
            Some(account) if account.0 == credentials.password => account.1,
            _ => return Err(SourceError::InvalidCredentials),
        };
        self.profile(user_id).await
    }

    async fn register(&self, mut profile: UserProfile, password: &str) -> Result<UserProfile, SourceError> {
        profile.name = profile.name.trim().to_string();
        profile.email = profile.email.trim().to_lowercase();
        if profile.name.is_empty() || profile.email.is_empty() {
            return Err(SourceError::Rejected("name and email are required".into()));
        }

        match self.accounts.entry(profile.email.clone()) {
            Entry::Occupied(_) => {
                warn!(email = %profile.email, "registration refused: email taken");
                return Err(SourceError::Rejected(format!("{} is already registered", profile.email)));
            }
            Entry::Vacant(slot) => {
                slot.insert((password.to_string(), profile.id));
            }
        }
        self.profiles.insert(profile.id, profile.clone());
        info!(user = %profile.id, "account registered");
        Ok(profile)
    }

    async fn profile(&self, user_id: UserId) -> Result<UserProfile, SourceError> {
        self.profiles
            .get(&user_id)
            .map(|p| p.value().clone())
            .ok_or(SourceError::NotFound(user_id))
    }
}

#[async_trait]
impl ReviewSource for MemoryBackend {
    async fn list_reviews(&self, product_id: ProductId) -> Result<Vec<Review>, SourceError> {
        let mut reviews = self
            .reviews
            .get(&product_id)
            .map(|r| r.value().clone())
            .unwrap_or_default();
        // Stored in insertion order.
        reviews.reverse();
        Ok(reviews)
    }

    async fn add_review(&self, new: NewReview) -> Result<Review, SourceError> {
        if !(1..=MAX_REVIEW_RATING).contains(&new.rating) {
            return Err(SourceError::Rejected(format!("rating {} is outside 1-{MAX_REVIEW_RATING}", new.rating)));
        }
        if !self.products.contains_key(&new.product_id) {
            return Err(SourceError::NotFound(new.product_id));
        }
        if !self.profiles.contains_key(&new.user_id) {
            return Err(SourceError::NotFound(new.user_id));
        }
        let review = Review {
            id: Ulid::new(),
            product_id: new.product_id,
            user_id: new.user_id,
            rating: new.rating,
            comment: new.comment,
            created_at: Utc::now(),
        };
        self.reviews.entry(review.product_id).or_default().push(review.clone());
        info!(review = %review.id, product = %review.product_id, rating = review.rating, "review added");
        Ok(review)
    }
}
