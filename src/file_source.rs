//! Availability read from a JSON export of the `product_availability` table.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;
use tracing::{debug, info};
use ulid::Ulid;

use crate::model::*;
use crate::notify::{NotifyHub, Subscription};
use crate::source::{AvailabilitySource, SourceError};

#[derive(Debug, Deserialize)]
struct AvailabilityRow {
    product_id: ProductId,
    availability_date: CalendarDate,
    time_slot: TimeSlot,
    #[serde(default)]
    booking_id: Option<BookingId>,
    #[serde(default = "booked_by_default")]
    is_booked: bool,
}

fn booked_by_default() -> bool {
    true
}

impl AvailabilityRow {
    fn into_entry(self) -> BookedDateEntry {
        BookedDateEntry {
            date: self.availability_date,
            time_slot: self.time_slot,
            // Dates blocked by hand carry no booking.
            booking_id: self.booking_id.unwrap_or_else(Ulid::nil),
        }
    }
}

/// File-backed [`AvailabilitySource`]. [`poll_changes`](Self::poll_changes)
/// turns content changes into notifications for every subscribed product.
pub struct JsonSnapshotSource {
    path: PathBuf,
    notify: Arc<NotifyHub>,
    /// CRC32 of the content last seen by the poller.
    digest: Mutex<u32>,
}

impl JsonSnapshotSource {
    /// Read the snapshot once to validate it and record its checksum.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, SourceError> {
        let path = path.as_ref().to_path_buf();
        let bytes = tokio::fs::read(&path).await?;
        let rows = parse_rows(&bytes)?;
        info!(path = %path.display(), rows = rows.len(), "availability snapshot loaded");
        Ok(Self {
            path,
            notify: Arc::new(NotifyHub::new()),
            digest: Mutex::new(crc32fast::hash(&bytes)),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Distinct products in the snapshot, in file order.
    pub async fn products(&self) -> Result<Vec<ProductId>, SourceError> {
        let bytes = tokio::fs::read(&self.path).await?;
        let mut products = Vec::new();
        for row in parse_rows(&bytes)? {
            if !products.contains(&row.product_id) {
                products.push(row.product_id);
            }
        }
        Ok(products)
    }

    /// Re-read the file. Returns whether the content changed since the last poll.
    pub async fn poll_changes(&self) -> Result<bool, SourceError> {
        let bytes = tokio::fs::read(&self.path).await?;
        let digest = crc32fast::hash(&bytes);
        {
            let mut last = self.digest.lock().await;
            if *last == digest {
                return Ok(false);
            }
            *last = digest;
        }

        let products = self.notify.products();
        debug!(path = %self.path.display(), subscribed = products.len(), "availability snapshot changed");
        metrics::counter!(crate::observability::SNAPSHOT_RELOADS_TOTAL).increment(1);
        for product_id in products {
            self.notify.send(&ChangeEvent::SnapshotReloaded { product_id });
        }
        Ok(true)
    }
}

fn parse_rows(bytes: &[u8]) -> Result<Vec<AvailabilityRow>, SourceError> {
    Ok(serde_json::from_slice(bytes)?)
}

#[async_trait]
impl AvailabilitySource for JsonSnapshotSource {
    async fn fetch_booked_entries(&self, product_id: ProductId) -> Result<Vec<BookedDateEntry>, SourceError> {
        let bytes = tokio::fs::read(&self.path).await?;
        Ok(parse_rows(&bytes)?
            .into_iter()
            .filter(|row| row.product_id == product_id && row.is_booked)
            .map(AvailabilityRow::into_entry)
            .collect())
    }

    fn subscribe(&self, product_id: ProductId) -> Result<Subscription, SourceError> {
        Ok(self.notify.subscribe(product_id))
    }
}
