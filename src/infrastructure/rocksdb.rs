use crate::domain::booking::{self, Booking, BookingId, BookingStatus};
use crate::domain::listing::{Listing, ListingId};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::ports::{
    BookingChange, BookingStore, ListingStore, PaymentStore, ReviewStore, UserStore,
};
use crate::domain::review::Review;
use crate::domain::user::{User, UserId};
use crate::error::{MarketError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{ColumnFamily, ColumnFamilyDescriptor, DB, IteratorMode, Options, WriteBatch};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Column Family for user accounts, keyed by user id.
pub const CF_USERS: &str = "users";
/// Column Family for listings, keyed by listing id.
pub const CF_LISTINGS: &str = "listings";
/// Column Family for bookings, keyed by booking id.
pub const CF_BOOKINGS: &str = "bookings";
/// Column Family for payments, keyed by gateway reference.
pub const CF_PAYMENTS: &str = "payments";
/// Column Family for reviews, keyed by `listing_id ++ reviewer_id`.
pub const CF_REVIEWS: &str = "reviews";

const COLUMN_FAMILIES: [&str; 5] = [CF_USERS, CF_LISTINGS, CF_BOOKINGS, CF_PAYMENTS, CF_REVIEWS];

/// A persistent store implementation using RocksDB.
///
/// Every table lives in its own Column Family of one database, so a
/// `WriteBatch` commits changes to several tables atomically. Read-check-write
/// sequences (overlap re-check, compare-and-set status updates, uniqueness
/// checks) are serialized through `write_lock`; plain reads never take it.
///
/// This struct is thread-safe (`Clone` shares the underlying `Arc<DB>`).
#[derive(Clone)]
pub struct RocksDBStore {
    db: Arc<DB>,
    write_lock: Arc<Mutex<()>>,
}

impl RocksDBStore {
    /// Opens or creates a RocksDB instance at the specified path.
    ///
    /// Ensures that all marketplace column families exist.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let descriptors = COLUMN_FAMILIES
            .iter()
            .map(|name| ColumnFamilyDescriptor::new(*name, Options::default()));

        let db = DB::open_cf_descriptors(&opts, path, descriptors)?;

        Ok(Self {
            db: Arc::new(db),
            write_lock: Arc::new(Mutex::new(())),
        })
    }

    fn cf(&self, name: &'static str) -> Result<&ColumnFamily> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| MarketError::internal(format!("{name} column family not found")))
    }

    fn get_json<T: DeserializeOwned>(&self, cf: &'static str, key: &[u8]) -> Result<Option<T>> {
        match self.db.get_pinned_cf(self.cf(cf)?, key)? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, cf: &'static str, key: &[u8], value: &T) -> Result<()> {
        self.db.put_cf(self.cf(cf)?, key, encode(value)?)?;
        Ok(())
    }

    fn scan_json<T: DeserializeOwned>(&self, cf: &'static str) -> Result<Vec<T>> {
        let mut rows = Vec::new();
        for item in self.db.iterator_cf(self.cf(cf)?, IteratorMode::Start) {
            let (_key, value) = item?;
            rows.push(decode(&value)?);
        }
        Ok(rows)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(value)
        .map_err(|e| MarketError::internal(format!("Serialization error: {e}")))
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| MarketError::internal(format!("Deserialization error: {e}")))
}

fn review_key(listing_id: ListingId, reviewer_id: UserId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(listing_id.as_bytes());
    key.extend_from_slice(reviewer_id.as_bytes());
    key
}

fn check_status(stored: &Booking, expected: BookingStatus) -> Result<()> {
    if stored.status != expected {
        return Err(MarketError::Conflict(format!(
            "booking {} changed concurrently (now {})",
            stored.booking_id, stored.status
        )));
    }
    Ok(())
}

fn check_version(stored: &Listing, expected_updated_at: DateTime<Utc>) -> Result<()> {
    if stored.updated_at != expected_updated_at {
        return Err(MarketError::Conflict(format!(
            "listing {} changed concurrently",
            stored.listing_id
        )));
    }
    Ok(())
}

#[async_trait]
impl UserStore for RocksDBStore {
    async fn insert_user(&self, user: User) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let taken = self
            .scan_json::<User>(CF_USERS)?
            .iter()
            .any(|u| u.username == user.username);
        if taken {
            return Err(MarketError::Conflict(
                "A user with that username already exists.".to_string(),
            ));
        }
        self.put_json(CF_USERS, user.user_id.as_bytes(), &user)
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        self.get_json(CF_USERS, user_id.as_bytes())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        Ok(self
            .scan_json::<User>(CF_USERS)?
            .into_iter()
            .find(|u| u.username == username))
    }

    async fn all_users(&self) -> Result<Vec<User>> {
        self.scan_json(CF_USERS)
    }
}

#[async_trait]
impl ListingStore for RocksDBStore {
    async fn store_listing(&self, listing: Listing) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        self.put_json(CF_LISTINGS, listing.listing_id.as_bytes(), &listing)
    }

    async fn update_listing(
        &self,
        listing: &Listing,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let stored: Listing = self
            .get_json(CF_LISTINGS, listing.listing_id.as_bytes())?
            .ok_or(MarketError::NotFound("Listing"))?;
        check_version(&stored, expected_updated_at)?;
        self.put_json(CF_LISTINGS, listing.listing_id.as_bytes(), listing)
    }

    async fn get_listing(&self, listing_id: ListingId) -> Result<Option<Listing>> {
        self.get_json(CF_LISTINGS, listing_id.as_bytes())
    }

    async fn all_listings(&self) -> Result<Vec<Listing>> {
        self.scan_json(CF_LISTINGS)
    }

    async fn delete_listing(&self, listing_id: ListingId) -> Result<bool> {
        let _guard = self.write_lock.lock().await;
        if self
            .get_json::<Listing>(CF_LISTINGS, listing_id.as_bytes())?
            .is_none()
        {
            return Ok(false);
        }

        let mut batch = WriteBatch::default();
        batch.delete_cf(self.cf(CF_LISTINGS)?, listing_id.as_bytes());

        let doomed: Vec<BookingId> = self
            .scan_json::<Booking>(CF_BOOKINGS)?
            .into_iter()
            .filter(|b| b.listing_id == listing_id)
            .map(|b| b.booking_id)
            .collect();
        for booking_id in &doomed {
            batch.delete_cf(self.cf(CF_BOOKINGS)?, booking_id.as_bytes());
        }
        for payment in self.scan_json::<Payment>(CF_PAYMENTS)? {
            if doomed.contains(&payment.booking_id) {
                batch.delete_cf(self.cf(CF_PAYMENTS)?, payment.reference.as_bytes());
            }
        }
        for review in self.scan_json::<Review>(CF_REVIEWS)? {
            if review.listing_id == listing_id {
                batch.delete_cf(
                    self.cf(CF_REVIEWS)?,
                    review_key(review.listing_id, review.reviewer_id),
                );
            }
        }

        self.db.write(batch)?;
        Ok(true)
    }
}

#[async_trait]
impl BookingStore for RocksDBStore {
    async fn insert_booking(&self, new: Booking) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let live: Vec<Booking> = self
            .scan_json::<Booking>(CF_BOOKINGS)?
            .into_iter()
            .filter(|b| b.listing_id == new.listing_id && b.status.is_live())
            .collect();
        if live
            .iter()
            .any(|b| b.start_date == new.start_date && b.end_date == new.end_date)
        {
            return Err(MarketError::Conflict(
                "A booking for this listing and these dates already exists.".to_string(),
            ));
        }
        booking::ensure_no_overlap(new.listing_id, &new.dates(), &live)?;
        self.put_json(CF_BOOKINGS, new.booking_id.as_bytes(), &new)
    }

    async fn get_booking(&self, booking_id: BookingId) -> Result<Option<Booking>> {
        self.get_json(CF_BOOKINGS, booking_id.as_bytes())
    }

    async fn bookings_for_listing(&self, listing_id: ListingId) -> Result<Vec<Booking>> {
        Ok(self
            .scan_json::<Booking>(CF_BOOKINGS)?
            .into_iter()
            .filter(|b| b.listing_id == listing_id)
            .collect())
    }

    async fn all_bookings(&self) -> Result<Vec<Booking>> {
        self.scan_json(CF_BOOKINGS)
    }

    async fn update_booking(&self, booking: &Booking, expected: BookingStatus) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let stored: Booking = self
            .get_json(CF_BOOKINGS, booking.booking_id.as_bytes())?
            .ok_or(MarketError::NotFound("Booking"))?;
        check_status(&stored, expected)?;
        self.put_json(CF_BOOKINGS, booking.booking_id.as_bytes(), booking)
    }
}

#[async_trait]
impl PaymentStore for RocksDBStore {
    async fn insert_payment(&self, payment: Payment) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        if self
            .get_json::<Booking>(CF_BOOKINGS, payment.booking_id.as_bytes())?
            .is_none()
        {
            return Err(MarketError::NotFound("Booking"));
        }
        if self
            .get_json::<Payment>(CF_PAYMENTS, payment.reference.as_bytes())?
            .is_some()
        {
            return Err(MarketError::Conflict(format!(
                "payment reference {} already recorded",
                payment.reference
            )));
        }
        self.put_json(CF_PAYMENTS, payment.reference.as_bytes(), &payment)
    }

    async fn payment_by_reference(&self, reference: &str) -> Result<Option<Payment>> {
        self.get_json(CF_PAYMENTS, reference.as_bytes())
    }

    async fn payments_for_booking(&self, booking_id: BookingId) -> Result<Vec<Payment>> {
        Ok(self
            .scan_json::<Payment>(CF_PAYMENTS)?
            .into_iter()
            .filter(|p| p.booking_id == booking_id)
            .collect())
    }

    async fn commit_settlement(
        &self,
        payment: &Payment,
        previous: PaymentStatus,
        change: Option<BookingChange>,
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let stored: Payment = self
            .get_json(CF_PAYMENTS, payment.reference.as_bytes())?
            .ok_or(MarketError::NotFound("Payment"))?;
        if stored.payment_status != previous {
            return Err(MarketError::Conflict(format!(
                "payment {} changed concurrently (now {})",
                payment.reference, stored.payment_status
            )));
        }

        let mut batch = WriteBatch::default();
        batch.put_cf(
            self.cf(CF_PAYMENTS)?,
            payment.reference.as_bytes(),
            encode(payment)?,
        );
        if let Some(change) = change {
            let stored: Booking = self
                .get_json(CF_BOOKINGS, change.booking.booking_id.as_bytes())?
                .ok_or(MarketError::NotFound("Booking"))?;
            check_status(&stored, change.expected)?;
            batch.put_cf(
                self.cf(CF_BOOKINGS)?,
                change.booking.booking_id.as_bytes(),
                encode(&change.booking)?,
            );
        }
        // One batch: the payment and booking rows land together or not at all.
        self.db.write(batch)?;
        Ok(())
    }
}

#[async_trait]
impl ReviewStore for RocksDBStore {
    async fn insert_review(&self, review: Review) -> Result<()> {
        let _guard = self.write_lock.lock().await;
        let key = review_key(review.listing_id, review.reviewer_id);
        if self.get_json::<Review>(CF_REVIEWS, &key)?.is_some() {
            return Err(MarketError::Conflict(
                "You have already reviewed this listing.".to_string(),
            ));
        }
        self.put_json(CF_REVIEWS, &key, &review)
    }

    async fn reviews_for_listing(&self, listing_id: ListingId) -> Result<Vec<Review>> {
        let mut reviews = Vec::new();
        let prefix = listing_id.as_bytes();
        for item in self.db.prefix_iterator_cf(self.cf(CF_REVIEWS)?, prefix) {
            let (key, value) = item?;
            if !key.starts_with(prefix) {
                break;
            }
            reviews.push(decode::<Review>(&value)?);
        }
        reviews.sort_by_key(|r| r.created_at);
        Ok(reviews)
    }
}
