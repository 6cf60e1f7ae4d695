use crate::domain::booking::{self, Booking, BookingId, BookingStatus};
use crate::domain::listing::{Listing, ListingId};
use crate::domain::payment::{Payment, PaymentStatus};
use crate::domain::ports::{
    BookingChange, BookingStore, ListingStore, PaymentStore, ReviewStore, UserStore,
};
use crate::domain::review::{Review, ReviewId};
use crate::domain::user::{User, UserId};
use crate::error::{MarketError, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct Tables {
    users: HashMap<UserId, User>,
    listings: HashMap<ListingId, Listing>,
    bookings: HashMap<BookingId, Booking>,
    /// Keyed by gateway reference.
    payments: HashMap<String, Payment>,
    reviews: HashMap<ReviewId, Review>,
}

/// A thread-safe in-memory datastore for every marketplace table.
///
/// All tables sit behind one `Arc<RwLock<..>>`, so a write guard covers any
/// multi-row change: the overlap re-check plus insert, and a payment settlement
/// plus its booking update, are each a single critical section.
/// Ideal for tests and one-shot replays where persistence is not required.
#[derive(Default, Clone)]
pub struct InMemoryStore {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStore {
    /// Creates a new, empty in-memory store.
    pub fn new() -> Self {
        Self::default()
    }
}

fn check_status(booking: &Booking, expected: BookingStatus) -> Result<()> {
    if booking.status != expected {
        return Err(MarketError::Conflict(format!(
            "booking {} changed concurrently (now {})",
            booking.booking_id, booking.status
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
impl UserStore for InMemoryStore {
    async fn insert_user(&self, user: User) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables.users.values().any(|u| u.username == user.username) {
            return Err(MarketError::Conflict(
                "A user with that username already exists.".to_string(),
            ));
        }
        tables.users.insert(user.user_id, user);
        Ok(())
    }

    async fn get_user(&self, user_id: UserId) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.get(&user_id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>> {
        let tables = self.tables.read().await;
        Ok(tables
            .users
            .values()
            .find(|u| u.username == username)
            .cloned())
    }

    async fn all_users(&self) -> Result<Vec<User>> {
        let tables = self.tables.read().await;
        Ok(tables.users.values().cloned().collect())
    }
}

#[async_trait]
impl ListingStore for InMemoryStore {
    async fn store_listing(&self, listing: Listing) -> Result<()> {
        let mut tables = self.tables.write().await;
        tables.listings.insert(listing.listing_id, listing);
        Ok(())
    }

    async fn update_listing(
        &self,
        listing: &Listing,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .listings
            .get(&listing.listing_id)
            .ok_or(MarketError::NotFound("Listing"))?;
        check_version(stored, expected_updated_at)?;
        tables.listings.insert(listing.listing_id, listing.clone());
        Ok(())
    }

    async fn get_listing(&self, listing_id: ListingId) -> Result<Option<Listing>> {
        let tables = self.tables.read().await;
        Ok(tables.listings.get(&listing_id).cloned())
    }

    async fn all_listings(&self) -> Result<Vec<Listing>> {
        let tables = self.tables.read().await;
        Ok(tables.listings.values().cloned().collect())
    }

    async fn delete_listing(&self, listing_id: ListingId) -> Result<bool> {
        let mut tables = self.tables.write().await;
        if tables.listings.remove(&listing_id).is_none() {
            return Ok(false);
        }
        let Tables {
            bookings,
            payments,
            reviews,
            ..
        } = &mut *tables;
        bookings.retain(|_, b| b.listing_id != listing_id);
        payments.retain(|_, p| bookings.contains_key(&p.booking_id));
        reviews.retain(|_, r| r.listing_id != listing_id);
        Ok(true)
    }
}

#[async_trait]
impl BookingStore for InMemoryStore {
    async fn insert_booking(&self, new: Booking) -> Result<()> {
        let mut tables = self.tables.write().await;
        let live: Vec<Booking> = tables
            .bookings
            .values()
            .filter(|b| b.listing_id == new.listing_id && b.status.is_live())
            .cloned()
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
        tables.bookings.insert(new.booking_id, new);
        Ok(())
    }

    async fn get_booking(&self, booking_id: BookingId) -> Result<Option<Booking>> {
        let tables = self.tables.read().await;
        Ok(tables.bookings.get(&booking_id).cloned())
    }

    async fn bookings_for_listing(&self, listing_id: ListingId) -> Result<Vec<Booking>> {
        let tables = self.tables.read().await;
        Ok(tables
            .bookings
            .values()
            .filter(|b| b.listing_id == listing_id)
            .cloned()
            .collect())
    }

    async fn all_bookings(&self) -> Result<Vec<Booking>> {
        let tables = self.tables.read().await;
        Ok(tables.bookings.values().cloned().collect())
    }

    async fn update_booking(&self, booking: &Booking, expected: BookingStatus) -> Result<()> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .bookings
            .get(&booking.booking_id)
            .ok_or(MarketError::NotFound("Booking"))?;
        check_status(stored, expected)?;
        tables.bookings.insert(booking.booking_id, booking.clone());
        Ok(())
    }
}

#[async_trait]
impl PaymentStore for InMemoryStore {
    async fn insert_payment(&self, payment: Payment) -> Result<()> {
        let mut tables = self.tables.write().await;
        if !tables.bookings.contains_key(&payment.booking_id) {
            return Err(MarketError::NotFound("Booking"));
        }
        if tables.payments.contains_key(&payment.reference) {
            return Err(MarketError::Conflict(format!(
                "payment reference {} already recorded",
                payment.reference
            )));
        }
        tables.payments.insert(payment.reference.clone(), payment);
        Ok(())
    }

    async fn payment_by_reference(&self, reference: &str) -> Result<Option<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables.payments.get(reference).cloned())
    }

    async fn payments_for_booking(&self, booking_id: BookingId) -> Result<Vec<Payment>> {
        let tables = self.tables.read().await;
        Ok(tables
            .payments
            .values()
            .filter(|p| p.booking_id == booking_id)
            .cloned()
            .collect())
    }

    async fn commit_settlement(
        &self,
        payment: &Payment,
        previous: PaymentStatus,
        change: Option<BookingChange>,
    ) -> Result<()> {
        let mut tables = self.tables.write().await;
        let stored = tables
            .payments
            .get(&payment.reference)
            .ok_or(MarketError::NotFound("Payment"))?;
        if stored.payment_status != previous {
            return Err(MarketError::Conflict(format!(
                "payment {} changed concurrently (now {})",
                payment.reference, stored.payment_status
            )));
        }
        if let Some(change) = &change {
            let stored = tables
                .bookings
                .get(&change.booking.booking_id)
                .ok_or(MarketError::NotFound("Booking"))?;
            check_status(stored, change.expected)?;
        }

        tables
            .payments
            .insert(payment.reference.clone(), payment.clone());
        if let Some(change) = change {
            tables
                .bookings
                .insert(change.booking.booking_id, change.booking);
        }
        Ok(())
    }
}

#[async_trait]
impl ReviewStore for InMemoryStore {
    async fn insert_review(&self, review: Review) -> Result<()> {
        let mut tables = self.tables.write().await;
        if tables
            .reviews
            .values()
            .any(|r| r.listing_id == review.listing_id && r.reviewer_id == review.reviewer_id)
        {
            return Err(MarketError::Conflict(
                "You have already reviewed this listing.".to_string(),
            ));
        }
        tables.reviews.insert(review.review_id, review);
        Ok(())
    }

    async fn reviews_for_listing(&self, listing_id: ListingId) -> Result<Vec<Review>> {
        let tables = self.tables.read().await;
        let mut reviews: Vec<Review> = tables
            .reviews
            .values()
            .filter(|r| r.listing_id == listing_id)
            .cloned()
            .collect();
        reviews.sort_by_key(|r| r.created_at);
        Ok(reviews)
    }
}
