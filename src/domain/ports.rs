use super::booking::{Booking, BookingId, BookingStatus};
use super::listing::{Listing, ListingId};
use super::money::Amount;
use super::payment::{GatewayStatus, Payment, PaymentStatus};
use super::review::Review;
use super::user::{User, UserId};
use crate::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;

#[async_trait]
pub trait UserStore: Send + Sync {
    /// Fails with `Conflict` when the username is taken.
    async fn insert_user(&self, user: User) -> Result<()>;
    async fn get_user(&self, user_id: UserId) -> Result<Option<User>>;
    async fn find_user_by_username(&self, username: &str) -> Result<Option<User>>;
    async fn all_users(&self) -> Result<Vec<User>>;
}

#[async_trait]
pub trait ListingStore: Send + Sync {
    async fn store_listing(&self, listing: Listing) -> Result<()>;
    /// Compare-and-set write: persists `listing` only if the stored row still
    /// carries `expected_updated_at`. Fails with `NotFound` when the listing
    /// was deleted and `Conflict` when another writer got there first.
    async fn update_listing(
        &self,
        listing: &Listing,
        expected_updated_at: DateTime<Utc>,
    ) -> Result<()>;
    async fn get_listing(&self, listing_id: ListingId) -> Result<Option<Listing>>;
    async fn all_listings(&self) -> Result<Vec<Listing>>;
    /// Removes the listing with its bookings, their payments and its reviews.
    /// Returns whether the listing existed.
    async fn delete_listing(&self, listing_id: ListingId) -> Result<bool>;
}

#[async_trait]
pub trait BookingStore: Send + Sync {
    /// Inserts a new booking after re-checking, under the store's write lock,
    /// that no live booking on the same listing overlaps it (`DateConflict`)
    /// and that no live booking has the same `(listing, start, end)`
    /// (`Conflict`).
    async fn insert_booking(&self, booking: Booking) -> Result<()>;
    async fn get_booking(&self, booking_id: BookingId) -> Result<Option<Booking>>;
    async fn bookings_for_listing(&self, listing_id: ListingId) -> Result<Vec<Booking>>;
    async fn all_bookings(&self) -> Result<Vec<Booking>>;
    /// Compare-and-set write: persists `booking` only if the stored status is
    /// still `expected`, otherwise fails with `Conflict`.
    async fn update_booking(&self, booking: &Booking, expected: BookingStatus) -> Result<()>;
}

/// A booking write that must commit together with a payment write.
#[derive(Debug, Clone)]
pub struct BookingChange {
    pub booking: Booking,
    pub expected: BookingStatus,
}

#[async_trait]
pub trait PaymentStore: Send + Sync {
    /// Fails with `Conflict` when the reference is already recorded.
    async fn insert_payment(&self, payment: Payment) -> Result<()>;
    async fn payment_by_reference(&self, reference: &str) -> Result<Option<Payment>>;
    async fn payments_for_booking(&self, booking_id: BookingId) -> Result<Vec<Payment>>;
    /// Atomically persists a settled payment and, optionally, the booking
    /// change it causes. Both are compare-and-set against the given prior
    /// statuses; on `Conflict` nothing is written.
    async fn commit_settlement(
        &self,
        payment: &Payment,
        previous: PaymentStatus,
        booking: Option<BookingChange>,
    ) -> Result<()>;
}

#[async_trait]
pub trait ReviewStore: Send + Sync {
    /// Fails with `Conflict` when the reviewer already reviewed the listing.
    async fn insert_review(&self, review: Review) -> Result<()>;
    async fn reviews_for_listing(&self, listing_id: ListingId) -> Result<Vec<Review>>;
}

/// Everything the application layer needs from a datastore.
pub trait MarketStore: UserStore + ListingStore + BookingStore + PaymentStore + ReviewStore {}

impl<T> MarketStore for T where T: UserStore + ListingStore + BookingStore + PaymentStore + ReviewStore
{}

pub type MarketStoreRef = Arc<dyn MarketStore>;

/// Input to [`PaymentGateway::initialize`].
#[derive(Debug, Clone)]
pub struct CheckoutRequest {
    pub amount: Amount,
    pub currency: String,
    pub email: String,
    pub first_name: String,
    pub last_name: String,
    /// Generated by the gateway client when absent.
    pub reference: Option<String>,
    /// Overrides the configured webhook URL.
    pub callback_url: Option<String>,
    /// Overrides the configured return URL.
    pub return_url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Checkout {
    pub checkout_url: String,
    pub reference: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Verification {
    pub status: GatewayStatus,
    pub raw_payload: serde_json::Value,
}

/// The third-party payment provider.
///
/// Implementations never panic on transport problems: they return
/// `GatewayTimeout` or `GatewayError`. They hold no local state.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize(&self, request: CheckoutRequest) -> Result<Checkout>;
    async fn verify(&self, reference: &str) -> Result<Verification>;
}

pub type PaymentGatewayRef = Arc<dyn PaymentGateway>;

/// Outbound notifications (email in production).
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn payment_succeeded(&self, payer: &User, payment: &Payment) -> Result<()>;
}

pub type NotifierRef = Arc<dyn Notifier>;
