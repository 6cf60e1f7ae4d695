use super::retry_on_conflict;
use crate::domain::booking::{self, Booking, BookingId};
use crate::domain::listing::ListingId;
use crate::domain::ports::{BookingStore, ListingStore, MarketStoreRef};
use crate::domain::user::User;
use crate::error::{MarketError, Result};
use chrono::NaiveDate;
use serde::Deserialize;
use tracing::info;

/// Body of a booking request.
#[derive(Debug, Deserialize, Clone, Copy)]
pub struct BookingRequest {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

/// A status change requested by a user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BookingAction {
    Approve,
    Decline,
    Cancel,
    /// Completion is judged against `today`.
    Complete { today: NaiveDate },
}

impl BookingAction {
    fn apply(self, booking: &mut Booking, actor: &User) -> Result<()> {
        match self {
            BookingAction::Approve => booking.approve(actor.user_id),
            BookingAction::Decline => booking.decline(actor.user_id),
            BookingAction::Cancel => booking.cancel(actor.user_id),
            BookingAction::Complete { today } => booking.complete(actor.user_id, today),
        }
    }
}

/// Creates bookings and drives them through their status machine.
pub struct BookingService {
    store: MarketStoreRef,
}

impl BookingService {
    pub fn new(store: MarketStoreRef) -> Self {
        Self { store }
    }

    /// Books `listing_id` for `guest`.
    ///
    /// The listing's live bookings are checked here and again by the store
    /// while it holds its write lock, so two racing requests for overlapping
    /// dates cannot both be accepted.
    pub async fn book(
        &self,
        guest: &User,
        listing_id: ListingId,
        request: BookingRequest,
    ) -> Result<Booking> {
        let listing = self
            .store
            .get_listing(listing_id)
            .await?
            .ok_or(MarketError::NotFound("Listing"))?;
        if !listing.is_available {
            return Err(MarketError::ValidationError(
                "This listing is not available for booking.".to_string(),
            ));
        }
        if listing.is_hosted_by(guest.user_id) {
            return Err(MarketError::ValidationError(
                "You cannot book your own listing.".to_string(),
            ));
        }

        let existing = self.store.bookings_for_listing(listing_id).await?;
        let booking = booking::validate_and_price(
            &listing,
            request.start_date,
            request.end_date,
            &existing,
        )?
        .into_booking(guest.user_id);
        self.store.insert_booking(booking.clone()).await?;

        info!(
            booking_id = %booking.booking_id,
            %listing_id,
            guest_id = %guest.user_id,
            total = %booking.total_price,
            "booking requested"
        );
        Ok(booking)
    }

    /// Applies `action` to a booking as `actor`, re-reading and retrying when
    /// a concurrent writer changed the booking first.
    pub async fn transition(
        &self,
        actor: &User,
        booking_id: BookingId,
        action: BookingAction,
    ) -> Result<Booking> {
        let booking =
            retry_on_conflict(move || self.transition_once(actor, booking_id, action)).await?;
        info!(%booking_id, status = %booking.status, by = %actor.user_id, "booking updated");
        Ok(booking)
    }

    pub async fn approve(&self, actor: &User, booking_id: BookingId) -> Result<Booking> {
        self.transition(actor, booking_id, BookingAction::Approve).await
    }

    pub async fn decline(&self, actor: &User, booking_id: BookingId) -> Result<Booking> {
        self.transition(actor, booking_id, BookingAction::Decline).await
    }

    pub async fn cancel(&self, actor: &User, booking_id: BookingId) -> Result<Booking> {
        self.transition(actor, booking_id, BookingAction::Cancel).await
    }

    pub async fn complete(
        &self,
        actor: &User,
        booking_id: BookingId,
        today: NaiveDate,
    ) -> Result<Booking> {
        self.transition(actor, booking_id, BookingAction::Complete { today })
            .await
    }

    /// Every booking `user` may see, oldest first.
    pub async fn visible_bookings(&self, user: &User) -> Result<Vec<Booking>> {
        let mut bookings: Vec<Booking> = self
            .store
            .all_bookings()
            .await?
            .into_iter()
            .filter(|b| b.is_visible_to(user))
            .collect();
        bookings.sort_by_key(|b| b.created_at);
        Ok(bookings)
    }

    pub async fn booking(&self, user: &User, booking_id: BookingId) -> Result<Booking> {
        let booking = self.load(booking_id).await?;
        if !booking.is_visible_to(user) {
            return Err(MarketError::Unauthorized(
                "You are not authorized to view this booking.".to_string(),
            ));
        }
        Ok(booking)
    }

    async fn transition_once(
        &self,
        actor: &User,
        booking_id: BookingId,
        action: BookingAction,
    ) -> Result<Booking> {
        let mut booking = self.load(booking_id).await?;
        let expected = booking.status;
        action.apply(&mut booking, actor)?;
        self.store.update_booking(&booking, expected).await?;
        Ok(booking)
    }

    async fn load(&self, booking_id: BookingId) -> Result<Booking> {
        self.store
            .get_booking(booking_id)
            .await?
            .ok_or(MarketError::NotFound("Booking"))
    }
}
