//! Booking rule engine.
//!
//! Everything here is a pure function over the state handed in: date-range
//! validation, the half-open overlap test, pricing, and the status machine
//!
//! ```text
//! PENDING   --approve (host)-------> CONFIRMED
//! PENDING   --decline (host)-------> DECLINED
//! PENDING   --cancel (guest|host)--> CANCELLED
//! CONFIRMED --cancel (guest|host)--> CANCELLED
//! PENDING   --payment success------> CONFIRMED
//! CONFIRMED --payment success------> CONFIRMED
//! CONFIRMED --complete (host)------> COMPLETED   (stay has ended)
//! ```
//!
//! Persisting the outcome is the caller's job; stores re-run
//! [`ensure_no_overlap`] under their write lock before inserting.

use super::listing::{Listing, ListingId};
use super::money::Amount;
use super::user::{User, UserId};
use crate::error::{MarketError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type BookingId = Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum BookingStatus {
    Pending,
    Confirmed,
    Declined,
    Cancelled,
    Completed,
}

impl BookingStatus {
    /// Live bookings hold their dates and count toward overlap checks.
    pub fn is_live(self) -> bool {
        matches!(self, BookingStatus::Pending | BookingStatus::Confirmed)
    }
}

impl fmt::Display for BookingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BookingStatus::Pending => "PENDING",
            BookingStatus::Confirmed => "CONFIRMED",
            BookingStatus::Declined => "DECLINED",
            BookingStatus::Cancelled => "CANCELLED",
            BookingStatus::Completed => "COMPLETED",
        };
        f.write_str(name)
    }
}

/// A half-open `[start, end)` range of nights.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
pub struct StayDates {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
}

impl StayDates {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Result<Self> {
        if end_date <= start_date {
            return Err(MarketError::InvalidRange);
        }
        Ok(Self {
            start_date,
            end_date,
        })
    }

    pub fn nights(&self) -> u32 {
        // Bounded by chrono's representable date span, well inside u32.
        (self.end_date - self.start_date).num_days() as u32
    }

    pub fn overlaps(&self, other: &StayDates) -> bool {
        self.start_date < other.end_date && self.end_date > other.start_date
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Booking {
    pub booking_id: BookingId,
    pub listing_id: ListingId,
    pub guest_id: UserId,
    /// Host of the listing at booking time. Listing ownership never changes.
    pub host_id: UserId,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub total_price: Amount,
    pub status: BookingStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A validated, priced booking request that has not been persisted yet.
#[derive(Debug, PartialEq, Clone)]
pub struct BookingDraft {
    pub listing_id: ListingId,
    pub host_id: UserId,
    pub dates: StayDates,
    pub total_price: Amount,
}

impl BookingDraft {
    pub fn into_booking(self, guest_id: UserId) -> Booking {
        let now = Utc::now();
        Booking {
            booking_id: Uuid::new_v4(),
            listing_id: self.listing_id,
            guest_id,
            host_id: self.host_id,
            start_date: self.dates.start_date,
            end_date: self.dates.end_date,
            total_price: self.total_price,
            status: BookingStatus::Pending,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Validates a requested stay against a listing's live bookings and prices it.
///
/// `existing` may contain bookings of other listings or dead bookings; only
/// live bookings of `listing` are considered.
///
/// # Errors
/// - `InvalidRange` when `end_date <= start_date`.
/// - `DateConflict` when the range overlaps a live booking of the listing.
pub fn validate_and_price(
    listing: &Listing,
    start_date: NaiveDate,
    end_date: NaiveDate,
    existing: &[Booking],
) -> Result<BookingDraft> {
    let dates = StayDates::new(start_date, end_date)?;
    ensure_no_overlap(listing.listing_id, &dates, existing)?;
    Ok(BookingDraft {
        listing_id: listing.listing_id,
        host_id: listing.host_id,
        total_price: listing.price_per_night.checked_mul(dates.nights())?,
        dates,
    })
}

pub fn ensure_no_overlap(
    listing_id: ListingId,
    dates: &StayDates,
    existing: &[Booking],
) -> Result<()> {
    let conflict = existing
        .iter()
        .filter(|b| b.listing_id == listing_id && b.status.is_live())
        .any(|b| b.dates().overlaps(dates));
    if conflict {
        return Err(MarketError::DateConflict);
    }
    Ok(())
}

impl Booking {
    pub fn dates(&self) -> StayDates {
        StayDates {
            start_date: self.start_date,
            end_date: self.end_date,
        }
    }

    pub fn nights(&self) -> u32 {
        self.dates().nights()
    }

    /// Per-row visibility: the guest, the listing's host, or an admin.
    pub fn is_visible_to(&self, user: &User) -> bool {
        user.is_admin() || self.guest_id == user.user_id || self.host_id == user.user_id
    }

    pub fn approve(&mut self, by: UserId) -> Result<()> {
        self.require_host(by, "approve")?;
        self.transition("approve", &[BookingStatus::Pending], BookingStatus::Confirmed)
    }

    pub fn decline(&mut self, by: UserId) -> Result<()> {
        self.require_host(by, "decline")?;
        self.transition("decline", &[BookingStatus::Pending], BookingStatus::Declined)
    }

    pub fn cancel(&mut self, by: UserId) -> Result<()> {
        if by != self.guest_id && by != self.host_id {
            return Err(MarketError::Unauthorized(
                "You are not authorized to cancel this booking.".to_string(),
            ));
        }
        self.transition(
            "cancel",
            &[BookingStatus::Pending, BookingStatus::Confirmed],
            BookingStatus::Cancelled,
        )
    }

    /// Marks a confirmed stay as completed once its last night has passed.
    pub fn complete(&mut self, by: UserId, today: NaiveDate) -> Result<()> {
        self.require_host(by, "complete")?;
        if self.status == BookingStatus::Confirmed && self.end_date > today {
            return Err(MarketError::ValidationError(
                "A booking can only be completed after its end date.".to_string(),
            ));
        }
        self.transition(
            "complete",
            &[BookingStatus::Confirmed],
            BookingStatus::Completed,
        )
    }

    /// Applies a successful payment. Returns `Ok(false)` when the booking was
    /// already confirmed.
    pub fn confirm_paid(&mut self) -> Result<bool> {
        if self.status == BookingStatus::Confirmed {
            return Ok(false);
        }
        self.transition(
            "confirm payment for",
            &[BookingStatus::Pending],
            BookingStatus::Confirmed,
        )?;
        Ok(true)
    }

    fn require_host(&self, by: UserId, action: &str) -> Result<()> {
        if by != self.host_id {
            return Err(MarketError::Unauthorized(format!(
                "You are not authorized to {action} this booking."
            )));
        }
        Ok(())
    }

    fn transition(
        &mut self,
        action: &'static str,
        allowed_from: &[BookingStatus],
        to: BookingStatus,
    ) -> Result<()> {
        if !allowed_from.contains(&self.status) {
            return Err(MarketError::InvalidTransition {
                action,
                from: self.status,
            });
        }
        self.status = to;
        self.updated_at = Utc::now();
        Ok(())
    }
}
