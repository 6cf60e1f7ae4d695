use super::booking::{Booking, BookingId};
use super::money::Amount;
use super::user::{User, UserId};
use crate::error::{MarketError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

pub type PaymentId = Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy, Hash)]
#[serde(rename_all = "UPPERCASE")]
pub enum PaymentStatus {
    Pending,
    Success,
    Failed,
    Refunded,
}

impl fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PaymentStatus::Pending => "PENDING",
            PaymentStatus::Success => "SUCCESS",
            PaymentStatus::Failed => "FAILED",
            PaymentStatus::Refunded => "REFUNDED",
        };
        f.write_str(name)
    }
}

/// Transaction status as reported by the gateway.
#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, Clone, Copy)]
#[serde(rename_all = "lowercase")]
pub enum GatewayStatus {
    Success,
    Failed,
    Pending,
}

impl GatewayStatus {
    /// Anything other than the two exact terminal words is still in flight.
    pub fn parse(reported: &str) -> Self {
        match reported {
            "success" => GatewayStatus::Success,
            "failed" => GatewayStatus::Failed,
            _ => GatewayStatus::Pending,
        }
    }
}

/// One payment attempt for a booking, keyed by its gateway reference.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Payment {
    pub payment_id: PaymentId,
    pub booking_id: BookingId,
    pub payer_id: UserId,
    pub amount: Amount,
    pub currency: String,
    pub reference: String,
    pub payment_status: PaymentStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What reconciling a reported status did to a payment.
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
pub enum Settlement {
    /// First transition to SUCCESS; the booking must be confirmed with it.
    Succeeded,
    /// Moved to FAILED.
    Failed,
    /// Already in the reported outcome, or in a state reconciliation may not
    /// leave. Nothing to write.
    Unchanged,
}

impl Payment {
    /// Records a payment attempt for `booking` paid by `payer`.
    ///
    /// `amount` defaults to the booking total and must match it when given.
    pub fn initiate(
        booking: &Booking,
        payer: &User,
        amount: Option<Amount>,
        currency: &str,
        reference: String,
    ) -> Result<Self> {
        if booking.guest_id != payer.user_id {
            return Err(MarketError::Unauthorized(
                "You are not authorized to pay for this booking.".to_string(),
            ));
        }
        if !booking.status.is_live() {
            return Err(MarketError::InvalidTransition {
                action: "pay for",
                from: booking.status,
            });
        }
        let amount = amount.unwrap_or(booking.total_price);
        if amount != booking.total_price {
            return Err(MarketError::ValidationError(format!(
                "amount: must equal the booking total of {}",
                booking.total_price
            )));
        }
        if reference.trim().is_empty() {
            return Err(MarketError::ValidationError(
                "tx_ref: may not be blank".to_string(),
            ));
        }
        let now = Utc::now();
        Ok(Self {
            payment_id: Uuid::new_v4(),
            booking_id: booking.booking_id,
            payer_id: payer.user_id,
            amount,
            currency: currency.to_string(),
            reference,
            payment_status: PaymentStatus::Pending,
            created_at: now,
            updated_at: now,
        })
    }

    /// Applies the gateway's reported status.
    ///
    /// SUCCESS iff the gateway said `"success"`, FAILED otherwise. SUCCESS and
    /// REFUNDED are final here: a replayed or late report never moves a
    /// payment out of them, so side effects of success fire exactly once.
    pub fn settle(&mut self, reported: GatewayStatus) -> Settlement {
        let target = match reported {
            GatewayStatus::Success => PaymentStatus::Success,
            GatewayStatus::Failed | GatewayStatus::Pending => PaymentStatus::Failed,
        };
        match (self.payment_status, target) {
            (PaymentStatus::Success | PaymentStatus::Refunded, _) => Settlement::Unchanged,
            (current, target) if current == target => Settlement::Unchanged,
            (_, PaymentStatus::Success) => {
                self.mark(PaymentStatus::Success);
                Settlement::Succeeded
            }
            (_, _) => {
                self.mark(PaymentStatus::Failed);
                Settlement::Failed
            }
        }
    }

    pub fn is_successful(&self) -> bool {
        self.payment_status == PaymentStatus::Success
    }

    fn mark(&mut self, status: PaymentStatus) {
        self.payment_status = status;
        self.updated_at = Utc::now();
    }
}
