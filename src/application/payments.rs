use super::retry_on_conflict;
use crate::domain::booking::{Booking, BookingId};
use crate::domain::money::Amount;
use crate::domain::payment::{GatewayStatus, Payment, Settlement};
use crate::domain::ports::{
    BookingChange, BookingStore, CheckoutRequest, MarketStoreRef, NotifierRef,
    PaymentGatewayRef, PaymentStore, UserStore,
};
use crate::domain::user::User;
use crate::error::{MarketError, Result};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use uuid::Uuid;

/// Body of `POST /payments/init`.
#[derive(Debug, Deserialize, Clone)]
pub struct InitPayment {
    pub booking_id: BookingId,
    /// Must equal the booking total when given.
    #[serde(default)]
    pub amount: Option<Decimal>,
}

#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct PaymentInit {
    pub checkout_url: String,
    pub payment: Payment,
}

/// Body the gateway posts to the webhook.
#[derive(Debug, Deserialize, Clone)]
pub struct WebhookEvent {
    pub tx_ref: String,
    #[serde(default)]
    pub status: String,
}

/// Starts checkouts and reconciles local payment state with the gateway.
pub struct PaymentService {
    store: MarketStoreRef,
    gateway: PaymentGatewayRef,
    notifier: NotifierRef,
    currency: String,
}

impl PaymentService {
    pub fn new(
        store: MarketStoreRef,
        gateway: PaymentGatewayRef,
        notifier: NotifierRef,
        currency: impl Into<String>,
    ) -> Self {
        Self {
            store,
            gateway,
            notifier,
            currency: currency.into(),
        }
    }

    /// Opens a checkout for a booking and records the PENDING payment.
    ///
    /// The payment row is only written once the gateway accepted the
    /// checkout; a gateway failure leaves no trace locally. A booking that
    /// already has a successful payment cannot be charged again.
    pub async fn initialize(&self, payer: &User, request: InitPayment) -> Result<PaymentInit> {
        let booking = self.booking(request.booking_id).await?;
        let amount = request.amount.map(Amount::new).transpose()?;
        let mut payment = Payment::initiate(
            &booking,
            payer,
            amount,
            &self.currency,
            Uuid::new_v4().to_string(),
        )?;
        let previous = self.store.payments_for_booking(booking.booking_id).await?;
        if previous.iter().any(Payment::is_successful) {
            return Err(MarketError::Conflict(format!(
                "booking {} is already paid",
                booking.booking_id
            )));
        }

        let checkout = self
            .gateway
            .initialize(CheckoutRequest {
                amount: payment.amount,
                currency: payment.currency.clone(),
                email: payer.email.clone(),
                first_name: payer.first_name.clone(),
                last_name: payer.last_name.clone(),
                reference: Some(payment.reference.clone()),
                callback_url: None,
                return_url: None,
            })
            .await?;
        payment.reference = checkout.reference;
        self.store.insert_payment(payment.clone()).await?;

        info!(
            tx_ref = %payment.reference,
            booking_id = %booking.booking_id,
            amount = %payment.amount,
            "checkout initialized"
        );
        Ok(PaymentInit {
            checkout_url: checkout.checkout_url,
            payment,
        })
    }

    /// Asks the gateway for the authoritative status and reconciles with it.
    ///
    /// Only the payer or the listing's host may verify. Gateway failures are
    /// returned as-is and leave the payment untouched.
    pub async fn verify(&self, actor: &User, reference: &str) -> Result<Payment> {
        let payment = self.payment(reference).await?;
        let booking = self.booking(payment.booking_id).await?;
        if actor.user_id != payment.payer_id && actor.user_id != booking.host_id {
            return Err(MarketError::Unauthorized(
                "You are not authorized to verify this payment.".to_string(),
            ));
        }

        let verification = self.gateway.verify(reference).await?;
        self.reconcile(reference, verification.status).await
    }

    /// Applies a status pushed by the gateway.
    pub async fn webhook(&self, event: WebhookEvent) -> Result<Payment> {
        let reported = GatewayStatus::parse(&event.status);
        match self.reconcile(&event.tx_ref, reported).await {
            Ok(payment) => {
                info!(
                    tx_ref = %event.tx_ref,
                    status = %payment.payment_status,
                    "webhook processed"
                );
                Ok(payment)
            }
            Err(e) => {
                error!(tx_ref = %event.tx_ref, error = %e, "webhook rejected");
                Err(e)
            }
        }
    }

    /// Current local status, for the gateway's return page. Never mutates.
    pub async fn payment(&self, reference: &str) -> Result<Payment> {
        self.store
            .payment_by_reference(reference)
            .await?
            .ok_or(MarketError::NotFound("Payment"))
    }

    /// Moves the payment to SUCCESS or FAILED per `reported` and, on the
    /// first SUCCESS, confirms its booking in the same atomic write and sends
    /// the confirmation. Replays of an outcome already recorded change
    /// nothing and notify nobody.
    pub async fn reconcile(&self, reference: &str, reported: GatewayStatus) -> Result<Payment> {
        let (payment, settlement) =
            retry_on_conflict(move || self.settle_once(reference, reported)).await?;

        match settlement {
            Settlement::Succeeded => {
                info!(tx_ref = %reference, "payment succeeded");
                self.notify(&payment).await;
            }
            Settlement::Failed => info!(tx_ref = %reference, "payment failed"),
            Settlement::Unchanged => {}
        }
        Ok(payment)
    }

    async fn settle_once(
        &self,
        reference: &str,
        reported: GatewayStatus,
    ) -> Result<(Payment, Settlement)> {
        let mut payment = self.payment(reference).await?;
        let previous = payment.payment_status;
        let settlement = payment.settle(reported);

        let change = match settlement {
            Settlement::Unchanged => return Ok((payment, settlement)),
            Settlement::Failed => None,
            Settlement::Succeeded => self.confirmation_for(&payment).await?,
        };
        self.store
            .commit_settlement(&payment, previous, change)
            .await?;
        Ok((payment, settlement))
    }

    async fn confirmation_for(&self, payment: &Payment) -> Result<Option<BookingChange>> {
        let Some(mut booking) = self.store.get_booking(payment.booking_id).await? else {
            warn!(tx_ref = %payment.reference, "paid booking no longer exists");
            return Ok(None);
        };
        let expected = booking.status;
        match booking.confirm_paid() {
            Ok(true) => Ok(Some(BookingChange { booking, expected })),
            Ok(false) => Ok(None),
            Err(e) => {
                warn!(
                    tx_ref = %payment.reference,
                    booking_id = %booking.booking_id,
                    error = %e,
                    "payment succeeded for a booking that cannot be confirmed"
                );
                Ok(None)
            }
        }
    }

    async fn notify(&self, payment: &Payment) {
        let payer = match self.store.get_user(payment.payer_id).await {
            Ok(Some(payer)) => payer,
            Ok(None) => {
                warn!(tx_ref = %payment.reference, "payer not found, skipping notification");
                return;
            }
            Err(e) => {
                warn!(tx_ref = %payment.reference, error = %e, "payer lookup failed");
                return;
            }
        };
        if let Err(e) = self.notifier.payment_succeeded(&payer, payment).await {
            warn!(tx_ref = %payment.reference, error = %e, "payment notification failed");
        }
    }

    async fn booking(&self, booking_id: BookingId) -> Result<Booking> {
        self.store
            .get_booking(booking_id)
            .await?
            .ok_or(MarketError::NotFound("Booking"))
    }
}
