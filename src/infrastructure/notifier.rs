use crate::domain::payment::Payment;
use crate::domain::ports::Notifier;
use crate::domain::user::User;
use crate::error::Result;
use async_trait::async_trait;
use tracing::info;

/// Notifier that records payment confirmations in the log instead of
/// sending email.
#[derive(Debug, Default, Clone)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn payment_succeeded(&self, payer: &User, payment: &Payment) -> Result<()> {
        info!(
            to = %payer.email,
            tx_ref = %payment.reference,
            amount = %payment.amount,
            currency = %payment.currency,
            "payment confirmation sent"
        );
        Ok(())
    }
}
