use crate::domain::booking::Booking;
use crate::error::Result;
use chrono::NaiveDate;
use serde::Serialize;
use std::io::Write;

#[derive(Serialize)]
struct LedgerRow {
    booking_id: String,
    listing_id: String,
    guest_id: String,
    host_id: String,
    start_date: NaiveDate,
    end_date: NaiveDate,
    nights: u32,
    total_price: String,
    status: String,
}

/// Writes the booking ledger as CSV.
///
/// Rows are ordered by creation time, then id, so repeated exports of the
/// same data are byte-identical.
pub struct LedgerWriter<W: Write> {
    writer: csv::Writer<W>,
}

impl<W: Write> LedgerWriter<W> {
    pub fn new(sink: W) -> Self {
        Self {
            writer: csv::Writer::from_writer(sink),
        }
    }

    pub fn write_bookings(&mut self, mut bookings: Vec<Booking>) -> Result<()> {
        bookings.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then(a.booking_id.cmp(&b.booking_id))
        });
        for booking in bookings {
            self.writer.serialize(LedgerRow {
                booking_id: booking.booking_id.to_string(),
                listing_id: booking.listing_id.to_string(),
                guest_id: booking.guest_id.to_string(),
                host_id: booking.host_id.to_string(),
                start_date: booking.start_date,
                end_date: booking.end_date,
                nights: booking.nights(),
                total_price: booking.total_price.to_string(),
                status: booking.status.to_string(),
            })?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::booking::BookingStatus;
    use crate::domain::money::Amount;
    use chrono::Utc;
    use rust_decimal_macros::dec;
    use uuid::Uuid;

    #[test]
    fn test_ledger_output() {
        let booking = Booking {
            booking_id: Uuid::nil(),
            listing_id: Uuid::nil(),
            guest_id: Uuid::nil(),
            host_id: Uuid::nil(),
            start_date: NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2025, 1, 4).unwrap(),
            total_price: Amount::new(dec!(300)).unwrap(),
            status: BookingStatus::Confirmed,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };

        let mut out = Vec::new();
        LedgerWriter::new(&mut out)
            .write_bookings(vec![booking])
            .unwrap();
        let text = String::from_utf8(out).unwrap();
        let mut lines = text.lines();
        assert_eq!(
            lines.next(),
            Some("booking_id,listing_id,guest_id,host_id,start_date,end_date,nights,total_price,status")
        );
        let nil = Uuid::nil();
        assert_eq!(
            lines.next().unwrap(),
            format!("{nil},{nil},{nil},{nil},2025-01-01,2025-01-04,3,300.00,CONFIRMED")
        );
    }
}
