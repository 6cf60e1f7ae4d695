use super::listing::ListingId;
use super::user::UserId;
use crate::error::{MarketError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;
use validator::Validate;

pub type ReviewId = Uuid;

/// A star rating between 1 and 5 inclusive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct Rating(u8);

impl Rating {
    pub fn new(value: u8) -> Result<Self> {
        if !(1..=5).contains(&value) {
            return Err(MarketError::ValidationError(
                "Rating must be between 1 and 5.".to_string(),
            ));
        }
        Ok(Self(value))
    }

    pub fn value(&self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for Rating {
    type Error = MarketError;

    fn try_from(value: u8) -> Result<Self> {
        Self::new(value)
    }
}

impl From<Rating> for u8 {
    fn from(rating: Rating) -> Self {
        rating.0
    }
}

#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Review {
    pub review_id: ReviewId,
    pub listing_id: ListingId,
    pub reviewer_id: UserId,
    pub rating: Rating,
    pub comment: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct NewReview {
    #[validate(range(min = 1, max = 5, message = "must be between 1 and 5"))]
    pub rating: u8,
    #[serde(default)]
    pub comment: String,
}

impl Review {
    pub fn new(listing_id: ListingId, reviewer_id: UserId, new: NewReview) -> Result<Self> {
        new.validate()?;
        Ok(Self {
            review_id: Uuid::new_v4(),
            listing_id,
            reviewer_id,
            rating: Rating::new(new.rating)?,
            comment: new.comment.trim().to_string(),
            created_at: Utc::now(),
        })
    }
}

/// Mean rating rounded to one decimal, `None` without reviews.
pub fn average_rating(reviews: &[Review]) -> Option<Decimal> {
    if reviews.is_empty() {
        return None;
    }
    let sum: Decimal = reviews.iter().map(|r| Decimal::from(r.rating.value())).sum();
    Some((sum / Decimal::from(reviews.len())).round_dp(1))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn review(rating: u8) -> Review {
        Review::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            NewReview {
                rating,
                comment: "ok".to_string(),
            },
        )
        .unwrap()
    }

    #[test]
    fn test_rating_bounds() {
        assert!(Rating::new(0).is_err());
        assert!(Rating::new(6).is_err());
        assert_eq!(Rating::new(5).unwrap().value(), 5);
        assert!(serde_json::from_str::<Rating>("9").is_err());
    }

    #[test]
    fn test_review_payload_rating_is_validated() {
        let err = Review::new(
            Uuid::new_v4(),
            Uuid::new_v4(),
            NewReview {
                rating: 0,
                comment: String::new(),
            },
        )
        .unwrap_err();
        assert!(matches!(err, MarketError::ValidationError(msg) if msg == "rating: must be between 1 and 5"));
    }

    #[test]
    fn test_average_rating() {
        assert_eq!(average_rating(&[]), None);
        assert_eq!(
            average_rating(&[review(5), review(4), review(4)]),
            Some(dec!(4.3))
        );
    }
}
