use super::money::Amount;
use super::user::{Role, User, UserId};
use crate::error::{MarketError, Result};
use chrono::{DateTime, TimeDelta, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use uuid::Uuid;
use validator::Validate;

pub type ListingId = Uuid;

#[derive(Debug, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash)]
pub enum Amenity {
    #[serde(rename = "WI-FI")]
    WiFi,
    #[serde(rename = "POOL")]
    Pool,
    #[serde(rename = "PETS")]
    Pets,
    #[serde(rename = "GYM")]
    Gym,
    #[serde(rename = "PARKING")]
    Parking,
}

impl Amenity {
    pub const ALL: [Amenity; 5] = [
        Amenity::WiFi,
        Amenity::Pool,
        Amenity::Pets,
        Amenity::Gym,
        Amenity::Parking,
    ];
}

/// A bookable property owned by a single host.
#[derive(Debug, Serialize, Deserialize, PartialEq, Clone)]
pub struct Listing {
    pub listing_id: ListingId,
    pub host_id: UserId,
    pub title: String,
    pub description: String,
    pub location: String,
    pub price_per_night: Amount,
    pub is_available: bool,
    pub amenities: BTreeSet<Amenity>,
    pub watchlist: BTreeSet<UserId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Clone, Validate)]
pub struct ListingDraft {
    #[validate(length(min = 1, max = 200, message = "must be between 1 and 200 characters"))]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[validate(length(min = 1, message = "this field may not be blank"))]
    pub location: String,
    pub price_per_night: Decimal,
    #[serde(default = "default_available")]
    pub is_available: bool,
    #[serde(default)]
    pub amenities: Vec<Amenity>,
}

/// Partial update; absent fields are left untouched.
#[derive(Debug, Deserialize, Clone, Default, Validate)]
pub struct ListingPatch {
    #[validate(length(min = 1, max = 200, message = "must be between 1 and 200 characters"))]
    pub title: Option<String>,
    pub description: Option<String>,
    #[validate(length(min = 1, message = "this field may not be blank"))]
    pub location: Option<String>,
    pub price_per_night: Option<Decimal>,
    pub is_available: Option<bool>,
    pub amenities: Option<Vec<Amenity>>,
}

fn default_available() -> bool {
    true
}

impl Listing {
    /// Creates a listing owned by `host`. Guests cannot list properties.
    pub fn create(host: &User, mut draft: ListingDraft) -> Result<Self> {
        if host.role == Role::Guest {
            return Err(MarketError::Unauthorized(
                "Only hosts can create listings.".to_string(),
            ));
        }
        draft.title = draft.title.trim().to_string();
        draft.location = draft.location.trim().to_string();
        draft.validate()?;
        let now = Utc::now();
        Ok(Self {
            listing_id: Uuid::new_v4(),
            host_id: host.user_id,
            title: draft.title,
            description: draft.description.trim().to_string(),
            location: draft.location,
            price_per_night: Amount::new(draft.price_per_night)?,
            is_available: draft.is_available,
            amenities: draft.amenities.into_iter().collect(),
            watchlist: BTreeSet::new(),
            created_at: now,
            updated_at: now,
        })
    }

    /// Applies a host's edit. Validation happens before any field changes.
    pub fn apply(&mut self, mut patch: ListingPatch) -> Result<()> {
        patch.title = patch.title.map(|title| title.trim().to_string());
        patch.location = patch.location.map(|location| location.trim().to_string());
        patch.validate()?;
        let price = patch.price_per_night.map(Amount::new).transpose()?;

        if let Some(title) = patch.title {
            self.title = title;
        }
        if let Some(location) = patch.location {
            self.location = location;
        }
        if let Some(price) = price {
            self.price_per_night = price;
        }
        if let Some(description) = patch.description {
            self.description = description.trim().to_string();
        }
        if let Some(is_available) = patch.is_available {
            self.is_available = is_available;
        }
        if let Some(amenities) = patch.amenities {
            self.amenities = amenities.into_iter().collect();
        }
        self.touch();
        Ok(())
    }

    // `updated_at` doubles as the row version, so it must strictly advance.
    fn touch(&mut self) {
        let now = Utc::now();
        self.updated_at = if now > self.updated_at {
            now
        } else {
            self.updated_at + TimeDelta::microseconds(1)
        };
    }

    pub fn is_hosted_by(&self, user_id: UserId) -> bool {
        self.host_id == user_id
    }

    pub fn add_to_watchlist(&mut self, user_id: UserId) -> Result<()> {
        if !self.watchlist.insert(user_id) {
            return Err(MarketError::ValidationError(
                "Listing already in watchlist.".to_string(),
            ));
        }
        self.touch();
        Ok(())
    }

    pub fn remove_from_watchlist(&mut self, user_id: UserId) -> Result<()> {
        if !self.watchlist.remove(&user_id) {
            return Err(MarketError::ValidationError(
                "Listing not in watchlist.".to_string(),
            ));
        }
        self.touch();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn user(role: Role) -> User {
        User {
            user_id: Uuid::new_v4(),
            username: "host".to_string(),
            email: "host@example.com".to_string(),
            first_name: String::new(),
            last_name: String::new(),
            phone_number: None,
            role,
            password_hash: String::new(),
            created_at: Utc::now(),
        }
    }

    fn draft() -> ListingDraft {
        ListingDraft {
            title: "Cabin by the lake".to_string(),
            description: "Quiet".to_string(),
            location: "Naivasha".to_string(),
            price_per_night: dec!(100),
            is_available: true,
            amenities: vec![Amenity::WiFi, Amenity::Parking, Amenity::WiFi],
        }
    }

    #[test]
    fn test_create_listing() {
        let host = user(Role::Host);
        let listing = Listing::create(&host, draft()).unwrap();
        assert!(listing.is_hosted_by(host.user_id));
        assert_eq!(listing.amenities.len(), 2);
        assert_eq!(listing.price_per_night.value(), dec!(100));
    }

    #[test]
    fn test_guest_cannot_create_listing() {
        let guest = user(Role::Guest);
        assert!(matches!(
            Listing::create(&guest, draft()),
            Err(MarketError::Unauthorized(_))
        ));
    }

    #[test]
    fn test_create_rejects_non_positive_price() {
        let mut bad = draft();
        bad.price_per_night = dec!(0);
        assert!(matches!(
            Listing::create(&user(Role::Host), bad),
            Err(MarketError::ValidationError(_))
        ));
    }

    #[test]
    fn test_watchlist_membership() {
        let mut listing = Listing::create(&user(Role::Host), draft()).unwrap();
        let watcher = Uuid::new_v4();

        listing.add_to_watchlist(watcher).unwrap();
        assert!(listing.add_to_watchlist(watcher).is_err());
        listing.remove_from_watchlist(watcher).unwrap();
        assert!(listing.remove_from_watchlist(watcher).is_err());
    }

    #[test]
    fn test_every_change_advances_updated_at() {
        let mut listing = Listing::create(&user(Role::Host), draft()).unwrap();
        let watcher = Uuid::new_v4();
        let mut last = listing.updated_at;
        for _ in 0..50 {
            listing.add_to_watchlist(watcher).unwrap();
            assert!(listing.updated_at > last);
            last = listing.updated_at;
            listing.remove_from_watchlist(watcher).unwrap();
            assert!(listing.updated_at > last);
            last = listing.updated_at;
        }
    }

    #[test]
    fn test_title_and_location_are_validated_after_trimming() {
        let host = user(Role::Host);
        let mut blank = draft();
        blank.location = "   ".to_string();
        assert!(matches!(
            Listing::create(&host, blank),
            Err(MarketError::ValidationError(msg)) if msg == "location: this field may not be blank"
        ));

        let mut long = draft();
        long.title = "x".repeat(201);
        assert!(Listing::create(&host, long).is_err());

        let mut padded = draft();
        padded.title = "  Cabin  ".to_string();
        assert_eq!(Listing::create(&host, padded).unwrap().title, "Cabin");

        let mut listing = Listing::create(&host, draft()).unwrap();
        let patch = ListingPatch {
            title: Some(" ".to_string()),
            ..Default::default()
        };
        assert!(listing.apply(patch).is_err());
        assert_eq!(listing.title, "Cabin by the lake");
    }

    #[test]
    fn test_patch_is_all_or_nothing() {
        let mut listing = Listing::create(&user(Role::Host), draft()).unwrap();
        let patch = ListingPatch {
            title: Some("Renamed".to_string()),
            price_per_night: Some(dec!(-3)),
            ..Default::default()
        };
        assert!(listing.apply(patch).is_err());
        assert_eq!(listing.title, "Cabin by the lake");

        let patch = ListingPatch {
            price_per_night: Some(dec!(150)),
            amenities: Some(vec![Amenity::Pool]),
            ..Default::default()
        };
        listing.apply(patch).unwrap();
        assert_eq!(listing.price_per_night.value(), dec!(150));
        assert_eq!(listing.amenities, BTreeSet::from([Amenity::Pool]));
    }

    #[test]
    fn test_amenity_wire_names() {
        let json = serde_json::to_string(&Amenity::ALL).unwrap();
        assert_eq!(json, r#"["WI-FI","POOL","PETS","GYM","PARKING"]"#);
    }
}
