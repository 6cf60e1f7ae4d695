use crate::domain::booking;
use crate::domain::listing::{Amenity, Listing, ListingDraft};
use crate::domain::ports::{BookingStore, ListingStore, MarketStoreRef, UserStore};
use crate::domain::user::{NewUser, Role, User};
use crate::error::{MarketError, Result};
use chrono::{Duration, NaiveDate, Utc};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info};

const FIRST_NAMES: [&str; 10] = [
    "Abebe", "Amina", "Chidi", "Fatuma", "Kofi", "Lulit", "Njeri", "Omar", "Selam", "Tendai",
];
const LAST_NAMES: [&str; 8] = [
    "Bekele", "Otieno", "Mensah", "Haile", "Mwangi", "Diallo", "Kamau", "Tesfaye",
];
const PLACES: [&str; 8] = [
    "Addis Ababa",
    "Nairobi",
    "Zanzibar",
    "Kigali",
    "Lamu",
    "Bahir Dar",
    "Diani Beach",
    "Arusha",
];
const KINDS: [&str; 6] = ["Loft", "Cottage", "Villa", "Studio", "Guest house", "Bungalow"];
const FEATURES: [&str; 6] = [
    "with garden",
    "near the market",
    "with lake view",
    "by the beach",
    "in the old town",
    "with rooftop terrace",
];

#[derive(Debug, Clone, Copy)]
pub struct SeedOptions {
    pub hosts: usize,
    pub guests: usize,
    pub seed: u64,
}

impl Default for SeedOptions {
    fn default() -> Self {
        Self {
            hosts: 3,
            guests: 5,
            seed: 42,
        }
    }
}

#[derive(Debug, Serialize, PartialEq, Eq, Clone, Copy, Default)]
pub struct SeedReport {
    pub users: usize,
    pub listings: usize,
    pub bookings: usize,
}

/// Populates a store with sample marketplace data.
///
/// Creates an admin, hosts with two to four listings each (three random
/// amenities, a random set of watching guests) and one to three booking
/// attempts per guest. Bookings go through the rule engine, so attempts that
/// would overlap are skipped and every stored booking is priced correctly.
/// Users are matched by username, so reseeding a persistent store reuses them.
pub struct Seeder {
    store: MarketStoreRef,
    rng: StdRng,
    options: SeedOptions,
}

impl Seeder {
    pub fn new(store: MarketStoreRef, options: SeedOptions) -> Self {
        Self {
            store,
            rng: StdRng::seed_from_u64(options.seed),
            options,
        }
    }

    pub async fn run(mut self) -> Result<SeedReport> {
        let mut report = SeedReport::default();
        let today = Utc::now().date_naive();

        self.user("admin", "admin@stayhub.test", Role::Admin, "admin12345")
            .await?;
        report.users += 1;

        let mut hosts = Vec::with_capacity(self.options.hosts);
        for i in 1..=self.options.hosts {
            let username = format!("host{i}");
            let email = format!("{username}@stayhub.test");
            hosts.push(self.user(&username, &email, Role::Host, "host12345").await?);
        }
        let mut guests = Vec::with_capacity(self.options.guests);
        for i in 1..=self.options.guests {
            let username = format!("guest{i}");
            let email = format!("{username}@stayhub.test");
            guests.push(self.user(&username, &email, Role::Guest, "guest12345").await?);
        }
        report.users += hosts.len() + guests.len();

        let mut listings = Vec::new();
        for host in &hosts {
            for _ in 0..self.rng.gen_range(2..=4) {
                let listing = self.listing(host, &guests)?;
                self.store.store_listing(listing.clone()).await?;
                listings.push(listing);
            }
        }
        report.listings = listings.len();

        if !listings.is_empty() {
            for guest in &guests {
                for _ in 0..self.rng.gen_range(1..=3) {
                    if self.booking(guest, &listings, today).await? {
                        report.bookings += 1;
                    }
                }
            }
        }

        info!(
            users = report.users,
            listings = report.listings,
            bookings = report.bookings,
            "seeding completed"
        );
        Ok(report)
    }

    async fn user(&mut self, username: &str, email: &str, role: Role, password: &str) -> Result<User> {
        if let Some(existing) = self.store.find_user_by_username(username).await? {
            return Ok(existing);
        }
        let user = User::with_role(NewUser {
            username: username.to_string(),
            email: email.to_string(),
            first_name: pick(&mut self.rng, &FIRST_NAMES).to_string(),
            last_name: pick(&mut self.rng, &LAST_NAMES).to_string(),
            phone_number: Some(format!("+2519{:08}", self.rng.gen_range(0..100_000_000u32))),
            role,
            password: password.to_string(),
        })?;
        self.store.insert_user(user.clone()).await?;
        debug!(%username, %role, "seeded user");
        Ok(user)
    }

    fn listing(&mut self, host: &User, guests: &[User]) -> Result<Listing> {
        let place = pick(&mut self.rng, &PLACES);
        let title = format!(
            "{} {}",
            pick(&mut self.rng, &KINDS),
            pick(&mut self.rng, &FEATURES)
        );
        let amenities = Amenity::ALL
            .choose_multiple(&mut self.rng, 3)
            .copied()
            .collect();
        let mut listing = Listing::create(
            host,
            ListingDraft {
                description: format!("{title} in {place}."),
                title,
                location: place.to_string(),
                price_per_night: Decimal::from(self.rng.gen_range(50..=500u32)),
                is_available: true,
                amenities,
            },
        )?;

        let watchers = self.rng.gen_range(0..=guests.len().min(3));
        for guest in guests.choose_multiple(&mut self.rng, watchers) {
            listing.add_to_watchlist(guest.user_id)?;
        }
        Ok(listing)
    }

    /// Returns whether a booking was stored.
    async fn booking(&mut self, guest: &User, listings: &[Listing], today: NaiveDate) -> Result<bool> {
        let Some(listing) = listings.choose(&mut self.rng) else {
            return Ok(false);
        };
        let start = today + Duration::days(self.rng.gen_range(1..=120));
        let end = start + Duration::days(self.rng.gen_range(1..=10));

        let existing = self.store.bookings_for_listing(listing.listing_id).await?;
        let booking = match booking::validate_and_price(listing, start, end, &existing) {
            Ok(draft) => draft.into_booking(guest.user_id),
            Err(MarketError::DateConflict) => {
                debug!(listing_id = %listing.listing_id, %start, %end, "skipping overlapping booking");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };
        match self.store.insert_booking(booking).await {
            Ok(()) => Ok(true),
            Err(MarketError::DateConflict | MarketError::Conflict(_)) => Ok(false),
            Err(e) => Err(e),
        }
    }
}

fn pick<'a>(rng: &mut StdRng, pool: &[&'a str]) -> &'a str {
    pool.choose(rng).copied().unwrap_or_default()
}
