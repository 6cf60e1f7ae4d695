use super::retry_on_conflict;
use crate::domain::listing::{Amenity, Listing, ListingDraft, ListingId, ListingPatch};
use crate::domain::money::Amount;
use crate::domain::ports::{ListingStore, MarketStoreRef, ReviewStore, UserStore};
use crate::domain::review::{self, NewReview, Review};
use crate::domain::user::{NewUser, User, UserId};
use crate::error::{MarketError, Result};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::info;

/// Users, listings, watchlists and reviews.
pub struct Marketplace {
    store: MarketStoreRef,
}

#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct HostSummary {
    pub user_id: UserId,
    pub username: String,
    pub full_name: String,
}

/// A listing as clients see it: host details, watchers and rating resolved.
#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct ListingView {
    pub listing_id: ListingId,
    pub host: HostSummary,
    pub title: String,
    pub description: String,
    pub location: String,
    pub price_per_night: Amount,
    pub is_available: bool,
    pub amenities: BTreeSet<Amenity>,
    /// Full names of users watching the listing.
    pub interested_clients: Vec<String>,
    pub average_rating: Option<Decimal>,
    pub review_count: usize,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Serialize, PartialEq, Clone)]
pub struct ReviewView {
    #[serde(flatten)]
    pub review: Review,
    pub reviewer_full_name: String,
}

impl Marketplace {
    pub fn new(store: MarketStoreRef) -> Self {
        Self { store }
    }

    pub async fn signup(&self, new: NewUser) -> Result<User> {
        let user = User::register(new)?;
        self.store.insert_user(user.clone()).await?;
        info!(user_id = %user.user_id, role = %user.role, "user signed up");
        Ok(user)
    }

    /// Checks a username/password pair. Unknown users and wrong passwords
    /// fail identically.
    pub async fn login(&self, username: &str, password: &str) -> Result<User> {
        match self.store.find_user_by_username(username.trim()).await? {
            Some(user) if user.verify_password(password) => Ok(user),
            _ => Err(MarketError::Unauthorized(
                "Invalid username or password.".to_string(),
            )),
        }
    }

    pub async fn user(&self, user_id: UserId) -> Result<User> {
        self.store
            .get_user(user_id)
            .await?
            .ok_or(MarketError::NotFound("User"))
    }

    pub async fn user_by_username(&self, username: &str) -> Result<User> {
        self.store
            .find_user_by_username(username)
            .await?
            .ok_or(MarketError::NotFound("User"))
    }

    pub async fn create_listing(&self, host: &User, draft: ListingDraft) -> Result<ListingView> {
        let listing = Listing::create(host, draft)?;
        self.store.store_listing(listing.clone()).await?;
        info!(listing_id = %listing.listing_id, host_id = %host.user_id, "listing created");
        self.view(listing).await
    }

    pub async fn update_listing(
        &self,
        actor: &User,
        listing_id: ListingId,
        patch: ListingPatch,
    ) -> Result<ListingView> {
        let listing = self
            .modify_listing(listing_id, |listing| {
                if !listing.is_hosted_by(actor.user_id) {
                    return Err(MarketError::Unauthorized(
                        "You are not authorized to edit this listing.".to_string(),
                    ));
                }
                listing.apply(patch.clone())
            })
            .await?;
        self.view(listing).await
    }

    /// Deletes a listing with its bookings, payments and reviews.
    pub async fn delete_listing(&self, actor: &User, listing_id: ListingId) -> Result<()> {
        let listing = self.listing_row(listing_id).await?;
        if !listing.is_hosted_by(actor.user_id) && !actor.is_admin() {
            return Err(MarketError::Unauthorized(
                "You are not authorized to delete this listing.".to_string(),
            ));
        }
        if !self.store.delete_listing(listing_id).await? {
            return Err(MarketError::NotFound("Listing"));
        }
        info!(%listing_id, by = %actor.user_id, "listing deleted");
        Ok(())
    }

    pub async fn listings(&self) -> Result<Vec<ListingView>> {
        let users: HashMap<UserId, User> = self
            .store
            .all_users()
            .await?
            .into_iter()
            .map(|u| (u.user_id, u))
            .collect();
        let mut listings = self.store.all_listings().await?;
        listings.sort_by_key(|l| l.created_at);

        let mut views = Vec::with_capacity(listings.len());
        for listing in listings {
            let reviews = self.store.reviews_for_listing(listing.listing_id).await?;
            views.push(build_view(listing, &users, &reviews));
        }
        Ok(views)
    }

    pub async fn listing(&self, listing_id: ListingId) -> Result<ListingView> {
        let listing = self.listing_row(listing_id).await?;
        self.view(listing).await
    }

    pub async fn add_to_watchlist(&self, actor: &User, listing_id: ListingId) -> Result<()> {
        self.modify_listing(listing_id, |listing| listing.add_to_watchlist(actor.user_id))
            .await
            .map(|_| ())
    }

    pub async fn remove_from_watchlist(&self, actor: &User, listing_id: ListingId) -> Result<()> {
        self.modify_listing(listing_id, |listing| {
            listing.remove_from_watchlist(actor.user_id)
        })
        .await
        .map(|_| ())
    }

    /// Read-modify-write of one listing, replayed from a fresh read when a
    /// concurrent writer commits first. A listing deleted in between stays
    /// deleted.
    async fn modify_listing<F>(&self, listing_id: ListingId, change: F) -> Result<Listing>
    where
        F: Fn(&mut Listing) -> Result<()> + Sync,
    {
        let change = &change;
        retry_on_conflict(move || async move {
            let mut listing = self.listing_row(listing_id).await?;
            let expected = listing.updated_at;
            change(&mut listing)?;
            self.store.update_listing(&listing, expected).await?;
            Ok(listing)
        })
        .await
    }

    pub async fn reviews(&self, listing_id: ListingId) -> Result<Vec<ReviewView>> {
        self.listing_row(listing_id).await?;
        let reviews = self.store.reviews_for_listing(listing_id).await?;
        let mut views = Vec::with_capacity(reviews.len());
        for review in reviews {
            let reviewer_full_name = self
                .store
                .get_user(review.reviewer_id)
                .await?
                .map(|u| u.full_name())
                .unwrap_or_default();
            views.push(ReviewView {
                review,
                reviewer_full_name,
            });
        }
        Ok(views)
    }

    /// One review per user and listing; hosts cannot rate their own listing.
    pub async fn add_review(
        &self,
        actor: &User,
        listing_id: ListingId,
        new: NewReview,
    ) -> Result<ReviewView> {
        let listing = self.listing_row(listing_id).await?;
        if listing.is_hosted_by(actor.user_id) {
            return Err(MarketError::ValidationError(
                "You cannot review your own listing.".to_string(),
            ));
        }
        let review = Review::new(listing_id, actor.user_id, new)?;
        self.store.insert_review(review.clone()).await?;
        Ok(ReviewView {
            review,
            reviewer_full_name: actor.full_name(),
        })
    }

    async fn listing_row(&self, listing_id: ListingId) -> Result<Listing> {
        self.store
            .get_listing(listing_id)
            .await?
            .ok_or(MarketError::NotFound("Listing"))
    }

    async fn view(&self, listing: Listing) -> Result<ListingView> {
        let mut users = HashMap::new();
        for user_id in std::iter::once(listing.host_id).chain(listing.watchlist.iter().copied()) {
            if let Some(user) = self.store.get_user(user_id).await? {
                users.insert(user_id, user);
            }
        }
        let reviews = self.store.reviews_for_listing(listing.listing_id).await?;
        Ok(build_view(listing, &users, &reviews))
    }
}

fn build_view(listing: Listing, users: &HashMap<UserId, User>, reviews: &[Review]) -> ListingView {
    let host = users.get(&listing.host_id);
    ListingView {
        listing_id: listing.listing_id,
        host: HostSummary {
            user_id: listing.host_id,
            username: host.map(|u| u.username.clone()).unwrap_or_default(),
            full_name: host.map(User::full_name).unwrap_or_default(),
        },
        interested_clients: listing
            .watchlist
            .iter()
            .filter_map(|id| users.get(id).map(User::full_name))
            .collect(),
        average_rating: review::average_rating(reviews),
        review_count: reviews.len(),
        title: listing.title,
        description: listing.description,
        location: listing.location,
        price_per_night: listing.price_per_night,
        is_available: listing.is_available,
        amenities: listing.amenities,
        created_at: listing.created_at,
        updated_at: listing.updated_at,
    }
}
