//! Transport-neutral request dispatcher.
//!
//! A request is `{method, path, actor?, body}` and a response is
//! `{status, body}`; whatever carries them (HTTP server, JSONL replay, tests)
//! is responsible for authentication and fills `actor` with the
//! authenticated user's id or username.

use crate::application::bookings::{BookingAction, BookingRequest, BookingService};
use crate::application::marketplace::Marketplace;
use crate::application::payments::{InitPayment, PaymentService, WebhookEvent};
use crate::domain::listing::{ListingDraft, ListingPatch};
use crate::domain::ports::{MarketStoreRef, NotifierRef, PaymentGatewayRef};
use crate::domain::review::NewReview;
use crate::domain::user::{NewUser, User};
use crate::error::{MarketError, Result};
use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Value, json};
use tracing::{debug, error, warn};
use uuid::Uuid;

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ApiRequest {
    pub method: String,
    pub path: String,
    #[serde(default)]
    pub actor: Option<String>,
    #[serde(default)]
    pub body: Value,
}

impl ApiRequest {
    pub fn new(method: &str, path: &str) -> Self {
        Self {
            method: method.to_string(),
            path: path.to_string(),
            actor: None,
            body: Value::Null,
        }
    }

    pub fn actor(mut self, actor: impl ToString) -> Self {
        self.actor = Some(actor.to_string());
        self
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = body;
        self
    }
}

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn new(status: u16, body: Value) -> Self {
        Self { status, body }
    }

    fn json<T: Serialize>(status: u16, value: &T) -> Result<Self> {
        let body = serde_json::to_value(value)
            .map_err(|e| MarketError::internal(format!("response serialization failed: {e}")))?;
        Ok(Self::new(status, body))
    }

    fn detail(status: u16, message: &str) -> Self {
        Self::new(status, json!({ "detail": message }))
    }

    fn from_error(err: &MarketError) -> Self {
        let status = err.status_code();
        match err {
            MarketError::GatewayTimeout(_) | MarketError::GatewayError(_) => {
                warn!(error = %err, "gateway failure")
            }
            _ if status >= 500 => error!(error = %err, "request failed"),
            _ => debug!(error = %err, status, "request rejected"),
        }
        Self::new(
            status,
            json!({ "error": err.kind(), "detail": err.public_message() }),
        )
    }
}

#[derive(Deserialize)]
struct Credentials {
    username: String,
    password: String,
}

#[derive(Deserialize)]
struct TxRef {
    tx_ref: String,
}

/// The marketplace API surface.
pub struct Api {
    marketplace: Marketplace,
    bookings: BookingService,
    payments: PaymentService,
}

impl Api {
    pub fn new(
        store: MarketStoreRef,
        gateway: PaymentGatewayRef,
        notifier: NotifierRef,
        currency: &str,
    ) -> Self {
        Self {
            marketplace: Marketplace::new(store.clone()),
            bookings: BookingService::new(store.clone()),
            payments: PaymentService::new(store, gateway, notifier, currency),
        }
    }

    /// Dispatches one request. Never fails: errors become error responses.
    pub async fn handle(&self, request: ApiRequest) -> ApiResponse {
        match self.route(&request).await {
            Ok(response) => response,
            Err(e) => ApiResponse::from_error(&e),
        }
    }

    async fn route(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let method = request.method.to_ascii_uppercase();
        let (path, query) = match request.path.split_once('?') {
            Some((path, query)) => (path, Some(query)),
            None => (request.path.as_str(), None),
        };
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

        match (method.as_str(), segments.as_slice()) {
            ("POST", ["auth", "signup"]) => {
                let user = self.marketplace.signup(parse_body::<NewUser>(request)?).await?;
                ApiResponse::json(201, &user.view())
            }
            ("POST", ["auth", "login"]) => {
                let credentials: Credentials = parse_body(request)?;
                let user = self
                    .marketplace
                    .login(&credentials.username, &credentials.password)
                    .await?;
                ApiResponse::json(200, &user.view())
            }

            ("GET", ["listings"]) => ApiResponse::json(200, &self.marketplace.listings().await?),
            ("POST", ["listings"]) => {
                let host = self.actor(request).await?;
                let draft: ListingDraft = parse_body(request)?;
                ApiResponse::json(201, &self.marketplace.create_listing(&host, draft).await?)
            }
            ("GET", ["listings", id]) => {
                let listing_id = parse_id(id, "Listing")?;
                ApiResponse::json(200, &self.marketplace.listing(listing_id).await?)
            }
            ("PUT" | "PATCH", ["listings", id]) => {
                let actor = self.actor(request).await?;
                let listing_id = parse_id(id, "Listing")?;
                let patch: ListingPatch = parse_body(request)?;
                let view = self
                    .marketplace
                    .update_listing(&actor, listing_id, patch)
                    .await?;
                ApiResponse::json(200, &view)
            }
            ("DELETE", ["listings", id]) => {
                let actor = self.actor(request).await?;
                let listing_id = parse_id(id, "Listing")?;
                self.marketplace.delete_listing(&actor, listing_id).await?;
                Ok(ApiResponse::new(204, Value::Null))
            }
            ("POST", ["listings", id, "book"]) => {
                let guest = self.actor(request).await?;
                let listing_id = parse_id(id, "Listing")?;
                let stay: BookingRequest = parse_body(request)?;
                ApiResponse::json(201, &self.bookings.book(&guest, listing_id, stay).await?)
            }
            ("POST", ["listings", id, "add_to_watchlist"]) => {
                let actor = self.actor(request).await?;
                let listing_id = parse_id(id, "Listing")?;
                self.marketplace.add_to_watchlist(&actor, listing_id).await?;
                Ok(ApiResponse::detail(200, "Listing added to watchlist."))
            }
            ("POST", ["listings", id, "remove_from_watchlist"]) => {
                let actor = self.actor(request).await?;
                let listing_id = parse_id(id, "Listing")?;
                self.marketplace
                    .remove_from_watchlist(&actor, listing_id)
                    .await?;
                Ok(ApiResponse::detail(200, "Listing removed from watchlist."))
            }
            ("GET", ["listings", id, "reviews"]) => {
                let listing_id = parse_id(id, "Listing")?;
                ApiResponse::json(200, &self.marketplace.reviews(listing_id).await?)
            }
            ("POST", ["listings", id, "reviews"]) => {
                let actor = self.actor(request).await?;
                let listing_id = parse_id(id, "Listing")?;
                let review: NewReview = parse_body(request)?;
                let view = self
                    .marketplace
                    .add_review(&actor, listing_id, review)
                    .await?;
                ApiResponse::json(201, &view)
            }

            ("GET", ["bookings"]) => {
                let actor = self.actor(request).await?;
                ApiResponse::json(200, &self.bookings.visible_bookings(&actor).await?)
            }
            ("GET", ["bookings", id]) => {
                let actor = self.actor(request).await?;
                let booking_id = parse_id(id, "Booking")?;
                ApiResponse::json(200, &self.bookings.booking(&actor, booking_id).await?)
            }
            ("POST", ["bookings", id, action]) => {
                let action = match *action {
                    "approve" => BookingAction::Approve,
                    "decline" => BookingAction::Decline,
                    "cancel" => BookingAction::Cancel,
                    "complete" => BookingAction::Complete {
                        today: Utc::now().date_naive(),
                    },
                    _ => return Err(MarketError::NotFound("Endpoint")),
                };
                let actor = self.actor(request).await?;
                let booking_id = parse_id(id, "Booking")?;
                let booking = self
                    .bookings
                    .transition(&actor, booking_id, action)
                    .await?;
                ApiResponse::json(200, &booking)
            }

            ("POST", ["payments", "init"]) => {
                let payer = self.actor(request).await?;
                let init: InitPayment = parse_body(request)?;
                ApiResponse::json(201, &self.payments.initialize(&payer, init).await?)
            }
            ("POST", ["payments", "verify"]) => {
                let actor = self.actor(request).await?;
                let TxRef { tx_ref } = parse_body(request)?;
                let payment = self.payments.verify(&actor, &tx_ref).await?;
                ApiResponse::json(
                    200,
                    &json!({ "payment": payment, "message": "Payment verified successfully" }),
                )
            }
            ("POST", ["payments", "webhook"]) => {
                let event: WebhookEvent = parse_body(request)?;
                let payment = self.payments.webhook(event).await?;
                ApiResponse::json(
                    200,
                    &json!({ "tx_ref": payment.reference, "payment_status": payment.payment_status }),
                )
            }
            ("GET", ["payments", "return"]) => {
                let tx_ref = query
                    .and_then(|q| query_param(q, "tx_ref"))
                    .or_else(|| {
                        request
                            .body
                            .get("tx_ref")
                            .and_then(Value::as_str)
                            .map(str::to_string)
                    })
                    .ok_or_else(|| {
                        MarketError::ValidationError("tx_ref: this field is required".to_string())
                    })?;
                let payment = self.payments.payment(&tx_ref).await?;
                ApiResponse::json(
                    200,
                    &json!({
                        "tx_ref": payment.reference,
                        "booking_id": payment.booking_id,
                        "payment_status": payment.payment_status,
                    }),
                )
            }

            _ => Err(MarketError::NotFound("Endpoint")),
        }
    }

    /// Resolves the authenticated user. Write endpoints require one.
    async fn actor(&self, request: &ApiRequest) -> Result<User> {
        let Some(actor) = request.actor.as_deref().map(str::trim) else {
            return Err(MarketError::Unauthorized(
                "Authentication credentials were not provided.".to_string(),
            ));
        };
        let found = match Uuid::parse_str(actor) {
            Ok(user_id) => self.marketplace.user(user_id).await,
            Err(_) => self.marketplace.user_by_username(actor).await,
        };
        match found {
            Err(MarketError::NotFound(_)) => Err(MarketError::Unauthorized(
                "Unknown user.".to_string(),
            )),
            other => other,
        }
    }
}

fn parse_body<T: DeserializeOwned>(request: &ApiRequest) -> Result<T> {
    Ok(serde_json::from_value(request.body.clone())?)
}

fn parse_id(segment: &str, what: &'static str) -> Result<Uuid> {
    Uuid::parse_str(segment).map_err(|_| MarketError::NotFound(what))
}

/// First non-empty, percent-decoded value of `name` in a query string.
fn query_param(query: &str, name: &str) -> Option<String> {
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}
