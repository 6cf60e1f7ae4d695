#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use serde_json::{Value, json};
use stayhub::domain::listing::{Listing, ListingDraft};
use stayhub::domain::payment::{GatewayStatus, Payment};
use stayhub::domain::ports::{
    Checkout, CheckoutRequest, Notifier, PaymentGateway, Verification,
};
use stayhub::domain::user::{Role, User};
use stayhub::error::{MarketError, Result};
use stayhub::infrastructure::in_memory::InMemoryStore;
use stayhub::interfaces::api::{Api, ApiRequest, ApiResponse};
use rust_decimal::Decimal;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use uuid::Uuid;

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    Timeout,
    Error,
}

/// In-process stand-in for the payment provider.
pub struct FakeGateway {
    reported: Mutex<GatewayStatus>,
    failure: Mutex<Option<Failure>>,
    pub checkouts: Mutex<Vec<CheckoutRequest>>,
    pub verifications: AtomicUsize,
}

impl FakeGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            reported: Mutex::new(GatewayStatus::Success),
            failure: Mutex::new(None),
            checkouts: Mutex::new(Vec::new()),
            verifications: AtomicUsize::new(0),
        })
    }

    pub fn report(&self, status: GatewayStatus) {
        *self.reported.lock().unwrap() = status;
    }

    pub fn fail(&self, failure: Option<Failure>) {
        *self.failure.lock().unwrap() = failure;
    }

    fn check_failure(&self) -> Result<()> {
        match *self.failure.lock().unwrap() {
            Some(Failure::Timeout) => Err(MarketError::GatewayTimeout(Duration::from_secs(15))),
            Some(Failure::Error) => Err(MarketError::GatewayError(
                "connection reset by 10.1.2.3".to_string(),
            )),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    async fn initialize(&self, request: CheckoutRequest) -> Result<Checkout> {
        self.check_failure()?;
        let reference = request
            .reference
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.checkouts.lock().unwrap().push(request);
        Ok(Checkout {
            checkout_url: format!("https://checkout.fake/{reference}"),
            reference,
        })
    }

    async fn verify(&self, reference: &str) -> Result<Verification> {
        self.check_failure()?;
        self.verifications.fetch_add(1, Ordering::SeqCst);
        let status = *self.reported.lock().unwrap();
        Ok(Verification {
            status,
            raw_payload: json!({"status": "success", "data": {"tx_ref": reference, "status": status}}),
        })
    }
}

/// Notifier that remembers `(email, tx_ref)` for every confirmation.
#[derive(Default)]
pub struct RecordingNotifier {
    pub sent: Mutex<Vec<(String, String)>>,
}

impl RecordingNotifier {
    pub fn count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn payment_succeeded(&self, payer: &User, payment: &Payment) -> Result<()> {
        self.sent
            .lock()
            .unwrap()
            .push((payer.email.clone(), payment.reference.clone()));
        Ok(())
    }
}

/// The API wired to an in-memory store and fakes.
pub struct TestApp {
    pub api: Api,
    pub store: Arc<InMemoryStore>,
    pub gateway: Arc<FakeGateway>,
    pub notifier: Arc<RecordingNotifier>,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(InMemoryStore::new());
        let gateway = FakeGateway::new();
        let notifier = Arc::new(RecordingNotifier::default());
        let api = Api::new(store.clone(), gateway.clone(), notifier.clone(), "ETB");
        Self {
            api,
            store,
            gateway,
            notifier,
        }
    }

    pub async fn call(&self, method: &str, path: &str, actor: Option<&str>, body: Value) -> ApiResponse {
        let mut request = ApiRequest::new(method, path).body(body);
        if let Some(actor) = actor {
            request = request.actor(actor);
        }
        self.api.handle(request).await
    }

    /// Signs up `username` with the given role and returns the user view.
    pub async fn signup(&self, username: &str, role: &str) -> Value {
        let response = self
            .call(
                "POST",
                "/auth/signup",
                None,
                json!({
                    "username": username,
                    "email": format!("{username}@example.com"),
                    "first_name": username,
                    "last_name": "Tester",
                    "role": role,
                    "password": "password123",
                }),
            )
            .await;
        assert_eq!(response.status, 201, "signup failed: {:?}", response.body);
        response.body
    }

    /// Creates a listing at `price` per night and returns its id.
    pub async fn listing(&self, host: &str, price: &str) -> String {
        let response = self
            .call(
                "POST",
                "/listings",
                Some(host),
                json!({
                    "title": "Lakeside cabin",
                    "description": "Two rooms and a fireplace",
                    "location": "Bishoftu",
                    "price_per_night": price,
                    "amenities": ["WI-FI", "PARKING"],
                }),
            )
            .await;
        assert_eq!(response.status, 201, "listing failed: {:?}", response.body);
        id(&response.body, "listing_id")
    }

    pub async fn book(&self, guest: &str, listing_id: &str, start: &str, end: &str) -> ApiResponse {
        self.call(
            "POST",
            &format!("/listings/{listing_id}/book"),
            Some(guest),
            json!({"start_date": start, "end_date": end}),
        )
        .await
    }

    /// Host, guest, a 100/night listing and a PENDING 3-night booking.
    pub async fn booked() -> (Self, String) {
        let app = Self::new();
        app.signup("host", "host").await;
        app.signup("guest", "guest").await;
        let listing_id = app.listing("host", "100").await;
        let response = app.book("guest", &listing_id, "2030-06-01", "2030-06-04").await;
        assert_eq!(response.status, 201, "booking failed: {:?}", response.body);
        let booking_id = id(&response.body, "booking_id");
        (app, booking_id)
    }
}

pub fn id(body: &Value, field: &str) -> String {
    body[field]
        .as_str()
        .unwrap_or_else(|| panic!("missing {field} in {body}"))
        .to_string()
}

/// A user built in memory without hashing a password.
pub fn user(role: Role) -> User {
    User {
        user_id: Uuid::new_v4(),
        username: format!("{role}-{}", Uuid::new_v4().simple()),
        email: format!("{role}@example.com"),
        first_name: String::new(),
        last_name: String::new(),
        phone_number: None,
        role,
        password_hash: String::new(),
        created_at: Utc::now(),
    }
}

pub fn listing_for(host: &User, price: Decimal) -> Listing {
    Listing::create(
        host,
        ListingDraft {
            title: "Test flat".to_string(),
            description: String::new(),
            location: "Hawassa".to_string(),
            price_per_night: price,
            is_available: true,
            amenities: vec![],
        },
    )
    .unwrap()
}
