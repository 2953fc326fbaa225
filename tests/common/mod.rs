#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, Method, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use rust_decimal::Decimal;
use sea_orm::{ConnectionTrait, DatabaseBackend as DbBackend, Statement};
use serde_json::Value;
use tokio::sync::{mpsc, Mutex};
use tower::ServiceExt;
use uuid::Uuid;

use travelnest_api::{
    auth::AuthenticatedUser,
    config::AppConfig,
    db,
    events::{self, EventSender},
    gateway::{
        GatewayError, InitializeRequest, InitializeResponse, PaymentGateway, VerifyResponse,
    },
    handlers::AppServices,
    notifications::{EmailSender, NotificationDispatcher, NotificationError},
    AppState,
};

/// What the stubbed provider should answer on the next `initialize` call.
#[derive(Debug, Clone)]
pub enum InitBehavior {
    Accept,
    Reject(String),
    Unreachable,
}

/// What the stubbed provider should answer on the next `verify` call.
#[derive(Debug, Clone)]
pub enum VerifyBehavior {
    Paid,
    /// Paid, but the provider echoes this amount back.
    PaidWithAmount(Decimal),
    NotPaid,
    Unreachable,
}

/// In-process stand-in for the external payment provider.
pub struct StubGateway {
    pub init_behavior: Mutex<InitBehavior>,
    pub verify_behavior: Mutex<VerifyBehavior>,
    pub init_calls: AtomicUsize,
    pub verify_calls: AtomicUsize,
}

impl StubGateway {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            init_behavior: Mutex::new(InitBehavior::Accept),
            verify_behavior: Mutex::new(VerifyBehavior::Paid),
            init_calls: AtomicUsize::new(0),
            verify_calls: AtomicUsize::new(0),
        })
    }

    pub async fn set_init(&self, behavior: InitBehavior) {
        *self.init_behavior.lock().await = behavior;
    }

    pub async fn set_verify(&self, behavior: VerifyBehavior) {
        *self.verify_behavior.lock().await = behavior;
    }
}

#[async_trait]
impl PaymentGateway for StubGateway {
    async fn initialize(&self, req: InitializeRequest) -> Result<InitializeResponse, GatewayError> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        match self.init_behavior.lock().await.clone() {
            InitBehavior::Accept => Ok(InitializeResponse {
                checkout_url: format!("https://checkout.test/{}", req.tx_ref),
            }),
            InitBehavior::Reject(reason) => Err(GatewayError::Rejected(reason)),
            InitBehavior::Unreachable => {
                Err(GatewayError::Unavailable("connection refused".to_string()))
            }
        }
    }

    async fn verify(&self, _tx_ref: &str) -> Result<VerifyResponse, GatewayError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        match self.verify_behavior.lock().await.clone() {
            VerifyBehavior::Paid => Ok(VerifyResponse {
                success: true,
                amount: None,
                raw: serde_json::json!({"status": "success"}),
            }),
            VerifyBehavior::PaidWithAmount(amount) => Ok(VerifyResponse {
                success: true,
                amount: Some(amount),
                raw: serde_json::json!({"status": "success", "amount": amount.to_string()}),
            }),
            VerifyBehavior::NotPaid => Ok(VerifyResponse {
                success: false,
                amount: None,
                raw: serde_json::json!({"status": "failed"}),
            }),
            VerifyBehavior::Unreachable => {
                Err(GatewayError::Unavailable("gateway request timed out".to_string()))
            }
        }
    }
}

/// Email sender that records deliveries for assertion.
pub struct CaptureEmailSender {
    sent: Mutex<Vec<(String, String)>>,
}

impl CaptureEmailSender {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            sent: Mutex::new(Vec::new()),
        })
    }

    /// (recipient, subject) pairs delivered so far.
    pub async fn sent(&self) -> Vec<(String, String)> {
        self.sent.lock().await.clone()
    }
}

#[async_trait]
impl EmailSender for CaptureEmailSender {
    async fn send(
        &self,
        recipient: &str,
        subject: &str,
        _body: &str,
    ) -> Result<(), NotificationError> {
        self.sent
            .lock()
            .await
            .push((recipient.to_string(), subject.to_string()));
        Ok(())
    }
}

/// Helper harness for spinning up an application state backed by an in-memory
/// SQLite database, with the gateway and mail transport stubbed.
pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub gateway: Arc<StubGateway>,
    pub emails: Arc<CaptureEmailSender>,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    /// Construct a new test application with fresh database state.
    pub async fn new() -> Self {
        // A single pooled connection keeps the whole suite on one shared
        // in-memory database.
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;

        let pool = db::establish_connection_from_app_config(&cfg)
            .await
            .expect("failed to create test database");

        let schema_sql = [
            r#"CREATE TABLE listings (
                id TEXT PRIMARY KEY NOT NULL,
                host_id TEXT NOT NULL,
                name TEXT NOT NULL,
                description TEXT NOT NULL,
                location TEXT NOT NULL,
                price_per_night REAL NOT NULL,
                created_at TEXT NOT NULL,
                updated_at TEXT
            );"#,
            r#"CREATE TABLE bookings (
                id TEXT PRIMARY KEY NOT NULL,
                listing_id TEXT NOT NULL REFERENCES listings(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL,
                start_date TEXT NOT NULL,
                end_date TEXT NOT NULL,
                total_price REAL NOT NULL,
                status TEXT NOT NULL,
                created_at TEXT NOT NULL
            );"#,
            r#"CREATE TABLE payments (
                id TEXT PRIMARY KEY NOT NULL,
                booking_id TEXT NOT NULL REFERENCES bookings(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL,
                payer_email TEXT NOT NULL,
                tx_ref TEXT NOT NULL UNIQUE,
                amount REAL NOT NULL,
                status TEXT NOT NULL,
                checkout_url TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT
            );"#,
            r#"CREATE TABLE reviews (
                id TEXT PRIMARY KEY NOT NULL,
                listing_id TEXT NOT NULL REFERENCES listings(id) ON DELETE CASCADE,
                user_id TEXT NOT NULL,
                rating INTEGER NOT NULL,
                comment TEXT NOT NULL,
                created_at TEXT NOT NULL
            );"#,
        ];
        for sql in schema_sql {
            pool.execute(Statement::from_string(DbBackend::Sqlite, sql.to_string()))
                .await
                .expect("create test schema");
        }

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = Arc::new(EventSender::new(event_tx));
        let event_task = tokio::spawn(events::process_events(event_rx));

        let gateway = StubGateway::new();
        let emails = CaptureEmailSender::new();
        let dispatcher = NotificationDispatcher::start(64, emails.clone());

        let services = AppServices::new(
            db_arc.clone(),
            event_sender.clone(),
            gateway.clone(),
            dispatcher,
            cfg.clone(),
        );

        let state = AppState {
            db: db_arc,
            config: cfg,
            event_sender,
            services,
        };

        let router = Router::new()
            .nest("/api/v1", travelnest_api::api_v1_routes())
            .with_state(state.clone());

        Self {
            router,
            state,
            gateway,
            emails,
            _event_task: event_task,
        }
    }

    /// Issue a request against the in-memory router and decode the JSON body.
    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        user: Option<&AuthenticatedUser>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(user) = user {
            builder = builder
                .header("x-user-id", user.id.to_string())
                .header("x-user-email", user.email.clone())
                .header("x-user-first-name", user.first_name.clone())
                .header("x-user-last-name", user.last_name.clone())
                .header("x-user-staff", if user.is_staff { "1" } else { "0" });
        }

        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .expect("build request"),
            None => builder.body(Body::empty()).expect("build request"),
        };

        let response = self
            .router
            .clone()
            .oneshot(request)
            .await
            .expect("router call failed");

        let status = response.status();
        let bytes = response
            .into_body()
            .collect()
            .await
            .expect("read response body")
            .to_bytes();
        let json = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, json)
    }
}

/// A regular guest principal.
pub fn guest(email: &str) -> AuthenticatedUser {
    AuthenticatedUser {
        id: Uuid::new_v4(),
        email: email.to_string(),
        first_name: "Test".to_string(),
        last_name: "Guest".to_string(),
        is_staff: false,
    }
}

/// A staff principal that can see and manage everything.
pub fn staff() -> AuthenticatedUser {
    AuthenticatedUser {
        id: Uuid::new_v4(),
        email: "ops@travelnest.test".to_string(),
        first_name: "Ops".to_string(),
        last_name: "Staff".to_string(),
        is_staff: true,
    }
}

/// Seed a listing owned by `host` and return its id.
pub async fn seed_listing(app: &TestApp, host: &AuthenticatedUser, price_per_night: Decimal) -> Uuid {
    let listing = app
        .state
        .services
        .listings
        .create_listing(
            travelnest_api::services::listings::CreateListingRequest {
                name: "Lakeside Cabin".to_string(),
                description: "Two bedrooms, a dock, and no neighbors.".to_string(),
                location: "Bahir Dar".to_string(),
                price_per_night,
            },
            host,
        )
        .await
        .expect("seed listing");
    listing.listing_id
}
