//! Shared harness for the portal integration tests.
//!
//! The router is driven in-process with `oneshot`; every repository is the
//! in-memory implementation, so no database is needed.

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, Method, Request, StatusCode},
    Router,
};
use portal_service::{
    build_router,
    config::{
        Environment, JwtConfig, LockoutConfig, PortalConfig, RateLimitConfig, SecurityConfig,
        SessionConfig, StoreConfig, StoresConfig,
    },
    federation::ConnectionFederator,
    models::{Role, User},
    repositories::{
        BillingRepository, MemoryAppointmentRepository, MemoryBillingRepository,
        MemoryPatientRepository, MemoryStaffRepository, MemoryUserRepository, PatientRepository,
        UserRepository,
    },
    services::RecordingDelivery,
    utils::{hash_password, Password},
    AppState, Repositories,
};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tower::util::ServiceExt;

pub const PASSWORD: &str = "Password123";

fn store(database: &str) -> StoreConfig {
    StoreConfig {
        uri: None,
        database: database.to_string(),
    }
}

pub fn test_config() -> PortalConfig {
    PortalConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "portal-service-test".to_string(),
        service_version: "0.0.0".to_string(),
        log_level: "error".to_string(),
        otlp_endpoint: None,
        jwt: JwtConfig {
            access_secret: "test-access-secret-0123456789abcdef0123".to_string(),
            refresh_secret: "test-refresh-secret-0123456789abcdef012".to_string(),
            access_token_expiry_minutes: 15,
            refresh_token_expiry_days: 7,
        },
        sessions: SessionConfig {
            max_refresh_tokens: 5,
        },
        lockout: LockoutConfig {
            threshold: 5,
            duration_minutes: 120,
        },
        self_service_role: Role::Patient,
        stores: StoresConfig {
            primary: store("portal_test"),
            billing: store("billing_test"),
            staff: store("staff_test"),
            timeout_ms: 100,
        },
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        rate_limit: RateLimitConfig {
            login_attempts: 1000,
            login_window_seconds: 60,
            register_attempts: 1000,
            register_window_seconds: 60,
            password_reset_attempts: 1000,
            password_reset_window_seconds: 60,
        },
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub users: Arc<MemoryUserRepository>,
    pub patients: Arc<MemoryPatientRepository>,
    pub appointments: Arc<MemoryAppointmentRepository>,
    pub billing: Arc<MemoryBillingRepository>,
    pub staff: Arc<MemoryStaffRepository>,
    pub delivery: Arc<RecordingDelivery>,
}

/// Repositories that replace the in-memory defaults.
#[derive(Default)]
struct Overrides {
    patients: Option<Arc<dyn PatientRepository>>,
    billing: Option<Arc<dyn BillingRepository>>,
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(test_config(), Overrides::default())
    }

    pub fn with_config(config: PortalConfig) -> Self {
        Self::build(config, Overrides::default())
    }

    /// Replace the billing store with `billing`, e.g. one that never answers.
    pub fn with_billing(billing: Arc<dyn BillingRepository>) -> Self {
        Self::build(
            test_config(),
            Overrides {
                billing: Some(billing),
                ..Overrides::default()
            },
        )
    }

    /// Replace the patient store with `patients`.
    pub fn with_patients(patients: Arc<dyn PatientRepository>) -> Self {
        Self::build(
            test_config(),
            Overrides {
                patients: Some(patients),
                ..Overrides::default()
            },
        )
    }

    fn build(config: PortalConfig, overrides: Overrides) -> Self {
        let users = Arc::new(MemoryUserRepository::new());
        let patients = Arc::new(MemoryPatientRepository::new());
        let appointments = Arc::new(MemoryAppointmentRepository::new());
        let billing = Arc::new(MemoryBillingRepository::new());
        let staff = Arc::new(MemoryStaffRepository::new());
        let delivery = Arc::new(RecordingDelivery::new());

        let repositories = Repositories {
            users: users.clone(),
            patients: overrides
                .patients
                .unwrap_or_else(|| patients.clone() as Arc<dyn PatientRepository>),
            appointments: appointments.clone(),
            billing: overrides
                .billing
                .unwrap_or_else(|| billing.clone() as Arc<dyn BillingRepository>),
            staff: staff.clone(),
        };

        let federator = Arc::new(ConnectionFederator::new(config.stores.federation()));
        let state = AppState::from_parts(config, federator, repositories, delivery.clone())
            .expect("Failed to build test state");
        let router = build_router(state.clone());

        Self {
            router,
            state,
            users,
            patients,
            appointments,
            billing,
            staff,
            delivery,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let body = match body {
            Some(value) => {
                builder = builder.header(header::CONTENT_TYPE, "application/json");
                Body::from(value.to_string())
            }
            None => Body::empty(),
        };

        self.send(builder.body(body).unwrap()).await
    }

    pub async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or(Value::Null)
        };
        (status, value)
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body), None).await
    }

    pub async fn get(&self, uri: &str, token: &str) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None, Some(token)).await
    }

    /// Register a patient and return the response body.
    pub async fn register(&self, email: &str) -> Value {
        let (status, body) = self
            .post(
                "/api/v1/auth/register",
                json!({
                    "email": email,
                    "password": PASSWORD,
                    "firstName": "Jane",
                    "lastName": "Doe"
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "register failed: {}", body);
        body
    }

    pub async fn login(&self, email: &str, password: &str) -> (StatusCode, Value) {
        self.post(
            "/api/v1/auth/login",
            json!({ "email": email, "password": password }),
        )
        .await
    }

    pub async fn change_password(
        &self,
        token: &str,
        current: &str,
        new: &str,
    ) -> (StatusCode, Value) {
        self.request(
            Method::POST,
            "/api/v1/auth/change-password",
            Some(json!({ "currentPassword": current, "newPassword": new })),
            Some(token),
        )
        .await
    }

    /// Insert a principal with `role` directly and log it in.
    pub async fn staff_token(&self, email: &str, role: Role) -> String {
        let hash = hash_password(&Password::new(PASSWORD.to_string())).unwrap();
        let user = User::new(email, hash.into_string(), role);
        self.users.insert(&user).await.unwrap();

        let (status, body) = self.login(email, PASSWORD).await;
        assert_eq!(status, StatusCode::OK, "login failed: {}", body);
        body["accessToken"].as_str().unwrap().to_string()
    }
}

pub fn access_token(body: &Value) -> String {
    body["accessToken"].as_str().unwrap().to_string()
}

pub fn refresh_token(body: &Value) -> String {
    body["refreshToken"].as_str().unwrap().to_string()
}

pub fn profile_id(body: &Value) -> String {
    body["user"]["profileId"].as_str().unwrap().to_string()
}
