pub mod config;
pub mod dtos;
pub mod federation;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod repositories;
pub mod services;
pub mod utils;

use axum::{
    http::{header, HeaderName, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post},
    Router,
};
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimit},
    security_headers::security_headers_middleware,
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use std::sync::Arc;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{Environment, PortalConfig};
use crate::federation::ConnectionFederator;
use crate::repositories::{
    AppointmentRepository, BillingRepository, MongoAppointmentRepository, MongoBillingRepository,
    MongoPatientRepository, MongoStaffRepository, MongoUserRepository, PatientRepository,
    StaffRepository, UserRepository,
};
use crate::services::{
    AccountGuard, AggregationService, AuthService, Authorizer, JwtService, TokenDelivery,
    TokenService,
};

pub const API_PREFIX: &str = "/api/v1";

#[derive(OpenApi)]
#[openapi(
    paths(
        handlers::health::health_check,
        handlers::auth::register,
        handlers::auth::login,
        handlers::auth::refresh_token,
        handlers::auth::logout,
        handlers::auth::forgot_password,
        handlers::auth::reset_password,
        handlers::auth::change_password,
        handlers::auth::verify_email,
        handlers::auth::me,
        handlers::auth::verify_token,
        handlers::dashboard::get_dashboard,
        handlers::appointments::get_appointment,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::MessageResponse,
            dtos::auth::RegisterRequest,
            dtos::auth::LoginRequest,
            dtos::auth::RefreshRequest,
            dtos::auth::LogoutRequest,
            dtos::auth::ForgotPasswordRequest,
            dtos::auth::ResetPasswordRequest,
            dtos::auth::ChangePasswordRequest,
            dtos::auth::VerifyEmailRequest,
            dtos::auth::AuthResponse,
            dtos::auth::TokenStatusResponse,
            dtos::health::HealthResponse,
            dtos::health::HealthStatus,
            dtos::health::StoreStatus,
            services::TokenPair,
            models::SanitizedUser,
            models::DashboardView,
            models::PatientView,
            models::AppointmentView,
            models::AppointmentStatus,
            models::InvoiceView,
            models::DoctorSummary,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Registration, login and sessions"),
        (name = "Password", description = "Password reset and change"),
        (name = "Patients", description = "Patient views aggregated across stores"),
        (name = "Appointments", description = "Appointment lookup"),
        (name = "Observability", description = "Service health and monitoring"),
    )
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .build(),
                ),
            );
        }
    }
}

/// Store access used by the HTTP layer and the services.
#[derive(Clone)]
pub struct Repositories {
    pub users: Arc<dyn UserRepository>,
    pub patients: Arc<dyn PatientRepository>,
    pub appointments: Arc<dyn AppointmentRepository>,
    pub billing: Arc<dyn BillingRepository>,
    pub staff: Arc<dyn StaffRepository>,
}

impl Repositories {
    /// MongoDB-backed repositories sharing one federator.
    pub fn mongo(federator: Arc<ConnectionFederator>) -> Self {
        Self {
            users: Arc::new(MongoUserRepository::new(federator.clone())),
            patients: Arc::new(MongoPatientRepository::new(federator.clone())),
            appointments: Arc::new(MongoAppointmentRepository::new(federator.clone())),
            billing: Arc::new(MongoBillingRepository::new(federator.clone())),
            staff: Arc::new(MongoStaffRepository::new(federator)),
        }
    }
}

#[derive(Clone)]
pub struct AppState {
    pub config: PortalConfig,
    pub federator: Arc<ConnectionFederator>,
    pub repositories: Repositories,
    pub tokens: Arc<TokenService>,
    pub account_guard: Arc<AccountGuard>,
    pub authorizer: Authorizer,
    pub auth_service: Arc<AuthService>,
    pub aggregation: Arc<AggregationService>,
    pub login_rate_limiter: IpRateLimit,
    pub register_rate_limiter: IpRateLimit,
    /// Shared by forgot-password, reset-password and change-password.
    pub password_rate_limiter: IpRateLimit,
}

impl AppState {
    /// Wire every service from configuration, using MongoDB repositories.
    pub fn new(
        config: PortalConfig,
        federator: Arc<ConnectionFederator>,
        delivery: Arc<dyn TokenDelivery>,
    ) -> Result<Self, anyhow::Error> {
        let repositories = Repositories::mongo(federator.clone());
        Self::from_parts(config, federator, repositories, delivery)
    }

    /// Wire every service over the given repositories.
    pub fn from_parts(
        config: PortalConfig,
        federator: Arc<ConnectionFederator>,
        repositories: Repositories,
        delivery: Arc<dyn TokenDelivery>,
    ) -> Result<Self, anyhow::Error> {
        let jwt = JwtService::new(&config.jwt)?;
        let authorizer = Authorizer::new(config.self_service_role);

        let tokens = Arc::new(TokenService::new(
            jwt,
            repositories.users.clone(),
            config.sessions.max_refresh_tokens,
        ));
        let account_guard = Arc::new(AccountGuard::new(
            repositories.users.clone(),
            config.lockout.policy(),
        ));
        let auth_service = Arc::new(AuthService::new(
            repositories.users.clone(),
            repositories.patients.clone(),
            tokens.clone(),
            account_guard.clone(),
            authorizer,
            delivery,
        ));
        let aggregation = Arc::new(AggregationService::new(
            repositories.patients.clone(),
            repositories.appointments.clone(),
            repositories.billing.clone(),
            repositories.staff.clone(),
            config.stores.timeout(),
        ));

        let limits = &config.rate_limit;
        let trust_proxy = config.common.trust_forwarded_for;
        let login_rate_limiter = IpRateLimit::new(
            create_ip_rate_limiter(limits.login_attempts, limits.login_window_seconds),
            trust_proxy,
        );
        let register_rate_limiter = IpRateLimit::new(
            create_ip_rate_limiter(limits.register_attempts, limits.register_window_seconds),
            trust_proxy,
        );
        let password_rate_limiter = IpRateLimit::new(
            create_ip_rate_limiter(
                limits.password_reset_attempts,
                limits.password_reset_window_seconds,
            ),
            trust_proxy,
        );

        Ok(Self {
            config,
            federator,
            repositories,
            tokens,
            account_guard,
            authorizer,
            auth_service,
            aggregation,
            login_rate_limiter,
            register_rate_limiter,
            password_rate_limiter,
        })
    }
}

fn cors_layer(config: &PortalConfig) -> CorsLayer {
    let origins = config
        .security
        .allowed_origins
        .iter()
        .filter_map(|o| match o.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %o, error = %e, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect::<Vec<HeaderValue>>();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::AUTHORIZATION,
            header::CONTENT_TYPE,
            HeaderName::from_static(REQUEST_ID_HEADER),
        ])
        .allow_credentials(true)
}

pub fn build_router(state: AppState) -> Router {
    let login_route = Router::new()
        .route("/auth/login", post(handlers::auth::login))
        .layer(from_fn_with_state(
            state.login_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let register_route = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .layer(from_fn_with_state(
            state.register_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let password_routes = Router::new()
        .route("/auth/forgot-password", post(handlers::auth::forgot_password))
        .route("/auth/reset-password", post(handlers::auth::reset_password))
        .merge(
            Router::new()
                .route("/auth/change-password", post(handlers::auth::change_password))
                .route_layer(from_fn_with_state(
                    state.clone(),
                    middleware::auth_middleware,
                )),
        )
        .layer(from_fn_with_state(
            state.password_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let protected = Router::new()
        .route("/auth/logout", post(handlers::auth::logout))
        .route("/auth/me", get(handlers::auth::me))
        .route("/auth/verify-token", get(handlers::auth::verify_token))
        .route(
            "/patients/:patient_id/dashboard",
            get(handlers::dashboard::get_dashboard),
        )
        .route(
            "/appointments/:appointment_id",
            get(handlers::appointments::get_appointment),
        )
        .route_layer(from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    let api = Router::new()
        .route("/auth/refresh-token", post(handlers::auth::refresh_token))
        .route("/auth/verify-email", post(handlers::auth::verify_email))
        .merge(login_route)
        .merge(register_route)
        .merge(password_routes)
        .merge(protected);

    let mut app = Router::new()
        .route("/health", get(handlers::health::health_check))
        .route("/metrics", get(handlers::metrics::metrics))
        .nest(API_PREFIX, api);

    if state.config.environment == Environment::Dev {
        app = app.merge(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));
    } else {
        app = app.route(
            "/api-docs/openapi.json",
            get(|| async { axum::Json(ApiDoc::openapi()) }),
        );
    }

    let cors = cors_layer(&state.config);

    app.with_state(state)
        .layer(from_fn(metrics_middleware))
        .layer(TraceLayer::new_for_http().make_span_with(
            |request: &axum::http::Request<_>| {
                let request_id = request
                    .headers()
                    .get(REQUEST_ID_HEADER)
                    .and_then(|value| value.to_str().ok())
                    .unwrap_or("-");

                tracing::info_span!(
                    "http_request",
                    request_id = %request_id,
                    method = %request.method(),
                    uri = %request.uri(),
                    version = ?request.version(),
                )
            },
        ))
        .layer(from_fn(request_id_middleware))
        .layer(from_fn(security_headers_middleware))
        .layer(cors)
}
