pub mod config;
pub mod db;
pub mod dtos;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod services;
pub mod utils;

use axum::{
    http::{header, HeaderValue, Method},
    middleware::{from_fn, from_fn_with_state},
    routing::{get, post, put},
    Router,
};
use service_core::middleware::{
    metrics::metrics_middleware,
    rate_limit::{create_ip_rate_limiter, ip_rate_limit_middleware, IpRateLimiter},
    security_headers::security_headers_middleware,
    session::{session_auth_middleware, SessionGuard},
    tracing::{request_id_middleware, REQUEST_ID_HEADER},
};
use service_core::token::TokenService;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::config::{IdentityConfig, SwaggerMode};
use crate::db::CredentialStore;
use crate::services::{
    AdminService, AuthService, NotificationChannels, PasswordResetService, PermissionResolver,
    VerificationEngine,
};
use service_core::error::AppError;
use std::sync::Arc;

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check,
        handlers::metrics::metrics,
        handlers::auth::registration::signup,
        handlers::auth::registration::verify_account,
        handlers::auth::registration::resend_code,
        handlers::auth::session::signin,
        handlers::auth::session::second_factor,
        handlers::auth::session::me,
        handlers::auth::session::change_password,
        handlers::auth::password::request_password_reset,
        handlers::auth::password::change_reset_password,
        handlers::auth::password::request_reset_code,
        handlers::auth::password::verify_reset_code,
        handlers::auth::password::change_password_with_code,
        handlers::role::list_roles,
        handlers::role::create_role,
        handlers::role::get_role,
        handlers::role::update_role,
        handlers::role::delete_role,
        handlers::permission::list_permissions,
        handlers::permission::create_permission,
        handlers::permission::get_permission,
        handlers::permission::update_permission,
        handlers::permission::delete_permission,
        handlers::user::list_users,
        handlers::user::get_user,
        handlers::user::delete_user,
        handlers::user::assign_role,
        handlers::user::update_status,
    ),
    components(
        schemas(
            dtos::ErrorResponse,
            dtos::MessageResponse,
            dtos::auth::SignupRequest,
            dtos::auth::SignupResponse,
            dtos::auth::CodeRequest,
            dtos::auth::ResendCodeRequest,
            dtos::auth::SigninRequest,
            dtos::auth::SessionResponse,
            dtos::auth::EmailRequest,
            dtos::auth::ChangeResetPasswordRequest,
            dtos::auth::ChangePasswordWithCodeRequest,
            dtos::auth::ChangePasswordRequest,
            dtos::auth::MeResponse,
            dtos::admin::PermissionResponse,
            dtos::admin::RoleResponse,
            dtos::admin::UserResponse,
            dtos::admin::CreateRoleRequest,
            dtos::admin::UpdateRoleRequest,
            dtos::admin::CreatePermissionRequest,
            dtos::admin::UpdatePermissionRequest,
            dtos::admin::AssignRoleRequest,
            dtos::admin::UpdateStatusRequest,
            models::IdentityStatus,
        )
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Authentication", description = "Sign-up, verification and two-factor sign-in"),
        (name = "Session", description = "Operations for a signed-in identity"),
        (name = "Password Reset", description = "Link and code based password reset"),
        (name = "Roles", description = "Role administration"),
        (name = "Permissions", description = "Permission administration"),
        (name = "Users", description = "User administration"),
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

#[derive(Clone)]
pub struct AppState {
    pub config: IdentityConfig,
    pub store: Arc<dyn CredentialStore>,
    pub tokens: TokenService,
    pub resolver: PermissionResolver,
    pub auth_service: AuthService,
    pub password_reset_service: PasswordResetService,
    pub admin_service: AdminService,
    pub signin_rate_limiter: IpRateLimiter,
    pub signup_rate_limiter: IpRateLimiter,
    pub password_reset_rate_limiter: IpRateLimiter,
    pub ip_rate_limiter: IpRateLimiter,
}

impl AppState {
    /// Wire every service around one store and one set of channels.
    pub fn new(
        config: IdentityConfig,
        store: Arc<dyn CredentialStore>,
        channels: NotificationChannels,
    ) -> Result<Self, AppError> {
        let tokens = TokenService::new(&config.tokens)?;
        let resolver = PermissionResolver::new(store.clone());

        let engine = VerificationEngine::new(
            store.clone(),
            channels.clone(),
            config.verification_code_expiry_minutes,
        );
        let auth_service = AuthService::new(
            store.clone(),
            engine,
            tokens.clone(),
            resolver.clone(),
            config.roles.default_role.clone(),
        );
        let password_reset_service = PasswordResetService::new(
            store.clone(),
            tokens.clone(),
            channels,
            config.frontend_url.clone(),
            config.verification_code_expiry_minutes,
        );
        let admin_service = AdminService::new(store.clone());

        let limits = &config.rate_limit;
        let signin_rate_limiter =
            create_ip_rate_limiter(limits.signin_attempts, limits.signin_window_seconds);
        let signup_rate_limiter =
            create_ip_rate_limiter(limits.signup_attempts, limits.signup_window_seconds);
        let password_reset_rate_limiter = create_ip_rate_limiter(
            limits.password_reset_attempts,
            limits.password_reset_window_seconds,
        );
        let ip_rate_limiter =
            create_ip_rate_limiter(limits.global_ip_limit, limits.global_ip_window_seconds);

        Ok(Self {
            config,
            store,
            tokens,
            resolver,
            auth_service,
            password_reset_service,
            admin_service,
            signin_rate_limiter,
            signup_rate_limiter,
            password_reset_rate_limiter,
            ip_rate_limiter,
        })
    }
}

pub async fn build_router(state: AppState) -> Result<Router, AppError> {
    let session_guard = SessionGuard::new(state.tokens.clone(), Vec::new());

    // Session plus a live permission check against the matched route template
    let admin_routes = Router::new()
        .route(
            "/roles",
            get(handlers::role::list_roles).post(handlers::role::create_role),
        )
        .route(
            "/roles/:id",
            get(handlers::role::get_role)
                .put(handlers::role::update_role)
                .delete(handlers::role::delete_role),
        )
        .route(
            "/permissions",
            get(handlers::permission::list_permissions)
                .post(handlers::permission::create_permission),
        )
        .route(
            "/permissions/:id",
            get(handlers::permission::get_permission)
                .put(handlers::permission::update_permission)
                .delete(handlers::permission::delete_permission),
        )
        .route("/users", get(handlers::user::list_users))
        .route(
            "/users/:id",
            get(handlers::user::get_user).delete(handlers::user::delete_user),
        )
        .route("/users/:id/role", put(handlers::user::assign_role))
        .route("/users/:id/status", put(handlers::user::update_status))
        .route_layer(from_fn_with_state(
            state.resolver.clone(),
            middleware::rbac_middleware,
        ))
        .layer(from_fn_with_state(
            session_guard.clone(),
            session_auth_middleware,
        ));

    // Session only
    let session_routes = Router::new()
        .route("/auth/me", get(handlers::auth::me))
        .route(
            "/auth/change-password",
            post(handlers::auth::change_password),
        )
        .layer(from_fn_with_state(session_guard, session_auth_middleware));

    let signin_route = Router::new()
        .route("/auth/signin", post(handlers::auth::signin))
        .layer(from_fn_with_state(
            state.signin_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let signup_route = Router::new()
        .route("/auth/signup", post(handlers::auth::signup))
        .layer(from_fn_with_state(
            state.signup_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let reset_request_routes = Router::new()
        .route(
            "/auth/password-reset/request",
            post(handlers::auth::request_password_reset),
        )
        .route(
            "/auth/password-reset/code",
            post(handlers::auth::request_reset_code),
        )
        .layer(from_fn_with_state(
            state.password_reset_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ));

    let mut app = Router::new()
        .route("/health", get(health_check))
        .route("/metrics", get(handlers::metrics::metrics));

    if state.config.swagger.enabled == SwaggerMode::Public {
        app =
            app.merge(SwaggerUi::new("/docs").url("/.well-known/openapi.json", ApiDoc::openapi()));
    } else {
        app = app.route(
            "/.well-known/openapi.json",
            get(|| async { axum::Json(ApiDoc::openapi()) }),
        );
    }

    let allowed_origins: Vec<HeaderValue> = state
        .config
        .security
        .allowed_origins
        .iter()
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::error!(origin = %origin, error = %e, "Skipping invalid CORS origin");
                None
            }
        })
        .collect();

    let app = app
        .route("/auth/verify", post(handlers::auth::verify_account))
        .route("/auth/resend-code", post(handlers::auth::resend_code))
        .route("/auth/second-factor", post(handlers::auth::second_factor))
        .route(
            "/auth/password-reset/change",
            post(handlers::auth::change_reset_password),
        )
        .route(
            "/auth/password-reset/verify-code",
            post(handlers::auth::verify_reset_code),
        )
        .route(
            "/auth/password-reset/change-with-code",
            post(handlers::auth::change_password_with_code),
        )
        .merge(signin_route)
        .merge(signup_route)
        .merge(reset_request_routes)
        .merge(session_routes)
        .merge(admin_routes)
        .with_state(state.clone())
        .layer(from_fn_with_state(
            state.ip_rate_limiter.clone(),
            ip_rate_limit_middleware,
        ))
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
        .layer(
            CorsLayer::new()
                .allow_origin(allowed_origins)
                .allow_methods([
                    Method::GET,
                    Method::POST,
                    Method::PUT,
                    Method::DELETE,
                    Method::OPTIONS,
                ])
                .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE]),
        );

    Ok(app)
}

/// Service health check
#[utoipa::path(
    get,
    path = "/health",
    responses(
        (status = 200, description = "Service is healthy"),
        (status = 500, description = "Credential store is unreachable")
    ),
    tag = "Observability"
)]
pub async fn health_check(
    axum::extract::State(state): axum::extract::State<AppState>,
) -> Result<axum::Json<serde_json::Value>, AppError> {
    state.store.health_check().await.map_err(|e| {
        tracing::error!(error = %e, "Credential store health check failed");
        AppError::from(e)
    })?;

    Ok(axum::Json(serde_json::json!({
        "status": "ok",
        "service": state.config.service_name,
        "version": state.config.service_version,
    })))
}
