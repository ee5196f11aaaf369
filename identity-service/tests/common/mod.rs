//! Test helpers for identity-service integration tests.
//!
//! Drives the full router in-process with `tower::ServiceExt::oneshot`,
//! backed by the in-memory credential store and recording channels.

#![allow(dead_code)]

use axum::{
    body::Body,
    extract::ConnectInfo,
    http::{header, HeaderMap, Method, Request, StatusCode},
    Router,
};
use identity_service::{
    build_router,
    config::{
        Environment, IdentityConfig, MongoConfig, RateLimitConfig, RoleConfig, SecurityConfig,
        SmsConfig, SmtpConfig, SwaggerConfig, SwaggerMode,
    },
    db::{CredentialStore, InMemoryCredentialStore},
    models::IdentityStatus,
    services::{bootstrap, MockChannel, NotificationChannels, RoutePermissionTable},
    AppState,
};
use secrecy::SecretString;
use serde_json::{json, Value};
use service_core::token::TokenConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tower::util::ServiceExt;

pub const PASSWORD: &str = "Abcdef1!";
pub const TEST_SECRET: &str = "integration-test-secret-0123456789abcdef";

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub store: Arc<InMemoryCredentialStore>,
    pub email: Arc<MockChannel>,
    pub sms: Arc<MockChannel>,
    pub admin_role_id: String,
    pub default_role_id: String,
}

pub fn test_config() -> IdentityConfig {
    IdentityConfig {
        common: service_core::config::Config::default(),
        environment: Environment::Dev,
        service_name: "identity-service-test".to_string(),
        service_version: "test".to_string(),
        log_level: "debug".to_string(),
        otlp_endpoint: None,
        mongodb: MongoConfig {
            uri: "mongodb://unused".to_string(),
            database: "unused".to_string(),
        },
        tokens: TokenConfig::new(TEST_SECRET),
        verification_code_expiry_minutes: 15,
        smtp: SmtpConfig {
            host: "localhost".to_string(),
            port: 2525,
            user: String::new(),
            password: SecretString::new(String::new()),
            from: "no-reply@test.com".to_string(),
        },
        sms: SmsConfig {
            api_url: "http://localhost:9/sms".to_string(),
            auth_key: SecretString::new(String::new()),
            sender_id: "TEST".to_string(),
            enabled: true,
        },
        frontend_url: "https://app.test/".to_string(),
        roles: RoleConfig {
            default_role: "CUSTOMER".to_string(),
            admin_role: "ADMIN".to_string(),
            bootstrap_admin_email: None,
        },
        route_permissions_path: None,
        security: SecurityConfig {
            allowed_origins: vec!["http://localhost:3000".to_string()],
        },
        swagger: SwaggerConfig {
            enabled: SwaggerMode::Public,
        },
        rate_limit: RateLimitConfig {
            signin_attempts: 1000,
            signin_window_seconds: 60,
            signup_attempts: 1000,
            signup_window_seconds: 60,
            password_reset_attempts: 1000,
            password_reset_window_seconds: 60,
            global_ip_limit: 10_000,
            global_ip_window_seconds: 60,
        },
    }
}

impl TestApp {
    pub async fn spawn() -> Self {
        Self::spawn_with(test_config()).await
    }

    pub async fn spawn_with(config: IdentityConfig) -> Self {
        let store = Arc::new(InMemoryCredentialStore::new());
        let dyn_store: Arc<dyn CredentialStore> = store.clone();

        let table = RoutePermissionTable::embedded().expect("embedded route table");
        let report = bootstrap(&dyn_store, &table, &config.roles)
            .await
            .expect("bootstrap");

        let email = Arc::new(MockChannel::new());
        let sms = Arc::new(MockChannel::new());
        let channels = NotificationChannels::new(email.clone(), sms.clone());

        let state = AppState::new(config, dyn_store, channels).expect("app state");
        let router = build_router(state.clone()).await.expect("router");

        Self {
            router,
            state,
            store,
            email,
            sms,
            admin_role_id: report.admin_role_id,
            default_role_id: report.default_role_id,
        }
    }

    pub async fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, Value) {
        let (status, _, body) = self.request_raw(method, uri, body, token).await;
        (status, body)
    }

    /// Like [`request`](Self::request) but also hands back the headers.
    /// Non-JSON bodies come back as a JSON string.
    pub async fn request_raw(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
        token: Option<&str>,
    ) -> (StatusCode, HeaderMap, Value) {
        let mut builder = Request::builder()
            .method(method)
            .uri(uri)
            .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));

        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }

        let request = match body {
            Some(body) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = serde_json::from_slice(&bytes)
            .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()));

        (status, headers, value)
    }

    pub async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.request(Method::POST, uri, Some(body), None).await
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> (StatusCode, Value) {
        self.request(Method::GET, uri, None, token).await
    }

    pub fn last_email_payload(&self, email: &str) -> String {
        self.email
            .last_payload_to(email)
            .unwrap_or_else(|| panic!("no email sent to {}", email))
    }

    pub fn last_sms_payload(&self, phone: &str) -> String {
        self.sms
            .last_payload_to(phone)
            .unwrap_or_else(|| panic!("no sms sent to {}", phone))
    }

    /// Sign up and return the new identity id. The account stays pending.
    pub async fn signup(&self, email: &str, phone: &str) -> String {
        let (status, body) = self
            .post(
                "/auth/signup",
                json!({
                    "fullname": "Test User",
                    "email": email,
                    "current_password": PASSWORD,
                    "number": phone,
                    "ciudadId": "city-1",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "signup failed: {}", body);
        body["userId"].as_str().unwrap().to_string()
    }

    /// Sign up and verify, returning the identity id.
    pub async fn register_active(&self, email: &str, phone: &str) -> String {
        let id = self.signup(email, phone).await;
        let code = self.last_email_payload(email);
        let (status, body) = self
            .post("/auth/verify", json!({ "email": email, "code": code }))
            .await;
        assert_eq!(status, StatusCode::OK, "verify failed: {}", body);
        id
    }

    /// Both sign-in steps over email; returns the second-factor body.
    pub async fn sign_in(&self, email: &str, password: &str) -> Value {
        let (status, body) = self
            .post(
                "/auth/signin",
                json!({
                    "email": email,
                    "current_password": password,
                    "methodContact": "email",
                }),
            )
            .await;
        assert_eq!(status, StatusCode::OK, "signin failed: {}", body);

        let code = self.last_email_payload(email);
        let (status, body) = self
            .post("/auth/second-factor", json!({ "email": email, "code": code }))
            .await;
        assert_eq!(status, StatusCode::OK, "second factor failed: {}", body);
        body
    }

    /// A fresh active identity with the default role and its session token.
    pub async fn token_for(&self, email: &str, phone: &str) -> (String, String) {
        let id = self.register_active(email, phone).await;
        let body = self.sign_in(email, PASSWORD).await;
        (id, body["token"].as_str().unwrap().to_string())
    }

    pub async fn admin_token(&self) -> (String, String) {
        let id = self.register_active("admin@test.com", "3000000001").await;
        self.store
            .set_identity_role(&id, &self.admin_role_id)
            .await
            .unwrap();
        let body = self.sign_in("admin@test.com", PASSWORD).await;
        (id, body["token"].as_str().unwrap().to_string())
    }

    pub async fn status_of(&self, id: &str) -> IdentityStatus {
        self.store
            .find_identity_by_id(id)
            .await
            .unwrap()
            .unwrap()
            .status
    }
}
