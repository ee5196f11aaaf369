//! Services layer for the identity service.
//!
//! Sign-up, two-factor sign-in, password reset, permission resolution and
//! administration, all written against the [`CredentialStore`](crate::db::CredentialStore)
//! trait and injected notification channels.

pub mod admin;
pub mod auth;
pub mod bootstrap;
pub mod error;
pub mod metrics;
pub mod notification;
pub mod password_reset;
pub mod rbac;
pub mod route_permissions;
pub mod verification;

pub use admin::AdminService;
pub use auth::AuthService;
pub use bootstrap::{bootstrap, BootstrapReport};
pub use error::ServiceError;
pub use notification::{
    ChannelError, ContactMethod, EmailChannel, MessageTemplate, MockChannel, NotificationChannel,
    NotificationChannels, OutboundMessage, SmsChannel,
};
pub use password_reset::PasswordResetService;
pub use rbac::PermissionResolver;
pub use route_permissions::{RoutePermission, RoutePermissionTable};
pub use verification::{CodeError, VerificationEngine};
