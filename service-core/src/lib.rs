//! service-core: Shared infrastructure for the back-office services.
//!
//! Everything a gateway or downstream service needs to sit behind the
//! identity trust boundary lives here: the error type, base configuration,
//! telemetry bootstrap, HTTP middleware and the session token codec.
pub mod config;
pub mod error;
pub mod middleware;
pub mod observability;
pub mod token;

pub use axum;
pub use mongodb;
pub use serde;
pub use serde_json;
pub use tokio;
pub use tower;
pub use tower_http;
pub use tracing;
pub use validator;
