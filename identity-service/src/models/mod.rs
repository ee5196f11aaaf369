pub mod identity;
pub mod permission;
pub mod role;

pub use identity::{CodePurpose, Identity, IdentityStatus, OneTimeCode, ResetCode, ResetStatus};
pub use permission::{HttpMethod, Permission};
pub use role::Role;
