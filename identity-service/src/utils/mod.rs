pub mod normalize;
pub mod password;
pub mod validation;

pub use normalize::{normalize_email, normalize_phone};
pub use password::{
    check_password_policy, hash_password, verify_password, Password, PasswordHashString,
};
pub use validation::ValidatedJson;
