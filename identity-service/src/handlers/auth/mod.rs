pub mod password;
pub mod registration;
pub mod session;

pub use password::{
    change_password_with_code, change_reset_password, request_password_reset,
    request_reset_code, verify_reset_code,
};
pub use registration::{resend_code, signup, verify_account};
pub use session::{change_password, me, second_factor, signin};
