pub mod account;
pub mod json_error;
pub mod server_config;
pub mod session;

pub use self::account::{Account, LinkedAccount, Platform};
pub use self::json_error::ErrorResponse;
pub use self::session::{Scope, Session};
