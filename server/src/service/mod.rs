pub mod sessions;
pub mod users;

pub use sessions::SessionService;
pub use users::UserService;
