pub mod credentials;
pub mod permissions;

pub use credentials::CredentialEngine;
pub use permissions::{PermissionCatalog, Role};
