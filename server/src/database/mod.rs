pub mod accounts;
pub mod create;
pub mod links;
pub mod sessions;
pub mod utils;

pub use accounts::*;
pub use create::*;
pub use links::*;
pub use utils::*;
