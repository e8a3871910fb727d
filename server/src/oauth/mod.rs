pub mod linker;
pub mod providers;
pub mod state;

pub use linker::LinkOrchestrator;
pub use providers::{PlatformIdentity, Provider};
pub use state::{Mode, StateBlob};
