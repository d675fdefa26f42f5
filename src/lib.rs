pub mod browser;
pub mod core;
pub mod manifest;
pub mod notify;

// --- Primary exports ---
pub use crate::core::config;
pub use crate::core::types;
pub use crate::core::types::{PaxCount, RunError, RunSummary};
pub use crate::manifest::ManifestDriver;
pub use crate::notify::Mailer;
