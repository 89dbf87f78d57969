//! Error context helpers, glob matching and gateway-scoped event plumbing
//! shared by the parley crates.

pub mod error;
pub mod events;
pub mod glob;

pub use error::FromMessage;
