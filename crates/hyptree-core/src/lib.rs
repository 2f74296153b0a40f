//! hyptree-core - shared domain types, error taxonomy, progress-event protocol

pub mod error;
pub mod progress;
pub mod types;

pub use error::{Error, Result};
pub use progress::*;
pub use types::*;
