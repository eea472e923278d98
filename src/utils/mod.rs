//! Shared engine utilities.

pub mod error;

pub use error::{AppError, AppResult};
