pub mod aggregate;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod fetch;
pub mod indicators;
pub mod output;
pub mod universe;

pub use error::{AppError, Result};
