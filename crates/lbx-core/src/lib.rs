pub mod config;
pub mod error;
pub mod fs;

pub use error::{LockboxError, LockboxResult};
