pub mod error;
pub mod format;
pub mod logger;
pub mod progress;
pub mod validation;
