pub mod commands;
pub mod prompt;

pub use commands::run;
