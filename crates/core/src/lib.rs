pub mod config;
pub mod error;
pub mod types;

pub use config::{AppConfig, Applicant};
pub use error::ConfigError;
pub use types::*;
