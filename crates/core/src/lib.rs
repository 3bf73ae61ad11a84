pub mod config;
pub mod error;
pub mod types;

pub use config::{Config, load_config};
pub use error::{Error, Result};
pub use types::*;
