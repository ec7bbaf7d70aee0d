pub mod config;
pub mod error;
pub mod types;

pub use config::SimplificatorConfig;
pub use error::{Result, SimplificatorError};
pub use types::ScoreBand;
