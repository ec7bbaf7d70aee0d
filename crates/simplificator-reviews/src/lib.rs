pub mod db;
pub mod error;
pub mod manager;
pub mod types;

pub use error::ReviewStoreError;
pub use manager::ReviewStore;
pub use types::{NewReview, Review, ReviewStats, Trend};
