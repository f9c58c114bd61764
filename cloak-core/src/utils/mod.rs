pub mod helpers;
pub mod validation;

pub use helpers::{now_timestamp, parse_timestamp};
pub use validation::{normalize_username, validate_username};
