pub mod checksum;

pub use checksum::{calculate_checksum, preference_key, verify_checksum};
