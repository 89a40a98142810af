pub mod contention;
pub mod hlc;
