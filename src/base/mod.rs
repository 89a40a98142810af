//! This module contains base types that are used across Tempo.
//!
//! - [`TempoError`]: The crate wide error type, together with the [`DecodeError`] that is raised
//!   by the binary decoders.
//! - [`Comparer`]: Custom key comparison, allowing for key suffixes that encode custom data.
//!   Tempo uses the suffix for [`Timestamp`]s, to order versions of the same key.
//! - [`PrettyBytes`]: Debug formatting for binary keys.
//!
//! [`Timestamp`]: crate::ctrl::hlc::Timestamp

use bincode::Options as BincodeOptions;

pub mod comparer;
pub mod error;
pub mod utils;

pub use comparer::*;
pub use error::*;
pub use utils::*;

/// The crate wide used [`bincode`] encoding options.
#[doc(hidden)]
pub fn bincode_options() -> impl BincodeOptions {
    bincode::options()
        .with_fixint_encoding() // Important: no variable length ints
        .with_little_endian() // Ensure consistency across platforms
        .reject_trailing_bytes()
}
