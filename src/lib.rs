//! # Tempo
//!
//! Hybrid logical clock timestamps and contention tracking for a distributed transactional
//! store.
//!
//! - [`ctrl::hlc`]: The [`Timestamp`] value type with its wire and sortable encodings, a
//!   thread-safe hybrid logical [`Clock`] and [`UncertaintyInterval`]s for reads.
//! - [`ctrl::contention`]: The [`ContentionRegistry`], which aggregates contention events into a
//!   bounded summary of the most contended indexes and keys.
//! - [`core`]: Key layouts and binary encoding helpers.
//! - [`base`]: Errors, key comparison and formatting helpers.
//!
//! [`Timestamp`]: ctrl::hlc::Timestamp
//! [`Clock`]: ctrl::hlc::Clock
//! [`UncertaintyInterval`]: ctrl::hlc::UncertaintyInterval
//! [`ContentionRegistry`]: ctrl::contention::ContentionRegistry

#[macro_use]
extern crate derive_more;
#[macro_use]
extern crate tracing;

pub mod base;
pub mod core;
pub mod ctrl;
pub mod prelude;

#[cfg(test)]
pub(crate) mod tests {
    use tracing_subscriber::EnvFilter;

    /// Installs a test subscriber, honoring `RUST_LOG`. Safe to call from every test.
    pub(crate) fn setup_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }
}
