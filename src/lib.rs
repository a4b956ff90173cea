//! Skyline layout: places variable-size tiles into a fixed-width column.
//!
//! The packer lives in [`skyline`]; [`layout`] drives it over a list of tiles.
//! [`api`] exposes the layout pass over HTTP.
//!
//! The packer modules (`skyline`, `layout`) carry German documentation;
//! the service modules around them are documented in English.

pub mod api;
pub mod config;
pub mod layout;
pub mod model;
pub mod skyline;
pub mod types;

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Initialize tracing for packer diagnostics.
///
/// Safe to call multiple times.
/// Enable with `RUST_LOG=skyline_layout=debug` or `RUST_LOG=skyline_layout=trace`.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{EnvFilter, fmt, prelude::*};

        // Only initialize if RUST_LOG is set
        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .init();
        }
    });
}
