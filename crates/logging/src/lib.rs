#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

//! # Overview
//!
//! `logging` installs the one `tracing` subscriber the rest of the
//! workspace logs against. It owns no logging policy of its own beyond
//! "respect `RUST_LOG`, default to `info`" -- the engine and its
//! collaborators decide what to log and at what level; this crate only
//! wires up where it goes.
//!
//! # Design
//!
//! [`init`] is idempotent: calling it more than once (for example, once
//! from a binary and once from an integration test harness) does not
//! panic, it simply keeps the first-installed subscriber.

use std::sync::Once;

static INIT: Once = Once::new();

/// Installs a `tracing_subscriber::fmt` subscriber driven by the
/// `RUST_LOG` environment variable (default filter: `info`). Safe to call
/// more than once; only the first call takes effect.
pub fn init() {
    INIT.call_once(|| {
        let filter = tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .try_init()
            .ok();
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_is_idempotent() {
        init();
        init();
    }
}
