//!
//! Headload loads named resources from ordered lists of fallback locations.
//!
//! # Getting started
//!
//! Create an [`Executor`](task::Executor), build a [`Loader`](assets::Loader)
//! with a [`Source`](assets::Source) able to fetch locations,
//! then submit batches and drive the executor until they settle.
//!
//! Each physical resource is fetched at most once, however many names
//! or batches refer to it. Batches either load everything at once or,
//! when the host cannot keep order of concurrent loads,
//! one record after another in declaration order.
//!

pub mod assets;
pub mod config;
pub mod error;
pub mod promise;
pub mod task;

pub mod prelude;

/// Installs default eyre handler.
pub fn install_eyre_handler() {
    if let Err(err) = color_eyre::install() {
        panic!("Failed to install eyre report handler: {}", err);
    }
}

/// Installs default tracing subscriber.
pub fn install_tracing_subscriber() {
    use tracing_subscriber::layer::SubscriberExt as _;
    if let Err(err) = tracing::subscriber::set_global_default(
        tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .finish()
            .with(tracing_error::ErrorLayer::default()),
    ) {
        panic!("Failed to install tracing subscriber: {}", err);
    }
}
