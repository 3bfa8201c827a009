//! Resource loading facility.
//!
//! [`Loader`] accepts batches of [`Descriptor`]s,
//! deduplicates them through the [`Registry`] and loads every
//! record from its first working location using a [`Source`].

mod asset;
mod key;
mod loader;
mod registry;
mod sequence;
mod source;

pub use self::{
    asset::{AssetId, AssetState, AssetStatus},
    key::{label_of, Descriptor},
    loader::{AssetHandle, Loader, LoaderBuilder, Strategy},
    registry::Registry,
    source::{Environment, FetchMode, OrderedHost, Source, Verify},
};

cfg_if::cfg_if! {
    if #[cfg(feature = "fs")] {
        mod fs;
        pub use self::fs::FsSource;
    }
}
