pub use crate::{
    assets::{AssetHandle, Descriptor, Environment, FetchMode, Loader, Source, Strategy},
    config::LoaderConfig,
    error::{Error, LoadError},
    promise::{Deferred, Next, Observable, Promise},
    task::{Executor, Spawner},
};

#[cfg(feature = "fs")]
pub use crate::assets::FsSource;
