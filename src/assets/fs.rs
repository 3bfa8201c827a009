use {
    super::source::{FetchMode, Source, Verify},
    crate::{error::LoadError, promise::Promise, task::Spawner},
    std::{
        io::ErrorKind,
        path::{Path, PathBuf},
    },
};

/// Loads resources from file-system.
///
/// File-system reports missing files natively,
/// so verify predicates are never consulted.
#[derive(Debug)]
pub struct FsSource {
    root: Option<PathBuf>,
}

impl Default for FsSource {
    fn default() -> Self {
        FsSource::new()
    }
}

impl FsSource {
    /// Returns new [`FsSource`] instance with not root provided.
    /// Root-less [`FsSource`] will interpret location as a path.
    pub const fn new() -> Self {
        FsSource { root: None }
    }

    /// Returns new [`FsSource`] instance with root provided.
    /// Rooted [`FsSource`] will interpret location as a path relative to root.
    pub const fn with_root(root: PathBuf) -> Self {
        FsSource { root: Some(root) }
    }

    fn path(&self, location: &str) -> PathBuf {
        match &self.root {
            Some(root) => root.join(location),
            None => PathBuf::from(location),
        }
    }
}

impl Source for FsSource {
    #[tracing::instrument(skip(self, spawner, _verify))]
    fn fetch(
        &self,
        spawner: &Spawner,
        location: &str,
        _verify: Option<&Verify>,
        mode: FetchMode,
    ) -> Promise<()> {
        let path = self.path(location);
        let result = match mode {
            FetchMode::Execute => read(&path, location),
            FetchMode::Cache => probe(&path, location),
        };
        Promise::from_result(spawner, result.map_err(Into::into))
    }
}

fn read(path: &Path, location: &str) -> Result<(), LoadError> {
    match std::fs::read(path) {
        Ok(bytes) => {
            tracing::trace!("Read {} bytes from {}", bytes.len(), path.display());
            Ok(())
        }
        Err(err) => Err(io_error(err, location)),
    }
}

fn probe(path: &Path, location: &str) -> Result<(), LoadError> {
    match std::fs::metadata(path) {
        Ok(metadata) if metadata.is_file() => Ok(()),
        Ok(_) => Err(LoadError::NotFound {
            location: location.into(),
        }),
        Err(err) => Err(io_error(err, location)),
    }
}

fn io_error(err: std::io::Error, location: &str) -> LoadError {
    match err.kind() {
        ErrorKind::NotFound => LoadError::NotFound {
            location: location.into(),
        },
        _ => LoadError::Io {
            location: location.into(),
            source: err,
        },
    }
}
