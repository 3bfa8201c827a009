use std::{
    fmt::{self, Debug, Display},
    sync::Arc,
};

/// Type-erased failure carried by rejected promises.
///
/// Cheap to clone, so every continuation of a rejected promise
/// observes the same reason.
#[derive(Clone)]
#[repr(transparent)]
pub struct Error(Arc<dyn std::error::Error + Send + Sync>);

impl Error {
    pub fn new<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Error(Arc::new(error))
    }

    /// Returns reference to the wrapped error if it is of type `E`.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.0.downcast_ref()
    }

    /// Returns `true` if both values share the same underlying error.
    pub fn ptr_eq(&self, other: &Error) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Debug::fmt(&*self.0, f)
    }
}

impl Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        Display::fmt(&*self.0, f)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        std::error::Error::source(&*self.0)
    }
}

impl From<LoadError> for Error {
    fn from(error: LoadError) -> Self {
        Error::new(error)
    }
}

/// Failures produced by the loader itself.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    #[error("Rejected without a reason")]
    Unspecified,

    #[error("Descriptor has neither a name nor any source")]
    InvalidDescriptor,

    #[error("Resource `{location}` not found")]
    NotFound { location: Box<str> },

    #[error("Verification failed for `{location}`")]
    Verification { location: Box<str> },

    #[error("All {attempts} source(s) of `{name}` failed")]
    Exhausted {
        name: Box<str>,
        attempts: usize,
        #[source]
        last: Option<Error>,
    },

    #[error("Failed to read `{location}`")]
    Io {
        location: Box<str>,
        #[source]
        source: std::io::Error,
    },

    #[error("Job queue disconnected")]
    Disconnected,
}
