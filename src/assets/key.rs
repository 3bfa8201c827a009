use {
    super::source::Verify,
    crate::error::LoadError,
    std::{fmt, sync::Arc},
};

/// Caller-side description of a resource to load.
///
/// Either a bare list of locations, named after the last path segment
/// of the first one, or an explicitly named list.
#[derive(Clone)]
pub struct Descriptor {
    name: Option<Box<str>>,
    sources: Vec<Box<str>>,
    verify: Option<Verify>,
}

impl fmt::Debug for Descriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Descriptor")
            .field("name", &self.name)
            .field("sources", &self.sources)
            .field("verify", &self.verify.is_some())
            .finish()
    }
}

impl Descriptor {
    /// Unnamed descriptor with single location.
    pub fn new(location: impl Into<Box<str>>) -> Self {
        Descriptor::sources(Some(location))
    }

    /// Unnamed descriptor with fallback locations, tried in order.
    pub fn sources<I, S>(sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Box<str>>,
    {
        Descriptor {
            name: None,
            sources: collect_sources(sources),
            verify: None,
        }
    }

    /// Named descriptor with fallback locations, tried in order.
    pub fn named<I, S>(name: impl Into<Box<str>>, sources: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<Box<str>>,
    {
        Descriptor {
            name: Some(name.into()),
            sources: collect_sources(sources),
            verify: None,
        }
    }

    /// Attaches predicate confirming that load actually succeeded.
    /// Only consulted by hosts that cannot report load failures.
    pub fn with_verify<F>(mut self, verify: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        self.verify = Some(Arc::new(verify));
        self
    }

    /// Returns name the resource is registered under.
    pub fn name(&self) -> Option<&str> {
        match &self.name {
            Some(name) => Some(name),
            None => self.sources.first().map(|source| label_of(source)),
        }
    }

    pub fn locations(&self) -> &[Box<str>] {
        &self.sources
    }

    pub(crate) fn into_parts(self) -> Result<(Box<str>, Vec<Box<str>>, Option<Verify>), LoadError> {
        let name: Box<str> = match self.name {
            Some(name) => name,
            None => match self.sources.first() {
                Some(first) => label_of(first).into(),
                None => return Err(LoadError::InvalidDescriptor),
            },
        };
        Ok((name, self.sources, self.verify))
    }
}

fn collect_sources<I, S>(sources: I) -> Vec<Box<str>>
where
    I: IntoIterator<Item = S>,
    S: Into<Box<str>>,
{
    sources
        .into_iter()
        .map(Into::into)
        .filter(|source: &Box<str>| !source.is_empty())
        .collect()
}

impl From<&str> for Descriptor {
    fn from(location: &str) -> Self {
        Descriptor::new(location)
    }
}

impl From<String> for Descriptor {
    fn from(location: String) -> Self {
        Descriptor::new(location)
    }
}

impl From<Vec<&str>> for Descriptor {
    fn from(sources: Vec<&str>) -> Self {
        Descriptor::sources(sources)
    }
}

impl From<(&str, &str)> for Descriptor {
    fn from((name, location): (&str, &str)) -> Self {
        Descriptor::named(name, Some(location))
    }
}

impl From<(&str, Vec<&str>)> for Descriptor {
    fn from((name, sources): (&str, Vec<&str>)) -> Self {
        Descriptor::named(name, sources)
    }
}

/// Derives resource name from location:
/// last path segment with query string cut off.
pub fn label_of(location: &str) -> &str {
    let segment = match location.rfind('/') {
        Some(slash) => &location[slash + 1..],
        None => location,
    };
    match segment.find('?') {
        Some(query) => &segment[..query],
        None => segment,
    }
}
