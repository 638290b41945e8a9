use crate::error::{MatcherError, Result};
use std::collections::BTreeMap;
use std::fmt;
use votematch_projection::{DataProjector, ManhattanProjector};

pub type ProjectorFactory = Box<dyn Fn() -> Box<dyn DataProjector> + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MethodProperties {
    /// Project over every answerable question, not only the answered ones.
    pub use_all: bool,
    /// The first axis is a summed distance to the voter; it is divided by
    /// the question count and inverted into a score.
    pub distance_axis: bool,
}

struct RegisteredMethod {
    properties: MethodProperties,
    factory: ProjectorFactory,
}

/// Projection methods by name.
pub struct ProjectorRegistry {
    methods: BTreeMap<String, RegisteredMethod>,
}

impl ProjectorRegistry {
    #[must_use]
    pub fn empty() -> Self {
        Self {
            methods: BTreeMap::new(),
        }
    }

    pub fn register(
        &mut self,
        name: impl Into<String>,
        properties: MethodProperties,
        factory: ProjectorFactory,
    ) {
        self.methods.insert(
            name.into(),
            RegisteredMethod {
                properties,
                factory,
            },
        );
    }

    pub fn properties(&self, name: &str) -> Result<MethodProperties> {
        self.lookup(name).map(|method| method.properties)
    }

    pub fn create(&self, name: &str) -> Result<Box<dyn DataProjector>> {
        self.lookup(name).map(|method| (method.factory)())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.methods.keys().map(String::as_str)
    }

    fn lookup(&self, name: &str) -> Result<&RegisteredMethod> {
        self.methods.get(name).ok_or_else(|| {
            MatcherError::UnsupportedConfiguration(format!("projection method '{name}'"))
        })
    }
}

impl Default for ProjectorRegistry {
    /// Only `Manhattan` is registered.
    fn default() -> Self {
        let mut registry = Self::empty();
        registry.register(
            "Manhattan",
            MethodProperties {
                use_all: false,
                distance_axis: true,
            },
            Box::new(|| -> Box<dyn DataProjector> { Box::new(ManhattanProjector::new()) }),
        );
        registry
    }
}

impl fmt::Debug for ProjectorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.methods.keys()).finish()
    }
}
