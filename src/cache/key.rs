//! Resource keys identifying shared fixtures.

use crate::error::HarnessError;
use std::fmt;
use std::str::FromStr;

/// Identifier of a shared fixture.
///
/// A key is a `(category, name)` pair. The category selects the provider that
/// knows how to create the fixture (`token`, `share`, `personal-share`, ...);
/// the name distinguishes instances within a category (`admin`, `demo`).
/// Keys render as `category:name`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    category: String,
    name: String,
}

impl ResourceKey {
    /// Create a new resource key.
    pub fn new(category: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            category: category.into(),
            name: name.into(),
        }
    }

    /// Create a key whose name is unique to this process run.
    ///
    /// Fixtures that a test mutates must not be shared with other tests, so
    /// they are requested under a fresh key.
    pub fn unique(category: impl Into<String>, prefix: &str) -> Self {
        Self::new(category, format!("{}-{}", prefix, uuid::Uuid::new_v4().simple()))
    }

    /// Get the category.
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Get the name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.category, self.name)
    }
}

impl FromStr for ResourceKey {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once(':') {
            Some((category, name)) if !category.is_empty() && !name.is_empty() => {
                Ok(Self::new(category, name))
            }
            _ => Err(HarnessError::invalid_request(format!(
                "resource key '{}' is not of the form category:name",
                s
            ))),
        }
    }
}
