//! Store configuration (TOML or code)

use serde::{Deserialize, Serialize};

use crate::StoreError;

/// What `send` does when an observer panics during a notification pass.
///
/// In both modes every remaining observer in the pass is still notified and
/// the committed snapshot is kept.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ObserverPanicPolicy {
    /// Log the panic with `tracing` and return normally
    #[default]
    Isolate,
    /// Resume the first panic on the caller once the pass has finished
    Propagate,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct StoreConfig {
    /// Label used in log output
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub observer_panics: ObserverPanicPolicy,
}

impl StoreConfig {
    /// Default config with a name used in log messages
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Set how observer panics are handled
    pub fn with_observer_panics(mut self, policy: ObserverPanicPolicy) -> Self {
        self.observer_panics = policy;
        self
    }

    /// Parse a config from TOML
    pub fn from_toml_str(src: &str) -> Result<Self, StoreError> {
        Ok(toml::from_str(src)?)
    }

    pub(crate) fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("store")
    }
}
