//! Plugin registry: a name-keyed mapping from plugin-kind string to the
//! runtime Task variant it builds into.
//!
//! The reference implementation registers task classes dynamically at module
//! load time via subclass hooks; here the Task payload is a tagged variant
//! (see [`crate::graph_items::TaskSpec`]) selected in pass 3 by
//! `config.plugin`. This thin registry exists so the duplicate-registration
//! and unknown-plugin failure modes stay independently testable, rather than
//! being folded into a bare `match`.

use std::collections::HashMap;

use crate::config::PluginKind;
use crate::error::{CoreError, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PluginEntry {
    pub kind: PluginKind,
}

#[derive(Clone, Debug, Default)]
pub struct PluginRegistry {
    entries: HashMap<String, PluginEntry>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Builds a registry with the built-in plugin kinds (`shell`, `icon`)
    /// registered.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register("shell", PluginKind::Shell)
            .expect("builtin registration cannot collide");
        registry
            .register("icon", PluginKind::Icon)
            .expect("builtin registration cannot collide");
        registry
    }

    pub fn register(&mut self, name: &str, kind: PluginKind) -> Result<()> {
        if self.entries.contains_key(name) {
            return Err(CoreError::PluginAlreadyRegistered(name.to_string()));
        }
        self.entries.insert(name.to_string(), PluginEntry { kind });
        Ok(())
    }

    pub fn resolve(&self, name: &str) -> Result<PluginKind> {
        self.entries
            .get(name)
            .map(|e| e.kind)
            .ok_or_else(|| CoreError::UnknownPlugin(name.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtins_resolve() {
        let registry = PluginRegistry::with_builtins();
        assert_eq!(registry.resolve("shell").unwrap(), PluginKind::Shell);
        assert_eq!(registry.resolve("icon").unwrap(), PluginKind::Icon);
    }

    #[test]
    fn unknown_plugin_errors() {
        let registry = PluginRegistry::with_builtins();
        let err = registry.resolve("slurm").unwrap_err();
        assert!(matches!(err, CoreError::UnknownPlugin(_)));
    }

    #[test]
    fn duplicate_registration_errors() {
        let mut registry = PluginRegistry::with_builtins();
        let err = registry.register("shell", PluginKind::Shell).unwrap_err();
        assert!(matches!(err, CoreError::PluginAlreadyRegistered(_)));
    }
}
