/*!
 * Plugin Registry
 * Catalog of known plugins, keyed by identifier
 *
 * Entries keep their registration order, which is also the tie-break for
 * load order between plugins that do not depend on each other.
 */

use tracing::{debug, info};

use super::{Plugin, PluginDescriptor};
use crate::config::PluginsConfig;
use crate::error::PluginError;

/// Creates a fresh plugin instance. Each load gets a new one.
pub type PluginFactory = Box<dyn Fn() -> anyhow::Result<Box<dyn Plugin>>>;

/// A registered plugin: its descriptor and how to instantiate it.
pub struct PluginEntry {
    pub descriptor: PluginDescriptor,
    factory: PluginFactory,
}

impl PluginEntry {
    pub fn new<F>(descriptor: PluginDescriptor, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<Box<dyn Plugin>> + 'static,
    {
        Self {
            descriptor,
            factory: Box::new(factory),
        }
    }

    pub fn instantiate(&self) -> anyhow::Result<Box<dyn Plugin>> {
        (self.factory)()
    }
}

impl std::fmt::Debug for PluginEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PluginEntry")
            .field("descriptor", &self.descriptor)
            .field("factory", &"<fn>")
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct PluginRegistry {
    entries: Vec<PluginEntry>,
}

impl PluginRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a registry from built-in entries, applying the configured
    /// enabled/disabled/hidden lists.
    pub fn from_catalog(catalog: Vec<PluginEntry>, config: &PluginsConfig) -> Result<Self, PluginError> {
        let mut registry = Self::new();
        for mut entry in catalog {
            let id = entry.descriptor.id.clone();
            if let Some(enabled) = &config.enabled {
                entry.descriptor.enabled = enabled.contains(&id);
            }
            if config.disabled.contains(&id) {
                entry.descriptor.enabled = false;
            }
            if config.hidden.contains(&id) {
                entry.descriptor.hidden = true;
            }
            registry.register(entry)?;
        }
        Ok(registry)
    }

    /// Registers an entry. Re-registering an identifier with the same
    /// dependencies replaces it in place; different dependencies are rejected.
    pub fn register(&mut self, entry: PluginEntry) -> Result<(), PluginError> {
        let id = entry.descriptor.id.clone();

        if let Some(existing) = self.entries.iter_mut().find(|e| e.descriptor.id == id) {
            if existing.descriptor.depends != entry.descriptor.depends {
                return Err(PluginError::DuplicateIdentifier { plugin: id });
            }
            debug!(plugin_id = %id, "Replacing plugin registration");
            *existing = entry;
            return Ok(());
        }

        info!(
            plugin_id = %id,
            depends = ?entry.descriptor.depends,
            enabled = entry.descriptor.enabled,
            "Registering plugin"
        );
        self.entries.push(entry);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&PluginEntry> {
        self.entries.iter().find(|e| e.descriptor.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Enabled, user-visible plugins in registration order.
    pub fn list_enabled(&self) -> Vec<&PluginDescriptor> {
        self.entries
            .iter()
            .map(|e| &e.descriptor)
            .filter(|d| d.enabled && !d.hidden)
            .collect()
    }

    /// Every enabled plugin, hidden ones included, in registration order.
    pub fn loadable(&self) -> Vec<&PluginDescriptor> {
        self.entries
            .iter()
            .map(|e| &e.descriptor)
            .filter(|d| d.enabled)
            .collect()
    }

    pub fn list_all(&self) -> Vec<&PluginDescriptor> {
        self.entries.iter().map(|e| &e.descriptor).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::testing::entry;

    #[test]
    fn list_enabled_skips_disabled_and_hidden() {
        let mut registry = PluginRegistry::new();
        registry.register(entry(PluginDescriptor::new("Menu").hidden(true))).unwrap();
        registry.register(entry(PluginDescriptor::new("StatusIcon").depends(&["Menu"]))).unwrap();
        registry.register(entry(PluginDescriptor::new("Off").enabled(false))).unwrap();
        registry.register(entry(PluginDescriptor::new("PowerManager"))).unwrap();

        let visible: Vec<&str> = registry.list_enabled().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(visible, vec!["StatusIcon", "PowerManager"]);

        let loadable: Vec<&str> = registry.loadable().iter().map(|d| d.id.as_str()).collect();
        assert_eq!(loadable, vec!["Menu", "StatusIcon", "PowerManager"]);
    }

    #[test]
    fn same_dependencies_overwrite_in_place() {
        let mut registry = PluginRegistry::new();
        registry.register(entry(PluginDescriptor::new("A").description("first"))).unwrap();
        registry.register(entry(PluginDescriptor::new("B"))).unwrap();
        registry.register(entry(PluginDescriptor::new("A").description("second"))).unwrap();

        assert_eq!(registry.len(), 2);
        let all = registry.list_all();
        assert_eq!(all[0].id, "A");
        assert_eq!(all[0].description, "second");
    }

    #[test]
    fn conflicting_dependencies_are_rejected() {
        let mut registry = PluginRegistry::new();
        registry.register(entry(PluginDescriptor::new("A").depends(&["Menu"]))).unwrap();

        let err = registry
            .register(entry(PluginDescriptor::new("A").depends(&["Other"])))
            .unwrap_err();
        assert_eq!(err, PluginError::DuplicateIdentifier { plugin: "A".into() });
        assert_eq!(registry.get("A").unwrap().descriptor.depends, vec!["Menu".to_string()]);
    }

    #[test]
    fn catalog_applies_configuration_lists() {
        let catalog = vec![
            entry(PluginDescriptor::new("Menu")),
            entry(PluginDescriptor::new("StatusIcon")),
            entry(PluginDescriptor::new("SavePairedStates")),
        ];
        let config = PluginsConfig {
            enabled: Some(vec!["Menu".into(), "StatusIcon".into()]),
            disabled: vec!["StatusIcon".into()],
            hidden: vec!["Menu".into()],
        };

        let registry = PluginRegistry::from_catalog(catalog, &config).unwrap();
        let menu = &registry.get("Menu").unwrap().descriptor;
        assert!(menu.enabled && menu.hidden);
        assert!(!registry.get("StatusIcon").unwrap().descriptor.enabled);
        assert!(!registry.get("SavePairedStates").unwrap().descriptor.enabled);
        assert!(registry.list_enabled().is_empty());
    }
}
