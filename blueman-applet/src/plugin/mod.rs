/*!
 * Plugin Core
 * Hook surface, descriptors, registry, loader, dispatch and capability queries
 *
 * Plugins are plain Rust values implementing [`Plugin`]. Each one declares the
 * hooks it handles through a [`HookSet`]; the dispatcher consults that set
 * instead of probing for methods, and every hook has a typed default that
 * does nothing.
 */

pub mod context;
pub mod dispatcher;
pub mod loader;
pub mod query;
pub mod registry;

#[cfg(test)]
pub(crate) mod testing;

use anyhow::bail;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::bluetooth::{BluezObject, ObjectPath, PropertyValue};

pub use context::{AppletSignal, Effect, PluginContext};
pub use dispatcher::{DispatchOutcome, EventDispatcher};
pub use loader::{PluginLoader, PluginState, PluginSummary};
pub use query::{Capabilities, CapabilityQuery};
pub use registry::{PluginEntry, PluginRegistry};

/// Every hook a plugin can implement, besides `on_load`/`on_unload`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Hook {
    PluginsLoaded,
    AdapterAdded,
    AdapterRemoved,
    DeviceCreated,
    DeviceRemoved,
    AdapterPropertyChanged,
    DevicePropertyChanged,
    ManagerStateChanged,
    QueryStatusIconImplementation,
    StatusIconQueryIcon,
    QueryDeviceMenuAllowed,
}

impl Hook {
    pub const ALL: [Hook; 11] = [
        Hook::PluginsLoaded,
        Hook::AdapterAdded,
        Hook::AdapterRemoved,
        Hook::DeviceCreated,
        Hook::DeviceRemoved,
        Hook::AdapterPropertyChanged,
        Hook::DevicePropertyChanged,
        Hook::ManagerStateChanged,
        Hook::QueryStatusIconImplementation,
        Hook::StatusIconQueryIcon,
        Hook::QueryDeviceMenuAllowed,
    ];

    pub const fn name(self) -> &'static str {
        match self {
            Hook::PluginsLoaded => "on_plugins_loaded",
            Hook::AdapterAdded => "on_adapter_added",
            Hook::AdapterRemoved => "on_adapter_removed",
            Hook::DeviceCreated => "on_device_created",
            Hook::DeviceRemoved => "on_device_removed",
            Hook::AdapterPropertyChanged => "on_adapter_property_changed",
            Hook::DevicePropertyChanged => "on_device_property_changed",
            Hook::ManagerStateChanged => "on_manager_state_changed",
            Hook::QueryStatusIconImplementation => "on_query_status_icon_implementation",
            Hook::StatusIconQueryIcon => "on_status_icon_query_icon",
            Hook::QueryDeviceMenuAllowed => "on_query_device_menu_allowed",
        }
    }

    const fn bit(self) -> u32 {
        1 << (self as u32)
    }
}

impl fmt::Display for Hook {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Capability checklist: the hooks a plugin handles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct HookSet(u32);

impl HookSet {
    pub const EMPTY: HookSet = HookSet(0);

    pub const fn of(hooks: &[Hook]) -> Self {
        let mut bits = 0;
        let mut i = 0;
        while i < hooks.len() {
            bits |= hooks[i].bit();
            i += 1;
        }
        HookSet(bits)
    }

    pub const fn contains(self, hook: Hook) -> bool {
        self.0 & hook.bit() != 0
    }

    pub fn iter(self) -> impl Iterator<Item = Hook> {
        Hook::ALL.into_iter().filter(move |hook| self.contains(*hook))
    }
}

/// Notification routed to plugins. Created per incoming signal, dropped
/// after dispatch.
#[derive(Debug, Clone, PartialEq)]
pub enum AppletEvent {
    /// Startup loading finished, or a plugin was loaded or unloaded at runtime.
    PluginsLoaded,
    AdapterAdded(ObjectPath),
    AdapterRemoved(ObjectPath),
    DeviceCreated(ObjectPath),
    DeviceRemoved(ObjectPath),
    AdapterPropertyChanged {
        path: ObjectPath,
        key: String,
        value: PropertyValue,
    },
    DevicePropertyChanged {
        path: ObjectPath,
        key: String,
        value: PropertyValue,
    },
    ManagerStateChanged(bool),
}

impl AppletEvent {
    pub fn hook(&self) -> Hook {
        match self {
            AppletEvent::PluginsLoaded => Hook::PluginsLoaded,
            AppletEvent::AdapterAdded(_) => Hook::AdapterAdded,
            AppletEvent::AdapterRemoved(_) => Hook::AdapterRemoved,
            AppletEvent::DeviceCreated(_) => Hook::DeviceCreated,
            AppletEvent::DeviceRemoved(_) => Hook::DeviceRemoved,
            AppletEvent::AdapterPropertyChanged { .. } => Hook::AdapterPropertyChanged,
            AppletEvent::DevicePropertyChanged { .. } => Hook::DevicePropertyChanged,
            AppletEvent::ManagerStateChanged(_) => Hook::ManagerStateChanged,
        }
    }
}

/// A user-tunable plugin option and its default.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptionSpec {
    pub key: String,
    pub default: toml::Value,
    pub name: String,
    pub description: String,
}

impl OptionSpec {
    pub fn new(key: &str, default: impl Into<toml::Value>, name: &str, description: &str) -> Self {
        Self {
            key: key.to_string(),
            default: default.into(),
            name: name.to_string(),
            description: description.to_string(),
        }
    }
}

/// Static description of a plugin. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PluginDescriptor {
    pub id: String,
    pub depends: Vec<String>,
    pub enabled: bool,
    pub hidden: bool,
    pub unloadable: bool,
    pub author: String,
    pub description: String,
    pub options: Vec<OptionSpec>,
}

impl PluginDescriptor {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            depends: Vec::new(),
            enabled: true,
            hidden: false,
            unloadable: true,
            author: String::new(),
            description: String::new(),
            options: Vec::new(),
        }
    }

    pub fn depends(mut self, ids: &[&str]) -> Self {
        self.depends = ids.iter().map(|id| id.to_string()).collect();
        self
    }

    pub fn enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    pub fn hidden(mut self, hidden: bool) -> Self {
        self.hidden = hidden;
        self
    }

    pub fn unloadable(mut self, unloadable: bool) -> Self {
        self.unloadable = unloadable;
        self
    }

    pub fn author(mut self, author: &str) -> Self {
        self.author = author.to_string();
        self
    }

    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    pub fn option(mut self, option: OptionSpec) -> Self {
        self.options.push(option);
        self
    }
}

/// Hook surface exposed to plugins.
///
/// Only hooks listed in [`Plugin::hooks`] are ever called. Event hooks report
/// failure through `Err`; the dispatcher logs it and moves on to the next
/// plugin. Query hooks vote with `(answer, priority)`; `None` abstains.
pub trait Plugin {
    fn hooks(&self) -> HookSet;

    fn on_load(&mut self, _ctx: &mut PluginContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_unload(&mut self, _ctx: &mut PluginContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_plugins_loaded(&mut self, _ctx: &mut PluginContext) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_adapter_added(&mut self, _ctx: &mut PluginContext, _path: &ObjectPath) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_adapter_removed(&mut self, _ctx: &mut PluginContext, _path: &ObjectPath) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_device_created(&mut self, _ctx: &mut PluginContext, _path: &ObjectPath) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_device_removed(&mut self, _ctx: &mut PluginContext, _path: &ObjectPath) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_adapter_property_changed(
        &mut self,
        _ctx: &mut PluginContext,
        _path: &ObjectPath,
        _key: &str,
        _value: &PropertyValue,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_device_property_changed(
        &mut self,
        _ctx: &mut PluginContext,
        _path: &ObjectPath,
        _key: &str,
        _value: &PropertyValue,
    ) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_manager_state_changed(&mut self, _ctx: &mut PluginContext, _state: bool) -> anyhow::Result<()> {
        Ok(())
    }

    fn on_query_status_icon_implementation(&self, _ctx: &PluginContext) -> Option<(String, i32)> {
        None
    }

    fn on_status_icon_query_icon(&self, _ctx: &PluginContext) -> Option<(String, i32)> {
        None
    }

    fn on_query_device_menu_allowed(&self, _ctx: &PluginContext, _device: &BluezObject) -> Option<(bool, i32)> {
        None
    }

    /// Methods this plugin serves over the applet socket.
    fn ipc_methods(&self) -> &'static [&'static str] {
        &[]
    }

    fn call_ipc_method(
        &mut self,
        _ctx: &mut PluginContext,
        method: &str,
        _args: &serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        bail!("method {} is not implemented", method)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hook_set_membership() {
        let hooks = HookSet::of(&[Hook::DeviceRemoved, Hook::StatusIconQueryIcon]);

        assert!(hooks.contains(Hook::DeviceRemoved));
        assert!(hooks.contains(Hook::StatusIconQueryIcon));
        assert!(!hooks.contains(Hook::DeviceCreated));
        assert!(!HookSet::EMPTY.contains(Hook::PluginsLoaded));
        assert_eq!(
            hooks.iter().collect::<Vec<_>>(),
            vec![Hook::DeviceRemoved, Hook::StatusIconQueryIcon]
        );
    }

    #[test]
    fn events_map_to_hooks() {
        let path = ObjectPath::from("/org/bluez/hci0/dev_00_11_22_33_44_55");
        assert_eq!(AppletEvent::DeviceRemoved(path.clone()).hook(), Hook::DeviceRemoved);
        assert_eq!(
            AppletEvent::DevicePropertyChanged {
                path,
                key: "Connected".into(),
                value: PropertyValue::Bool(false),
            }
            .hook(),
            Hook::DevicePropertyChanged
        );
        assert_eq!(Hook::ManagerStateChanged.to_string(), "on_manager_state_changed");
    }
}
