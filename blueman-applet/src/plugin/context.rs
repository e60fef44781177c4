/*!
 * Plugin Context
 * State and services shared with plugins
 *
 * The context is passed explicitly to every hook. Plugins never perform I/O
 * themselves: they queue [`Effect`]s which the runtime executes once the
 * current dispatch has finished.
 */

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::bluetooth::{DeviceCache, ObjectPath};
use crate::config::GeneralConfig;
use crate::menu::{MenuItem, MenuModel};
use crate::plugin::query::Capabilities;
use crate::plugin::PluginDescriptor;

/// Change notification pushed to subscribed IPC clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "signal")]
pub enum AppletSignal {
    VisibilityChanged { visible: bool },
    ToolTipTitleChanged { title: String },
    ToolTipTextChanged { text: String },
    IconNameChanged { icon_name: String },
    MenuChanged,
    ManagerStateChanged { state: bool },
    PluginsChanged,
}

/// Side effect requested by a plugin.
#[derive(Debug, Clone, PartialEq)]
pub enum Effect {
    Signal(AppletSignal),
    /// Privileged rfkill switch through the mechanism.
    SetRfkillState { state: bool },
    ConnectDevice(ObjectPath),
    DisconnectDevice(ObjectPath),
    RemoveDevice { adapter: ObjectPath, device: ObjectPath },
    Spawn { program: String, args: Vec<String> },
    /// Show the device manager, or close it when `toggle` is set and it runs.
    ActivateManager { toggle: bool },
    Quit,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusIconState {
    pub visible: bool,
    pub tooltip_title: String,
    pub tooltip_text: String,
}

impl Default for StatusIconState {
    fn default() -> Self {
        Self {
            visible: true,
            tooltip_title: "Bluetooth Enabled".to_string(),
            tooltip_text: String::new(),
        }
    }
}

pub struct PluginContext {
    pub devices: DeviceCache,
    pub capabilities: Capabilities,
    pub settings: GeneralConfig,
    menu: MenuModel,
    status_icon: StatusIconState,
    options: HashMap<String, toml::Table>,
    effects: Vec<Effect>,
    unload_requests: Vec<String>,
}

impl PluginContext {
    pub fn new(settings: GeneralConfig, options: HashMap<String, toml::Table>) -> Self {
        Self {
            devices: DeviceCache::default(),
            capabilities: Capabilities::default(),
            settings,
            menu: MenuModel::default(),
            status_icon: StatusIconState::default(),
            options,
            effects: Vec::new(),
            unload_requests: Vec::new(),
        }
    }

    pub fn manager_state(&self) -> bool {
        self.devices.manager_up()
    }

    // Options

    /// Fills in declared defaults for options the configuration left unset.
    pub fn register_option_defaults(&mut self, descriptor: &PluginDescriptor) {
        let table = self.options.entry(descriptor.id.clone()).or_default();
        for declared in &descriptor.options {
            table
                .entry(declared.key.clone())
                .or_insert(declared.default.clone());
        }
    }

    pub fn option(&self, plugin: &str, key: &str) -> Option<&toml::Value> {
        self.options.get(plugin)?.get(key)
    }

    pub fn option_bool(&self, plugin: &str, key: &str) -> bool {
        self.option(plugin, key)
            .and_then(toml::Value::as_bool)
            .unwrap_or(false)
    }

    pub fn option_ints(&self, plugin: &str, key: &str) -> Option<Vec<i64>> {
        let values = self.option(plugin, key)?.as_array()?;
        Some(values.iter().filter_map(toml::Value::as_integer).collect())
    }

    // Effects

    pub fn push_effect(&mut self, effect: Effect) {
        self.effects.push(effect);
    }

    pub fn emit(&mut self, signal: AppletSignal) {
        self.effects.push(Effect::Signal(signal));
    }

    pub fn take_effects(&mut self) -> Vec<Effect> {
        std::mem::take(&mut self.effects)
    }

    /// Asks the dispatcher to unload a plugin as soon as the running handler returns.
    pub fn request_unload(&mut self, plugin: &str) {
        self.unload_requests.push(plugin.to_string());
    }

    pub fn take_unload_requests(&mut self) -> Vec<String> {
        std::mem::take(&mut self.unload_requests)
    }

    // Menu

    pub fn menu(&self) -> &MenuModel {
        &self.menu
    }

    pub fn add_menu_item(&mut self, item: MenuItem) {
        self.menu.add(item);
        self.emit(AppletSignal::MenuChanged);
    }

    pub fn unregister_menu(&mut self, owner: &str) {
        if self.menu.unregister(owner) {
            self.emit(AppletSignal::MenuChanged);
        }
    }

    pub fn clear_menu(&mut self) {
        self.menu.clear();
        self.emit(AppletSignal::MenuChanged);
    }

    // Status icon

    pub fn status_icon(&self) -> &StatusIconState {
        &self.status_icon
    }

    pub fn set_visible(&mut self, visible: bool, emit: bool) {
        self.status_icon.visible = visible;
        if emit {
            self.emit(AppletSignal::VisibilityChanged { visible });
        }
    }

    pub fn set_tooltip_title(&mut self, title: &str) {
        self.status_icon.tooltip_title = title.to_string();
        self.emit(AppletSignal::ToolTipTitleChanged {
            title: title.to_string(),
        });
    }

    pub fn set_tooltip_text(&mut self, text: Option<&str>) {
        self.status_icon.tooltip_text = text.unwrap_or_default().to_string();
        let text = self.status_icon.tooltip_text.clone();
        self.emit(AppletSignal::ToolTipTextChanged { text });
    }
}
