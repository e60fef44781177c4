/*!
 * Built-in Plugins
 * The applet's plugin catalog
 *
 * Registration order below is also the load order among plugins that do not
 * depend on each other.
 */

pub mod device_state_saver;
pub mod menu;
pub mod power_manager;
pub mod remove_blocked_device;
pub mod save_paired_states;
pub mod standard_items;
pub mod status_icon;
pub mod status_notifier_item;
pub mod systray_device_menu;

use serde::de::DeserializeOwned;

use crate::error::PluginError;
use crate::plugin::{Plugin, PluginEntry};

pub use device_state_saver::DeviceStateSaver;
pub use menu::Menu;
pub use power_manager::PowerManager;
pub use remove_blocked_device::RemoveBlockedDevice;
pub use save_paired_states::SavePairedStates;
pub use standard_items::StandardItems;
pub use status_icon::StatusIcon;
pub use status_notifier_item::StatusNotifierItem;
pub use systray_device_menu::SystrayDeviceMenu;

/// Every built-in plugin, in registration order.
pub fn catalog() -> Vec<PluginEntry> {
    vec![
        builtin::<Menu>(Menu::descriptor()),
        builtin::<StatusIcon>(StatusIcon::descriptor()),
        builtin::<StatusNotifierItem>(StatusNotifierItem::descriptor()),
        builtin::<StandardItems>(StandardItems::descriptor()),
        builtin::<PowerManager>(PowerManager::descriptor()),
        builtin::<SystrayDeviceMenu>(SystrayDeviceMenu::descriptor()),
        builtin::<RemoveBlockedDevice>(RemoveBlockedDevice::descriptor()),
        builtin::<DeviceStateSaver>(DeviceStateSaver::descriptor()),
        builtin::<SavePairedStates>(SavePairedStates::descriptor()),
    ]
}

fn builtin<P>(descriptor: crate::plugin::PluginDescriptor) -> PluginEntry
where
    P: Plugin + Default + 'static,
{
    PluginEntry::new(descriptor, || Ok(Box::new(P::default()) as Box<dyn Plugin>))
}

/// Decodes IPC method arguments.
fn parse_args<T: DeserializeOwned>(method: &str, args: &serde_json::Value) -> anyhow::Result<T> {
    serde_json::from_value(args.clone()).map_err(|e| {
        PluginError::InvalidArguments {
            method: method.to_string(),
            reason: e.to_string(),
        }
        .into()
    })
}

/// Runs the configured save script, if any.
fn spawn_save_script(ctx: &mut crate::plugin::PluginContext, plugin: &str) {
    let Some(script) = ctx.settings.save_script.clone() else {
        tracing::debug!(plugin_id = %plugin, "No save script configured, device states not saved");
        return;
    };
    ctx.push_effect(crate::plugin::Effect::Spawn {
        program: ctx.settings.script_interpreter.clone(),
        args: vec![script],
    });
}

#[cfg(test)]
pub(crate) fn test_context() -> crate::plugin::PluginContext {
    crate::plugin::PluginContext::new(crate::config::GeneralConfig::default(), std::collections::HashMap::new())
}
