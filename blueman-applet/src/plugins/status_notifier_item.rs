/*!
 * Status Notifier Item Plugin
 * StatusNotifierItem tray backend vote
 */

use crate::plugin::{Hook, HookSet, Plugin, PluginContext, PluginDescriptor};

/// Prefers the StatusNotifierItem tray backend when it is available.
#[derive(Debug, Default)]
pub struct StatusNotifierItem;

impl StatusNotifierItem {
    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor::new("StatusNotifierItem")
            .depends(&["StatusIcon"])
            .hidden(true)
            .description("Provides a StatusNotifierItem to show a status icon")
    }
}

impl Plugin for StatusNotifierItem {
    fn hooks(&self) -> HookSet {
        HookSet::of(&[Hook::QueryStatusIconImplementation])
    }

    fn on_query_status_icon_implementation(&self, _ctx: &PluginContext) -> Option<(String, i32)> {
        Some(("StatusNotifierItem".to_string(), 20))
    }
}
