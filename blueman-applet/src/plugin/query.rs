/*!
 * Capability Queries
 * Plugins vote with `(answer, priority)`
 *
 * Votes are ordered by priority, highest first. Equal priorities keep load
 * order, so the outcome never depends on hash iteration or timing.
 */

use serde::Serialize;
use std::cmp::Reverse;
use std::collections::BTreeSet;

use super::{Hook, Plugin, PluginContext, PluginLoader};
use crate::bluetooth::{BluezObject, ObjectPath};

pub const DEFAULT_IMPLEMENTATION: &str = "GtkStatusIcon";
pub const DEFAULT_ICON_NAME: &str = "blueman";

/// Query answers cached in the plugin context between dispatches.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Capabilities {
    pub implementations: Vec<String>,
    pub icon_name: String,
    pub allowed_devices: BTreeSet<ObjectPath>,
}

impl Capabilities {
    pub fn is_device_menu_allowed(&self, path: &ObjectPath) -> bool {
        self.allowed_devices.contains(path)
    }
}

pub struct CapabilityQuery;

impl CapabilityQuery {
    /// Collects votes from every loaded plugin handling `hook`.
    pub fn query<T, F>(loader: &PluginLoader, hook: Hook, mut ask: F) -> Vec<T>
    where
        F: FnMut(&dyn Plugin) -> Option<(T, i32)>,
    {
        let mut votes: Vec<(T, i32)> = loader
            .loaded()
            .filter(|(_, plugin)| plugin.hooks().contains(hook))
            .filter_map(|(_, plugin)| ask(plugin))
            .collect();
        votes.sort_by_key(|(_, priority)| Reverse(*priority));
        votes.into_iter().map(|(answer, _)| answer).collect()
    }

    /// Status icon backends in preference order, the GTK fallback last.
    pub fn status_icon_implementations(loader: &PluginLoader, ctx: &PluginContext) -> Vec<String> {
        let mut implementations = Self::query(loader, Hook::QueryStatusIconImplementation, |plugin| {
            plugin.on_query_status_icon_implementation(ctx)
        });
        implementations.push(DEFAULT_IMPLEMENTATION.to_string());
        implementations
    }

    pub fn status_icon_name(loader: &PluginLoader, ctx: &PluginContext) -> String {
        let name = Self::query(loader, Hook::StatusIconQueryIcon, |plugin| {
            plugin.on_status_icon_query_icon(ctx)
        })
        .into_iter()
        .next()
        .unwrap_or_else(|| DEFAULT_ICON_NAME.to_string());

        let name = name.replace("-symbolic", "");
        if ctx.settings.symbolic_status_icons {
            format!("{}-symbolic", name)
        } else {
            name
        }
    }

    pub fn device_menu_allowed(loader: &PluginLoader, ctx: &PluginContext, device: &BluezObject) -> bool {
        Self::query(loader, Hook::QueryDeviceMenuAllowed, |plugin| {
            plugin.on_query_device_menu_allowed(ctx, device)
        })
        .into_iter()
        .next()
        .unwrap_or(false)
    }

    pub fn snapshot(loader: &PluginLoader, ctx: &PluginContext) -> Capabilities {
        let allowed_devices = ctx
            .devices
            .devices()
            .filter(|device| Self::device_menu_allowed(loader, ctx, device))
            .map(|device| device.path.clone())
            .collect();

        Capabilities {
            implementations: Self::status_icon_implementations(loader, ctx),
            icon_name: Self::status_icon_name(loader, ctx),
            allowed_devices,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::{BluezUpdate, ObjectKind};
    use crate::config::GeneralConfig;
    use crate::plugin::testing::{Journal, Script};
    use crate::plugin::{PluginDescriptor, PluginRegistry};
    use std::collections::HashMap;

    fn loaded(plugins: Vec<(&str, Script)>) -> (PluginLoader, PluginContext) {
        let journal = Journal::new();
        let mut registry = PluginRegistry::new();
        for (id, script) in plugins {
            registry.register(journal.entry(PluginDescriptor::new(id), script)).unwrap();
        }
        let mut loader = PluginLoader::new(registry);
        let mut ctx = PluginContext::new(GeneralConfig::default(), HashMap::new());
        loader.load_all(&mut ctx).unwrap();
        (loader, ctx)
    }

    fn implementation(name: &str, priority: i32) -> Script {
        Script {
            implementation: Some((name.to_string(), priority)),
            ..Script::handling(&[Hook::QueryStatusIconImplementation])
        }
    }

    fn icon(name: &str, priority: i32) -> Script {
        Script {
            icon: Some((name.to_string(), priority)),
            ..Script::handling(&[Hook::StatusIconQueryIcon])
        }
    }

    #[test]
    fn votes_sort_by_priority_then_load_order() {
        let (loader, ctx) = loaded(vec![
            ("A", implementation("A", 5)),
            ("B", implementation("B", 10)),
            ("C", implementation("C", 5)),
        ]);

        assert_eq!(
            CapabilityQuery::status_icon_implementations(&loader, &ctx),
            vec!["B", "A", "C", "GtkStatusIcon"]
        );
    }

    #[test]
    fn undeclared_hooks_are_not_asked() {
        let undeclared = Script {
            implementation: Some(("Hidden".into(), 100)),
            ..Script::default()
        };
        let (loader, ctx) = loaded(vec![("A", undeclared)]);

        assert_eq!(CapabilityQuery::status_icon_implementations(&loader, &ctx), vec!["GtkStatusIcon"]);
    }

    #[test]
    fn icon_name_defaults_and_symbolic_setting() {
        let (loader, mut ctx) = loaded(vec![]);
        assert_eq!(CapabilityQuery::status_icon_name(&loader, &ctx), "blueman");

        ctx.settings.symbolic_status_icons = true;
        assert_eq!(CapabilityQuery::status_icon_name(&loader, &ctx), "blueman-symbolic");
    }

    #[test]
    fn highest_priority_icon_wins() {
        let (loader, ctx) = loaded(vec![
            ("PowerManager", icon("blueman-disabled-symbolic", 20)),
            ("Other", icon("blueman-active", 10)),
        ]);
        assert_eq!(CapabilityQuery::status_icon_name(&loader, &ctx), "blueman-disabled");
    }

    #[test]
    fn device_menu_allowed_defaults_to_false() {
        let allow = Script {
            menu_allowed: Some((true, 0)),
            ..Script::handling(&[Hook::QueryDeviceMenuAllowed])
        };
        let mouse = BluezObject::new("/org/bluez/hci0/dev_AA", ObjectKind::Device);

        let (loader, ctx) = loaded(vec![]);
        assert!(!CapabilityQuery::device_menu_allowed(&loader, &ctx, &mouse));

        let (loader, mut ctx) = loaded(vec![("SystrayDeviceMenu", allow)]);
        assert!(CapabilityQuery::device_menu_allowed(&loader, &ctx, &mouse));

        ctx.devices.apply(BluezUpdate::ObjectAdded(mouse.clone()));
        let capabilities = CapabilityQuery::snapshot(&loader, &ctx);
        assert!(capabilities.is_device_menu_allowed(&mouse.path));
        assert_eq!(capabilities.icon_name, "blueman");
    }
}
