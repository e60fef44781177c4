/*!
 * Blueman Applet Core
 * Plugin core wired to BlueZ updates and IPC requests
 *
 * All plugin state lives here and is only touched from the applet task.
 * Every entry point returns the effects plugins queued so the caller can
 * execute them.
 */

use std::collections::HashMap;
use tracing::{debug, info};

use crate::bluetooth::BluezUpdate;
use crate::config::{AppletConfig, GeneralConfig};
use crate::error::PluginError;
use crate::ipc::{Request, Response};
use crate::plugin::dispatcher::apply_unload_requests;
use crate::plugin::{
    AppletEvent, AppletSignal, CapabilityQuery, Effect, EventDispatcher, PluginContext, PluginLoader,
    PluginRegistry,
};
use crate::plugins;

/// Environment variable reported by `GetLogLevel`.
pub const LOG_LEVEL_ENV: &str = "LOG_LEVEL";

pub struct Applet {
    loader: PluginLoader,
    dispatcher: EventDispatcher,
    ctx: PluginContext,
}

impl Applet {
    pub fn new(registry: PluginRegistry, settings: GeneralConfig, options: HashMap<String, toml::Table>) -> Self {
        Self {
            loader: PluginLoader::new(registry),
            dispatcher: EventDispatcher::new(),
            ctx: PluginContext::new(settings, options),
        }
    }

    /// Builds the applet over the built-in plugin catalog.
    pub fn from_config(config: &AppletConfig) -> Result<Self, PluginError> {
        let registry = PluginRegistry::from_catalog(plugins::catalog(), &config.plugins)?;
        Ok(Self::new(
            registry,
            config.general.clone(),
            config.plugin_options.clone(),
        ))
    }

    pub fn loader(&self) -> &PluginLoader {
        &self.loader
    }

    pub fn context(&self) -> &PluginContext {
        &self.ctx
    }

    /// Loads every enabled plugin and announces the finished load.
    pub fn start(&mut self) -> Result<Vec<Effect>, PluginError> {
        let order = self.loader.load_all(&mut self.ctx)?;
        info!(plugins = ?order, "Applet started");
        apply_unload_requests(&mut self.loader, &mut self.ctx);
        self.refresh_capabilities();
        self.dispatch(&AppletEvent::PluginsLoaded);
        Ok(self.ctx.take_effects())
    }

    pub fn shutdown(&mut self) -> Vec<Effect> {
        self.loader.unload_all(&mut self.ctx);
        self.ctx.take_effects()
    }

    /// Folds a BlueZ update into the device cache and dispatches the
    /// resulting events.
    pub fn handle_bluez(&mut self, update: BluezUpdate) -> Vec<Effect> {
        for event in self.ctx.devices.apply(update) {
            if let AppletEvent::ManagerStateChanged(state) = event {
                info!(state, "BlueZ manager state changed");
                self.ctx.emit(AppletSignal::ManagerStateChanged { state });
            }
            self.dispatch(&event);
        }
        self.ctx.take_effects()
    }

    pub fn handle_request(&mut self, request: Request) -> (Response, Vec<Effect>) {
        let response = match request {
            Request::GetStatus => {
                let icon = self.ctx.status_icon();
                Response::Status {
                    manager_state: self.ctx.manager_state(),
                    visible: icon.visible,
                    icon_name: self.ctx.capabilities.icon_name.clone(),
                    tooltip_title: icon.tooltip_title.clone(),
                    tooltip_text: icon.tooltip_text.clone(),
                    plugins: self.loader.load_order().to_vec(),
                }
            }
            Request::ListPlugins => Response::Plugins {
                plugins: self.loader.summaries(),
            },
            Request::LoadPlugin { id } => self.load_plugin(&id),
            Request::UnloadPlugin { id } => self.unload_plugin(&id),
            Request::GetLogLevel => Response::Value {
                value: serde_json::Value::String(std::env::var(LOG_LEVEL_ENV).unwrap_or_default()),
            },
            Request::Call { method, args } => self.call(&method, &args),
            Request::Subscribe => Response::error("subscriptions are served by the socket server"),
            Request::Quit => {
                self.ctx.push_effect(Effect::Quit);
                Response::success("quitting")
            }
        };
        (response, self.ctx.take_effects())
    }

    fn load_plugin(&mut self, id: &str) -> Response {
        let result = self.loader.load_plugin(id, &mut self.ctx);
        apply_unload_requests(&mut self.loader, &mut self.ctx);
        self.ctx.emit(AppletSignal::PluginsChanged);
        self.refresh_capabilities();
        match result {
            Ok(()) => {
                self.dispatch(&AppletEvent::PluginsLoaded);
                Response::success(format!("plugin {} loaded", id))
            }
            Err(e) => Response::error(e.to_string()),
        }
    }

    fn unload_plugin(&mut self, id: &str) -> Response {
        match self.loader.unload_plugin(id, &mut self.ctx) {
            Ok(unloaded) => {
                self.ctx.emit(AppletSignal::PluginsChanged);
                self.refresh_capabilities();
                self.dispatch(&AppletEvent::PluginsLoaded);
                Response::success(format!("unloaded {}", unloaded.join(", ")))
            }
            Err(e) => Response::error(e.to_string()),
        }
    }

    /// Routes a method call to the first loaded plugin that serves it.
    fn call(&mut self, method: &str, args: &serde_json::Value) -> Response {
        let owner = self
            .loader
            .loaded()
            .find(|(_, plugin)| plugin.ipc_methods().contains(&method))
            .map(|(id, _)| id.to_string());

        let Some(plugin) = owner.as_deref().and_then(|id| self.loader.get_mut(id)) else {
            return Response::error(PluginError::UnknownMethod(method.to_string()).to_string());
        };

        let result = plugin.call_ipc_method(&mut self.ctx, method, args);
        apply_unload_requests(&mut self.loader, &mut self.ctx);
        self.refresh_capabilities();

        match result {
            Ok(value) => Response::Value { value },
            Err(e) => Response::error(format!("{:#}", e)),
        }
    }

    fn dispatch(&mut self, event: &AppletEvent) {
        let outcome = self.dispatcher.dispatch(&mut self.loader, &mut self.ctx, event);
        debug!(
            hook = %event.hook(),
            invoked = outcome.invoked.len(),
            failed = outcome.failed.len(),
            "Dispatched event"
        );
        self.refresh_capabilities();
    }

    /// Re-runs capability queries; a new icon name is signalled.
    fn refresh_capabilities(&mut self) {
        let snapshot = CapabilityQuery::snapshot(&self.loader, &self.ctx);
        if snapshot.icon_name != self.ctx.capabilities.icon_name {
            self.ctx.emit(AppletSignal::IconNameChanged {
                icon_name: snapshot.icon_name.clone(),
            });
        }
        self.ctx.capabilities = snapshot;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::{BluezObject, ObjectKind, PropertyValue};
    use crate::config::PluginsConfig;
    use crate::plugin::PluginState;
    use serde_json::json;

    const HCI0: &str = "/org/bluez/hci0";
    const MOUSE: &str = "/org/bluez/hci0/dev_00_11_22_33_44_55";

    fn applet() -> Applet {
        let registry = PluginRegistry::from_catalog(plugins::catalog(), &PluginsConfig::default()).unwrap();
        let mut applet = Applet::new(registry, GeneralConfig::default(), HashMap::new());
        applet.start().unwrap();
        applet
    }

    fn adapter(powered: bool) -> BluezObject {
        BluezObject::new(HCI0, ObjectKind::Adapter).with("Powered", powered)
    }

    fn mouse() -> BluezObject {
        BluezObject::new(MOUSE, ObjectKind::Device)
            .with("Adapter", HCI0)
            .with("Alias", "Mouse")
            .with("Class", 0x2580i64)
            .with("Paired", true)
            .with("Connected", false)
    }

    #[test]
    fn startup_announces_icon_and_launches_nothing_without_bluez() {
        let registry = PluginRegistry::from_catalog(plugins::catalog(), &PluginsConfig::default()).unwrap();
        let mut applet = Applet::new(registry, GeneralConfig::default(), HashMap::new());

        let effects = applet.start().unwrap();
        assert!(effects.contains(&Effect::Signal(AppletSignal::IconNameChanged {
            icon_name: "blueman-disabled".into()
        })));
        assert!(!effects.iter().any(|e| matches!(e, Effect::Spawn { .. })));
        assert_eq!(
            applet.context().capabilities.implementations,
            vec!["StatusNotifierItem", "GtkStatusIcon"]
        );
    }

    #[test]
    fn bluez_updates_drive_plugins() {
        let mut applet = applet();

        let effects = applet.handle_bluez(BluezUpdate::ManagerState(true));
        assert!(effects.contains(&Effect::Signal(AppletSignal::ManagerStateChanged { state: true })));
        assert!(effects.contains(&Effect::Spawn {
            program: "blueman-tray".into(),
            args: vec![]
        }));

        let effects = applet.handle_bluez(BluezUpdate::Snapshot(vec![adapter(true), mouse()]));
        assert!(effects.contains(&Effect::Signal(AppletSignal::IconNameChanged {
            icon_name: "blueman".into()
        })));
        assert_eq!(applet.context().capabilities.icon_name, "blueman");
        assert!(applet
            .context()
            .capabilities
            .is_device_menu_allowed(&MOUSE.into()));
        assert!(applet.context().menu().items().iter().any(|item| item.text == "Mouse"));
    }

    #[test]
    fn blocked_device_removed_after_disconnect() {
        let mut applet = applet();
        applet.handle_bluez(BluezUpdate::ManagerState(true));
        applet.handle_bluez(BluezUpdate::Snapshot(vec![adapter(true), mouse().with("Blocked", true)]));

        let effects = applet.handle_bluez(BluezUpdate::PropertiesChanged {
            path: MOUSE.into(),
            kind: ObjectKind::Device,
            changed: vec![("Connected".into(), PropertyValue::Bool(false))],
        });
        assert!(effects.contains(&Effect::RemoveDevice {
            adapter: HCI0.into(),
            device: MOUSE.into()
        }));
    }

    #[test]
    fn calls_route_to_owning_plugin() {
        let mut applet = applet();

        let (response, effects) = applet.handle_request(Request::Call {
            method: "SetBluetoothStatus".into(),
            args: json!(true),
        });
        assert_eq!(response, Response::Value { value: json!(null) });
        assert_eq!(effects, vec![Effect::SetRfkillState { state: true }]);

        let (response, _) = applet.handle_request(Request::Call {
            method: "Frobnicate".into(),
            args: json!(null),
        });
        assert_eq!(response, Response::error("no loaded plugin provides method Frobnicate"));
    }

    #[test]
    fn runtime_unload_and_reload() {
        let mut applet = applet();

        let (response, effects) = applet.handle_request(Request::UnloadPlugin {
            id: "PowerManager".into(),
        });
        assert_eq!(response, Response::success("unloaded PowerManager"));
        assert!(effects.contains(&Effect::Signal(AppletSignal::PluginsChanged)));
        assert_eq!(applet.loader().state("PowerManager"), PluginState::Unloaded);
        assert_eq!(applet.context().capabilities.icon_name, "blueman");

        let (response, _) = applet.handle_request(Request::UnloadPlugin { id: "Menu".into() });
        assert_eq!(response, Response::error("plugin Menu cannot be unloaded"));

        let (response, _) = applet.handle_request(Request::LoadPlugin {
            id: "PowerManager".into(),
        });
        assert_eq!(response, Response::success("plugin PowerManager loaded"));
        assert!(applet.loader().is_loaded("PowerManager"));
    }

    #[test]
    fn shutdown_unloads_everything() {
        let mut applet = applet();
        let effects = applet.shutdown();

        assert!(applet.loader().load_order().is_empty());
        assert!(applet.context().menu().items().is_empty());
        assert!(effects.contains(&Effect::Signal(AppletSignal::MenuChanged)));
    }

    #[test]
    fn plugin_changes_relaunch_tray_while_manager_is_up() {
        let tray = Effect::Spawn {
            program: "blueman-tray".into(),
            args: vec![],
        };
        let mut applet = applet();

        let (_, effects) = applet.handle_request(Request::UnloadPlugin {
            id: "PowerManager".into(),
        });
        assert!(!effects.contains(&tray));

        applet.handle_bluez(BluezUpdate::ManagerState(true));
        let (_, effects) = applet.handle_request(Request::LoadPlugin {
            id: "PowerManager".into(),
        });
        assert!(effects.contains(&tray));

        let (_, effects) = applet.handle_request(Request::UnloadPlugin {
            id: "SystrayDeviceMenu".into(),
        });
        assert!(effects.contains(&tray));
    }
}
