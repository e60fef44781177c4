/*!
 * Event Dispatcher
 * Event fan-out to loaded plugins
 */

use tracing::{debug, warn};

use super::{AppletEvent, Plugin, PluginContext, PluginLoader};
use crate::error::PluginError;

/// What a single dispatch did.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DispatchOutcome {
    /// Plugins whose handler ran, in call order.
    pub invoked: Vec<String>,
    pub failed: Vec<PluginError>,
}

/// Routes [`AppletEvent`]s to every loaded plugin that handles them.
///
/// Handlers run synchronously in load order. A handler error is logged and
/// does not stop the remaining plugins. Unloads a handler asks for through
/// [`PluginContext::request_unload`] take effect as soon as it returns, and a
/// plugin unloaded that way is not called for the rest of the dispatch.
#[derive(Debug, Default)]
pub struct EventDispatcher;

impl EventDispatcher {
    pub fn new() -> Self {
        Self
    }

    pub fn dispatch(
        &self,
        loader: &mut PluginLoader,
        ctx: &mut PluginContext,
        event: &AppletEvent,
    ) -> DispatchOutcome {
        let hook = event.hook();
        let mut outcome = DispatchOutcome::default();
        let snapshot = loader.load_order().to_vec();

        for id in &snapshot {
            let Some(plugin) = loader.get_mut(id) else {
                debug!(plugin_id = %id, %hook, "Skipping plugin unloaded during dispatch");
                continue;
            };
            if !plugin.hooks().contains(hook) {
                continue;
            }

            let result = invoke(plugin, ctx, event);
            outcome.invoked.push(id.clone());

            if let Err(e) = result {
                let failure = PluginError::HandlerFailure {
                    plugin: id.clone(),
                    hook,
                    reason: format!("{:#}", e),
                };
                warn!(plugin_id = %id, %hook, "{}", failure);
                outcome.failed.push(failure);
            }

            apply_unload_requests(loader, ctx);
        }

        outcome
    }
}

/// Applies unloads requested from inside a handler.
pub(crate) fn apply_unload_requests(loader: &mut PluginLoader, ctx: &mut PluginContext) {
    for id in ctx.take_unload_requests() {
        match loader.unload_plugin(&id, ctx) {
            Ok(unloaded) if !unloaded.is_empty() => {
                debug!(plugin_id = %id, unloaded = ?unloaded, "Unloaded on request");
            }
            Ok(_) => {}
            Err(e) => warn!(plugin_id = %id, "Requested unload refused: {}", e),
        }
    }
}

fn invoke(plugin: &mut dyn Plugin, ctx: &mut PluginContext, event: &AppletEvent) -> anyhow::Result<()> {
    match event {
        AppletEvent::PluginsLoaded => plugin.on_plugins_loaded(ctx),
        AppletEvent::AdapterAdded(path) => plugin.on_adapter_added(ctx, path),
        AppletEvent::AdapterRemoved(path) => plugin.on_adapter_removed(ctx, path),
        AppletEvent::DeviceCreated(path) => plugin.on_device_created(ctx, path),
        AppletEvent::DeviceRemoved(path) => plugin.on_device_removed(ctx, path),
        AppletEvent::AdapterPropertyChanged { path, key, value } => {
            plugin.on_adapter_property_changed(ctx, path, key, value)
        }
        AppletEvent::DevicePropertyChanged { path, key, value } => {
            plugin.on_device_property_changed(ctx, path, key, value)
        }
        AppletEvent::ManagerStateChanged(state) => plugin.on_manager_state_changed(ctx, *state),
    }
}
