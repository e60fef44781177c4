/*!
 * Status Icon Plugin
 * Visibility, tooltip and manager activation
 */

use anyhow::bail;
use serde_json::{json, Value};

use crate::bluetooth::ObjectPath;
use crate::plugin::{Effect, Hook, HookSet, OptionSpec, Plugin, PluginContext, PluginDescriptor};

const ID: &str = "StatusIcon";
const TOGGLE_OPTION: &str = "toggle-manager-onclick";

/// Status icon state: visibility, tooltip, icon name and activation.
#[derive(Debug, Default)]
pub struct StatusIcon;

impl StatusIcon {
    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor::new(ID)
            .depends(&["Menu"])
            .description("Shows the Bluetooth status icon")
            .option(OptionSpec::new(
                TOGGLE_OPTION,
                false,
                "Toggle the manager on clicking the system tray icon",
                "Clicking the system tray icon will toggle the manager instead of focusing on it.",
            ))
    }

    fn query_visibility(&self, ctx: &mut PluginContext, emit: bool) {
        ctx.set_visible(true, emit);
    }

    fn launch_tray(&self, ctx: &mut PluginContext) {
        let Some((program, args)) = ctx.settings.tray_command.split_first() else {
            return;
        };
        let effect = Effect::Spawn {
            program: program.clone(),
            args: args.to_vec(),
        };
        ctx.push_effect(effect);
    }

    fn activate_manager(&self, ctx: &mut PluginContext) {
        let toggle = ctx.option_bool(ID, TOGGLE_OPTION);
        ctx.push_effect(Effect::ActivateManager { toggle });
    }
}

impl Plugin for StatusIcon {
    fn hooks(&self) -> HookSet {
        HookSet::of(&[
            Hook::PluginsLoaded,
            Hook::AdapterAdded,
            Hook::AdapterRemoved,
            Hook::ManagerStateChanged,
        ])
    }

    fn on_load(&mut self, ctx: &mut PluginContext) -> anyhow::Result<()> {
        self.query_visibility(ctx, false);
        Ok(())
    }

    fn on_plugins_loaded(&mut self, ctx: &mut PluginContext) -> anyhow::Result<()> {
        if ctx.manager_state() {
            self.launch_tray(ctx);
        }
        Ok(())
    }

    fn on_adapter_added(&mut self, ctx: &mut PluginContext, _path: &ObjectPath) -> anyhow::Result<()> {
        self.query_visibility(ctx, true);
        Ok(())
    }

    fn on_adapter_removed(&mut self, ctx: &mut PluginContext, _path: &ObjectPath) -> anyhow::Result<()> {
        self.query_visibility(ctx, true);
        Ok(())
    }

    fn on_manager_state_changed(&mut self, ctx: &mut PluginContext, state: bool) -> anyhow::Result<()> {
        self.query_visibility(ctx, true);
        if state {
            self.launch_tray(ctx);
        }
        Ok(())
    }

    fn ipc_methods(&self) -> &'static [&'static str] {
        &[
            "GetVisibility",
            "GetToolTipTitle",
            "GetToolTipText",
            "GetStatusIconImplementations",
            "GetIconName",
            "Activate",
            "ActivateBluetoothAndManager",
        ]
    }

    fn call_ipc_method(&mut self, ctx: &mut PluginContext, method: &str, _args: &Value) -> anyhow::Result<Value> {
        let reply = match method {
            "GetVisibility" => json!(ctx.status_icon().visible),
            "GetToolTipTitle" => json!(ctx.status_icon().tooltip_title),
            "GetToolTipText" => json!(ctx.status_icon().tooltip_text),
            "GetStatusIconImplementations" => json!(ctx.capabilities.implementations),
            "GetIconName" => json!(ctx.capabilities.icon_name),
            "Activate" => {
                self.activate_manager(ctx);
                Value::Null
            }
            "ActivateBluetoothAndManager" => {
                ctx.push_effect(Effect::SetRfkillState { state: true });
                self.activate_manager(ctx);
                Value::Null
            }
            _ => bail!("method {} is not implemented", method),
        };
        Ok(reply)
    }
}
