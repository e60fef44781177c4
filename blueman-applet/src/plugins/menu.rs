/*!
 * Menu Plugin
 * Status icon menu service
 */

use anyhow::{anyhow, bail};
use serde::Deserialize;

use super::parse_args;
use crate::plugin::{HookSet, Plugin, PluginContext, PluginDescriptor};

/// Owns the status icon menu and serves it to the tray frontend.
#[derive(Debug, Default)]
pub struct Menu;

#[derive(Debug, Deserialize)]
struct ActivateArgs {
    priority: (u32, u32),
    #[serde(default)]
    submenu: Option<usize>,
}

impl Menu {
    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor::new("Menu")
            .hidden(true)
            .unloadable(false)
            .description("Provides the status icon menu")
    }
}

impl Plugin for Menu {
    fn hooks(&self) -> HookSet {
        HookSet::EMPTY
    }

    fn on_unload(&mut self, ctx: &mut PluginContext) -> anyhow::Result<()> {
        ctx.clear_menu();
        Ok(())
    }

    fn ipc_methods(&self) -> &'static [&'static str] {
        &["GetMenu", "ActivateMenuItem"]
    }

    fn call_ipc_method(
        &mut self,
        ctx: &mut PluginContext,
        method: &str,
        args: &serde_json::Value,
    ) -> anyhow::Result<serde_json::Value> {
        match method {
            "GetMenu" => Ok(serde_json::to_value(ctx.menu().items())?),
            "ActivateMenuItem" => {
                let args: ActivateArgs = parse_args(method, args)?;
                let action = ctx
                    .menu()
                    .action_at(args.priority, args.submenu)
                    .cloned()
                    .ok_or_else(|| anyhow!("no menu action at {:?}", args.priority))?;
                ctx.push_effect(action.into_effect());
                Ok(serde_json::Value::Null)
            }
            _ => bail!("method {} is not implemented", method),
        }
    }
}
