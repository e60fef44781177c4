/*!
 * Standard Items Plugin
 * Devices and Quit menu entries
 */

use crate::menu::{MenuAction, MenuItem};
use crate::plugin::{HookSet, OptionSpec, Plugin, PluginContext, PluginDescriptor};

const ID: &str = "StandardItems";
const TOGGLE_OPTION: &str = "toggle-manager-onclick";

/// Devices and Quit entries of the status icon menu.
#[derive(Debug, Default)]
pub struct StandardItems;

impl StandardItems {
    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor::new(ID)
            .depends(&["Menu"])
            .unloadable(false)
            .author("walmis")
            .description("Adds standard menu items to the status icon menu")
            .option(OptionSpec::new(
                TOGGLE_OPTION,
                false,
                "Toggle the manager on clicking the system tray icon",
                "Clicking the system tray icon will toggle the manager instead of focusing on it.",
            ))
    }
}

impl Plugin for StandardItems {
    fn hooks(&self) -> HookSet {
        HookSet::EMPTY
    }

    fn on_load(&mut self, ctx: &mut PluginContext) -> anyhow::Result<()> {
        let toggle = ctx.option_bool(ID, TOGGLE_OPTION);
        ctx.add_menu_item(
            MenuItem::new(ID, (30, 0), "_Devices...")
                .icon("bluetooth-symbolic")
                .tooltip("Open the device manager")
                .action(MenuAction::ActivateManager { toggle }),
        );
        ctx.add_menu_item(
            MenuItem::new(ID, (85, 0), "_Exit")
                .icon("application-exit-symbolic")
                .action(MenuAction::Quit),
        );
        Ok(())
    }

    fn on_unload(&mut self, ctx: &mut PluginContext) -> anyhow::Result<()> {
        ctx.unregister_menu(ID);
        Ok(())
    }
}
