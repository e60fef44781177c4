/*!
 * Save Paired States Plugin
 * Legacy save script trigger
 */

use crate::bluetooth::{ObjectPath, PropertyValue};
use crate::plugin::{Hook, HookSet, Plugin, PluginContext, PluginDescriptor};

use super::spawn_save_script;

const ID: &str = "SavePairedStates";

/// Older variant of [`super::DeviceStateSaver`] without the IPC method.
/// Disabled unless configured.
#[derive(Debug, Default)]
pub struct SavePairedStates;

impl SavePairedStates {
    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor::new(ID)
            .enabled(false)
            .description("Runs the save script when pairing changes")
    }
}

impl Plugin for SavePairedStates {
    fn hooks(&self) -> HookSet {
        HookSet::of(&[Hook::DevicePropertyChanged, Hook::DeviceRemoved])
    }

    fn on_device_property_changed(
        &mut self,
        ctx: &mut PluginContext,
        _path: &ObjectPath,
        key: &str,
        _value: &PropertyValue,
    ) -> anyhow::Result<()> {
        if key == "Paired" {
            spawn_save_script(ctx, ID);
        }
        Ok(())
    }

    fn on_device_removed(&mut self, ctx: &mut PluginContext, _path: &ObjectPath) -> anyhow::Result<()> {
        spawn_save_script(ctx, ID);
        Ok(())
    }
}
