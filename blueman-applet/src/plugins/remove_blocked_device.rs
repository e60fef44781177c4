/*!
 * Remove Blocked Device Plugin
 * Drops blocked devices once they disconnect
 */

use tracing::debug;

use crate::bluetooth::{ObjectPath, PropertyValue};
use crate::plugin::{Effect, Hook, HookSet, Plugin, PluginContext, PluginDescriptor};

/// Removes blocked devices from their adapter once they disconnect.
#[derive(Debug, Default)]
pub struct RemoveBlockedDevice {
    /// Adapter that last reported a property change.
    adapter: Option<ObjectPath>,
}

impl RemoveBlockedDevice {
    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor::new("RemoveBlockedDevice").description("Removes blocked devices once they disconnect")
    }
}

impl Plugin for RemoveBlockedDevice {
    fn hooks(&self) -> HookSet {
        HookSet::of(&[Hook::AdapterPropertyChanged, Hook::DevicePropertyChanged])
    }

    fn on_adapter_property_changed(
        &mut self,
        _ctx: &mut PluginContext,
        path: &ObjectPath,
        _key: &str,
        _value: &PropertyValue,
    ) -> anyhow::Result<()> {
        self.adapter = Some(path.clone());
        Ok(())
    }

    fn on_device_property_changed(
        &mut self,
        ctx: &mut PluginContext,
        path: &ObjectPath,
        key: &str,
        value: &PropertyValue,
    ) -> anyhow::Result<()> {
        if key != "Connected" || value.as_bool() != Some(false) || !ctx.devices.is_device_blocked(path) {
            return Ok(());
        }

        let adapter = self
            .adapter
            .clone()
            .or_else(|| ctx.devices.get(path).and_then(|device| device.adapter()));
        let Some(adapter) = adapter else {
            anyhow::bail!("no adapter known for blocked device {}", path);
        };

        debug!(device = %path, adapter = %adapter, "Removing blocked device");
        ctx.push_effect(Effect::RemoveDevice {
            adapter,
            device: path.clone(),
        });
        Ok(())
    }
}
