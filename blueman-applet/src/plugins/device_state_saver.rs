/*!
 * Device State Saver Plugin
 * Runs the save script on pairing changes
 */

use anyhow::bail;
use serde_json::Value;

use super::spawn_save_script;
use crate::bluetooth::{ObjectPath, PropertyValue};
use crate::plugin::{Hook, HookSet, Plugin, PluginContext, PluginDescriptor};

const ID: &str = "DeviceStateSaver";

/// Saves paired device states through the configured script whenever
/// pairing changes or a device goes away. Also callable over IPC.
#[derive(Debug, Default)]
pub struct DeviceStateSaver;

impl DeviceStateSaver {
    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor::new(ID).description("Saves the states of paired devices when pairing changes")
    }
}

impl Plugin for DeviceStateSaver {
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

    fn ipc_methods(&self) -> &'static [&'static str] {
        &["SaveDeviceState"]
    }

    fn call_ipc_method(&mut self, ctx: &mut PluginContext, method: &str, _args: &Value) -> anyhow::Result<Value> {
        match method {
            "SaveDeviceState" => {
                spawn_save_script(ctx, ID);
                Ok(Value::Null)
            }
            _ => bail!("method {} is not implemented", method),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::Effect;
    use crate::plugins::test_context;

    #[test]
    fn pairing_changes_run_the_script() {
        let mut ctx = test_context();
        ctx.settings.save_script = Some("/opt/save_paired.py".into());
        let mut saver = DeviceStateSaver;

        saver
            .on_device_property_changed(&mut ctx, &"/org/bluez/hci0/dev_AA".into(), "Paired", &PropertyValue::Bool(true))
            .unwrap();
        saver
            .on_device_property_changed(&mut ctx, &"/org/bluez/hci0/dev_AA".into(), "RSSI", &PropertyValue::Int(-40))
            .unwrap();
        saver.call_ipc_method(&mut ctx, "SaveDeviceState", &Value::Null).unwrap();

        let spawn = Effect::Spawn {
            program: "/usr/bin/python3".into(),
            args: vec!["/opt/save_paired.py".into()],
        };
        assert_eq!(ctx.take_effects(), vec![spawn.clone(), spawn]);
    }

    #[test]
    fn without_script_nothing_runs() {
        let mut ctx = test_context();
        DeviceStateSaver
            .on_device_removed(&mut ctx, &"/org/bluez/hci0/dev_AA".into())
            .unwrap();
        assert!(ctx.take_effects().is_empty());
    }
}
