/*!
 * Power Manager Plugin
 * Adapter power tracking, power menu entry and rfkill switching
 */

use anyhow::bail;
use serde_json::{json, Value};
use tracing::debug;

use super::parse_args;
use crate::bluetooth::{ObjectPath, PropertyValue};
use crate::menu::{MenuAction, MenuItem};
use crate::plugin::{Effect, Hook, HookSet, Plugin, PluginContext, PluginDescriptor};

const ID: &str = "PowerManager";

#[derive(Debug, Default)]
pub struct PowerManager {
    /// Last published power state; `None` until first computed.
    powered: Option<bool>,
}

impl PowerManager {
    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor::new(ID)
            .depends(&["Menu"])
            .description("Controls Bluetooth adapter power states")
    }

    /// Powered when any adapter reports `Powered`.
    fn current_state(ctx: &PluginContext) -> bool {
        ctx.devices.adapters().any(|adapter| adapter.flag("Powered"))
    }

    fn update(&mut self, ctx: &mut PluginContext) {
        let powered = Self::current_state(ctx);
        if self.powered == Some(powered) {
            return;
        }
        debug!(powered, "Bluetooth power state changed");
        self.powered = Some(powered);

        let item = if powered {
            MenuItem::new(ID, (0, 0), "<b>Turn Bluetooth _Off</b>")
                .icon("bluetooth-disabled-symbolic")
                .tooltip("Turn off all adapters")
                .action(MenuAction::SetPower { state: false })
        } else {
            MenuItem::new(ID, (0, 0), "<b>Turn Bluetooth _On</b>")
                .icon("bluetooth-symbolic")
                .tooltip("Turn on all adapters")
                .action(MenuAction::SetPower { state: true })
        };
        ctx.add_menu_item(item);
        ctx.set_tooltip_title(if powered { "Bluetooth Enabled" } else { "Bluetooth Off" });
    }

    fn request_power_state(&self, ctx: &mut PluginContext, state: bool) {
        ctx.push_effect(Effect::SetRfkillState { state });
    }
}

impl Plugin for PowerManager {
    fn hooks(&self) -> HookSet {
        HookSet::of(&[
            Hook::AdapterAdded,
            Hook::AdapterRemoved,
            Hook::AdapterPropertyChanged,
            Hook::ManagerStateChanged,
            Hook::StatusIconQueryIcon,
        ])
    }

    fn on_load(&mut self, ctx: &mut PluginContext) -> anyhow::Result<()> {
        self.update(ctx);
        Ok(())
    }

    fn on_unload(&mut self, ctx: &mut PluginContext) -> anyhow::Result<()> {
        ctx.unregister_menu(ID);
        Ok(())
    }

    fn on_adapter_added(&mut self, ctx: &mut PluginContext, _path: &ObjectPath) -> anyhow::Result<()> {
        self.update(ctx);
        Ok(())
    }

    fn on_adapter_removed(&mut self, ctx: &mut PluginContext, _path: &ObjectPath) -> anyhow::Result<()> {
        self.update(ctx);
        Ok(())
    }

    fn on_adapter_property_changed(
        &mut self,
        ctx: &mut PluginContext,
        _path: &ObjectPath,
        key: &str,
        _value: &PropertyValue,
    ) -> anyhow::Result<()> {
        if key == "Powered" {
            self.update(ctx);
        }
        Ok(())
    }

    fn on_manager_state_changed(&mut self, ctx: &mut PluginContext, _state: bool) -> anyhow::Result<()> {
        self.update(ctx);
        Ok(())
    }

    fn on_status_icon_query_icon(&self, _ctx: &PluginContext) -> Option<(String, i32)> {
        match self.powered {
            Some(false) => Some(("blueman-disabled".to_string(), 20)),
            _ => None,
        }
    }

    fn ipc_methods(&self) -> &'static [&'static str] {
        &["SetBluetoothStatus", "GetBluetoothStatus"]
    }

    fn call_ipc_method(&mut self, ctx: &mut PluginContext, method: &str, args: &Value) -> anyhow::Result<Value> {
        match method {
            "SetBluetoothStatus" => {
                let state: bool = parse_args(method, args)?;
                self.request_power_state(ctx, state);
                Ok(Value::Null)
            }
            "GetBluetoothStatus" => Ok(json!(self.powered.unwrap_or(false))),
            _ => bail!("method {} is not implemented", method),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::{BluezObject, BluezUpdate, ObjectKind};
    use crate::plugin::AppletSignal;
    use crate::plugins::test_context;

    const HCI0: &str = "/org/bluez/hci0";

    fn power(ctx: &mut PluginContext, powered: bool) {
        ctx.devices.apply(BluezUpdate::ObjectAdded(
            BluezObject::new(HCI0, ObjectKind::Adapter).with("Powered", powered),
        ));
        ctx.devices.apply(BluezUpdate::PropertiesChanged {
            path: HCI0.into(),
            kind: ObjectKind::Adapter,
            changed: vec![("Powered".into(), PropertyValue::Bool(powered))],
        });
    }

    #[test]
    fn tracks_adapter_power() {
        let mut ctx = test_context();
        let mut manager = PowerManager::default();
        manager.on_load(&mut ctx).unwrap();

        assert_eq!(
            manager.on_status_icon_query_icon(&ctx),
            Some(("blueman-disabled".to_string(), 20))
        );
        assert_eq!(ctx.status_icon().tooltip_title, "Bluetooth Off");
        assert_eq!(
            ctx.menu().action_at((0, 0), None),
            Some(&MenuAction::SetPower { state: true })
        );

        power(&mut ctx, true);
        ctx.take_effects();
        manager
            .on_adapter_property_changed(&mut ctx, &HCI0.into(), "Powered", &PropertyValue::Bool(true))
            .unwrap();

        assert_eq!(manager.on_status_icon_query_icon(&ctx), None);
        assert!(ctx
            .take_effects()
            .contains(&Effect::Signal(AppletSignal::ToolTipTitleChanged {
                title: "Bluetooth Enabled".into()
            })));
        assert_eq!(
            manager.call_ipc_method(&mut ctx, "GetBluetoothStatus", &Value::Null).unwrap(),
            json!(true)
        );
    }

    #[test]
    fn unchanged_state_is_quiet() {
        let mut ctx = test_context();
        let mut manager = PowerManager::default();
        manager.on_load(&mut ctx).unwrap();
        ctx.take_effects();

        manager.on_manager_state_changed(&mut ctx, false).unwrap();
        assert!(ctx.take_effects().is_empty());
    }

    #[test]
    fn set_status_goes_through_rfkill() {
        let mut ctx = test_context();
        let mut manager = PowerManager::default();

        manager
            .call_ipc_method(&mut ctx, "SetBluetoothStatus", &json!(false))
            .unwrap();
        assert_eq!(ctx.take_effects(), vec![Effect::SetRfkillState { state: false }]);
        assert!(manager
            .call_ipc_method(&mut ctx, "SetBluetoothStatus", &json!("off"))
            .is_err());
    }
}
