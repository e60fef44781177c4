/*!
 * Systray Device Menu Plugin
 * Connect and disconnect entries for paired and connected devices
 */

use crate::bluetooth::{BluezObject, ObjectPath, PropertyValue};
use crate::menu::{MenuAction, MenuItem, SubmenuItem};
use crate::plugin::{Hook, HookSet, OptionSpec, Plugin, PluginContext, PluginDescriptor};

const ID: &str = "SystrayDeviceMenu";
const CLASSES_OPTION: &str = "allowed-classes";
const APPEARANCES_OPTION: &str = "allowed-appearances";

/// Mouse, keyboard, combo mouse/keyboard.
const DEFAULT_CLASSES: [i64; 3] = [0x000540, 0x000580, 0x0005c0];
/// Mouse, keyboard.
const DEFAULT_APPEARANCES: [i64; 2] = [0x03c1, 0x03c2];

#[derive(Debug, Default)]
pub struct SystrayDeviceMenu;

impl SystrayDeviceMenu {
    pub fn descriptor() -> PluginDescriptor {
        PluginDescriptor::new(ID)
            .depends(&["Menu"])
            .description("Adds a menu entry for each paired device")
            .option(OptionSpec::new(
                CLASSES_OPTION,
                DEFAULT_CLASSES.to_vec(),
                "Allowed device classes",
                "Connected devices of these classes keep their menu entry.",
            ))
            .option(OptionSpec::new(
                APPEARANCES_OPTION,
                DEFAULT_APPEARANCES.to_vec(),
                "Allowed device appearances",
                "Connected devices with these appearances keep their menu entry.",
            ))
    }

    fn is_allowed(ctx: &PluginContext, device: &BluezObject) -> bool {
        let classes = ctx
            .option_ints(ID, CLASSES_OPTION)
            .unwrap_or_else(|| DEFAULT_CLASSES.to_vec());
        let appearances = ctx
            .option_ints(ID, APPEARANCES_OPTION)
            .unwrap_or_else(|| DEFAULT_APPEARANCES.to_vec());

        let class = device.int("Class").unwrap_or(0) & 0xfff;
        if classes.contains(&class) {
            return true;
        }
        device
            .int("Appearance")
            .is_some_and(|appearance| appearances.contains(&appearance))
    }

    fn device_submenu(device: &BluezObject) -> Vec<SubmenuItem> {
        let path = device.path.clone();
        let item = if device.flag("Connected") {
            SubmenuItem {
                text: "Disconnect".to_string(),
                icon_name: Some("bluetooth-disabled-symbolic".to_string()),
                tooltip: None,
                sensitive: true,
                action: Some(MenuAction::DisconnectDevice { path }),
            }
        } else {
            SubmenuItem {
                text: "Connect".to_string(),
                icon_name: Some("bluetooth-symbolic".to_string()),
                tooltip: None,
                sensitive: true,
                action: Some(MenuAction::ConnectDevice { path }),
            }
        };
        vec![item]
    }

    fn rebuild(&self, ctx: &mut PluginContext) {
        ctx.unregister_menu(ID);

        let items: Vec<MenuItem> = ctx
            .devices
            .devices()
            .enumerate()
            .filter(|(_, device)| device.flag("Paired") || device.flag("Connected"))
            .filter(|(_, device)| !device.flag("Connected") || Self::is_allowed(ctx, device))
            .map(|(idx, device)| {
                let mut item = MenuItem::new(ID, (3, idx as u32), device.alias())
                    .submenu(Self::device_submenu(device));
                if let Some(icon) = device.text("Icon") {
                    item = item.icon(icon);
                }
                item
            })
            .collect();

        for item in items {
            ctx.add_menu_item(item);
        }
    }
}

impl Plugin for SystrayDeviceMenu {
    fn hooks(&self) -> HookSet {
        HookSet::of(&[
            Hook::AdapterAdded,
            Hook::AdapterRemoved,
            Hook::DeviceCreated,
            Hook::DeviceRemoved,
            Hook::DevicePropertyChanged,
            Hook::QueryDeviceMenuAllowed,
        ])
    }

    fn on_load(&mut self, ctx: &mut PluginContext) -> anyhow::Result<()> {
        self.rebuild(ctx);
        Ok(())
    }

    fn on_unload(&mut self, ctx: &mut PluginContext) -> anyhow::Result<()> {
        ctx.unregister_menu(ID);
        Ok(())
    }

    fn on_adapter_added(&mut self, ctx: &mut PluginContext, _path: &ObjectPath) -> anyhow::Result<()> {
        self.rebuild(ctx);
        Ok(())
    }

    fn on_adapter_removed(&mut self, ctx: &mut PluginContext, _path: &ObjectPath) -> anyhow::Result<()> {
        self.rebuild(ctx);
        Ok(())
    }

    fn on_device_created(&mut self, ctx: &mut PluginContext, _path: &ObjectPath) -> anyhow::Result<()> {
        self.rebuild(ctx);
        Ok(())
    }

    fn on_device_removed(&mut self, ctx: &mut PluginContext, _path: &ObjectPath) -> anyhow::Result<()> {
        self.rebuild(ctx);
        Ok(())
    }

    fn on_device_property_changed(
        &mut self,
        ctx: &mut PluginContext,
        _path: &ObjectPath,
        key: &str,
        _value: &PropertyValue,
    ) -> anyhow::Result<()> {
        if key == "Connected" {
            self.rebuild(ctx);
        }
        Ok(())
    }

    fn on_query_device_menu_allowed(&self, ctx: &PluginContext, device: &BluezObject) -> Option<(bool, i32)> {
        Some((Self::is_allowed(ctx, device), 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bluetooth::{BluezUpdate, ObjectKind};
    use crate::plugins::test_context;

    fn device(addr: &str, class: i64, paired: bool, connected: bool) -> BluezObject {
        BluezObject::new(format!("/org/bluez/hci0/dev_{}", addr), ObjectKind::Device)
            .with("Alias", addr)
            .with("Class", class)
            .with("Paired", paired)
            .with("Connected", connected)
            .with("Icon", "input-mouse")
    }

    fn context_with(devices: Vec<BluezObject>) -> PluginContext {
        let mut ctx = test_context();
        ctx.register_option_defaults(&SystrayDeviceMenu::descriptor());
        for device in devices {
            ctx.devices.apply(BluezUpdate::ObjectAdded(device));
        }
        ctx
    }

    #[test]
    fn lists_paired_and_allowed_connected_devices() {
        let mut ctx = context_with(vec![
            device("AA", 0x2540, true, false),
            device("BB", 0x0404, false, false),
            device("CC", 0x240404, true, true),
            device("DD", 0x2580, false, true),
        ]);

        SystrayDeviceMenu.on_load(&mut ctx).unwrap();

        let entries: Vec<(&str, (u32, u32))> = ctx
            .menu()
            .items()
            .iter()
            .map(|item| (item.text.as_str(), item.priority))
            .collect();
        assert_eq!(entries, vec![("AA", (3, 0)), ("DD", (3, 3))]);

        let connect = ctx.menu().action_at((3, 0), Some(0)).cloned();
        assert_eq!(
            connect,
            Some(MenuAction::ConnectDevice {
                path: "/org/bluez/hci0/dev_AA".into()
            })
        );
        let disconnect = &ctx.menu().find((3, 3)).unwrap().submenu[0];
        assert_eq!(disconnect.text, "Disconnect");
    }

    #[test]
    fn allow_list_votes_by_class_or_appearance() {
        let ctx = context_with(vec![]);
        let plugin = SystrayDeviceMenu;

        let mouse = device("AA", 0x2580, true, true);
        let headset = device("BB", 0x240404, true, true);
        let ble_keyboard = headset.clone().with("Appearance", 0x03c2i64);

        assert_eq!(plugin.on_query_device_menu_allowed(&ctx, &mouse), Some((true, 0)));
        assert_eq!(plugin.on_query_device_menu_allowed(&ctx, &headset), Some((false, 0)));
        assert_eq!(plugin.on_query_device_menu_allowed(&ctx, &ble_keyboard), Some((true, 0)));
    }

    #[test]
    fn connection_changes_rebuild_entries() {
        let mut ctx = context_with(vec![device("CC", 0x240404, true, false)]);
        let mut plugin = SystrayDeviceMenu;
        plugin.on_load(&mut ctx).unwrap();
        assert_eq!(ctx.menu().items().len(), 1);

        let path = ObjectPath::from("/org/bluez/hci0/dev_CC");
        ctx.devices.apply(BluezUpdate::PropertiesChanged {
            path: path.clone(),
            kind: ObjectKind::Device,
            changed: vec![("Connected".into(), PropertyValue::Bool(true))],
        });
        plugin
            .on_device_property_changed(&mut ctx, &path, "Connected", &PropertyValue::Bool(true))
            .unwrap();

        assert!(ctx.menu().items().is_empty());
    }
}
