/*!
 * BlueZ D-Bus Client
 * Object snapshots, change signals and device actions on the system bus
 */

use anyhow::{anyhow, Result};
use dbus::arg::{ArgType, PropMap, RefArg};
use dbus::message::MatchRule;
use dbus::nonblock::stdintf::org_freedesktop_dbus::ObjectManager;
use dbus::nonblock::{MsgMatch, Proxy, SyncConnection};
use dbus::Message;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::rfkill;
use super::{BluezObject, BluezUpdate, ObjectKind, ObjectPath, PropertyValue, ADAPTER_INTERFACE, DEVICE_INTERFACE};

pub const BLUEZ_SERVICE: &str = "org.bluez";

const BUS_SERVICE: &str = "org.freedesktop.DBus";
const BUS_PATH: &str = "/org/freedesktop/DBus";
const OBJECT_MANAGER_INTERFACE: &str = "org.freedesktop.DBus.ObjectManager";
const PROPERTIES_INTERFACE: &str = "org.freedesktop.DBus.Properties";

#[derive(Clone)]
pub struct BluetoothManager {
    conn: Arc<SyncConnection>,
    timeout: Duration,
}

/// Keeps BlueZ signal subscriptions alive. Dropping it stops resyncs.
pub struct BluezWatch {
    _matches: Vec<MsgMatch>,
    resync: JoinHandle<()>,
}

impl Drop for BluezWatch {
    fn drop(&mut self) {
        self.resync.abort();
    }
}

impl BluetoothManager {
    /// Opens a system bus connection. Must be called inside the tokio runtime.
    pub fn connect(timeout: Duration) -> Result<Self> {
        let (resource, conn) = dbus_tokio::connection::new_system_sync()?;

        tokio::spawn(async move {
            let err = resource.await;
            error!("Lost connection to the system bus: {}", err);
        });

        Ok(Self { conn, timeout })
    }

    fn proxy(&self, destination: &'static str, path: &str) -> Result<Proxy<'static, Arc<SyncConnection>>> {
        let path = dbus::Path::new(path.to_string()).map_err(|e| anyhow!("invalid object path: {}", e))?;
        Ok(Proxy::new(destination, path, self.timeout, self.conn.clone()))
    }

    /// Every adapter and device BlueZ currently exports.
    pub async fn managed_objects(&self) -> Result<Vec<BluezObject>> {
        let proxy = self.proxy(BLUEZ_SERVICE, "/")?;
        let managed = proxy.get_managed_objects().await?;

        let mut objects: Vec<BluezObject> = managed
            .iter()
            .flat_map(|(path, interfaces)| objects_from(path, interfaces))
            .collect();
        objects.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(objects)
    }

    pub async fn name_has_owner(&self) -> Result<bool> {
        let proxy = self.proxy(BUS_SERVICE, BUS_PATH)?;
        let (has_owner,): (bool,) = proxy
            .method_call(BUS_SERVICE, "NameHasOwner", (BLUEZ_SERVICE,))
            .await?;
        Ok(has_owner)
    }

    /// Polls until an adapter is registered and Bluetooth is not soft-blocked,
    /// at most `max_retries` times one second apart, then returns whatever
    /// BlueZ exports.
    async fn wait_for_adapter(&self, max_retries: u32, rfkill_class: &Path) -> Result<Vec<BluezObject>> {
        let mut attempt = 0;
        loop {
            let objects = self.managed_objects().await?;
            let adapter = objects.iter().any(|o| o.kind == ObjectKind::Adapter);
            let unblocked = rfkill::soft_unblocked(rfkill_class);
            if adapter && unblocked {
                debug!("Adapter registered and unblocked");
                return Ok(objects);
            }
            attempt += 1;
            if attempt >= max_retries {
                warn!(adapter, unblocked, "Maximum retries reached: adapter not found or still blocked");
                return Ok(objects);
            }
            debug!(attempt, adapter, unblocked, "Waiting for adapter");
            tokio::time::sleep(Duration::from_secs(1)).await;
        }
    }

    /// Subscribes to BlueZ object and property signals and forwards them as
    /// [`BluezUpdate`]s. A full snapshot follows every appearance of the
    /// `org.bluez` name, including the initial one.
    pub async fn watch<M>(
        &self,
        tx: mpsc::UnboundedSender<M>,
        max_retries: u32,
        rfkill_class: impl Into<PathBuf>,
    ) -> Result<BluezWatch>
    where
        M: From<BluezUpdate> + Send + 'static,
    {
        let mut matches = Vec::new();

        let sender = tx.clone();
        let rule = MatchRule::new_signal(OBJECT_MANAGER_INTERFACE, "InterfacesAdded").with_sender(BLUEZ_SERVICE);
        matches.push(self.conn.add_match(rule).await?.cb(
            move |_: Message, (path, interfaces): (dbus::Path<'static>, HashMap<String, PropMap>)| {
                for object in objects_from(&path, &interfaces) {
                    let _ = sender.send(BluezUpdate::ObjectAdded(object).into());
                }
                true
            },
        ));

        let sender = tx.clone();
        let rule = MatchRule::new_signal(OBJECT_MANAGER_INTERFACE, "InterfacesRemoved").with_sender(BLUEZ_SERVICE);
        matches.push(self.conn.add_match(rule).await?.cb(
            move |_: Message, (path, interfaces): (dbus::Path<'static>, Vec<String>)| {
                for kind in interfaces.iter().filter_map(|i| ObjectKind::from_interface(i)) {
                    let path = ObjectPath::new(path.to_string());
                    let _ = sender.send(BluezUpdate::ObjectRemoved { path, kind }.into());
                }
                true
            },
        ));

        let sender = tx.clone();
        let rule = MatchRule::new_signal(PROPERTIES_INTERFACE, "PropertiesChanged").with_sender(BLUEZ_SERVICE);
        matches.push(self.conn.add_match(rule).await?.cb(
            move |msg: Message, (interface, changed, _invalidated): (String, PropMap, Vec<String>)| {
                let (Some(kind), Some(path)) = (ObjectKind::from_interface(&interface), msg.path()) else {
                    return true;
                };
                let mut changed: Vec<(String, PropertyValue)> = changed
                    .iter()
                    .filter_map(|(key, value)| property_value(&*value.0).map(|v| (key.clone(), v)))
                    .collect();
                changed.sort_by(|a, b| a.0.cmp(&b.0));

                let update = BluezUpdate::PropertiesChanged {
                    path: ObjectPath::new(path.to_string()),
                    kind,
                    changed,
                };
                let _ = sender.send(update.into());
                true
            },
        ));

        let (resync_tx, resync_rx) = mpsc::unbounded_channel();
        let owner_changes = resync_tx.clone();
        let rule = MatchRule::new_signal(BUS_SERVICE, "NameOwnerChanged").with_sender(BUS_SERVICE);
        matches.push(self.conn.add_match(rule).await?.cb(
            move |_: Message, (name, _old, new): (String, String, String)| {
                if name == BLUEZ_SERVICE {
                    let _ = owner_changes.send(!new.is_empty());
                }
                true
            },
        ));

        let resync = tokio::spawn(resync_loop(self.clone(), resync_rx, tx, max_retries, rfkill_class.into()));

        if self.name_has_owner().await? {
            let _ = resync_tx.send(true);
        } else {
            info!("BlueZ is not running yet");
        }

        Ok(BluezWatch {
            _matches: matches,
            resync,
        })
    }

    pub async fn connect_device(&self, device: &ObjectPath) -> Result<()> {
        let proxy = self.proxy(BLUEZ_SERVICE, device.as_str())?;
        let _: () = proxy.method_call(DEVICE_INTERFACE, "Connect", ()).await?;
        info!(device = %device, "Device connected");
        Ok(())
    }

    pub async fn disconnect_device(&self, device: &ObjectPath) -> Result<()> {
        let proxy = self.proxy(BLUEZ_SERVICE, device.as_str())?;
        let _: () = proxy.method_call(DEVICE_INTERFACE, "Disconnect", ()).await?;
        info!(device = %device, "Device disconnected");
        Ok(())
    }

    pub async fn remove_device(&self, adapter: &ObjectPath, device: &ObjectPath) -> Result<()> {
        let proxy = self.proxy(BLUEZ_SERVICE, adapter.as_str())?;
        let target = dbus::Path::new(device.to_string()).map_err(|e| anyhow!("invalid object path: {}", e))?;
        let _: () = proxy.method_call(ADAPTER_INTERFACE, "RemoveDevice", (target,)).await?;
        info!(adapter = %adapter, device = %device, "Device removed");
        Ok(())
    }
}

async fn resync_loop<M>(
    manager: BluetoothManager,
    mut owner_changes: mpsc::UnboundedReceiver<bool>,
    tx: mpsc::UnboundedSender<M>,
    max_retries: u32,
    rfkill_class: PathBuf,
) where
    M: From<BluezUpdate> + Send + 'static,
{
    while let Some(up) = owner_changes.recv().await {
        if !up {
            warn!("BlueZ left the bus");
            if tx.send(BluezUpdate::ManagerState(false).into()).is_err() {
                break;
            }
            continue;
        }

        info!("BlueZ appeared on the bus");
        match manager.wait_for_adapter(max_retries, &rfkill_class).await {
            Ok(objects) => {
                debug!(objects = objects.len(), "BlueZ snapshot");
                let sent = tx
                    .send(BluezUpdate::ManagerState(true).into())
                    .and_then(|_| tx.send(BluezUpdate::Snapshot(objects).into()));
                if sent.is_err() {
                    break;
                }
            }
            Err(e) => error!("Failed to read BlueZ objects: {}", e),
        }
    }
}

fn objects_from(path: &dbus::Path<'_>, interfaces: &HashMap<String, PropMap>) -> Vec<BluezObject> {
    interfaces
        .iter()
        .filter_map(|(interface, properties)| {
            let kind = ObjectKind::from_interface(interface)?;
            let mut object = BluezObject::new(path.to_string(), kind);
            for (key, value) in properties {
                if let Some(value) = property_value(&*value.0) {
                    object.properties.insert(key.clone(), value);
                }
            }
            Some(object)
        })
        .collect()
}

/// Narrows a D-Bus value to the property shapes plugins look at.
fn property_value(value: &dyn RefArg) -> Option<PropertyValue> {
    match value.arg_type() {
        ArgType::Boolean => value.as_i64().map(|v| v != 0).map(PropertyValue::Bool),
        ArgType::String | ArgType::ObjectPath | ArgType::Signature => value.as_str().map(PropertyValue::from),
        ArgType::Array => value.as_iter().map(|items| {
            PropertyValue::Strings(items.filter_map(|item| item.as_str().map(str::to_string)).collect())
        }),
        ArgType::Variant => value.as_iter().and_then(|mut inner| inner.next().and_then(property_value)),
        _ => value
            .as_i64()
            .or_else(|| value.as_u64().map(|v| v as i64))
            .map(PropertyValue::Int),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbus::arg::Variant;

    fn variant<T: RefArg + 'static>(value: T) -> Variant<Box<dyn RefArg>> {
        Variant(Box::new(value))
    }

    #[test]
    fn property_values_narrow_by_type() {
        assert_eq!(property_value(&true), Some(PropertyValue::Bool(true)));
        assert_eq!(property_value(&false), Some(PropertyValue::Bool(false)));
        assert_eq!(property_value(&variant(true)), Some(PropertyValue::Bool(true)));
        assert_eq!(property_value(&0x2540u32), Some(PropertyValue::Int(0x2540)));
        assert_eq!(property_value(&-60i16), Some(PropertyValue::Int(-60)));
        assert_eq!(property_value(&"Mouse".to_string()), Some(PropertyValue::from("Mouse")));
        assert_eq!(
            property_value(&vec!["0000110b-0000-1000-8000-00805f9b34fb".to_string()]),
            Some(PropertyValue::Strings(vec!["0000110b-0000-1000-8000-00805f9b34fb".into()]))
        );
    }

    #[test]
    fn interfaces_become_objects() {
        let mut device: PropMap = HashMap::new();
        device.insert("Alias".into(), variant("Mouse".to_string()));
        device.insert("Connected".into(), variant(false));
        device.insert("Adapter".into(), variant(dbus::Path::from("/org/bluez/hci0")));

        let mut interfaces = HashMap::new();
        interfaces.insert(DEVICE_INTERFACE.to_string(), device);
        interfaces.insert("org.bluez.MediaControl1".to_string(), PropMap::new());

        let path = dbus::Path::from("/org/bluez/hci0/dev_00_11_22_33_44_55");
        let objects = objects_from(&path, &interfaces);

        assert_eq!(objects.len(), 1);
        let mouse = &objects[0];
        assert_eq!(mouse.kind, ObjectKind::Device);
        assert_eq!(mouse.alias(), "Mouse");
        assert!(!mouse.flag("Connected"));
        assert_eq!(mouse.adapter(), Some(ObjectPath::from("/org/bluez/hci0")));
    }
}
