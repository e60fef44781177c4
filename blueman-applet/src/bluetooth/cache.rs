/*!
 * Device Cache
 * Last known BlueZ objects and the events their changes raise
 */

use std::collections::BTreeMap;

use super::{BluezObject, BluezUpdate, ObjectKind, ObjectPath, PropertyValue};
use crate::plugin::AppletEvent;

/// Last known state of every BlueZ adapter and device.
///
/// `apply` folds a raw update into the cache and returns the plugin events it
/// implies, in the order they must be dispatched.
#[derive(Debug, Clone, Default)]
pub struct DeviceCache {
    objects: BTreeMap<ObjectPath, BluezObject>,
    manager_up: bool,
}

impl DeviceCache {
    pub fn manager_up(&self) -> bool {
        self.manager_up
    }

    pub fn get(&self, path: &ObjectPath) -> Option<&BluezObject> {
        self.objects.get(path)
    }

    pub fn adapters(&self) -> impl Iterator<Item = &BluezObject> {
        self.objects
            .values()
            .filter(|object| object.kind == ObjectKind::Adapter)
    }

    pub fn devices(&self) -> impl Iterator<Item = &BluezObject> {
        self.objects
            .values()
            .filter(|object| object.kind == ObjectKind::Device)
    }

    pub fn is_device_blocked(&self, path: &ObjectPath) -> bool {
        self.get(path).map(|device| device.flag("Blocked")).unwrap_or(false)
    }

    pub fn apply(&mut self, update: BluezUpdate) -> Vec<AppletEvent> {
        match update {
            BluezUpdate::ObjectAdded(object) => self.insert(object),
            BluezUpdate::ObjectRemoved { path, kind } => self.remove(&path, kind),
            BluezUpdate::PropertiesChanged {
                path,
                kind,
                changed,
            } => self.update_properties(path, kind, changed),
            BluezUpdate::Snapshot(objects) => self.resync(objects),
            BluezUpdate::ManagerState(up) => self.set_manager_state(up),
        }
    }

    fn insert(&mut self, object: BluezObject) -> Vec<AppletEvent> {
        let path = object.path.clone();
        let kind = object.kind;
        if self.objects.insert(path.clone(), object).is_some() {
            return Vec::new();
        }
        vec![added_event(kind, path)]
    }

    fn remove(&mut self, path: &ObjectPath, kind: ObjectKind) -> Vec<AppletEvent> {
        match self.objects.get(path) {
            Some(object) if object.kind == kind => {
                self.objects.remove(path);
                vec![removed_event(kind, path.clone())]
            }
            _ => Vec::new(),
        }
    }

    fn update_properties(
        &mut self,
        path: ObjectPath,
        kind: ObjectKind,
        changed: Vec<(String, PropertyValue)>,
    ) -> Vec<AppletEvent> {
        if let Some(object) = self.objects.get_mut(&path) {
            for (key, value) in &changed {
                object.properties.insert(key.clone(), value.clone());
            }
        }

        changed
            .into_iter()
            .map(|(key, value)| property_event(kind, path.clone(), key, value))
            .collect()
    }

    fn resync(&mut self, objects: Vec<BluezObject>) -> Vec<AppletEvent> {
        let fresh: BTreeMap<ObjectPath, BluezObject> = objects
            .into_iter()
            .map(|object| (object.path.clone(), object))
            .collect();
        let mut events = Vec::new();

        // Devices go before their adapters on removal, after them on addition.
        for kind in [ObjectKind::Device, ObjectKind::Adapter] {
            for object in self.objects.values().filter(|o| o.kind == kind) {
                if !fresh.contains_key(&object.path) {
                    events.push(removed_event(kind, object.path.clone()));
                }
            }
        }

        for kind in [ObjectKind::Adapter, ObjectKind::Device] {
            for object in fresh.values().filter(|o| o.kind == kind) {
                match self.objects.get(&object.path) {
                    None => events.push(added_event(kind, object.path.clone())),
                    Some(old) => {
                        for (key, value) in &object.properties {
                            if old.properties.get(key) != Some(value) {
                                events.push(property_event(
                                    kind,
                                    object.path.clone(),
                                    key.clone(),
                                    value.clone(),
                                ));
                            }
                        }
                    }
                }
            }
        }

        self.objects = fresh;
        events
    }

    fn set_manager_state(&mut self, up: bool) -> Vec<AppletEvent> {
        if up == self.manager_up {
            return Vec::new();
        }
        self.manager_up = up;

        let mut events = Vec::new();
        if !up {
            events = self.resync(Vec::new());
        }
        events.push(AppletEvent::ManagerStateChanged(up));
        events
    }
}

fn added_event(kind: ObjectKind, path: ObjectPath) -> AppletEvent {
    match kind {
        ObjectKind::Adapter => AppletEvent::AdapterAdded(path),
        ObjectKind::Device => AppletEvent::DeviceCreated(path),
    }
}

fn removed_event(kind: ObjectKind, path: ObjectPath) -> AppletEvent {
    match kind {
        ObjectKind::Adapter => AppletEvent::AdapterRemoved(path),
        ObjectKind::Device => AppletEvent::DeviceRemoved(path),
    }
}

fn property_event(kind: ObjectKind, path: ObjectPath, key: String, value: PropertyValue) -> AppletEvent {
    match kind {
        ObjectKind::Adapter => AppletEvent::AdapterPropertyChanged { path, key, value },
        ObjectKind::Device => AppletEvent::DevicePropertyChanged { path, key, value },
    }
}
