/*!
 * Plugin Test Doubles
 * Scriptable plugins for exercising the core
 */

use anyhow::bail;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use super::{Hook, HookSet, Plugin, PluginContext, PluginDescriptor, PluginEntry};
use crate::bluetooth::{BluezObject, ObjectPath, PropertyValue};

/// Registry entry for a plugin that handles nothing.
pub(crate) fn entry(descriptor: PluginDescriptor) -> PluginEntry {
    PluginEntry::new(descriptor, || Ok(Box::new(Inert) as Box<dyn Plugin>))
}

struct Inert;

impl Plugin for Inert {
    fn hooks(&self) -> HookSet {
        HookSet::EMPTY
    }
}

/// How a scripted plugin behaves.
#[derive(Debug, Clone, Default)]
pub(crate) struct Script {
    pub hooks: Vec<Hook>,
    pub fail_factory: bool,
    pub fail_load: bool,
    pub fail_events: bool,
    /// Plugin to unload whenever an event reaches this one.
    pub unload_on_event: Option<String>,
    pub icon: Option<(String, i32)>,
    pub implementation: Option<(String, i32)>,
    pub menu_allowed: Option<(bool, i32)>,
}

impl Script {
    pub fn handling(hooks: &[Hook]) -> Self {
        Self {
            hooks: hooks.to_vec(),
            ..Self::default()
        }
    }
}

/// Shared journal of everything scripted plugins did.
#[derive(Debug, Clone, Default)]
pub(crate) struct Journal {
    log: Rc<RefCell<Vec<String>>>,
    created: Rc<RefCell<HashMap<String, usize>>>,
}

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entry(&self, descriptor: PluginDescriptor, script: Script) -> PluginEntry {
        let journal = self.clone();
        let id = descriptor.id.clone();
        PluginEntry::new(descriptor, move || {
            if script.fail_factory {
                bail!("cannot construct {}", id);
            }
            let instance = {
                let mut created = journal.created.borrow_mut();
                let count = created.entry(id.clone()).or_insert(0);
                *count += 1;
                *count
            };
            Ok(Box::new(Scripted {
                id: id.clone(),
                instance,
                script: script.clone(),
                journal: journal.clone(),
            }) as Box<dyn Plugin>)
        })
    }

    pub fn lines(&self) -> Vec<String> {
        self.log.borrow().clone()
    }

    /// Log lines starting with `prefix`, prefix stripped.
    pub fn matching(&self, prefix: &str) -> Vec<String> {
        self.log
            .borrow()
            .iter()
            .filter_map(|line| line.strip_prefix(prefix).map(str::to_string))
            .collect()
    }

    pub fn clear(&self) {
        self.log.borrow_mut().clear();
    }

    pub fn instances(&self, id: &str) -> usize {
        self.created.borrow().get(id).copied().unwrap_or(0)
    }

    fn record(&self, line: String) {
        self.log.borrow_mut().push(line);
    }
}

struct Scripted {
    id: String,
    instance: usize,
    script: Script,
    journal: Journal,
}

impl Scripted {
    fn event(&self, ctx: &mut PluginContext, hook: &str) -> anyhow::Result<()> {
        self.journal.record(format!("{}:{}#{}", hook, self.id, self.instance));
        if let Some(target) = &self.script.unload_on_event {
            ctx.request_unload(target);
        }
        if self.script.fail_events {
            bail!("{} refused {}", self.id, hook);
        }
        Ok(())
    }
}

impl Plugin for Scripted {
    fn hooks(&self) -> HookSet {
        HookSet::of(&self.script.hooks)
    }

    fn on_load(&mut self, _ctx: &mut PluginContext) -> anyhow::Result<()> {
        self.journal.record(format!("load:{}", self.id));
        if self.script.fail_load {
            bail!("{} failed to start", self.id);
        }
        Ok(())
    }

    fn on_unload(&mut self, _ctx: &mut PluginContext) -> anyhow::Result<()> {
        self.journal.record(format!("unload:{}", self.id));
        Ok(())
    }

    fn on_plugins_loaded(&mut self, ctx: &mut PluginContext) -> anyhow::Result<()> {
        self.event(ctx, "plugins_loaded")
    }

    fn on_adapter_added(&mut self, ctx: &mut PluginContext, _path: &ObjectPath) -> anyhow::Result<()> {
        self.event(ctx, "adapter_added")
    }

    fn on_adapter_removed(&mut self, ctx: &mut PluginContext, _path: &ObjectPath) -> anyhow::Result<()> {
        self.event(ctx, "adapter_removed")
    }

    fn on_device_created(&mut self, ctx: &mut PluginContext, _path: &ObjectPath) -> anyhow::Result<()> {
        self.event(ctx, "device_created")
    }

    fn on_device_removed(&mut self, ctx: &mut PluginContext, _path: &ObjectPath) -> anyhow::Result<()> {
        self.event(ctx, "device_removed")
    }

    fn on_adapter_property_changed(
        &mut self,
        ctx: &mut PluginContext,
        _path: &ObjectPath,
        _key: &str,
        _value: &PropertyValue,
    ) -> anyhow::Result<()> {
        self.event(ctx, "adapter_property_changed")
    }

    fn on_device_property_changed(
        &mut self,
        ctx: &mut PluginContext,
        _path: &ObjectPath,
        _key: &str,
        _value: &PropertyValue,
    ) -> anyhow::Result<()> {
        self.event(ctx, "device_property_changed")
    }

    fn on_manager_state_changed(&mut self, ctx: &mut PluginContext, _state: bool) -> anyhow::Result<()> {
        self.event(ctx, "manager_state_changed")
    }

    fn on_query_status_icon_implementation(&self, _ctx: &PluginContext) -> Option<(String, i32)> {
        self.script.implementation.clone()
    }

    fn on_status_icon_query_icon(&self, _ctx: &PluginContext) -> Option<(String, i32)> {
        self.script.icon.clone()
    }

    fn on_query_device_menu_allowed(&self, _ctx: &PluginContext, _device: &BluezObject) -> Option<(bool, i32)> {
        self.script.menu_allowed
    }
}
