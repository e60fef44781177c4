/*!
 * Plugin Loader
 * Dependency ordering and lifecycle
 *
 * Every plugin moves through
 * `Unloaded -> Loading -> {Loaded | Failed} -> Unloading -> Unloaded`.
 * A plugin only reaches `Loaded` once all of its dependencies are `Loaded`,
 * and a `Loaded` plugin always sees `on_unload` before its instance is dropped.
 */

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use tracing::{debug, error, info, warn};

use super::{Plugin, PluginContext, PluginDescriptor, PluginRegistry};
use crate::error::PluginError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginState {
    Unloaded,
    Loading,
    Loaded,
    Failed,
    Unloading,
}

struct LoadedPlugin {
    descriptor: PluginDescriptor,
    instance: Option<Box<dyn Plugin>>,
    state: PluginState,
    loaded_at: Option<DateTime<Utc>>,
    error: Option<String>,
}

impl LoadedPlugin {
    fn new(descriptor: PluginDescriptor, state: PluginState) -> Self {
        Self {
            descriptor,
            instance: None,
            state,
            loaded_at: None,
            error: None,
        }
    }
}

/// Plugin listing entry reported over IPC.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginSummary {
    pub id: String,
    pub description: String,
    pub author: String,
    pub depends: Vec<String>,
    pub enabled: bool,
    pub hidden: bool,
    pub unloadable: bool,
    pub state: PluginState,
    pub loaded_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

pub struct PluginLoader {
    registry: PluginRegistry,
    plugins: HashMap<String, LoadedPlugin>,
    /// Identifiers of `Loaded` plugins, in load order.
    order: Vec<String>,
}

impl PluginLoader {
    pub fn new(registry: PluginRegistry) -> Self {
        Self {
            registry,
            plugins: HashMap::new(),
            order: Vec::new(),
        }
    }

    /// Topological order of every enabled plugin. Plugins that do not depend
    /// on each other keep their registration order.
    pub fn resolve_order(&self) -> Result<Vec<String>, PluginError> {
        let candidates = self.registry.loadable();
        let known: HashSet<&str> = candidates.iter().map(|d| d.id.as_str()).collect();

        for descriptor in &candidates {
            if let Some(missing) = descriptor.depends.iter().find(|dep| !known.contains(dep.as_str())) {
                return Err(PluginError::UnresolvedDependency {
                    plugin: descriptor.id.clone(),
                    dependency: missing.clone(),
                });
            }
        }

        let mut placed: HashSet<&str> = HashSet::new();
        let mut order = Vec::with_capacity(candidates.len());

        while order.len() < candidates.len() {
            let ready = candidates.iter().find(|d| {
                !placed.contains(d.id.as_str()) && d.depends.iter().all(|dep| placed.contains(dep.as_str()))
            });

            match ready {
                Some(descriptor) => {
                    placed.insert(descriptor.id.as_str());
                    order.push(descriptor.id.clone());
                }
                None => {
                    let remaining: Vec<&PluginDescriptor> = candidates
                        .iter()
                        .copied()
                        .filter(|d| !placed.contains(d.id.as_str()))
                        .collect();
                    return Err(PluginError::DependencyCycle {
                        plugins: find_cycle(&remaining),
                    });
                }
            }
        }

        Ok(order)
    }

    /// Loads every enabled plugin in dependency order.
    ///
    /// Structural errors abort before anything is instantiated. Individual
    /// load failures are logged and leave the plugin `Failed`.
    pub fn load_all(&mut self, ctx: &mut PluginContext) -> Result<Vec<String>, PluginError> {
        let order = self.resolve_order()?;
        info!(order = ?order, "Loading plugins");

        for id in &order {
            // Failures are recorded on the plugin and already logged.
            let _ = self.load_one(id, ctx);
        }

        info!(loaded = self.order.len(), total = order.len(), "Plugins loaded");
        Ok(self.order.clone())
    }

    /// Loads one registered plugin, loading its dependencies first.
    pub fn load_plugin(&mut self, id: &str, ctx: &mut PluginContext) -> Result<(), PluginError> {
        let mut visiting = Vec::new();
        self.load_with_dependencies(id, ctx, &mut visiting)
    }

    fn load_with_dependencies(
        &mut self,
        id: &str,
        ctx: &mut PluginContext,
        visiting: &mut Vec<String>,
    ) -> Result<(), PluginError> {
        if self.is_loaded(id) {
            return Ok(());
        }
        if let Some(pos) = visiting.iter().position(|v| v == id) {
            let mut plugins = visiting[pos..].to_vec();
            plugins.push(id.to_string());
            return Err(PluginError::DependencyCycle { plugins });
        }

        let depends = self
            .registry
            .get(id)
            .ok_or_else(|| PluginError::UnknownPlugin(id.to_string()))?
            .descriptor
            .depends
            .clone();

        visiting.push(id.to_string());
        for dependency in &depends {
            if !self.registry.contains(dependency) {
                return Err(PluginError::UnresolvedDependency {
                    plugin: id.to_string(),
                    dependency: dependency.clone(),
                });
            }
            self.load_with_dependencies(dependency, ctx, visiting)?;
        }
        visiting.pop();

        self.load_one(id, ctx)
    }

    fn load_one(&mut self, id: &str, ctx: &mut PluginContext) -> Result<(), PluginError> {
        if self.is_loaded(id) {
            return Ok(());
        }

        let descriptor = self
            .registry
            .get(id)
            .ok_or_else(|| PluginError::UnknownPlugin(id.to_string()))?
            .descriptor
            .clone();

        if let Some(missing) = descriptor.depends.iter().find(|dep| !self.is_loaded(dep)) {
            let reason = format!("dependency {} is not loaded", missing);
            return Err(self.fail(descriptor, reason));
        }

        debug!(plugin_id = %id, "Loading plugin");
        self.plugins
            .insert(id.to_string(), LoadedPlugin::new(descriptor.clone(), PluginState::Loading));
        ctx.register_option_defaults(&descriptor);

        let created = self
            .registry
            .get(id)
            .ok_or_else(|| PluginError::UnknownPlugin(id.to_string()))?
            .instantiate();

        let mut instance = match created {
            Ok(instance) => instance,
            Err(e) => return Err(self.fail(descriptor, format!("{:#}", e))),
        };

        if let Err(e) = instance.on_load(ctx) {
            return Err(self.fail(descriptor, format!("{:#}", e)));
        }

        self.plugins.insert(
            id.to_string(),
            LoadedPlugin {
                descriptor,
                instance: Some(instance),
                state: PluginState::Loaded,
                loaded_at: Some(Utc::now()),
                error: None,
            },
        );
        self.order.push(id.to_string());
        info!(plugin_id = %id, "Plugin loaded");
        Ok(())
    }

    fn fail(&mut self, descriptor: PluginDescriptor, reason: String) -> PluginError {
        error!(plugin_id = %descriptor.id, "Plugin failed to load: {}", reason);
        let err = PluginError::PluginLoadFailure {
            plugin: descriptor.id.clone(),
            reason: reason.clone(),
        };
        let mut record = LoadedPlugin::new(descriptor, PluginState::Failed);
        record.error = Some(reason);
        self.plugins.insert(record.descriptor.id.clone(), record);
        err
    }

    /// Unloads a plugin together with every loaded plugin that depends on it,
    /// dependents first. Returns the unloaded identifiers in load order.
    pub fn unload_plugin(&mut self, id: &str, ctx: &mut PluginContext) -> Result<Vec<String>, PluginError> {
        let entry = self
            .registry
            .get(id)
            .ok_or_else(|| PluginError::UnknownPlugin(id.to_string()))?;
        if !entry.descriptor.unloadable {
            return Err(PluginError::NotUnloadable(id.to_string()));
        }
        if !self.is_loaded(id) {
            return Ok(Vec::new());
        }

        let affected = self.dependents_of(id);
        if let Some(pinned) = affected
            .iter()
            .find(|dep| self.plugins.get(*dep).is_some_and(|p| !p.descriptor.unloadable))
        {
            return Err(PluginError::NotUnloadable(pinned.clone()));
        }

        for dependent in affected.iter().rev() {
            self.unload_one(dependent, ctx);
        }
        Ok(affected)
    }

    /// Unloads everything in reverse load order and forgets all plugin state.
    pub fn unload_all(&mut self, ctx: &mut PluginContext) {
        let order = self.order.clone();
        for id in order.iter().rev() {
            self.unload_one(id, ctx);
        }
        self.plugins.clear();
        self.order.clear();
    }

    fn unload_one(&mut self, id: &str, ctx: &mut PluginContext) {
        let Some(record) = self.plugins.get_mut(id) else {
            return;
        };
        if record.state != PluginState::Loaded {
            return;
        }

        record.state = PluginState::Unloading;
        if let Some(mut instance) = record.instance.take() {
            if let Err(e) = instance.on_unload(ctx) {
                warn!(plugin_id = %id, "Plugin unload failed: {:#}", e);
            }
        }
        record.state = PluginState::Unloaded;
        record.loaded_at = None;

        self.order.retain(|loaded| loaded != id);
        info!(plugin_id = %id, "Plugin unloaded");
    }

    /// `id` and every loaded plugin transitively depending on it, in load order.
    fn dependents_of(&self, id: &str) -> Vec<String> {
        let mut affected: Vec<String> = Vec::new();
        for loaded in &self.order {
            let depends_on_affected = self
                .plugins
                .get(loaded)
                .is_some_and(|p| p.descriptor.depends.iter().any(|dep| affected.contains(dep)));
            if loaded == id || depends_on_affected {
                affected.push(loaded.clone());
            }
        }
        affected
    }

    pub fn state(&self, id: &str) -> PluginState {
        self.plugins
            .get(id)
            .map(|p| p.state)
            .unwrap_or(PluginState::Unloaded)
    }

    pub fn is_loaded(&self, id: &str) -> bool {
        self.state(id) == PluginState::Loaded
    }

    pub fn load_order(&self) -> &[String] {
        &self.order
    }

    pub fn get(&self, id: &str) -> Option<&(dyn Plugin + 'static)> {
        self.plugins
            .get(id)
            .filter(|p| p.state == PluginState::Loaded)?
            .instance
            .as_deref()
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut (dyn Plugin + 'static)> {
        self.plugins
            .get_mut(id)
            .filter(|p| p.state == PluginState::Loaded)?
            .instance
            .as_deref_mut()
    }

    /// Loaded plugins in load order.
    pub fn loaded(&self) -> impl Iterator<Item = (&str, &(dyn Plugin + 'static))> + '_ {
        self.order
            .iter()
            .filter_map(move |id| self.get(id).map(|plugin| (id.as_str(), plugin)))
    }

    pub fn summaries(&self) -> Vec<PluginSummary> {
        self.registry
            .list_all()
            .into_iter()
            .map(|descriptor| {
                let record = self.plugins.get(&descriptor.id);
                PluginSummary {
                    id: descriptor.id.clone(),
                    description: descriptor.description.clone(),
                    author: descriptor.author.clone(),
                    depends: descriptor.depends.clone(),
                    enabled: descriptor.enabled,
                    hidden: descriptor.hidden,
                    unloadable: descriptor.unloadable,
                    state: record.map(|r| r.state).unwrap_or(PluginState::Unloaded),
                    loaded_at: record.and_then(|r| r.loaded_at),
                    error: record.and_then(|r| r.error.clone()),
                }
            })
            .collect()
    }
}

/// Walks unplaced dependencies until a plugin repeats. Every remaining
/// plugin has at least one remaining dependency, so the walk closes a cycle.
fn find_cycle(remaining: &[&PluginDescriptor]) -> Vec<String> {
    let lookup: HashMap<&str, &PluginDescriptor> =
        remaining.iter().map(|d| (d.id.as_str(), *d)).collect();

    let Some(first) = remaining.first() else {
        return Vec::new();
    };

    let mut path: Vec<&str> = Vec::new();
    let mut current = first.id.as_str();
    loop {
        if let Some(pos) = path.iter().position(|id| *id == current) {
            let mut cycle: Vec<String> = path[pos..].iter().map(|id| id.to_string()).collect();
            cycle.push(current.to_string());
            return cycle;
        }
        path.push(current);

        let next = lookup
            .get(current)
            .and_then(|d| d.depends.iter().find(|dep| lookup.contains_key(dep.as_str())));
        match next {
            Some(dep) => current = dep.as_str(),
            None => return path.iter().map(|id| id.to_string()).collect(),
        }
    }
}
