use thiserror::Error;

use crate::plugin::Hook;

/// Failures of the plugin core.
///
/// `UnresolvedDependency` and `DependencyCycle` are structural and abort a
/// full load. Load and handler failures are isolated to a single plugin.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PluginError {
    #[error("plugin {plugin} depends on {dependency}, which is not available")]
    UnresolvedDependency { plugin: String, dependency: String },

    #[error("plugin dependency cycle: {}", plugins.join(" -> "))]
    DependencyCycle { plugins: Vec<String> },

    #[error("plugin {plugin} failed to load: {reason}")]
    PluginLoadFailure { plugin: String, reason: String },

    #[error("plugin {plugin} failed in {hook}: {reason}")]
    HandlerFailure {
        plugin: String,
        hook: Hook,
        reason: String,
    },

    #[error("plugin {plugin} is already registered with different dependencies")]
    DuplicateIdentifier { plugin: String },

    #[error("unknown plugin {0}")]
    UnknownPlugin(String),

    #[error("plugin {0} cannot be unloaded")]
    NotUnloadable(String),

    #[error("no loaded plugin provides method {0}")]
    UnknownMethod(String),

    #[error("invalid arguments for {method}: {reason}")]
    InvalidArguments { method: String, reason: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cycle_lists_members_in_order() {
        let err = PluginError::DependencyCycle {
            plugins: vec!["A".into(), "B".into(), "A".into()],
        };
        assert_eq!(err.to_string(), "plugin dependency cycle: A -> B -> A");
    }

    #[test]
    fn handler_failure_names_the_hook() {
        let err = PluginError::HandlerFailure {
            plugin: "PowerManager".into(),
            hook: Hook::DeviceRemoved,
            reason: "boom".into(),
        };
        assert_eq!(err.to_string(), "plugin PowerManager failed in on_device_removed: boom");
    }
}
