use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;

/// Environment variables that override `general.save_script`, first match wins.
/// `ASTC_SAVE_SCRIPT` is the name older deployments set.
pub const SAVE_SCRIPT_ENV: [&str; 2] = ["BLUEMAN_SAVE_SCRIPT", "ASTC_SAVE_SCRIPT"];

/// Adapter polls before reporting the manager as up.
pub const DEFAULT_MAX_RETRIES: u32 = 5;

#[derive(Debug, Deserialize, Serialize)]
pub struct AppletConfig {
    pub socket_path: String,
    pub mechanism_socket: String,
    pub plugins: PluginsConfig,
    /// Per-plugin option tables, keyed by plugin identifier.
    #[serde(default)]
    pub plugin_options: HashMap<String, toml::Table>,
    pub general: GeneralConfig,
    pub bluetooth: BluetoothConfig,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PluginsConfig {
    /// When set, only these plugins are enabled.
    pub enabled: Option<Vec<String>>,
    #[serde(default)]
    pub disabled: Vec<String>,
    #[serde(default)]
    pub hidden: Vec<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct GeneralConfig {
    pub symbolic_status_icons: bool,
    /// Device manager command line.
    pub manager_command: Vec<String>,
    /// Tray frontend launched once BlueZ is up.
    pub tray_command: Vec<String>,
    pub save_script: Option<String>,
    pub script_interpreter: String,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct BluetoothConfig {
    /// Adapter polls before reporting the manager as up.
    pub max_retries: u32,
    pub dbus_timeout_secs: u64,
    /// sysfs directory consulted for the Bluetooth soft block.
    #[serde(default = "default_rfkill_class")]
    pub rfkill_class: String,
}

fn default_rfkill_class() -> String {
    crate::bluetooth::rfkill::RFKILL_CLASS.to_string()
}

/// `$XDG_RUNTIME_DIR/blueman/applet.sock`, or `/run/user/<uid>/...` without it.
fn default_socket_path(runtime_dir: Option<String>) -> String {
    let runtime_dir = runtime_dir
        .filter(|dir| !dir.is_empty())
        .unwrap_or_else(|| format!("/run/user/{}", nix::unistd::getuid()));
    format!("{}/blueman/applet.sock", runtime_dir)
}

fn save_script_override(lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
    SAVE_SCRIPT_ENV
        .iter()
        .filter_map(|name| lookup(name))
        .find(|script| !script.is_empty())
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            symbolic_status_icons: false,
            manager_command: vec!["blueman-manager".to_string()],
            tray_command: vec!["blueman-tray".to_string()],
            save_script: None,
            script_interpreter: "/usr/bin/python3".to_string(),
        }
    }
}

impl Default for AppletConfig {
    fn default() -> Self {
        Self {
            socket_path: default_socket_path(std::env::var("XDG_RUNTIME_DIR").ok()),
            mechanism_socket: "/run/blueman/mechanism.sock".to_string(),
            plugins: PluginsConfig::default(),
            plugin_options: HashMap::new(),
            general: GeneralConfig::default(),
            bluetooth: BluetoothConfig {
                max_retries: DEFAULT_MAX_RETRIES,
                dbus_timeout_secs: 25,
                rfkill_class: default_rfkill_class(),
            },
        }
    }
}

impl AppletConfig {
    pub fn load(path: &str) -> Result<Self> {
        let mut config = match fs::read_to_string(path) {
            Ok(content) => toml::from_str(&content)?,
            Err(_) => {
                // Create default config if not found
                let config = Self::default();
                let _ = fs::write(path, toml::to_string_pretty(&config)?);
                config
            }
        };

        if let Some(script) = save_script_override(|name| std::env::var(name).ok()) {
            config.general.save_script = Some(script);
        }

        Ok(config)
    }
}
