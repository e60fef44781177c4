use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;

use crate::authority::ActionPolicy;
use crate::protocol::ACTION_RFKILL_SET_STATE;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MechanismConfig {
    pub socket_path: String,
    pub rfkill: RfkillConfig,
    /// Action id -> who may invoke it.
    #[serde(default)]
    pub policy: HashMap<String, ActionPolicy>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RfkillConfig {
    pub device: String,
    pub manage_module: bool,
    pub module_name: String,
    pub modprobe: String,
    pub stop_service: bool,
    pub service_name: String,
    pub systemctl: String,
}

impl Default for RfkillConfig {
    fn default() -> Self {
        Self {
            device: "/dev/rfkill".to_string(),
            manage_module: true,
            module_name: "btusb".to_string(),
            modprobe: "/usr/sbin/modprobe".to_string(),
            stop_service: true,
            service_name: "bluetooth.service".to_string(),
            systemctl: "/usr/bin/systemctl".to_string(),
        }
    }
}

impl Default for MechanismConfig {
    fn default() -> Self {
        let mut policy = HashMap::new();
        policy.insert(
            ACTION_RFKILL_SET_STATE.to_string(),
            ActionPolicy {
                allow_root: true,
                allowed_uids: Vec::new(),
                allowed_groups: vec!["bluetooth".to_string(), "wheel".to_string()],
            },
        );

        Self {
            socket_path: "/run/blueman/mechanism.sock".to_string(),
            rfkill: RfkillConfig::default(),
            policy,
        }
    }
}

impl MechanismConfig {
    pub fn load(path: &str) -> Result<Self> {
        match fs::read_to_string(path) {
            Ok(content) => Ok(toml::from_str(&content)?),
            Err(_) => {
                // Create default config if not found
                let config = Self::default();
                let _ = fs::write(path, toml::to_string_pretty(&config)?);
                Ok(config)
            }
        }
    }
}
