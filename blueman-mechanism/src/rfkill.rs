/*!
 * RfKill Control
 * Blocks/unblocks Bluetooth and manages the kernel module and service around it
 */

use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use tokio::process::Command;

use crate::config::RfkillConfig;
use crate::error::MechanismError;

pub const RFKILL_TYPE_BLUETOOTH: u8 = 2;
pub const RFKILL_OP_CHANGE_ALL: u8 = 3;

/// Encodes a `struct rfkill_event` (idx, type, op, soft, hard).
pub fn encode_event(block: bool) -> [u8; 8] {
    let mut event = [0u8; 8];
    event[..4].copy_from_slice(&0u32.to_ne_bytes());
    event[4] = RFKILL_TYPE_BLUETOOTH;
    event[5] = RFKILL_OP_CHANGE_ALL;
    event[6] = u8::from(block);
    event[7] = 0;
    event
}

pub struct RfKill {
    config: RfkillConfig,
}

impl RfKill {
    /// Returns `None` when the rfkill device node does not exist.
    pub fn probe(config: RfkillConfig) -> Option<Self> {
        if Path::new(&config.device).exists() {
            Some(Self { config })
        } else {
            tracing::warn!("Hardware kill switch not found at {}", config.device);
            None
        }
    }

    /// Enabling loads the module first (which may already unblock the
    /// adapter) then unblocks; disabling blocks first, then removes the
    /// module and stops the service.
    pub async fn set_state(&self, state: bool) -> Result<(), MechanismError> {
        if state {
            if self.config.manage_module {
                run(&self.config.modprobe, &[self.config.module_name.as_str()]).await?;
                tracing::debug!(
                    "Kernel module {} added, bluetooth service should start on its own",
                    self.config.module_name
                );
            }
            self.write_event(state)?;
        } else {
            self.write_event(state)?;
            if self.config.manage_module {
                run(&self.config.modprobe, &["-r", self.config.module_name.as_str()]).await?;
                tracing::debug!("Kernel module {} removed", self.config.module_name);
            }
            if self.config.stop_service {
                run(&self.config.systemctl, &["stop", self.config.service_name.as_str()]).await?;
                tracing::debug!("{} stopped", self.config.service_name);
            }
        }
        Ok(())
    }

    fn write_event(&self, state: bool) -> Result<(), MechanismError> {
        let mut dev = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&self.config.device)?;
        dev.write_all(&encode_event(!state))?;
        tracing::debug!(
            "Bluetooth adapter is {}",
            if state { "unblocked" } else { "blocked" }
        );
        Ok(())
    }
}

async fn run(program: &str, args: &[&str]) -> Result<(), MechanismError> {
    let status = Command::new(program).args(args).status().await?;
    if status.success() {
        Ok(())
    } else {
        Err(MechanismError::CommandFailed(format!(
            "{} {} exited with {}",
            program,
            args.join(" "),
            status
        )))
    }
}
