/*!
 * RfKill State
 * Read-only view of Bluetooth kill switches through sysfs
 */

use std::fs;
use std::path::Path;

pub const RFKILL_CLASS: &str = "/sys/class/rfkill";

/// True when some Bluetooth kill switch is soft-unblocked, or when the
/// system exposes no Bluetooth kill switch at all.
pub fn soft_unblocked(class: &Path) -> bool {
    let Ok(entries) = fs::read_dir(class) else {
        return true;
    };

    let mut found = false;
    for entry in entries.flatten() {
        let dir = entry.path();
        let is_bluetooth = fs::read_to_string(dir.join("type")).is_ok_and(|t| t.trim() == "bluetooth");
        if !is_bluetooth {
            continue;
        }
        found = true;
        if fs::read_to_string(dir.join("soft")).is_ok_and(|s| s.trim() == "0") {
            return true;
        }
    }
    !found
}
