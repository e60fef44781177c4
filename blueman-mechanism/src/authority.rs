/*!
 * Caller Authorization
 * Static per-action policy checked against socket peer credentials
 */

use nix::unistd::{Gid, Group, Uid, User};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::error::MechanismError;

/// Identity of the process on the other end of the socket.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub uid: u32,
    pub gid: u32,
    pub pid: Option<i32>,
}

impl fmt::Display for Caller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.pid {
            Some(pid) => write!(f, "uid={} pid={}", self.uid, pid),
            None => write!(f, "uid={}", self.uid),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ActionPolicy {
    #[serde(default = "default_allow_root")]
    pub allow_root: bool,
    #[serde(default)]
    pub allowed_uids: Vec<u32>,
    #[serde(default)]
    pub allowed_groups: Vec<String>,
}

fn default_allow_root() -> bool {
    true
}

pub struct Authority {
    policies: HashMap<String, ActionPolicy>,
}

impl Authority {
    pub fn new(policies: HashMap<String, ActionPolicy>) -> Self {
        Self { policies }
    }

    /// Fails with `AuthorizationDenied` unless the policy for `action_id`
    /// admits the caller. Actions without a policy are denied.
    pub fn confirm_authorization(&self, caller: &Caller, action_id: &str) -> Result<(), MechanismError> {
        let denied = || {
            tracing::warn!(caller = %caller, action = action_id, "Authorization denied");
            MechanismError::AuthorizationDenied(format!("{} may not perform {}", caller, action_id))
        };

        let Some(policy) = self.policies.get(action_id) else {
            return Err(denied());
        };

        if policy.allow_root && caller.uid == 0 {
            return Ok(());
        }
        if policy.allowed_uids.contains(&caller.uid) {
            return Ok(());
        }
        if policy
            .allowed_groups
            .iter()
            .any(|group| in_group(caller, group))
        {
            return Ok(());
        }

        Err(denied())
    }
}

fn in_group(caller: &Caller, group_name: &str) -> bool {
    let group = match Group::from_name(group_name) {
        Ok(Some(group)) => group,
        Ok(None) => return false,
        Err(e) => {
            tracing::debug!("Group lookup for {} failed: {}", group_name, e);
            return false;
        }
    };

    if group.gid == Gid::from_raw(caller.gid) {
        return true;
    }

    match User::from_uid(Uid::from_raw(caller.uid)) {
        Ok(Some(user)) => group.mem.iter().any(|member| *member == user.name),
        _ => false,
    }
}
