/*!
 * Status Icon Menu Model
 * Items contributed by plugins, ordered by priority, rendered by the tray
 */

use serde::{Deserialize, Serialize};

use crate::bluetooth::ObjectPath;
use crate::plugin::Effect;

/// What activating an item does.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum MenuAction {
    ActivateManager { toggle: bool },
    SetPower { state: bool },
    ConnectDevice { path: ObjectPath },
    DisconnectDevice { path: ObjectPath },
    Quit,
}

impl MenuAction {
    pub fn into_effect(self) -> Effect {
        match self {
            MenuAction::ActivateManager { toggle } => Effect::ActivateManager { toggle },
            MenuAction::SetPower { state } => Effect::SetRfkillState { state },
            MenuAction::ConnectDevice { path } => Effect::ConnectDevice(path),
            MenuAction::DisconnectDevice { path } => Effect::DisconnectDevice(path),
            MenuAction::Quit => Effect::Quit,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmenuItem {
    pub text: String,
    pub icon_name: Option<String>,
    pub tooltip: Option<String>,
    pub sensitive: bool,
    pub action: Option<MenuAction>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MenuItem {
    /// Plugin that contributed the item.
    pub owner: String,
    /// (group, position); lower sorts first.
    pub priority: (u32, u32),
    pub text: String,
    pub icon_name: Option<String>,
    pub tooltip: Option<String>,
    pub sensitive: bool,
    pub action: Option<MenuAction>,
    pub submenu: Vec<SubmenuItem>,
}

impl MenuItem {
    pub fn new(owner: &str, priority: (u32, u32), text: &str) -> Self {
        Self {
            owner: owner.to_string(),
            priority,
            text: text.to_string(),
            icon_name: None,
            tooltip: None,
            sensitive: true,
            action: None,
            submenu: Vec::new(),
        }
    }

    pub fn icon(mut self, icon_name: &str) -> Self {
        self.icon_name = Some(icon_name.to_string());
        self
    }

    pub fn tooltip(mut self, tooltip: &str) -> Self {
        self.tooltip = Some(tooltip.to_string());
        self
    }

    pub fn action(mut self, action: MenuAction) -> Self {
        self.action = Some(action);
        self
    }

    pub fn submenu(mut self, submenu: Vec<SubmenuItem>) -> Self {
        self.submenu = submenu;
        self
    }
}

#[derive(Debug, Clone, Default)]
pub struct MenuModel {
    items: Vec<MenuItem>,
}

impl MenuModel {
    /// Adds an item, replacing any item at the same priority.
    pub fn add(&mut self, item: MenuItem) {
        self.items.retain(|existing| existing.priority != item.priority);
        let index = self
            .items
            .partition_point(|existing| existing.priority < item.priority);
        self.items.insert(index, item);
    }

    /// Removes every item of `owner`. Returns whether anything was removed.
    pub fn unregister(&mut self, owner: &str) -> bool {
        let before = self.items.len();
        self.items.retain(|item| item.owner != owner);
        self.items.len() != before
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    pub fn items(&self) -> &[MenuItem] {
        &self.items
    }

    pub fn find(&self, priority: (u32, u32)) -> Option<&MenuItem> {
        self.items.iter().find(|item| item.priority == priority)
    }

    /// Action of an item or of one of its submenu entries.
    pub fn action_at(&self, priority: (u32, u32), submenu: Option<usize>) -> Option<&MenuAction> {
        let item = self.find(priority)?;
        match submenu {
            Some(index) => item.submenu.get(index)?.action.as_ref(),
            None => item.action.as_ref(),
        }
    }
}
