// src/menu.rs - Three-level device menu
use serde::Serialize;
use tracing::debug;

pub const LEVEL_COUNT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MenuTier {
    Devices,
    Actions,
    SubActions,
}

impl MenuTier {
    pub fn index(self) -> usize {
        match self {
            Self::Devices => 0,
            Self::Actions => 1,
            Self::SubActions => 2,
        }
    }

    pub fn from_index(index: usize) -> Self {
        match index {
            0 => Self::Devices,
            1 => Self::Actions,
            _ => Self::SubActions,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MenuLevel {
    name: String,
    items: Vec<String>,
    selected_index: usize,
    visible: bool,
}

impl MenuLevel {
    pub fn new(name: impl Into<String>, items: Vec<String>) -> Self {
        Self {
            name: name.into(),
            items,
            selected_index: 0,
            visible: false,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    #[cfg(test)]
    pub fn items(&self) -> &[String] {
        &self.items
    }

    pub fn selected_index(&self) -> usize {
        self.selected_index
    }

    pub fn selected_item(&self) -> Option<&str> {
        self.items.get(self.selected_index).map(String::as_str)
    }

    pub fn is_visible(&self) -> bool {
        self.visible
    }

    fn next(&mut self) {
        if self.items.is_empty() {
            return;
        }
        self.selected_index = (self.selected_index + 1) % self.items.len();
    }

    fn previous(&mut self) {
        if self.items.is_empty() {
            return;
        }
        self.selected_index = if self.selected_index == 0 {
            self.items.len() - 1
        } else {
            self.selected_index - 1
        };
    }

    fn replace_items(&mut self, items: Vec<String>) {
        let last = items.len().saturating_sub(1);
        self.items = items;
        self.selected_index = self.selected_index.min(last);
    }
}

/// Read-only view of one level for presentation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LevelSnapshot {
    pub tier: MenuTier,
    pub name: String,
    pub items: Vec<String>,
    pub selected_index: usize,
    pub visible: bool,
    pub active: bool,
}

/// Devices → Actions → Sub-actions, with one active level.
///
/// Visibility only grows through [`advance`](MenuHierarchy::advance) and
/// [`show_root`](MenuHierarchy::show_root), so a visible level always has
/// a visible parent.
#[derive(Debug, Clone)]
pub struct MenuHierarchy {
    levels: [MenuLevel; LEVEL_COUNT],
    active: usize,
}

impl MenuHierarchy {
    pub fn new(devices: MenuLevel, actions: MenuLevel, sub_actions: MenuLevel) -> Self {
        Self {
            levels: [devices, actions, sub_actions],
            active: 0,
        }
    }

    #[cfg(test)]
    pub fn active_index(&self) -> usize {
        self.active
    }

    pub fn active_tier(&self) -> MenuTier {
        MenuTier::from_index(self.active)
    }

    pub fn level(&self, tier: MenuTier) -> &MenuLevel {
        &self.levels[tier.index()]
    }

    #[cfg(test)]
    pub fn levels(&self) -> &[MenuLevel] {
        &self.levels
    }

    pub fn advance(&mut self) {
        if self.active < LEVEL_COUNT - 1 {
            self.active += 1;
        }
        for level in &mut self.levels[..=self.active] {
            level.visible = true;
        }
        debug!(active = self.active, "menu advance");
    }

    /// Hides the active level and rewinds its cursor, then steps back one
    /// level. At the root only the hide and rewind happen.
    pub fn retreat(&mut self) {
        let current = &mut self.levels[self.active];
        current.visible = false;
        current.selected_index = 0;
        if self.active > 0 {
            self.active -= 1;
        }
        debug!(active = self.active, "menu retreat");
    }

    pub fn next_item(&mut self) {
        self.levels[self.active].next();
    }

    pub fn prev_item(&mut self) {
        self.levels[self.active].previous();
    }

    pub fn show_root(&mut self) {
        self.levels[MenuTier::Devices.index()].visible = true;
    }

    pub fn repopulate(&mut self, tier: MenuTier, items: Vec<String>, name: Option<&str>) {
        let level = &mut self.levels[tier.index()];
        level.replace_items(items);
        if let Some(name) = name {
            level.name = name.to_string();
        }
    }

    pub fn snapshot(&self) -> Vec<LevelSnapshot> {
        self.levels
            .iter()
            .enumerate()
            .map(|(i, level)| LevelSnapshot {
                tier: MenuTier::from_index(i),
                name: level.name.clone(),
                items: level.items.clone(),
                selected_index: level.selected_index,
                visible: level.visible,
                active: i == self.active,
            })
            .collect()
    }
}
