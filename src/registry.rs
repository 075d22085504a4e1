//! Selector registry: the 100 selectors plus the group-paged navigation state.
//!
//! The registry tracks which group is on screen and which selector (if any)
//! is active. Activating a selector always pages to its group; paging never
//! touches the active selector.
use std::collections::HashMap;

use log::{debug, info};

use crate::{
    group_palette, ArticleCounts, Selector, SelectorId, SelectorView, GROUP_COUNT,
    SELECTORS_PER_GROUP,
};

#[derive(Debug, Clone)]
pub struct SelectorRegistry {
    selectors: Vec<Selector>,
    current_group: usize,
    active: Option<SelectorId>,
}

impl Default for SelectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SelectorRegistry {
    /// All 100 selectors, unnamed, group 0 on screen, nothing active
    pub fn new() -> Self {
        Self {
            selectors: SelectorId::all().map(Selector::new).collect(),
            current_group: 0,
            active: None,
        }
    }

    /// Back to the initial state, names included
    pub fn reset(&mut self) {
        *self = Self::new();
    }

    pub fn selectors(&self) -> &[Selector] {
        &self.selectors
    }

    pub fn selector(&self, id: SelectorId) -> &Selector {
        &self.selectors[id.index()]
    }

    pub fn current_group(&self) -> usize {
        self.current_group
    }

    pub fn total_groups(&self) -> usize {
        self.selectors.len().div_ceil(SELECTORS_PER_GROUP)
    }

    /// Marks `id` as the only active selector and pages to its group.
    pub fn set_active_selector(&mut self, id: SelectorId) {
        self.active = Some(id);
        self.current_group = id.group_index();
        debug!(
            "Selector {} active, showing group {}",
            id, self.current_group
        );
    }

    pub fn clear_active_selector(&mut self) {
        self.active = None;
    }

    /// Snapshot of the active selector, built from the current names.
    pub fn active_selector(&self) -> Option<Selector> {
        self.active.map(|id| self.selector(id).clone())
    }

    pub fn is_active(&self, id: SelectorId) -> bool {
        self.active == Some(id)
    }

    /// Group of the active selector, or the group on screen when none is active
    pub fn active_group_index(&self) -> usize {
        self.active
            .map(SelectorId::group_index)
            .unwrap_or(self.current_group)
    }

    /// Pages to `group`, clamped to the valid range.
    pub fn navigate_to_group(&mut self, group: i64) {
        let max_group = self.total_groups().saturating_sub(1) as i64;
        self.current_group = group.clamp(0, max_group) as usize;
        debug!("Showing selector group {}", self.current_group);
    }

    /// Returns whether the group changed
    pub fn navigate_previous(&mut self) -> bool {
        if self.current_group == 0 {
            return false;
        }
        self.navigate_to_group(self.current_group as i64 - 1);
        true
    }

    /// Returns whether the group changed
    pub fn navigate_next(&mut self) -> bool {
        if self.current_group + 1 >= self.total_groups() {
            return false;
        }
        self.navigate_to_group(self.current_group as i64 + 1);
        true
    }

    pub fn current_group_selectors(&self) -> &[Selector] {
        self.selectors_by_group(self.current_group)
    }

    /// The ten selectors of `group`; empty past the last group.
    pub fn selectors_by_group(&self, group: usize) -> &[Selector] {
        if group >= GROUP_COUNT {
            return &[];
        }
        let start = group * SELECTORS_PER_GROUP;
        let end = (start + SELECTORS_PER_GROUP).min(self.selectors.len());
        &self.selectors[start..end]
    }

    /// Renames a selector and returns its previous name.
    pub fn rename_selector(&mut self, id: SelectorId, new_name: &str) -> String {
        let name = new_name.trim().to_string();
        let selector = &mut self.selectors[id.index()];
        info!("Renaming selector {} from '{}' to '{}'", id, selector.name, name);
        std::mem::replace(&mut selector.name, name)
    }

    /// Applies persisted names. Selectors missing from `names` keep an empty name.
    pub fn apply_names(&mut self, names: &HashMap<SelectorId, String>) {
        for selector in &mut self.selectors {
            selector.name = names.get(&selector.id).cloned().unwrap_or_default();
        }
        debug!("Applied {} persisted selector names", names.len());
    }

    /// Render-ready views of one group, with counts and the active flag
    pub fn views(&self, counts: &ArticleCounts, group: usize) -> Vec<SelectorView> {
        self.selectors_by_group(group)
            .iter()
            .map(|selector| {
                let accents = group_palette(selector.group_index());
                SelectorView {
                    id: selector.id,
                    name: selector.name.clone(),
                    color: selector.color.to_string(),
                    hover_color: accents.hover.to_string(),
                    active_color: accents.active.to_string(),
                    group_index: selector.group_index(),
                    is_active: self.is_active(selector.id),
                    article_count: counts.for_selector(selector.id),
                }
            })
            .collect()
    }
}
