use serde::Serialize;
use std::collections::HashSet;

use super::groups::Group;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TriState {
    Checked,
    Unchecked,
    Indeterminate,
}

/// The set of selected item ids. Every count is derived from this set.
#[derive(Debug, Default)]
pub struct SelectionStore {
    checked: HashSet<String>,
}

impl SelectionStore {
    pub fn is_selected(&self, id: &str) -> bool {
        self.checked.contains(id)
    }

    pub fn count(&self) -> usize {
        self.checked.len()
    }

    pub fn selected_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.checked.iter().cloned().collect();
        ids.sort();
        ids
    }

    /// Flip `id`, which must belong to `group`. Returns the new checked state.
    pub fn toggle(&mut self, group: &mut Group, id: &str) -> bool {
        let now_checked = if self.checked.remove(id) {
            false
        } else {
            self.checked.insert(id.to_string());
            true
        };
        if !group.is_rendered(id) {
            if now_checked {
                group.page.saved_mut().insert(id.to_string());
            } else {
                group.page.saved_mut().remove(id);
            }
        }
        now_checked
    }

    /// Check or uncheck every rendered item of `group`. Returns the checkbox state.
    pub fn set_group_all(&mut self, group: &Group, checked: bool) -> TriState {
        for item in group.window() {
            if checked {
                self.checked.insert(item.id.clone());
            } else {
                self.checked.remove(&item.id);
            }
        }
        self.checkbox_state(group)
    }

    /// State of the group checkbox: the page tri-state, except that an unchecked
    /// page reads indeterminate while selections survive on other pages.
    pub fn checkbox_state(&self, group: &Group) -> TriState {
        match self.group_tri_state(group) {
            TriState::Unchecked if !group.page.saved().is_empty() => TriState::Indeterminate,
            state => state,
        }
    }

    /// Deselect `id` wherever it is, including a group's saved hidden set.
    pub fn deselect(&mut self, group: &mut Group, id: &str) {
        self.checked.remove(id);
        group.page.saved_mut().remove(id);
    }

    /// Record the selected items of the page about to be left.
    pub fn snapshot_hidden(&mut self, group: &mut Group) {
        let leaving: Vec<String> = group
            .window()
            .iter()
            .filter(|item| self.checked.contains(&item.id))
            .map(|item| item.id.clone())
            .collect();
        group.page.saved_mut().extend(leaving);
    }

    /// Re-apply saved selections for items that are rendered again.
    pub fn restore_visible(&mut self, group: &mut Group) {
        let entering: Vec<String> = group
            .window()
            .iter()
            .filter(|item| group.page.saved().contains(&item.id))
            .map(|item| item.id.clone())
            .collect();
        for id in entering {
            group.page.saved_mut().remove(&id);
            self.checked.insert(id);
        }
    }

    /// Tri-state over the rendered page only.
    pub fn group_tri_state(&self, group: &Group) -> TriState {
        let window = group.window();
        let selected = window
            .iter()
            .filter(|item| self.checked.contains(&item.id))
            .count();
        if window.is_empty() || selected == 0 {
            TriState::Unchecked
        } else if selected == window.len() {
            TriState::Checked
        } else {
            TriState::Indeterminate
        }
    }
}
