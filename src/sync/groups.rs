use std::collections::{BTreeSet, HashMap};

use super::pagination::PageState;
use crate::api::types::EmailSummary;

/// All summaries seen for one domain, in first-arrival order.
#[derive(Debug, Clone)]
pub struct Group {
    pub domain: String,
    items: Vec<EmailSummary>,
    pub collapsed: bool,
    pub page: PageState,
}

impl Group {
    fn new(domain: String, page_size: usize, collapsed: bool) -> Self {
        Group {
            domain,
            items: Vec::new(),
            collapsed,
            page: PageState::new(page_size),
        }
    }

    pub fn items(&self) -> &[EmailSummary] {
        &self.items
    }

    pub fn count(&self) -> usize {
        self.items.len()
    }

    /// Items on the current page.
    pub fn window(&self) -> &[EmailSummary] {
        &self.items[self.page.range(self.items.len())]
    }

    pub fn is_rendered(&self, id: &str) -> bool {
        self.window().iter().any(|item| item.id == id)
    }

    #[cfg(test)]
    pub fn push_for_test(&mut self, id: &str) {
        self.items.push(tests::summary(id, &self.domain));
    }
}

/// Groups in first-seen order plus an id index spanning all of them.
#[derive(Debug)]
pub struct GroupStore {
    groups: Vec<Group>,
    by_domain: HashMap<String, usize>,
    owner: HashMap<String, usize>,
    page_size: usize,
    /// Persisted collapsed flags, applied when a group is first created.
    collapsed_defaults: BTreeSet<String>,
}

impl GroupStore {
    pub fn new(page_size: usize) -> Self {
        GroupStore {
            groups: Vec::new(),
            by_domain: HashMap::new(),
            owner: HashMap::new(),
            page_size,
            collapsed_defaults: BTreeSet::new(),
        }
    }

    pub fn with_collapsed(mut self, collapsed: BTreeSet<String>) -> Self {
        for group in &mut self.groups {
            group.collapsed = collapsed.contains(&group.domain);
        }
        self.collapsed_defaults = collapsed;
        self
    }

    /// Sum of all group counts.
    pub fn item_count(&self) -> usize {
        self.owner.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Group> {
        self.groups.iter()
    }

    pub fn get(&self, domain: &str) -> Option<&Group> {
        self.by_domain.get(domain).map(|&idx| &self.groups[idx])
    }

    pub fn get_mut(&mut self, domain: &str) -> Option<&mut Group> {
        match self.by_domain.get(domain) {
            Some(&idx) => Some(&mut self.groups[idx]),
            None => None,
        }
    }

    pub fn domain_of(&self, id: &str) -> Option<&str> {
        self.owner
            .get(id)
            .map(|&idx| self.groups[idx].domain.as_str())
    }

    /// Append `item` to its domain's group, creating the group on first sight.
    /// Returns false when the id is already known anywhere in the store.
    pub fn insert(&mut self, item: EmailSummary) -> bool {
        if self.owner.contains_key(&item.id) {
            return false;
        }
        let idx = match self.by_domain.get(&item.domain) {
            Some(&idx) => idx,
            None => {
                let idx = self.groups.len();
                let collapsed = self.collapsed_defaults.contains(&item.domain);
                self.groups
                    .push(Group::new(item.domain.clone(), self.page_size, collapsed));
                self.by_domain.insert(item.domain.clone(), idx);
                idx
            }
        };
        self.owner.insert(item.id.clone(), idx);
        self.groups[idx].items.push(item);
        true
    }

    /// Flip a group's collapsed flag. Returns the new value.
    pub fn toggle_collapsed(&mut self, domain: &str) -> Option<bool> {
        let group = self.get_mut(domain)?;
        group.collapsed = !group.collapsed;
        let collapsed = group.collapsed;
        if collapsed {
            self.collapsed_defaults.insert(domain.to_string());
        } else {
            self.collapsed_defaults.remove(domain);
        }
        Some(collapsed)
    }

    /// Collapsed domains, including persisted ones with no group yet.
    pub fn collapsed_domains(&self) -> &BTreeSet<String> {
        &self.collapsed_defaults
    }
}
