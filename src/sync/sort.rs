use super::groups::GroupStore;

/// Display order of groups: count descending, ties kept in their previous order.
#[derive(Debug, Default)]
pub struct SortCoordinator {
    order: Vec<String>,
}

impl SortCoordinator {
    pub fn order(&self) -> &[String] {
        &self.order
    }

    pub fn reorder(&mut self, store: &GroupStore) -> &[String] {
        self.order = reorder(&self.order, store);
        &self.order
    }
}

/// Pure ordering step. Domains missing from `previous` follow it in first-seen order
/// before the stable count sort runs.
pub fn reorder(previous: &[String], store: &GroupStore) -> Vec<String> {
    let mut keyed: Vec<(usize, String)> = previous
        .iter()
        .filter_map(|domain| store.get(domain).map(|g| (g.count(), domain.clone())))
        .collect();
    for group in store.iter() {
        if !previous.contains(&group.domain) {
            keyed.push((group.count(), group.domain.clone()));
        }
    }
    keyed.sort_by(|a, b| b.0.cmp(&a.0));
    keyed.into_iter().map(|(_, domain)| domain).collect()
}
