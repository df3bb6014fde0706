use std::collections::HashSet;
use std::ops::Range;

use super::groups::Group;
use super::selection::SelectionStore;
use crate::api::types::EmailSummary;

/// Page window of one group. Pages are 1-based.
#[derive(Debug, Clone)]
pub struct PageState {
    page_size: usize,
    current: usize,
    /// Selected ids of this group that sit on pages not currently rendered.
    saved: HashSet<String>,
}

impl PageState {
    pub fn new(page_size: usize) -> Self {
        PageState {
            page_size: page_size.max(1),
            current: 1,
            saved: HashSet::new(),
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    pub fn total_pages(&self, item_count: usize) -> usize {
        item_count.div_ceil(self.page_size).max(1)
    }

    pub fn range(&self, item_count: usize) -> Range<usize> {
        let start = ((self.current - 1) * self.page_size).min(item_count);
        let end = (start + self.page_size).min(item_count);
        start..end
    }

    pub fn label(&self, item_count: usize) -> String {
        format!("{}/{}", self.current, self.total_pages(item_count))
    }

    /// Pull the page index back into [1, total]. Returns true if it moved.
    pub fn clamp(&mut self, item_count: usize) -> bool {
        let total = self.total_pages(item_count);
        let clamped = self.current.clamp(1, total);
        let moved = clamped != self.current;
        self.current = clamped;
        moved
    }

    fn set_current(&mut self, page: usize) {
        self.current = page;
    }

    pub fn saved(&self) -> &HashSet<String> {
        &self.saved
    }

    pub(super) fn saved_mut(&mut self) -> &mut HashSet<String> {
        &mut self.saved
    }
}

pub struct PaginationController;

impl PaginationController {
    /// Re-derive a group's window after its item count changed.
    pub fn initialize(group: &mut Group, selection: &mut SelectionStore) {
        let count = group.count();
        if group.page.clamp(count) {
            log_debug!(
                "[Pages] {} clamped to page {}",
                group.domain,
                group.page.current()
            );
        }
        selection.restore_visible(group);
    }

    /// Move a group to `page`. Out-of-range targets and the current page are no-ops.
    pub fn goto_page(group: &mut Group, selection: &mut SelectionStore, page: usize) -> bool {
        let total = group.page.total_pages(group.count());
        if page < 1 || page > total || page == group.page.current() {
            return false;
        }
        selection.snapshot_hidden(group);
        group.page.set_current(page);
        selection.restore_visible(group);
        true
    }

    pub fn current_window(group: &Group) -> &[EmailSummary] {
        group.window()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::groups::tests::group_with;

    #[test]
    fn test_page_math() {
        let page = PageState::new(10);
        assert_eq!(page.total_pages(0), 1);
        assert_eq!(page.total_pages(10), 1);
        assert_eq!(page.total_pages(11), 2);
        assert_eq!(page.range(12), 0..10);
        assert_eq!(page.label(12), "1/2");
    }

    #[test]
    fn test_zero_page_size_is_raised_to_one() {
        let page = PageState::new(0);
        assert_eq!(page.total_pages(3), 3);
    }

    #[test]
    fn test_goto_page_windows_and_clamps() {
        let mut group = group_with("shop.com", 12, 10);
        let mut selection = SelectionStore::default();

        assert_eq!(PaginationController::current_window(&group).len(), 10);
        assert!(PaginationController::goto_page(&mut group, &mut selection, 2));
        let window = PaginationController::current_window(&group);
        assert_eq!(window.len(), 2);
        assert_eq!(window[0].id, "shop.com-11");
        assert_eq!(group.page.label(group.count()), "2/2");

        assert!(!PaginationController::goto_page(&mut group, &mut selection, 3));
        assert!(!PaginationController::goto_page(&mut group, &mut selection, 0));
        assert!(!PaginationController::goto_page(&mut group, &mut selection, 2));
        assert_eq!(group.page.current(), 2);
    }

    #[test]
    fn test_initialize_keeps_page_when_items_grow() {
        let mut group = group_with("shop.com", 12, 10);
        let mut selection = SelectionStore::default();
        PaginationController::goto_page(&mut group, &mut selection, 2);

        for i in 13..=25 {
            group.push_for_test(&format!("shop.com-{}", i));
        }
        PaginationController::initialize(&mut group, &mut selection);
        assert_eq!(group.page.current(), 2);
        assert_eq!(group.page.total_pages(group.count()), 3);
        assert_eq!(group.window().len(), 10);
    }

    #[test]
    fn test_clamp_pulls_back_out_of_range_page() {
        let mut page = PageState::new(10);
        page.set_current(5);
        assert!(page.clamp(12));
        assert_eq!(page.current(), 2);
        assert!(!page.clamp(12));
    }
}
