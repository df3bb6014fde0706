pub mod clock;
pub mod groups;
pub mod load_more;
pub mod merge;
pub mod pagination;
pub mod poller;
pub mod selection;
pub mod sort;

use serde::Serialize;

use crate::api::types::{BulkAction, FetchStatus, WireBatch};
use crate::backend::{BackendCommand, BackendResponse};
use crate::config::PollConfig;
use crate::state::StateStore;
use clock::Clock;
use groups::{Group, GroupStore};
use load_more::LoadMoreController;
use merge::{Batch, MergeEngine};
use pagination::PaginationController;
use poller::{ControlCommand, FetchSession, FetchStatusPoller, TickBlocked, Transition};
use selection::{SelectionStore, TriState};
use sort::SortCoordinator;

/// User input, addressed by stable ids and domain keys.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAction {
    Toggle { id: String },
    SelectGroup { domain: String, checked: bool },
    GotoPage { domain: String, page: usize },
    ToggleCollapsed { domain: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutcome {
    Toggled { id: String, checked: bool },
    GroupSet { domain: String, tri_state: TriState },
    PageChanged { domain: String, page: usize, moved: bool },
    Collapsed { domain: String, collapsed: bool },
    /// The id or domain is not known.
    Ignored,
}

/// What a drained backend completion did to the session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    Observed {
        applied: usize,
        transition: Option<Transition>,
    },
    PollFailed {
        error: String,
    },
    MoreLoaded {
        applied: usize,
    },
    MoreFailed {
        error: String,
    },
    /// A load-more result arrived with no request outstanding.
    MoreDiscarded,
    ControlDone {
        command: ControlCommand,
        status: FetchStatus,
    },
    ControlFailed {
        command: ControlCommand,
        error: String,
    },
    /// The backend applied a bulk action; those ids are no longer selected.
    ActionApplied {
        action: BulkAction,
        applied: u64,
        deselected: usize,
    },
    /// Selection is left as it was.
    ActionFailed {
        action: BulkAction,
        error: String,
    },
    CacheCleared {
        removed: u64,
    },
    CacheClearFailed {
        error: String,
    },
}

#[derive(Debug, Clone, Serialize)]
pub struct ItemView {
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub date: String,
    pub checked: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct GroupView {
    pub domain: String,
    pub count: usize,
    pub collapsed: bool,
    pub page: usize,
    pub total_pages: usize,
    pub page_label: String,
    /// Tri-state of the rendered page alone.
    pub tri_state: TriState,
    /// What the group checkbox shows; counts selections on other pages too.
    pub checkbox: TriState,
    /// Selected items of this group on pages not rendered.
    pub hidden_selected: usize,
    pub items: Vec<ItemView>,
}

/// Serializable snapshot of everything a renderer needs.
#[derive(Debug, Clone, Serialize)]
pub struct ListView {
    pub status: FetchStatus,
    pub status_label: String,
    pub fetched: u64,
    pub total: u64,
    pub progress_percent: u32,
    pub pause_enabled: bool,
    pub resume_enabled: bool,
    pub load_more_visible: bool,
    pub load_more_label: String,
    pub last_error: Option<String>,
    pub last_update: Option<String>,
    pub selected_count: usize,
    pub action_enabled: bool,
    pub groups: Vec<GroupView>,
}

/// One list session. Owns every store; all mutation goes through here.
pub struct Synchronizer {
    groups: GroupStore,
    selection: SelectionStore,
    sorter: SortCoordinator,
    poller: FetchStatusPoller,
    load_more: LoadMoreController,
    action_in_flight: bool,
    state: Option<StateStore>,
    clock: Box<dyn Clock>,
}

impl Synchronizer {
    pub fn new(
        page_size: usize,
        poll: PollConfig,
        clock: Box<dyn Clock>,
        state: Option<StateStore>,
    ) -> Self {
        let collapsed = state.as_ref().map(|s| s.get_collapsed()).unwrap_or_default();
        let now = clock.now_ms();
        Synchronizer {
            groups: GroupStore::new(page_size).with_collapsed(collapsed),
            selection: SelectionStore::default(),
            sorter: SortCoordinator::default(),
            poller: FetchStatusPoller::new(poll, now),
            load_more: LoadMoreController::default(),
            action_in_flight: false,
            state,
            clock,
        }
    }

    pub fn session(&self) -> &FetchSession {
        self.poller.session()
    }

    /// Domain keys in display order.
    pub fn order(&self) -> &[String] {
        self.sorter.order()
    }

    pub fn item_count(&self) -> usize {
        self.groups.item_count()
    }

    pub fn selected_ids(&self) -> Vec<String> {
        self.selection.selected_ids()
    }

    pub fn state(&self) -> Option<&StateStore> {
        self.state.as_ref()
    }

    pub fn pending_control(&self) -> Option<ControlCommand> {
        self.poller.pending_control()
    }

    /// Fold a batch in and re-lay-out. Returns the number of new items.
    pub fn merge(&mut self, wire: &WireBatch) -> usize {
        let batch = Batch::from_wire(wire);
        log_debug!(
            "[Sync] merging {} items ({} malformed dropped)",
            batch.len(),
            batch.dropped
        );
        let outcome = MergeEngine::merge(&mut self.groups, batch);
        self.sorter.reorder(&self.groups);
        for domain in &outcome.touched {
            if let Some(group) = self.groups.get_mut(domain) {
                PaginationController::initialize(group, &mut self.selection);
            }
        }
        let held = self.groups.item_count() as u64;
        self.poller.session_mut().absorb_counts(held, 0);
        if outcome.applied > 0 {
            log_debug!(
                "[Sync] merged {} new items ({} duplicates), {} groups",
                outcome.applied,
                outcome.duplicates,
                self.sorter.order().len()
            );
        }
        outcome.applied
    }

    /// Claim a status poll if one is due.
    pub fn tick(&mut self) -> Result<BackendCommand, TickBlocked> {
        let now = self.clock.now_ms();
        self.poller.check_tick(now)?;
        self.poller.begin_poll(now);
        Ok(BackendCommand::FetchStatus)
    }

    pub fn check_tick(&self) -> Result<(), TickBlocked> {
        self.poller.check_tick(self.clock.now_ms())
    }

    /// None while a load-more is already outstanding.
    pub fn request_more(&mut self) -> Option<BackendCommand> {
        let req = self.load_more.begin(self.poller.session())?;
        Some(BackendCommand::FetchMore {
            page_token: req.page_token,
            current_count: req.current_count,
        })
    }

    pub fn pause(&mut self) -> Option<BackendCommand> {
        self.control(ControlCommand::Pause)
    }

    pub fn resume(&mut self) -> Option<BackendCommand> {
        self.control(ControlCommand::Resume)
    }

    /// Send `action` for the current selection. None when nothing is selected
    /// or an action is still outstanding.
    pub fn apply_action(&mut self, action: BulkAction) -> Option<BackendCommand> {
        if self.action_in_flight || self.selection.count() == 0 {
            return None;
        }
        self.action_in_flight = true;
        Some(BackendCommand::ApplyAction {
            action,
            ids: self.selection.selected_ids(),
        })
    }

    fn action_applied(&mut self, action: BulkAction, ids: &[String], applied: u64) -> usize {
        let mut deselected = 0;
        for id in ids {
            let Some(domain) = self.groups.domain_of(id).map(str::to_string) else {
                continue;
            };
            if let Some(group) = self.groups.get_mut(&domain) {
                if self.selection.is_selected(id) || group.page.saved().contains(id) {
                    deselected += 1;
                }
                self.selection.deselect(group, id);
            }
        }
        if action == BulkAction::Delete {
            if let Some(ref state) = self.state {
                state.remove_email_details(ids);
            }
        }
        log_info!(
            "[Sync] {} applied to {} emails, {} deselected",
            action,
            applied,
            deselected
        );
        deselected
    }

    fn control(&mut self, command: ControlCommand) -> Option<BackendCommand> {
        if self.poller.request_control(command) {
            Some(BackendCommand::Control(command))
        } else {
            log_debug!("[Sync] {:?} not enabled, ignoring", command);
            None
        }
    }

    /// Apply one backend completion. Responses the session does not own yield None.
    pub fn on_response(&mut self, response: BackendResponse) -> Option<SyncEvent> {
        let now = self.clock.now_ms();
        match response {
            BackendResponse::Status(Ok(report)) => {
                let transition = self.poller.observe(&report, now);
                let applied = self.merge(&report.grouped);
                Some(SyncEvent::Observed {
                    applied,
                    transition,
                })
            }
            BackendResponse::Status(Err(error)) => {
                log_warn!("[Sync] status poll failed: {}", error);
                self.poller.poll_failed(now);
                Some(SyncEvent::PollFailed { error })
            }
            BackendResponse::More(result) => {
                if !self.load_more.is_in_flight() {
                    log_debug!("[Sync] discarding load-more result with no request outstanding");
                    return Some(SyncEvent::MoreDiscarded);
                }
                match result {
                    Ok(report) => {
                        let session = self.poller.session_mut();
                        session.next_page_token = report.next_page_token;
                        session.absorb_counts(report.count, 0);
                        let applied = self.merge(&report.emails);
                        self.load_more.succeeded();
                        Some(SyncEvent::MoreLoaded { applied })
                    }
                    Err(error) => {
                        self.load_more.failed(&error);
                        Some(SyncEvent::MoreFailed { error })
                    }
                }
            }
            BackendResponse::Control { command, result } => {
                self.poller.control_resolved(command, &result, now);
                Some(match result {
                    Ok(status) => SyncEvent::ControlDone { command, status },
                    Err(error) => SyncEvent::ControlFailed { command, error },
                })
            }
            BackendResponse::Action {
                action,
                ids,
                result,
            } => {
                self.action_in_flight = false;
                Some(match result {
                    Ok(applied) => {
                        let deselected = self.action_applied(action, &ids, applied);
                        SyncEvent::ActionApplied {
                            action,
                            applied,
                            deselected,
                        }
                    }
                    Err(error) => {
                        log_warn!("[Sync] {} failed: {}", action, error);
                        SyncEvent::ActionFailed { action, error }
                    }
                })
            }
            BackendResponse::CacheCleared(result) => Some(match result {
                Ok(removed) => {
                    if let Some(ref state) = self.state {
                        state.clear_email_details();
                    }
                    SyncEvent::CacheCleared { removed }
                }
                Err(error) => SyncEvent::CacheClearFailed { error },
            }),
            BackendResponse::Logs(_) | BackendResponse::EmailDetail { .. } => None,
        }
    }

    /// Single entry point for user input.
    pub fn dispatch(&mut self, action: UserAction) -> ActionOutcome {
        match action {
            UserAction::Toggle { id } => {
                let Some(domain) = self.groups.domain_of(&id).map(str::to_string) else {
                    return ActionOutcome::Ignored;
                };
                let Some(group) = self.groups.get_mut(&domain) else {
                    return ActionOutcome::Ignored;
                };
                let checked = self.selection.toggle(group, &id);
                ActionOutcome::Toggled { id, checked }
            }
            UserAction::SelectGroup { domain, checked } => {
                let Some(group) = self.groups.get(&domain) else {
                    return ActionOutcome::Ignored;
                };
                let tri_state = self.selection.set_group_all(group, checked);
                ActionOutcome::GroupSet { domain, tri_state }
            }
            UserAction::GotoPage { domain, page } => {
                let Some(group) = self.groups.get_mut(&domain) else {
                    return ActionOutcome::Ignored;
                };
                let moved = PaginationController::goto_page(group, &mut self.selection, page);
                ActionOutcome::PageChanged {
                    page: group.page.current(),
                    domain,
                    moved,
                }
            }
            UserAction::ToggleCollapsed { domain } => {
                let Some(collapsed) = self.groups.toggle_collapsed(&domain) else {
                    return ActionOutcome::Ignored;
                };
                if let Some(ref state) = self.state {
                    state.put_collapsed(self.groups.collapsed_domains());
                }
                ActionOutcome::Collapsed { domain, collapsed }
            }
        }
    }

    pub fn view(&self) -> ListView {
        let session = self.poller.session();
        let groups = self
            .sorter
            .order()
            .iter()
            .filter_map(|domain| self.groups.get(domain))
            .map(|group| self.group_view(group))
            .collect();
        ListView {
            status: session.status,
            status_label: status_label(session),
            fetched: session.fetched,
            total: session.total,
            progress_percent: (session.progress() * 100.0).round() as u32,
            pause_enabled: self.poller.pause_enabled(),
            resume_enabled: self.poller.resume_enabled(),
            load_more_visible: self.load_more.visible(session),
            load_more_label: self.load_more.label(),
            last_error: session.last_error.clone(),
            last_update: session.last_update.clone(),
            selected_count: self.selection.count(),
            action_enabled: !self.action_in_flight && self.selection.count() > 0,
            groups,
        }
    }

    fn group_view(&self, group: &Group) -> GroupView {
        let count = group.count();
        GroupView {
            domain: group.domain.clone(),
            count,
            collapsed: group.collapsed,
            page: group.page.current(),
            total_pages: group.page.total_pages(count),
            page_label: group.page.label(count),
            tri_state: self.selection.group_tri_state(group),
            checkbox: self.selection.checkbox_state(group),
            hidden_selected: group.page.saved().len(),
            items: PaginationController::current_window(group)
                .iter()
                .map(|item| ItemView {
                    id: item.id.clone(),
                    sender: item.sender.clone(),
                    subject: item.subject.clone(),
                    date: item.date.clone(),
                    checked: self.selection.is_selected(&item.id),
                })
                .collect(),
        }
    }
}

fn status_label(session: &FetchSession) -> String {
    match session.status {
        FetchStatus::Fetching => format!("Fetching emails... {}/{}", session.fetched, session.total),
        FetchStatus::Paused => format!("Paused at {}/{}", session.fetched, session.total),
        FetchStatus::Complete => format!("Complete: {} emails", session.fetched),
        FetchStatus::Error => format!(
            "Error: {}",
            session.last_error.as_deref().unwrap_or("unknown error")
        ),
    }
}
