use serde::Serialize;

use crate::api::types::{FetchStatus, FetchStatusReport};
use crate::config::PollConfig;

/// Client view of the backend job.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FetchSession {
    pub fetched: u64,
    pub total: u64,
    pub next_page_token: Option<String>,
    pub status: FetchStatus,
    pub last_update: Option<String>,
    pub last_error: Option<String>,
    pub domain_count: Option<u64>,
}

impl FetchSession {
    fn new() -> Self {
        FetchSession {
            fetched: 0,
            total: 0,
            next_page_token: None,
            status: FetchStatus::Fetching,
            last_update: None,
            last_error: None,
            domain_count: None,
        }
    }

    /// Counts only move forward, and total never trails fetched.
    pub fn absorb_counts(&mut self, fetched: u64, total: u64) {
        self.fetched = self.fetched.max(fetched);
        self.total = self.total.max(total).max(self.fetched);
    }

    pub fn progress(&self) -> f64 {
        if self.total == 0 {
            1.0
        } else {
            (self.fetched as f64 / self.total as f64).min(1.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ControlCommand {
    Pause,
    Resume,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingControl {
    command: ControlCommand,
    /// Sequence of the last poll begun when the backend accepted the command.
    acknowledged_at_poll: Option<u64>,
}

/// Why a tick did not issue a status request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickBlocked {
    InFlight,
    Halted,
    NotDue { wait_ms: u64 },
}

pub type Transition = (FetchStatus, FetchStatus);

pub struct FetchStatusPoller {
    config: PollConfig,
    session: FetchSession,
    in_flight: bool,
    polls_begun: u64,
    last_observed_at: Option<u64>,
    fetching_since: u64,
    next_tick_at: Option<u64>,
    pending_control: Option<PendingControl>,
}

impl FetchStatusPoller {
    pub fn new(config: PollConfig, now: u64) -> Self {
        FetchStatusPoller {
            config,
            session: FetchSession::new(),
            in_flight: false,
            polls_begun: 0,
            last_observed_at: None,
            fetching_since: now,
            next_tick_at: Some(now),
            pending_control: None,
        }
    }

    pub fn session(&self) -> &FetchSession {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut FetchSession {
        &mut self.session
    }

    /// Current cadence, or None while polling is halted.
    pub fn interval_ms(&self, now: u64) -> Option<u64> {
        match self.session.status {
            FetchStatus::Fetching => {
                if now.saturating_sub(self.fetching_since) < self.config.fast_window_ms {
                    Some(self.config.fast_interval_ms)
                } else {
                    Some(self.config.slow_interval_ms)
                }
            }
            FetchStatus::Paused | FetchStatus::Complete => Some(self.config.idle_interval_ms),
            FetchStatus::Error => None,
        }
    }

    pub fn check_tick(&self, now: u64) -> Result<(), TickBlocked> {
        if self.in_flight {
            return Err(TickBlocked::InFlight);
        }
        let Some(due_at) = self.next_tick_at else {
            return Err(TickBlocked::Halted);
        };
        let spaced_at = self
            .last_observed_at
            .map_or(0, |at| at + self.config.min_spacing_ms);
        let ready_at = due_at.max(spaced_at);
        if now < ready_at {
            return Err(TickBlocked::NotDue {
                wait_ms: ready_at - now,
            });
        }
        Ok(())
    }

    /// Claim the next status request. False means the tick is suppressed.
    pub fn begin_poll(&mut self, now: u64) -> bool {
        if self.check_tick(now).is_err() {
            return false;
        }
        self.in_flight = true;
        self.polls_begun += 1;
        true
    }

    /// Apply one status observation. Returns the accepted transition, if any.
    pub fn observe(&mut self, report: &FetchStatusReport, now: u64) -> Option<Transition> {
        self.in_flight = false;
        self.last_observed_at = Some(now);

        let session = &mut self.session;
        session.absorb_counts(report.fetched, report.total);
        if report.last_fetch_time.is_some() {
            session.last_update = report.last_fetch_time.clone();
        }
        if report.domain_count.is_some() {
            session.domain_count = report.domain_count;
        }
        if report.next_page_token.is_some() {
            session.next_page_token = report.next_page_token.clone();
        }

        let from = session.status;
        let to = report.status;
        let mut transition = None;
        if from != to {
            if from.can_transition_to(to) {
                log_info!("[Poller] status {} -> {}", from, to);
                session.status = to;
                transition = Some((from, to));
                if to == FetchStatus::Fetching {
                    self.fetching_since = now;
                    session.last_error = None;
                }
            } else {
                log_warn!("[Poller] ignoring reported status {} while {}", to, from);
            }
        }
        if session.status == FetchStatus::Error {
            if report.error.is_some() {
                session.last_error = report.error.clone();
            }
            if session.last_error.is_none() {
                session.last_error = Some("backend reported an error".to_string());
            }
        }

        // Only a poll begun after the acknowledgment can reflect the command.
        if let Some(pending) = self.pending_control {
            if pending
                .acknowledged_at_poll
                .is_some_and(|seq| self.polls_begun > seq)
            {
                self.pending_control = None;
            }
        }

        self.schedule(now);
        transition
    }

    /// A status request failed in transit. State is left alone.
    pub fn poll_failed(&mut self, now: u64) {
        self.in_flight = false;
        self.schedule(now);
    }

    fn schedule(&mut self, now: u64) {
        self.next_tick_at = self.interval_ms(now).map(|ms| now + ms);
        if self.next_tick_at.is_none() {
            log_warn!("[Poller] polling halted until resume");
        }
    }

    pub fn pause_enabled(&self) -> bool {
        self.session.status == FetchStatus::Fetching && self.pending_control.is_none()
    }

    pub fn resume_enabled(&self) -> bool {
        matches!(
            self.session.status,
            FetchStatus::Paused | FetchStatus::Error
        ) && self.pending_control.is_none()
    }

    /// Claim a control command; disables its control until resolved and observed.
    pub fn request_control(&mut self, command: ControlCommand) -> bool {
        let enabled = match command {
            ControlCommand::Pause => self.pause_enabled(),
            ControlCommand::Resume => self.resume_enabled(),
        };
        if enabled {
            self.pending_control = Some(PendingControl {
                command,
                acknowledged_at_poll: None,
            });
        }
        enabled
    }

    pub fn control_resolved(
        &mut self,
        command: ControlCommand,
        result: &Result<FetchStatus, String>,
        now: u64,
    ) {
        match result {
            Err(e) => {
                log_warn!("[Poller] {:?} failed: {}", command, e);
                self.pending_control = None;
            }
            Ok(reported) => {
                log_info!("[Poller] {:?} accepted (backend says {})", command, reported);
                self.pending_control = Some(PendingControl {
                    command,
                    acknowledged_at_poll: Some(self.polls_begun),
                });
                let soon = now + self.config.fast_interval_ms;
                if command == ControlCommand::Resume
                    && self.session.status == FetchStatus::Error
                {
                    log_info!("[Poller] status error -> paused (resume accepted)");
                    self.session.status = FetchStatus::Paused;
                    self.fetching_since = now;
                    self.next_tick_at = Some(soon);
                } else if let Some(at) = self.next_tick_at {
                    // Look again soon so the change shows up without waiting a heartbeat.
                    self.next_tick_at = Some(at.min(soon));
                }
            }
        }
    }

    pub fn pending_control(&self) -> Option<ControlCommand> {
        self.pending_control.map(|p| p.command)
    }
}
