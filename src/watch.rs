use crate::api::types::FetchStatus;
use crate::backend::{BackendCommand, BackendResponse};
use crate::sync::{ListView, SyncEvent, Synchronizer};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::time::Duration;

const DRAIN_TIMEOUT: Duration = Duration::from_millis(50);

/// Follow the backend job until it completes. Returns the process exit code.
pub fn run_watch(
    mut sync: Synchronizer,
    cmd_tx: mpsc::Sender<BackendCommand>,
    resp_rx: mpsc::Receiver<BackendResponse>,
) -> i32 {
    let code = loop {
        if let Ok(cmd) = sync.tick() {
            if cmd_tx.send(cmd).is_err() {
                eprintln!("Backend thread exited unexpectedly");
                break 1;
            }
        }

        let resp = match resp_rx.recv_timeout(DRAIN_TIMEOUT) {
            Ok(resp) => resp,
            Err(RecvTimeoutError::Timeout) => continue,
            Err(RecvTimeoutError::Disconnected) => {
                eprintln!("Backend thread exited unexpectedly");
                break 1;
            }
        };

        match sync.on_response(resp) {
            Some(SyncEvent::Observed { applied, .. }) => {
                let view = sync.view();
                println!("{}", progress_line(&view, applied));
                match view.status {
                    FetchStatus::Complete => {
                        print!("{}", format_summary(&view));
                        break 0;
                    }
                    FetchStatus::Error => {
                        eprintln!("{}", view.status_label);
                        break 1;
                    }
                    FetchStatus::Fetching | FetchStatus::Paused => {}
                }
            }
            Some(SyncEvent::PollFailed { error }) => {
                eprintln!("Status poll failed: {} (retrying)", error);
            }
            _ => {}
        }
    };

    let _ = cmd_tx.send(BackendCommand::Shutdown);
    code
}

pub fn progress_line(view: &ListView, applied: usize) -> String {
    format!(
        "[{:>3}%] {} | {} groups, {} new",
        view.progress_percent,
        view.status_label,
        view.groups.len(),
        applied
    )
}

/// One line per group in display order.
pub fn format_summary(view: &ListView) -> String {
    let width = view
        .groups
        .iter()
        .map(|g| g.count.to_string().len())
        .max()
        .unwrap_or(1);
    let mut out = String::new();
    for group in &view.groups {
        out.push_str(&format!(
            "{:>width$}  {}\n",
            group.count,
            group.domain,
            width = width
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::PollConfig;
    use crate::sync::clock::ManualClock;
    use serde_json::json;

    fn view_with(groups: &[(&str, usize)]) -> ListView {
        let clock = ManualClock::default();
        let mut sync = Synchronizer::new(10, PollConfig::default(), Box::new(clock), None);
        let mut wire = serde_json::Map::new();
        for (domain, n) in groups {
            let items: Vec<_> = (0..*n)
                .map(|i| json!({"id": format!("{}-{}", domain, i), "sender": format!("x@{}", domain)}))
                .collect();
            wire.insert(domain.to_string(), json!(items));
        }
        sync.merge(&wire);
        sync.view()
    }

    #[test]
    fn test_summary_is_aligned_and_ordered() {
        let view = view_with(&[("small.org", 3), ("big.com", 120)]);
        assert_eq!(format_summary(&view), "120  big.com\n  3  small.org\n");
    }

    #[test]
    fn test_progress_line() {
        let view = view_with(&[("a.com", 2)]);
        assert_eq!(
            progress_line(&view, 2),
            "[100%] Fetching emails... 2/2 | 1 groups, 2 new"
        );
    }
}
