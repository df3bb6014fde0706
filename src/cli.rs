use crate::api::types::BulkAction;
use crate::backend::{BackendCommand, BackendResponse};
use crate::state::now_secs;
use crate::sync::poller::TickBlocked;
use crate::sync::{ActionOutcome, SyncEvent, Synchronizer, UserAction};
use serde_json::{json, Value};
use std::io::{self, BufRead, Write};
use std::sync::mpsc;
use std::time::Duration;

struct CliState {
    sync: Synchronizer,
    cmd_tx: mpsc::Sender<BackendCommand>,
    resp_rx: mpsc::Receiver<BackendResponse>,
}

impl CliState {
    fn send_cmd(&self, cmd: BackendCommand) -> Result<(), String> {
        self.cmd_tx
            .send(cmd)
            .map_err(|_| "backend channel closed".to_string())
    }

    fn recv_resp(&self) -> Result<BackendResponse, String> {
        self.resp_rx
            .recv()
            .map_err(|_| "backend channel closed".to_string())
    }

    /// Send a session command and apply its completion.
    fn round_trip(&mut self, cmd: BackendCommand) -> Result<SyncEvent, String> {
        self.send_cmd(cmd)?;
        let resp = self.recv_resp()?;
        self.sync
            .on_response(resp)
            .ok_or_else(|| "unexpected response from backend".to_string())
    }
}

fn ok_response(data: Value) -> Value {
    let mut obj = match data {
        Value::Object(m) => m,
        _ => {
            let mut m = serde_json::Map::new();
            m.insert("data".to_string(), data);
            m
        }
    };
    obj.insert("ok".to_string(), Value::Bool(true));
    Value::Object(obj)
}

fn err_response(msg: &str) -> Value {
    json!({"ok": false, "error": msg})
}

fn event_response(event: SyncEvent) -> Value {
    match event {
        SyncEvent::Observed {
            applied,
            transition,
        } => ok_response(json!({
            "polled": true,
            "applied": applied,
            "transition": transition.map(|(from, to)| json!({"from": from, "to": to})),
        })),
        SyncEvent::PollFailed { error } => err_response(&error),
        SyncEvent::MoreLoaded { applied } => ok_response(json!({"applied": applied})),
        SyncEvent::MoreFailed { error } => err_response(&error),
        SyncEvent::MoreDiscarded => ok_response(json!({"applied": 0, "discarded": true})),
        SyncEvent::ControlDone { command, status } => {
            ok_response(json!({"command": command, "status": status}))
        }
        SyncEvent::ControlFailed { command, error } => {
            err_response(&format!("{:?} failed: {}", command, error))
        }
        SyncEvent::ActionApplied {
            action,
            applied,
            deselected,
        } => ok_response(json!({"action": action, "applied": applied, "deselected": deselected})),
        SyncEvent::ActionFailed { action, error } => {
            err_response(&format!("{} failed: {}", action, error))
        }
        SyncEvent::CacheCleared { removed } => ok_response(json!({"removed": removed})),
        SyncEvent::CacheClearFailed { error } => err_response(&error),
    }
}

fn outcome_response(outcome: ActionOutcome, unknown: &str) -> Value {
    match outcome {
        ActionOutcome::Toggled { id, checked } => {
            ok_response(json!({"id": id, "checked": checked}))
        }
        ActionOutcome::GroupSet { domain, tri_state } => {
            ok_response(json!({"domain": domain, "tri_state": tri_state}))
        }
        ActionOutcome::PageChanged {
            domain,
            page,
            moved,
        } => ok_response(json!({"domain": domain, "page": page, "moved": moved})),
        ActionOutcome::Collapsed { domain, collapsed } => {
            ok_response(json!({"domain": domain, "collapsed": collapsed}))
        }
        ActionOutcome::Ignored => err_response(unknown),
    }
}

fn str_field<'a>(input: &'a Value, field: &str) -> Result<&'a str, Value> {
    input
        .get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| err_response(&format!("missing '{}' field", field)))
}

fn dispatch(state: &mut CliState, input: &Value) -> Value {
    let command = match input.get("command").and_then(|v| v.as_str()) {
        Some(c) => c,
        None => return err_response("missing 'command' field"),
    };

    match command {
        "status" => cmd_status(state),
        "view" => cmd_view(state),
        "poll" => cmd_poll(state, input),
        "load_more" => cmd_load_more(state),
        "pause" => cmd_control(state, true),
        "resume" => cmd_control(state, false),
        "toggle" => cmd_toggle(state, input),
        "select_group" => cmd_select_group(state, input),
        "goto_page" => cmd_goto_page(state, input),
        "collapse" => cmd_collapse(state, input),
        "selection" => cmd_selection(state),
        "logs" => cmd_logs(state),
        "get_email" => cmd_get_email(state, input),
        "apply_action" => cmd_apply_action(state, input),
        "clear_cache" => cmd_clear_cache(state),
        _ => err_response(&format!("unknown command '{}'", command)),
    }
}

fn cmd_status(state: &CliState) -> Value {
    let next_poll_ms = match state.sync.check_tick() {
        Ok(()) => Some(0),
        Err(TickBlocked::NotDue { wait_ms }) => Some(wait_ms),
        Err(_) => None,
    };
    ok_response(json!({
        "session": state.sync.session(),
        "items": state.sync.item_count(),
        "groups": state.sync.order().len(),
        "pending_control": state.sync.pending_control(),
        "next_poll_ms": next_poll_ms,
    }))
}

fn cmd_view(state: &CliState) -> Value {
    match serde_json::to_value(state.sync.view()) {
        Ok(v) => ok_response(v),
        Err(e) => err_response(&format!("failed to serialize view: {}", e)),
    }
}

fn cmd_poll(state: &mut CliState, input: &Value) -> Value {
    let wait = input.get("wait").and_then(|v| v.as_bool()).unwrap_or(false);

    let cmd = loop {
        match state.sync.tick() {
            Ok(cmd) => break cmd,
            Err(TickBlocked::NotDue { wait_ms }) if wait => {
                std::thread::sleep(Duration::from_millis(wait_ms));
            }
            Err(TickBlocked::NotDue { wait_ms }) => {
                return ok_response(json!({"polled": false, "reason": "not_due", "wait_ms": wait_ms}))
            }
            Err(TickBlocked::Halted) => {
                return ok_response(json!({"polled": false, "reason": "halted"}))
            }
            Err(TickBlocked::InFlight) => {
                return ok_response(json!({"polled": false, "reason": "in_flight"}))
            }
        }
    };

    match state.round_trip(cmd) {
        Ok(event) => event_response(event),
        Err(e) => err_response(&e),
    }
}

fn cmd_load_more(state: &mut CliState) -> Value {
    let Some(cmd) = state.sync.request_more() else {
        return ok_response(json!({"applied": 0, "reason": "in_flight"}));
    };
    match state.round_trip(cmd) {
        Ok(event) => event_response(event),
        Err(e) => err_response(&e),
    }
}

fn cmd_control(state: &mut CliState, pause: bool) -> Value {
    let cmd = if pause {
        state.sync.pause()
    } else {
        state.sync.resume()
    };
    let Some(cmd) = cmd else {
        return err_response(&format!(
            "{} is not available while {}",
            if pause { "pause" } else { "resume" },
            state.sync.session().status
        ));
    };
    match state.round_trip(cmd) {
        Ok(event) => event_response(event),
        Err(e) => err_response(&e),
    }
}

fn cmd_toggle(state: &mut CliState, input: &Value) -> Value {
    let id = match str_field(input, "id") {
        Ok(id) => id.to_string(),
        Err(resp) => return resp,
    };
    let unknown = format!("unknown id '{}'", id);
    outcome_response(state.sync.dispatch(UserAction::Toggle { id }), &unknown)
}

fn cmd_select_group(state: &mut CliState, input: &Value) -> Value {
    let domain = match str_field(input, "domain") {
        Ok(d) => d.to_string(),
        Err(resp) => return resp,
    };
    let checked = input.get("checked").and_then(|v| v.as_bool()).unwrap_or(true);
    let unknown = format!("unknown domain '{}'", domain);
    outcome_response(
        state
            .sync
            .dispatch(UserAction::SelectGroup { domain, checked }),
        &unknown,
    )
}

fn cmd_goto_page(state: &mut CliState, input: &Value) -> Value {
    let domain = match str_field(input, "domain") {
        Ok(d) => d.to_string(),
        Err(resp) => return resp,
    };
    let page = match input.get("page").and_then(|v| v.as_u64()) {
        Some(p) => p as usize,
        None => return err_response("missing 'page' field"),
    };
    let unknown = format!("unknown domain '{}'", domain);
    outcome_response(
        state.sync.dispatch(UserAction::GotoPage { domain, page }),
        &unknown,
    )
}

fn cmd_collapse(state: &mut CliState, input: &Value) -> Value {
    let domain = match str_field(input, "domain") {
        Ok(d) => d.to_string(),
        Err(resp) => return resp,
    };
    let unknown = format!("unknown domain '{}'", domain);
    outcome_response(
        state.sync.dispatch(UserAction::ToggleCollapsed { domain }),
        &unknown,
    )
}

fn cmd_selection(state: &CliState) -> Value {
    let ids = state.sync.selected_ids();
    ok_response(json!({"count": ids.len(), "ids": ids}))
}

fn cmd_apply_action(state: &mut CliState, input: &Value) -> Value {
    let name = match str_field(input, "action") {
        Ok(a) => a,
        Err(resp) => return resp,
    };
    let Some(action) = BulkAction::parse(name) else {
        return err_response(&format!(
            "unknown action '{}' (expected read, archive or delete)",
            name
        ));
    };
    let Some(cmd) = state.sync.apply_action(action) else {
        return err_response("no emails selected");
    };
    match state.round_trip(cmd) {
        Ok(event) => event_response(event),
        Err(e) => err_response(&e),
    }
}

fn cmd_clear_cache(state: &mut CliState) -> Value {
    match state.round_trip(BackendCommand::ClearCache) {
        Ok(event) => event_response(event),
        Err(e) => err_response(&e),
    }
}

fn cmd_logs(state: &mut CliState) -> Value {
    if let Err(e) = state.send_cmd(BackendCommand::FetchLogs) {
        return err_response(&e);
    }
    match state.recv_resp() {
        Ok(BackendResponse::Logs(Ok(logs))) => match serde_json::to_value(logs) {
            Ok(v) => ok_response(v),
            Err(e) => err_response(&format!("failed to serialize logs: {}", e)),
        },
        Ok(BackendResponse::Logs(Err(e))) => err_response(&e),
        Ok(_) => err_response("unexpected response from backend"),
        Err(e) => err_response(&e),
    }
}

fn cmd_get_email(state: &mut CliState, input: &Value) -> Value {
    let id = match str_field(input, "id") {
        Ok(id) => id.to_string(),
        Err(resp) => return resp,
    };

    let now = now_secs();
    if let Some(detail) = state
        .sync
        .state()
        .and_then(|s| s.get_email_detail(&id, now))
    {
        log_debug!("[CLI] email {} served from cache", id);
        return match serde_json::to_value(detail) {
            Ok(v) => ok_response(json!({"cached": true, "email": v})),
            Err(e) => err_response(&format!("failed to serialize email: {}", e)),
        };
    }

    if let Err(e) = state.send_cmd(BackendCommand::GetEmail { id }) {
        return err_response(&e);
    }

    match state.recv_resp() {
        Ok(BackendResponse::EmailDetail {
            id,
            result: boxed_result,
        }) => match *boxed_result {
            Ok(detail) => {
                log_debug!("[CLI] email {} fetched from backend", id);
                if let Some(store) = state.sync.state() {
                    store.put_email_detail(&detail, now);
                }
                match serde_json::to_value(detail) {
                    Ok(v) => ok_response(json!({"cached": false, "email": v})),
                    Err(e) => err_response(&format!("failed to serialize email: {}", e)),
                }
            }
            Err(e) => err_response(&e),
        },
        Ok(_) => err_response("unexpected response from backend"),
        Err(e) => err_response(&e),
    }
}

pub fn run_cli(
    sync: Synchronizer,
    cmd_tx: mpsc::Sender<BackendCommand>,
    resp_rx: mpsc::Receiver<BackendResponse>,
) {
    let mut state = CliState {
        sync,
        cmd_tx,
        resp_rx,
    };

    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut stdout = stdout.lock();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) => l,
            Err(_) => break,
        };

        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }

        let input: Value = match serde_json::from_str(trimmed) {
            Ok(v) => v,
            Err(e) => {
                let resp = err_response(&format!("JSON parse error: {}", e));
                let _ = serde_json::to_writer(&mut stdout, &resp);
                let _ = stdout.write_all(b"\n");
                let _ = stdout.flush();
                continue;
            }
        };

        let response = dispatch(&mut state, &input);
        let _ = serde_json::to_writer(&mut stdout, &response);
        let _ = stdout.write_all(b"\n");
        let _ = stdout.flush();
    }

    // Shutdown backend on exit
    let _ = state.cmd_tx.send(BackendCommand::Shutdown);
}

pub fn print_help_cli() {
    print!(
        r#"mailgroup --cli: JSON-over-stdin/stdout CLI mode
================================================

Protocol: Newline-Delimited JSON (NDJSON)
- Send one JSON object per line to stdin
- Receive one JSON response per line from stdout
- Responses have {{"ok": true, ...}} on success or {{"ok": false, "error": "..."}} on failure

The session connects to the configured [server] on startup. Nothing is fetched until
the first poll.

Session Commands
----------------
poll: Request /fetch-status if a poll is due and merge the reported groups.
   > {{"command": "poll"}}
   < {{"ok": true, "polled": true, "applied": 12, "transition": {{"from": "fetching", "to": "paused"}}}}
   < {{"ok": true, "polled": false, "reason": "not_due", "wait_ms": 640}}
   Optional: wait (bool, default false) sleeps until the poll is due.
   "reason" is one of not_due, halted (backend error, resume to continue), in_flight.

load_more: Pull the next page of the backend's own pagination.
   > {{"command": "load_more"}}
   < {{"ok": true, "applied": 25}}

pause / resume: Ask the backend to pause or resume its fetch job.
   > {{"command": "pause"}}
   < {{"ok": true, "command": "pause", "status": "paused"}}
   The local status follows the next poll.

status: Session counters and time until the next poll.
   > {{"command": "status"}}
   < {{"ok": true, "session": {{"fetched": 50, "total": 200, "status": "fetching", ...}}, "items": 50, "groups": 7, "next_poll_ms": 0}}

view: Full render snapshot (groups in display order, current page items, controls).
   > {{"command": "view"}}
   < {{"ok": true, "status": "fetching", "status_label": "Fetching emails... 50/200", "progress_percent": 25,
       "pause_enabled": true, "resume_enabled": false, "load_more_visible": false, "selected_count": 0,
       "groups": [{{"domain": "shop.com", "count": 12, "page_label": "1/2", "tri_state": "unchecked",
                   "checkbox": "indeterminate", "hidden_selected": 1, "items": [...]}}]}}
   tri_state covers the rendered page only. checkbox also reads indeterminate
   while items on other pages of the group are selected, and matches the
   tri_state returned by select_group.

List Commands
-------------
toggle:       {{"command": "toggle", "id": "email-id"}}
select_group: {{"command": "select_group", "domain": "shop.com", "checked": true}}  (current page only)
goto_page:    {{"command": "goto_page", "domain": "shop.com", "page": 2}}
collapse:     {{"command": "collapse", "domain": "shop.com"}}  (toggles, persisted)
selection:    {{"command": "selection"}}
   < {{"ok": true, "count": 2, "ids": ["id1", "id2"]}}

apply_action: Mark read, archive or delete every selected email.
   > {{"command": "apply_action", "action": "archive"}}
   < {{"ok": true, "action": "archive", "applied": 2, "deselected": 2}}
   On success the ids are deselected. The emails stay listed; group counts never shrink.
   Deleting also drops their cached previews. Fails if nothing is selected.

Backend Commands
----------------
logs: Backend diagnostics snapshot from /fetch-logs.
   > {{"command": "logs"}}
   < {{"ok": true, "status": "fetching", "fetched": 50, "total": 200, "last_fetch_time": "...", "error": null, "domain_count": 7}}

clear_cache: Ask the backend to drop its caches and forget local previews.
   > {{"command": "clear_cache"}}
   < {{"ok": true, "removed": 12}}

get_email: Fetch one email with its body. Cached for 24 hours.
   > {{"command": "get_email", "id": "email-id"}}
   < {{"ok": true, "cached": false, "email": {{"id": "...", "subject": "...", "body": "<p>...</p>", "body_text": "..."}}}}
"#
    );
}
