use serde_json::{json, Value};
use std::collections::VecDeque;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;

/// What the mock serves. Status reports and fetch-more pages are consumed in
/// order; the last one keeps being served once the queue is down to it.
#[derive(Default)]
pub struct Script {
    pub status_reports: Vec<Value>,
    pub more_pages: Vec<Value>,
    pub more_fails: bool,
    pub action_fails: bool,
    pub emails: Vec<Value>,
}

struct MockState {
    status_reports: VecDeque<Value>,
    more_pages: VecDeque<Value>,
    more_fails: bool,
    action_fails: bool,
    emails: Vec<Value>,
    paused: bool,
    requests: Vec<String>,
    actions: Vec<Value>,
    authorization: Option<String>,
}

pub struct MockBackend {
    port: u16,
    state: Arc<Mutex<MockState>>,
    shutdown: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

/// Summaries `<domain>-from..=to` for one batch entry.
#[allow(dead_code)]
pub fn items(domain: &str, from: usize, to: usize) -> Value {
    Value::Array(
        (from..=to)
            .map(|i| {
                json!({
                    "id": format!("{}-{}", domain, i),
                    "sender": format!("Store <hello@{}>", domain),
                    "subject": format!("Message {}", i),
                    "date": "Thu, 16 Jan 2025 12:00:00 +0000",
                    "domain": domain
                })
            })
            .collect(),
    )
}

#[allow(dead_code)]
pub fn status_report(status: &str, fetched: u64, total: u64, grouped: Value) -> Value {
    json!({
        "status": status,
        "fetched": fetched,
        "total": total,
        "grouped": grouped,
        "last_fetch_time": "2025-01-16T12:00:00",
        "error": null,
        "domain_count": grouped.as_object().map(|m| m.len()).unwrap_or(0)
    })
}

impl MockBackend {
    pub fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").expect("bind mock server");
        let port = listener.local_addr().unwrap().port();
        let shutdown = Arc::new(AtomicBool::new(false));
        let shutdown_clone = shutdown.clone();
        let state = Arc::new(Mutex::new(MockState {
            status_reports: script.status_reports.into(),
            more_pages: script.more_pages.into(),
            more_fails: script.more_fails,
            action_fails: script.action_fails,
            emails: script.emails,
            paused: false,
            requests: Vec::new(),
            actions: Vec::new(),
            authorization: None,
        }));
        let state_clone = state.clone();

        listener
            .set_nonblocking(true)
            .expect("set_nonblocking on listener");

        let handle = thread::spawn(move || {
            Self::serve(listener, shutdown_clone, state_clone);
        });

        MockBackend {
            port,
            state,
            shutdown,
            handle: Some(handle),
        }
    }

    pub fn url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    /// Request lines seen so far, e.g. `GET /fetch-status`.
    #[allow(dead_code)]
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }

    /// JSON bodies posted to `/action`, in order.
    #[allow(dead_code)]
    pub fn actions(&self) -> Vec<Value> {
        self.state.lock().unwrap().actions.clone()
    }

    #[allow(dead_code)]
    pub fn authorization(&self) -> Option<String> {
        self.state.lock().unwrap().authorization.clone()
    }

    #[allow(dead_code)]
    pub fn shutdown(mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
        if let Some(h) = self.handle.take() {
            let _ = h.join();
        }
    }

    fn serve(listener: TcpListener, shutdown: Arc<AtomicBool>, state: Arc<Mutex<MockState>>) {
        while !shutdown.load(Ordering::SeqCst) {
            match listener.accept() {
                Ok((stream, _)) => {
                    stream
                        .set_nonblocking(false)
                        .expect("set blocking on stream");
                    stream
                        .set_read_timeout(Some(std::time::Duration::from_secs(5)))
                        .ok();
                    Self::handle_connection(stream, &state);
                }
                Err(ref e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                    thread::sleep(std::time::Duration::from_millis(10));
                    continue;
                }
                Err(_) => break,
            }
        }
    }

    fn handle_connection(mut stream: std::net::TcpStream, state: &Arc<Mutex<MockState>>) {
        let mut reader = BufReader::new(stream.try_clone().expect("clone stream"));

        let mut request_line = String::new();
        if reader.read_line(&mut request_line).is_err() {
            return;
        }

        let mut content_length: usize = 0;
        let mut authorization = None;
        loop {
            let mut header = String::new();
            if reader.read_line(&mut header).is_err() {
                return;
            }
            let trimmed = header.trim();
            if trimmed.is_empty() {
                break;
            }
            let Some((name, value)) = trimmed.split_once(':') else {
                continue;
            };
            match name.trim().to_ascii_lowercase().as_str() {
                "content-length" => content_length = value.trim().parse().unwrap_or(0),
                "authorization" => authorization = Some(value.trim().to_string()),
                _ => {}
            }
        }

        let mut body = vec![0u8; content_length];
        if content_length > 0 && reader.read_exact(&mut body).is_err() {
            return;
        }

        let parts: Vec<&str> = request_line.split_whitespace().collect();
        if parts.len() < 2 {
            return;
        }
        let method = parts[0];
        let target = parts[1];
        let path = target.split('?').next().unwrap_or(target);

        let (status, response_body) = {
            let mut st = state.lock().unwrap();
            st.requests.push(format!("{} {}", method, target));
            if authorization.is_some() {
                st.authorization = authorization;
            }
            match (method, path) {
                ("GET", "/fetch-status") => Self::handle_status(&mut st),
                ("GET", "/fetch-more") => Self::handle_more(&mut st),
                ("POST", "/pause-fetch") => {
                    st.paused = true;
                    ok(json!({"status": "paused"}))
                }
                ("POST", "/resume-fetch") => {
                    st.paused = false;
                    ok(json!({"status": "fetching"}))
                }
                ("GET", "/fetch-logs") => Self::handle_logs(&st),
                ("POST", "/action") => Self::handle_action(&mut st, &body),
                ("GET", "/clear-cache") => ok(json!({"removed": 3})),
                ("GET", p) if p.starts_with("/email/") => {
                    Self::handle_email(&st, &p["/email/".len()..])
                }
                _ => (
                    "404 Not Found".to_string(),
                    json!({"error": "not found"}).to_string(),
                ),
            }
        };

        let response = format!(
            "HTTP/1.1 {}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
            status,
            response_body.len(),
            response_body
        );
        let _ = stream.write_all(response.as_bytes());
        let _ = stream.flush();
    }

    fn current_status(st: &MockState) -> Value {
        let mut report = st
            .status_reports
            .front()
            .cloned()
            .unwrap_or_else(|| status_report("fetching", 0, 0, json!({})));
        if st.paused && report["status"] == "fetching" {
            report["status"] = json!("paused");
        }
        report
    }

    fn handle_status(st: &mut MockState) -> (String, String) {
        let report = Self::current_status(st);
        if st.status_reports.len() > 1 {
            st.status_reports.pop_front();
        }
        ok(report)
    }

    fn handle_more(st: &mut MockState) -> (String, String) {
        if st.more_fails {
            return (
                "503 Service Unavailable".to_string(),
                json!({"error": "Gmail API unavailable"}).to_string(),
            );
        }
        let page = st
            .more_pages
            .front()
            .cloned()
            .unwrap_or_else(|| json!({"next_page_token": null, "count": 0, "emails": {}}));
        if st.more_pages.len() > 1 {
            st.more_pages.pop_front();
        }
        ok(page)
    }

    fn handle_logs(st: &MockState) -> (String, String) {
        let report = Self::current_status(st);
        ok(json!({
            "status": report["status"],
            "fetched": report["fetched"],
            "total": report["total"],
            "last_fetch_time": report["last_fetch_time"],
            "error": report["error"],
            "domain_count": report["domain_count"],
        }))
    }

    fn handle_action(st: &mut MockState, body: &[u8]) -> (String, String) {
        let Ok(request) = serde_json::from_slice::<Value>(body) else {
            return (
                "400 Bad Request".to_string(),
                json!({"error": "invalid body"}).to_string(),
            );
        };
        if st.action_fails {
            return (
                "500 Internal Server Error".to_string(),
                json!({"error": "Gmail API unavailable"}).to_string(),
            );
        }
        let applied = request["email_ids"].as_array().map_or(0, |ids| ids.len());
        st.actions.push(request);
        ok(json!({"applied": applied}))
    }

    fn handle_email(st: &MockState, id: &str) -> (String, String) {
        match st.emails.iter().find(|e| e["id"] == id) {
            Some(email) => ok(email.clone()),
            None => (
                "404 Not Found".to_string(),
                json!({"error": "Email not found"}).to_string(),
            ),
        }
    }
}

fn ok(body: Value) -> (String, String) {
    ("200 OK".to_string(), body.to_string())
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::SeqCst);
    }
}
