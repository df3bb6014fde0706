use base64::Engine;
use serde::de::DeserializeOwned;
use serde::Serialize;

use super::types::*;
use crate::config::ServerConfig;

pub struct BackendClient {
    agent: ureq::Agent,
    base_url: String,
    auth: Option<String>,
}

#[derive(Debug)]
pub enum ApiError {
    Http(String),
    Parse(String),
    Api(String),
}

impl std::fmt::Display for ApiError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ApiError::Http(e) => write!(f, "HTTP error: {}", e),
            ApiError::Parse(e) => write!(f, "Parse error: {}", e),
            ApiError::Api(e) => write!(f, "API error: {}", e),
        }
    }
}

impl BackendClient {
    pub fn new(server: &ServerConfig, password: Option<&str>) -> Self {
        let agent = ureq::AgentBuilder::new().timeout(server.timeout).build();
        let auth = match (server.username.as_deref(), password) {
            (Some(user), Some(pass)) => Some(Self::auth_header(user, pass)),
            _ => None,
        };
        BackendClient {
            agent,
            base_url: server.base_url.clone(),
            auth,
        }
    }

    fn auth_header(username: &str, password: &str) -> String {
        let credentials = format!("{}:{}", username, password);
        let encoded = base64::engine::general_purpose::STANDARD.encode(credentials);
        format!("Basic {}", encoded)
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn send<T: DeserializeOwned>(&self, request: ureq::Request) -> Result<T, ApiError> {
        self.send_body(request, None::<&()>)
    }

    fn send_body<T: DeserializeOwned, B: Serialize>(
        &self,
        request: ureq::Request,
        body: Option<&B>,
    ) -> Result<T, ApiError> {
        let request = match self.auth {
            Some(ref auth) => request.set("Authorization", auth),
            None => request,
        };
        let url = request.url().to_string();
        log_debug!("[API] {} {}", request.method(), url);

        let result = match body {
            Some(body) => request
                .set("Content-Type", "application/json")
                .send_json(body),
            None => request.call(),
        };
        let response = match result {
            Ok(resp) => resp,
            Err(ureq::Error::Status(code, resp)) => {
                let body = resp.into_string().unwrap_or_default();
                log_error!("[API] HTTP error {} from {}: {}", code, url, body);
                if code == 401 {
                    return Err(ApiError::Http(
                        "Authentication failed (401 Unauthorized)".to_string(),
                    ));
                }
                return Err(ApiError::Http(format!(
                    "HTTP {} error: {}",
                    code,
                    if body.is_empty() {
                        "(empty response)".to_string()
                    } else {
                        truncate_str(&body, 200).to_string()
                    }
                )));
            }
            Err(e) => {
                log_error!("[API] Connection error for {}: {}", url, e);
                return Err(ApiError::Http(e.to_string()));
            }
        };

        let body = response
            .into_string()
            .map_err(|e| ApiError::Parse(format!("Failed to read response: {}", e)))?;
        if body.is_empty() {
            return Err(ApiError::Api("Server returned empty response".to_string()));
        }
        log_debug!(
            "[API] Response body ({} bytes): {}",
            body.len(),
            truncate_str(&body, 500)
        );

        serde_json::from_str(&body).map_err(|e| {
            ApiError::Parse(format!(
                "Failed to parse response: {}. Response was: {}",
                e,
                truncate_str(&body, 200)
            ))
        })
    }

    pub fn fetch_status(&self) -> Result<FetchStatusReport, ApiError> {
        let report: FetchStatusReport = self.send(self.agent.get(&self.url("/fetch-status")))?;
        log_debug!(
            "[API] fetch-status: {} {}/{} ({} domains in batch)",
            report.status,
            report.fetched,
            report.total,
            report.grouped.len()
        );
        Ok(report)
    }

    pub fn fetch_more(
        &self,
        page_token: Option<&str>,
        current_count: u64,
    ) -> Result<FetchMoreReport, ApiError> {
        log_info!(
            "[API] fetch-more (page_token: {:?}, current_count: {})",
            page_token,
            current_count
        );
        let request = self
            .agent
            .get(&self.url("/fetch-more"))
            .query("page_token", page_token.unwrap_or(""))
            .query("current_count", &current_count.to_string());
        let report: FetchMoreReport = self.send(request)?;
        log_info!(
            "[API] fetch-more returned count {} across {} domains",
            report.count,
            report.emails.len()
        );
        Ok(report)
    }

    pub fn pause(&self) -> Result<FetchStatus, ApiError> {
        log_info!("[API] pause-fetch");
        let report: ControlReport = self.send(self.agent.post(&self.url("/pause-fetch")))?;
        Ok(report.status)
    }

    pub fn resume(&self) -> Result<FetchStatus, ApiError> {
        log_info!("[API] resume-fetch");
        let report: ControlReport = self.send(self.agent.post(&self.url("/resume-fetch")))?;
        Ok(report.status)
    }

    pub fn fetch_logs(&self) -> Result<FetchLogs, ApiError> {
        self.send(self.agent.get(&self.url("/fetch-logs")))
    }

    /// Apply `action` to `ids`. Returns how many emails the backend processed.
    pub fn apply_action(&self, action: BulkAction, ids: &[String]) -> Result<u64, ApiError> {
        if ids.is_empty() {
            return Err(ApiError::Api("no emails selected".to_string()));
        }
        log_info!("[API] action {} on {} emails", action, ids.len());
        let request = ActionRequest {
            action_type: action,
            email_ids: ids,
        };
        let report: ActionReport =
            self.send_body(self.agent.post(&self.url("/action")), Some(&request))?;
        Ok(report.applied.unwrap_or(ids.len() as u64))
    }

    pub fn clear_cache(&self) -> Result<u64, ApiError> {
        log_info!("[API] clear-cache");
        let report: ClearCacheReport = self.send(self.agent.get(&self.url("/clear-cache")))?;
        Ok(report.removed)
    }

    pub fn get_email(&self, id: &str) -> Result<EmailDetail, ApiError> {
        if id.is_empty() {
            return Err(ApiError::Api("empty email id".to_string()));
        }
        log_info!("[API] email detail: {}", id);
        let path = format!("/email/{}", encode_path_segment(id));
        let mut detail: EmailDetail = self.send(self.agent.get(&self.url(&path)))?;
        if detail.id.is_empty() {
            detail.id = id.to_string();
        }
        detail.body_text = Some(body_to_text(&detail.body));
        Ok(detail)
    }
}

/// Plain-text rendering of a preview body, which the backend sends as HTML.
pub fn body_to_text(body: &str) -> String {
    html2text::from_read(body.as_bytes(), 80).unwrap_or_else(|_| body.to_string())
}

fn encode_path_segment(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        if b.is_ascii_alphanumeric() || matches!(b, b'-' | b'_' | b'.' | b'~') {
            out.push(b as char);
        } else {
            out.push_str(&format!("%{:02X}", b));
        }
    }
    out
}

fn truncate_str(s: &str, max_len: usize) -> &str {
    if s.len() <= max_len {
        s
    } else {
        let mut end = max_len;
        while end > 0 && !s.is_char_boundary(end) {
            end -= 1;
        }
        &s[..end]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn server(username: Option<&str>) -> ServerConfig {
        ServerConfig {
            name: "test".to_string(),
            base_url: "http://127.0.0.1:1".to_string(),
            timeout: Duration::from_secs(1),
            username: username.map(|u| u.to_string()),
            password_command: username.map(|_| "echo pw".to_string()),
        }
    }

    #[test]
    fn test_auth_header_only_with_credentials() {
        let client = BackendClient::new(&server(None), None);
        assert!(client.auth.is_none());

        let client = BackendClient::new(&server(Some("me")), Some("secret"));
        assert_eq!(client.auth.as_deref(), Some("Basic bWU6c2VjcmV0"));
    }

    #[test]
    fn test_encode_path_segment() {
        assert_eq!(encode_path_segment("18c2f0a9b"), "18c2f0a9b");
        assert_eq!(encode_path_segment("a/b c"), "a%2Fb%20c");
    }

    #[test]
    fn test_body_to_text_strips_markup() {
        let text = body_to_text("<p>Hello <b>there</b></p>");
        assert!(text.contains("Hello"), "got: {}", text);
        assert!(!text.contains("<p>"), "got: {}", text);
    }

    #[test]
    fn test_truncate_str_respects_char_boundary() {
        assert_eq!(truncate_str("héllo", 2), "h");
        assert_eq!(truncate_str("abc", 10), "abc");
    }

    #[test]
    fn test_apply_action_needs_ids() {
        let client = BackendClient::new(&server(None), None);
        match client.apply_action(BulkAction::Read, &[]) {
            Err(ApiError::Api(msg)) => assert_eq!(msg, "no emails selected"),
            other => panic!("expected API error, got {:?}", other),
        }
    }

    #[test]
    fn test_connection_refused_is_http_error() {
        let client = BackendClient::new(&server(None), None);
        match client.fetch_status() {
            Err(ApiError::Http(_)) => {}
            other => panic!("expected HTTP error, got {:?}", other.map(|r| r.status)),
        }
    }
}
