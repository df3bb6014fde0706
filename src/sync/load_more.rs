use super::poller::FetchSession;

/// Arguments for one `GET /fetch-more` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MoreRequest {
    pub page_token: Option<String>,
    pub current_count: u64,
}

/// Single-flight guard around the backend's own pagination.
#[derive(Debug, Default)]
pub struct LoadMoreController {
    in_flight: bool,
    last_error: Option<String>,
}

impl LoadMoreController {
    pub fn is_in_flight(&self) -> bool {
        self.in_flight
    }

    /// Claim the request slot. None while another request is outstanding.
    pub fn begin(&mut self, session: &FetchSession) -> Option<MoreRequest> {
        if self.in_flight {
            log_debug!("[LoadMore] request already in flight, ignoring");
            return None;
        }
        self.in_flight = true;
        Some(MoreRequest {
            page_token: session.next_page_token.clone(),
            current_count: session.fetched,
        })
    }

    pub fn succeeded(&mut self) {
        self.in_flight = false;
        self.last_error = None;
    }

    pub fn failed(&mut self, error: &str) {
        log_warn!("[LoadMore] request failed: {}", error);
        self.in_flight = false;
        self.last_error = Some(error.to_string());
    }

    pub fn visible(&self, session: &FetchSession) -> bool {
        if self.in_flight {
            return false;
        }
        self.last_error.is_some()
            || (session.next_page_token.is_some() && session.fetched < session.total)
    }

    pub fn label(&self) -> String {
        if self.in_flight {
            "Loading...".to_string()
        } else if let Some(ref e) = self.last_error {
            format!("Load more (failed: {})", e)
        } else {
            "Load more".to_string()
        }
    }
}
