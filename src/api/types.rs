use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Wire form of a batch: domain key -> list of raw summaries, in server order.
pub type WireBatch = Map<String, Value>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FetchStatus {
    Fetching,
    Paused,
    Complete,
    Error,
}

impl FetchStatus {
    /// Legal moves of the background job as this client observes it.
    pub fn can_transition_to(self, next: FetchStatus) -> bool {
        use FetchStatus::*;
        match (self, next) {
            (Fetching, _) => true,
            (Paused, Fetching) | (Paused, Paused) => true,
            (Error, Paused) | (Error, Error) => true,
            (Complete, Complete) => true,
            _ => false,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            FetchStatus::Fetching => "fetching",
            FetchStatus::Paused => "paused",
            FetchStatus::Complete => "complete",
            FetchStatus::Error => "error",
        }
    }
}

impl std::fmt::Display for FetchStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EmailSummary {
    pub id: String,
    pub sender: String,
    pub subject: String,
    pub date: String,
    pub domain: String,
}

// GET /fetch-status
#[derive(Debug, Clone, Deserialize)]
pub struct FetchStatusReport {
    pub status: FetchStatus,
    #[serde(default)]
    pub fetched: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub grouped: WireBatch,
    #[serde(default)]
    pub last_fetch_time: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub domain_count: Option<u64>,
    #[serde(default)]
    pub next_page_token: Option<String>,
}

// GET /fetch-more
#[derive(Debug, Clone, Deserialize)]
pub struct FetchMoreReport {
    #[serde(default)]
    pub next_page_token: Option<String>,
    #[serde(default)]
    pub count: u64,
    #[serde(default)]
    pub emails: WireBatch,
}

// POST /pause-fetch and /resume-fetch
#[derive(Debug, Clone, Deserialize)]
pub struct ControlReport {
    pub status: FetchStatus,
}

// GET /fetch-logs
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FetchLogs {
    pub status: FetchStatus,
    #[serde(default)]
    pub fetched: u64,
    #[serde(default)]
    pub total: u64,
    #[serde(default)]
    pub last_fetch_time: Option<String>,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub domain_count: Option<u64>,
}

/// Bulk operation applied to the selected emails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BulkAction {
    Read,
    Archive,
    Delete,
}

impl BulkAction {
    pub fn parse(s: &str) -> Option<BulkAction> {
        match s {
            "read" => Some(BulkAction::Read),
            "archive" => Some(BulkAction::Archive),
            "delete" => Some(BulkAction::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for BulkAction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BulkAction::Read => write!(f, "read"),
            BulkAction::Archive => write!(f, "archive"),
            BulkAction::Delete => write!(f, "delete"),
        }
    }
}

// POST /action
#[derive(Debug, Clone, Serialize)]
pub struct ActionRequest<'a> {
    pub action_type: BulkAction,
    pub email_ids: &'a [String],
}

#[derive(Debug, Clone, Deserialize)]
pub struct ActionReport {
    #[serde(default)]
    pub applied: Option<u64>,
}

// GET /clear-cache
#[derive(Debug, Clone, Deserialize)]
pub struct ClearCacheReport {
    #[serde(default)]
    pub removed: u64,
}

// GET /email/{id}
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmailDetail {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub subject: String,
    #[serde(default)]
    pub sender: String,
    #[serde(default)]
    pub date: String,
    #[serde(default)]
    pub to: String,
    #[serde(default)]
    pub body: String,
    /// Plain-text rendering of `body`, filled in client side.
    #[serde(default)]
    pub body_text: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_deserialize_fetch_status_keeps_group_order() {
        let data = json!({
            "status": "fetching",
            "fetched": 3,
            "total": 100,
            "grouped": {
                "zeta.com": [{"id": "1"}],
                "alpha.com": [{"id": "2"}, {"id": "3"}]
            },
            "last_fetch_time": "2025-01-15T10:30:00",
            "error": null,
            "domain_count": 2
        });
        let report: FetchStatusReport = serde_json::from_value(data).unwrap();
        assert_eq!(report.status, FetchStatus::Fetching);
        assert_eq!(report.total, 100);
        let keys: Vec<&String> = report.grouped.keys().collect();
        assert_eq!(keys, vec!["zeta.com", "alpha.com"]);
        assert!(report.next_page_token.is_none());
    }

    #[test]
    fn test_deserialize_minimal_reports() {
        let report: FetchStatusReport =
            serde_json::from_value(json!({"status": "complete"})).unwrap();
        assert_eq!(report.fetched, 0);
        assert!(report.grouped.is_empty());

        let more: FetchMoreReport = serde_json::from_value(json!({
            "next_page_token": null,
            "count": 7,
            "emails": {}
        }))
        .unwrap();
        assert_eq!(more.count, 7);
        assert!(more.next_page_token.is_none());

        let control: ControlReport = serde_json::from_value(json!({"status": "paused"})).unwrap();
        assert_eq!(control.status, FetchStatus::Paused);
    }

    #[test]
    fn test_action_request_wire_shape() {
        let ids = vec!["a".to_string(), "b".to_string()];
        let request = ActionRequest {
            action_type: BulkAction::Archive,
            email_ids: &ids,
        };
        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({"action_type": "archive", "email_ids": ["a", "b"]})
        );
        assert_eq!(BulkAction::parse("delete"), Some(BulkAction::Delete));
        assert_eq!(BulkAction::parse("star"), None);

        let report: ActionReport = serde_json::from_value(json!({})).unwrap();
        assert!(report.applied.is_none());
    }

    #[test]
    fn test_unknown_status_is_rejected() {
        let result: Result<ControlReport, _> =
            serde_json::from_value(json!({"status": "sleeping"}));
        assert!(result.is_err());
    }

    #[test]
    fn test_transition_table() {
        use FetchStatus::*;
        for next in [Fetching, Paused, Complete, Error] {
            assert!(Fetching.can_transition_to(next));
            assert!(!Complete.can_transition_to(next) || next == Complete);
        }
        assert!(Paused.can_transition_to(Fetching));
        assert!(!Paused.can_transition_to(Complete));
        assert!(!Paused.can_transition_to(Error));
        assert!(Error.can_transition_to(Paused));
        assert!(!Error.can_transition_to(Fetching));
    }
}
