use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

use super::groups::GroupStore;
use crate::api::types::{EmailSummary, WireBatch};

/// Parsed batch in server order. Malformed items are already dropped.
#[derive(Debug, Default)]
pub struct Batch {
    pub entries: Vec<(String, Vec<EmailSummary>)>,
    pub dropped: usize,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct MergeOutcome {
    /// Genuinely new items.
    pub applied: usize,
    /// Items whose id was already known.
    pub duplicates: usize,
    /// Domains that received at least one new item, in batch order.
    pub touched: Vec<String>,
}

impl Batch {
    pub fn from_wire(wire: &WireBatch) -> Batch {
        let mut batch = Batch::default();
        for (key, items) in wire {
            let Some(items) = items.as_array() else {
                log_debug!("[Merge] dropping non-list entry for domain {:?}", key);
                batch.dropped += 1;
                continue;
            };
            let mut parsed = Vec::with_capacity(items.len());
            for raw in items {
                match parse_summary(key, raw) {
                    Some(summary) => parsed.push(summary),
                    None => {
                        log_debug!("[Merge] dropping malformed item under {:?}: {}", key, raw);
                        batch.dropped += 1;
                    }
                }
            }
            batch.entries.push((key.clone(), parsed));
        }
        batch
    }

    pub fn len(&self) -> usize {
        self.entries.iter().map(|(_, items)| items.len()).sum()
    }
}

fn parse_summary(key: &str, raw: &Value) -> Option<EmailSummary> {
    let obj = raw.as_object()?;
    let id = match obj.get("id")? {
        Value::String(s) if !s.trim().is_empty() => s.clone(),
        Value::Number(n) => n.to_string(),
        _ => return None,
    };
    let text = |field: &str| obj.get(field).and_then(Value::as_str).map(str::to_string);

    let sender = text("sender").unwrap_or_else(|| "Unknown".to_string());
    let domain = [Some(key.to_string()), text("domain")]
        .into_iter()
        .flatten()
        .map(|d| d.trim().to_string())
        .find(|d| !d.is_empty())
        .or_else(|| extract_domain(&sender))?;

    Some(EmailSummary {
        id,
        sender,
        subject: text("subject").unwrap_or_else(|| "No Subject".to_string()),
        date: text("date").unwrap_or_default(),
        domain,
    })
}

/// Domain of a sender such as `Shop <deals@shop.com>`, or a bare `shop.com` token.
pub fn extract_domain(sender: &str) -> Option<String> {
    static ADDRESS: OnceLock<Option<Regex>> = OnceLock::new();
    static BARE: OnceLock<Option<Regex>> = OnceLock::new();

    let address = ADDRESS.get_or_init(|| Regex::new(r"[\w.-]+@([\w.-]+)").ok());
    if let Some(caps) = address.as_ref().and_then(|re| re.captures(sender)) {
        return Some(caps[1].to_string());
    }
    let bare =
        BARE.get_or_init(|| Regex::new(r"([\w.-]+\.(com|org|net|edu|io|co|gov))\b").ok());
    bare.as_ref()
        .and_then(|re| re.captures(sender))
        .map(|caps| caps[1].to_string())
}

pub struct MergeEngine;

impl MergeEngine {
    /// Fold `batch` into `store`. Replaying a batch applies nothing.
    pub fn merge(store: &mut GroupStore, batch: Batch) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        for (_, items) in batch.entries {
            for item in items {
                let domain = item.domain.clone();
                if store.insert(item) {
                    outcome.applied += 1;
                    if !outcome.touched.contains(&domain) {
                        outcome.touched.push(domain);
                    }
                } else {
                    outcome.duplicates += 1;
                }
            }
        }
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn wire(value: Value) -> WireBatch {
        value.as_object().cloned().unwrap()
    }

    fn items(domain: &str, ids: &[&str]) -> Value {
        Value::Array(
            ids.iter()
                .map(|id| {
                    json!({
                        "id": id,
                        "sender": format!("Team <team@{}>", domain),
                        "subject": format!("About {}", id),
                        "date": "Tue, 14 Jan 2025 09:00:00 +0000",
                        "domain": domain
                    })
                })
                .collect(),
        )
    }

    #[test]
    fn test_merge_is_idempotent() {
        let batch = wire(json!({
            "shop.com": items("shop.com", &["1", "2", "3"]),
            "news.org": items("news.org", &["4"])
        }));
        let mut store = GroupStore::new(10);

        let first = MergeEngine::merge(&mut store, Batch::from_wire(&batch));
        assert_eq!(first.applied, 4);
        assert_eq!(first.touched, vec!["shop.com", "news.org"]);

        let second = MergeEngine::merge(&mut store, Batch::from_wire(&batch));
        assert_eq!(second.applied, 0);
        assert_eq!(second.duplicates, 4);
        assert!(second.touched.is_empty());
        assert_eq!(store.get("shop.com").unwrap().count(), 3);
        assert_eq!(store.item_count(), 4);
    }

    #[test]
    fn test_no_id_lands_in_two_groups() {
        let mut store = GroupStore::new(10);
        let batches = [
            json!({"a.com": items("a.com", &["1", "2"])}),
            json!({"b.com": items("b.com", &["2", "3"]), "a.com": items("a.com", &["3", "4"])}),
            json!({"a.com": items("a.com", &["1", "1", "5"])}),
        ];
        for batch in batches {
            MergeEngine::merge(&mut store, Batch::from_wire(&wire(batch)));
        }

        let mut seen = std::collections::HashSet::new();
        for group in store.iter() {
            for item in group.items() {
                assert!(seen.insert(item.id.clone()), "duplicate id {}", item.id);
            }
        }
        assert_eq!(seen.len(), 5);
        let a_ids: Vec<&str> = store
            .get("a.com")
            .unwrap()
            .items()
            .iter()
            .map(|i| i.id.as_str())
            .collect();
        assert_eq!(a_ids, vec!["1", "2", "4", "5"]);
    }

    #[test]
    fn test_malformed_items_are_dropped_individually() {
        let batch = Batch::from_wire(&wire(json!({
            "shop.com": [
                {"id": "ok-1", "sender": "a@shop.com"},
                {"sender": "no id"},
                {"id": "   "},
                "not an object",
                {"id": 42}
            ],
            "": [
                {"id": "derived", "sender": "Deals <deals@derived.io>"},
                {"id": "orphan", "sender": "nobody"}
            ],
            "broken.com": "not a list"
        })));

        assert_eq!(batch.dropped, 5);
        assert_eq!(batch.len(), 3);
        let (key, shop) = &batch.entries[0];
        assert_eq!(key, "shop.com");
        assert_eq!(shop[0].subject, "No Subject");
        assert_eq!(shop[1].id, "42");
        assert_eq!(batch.entries[1].1[0].domain, "derived.io");
    }

    #[test]
    fn test_backend_other_bucket_is_an_ordinary_group() {
        let batch = wire(json!({
            "Other": [{"id": "x1", "sender": "nobody"}, {"id": "x2"}]
        }));
        let mut store = GroupStore::new(10);
        let outcome = MergeEngine::merge(&mut store, Batch::from_wire(&batch));
        assert_eq!(outcome.applied, 2);
        assert_eq!(store.get("Other").unwrap().count(), 2);
    }

    #[test]
    fn test_extract_domain() {
        assert_eq!(
            extract_domain("Shop <deals@mail.shop.com>").as_deref(),
            Some("mail.shop.com")
        );
        assert_eq!(
            extract_domain("Newsletter from example.org").as_deref(),
            Some("example.org")
        );
        assert_eq!(extract_domain("Unknown"), None);
    }
}
