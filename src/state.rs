use crate::api::types::EmailDetail;
use redb::{Database, TableDefinition};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

const UI_STATE: TableDefinition<&str, &[u8]> = TableDefinition::new("ui_state");
const EMAIL_DETAILS: TableDefinition<&str, &[u8]> = TableDefinition::new("email_details");

const COLLAPSED_KEY: &str = "collapsed_domains";

/// Preview details older than this are refetched.
pub const DETAIL_TTL_SECS: u64 = 24 * 60 * 60;

/// Client-side state that survives restarts.
pub struct StateStore {
    db: Database,
}

#[derive(Serialize, Deserialize)]
struct CachedDetail {
    fetched_at: u64,
    detail: EmailDetail,
}

fn state_dir() -> PathBuf {
    if let Ok(xdg) = std::env::var("XDG_CACHE_HOME") {
        PathBuf::from(xdg).join("mailgroup")
    } else if let Ok(home) = std::env::var("HOME") {
        PathBuf::from(home).join(".cache").join("mailgroup")
    } else {
        PathBuf::from("/tmp").join("mailgroup-cache")
    }
}

fn db_path(profile: &str) -> PathBuf {
    let safe_name = profile.replace(['/', '\\', '\0'], "_");
    state_dir().join(format!("{}.redb", safe_name))
}

pub fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

impl StateStore {
    pub fn open(profile: &str) -> Result<StateStore, String> {
        Self::open_at(&db_path(profile))
    }

    pub fn open_at(path: &Path) -> Result<StateStore, String> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| format!("failed to create state dir: {}", e))?;
        }
        let db = Database::create(path)
            .map_err(|e| format!("failed to open state db at {}: {}", path.display(), e))?;

        // Ensure tables exist
        let txn = db
            .begin_write()
            .map_err(|e| format!("state write txn: {}", e))?;
        {
            let _ = txn.open_table(UI_STATE);
            let _ = txn.open_table(EMAIL_DETAILS);
        }
        txn.commit().map_err(|e| format!("state commit: {}", e))?;

        Ok(StateStore { db })
    }

    /// Collapsed domains, stored as one `{domain: true}` object.
    pub fn get_collapsed(&self) -> BTreeSet<String> {
        let Some(bytes) = self.get_raw(UI_STATE, COLLAPSED_KEY) else {
            return BTreeSet::new();
        };
        match serde_json::from_slice::<BTreeMap<String, bool>>(&bytes) {
            Ok(map) => map
                .into_iter()
                .filter(|(_, collapsed)| *collapsed)
                .map(|(domain, _)| domain)
                .collect(),
            Err(e) => {
                log_warn!("[State] ignoring unreadable collapsed set: {}", e);
                BTreeSet::new()
            }
        }
    }

    pub fn put_collapsed(&self, domains: &BTreeSet<String>) {
        let map: BTreeMap<&str, bool> = domains.iter().map(|d| (d.as_str(), true)).collect();
        if let Ok(bytes) = serde_json::to_vec(&map) {
            self.put_raw(UI_STATE, COLLAPSED_KEY, &bytes);
        }
    }

    /// Cached preview for `id` if it is younger than a day.
    pub fn get_email_detail(&self, id: &str, now: u64) -> Option<EmailDetail> {
        let bytes = self.get_raw(EMAIL_DETAILS, id)?;
        let cached: CachedDetail = serde_json::from_slice(&bytes).ok()?;
        if now.saturating_sub(cached.fetched_at) > DETAIL_TTL_SECS {
            return None;
        }
        Some(cached.detail)
    }

    pub fn put_email_detail(&self, detail: &EmailDetail, now: u64) {
        let cached = CachedDetail {
            fetched_at: now,
            detail: detail.clone(),
        };
        if let Ok(bytes) = serde_json::to_vec(&cached) {
            self.put_raw(EMAIL_DETAILS, &detail.id, &bytes);
        }
    }

    /// Drop cached previews, e.g. for emails the backend just deleted.
    pub fn remove_email_details(&self, ids: &[String]) {
        let txn = match self.db.begin_write() {
            Ok(t) => t,
            Err(e) => {
                log_warn!("[State] failed to begin write txn: {}", e);
                return;
            }
        };
        {
            let mut table = match txn.open_table(EMAIL_DETAILS) {
                Ok(t) => t,
                Err(e) => {
                    log_warn!("[State] failed to open email_details: {}", e);
                    return;
                }
            };
            for id in ids {
                if let Err(e) = table.remove(id.as_str()) {
                    log_warn!("[State] failed to remove {}: {}", id, e);
                };
            }
        }
        if let Err(e) = txn.commit() {
            log_warn!("[State] failed to commit email_details: {}", e);
        }
    }

    pub fn clear_email_details(&self) {
        let txn = match self.db.begin_write() {
            Ok(t) => t,
            Err(e) => {
                log_warn!("[State] failed to begin write txn: {}", e);
                return;
            }
        };
        if let Err(e) = txn.delete_table(EMAIL_DETAILS) {
            log_warn!("[State] failed to clear email_details: {}", e);
            return;
        }
        let _ = txn.open_table(EMAIL_DETAILS);
        if let Err(e) = txn.commit() {
            log_warn!("[State] failed to commit email_details: {}", e);
        }
    }

    fn get_raw(&self, table: TableDefinition<&str, &[u8]>, key: &str) -> Option<Vec<u8>> {
        let txn = self.db.begin_read().ok()?;
        let table = txn.open_table(table).ok()?;
        let value = table.get(key).ok()??;
        Some(value.value().to_vec())
    }

    fn put_raw(&self, table: TableDefinition<&str, &[u8]>, key: &str, bytes: &[u8]) {
        let txn = match self.db.begin_write() {
            Ok(t) => t,
            Err(e) => {
                log_warn!("[State] failed to begin write txn: {}", e);
                return;
            }
        };
        {
            let mut table = match txn.open_table(table) {
                Ok(t) => t,
                Err(e) => {
                    log_warn!("[State] failed to open table: {}", e);
                    return;
                }
            };
            if let Err(e) = table.insert(key, bytes) {
                log_warn!("[State] failed to write {}: {}", key, e);
            };
        }
        if let Err(e) = txn.commit() {
            log_warn!("[State] failed to commit {}: {}", key, e);
        }
    }

    pub fn clear_all_profiles() {
        let dir = state_dir();
        if !dir.exists() {
            return;
        }
        if let Ok(entries) = std::fs::read_dir(&dir) {
            for entry in entries.flatten() {
                let path = entry.path();
                if path.extension().and_then(|e| e.to_str()) == Some("redb") {
                    if let Err(e) = std::fs::remove_file(&path) {
                        eprintln!(
                            "Warning: failed to remove state file {}: {}",
                            path.display(),
                            e
                        );
                    }
                }
            }
        }
    }
}
