//! Memory documents persisted in the source store.

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::loader::SourceStore;

/// Memories are kept bounded; older entries age out.
const MAX_RECORDS: usize = 200;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    pub timestamp: DateTime<Utc>,
    pub note: String,
}

/// Shared memory is visible to every conversation; user memory is scoped to
/// one user GUID.
#[derive(Debug, Clone)]
pub enum MemoryScope {
    Shared,
    User(String),
}

impl MemoryScope {
    fn path(&self) -> String {
        match self {
            MemoryScope::Shared => "memory/shared.json".to_string(),
            MemoryScope::User(guid) => format!("memory/{guid}.json"),
        }
    }
}

/// Thin JSON-document layer over the source store, mirroring how the
/// original kept memories on its file share.
#[derive(Clone)]
pub struct MemoryStore {
    store: Arc<dyn SourceStore>,
}

impl MemoryStore {
    pub fn new(store: Arc<dyn SourceStore>) -> Self {
        Self { store }
    }

    pub async fn load(&self, scope: &MemoryScope) -> Vec<MemoryRecord> {
        match self.store.read_path(&scope.path()).await {
            Ok(Some(bytes)) => serde_json::from_slice(&bytes).unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    pub async fn append(&self, scope: &MemoryScope, note: String) -> anyhow::Result<()> {
        let mut records = self.load(scope).await;
        records.push(MemoryRecord {
            timestamp: Utc::now(),
            note,
        });
        if records.len() > MAX_RECORDS {
            let excess = records.len() - MAX_RECORDS;
            records.drain(..excess);
        }
        let encoded = serde_json::to_vec(&records)?;
        self.store
            .write_path(&scope.path(), Bytes::from(encoded))
            .await?;
        Ok(())
    }

    /// Render records for inclusion in the system prompt.
    pub fn format(records: &[MemoryRecord], limit: Option<usize>) -> String {
        let slice: &[MemoryRecord] = match limit {
            Some(n) if records.len() > n => &records[records.len() - n..],
            _ => records,
        };
        slice
            .iter()
            .map(|r| format!("- [{}] {}", r.timestamp.format("%Y-%m-%d %H:%M"), r.note))
            .collect::<Vec<_>>()
            .join("\n")
    }
}
