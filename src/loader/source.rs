//! Source collections, eligibility rules and load-session identity.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Well-known marker file in the `remote_agents` collection. Its content is
/// an ISO-8601 timestamp; when newer than the last completed load it forces
/// a reload ahead of the fixed interval.
pub const RELOAD_MARKER: &str = ".reload_marker";

/// The four logical groupings of agent source.
///
/// `Local` agents are native Rust, registered once at process start and
/// never re-fetched. The remote collections are re-enumerated on every
/// reload pass, in the order of [`Collection::SCAN_ORDER`], so that name
/// collisions resolve deterministically (later collection wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Collection {
    Local,
    RemoteAgents,
    RemoteMultiAgents,
    RemoteConnectors,
}

impl Collection {
    /// Remote collections in fixed scan order.
    pub const SCAN_ORDER: [Collection; 3] = [
        Collection::RemoteAgents,
        Collection::RemoteMultiAgents,
        Collection::RemoteConnectors,
    ];

    /// Directory prefix of this collection inside the source store.
    pub fn prefix(&self) -> &'static str {
        match self {
            Collection::Local => "local",
            Collection::RemoteAgents => "agents",
            Collection::RemoteMultiAgents => "multi_agents",
            Collection::RemoteConnectors => "data_connectors",
        }
    }

    /// Required file name suffix for units in this collection.
    pub fn suffix(&self) -> &'static str {
        match self {
            Collection::RemoteConnectors => "_connector.rhai",
            _ => "_agent.rhai",
        }
    }

    /// Whether a listed file is a loadable unit. Dotfiles (including the
    /// reload marker) are never eligible.
    pub fn is_eligible(&self, file_id: &str) -> bool {
        !file_id.starts_with('.') && file_id.ends_with(self.suffix())
    }
}

impl fmt::Display for Collection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.prefix())
    }
}

/// Where one loadable unit currently lives.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SourceLocation {
    pub collection: Collection,
    pub file_id: String,
}

impl SourceLocation {
    pub fn new(collection: Collection, file_id: impl Into<String>) -> Self {
        Self {
            collection,
            file_id: file_id.into(),
        }
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.collection, self.file_id)
    }
}

/// Identity of one load pass. All units imported during a pass share the
/// token; it is part of every cache key, so the same `file_id` loaded in two
/// different passes never collides, and a stale pass's units can be purged
/// as a batch.
///
/// Second granularity is sufficient: passes are rate-limited well above 1/s.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SessionToken(String);

impl SessionToken {
    pub fn now() -> Self {
        Self(Utc::now().timestamp().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for SessionToken {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eligibility_honors_suffix_and_dotfiles() {
        let c = Collection::RemoteAgents;
        assert!(c.is_eligible("stock_agent.rhai"));
        assert!(!c.is_eligible("stock_agent.py"));
        assert!(!c.is_eligible(".reload_marker"));
        assert!(!c.is_eligible("notes.txt"));

        let conn = Collection::RemoteConnectors;
        assert!(conn.is_eligible("postgres_connector.rhai"));
        assert!(!conn.is_eligible("postgres_agent.rhai"));
    }

    #[test]
    fn scan_order_is_fixed() {
        assert_eq!(
            Collection::SCAN_ORDER,
            [
                Collection::RemoteAgents,
                Collection::RemoteMultiAgents,
                Collection::RemoteConnectors
            ]
        );
    }
}
