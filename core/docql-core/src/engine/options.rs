//! Database options.
//!
//! ```json
//! {"engine": "btree", "timeout_ms": 5000, "sort_spill_threshold": 10000}
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::DocqlResult;

/// 저장 엔진 종류
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineKind {
    Memory,
    /// redb B+tree file
    BTree,
    /// sled log-structured store
    #[default]
    Lsm,
}

/// 데이터베이스 옵션
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Options {
    pub engine: EngineKind,
    /// Per-transaction deadline; `None` waits forever.
    pub timeout_ms: Option<u64>,
    /// Rows an ORDER BY keeps in memory before spilling to a transient
    /// engine.
    pub sort_spill_threshold: usize,
    /// Flush to disk on every commit.
    pub sync_on_commit: bool,
    /// Parsed scripts kept in the statement cache; 0 disables it.
    pub statement_cache_size: usize,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            engine: EngineKind::default(),
            timeout_ms: None,
            sort_spill_threshold: 10_000,
            sync_on_commit: true,
            statement_cache_size: 64,
        }
    }
}

impl Options {
    pub fn in_memory() -> Self {
        Options {
            engine: EngineKind::Memory,
            ..Options::default()
        }
    }

    pub fn from_json(json: &str) -> DocqlResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let o = Options::from_json(r#"{"engine": "btree", "timeout_ms": 250}"#).unwrap();
        assert_eq!(o.engine, EngineKind::BTree);
        assert_eq!(o.timeout(), Some(Duration::from_millis(250)));
        assert_eq!(o.sort_spill_threshold, 10_000);
        assert!(Options::from_json(r#"{"engine": "rocks"}"#).is_err());
    }
}
