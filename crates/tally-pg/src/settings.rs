//! Postgres 接続設定とテーブル名

use std::time::Duration;

/// Rejected table name.
#[derive(Debug, thiserror::Error)]
pub enum TableNameError {
    #[error("table name `{0}` must match [A-Za-z_][A-Za-z0-9_]* and be at most {max} characters", max = MAX_BASE_LEN)]
    Invalid(String),
}

// 63 (Postgres identifier limit) minus the longest derived suffix.
const MAX_BASE_LEN: usize = 63 - "_buckets".len();

fn check_identifier(name: &str) -> Result<String, TableNameError> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        && name.len() <= MAX_BASE_LEN;
    if valid {
        Ok(name.to_string())
    } else {
        Err(TableNameError::Invalid(name.to_string()))
    }
}

/// Table names. Interpolated into SQL, so only plain identifiers are
/// accepted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tables {
    votes: String,
    results: String,
}

impl Tables {
    pub fn new(votes: &str, results: &str) -> Result<Self, TableNameError> {
        Ok(Self {
            votes: check_identifier(votes)?,
            results: check_identifier(results)?,
        })
    }

    pub fn votes(&self) -> &str {
        &self.votes
    }

    pub fn results(&self) -> &str {
        &self.results
    }

    /// Per-bucket counts of each aggregate.
    pub fn buckets(&self) -> String {
        format!("{}_buckets", self.results)
    }

    /// Vote ids already folded into the aggregate.
    pub fn applied(&self) -> String {
        format!("{}_applied", self.results)
    }
}

impl Default for Tables {
    fn default() -> Self {
        Self {
            votes: "votes".to_string(),
            results: "results".to_string(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct PgSettings {
    pub url: String,
    pub pool_size: u32,
    /// How long to wait for a pooled connection.
    pub acquire_timeout: Duration,
    pub tables: Tables,
}
