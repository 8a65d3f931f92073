use std::fmt;
use std::str::FromStr;

use chrono::Duration;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A chat model whose usage is attributed and, for most models, limited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum EntityKey {
    #[serde(rename = "4")]
    Gpt4,
    #[serde(rename = "4o")]
    Gpt4o,
    #[serde(rename = "o1-mini")]
    O1Mini,
    #[serde(rename = "o1-preview")]
    O1Preview,
    #[serde(rename = "4o-mini")]
    Gpt4oMini,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CatalogError {
    #[error("unknown model {0:?}")]
    UnknownEntity(String),
}

/// Static quota for a tracked model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QuotaConfig {
    pub limit: u64,
    pub period: Duration,
}

const TRACKED: [EntityKey; 4] = [
    EntityKey::Gpt4o,
    EntityKey::O1Preview,
    EntityKey::O1Mini,
    EntityKey::Gpt4,
];

impl EntityKey {
    pub const ALL: [EntityKey; 5] = [
        EntityKey::Gpt4,
        EntityKey::Gpt4o,
        EntityKey::O1Mini,
        EntityKey::O1Preview,
        EntityKey::Gpt4oMini,
    ];

    /// Every model that carries a quota, in display order.
    pub fn tracked() -> impl Iterator<Item = EntityKey> {
        TRACKED.into_iter()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EntityKey::Gpt4 => "4",
            EntityKey::Gpt4o => "4o",
            EntityKey::O1Mini => "o1-mini",
            EntityKey::O1Preview => "o1-preview",
            EntityKey::Gpt4oMini => "4o-mini",
        }
    }

    pub fn display_name(self) -> &'static str {
        match self {
            EntityKey::Gpt4 => "ChatGPT 4",
            EntityKey::Gpt4o => "ChatGPT 4o",
            EntityKey::O1Mini => "ChatGPT o1-mini",
            EntityKey::O1Preview => "ChatGPT o1-preview",
            EntityKey::Gpt4oMini => "ChatGPT 4o mini",
        }
    }

    pub fn is_unlimited(self) -> bool {
        matches!(self, EntityKey::Gpt4oMini)
    }

    /// Quota for this model, `None` for the unlimited category.
    pub fn config(self) -> Option<QuotaConfig> {
        let (limit, period) = match self {
            EntityKey::Gpt4o => (80, Duration::hours(3)),
            EntityKey::O1Preview => (50, Duration::days(7)),
            EntityKey::O1Mini => (50, Duration::hours(24)),
            EntityKey::Gpt4 => (40, Duration::hours(3)),
            EntityKey::Gpt4oMini => return None,
        };
        Some(QuotaConfig { limit, period })
    }
}

/// Shortest period across all tracked models; sweeps must run well inside it.
pub fn shortest_period() -> Duration {
    EntityKey::tracked()
        .filter_map(EntityKey::config)
        .map(|cfg| cfg.period)
        .min()
        .unwrap_or_else(|| Duration::hours(3))
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntityKey {
    type Err = CatalogError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        EntityKey::ALL
            .into_iter()
            .find(|key| key.as_str() == value)
            .ok_or_else(|| CatalogError::UnknownEntity(value.to_string()))
    }
}
