//! Shared model types.

use std::fmt;

use serde::{Deserialize, Serialize};

/// How the storage layer records timestamps.
///
/// Decides both the offset the calendar bucketer adds before formatting and
/// whether resolved period bounds carry timezone information.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageMode {
    /// Instants stored in UTC with timezone awareness.
    #[default]
    Aware,
    /// Wall-clock values without timezone information.
    Naive,
}

impl StorageMode {
    pub fn is_aware(&self) -> bool {
        matches!(self, StorageMode::Aware)
    }
}

impl fmt::Display for StorageMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StorageMode::Aware => write!(f, "aware"),
            StorageMode::Naive => write!(f, "naive"),
        }
    }
}
