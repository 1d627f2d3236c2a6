//! Remote-control join preference

use std::fmt;
use std::str::FromStr;

use tracing::warn;

use crate::error::StoreResult;
use crate::store::KeyValueStore;

/// Storage key of the preference
pub const JOIN_PREFERENCE_KEY: &str = "remote_control_join";

/// What to do when connecting while another device is playing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RemoteJoinPreference {
    /// Enter remote mode immediately
    Always,
    /// Let the UI prompt the user
    #[default]
    Ask,
    /// Stay idle
    Never,
}

impl RemoteJoinPreference {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Always => "always",
            Self::Ask => "ask",
            Self::Never => "never",
        }
    }

    /// Read the stored preference, falling back to [`Ask`](Self::Ask)
    pub fn load(store: &dyn KeyValueStore) -> Self {
        match store.get(JOIN_PREFERENCE_KEY) {
            Ok(Some(raw)) => raw.parse().unwrap_or_else(|_| {
                warn!(value = %raw, "Unknown remote control join preference");
                Self::default()
            }),
            Ok(None) => Self::default(),
            Err(e) => {
                warn!(error = %e, "Failed to read remote control join preference");
                Self::default()
            }
        }
    }

    pub fn save(self, store: &dyn KeyValueStore) -> StoreResult<()> {
        store.set(JOIN_PREFERENCE_KEY, self.as_str())
    }
}

impl FromStr for RemoteJoinPreference {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "always" => Ok(Self::Always),
            "ask" => Ok(Self::Ask),
            "never" => Ok(Self::Never),
            other => Err(format!("unknown join preference '{}'", other)),
        }
    }
}

impl fmt::Display for RemoteJoinPreference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
