//! Persisted sync cursor

use std::sync::Arc;

use crate::error::{StoreError, StoreResult};
use crate::store::KeyValueStore;

/// Storage key of the cursor
pub const CURSOR_KEY: &str = "sync_cursor";

/// Highest event sequence number fully applied to the local mirror
///
/// A missing or zero cursor means "never synced".
#[derive(Clone)]
pub struct SyncCursor {
    store: Arc<dyn KeyValueStore>,
}

impl SyncCursor {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn load(&self) -> StoreResult<i64> {
        match self.store.get(CURSOR_KEY)? {
            None => Ok(0),
            Some(raw) => raw.trim().parse().map_err(|_| StoreError::InvalidValue {
                key: CURSOR_KEY.to_string(),
                value: raw,
            }),
        }
    }

    pub fn save(&self, seq: i64) -> StoreResult<()> {
        self.store.set(CURSOR_KEY, &seq.to_string())
    }

    pub fn clear(&self) -> StoreResult<()> {
        self.store.remove(CURSOR_KEY)
    }
}

impl std::fmt::Debug for SyncCursor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncCursor").finish_non_exhaustive()
    }
}
