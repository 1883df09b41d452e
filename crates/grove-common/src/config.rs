//! Configuration structures for Grove.

use serde::{Deserialize, Serialize};

/// Default page-size budget for one serialized node (32 KB).
pub const DEFAULT_PAGE_BUDGET: usize = 4096 * 8;

/// Default number of node cache slots.
pub const DEFAULT_CACHE_SLOTS: usize = 128;

/// Configuration for a B+Tree instance and its backing store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Byte budget for one serialized node; the tree order is derived from it.
    pub page_budget: usize,
    /// Number of node cache slots (0 disables caching).
    pub cache_slots: usize,
    /// Enable fsync when the header is flushed.
    pub fsync_enabled: bool,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            page_budget: DEFAULT_PAGE_BUDGET,
            cache_slots: DEFAULT_CACHE_SLOTS,
            fsync_enabled: true,
        }
    }
}
