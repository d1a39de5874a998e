//! Instance helpers that need no storage.

use std::sync::atomic::{AtomicI64, Ordering};

use crate::types::DbId;

/// Allocates identifiers for detached (never persisted) instances.
///
/// Ids are strictly negative and decrease on every call, so they can never
/// collide with each other or with positive row ids.
#[derive(Debug, Default)]
pub struct DetachedIdAllocator {
    last: AtomicI64,
}

impl DetachedIdAllocator {
    pub const fn new() -> Self {
        Self {
            last: AtomicI64::new(0),
        }
    }

    pub fn next_id(&self) -> DbId {
        self.last.fetch_sub(1, Ordering::Relaxed) - 1
    }
}

static DETACHED_IDS: DetachedIdAllocator = DetachedIdAllocator::new();

/// Next id from the process-wide allocator.
pub fn next_detached_id() -> DbId {
    DETACHED_IDS.next_id()
}

pub fn is_detached_id(id: DbId) -> bool {
    id < 0
}

/// Whether an instance pinned to `pinned` lags the template's `current` version.
pub fn is_outdated(pinned: i64, current: i64) -> bool {
    pinned < current
}
