use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use labelcache_store::StoreError;
use thiserror::Error;

use crate::RegistryError;

#[derive(Debug, Error)]
pub enum SyncError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("interrupted after {processed} records; uncommitted writes rolled back")]
    Interrupted { processed: usize },
}

/// Shared interrupt flag, checked between records.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}
