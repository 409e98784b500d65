//! In-memory reconciliation alert log.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::ports::{ReconciliationAlerts, ReconciliationGap, StoreError};

/// In-memory [`ReconciliationAlerts`] log.
#[derive(Debug, Clone, Default)]
pub struct InMemoryReconciliationAlerts {
    gaps: Arc<RwLock<Vec<ReconciliationGap>>>,
}

impl InMemoryReconciliationAlerts {
    pub fn new() -> Self {
        Self::default()
    }

    /// All recorded gaps, oldest first.
    pub async fn gaps(&self) -> Vec<ReconciliationGap> {
        self.gaps.read().await.clone()
    }

    pub async fn count(&self) -> usize {
        self.gaps.read().await.len()
    }
}

#[async_trait]
impl ReconciliationAlerts for InMemoryReconciliationAlerts {
    async fn record(&self, gap: ReconciliationGap) -> Result<(), StoreError> {
        self.gaps.write().await.push(gap);
        Ok(())
    }
}
