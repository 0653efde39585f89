//! In-memory event sink for testing.

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::interfaces::{EventSink, SinkError, SinkRecord};

/// Mock sink that stores every record it receives.
#[derive(Default)]
pub struct MockEventSink {
    inserted: RwLock<Vec<SinkRecord>>,
    fail_on_insert: RwLock<bool>,
}

impl MockEventSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn set_fail_on_insert(&self, fail: bool) {
        *self.fail_on_insert.write().await = fail;
    }

    pub async fn inserted_count(&self) -> usize {
        self.inserted.read().await.len()
    }

    pub async fn take_inserted(&self) -> Vec<SinkRecord> {
        std::mem::take(&mut *self.inserted.write().await)
    }
}

#[async_trait]
impl EventSink for MockEventSink {
    async fn insert(&self, record: &SinkRecord) -> Result<(), SinkError> {
        if *self.fail_on_insert.read().await {
            return Err(SinkError::Unavailable("Mock insert failure".to_string()));
        }
        self.inserted.write().await.push(record.clone());
        Ok(())
    }
}
