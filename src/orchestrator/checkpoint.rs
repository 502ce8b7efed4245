//! Checkpoint persistence: the orchestrator persists state (current node,
//! partial findings, tool_executions) after each analyzer completes;
//! resume reads the checkpoint and skips already-completed analyzers.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;

use crate::analyzers::{Domain, DomainFinding};
use crate::error::Result;
use crate::progress::ToolExecution;

#[derive(Debug, Clone, Default)]
pub struct Checkpoint {
    pub findings: HashMap<Domain, DomainFinding>,
    pub tool_executions: Vec<ToolExecution>,
}

/// Where the orchestrator's checkpoints live. The real implementation is
/// backed by the investigation state store's `progress_json` column; this
/// trait keeps the orchestrator decoupled from that storage detail.
#[async_trait]
pub trait CheckpointStore: Send + Sync {
    async fn save(&self, investigation_id: &str, checkpoint: &Checkpoint) -> Result<()>;
    async fn load(&self, investigation_id: &str) -> Result<Option<Checkpoint>>;
}

/// In-process checkpoint store, for tests and single-process deployments
/// that don't need cross-restart resume.
#[derive(Default)]
pub struct InMemoryCheckpointStore {
    state: Mutex<HashMap<String, Checkpoint>>,
}

impl InMemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CheckpointStore for InMemoryCheckpointStore {
    async fn save(&self, investigation_id: &str, checkpoint: &Checkpoint) -> Result<()> {
        self.state
            .lock()
            .unwrap()
            .insert(investigation_id.to_string(), checkpoint.clone());
        Ok(())
    }

    async fn load(&self, investigation_id: &str) -> Result<Option<Checkpoint>> {
        Ok(self.state.lock().unwrap().get(investigation_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trips_through_memory_store() {
        let store = InMemoryCheckpointStore::new();
        let checkpoint = Checkpoint::default();
        store.save("inv-1", &checkpoint).await.unwrap();
        let loaded = store.load("inv-1").await.unwrap();
        assert!(loaded.is_some());
        assert!(store.load("inv-2").await.unwrap().is_none());
    }
}
