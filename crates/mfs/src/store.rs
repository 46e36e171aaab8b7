// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::dag::{Cid, DagNode};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::Mutex;

/// Content-addressed node storage.
///
/// Implementations are expected to be durable and deduplicating; the
/// mutable layer only ever adds nodes.
#[async_trait]
pub trait NodeStore: Send + Sync {
    async fn get(&self, cid: &Cid) -> Result<DagNode>;

    async fn put(&self, node: &DagNode) -> Result<Cid>;
}

/// Shared handle to a node store.
pub type StoreRef = Arc<dyn NodeStore>;

/// In-memory node store for tests and ephemeral trees.
#[derive(Default)]
pub struct MemoryStore {
    nodes: Mutex<HashMap<Cid, Vec<u8>>>,
    puts: AtomicUsize,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `put` calls served, including ones for nodes already present.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }

    pub async fn len(&self) -> usize {
        self.nodes.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.nodes.lock().await.is_empty()
    }

    pub async fn contains(&self, cid: &Cid) -> bool {
        self.nodes.lock().await.contains_key(cid)
    }
}

#[async_trait]
impl NodeStore for MemoryStore {
    async fn get(&self, cid: &Cid) -> Result<DagNode> {
        let nodes = self.nodes.lock().await;
        match nodes.get(cid) {
            Some(bytes) => DagNode::decode(bytes),
            None => Err(Error::storage(format!("node {} not found", cid))),
        }
    }

    async fn put(&self, node: &DagNode) -> Result<Cid> {
        let bytes = node.encode()?;
        let cid = Cid::of_bytes(&bytes);
        _ = self.puts.fetch_add(1, Ordering::SeqCst);
        _ = self.nodes.lock().await.entry(cid).or_insert(bytes);
        Ok(cid)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_put_get_dedup() {
        let store = MemoryStore::new();
        let node = DagNode::empty_dir().unwrap();

        let c1 = store.put(&node).await.unwrap();
        let c2 = store.put(&node).await.unwrap();
        assert_eq!(c1, c2);
        assert_eq!(c1, node.cid().unwrap());
        assert_eq!(store.len().await, 1);
        assert_eq!(store.put_count(), 2);

        assert_eq!(store.get(&c1).await.unwrap(), node);
    }

    #[tokio::test]
    async fn test_missing_node_is_storage_error() {
        let store = MemoryStore::new();
        let missing = Cid::of_bytes(b"nothing");
        assert!(matches!(store.get(&missing).await, Err(Error::Storage(_))));
    }
}
