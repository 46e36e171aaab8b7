// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

mod tree;

use std::sync::Arc;
use std::sync::Mutex as StdMutex;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;

use crate::dag::{Cid, DagNode};
use crate::error::{Error, PublishError, Result};
use crate::events::NullSink;
use crate::importer::ImportConfig;
use crate::republisher::Publisher;
use crate::root::{Root, RootConfig};
use crate::store::{MemoryStore, NodeStore};

/// Publisher that records every value it is asked to publish.
#[derive(Default)]
pub(crate) struct RecordingPublisher {
    published: StdMutex<Vec<Cid>>,
    pub fail: AtomicBool,
}

impl RecordingPublisher {
    pub fn values(&self) -> Vec<Cid> {
        self.published.lock().unwrap().clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, cid: &Cid) -> std::result::Result<(), PublishError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(PublishError::new("publish refused"));
        }
        self.published.lock().unwrap().push(*cid);
        Ok(())
    }
}

type PutFilter = Box<dyn Fn(&DagNode) -> bool + Send + Sync>;

/// Store wrapper whose puts can be made to fail.
#[derive(Default)]
pub(crate) struct FlakyStore {
    pub inner: MemoryStore,
    fail_all: AtomicBool,
    fail_when: StdMutex<Option<PutFilter>>,
}

impl FlakyStore {
    pub fn fail_puts(&self, fail: bool) {
        self.fail_all.store(fail, Ordering::SeqCst);
    }

    /// Fail puts of nodes matching `filter`.
    pub fn fail_when<F>(&self, filter: F)
    where
        F: Fn(&DagNode) -> bool + Send + Sync + 'static,
    {
        *self.fail_when.lock().unwrap() = Some(Box::new(filter));
    }
}

#[async_trait]
impl NodeStore for FlakyStore {
    async fn get(&self, cid: &Cid) -> Result<DagNode> {
        self.inner.get(cid).await
    }

    async fn put(&self, node: &DagNode) -> Result<Cid> {
        let refused = self.fail_all.load(Ordering::SeqCst)
            || self
                .fail_when
                .lock()
                .unwrap()
                .as_ref()
                .is_some_and(|filter| filter(node));
        if refused {
            return Err(Error::storage("disk full"));
        }
        self.inner.put(node).await
    }
}

pub(crate) struct Fixture<S> {
    pub root: Root,
    pub store: Arc<S>,
    pub publisher: Arc<RecordingPublisher>,
}

pub(crate) fn test_config() -> RootConfig {
    RootConfig {
        import: ImportConfig {
            chunk_size: 16,
            max_links: 3,
        },
        events: Arc::new(NullSink),
        ..RootConfig::default()
    }
}

/// Mount `node` over `store`.
pub(crate) async fn mount<S: NodeStore + 'static>(store: Arc<S>, node: DagNode) -> Fixture<S> {
    _ = store.put(&node).await.unwrap();
    let publisher = Arc::new(RecordingPublisher::default());
    let root = Root::new(store.clone(), node, publisher.clone(), test_config()).unwrap();
    Fixture {
        root,
        store,
        publisher,
    }
}

/// An empty tree over a fresh memory store.
pub(crate) async fn new_root() -> Fixture<MemoryStore> {
    mount(Arc::new(MemoryStore::new()), DagNode::empty_dir().unwrap()).await
}

pub(crate) async fn new_flaky_root() -> Fixture<FlakyStore> {
    mount(Arc::new(FlakyStore::default()), DagNode::empty_dir().unwrap()).await
}

/// Store `content` as a file and put it at `path`.
pub(crate) async fn put_file(root: &Root, path: &str, content: &[u8]) -> DagNode {
    let node = crate::importer::import_bytes(root.store().as_ref(), content, &test_config().import)
        .await
        .unwrap();
    crate::ops::put_node(root, path, &node).await.unwrap();
    node
}
