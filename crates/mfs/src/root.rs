// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio::time::Duration;

use crate::dag::{Cid, DagNode};
use crate::error::{Error, Result};
use crate::events::{EventSink, LogSink};
use crate::importer::ImportConfig;
use crate::node::{CommitSink, Context, Node, NodeKind, SinkRef};
use crate::republisher::{Publisher, Republisher};
use crate::store::StoreRef;

pub const DEFAULT_SHORT_WINDOW: Duration = Duration::from_millis(300);
pub const DEFAULT_LONG_WINDOW: Duration = Duration::from_secs(3);

/// Settings for a mounted tree.
#[derive(Clone)]
pub struct RootConfig {
    /// Quiet period after which a changed root is published.
    pub short_window: Duration,
    /// Upper bound on how long a changed root stays unpublished.
    pub long_window: Duration,
    pub import: ImportConfig,
    pub events: Arc<dyn EventSink>,
}

impl Default for RootConfig {
    fn default() -> Self {
        Self {
            short_window: DEFAULT_SHORT_WINDOW,
            long_window: DEFAULT_LONG_WINDOW,
            import: ImportConfig::default(),
            events: Arc::new(LogSink),
        }
    }
}

/// Final commit sink: records the tree's cid and feeds the republisher.
struct RootSink {
    cid: Mutex<Cid>,
    republisher: Republisher,
}

#[async_trait]
impl CommitSink for RootSink {
    async fn close_child(&self, _name: &str, node: DagNode) -> Result<()> {
        let cid = node.cid()?;
        *self.cid.lock().await = cid;
        self.republisher.update(cid);
        let short = cid.short();
        diagnostics::log_debug!("Root now at {cid}", cid: short);
        Ok(())
    }
}

/// The mount point of one tree.
pub struct Root {
    inner: Arc<RootSink>,
    value: Node,
    store: StoreRef,
}

impl Root {
    /// Mount `node` and start republishing. Must be called inside a tokio
    /// runtime.
    pub fn new(
        store: StoreRef,
        node: DagNode,
        publisher: Arc<dyn Publisher>,
        config: RootConfig,
    ) -> Result<Self> {
        config.import.validate()?;
        // Rejects unsupported kinds before anything is spawned
        let kind = NodeKind::of_dag(&node)?;
        let cid = node.cid()?;

        let republisher = Republisher::new(
            publisher,
            config.events,
            cid,
            config.short_window,
            config.long_window,
        );
        let inner = Arc::new(RootSink {
            cid: Mutex::new(cid),
            republisher,
        });
        let sink = Arc::downgrade(&inner) as SinkRef;
        let ctx = Arc::new(Context {
            store: store.clone(),
            import: config.import,
        });
        let value = Node::from_dag(ctx, "", PathBuf::from("/"), sink, &node)?;

        let short = cid.short();
        let kind = kind.to_string();
        diagnostics::log_info!("Mounted {kind} root {cid}", kind: kind, cid: short);

        Ok(Self { inner, value, store })
    }

    /// The live top-level node.
    #[must_use]
    pub fn value(&self) -> &Node {
        &self.value
    }

    #[must_use]
    pub fn store(&self) -> &StoreRef {
        &self.store
    }

    /// The most recent cid committed to this root.
    pub async fn cid(&self) -> Cid {
        *self.inner.cid.lock().await
    }

    #[must_use]
    pub fn republisher(&self) -> &Republisher {
        &self.inner.republisher
    }

    /// Persist everything pending in the tree and commit the result.
    pub async fn flush(&self) -> Result<Cid> {
        let node = self.value.materialize().await?;
        let cid = node.cid()?;
        self.inner.close_child("", node).await?;
        Ok(cid)
    }

    /// Flush, publish the latest cid synchronously, then stop the
    /// background republisher.
    ///
    /// The publish and shutdown happen even when the flush fails, so the
    /// last committed root still goes out. The flush error wins.
    pub async fn close(&self) -> Result<()> {
        let flushed = self.flush().await;
        let published = self.inner.republisher.close().await.map_err(Error::from);
        let cid = flushed?;
        published?;
        let cid = cid.short();
        diagnostics::log_info!("Closed root at {cid}", cid: cid);
        Ok(())
    }
}
