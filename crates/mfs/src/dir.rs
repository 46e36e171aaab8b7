// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::dag::{Cid, DagNode, Link};
use crate::error::{Error, Result};
use crate::node::{self, AccessGuard, CommitSink, ContextRef, Node, NodeKind, SinkRef};
use crate::reader;

/// One entry of a directory: either still only a link, or a live node
/// instantiated because something visited it.
enum Entry {
    Stored(Link),
    Live(Node),
}

struct DirState {
    entries: BTreeMap<String, Entry>,
}

pub(crate) struct DirInner {
    ctx: ContextRef,
    name: String,
    path: PathBuf,
    sink: SinkRef,
    /// Taken top-down; may be held while locking a child's state.
    state: Mutex<DirState>,
    /// Held while reporting upward; never taken under a state lock.
    commit: Mutex<()>,
    access: Arc<Mutex<()>>,
}

/// A handle for a live directory.
#[derive(Clone)]
pub struct Directory(Arc<DirInner>);

/// One row of [`Directory::list`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeListing {
    pub name: String,
    pub kind: NodeKind,
    pub cid: Cid,
    /// Logical byte size for files, cumulative size for directories.
    pub size: u64,
}

fn check_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::EmptyName);
    }
    if name.contains('/') {
        return Err(Error::invalid_argument(format!("invalid entry name '{}'", name)));
    }
    Ok(())
}

impl Directory {
    fn with_entries(
        ctx: ContextRef,
        name: &str,
        path: PathBuf,
        sink: SinkRef,
        entries: BTreeMap<String, Entry>,
    ) -> Self {
        Self(Arc::new(DirInner {
            ctx,
            name: name.to_string(),
            path,
            sink,
            state: Mutex::new(DirState { entries }),
            commit: Mutex::new(()),
            access: Arc::new(Mutex::new(())),
        }))
    }

    pub(crate) fn load(ctx: ContextRef, name: &str, path: PathBuf, sink: SinkRef, dag: &DagNode) -> Self {
        let entries = dag
            .links
            .iter()
            .map(|l| (l.name.clone(), Entry::Stored(l.clone())))
            .collect();
        Self::with_entries(ctx, name, path, sink, entries)
    }

    fn empty(ctx: ContextRef, name: &str, path: PathBuf, sink: SinkRef) -> Self {
        Self::with_entries(ctx, name, path, sink, BTreeMap::new())
    }

    /// The sink handed to this directory's children.
    fn child_sink(&self) -> SinkRef {
        Arc::downgrade(&self.0) as SinkRef
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0.name
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.0.path
    }

    #[must_use]
    pub fn ptr_eq(&self, other: &Directory) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub async fn acquire(&self) -> AccessGuard {
        self.0.access.clone().lock_owned().await
    }

    /// Resolve `name`, instantiating a stored entry as a live node.
    pub async fn child(&self, name: &str) -> Result<Node> {
        let mut state = self.0.state.lock().await;
        let link = match state.entries.get(name) {
            None => return Err(Error::not_found(self.0.path.join(name))),
            Some(Entry::Live(node)) => return Ok(node.clone()),
            Some(Entry::Stored(link)) => link.clone(),
        };

        let dag = self.0.ctx.store.get(&link.cid).await?;
        let node = Node::from_dag(
            self.0.ctx.clone(),
            name,
            self.0.path.join(name),
            self.child_sink(),
            &dag,
        )?;
        let path = node.path().display().to_string();
        let cid = link.cid.short();
        diagnostics::log_debug!("Loaded {path} from {cid}", path: path, cid: cid);

        _ = state.entries.insert(name.to_string(), Entry::Live(node.clone()));
        Ok(node)
    }

    /// Insert or replace `name` with a stored node, then commit.
    pub async fn add_child(&self, name: &str, node: &DagNode) -> Result<()> {
        check_name(name)?;
        let _commit = self.0.commit.lock().await;
        let cid = self.0.ctx.store.put(node).await?;
        let link = Link::new(name, cid, node.cumulative_size()?);
        // Any live child under this name is detached
        self.0.swap(name, Some(Entry::Stored(link))).await
    }

    /// Remove `name`, then commit.
    pub async fn unlink(&self, name: &str) -> Result<()> {
        let _commit = self.0.commit.lock().await;
        if !self.0.state.lock().await.entries.contains_key(name) {
            return Err(Error::not_found(self.0.path.join(name)));
        }
        self.0.swap(name, None).await
    }

    /// Create an empty live directory under `name`, then commit.
    pub async fn mkdir(&self, name: &str) -> Result<Directory> {
        check_name(name)?;
        let _commit = self.0.commit.lock().await;
        if self.0.state.lock().await.entries.contains_key(name) {
            return Err(Error::already_exists(self.0.path.join(name)));
        }
        let child = Directory::empty(
            self.0.ctx.clone(),
            name,
            self.0.path.join(name),
            self.child_sink(),
        );
        self.0
            .swap(name, Some(Entry::Live(Node::Directory(child.clone()))))
            .await?;
        Ok(child)
    }

    /// Snapshot of the children, sorted by name. Stored entries are read
    /// without being instantiated.
    pub async fn list(&self) -> Result<Vec<NodeListing>> {
        let state = self.0.state.lock().await;
        let mut out = Vec::with_capacity(state.entries.len());
        for (name, entry) in &state.entries {
            let (dag, cid) = match entry {
                Entry::Stored(link) => (self.0.ctx.store.get(&link.cid).await?, link.cid),
                Entry::Live(node) => {
                    let dag = node.materialize().await?;
                    let cid = dag.cid()?;
                    (dag, cid)
                }
            };
            let kind = NodeKind::of_dag(&dag)?;
            let size = match kind {
                NodeKind::File => reader::file_size(self.0.ctx.store.as_ref(), &dag).await?,
                NodeKind::Directory => dag.cumulative_size()?,
            };
            out.push(NodeListing {
                name: name.clone(),
                kind,
                cid,
                size,
            });
        }
        Ok(out)
    }

    pub async fn child_names(&self) -> Vec<String> {
        self.0.state.lock().await.entries.keys().cloned().collect()
    }

    pub async fn materialize(&self) -> Result<DagNode> {
        let state = self.0.state.lock().await;
        self.0.build(&state).await
    }

    /// Persist this subtree and report it to the parent.
    pub async fn flush(&self) -> Result<DagNode> {
        let _commit = self.0.commit.lock().await;
        let dag = self.materialize().await?;
        self.0.report(dag.clone()).await?;
        Ok(dag)
    }
}

fn set_entry(entries: &mut BTreeMap<String, Entry>, name: &str, entry: Option<Entry>) -> Option<Entry> {
    match entry {
        Some(entry) => entries.insert(name.to_string(), entry),
        None => entries.remove(name),
    }
}

impl DirInner {
    /// Rebuild and persist this directory's node from its entries.
    async fn build(&self, state: &DirState) -> Result<DagNode> {
        let mut links = Vec::with_capacity(state.entries.len());
        for (name, entry) in &state.entries {
            match entry {
                Entry::Stored(link) => links.push(link.clone()),
                Entry::Live(node) => {
                    let dag = node.materialize().await?;
                    links.push(Link::to_node(name.clone(), &dag)?);
                }
            }
        }
        let dag = DagNode::directory(links)?;
        _ = self.ctx.store.put(&dag).await?;
        Ok(dag)
    }

    /// Replace the entry under `name`, rebuild, and report upward. The
    /// previous entry is put back if any step fails. Callers hold the
    /// commit lock.
    async fn swap(&self, name: &str, entry: Option<Entry>) -> Result<()> {
        let mut state = self.state.lock().await;
        let previous = set_entry(&mut state.entries, name, entry);
        let built = self.build(&state).await;
        drop(state);

        let result = match built {
            Ok(dag) => self.report(dag).await,
            Err(e) => Err(e),
        };
        if result.is_err() {
            let mut state = self.state.lock().await;
            _ = set_entry(&mut state.entries, name, previous);
        }
        result
    }

    async fn report(&self, dag: DagNode) -> Result<()> {
        node::report(&self.sink, &self.name, &self.path, dag).await
    }
}

#[async_trait]
impl CommitSink for DirInner {
    async fn close_child(&self, name: &str, node: DagNode) -> Result<()> {
        let _commit = self.commit.lock().await;
        let dag = {
            let state = self.state.lock().await;
            if !matches!(state.entries.get(name), Some(Entry::Live(_))) {
                let path = self.path.join(name).display().to_string();
                let cid = node.cid()?.short();
                diagnostics::log_debug!("Ignoring stale commit {cid} for {path}", cid: cid, path: path);
                return Ok(());
            }
            // Rebuilt from the live children rather than `node`, which may
            // come from a replaced child that shares the name
            self.build(&state).await?
        };
        self.report(dag).await
    }
}
