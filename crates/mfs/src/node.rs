// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::dag::{Cid, DagNode, DataKind};
use crate::dir::Directory;
use crate::error::{Error, Result};
use crate::file::File;
use crate::importer::ImportConfig;
use crate::store::StoreRef;
use async_trait::async_trait;
use futures::future::BoxFuture;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};
use tokio::sync::OwnedMutexGuard;

/// State shared by every node of one mounted tree.
pub struct Context {
    pub store: StoreRef,
    pub import: ImportConfig,
}

pub type ContextRef = Arc<Context>;

/// Receives "the child under `name` now has node `node`" reports.
///
/// Directories implement this for their children and forward their own
/// rebuilt node to their own sink; the chain ends at the root.
#[async_trait]
pub trait CommitSink: Send + Sync {
    async fn close_child(&self, name: &str, node: DagNode) -> Result<()>;
}

/// Non-owning reference from a child to the sink it reports to.
pub type SinkRef = Weak<dyn CommitSink>;

/// Guard returned by [`Node::acquire`].
pub type AccessGuard = OwnedMutexGuard<()>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    File,
    Directory,
}

impl NodeKind {
    /// Classify a stored node by its payload kind.
    pub fn of_dag(node: &DagNode) -> Result<Self> {
        match node.fs_data()?.kind {
            DataKind::Directory => Ok(NodeKind::Directory),
            DataKind::File | DataKind::Raw | DataKind::Metadata => Ok(NodeKind::File),
            other => Err(Error::unsupported_node_type(other.to_string())),
        }
    }
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeKind::File => write!(f, "file"),
            NodeKind::Directory => write!(f, "directory"),
        }
    }
}

/// A live tree node.
#[derive(Clone)]
pub enum Node {
    File(File),
    Directory(Directory),
}

impl Node {
    /// Instantiate a stored node as a live one.
    pub(crate) fn from_dag(
        ctx: ContextRef,
        name: &str,
        path: PathBuf,
        sink: SinkRef,
        dag: &DagNode,
    ) -> Result<Self> {
        match NodeKind::of_dag(dag)? {
            NodeKind::Directory => Ok(Node::Directory(Directory::load(ctx, name, path, sink, dag))),
            NodeKind::File => Ok(Node::File(File::load(ctx, name, path, sink, dag.clone()))),
        }
    }

    /// Produce the stored node for the current content, persisting
    /// anything still pending below this node.
    pub fn materialize(&self) -> BoxFuture<'_, Result<DagNode>> {
        Box::pin(async move {
            match self {
                Node::File(f) => f.materialize().await,
                Node::Directory(d) => d.materialize().await,
            }
        })
    }

    /// Persist this node and report it to its parent.
    pub async fn flush(&self) -> Result<DagNode> {
        match self {
            Node::File(f) => f.flush().await,
            Node::Directory(d) => d.flush().await,
        }
    }

    pub async fn cid(&self) -> Result<Cid> {
        self.materialize().await?.cid()
    }

    #[must_use]
    pub fn kind(&self) -> NodeKind {
        match self {
            Node::File(_) => NodeKind::File,
            Node::Directory(_) => NodeKind::Directory,
        }
    }

    /// Exclusive access for multi-step operations on this node.
    pub async fn acquire(&self) -> AccessGuard {
        match self {
            Node::File(f) => f.acquire().await,
            Node::Directory(d) => d.acquire().await,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            Node::File(f) => f.path(),
            Node::Directory(d) => d.path(),
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Node::File(f) => f.name(),
            Node::Directory(d) => d.name(),
        }
    }

    pub fn as_dir(&self) -> Result<Directory> {
        match self {
            Node::Directory(d) => Ok(d.clone()),
            Node::File(f) => Err(Error::not_a_directory(f.path())),
        }
    }

    pub fn as_file(&self) -> Result<File> {
        match self {
            Node::File(f) => Ok(f.clone()),
            Node::Directory(d) => Err(Error::not_a_file(d.path())),
        }
    }

    /// True when both handles refer to the same live node.
    #[must_use]
    pub fn ptr_eq(&self, other: &Node) -> bool {
        match (self, other) {
            (Node::File(a), Node::File(b)) => a.ptr_eq(b),
            (Node::Directory(a), Node::Directory(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Node({} {})", self.kind(), self.path().display())
    }
}

/// Report `node` to `sink` under `name`. A dropped sink means the reporter
/// was detached from the tree, and the report is discarded.
pub(crate) async fn report(sink: &SinkRef, name: &str, path: &Path, node: DagNode) -> Result<()> {
    match sink.upgrade() {
        Some(sink) => sink.close_child(name, node).await,
        None => {
            let path = path.display().to_string();
            diagnostics::log_debug!("Dropping commit from detached node {path}", path: path);
            Ok(())
        }
    }
}
