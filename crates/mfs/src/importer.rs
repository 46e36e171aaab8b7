// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Chunking DAG builder.
//!
//! Byte streams are split into fixed-size chunks stored as raw leaves and
//! joined by a balanced tree of file nodes, each with at most
//! `max_links` children. Content that fits in one chunk is stored inline
//! in a single file node. File commits use this same layout so that
//! writing a file through the mutable tree and importing the same bytes
//! produce the same content identifier.

use crate::dag::{DagNode, FsData, Link};
use crate::error::{Error, Result};
use crate::store::NodeStore;
use tokio::io::{AsyncRead, AsyncReadExt};

pub const DEFAULT_CHUNK_SIZE: usize = 256 * 1024;
pub const DEFAULT_MAX_LINKS: usize = 174;

/// Chunking policy shared by imports and file commits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImportConfig {
    pub chunk_size: usize,
    pub max_links: usize,
}

impl Default for ImportConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_links: DEFAULT_MAX_LINKS,
        }
    }
}

impl ImportConfig {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::invalid_argument("chunk size must be positive"));
        }
        if self.max_links < 2 {
            return Err(Error::invalid_argument("max links must be at least 2"));
        }
        Ok(())
    }
}

/// A stored subtree: the link to it and the number of content bytes below it.
struct Built {
    link: Link,
    logical: u64,
}

/// Import an in-memory buffer.
pub async fn import_bytes(store: &dyn NodeStore, data: &[u8], cfg: &ImportConfig) -> Result<DagNode> {
    cfg.validate()?;
    if data.len() <= cfg.chunk_size {
        let node = DagNode::from_fs_data(&FsData::file(data.to_vec(), Vec::new()), Vec::new())?;
        _ = store.put(&node).await?;
        return Ok(node);
    }

    let mut leaves = Vec::with_capacity(data.len().div_ceil(cfg.chunk_size));
    for chunk in data.chunks(cfg.chunk_size) {
        leaves.push(store_leaf(store, chunk.to_vec()).await?);
    }
    build_tree(store, leaves, cfg).await
}

/// Import everything readable from `reader`.
pub async fn import_reader<R>(store: &dyn NodeStore, mut reader: R, cfg: &ImportConfig) -> Result<DagNode>
where
    R: AsyncRead + Unpin,
{
    cfg.validate()?;
    let first = read_chunk(&mut reader, cfg.chunk_size).await?;
    if first.len() < cfg.chunk_size {
        return import_bytes(store, &first, cfg).await;
    }
    let second = read_chunk(&mut reader, cfg.chunk_size).await?;
    if second.is_empty() {
        // Exactly one chunk stays inline
        return import_bytes(store, &first, cfg).await;
    }

    let mut done = second.len() < cfg.chunk_size;
    let mut leaves = vec![
        store_leaf(store, first).await?,
        store_leaf(store, second).await?,
    ];
    while !done {
        let chunk = read_chunk(&mut reader, cfg.chunk_size).await?;
        if chunk.is_empty() {
            break;
        }
        done = chunk.len() < cfg.chunk_size;
        leaves.push(store_leaf(store, chunk).await?);
    }
    build_tree(store, leaves, cfg).await
}

async fn read_chunk<R: AsyncRead + Unpin>(reader: &mut R, size: usize) -> Result<Vec<u8>> {
    let mut buf = vec![0u8; size];
    let mut filled = 0;
    while filled < size {
        let n = reader.read(&mut buf[filled..]).await?;
        if n == 0 {
            break;
        }
        filled += n;
    }
    buf.truncate(filled);
    Ok(buf)
}

async fn store_leaf(store: &dyn NodeStore, chunk: Vec<u8>) -> Result<Built> {
    let logical = chunk.len() as u64;
    let node = DagNode::from_fs_data(&FsData::raw(chunk), Vec::new())?;
    let cid = store.put(&node).await?;
    Ok(Built {
        link: Link::new("", cid, node.cumulative_size()?),
        logical,
    })
}

async fn store_interior(store: &dyn NodeStore, children: Vec<Built>) -> Result<(DagNode, Built)> {
    let blocksizes: Vec<u64> = children.iter().map(|c| c.logical).collect();
    let logical = blocksizes.iter().sum();
    let links = children.into_iter().map(|c| c.link).collect();
    let node = DagNode::from_fs_data(&FsData::file(Vec::new(), blocksizes), links)?;
    let cid = store.put(&node).await?;
    let built = Built {
        link: Link::new("", cid, node.cumulative_size()?),
        logical,
    };
    Ok((node, built))
}

async fn build_tree(store: &dyn NodeStore, mut level: Vec<Built>, cfg: &ImportConfig) -> Result<DagNode> {
    loop {
        let mut next = Vec::with_capacity(level.len().div_ceil(cfg.max_links));
        let mut top = None;
        let mut rest = level.into_iter().peekable();
        while rest.peek().is_some() {
            let group: Vec<Built> = rest.by_ref().take(cfg.max_links).collect();
            let (node, built) = store_interior(store, group).await?;
            top = Some(node);
            next.push(built);
        }
        match (next.len(), top) {
            (1, Some(root)) => return Ok(root),
            (0, _) => return Err(Error::invalid_argument("no content to import")),
            _ => level = next,
        }
    }
}
