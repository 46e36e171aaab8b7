// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Path-based operations for front ends.
//!
//! Every path must be absolute. Paths are cleaned of `.`, `..` and
//! repeated slashes before use; a trailing slash is kept because some
//! operations give it meaning.

use std::io::SeekFrom;

use tokio::io::{AsyncRead, AsyncReadExt};

use crate::dag::{Cid, DagNode, DataKind};
use crate::dir::NodeListing;
use crate::error::{Error, Result};
use crate::file::File;
use crate::node::{Node, NodeKind};
use crate::ops;
use crate::reader;
use crate::root::Root;
use crate::store::NodeStore;

/// Prefix of paths that name immutable content by cid.
pub const IPFS_PREFIX: &str = "/ipfs/";

const COPY_BUFFER: usize = 64 * 1024;

/// Validate and clean an absolute path.
pub fn check_path(path: &str) -> Result<String> {
    if path.is_empty() {
        return Err(Error::invalid_argument("paths must not be empty"));
    }
    if !path.starts_with('/') {
        return Err(Error::invalid_argument(format!(
            "paths must start with a leading slash: {}",
            path
        )));
    }

    let mut parts: Vec<&str> = Vec::new();
    for segment in path.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                _ = parts.pop();
            }
            name => parts.push(name),
        }
    }
    let mut cleaned = format!("/{}", parts.join("/"));
    if path.ends_with('/') && !parts.is_empty() {
        cleaned.push('/');
    }
    Ok(cleaned)
}

fn basename(path: &str) -> &str {
    ops::segments(path).last().copied().unwrap_or("")
}

/// Summary of the node at a path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stat {
    pub cid: Cid,
    pub kind: NodeKind,
    /// Logical size of a file; zero for directories.
    pub size: u64,
    pub cumulative_size: u64,
    /// Number of links of the node.
    pub blocks: usize,
}

async fn stat_dag(store: &dyn NodeStore, dag: &DagNode) -> Result<Stat> {
    let kind = NodeKind::of_dag(dag)?;
    let size = match kind {
        NodeKind::File => reader::file_size(store, dag).await?,
        NodeKind::Directory => 0,
    };
    Ok(Stat {
        cid: dag.cid()?,
        kind,
        size,
        cumulative_size: dag.cumulative_size()?,
        blocks: dag.links.len(),
    })
}

pub async fn stat(root: &Root, path: &str) -> Result<Stat> {
    let path = check_path(path)?;
    let node = ops::lookup(root, &path).await?;
    let dag = node.materialize().await?;
    stat_dag(root.store().as_ref(), &dag).await
}

/// Children of a directory, or the file itself.
pub async fn ls(root: &Root, path: &str) -> Result<Vec<NodeListing>> {
    let path = check_path(path)?;
    match ops::lookup(root, &path).await? {
        Node::Directory(dir) => dir.list().await,
        Node::File(file) => {
            let dag = file.materialize().await?;
            Ok(vec![NodeListing {
                name: basename(&path).to_string(),
                kind: NodeKind::File,
                cid: dag.cid()?,
                size: file.size().await?,
            }])
        }
    }
}

fn offset_arg(offset: i64) -> Result<u64> {
    u64::try_from(offset).map_err(|_| Error::invalid_argument("cannot specify negative offset"))
}

fn count_arg(count: Option<i64>) -> Result<Option<u64>> {
    count
        .map(|c| u64::try_from(c).map_err(|_| Error::invalid_argument("cannot specify negative count")))
        .transpose()
}

/// Read up to `count` bytes of a file starting at `offset`.
pub async fn read(root: &Root, path: &str, offset: i64, count: Option<i64>) -> Result<Vec<u8>> {
    let path = check_path(path)?;
    let offset = offset_arg(offset)?;
    let count = count_arg(count)?;
    let file = ops::lookup(root, &path).await?.as_file()?;
    let _access = file.acquire().await;

    let size = file.size().await?;
    if offset > size {
        return Err(Error::invalid_argument(format!(
            "offset was past end of file ({} > {})",
            offset, size
        )));
    }
    let end = count.map_or(size, |c| size.min(offset.saturating_add(c)));
    let len = usize::try_from(end - offset)
        .map_err(|_| Error::invalid_argument("read too large for this platform"))?;
    let mut buf = vec![0u8; len];
    let n = file.read_at(offset, &mut buf).await?;
    buf.truncate(n);
    Ok(buf)
}

/// Options for [`write`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WriteOptions {
    pub offset: i64,
    /// Create the file if missing; its parent must exist.
    pub create: bool,
    /// Truncate to zero length before writing.
    pub truncate: bool,
    /// Maximum number of bytes consumed from the input.
    pub count: Option<i64>,
}

async fn file_for_write(root: &Root, path: &str, create: bool) -> Result<File> {
    match ops::lookup(root, path).await {
        Ok(node) => node.as_file(),
        Err(e) if e.is_not_found() && create => {
            let name = basename(path);
            let parent = &path[..path.len() - name.len()];
            let dir = ops::lookup(root, parent).await?.as_dir()?;
            dir.add_child(name, &DagNode::empty_file()?).await?;
            dir.child(name).await?.as_file()
        }
        Err(e) => Err(e),
    }
}

async fn copy_into<R>(file: &File, input: R, offset: u64, count: Option<u64>, truncate: bool) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    if truncate {
        file.truncate(0).await?;
    }
    // Past the end is fine; the first write zero-fills the gap
    _ = file.seek(SeekFrom::Start(offset)).await?;

    let mut input = input.take(count.unwrap_or(u64::MAX));
    let mut buf = vec![0u8; COPY_BUFFER];
    loop {
        let n = input.read(&mut buf).await?;
        if n == 0 {
            return Ok(());
        }
        _ = file.write(&buf[..n]).await?;
    }
}

/// Write `input` into the file at `path`.
///
/// The file is held exclusively for the whole write and is closed, which
/// commits it, even when copying fails.
pub async fn write<R>(root: &Root, path: &str, input: R, opts: WriteOptions) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let path = check_path(path)?;
    if path.ends_with('/') {
        return Err(Error::invalid_argument(format!("cannot write to directory path {}", path)));
    }
    let offset = offset_arg(opts.offset)?;
    let count = count_arg(opts.count)?;

    let file = file_for_write(root, &path, opts.create).await?;
    let _access = file.acquire().await;
    let copied = copy_into(&file, input, offset, count, opts.truncate).await;
    let closed = file.close().await;
    copied?;
    closed
}

pub async fn mv(root: &Root, src: &str, dst: &str) -> Result<()> {
    let src = check_path(src)?;
    let dst = check_path(dst)?;
    ops::mv(root, &src, &dst).await
}

pub async fn mkdir(root: &Root, path: &str, parents: bool) -> Result<()> {
    let path = check_path(path)?;
    _ = ops::mkdir(root, &path, parents).await?;
    Ok(())
}

/// Resolve `<cid>[/name...]` against the store.
pub async fn resolve_immutable(store: &dyn NodeStore, path: &str) -> Result<DagNode> {
    let mut parts = ops::segments(path).into_iter();
    let first = parts
        .next()
        .ok_or_else(|| Error::invalid_argument("missing cid in immutable path"))?;
    let mut node = store.get(&first.parse::<Cid>()?).await?;
    let mut walked = format!("{}{}", IPFS_PREFIX, first);
    for name in parts {
        if node.fs_data()?.kind != DataKind::Directory {
            return Err(Error::not_a_directory(&walked));
        }
        walked = format!("{}/{}", walked, name);
        let link = node.link(name).ok_or_else(|| Error::not_found(&walked))?;
        node = store.get(&link.cid).await?;
    }
    Ok(node)
}

/// Copy `src` to `dst`. `src` is either a tree path or `/ipfs/<cid>[/...]`.
pub async fn cp(root: &Root, src: &str, dst: &str) -> Result<()> {
    let mut dst = check_path(dst)?;
    let node = match src.strip_prefix(IPFS_PREFIX) {
        Some(rest) => resolve_immutable(root.store().as_ref(), rest).await?,
        None => {
            let src = check_path(src)?;
            ops::lookup(root, &src).await?.materialize().await?
        }
    };
    if dst.ends_with('/') {
        dst.push_str(basename(src));
    }
    ops::put_node(root, &dst, &node).await
}

/// Remove the entry at `path`. Directories require `recursive`.
pub async fn rm(root: &Root, path: &str, recursive: bool) -> Result<()> {
    let path = check_path(path)?;
    let path = path.trim_end_matches('/');
    if path.is_empty() {
        return Err(Error::invalid_argument("cannot delete root"));
    }
    let name = basename(path);
    let parent = &path[..path.len() - name.len()];
    let dir = ops::lookup(root, parent).await?.as_dir()?;
    if let Node::Directory(_) = dir.child(name).await? {
        if !recursive {
            return Err(Error::is_a_directory(path));
        }
    }
    dir.unlink(name).await
}

/// Persist the node at `path` and commit it up to the root.
pub async fn flush(root: &Root, path: &str) -> Result<Cid> {
    let path = check_path(path)?;
    if ops::segments(&path).is_empty() {
        return root.flush().await;
    }
    ops::lookup(root, &path).await?.flush().await?.cid()
}
