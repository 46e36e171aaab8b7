// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Path resolution and mutation over a mounted tree.
//!
//! Paths are `/`-separated and resolved from the root's top-level
//! directory; empty segments are ignored.

use crate::dag::DagNode;
use crate::dir::Directory;
use crate::error::{Error, Result};
use crate::node::Node;
use crate::root::Root;

/// Non-empty segments of `path`.
pub(crate) fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Split `path` into its parent segments and final name.
fn split_parent(path: &str) -> Result<(Vec<&str>, &str)> {
    let mut parts = segments(path);
    match parts.pop() {
        Some(name) => Ok((parts, name)),
        None => Err(Error::invalid_argument(format!("'{}' has no final name", path))),
    }
}

fn root_dir(root: &Root) -> Result<Directory> {
    root.value().as_dir()
}

/// Resolve `path` from the root.
pub async fn lookup(root: &Root, path: &str) -> Result<Node> {
    match root.value() {
        Node::Directory(dir) => dir_lookup(dir, path).await,
        Node::File(f) if segments(path).is_empty() => Ok(Node::File(f.clone())),
        Node::File(f) => Err(Error::not_a_directory(f.path())),
    }
}

/// Resolve `path` relative to `dir`. The empty path is `dir` itself.
pub async fn dir_lookup(dir: &Directory, path: &str) -> Result<Node> {
    let mut node = Node::Directory(dir.clone());
    for name in segments(path) {
        let current = match &node {
            Node::Directory(d) => d.clone(),
            Node::File(f) => return Err(Error::not_a_directory(f.path())),
        };
        node = current.child(name).await?;
    }
    Ok(node)
}

async fn lookup_dir(root: &Root, parts: &[&str]) -> Result<Directory> {
    dir_lookup(&root_dir(root)?, &parts.join("/")).await?.as_dir()
}

/// Move `src` to `dst`.
///
/// A `dst` ending in `/` receives the node under the source's name.
/// Otherwise the last segment of `dst` names the entry, replacing whatever
/// is there, directory or not. The destination is written before the
/// source is unlinked; if the unlink fails the node is left at both paths
/// and [`Error::PartialMove`] is returned.
pub async fn mv(root: &Root, src: &str, dst: &str) -> Result<()> {
    let (src_parts, src_name) = split_parent(src)?;
    let src_dir = lookup_dir(root, &src_parts).await?;
    let node = src_dir.child(src_name).await?;

    let (dst_dir, dst_name) = if dst.ends_with('/') {
        (lookup_dir(root, &segments(dst)).await?, src_name)
    } else {
        let (parts, name) = split_parent(dst)?;
        (lookup_dir(root, &parts).await?, name)
    };
    if dst_dir.ptr_eq(&src_dir) && dst_name == src_name {
        return Ok(());
    }
    if let Node::Directory(moved) = &node {
        if dst_dir.path().starts_with(moved.path()) {
            return Err(Error::invalid_argument(format!(
                "cannot move {} into itself",
                moved.path().display()
            )));
        }
    }

    let dag = node.materialize().await?;
    dst_dir.add_child(dst_name, &dag).await?;
    src_dir
        .unlink(src_name)
        .await
        .map_err(|e| Error::partial_move(node.path(), e))
}

/// Add `node` at `path`, replacing any existing entry.
pub async fn put_node(root: &Root, path: &str, node: &DagNode) -> Result<()> {
    let (parts, name) = split_parent(path)?;
    lookup_dir(root, &parts).await?.add_child(name, node).await
}

/// Create the directory at `path`.
///
/// With `parents`, missing intermediates are created and an entry that
/// already exists at `path` is not an error. The existing directory is
/// returned; an existing file yields `None`.
pub async fn mkdir(root: &Root, path: &str, parents: bool) -> Result<Option<Directory>> {
    let mut dir = root_dir(root)?;
    let Some((last, intermediate)) = segments(path).split_last().map(|(l, i)| (*l, i.to_vec())) else {
        return if parents {
            Ok(Some(dir))
        } else {
            Err(Error::already_exists(dir.path()))
        };
    };

    for name in intermediate {
        dir = match dir.child(name).await {
            Ok(node) => node.as_dir()?,
            Err(e) if e.is_not_found() && parents => match dir.mkdir(name).await {
                Ok(created) => created,
                // Created concurrently
                Err(Error::AlreadyExists(_)) => dir.child(name).await?.as_dir()?,
                Err(e) => return Err(e),
            },
            Err(e) => return Err(e),
        };
    }

    match dir.mkdir(last).await {
        Ok(created) => Ok(Some(created)),
        Err(Error::AlreadyExists(_)) if parents => match dir.child(last).await? {
            Node::Directory(existing) => Ok(Some(existing)),
            Node::File(_) => Ok(None),
        },
        Err(e) => Err(e),
    }
}
