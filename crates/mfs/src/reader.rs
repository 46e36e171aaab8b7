// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Reassembles the bytes of a file DAG.

use crate::dag::{Cid, DagNode, DataKind};
use crate::error::{Error, Result};
use crate::store::NodeStore;

/// Read the complete content of a file, raw leaf or metadata-wrapped node.
pub async fn read_all(store: &dyn NodeStore, node: &DagNode) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    let mut pending: Vec<Cid> = Vec::new();
    let mut current = Some(node.clone());

    loop {
        let node = match current.take() {
            Some(node) => node,
            None => match pending.pop() {
                Some(cid) => store.get(&cid).await?,
                None => break,
            },
        };
        let fs = node.fs_data()?;
        match fs.kind {
            DataKind::File | DataKind::Raw => {
                out.extend_from_slice(&fs.data);
                // Children are visited in order, depth first
                pending.extend(node.links.iter().rev().map(|l| l.cid));
            }
            DataKind::Metadata => {
                let content = node
                    .links
                    .first()
                    .ok_or_else(|| Error::codec("metadata node without content link"))?;
                pending.push(content.cid);
            }
            kind => {
                return Err(Error::codec(format!("expected file content, found {}", kind)));
            }
        }
    }
    Ok(out)
}

/// Logical size of a file-like node, following a metadata wrapper.
pub async fn file_size(store: &dyn NodeStore, node: &DagNode) -> Result<u64> {
    let fs = node.fs_data()?;
    match fs.kind {
        DataKind::File | DataKind::Raw => Ok(fs.logical_size().unwrap_or_default()),
        DataKind::Metadata => {
            let content = node
                .links
                .first()
                .ok_or_else(|| Error::codec("metadata node without content link"))?;
            let inner = store.get(&content.cid).await?;
            let inner_fs = inner.fs_data()?;
            inner_fs
                .logical_size()
                .ok_or_else(|| Error::codec(format!("expected file content, found {}", inner_fs.kind)))
        }
        kind => Err(Error::codec(format!("expected file content, found {}", kind))),
    }
}
