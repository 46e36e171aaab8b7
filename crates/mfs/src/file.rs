// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::sync::Mutex;

use crate::dag::DagNode;
use crate::error::{Error, Result};
use crate::importer;
use crate::node::{self, AccessGuard, ContextRef, SinkRef};
use crate::reader;

struct FileState {
    /// Last node built from the content.
    node: DagNode,
    /// Staged content, loaded on first access.
    content: Option<Vec<u8>>,
    pos: u64,
    /// Content differs from `node`.
    dirty: bool,
    /// Number of nodes built; `announced` trails it until the sink has
    /// been told about the latest one.
    built: u64,
    announced: u64,
}

pub(crate) struct FileInner {
    ctx: ContextRef,
    name: String,
    path: PathBuf,
    sink: SinkRef,
    state: Mutex<FileState>,
    commit: Mutex<()>,
    access: Arc<Mutex<()>>,
}

/// A handle for a live file.
///
/// Writes are staged in memory and only become durable on
/// [`File::flush`] or [`File::close`].
#[derive(Clone)]
pub struct File(Arc<FileInner>);

impl File {
    pub(crate) fn load(ctx: ContextRef, name: &str, path: PathBuf, sink: SinkRef, node: DagNode) -> Self {
        Self(Arc::new(FileInner {
            ctx,
            name: name.to_string(),
            path,
            sink,
            state: Mutex::new(FileState {
                node,
                content: None,
                pos: 0,
                dirty: false,
                built: 0,
                announced: 0,
            }),
            commit: Mutex::new(()),
            access: Arc::new(Mutex::new(())),
        }))
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
    pub fn ptr_eq(&self, other: &File) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub async fn acquire(&self) -> AccessGuard {
        self.0.access.clone().lock_owned().await
    }

    /// Read from the cursor, advancing it. Returns 0 at end of file.
    pub async fn read(&self, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.0.state.lock().await;
        let pos = state.pos;
        let n = copy_out(self.0.content(&mut state).await?, pos, buf);
        state.pos += n as u64;
        Ok(n)
    }

    /// Read at `offset` without moving the cursor.
    pub async fn read_at(&self, offset: u64, buf: &mut [u8]) -> Result<usize> {
        let mut state = self.0.state.lock().await;
        Ok(copy_out(self.0.content(&mut state).await?, offset, buf))
    }

    /// Everything from the cursor to the end.
    pub async fn read_to_end(&self) -> Result<Vec<u8>> {
        let mut state = self.0.state.lock().await;
        let pos = state.pos;
        let content = self.0.content(&mut state).await?;
        let len = content.len();
        let start = usize::try_from(pos).map_or(len, |p| p.min(len));
        let out = content[start..].to_vec();
        state.pos = pos.max(len as u64);
        Ok(out)
    }

    /// Reposition the cursor. Positions past the end are allowed; a later
    /// write fills the gap with zeros.
    pub async fn seek(&self, from: SeekFrom) -> Result<u64> {
        let mut state = self.0.state.lock().await;
        let target = match from {
            SeekFrom::Start(n) => i128::from(n),
            SeekFrom::Current(delta) => i128::from(state.pos) + i128::from(delta),
            SeekFrom::End(delta) => i128::from(self.0.size(&state).await?) + i128::from(delta),
        };
        let pos = u64::try_from(target)
            .map_err(|_| Error::invalid_argument(format!("cannot seek to offset {}", target)))?;
        state.pos = pos;
        Ok(pos)
    }

    /// Stage `buf` at the cursor, advancing it.
    pub async fn write(&self, buf: &[u8]) -> Result<usize> {
        let mut state = self.0.state.lock().await;
        let start = to_index(state.pos)?;
        let end = start
            .checked_add(buf.len())
            .ok_or_else(|| Error::invalid_argument("write past addressable size"))?;
        let content = self.0.content(&mut state).await?;
        if content.len() < end {
            grow(content, end)?;
        }
        content[start..end].copy_from_slice(buf);
        state.pos = end as u64;
        state.dirty = true;
        Ok(buf.len())
    }

    /// Cut or zero-extend the content to `size` bytes.
    pub async fn truncate(&self, size: u64) -> Result<()> {
        let mut state = self.0.state.lock().await;
        let size = to_index(size)?;
        let content = self.0.content(&mut state).await?;
        if content.len() < size {
            grow(content, size)?;
        } else {
            content.truncate(size);
        }
        state.dirty = true;
        Ok(())
    }

    /// Logical size, including staged writes.
    pub async fn size(&self) -> Result<u64> {
        let state = self.0.state.lock().await;
        self.0.size(&state).await
    }

    pub async fn is_dirty(&self) -> bool {
        self.0.state.lock().await.dirty
    }

    /// Build and persist the node for the staged content, without
    /// reporting it.
    pub async fn materialize(&self) -> Result<DagNode> {
        let mut state = self.0.state.lock().await;
        self.0.build(&mut state).await
    }

    /// Persist staged content and report the new node to the parent.
    ///
    /// A storage failure leaves the content staged; calling again retries
    /// the same commit. Does nothing when there is nothing new to report.
    pub async fn flush(&self) -> Result<DagNode> {
        let _commit = self.0.commit.lock().await;
        let (node, version, announced) = {
            let mut state = self.0.state.lock().await;
            let node = self.0.build(&mut state).await?;
            (node, state.built, state.announced)
        };
        if version == announced {
            return Ok(node);
        }

        node::report(&self.0.sink, &self.0.name, &self.0.path, node.clone()).await?;

        let mut state = self.0.state.lock().await;
        state.announced = state.announced.max(version);
        Ok(node)
    }

    /// Flush and rewind the cursor.
    pub async fn close(&self) -> Result<()> {
        _ = self.flush().await?;
        self.0.state.lock().await.pos = 0;
        Ok(())
    }
}

impl FileInner {
    async fn content<'a>(&self, state: &'a mut FileState) -> Result<&'a mut Vec<u8>> {
        let content = match state.content.take() {
            Some(content) => content,
            None => reader::read_all(self.ctx.store.as_ref(), &state.node).await?,
        };
        Ok(state.content.insert(content))
    }

    async fn size(&self, state: &FileState) -> Result<u64> {
        match &state.content {
            Some(content) => Ok(content.len() as u64),
            None => reader::file_size(self.ctx.store.as_ref(), &state.node).await,
        }
    }

    async fn build(&self, state: &mut FileState) -> Result<DagNode> {
        if state.dirty {
            let content = state.content.as_deref().unwrap_or_default();
            let node = importer::import_bytes(self.ctx.store.as_ref(), content, &self.ctx.import).await?;
            let path = self.path.display().to_string();
            let cid = node.cid()?.short();
            diagnostics::log_debug!("Built {path} as {cid}", path: path, cid: cid);
            state.node = node;
            state.dirty = false;
            state.built += 1;
        }
        Ok(state.node.clone())
    }
}

/// Zero-extend `content` to `len`, failing instead of aborting when the
/// allocation cannot be made.
fn grow(content: &mut Vec<u8>, len: usize) -> Result<()> {
    content
        .try_reserve_exact(len - content.len())
        .map_err(|e| Error::invalid_argument(format!("cannot extend file to {} bytes: {}", len, e)))?;
    content.resize(len, 0);
    Ok(())
}

fn to_index(offset: u64) -> Result<usize> {
    usize::try_from(offset).map_err(|_| Error::invalid_argument(format!("offset {} too large", offset)))
}

fn copy_out(content: &[u8], offset: u64, buf: &mut [u8]) -> usize {
    let Ok(start) = usize::try_from(offset) else {
        return 0;
    };
    if start >= content.len() {
        return 0;
    }
    let n = buf.len().min(content.len() - start);
    buf[..n].copy_from_slice(&content[start..start + n]);
    n
}
