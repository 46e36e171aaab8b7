// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::collections::BTreeSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow, bail};
use diagnostics::{log_debug, log_info};
use futures::future::BoxFuture;
use mfs::{Cid, DagNode, ImportConfig, Link, NodeStore, StoreRef, import_reader};
use tokio::io::AsyncWriteExt;

use crate::common::Repo;
use crate::store::HashOnlyStore;

/// Flags of `mfs add`.
#[derive(Debug, Clone, Default)]
pub struct AddOptions {
    /// Chunk size in bytes
    pub chunk_size: Option<usize>,
    /// Descend into directories
    pub recursive: bool,
    /// Wrap everything added in one more directory
    pub wrap: bool,
    /// Compute cids without storing anything
    pub only_hash: bool,
    /// Include dot-files found while descending
    pub hidden: bool,
    /// Print cids only
    pub quiet: bool,
}

/// A host path imported at the top level.
struct Added {
    path: PathBuf,
    name: String,
    node: DagNode,
}

/// Import host files and directories into the store.
///
/// Prints one `added <cid> <name>` line per imported entry, children
/// before their directory. Unless hashing only, each top-level cid is
/// appended to the repository reflog.
pub async fn add_command<W: Write>(
    repo: &Repo,
    paths: &[PathBuf],
    opts: &AddOptions,
    out: &mut W,
) -> Result<()> {
    if paths.is_empty() {
        bail!("nothing to add");
    }
    if !opts.only_hash {
        repo.ensure_initialized()?;
    }

    let mut cfg = ImportConfig::default();
    if let Some(size) = opts.chunk_size {
        cfg.chunk_size = size;
    }
    let store: StoreRef = if opts.only_hash {
        Arc::new(HashOnlyStore)
    } else {
        repo.store()
    };

    let mut report = Vec::new();
    let mut top = Vec::with_capacity(paths.len());
    for path in paths {
        let name = entry_name(path)?;
        let meta = tokio::fs::metadata(path)
            .await
            .with_context(|| format!("cannot stat {}", path.display()))?;
        if meta.is_dir() && !opts.recursive {
            bail!("{} is a directory, use -r to add directories", path.display());
        }
        let node = import_path(store.as_ref(), &cfg, opts.hidden, path.clone(), name.clone(), &mut report).await?;

        let (shown, cid) = (path.display().to_string(), node.cid()?.short());
        log_info!("Added {path} as {cid}", path: shown, cid: cid);
        top.push(Added {
            path: path.clone(),
            name,
            node,
        });
    }

    let roots = if opts.wrap {
        let wrapper = wrap(store.as_ref(), &top).await?;
        report.push((String::new(), wrapper));
        let shown: Vec<String> = top.iter().map(|a| a.path.display().to_string()).collect();
        vec![(wrapper, shown.join(" "))]
    } else {
        top.iter()
            .map(|a| -> Result<(Cid, String)> { Ok((a.node.cid()?, a.path.display().to_string())) })
            .collect::<Result<Vec<_>>>()?
    };

    for (name, cid) in &report {
        if opts.quiet {
            writeln!(out, "{}", cid)?;
        } else if name.is_empty() {
            writeln!(out, "added {}", cid)?;
        } else {
            writeln!(out, "added {} {}", cid, name)?;
        }
    }

    if !opts.only_hash {
        append_reflog(repo, &roots).await?;
    }
    Ok(())
}

/// Name an added path by its last component.
fn entry_name(path: &Path) -> Result<String> {
    let name = path
        .file_name()
        .ok_or_else(|| anyhow!("cannot name {}", path.display()))?;
    name.to_str()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("{} is not valid UTF-8", path.display()))
}

/// Import `path` as `name`, recording every stored entry in `report`.
fn import_path<'a>(
    store: &'a dyn NodeStore,
    cfg: &'a ImportConfig,
    hidden: bool,
    path: PathBuf,
    name: String,
    report: &'a mut Vec<(String, Cid)>,
) -> BoxFuture<'a, Result<DagNode>> {
    Box::pin(async move {
        let meta = tokio::fs::metadata(&path)
            .await
            .with_context(|| format!("cannot stat {}", path.display()))?;

        let node = if meta.is_dir() {
            let mut names = Vec::new();
            let mut entries = tokio::fs::read_dir(&path)
                .await
                .with_context(|| format!("cannot list {}", path.display()))?;
            while let Some(entry) = entries.next_entry().await? {
                let child = entry
                    .file_name()
                    .into_string()
                    .map_err(|n| anyhow!("{:?} in {} is not valid UTF-8", n, path.display()))?;
                if !hidden && child.starts_with('.') {
                    log_debug!("Skipping hidden {child}", child: child);
                    continue;
                }
                names.push(child);
            }
            names.sort();

            let mut links = Vec::with_capacity(names.len());
            for child in names {
                let node = import_path(
                    store,
                    cfg,
                    hidden,
                    path.join(&child),
                    format!("{}/{}", name, child),
                    report,
                )
                .await?;
                links.push(Link::to_node(child, &node)?);
            }
            let node = DagNode::directory(links)?;
            _ = store.put(&node).await?;
            node
        } else {
            let input = tokio::fs::File::open(&path)
                .await
                .with_context(|| format!("cannot open {}", path.display()))?;
            import_reader(store, input, cfg).await?
        };

        report.push((name, node.cid()?));
        Ok(node)
    })
}

/// Store a directory holding every top-level entry under its name.
async fn wrap(store: &dyn NodeStore, top: &[Added]) -> Result<Cid> {
    let mut seen = BTreeSet::new();
    let mut links = Vec::with_capacity(top.len());
    for added in top {
        if !seen.insert(added.name.as_str()) {
            bail!("cannot wrap two entries named {}", added.name);
        }
        links.push(Link::to_node(added.name.as_str(), &added.node)?);
    }
    let wrapper = DagNode::directory(links)?;
    Ok(store.put(&wrapper).await?)
}

async fn append_reflog(repo: &Repo, roots: &[(Cid, String)]) -> Result<()> {
    let mut reflog = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(repo.reflog_path())
        .await?;
    for (cid, what) in roots {
        reflog
            .write_all(format!("{} add {}\n", cid, what).as_bytes())
            .await?;
    }
    reflog.flush().await?;
    Ok(())
}
