// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use diagnostics::log_info;
use futures::future::BoxFuture;
use mfs::files::{IPFS_PREFIX, resolve_immutable};
use mfs::{DagNode, NodeKind, NodeStore, read_all};

use crate::common::Repo;

/// Copy an immutable file or tree, named `<cid>[/path]` or
/// `/ipfs/<cid>[/path]`, onto the host filesystem.
///
/// Without `output` the last segment of `target` names the destination
/// in the current directory.
pub async fn get_command<W: Write>(
    repo: &Repo,
    target: &str,
    output: Option<&Path>,
    out: &mut W,
) -> Result<()> {
    let path = target.strip_prefix(IPFS_PREFIX).unwrap_or(target);
    let store = repo.store();
    let node = resolve_immutable(store.as_ref(), path).await?;

    let dest = match output {
        Some(dest) => dest.to_path_buf(),
        None => match path.rsplit('/').find(|s| !s.is_empty()) {
            Some(name) => PathBuf::from(name),
            None => bail!("cannot name the output for {:?}, use -o", target),
        },
    };
    writeln!(out, "Saving file(s) to {}", dest.display())?;
    write_node(store.as_ref(), node, dest.clone()).await?;

    let shown = dest.display().to_string();
    log_info!("Saved {target} to {dest}", target: target, dest: shown);
    Ok(())
}

/// Link names must stay inside the destination directory.
fn check_link_name(name: &str) -> Result<()> {
    if name.is_empty() || name == "." || name == ".." || name.contains('/') || name.contains('\\') {
        bail!("refusing to write entry named {:?}", name);
    }
    Ok(())
}

fn write_node(store: &dyn NodeStore, node: DagNode, dest: PathBuf) -> BoxFuture<'_, Result<()>> {
    Box::pin(async move {
        match NodeKind::of_dag(&node)? {
            NodeKind::File => {
                let content = read_all(store, &node).await?;
                tokio::fs::write(&dest, content)
                    .await
                    .with_context(|| format!("cannot write {}", dest.display()))?;
            }
            NodeKind::Directory => {
                tokio::fs::create_dir_all(&dest)
                    .await
                    .with_context(|| format!("cannot create {}", dest.display()))?;
                for link in &node.links {
                    check_link_name(&link.name)?;
                    let child = store.get(&link.cid).await?;
                    write_node(store, child, dest.join(&link.name)).await?;
                }
            }
        }
        Ok(())
    })
}
