// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;

use anyhow::{Result, anyhow};
use mfs::files::{IPFS_PREFIX, resolve_immutable};
use mfs::{NodeKind, read_all};

use crate::common::Repo;

/// Write the bytes of an immutable file, named `<cid>[/path]` or
/// `/ipfs/<cid>[/path]`, to `out`.
pub async fn cat_command<W: Write>(repo: &Repo, target: &str, out: &mut W) -> Result<()> {
    let path = target.strip_prefix(IPFS_PREFIX).unwrap_or(target);
    let store = repo.store();
    let node = resolve_immutable(store.as_ref(), path).await?;
    if NodeKind::of_dag(&node)? == NodeKind::Directory {
        return Err(anyhow!("{} is a directory", target));
    }
    let content = read_all(store.as_ref(), &node).await?;
    out.write_all(&content)?;
    Ok(())
}
