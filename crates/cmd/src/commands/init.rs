// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;

use anyhow::{Result, anyhow};
use diagnostics::log_info;
use mfs::{DagNode, NodeStore, Publisher};

use crate::common::Repo;

/// Create the repository layout and publish an empty root directory.
pub async fn init_command<W: Write>(repo: &Repo, out: &mut W) -> Result<()> {
    if repo.is_initialized() {
        return Err(anyhow!("Repository already exists at {}", repo.path().display()));
    }

    tokio::fs::create_dir_all(repo.blocks_dir()).await?;
    if let Some(logs) = repo.reflog_path().parent() {
        tokio::fs::create_dir_all(logs).await?;
    }

    let cid = repo.store().put(&DagNode::empty_dir()?).await?;
    repo.publisher().publish(&cid).await?;

    let path = repo.path().display().to_string();
    let root = cid.to_hex();
    log_info!("Initialized repository at {path} with root {root}", path: path, root: root);
    writeln!(out, "Initialized empty repository at {}", repo.path().display())?;
    Ok(())
}
