// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;

use anyhow::{Result, anyhow};
use chrono::Utc;
use clap::Subcommand;
use diagnostics::log_info;
use mfs::Publisher;
use mfs::files::{IPFS_PREFIX, resolve_immutable};

use crate::common::Repo;
use crate::publisher;

#[derive(Subcommand, Debug, Clone)]
pub enum NameCommand {
    /// Print the currently published root
    Resolve,
    /// Point the repository root at a cid or /ipfs/ path
    ///
    /// The record stays valid for the global --lifetime.
    Publish { target: String },
}

pub async fn name_command<W: Write>(repo: &Repo, command: NameCommand, out: &mut W) -> Result<()> {
    match command {
        NameCommand::Resolve => {
            let pointer = publisher::resolve(&repo.pointer_path()).await?;
            if pointer.is_expired(Utc::now()) {
                return Err(anyhow!(
                    "record for {} expired at {}",
                    pointer.cid,
                    pointer.expires.to_rfc3339()
                ));
            }
            writeln!(out, "/ipfs/{}", pointer.cid)?;
        }
        NameCommand::Publish { target } => {
            repo.ensure_initialized()?;
            let path = target.strip_prefix(IPFS_PREFIX).unwrap_or(&target);
            let store = repo.store();
            let cid = resolve_immutable(store.as_ref(), path).await?.cid()?;
            repo.publisher().publish(&cid).await?;

            let short = cid.short();
            log_info!("Published {cid}", cid: short);
            writeln!(out, "Published to {}: /ipfs/{}", repo.path().display(), cid)?;
        }
    }
    Ok(())
}
