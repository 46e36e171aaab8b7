// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;

use anyhow::Result;
use clap::Subcommand;
use diagnostics::{log_debug, log_info};
use mfs::files::{self, WriteOptions};
use mfs::{NodeKind, Root};
use tokio::io::AsyncRead;

use crate::common::{Repo, format_file_size};

#[derive(Subcommand, Debug, Clone)]
pub enum FilesCommand {
    /// Show the cid, size and type of a path
    Stat { path: String },
    /// List a directory
    Ls {
        #[arg(default_value = "/")]
        path: String,
        /// Show cid and size of each entry
        #[arg(short, long)]
        long: bool,
    },
    /// Print the contents of a file
    Read {
        path: String,
        #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
        offset: i64,
        /// Maximum number of bytes to read
        #[arg(short = 'n', long, allow_negative_numbers = true)]
        count: Option<i64>,
    },
    /// Write standard input into a file
    Write {
        path: String,
        #[arg(short, long, default_value_t = 0, allow_negative_numbers = true)]
        offset: i64,
        /// Create the file if it does not exist
        #[arg(short = 'e', long)]
        create: bool,
        /// Truncate the file before writing
        #[arg(short, long)]
        truncate: bool,
        /// Maximum number of bytes to write
        #[arg(short = 'n', long, allow_negative_numbers = true)]
        count: Option<i64>,
    },
    /// Move a file or directory
    Mv { src: String, dst: String },
    /// Copy a tree path or /ipfs/<cid>[/path] into the tree
    Cp { src: String, dst: String },
    /// Create a directory
    Mkdir {
        path: String,
        /// Create missing parents, tolerate an existing directory
        #[arg(short, long)]
        parents: bool,
    },
    /// Remove a file, or a directory with -r
    Rm {
        path: String,
        #[arg(short, long)]
        recursive: bool,
    },
    /// Persist a path and print its cid
    Flush {
        #[arg(default_value = "/")]
        path: String,
    },
}

/// Mount the repository, run one files operation and close the root.
///
/// The root is closed even when the operation fails so that whatever
/// was committed before the failure still gets published.
pub async fn files_command<R, W>(repo: &Repo, command: FilesCommand, input: R, out: &mut W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: Write,
{
    let root = repo.mount().await?;
    let result = run(&root, command, input, out).await;
    let closed = root.close().await;
    result?;
    closed?;
    Ok(())
}

async fn run<R, W>(root: &Root, command: FilesCommand, input: R, out: &mut W) -> Result<()>
where
    R: AsyncRead + Unpin,
    W: Write,
{
    let described = format!("{:?}", command);
    log_debug!("Running files command {command}", command: described);
    match command {
        FilesCommand::Stat { path } => {
            let stat = files::stat(root, &path).await?;
            writeln!(out, "{}", stat.cid)?;
            writeln!(out, "Size: {}", stat.size)?;
            writeln!(out, "CumulativeSize: {}", stat.cumulative_size)?;
            writeln!(out, "ChildBlocks: {}", stat.blocks)?;
            writeln!(out, "Type: {}", stat.kind)?;
        }
        FilesCommand::Ls { path, long } => {
            for entry in files::ls(root, &path).await? {
                let suffix = match entry.kind {
                    NodeKind::Directory => "/",
                    NodeKind::File => "",
                };
                if long {
                    writeln!(
                        out,
                        "{}{}\t{}\t{}",
                        entry.name,
                        suffix,
                        entry.cid,
                        format_file_size(entry.size)
                    )?;
                } else {
                    writeln!(out, "{}{}", entry.name, suffix)?;
                }
            }
        }
        FilesCommand::Read { path, offset, count } => {
            let content = files::read(root, &path, offset, count).await?;
            out.write_all(&content)?;
        }
        FilesCommand::Write {
            path,
            offset,
            create,
            truncate,
            count,
        } => {
            let opts = WriteOptions {
                offset,
                create,
                truncate,
                count,
            };
            files::write(root, &path, input, opts).await?;
            log_info!("Wrote {path}", path: path);
        }
        FilesCommand::Mv { src, dst } => {
            files::mv(root, &src, &dst).await?;
            log_info!("Moved {src} to {dst}", src: src, dst: dst);
        }
        FilesCommand::Cp { src, dst } => {
            files::cp(root, &src, &dst).await?;
            log_info!("Copied {src} to {dst}", src: src, dst: dst);
        }
        FilesCommand::Mkdir { path, parents } => {
            files::mkdir(root, &path, parents).await?;
            log_info!("Directory created successfully: {path}", path: path);
        }
        FilesCommand::Rm { path, recursive } => {
            files::rm(root, &path, recursive).await?;
            log_info!("Removed {path}", path: path);
        }
        FilesCommand::Flush { path } => {
            let cid = files::flush(root, &path).await?;
            writeln!(out, "{}", cid)?;
        }
    }
    Ok(())
}
