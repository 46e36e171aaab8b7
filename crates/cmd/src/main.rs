// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::io::Write;
use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};

use cmd::commands::{
    AddOptions, FilesCommand, NameCommand, add_command, cat_command, files_command, get_command,
    init_command, name_command,
};
use cmd::common::{Repo, get_repo_path_with_override, parse_lifetime};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "mfs")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// Repository directory (defaults to $MFS_PATH, then ~/.mfs)
    #[arg(id = "repo_path", long = "path", global = true)]
    path: Option<PathBuf>,
    /// How long a published root stays valid, e.g. 30m, 24h, 2d
    #[arg(long, global = true, default_value = "24h")]
    lifetime: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a repository with an empty root directory
    Init,
    /// Import host files or directories and print their cids
    Add {
        #[arg(required = true)]
        paths: Vec<PathBuf>,
        /// Chunk size in bytes
        #[arg(long)]
        chunk_size: Option<usize>,
        /// Add directory paths recursively
        #[arg(short, long)]
        recursive: bool,
        /// Wrap the added entries in a directory
        #[arg(short, long = "wrap-with-directory")]
        wrap: bool,
        /// Only compute cids, store nothing
        #[arg(short = 'n', long)]
        only_hash: bool,
        /// Include files whose names start with a dot
        #[arg(long)]
        hidden: bool,
        /// Print cids only
        #[arg(short, long)]
        quiet: bool,
    },
    /// Print an immutable file by cid or /ipfs/ path
    Cat { target: String },
    /// Save an immutable file or directory to the host filesystem
    Get {
        target: String,
        /// Destination path, defaults to the last segment of the target
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Operate on the mutable tree
    Files {
        #[command(subcommand)]
        command: FilesCommand,
    },
    /// Inspect or replace the published name record
    Name {
        #[command(subcommand)]
        command: NameCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    diagnostics::init();

    let cli = Cli::parse();
    let repo = Repo::new(
        get_repo_path_with_override(cli.path)?,
        parse_lifetime(&cli.lifetime)?,
    );

    let mut out = std::io::stdout().lock();
    let result = match cli.command {
        Commands::Init => init_command(&repo, &mut out).await,
        Commands::Add {
            paths,
            chunk_size,
            recursive,
            wrap,
            only_hash,
            hidden,
            quiet,
        } => {
            let opts = AddOptions {
                chunk_size,
                recursive,
                wrap,
                only_hash,
                hidden,
                quiet,
            };
            add_command(&repo, &paths, &opts, &mut out).await
        }
        Commands::Cat { target } => cat_command(&repo, &target, &mut out).await,
        Commands::Get { target, output } => get_command(&repo, &target, output.as_deref(), &mut out).await,
        Commands::Files { command } => {
            files_command(&repo, command, tokio::io::stdin(), &mut out).await
        }
        Commands::Name { command } => name_command(&repo, command, &mut out).await,
    };
    out.flush()?;

    if let Err(e) = &result {
        let error = format!("{:#}", e);
        diagnostics::log_error!("Command failed: {error}", error: error);
    }
    result
}
