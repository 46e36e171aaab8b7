// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::env;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use chrono::TimeDelta;
use mfs::{NodeStore, Root, RootConfig};

use crate::publisher::{self, PointerFilePublisher};
use crate::store::LocalStore;

/// Environment variable naming the repository directory.
pub const PATH_ENV: &str = "MFS_PATH";

/// Get the repository path with an optional override, falling back to the
/// MFS_PATH environment variable and then `$HOME/.mfs`.
pub fn get_repo_path_with_override(override_path: Option<PathBuf>) -> Result<PathBuf> {
    if let Some(path) = override_path {
        return Ok(path);
    }
    if let Ok(path) = env::var(PATH_ENV) {
        return Ok(PathBuf::from(path));
    }
    let home = env::var("HOME").map_err(|_| anyhow!("neither {} nor HOME is set", PATH_ENV))?;
    Ok(PathBuf::from(home).join(".mfs"))
}

/// Parse a human duration like `90s`, `24h` or `1h30m`.
pub fn parse_lifetime(value: &str) -> Result<TimeDelta> {
    let duration = parse_duration::parse(value).with_context(|| format!("invalid lifetime {:?}", value))?;
    TimeDelta::from_std(duration).with_context(|| format!("lifetime {:?} is out of range", value))
}

/// Helper function to format file sizes
#[must_use]
pub fn format_file_size(size: u64) -> String {
    if size >= 1024 * 1024 {
        format!("{:.1}MB", size as f64 / (1024.0 * 1024.0))
    } else if size >= 1024 {
        format!("{:.1}KB", size as f64 / 1024.0)
    } else {
        format!("{}B", size)
    }
}

/// On-disk layout of one repository.
///
/// ```text
/// <root>/blocks/<cid>   one file per node
/// <root>/root           pointer record of the published tree
/// <root>/logs/HEAD      cids produced by `add`, one per line
/// ```
pub struct Repo {
    root: PathBuf,
    lifetime: TimeDelta,
}

impl Repo {
    pub fn new<P: Into<PathBuf>>(root: P, lifetime: TimeDelta) -> Self {
        Self {
            root: root.into(),
            lifetime,
        }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.root
    }

    #[must_use]
    pub fn blocks_dir(&self) -> PathBuf {
        self.root.join("blocks")
    }

    #[must_use]
    pub fn pointer_path(&self) -> PathBuf {
        self.root.join("root")
    }

    #[must_use]
    pub fn reflog_path(&self) -> PathBuf {
        self.root.join("logs").join("HEAD")
    }

    #[must_use]
    pub fn is_initialized(&self) -> bool {
        self.pointer_path().exists()
    }

    #[must_use]
    pub fn store(&self) -> Arc<LocalStore> {
        Arc::new(LocalStore::new(self.blocks_dir()))
    }

    #[must_use]
    pub fn publisher(&self) -> Arc<PointerFilePublisher> {
        Arc::new(PointerFilePublisher::new(self.pointer_path(), self.lifetime))
    }

    pub fn ensure_initialized(&self) -> Result<()> {
        if !self.is_initialized() {
            return Err(anyhow!(
                "no repository at {}, run `mfs init` first",
                self.root.display()
            ));
        }
        Ok(())
    }

    /// Mount the published tree.
    pub async fn mount(&self) -> Result<Root> {
        self.ensure_initialized()?;
        let pointer = publisher::resolve(&self.pointer_path()).await?;
        let store = self.store();
        let node = store
            .get(&pointer.cid)
            .await
            .with_context(|| format!("cannot load root {}", pointer.cid))?;
        Ok(Root::new(store, node, self.publisher(), RootConfig::default())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lifetime() {
        assert_eq!(parse_lifetime("90s").unwrap(), TimeDelta::seconds(90));
        assert_eq!(parse_lifetime("30m").unwrap(), TimeDelta::minutes(30));
        assert_eq!(parse_lifetime("24h").unwrap(), TimeDelta::hours(24));
        assert_eq!(parse_lifetime("2d").unwrap(), TimeDelta::days(2));
        assert_eq!(parse_lifetime("1h30m").unwrap(), TimeDelta::minutes(90));
        assert_eq!(parse_lifetime("1 hour 15 minutes").unwrap(), TimeDelta::minutes(75));
        assert!(parse_lifetime("soon").is_err());
        assert!(parse_lifetime("").is_err());
    }

    #[test]
    fn test_format_file_size() {
        assert_eq!(format_file_size(12), "12B");
        assert_eq!(format_file_size(2048), "2.0KB");
        assert_eq!(format_file_size(3 * 1024 * 1024), "3.0MB");
    }

    #[test]
    fn test_override_path_wins() {
        let path = get_repo_path_with_override(Some(PathBuf::from("/tmp/elsewhere"))).unwrap();
        assert_eq!(path, PathBuf::from("/tmp/elsewhere"));
    }

    #[test]
    fn test_repo_layout() {
        let repo = Repo::new("/r", TimeDelta::hours(1));
        assert_eq!(repo.blocks_dir(), PathBuf::from("/r/blocks"));
        assert_eq!(repo.pointer_path(), PathBuf::from("/r/root"));
        assert_eq!(repo.reflog_path(), PathBuf::from("/r/logs/HEAD"));
    }
}
