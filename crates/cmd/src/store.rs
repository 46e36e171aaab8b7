// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use mfs::{Cid, DagNode, Error, NodeStore, Result};

/// Node store keeping one file per node, named by its cid, in a single
/// directory.
pub struct LocalStore {
    dir: PathBuf,
}

impl LocalStore {
    pub fn new<P: Into<PathBuf>>(dir: P) -> Self {
        Self { dir: dir.into() }
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn node_path(&self, cid: &Cid) -> PathBuf {
        self.dir.join(cid.to_hex())
    }
}

fn storage_error(what: &str, path: &Path, err: &std::io::Error) -> Error {
    Error::storage(format!("{} {}: {}", what, path.display(), err))
}

#[async_trait]
impl NodeStore for LocalStore {
    async fn get(&self, cid: &Cid) -> Result<DagNode> {
        let path = self.node_path(cid);
        match tokio::fs::read(&path).await {
            Ok(bytes) => DagNode::decode(&bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                Err(Error::storage(format!("node {} not found", cid)))
            }
            Err(e) => Err(storage_error("cannot read", &path, &e)),
        }
    }

    async fn put(&self, node: &DagNode) -> Result<Cid> {
        let bytes = node.encode()?;
        let cid = Cid::of_bytes(&bytes);
        let path = self.node_path(&cid);

        if tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(cid);
        }

        // Write aside, then rename into place so readers never see a partial node
        let tmp = self.dir.join(format!(".{}.tmp", cid.to_hex()));
        tokio::fs::write(&tmp, &bytes)
            .await
            .map_err(|e| storage_error("cannot write", &tmp, &e))?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|e| storage_error("cannot rename into", &path, &e))?;

        let short = cid.short();
        diagnostics::log_debug!("Stored node {cid}", cid: short);
        Ok(cid)
    }
}

/// Store that computes cids and keeps nothing, for `add --only-hash`.
#[derive(Debug, Default, Clone, Copy)]
pub struct HashOnlyStore;

#[async_trait]
impl NodeStore for HashOnlyStore {
    async fn get(&self, cid: &Cid) -> Result<DagNode> {
        Err(Error::storage(format!("node {} was hashed but not stored", cid)))
    }

    async fn put(&self, node: &DagNode) -> Result<Cid> {
        node.cid()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mfs::{FsData, Link};
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let tmp = tempdir().unwrap();
        let store = LocalStore::new(tmp.path());

        let leaf = DagNode::from_fs_data(&FsData::file(b"leaf".to_vec(), vec![]), vec![]).unwrap();
        let leaf_cid = store.put(&leaf).await.unwrap();
        let dir = DagNode::directory(vec![Link::to_node("leaf", &leaf).unwrap()]).unwrap();
        let dir_cid = store.put(&dir).await.unwrap();

        assert_eq!(store.get(&leaf_cid).await.unwrap(), leaf);
        assert_eq!(store.get(&dir_cid).await.unwrap(), dir);
        assert!(tmp.path().join(dir_cid.to_hex()).exists());

        // Idempotent
        assert_eq!(store.put(&dir).await.unwrap(), dir_cid);
        let files = std::fs::read_dir(tmp.path()).unwrap().count();
        assert_eq!(files, 2);
    }

    #[tokio::test]
    async fn test_missing_node() {
        let tmp = tempdir().unwrap();
        let store = LocalStore::new(tmp.path());
        let cid = DagNode::empty_file().unwrap().cid().unwrap();
        assert!(matches!(store.get(&cid).await, Err(Error::Storage(_))));
    }

    #[tokio::test]
    async fn test_missing_directory_fails_put() {
        let tmp = tempdir().unwrap();
        let store = LocalStore::new(tmp.path().join("absent"));
        let node = DagNode::empty_dir().unwrap();
        assert!(matches!(store.put(&node).await, Err(Error::Storage(_))));
    }

    #[tokio::test]
    async fn test_hash_only_store_keeps_nothing() {
        let tmp = tempdir().unwrap();
        let local = LocalStore::new(tmp.path());
        let node = DagNode::from_fs_data(&FsData::file(b"leaf".to_vec(), vec![]), vec![]).unwrap();

        let hashed = HashOnlyStore.put(&node).await.unwrap();
        assert_eq!(hashed, local.put(&node).await.unwrap());
        assert!(matches!(HashOnlyStore.get(&hashed).await, Err(Error::Storage(_))));
    }
}
