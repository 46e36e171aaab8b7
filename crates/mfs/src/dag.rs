// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Immutable DAG node format.
//!
//! A [`DagNode`] is a list of named links plus an opaque payload. Its
//! content identifier is the SHA-256 of its canonical JSON encoding. The
//! filesystem payload ([`FsData`]) distinguishes raw leaves, files,
//! directories, metadata wrappers and symlinks.

use crate::error::{Error, Result};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

/// Content identifier: SHA-256 of a node's canonical encoding.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Cid([u8; 32]);

impl Cid {
    /// Hash arbitrary bytes.
    #[must_use]
    pub fn of_bytes(bytes: &[u8]) -> Self {
        let digest = Sha256::digest(bytes);
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        Cid(out)
    }

    #[must_use]
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s)
            .map_err(|e| Error::invalid_argument(format!("invalid cid '{}': {}", s, e)))?;
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| Error::invalid_argument(format!("invalid cid '{}': wrong length", s)))?;
        Ok(Cid(arr))
    }

    /// First eight hex digits, for log lines.
    #[must_use]
    pub fn short(&self) -> String {
        hex::encode(&self.0[..4])
    }
}

impl fmt::Display for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for Cid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Cid({})", self.short())
    }
}

impl FromStr for Cid {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        Cid::from_hex(s)
    }
}

impl Serialize for Cid {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_hex())
    }
}

impl<'de> Deserialize<'de> for Cid {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Cid::from_hex(&s).map_err(serde::de::Error::custom)
    }
}

/// Byte payloads are hex strings in the canonical encoding.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s).map_err(serde::de::Error::custom)
    }
}

/// A named edge to another node. `size` is the cumulative size of the
/// target subtree.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Link {
    pub name: String,
    pub cid: Cid,
    pub size: u64,
}

impl Link {
    pub fn new<S: Into<String>>(name: S, cid: Cid, size: u64) -> Self {
        Self {
            name: name.into(),
            cid,
            size,
        }
    }

    /// Link to `node` under `name`.
    pub fn to_node<S: Into<String>>(name: S, node: &DagNode) -> Result<Self> {
        Ok(Self::new(name, node.cid()?, node.cumulative_size()?))
    }
}

/// An immutable DAG node.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DagNode {
    pub links: Vec<Link>,
    #[serde(with = "hex_bytes")]
    pub data: Vec<u8>,
}

impl DagNode {
    pub fn new(links: Vec<Link>, data: Vec<u8>) -> Self {
        Self { links, data }
    }

    /// Build a node carrying a filesystem payload.
    pub fn from_fs_data(fs: &FsData, links: Vec<Link>) -> Result<Self> {
        Ok(Self::new(links, fs.encode()?))
    }

    /// Directory node; links are kept sorted by name.
    pub fn directory(mut links: Vec<Link>) -> Result<Self> {
        links.sort_by(|a, b| a.name.cmp(&b.name));
        Self::from_fs_data(&FsData::directory(), links)
    }

    /// The empty directory.
    pub fn empty_dir() -> Result<Self> {
        Self::directory(Vec::new())
    }

    /// The empty file.
    pub fn empty_file() -> Result<Self> {
        Self::from_fs_data(&FsData::file(Vec::new(), Vec::new()), Vec::new())
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    pub fn cid(&self) -> Result<Cid> {
        Ok(Cid::of_bytes(&self.encode()?))
    }

    /// Encoded size of this node plus the cumulative sizes of its links.
    pub fn cumulative_size(&self) -> Result<u64> {
        let own = self.encode()?.len() as u64;
        Ok(self.links.iter().fold(own, |acc, l| acc + l.size))
    }

    pub fn fs_data(&self) -> Result<FsData> {
        FsData::decode(&self.data)
    }

    pub fn link(&self, name: &str) -> Option<&Link> {
        self.links.iter().find(|l| l.name == name)
    }
}

/// Kind tag carried by every filesystem node.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataKind {
    Raw,
    Directory,
    File,
    Metadata,
    Symlink,
}

impl fmt::Display for DataKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            DataKind::Raw => "raw",
            DataKind::Directory => "directory",
            DataKind::File => "file",
            DataKind::Metadata => "metadata",
            DataKind::Symlink => "symlink",
        };
        write!(f, "{}", s)
    }
}

/// Filesystem payload stored in [`DagNode::data`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FsData {
    pub kind: DataKind,
    #[serde(with = "hex_bytes", default, skip_serializing_if = "Vec::is_empty")]
    pub data: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesize: Option<u64>,
    /// Logical sizes of the linked children of a chunked file.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub blocksizes: Vec<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
}

impl FsData {
    fn with_kind(kind: DataKind) -> Self {
        Self {
            kind,
            data: Vec::new(),
            filesize: None,
            blocksizes: Vec::new(),
            mime_type: None,
        }
    }

    #[must_use]
    pub fn directory() -> Self {
        Self::with_kind(DataKind::Directory)
    }

    /// File node with inline `data` followed by children of `blocksizes`.
    #[must_use]
    pub fn file(data: Vec<u8>, blocksizes: Vec<u64>) -> Self {
        let filesize = data.len() as u64 + blocksizes.iter().sum::<u64>();
        Self {
            filesize: Some(filesize),
            data,
            blocksizes,
            ..Self::with_kind(DataKind::File)
        }
    }

    #[must_use]
    pub fn raw(data: Vec<u8>) -> Self {
        Self {
            filesize: Some(data.len() as u64),
            data,
            ..Self::with_kind(DataKind::Raw)
        }
    }

    /// Metadata wrapper; its first link is the wrapped content.
    #[must_use]
    pub fn metadata(mime_type: Option<String>) -> Self {
        Self {
            mime_type,
            ..Self::with_kind(DataKind::Metadata)
        }
    }

    #[must_use]
    pub fn symlink(target: &str) -> Self {
        Self {
            data: target.as_bytes().to_vec(),
            ..Self::with_kind(DataKind::Symlink)
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map_err(|e| Error::codec(format!("not a filesystem node: {}", e)))
    }

    /// Logical byte size, when the node records it.
    #[must_use]
    pub fn logical_size(&self) -> Option<u64> {
        match self.kind {
            DataKind::File | DataKind::Raw => self
                .filesize
                .or_else(|| Some(self.data.len() as u64 + self.blocksizes.iter().sum::<u64>())),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_file_like(&self) -> bool {
        matches!(
            self.kind,
            DataKind::File | DataKind::Raw | DataKind::Metadata
        )
    }
}
