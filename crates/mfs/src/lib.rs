// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! A mutable filesystem over a content-addressed DAG.
//!
//! A [`Root`] mounts an immutable directory (or file) node and exposes it
//! as live [`Directory`] and [`File`] handles. Changes are staged in
//! memory; committing a node rebuilds its ancestors up to the root, whose
//! new cid is handed to a debouncing [`Republisher`].

pub mod dag;
pub mod dir;
pub mod error;
pub mod events;
pub mod file;
pub mod files;
pub mod importer;
pub mod node;
pub mod ops;
pub mod reader;
pub mod republisher;
pub mod root;
pub mod store;

pub use dag::{Cid, DagNode, DataKind, FsData, Link};
pub use dir::{Directory, NodeListing};
pub use error::{Error, PublishError, Result};
pub use events::{EventSink, LogSink, NullSink};
pub use file::File;
pub use importer::{ImportConfig, import_bytes, import_reader};
pub use node::{AccessGuard, CommitSink, Node, NodeKind};
pub use ops::{dir_lookup, lookup, mkdir, mv, put_node};
pub use reader::read_all;
pub use republisher::{Publisher, Republisher};
pub use root::{Root, RootConfig};
pub use store::{MemoryStore, NodeStore, StoreRef};

#[cfg(test)]
mod tests;
