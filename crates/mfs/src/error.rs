// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use std::path::{Path, PathBuf};

pub type Result<T> = std::result::Result<T, Error>;

/// Failure reported by a naming-system publisher.
///
/// Kept separate from [`Error`] so publishers don't need the whole
/// filesystem error taxonomy.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct PublishError {
    message: String,
}

impl PublishError {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
        }
    }

    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// Represents errors that can occur in mutable filesystem operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("Not a file: {}", .0.display())]
    NotAFile(PathBuf),

    #[error("{} is a directory, use recursive removal", .0.display())]
    IsADirectory(PathBuf),

    #[error("Entry already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Entry name must not be empty")]
    EmptyName,

    #[error("Unsupported node type: {0}")]
    UnsupportedNodeType(String),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Publish error: {0}")]
    Publish(#[from] PublishError),

    /// The destination of a move was written but the source could not be
    /// unlinked; the node is reachable from both paths.
    #[error("Move of {} is incomplete: {source}", .path.display())]
    PartialMove {
        path: PathBuf,
        #[source]
        source: Box<Error>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn not_found<P: AsRef<Path>>(path: P) -> Self {
        Error::NotFound(path.as_ref().to_path_buf())
    }

    pub fn not_a_directory<P: AsRef<Path>>(path: P) -> Self {
        Error::NotADirectory(path.as_ref().to_path_buf())
    }

    pub fn not_a_file<P: AsRef<Path>>(path: P) -> Self {
        Error::NotAFile(path.as_ref().to_path_buf())
    }

    pub fn is_a_directory<P: AsRef<Path>>(path: P) -> Self {
        Error::IsADirectory(path.as_ref().to_path_buf())
    }

    pub fn already_exists<P: AsRef<Path>>(path: P) -> Self {
        Error::AlreadyExists(path.as_ref().to_path_buf())
    }

    pub fn invalid_argument<S: Into<String>>(message: S) -> Self {
        Error::InvalidArgument(message.into())
    }

    pub fn unsupported_node_type<S: Into<String>>(kind: S) -> Self {
        Error::UnsupportedNodeType(kind.into())
    }

    pub fn codec<S: Into<String>>(message: S) -> Self {
        Error::Codec(message.into())
    }

    pub fn storage<S: Into<String>>(message: S) -> Self {
        Error::Storage(message.into())
    }

    pub fn partial_move<P: AsRef<Path>>(path: P, source: Error) -> Self {
        Error::PartialMove {
            path: path.as_ref().to_path_buf(),
            source: Box::new(source),
        }
    }

    /// True for errors that mean "nothing at this path".
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Error {
        Error::Codec(err.to_string())
    }
}
