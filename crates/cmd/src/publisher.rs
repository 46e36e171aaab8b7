// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Naming stand-in: the published root lives in a small pointer file.
//!
//! The file holds one line, `<cid> <expiry>`, where the expiry is an
//! RFC 3339 timestamp after which the record should no longer be trusted.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, anyhow};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use mfs::{Cid, PublishError, Publisher};

/// A resolved pointer record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pointer {
    pub cid: Cid,
    pub expires: DateTime<Utc>,
}

impl Pointer {
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires <= now
    }

    fn encode(&self) -> String {
        format!("{} {}\n", self.cid, self.expires.to_rfc3339())
    }

    fn parse(line: &str) -> Result<Self> {
        let mut fields = line.split_whitespace();
        let (Some(cid), Some(expires), None) = (fields.next(), fields.next(), fields.next()) else {
            return Err(anyhow!("malformed pointer record: {:?}", line.trim()));
        };
        let cid = cid.parse::<Cid>()?;
        let expires = DateTime::parse_from_rfc3339(expires)
            .with_context(|| format!("invalid expiry {:?}", expires))?
            .with_timezone(&Utc);
        Ok(Self { cid, expires })
    }
}

/// Read the pointer record at `path`.
pub async fn resolve(path: &Path) -> Result<Pointer> {
    let line = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("cannot read pointer {}", path.display()))?;
    Pointer::parse(&line)
}

/// Publishes by rewriting the pointer file.
pub struct PointerFilePublisher {
    path: PathBuf,
    lifetime: TimeDelta,
}

impl PointerFilePublisher {
    pub fn new<P: Into<PathBuf>>(path: P, lifetime: TimeDelta) -> Self {
        Self {
            path: path.into(),
            lifetime,
        }
    }
}

#[async_trait]
impl Publisher for PointerFilePublisher {
    async fn publish(&self, cid: &Cid) -> Result<(), PublishError> {
        let record = Pointer {
            cid: *cid,
            expires: Utc::now() + self.lifetime,
        };
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, record.encode())
            .await
            .map_err(|e| PublishError::new(format!("cannot write {}: {}", tmp.display(), e)))?;
        tokio::fs::rename(&tmp, &self.path)
            .await
            .map_err(|e| PublishError::new(format!("cannot replace {}: {}", self.path.display(), e)))
    }
}
