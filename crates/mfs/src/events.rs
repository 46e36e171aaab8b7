// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use crate::dag::Cid;
use crate::error::PublishError;

/// Observer for republisher outcomes.
///
/// Passed to a [`crate::Root`] through its configuration so the core does
/// not depend on any process-wide logger.
pub trait EventSink: Send + Sync {
    fn published(&self, _cid: &Cid) {}

    fn publish_failed(&self, _cid: &Cid, _err: &PublishError) {}
}

/// Default sink, writes through the diagnostics macros.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl EventSink for LogSink {
    fn published(&self, cid: &Cid) {
        let cid = cid.to_hex();
        diagnostics::log_info!("Published root {cid}", cid: cid);
    }

    fn publish_failed(&self, cid: &Cid, err: &PublishError) {
        let cid = cid.to_hex();
        let error = err.message().to_string();
        diagnostics::log_warn!("Failed to publish root {cid}: {error}", cid: cid, error: error);
    }
}

/// Discards every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl EventSink for NullSink {}
