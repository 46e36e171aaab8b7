// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

//! Debounced announcement of the current root.
//!
//! A [`Republisher`] tracks the latest root cid and the last one handed to
//! the [`Publisher`]. A background task turns the stream of updates into
//! publish attempts: after `short` of quiet, or at the latest `long` after
//! the first unpublished update, whichever comes first.
//!
//! ```text
//!   Idle --update(v != published)--> Pending{quick, long}
//!   Pending --update--> Pending{now + short, long}
//!   Pending --quick | long | publish_now--> publish --> Idle
//!                                                   \-> Pending (newer value arrived)
//! ```

use crate::dag::Cid;
use crate::error::PublishError;
use crate::events::EventSink;
use async_trait::async_trait;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::{Mutex, Notify, mpsc, watch};
use tokio::time::{Duration, Instant, sleep_until};
use tokio_util::sync::CancellationToken;

/// Naming-system seam: announce `cid` as the current root.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, cid: &Cid) -> Result<(), PublishError>;
}

struct Shared {
    publisher: Arc<dyn Publisher>,
    events: Arc<dyn EventSink>,
    latest: watch::Receiver<Cid>,
    /// Also serializes publish attempts between the task and `close`.
    last_published: Mutex<Cid>,
}

impl Shared {
    fn latest(&self) -> Cid {
        *self.latest.borrow()
    }

    async fn is_current(&self) -> bool {
        *self.last_published.lock().await == self.latest()
    }

    /// Publish the latest value, returning the value that was published.
    async fn publish(&self) -> Result<Cid, PublishError> {
        let mut last = self.last_published.lock().await;
        let value = self.latest();
        match self.publisher.publish(&value).await {
            Ok(()) => {
                *last = value;
                self.events.published(&value);
                Ok(value)
            }
            Err(err) => {
                self.events.publish_failed(&value, &err);
                Err(err)
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Idle,
    Pending { quick: Instant, long: Instant },
}

/// Debouncing engine owned by a root.
pub struct Republisher {
    latest: watch::Sender<Cid>,
    signal: mpsc::Sender<()>,
    now: Arc<Notify>,
    shared: Arc<Shared>,
    cancel: CancellationToken,
    closed: AtomicBool,
}

impl Republisher {
    /// Start the background task. `initial` is both the latest and the
    /// last published value. Must be called inside a tokio runtime.
    pub fn new(
        publisher: Arc<dyn Publisher>,
        events: Arc<dyn EventSink>,
        initial: Cid,
        short: Duration,
        long: Duration,
    ) -> Self {
        let (latest, latest_rx) = watch::channel(initial);
        let (signal, signals) = mpsc::channel(1);
        let now = Arc::new(Notify::new());
        let cancel = CancellationToken::new();
        let shared = Arc::new(Shared {
            publisher,
            events,
            latest: latest_rx,
            last_published: Mutex::new(initial),
        });

        let task = Task {
            shared: shared.clone(),
            signals,
            now: now.clone(),
            cancel: cancel.clone(),
            short,
            long,
        };
        _ = tokio::spawn(task.run());

        Self {
            latest,
            signal,
            now,
            shared,
            cancel,
            closed: AtomicBool::new(false),
        }
    }

    /// Record a new latest value. Never waits for publishing.
    pub fn update(&self, cid: Cid) {
        _ = self.latest.send_replace(cid);
        // A full queue already holds a wakeup that will observe `cid`
        _ = self.signal.try_send(());
    }

    /// Ask the background task to publish immediately.
    pub fn publish_now(&self) {
        self.now.notify_one();
    }

    #[must_use]
    pub fn latest(&self) -> Cid {
        self.shared.latest()
    }

    pub async fn last_published(&self) -> Cid {
        *self.shared.last_published.lock().await
    }

    /// Publish the latest value synchronously and stop the background task.
    ///
    /// The first call always publishes. Later calls publish again only if
    /// the latest value is still unpublished, so a failed close can be
    /// retried.
    pub async fn close(&self) -> Result<(), PublishError> {
        let first = !self.closed.swap(true, Ordering::SeqCst);
        let result = if first || !self.shared.is_current().await {
            self.shared.publish().await.map(|_| ())
        } else {
            Ok(())
        };
        self.cancel.cancel();
        result
    }
}

impl Drop for Republisher {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

struct Task {
    shared: Arc<Shared>,
    signals: mpsc::Receiver<()>,
    now: Arc<Notify>,
    cancel: CancellationToken,
    short: Duration,
    long: Duration,
}

async fn sleep_opt(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

impl Task {
    async fn run(mut self) {
        let mut state = State::Idle;
        loop {
            let (quick, long) = match state {
                State::Idle => (None, None),
                State::Pending { quick, long } => (Some(quick), Some(long)),
            };
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                msg = self.signals.recv() => {
                    if msg.is_none() {
                        break;
                    }
                    state = self.on_update(state).await;
                }
                _ = self.now.notified() => {
                    state = self.attempt().await;
                }
                _ = sleep_opt(long) => {
                    diagnostics::log_debug!("Long republish window elapsed");
                    state = self.attempt().await;
                }
                _ = sleep_opt(quick) => {
                    state = self.attempt().await;
                }
            }
        }
        diagnostics::log_debug!("Republisher stopped");
    }

    async fn on_update(&self, state: State) -> State {
        if self.shared.is_current().await {
            return State::Idle;
        }
        let now = Instant::now();
        match state {
            State::Idle => self.fresh(now),
            State::Pending { long, .. } => State::Pending {
                quick: now + self.short,
                long,
            },
        }
    }

    fn fresh(&self, now: Instant) -> State {
        State::Pending {
            quick: now + self.short,
            long: now + self.long,
        }
    }

    async fn attempt(&self) -> State {
        match self.shared.publish().await {
            Ok(published) if published != self.shared.latest() => self.fresh(Instant::now()),
            Ok(_) => State::Idle,
            // Retried on the next update or close
            Err(_) => State::Idle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct Recorder {
        published: StdMutex<Vec<(Instant, Cid)>>,
        fail: AtomicBool,
    }

    impl Recorder {
        fn values(&self) -> Vec<Cid> {
            self.published.lock().unwrap().iter().map(|(_, c)| *c).collect()
        }

        fn times(&self) -> Vec<Instant> {
            self.published.lock().unwrap().iter().map(|(t, _)| *t).collect()
        }
    }

    #[async_trait]
    impl Publisher for Recorder {
        async fn publish(&self, cid: &Cid) -> Result<(), PublishError> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(PublishError::new("naming system unavailable"));
            }
            self.published.lock().unwrap().push((Instant::now(), *cid));
            Ok(())
        }
    }

    #[derive(Default)]
    struct Failures(StdMutex<Vec<Cid>>);

    impl EventSink for Failures {
        fn publish_failed(&self, cid: &Cid, _err: &PublishError) {
            self.0.lock().unwrap().push(*cid);
        }
    }

    fn cid(n: u32) -> Cid {
        Cid::of_bytes(&n.to_be_bytes())
    }

    fn republisher(rec: &Arc<Recorder>, events: Arc<dyn EventSink>) -> Republisher {
        Republisher::new(
            rec.clone(),
            events,
            cid(0),
            Duration::from_millis(300),
            Duration::from_secs(3),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_quiet_update_publishes_after_short_window() {
        let rec = Arc::new(Recorder::default());
        let rp = republisher(&rec, Arc::new(crate::events::NullSink));
        let start = Instant::now();

        rp.update(cid(1));
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(rec.values().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(rec.values(), vec![cid(1)]);
        let elapsed = rec.times()[0] - start;
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(350));
        assert_eq!(rp.last_published().await, cid(1));
    }

    #[tokio::test(start_paused = true)]
    async fn test_burst_is_bounded_by_long_window() {
        let rec = Arc::new(Recorder::default());
        let rp = republisher(&rec, Arc::new(crate::events::NullSink));

        // 50ms apart for 10s
        let mut last = cid(0);
        for n in 1..=200u32 {
            last = cid(n);
            rp.update(last);
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
        tokio::time::sleep(Duration::from_secs(1)).await;

        let values = rec.values();
        // One per long window (about 3s, 6s, 9s) plus the trailing publish
        assert!(values.len() >= 4, "published {} times", values.len());
        assert!(values.len() <= 5, "published {} times", values.len());
        assert_eq!(values.last(), Some(&last));
        assert_eq!(rp.last_published().await, last);
    }

    #[tokio::test(start_paused = true)]
    async fn test_update_to_published_value_is_ignored() {
        let rec = Arc::new(Recorder::default());
        let rp = republisher(&rec, Arc::new(crate::events::NullSink));

        rp.update(cid(0));
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert!(rec.values().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failure_is_reported_and_retried() {
        let rec = Arc::new(Recorder::default());
        let failures = Arc::new(Failures::default());
        let rp = republisher(&rec, failures.clone());

        rec.fail.store(true, Ordering::SeqCst);
        rp.update(cid(1));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(*failures.0.lock().unwrap(), vec![cid(1)]);
        assert_eq!(rp.last_published().await, cid(0));

        rec.fail.store(false, Ordering::SeqCst);
        rp.update(cid(2));
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(rec.values(), vec![cid(2)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_publish_now() {
        let rec = Arc::new(Recorder::default());
        let rp = republisher(&rec, Arc::new(crate::events::NullSink));

        rp.update(cid(1));
        tokio::task::yield_now().await;
        rp.publish_now();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(rec.values(), vec![cid(1)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_close_publishes_and_is_idempotent() {
        let rec = Arc::new(Recorder::default());
        let rp = republisher(&rec, Arc::new(crate::events::NullSink));

        rp.update(cid(7));
        rp.close().await.unwrap();
        assert_eq!(rec.values(), vec![cid(7)]);

        rp.close().await.unwrap();
        tokio::time::sleep(Duration::from_secs(5)).await;
        assert_eq!(rec.values(), vec![cid(7)]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_close_can_be_retried() {
        let rec = Arc::new(Recorder::default());
        let rp = republisher(&rec, Arc::new(crate::events::NullSink));

        rec.fail.store(true, Ordering::SeqCst);
        rp.update(cid(3));
        let err = rp.close().await.unwrap_err();
        assert_eq!(err.message(), "naming system unavailable");

        rec.fail.store(false, Ordering::SeqCst);
        rp.close().await.unwrap();
        assert_eq!(rec.values(), vec![cid(3)]);
    }
}
