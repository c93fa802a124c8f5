//! Permission feed: single-writer fold with debounced publication.
//!
//! Ingest requests go through a bounded queue drained by one worker task, so
//! folds never interleave. The worker waits for a quiet period of
//! `debounce` after the last batch of a burst, folds everything it absorbed
//! in one replay, and publishes an `Arc<Snapshot>` through a `watch`
//! channel, only if the canonical hash moved.
//!
//! Readers take the latest `Arc` and never wait on a fold in progress.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tokio::time::{sleep, Instant};

use org_acl_kernel::{EventBatch, IngestIssue, PermissionEngine};

use crate::config::RuntimeConfig;
use crate::drift::compare_states;
use crate::error::{Result, RuntimeError};
use crate::snapshot::Snapshot;
use crate::subscription::Subscription;

enum FeedCommand {
    Ingest(EventBatch),
    /// Fold now, skipping the rest of the debounce window.
    Flush(oneshot::Sender<Arc<Snapshot>>),
}

pub struct PermissionFeed {
    commands: mpsc::Sender<FeedCommand>,
    snapshots: watch::Receiver<Arc<Snapshot>>,
    worker: JoinHandle<()>,
}

impl PermissionFeed {
    /// Start the worker. Must be called inside a tokio runtime.
    pub fn spawn(config: &RuntimeConfig) -> Self {
        let (commands, rx) = mpsc::channel(config.queue_capacity.max(1));
        let (publisher, snapshots) = watch::channel(Arc::new(Snapshot::empty()));
        let worker = tokio::spawn(run_worker(rx, publisher, config.debounce()));
        Self {
            commands,
            snapshots,
            worker,
        }
    }

    /// Queue a batch. Returns once queued, not once folded.
    pub async fn ingest(&self, batch: EventBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }
        self.commands
            .send(FeedCommand::Ingest(batch))
            .await
            .map_err(|_| RuntimeError::FeedClosed)
    }

    /// Fold everything queued so far and return the resulting snapshot.
    pub async fn flush(&self) -> Result<Arc<Snapshot>> {
        let (tx, rx) = oneshot::channel();
        self.commands
            .send(FeedCommand::Flush(tx))
            .await
            .map_err(|_| RuntimeError::FeedClosed)?;
        rx.await.map_err(|_| RuntimeError::FeedClosed)
    }

    /// Latest published snapshot.
    pub fn latest(&self) -> Arc<Snapshot> {
        self.snapshots.borrow().clone()
    }

    pub fn subscribe(&self) -> Subscription<Arc<Snapshot>> {
        Subscription::new(self.snapshots.clone())
    }

    /// Close the queue, let the worker fold what is pending, and wait for it.
    pub async fn shutdown(self) {
        drop(self.commands);
        if let Err(err) = self.worker.await {
            tracing::error!(error = %err, "permission feed worker failed");
        }
    }
}

async fn run_worker(
    mut rx: mpsc::Receiver<FeedCommand>,
    publisher: watch::Sender<Arc<Snapshot>>,
    debounce: Duration,
) {
    let mut engine = PermissionEngine::new();
    let mut pending: Vec<EventBatch> = Vec::new();
    let mut waiters = Vec::new();

    while let Some(command) = rx.recv().await {
        let mut flush_now = absorb(command, &mut pending, &mut waiters);
        let mut closed = false;

        if !flush_now {
            let quiet = sleep(debounce);
            tokio::pin!(quiet);
            loop {
                tokio::select! {
                    _ = &mut quiet => break,
                    command = rx.recv() => match command {
                        Some(command) => {
                            flush_now = absorb(command, &mut pending, &mut waiters);
                            if flush_now {
                                break;
                            }
                            quiet.as_mut().reset(Instant::now() + debounce);
                        }
                        None => {
                            closed = true;
                            break;
                        }
                    },
                }
            }
        }

        fold_and_publish(&mut engine, std::mem::take(&mut pending), &publisher);
        let latest = publisher.borrow().clone();
        for waiter in waiters.drain(..) {
            let _ = waiter.send(latest.clone());
        }
        if closed {
            break;
        }
    }
    tracing::debug!("permission feed worker stopped");
}

/// Returns true if the command asks for an immediate fold.
fn absorb(
    command: FeedCommand,
    pending: &mut Vec<EventBatch>,
    waiters: &mut Vec<oneshot::Sender<Arc<Snapshot>>>,
) -> bool {
    match command {
        FeedCommand::Ingest(batch) => {
            pending.push(batch);
            false
        }
        FeedCommand::Flush(waiter) => {
            waiters.push(waiter);
            true
        }
    }
}

/// Stage every pending batch, replay once, and publish if the hash moved.
/// Returns the issues raised by the staged batches.
fn fold_and_publish(
    engine: &mut PermissionEngine,
    pending: Vec<EventBatch>,
    publisher: &watch::Sender<Arc<Snapshot>>,
) -> Vec<IngestIssue> {
    if pending.is_empty() {
        return Vec::new();
    }
    let mut issues = Vec::new();
    let mut received = 0;
    let mut duplicates = 0;
    for (batch_no, batch) in pending.iter().enumerate() {
        received += batch.len();
        let staged = engine.stage_batch(batch);
        duplicates += staged.duplicates;
        for issue in &staged.issues {
            if let IngestIssue::Malformed(err) = issue {
                tracing::warn!(batch = batch_no, error = %err, "skipped malformed event");
            }
        }
        issues.extend(staged.issues);
    }
    let state = engine.replay().clone();

    let current = publisher.borrow().clone();
    let next = Snapshot::capture(current.version + 1, engine.event_count(), state);
    if next.hash == current.hash {
        tracing::debug!(received, duplicates, "fold produced no observable change");
        return issues;
    }

    let drift = compare_states(&current.state, &next.state);
    tracing::info!(
        version = next.version,
        granted = drift.granted.len(),
        revoked = drift.revoked.len(),
        manager_changes = drift.manager_changes.len(),
        hash = %next.hash,
        "publishing permission snapshot"
    );
    publisher.send_replace(Arc::new(next));
    issues
}
