//! Worker pools that drain download tasks under a global permit budget.
//!
//! Two shapes share one [`DownloadContext`]:
//! - [`WorkerPool`]: a fixed set of `budget` workers fed by one bounded queue
//!   for the whole tree. Workers exit once the queue is empty and the producer
//!   has dropped its [`TaskSender`].
//! - [`drain_level`]: `min(budget, tasks)` short-lived workers over one
//!   directory's tasks, joined before the caller continues.
//!
//! In both, every download holds a permit of the shared semaphore, so at most
//! `budget` downloads run at once across the whole run.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;
use tracing::{debug, info, instrument, warn};

use super::stats::ExportStats;
use super::task::{DownloadTask, SkipReason, TaskOutcome};
use crate::download::HttpClient;

/// Queue slots per worker in the shared queue.
const QUEUE_DEPTH_PER_WORKER: usize = 4;

/// Everything a worker needs to run a task. Cheap to clone.
#[derive(Debug, Clone)]
pub(crate) struct DownloadContext {
    client: HttpClient,
    permits: Arc<Semaphore>,
    budget: usize,
    stats: Arc<ExportStats>,
}

impl DownloadContext {
    pub(crate) fn new(client: HttpClient, budget: usize, stats: Arc<ExportStats>) -> Self {
        Self {
            client,
            permits: Arc::new(Semaphore::new(budget)),
            budget,
            stats,
        }
    }

    pub(crate) fn client(&self) -> &HttpClient {
        &self.client
    }

    pub(crate) fn stats(&self) -> &ExportStats {
        &self.stats
    }

    /// Downloads one task under a global permit and records its outcome.
    ///
    /// The permit and the in-flight marker are released on every path.
    #[instrument(skip(self, task), fields(url = %task.url()))]
    pub(crate) async fn run_task(&self, task: DownloadTask) {
        let outcome = match self.permits.acquire().await {
            Ok(_permit) => {
                let _in_flight = self.stats.begin_download();
                info!(url = %task.url(), path = %task.path().display(), "downloading");
                match self.client.download_file(task.url(), task.path()).await {
                    Ok(bytes) => {
                        debug!(bytes, "download complete");
                        TaskOutcome::Completed { bytes }
                    }
                    Err(e) => {
                        warn!(url = %task.url(), error = %e, "download failed");
                        TaskOutcome::Skipped {
                            reason: SkipReason::download(&e),
                        }
                    }
                }
            }
            Err(_) => TaskOutcome::Skipped {
                reason: SkipReason::Aborted,
            },
        };
        self.stats.record_outcome(&task, outcome);
    }
}

/// Producer side of the shared queue. Dropping every sender ends the pool.
#[derive(Debug, Clone)]
pub(crate) struct TaskSender {
    sender: mpsc::Sender<DownloadTask>,
    stats: Arc<ExportStats>,
}

impl TaskSender {
    /// Queues a task, waiting for a free slot when the queue is full.
    ///
    /// If every worker is gone the task is recorded as aborted.
    pub(crate) async fn submit(&self, task: DownloadTask) {
        if let Err(mpsc::error::SendError(task)) = self.sender.send(task).await {
            warn!(url = %task.url(), "worker pool stopped; task not queued");
            self.stats.record_outcome(
                &task,
                TaskOutcome::Skipped {
                    reason: SkipReason::Aborted,
                },
            );
        }
    }
}

/// One process-wide pool of download workers.
#[derive(Debug)]
pub(crate) struct WorkerPool {
    workers: JoinSet<()>,
}

impl WorkerPool {
    /// Starts `ctx.budget` workers and returns the pool with its producer handle.
    pub(crate) fn start(ctx: &DownloadContext) -> (Self, TaskSender) {
        let size = ctx.budget;
        let (sender, receiver) = mpsc::channel(size * QUEUE_DEPTH_PER_WORKER);
        let receiver = Arc::new(tokio::sync::Mutex::new(receiver));

        let mut workers = JoinSet::new();
        for worker_id in 0..size {
            workers.spawn(worker_loop(worker_id, ctx.clone(), Arc::clone(&receiver)));
        }
        debug!(workers = size, "worker pool started");

        let sender = TaskSender {
            sender,
            stats: Arc::clone(&ctx.stats),
        };
        (Self { workers }, sender)
    }

    /// Waits for every worker to drain the queue and exit.
    ///
    /// Only returns once all [`TaskSender`]s are dropped.
    pub(crate) async fn join(mut self) {
        while let Some(result) = self.workers.join_next().await {
            if let Err(e) = result {
                warn!(error = %e, "download worker panicked");
            }
        }
        debug!("worker pool drained");
    }
}

async fn worker_loop(
    worker_id: usize,
    ctx: DownloadContext,
    receiver: Arc<tokio::sync::Mutex<mpsc::Receiver<DownloadTask>>>,
) {
    loop {
        let next = receiver.lock().await.recv().await;
        let Some(task) = next else {
            break;
        };
        ctx.run_task(task).await;
    }
    debug!(worker_id, "worker finished");
}

/// Runs one directory level's tasks to completion.
///
/// Starts `min(budget, tasks.len())` workers that pop tasks until the level
/// queue is empty, then waits for all of them.
pub(crate) async fn drain_level(ctx: &DownloadContext, tasks: Vec<DownloadTask>) {
    if tasks.is_empty() {
        return;
    }

    let worker_count = ctx.budget.min(tasks.len());
    debug!(tasks = tasks.len(), workers = worker_count, "draining level");
    let queue = Arc::new(Mutex::new(VecDeque::from(tasks)));

    let mut workers = JoinSet::new();
    for _ in 0..worker_count {
        let queue = Arc::clone(&queue);
        let ctx = ctx.clone();
        workers.spawn(async move {
            loop {
                let next = queue
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner)
                    .pop_front();
                let Some(task) = next else {
                    break;
                };
                ctx.run_task(task).await;
            }
        });
    }

    while let Some(result) = workers.join_next().await {
        if let Err(e) = result {
            warn!(error = %e, "download worker panicked");
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn context(budget: usize) -> DownloadContext {
        DownloadContext::new(
            HttpClient::new().unwrap(),
            budget,
            Arc::new(ExportStats::new()),
        )
    }

    #[tokio::test]
    async fn test_worker_pool_exits_when_sender_dropped() {
        let ctx = context(3);
        let (pool, sender) = WorkerPool::start(&ctx);
        drop(sender);
        pool.join().await;
        assert_eq!(ctx.stats().completed(), 0);
        assert_eq!(ctx.stats().failed(), 0);
    }

    #[tokio::test]
    async fn test_worker_pool_records_every_submitted_task() {
        let ctx = context(2);
        let dir = tempfile::tempdir().unwrap();
        let (pool, sender) = WorkerPool::start(&ctx);

        // Unparseable URLs fail fast without touching the network.
        for i in 0..7 {
            sender
                .submit(DownloadTask::new(
                    format!("not a url {i}"),
                    dir.path().join(format!("{i}.txt")),
                ))
                .await;
        }
        drop(sender);
        pool.join().await;

        assert_eq!(ctx.stats().failed(), 7);
        assert_eq!(ctx.stats().in_flight(), 0);
        assert!(ctx.stats().peak_in_flight() <= 2);
    }

    #[tokio::test]
    async fn test_drain_level_empty_is_noop() {
        let ctx = context(4);
        drain_level(&ctx, Vec::new()).await;
        assert_eq!(ctx.stats().summary().failure_count(), 0);
    }

    #[tokio::test]
    async fn test_drain_level_consumes_each_task_once() {
        let ctx = context(4);
        let dir = tempfile::tempdir().unwrap();
        let tasks = (0..9)
            .map(|i| DownloadTask::new(format!("bad url {i}"), dir.path().join(i.to_string())))
            .collect();

        drain_level(&ctx, tasks).await;

        let summary = ctx.stats().summary();
        assert_eq!(summary.failed, 9);
        let mut urls: Vec<_> = summary.failures.iter().map(|f| f.url.clone()).collect();
        urls.sort();
        urls.dedup();
        assert_eq!(urls.len(), 9);
    }
}
