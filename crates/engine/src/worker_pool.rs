use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use futures::future::BoxFuture;
use nodewatch_domain::DomainError;
use tokio::sync::{mpsc, Mutex, Semaphore};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

type BoxedJob = Box<dyn FnOnce() -> BoxFuture<'static, ()> + Send>;

/// A fixed-size pool of `workers` that drains a bounded FIFO queue of
/// opaque jobs. `Submit` backpressures on the queue; `Stop` is idempotent
/// and waits for in-flight jobs before returning. The pool has no idea
/// what a job does — a panicking job is contained and logged, the worker
/// (here, the permit slot) survives.
pub struct WorkerPool {
    sender: Mutex<Option<mpsc::Sender<BoxedJob>>>,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
    active: Arc<AtomicUsize>,
    queued: Arc<AtomicUsize>,
    workers: usize,
    stopping: AtomicBool,
}

impl WorkerPool {
    /// `capacity` recommended at `2 * workers` per the backpressure contract.
    pub fn new(workers: usize, capacity: usize, cancellation: CancellationToken) -> Arc<Self> {
        let (tx, rx) = mpsc::channel::<BoxedJob>(capacity.max(1));
        let active = Arc::new(AtomicUsize::new(0));
        let queued = Arc::new(AtomicUsize::new(0));

        let pool = Arc::new(Self {
            sender: Mutex::new(Some(tx)),
            dispatcher: Mutex::new(None),
            active: active.clone(),
            queued: queued.clone(),
            workers,
            stopping: AtomicBool::new(false),
        });

        let semaphore = Arc::new(Semaphore::new(workers));
        let handle = tokio::spawn(Self::dispatch(rx, semaphore, active, queued, cancellation));
        // Safe: no other task can have observed `pool` yet, so this is the
        // only writer of `dispatcher`.
        *pool.dispatcher.try_lock().expect("fresh pool is uncontended") = Some(handle);
        pool
    }

    async fn dispatch(
        mut receiver: mpsc::Receiver<BoxedJob>,
        semaphore: Arc<Semaphore>,
        active: Arc<AtomicUsize>,
        queued: Arc<AtomicUsize>,
        cancellation: CancellationToken,
    ) {
        let mut running = JoinSet::new();
        loop {
            let job = tokio::select! {
                biased;
                _ = cancellation.cancelled() => None,
                job = receiver.recv() => job,
            };
            let Some(job) = job else { break };
            queued.fetch_sub(1, Ordering::SeqCst);

            let permit = match semaphore.clone().acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => break,
            };
            active.fetch_add(1, Ordering::SeqCst);
            let active_for_task = active.clone();
            let job_future = job();

            running.spawn(async move {
                if let Err(err) = tokio::spawn(job_future).await {
                    error!(%err, "worker pool job panicked; job dropped");
                }
                active_for_task.fetch_sub(1, Ordering::SeqCst);
                drop(permit);
            });
        }

        debug!("worker pool dispatcher draining in-flight jobs");
        while running.join_next().await.is_some() {}
    }

    /// Blocks until the job is either queued or the pool is stopping.
    /// Never silently drops a job: a `Submit` that returns `Ok` is
    /// guaranteed to run (or be aborted as part of cancellation) exactly once.
    pub async fn submit<F>(&self, job: F) -> Result<(), DomainError>
    where
        F: std::future::Future<Output = ()> + Send + 'static,
    {
        let sender = {
            let guard = self.sender.lock().await;
            guard
                .clone()
                .ok_or_else(|| DomainError::Control("worker pool is stopping".to_string()))?
        };

        self.queued.fetch_add(1, Ordering::SeqCst);
        let boxed: BoxedJob = Box::new(move || Box::pin(job) as BoxFuture<'static, ()>);
        if sender.send(boxed).await.is_err() {
            self.queued.fetch_sub(1, Ordering::SeqCst);
            return Err(DomainError::Control("worker pool is stopping".to_string()));
        }
        Ok(())
    }

    /// Idempotent. Signals "no more jobs", waits for in-flight work, closes
    /// the queue exactly once. A second call is a no-op.
    pub async fn stop(&self) {
        if self.stopping.swap(true, Ordering::SeqCst) {
            return;
        }
        info!(workers = self.workers, "stopping worker pool");
        self.sender.lock().await.take();

        if let Some(handle) = self.dispatcher.lock().await.take() {
            let _ = handle.await;
        }
        info!("worker pool stopped");
    }

    pub fn active_count(&self) -> usize {
        self.active.load(Ordering::SeqCst)
    }

    pub fn queue_size(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub fn workers(&self) -> usize {
        self.workers
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicU32;
    use std::time::Duration;

    #[tokio::test]
    async fn runs_submitted_jobs() {
        let pool = WorkerPool::new(2, 4, CancellationToken::new());
        let counter = Arc::new(AtomicU32::new(0));

        for _ in 0..10 {
            let counter = counter.clone();
            pool.submit(async move {
                counter.fetch_add(1, Ordering::SeqCst);
            })
            .await
            .unwrap();
        }

        pool.stop().await;
        assert_eq!(counter.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn contains_panicking_jobs() {
        let pool = WorkerPool::new(1, 4, CancellationToken::new());
        pool.submit(async move {
            panic!("boom");
        })
        .await
        .unwrap();

        let counter = Arc::new(AtomicU32::new(0));
        let counter2 = counter.clone();
        pool.submit(async move {
            counter2.fetch_add(1, Ordering::SeqCst);
        })
        .await
        .unwrap();

        pool.stop().await;
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn stop_is_idempotent_and_rejects_late_submits() {
        let pool = WorkerPool::new(1, 4, CancellationToken::new());
        pool.stop().await;
        pool.stop().await;

        let result = pool.submit(async {}).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn active_count_reflects_concurrency_bound() {
        let pool = WorkerPool::new(2, 8, CancellationToken::new());
        for _ in 0..4 {
            pool.submit(async {
                tokio::time::sleep(Duration::from_millis(50)).await;
            })
            .await
            .unwrap();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(pool.active_count() <= 2);
        pool.stop().await;
    }
}
