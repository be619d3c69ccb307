// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Bounded work pool with recursive scheduling.

Install tasks discover more install tasks, so the pool must accept work
from inside running tasks and still be able to answer "is everything
done?". Tasks never wait on the tasks they schedule; only [WorkerPool::wait]
joins, and it joins the transitive closure exactly once. That shape is what
makes recursive scheduling on a bounded pool deadlock-free.
*/

use {
    crate::error::{MaterializeError, Result},
    futures::future::BoxFuture,
    std::sync::{
        atomic::{AtomicUsize, Ordering},
        Arc, Mutex,
    },
    tokio::sync::{Notify, Semaphore},
};

/// Default number of concurrent workers.
pub const DEFAULT_WORKER_COUNT: usize = 16;

/// A fixed-width pool of fallible tasks.
///
/// Cloning is cheap and clones share the pool.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    permits: Semaphore,
    pending: AtomicUsize,
    quiescent: Notify,
    failure: Mutex<Option<MaterializeError>>,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                permits: Semaphore::new(workers.max(1)),
                pending: AtomicUsize::new(0),
                quiescent: Notify::new(),
                failure: Mutex::new(None),
            }),
        }
    }

    /// Schedule a task. May be called from inside a running task.
    ///
    /// The first task failure is recorded and later surfaced by
    /// [Self::wait]; subsequent failures are dropped.
    pub fn schedule(&self, task: BoxFuture<'static, Result<()>>) {
        let inner = self.inner.clone();
        inner.pending.fetch_add(1, Ordering::SeqCst);

        tokio::spawn(async move {
            if let Ok(_permit) = inner.permits.acquire().await {
                if let Err(error) = task.await {
                    let mut slot = inner.failure.lock().unwrap();
                    if slot.is_none() {
                        *slot = Some(error);
                    }
                }
            }

            if inner.pending.fetch_sub(1, Ordering::SeqCst) == 1 {
                inner.quiescent.notify_waiters();
            }
        });
    }

    /// Wait until the task queue is empty and all workers are idle, then
    /// surface the first recorded failure, if any.
    ///
    /// The pool is reusable after this returns.
    pub async fn wait(&self) -> Result<()> {
        loop {
            // Register with the Notify before checking the counter, so a
            // notify_waiters between the check and the await is not lost.
            let notified = self.inner.quiescent.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.inner.pending.load(Ordering::SeqCst) == 0 {
                break;
            }

            notified.await;
        }

        match self.inner.failure.lock().unwrap().take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use {super::*, futures::FutureExt};

    #[tokio::test]
    async fn waits_for_recursively_scheduled_tasks() {
        let pool = WorkerPool::new(4);
        let counter = Arc::new(AtomicUsize::new(0));

        for _ in 0..3 {
            let pool_handle = pool.clone();
            let counter = counter.clone();

            pool.schedule(
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);

                    for _ in 0..2 {
                        let counter = counter.clone();
                        pool_handle.schedule(
                            async move {
                                counter.fetch_add(1, Ordering::SeqCst);
                                Ok(())
                            }
                            .boxed(),
                        );
                    }

                    Ok(())
                }
                .boxed(),
            );
        }

        pool.wait().await.unwrap();

        assert_eq!(counter.load(Ordering::SeqCst), 9);
    }

    #[tokio::test]
    async fn first_failure_is_forwarded_at_quiescence() {
        let pool = WorkerPool::new(2);

        pool.schedule(async { Ok(()) }.boxed());
        pool.schedule(
            async { Err(MaterializeError::UnknownPackage("ghost".to_string())) }.boxed(),
        );
        pool.schedule(async { Ok(()) }.boxed());

        match pool.wait().await {
            Err(MaterializeError::UnknownPackage(name)) => assert_eq!(name, "ghost"),
            other => panic!("expected UnknownPackage, got {:?}", other),
        }

        // A failure is surfaced once; the pool is clean afterwards.
        pool.wait().await.unwrap();
    }

    #[tokio::test]
    async fn idle_pool_waits_immediately() {
        let pool = WorkerPool::new(1);

        pool.wait().await.unwrap();
    }
}
