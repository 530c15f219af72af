use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::Semaphore;

/// Bounded pool for CPU-bound work (decode, encode, landmark extraction,
/// model inference). Tasks run on tokio's blocking threads; the semaphore caps
/// how many run at once so one busy device cannot starve the others.
#[derive(Clone)]
pub struct ComputePool {
    permits: Arc<Semaphore>,
    size: usize,
}

impl ComputePool {
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            permits: Arc::new(Semaphore::new(size)),
            size,
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    pub async fn run<F, T>(&self, task: F) -> Result<T>
    where
        F: FnOnce() -> T + Send + 'static,
        T: Send + 'static,
    {
        let permit = self
            .permits
            .clone()
            .acquire_owned()
            .await
            .context("compute pool closed")?;

        // The permit moves into the task so it is held until the work is done,
        // even if the caller stops waiting.
        tokio::task::spawn_blocking(move || {
            let _permit = permit;
            task()
        })
        .await
        .context("compute task failed to join")
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn returns_task_result() {
        let pool = ComputePool::new(2);
        assert_eq!(pool.run(|| 21 * 2).await.unwrap(), 42);
    }

    #[tokio::test]
    async fn zero_size_is_clamped() {
        assert_eq!(ComputePool::new(0).size(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn never_exceeds_size() {
        let pool = ComputePool::new(2);
        let active = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let pool = pool.clone();
                let active = active.clone();
                let peak = peak.clone();
                tokio::spawn(async move {
                    pool.run(move || {
                        let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        std::thread::sleep(Duration::from_millis(20));
                        active.fetch_sub(1, Ordering::SeqCst);
                    })
                    .await
                })
            })
            .collect();

        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert!(peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn panicking_task_is_an_error() {
        let pool = ComputePool::new(1);
        let result = pool.run(|| -> u8 { panic!("boom") }).await;
        assert!(result.is_err());
        // The permit was released.
        assert_eq!(pool.run(|| 1u8).await.unwrap(), 1);
    }
}
