//! The bounded transform pool.
//!
//! A fixed number of workers pull jobs from one shared queue and run each
//! transform on the blocking thread pool, so at most `workers` transforms
//! execute at any instant process-wide. Callers race both the submission
//! and the wait for the result against their own cancellation token and the
//! pool shutting down. A caller giving up does not abort a transform a
//! worker already started, it only stops waiting for it.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::{mpsc, oneshot, Mutex};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::{ImageError, Result};
use crate::processor::{self, TransformSpec};

pub const DEFAULT_WORKERS: usize = 2;

struct Job {
    source: Bytes,
    spec: TransformSpec,
    reply: oneshot::Sender<anyhow::Result<Bytes>>,
    cancel: CancellationToken,
}

#[derive(Debug, Default)]
pub struct ConverterStats {
    in_flight: AtomicUsize,
    peak: AtomicUsize,
    completed: AtomicU64,
    skipped: AtomicU64,
}

impl ConverterStats {
    /// Transforms executing right now.
    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    /// The most transforms ever executing at once.
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::SeqCst)
    }

    /// Jobs dropped because their caller was gone before a worker got to them.
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn exit(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct Converter {
    workers: usize,
    queue: mpsc::Sender<Job>,
    shutdown: CancellationToken,
    handles: Mutex<Vec<JoinHandle<()>>>,
    stats: Arc<ConverterStats>,
}

impl Converter {
    /// Spawns the workers, this must be called within a tokio runtime.
    pub fn new(workers: usize) -> Self {
        let workers = workers.max(1);

        // Tokio channels need at least one slot, which is as close to a
        // rendezvous as it gets.
        let (tx, rx) = mpsc::channel::<Job>(1);
        let rx = Arc::new(Mutex::new(rx));
        let shutdown = CancellationToken::new();
        let stats = Arc::new(ConverterStats::default());

        let handles = (0..workers)
            .map(|worker_id| {
                tokio::spawn(worker_loop(
                    worker_id,
                    rx.clone(),
                    shutdown.clone(),
                    stats.clone(),
                ))
            })
            .collect();

        info!(workers, "Started image converter");

        Self {
            workers,
            queue: tx,
            shutdown,
            handles: Mutex::new(handles),
            stats,
        }
    }

    #[inline]
    pub fn workers(&self) -> usize {
        self.workers
    }

    #[inline]
    pub fn stats(&self) -> &ConverterStats {
        &self.stats
    }

    #[inline]
    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Runs a transform on the pool.
    pub async fn convert(
        &self,
        source: Bytes,
        spec: TransformSpec,
        cancel: &CancellationToken,
    ) -> Result<Bytes> {
        if self.is_closed() {
            return Err(ImageError::PoolClosed);
        }

        let (reply, rx) = oneshot::channel();
        let job = Job {
            source,
            spec,
            reply,
            cancel: cancel.clone(),
        };

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return Err(ImageError::PoolClosed),
            _ = cancel.cancelled() => return Err(ImageError::Cancelled),
            sent = self.queue.send(job) => sent.map_err(|_| ImageError::PoolClosed)?,
        }

        tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => Err(ImageError::PoolClosed),
            _ = cancel.cancelled() => Err(ImageError::Cancelled),
            result = rx => match result {
                Ok(converted) => converted.map_err(ImageError::Internal),
                Err(_) => Err(ImageError::PoolClosed),
            },
        }
    }

    /// Closes the pool and waits for the workers to finish their current job.
    pub async fn shutdown(&self) {
        debug!(in_flight = self.stats.in_flight(), "Draining image converter");
        self.shutdown.cancel();

        let handles = std::mem::take(&mut *self.handles.lock().await);
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Converter worker exited abnormally");
            }
        }

        info!(
            completed = self.stats.completed(),
            skipped = self.stats.skipped(),
            peak = self.stats.peak(),
            "Image converter shut down",
        );
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<Mutex<mpsc::Receiver<Job>>>,
    shutdown: CancellationToken,
    stats: Arc<ConverterStats>,
) {
    loop {
        let job = {
            let mut queue = queue.lock().await;
            tokio::select! {
                biased;
                _ = shutdown.cancelled() => break,
                job = queue.recv() => match job {
                    Some(job) => job,
                    None => break,
                },
            }
        };

        if job.cancel.is_cancelled() || job.reply.is_closed() {
            stats.skipped.fetch_add(1, Ordering::SeqCst);
            continue;
        }

        stats.enter();
        let Job { source, spec, reply, .. } = job;
        let result = tokio::task::spawn_blocking(move || processor::transform(&source, &spec))
            .await
            .map_err(anyhow::Error::from)
            .and_then(|converted| converted);
        stats.exit();

        if let Err(ref e) = result {
            warn!(worker_id, error = %e, "Image transform failed");
        }

        // The caller may have given up by now.
        let _ = reply.send(result);
    }

    debug!(worker_id, "Converter worker stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formats::{ImageFit, ImageFormat};
    use crate::processor::encoder::tests::sample_image;
    use crate::processor::{Resize, DEFAULT_JPEG_QUALITY};

    fn spec() -> TransformSpec {
        TransformSpec {
            format: ImageFormat::Png,
            resize: Some(Resize::new(40, 40, ImageFit::Contain)),
            jpeg_quality: DEFAULT_JPEG_QUALITY,
        }
    }

    #[tokio::test]
    async fn converts_on_the_pool() {
        let converter = Converter::new(2);
        let source = Bytes::from(sample_image(200, 100, ImageFormat::Jpeg));

        let out = converter
            .convert(source.clone(), spec(), &CancellationToken::new())
            .await
            .unwrap();
        assert_eq!(out, processor::transform(&source, &spec()).unwrap());
        assert_eq!(converter.stats().completed(), 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn bounds_concurrent_transforms() {
        let converter = Arc::new(Converter::new(2));
        let source = Bytes::from(sample_image(400, 300, ImageFormat::Png));

        let tasks = (0..8).map(|_| {
            let converter = converter.clone();
            let source = source.clone();
            tokio::spawn(async move {
                converter
                    .convert(source, spec(), &CancellationToken::new())
                    .await
            })
        });

        let results = futures::future::join_all(tasks).await;
        let outputs: Vec<Bytes> = results
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        assert!(outputs.windows(2).all(|w| w[0] == w[1]));
        assert!(converter.stats().peak() <= 2);
        assert_eq!(converter.stats().completed(), 8);
    }

    #[tokio::test]
    async fn cancelled_callers_are_released() {
        let converter = Converter::new(1);
        let token = CancellationToken::new();
        token.cancel();

        let res = converter
            .convert(Bytes::from(sample_image(10, 10, ImageFormat::Png)), spec(), &token)
            .await;
        assert!(matches!(res, Err(ImageError::Cancelled)));
    }

    #[tokio::test]
    async fn closed_pool_rejects_work() {
        let converter = Converter::new(2);
        converter.shutdown().await;
        assert!(converter.is_closed());

        let res = converter
            .convert(
                Bytes::from(sample_image(10, 10, ImageFormat::Png)),
                spec(),
                &CancellationToken::new(),
            )
            .await;
        assert!(matches!(res, Err(ImageError::PoolClosed)));
    }
}
