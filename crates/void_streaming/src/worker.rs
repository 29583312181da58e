//! Generation Executor
//!
//! Runs content generation jobs either inline on the tick thread or on a
//! fixed pool of worker threads. Either way, results come back through a
//! completion channel that only the controller drains, so chunk records and
//! handle sets are mutated from a single place.

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError, Sender};
use glam::DVec3;

use crate::chunk::ChunkHandles;
use crate::content::ContentGenerator;
use crate::coords::ChunkKey;
use crate::error::{GenerationError, Result, StreamingError};

/// A chunk waiting for content
#[derive(Debug, Clone, Copy)]
pub struct GenerationJob {
    pub key: ChunkKey,
    pub origin: DVec3,
}

/// Outcome of a generation job
#[derive(Debug)]
pub struct GenerationCompletion {
    pub key: ChunkKey,
    pub origin: DVec3,
    pub result: std::result::Result<ChunkHandles, GenerationError>,
}

struct WorkerPool {
    jobs: Option<Sender<GenerationJob>>,
    workers: Vec<JoinHandle<()>>,
}

/// Dispatches generation jobs and collects their completions
pub struct GenerationExecutor {
    generator: Arc<dyn ContentGenerator>,
    completion_tx: Sender<GenerationCompletion>,
    completion_rx: Receiver<GenerationCompletion>,
    pool: Option<WorkerPool>,
}

impl GenerationExecutor {
    /// Executor that generates during `submit` on the calling thread
    pub fn inline(generator: Arc<dyn ContentGenerator>) -> Self {
        let (completion_tx, completion_rx) = unbounded();
        Self {
            generator,
            completion_tx,
            completion_rx,
            pool: None,
        }
    }

    /// Executor backed by `threads` workers; zero threads means inline
    pub fn with_workers(generator: Arc<dyn ContentGenerator>, threads: usize) -> Result<Self> {
        let mut executor = Self::inline(generator);
        if threads == 0 {
            return Ok(executor);
        }

        let (job_tx, job_rx) = unbounded::<GenerationJob>();
        let mut workers = Vec::with_capacity(threads);

        for index in 0..threads {
            let jobs = job_rx.clone();
            let completions = executor.completion_tx.clone();
            let generator = executor.generator.clone();

            let handle = thread::Builder::new()
                .name(format!("chunk-gen-{}", index))
                .spawn(move || {
                    while let Ok(job) = jobs.recv() {
                        let completion = run_job(generator.as_ref(), job);
                        if completions.send(completion).is_err() {
                            break;
                        }
                    }
                })
                .map_err(|e| StreamingError::WorkerSpawn(e.to_string()))?;
            workers.push(handle);
        }

        log::debug!("Started {} chunk generation workers", threads);
        executor.pool = Some(WorkerPool {
            jobs: Some(job_tx),
            workers,
        });
        Ok(executor)
    }

    /// Whether jobs run on worker threads
    pub fn is_threaded(&self) -> bool {
        self.pool.is_some()
    }

    pub fn generator(&self) -> &Arc<dyn ContentGenerator> {
        &self.generator
    }

    /// Start a generation job; its completion arrives through [`Self::try_completions`]
    pub fn submit(&self, job: GenerationJob) {
        match self.pool.as_ref().and_then(|pool| pool.jobs.as_ref()) {
            Some(jobs) => {
                if let Err(err) = jobs.send(job) {
                    let job = err.into_inner();
                    self.post(GenerationCompletion {
                        key: job.key,
                        origin: job.origin,
                        result: Err(GenerationError::Rejected("generation workers stopped".into())),
                    });
                }
            }
            None => self.post(run_job(self.generator.as_ref(), job)),
        }
    }

    /// Every completion received so far, without blocking
    pub fn try_completions(&self) -> Vec<GenerationCompletion> {
        self.completion_rx.try_iter().collect()
    }

    /// Block until the next completion or until `timeout` passes
    pub fn wait_completion(&self, timeout: Duration) -> Option<GenerationCompletion> {
        match self.completion_rx.recv_timeout(timeout) {
            Ok(completion) => Some(completion),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    /// Stop accepting jobs and join the workers once their queue is drained
    pub fn shutdown(&mut self) {
        if let Some(mut pool) = self.pool.take() {
            pool.jobs.take();
            for worker in pool.workers.drain(..) {
                if worker.join().is_err() {
                    log::error!("Chunk generation worker terminated abnormally");
                }
            }
            log::debug!("Chunk generation workers stopped");
        }
    }

    fn post(&self, completion: GenerationCompletion) {
        // We hold the receiver, so the channel cannot be disconnected
        let _ = self.completion_tx.send(completion);
    }
}

impl Drop for GenerationExecutor {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn run_job(generator: &dyn ContentGenerator, job: GenerationJob) -> GenerationCompletion {
    let result = panic::catch_unwind(AssertUnwindSafe(|| generator.generate(job.origin)))
        .unwrap_or_else(|payload| Err(GenerationError::Panicked(panic_message(payload.as_ref()))));

    GenerationCompletion {
        key: job.key,
        origin: job.origin,
        result,
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coords::ChunkCoord;
    use crate::error::ReleaseError;

    struct EchoGenerator;

    impl ContentGenerator for EchoGenerator {
        fn generate(&self, chunk_origin: DVec3) -> std::result::Result<ChunkHandles, GenerationError> {
            if chunk_origin.x < 0.0 {
                panic!("negative origin");
            }
            Ok(ChunkHandles {
                render: vec![crate::chunk::RenderObjectId(chunk_origin.x as u64)],
                ..Default::default()
            })
        }

        fn release(&self, _handles: ChunkHandles) -> std::result::Result<(), ReleaseError> {
            Ok(())
        }
    }

    fn job(x: i64) -> GenerationJob {
        let coord = ChunkCoord::new(x, 0, 0);
        GenerationJob {
            key: ChunkKey::pack(coord).unwrap(),
            origin: DVec3::new(x as f64 * 1000.0, 0.0, 0.0),
        }
    }

    #[test]
    fn test_inline_completes_on_submit() {
        let executor = GenerationExecutor::inline(Arc::new(EchoGenerator));
        assert!(!executor.is_threaded());

        executor.submit(job(2));
        let completions = executor.try_completions();
        assert_eq!(completions.len(), 1);
        assert_eq!(completions[0].result.as_ref().unwrap().render[0].0, 2000);
        assert!(executor.try_completions().is_empty());
    }

    #[test]
    fn test_panic_becomes_failure() {
        let executor = GenerationExecutor::inline(Arc::new(EchoGenerator));
        executor.submit(job(-1));

        let completions = executor.try_completions();
        assert!(matches!(
            completions[0].result,
            Err(GenerationError::Panicked(ref msg)) if msg.contains("negative origin")
        ));
    }

    #[test]
    fn test_worker_pool_completes_all_jobs() {
        let mut executor = GenerationExecutor::with_workers(Arc::new(EchoGenerator), 3).unwrap();
        assert!(executor.is_threaded());

        for x in 0..10 {
            executor.submit(job(x));
        }

        let mut received = Vec::new();
        while received.len() < 10 {
            let completion = executor
                .wait_completion(Duration::from_secs(5))
                .expect("worker completion");
            received.push(completion.key.coord().x);
        }
        received.sort_unstable();
        assert_eq!(received, (0..10).collect::<Vec<_>>());

        executor.shutdown();
        assert!(!executor.is_threaded());
    }
}
