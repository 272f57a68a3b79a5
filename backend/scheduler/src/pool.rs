//! Fixed-size worker pool.
//!
//! Jobs go into an unbounded queue shared by `workers` Tokio tasks. Each
//! worker runs the injected [`Processor`], retries retryable failures under a
//! [`RetryPolicy`], and sends one [`JobReport`] per finished job to the result
//! output. `add` never blocks, so a caller that also drains the result channel
//! cannot deadlock against the pool.
//!
//! A paused pool starts no attempts. Queued jobs stay queued and a job whose
//! retry delay runs out waits for [`WorkerPool::resume`] before its next attempt.
//! Attempts already running finish normally.

use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use lmc_core::{Job, JobResult, LmcError};

use crate::retry::RetryPolicy;

/// A unit of work the pool can carry.
pub trait PoolJob: Clone + Send + Sync + 'static {
    fn id(&self) -> &str;
}

impl PoolJob for Job {
    fn id(&self) -> &str {
        &self.id
    }
}

/// Whether a failed attempt is worth repeating.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

impl Retryable for LmcError {
    /// Only connectivity failures are retried. Everything else is reported on the first failure.
    fn is_retryable(&self) -> bool {
        self.is_connectivity()
    }
}

/// The processing function injected into the pool.
#[async_trait]
pub trait Processor: Send + Sync + 'static {
    type Job: PoolJob;
    type Error: Retryable + fmt::Display + Send + Sync + 'static;

    async fn process(&self, job: &Self::Job) -> Result<(), Self::Error>;
}

/// Final outcome of one job: success, or the error of its last attempt.
#[derive(Debug)]
pub struct JobReport<J, E> {
    pub job: J,
    pub attempts: u32,
    pub last_error: Option<E>,
}

impl<J: PoolJob, E> JobReport<J, E> {
    pub fn job_id(&self) -> &str {
        self.job.id()
    }

    pub fn is_done(&self) -> bool {
        self.last_error.is_none()
    }
}

impl From<JobReport<Job, LmcError>> for JobResult {
    fn from(report: JobReport<Job, LmcError>) -> Self {
        match report.last_error {
            None => JobResult::success(report.job.id),
            Some(err) => JobResult::failure(report.job.id, &err),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PoolError {
    #[error("worker pool is shut down")]
    ShutDown,
}

/// Sink for the pool's internal messages.
pub type LogSink = Arc<dyn Fn(&str) + Send + Sync>;

type Report<P> = JobReport<<P as Processor>::Job, <P as Processor>::Error>;

#[derive(Debug, Clone)]
pub struct PoolOptions {
    pub workers: usize,
    pub retry: RetryPolicy,
}

impl Default for PoolOptions {
    fn default() -> Self {
        Self {
            workers: 2,
            retry: RetryPolicy::default(),
        }
    }
}

pub struct WorkerPool<P: Processor> {
    processor: Arc<P>,
    options: PoolOptions,
    queue_tx: Mutex<Option<mpsc::UnboundedSender<P::Job>>>,
    queue_rx: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<P::Job>>>,
    shutdown_tx: watch::Sender<bool>,
    pause_tx: watch::Sender<bool>,
    loggers: Vec<LogSink>,
    results: Option<mpsc::Sender<Report<P>>>,
    uncompleted: Arc<Mutex<Vec<P::Job>>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl<P: Processor> WorkerPool<P> {
    pub fn new(processor: P, options: PoolOptions) -> Self {
        let (queue_tx, queue_rx) = mpsc::unbounded_channel();
        let (shutdown_tx, _) = watch::channel(false);
        let (pause_tx, _) = watch::channel(false);
        Self {
            processor: Arc::new(processor),
            options,
            queue_tx: Mutex::new(Some(queue_tx)),
            queue_rx: Arc::new(tokio::sync::Mutex::new(queue_rx)),
            shutdown_tx,
            pause_tx,
            loggers: Vec::new(),
            results: None,
            uncompleted: Arc::new(Mutex::new(Vec::new())),
            handles: Mutex::new(Vec::new()),
        }
    }

    pub fn add_logger(&mut self, sink: LogSink) {
        self.loggers.push(sink);
    }

    /// Route job reports to `tx`. Replaces any previous output.
    ///
    /// The pool keeps no sender of its own once running, so the channel closes
    /// when the last worker exits.
    pub fn add_result_output(&mut self, tx: mpsc::Sender<Report<P>>) {
        self.results = Some(tx);
    }

    /// Spawn the workers. Must be called from within a Tokio runtime.
    pub fn run(&mut self) {
        let workers = self.options.workers.max(1);
        let results = self.results.take();
        let mut handles = self.handles.lock().unwrap_or_else(PoisonError::into_inner);

        for index in 0..workers {
            let worker = Worker {
                index,
                processor: Arc::clone(&self.processor),
                retry: self.options.retry.clone(),
                queue: Arc::clone(&self.queue_rx),
                shutdown: self.shutdown_tx.subscribe(),
                paused: self.pause_tx.subscribe(),
                loggers: self.loggers.clone(),
                results: results.clone(),
                uncompleted: Arc::clone(&self.uncompleted),
            };
            handles.push(tokio::spawn(worker.run()));
        }
        info!(workers, max_attempts = self.options.retry.max_attempts, "Worker pool started");
    }

    /// Queue a job. Never blocks.
    pub fn add(&self, job: P::Job) -> Result<(), PoolError> {
        let guard = self.queue_tx.lock().unwrap_or_else(PoisonError::into_inner);
        match guard.as_ref() {
            Some(tx) => tx.send(job).map_err(|_| PoolError::ShutDown),
            None => Err(PoolError::ShutDown),
        }
    }

    /// Stop accepting jobs, stop starting queued ones and abandon pending retry sleeps.
    /// Attempts already running are allowed to finish.
    pub fn shutdown(&self) {
        let was_open = self
            .queue_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
            .is_some();
        self.shutdown_tx.send_replace(true);
        if was_open {
            info!("Worker pool shutting down");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown_tx.borrow()
    }

    /// Hold every attempt that has not started yet. `add` keeps queueing.
    pub fn pause(&self) {
        if !self.pause_tx.send_replace(true) {
            info!("Worker pool paused");
        }
    }

    pub fn resume(&self) {
        if self.pause_tx.send_replace(false) {
            info!("Worker pool resumed");
        }
    }

    pub fn is_paused(&self) -> bool {
        *self.pause_tx.borrow()
    }

    /// Wait for every worker to exit. Only returns after [`WorkerPool::shutdown`].
    ///
    /// Jobs still queued at that point are moved to the uncompleted list.
    pub async fn wait(&self) {
        let handles = std::mem::take(&mut *self.handles.lock().unwrap_or_else(PoisonError::into_inner));
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "Worker task ended abnormally");
            }
        }

        let mut queue = self.queue_rx.lock().await;
        let mut uncompleted = self.uncompleted.lock().unwrap_or_else(PoisonError::into_inner);
        while let Ok(job) = queue.try_recv() {
            uncompleted.push(job);
        }
        debug!(uncompleted = uncompleted.len(), "Worker pool drained");
    }

    /// Jobs that were queued, paused or waiting to retry when the pool shut down.
    pub fn uncompleted_jobs(&self) -> Vec<P::Job> {
        self.uncompleted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

struct Worker<P: Processor> {
    index: usize,
    processor: Arc<P>,
    retry: RetryPolicy,
    queue: Arc<tokio::sync::Mutex<mpsc::UnboundedReceiver<P::Job>>>,
    shutdown: watch::Receiver<bool>,
    paused: watch::Receiver<bool>,
    loggers: Vec<LogSink>,
    results: Option<mpsc::Sender<Report<P>>>,
    uncompleted: Arc<Mutex<Vec<P::Job>>>,
}

impl<P: Processor> Worker<P> {
    async fn run(mut self) {
        self.log(&format!("worker {} started", self.index));
        while let Some(job) = self.next_job().await {
            self.execute(job).await;
        }
        self.log(&format!("worker {} stopped", self.index));
    }

    async fn next_job(&mut self) -> Option<P::Job> {
        loop {
            if !self.wait_while_paused().await {
                return None;
            }
            let mut queue = self.queue.lock().await;
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut self.shutdown) => return None,
                _ = pause_requested(&mut self.paused) => continue,
                job = queue.recv() => return job,
            }
        }
    }

    /// Returns `false` if shutdown arrived while paused.
    async fn wait_while_paused(&mut self) -> bool {
        let paused = *self.paused.borrow();
        if !paused {
            return true;
        }
        self.log(&format!("worker {} paused", self.index));
        tokio::select! {
            biased;
            _ = shutdown_requested(&mut self.shutdown) => false,
            _ = resume_requested(&mut self.paused) => true,
        }
    }

    async fn execute(&mut self, job: P::Job) {
        let mut attempts = 0;
        loop {
            if !self.wait_while_paused().await {
                return self.abandon(job);
            }
            attempts += 1;
            let err = match self.processor.process(&job).await {
                Ok(()) => {
                    self.log(&format!("job {} done after {} attempt(s)", job.id(), attempts));
                    self.report(job, attempts, None).await;
                    return;
                }
                Err(err) => err,
            };

            if !err.is_retryable() || !self.retry.should_retry(attempts) {
                self.log(&format!("job {} failed after {} attempt(s): {}", job.id(), attempts, err));
                self.report(job, attempts, Some(err)).await;
                return;
            }

            let delay = self.retry.delay_for(attempts);
            self.log(&format!(
                "job {} attempt {} failed: {}; retrying in {}ms",
                job.id(),
                attempts,
                err,
                delay.as_millis()
            ));

            let stopping = *self.shutdown.borrow();
            let abandoned = stopping
                || tokio::select! {
                    _ = tokio::time::sleep(delay) => false,
                    _ = shutdown_requested(&mut self.shutdown) => true,
                };
            if abandoned {
                return self.abandon(job);
            }
        }
    }

    fn abandon(&self, job: P::Job) {
        self.log(&format!("job {} abandoned during shutdown", job.id()));
        self.uncompleted
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(job);
    }

    async fn report(&self, job: P::Job, attempts: u32, last_error: Option<P::Error>) {
        let Some(tx) = &self.results else { return };
        if tx.send(JobReport { job, attempts, last_error }).await.is_err() {
            warn!(worker = self.index, "Result output closed, dropping job report");
        }
    }

    fn log(&self, message: &str) {
        for sink in &self.loggers {
            sink(message);
        }
    }
}

/// Resolves once shutdown is requested or the pool is gone.
async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stopped| *stopped).await;
}

async fn pause_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|paused| *paused).await;
}

async fn resume_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|paused| !*paused).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio::sync::Semaphore;

    #[derive(Debug, Clone, PartialEq)]
    struct TestJob(String);

    impl PoolJob for TestJob {
        fn id(&self) -> &str {
            &self.0
        }
    }

    #[derive(Debug)]
    struct TestError {
        retryable: bool,
    }

    impl fmt::Display for TestError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "test error (retryable: {})", self.retryable)
        }
    }

    impl Retryable for TestError {
        fn is_retryable(&self) -> bool {
            self.retryable
        }
    }

    /// Fails each job `failures` times with the given retryability, then succeeds.
    #[derive(Default)]
    struct ScriptedProcessor {
        failures: HashMap<String, (u32, bool)>,
        calls: Mutex<HashMap<String, u32>>,
    }

    impl ScriptedProcessor {
        fn failing(id: &str, times: u32, retryable: bool) -> Self {
            let mut failures = HashMap::new();
            failures.insert(id.to_string(), (times, retryable));
            Self { failures, ..Default::default() }
        }
    }

    #[async_trait]
    impl Processor for ScriptedProcessor {
        type Job = TestJob;
        type Error = TestError;

        async fn process(&self, job: &TestJob) -> Result<(), TestError> {
            let call = {
                let mut calls = self.calls.lock().unwrap();
                let n = calls.entry(job.0.clone()).or_insert(0);
                *n += 1;
                *n
            };
            match self.failures.get(&job.0) {
                Some((times, retryable)) if call <= *times => Err(TestError { retryable: *retryable }),
                _ => Ok(()),
            }
        }
    }

    fn fast_options(workers: usize, max_attempts: u32) -> PoolOptions {
        PoolOptions {
            workers,
            retry: RetryPolicy {
                max_attempts,
                base_delay_ms: 5,
                jitter: false,
                ..Default::default()
            },
        }
    }

    fn job(id: &str) -> TestJob {
        TestJob(id.to_string())
    }

    #[tokio::test]
    async fn test_success_is_reported() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut pool = WorkerPool::new(ScriptedProcessor::default(), fast_options(2, 3));
        pool.add_result_output(tx);
        pool.run();

        pool.add(job("j1")).unwrap();
        let report = rx.recv().await.unwrap();
        assert_eq!(report.job_id(), "j1");
        assert!(report.is_done());
        assert_eq!(report.attempts, 1);

        pool.shutdown();
        pool.wait().await;
    }

    #[tokio::test]
    async fn test_retryable_failure_retried_until_success() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut pool = WorkerPool::new(ScriptedProcessor::failing("j1", 2, true), fast_options(1, 3));
        pool.add_result_output(tx);
        pool.run();

        pool.add(job("j1")).unwrap();
        let report = rx.recv().await.unwrap();
        assert!(report.is_done());
        assert_eq!(report.attempts, 3);

        pool.shutdown();
        pool.wait().await;
    }

    #[tokio::test]
    async fn test_retries_exhausted_reports_last_error() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut pool = WorkerPool::new(ScriptedProcessor::failing("j1", 10, true), fast_options(1, 3));
        pool.add_result_output(tx);
        pool.run();

        pool.add(job("j1")).unwrap();
        let report = rx.recv().await.unwrap();
        assert!(!report.is_done());
        assert_eq!(report.attempts, 3);
        assert!(report.last_error.unwrap().retryable);

        pool.shutdown();
        pool.wait().await;
    }

    #[tokio::test]
    async fn test_non_retryable_failure_not_retried() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut pool = WorkerPool::new(ScriptedProcessor::failing("j1", 10, false), fast_options(1, 5));
        pool.add_result_output(tx);
        pool.run();

        pool.add(job("j1")).unwrap();
        let report = rx.recv().await.unwrap();
        assert!(!report.is_done());
        assert_eq!(report.attempts, 1);

        pool.shutdown();
        pool.wait().await;
    }

    #[tokio::test]
    async fn test_add_after_shutdown_rejected() {
        let mut pool = WorkerPool::new(ScriptedProcessor::default(), fast_options(1, 1));
        pool.run();
        pool.shutdown();
        assert!(pool.is_shut_down());
        assert_eq!(pool.add(job("late")), Err(PoolError::ShutDown));
        pool.wait().await;
    }

    struct GatedProcessor {
        gate: Arc<Semaphore>,
        started: mpsc::UnboundedSender<String>,
    }

    #[async_trait]
    impl Processor for GatedProcessor {
        type Job = TestJob;
        type Error = TestError;

        async fn process(&self, job: &TestJob) -> Result<(), TestError> {
            let _ = self.started.send(job.0.clone());
            let _permit = self.gate.acquire().await.unwrap();
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_shutdown_finishes_running_and_keeps_queued() {
        let gate = Arc::new(Semaphore::new(0));
        let (started_tx, mut started_rx) = mpsc::unbounded_channel();
        let (tx, mut rx) = mpsc::channel(8);
        let mut pool = WorkerPool::new(
            GatedProcessor { gate: Arc::clone(&gate), started: started_tx },
            fast_options(1, 1),
        );
        pool.add_result_output(tx);
        pool.run();

        pool.add(job("running")).unwrap();
        pool.add(job("queued-1")).unwrap();
        pool.add(job("queued-2")).unwrap();
        assert_eq!(started_rx.recv().await.unwrap(), "running");

        pool.shutdown();
        gate.add_permits(10);
        pool.wait().await;

        let report = rx.recv().await.unwrap();
        assert_eq!(report.job_id(), "running");
        assert!(report.is_done());
        // Workers are gone, so the result channel is closed.
        assert!(rx.recv().await.is_none());

        let ids: Vec<String> = pool.uncompleted_jobs().into_iter().map(|j| j.0).collect();
        assert_eq!(ids, ["queued-1", "queued-2"]);
    }

    struct AlwaysRetryable {
        attempts: mpsc::UnboundedSender<()>,
    }

    #[async_trait]
    impl Processor for AlwaysRetryable {
        type Job = TestJob;
        type Error = TestError;

        async fn process(&self, _job: &TestJob) -> Result<(), TestError> {
            let _ = self.attempts.send(());
            Err(TestError { retryable: true })
        }
    }

    #[tokio::test]
    async fn test_shutdown_abandons_retry_sleep() {
        let (attempt_tx, mut attempt_rx) = mpsc::unbounded_channel();
        let (tx, mut rx) = mpsc::channel(8);
        let options = PoolOptions {
            workers: 1,
            retry: RetryPolicy {
                max_attempts: 5,
                base_delay_ms: 3_600_000,
                jitter: false,
                ..Default::default()
            },
        };
        let mut pool = WorkerPool::new(AlwaysRetryable { attempts: attempt_tx }, options);
        pool.add_result_output(tx);
        pool.run();

        pool.add(job("sleepy")).unwrap();
        attempt_rx.recv().await.unwrap();

        pool.shutdown();
        tokio::time::timeout(Duration::from_secs(5), pool.wait())
            .await
            .expect("retry sleep should be abandoned on shutdown");

        assert!(rx.recv().await.is_none(), "abandoned jobs are not reported");
        assert_eq!(pool.uncompleted_jobs(), vec![job("sleepy")]);
    }

    struct CountingFailure {
        attempts: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Processor for CountingFailure {
        type Job = TestJob;
        type Error = TestError;

        async fn process(&self, _job: &TestJob) -> Result<(), TestError> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            Err(TestError { retryable: true })
        }
    }

    #[tokio::test]
    async fn test_paused_pool_holds_queued_jobs_until_resume() {
        let (tx, mut rx) = mpsc::channel(8);
        let mut pool = WorkerPool::new(ScriptedProcessor::default(), fast_options(2, 1));
        pool.add_result_output(tx);
        pool.run();

        pool.pause();
        assert!(pool.is_paused());
        pool.add(job("j1")).unwrap();
        pool.add(job("j2")).unwrap();
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
        assert!(pool.processor.calls.lock().unwrap().is_empty());

        pool.resume();
        let mut done: Vec<String> = Vec::new();
        for _ in 0..2 {
            done.push(rx.recv().await.unwrap().job_id().to_string());
        }
        done.sort();
        assert_eq!(done, ["j1", "j2"]);

        pool.shutdown();
        pool.wait().await;
    }

    #[tokio::test]
    async fn test_pause_holds_pending_retry() {
        let attempts = Arc::new(AtomicUsize::new(0));
        let (tx, mut rx) = mpsc::channel(8);
        let mut pool = WorkerPool::new(
            CountingFailure { attempts: Arc::clone(&attempts) },
            fast_options(1, 5),
        );
        pool.add_result_output(tx);
        pool.run();

        pool.add(job("j1")).unwrap();
        while attempts.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        pool.pause();

        // Well past every retry delay.
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);

        pool.shutdown();
        pool.wait().await;
        assert!(rx.recv().await.is_none());
        assert_eq!(pool.uncompleted_jobs(), vec![job("j1")]);
    }

    #[tokio::test]
    async fn test_shutdown_while_paused_keeps_queued_jobs() {
        let mut pool = WorkerPool::new(ScriptedProcessor::default(), fast_options(2, 1));
        pool.run();
        pool.pause();
        pool.add(job("j1")).unwrap();

        pool.shutdown();
        tokio::time::timeout(Duration::from_secs(5), pool.wait())
            .await
            .expect("paused workers should stop on shutdown");
        assert_eq!(pool.uncompleted_jobs(), vec![job("j1")]);
    }

    struct ConcurrencyProbe {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl Processor for ConcurrencyProbe {
        type Job = TestJob;
        type Error = TestError;

        async fn process(&self, _job: &TestJob) -> Result<(), TestError> {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_concurrency_bounded_by_worker_count() {
        let (tx, mut rx) = mpsc::channel(16);
        let probe = ConcurrencyProbe { current: AtomicUsize::new(0), peak: AtomicUsize::new(0) };
        let mut pool = WorkerPool::new(probe, fast_options(2, 1));
        pool.add_result_output(tx);
        pool.run();

        for i in 0..6 {
            pool.add(job(&format!("j{i}"))).unwrap();
        }
        for _ in 0..6 {
            assert!(rx.recv().await.unwrap().is_done());
        }

        let peak = pool.processor.peak.load(Ordering::SeqCst);
        assert!(peak <= 2, "peak concurrency {peak} exceeds worker count");
        pool.shutdown();
        pool.wait().await;
    }

    #[tokio::test]
    async fn test_logger_sink_receives_messages() {
        let lines = Arc::new(Mutex::new(Vec::<String>::new()));
        let sink_lines = Arc::clone(&lines);
        let (tx, mut rx) = mpsc::channel(8);
        let mut pool = WorkerPool::new(ScriptedProcessor::failing("j1", 1, true), fast_options(1, 2));
        pool.add_logger(Arc::new(move |line: &str| sink_lines.lock().unwrap().push(line.to_string())));
        pool.add_result_output(tx);
        pool.run();

        pool.add(job("j1")).unwrap();
        rx.recv().await.unwrap();
        pool.shutdown();
        pool.wait().await;

        let lines = lines.lock().unwrap();
        assert!(lines.iter().any(|l| l.contains("j1 attempt 1 failed")));
        assert!(lines.iter().any(|l| l.contains("j1 done after 2 attempt(s)")));
        assert!(lines.iter().any(|l| l.contains("worker 0 stopped")));
    }

    #[test]
    fn test_lmc_error_retryability() {
        assert!(LmcError::Transport("refused".into()).is_retryable());
        assert!(LmcError::Server { status: 503 }.is_retryable());
        assert!(!LmcError::Unauthorized.is_retryable());
        assert!(!LmcError::Rejected { status: 400, message: "bad".into() }.is_retryable());
    }
}
