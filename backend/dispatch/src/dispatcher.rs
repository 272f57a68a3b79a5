//! Dispatcher: the single coordination loop.
//!
//! Owns the connection state and the set of job ids currently handed to the
//! delivery queue. Every submission is journaled before anything else happens.
//! While Healthy, jobs go straight to the queue; while Degraded they only sit
//! in the journal until the monitor reports recovery and the journal is replayed.
//! Going Degraded also pauses the queue, so a backlog already handed over is
//! not worked against a remote known to be down.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, error, info, warn};

use lmc_core::{ConnectionState, FailureKind, Job, JobResult, LmcError, Outcome};
use lmc_journal::JobLog;
use lmc_logging::{EventLogger, JobEvent};
use lmc_scheduler::{JobReport, Processor, WorkerPool};

/// What the delivery pool reports back for each job.
pub type DeliveryReport = JobReport<Job, LmcError>;

/// Where a submitted job ended up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Journaled and handed to the delivery queue.
    Dispatched,
    /// Journaled only; delivery waits for connectivity to return.
    Journaled,
}

pub struct Submission {
    pub job: Job,
    pub reply: Option<oneshot::Sender<Result<Disposition, LmcError>>>,
}

/// The delivery side of the dispatcher.
pub trait DeliveryQueue: Send + Sync {
    fn submit(&self, job: Job) -> Result<(), LmcError>;

    /// Start no new attempts until [`DeliveryQueue::resume`]. Jobs stay queued.
    fn pause(&self);

    fn resume(&self);

    /// Stop accepting work and let in-flight deliveries drain.
    fn close(&self);
}

impl<P> DeliveryQueue for WorkerPool<P>
where
    P: Processor<Job = Job>,
{
    fn submit(&self, job: Job) -> Result<(), LmcError> {
        self.add(job)
            .map_err(|e| LmcError::ChannelClosed(e.to_string()))
    }

    fn pause(&self) {
        WorkerPool::pause(self);
    }

    fn resume(&self) {
        WorkerPool::resume(self);
    }

    fn close(&self) {
        self.shutdown();
    }
}

/// Client side of the submission channel.
#[derive(Clone)]
pub struct JobSubmitter {
    tx: mpsc::Sender<Submission>,
}

impl JobSubmitter {
    pub fn new(tx: mpsc::Sender<Submission>) -> Self {
        Self { tx }
    }

    /// Submit a job and wait until it is journaled (and dispatched, if Healthy).
    pub async fn submit(&self, job: Job) -> Result<Disposition, LmcError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Submission { job, reply: Some(reply_tx) })
            .await
            .map_err(|_| LmcError::ChannelClosed("dispatcher is not accepting jobs".into()))?;
        reply_rx
            .await
            .map_err(|_| LmcError::ChannelClosed("dispatcher dropped the submission".into()))?
    }
}

/// Channels the dispatcher loop consumes.
pub struct DispatcherInputs {
    pub submissions: mpsc::Receiver<Submission>,
    pub results: mpsc::Receiver<DeliveryReport>,
    pub recovered: mpsc::Receiver<()>,
    pub shutdown: watch::Receiver<bool>,
}

pub struct Dispatcher {
    log: Arc<dyn JobLog>,
    queue: Arc<dyn DeliveryQueue>,
    arm_monitor: mpsc::Sender<()>,
    state: ConnectionState,
    state_tx: watch::Sender<ConnectionState>,
    in_flight: HashSet<String>,
    closing: bool,
}

impl Dispatcher {
    pub fn new(log: Arc<dyn JobLog>, queue: Arc<dyn DeliveryQueue>, arm_monitor: mpsc::Sender<()>) -> Self {
        let (state_tx, _) = watch::channel(ConnectionState::Healthy);
        Self {
            log,
            queue,
            arm_monitor,
            state: ConnectionState::Healthy,
            state_tx,
            in_flight: HashSet::new(),
            closing: false,
        }
    }

    /// Read-only view of the connection state for status reporting.
    pub fn state_watch(&self) -> watch::Receiver<ConnectionState> {
        self.state_tx.subscribe()
    }

    /// Replay whatever the journal holds, then handle events one at a time until shutdown.
    pub async fn run(mut self, inputs: DispatcherInputs) {
        let DispatcherInputs {
            mut submissions,
            mut results,
            mut recovered,
            mut shutdown,
        } = inputs;

        info!("Dispatcher started, resuming journaled jobs");
        self.replay();

        loop {
            tokio::select! {
                biased;
                _ = shutdown_requested(&mut shutdown) => break,
                Some(report) = results.recv() => self.on_result(report.into()),
                Some(()) = recovered.recv() => self.on_recovery(),
                submission = submissions.recv() => match submission {
                    Some(submission) => self.on_submission(submission),
                    None => break,
                },
            }
        }

        self.shut_down(submissions, results).await;
    }

    fn on_submission(&mut self, submission: Submission) {
        let Submission { job, reply } = submission;
        let id = job.id.clone();
        let outcome = self.accept(job);
        if let Err(e) = &outcome {
            error!(job_id = %id, error = %e, "Job not accepted");
        }
        if let Some(reply) = reply {
            let _ = reply.send(outcome);
        }
    }

    fn accept(&mut self, job: Job) -> Result<Disposition, LmcError> {
        let payload = job.to_payload()?;
        self.log.put(&job.id, &payload)?;
        EventLogger::log_event(&job.id, JobEvent::Journaled);

        if self.closing || self.state == ConnectionState::Degraded {
            EventLogger::log_event(&job.id, JobEvent::held(self.state));
            return Ok(Disposition::Journaled);
        }
        self.dispatch(job)?;
        Ok(Disposition::Dispatched)
    }

    fn dispatch(&mut self, job: Job) -> Result<(), LmcError> {
        if self.in_flight.contains(&job.id) {
            debug!(job_id = %job.id, "Job already in flight");
            return Ok(());
        }
        let id = job.id.clone();
        self.queue.submit(job)?;
        EventLogger::log_event(&id, JobEvent::Dispatched);
        self.in_flight.insert(id);
        Ok(())
    }

    fn on_result(&mut self, result: JobResult) {
        self.in_flight.remove(&result.job_id);
        match &result.outcome {
            Outcome::Success => match self.log.remove(&result.job_id) {
                Ok(()) => EventLogger::log_event(&result.job_id, JobEvent::Delivered),
                Err(e) => error!(job_id = %result.job_id, error = %e, "Delivered job could not be removed from journal"),
            },
            Outcome::Failure { kind, message } => {
                EventLogger::log_event(&result.job_id, JobEvent::failed(*kind, message));
                if *kind == FailureKind::Connectivity && self.state == ConnectionState::Healthy && !self.closing {
                    self.set_state(ConnectionState::Degraded);
                    self.queue.pause();
                    self.arm_monitor();
                }
            }
        }
    }

    fn arm_monitor(&self) {
        match self.arm_monitor.try_send(()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(())) => debug!("Connection monitor already armed"),
            Err(mpsc::error::TrySendError::Closed(())) => warn!("Connection monitor is gone, recovery will not be detected"),
        }
    }

    fn on_recovery(&mut self) {
        if self.closing {
            return;
        }
        self.set_state(ConnectionState::Healthy);
        self.queue.resume();
        self.replay();
    }

    /// Resubmit every journaled job in insertion order. Jobs still held by the
    /// queue are skipped; they run once the queue resumes.
    fn replay(&mut self) {
        let entries = match self.log.read_all_ordered() {
            Ok(entries) => entries,
            Err(e) => {
                error!(error = %e, "Cannot read journal for replay");
                return;
            }
        };

        let mut replayed = 0usize;
        for entry in entries {
            if self.in_flight.contains(&entry.id) {
                debug!(job_id = %entry.id, "Skipping replay of in-flight job");
                continue;
            }
            let job = match Job::from_payload(&entry.payload) {
                Ok(job) => job,
                Err(e) => {
                    EventLogger::log_event(&entry.id, JobEvent::Skipped { reason: e.to_string() });
                    continue;
                }
            };
            if let Err(e) = self.dispatch(job) {
                error!(job_id = %entry.id, error = %e, "Replay stopped, delivery queue refused job");
                break;
            }
            EventLogger::log_event(&entry.id, JobEvent::Replayed);
            replayed += 1;
        }
        if replayed > 0 {
            info!(replayed, "Journal replayed");
        }
    }

    fn set_state(&mut self, state: ConnectionState) {
        if self.state != state {
            info!(from = %self.state, to = %state, "Connection state changed");
            self.state = state;
            self.state_tx.send_replace(state);
        }
    }

    /// Stop taking submissions, close the queue, and keep recording results
    /// until the queue drops its result sender.
    async fn shut_down(
        &mut self,
        mut submissions: mpsc::Receiver<Submission>,
        mut results: mpsc::Receiver<DeliveryReport>,
    ) {
        info!(in_flight = self.in_flight.len(), "Dispatcher shutting down");
        self.closing = true;
        submissions.close();
        while let Ok(submission) = submissions.try_recv() {
            self.on_submission(submission);
        }

        self.queue.close();
        while let Some(report) = results.recv().await {
            self.on_result(report.into());
        }

        match self.log.count() {
            Ok(pending) => info!(pending, "Dispatcher stopped"),
            Err(e) => warn!(error = %e, "Dispatcher stopped, journal size unknown"),
        }
    }
}

async fn shutdown_requested(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
