//! Connection monitor.
//!
//! Idle until armed, then probes the remote with exponential backoff until it
//! answers, emits one recovery signal and goes back to idle. Arm signals that
//! arrive while an episode is running are folded into that episode.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tracing::{debug, info};

use lmc_core::Probe;

pub struct ConnectionMonitor {
    probe: Arc<dyn Probe>,
    initial: Duration,
    cap: Option<Duration>,
}

impl ConnectionMonitor {
    /// `cap` bounds the probe interval; `None` lets it double forever.
    pub fn new(probe: Arc<dyn Probe>, initial: Duration, cap: Option<Duration>) -> Self {
        Self { probe, initial, cap }
    }

    /// Run until `shutdown` flips or the arm channel closes.
    pub async fn run(
        self,
        mut arm: mpsc::Receiver<()>,
        recovered: mpsc::Sender<()>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        loop {
            tokio::select! {
                biased;
                _ = stopped(&mut shutdown) => break,
                signal = arm.recv() => {
                    if signal.is_none() {
                        break;
                    }
                }
            }

            info!(initial_secs = self.initial.as_secs(), "Connectivity lost, probing remote");
            if !self.probe_until_reachable(&mut shutdown).await {
                break;
            }

            // Duplicate loss signals from this episode.
            while arm.try_recv().is_ok() {}

            if recovered.send(()).await.is_err() {
                break;
            }
        }
        debug!("Connection monitor stopped");
    }

    /// Returns false if cancelled before the remote answered.
    async fn probe_until_reachable(&self, shutdown: &mut watch::Receiver<bool>) -> bool {
        let mut backoff = self.initial;
        let mut attempts: u32 = 0;
        loop {
            attempts += 1;
            let reachable = tokio::select! {
                biased;
                _ = stopped(shutdown) => return false,
                ok = self.probe.ping() => ok,
            };
            if reachable {
                info!(attempts, "Remote reachable again");
                return true;
            }

            debug!(attempts, next_probe_secs = backoff.as_secs(), "Remote still unreachable");
            tokio::select! {
                biased;
                _ = stopped(shutdown) => return false,
                _ = tokio::time::sleep(backoff) => {}
            }
            backoff = self.next_backoff(backoff);
        }
    }

    fn next_backoff(&self, current: Duration) -> Duration {
        let doubled = current.saturating_mul(2);
        match self.cap {
            Some(cap) => doubled.min(cap),
            None => doubled,
        }
    }
}

async fn stopped(rx: &mut watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}
