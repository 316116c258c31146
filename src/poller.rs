//! Fixed-cadence polling of all digital inputs.
//!
//! Every tick spawns one refresh task per input and collects their results,
//! so a slow or failing input never holds back the others. An input whose
//! previous refresh has not finished yet is skipped for the tick instead of
//! being refreshed twice at once.

use crate::config::{PollConfig, TickPolicy};
use crate::error::Result;
use crate::sensors::{DigitalInput, Transition};
use log::{debug, error, info, warn};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval, sleep};
use tokio_util::sync::CancellationToken;

/// Shortest accepted poll interval; `tokio::time::interval` rejects zero.
pub const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Summary of one tick.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Inputs read successfully.
    pub refreshed: usize,
    /// Rising edges among them.
    pub rising: usize,
    pub failed: usize,
    /// Inputs still busy with an earlier refresh.
    pub skipped: usize,
}

struct Slot {
    identifier: String,
    input: Arc<Mutex<DigitalInput>>,
}

struct RefreshOutcome {
    identifier: String,
    consecutive_failures: u32,
    result: Result<Transition>,
}

/// Refreshes spawned by one tick, not yet collected.
pub struct PendingTick {
    tasks: JoinSet<RefreshOutcome>,
    skipped: usize,
}

impl PendingTick {
    /// Wait for every refresh of the tick and log the failures.
    pub async fn collect(mut self) -> TickReport {
        let mut report = TickReport {
            skipped: self.skipped,
            ..TickReport::default()
        };

        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(outcome) => match outcome.result {
                    Ok(transition) => {
                        report.refreshed += 1;
                        if transition == Transition::Rising {
                            report.rising += 1;
                        }
                    }
                    Err(e) => {
                        report.failed += 1;
                        // Only the first failure in a row is worth a warning.
                        if outcome.consecutive_failures <= 1 {
                            warn!("Failed to refresh {}: {}", outcome.identifier, e);
                        } else {
                            debug!(
                                "Failed to refresh {} ({} times in a row): {}",
                                outcome.identifier, outcome.consecutive_failures, e
                            );
                        }
                    }
                },
                Err(e) if e.is_cancelled() => {}
                Err(e) => {
                    report.failed += 1;
                    error!("Refresh task panicked: {}", e);
                }
            }
        }

        report
    }
}

pub struct Poller {
    slots: Vec<Slot>,
    config: PollConfig,
}

impl Poller {
    /// Intervals below [`MIN_INTERVAL`] are raised to it.
    pub fn new(inputs: Vec<DigitalInput>, mut config: PollConfig) -> Self {
        if config.interval < MIN_INTERVAL {
            warn!(
                "Poll interval {:?} too short, using {:?}",
                config.interval, MIN_INTERVAL
            );
            config.interval = MIN_INTERVAL;
        }
        let slots = inputs
            .into_iter()
            .map(|input| Slot {
                identifier: input.identifier().to_string(),
                input: Arc::new(Mutex::new(input)),
            })
            .collect();
        Self { slots, config }
    }

    /// Start a refresh for every input that is not busy.
    ///
    /// Must be called from within a tokio runtime.
    pub fn dispatch(&self) -> PendingTick {
        let mut tasks = JoinSet::new();
        let mut skipped = 0;

        for slot in &self.slots {
            match Arc::clone(&slot.input).try_lock_owned() {
                Ok(mut input) => {
                    tasks.spawn(async move {
                        let result = input.refresh().await;
                        RefreshOutcome {
                            identifier: input.identifier().to_string(),
                            consecutive_failures: input.consecutive_failures(),
                            result,
                        }
                    });
                }
                Err(_) => {
                    debug!("Refresh of {} still pending, skipping", slot.identifier);
                    skipped += 1;
                }
            }
        }

        PendingTick { tasks, skipped }
    }

    /// Run a single tick to completion.
    pub async fn tick(&self) -> TickReport {
        self.dispatch().collect().await
    }

    /// Identifier and last observed value of every input.
    ///
    /// Waits for in-flight refreshes.
    pub async fn states(&self) -> Vec<(String, bool)> {
        let mut states = Vec::with_capacity(self.slots.len());
        for slot in &self.slots {
            states.push((slot.identifier.clone(), slot.input.lock().await.state()));
        }
        states
    }

    /// Poll until `shutdown` is cancelled.
    ///
    /// In-flight refreshes are aborted on shutdown; an aborted refresh never
    /// updates its input's state.
    pub async fn run(&self, shutdown: CancellationToken) {
        info!(
            "Polling {} input(s) every {:?} ({:?} policy)",
            self.slots.len(),
            self.config.interval,
            self.config.policy
        );

        match self.config.policy {
            TickPolicy::Overlap => self.run_overlapping(&shutdown).await,
            TickPolicy::Block => self.run_blocking(&shutdown).await,
        }

        info!("Poller stopped");
    }

    async fn run_overlapping(&self, shutdown: &CancellationToken) {
        let mut ticker = interval(self.config.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        let mut in_flight: JoinSet<(u64, TickReport)> = JoinSet::new();
        let mut tick_no: u64 = 0;

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            while let Some(done) = in_flight.try_join_next() {
                if let Ok((finished, report)) = done {
                    log_report(finished, &report);
                }
            }

            tick_no += 1;
            let pending = self.dispatch();
            in_flight.spawn(async move { (tick_no, pending.collect().await) });
        }

        in_flight.shutdown().await;
    }

    async fn run_blocking(&self, shutdown: &CancellationToken) {
        let mut tick_no: u64 = 0;

        loop {
            tick_no += 1;
            tokio::select! {
                _ = shutdown.cancelled() => break,
                report = self.tick() => log_report(tick_no, &report),
            }

            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = sleep(self.config.interval) => {}
            }
        }
    }
}

fn log_report(tick_no: u64, report: &TickReport) {
    debug!(
        "Tick {}: {} refreshed, {} rising, {} failed, {} skipped",
        tick_no, report.refreshed, report.rising, report.failed, report.skipped
    );
}
