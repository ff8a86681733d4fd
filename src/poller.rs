//! Poll loop.
//!
//! ```text
//!          timer fires            session opened, all queries run
//!   Idle ──────────────► Polling ──────────────────────────────► Publishing
//!    ▲  │                                                           │
//!    │  │ stop flag cleared                    event handed to sink │
//!    │  ▼                                                           │
//!    │ Stopped ◄──────────── sink error ────────────────────────────┤
//!    └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! One tick runs at a time and is never interrupted; the stop flag is only
//! checked while waiting for the next tick. A tick that overruns the period
//! delays the next one, missed ticks are not replayed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use tracing::{debug, error, info};

use crate::collector::{Collector, TickReport};
use crate::config::BeatConfig;
use crate::event::MetricEvent;
use crate::provider::Provider;
use crate::sink::{Sink, SinkError};

/// Granularity of stop flag checks while waiting.
const WAIT_SLICE: Duration = Duration::from_millis(100);

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Error type for the poll loop.
#[derive(Debug)]
pub enum PollError {
    /// The sink failed to accept an event.
    Sink(SinkError),
}

impl std::fmt::Display for PollError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PollError::Sink(e) => write!(f, "cannot publish event: {}", e),
        }
    }
}

impl std::error::Error for PollError {}

impl From<SinkError> for PollError {
    fn from(e: SinkError) -> Self {
        PollError::Sink(e)
    }
}

/// Current phase of the poll loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Idle,
    Polling,
    Publishing,
    Stopped,
}

/// Drives one [`Collector`] against a provider on a fixed period.
pub struct Poller<P: Provider, S: Sink> {
    provider: P,
    sink: S,
    collector: Collector,
    period: Duration,
    event_type: String,
    running: Arc<AtomicBool>,
    state: PollState,
    ticks: u64,
}

impl<P: Provider, S: Sink> Poller<P, S> {
    /// Creates a poller. Events are published with `type` set to `event_type`.
    pub fn new(provider: P, sink: S, config: &BeatConfig, event_type: impl Into<String>) -> Self {
        Self {
            provider,
            sink,
            collector: Collector::new(config),
            period: config.period,
            event_type: event_type.into(),
            running: Arc::new(AtomicBool::new(true)),
            state: PollState::Idle,
            ticks: 0,
        }
    }

    /// Uses `running` as the stop signal; clearing it stops the loop between ticks.
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = running;
        self
    }

    /// Returns the flag that keeps the loop running.
    pub fn running_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.running)
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    /// Number of events published so far.
    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Runs ticks on the configured period until the running flag is cleared
    /// or the sink fails.
    pub fn run(&mut self) -> Result<(), PollError> {
        info!(
            "Starting poll loop: period={:?}, classes={}, namespaces={}",
            self.period,
            self.collector.classes().len(),
            self.collector.namespaces().len()
        );

        let mut deadline = Instant::now() + self.period;
        loop {
            if !self.wait_until(deadline) {
                info!("Stop requested, leaving poll loop after {} ticks", self.ticks);
                self.state = PollState::Stopped;
                return Ok(());
            }

            self.tick()?;
            deadline = next_deadline(deadline, self.period, Instant::now());
        }
    }

    /// Runs a single poll and publishes its event.
    ///
    /// Returns `Ok(None)` when no provider session could be opened; nothing is
    /// published for that tick. A sink failure stops the poller.
    pub fn tick(&mut self) -> Result<Option<TickReport>, PollError> {
        self.state = PollState::Polling;

        let session = match self.provider.connect() {
            Ok(session) => session,
            Err(e) => {
                error!("cannot open provider session, skipping tick: {}", e);
                self.state = PollState::Idle;
                return Ok(None);
            }
        };

        let (wmi, report) = self.collector.poll(&*session);

        self.state = PollState::Publishing;
        let event = MetricEvent::new(self.event_type.as_str(), wmi);
        let published = self.sink.publish(&event);
        drop(session);

        if let Err(e) = published {
            error!("cannot publish event: {}", e);
            self.state = PollState::Stopped;
            return Err(e.into());
        }

        self.ticks += 1;
        info!(
            "Tick #{}: {} classes, {} metrics, {} rows dropped ({:?})",
            self.ticks, report.classes, report.metrics, report.rows_dropped, report.elapsed
        );
        if report.classes_failed > 0 || report.namespaces_failed > 0 {
            debug!(
                "Tick #{}: {} classes and {} namespaces skipped",
                self.ticks, report.classes_failed, report.namespaces_failed
            );
        }

        self.state = PollState::Idle;
        Ok(Some(report))
    }

    /// Sleeps until `deadline`, checking the running flag every [`WAIT_SLICE`].
    /// Returns `false` if the flag was cleared.
    fn wait_until(&self, deadline: Instant) -> bool {
        loop {
            if !self.running.load(Ordering::SeqCst) {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(WAIT_SLICE));
        }
    }
}

/// Returns the first tick boundary after `now`, counting whole periods from `previous`.
pub fn next_deadline(previous: Instant, period: Duration, now: Instant) -> Instant {
    let next = previous + period;
    if next > now || period.is_zero() {
        return next;
    }

    let behind = now.duration_since(previous).as_nanos();
    let periods = behind / period.as_nanos() + 1;
    let offset = periods.saturating_mul(period.as_nanos());
    let offset = Duration::new(
        u64::try_from(offset / NANOS_PER_SEC).unwrap_or(u64::MAX),
        (offset % NANOS_PER_SEC) as u32,
    );
    previous
        .checked_add(offset)
        .or_else(|| now.checked_add(period))
        .unwrap_or(now)
}
