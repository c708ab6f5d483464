// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background maintenance loop
//!
//! One dedicated thread drives three operations against its target at
//! separate cadences:
//!
//! - state-transition sweep, at most every `state_switch_interval`
//! - freeze-mode check, at most every `freeze_mode_interval`
//! - log-block freeze, every iteration
//!
//! Each cadence is measured from its own last run. Iterations are paced to
//! `target_period`, and a failed operation is logged without stopping the loop.

use crate::config::MaintenanceConfig;
use crate::environment::LogStreamEnvironment;
use crate::error::EnvError;
use crate::registry::EnvironmentRegistry;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use strand_core::{Clock, SystemClock};
use thiserror::Error;

/// Something the maintenance loop can drive: a single environment or a
/// whole registry
pub trait Maintained: Send + Sync + 'static {
    fn try_switch_state_for_all(&self) -> Result<(), EnvError>;
    fn check_and_switch_freeze_mode(&self) -> Result<(), EnvError>;
    fn try_freeze_log_for_all(&self, now: Instant) -> Result<(), EnvError>;
}

impl Maintained for LogStreamEnvironment {
    fn try_switch_state_for_all(&self) -> Result<(), EnvError> {
        LogStreamEnvironment::try_switch_state_for_all(self)
    }

    fn check_and_switch_freeze_mode(&self) -> Result<(), EnvError> {
        LogStreamEnvironment::check_and_switch_freeze_mode(self)
    }

    fn try_freeze_log_for_all(&self, now: Instant) -> Result<(), EnvError> {
        LogStreamEnvironment::try_freeze_log_for_all(self, now)
    }
}

impl Maintained for EnvironmentRegistry {
    fn try_switch_state_for_all(&self) -> Result<(), EnvError> {
        self.fan_out("switch state", |env| env.try_switch_state_for_all())
    }

    fn check_and_switch_freeze_mode(&self) -> Result<(), EnvError> {
        self.fan_out("freeze mode check", |env| env.check_and_switch_freeze_mode())
    }

    fn try_freeze_log_for_all(&self, now: Instant) -> Result<(), EnvError> {
        self.fan_out("freeze log", |env| env.try_freeze_log_for_all(now))
    }
}

/// Which operations an iteration should run
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DueWork {
    pub state_switch: bool,
    pub freeze_mode: bool,
    pub freeze_log: bool,
}

/// Tracks the last run of each cadence-limited operation
#[derive(Clone, Debug)]
pub struct MaintenanceSchedule {
    state_switch_interval: Duration,
    freeze_mode_interval: Duration,
    last_state_switch: Option<Instant>,
    last_freeze_mode: Option<Instant>,
}

impl MaintenanceSchedule {
    pub fn new(config: &MaintenanceConfig) -> Self {
        Self {
            state_switch_interval: config.state_switch_interval,
            freeze_mode_interval: config.freeze_mode_interval,
            last_state_switch: None,
            last_freeze_mode: None,
        }
    }

    /// Work due at `now`. Operations reported as due are recorded as run,
    /// whether or not they then succeed.
    pub fn due(&mut self, now: Instant) -> DueWork {
        DueWork {
            state_switch: take_if_due(&mut self.last_state_switch, self.state_switch_interval, now),
            freeze_mode: take_if_due(&mut self.last_freeze_mode, self.freeze_mode_interval, now),
            freeze_log: true,
        }
    }
}

fn take_if_due(last: &mut Option<Instant>, interval: Duration, now: Instant) -> bool {
    let due = match *last {
        None => true,
        Some(at) => now.saturating_duration_since(at) >= interval,
    };
    if due {
        *last = Some(now);
    }
    due
}

/// Sleep needed after an iteration that took `cost` to hold `target`
pub fn pacing_sleep(target: Duration, cost: Duration) -> Duration {
    target.saturating_sub(cost)
}

/// Lifecycle of a [`MaintenanceLoop`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopState {
    Created,
    Initialized,
    Running,
    Stopping,
    Stopped,
}

impl fmt::Display for LoopState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LoopState::Created => "created",
            LoopState::Initialized => "initialized",
            LoopState::Running => "running",
            LoopState::Stopping => "stopping",
            LoopState::Stopped => "stopped",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum LoopError {
    #[error("maintenance loop already initialized")]
    AlreadyInitialized,

    #[error("maintenance loop not initialized")]
    NotInitialized,

    #[error("cannot {op} maintenance loop while {state}")]
    InvalidState { op: &'static str, state: LoopState },

    #[error("failed to spawn maintenance thread: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("maintenance thread panicked")]
    Panicked,
}

/// Snapshot of loop counters
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub iterations: u64,
    pub state_switch_runs: u64,
    pub freeze_mode_runs: u64,
    pub freeze_log_runs: u64,
    pub failures: u64,
}

#[derive(Default)]
struct Counters {
    iterations: AtomicU64,
    state_switch_runs: AtomicU64,
    freeze_mode_runs: AtomicU64,
    freeze_log_runs: AtomicU64,
    failures: AtomicU64,
}

impl Counters {
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    fn snapshot(&self) -> LoopStats {
        LoopStats {
            iterations: self.iterations.load(Ordering::Relaxed),
            state_switch_runs: self.state_switch_runs.load(Ordering::Relaxed),
            freeze_mode_runs: self.freeze_mode_runs.load(Ordering::Relaxed),
            freeze_log_runs: self.freeze_log_runs.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
        }
    }
}

/// Body of the maintenance thread
struct Runner<C: Clock> {
    target: Arc<dyn Maintained>,
    config: MaintenanceConfig,
    clock: C,
    schedule: MaintenanceSchedule,
    counters: Arc<Counters>,
    summary: CostSummary,
}

impl<C: Clock> Runner<C> {
    fn new(target: Arc<dyn Maintained>, config: MaintenanceConfig, clock: C, counters: Arc<Counters>) -> Self {
        let schedule = MaintenanceSchedule::new(&config);
        let summary = CostSummary::new(clock.now());
        Self {
            target,
            config,
            clock,
            schedule,
            counters,
            summary,
        }
    }

    fn run(mut self, stop: Arc<AtomicBool>) {
        tracing::info!(
            target_period = ?self.config.target_period,
            "maintenance loop started"
        );
        while !stop.load(Ordering::Acquire) {
            let cost = self.iterate();
            let sleep = pacing_sleep(self.config.target_period, cost);
            if !sleep.is_zero() {
                thread::park_timeout(sleep);
            }
        }
        tracing::info!(iterations = self.counters.snapshot().iterations, "maintenance loop stopped");
    }

    /// One pass over the due operations. Returns its cost.
    fn iterate(&mut self) -> Duration {
        let start = self.clock.now();
        let due = self.schedule.due(start);

        if due.state_switch {
            Counters::bump(&self.counters.state_switch_runs);
            let result = self.target.try_switch_state_for_all();
            self.check("switch state", result);
        }
        if due.freeze_mode {
            Counters::bump(&self.counters.freeze_mode_runs);
            let result = self.target.check_and_switch_freeze_mode();
            self.check("freeze mode check", result);
        }
        if due.freeze_log {
            Counters::bump(&self.counters.freeze_log_runs);
            let result = self.target.try_freeze_log_for_all(start);
            self.check("freeze log", result);
        }

        Counters::bump(&self.counters.iterations);
        let cost = self.clock.since(start);
        self.summary.record(cost);
        let now = self.clock.now();
        if now.saturating_duration_since(self.summary.since) >= self.config.summary_log_interval {
            self.summary.flush(now);
        }
        cost
    }

    fn check(&self, what: &str, result: Result<(), EnvError>) {
        if let Err(e) = result {
            Counters::bump(&self.counters.failures);
            tracing::warn!(error = %e, "maintenance {} failed", what);
        }
    }
}

/// Iteration cost accumulated between summary log lines
struct CostSummary {
    since: Instant,
    iterations: u64,
    total: Duration,
    max: Duration,
}

impl CostSummary {
    fn new(now: Instant) -> Self {
        Self {
            since: now,
            iterations: 0,
            total: Duration::ZERO,
            max: Duration::ZERO,
        }
    }

    fn record(&mut self, cost: Duration) {
        self.iterations += 1;
        self.total += cost;
        self.max = self.max.max(cost);
    }

    fn flush(&mut self, now: Instant) {
        let avg = match u32::try_from(self.iterations) {
            Ok(n) if n > 0 => self.total / n,
            _ => Duration::ZERO,
        };
        tracing::info!(
            iterations = self.iterations,
            avg_cost = ?avg,
            max_cost = ?self.max,
            "maintenance loop summary"
        );
        *self = Self::new(now);
    }
}

/// Owner of the maintenance thread
pub struct MaintenanceLoop<C: Clock = SystemClock> {
    config: MaintenanceConfig,
    clock: C,
    state: LoopState,
    target: Option<Arc<dyn Maintained>>,
    stop: Arc<AtomicBool>,
    handle: Option<JoinHandle<()>>,
    counters: Arc<Counters>,
}

impl MaintenanceLoop<SystemClock> {
    pub fn with_system_clock(config: MaintenanceConfig) -> Self {
        Self::new(config, SystemClock)
    }
}

impl<C: Clock> MaintenanceLoop<C> {
    pub fn new(config: MaintenanceConfig, clock: C) -> Self {
        Self {
            config,
            clock,
            state: LoopState::Created,
            target: None,
            stop: Arc::new(AtomicBool::new(false)),
            handle: None,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn stats(&self) -> LoopStats {
        self.counters.snapshot()
    }

    /// Bind the loop to the environment set it maintains
    pub fn init(&mut self, target: Arc<dyn Maintained>) -> Result<(), LoopError> {
        match self.state {
            LoopState::Created | LoopState::Stopped if self.target.is_none() => {
                self.target = Some(target);
                self.stop.store(false, Ordering::Release);
                self.state = LoopState::Initialized;
                Ok(())
            }
            _ => Err(LoopError::AlreadyInitialized),
        }
    }

    /// Spawn the maintenance thread
    pub fn start(&mut self) -> Result<(), LoopError> {
        let target = match (self.state, &self.target) {
            (LoopState::Initialized, Some(target)) => Arc::clone(target),
            (LoopState::Created, _) | (LoopState::Stopped, None) => {
                return Err(LoopError::NotInitialized)
            }
            (state, _) => return Err(LoopError::InvalidState { op: "start", state }),
        };

        let runner = Runner::new(
            target,
            self.config.clone(),
            self.clock.clone(),
            Arc::clone(&self.counters),
        );
        let stop = Arc::clone(&self.stop);
        let handle = thread::Builder::new()
            .name("log-maintenance".to_string())
            .spawn(move || runner.run(stop))
            .map_err(LoopError::Spawn)?;

        self.handle = Some(handle);
        self.state = LoopState::Running;
        Ok(())
    }

    /// Ask the thread to exit after its current iteration
    pub fn stop(&mut self) {
        if self.state != LoopState::Running {
            return;
        }
        self.stop.store(true, Ordering::Release);
        if let Some(handle) = &self.handle {
            handle.thread().unpark();
        }
        self.state = LoopState::Stopping;
    }

    /// Block until a stopped thread has exited
    pub fn wait(&mut self) -> Result<(), LoopError> {
        match self.state {
            LoopState::Stopping => {}
            LoopState::Running => {
                return Err(LoopError::InvalidState {
                    op: "wait on",
                    state: self.state,
                })
            }
            _ => return Ok(()),
        }
        self.state = LoopState::Stopped;
        match self.handle.take().map(JoinHandle::join) {
            Some(Err(_)) => {
                tracing::error!("maintenance thread panicked");
                Err(LoopError::Panicked)
            }
            _ => Ok(()),
        }
    }

    /// Stop, wait, and release the target
    pub fn destroy(&mut self) -> Result<(), LoopError> {
        self.stop();
        let result = self.wait();
        self.target = None;
        if self.state != LoopState::Created {
            self.state = LoopState::Stopped;
        }
        result
    }
}

impl<C: Clock> Drop for MaintenanceLoop<C> {
    fn drop(&mut self) {
        if let Err(e) = self.destroy() {
            tracing::warn!(error = %e, "maintenance loop teardown failed");
        }
    }
}

#[cfg(test)]
#[path = "maintenance_tests.rs"]
mod tests;
