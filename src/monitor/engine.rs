//! Monitoring engine shared by the poll loop, the countdown loop and the
//! manual trigger surface.
//!
//! One `MonitorEngine` owns all mutable state and is shared through `Arc`.
//! Field ownership: the poll path writes the `last_*` fields of
//! [`MonitorState`], the countdown writes the `next_event_*` fields.

use anyhow::Result;
use chrono::{DateTime, Duration as ChronoDuration, Local, NaiveDateTime, Utc};
use std::sync::Arc;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio::time::{interval, interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use crate::action::ActionInvoker;
use crate::constants::{ACTION_GRACE_DELAY, COUNTDOWN_TICK};
use crate::daemon::logging::DaemonLogger;
use crate::models::{
    CheckReport, LogFile, MonitorState, PollOutcome, ResolvedEntry, ScanError, ScheduleConfig,
    SourceConfig, StatusReport,
};
use crate::monitor::countdown::{local_to_utc, utc_to_local, Countdown, CountdownTarget, CountdownTick, Retarget};
use crate::monitor::resolver::{is_new_entry, resolve_latest};
use crate::output::create_detection_event;
use crate::scan::{cleanup_old_files, discover_log_files};
use crate::state::StateStore;

/// Settings the engine reads on every cycle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineConfig {
    pub schedule: ScheduleConfig,
    pub source: SourceConfig,
}

/// Why a poll is running
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollTrigger {
    /// Timer tick; obeys the disabled and pending gates
    Scheduled,
    /// Manual check; bypasses both gates but never arms a second action
    Forced,
}

/// The single in-flight delayed action
struct PendingAction {
    fire_at: NaiveDateTime,
    handle: JoinHandle<()>,
}

pub struct MonitorEngine {
    config: Mutex<EngineConfig>,
    state: Mutex<MonitorState>,
    pending: Mutex<Option<PendingAction>>,
    countdown: Mutex<Countdown>,
    countdown_wake: Notify,
    store: Arc<dyn StateStore>,
    invoker: Arc<dyn ActionInvoker>,
    logger: DaemonLogger,
    shutdown: CancellationToken,
    invocations: TaskTracker,
}

impl MonitorEngine {
    /// Build an engine from persisted state
    pub fn new(
        mut config: EngineConfig,
        store: Arc<dyn StateStore>,
        invoker: Arc<dyn ActionInvoker>,
        logger: DaemonLogger,
    ) -> Result<Arc<Self>> {
        config.schedule.clamp_interval();
        let state = store.load()?;
        let countdown = Countdown::restore(state.next_event_time_utc, state.next_event_minutes);

        Ok(Arc::new(Self {
            config: Mutex::new(config),
            state: Mutex::new(state),
            pending: Mutex::new(None),
            countdown: Mutex::new(countdown),
            countdown_wake: Notify::new(),
            store,
            invoker,
            logger,
            shutdown: CancellationToken::new(),
            invocations: TaskTracker::new(),
        }))
    }

    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn config(&self) -> EngineConfig {
        self.config.lock().await.clone()
    }

    pub async fn set_config(&self, mut config: EngineConfig) {
        config.schedule.clamp_interval();
        *self.config.lock().await = config;
    }

    pub async fn state(&self) -> MonitorState {
        self.state.lock().await.clone()
    }

    /// Run one poll cycle.
    ///
    /// Scan errors abort the cycle before any state is touched.
    pub async fn poll(self: &Arc<Self>, trigger: PollTrigger, now: NaiveDateTime) -> Result<PollOutcome, ScanError> {
        let config = self.config.lock().await.clone();
        let forced = trigger == PollTrigger::Forced;

        if !forced && !config.schedule.enabled {
            return Ok(PollOutcome::Disabled);
        }

        // Held for the whole cycle so polls never interleave
        let mut pending = self.pending.lock().await;
        if !forced && pending.is_some() {
            log::debug!("Action pending, skipping scheduled poll");
            return Ok(PollOutcome::SkippedPending);
        }

        let reference = self.state.lock().await.last_processed_file.clone();
        let source = config.source.clone();
        let (files, best) = tokio::task::spawn_blocking(move || {
            let files = discover_log_files(&source.directory, &source.file_pattern)?;
            let best = resolve_latest(&files, now, &reference);
            Ok::<_, ScanError>((files, best))
        })
        .await
        .map_err(|e| ScanError::Task(e.to_string()))??;

        let outcome = match best {
            None => PollOutcome::NoCandidate,
            Some(entry) => {
                self.offer_countdown_target(&entry, now).await;

                let is_new = is_new_entry(&entry, &*self.state.lock().await, now);
                if !is_new {
                    PollOutcome::AlreadySeen { entry }
                } else if pending.is_some() {
                    log::info!("New entry seen while an action is pending; not arming another");
                    PollOutcome::DeferredWhilePending { entry }
                } else {
                    self.record_entry(&entry).await;
                    let fire_at = now + grace_delay();
                    *pending = Some(self.arm_action(fire_at));
                    self.logger.log_action_armed(&entry, fire_at);
                    PollOutcome::Armed { entry, fire_at }
                }
            }
        };
        drop(pending);

        // A deferred entry lives outside the recorded file until the next poll
        let deferred = matches!(outcome, PollOutcome::DeferredWhilePending { .. });
        if config.schedule.delete_old_files && !deferred {
            self.cleanup(&files).await;
        }

        Ok(outcome)
    }

    /// Manual check: always scans and reports the resulting status
    pub async fn force_check(self: &Arc<Self>, now: NaiveDateTime) -> Result<CheckReport, ScanError> {
        let outcome = self.poll(PollTrigger::Forced, now).await?;
        let status = self.status(local_to_utc(now)).await;
        Ok(CheckReport { outcome, status })
    }

    /// Forget the "already seen" baseline. Pending actions and the
    /// countdown are left alone.
    pub async fn reset(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.clear_baseline();
        self.store.save(&state)?;
        log::info!("Processed-entry baseline cleared");
        Ok(())
    }

    pub async fn status(&self, now: DateTime<Utc>) -> StatusReport {
        let config = self.config.lock().await.schedule.clone();
        let pending_fire_at = self.pending.lock().await.as_ref().map(|p| p.fire_at);
        let state = self.state.lock().await.clone();
        let countdown = self.countdown.lock().await.clone();
        let target = countdown.target();

        StatusReport {
            enabled: config.enabled,
            interval_minutes: config.interval_minutes,
            action_pending: pending_fire_at.is_some(),
            pending_fire_at,
            last_processed_timestamp: state.has_baseline().then_some(state.last_processed_timestamp),
            last_processed_file: state.last_processed_file,
            last_found_entry: state.last_found_entry,
            next_event_utc: target.map(|t| t.at),
            next_event_local: target.map(|t| utc_to_local(t.at)),
            next_event_minutes: target.map(|t| t.minutes),
            remaining_seconds: countdown.remaining(now).map(|r| r.num_seconds()),
            pre_event_fired: countdown.pre_event_fired(),
        }
    }

    pub async fn action_pending(&self) -> bool {
        self.pending.lock().await.is_some()
    }

    /// Advance the countdown and carry out what it reports
    pub async fn countdown_tick(&self, now: DateTime<Utc>) -> CountdownTick {
        // Held across the state write; retargets persist under the same lock
        let mut countdown = self.countdown.lock().await;
        let tick = countdown.tick(now);

        match tick {
            CountdownTick::PreEvent { remaining } => {
                if let Some(target) = countdown.target() {
                    self.logger.log_pre_event(target.at, remaining.num_seconds());
                }
                drop(countdown);
                let command = self.config.lock().await.schedule.pre_event_action_command.clone();
                self.spawn_invocation("pre-event", command);
            }
            CountdownTick::Expired { target } => {
                let mut state = self.state.lock().await;
                state.next_event_time_utc = None;
                state.next_event_minutes = None;
                if let Err(e) = self.store.save(&state) {
                    self.logger.log_error(&format!("Failed to save state: {:#}", e), Some("countdown"));
                }
                drop(state);
                drop(countdown);
                self.logger.log_countdown_cleared(target.at);
            }
            CountdownTick::Idle | CountdownTick::Counting { .. } => {}
        }

        tick
    }

    /// Periodic poll task. Scan errors are logged and retried next interval.
    pub async fn run_poll_loop(self: Arc<Self>) {
        let mut period = self.config.lock().await.schedule.poll_interval();
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        log::info!("Poll loop started (every {}s)", period.as_secs());

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }

            match self.poll(PollTrigger::Scheduled, Local::now().naive_local()).await {
                Ok(outcome) => log::debug!("Poll finished: {:?}", outcome),
                Err(e) => self.logger.log_error(&e.to_string(), Some("poll")),
            }

            let current = self.config.lock().await.schedule.poll_interval();
            if current != period {
                log::info!("Poll interval changed to {}s", current.as_secs());
                period = current;
                ticker = interval_at(Instant::now() + period, period);
                ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            }
        }

        log::info!("Poll loop stopped");
    }

    /// 1-second countdown task; sleeps until a target exists
    pub async fn run_countdown_loop(self: Arc<Self>) {
        let mut ticker = interval(COUNTDOWN_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            let has_target = self.countdown.lock().await.target().is_some();
            if !has_target {
                tokio::select! {
                    _ = self.shutdown.cancelled() => break,
                    _ = self.countdown_wake.notified() => {
                        ticker.reset();
                        continue;
                    }
                }
            }

            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.countdown_tick(Utc::now()).await;
        }

        log::info!("Countdown loop stopped");
    }

    /// Stop the loops and settle in-flight work.
    ///
    /// A pending action still inside its grace delay is cancelled. An
    /// invocation that has already started is awaited.
    pub async fn shutdown(&self) {
        self.shutdown.cancel();

        let pending = self.pending.lock().await.take();
        if let Some(pending) = pending {
            log::info!("Cancelling action scheduled for {}", pending.fire_at);
            let _ = pending.handle.await;
        }

        self.invocations.close();
        self.invocations.wait().await;
    }

    async fn record_entry(&self, entry: &ResolvedEntry) {
        let mut state = self.state.lock().await;
        state.record_entry(entry);
        if let Err(e) = self.store.save(&state) {
            self.logger.log_error(&format!("Failed to save state: {:#}", e), Some("poll"));
        }
        drop(state);

        match create_detection_event(entry) {
            Ok(event) => self.logger.log_detection(&event),
            Err(e) => log::warn!("Failed to build detection event: {:#}", e),
        }
    }

    /// Offer the entry's predicted event time to the countdown.
    /// Entries whose event already passed are ignored.
    async fn offer_countdown_target(&self, entry: &ResolvedEntry, now: NaiveDateTime) {
        let event_time = entry.event_time();
        if event_time <= now {
            return;
        }

        let candidate = CountdownTarget {
            at: local_to_utc(event_time),
            minutes: entry.minutes_until_event,
        };

        let mut countdown = self.countdown.lock().await;
        if let Retarget::Replaced(target) = countdown.retarget(candidate) {
            let mut state = self.state.lock().await;
            state.next_event_time_utc = Some(target.at);
            state.next_event_minutes = Some(target.minutes);
            if let Err(e) = self.store.save(&state) {
                self.logger.log_error(&format!("Failed to save state: {:#}", e), Some("countdown"));
            }
            drop(state);
            drop(countdown);

            self.logger.log_countdown_retargeted(target.at, target.minutes);
            self.countdown_wake.notify_one();
        }
    }

    fn arm_action(self: &Arc<Self>, fire_at: NaiveDateTime) -> PendingAction {
        let engine = Arc::clone(self);
        let cancelled = self.shutdown.child_token();

        let handle = tokio::spawn(async move {
            tokio::select! {
                _ = cancelled.cancelled() => return,
                _ = tokio::time::sleep(ACTION_GRACE_DELAY) => {}
            }
            engine.fire_pending_action().await;
        });

        PendingAction { fire_at, handle }
    }

    /// Run the configured action and return to idle whatever the outcome
    async fn fire_pending_action(&self) {
        let command = self.config.lock().await.schedule.action_command.clone();
        let result = self.invoker.invoke(&command).await;
        self.logger
            .log_action_result("scheduled", &command, result.map_err(|e| e.to_string()));

        self.pending.lock().await.take();
    }

    fn spawn_invocation(&self, kind: &'static str, command: String) {
        let invoker = Arc::clone(&self.invoker);
        let logger = self.logger.clone();
        self.invocations.spawn(async move {
            let result = invoker.invoke(&command).await;
            logger.log_action_result(kind, &command, result.map_err(|e| e.to_string()));
        });
    }

    async fn cleanup(&self, files: &[LogFile]) {
        let keep = self.state.lock().await.last_processed_file.clone();
        let report = cleanup_old_files(files, &keep);
        self.logger.log_cleanup(&report);
    }
}

fn grace_delay() -> ChronoDuration {
    ChronoDuration::from_std(ACTION_GRACE_DELAY).unwrap_or_else(|_| ChronoDuration::minutes(1))
}
