//! Scheduler Engine — arms fire times, drives the dispatcher loop, and
//! executes fires with retry, locking, and persistence.
//!
//! One dispatcher task sleeps until the earliest armed deadline; every
//! fire runs in its own spawned task so backoff sleeps never stall
//! unrelated schedules. Re-arming happens at dispatch time, before the
//! fire executes — a failed or skipped fire can never silently stop
//! future occurrences.

use chrono::{DateTime, Utc};
use octoprompt_core::{AppConfig, ConfigHandle, OctopromptError, PromptLoader, Result, ScheduleConfig};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::task::JoinHandle;

use crate::backend::{BackendStatus, DeliveryBackend};
use crate::events::{EventKind, EventSink, Notifier, SchedulerEvent};
use crate::history::{ExecutionHistory, ExecutionRecord};
use crate::state::StateStore;
use crate::timing;

/// Backoff delays between delivery attempts.
pub const RETRY_DELAYS_SECS: [u64; 3] = [5, 15, 45];
/// Initial attempt plus one per backoff delay.
pub const MAX_ATTEMPTS: usize = RETRY_DELAYS_SECS.len() + 1;

/// The scheduler engine. Cheap to share: all state lives behind an `Arc`.
pub struct SchedulerEngine {
    inner: Arc<Inner>,
}

struct Inner {
    config: Arc<ConfigHandle>,
    backend: Arc<dyn DeliveryBackend>,
    notifier: Arc<dyn Notifier>,
    sinks: Vec<Arc<dyn EventSink>>,
    state: StateStore,
    /// Schedule id → last successful fire. Engine is the sole writer.
    last_execution: Mutex<HashMap<String, DateTime<Utc>>>,
    history: Mutex<ExecutionHistory>,
    /// Ids currently inside the firing procedure.
    running: Mutex<HashSet<String>>,
    /// Schedule id → next fire instant. At most one entry per schedule.
    armed: Mutex<HashMap<String, DateTime<Utc>>>,
    /// Pokes the dispatcher whenever the armed map changes.
    rearm: Notify,
    dispatcher: Mutex<Option<JoinHandle<()>>>,
}

/// Removes the schedule id from the running set on every exit path.
struct RunningGuard<'a> {
    running: &'a Mutex<HashSet<String>>,
    id: String,
}

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.running.lock().remove(&self.id);
    }
}

impl SchedulerEngine {
    pub fn new(
        config: Arc<ConfigHandle>,
        backend: Arc<dyn DeliveryBackend>,
        notifier: Arc<dyn Notifier>,
        sinks: Vec<Arc<dyn EventSink>>,
        state: StateStore,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                config,
                backend,
                notifier,
                sinks,
                state,
                last_execution: Mutex::new(HashMap::new()),
                history: Mutex::new(ExecutionHistory::new()),
                running: Mutex::new(HashSet::new()),
                armed: Mutex::new(HashMap::new()),
                rearm: Notify::new(),
                dispatcher: Mutex::new(None),
            }),
        }
    }

    /// Load persisted state and arm a timer for every enabled schedule.
    pub fn start(&self) {
        *self.inner.last_execution.lock() = self.inner.state.load();

        let config = self.inner.config.snapshot();
        let now = Utc::now();
        {
            let mut armed = self.inner.armed.lock();
            armed.clear();
            for schedule in config.schedules.iter().filter(|s| s.enabled) {
                match Inner::compute_next(schedule, now) {
                    Some(next) => {
                        armed.insert(schedule.id.clone(), next);
                    }
                    None => tracing::warn!(
                        "⚠️ Could not compute next fire date for '{}'",
                        schedule.name
                    ),
                }
            }
            tracing::info!("⏰ Scheduler started with {} active timer(s)", armed.len());
        }
        self.inner.rearm.notify_one();
        self.ensure_dispatcher();
    }

    /// Cancel all pending timers. Idempotent; in-flight fires finish.
    pub fn stop(&self) {
        self.inner.armed.lock().clear();
        self.inner.rearm.notify_one();
        tracing::info!("🛑 Scheduler stopped all timers");
    }

    /// Rebuild the timer set from the current config. Called after every
    /// configuration change.
    pub fn restart(&self) {
        self.stop();
        self.start();
    }

    /// Fire a schedule outside the timer path. Still subject to locking
    /// and retry.
    pub async fn execute_now(&self, schedule_id: &str) -> Result<()> {
        let config = self.inner.config.snapshot();
        let schedule = config
            .schedule(schedule_id)
            .cloned()
            .ok_or_else(|| OctopromptError::ScheduleNotFound(schedule_id.to_string()))?;
        Inner::execute_with_retry(&self.inner, &schedule, &config, false).await;
        Ok(())
    }

    /// Sleep/wake recovery: execute one catch-up fire for each enabled
    /// schedule whose next occurrence after its last fire is already in
    /// the past, then re-arm everything.
    ///
    /// A multi-day suspend still yields a single catch-up fire per
    /// schedule, matching the recorded-last-fire semantics.
    pub async fn check_missed_fires(&self) {
        let config = self.inner.config.snapshot();
        let now = Utc::now();
        let missed: Vec<ScheduleConfig> = {
            let last_execution = self.inner.last_execution.lock();
            config
                .schedules
                .iter()
                .filter(|s| s.enabled)
                .filter(|s| {
                    last_execution
                        .get(&s.id)
                        .and_then(|last| Inner::compute_next(s, *last))
                        .is_some_and(|due| due <= now)
                })
                .cloned()
                .collect()
        };

        for schedule in missed {
            tracing::info!("⏪ Missed fire for '{}', executing catch-up", schedule.name);
            Inner::execute_with_retry(&self.inner, &schedule, &config, true).await;
        }

        // Deadlines armed before a suspend are stale; rebuild all of them.
        self.restart();
    }

    /// Execution history, newest first.
    pub fn history(&self) -> Vec<ExecutionRecord> {
        self.inner.history.lock().recent()
    }

    /// Last successful fire for a schedule, if any.
    pub fn last_execution(&self, schedule_id: &str) -> Option<DateTime<Utc>> {
        self.inner.last_execution.lock().get(schedule_id).copied()
    }

    /// The armed timer set as (schedule id, next fire) pairs, sorted by id.
    pub fn next_fire_times(&self) -> Vec<(String, DateTime<Utc>)> {
        let mut times: Vec<_> = self
            .inner
            .armed
            .lock()
            .iter()
            .map(|(id, at)| (id.clone(), *at))
            .collect();
        times.sort_by(|a, b| a.0.cmp(&b.0));
        times
    }

    fn ensure_dispatcher(&self) {
        let mut dispatcher = self.inner.dispatcher.lock();
        let alive = dispatcher.as_ref().is_some_and(|handle| !handle.is_finished());
        if !alive {
            *dispatcher = Some(Inner::spawn_dispatcher(&self.inner));
        }
    }
}

impl Inner {
    /// Next fire instant for a schedule, strictly after `after`.
    fn compute_next(schedule: &ScheduleConfig, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let naive = timing::next_fire_date(&schedule.schedule, timing::utc_to_local_naive(after))?;
        timing::local_to_utc(naive)
    }

    fn spawn_dispatcher(inner: &Arc<Inner>) -> JoinHandle<()> {
        let inner = Arc::clone(inner);
        tokio::spawn(async move {
            loop {
                let next = {
                    let armed = inner.armed.lock();
                    armed
                        .iter()
                        .min_by_key(|(_, at)| **at)
                        .map(|(id, at)| (id.clone(), *at))
                };
                let Some((id, due)) = next else {
                    inner.rearm.notified().await;
                    continue;
                };

                let wait = (due - Utc::now()).to_std().unwrap_or(Duration::ZERO);
                tokio::select! {
                    _ = tokio::time::sleep(wait) => {
                        let still_due = {
                            let mut armed = inner.armed.lock();
                            if armed.get(&id) == Some(&due) {
                                armed.remove(&id);
                                true
                            } else {
                                false
                            }
                        };
                        if !still_due {
                            continue;
                        }
                        // Re-arm before executing so a slow or failed fire
                        // never blocks the next occurrence.
                        Self::rearm_schedule(&inner, &id, due);
                        let fire_inner = Arc::clone(&inner);
                        tokio::spawn(async move {
                            let config = fire_inner.config.snapshot();
                            if let Some(schedule) = config.schedule(&id).cloned() {
                                Self::execute_with_retry(&fire_inner, &schedule, &config, false)
                                    .await;
                            }
                        });
                    }
                    // Armed map changed; recompute the earliest deadline.
                    _ = inner.rearm.notified() => {}
                }
            }
        })
    }

    fn rearm_schedule(inner: &Arc<Inner>, schedule_id: &str, fired_at: DateTime<Utc>) {
        let config = inner.config.snapshot();
        let Some(schedule) = config.schedule(schedule_id) else {
            return;
        };
        if !schedule.enabled {
            return;
        }
        let from = fired_at.max(Utc::now());
        match Self::compute_next(schedule, from) {
            Some(next) => {
                let in_secs = (next - Utc::now()).num_seconds();
                tracing::info!("'{}' next fire: {} (in {}s)", schedule.name, next.to_rfc3339(), in_secs);
                inner.armed.lock().insert(schedule.id.clone(), next);
                inner.rearm.notify_one();
            }
            None => {
                tracing::warn!("⚠️ Could not compute next fire date for '{}'", schedule.name);
            }
        }
    }

    fn emit(inner: &Arc<Inner>, kind: EventKind, schedule: &ScheduleConfig, error: Option<&str>) {
        let mut event = SchedulerEvent::new(kind, &schedule.id, &schedule.name)
            .with_channel(schedule.options.slack_channel.clone());
        if let Some(error) = error {
            event = event.with_error(error);
        }
        for sink in &inner.sinks {
            sink.on_event(&event);
        }
    }

    fn record_failure(
        inner: &Arc<Inner>,
        schedule: &ScheduleConfig,
        error: &str,
        notification: &str,
    ) {
        inner
            .history
            .lock()
            .record_failure(&schedule.id, &schedule.name, error);
        inner.notifier.notify("Octoprompt", notification);
        Self::emit(inner, EventKind::Failed, schedule, Some(error));
    }

    /// The firing procedure: gates, prompt load, delivery with backoff,
    /// then state/history/event bookkeeping.
    async fn execute_with_retry(
        inner: &Arc<Inner>,
        schedule: &ScheduleConfig,
        config: &AppConfig,
        delayed: bool,
    ) {
        // Availability gate — non-retriable, short-circuits the whole fire.
        if inner.backend.status() == BackendStatus::NotInstalled {
            tracing::error!("❌ '{}' failed: assistant not available", schedule.name);
            Self::record_failure(
                inner,
                schedule,
                "Assistant not available",
                &format!("{} failed: assistant not available", schedule.name),
            );
            return;
        }

        // Concurrency gate — same-schedule lock, plus global single-flight
        // unless concurrent executions are allowed. Skipped fires are
        // dropped, never queued.
        let _guard = {
            let mut running = inner.running.lock();
            if running.contains(&schedule.id) {
                tracing::info!("⏭ '{}' is already running, skipping this fire", schedule.name);
                return;
            }
            if !config.global_options.allow_concurrent_executions && !running.is_empty() {
                tracing::info!("⏭ Another schedule is running, skipping '{}'", schedule.name);
                return;
            }
            running.insert(schedule.id.clone());
            RunningGuard {
                running: &inner.running,
                id: schedule.id.clone(),
            }
        };

        if delayed {
            tracing::info!("▶️ Executing '{}' (delayed catch-up)...", schedule.name);
        } else {
            tracing::info!("▶️ Executing '{}'...", schedule.name);
        }
        inner
            .notifier
            .notify("Octoprompt", &format!("Running: {}", schedule.name));
        Self::emit(inner, EventKind::Fired, schedule, None);

        // Prompt load — a missing file will not fix itself; no retry.
        let loader = PromptLoader::new(
            config.resolved_prompts_directory(),
            config.resolved_workspace_directory(),
        );
        let Some(template) = loader.load(&schedule.prompt_file) else {
            tracing::error!("❌ Failed to load prompt for '{}'", schedule.name);
            Self::record_failure(
                inner,
                schedule,
                "Could not load prompt file",
                &format!("{} failed: could not load prompt file", schedule.name),
            );
            return;
        };
        let prompt = loader.render(&template);
        let new_conversation = schedule.options.new_conversation.unwrap_or(true);

        let mut success = inner.backend.send_prompt(&prompt, new_conversation).await;
        for (attempt, delay) in RETRY_DELAYS_SECS.iter().enumerate() {
            if success {
                break;
            }
            tracing::warn!(
                "⚠️ '{}' delivery failed (attempt {}/{MAX_ATTEMPTS}), retrying in {delay}s",
                schedule.name,
                attempt + 1
            );
            tokio::time::sleep(Duration::from_secs(*delay)).await;
            success = inner.backend.send_prompt(&prompt, new_conversation).await;
        }

        if success {
            let snapshot = {
                let mut last = inner.last_execution.lock();
                last.insert(schedule.id.clone(), Utc::now());
                last.clone()
            };
            inner.state.save(&snapshot);
            inner
                .history
                .lock()
                .record_success(&schedule.id, &schedule.name);
            tracing::info!("✅ '{}' sent successfully", schedule.name);
            inner
                .notifier
                .notify("Octoprompt", &format!("{} sent to assistant", schedule.name));
            Self::emit(inner, EventKind::Succeeded, schedule, None);
        } else {
            let message = format!("Failed after {MAX_ATTEMPTS} attempts");
            tracing::error!("❌ '{}' {message}", schedule.name);
            Self::record_failure(
                inner,
                schedule,
                &message,
                &format!("{} failed to send", schedule.name),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use octoprompt_core::{GlobalOptions, ScheduleOptions, ScheduleTiming};
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MockBackend {
        /// Failures to report before succeeding.
        fail_remaining: AtomicUsize,
        calls: AtomicUsize,
        delay: Duration,
        status: BackendStatus,
    }

    impl MockBackend {
        fn ok() -> Self {
            Self::failing(0)
        }

        fn failing(failures: usize) -> Self {
            Self {
                fail_remaining: AtomicUsize::new(failures),
                calls: AtomicUsize::new(0),
                delay: Duration::ZERO,
                status: BackendStatus::Ready,
            }
        }

        fn slow(delay: Duration) -> Self {
            Self {
                delay,
                ..Self::ok()
            }
        }

        fn not_installed() -> Self {
            Self {
                status: BackendStatus::NotInstalled,
                ..Self::ok()
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl DeliveryBackend for MockBackend {
        async fn send_prompt(&self, _prompt: &str, _new_conversation: bool) -> bool {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail_remaining.load(Ordering::SeqCst) > 0 {
                self.fail_remaining.fetch_sub(1, Ordering::SeqCst);
                false
            } else {
                true
            }
        }

        fn status(&self) -> BackendStatus {
            self.status
        }
    }

    struct NullNotifier;
    impl Notifier for NullNotifier {
        fn notify(&self, _title: &str, _body: &str) {}
    }

    #[derive(Default)]
    struct CollectSink {
        events: Mutex<Vec<SchedulerEvent>>,
    }

    impl EventSink for CollectSink {
        fn on_event(&self, event: &SchedulerEvent) {
            self.events.lock().push(event.clone());
        }
    }

    impl CollectSink {
        fn kinds(&self) -> Vec<EventKind> {
            self.events.lock().iter().map(|e| e.kind).collect()
        }
    }

    fn schedule(id: &str, time: &str) -> ScheduleConfig {
        ScheduleConfig {
            id: id.into(),
            name: format!("Schedule {id}"),
            enabled: true,
            prompt_file: format!("{id}.md"),
            schedule: ScheduleTiming {
                timing_type: "daily".into(),
                time: time.into(),
                days_of_week: None,
            },
            options: ScheduleOptions::default(),
        }
    }

    struct Rig {
        engine: Arc<SchedulerEngine>,
        backend: Arc<MockBackend>,
        events: Arc<CollectSink>,
        dir: tempfile::TempDir,
    }

    fn rig(schedules: Vec<ScheduleConfig>, backend: MockBackend, allow_concurrent: bool) -> Rig {
        let dir = tempfile::tempdir().unwrap();
        let prompts = dir.path().join("prompts");
        std::fs::create_dir_all(&prompts).unwrap();
        for s in &schedules {
            std::fs::write(prompts.join(&s.prompt_file), "hello {{CURRENT_DATE}}").unwrap();
        }

        let config = AppConfig {
            prompts_directory: prompts.to_string_lossy().into_owned(),
            workspace_directory: dir.path().to_string_lossy().into_owned(),
            schedules,
            global_options: GlobalOptions {
                allow_concurrent_executions: allow_concurrent,
                show_notifications: false,
                ..GlobalOptions::default()
            },
            ..AppConfig::default()
        };
        let config = Arc::new(ConfigHandle::with_config(
            dir.path().join("config.json"),
            config,
        ));
        let backend = Arc::new(backend);
        let events = Arc::new(CollectSink::default());
        let engine = Arc::new(SchedulerEngine::new(
            Arc::clone(&config),
            Arc::clone(&backend) as Arc<dyn DeliveryBackend>,
            Arc::new(NullNotifier),
            vec![Arc::clone(&events) as Arc<dyn EventSink>],
            StateStore::new(&dir.path().join("state")),
        ));
        Rig {
            engine,
            backend,
            events,
            dir,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_backoff_then_success() {
        let rig = rig(vec![schedule("a", "09:00")], MockBackend::failing(3), false);

        let before = tokio::time::Instant::now();
        rig.engine.execute_now("a").await.unwrap();
        let elapsed = before.elapsed();

        assert_eq!(rig.backend.calls(), 4);
        assert!(elapsed >= Duration::from_secs(5 + 15 + 45), "elapsed {elapsed:?}");
        let history = rig.engine.history();
        assert_eq!(history.len(), 1);
        assert!(history[0].success);
        assert_eq!(rig.events.kinds(), vec![EventKind::Fired, EventKind::Succeeded]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_exhaustion_records_failure() {
        let rig = rig(vec![schedule("a", "09:00")], MockBackend::failing(10), false);
        rig.engine.execute_now("a").await.unwrap();

        assert_eq!(rig.backend.calls(), MAX_ATTEMPTS);
        let history = rig.engine.history();
        assert_eq!(history.len(), 1);
        assert!(!history[0].success);
        assert_eq!(history[0].error.as_deref(), Some("Failed after 4 attempts"));
        assert_eq!(rig.events.kinds(), vec![EventKind::Fired, EventKind::Failed]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backend_unavailable_fails_without_retry() {
        let rig = rig(vec![schedule("a", "09:00")], MockBackend::not_installed(), false);

        let before = tokio::time::Instant::now();
        rig.engine.execute_now("a").await.unwrap();

        assert_eq!(rig.backend.calls(), 0);
        assert!(before.elapsed() < Duration::from_secs(1));
        let history = rig.engine.history();
        assert_eq!(history[0].error.as_deref(), Some("Assistant not available"));
        // No fired event — the availability gate runs before everything.
        assert_eq!(rig.events.kinds(), vec![EventKind::Failed]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_missing_prompt_file_is_non_retriable() {
        let rig = rig(vec![schedule("a", "09:00")], MockBackend::ok(), false);
        std::fs::remove_file(rig.dir.path().join("prompts").join("a.md")).unwrap();

        rig.engine.execute_now("a").await.unwrap();
        assert_eq!(rig.backend.calls(), 0);
        let history = rig.engine.history();
        assert_eq!(history[0].error.as_deref(), Some("Could not load prompt file"));
    }

    #[tokio::test]
    async fn test_execute_now_unknown_id() {
        let rig = rig(vec![schedule("a", "09:00")], MockBackend::ok(), false);
        assert!(matches!(
            rig.engine.execute_now("nope").await,
            Err(OctopromptError::ScheduleNotFound(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_same_schedule_fire_is_skipped_while_running() {
        let rig = rig(
            vec![schedule("a", "09:00")],
            MockBackend::slow(Duration::from_secs(30)),
            false,
        );

        let engine = Arc::clone(&rig.engine);
        let first = tokio::spawn(async move { engine.execute_now("a").await });
        // Let the first fire take the lock and park in the delivery sleep.
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        rig.engine.execute_now("a").await.unwrap();
        first.await.unwrap().unwrap();

        // One record, not two: the overlapping fire was a silent skip.
        assert_eq!(rig.engine.history().len(), 1);
        assert_eq!(rig.backend.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_global_single_flight_skips_other_schedules() {
        let rig = rig(
            vec![schedule("a", "09:00"), schedule("b", "10:00")],
            MockBackend::slow(Duration::from_secs(30)),
            false,
        );

        let engine = Arc::clone(&rig.engine);
        let first = tokio::spawn(async move { engine.execute_now("a").await });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        rig.engine.execute_now("b").await.unwrap();
        first.await.unwrap().unwrap();

        assert_eq!(rig.engine.history().len(), 1);
        assert_eq!(rig.engine.history()[0].schedule_id, "a");
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrent_executions_when_allowed() {
        let rig = rig(
            vec![schedule("a", "09:00"), schedule("b", "10:00")],
            MockBackend::slow(Duration::from_secs(30)),
            true,
        );

        let engine = Arc::clone(&rig.engine);
        let first = tokio::spawn(async move { engine.execute_now("a").await });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        rig.engine.execute_now("b").await.unwrap();
        first.await.unwrap().unwrap();

        assert_eq!(rig.engine.history().len(), 2);
        assert_eq!(rig.backend.calls(), 2);
    }

    #[tokio::test]
    async fn test_restart_is_idempotent() {
        let rig = rig(
            vec![schedule("a", "03:04"), schedule("b", "21:30")],
            MockBackend::ok(),
            false,
        );

        rig.engine.start();
        let once = rig.engine.next_fire_times();
        assert_eq!(once.len(), 2);

        rig.engine.restart();
        rig.engine.restart();
        assert_eq!(rig.engine.next_fire_times(), once);
    }

    #[tokio::test]
    async fn test_stop_clears_timers_and_is_idempotent() {
        let rig = rig(vec![schedule("a", "03:04")], MockBackend::ok(), false);
        rig.engine.start();
        assert_eq!(rig.engine.next_fire_times().len(), 1);

        rig.engine.stop();
        rig.engine.stop();
        assert!(rig.engine.next_fire_times().is_empty());
    }

    #[tokio::test]
    async fn test_disabled_schedules_are_not_armed() {
        let mut disabled = schedule("off", "08:00");
        disabled.enabled = false;
        let rig = rig(vec![schedule("on", "08:00"), disabled], MockBackend::ok(), false);

        rig.engine.start();
        let ids: Vec<_> = rig.engine.next_fire_times().into_iter().map(|(id, _)| id).collect();
        assert_eq!(ids, vec!["on"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dispatcher_fires_and_rearms() {
        let rig = rig(vec![schedule("a", "09:00")], MockBackend::ok(), false);
        rig.engine.start();

        // Paused-clock auto-advance walks virtual time to the deadline.
        tokio::time::timeout(Duration::from_secs(60 * 60 * 26), async {
            while rig.engine.history().is_empty() {
                tokio::time::sleep(Duration::from_secs(1)).await;
            }
        })
        .await
        .expect("schedule never fired");

        assert!(rig.engine.history()[0].success);
        // Re-armed for a future occurrence.
        assert_eq!(rig.engine.next_fire_times().len(), 1);
    }

    #[tokio::test]
    async fn test_missed_fire_recovery_executes_once() {
        // Schedule whose slot passed ten minutes ago; last fire a day ago.
        let slot = chrono::Local::now() - chrono::Duration::minutes(10);
        let time = slot.format("%H:%M").to_string();
        let rig = rig(vec![schedule("a", &time)], MockBackend::ok(), false);

        let store = StateStore::new(&rig.dir.path().join("state"));
        let mut state = HashMap::new();
        state.insert("a".to_string(), Utc::now() - chrono::Duration::days(1));
        store.save(&state);

        rig.engine.start();
        rig.engine.check_missed_fires().await;

        let history = rig.engine.history();
        assert_eq!(history.len(), 1, "exactly one delayed fire");
        assert!(history[0].success);

        // Re-armed to a future occurrence.
        let times = rig.engine.next_fire_times();
        assert_eq!(times.len(), 1);
        assert!(times[0].1 > Utc::now());

        // The catch-up updated last-execution; a second pass is a no-op.
        rig.engine.check_missed_fires().await;
        assert_eq!(rig.engine.history().len(), 1);
    }

    #[tokio::test]
    async fn test_no_recovery_without_recorded_last_fire() {
        let slot = chrono::Local::now() - chrono::Duration::minutes(10);
        let time = slot.format("%H:%M").to_string();
        let rig = rig(vec![schedule("a", &time)], MockBackend::ok(), false);

        rig.engine.start();
        rig.engine.check_missed_fires().await;
        assert!(rig.engine.history().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_persists_state() {
        let rig = rig(vec![schedule("a", "09:00")], MockBackend::ok(), false);
        rig.engine.execute_now("a").await.unwrap();

        assert!(rig.engine.last_execution("a").is_some());
        let store = StateStore::new(&rig.dir.path().join("state"));
        assert!(store.load().contains_key("a"));
    }
}
