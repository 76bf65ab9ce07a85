//! Lifecycle-gated interval runner for pollers.
//!
//! Each poller gets one background task. While the app is active the task
//! performs an immediate check and then ticks on the poller's interval.
//! Leaving the active state drops the interval outright; coming back starts
//! a fresh immediate check and a new interval, with no catch-up of missed
//! ticks. Ticks of one poller never overlap since each is awaited inline.
//!
//! ## Usage
//!
//! ```ignore
//! let runner = PollerRunner::new(poller, gate.clone(), events_tx, cancel.child_token());
//! let handle = runner.spawn();
//! ```

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{mpsc, watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

/// Longest period a runner will schedule (one year).
const MAX_PERIOD: Duration = Duration::from_secs(365 * 24 * 60 * 60);
use tracing::{debug, info};

use crate::events::Event;
use crate::lifecycle::{AppState, LifecycleGate};

/// A unit of periodic background work.
#[async_trait]
pub trait Poller: Send + Sync + 'static {
    /// Stable name used in logs and events.
    fn name(&self) -> &'static str;

    /// Period between ticks while active.
    fn interval(&self) -> Duration;

    /// Called each time the app becomes active, before the immediate check.
    fn on_start(&self) {}

    /// Whether there is anything to poll. Idle pollers run no timer.
    fn has_work(&self) -> bool {
        true
    }

    /// Notified when an idle poller gains work.
    fn work_signal(&self) -> Option<Arc<Notify>> {
        None
    }

    /// Run one check. Failures are handled inside; only outcomes come back.
    async fn tick(&self, now: DateTime<Utc>) -> Vec<Event>;
}

enum Exit {
    Backgrounded,
    Cancelled,
}

/// Drives one [`Poller`] according to a [`LifecycleGate`].
pub struct PollerRunner<P> {
    poller: P,
    gate: LifecycleGate,
    events: mpsc::UnboundedSender<Event>,
    cancel: CancellationToken,
}

impl<P: Poller> PollerRunner<P> {
    pub fn new(
        poller: P,
        gate: LifecycleGate,
        events: mpsc::UnboundedSender<Event>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            poller,
            gate,
            events,
            cancel,
        }
    }

    /// Spawn the runner on the current tokio runtime.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(self.run())
    }

    /// Run until the cancellation token fires or the gate is dropped.
    pub async fn run(self) {
        let mut state_rx = self.gate.subscribe();
        loop {
            loop {
                let state = *state_rx.borrow_and_update();
                if state == AppState::Active {
                    break;
                }
                tokio::select! {
                    _ = self.cancel.cancelled() => return,
                    changed = state_rx.changed() => {
                        if changed.is_err() {
                            return;
                        }
                    }
                }
            }

            let exit = self.run_active(&mut state_rx).await;
            self.emit(Event::PollerStopped {
                poller: self.poller.name().to_string(),
                at: Utc::now(),
            });
            match exit {
                Exit::Backgrounded => info!(poller = self.poller.name(), "poller paused"),
                Exit::Cancelled => {
                    info!(poller = self.poller.name(), "poller stopped");
                    return;
                }
            }
        }
    }

    async fn run_active(&self, state_rx: &mut watch::Receiver<AppState>) -> Exit {
        let name = self.poller.name();
        let period = self.poller.interval().clamp(Duration::from_millis(1), MAX_PERIOD);
        let signal = self.poller.work_signal();

        // Work registered while in the background is covered by the immediate tick.
        clear_signal(signal.as_deref()).await;
        self.poller.on_start();
        info!(poller = name, period_ms = period.as_millis() as u64, "poller started");
        self.emit(Event::PollerStarted {
            poller: name.to_string(),
            at: Utc::now(),
        });

        self.tick_if_active().await;

        let mut interval: Option<Interval> = None;
        loop {
            if !self.poller.has_work() {
                interval = None;
            } else if interval.is_none() {
                interval = Some(new_interval(period));
            }

            tokio::select! {
                _ = self.cancel.cancelled() => return Exit::Cancelled,
                changed = state_rx.changed() => {
                    if changed.is_err() {
                        return Exit::Cancelled;
                    }
                    if *state_rx.borrow_and_update() != AppState::Active {
                        return Exit::Backgrounded;
                    }
                }
                _ = wait_for_signal(signal.as_deref()) => {
                    debug!(poller = name, "work signalled");
                    self.tick_if_active().await;
                    interval = None;
                }
                _ = next_tick(&mut interval) => {
                    self.tick_if_active().await;
                }
            }
        }
    }

    async fn tick_if_active(&self) {
        // The gate can flip between the timer firing and this check.
        if !self.gate.is_active() {
            debug!(poller = self.poller.name(), "skipping tick, app not active");
            return;
        }
        if !self.poller.has_work() {
            return;
        }
        let events = tokio::select! {
            _ = self.cancel.cancelled() => return,
            events = self.poller.tick(Utc::now()) => events,
        };
        for event in events {
            self.emit(event);
        }
    }

    fn emit(&self, event: Event) {
        // A dropped receiver only means nobody is listening.
        let _ = self.events.send(event);
    }
}

fn new_interval(period: Duration) -> Interval {
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    interval
}

async fn next_tick(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending::<()>().await,
    }
}

/// Consume a stored wake-up permit, if any, without waiting.
async fn clear_signal(signal: Option<&Notify>) {
    if let Some(notify) = signal {
        tokio::select! {
            biased;
            _ = notify.notified() => {}
            _ = std::future::ready(()) => {}
        }
    }
}

async fn wait_for_signal(signal: Option<&Notify>) {
    match signal {
        Some(notify) => notify.notified().await,
        None => std::future::pending::<()>().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[derive(Clone)]
    struct CountingPoller {
        ticks: Arc<AtomicUsize>,
        starts: Arc<AtomicUsize>,
        has_work: Arc<AtomicBool>,
        signal: Arc<Notify>,
    }

    impl CountingPoller {
        fn new(has_work: bool) -> Self {
            Self {
                ticks: Arc::new(AtomicUsize::new(0)),
                starts: Arc::new(AtomicUsize::new(0)),
                has_work: Arc::new(AtomicBool::new(has_work)),
                signal: Arc::new(Notify::new()),
            }
        }

        fn ticks(&self) -> usize {
            self.ticks.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl Poller for CountingPoller {
        fn name(&self) -> &'static str {
            "counting"
        }

        fn interval(&self) -> Duration {
            Duration::from_secs(60)
        }

        fn on_start(&self) {
            self.starts.fetch_add(1, Ordering::SeqCst);
        }

        fn has_work(&self) -> bool {
            self.has_work.load(Ordering::SeqCst)
        }

        fn work_signal(&self) -> Option<Arc<Notify>> {
            Some(self.signal.clone())
        }

        async fn tick(&self, _now: DateTime<Utc>) -> Vec<Event> {
            self.ticks.fetch_add(1, Ordering::SeqCst);
            Vec::new()
        }
    }

    fn spawn_runner(
        poller: &CountingPoller,
        gate: &LifecycleGate,
    ) -> (
        JoinHandle<()>,
        CancellationToken,
        mpsc::UnboundedReceiver<Event>,
    ) {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = PollerRunner::new(poller.clone(), gate.clone(), tx, cancel.clone()).spawn();
        (handle, cancel, rx)
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn immediate_check_then_interval() {
        let poller = CountingPoller::new(true);
        let gate = LifecycleGate::new(AppState::Active);
        let (_handle, cancel, _rx) = spawn_runner(&poller, &gate);

        settle().await;
        assert_eq!(poller.ticks(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(poller.ticks(), 2);

        tokio::time::sleep(Duration::from_secs(120)).await;
        assert_eq!(poller.ticks(), 4);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn background_cancels_timer_and_active_restarts() {
        let poller = CountingPoller::new(true);
        let gate = LifecycleGate::new(AppState::Active);
        let (_handle, cancel, mut rx) = spawn_runner(&poller, &gate);

        settle().await;
        assert_eq!(poller.ticks(), 1);

        gate.set(AppState::Background);
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(poller.ticks(), 1, "no work while backgrounded");

        gate.set(AppState::Active);
        settle().await;
        assert_eq!(poller.ticks(), 2, "fresh immediate check on return");
        assert_eq!(poller.starts.load(Ordering::SeqCst), 2);

        let mut kinds = Vec::new();
        while let Ok(event) = rx.try_recv() {
            kinds.push(match event {
                Event::PollerStarted { .. } => "started",
                Event::PollerStopped { .. } => "stopped",
                _ => "other",
            });
        }
        assert_eq!(kinds, vec!["started", "stopped", "started"]);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn starting_in_background_does_nothing() {
        let poller = CountingPoller::new(true);
        let gate = LifecycleGate::new(AppState::Background);
        let (_handle, cancel, _rx) = spawn_runner(&poller, &gate);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(poller.ticks(), 0);
        assert_eq!(poller.starts.load(Ordering::SeqCst), 0);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn idle_poller_waits_for_signal() {
        let poller = CountingPoller::new(false);
        let gate = LifecycleGate::new(AppState::Active);
        let (_handle, cancel, _rx) = spawn_runner(&poller, &gate);

        tokio::time::sleep(Duration::from_secs(300)).await;
        assert_eq!(poller.ticks(), 0);

        poller.has_work.store(true, Ordering::SeqCst);
        poller.signal.notify_one();
        settle().await;
        assert_eq!(poller.ticks(), 1);

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert_eq!(poller.ticks(), 2);

        poller.has_work.store(false, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(poller.ticks(), 2);
        cancel.cancel();
    }

    #[tokio::test(start_paused = true)]
    async fn work_signalled_in_background_ticks_once_on_return() {
        let poller = CountingPoller::new(false);
        let gate = LifecycleGate::new(AppState::Background);
        let (_handle, cancel, _rx) = spawn_runner(&poller, &gate);
        settle().await;

        poller.has_work.store(true, Ordering::SeqCst);
        poller.signal.notify_one();
        settle().await;
        assert_eq!(poller.ticks(), 0);

        gate.set(AppState::Active);
        settle().await;
        assert_eq!(poller.ticks(), 1, "stored wake-up folded into the immediate check");

        tokio::time::sleep(Duration::from_secs(59)).await;
        assert_eq!(poller.ticks(), 1);
        tokio::time::sleep(Duration::from_secs(1)).await;
        assert_eq!(poller.ticks(), 2);
        cancel.cancel();
    }

    struct SlowPoller;

    #[async_trait]
    impl Poller for SlowPoller {
        fn name(&self) -> &'static str {
            "slow"
        }

        fn interval(&self) -> Duration {
            Duration::MAX
        }

        async fn tick(&self, _now: DateTime<Utc>) -> Vec<Event> {
            Vec::new()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn oversized_interval_is_clamped() {
        let gate = LifecycleGate::new(AppState::Active);
        let (tx, mut rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = PollerRunner::new(SlowPoller, gate, tx, cancel.clone()).spawn();

        settle().await;
        assert!(matches!(rx.try_recv(), Ok(Event::PollerStarted { .. })));
        cancel.cancel();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_stops_runner() {
        let poller = CountingPoller::new(true);
        let gate = LifecycleGate::new(AppState::Active);
        let (handle, cancel, _rx) = spawn_runner(&poller, &gate);

        settle().await;
        cancel.cancel();
        handle.await.unwrap();

        tokio::time::sleep(Duration::from_secs(600)).await;
        assert_eq!(poller.ticks(), 1);
    }
}
