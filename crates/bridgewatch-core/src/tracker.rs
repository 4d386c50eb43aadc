// ── Tracker session ──
//
// Keeps the device tracking stream alive. The session runs one
// background task: open stream, forward change sets, and on end or
// error wait out the backoff delay before trying again.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use futures_util::StreamExt;
use serde::Serialize;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bridge::{BridgeClient, ChangeSet, DeviceEntry};
use crate::config::BackoffConfig;

/// Lifecycle of the tracking stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, strum::Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum SessionState {
    Stopped,
    Starting,
    Running,
    /// Waiting for the restart timer.
    Backoff,
}

/// What the session hands to the reconciliation task.
#[derive(Debug, Clone)]
pub enum TrackerEvent {
    /// Devices attached when the stream came up.
    Listed(Vec<DeviceEntry>),
    Changes(ChangeSet),
}

// ── Backoff ─────────────────────────────────────────────────────────

/// Restart delay with a single pending-timer slot.
#[derive(Debug)]
pub(crate) struct Backoff {
    config: BackoffConfig,
    current: Duration,
    pending: bool,
}

impl Backoff {
    pub(crate) fn new(config: BackoffConfig) -> Self {
        Self {
            current: config.initial_delay,
            config,
            pending: false,
        }
    }

    /// Claim the timer slot and return the delay to wait. Only the
    /// session's single task arms, so the slot is always free here.
    pub(crate) fn arm(&mut self) -> Duration {
        debug_assert!(!self.pending, "restart timer armed twice");
        self.pending = true;
        self.current
    }

    /// The timer elapsed: release the slot and grow the next delay.
    pub(crate) fn fire(&mut self) {
        self.pending = false;
        let factor = self.config.multiplier.max(1.0);
        let next = Duration::try_from_secs_f64(self.current.as_secs_f64() * factor)
            .unwrap_or(Duration::MAX);
        self.current = match self.config.max_delay {
            Some(cap) => next.min(cap),
            None => next,
        };
    }

    pub(crate) fn reset(&mut self) {
        self.current = self.config.initial_delay;
    }

    pub(crate) fn cancel(&mut self) {
        self.pending = false;
    }

    pub(crate) fn is_pending(&self) -> bool {
        self.pending
    }

    pub(crate) fn current(&self) -> Duration {
        self.current
    }
}

// ── TrackerSession ──────────────────────────────────────────────────

/// Handle to the tracking stream lifecycle.
pub struct TrackerSession {
    inner: Arc<Inner>,
}

struct Inner {
    client: Arc<dyn BridgeClient>,
    events: mpsc::UnboundedSender<TrackerEvent>,
    state: watch::Sender<SessionState>,
    backoff: Mutex<Backoff>,
    run: Mutex<Option<RunHandle>>,
}

struct RunHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl TrackerSession {
    pub fn new(
        client: Arc<dyn BridgeClient>,
        backoff: BackoffConfig,
        events: mpsc::UnboundedSender<TrackerEvent>,
    ) -> Self {
        let (state, _) = watch::channel(SessionState::Stopped);
        Self {
            inner: Arc::new(Inner {
                client,
                events,
                state,
                backoff: Mutex::new(Backoff::new(backoff)),
                run: Mutex::new(None),
            }),
        }
    }

    /// Start tracking. A no-op while a session task is alive, whether it
    /// is running or waiting out a backoff timer.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(&self) {
        let mut run = lock(&self.inner.run);
        if run.as_ref().is_some_and(|r| !r.task.is_finished()) {
            debug!("device tracker already active");
            return;
        }

        {
            let mut backoff = lock(&self.inner.backoff);
            backoff.cancel();
            backoff.reset();
        }
        let cancel = CancellationToken::new();
        let task = tokio::spawn(run_loop(Arc::clone(&self.inner), cancel.clone()));
        *run = Some(RunHandle { cancel, task });
    }

    /// Detach and end the stream. The session is `Stopped` on return.
    pub fn stop(&self) {
        if let Some(run) = lock(&self.inner.run).take() {
            run.cancel.cancel();
            run.task.abort();
        }
        lock(&self.inner.backoff).cancel();
        self.inner.state.send_replace(SessionState::Stopped);
        debug!("device tracker stopped");
    }

    pub fn state(&self) -> SessionState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<SessionState> {
        self.inner.state.subscribe()
    }

    /// Delay the next restart would wait.
    pub fn next_delay(&self) -> Duration {
        lock(&self.inner.backoff).current()
    }
}

impl Inner {
    /// Publish `state` unless the task owning `cancel` was stopped.
    ///
    /// The check runs under the watch lock and `stop()` cancels before it
    /// publishes `Stopped`, so a dying task never overwrites `Stopped`.
    fn set_state(&self, cancel: &CancellationToken, state: SessionState) -> bool {
        self.state.send_if_modified(|current| {
            if cancel.is_cancelled() {
                return false;
            }
            *current = state;
            true
        })
    }

    /// Arm the restart timer unless the task owning `cancel` was stopped.
    fn arm(&self, cancel: &CancellationToken) -> Option<Duration> {
        let mut backoff = lock(&self.backoff);
        if cancel.is_cancelled() {
            return None;
        }
        Some(backoff.arm())
    }
}

// ── Background loop ─────────────────────────────────────────────────

/// open stream → list → forward changes → on end or error, back off.
async fn run_loop(inner: Arc<Inner>, cancel: CancellationToken) {
    loop {
        if !inner.set_state(&cancel, SessionState::Starting) {
            return;
        }

        let opened = tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            result = inner.client.track_devices() => result,
        };

        match opened {
            Ok(mut stream) => {
                if !inner.set_state(&cancel, SessionState::Running) {
                    return;
                }
                lock(&inner.backoff).reset();
                info!("device tracker running");

                let listed = tokio::select! {
                    biased;
                    () = cancel.cancelled() => return,
                    result = inner.client.list_devices() => result,
                };
                match listed {
                    Ok(devices) => {
                        if inner.events.send(TrackerEvent::Listed(devices)).is_err() {
                            debug!("tracker event receiver dropped, exiting");
                            return;
                        }
                    }
                    Err(e) => warn!(error = %e, "initial device listing failed"),
                }

                loop {
                    let item = tokio::select! {
                        biased;
                        () = cancel.cancelled() => return,
                        item = stream.next() => item,
                    };
                    match item {
                        Some(Ok(changes)) => {
                            debug!(
                                added = changes.added.len(),
                                removed = changes.removed.len(),
                                changed = changes.changed.len(),
                                "device changes"
                            );
                            if inner.events.send(TrackerEvent::Changes(changes)).is_err() {
                                debug!("tracker event receiver dropped, exiting");
                                return;
                            }
                        }
                        Some(Err(e)) => {
                            warn!(error = %e, "device tracker failed");
                            break;
                        }
                        None => {
                            info!("device tracker stream ended");
                            break;
                        }
                    }
                }
            }
            Err(e) => warn!(error = %e, "could not start device tracker"),
        }

        let Some(delay) = inner.arm(&cancel) else {
            return;
        };
        if !inner.set_state(&cancel, SessionState::Backoff) {
            return;
        }
        info!(
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            "restarting device tracker after backoff"
        );

        tokio::select! {
            biased;
            () = cancel.cancelled() => return,
            () = tokio::time::sleep(delay) => {}
        }
        lock(&inner.backoff).fire();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::testing::FakeBridge;

    fn ms(n: u64) -> Duration {
        Duration::from_millis(n)
    }

    async fn sleep_ms(n: u64) {
        tokio::time::sleep(ms(n)).await;
    }

    fn session(bridge: &Arc<FakeBridge>) -> (TrackerSession, mpsc::UnboundedReceiver<TrackerEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let client: Arc<dyn BridgeClient> = bridge.clone();
        (TrackerSession::new(client, BackoffConfig::default(), tx), rx)
    }

    #[test]
    fn backoff_holds_a_single_timer() {
        let mut backoff = Backoff::new(BackoffConfig::default());
        assert_eq!(backoff.arm(), ms(1000));
        assert!(backoff.is_pending());

        backoff.fire();
        assert!(!backoff.is_pending());
        assert_eq!(backoff.current(), ms(1200));
        assert_eq!(backoff.arm(), ms(1200));
    }

    #[test]
    fn backoff_respects_cap_and_reset() {
        let mut backoff = Backoff::new(BackoffConfig {
            initial_delay: ms(1000),
            multiplier: 2.0,
            max_delay: Some(ms(3000)),
        });
        for _ in 0..5 {
            backoff.arm();
            backoff.fire();
        }
        assert_eq!(backoff.current(), ms(3000));

        backoff.reset();
        assert_eq!(backoff.current(), ms(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_starts_retry_with_growing_delay() {
        let bridge = Arc::new(FakeBridge::default());
        let (session, _rx) = session(&bridge);

        session.start();
        sleep_ms(10).await;
        assert_eq!(bridge.track_calls(), 1);
        assert_eq!(session.state(), SessionState::Backoff);

        sleep_ms(989).await; // t = 999
        assert_eq!(bridge.track_calls(), 1);
        sleep_ms(2).await; // t = 1001
        assert_eq!(bridge.track_calls(), 2);

        sleep_ms(1198).await; // t = 2199
        assert_eq!(bridge.track_calls(), 2);
        sleep_ms(2).await; // t = 2201
        assert_eq!(bridge.track_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn start_is_a_no_op_while_backing_off() {
        let bridge = Arc::new(FakeBridge::default());
        let (session, _rx) = session(&bridge);

        session.start();
        sleep_ms(10).await;
        session.start();
        session.start();
        sleep_ms(10).await;

        assert_eq!(bridge.track_calls(), 1);
        assert_eq!(session.state(), SessionState::Backoff);
    }

    #[tokio::test(start_paused = true)]
    async fn running_resets_backoff_and_lists_devices() {
        let bridge = Arc::new(FakeBridge::default());
        bridge.set_listed(vec![DeviceEntry::new("emulator-5554", "device")]);
        bridge.push_failure();
        let feed = bridge.push_stream();
        let (session, mut rx) = session(&bridge);

        session.start();
        sleep_ms(1010).await;
        assert_eq!(bridge.track_calls(), 2);
        assert_eq!(session.state(), SessionState::Running);
        assert_eq!(session.next_delay(), ms(1000));

        match rx.recv().await.unwrap() {
            TrackerEvent::Listed(devices) => {
                assert_eq!(devices, vec![DeviceEntry::new("emulator-5554", "device")]);
            }
            other => panic!("expected listing, got {other:?}"),
        }

        let changes = ChangeSet {
            added: vec![DeviceEntry::new("10.0.0.5:5555", "device")],
            ..ChangeSet::default()
        };
        feed.send(Ok(changes.clone())).unwrap();
        match rx.recv().await.unwrap() {
            TrackerEvent::Changes(got) => assert_eq!(got, changes),
            other => panic!("expected changes, got {other:?}"),
        }

        // Stream end schedules a restart at the base delay.
        drop(feed);
        sleep_ms(10).await; // t = 1020
        assert_eq!(session.state(), SessionState::Backoff);
        sleep_ms(980).await; // t = 2000
        assert_eq!(bridge.track_calls(), 2);
        sleep_ms(20).await; // t = 2030
        assert_eq!(bridge.track_calls(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn stop_cancels_pending_restart() {
        let bridge = Arc::new(FakeBridge::default());
        let (session, _rx) = session(&bridge);

        session.start();
        sleep_ms(10).await;
        session.stop();
        assert_eq!(session.state(), SessionState::Stopped);

        sleep_ms(10_000).await;
        assert_eq!(bridge.track_calls(), 1);

        session.start();
        sleep_ms(10).await;
        assert_eq!(bridge.track_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn start_clears_a_leftover_timer() {
        let bridge = Arc::new(FakeBridge::default());
        let (session, _rx) = session(&bridge);

        // A timer slot left claimed by a task that died mid-stop.
        lock(&session.inner.backoff).arm();
        lock(&session.inner.backoff).fire();
        lock(&session.inner.backoff).arm();

        session.start();
        sleep_ms(10).await;
        assert_eq!(bridge.track_calls(), 1);
        assert_eq!(session.state(), SessionState::Backoff);
        assert_eq!(session.next_delay(), ms(1000));

        sleep_ms(30_000).await;
        assert!(bridge.track_calls() > 2, "tracker never retried");
    }

    #[tokio::test]
    async fn cancelled_task_cannot_publish_state() {
        let bridge = Arc::new(FakeBridge::default());
        let (session, _rx) = session(&bridge);
        let cancel = CancellationToken::new();

        assert!(session.inner.set_state(&cancel, SessionState::Running));
        assert_eq!(session.state(), SessionState::Running);

        cancel.cancel();
        session.stop();
        assert!(!session.inner.set_state(&cancel, SessionState::Backoff));
        assert!(session.inner.arm(&cancel).is_none());
        assert_eq!(session.state(), SessionState::Stopped);
        assert!(!lock(&session.inner.backoff).is_pending());
    }
}
