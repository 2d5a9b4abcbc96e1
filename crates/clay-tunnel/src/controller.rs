//! Tunnel session controller.
//!
//! Single authority for the session life cycle. The controller is an
//! actor: a [`TunnelHandle`] sends messages into one task that owns
//! `SessionState`, the `PendingApply` flags and the last-applied settings
//! snapshot. Engine callbacks and spawned settings applies feed the same
//! channel, so every state transition is totally ordered.

use std::sync::Arc;
use std::time::Duration;

use clay_engine::Engine;
use clay_room::TunnelOptions;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error, info, warn};

use crate::error::TunnelError;
use crate::host::TunnelHost;
use crate::settings::{NetworkSettingsSnapshot, desired_settings_for};

/// Settling delay absorbed before each steady-state reconciliation pass,
/// so bursts of engine notifications collapse into one apply.
pub const SETTLE_DELAY: Duration = Duration::from_millis(500);

/// Session life-cycle state. Exactly one per controller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Starting,
    Running,
    Stopping,
    /// Terminal for this attempt; only `reset` or a fresh controller
    /// leaves it.
    Failed(String),
}

impl SessionState {
    pub fn is_running(&self) -> bool {
        matches!(self, SessionState::Running)
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, SessionState::Failed(_))
    }
}

/// Debounce record for settings reconciliation. At most one per
/// controller; only the controller task touches it.
#[derive(Debug, Default)]
struct PendingApply {
    in_flight: bool,
    reapply_requested: bool,
}

enum Msg {
    Start {
        options: TunnelOptions,
        reply: oneshot::Sender<Result<(), TunnelError>>,
    },
    Stop {
        reply: oneshot::Sender<()>,
    },
    Reset {
        reply: oneshot::Sender<Result<(), TunnelError>>,
    },
    State {
        reply: oneshot::Sender<SessionState>,
    },
    UpdateOptions {
        options: TunnelOptions,
    },
    /// Spawned apply passes fetch the settings source with this after the
    /// settling delay, so updates landing inside the window are not lost.
    CurrentOptions {
        reply: oneshot::Sender<Option<TunnelOptions>>,
    },
    Reconcile,
    EngineStopped,
    ApplyFinished {
        outcome: Result<Option<NetworkSettingsSnapshot>, TunnelError>,
    },
    RunningInfo {
        reply: oneshot::Sender<Result<String, TunnelError>>,
    },
}

/// Cloneable handle to the controller task.
#[derive(Clone)]
pub struct TunnelHandle {
    tx: mpsc::UnboundedSender<Msg>,
}

impl TunnelHandle {
    /// Spawn a controller with the default settling delay.
    pub fn spawn<E, H>(engine: E, host: H) -> Self
    where
        E: Engine + 'static,
        H: TunnelHost + 'static,
    {
        Self::spawn_with_settle(engine, host, SETTLE_DELAY)
    }

    /// Spawn a controller with an explicit settling delay (tests shorten
    /// it).
    pub fn spawn_with_settle<E, H>(engine: E, host: H, settle: Duration) -> Self
    where
        E: Engine + 'static,
        H: TunnelHost + 'static,
    {
        let (tx, rx) = mpsc::unbounded_channel();
        let controller = Controller {
            engine: Arc::new(engine),
            host: Arc::new(host),
            tx: tx.clone(),
            state: SessionState::Idle,
            options: None,
            last_applied: None,
            pending: PendingApply::default(),
            pending_stop: Vec::new(),
            settle,
        };
        tokio::spawn(controller.run(rx));
        Self { tx }
    }

    /// Start the tunnel from a bare configuration document.
    ///
    /// Rejected with [`TunnelError::AlreadyRunning`] unless the session is
    /// `Idle`; never retried internally.
    pub async fn start(&self, config: &str) -> Result<(), TunnelError> {
        self.start_with(TunnelOptions {
            config: config.to_string(),
            ..Default::default()
        })
        .await
    }

    /// Start the tunnel from an options bundle (document plus explicit
    /// interface overrides).
    pub async fn start_with(&self, options: TunnelOptions) -> Result<(), TunnelError> {
        self.call(|reply| Msg::Start { options, reply }).await?
    }

    /// Stop the tunnel. Always succeeds from the caller's perspective;
    /// native stop errors are logged, not surfaced. Waits for any
    /// in-flight settings apply to reach a terminal outcome first.
    pub async fn stop(&self) -> Result<(), TunnelError> {
        self.call(|reply| Msg::Stop { reply }).await
    }

    /// Explicit `Failed → Idle` escape hatch. No-op from `Idle`; rejected
    /// while the session is active.
    pub async fn reset(&self) -> Result<(), TunnelError> {
        self.call(|reply| Msg::Reset { reply }).await?
    }

    pub async fn state(&self) -> Result<SessionState, TunnelError> {
        self.call(|reply| Msg::State { reply }).await
    }

    /// Replace the desired configuration source for future reconciliation
    /// passes. Does not restart the engine.
    pub fn update_config(&self, config: &str) {
        self.update_options(TunnelOptions {
            config: config.to_string(),
            ..Default::default()
        });
    }

    /// Replace the options bundle for future reconciliation passes.
    pub fn update_options(&self, options: TunnelOptions) {
        let _ = self.tx.send(Msg::UpdateOptions { options });
    }

    /// Request a settings-reconciliation pass (fire and forget).
    pub fn reconcile(&self) {
        let _ = self.tx.send(Msg::Reconcile);
    }

    /// Fetch the engine's running-info document.
    pub async fn running_info(&self) -> Result<String, TunnelError> {
        self.call(|reply| Msg::RunningInfo { reply }).await?
    }

    async fn call<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> Msg) -> Result<T, TunnelError> {
        let (reply, rx) = oneshot::channel();
        self.tx
            .send(make(reply))
            .map_err(|_| TunnelError::ControllerGone)?;
        rx.await.map_err(|_| TunnelError::ControllerGone)
    }
}

struct Controller<E, H> {
    engine: Arc<E>,
    host: Arc<H>,
    tx: mpsc::UnboundedSender<Msg>,
    state: SessionState,
    options: Option<TunnelOptions>,
    last_applied: Option<NetworkSettingsSnapshot>,
    pending: PendingApply,
    /// Stop callers parked behind an in-flight settings apply.
    pending_stop: Vec<oneshot::Sender<()>>,
    settle: Duration,
}

impl<E: Engine + 'static, H: TunnelHost + 'static> Controller<E, H> {
    async fn run(mut self, mut rx: mpsc::UnboundedReceiver<Msg>) {
        while let Some(msg) = rx.recv().await {
            match msg {
                Msg::Start { options, reply } => {
                    let _ = reply.send(self.handle_start(options).await);
                }
                Msg::Stop { reply } => self.handle_stop(reply),
                Msg::Reset { reply } => {
                    let _ = reply.send(self.handle_reset());
                }
                Msg::State { reply } => {
                    let _ = reply.send(self.state.clone());
                }
                Msg::UpdateOptions { options } => {
                    self.options = Some(options);
                }
                Msg::CurrentOptions { reply } => {
                    let _ = reply.send(self.options.clone());
                }
                Msg::Reconcile => self.handle_reconcile(),
                Msg::EngineStopped => self.handle_engine_stopped(),
                Msg::ApplyFinished { outcome } => self.handle_apply_finished(outcome),
                Msg::RunningInfo { reply } => {
                    let _ = reply.send(self.engine.running_info().map_err(TunnelError::from));
                }
            }
        }
    }

    /// `Idle → Starting → Running`, or `Failed` with rollback.
    async fn handle_start(&mut self, options: TunnelOptions) -> Result<(), TunnelError> {
        if self.state != SessionState::Idle {
            debug!(state = ?self.state, "start rejected: not idle");
            return Err(TunnelError::AlreadyRunning);
        }

        // Boundary check before any side effect: an unusable blob must
        // leave the engine untouched.
        clay_room::validate_config(&options.config)?;

        info!("starting tunnel session");
        self.state = SessionState::Starting;
        let config = options.config.clone();
        self.options = Some(options);

        if let Err(e) = self.engine.start(&config) {
            error!(error = %e, "engine start failed");
            self.state = SessionState::Failed(e.to_string());
            return Err(e.into());
        }

        self.register_callbacks();

        // Initial settings pass, inline on the controller task. The actor
        // is serialized, so no Reconcile can interleave here.
        match self.apply_pass_inline().await {
            Ok(()) => {
                self.state = SessionState::Running;
                info!("tunnel session running");
                Ok(())
            }
            Err(e) => {
                // Roll back the native start; the engine must not keep
                // forwarding into an interface the OS refused.
                error!(error = %e, "initial settings apply failed, rolling back engine");
                if let Err(stop_err) = self.engine.stop() {
                    warn!(error = %stop_err, "rollback stop failed");
                }
                self.state = SessionState::Failed(e.to_string());
                Err(e)
            }
        }
    }

    /// Re-registration replaces handlers, so this is idempotent across
    /// repeated starts.
    fn register_callbacks(&self) {
        let tx = self.tx.clone();
        if let Err(e) = self.engine.on_stop(Box::new(move || {
            // Engine thread: hand off, never touch controller state here.
            let _ = tx.send(Msg::EngineStopped);
        })) {
            warn!(error = %e, "stop callback registration failed");
        }

        let tx = self.tx.clone();
        if let Err(e) = self.engine.on_running_info(Box::new(move || {
            let _ = tx.send(Msg::Reconcile);
        })) {
            warn!(error = %e, "running-info callback registration failed");
        }
    }

    /// The settings apply used during `start`: no settling delay, runs to
    /// completion before the state machine advances.
    async fn apply_pass_inline(&mut self) -> Result<(), TunnelError> {
        let options = self
            .options
            .clone()
            .ok_or_else(|| TunnelError::Config("configuration is not set".into()))?;
        let snapshot = desired_settings_for(&options)?;

        self.host
            .apply_settings(&snapshot)
            .await
            .map_err(TunnelError::SettingsApply)?;
        forward_tun_fd(self.engine.as_ref(), self.host.as_ref())?;
        self.last_applied = Some(snapshot);
        Ok(())
    }

    fn handle_stop(&mut self, reply: oneshot::Sender<()>) {
        match self.state {
            SessionState::Running | SessionState::Starting => {}
            _ => {
                // Nothing to tear down; stop is best-effort and
                // idempotent from the caller's perspective.
                let _ = reply.send(());
                return;
            }
        }

        if self.pending.in_flight {
            // Tearing down under an outstanding apply could hand a tun fd
            // to a stopped instance; park until it terminates.
            debug!("stop deferred behind in-flight settings apply");
            self.pending.reapply_requested = false;
            self.pending_stop.push(reply);
            return;
        }

        self.teardown();
        let _ = reply.send(());
    }

    fn teardown(&mut self) {
        info!("stopping tunnel session");
        self.state = SessionState::Stopping;
        if let Err(e) = self.engine.stop() {
            // Logged, never surfaced: OS-level teardown completes
            // regardless of native cleanup.
            error!(error = %e, "engine stop failed");
        }
        self.state = SessionState::Idle;
        self.options = None;
        self.last_applied = None;
        self.pending = PendingApply::default();
        info!("tunnel session stopped");
    }

    fn handle_reset(&mut self) -> Result<(), TunnelError> {
        match self.state {
            SessionState::Failed(_) => {
                self.state = SessionState::Idle;
                self.options = None;
                self.last_applied = None;
                self.pending = PendingApply::default();
                Ok(())
            }
            SessionState::Idle => Ok(()),
            _ => Err(TunnelError::AlreadyRunning),
        }
    }

    fn handle_engine_stopped(&mut self) {
        match self.state {
            SessionState::Running | SessionState::Starting => {}
            // A stop we initiated; the callback is expected noise.
            _ => return,
        }

        let reason = self
            .engine
            .last_error()
            .unwrap_or_else(|| "engine stopped unexpectedly".to_string());
        error!(reason = %reason, "engine-originated stop");
        self.state = SessionState::Failed(reason);
    }

    /// Steady-state reconciliation entry: coalesce or begin a pass.
    fn handle_reconcile(&mut self) {
        if !self.state.is_running() {
            debug!(state = ?self.state, "reconcile ignored outside Running");
            return;
        }
        if self.pending.in_flight {
            // Last-writer-wins for the next pass's input; no queue.
            debug!("apply in flight, marking reapply");
            self.pending.reapply_requested = true;
            return;
        }
        self.begin_apply_pass();
    }

    /// Spawn one settings apply; its outcome comes back as a message so
    /// the controller stays responsive and the in-flight flag is
    /// observable.
    fn begin_apply_pass(&mut self) {
        self.pending.in_flight = true;

        let engine = self.engine.clone();
        let host = self.host.clone();
        let last_applied = self.last_applied.clone();
        let settle = self.settle;
        let tx = self.tx.clone();

        tokio::spawn(async move {
            // Absorb rapid successive notifications before reading the
            // desired settings.
            tokio::time::sleep(settle).await;

            // Fetch the settings source only now: an update landing during
            // the settling window must feed this pass, not the next one.
            let (reply, rx) = oneshot::channel();
            if tx.send(Msg::CurrentOptions { reply }).is_err() {
                return;
            }
            let Ok(options) = rx.await else {
                return;
            };

            let outcome = apply_pass(engine, host, options, last_applied).await;
            let _ = tx.send(Msg::ApplyFinished { outcome });
        });
    }

    fn handle_apply_finished(
        &mut self,
        outcome: Result<Option<NetworkSettingsSnapshot>, TunnelError>,
    ) {
        self.pending.in_flight = false;

        match outcome {
            // The snapshot only counts while the session is up; after an
            // engine-originated failure the interface it describes is gone.
            Ok(Some(snapshot)) if self.state.is_running() => {
                debug!("settings applied");
                self.last_applied = Some(snapshot);
            }
            Ok(Some(_)) => {
                debug!(state = ?self.state, "apply outcome discarded outside Running");
            }
            Ok(None) => {
                debug!("settings unchanged, apply skipped");
            }
            Err(e) => {
                // Surfaced to the pass's originator (the engine
                // notification); the session itself stays up.
                error!(error = %e, "settings reconciliation failed");
            }
        }

        if !self.pending_stop.is_empty() {
            let waiters = std::mem::take(&mut self.pending_stop);
            self.pending.reapply_requested = false;
            // Waiters were only parked from an active session; if the
            // engine failed in the meantime there is nothing to tear down.
            if matches!(self.state, SessionState::Running | SessionState::Starting) {
                self.teardown();
            }
            for waiter in waiters {
                let _ = waiter.send(());
            }
            return;
        }

        if self.pending.reapply_requested && self.state.is_running() {
            // Exactly one trailing pass, with the settings source current
            // now. The flag is cleared before the pass begins, bounding
            // the chain. A session no longer `Running` gets no trailing
            // pass: the stopped engine must never receive a descriptor.
            self.pending.reapply_requested = false;
            self.begin_apply_pass();
        } else {
            self.pending.reapply_requested = false;
        }
    }
}

/// One settings apply against the OS. `Ok(None)` means the desired
/// snapshot matched the last applied one and the OS call was skipped.
async fn apply_pass<E: Engine, H: TunnelHost>(
    engine: Arc<E>,
    host: Arc<H>,
    options: Option<TunnelOptions>,
    last_applied: Option<NetworkSettingsSnapshot>,
) -> Result<Option<NetworkSettingsSnapshot>, TunnelError> {
    let options = options.ok_or_else(|| TunnelError::Config("configuration is not set".into()))?;
    let snapshot = desired_settings_for(&options)?;

    if last_applied.as_ref() == Some(&snapshot) {
        return Ok(None);
    }

    host.apply_settings(&snapshot)
        .await
        .map_err(TunnelError::SettingsApply)?;
    forward_tun_fd(engine.as_ref(), host.as_ref())?;
    Ok(Some(snapshot))
}

/// Hand the tunnel descriptor to the engine after a successful apply.
///
/// No descriptor available is logged and tolerated; a failing set call is
/// a hard failure for the pass (the engine cannot forward packets).
fn forward_tun_fd<E: Engine, H: TunnelHost>(engine: &E, host: &H) -> Result<(), TunnelError> {
    match host.tun_fd() {
        Some(fd) => engine
            .set_tun_fd(fd)
            .map_err(|e| TunnelError::SettingsApply(format!("set tun fd {fd}: {e}"))),
        None => {
            error!("no tun fd available after settings apply");
            Ok(())
        }
    }
}
