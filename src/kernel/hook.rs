use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};

use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use super::session::Experiment;

/// Drains live experiments when the process is asked to terminate.
///
/// [`Experiment::start`] enrols every session in the global hook (unless
/// `handle_signals` is off) and starts its listener on first use. On Ctrl-C
/// or SIGTERM each enrolled worker is cancelled, its queue drained, and the
/// process exits with `128 + signal`.
#[derive(Debug, Default)]
pub struct TerminationHook {
    sessions: Mutex<Vec<Enrolled>>,
    listening: AtomicBool,
}

#[derive(Debug)]
struct Enrolled {
    experiment_id: String,
    cancel: CancellationToken,
    stopped: CancellationToken,
}

static GLOBAL: OnceLock<TerminationHook> = OnceLock::new();

impl TerminationHook {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn global() -> &'static TerminationHook {
        GLOBAL.get_or_init(TerminationHook::new)
    }

    pub fn enrol(&self, experiment: &Experiment) {
        let mut sessions = self.lock();
        sessions.retain(|s| !s.stopped.is_cancelled());
        sessions.push(Enrolled {
            experiment_id: experiment.id().to_string(),
            cancel: experiment.cancel_token(),
            stopped: experiment.stopped_token(),
        });
    }

    /// Enrolled experiments whose worker is still running.
    pub fn live(&self) -> usize {
        self.lock().iter().filter(|s| !s.stopped.is_cancelled()).count()
    }

    /// Cancels every enrolled worker and waits until each has drained.
    pub async fn drain(&self) {
        let sessions = std::mem::take(&mut *self.lock());
        for session in &sessions {
            session.cancel.cancel();
        }
        for session in sessions {
            session.stopped.cancelled().await;
            info!(experiment_id = %session.experiment_id, "experiment drained on termination");
        }
    }

    /// Waits for `signal`, drains, and hands the signal's output back.
    pub async fn drain_on<F: Future>(&self, signal: F) -> F::Output {
        let received = signal.await;
        self.drain().await;
        received
    }

    /// Spawns the signal listener on the current runtime, once. If that
    /// runtime goes away the next call spawns a new one.
    pub fn listen(&'static self) {
        if self.listening.swap(true, Ordering::SeqCst) {
            return;
        }
        tokio::spawn(async move {
            let _listening = Listening(&self.listening);
            let code = self.drain_on(termination_signal()).await;
            info!(code, "termination signal handled, exiting");
            std::process::exit(code);
        });
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Enrolled>> {
        self.sessions.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

struct Listening<'a>(&'a AtomicBool);

impl Drop for Listening<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Resolves with the exit status for whichever signal arrived first.
async fn termination_signal() -> i32 {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut terminate) => {
                return tokio::select! {
                    _ = interrupt() => 130,
                    _ = terminate.recv() => 143,
                };
            }
            Err(e) => warn!(error = %e, "unable to listen for SIGTERM"),
        }
    }

    interrupt().await;
    130
}

async fn interrupt() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "unable to listen for interrupt");
        std::future::pending::<()>().await;
    }
}
