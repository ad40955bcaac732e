//! A cooperative polling scheduler that invokes a callback at a fixed interval on a tokio runtime.
use std::{
    sync::{Arc, Mutex, PoisonError},
    time::Duration,
};

use tokio::{runtime::Handle, task::AbortHandle};

/// Repeatedly invokes a tick callback while active.
///
/// Ticks never overlap: the next tick is armed only after the current callback returns, so a
/// slow callback delays the cadence instead of stacking up invocations. Once [`stop`] returns, no
/// new tick starts. A tick that was already running when `stop()` was called is allowed to
/// finish but does not re-arm.
///
/// Dropping the scheduler stops it.
///
/// [`stop`]: PollingScheduler::stop
pub struct PollingScheduler {
    runtime: Handle,
    state: Arc<Mutex<SchedulerState>>,
}

#[derive(Default)]
struct SchedulerState {
    /// Incremented on every `stop()`. A tick loop only runs while the generation it was spawned
    /// with is still current.
    generation: u64,
    task: Option<AbortHandle>,
}

impl PollingScheduler {
    /// Create a stopped scheduler that spawns its tick loop on `runtime`.
    pub fn new(runtime: Handle) -> PollingScheduler {
        PollingScheduler {
            runtime,
            state: Arc::new(Mutex::new(SchedulerState::default())),
        }
    }

    /// Start invoking `on_tick` every `interval`. The first tick happens one `interval` after
    /// this call.
    ///
    /// Starting an already running scheduler is a no-op.
    pub fn start(&self, interval: Duration, mut on_tick: impl FnMut() + Send + 'static) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.task.is_some() {
            log::debug!(target: "adtrack", "polling scheduler is already running");
            return;
        }

        let generation = state.generation;
        let shared = Arc::clone(&self.state);
        let task = self.runtime.spawn(async move {
            loop {
                tokio::time::sleep(interval).await;
                if !is_current(&shared, generation) {
                    return;
                }
                on_tick();
                // The callback may have stopped us; don't re-arm in that case.
                if !is_current(&shared, generation) {
                    return;
                }
            }
        });
        state.task = Some(task.abort_handle());
    }

    /// Stop the scheduler. Idempotent, and safe to call from within the tick callback or from a
    /// different thread than the one running ticks.
    pub fn stop(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.generation = state.generation.wrapping_add(1);
        if let Some(task) = state.task.take() {
            log::trace!(target: "adtrack", "stopping polling scheduler");
            task.abort();
        }
    }

    /// Whether the scheduler is running.
    pub fn is_running(&self) -> bool {
        self.state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .task
            .is_some()
    }
}

impl Drop for PollingScheduler {
    fn drop(&mut self) {
        self.stop();
    }
}

fn is_current(state: &Mutex<SchedulerState>, generation: u64) -> bool {
    state.lock().unwrap_or_else(PoisonError::into_inner).generation == generation
}
