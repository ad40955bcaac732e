use std::collections::HashMap;

use tokio::{runtime::Handle, task::AbortHandle, time::Instant};

/// The independent deadlines a creative can have pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum DeadlineKind {
    Reward,
    PostReward,
}

/// One-shot deadlines, at most one per [`DeadlineKind`], that are cancelable as a unit.
///
/// Every armed deadline gets a fresh token. The callback receives it and must call
/// [`disarm`](Self::disarm) before acting: a deadline that was canceled or re-armed while its
/// callback was waiting for a lock is then recognized as stale.
///
/// Dropping the timers cancels everything that is still pending.
pub(crate) struct DeadlineTimers {
    runtime: Handle,
    next_token: u64,
    armed: HashMap<DeadlineKind, (u64, AbortHandle)>,
}

impl DeadlineTimers {
    pub(crate) fn new(runtime: Handle) -> DeadlineTimers {
        DeadlineTimers {
            runtime,
            next_token: 0,
            armed: HashMap::new(),
        }
    }

    /// Arm `kind` to call `on_fire` at `deadline`, replacing a deadline of the same kind. A
    /// deadline in the past fires as soon as the runtime gets to it.
    pub(crate) fn arm(
        &mut self,
        kind: DeadlineKind,
        deadline: Instant,
        on_fire: impl FnOnce(u64) + Send + 'static,
    ) -> u64 {
        self.cancel(kind);

        self.next_token += 1;
        let token = self.next_token;
        let task = self.runtime.spawn(async move {
            tokio::time::sleep_until(deadline).await;
            on_fire(token);
        });
        self.armed.insert(kind, (token, task.abort_handle()));
        token
    }

    /// Consume the deadline of `kind` if `token` is the one currently armed. Returns `false` for
    /// stale tokens.
    pub(crate) fn disarm(&mut self, kind: DeadlineKind, token: u64) -> bool {
        match self.armed.get(&kind) {
            Some((armed, _)) if *armed == token => {
                self.armed.remove(&kind);
                true
            }
            _ => false,
        }
    }

    pub(crate) fn cancel(&mut self, kind: DeadlineKind) {
        if let Some((_, task)) = self.armed.remove(&kind) {
            task.abort();
        }
    }

    pub(crate) fn cancel_all(&mut self) {
        for (_, (_, task)) in self.armed.drain() {
            task.abort();
        }
    }

    #[cfg(test)]
    pub(crate) fn is_armed(&self, kind: DeadlineKind) -> bool {
        self.armed.contains_key(&kind)
    }
}

impl Drop for DeadlineTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use std::{
        sync::{Arc, Mutex},
        time::Duration,
    };

    use tokio::{runtime::Handle, time::Instant};

    use super::*;

    type Fired = Arc<Mutex<Vec<(DeadlineKind, u64)>>>;

    fn record(fired: &Fired, kind: DeadlineKind) -> impl FnOnce(u64) + Send + 'static {
        let fired = Arc::clone(fired);
        move |token| fired.lock().unwrap().push((kind, token))
    }

    #[tokio::test(start_paused = true)]
    async fn fires_at_deadline() {
        let mut timers = DeadlineTimers::new(Handle::current());
        let fired = Fired::default();
        let start = Instant::now();

        let token = timers.arm(
            DeadlineKind::Reward,
            start + Duration::from_secs(2),
            record(&fired, DeadlineKind::Reward),
        );
        tokio::time::sleep(Duration::from_millis(1900)).await;
        assert!(fired.lock().unwrap().is_empty());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(*fired.lock().unwrap(), vec![(DeadlineKind::Reward, token)]);
        assert!(timers.disarm(DeadlineKind::Reward, token));
        assert!(!timers.is_armed(DeadlineKind::Reward));
    }

    #[tokio::test(start_paused = true)]
    async fn rearming_replaces_deadline() {
        let mut timers = DeadlineTimers::new(Handle::current());
        let fired = Fired::default();
        let start = Instant::now();

        let first = timers.arm(
            DeadlineKind::Reward,
            start + Duration::from_secs(1),
            record(&fired, DeadlineKind::Reward),
        );
        let second = timers.arm(
            DeadlineKind::Reward,
            start + Duration::from_secs(3),
            record(&fired, DeadlineKind::Reward),
        );
        tokio::time::sleep(Duration::from_secs(4)).await;

        assert_eq!(*fired.lock().unwrap(), vec![(DeadlineKind::Reward, second)]);
        assert!(!timers.disarm(DeadlineKind::Reward, first));
        assert!(timers.disarm(DeadlineKind::Reward, second));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_all_and_drop_stop_everything() {
        let mut timers = DeadlineTimers::new(Handle::current());
        let fired = Fired::default();
        let deadline = Instant::now() + Duration::from_secs(1);

        timers.arm(DeadlineKind::Reward, deadline, record(&fired, DeadlineKind::Reward));
        timers.arm(DeadlineKind::PostReward, deadline, record(&fired, DeadlineKind::PostReward));
        timers.cancel_all();
        assert!(!timers.is_armed(DeadlineKind::PostReward));

        timers.arm(DeadlineKind::Reward, deadline, record(&fired, DeadlineKind::Reward));
        drop(timers);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert!(fired.lock().unwrap().is_empty());
    }
}
