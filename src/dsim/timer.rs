// Command watchdog timer
// One-shot, re-armable; the callback runs on the timer's own thread

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

type TimerCallback = Arc<dyn Fn() + Send + Sync>;

struct TimerState {
    deadline: Option<Instant>,
    callback: Option<TimerCallback>,
    shutdown: bool,
}

struct TimerShared {
    state: Mutex<TimerState>,
    cvar: Condvar,
}

impl TimerShared {
    fn lock(&self) -> MutexGuard<'_, TimerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Software stand-in for a kernel `timer_list`
pub struct CmdTimer {
    shared: Arc<TimerShared>,
    worker: Option<JoinHandle<()>>,
}

impl CmdTimer {
    pub fn new(name: &str) -> Self {
        let shared = Arc::new(TimerShared {
            state: Mutex::new(TimerState {
                deadline: None,
                callback: None,
                shutdown: false,
            }),
            cvar: Condvar::new(),
        });

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name(name.to_string())
            .spawn(move || Self::run(&worker_shared))
            .map_err(|e| log::error!("failed to spawn {} timer thread: {}", name, e))
            .ok();

        Self { shared, worker }
    }

    /// Set the expiry callback
    pub fn set_callback<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.shared.lock().callback = Some(Arc::new(callback));
    }

    /// Arm (or re-arm) the timer to fire once after `delay`
    pub fn start_once(&self, delay: Duration) {
        self.shared.lock().deadline = Some(Instant::now() + delay);
        self.shared.cvar.notify_all();
    }

    /// Disarm the timer. Returns true if it was pending.
    pub fn stop(&self) -> bool {
        let was_pending = self.shared.lock().deadline.take().is_some();
        self.shared.cvar.notify_all();
        was_pending
    }

    /// The timer is armed and has not fired yet
    pub fn is_active(&self) -> bool {
        self.shared.lock().deadline.is_some()
    }

    fn run(shared: &TimerShared) {
        let mut state = shared.lock();
        loop {
            if state.shutdown {
                break;
            }

            match state.deadline {
                None => {
                    state = shared.cvar.wait(state).unwrap_or_else(PoisonError::into_inner);
                }
                Some(deadline) => {
                    let now = Instant::now();
                    if now < deadline {
                        state = shared
                            .cvar
                            .wait_timeout(state, deadline - now)
                            .unwrap_or_else(PoisonError::into_inner)
                            .0;
                        continue;
                    }

                    state.deadline = None;
                    let callback = state.callback.clone();
                    drop(state);
                    if let Some(cb) = callback {
                        cb();
                    }
                    state = shared.lock();
                }
            }
        }
    }
}

impl Drop for CmdTimer {
    fn drop(&mut self) {
        self.shared.lock().shutdown = true;
        self.shared.cvar.notify_all();

        if let Some(worker) = self.worker.take() {
            // the last owner may be released from inside the callback
            if worker.thread().id() != thread::current().id() {
                let _ = worker.join();
            }
        }
    }
}
