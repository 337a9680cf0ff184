//! Registry of supervisor instances plus the timer-driven pollers.
//!
//! The registry replaces hidden global state: the process entry point
//! owns one, hands out instance handles, and injects it into the pollers.
//! List scans hold the registry lock only while cloning handles, never
//! across device I/O. Each poller owns one thread that is shut down and
//! joined when the poller is dropped.

use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;
use std::time::Duration;

use crossbeam_channel as xch;

use crate::supervisor::ChargerSupervisor;

/// Period of the reported-capacity/tracker cycle.
pub const CAP_POLL_PERIOD: Duration = Duration::from_secs(15);
/// Re-check period while no instance needs polling; a platform with a
/// wake alarm would sleep instead and call [`SupervisorRegistry::poll_all`]
/// on wakeup.
const SUSPEND_RECHECK_MS: u64 = 60_000;

pub type SupervisorHandle = Arc<Mutex<ChargerSupervisor>>;

#[derive(Default)]
pub struct SupervisorRegistry {
    inner: Mutex<Vec<SupervisorHandle>>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<'_, T> {
    // A poisoned registry lock only means another poller panicked; the
    // protected data is still coherent for shutdown paths.
    m.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl SupervisorRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Wrap and register a supervisor, returning its shared handle.
    pub fn register(&self, supervisor: ChargerSupervisor) -> SupervisorHandle {
        let handle = Arc::new(Mutex::new(supervisor));
        lock(&self.inner).push(handle.clone());
        handle
    }

    fn handles(&self) -> Vec<SupervisorHandle> {
        lock(&self.inner).clone()
    }

    /// Run one monitor tick on every instance.
    pub fn poll_all(&self) {
        for handle in self.handles() {
            lock(&handle).monitor_tick();
        }
    }

    /// Run one capacity cycle on every instance.
    pub fn capacity_poll_all(&self) {
        for handle in self.handles() {
            lock(&handle).capacity_tick();
        }
    }

    /// Propagate suspend/resume to every instance.
    pub fn set_suspended(&self, suspended: bool) {
        for handle in self.handles() {
            lock(&handle).set_suspended(suspended);
        }
    }

    /// Minimum polling interval over the instances that currently need
    /// polling (or hold an emergency stop). `None` means the monitor can
    /// suspend entirely and rely on an external wake source.
    pub fn next_wakeup_ms(&self) -> Option<u64> {
        let mut min: Option<u64> = None;
        for handle in self.handles() {
            let mut sup = lock(&handle);
            let needs_poll =
                sup.is_polling_required() || sup.charging_state().emergency_stop.is_some();
            let interval = sup.polling_interval_ms();
            drop(sup);
            if !needs_poll || interval == 0 {
                continue;
            }
            min = Some(match min {
                Some(cur) => cur.min(interval),
                None => interval,
            });
        }
        min
    }
}

/// A timer-driven polling thread. Dropping the poller signals shutdown
/// and joins the thread.
pub struct Poller {
    stop_tx: Option<xch::Sender<()>>,
    join_handle: Option<thread::JoinHandle<()>>,
}

impl Poller {
    /// Monitor poller: ticks at the registry's computed wakeup interval,
    /// backing off while no instance requires polling.
    pub fn spawn_monitor(registry: Arc<SupervisorRegistry>) -> Self {
        let (stop_tx, stop_rx) = xch::bounded::<()>(0);
        let join_handle = thread::spawn(move || {
            loop {
                let wait_ms = registry.next_wakeup_ms().unwrap_or(SUSPEND_RECHECK_MS);
                match stop_rx.recv_timeout(Duration::from_millis(wait_ms)) {
                    Err(xch::RecvTimeoutError::Timeout) => registry.poll_all(),
                    // Disconnected or explicit stop: exit cleanly.
                    _ => break,
                }
            }
            tracing::trace!("monitor poller exiting");
        });
        Self {
            stop_tx: Some(stop_tx),
            join_handle: Some(join_handle),
        }
    }

    /// Capacity poller: fixed cadence, independent of the monitor.
    pub fn spawn_capacity(registry: Arc<SupervisorRegistry>, period: Duration) -> Self {
        let (stop_tx, stop_rx) = xch::bounded::<()>(0);
        let join_handle = thread::spawn(move || {
            loop {
                match stop_rx.recv_timeout(period) {
                    Err(xch::RecvTimeoutError::Timeout) => registry.capacity_poll_all(),
                    _ => break,
                }
            }
            tracing::trace!("capacity poller exiting");
        });
        Self {
            stop_tx: Some(stop_tx),
            join_handle: Some(join_handle),
        }
    }
}

impl Drop for Poller {
    fn drop(&mut self) {
        // Dropping the sender disconnects the channel; the thread sees it
        // at its next wakeup and exits.
        self.stop_tx.take();
        if let Some(handle) = self.join_handle.take() {
            match handle.join() {
                Ok(()) => tracing::trace!("poller thread joined"),
                Err(e) => tracing::warn!(?e, "poller thread panicked during shutdown"),
            }
        }
    }
}
