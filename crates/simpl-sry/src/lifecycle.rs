//! Teardown bookkeeping shared between a [`Sry`](crate::Sry) handle and the
//! process-wide signal handler.
//!
//! Each registration owns a [`Ledger`] holding what has to be undone when it
//! goes away: blocked senders to unblock, remote sessions to shut down and
//! FIFO paths to unlink. Release happens at most once no matter how many
//! paths (explicit close, drop, termination signal) race for it.

use std::sync::{Arc, Mutex, MutexGuard, Once, Weak};

use simpl_transport::{signal_path, FifoPaths, Signal, PROXY_SHUTDOWN};
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::tables::{BoundedTable, PendingSender, RemoteReceiver};

static LIVE: Mutex<Vec<Weak<Ledger>>> = Mutex::new(Vec::new());
static INSTALL: Once = Once::new();

#[derive(Debug)]
struct LedgerState {
    name: String,
    paths: FifoPaths,
    pending: BoundedTable<PendingSender>,
    remotes: BoundedTable<RemoteReceiver>,
}

/// Release obligations of one live registration.
#[derive(Debug)]
pub struct Ledger {
    state: Mutex<Option<LedgerState>>,
}

impl Ledger {
    /// Create a ledger and list it for signal-driven teardown.
    pub(crate) fn register(name: &str, paths: FifoPaths, capacity: usize) -> Arc<Self> {
        let ledger = Arc::new(Self {
            state: Mutex::new(Some(LedgerState {
                name: name.to_string(),
                paths,
                pending: BoundedTable::new("pending-reply", capacity),
                remotes: BoundedTable::new("remote-receiver", capacity),
            })),
        });
        let mut live = lock(&LIVE);
        live.retain(|weak| weak.strong_count() > 0);
        live.push(Arc::downgrade(&ledger));
        ledger
    }

    pub(crate) fn add_pending(&self, sender: PendingSender) -> Result<()> {
        match lock(&self.state).as_mut() {
            Some(state) => state.pending.insert(sender),
            None => Ok(()),
        }
    }

    pub(crate) fn remove_pending(&self, sender: &PendingSender) {
        if let Some(state) = lock(&self.state).as_mut() {
            state.pending.remove_where(|p| p == sender);
        }
    }

    pub(crate) fn add_remote(&self, remote: RemoteReceiver) -> Result<()> {
        match lock(&self.state).as_mut() {
            Some(state) => {
                if state.remotes.iter().any(|r| r == &remote) {
                    return Ok(());
                }
                state.remotes.insert(remote)
            }
            None => Ok(()),
        }
    }

    /// Number of senders currently awaiting a reply.
    pub fn pending_len(&self) -> usize {
        lock(&self.state).as_ref().map_or(0, |s| s.pending.len())
    }

    /// Number of remote sessions that will be told to shut down.
    pub fn remote_len(&self) -> usize {
        lock(&self.state).as_ref().map_or(0, |s| s.remotes.len())
    }

    pub fn is_released(&self) -> bool {
        lock(&self.state).is_none()
    }

    /// Unblock pending senders, shut down remote sessions and unlink the
    /// FIFOs. Returns `false` when the ledger was already released.
    pub fn release(&self) -> bool {
        self.release_with(|| {})
    }

    /// As [`release`](Self::release), running `close` after peers were
    /// notified and before the FIFOs are unlinked.
    pub(crate) fn release_with(&self, close: impl FnOnce()) -> bool {
        let Some(mut state) = lock(&self.state).take() else {
            return false;
        };

        for sender in state.pending.drain() {
            if let Err(err) = signal_path(&sender.reply_path, Signal::ReplyError) {
                debug!(sender = %sender.name, pid = sender.pid, error = %err, "could not unblock sender");
            }
        }
        for remote in state.remotes.drain() {
            let shutdown = Signal::Proxy(PROXY_SHUTDOWN);
            if let Err(err) = signal_path(&remote.receive_path, shutdown) {
                debug!(session = %remote.name, error = %err, "could not notify remote session");
            }
        }
        close();
        state.paths.remove();
        info!(name = %state.name, "released registration");
        true
    }
}

/// Release every live registration in this process.
///
/// Returns how many were released.
pub fn release_all() -> usize {
    let ledgers: Vec<Arc<Ledger>> = lock(&LIVE).iter().filter_map(Weak::upgrade).collect();
    ledgers.iter().filter(|ledger| ledger.release()).count()
}

/// Install a SIGINT/SIGTERM/SIGHUP handler that releases every live
/// registration and then exits the process.
///
/// Only the first call installs anything; a handler set elsewhere through
/// `ctrlc` makes this a logged no-op.
pub fn install_signal_teardown() {
    INSTALL.call_once(|| {
        let installed = ctrlc::set_handler(|| {
            let released = release_all();
            info!(released, "termination signal; exiting");
            std::process::exit(0);
        });
        if let Err(err) = installed {
            warn!(error = %err, "could not install termination handler");
        }
    });
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
