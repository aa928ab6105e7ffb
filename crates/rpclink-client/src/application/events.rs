//! Observer lists for the client's public events.
//!
//! There is one fixed list per event kind.  Observers are called
//! synchronously, in registration order, on the client's driver task.
//!
//! | Event        | Fired when                                          |
//! |--------------|-----------------------------------------------------|
//! | `connection` | a link finished its handshake and is ready          |
//! | `closed`     | a link that was ready went down                     |
//! | `error`      | a non-fatal transport or broadcast fault occurred   |
//! | `close`      | the client shut down (exactly once)                 |

use std::sync::{Arc, Mutex};

use rpclink_core::ConnectionContext;

use crate::application::client::ClientError;

type ContextObserver = Arc<dyn Fn(&ConnectionContext) + Send + Sync>;
type ErrorObserver = Arc<dyn Fn(&ClientError, Option<&ConnectionContext>) + Send + Sync>;
type CloseObserver = Arc<dyn Fn() + Send + Sync>;

#[derive(Default)]
struct Observers {
    connection: Vec<ContextObserver>,
    closed: Vec<ContextObserver>,
    error: Vec<ErrorObserver>,
    close: Vec<CloseObserver>,
    released: bool,
}

/// Holds every registered observer for one client instance.
#[derive(Default)]
pub struct EventHub {
    observers: Mutex<Observers>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_connection<F>(&self, f: F)
    where
        F: Fn(&ConnectionContext) + Send + Sync + 'static,
    {
        self.register(|o| o.connection.push(Arc::new(f)));
    }

    pub fn on_closed<F>(&self, f: F)
    where
        F: Fn(&ConnectionContext) + Send + Sync + 'static,
    {
        self.register(|o| o.closed.push(Arc::new(f)));
    }

    pub fn on_error<F>(&self, f: F)
    where
        F: Fn(&ClientError, Option<&ConnectionContext>) + Send + Sync + 'static,
    {
        self.register(|o| o.error.push(Arc::new(f)));
    }

    pub fn on_close<F>(&self, f: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.register(|o| o.close.push(Arc::new(f)));
    }

    pub(crate) fn emit_connection(&self, context: &ConnectionContext) {
        for observer in self.snapshot(|o| o.connection.clone()) {
            observer(context);
        }
    }

    pub(crate) fn emit_closed(&self, context: &ConnectionContext) {
        for observer in self.snapshot(|o| o.closed.clone()) {
            observer(context);
        }
    }

    pub(crate) fn emit_error(&self, error: &ClientError, context: Option<&ConnectionContext>) {
        for observer in self.snapshot(|o| o.error.clone()) {
            observer(error, context);
        }
    }

    pub(crate) fn emit_close(&self) {
        for observer in self.snapshot(|o| o.close.clone()) {
            observer();
        }
    }

    /// Drops every observer.  Registrations made afterwards are ignored.
    pub(crate) fn release(&self) {
        let mut observers = self.lock();
        *observers = Observers {
            released: true,
            ..Observers::default()
        };
    }

    fn register(&self, add: impl FnOnce(&mut Observers)) {
        let mut observers = self.lock();
        if !observers.released {
            add(&mut observers);
        }
    }

    // Observers run without the lock held, so they may register further
    // observers without deadlocking.
    fn snapshot<T>(&self, pick: impl FnOnce(&Observers) -> Vec<T>) -> Vec<T> {
        pick(&self.lock())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Observers> {
        self.observers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
