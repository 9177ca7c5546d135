use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::TRACE_TARGET;

/// Observer of server lifecycle events. Notifications are synchronous, on
/// the thread where the event happened.
pub trait ServerListener: Send + Sync {
    fn connection_started(&self) {}
    fn connection_stopped(&self) {}
    fn server_stopped(&self) {}
}

/// A shared set of listeners. A panicking listener is logged and skipped;
/// it never fails the originating operation or starves later listeners.
#[derive(Clone, Default)]
pub struct Listeners {
    inner: Arc<RwLock<Vec<Arc<dyn ServerListener>>>>,
}

impl Listeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&self, listener: Arc<dyn ServerListener>) {
        self.inner.write().push(listener);
    }

    pub fn connection_started(&self) {
        self.notify("connection_started", |l| l.connection_started());
    }

    pub fn connection_stopped(&self) {
        self.notify("connection_stopped", |l| l.connection_stopped());
    }

    pub fn server_stopped(&self) {
        self.notify("server_stopped", |l| l.server_stopped());
    }

    fn notify(&self, event: &'static str, deliver: impl Fn(&dyn ServerListener)) {
        let listeners = self.inner.read().clone();
        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| deliver(listener.as_ref()))).is_err() {
                tracing::error!(target: TRACE_TARGET, event, "listener crashed");
            }
        }
    }
}
