//! Process-wide last-resort error handler.
//!
//! Failures nothing else handled (escalated persistence errors, panics in
//! handlers) are logged and, after a short quiet period, turned into an
//! [`SignalKind::Unhandled`] signal so the resilience controller reconnects.
//! A burst of reports inside the quiet period produces a single signal.

use std::fmt::Display;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::runtime::Handle;
use tokio::task::JoinHandle;
use tracing::{error, warn};

use crate::resilience::{ConnectionSignal, SignalKind, SignalSender};

pub struct FallbackHandler {
    signals: SignalSender,
    debounce: Duration,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl FallbackHandler {
    pub fn new(signals: SignalSender, debounce: Duration) -> Self {
        Self {
            signals,
            debounce,
            pending: Mutex::new(None),
        }
    }

    /// Log an unhandled failure and schedule a debounced recovery signal
    pub fn report(&self, source: &str, failure: &dyn Display) {
        let message = format!("{source}: {failure}");
        error!(source, error = %failure, "Unhandled failure");

        let signal = ConnectionSignal::process_wide(SignalKind::Unhandled(message));

        let Ok(runtime) = Handle::try_current() else {
            // Outside the runtime there is nothing to debounce against
            let _ = self.signals.send(signal);
            return;
        };

        let mut pending = match self.pending.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(previous) = pending.take() {
            previous.abort();
        }

        let signals = self.signals.clone();
        let debounce = self.debounce;
        *pending = Some(runtime.spawn(async move {
            tokio::time::sleep(debounce).await;
            if signals.send(signal).is_err() {
                warn!("Resilience controller is gone, dropping recovery signal");
            }
        }));
    }
}

/// Route panics through the fallback handler, keeping the previous hook
pub fn install_panic_hook(handler: Arc<FallbackHandler>) {
    let previous = std::panic::take_hook();
    std::panic::set_hook(Box::new(move |info| {
        previous(info);
        handler.report("panic", info);
    }));
}
