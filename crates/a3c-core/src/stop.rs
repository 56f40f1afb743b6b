// Stopping is signalled by disconnecting the channel, so every cloned token observes it and
// nothing is ever consumed from it.

use crossbeam::channel::{Receiver, RecvTimeoutError, Sender, TryRecvError, bounded};
use std::time::Duration;

pub struct StopSource {
    _tx: Sender<()>,
}

impl StopSource {
    pub fn stop(self) {}
}

#[derive(Debug, Clone)]
pub struct StopToken {
    rx: Receiver<()>,
}

pub fn stop_channel() -> (StopSource, StopToken) {
    let (tx, rx) = bounded(0);
    (StopSource { _tx: tx }, StopToken { rx })
}

impl StopToken {
    /// A token that never fires.
    pub fn never() -> Self {
        let (source, token) = stop_channel();
        std::mem::forget(source);
        token
    }

    pub fn is_stopped(&self) -> bool {
        matches!(self.rx.try_recv(), Err(TryRecvError::Disconnected))
    }

    /// Blocks for at most `timeout`. Returns true when stopped.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        !matches!(self.rx.recv_timeout(timeout), Err(RecvTimeoutError::Timeout))
    }
}
