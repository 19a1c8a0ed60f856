//! Input debouncing for rapidly changing values.
//!
//! A debounced stream emits the latest input value once the input has been
//! quiet for the configured delay. Every new value restarts the wait, so a
//! stream that never settles never emits. One timer is live per stream;
//! dropping the input half cancels any pending emission.

use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

/// Input half of a debounced stream
pub struct DebounceInput<T> {
    tx: mpsc::UnboundedSender<T>,
}

impl<T> DebounceInput<T> {
    /// Push a new raw value, restarting the settle timer
    pub fn send(&self, value: T) {
        // Send only fails when the debounce task is gone; nothing to do then
        let _ = self.tx.send(value);
    }
}

/// Create a debounced stream with the given settle delay.
///
/// Returns the input handle and the receiver of settled values.
pub fn debounce<T: Send + 'static>(
    delay: Duration,
) -> (DebounceInput<T>, mpsc::UnboundedReceiver<T>) {
    let (in_tx, mut in_rx) = mpsc::unbounded_channel();
    let (out_tx, out_rx) = mpsc::unbounded_channel();

    tokio::spawn(async move {
        let mut pending: Option<T> = None;
        let timer = tokio::time::sleep(Duration::ZERO);
        tokio::pin!(timer);

        loop {
            tokio::select! {
                received = in_rx.recv() => match received {
                    Some(value) => {
                        pending = Some(value);
                        timer.as_mut().reset(Instant::now() + delay);
                    }
                    // Input dropped: discard any pending value, never
                    // emit after the owner is gone
                    None => break,
                },
                _ = &mut timer, if pending.is_some() => {
                    if let Some(value) = pending.take() {
                        if out_tx.send(value).is_err() {
                            break;
                        }
                    }
                }
            }
        }
    });

    (DebounceInput { tx: in_tx }, out_rx)
}
