use crate::error::TransportError;
use std::time::Duration;
use tokio::time;

/// Multiplicative backoff shared by every polling loop in the client.
#[derive(Clone, Debug)]
pub struct Backoff {
    next: Duration,
    multiplier: f64,
    cap: Duration,
}

impl Backoff {
    pub fn new(base: Duration, multiplier: f64, cap: Duration) -> Self {
        Self {
            next: base,
            multiplier,
            cap,
        }
    }

    /// The delay to sleep before the next attempt; grows multiplicatively
    /// up to the cap.
    pub fn next_delay(&mut self) -> Duration {
        let current = self.next;
        let grown = self.next.mul_f64(self.multiplier);
        self.next = grown.min(self.cap);
        current
    }
}

/// Race a remote call against a deadline.
///
/// The timeout is advisory: there is no abort channel to the backend, so the
/// underlying operation may still complete server-side. Callers must treat a
/// timeout as "unknown outcome", and every operation wrapped here must be
/// idempotent or duplicate-tolerant.
pub async fn advisory_timeout<T>(
    limit: Duration,
    host: &str,
    call: impl Future<Output = Result<T, TransportError>>,
) -> Result<T, TransportError> {
    match time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(TransportError::Timeout {
            host: host.to_string(),
        }),
    }
}
