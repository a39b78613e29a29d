use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::errors::TransportError;

/// Status and body of a completed GET.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: String,
}

impl HttpResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == 200
    }
}

/// Hexagonal port for the secured HTTP transport.
///
/// Implementations must report an elapsed deadline as
/// [`TransportError::Timeout`] and nothing else: the poll engine treats a
/// timeout as an empty long poll, while every other failure forces a session
/// renewal. Non-200 statuses are returned as a normal response.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str, timeout: Duration) -> Result<HttpResponse, TransportError>;
}

/// Local monotonic tick counter used by the drift clock.
///
/// Ticks are milliseconds from an arbitrary origin, held in a `u32` that
/// wraps to zero after about 49.7 days.
pub trait TickSource: Send + Sync {
    fn now_ms(&self) -> u32;
}

/// [`TickSource`] backed by [`Instant`].
#[derive(Clone, Copy, Debug)]
pub struct MonotonicTicks {
    origin: Instant,
}

impl MonotonicTicks {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTicks {
    fn default() -> Self {
        Self::new()
    }
}

impl TickSource for MonotonicTicks {
    fn now_ms(&self) -> u32 {
        // Truncation is the wrap.
        self.origin.elapsed().as_millis() as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn monotonic_ticks_advance() {
        let ticks = MonotonicTicks::new();
        let a = ticks.now_ms();
        std::thread::sleep(Duration::from_millis(5));
        let b = ticks.now_ms();
        assert!(b.wrapping_sub(a) >= 5);
    }

    #[test]
    fn only_200_is_ok() {
        assert!(HttpResponse::new(200, "{}").is_ok());
        assert!(!HttpResponse::new(204, "").is_ok());
        assert!(!HttpResponse::new(500, "oops").is_ok());
    }
}
