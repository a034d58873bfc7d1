//! Stopping a decode between rounds.
//!
//! The decoder polls its token before each round and never inside a forward
//! pass, so a stopped call returns an error instead of a partially sampled grid.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use thiserror::Error;

/// Why a decode stopped before its terminal round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CancellationError {
    #[error("decoding was cancelled before round {round}")]
    Cancelled { round: usize },
    #[error("decoding deadline exceeded before round {round}")]
    DeadlineExceeded { round: usize },
}

/// Read side: a shared stop flag plus an optional wall-clock deadline.
#[derive(Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
    deadline: Option<Instant>,
}

/// Write side of a [`CancellationToken`]; cloning shares the same flag.
#[derive(Clone)]
pub struct CancellationHandle {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    /// A token paired with the handle that stops it.
    ///
    /// ```ignore
    /// let (token, handle) = CancellationToken::new();
    /// let decoder = MaskedDecoder::new(model).with_cancellation(token);
    /// handle.cancel(); // from any thread
    /// ```
    pub fn new() -> (Self, CancellationHandle) {
        let token = Self::default();
        let handle = CancellationHandle {
            flag: Arc::clone(&token.flag),
        };
        (token, handle)
    }

    /// No handle exists, so this only ever stops on a deadline.
    pub fn never() -> Self {
        Self::default()
    }

    pub fn already_cancelled() -> Self {
        Self {
            flag: Arc::new(AtomicBool::new(true)),
            deadline: None,
        }
    }

    /// Adds a deadline `timeout` from now; an earlier existing deadline wins.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        let candidate = Instant::now() + timeout;
        Self {
            deadline: Some(self.deadline.map_or(candidate, |d| d.min(candidate))),
            ..self
        }
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    #[inline]
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Polled before `round` starts.
    #[inline]
    pub fn check(&self, round: usize) -> Result<(), CancellationError> {
        if self.is_cancelled() {
            Err(CancellationError::Cancelled { round })
        } else if self.deadline.is_some_and(|d| Instant::now() >= d) {
            Err(CancellationError::DeadlineExceeded { round })
        } else {
            Ok(())
        }
    }
}

impl fmt::Debug for CancellationToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "CancellationToken(cancelled={}, deadline={:?})",
            self.is_cancelled(),
            self.deadline
        )
    }
}

impl CancellationHandle {
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

impl fmt::Debug for CancellationHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CancellationHandle(cancelled={})", self.is_cancelled())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_cancel_from_another_thread() {
        let (token, handle) = CancellationToken::new();
        let waiter = thread::spawn(move || {
            while !token.is_cancelled() {
                thread::sleep(Duration::from_millis(2));
            }
            token.check(3)
        });

        thread::sleep(Duration::from_millis(10));
        handle.cancel();
        assert_eq!(waiter.join().unwrap(), Err(CancellationError::Cancelled { round: 3 }));
    }

    #[test]
    fn test_constructors() {
        assert!(CancellationToken::never().check(0).is_ok());
        assert!(CancellationToken::default().check(9).is_ok());
        assert_eq!(
            CancellationToken::already_cancelled().check(1),
            Err(CancellationError::Cancelled { round: 1 })
        );
    }

    #[test]
    fn test_elapsed_deadline() {
        let token = CancellationToken::never().with_timeout(Duration::ZERO);
        assert_eq!(token.check(2), Err(CancellationError::DeadlineExceeded { round: 2 }));
    }

    #[test]
    fn test_earlier_deadline_is_kept() {
        let token = CancellationToken::never()
            .with_timeout(Duration::from_secs(1))
            .with_timeout(Duration::from_secs(3600));
        let left = token.deadline().unwrap().saturating_duration_since(Instant::now());
        assert!(left <= Duration::from_secs(1));
        assert!(token.check(0).is_ok());
    }

    #[test]
    fn test_cancel_twice_and_clones_share_flag() {
        let (token, handle) = CancellationToken::new();
        let copy = token.clone();
        handle.clone().cancel();
        handle.cancel();
        assert!(token.is_cancelled() && copy.is_cancelled());
        assert!(handle.is_cancelled());
    }
}
