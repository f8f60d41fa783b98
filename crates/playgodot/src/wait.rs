//! Polling until a condition holds.
//!
//! The waiters here know nothing about the protocol. They run a caller
//! supplied check repeatedly on the calling task until it succeeds or the
//! deadline passes. Errors that only mean "not yet" (see
//! [`Error::is_transient`]) keep the loop going; anything else ends it.

use std::future::Future;
use std::time::Duration;

use client::ClientError;
use serde_json::Value;
use tokio::time::Instant;

use crate::error::{Error, Result};

/// Shortest pause between two attempts.
const MIN_INTERVAL: Duration = Duration::from_millis(1);

/// Values a waiter can test for "truthiness".
///
/// Empty collections and strings, zero, `false`, `null` and `None` are not
/// truthy; everything else is.
pub trait Truthy {
    fn is_truthy(&self) -> bool;
}

impl Truthy for bool {
    fn is_truthy(&self) -> bool {
        *self
    }
}

impl Truthy for Value {
    fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|n| n != 0.0),
            Value::String(s) => !s.is_empty(),
            Value::Array(a) => !a.is_empty(),
            Value::Object(o) => !o.is_empty(),
        }
    }
}

impl<T: Truthy> Truthy for Option<T> {
    fn is_truthy(&self) -> bool {
        self.as_ref().is_some_and(Truthy::is_truthy)
    }
}

impl<T> Truthy for Vec<T> {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl Truthy for String {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

macro_rules! truthy_numbers {
    ($($ty:ty),*) => {
        $(
            impl Truthy for $ty {
                fn is_truthy(&self) -> bool {
                    *self != 0 as $ty
                }
            }
        )*
    };
}

truthy_numbers!(i32, i64, u32, u64, usize, f64);

/// Run `check` until it returns a truthy value, for at most `timeout`.
///
/// Returns the first truthy value. Fails with
/// [`ClientError::RequestTimeout`] naming `operation` when the deadline
/// passes, or with the first non-transient error `check` returns.
pub async fn wait_for<T, F, Fut>(
    operation: &str,
    timeout: Duration,
    interval: Duration,
    check: F,
) -> Result<T>
where
    T: Truthy,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    poll(operation, timeout, interval, check, |value: &T| value.is_truthy()).await
}

/// Run `check` until it returns a value equal to `expected`.
pub async fn wait_until_eq<T, F, Fut>(
    operation: &str,
    timeout: Duration,
    interval: Duration,
    expected: &T,
    check: F,
) -> Result<T>
where
    T: PartialEq,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    poll(operation, timeout, interval, check, |value: &T| value == expected).await
}

async fn poll<T, F, Fut>(
    operation: &str,
    timeout: Duration,
    interval: Duration,
    mut check: F,
    mut satisfied: impl FnMut(&T) -> bool,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let interval = interval.max(MIN_INTERVAL);
    let start = Instant::now();
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        // A slow check may overrun the deadline by at most one interval.
        let budget = timeout.saturating_sub(start.elapsed()).max(interval);
        let Ok(outcome) = tokio::time::timeout(budget, check()).await else {
            tracing::debug!(%operation, attempts, ?budget, "check did not finish in time");
            return Err(Error::Client(ClientError::RequestTimeout {
                operation: operation.to_string(),
                timeout,
            }));
        };
        match outcome {
            Ok(value) if satisfied(&value) => {
                tracing::debug!(%operation, attempts, elapsed = ?start.elapsed(), "condition met");
                return Ok(value);
            }
            Ok(_) => {}
            Err(e) if e.is_transient() => {
                tracing::trace!(%operation, error = %e, "condition not met yet");
            }
            Err(e) => return Err(e),
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            tracing::debug!(%operation, attempts, "condition not met before deadline");
            return Err(Error::Client(ClientError::RequestTimeout {
                operation: operation.to_string(),
                timeout,
            }));
        }

        // Never sleep past the deadline, so the last attempt happens on it.
        tokio::time::sleep(interval.min(timeout - elapsed)).await;
    }
}
