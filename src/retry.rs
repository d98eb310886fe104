//! Bounded retry with exponential backoff. One `Retrier` per logical retry
//! site; counters are never shared between call sites.

use std::fmt;
use std::time::Duration;

const BASE_DELAY: Duration = Duration::from_secs(1);

/// Outcome of a retried operation that did not succeed.
#[derive(Debug)]
pub enum RetryError<E> {
    /// The retry budget ran out. Carries the last underlying error.
    Exhausted { attempts: u32, source: E },
    /// The operation failed with a non-retryable error; propagated as-is.
    Fatal(E),
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> E {
        match self {
            RetryError::Exhausted { source, .. } => source,
            RetryError::Fatal(e) => e,
        }
    }
}

impl<E: fmt::Display> fmt::Display for RetryError<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RetryError::Exhausted { attempts, source } => {
                write!(f, "{attempts} retry attempts exhausted: {source}")
            }
            RetryError::Fatal(e) => write!(f, "{e}"),
        }
    }
}

impl<E: fmt::Debug + fmt::Display> std::error::Error for RetryError<E> {}

/// Repeatedly invokes an operation until it succeeds or `max_attempts`
/// retries are spent. Blocking: the sleep suspends the calling thread.
pub struct Retrier {
    max_attempts: u32,
    attempt: u32,
    delay: Duration,
    sleeper: Box<dyn FnMut(Duration) + Send>,
}

impl Retrier {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            attempt: 1,
            delay: BASE_DELAY,
            sleeper: Box::new(std::thread::sleep),
        }
    }

    /// Replaces the sleep call, letting tests record the backoff schedule.
    pub fn with_sleeper(max_attempts: u32, sleeper: impl FnMut(Duration) + Send + 'static) -> Self {
        Self {
            max_attempts,
            attempt: 1,
            delay: BASE_DELAY,
            sleeper: Box::new(sleeper),
        }
    }

    /// Runs `op`. Failures for which `retryable` returns true are slept on
    /// and retried with a doubling delay; the first non-retryable failure is
    /// returned immediately without touching the counters. Success resets the
    /// counters so the next unrelated call starts fresh.
    pub fn run<T, E>(
        &mut self,
        mut op: impl FnMut() -> Result<T, E>,
        retryable: impl Fn(&E) -> bool,
    ) -> Result<T, RetryError<E>> {
        loop {
            match op() {
                Ok(value) => {
                    self.reset();
                    return Ok(value);
                }
                Err(err) if retryable(&err) => {
                    if self.attempt > self.max_attempts {
                        log::warn!("all {} attempts failed", self.max_attempts);
                        self.reset();
                        return Err(RetryError::Exhausted {
                            attempts: self.max_attempts,
                            source: err,
                        });
                    }
                    log::info!(
                        "attempt {}/{} failed, retrying in {:?}",
                        self.attempt,
                        self.max_attempts,
                        self.delay
                    );
                    (self.sleeper)(self.delay);
                    self.delay *= 2;
                    self.attempt += 1;
                }
                Err(err) => return Err(RetryError::Fatal(err)),
            }
        }
    }

    fn reset(&mut self) {
        self.attempt = 1;
        self.delay = BASE_DELAY;
    }
}
