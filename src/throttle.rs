use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::trace;

/// Time gate around a single expensive call.
///
/// The wrapped call runs only when more than `interval` has passed since the
/// last actual invocation; otherwise the previously stored result is returned
/// unchanged. Before the first invocation the stored result is `T::default()`.
/// Each camera worker owns its own invoker.
#[derive(Debug)]
pub struct RateLimitedInvoker<T> {
    interval: Duration,
    last_invocation: Option<Instant>,
    last_result: T,
    invocations: u64,
}

impl<T: Default> RateLimitedInvoker<T> {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last_invocation: None,
            last_result: T::default(),
            invocations: 0,
        }
    }
}

impl<T> RateLimitedInvoker<T> {
    /// Number of times the wrapped call has actually run
    pub fn invocations(&self) -> u64 {
        self.invocations
    }

    /// Latest stored result, without invoking anything
    pub fn last_result(&self) -> &T {
        &self.last_result
    }

    /// Whether a call made at `now` would invoke the wrapped function
    pub fn is_due(&self, now: Instant) -> bool {
        match self.last_invocation {
            None => true,
            Some(last) => now.saturating_duration_since(last) > self.interval,
        }
    }

    pub fn call<F>(&mut self, f: F) -> &T
    where
        F: FnOnce() -> T,
    {
        self.call_at(Instant::now(), f)
    }

    pub fn call_at<F>(&mut self, now: Instant, f: F) -> &T
    where
        F: FnOnce() -> T,
    {
        if self.is_due(now) {
            self.store(now, f());
        } else {
            trace!("Rate gate closed, returning cached result");
        }
        &self.last_result
    }

    pub async fn call_async<F, Fut>(&mut self, f: F) -> &T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        self.call_async_at(Instant::now(), f).await
    }

    /// Async variant of [`call_at`](Self::call_at). The invocation timestamp is
    /// the instant the call started, not when the future completed.
    pub async fn call_async_at<F, Fut>(&mut self, now: Instant, f: F) -> &T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        if self.is_due(now) {
            let result = f().await;
            self.store(now, result);
        } else {
            trace!("Rate gate closed, returning cached result");
        }
        &self.last_result
    }

    fn store(&mut self, now: Instant, result: T) {
        self.last_invocation = Some(now);
        self.last_result = result;
        self.invocations += 1;
    }
}
