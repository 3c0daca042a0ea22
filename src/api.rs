//! Talking to the classification model.
//!
//! - [`AskAsync`]: one prompt in, one response out
//! - [`AskFnWrapper`]: `awful_aj::api::ask` bound to a config and a chat template
//! - [`RetryAsk`]: retries any [`AskAsync`] with capped exponential backoff
//!
//! Triage and analysis each get their own template, so each stage builds its
//! own client with [`client`].
//!
//! Backoff between attempts is
//!
//! ```text
//! delay = min(base_delay * 2^(attempt-1), max_delay) + jitter(0..=250ms)
//! ```

use awful_aj::api::ask;
use awful_aj::{config::AwfulJadeConfig, template::ChatTemplate};
use rand::{Rng, rng};
use std::error::Error;
use std::fmt;
use std::time::{Duration as StdDuration, Instant};
use tokio::time::sleep;
use tracing::{debug, error, instrument, warn};

pub const MAX_RETRIES: usize = 5;
pub const BASE_DELAY: StdDuration = StdDuration::from_secs(1);
pub const MAX_DELAY: StdDuration = StdDuration::from_secs(30);

/// Something that answers a prompt.
pub trait AskAsync {
    type Response;

    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>>;
}

/// Retries the wrapped [`AskAsync`] until it succeeds or `max_retries` extra
/// attempts have failed. The last error is returned.
pub struct RetryAsk<T> {
    inner: T,
    max_retries: usize,
    base_delay: StdDuration,
    max_delay: StdDuration,
}

impl<T> RetryAsk<T>
where
    T: AskAsync,
{
    pub fn new(inner: T, max_retries: usize, base_delay: StdDuration) -> Self {
        Self {
            inner,
            max_retries,
            base_delay,
            max_delay: MAX_DELAY,
        }
    }

    fn delay_for(&self, attempt: usize) -> StdDuration {
        let shift = (attempt.saturating_sub(1)).min(16) as u32;
        let delay = self.base_delay.saturating_mul(1 << shift).min(self.max_delay);
        let jitter_ms: u64 = rng().random_range(0..=250);
        delay + StdDuration::from_millis(jitter_ms)
    }
}

impl<T> fmt::Debug for RetryAsk<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryAsk")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish()
    }
}

impl<T> AskAsync for RetryAsk<T>
where
    T: AskAsync + fmt::Debug,
{
    type Response = T::Response;

    #[instrument(level = "info", skip_all)]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let total_t0 = Instant::now();
        let mut attempt = 0usize;

        loop {
            match self.inner.ask(text).await {
                Ok(resp) => {
                    debug!(
                        attempts = attempt + 1,
                        elapsed_ms_total = total_t0.elapsed().as_millis(),
                        "ask() succeeded"
                    );
                    return Ok(resp);
                }
                Err(e) => {
                    attempt += 1;
                    if attempt > self.max_retries {
                        error!(
                            attempt,
                            max = self.max_retries,
                            elapsed_ms_total = total_t0.elapsed().as_millis(),
                            error = %e,
                            "ask() exhausted retries"
                        );
                        return Err(e);
                    }

                    let delay = self.delay_for(attempt);
                    warn!(
                        attempt,
                        max = self.max_retries,
                        ?delay,
                        error = %e,
                        "ask() attempt failed; backing off"
                    );
                    sleep(delay).await;
                }
            }
        }
    }
}

/// `awful_aj::api::ask` with a fixed config and template.
#[derive(Debug)]
pub struct AskFnWrapper<'a> {
    pub config: &'a AwfulJadeConfig,
    pub template: &'a ChatTemplate,
}

impl<'a> AskAsync for AskFnWrapper<'a> {
    type Response = String;

    #[instrument(level = "debug", skip_all, fields(prompt_len = text.len()))]
    async fn ask(&self, text: &str) -> Result<Self::Response, Box<dyn Error>> {
        let t0 = Instant::now();
        let res = ask(self.config, text.to_string(), self.template, None, None).await;
        if let Err(e) = &res {
            warn!(elapsed_ms = t0.elapsed().as_millis(), error = %e, "API call failed");
        }
        res
    }
}

/// Model client for one stage, retrying with the default backoff.
pub fn client<'a>(
    config: &'a AwfulJadeConfig,
    template: &'a ChatTemplate,
) -> RetryAsk<AskFnWrapper<'a>> {
    RetryAsk::new(AskFnWrapper { config, template }, MAX_RETRIES, BASE_DELAY)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Fails `failures` times, then answers "ok".
    #[derive(Debug)]
    struct Flaky {
        failures: usize,
        calls: Mutex<usize>,
    }

    impl AskAsync for Flaky {
        type Response = String;

        async fn ask(&self, _text: &str) -> Result<String, Box<dyn Error>> {
            let mut calls = self.calls.lock().unwrap();
            *calls += 1;
            if *calls <= self.failures {
                Err(format!("failure {}", *calls).into())
            } else {
                Ok("ok".to_string())
            }
        }
    }

    fn flaky(failures: usize) -> Flaky {
        Flaky {
            failures,
            calls: Mutex::new(0),
        }
    }

    #[tokio::test]
    async fn retries_until_success() {
        let api = RetryAsk::new(flaky(2), 3, StdDuration::from_millis(1));
        assert_eq!(api.ask("prompt").await.unwrap(), "ok");
        assert_eq!(*api.inner.calls.lock().unwrap(), 3);
    }

    #[tokio::test]
    async fn gives_up_with_last_error() {
        let api = RetryAsk::new(flaky(10), 2, StdDuration::from_millis(1));
        let err = api.ask("prompt").await.unwrap_err();
        assert_eq!(err.to_string(), "failure 3");
        assert_eq!(*api.inner.calls.lock().unwrap(), 3);
    }

    #[test]
    fn delay_doubles_and_is_capped() {
        let api = RetryAsk::new(flaky(0), 5, StdDuration::from_secs(1));
        let jitter = StdDuration::from_millis(250);

        let first = api.delay_for(1);
        assert!(first >= StdDuration::from_secs(1) && first <= StdDuration::from_secs(1) + jitter);
        let third = api.delay_for(3);
        assert!(third >= StdDuration::from_secs(4) && third <= StdDuration::from_secs(4) + jitter);
        let huge = api.delay_for(40);
        assert!(huge >= MAX_DELAY && huge <= MAX_DELAY + jitter);
    }
}
