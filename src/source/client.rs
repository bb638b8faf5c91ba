//! Blocking HTTP client with configurable politeness (minimum spacing between requests) and a
//! retry policy for transient failures.

use crate::source::error::HttpError;
use std::sync::{Mutex, PoisonError};
use std::time::{Duration, Instant};

const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (compatible; mangascrape/0.1; +https://github.com/mangascrape)";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const DEFAULT_DELAY_MS: u64 = 0;
const MAX_REDIRECTS: usize = 10;

/// Default number of attempts per request (initial plus retries).
const DEFAULT_RETRY_COUNT: u32 = 3;
/// Default backoff delays in seconds after each failed attempt.
const DEFAULT_BACKOFF_SECS: [u64; 2] = [1, 2];
/// Backoff for HTTP 429 (rate limit): wait longer so the server can recover.
const BACKOFF_429_SECS: [u64; 2] = [30, 60];

/// Anything that can GET a URL and hand back the body. Implemented by [PoliteClient]; tests
/// substitute an in-memory map.
pub trait Fetch: Send + Sync {
    /// One attempt, no retries. Non-2xx responses are `HttpError::Status`.
    fn get(&self, url: &str) -> Result<Vec<u8>, HttpError>;

    fn get_text(&self, url: &str) -> Result<String, HttpError> {
        let bytes = self.get(url)?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// Blocking HTTP client that spaces request starts by at least the configured delay.
/// Safe to share between worker threads.
#[derive(Debug)]
pub struct PoliteClient {
    inner: reqwest::blocking::Client,
    delay: Duration,
    last_request: Mutex<Option<Instant>>,
}

impl PoliteClient {
    pub fn builder() -> PoliteClientBuilder {
        PoliteClientBuilder::default()
    }

    /// Reserve the next request slot and sleep until it arrives. The slot is claimed under the
    /// lock so concurrent callers queue up instead of all firing at once.
    fn wait_turn(&self) {
        if self.delay.is_zero() {
            return;
        }
        let wait = {
            let mut last = self
                .last_request
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let now = Instant::now();
            let start = match *last {
                Some(prev) if prev + self.delay > now => prev + self.delay,
                _ => now,
            };
            *last = Some(start);
            start - now
        };
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
    }
}

impl Fetch for PoliteClient {
    fn get(&self, url: &str) -> Result<Vec<u8>, HttpError> {
        self.wait_turn();
        let response = self
            .inner
            .get(url)
            .send()
            .map_err(|e| HttpError::Network {
                url: url.to_string(),
                source: e,
            })?;
        let status = response.status();
        if !status.is_success() {
            return Err(HttpError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        let bytes = response.bytes().map_err(|e| HttpError::BodyRead {
            url: url.to_string(),
            source: e,
        })?;
        Ok(bytes.to_vec())
    }
}

/// Builder for PoliteClient with optional User-Agent, delay and timeout.
#[derive(Debug)]
pub struct PoliteClientBuilder {
    user_agent: Option<String>,
    delay_ms: u64,
    timeout_secs: u64,
}

impl Default for PoliteClientBuilder {
    fn default() -> Self {
        Self {
            user_agent: None,
            delay_ms: DEFAULT_DELAY_MS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl PoliteClientBuilder {
    /// Set a custom User-Agent. If not set, a browser-like default is used.
    pub fn user_agent(mut self, ua: impl Into<String>) -> Self {
        self.user_agent = Some(ua.into());
        self
    }

    /// Minimum spacing between request starts in milliseconds. Default 0.
    pub fn delay_ms(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Per-request timeout in seconds. Default 30.
    pub fn timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn build(self) -> Result<PoliteClient, reqwest::Error> {
        let user_agent = self
            .user_agent
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());
        let inner = reqwest::blocking::Client::builder()
            .cookie_store(true)
            .user_agent(user_agent)
            .timeout(Duration::from_secs(self.timeout_secs))
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()?;
        Ok(PoliteClient {
            inner,
            delay: Duration::from_millis(self.delay_ms),
            last_request: Mutex::new(None),
        })
    }
}

/// How many times to try a request and how long to wait between tries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    attempts: u32,
    backoff: Vec<Duration>,
    rate_limit_backoff: Vec<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: DEFAULT_RETRY_COUNT,
            backoff: secs(&DEFAULT_BACKOFF_SECS),
            rate_limit_backoff: secs(&BACKOFF_429_SECS),
        }
    }
}

fn secs(values: &[u64]) -> Vec<Duration> {
    values.iter().map(|s| Duration::from_secs(*s)).collect()
}

impl RetryPolicy {
    /// `attempts` is clamped to at least 1. `backoff_secs` is the wait after each failed attempt;
    /// if shorter than `attempts - 1`, its last value is reused. Empty means exponential 1, 2, 4, ...
    pub fn new(attempts: u32, backoff_secs: Vec<u64>) -> Self {
        let attempts = attempts.max(1);
        let backoff = if backoff_secs.is_empty() {
            let n = attempts.saturating_sub(1) as usize;
            (0..n).map(|i| Duration::from_secs(1u64 << i.min(4))).collect()
        } else {
            secs(&backoff_secs)
        };
        Self {
            attempts,
            backoff,
            rate_limit_backoff: secs(&BACKOFF_429_SECS),
        }
    }

    /// Retry without sleeping between attempts.
    pub fn immediate(attempts: u32) -> Self {
        Self {
            attempts: attempts.max(1),
            backoff: Vec::new(),
            rate_limit_backoff: Vec::new(),
        }
    }

    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// Run `op` until it succeeds, fails with a non-transient error, or runs out of attempts.
    /// The last error is returned when attempts are exhausted.
    pub fn run<T>(&self, mut op: impl FnMut() -> Result<T, HttpError>) -> Result<T, HttpError> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < self.attempts => {
                    let wait = self.delay_after(&e, attempt);
                    log::debug!(
                        "{} (attempt {}/{}); retrying in {:?}",
                        e,
                        attempt,
                        self.attempts,
                        wait
                    );
                    if !wait.is_zero() {
                        std::thread::sleep(wait);
                    }
                }
                Err(e) => return Err(e),
            }
        }
    }

    fn delay_after(&self, error: &HttpError, attempt: u32) -> Duration {
        let table = if error.status() == Some(429) {
            &self.rate_limit_backoff
        } else {
            &self.backoff
        };
        table
            .get(attempt as usize - 1)
            .or_else(|| table.last())
            .copied()
            .unwrap_or(Duration::ZERO)
    }
}
