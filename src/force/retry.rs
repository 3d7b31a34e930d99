use crate::core::{ForceError, Result};
use async_trait::async_trait;
use log::{debug, warn};
use rand::Rng;
use std::time::Duration;
use tokio::time::{Instant, sleep};

/// Configuration for retrying a force write after conflicts.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    /// Maximum number of retries after the first attempt. Zero means the
    /// operation is attempted exactly once.
    pub retries: u32,
    /// Exponential growth factor applied to the backoff per retry.
    pub factor: f64,
    /// Backoff before the first retry.
    pub min_timeout: Duration,
    /// Upper bound for a single backoff.
    pub max_timeout: Duration,
    /// Multiply each backoff by a random factor in `[1, 2)`.
    pub randomize: bool,
    /// Give up once waiting for the next round would cross this budget.
    pub max_elapsed: Option<Duration>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            retries: 10,
            factor: 2.0,
            min_timeout: Duration::from_millis(50),
            max_timeout: Duration::from_secs(2),
            randomize: false,
            max_elapsed: None,
        }
    }
}

impl RetryPolicy {
    /// A policy that retries without sleeping between rounds.
    pub fn immediate(retries: u32) -> Self {
        Self {
            retries,
            min_timeout: Duration::ZERO,
            max_timeout: Duration::ZERO,
            ..Self::default()
        }
    }

    pub fn retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    pub fn factor(mut self, factor: f64) -> Self {
        self.factor = factor;
        self
    }

    pub fn min_timeout(mut self, timeout: Duration) -> Self {
        self.min_timeout = timeout;
        self
    }

    pub fn max_timeout(mut self, timeout: Duration) -> Self {
        self.max_timeout = timeout;
        self
    }

    pub fn randomize(mut self, randomize: bool) -> Self {
        self.randomize = randomize;
        self
    }

    pub fn max_elapsed(mut self, budget: Duration) -> Self {
        self.max_elapsed = Some(budget);
        self
    }

    /// Backoff to wait after the given (1-based) failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = if self.factor.is_finite() {
            self.factor.max(1.0)
        } else {
            1.0
        };
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let jitter = if self.randomize {
            rand::thread_rng().gen_range(1.0..2.0)
        } else {
            1.0
        };

        let cap = self.max_timeout.as_nanos() as f64;
        let nanos = (self.min_timeout.as_nanos() as f64 * factor.powi(exponent) * jitter).min(cap);
        Duration::from_nanos(nanos.max(0.0).round() as u64)
    }
}

/// Retry budget as accepted by the force operations: either a bare retry
/// count or a full policy.
#[derive(Debug, Clone, PartialEq)]
pub enum Retries {
    Count(u32),
    Policy(RetryPolicy),
}

impl Retries {
    pub fn policy(&self) -> RetryPolicy {
        match self {
            Self::Count(retries) => RetryPolicy::default().retries(*retries),
            Self::Policy(policy) => policy.clone(),
        }
    }
}

impl Default for Retries {
    fn default() -> Self {
        Self::Policy(RetryPolicy::default())
    }
}

impl From<u32> for Retries {
    fn from(retries: u32) -> Self {
        Self::Count(retries)
    }
}

impl From<RetryPolicy> for Retries {
    fn from(policy: RetryPolicy) -> Self {
        Self::Policy(policy)
    }
}

/// Outcome of one round of a retried operation.
#[derive(Debug)]
pub enum Round<T> {
    Success(T),
    /// Run another round if the budget allows; otherwise fail with the reason.
    Retryable(ForceError),
    /// Stop immediately.
    Terminal(ForceError),
}

/// Position of the current round within the retry budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Attempt {
    /// 1-based round number.
    pub number: u32,
    /// Total rounds the count budget allows.
    pub limit: u32,
}

impl Attempt {
    /// No further round will run, whatever this one reports. Rounds use this
    /// to skip reconciliation reads that nothing could consume.
    pub fn is_last(&self) -> bool {
        self.number >= self.limit
    }
}

/// The per-call state of one force operation.
#[async_trait]
pub trait RetryRound: Send {
    type Output: Send;

    /// Operation name for log lines.
    fn name(&self) -> &'static str;

    async fn round(&mut self, attempt: Attempt) -> Round<Self::Output>;
}

/// Drives a `RetryRound` until it succeeds, fails terminally or runs out of
/// budget. Only `Round::Retryable` triggers another round.
pub struct Retrier {
    policy: RetryPolicy,
}

impl Retrier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub async fn run<R: RetryRound>(&self, call: &mut R) -> Result<R::Output> {
        let started = Instant::now();
        let limit = self.policy.retries.saturating_add(1);
        let mut number = 1u32;

        loop {
            let attempt = Attempt { number, limit };
            let reason = match call.round(attempt).await {
                Round::Success(output) => return Ok(output),
                Round::Terminal(err) => return Err(err),
                Round::Retryable(reason) => reason,
            };

            if attempt.is_last() {
                debug!(
                    "{}: retry budget exhausted after {} attempts: {}",
                    call.name(),
                    number,
                    reason
                );
                return Err(reason);
            }

            let backoff = self.policy.backoff(number);
            if let Some(budget) = self.policy.max_elapsed {
                if started.elapsed() + backoff >= budget {
                    warn!(
                        "{}: giving up after {} attempts, {:?} budget elapsed: {}",
                        call.name(),
                        number,
                        budget,
                        reason
                    );
                    return Err(reason);
                }
            }

            warn!(
                "{} retry on conflict (attempt {} of {}): {} (backoff={}ms)",
                call.name(),
                number,
                limit,
                reason,
                backoff.as_millis()
            );
            if !backoff.is_zero() {
                sleep(backoff).await;
            }
            number += 1;
        }
    }
}
