//! Bounded retry for single remote calls and a bounded cursor loop for
//! paginated jobs.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};

use crate::{AppError, AppResult};

pub const DEFAULT_MAX_PAGES: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one.
    pub max_attempts: usize,
    pub min_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            min_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            min_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
        }
    }

    fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.min_delay)
            .with_max_delay(self.max_delay)
            .with_max_times(self.max_attempts.saturating_sub(1))
            .with_jitter()
    }
}

/// Transport failures, timeouts, throttling and server errors are worth
/// another attempt; everything else is returned immediately.
pub fn is_transient(err: &AppError) -> bool {
    match err.code() {
        "HTTP/TIMEOUT" | "HTTP/CONNECT" | "HTTP/TRANSPORT" => true,
        "HTTP/STATUS" => err
            .context()
            .get("status")
            .and_then(|s| s.parse::<u16>().ok())
            .map(|status| status == 429 || (500..=599).contains(&status))
            .unwrap_or(false),
        _ => false,
    }
}

pub async fn with_retry<T, F, Fut>(policy: RetryPolicy, operation: &str, f: F) -> AppResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AppResult<T>>,
{
    f.retry(policy.backoff())
        .when(is_transient)
        .notify(|err: &AppError, dur: Duration| {
            tracing::warn!(
                target: "villaops",
                event = "retry_scheduled",
                operation = operation,
                delay_ms = dur.as_millis() as u64,
                code = %err.code(),
                error = %err.message(),
            );
        })
        .await
}

#[derive(Debug, Clone, PartialEq)]
pub struct Page<T> {
    pub items: T,
    /// Cursor for the next call, or `None` when the server reports no more data.
    pub next: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Paged<T> {
    pub pages: Vec<T>,
    /// True when the loop stopped at the page cap while the server still
    /// claimed more data.
    pub truncated: bool,
}

/// Drive a cursor loop starting at `start`, calling `fetch` at most
/// `max_pages` times and sleeping `delay` between calls.
pub async fn paginate<T, F, Fut>(
    start: u64,
    max_pages: u32,
    delay: Duration,
    mut fetch: F,
) -> AppResult<Paged<T>>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = AppResult<Page<T>>>,
{
    let mut pages = Vec::new();
    let mut cursor = start;
    for attempt in 1..=max_pages {
        let page = fetch(cursor).await?;
        pages.push(page.items);
        match page.next {
            None => return Ok(Paged { pages, truncated: false }),
            Some(next) => {
                cursor = next;
                if attempt < max_pages && !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
    tracing::warn!(
        target: "villaops",
        event = "paginate_cap_reached",
        max_pages = max_pages,
        next_cursor = cursor,
    );
    Ok(Paged {
        pages,
        truncated: true,
    })
}
