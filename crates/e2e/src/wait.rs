//! Bounded polling for asynchronous UI state
//!
//! The UI under test gives no events to subscribe to, so every wait is an
//! explicit poll with a deadline. Between evaluations the task sleeps on the
//! tokio timer, which lets a cancellation token or an outer timeout interrupt
//! it.

use std::future::Future;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use crate::error::{E2eError, E2eResult};
use crate::session::{BrowserSession, Selector};

/// Default timeout for waits
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);

/// Default time between evaluations
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Timeout and poll interval for a wait, plus an optional cancel signal
#[derive(Debug, Clone)]
pub struct WaitConfig {
    pub timeout: Duration,
    pub poll_interval: Duration,
    pub cancel: Option<CancellationToken>,
}

impl WaitConfig {
    pub fn new(timeout: Duration, poll_interval: Duration) -> Self {
        Self {
            timeout,
            poll_interval,
            cancel: None,
        }
    }

    /// Same poll interval and cancel signal, different timeout
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        Self {
            timeout,
            ..self.clone()
        }
    }

    pub fn with_cancel(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self::new(DEFAULT_TIMEOUT, DEFAULT_POLL_INTERVAL)
    }
}

/// Result of evaluating a condition once
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Observation<T> {
    Satisfied(T),
    /// Not there yet; the string describes what was seen instead
    Unsatisfied(String),
}

/// Evaluate `condition` until it is satisfied or `config.timeout` elapses.
///
/// Evaluations are at least `poll_interval` apart, and none starts unless it
/// fits a full interval before the deadline, so a value is never returned
/// after the timeout. An evaluation that errors (a stale element after a
/// re-render, say) counts as unsatisfied, and its error becomes the last
/// observation reported in `Timeout`.
///
/// When the cancel token fires during a sleep the condition is checked once
/// more straight away, bounded by `poll_interval`; if that still fails the
/// wait ends with `Cancelled`.
pub async fn wait_for<T, F, Fut>(
    mut condition: F,
    config: &WaitConfig,
    description: &str,
) -> E2eResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = E2eResult<Observation<T>>>,
{
    let start = Instant::now();
    let mut polls = 0u32;

    loop {
        polls += 1;

        // A single evaluation never outlives the wait itself
        let budget = config.timeout.saturating_sub(start.elapsed());
        let last_observed = match timeout(budget, condition()).await {
            Ok(Ok(Observation::Satisfied(value))) => {
                trace!("{} satisfied after {} poll(s)", description, polls);
                return Ok(value);
            }
            Ok(Ok(Observation::Unsatisfied(seen))) => seen,
            Ok(Err(e)) => format!("error: {}", e),
            Err(_) => format!("evaluation still pending after {:?}", budget),
        };

        if start.elapsed() + config.poll_interval > config.timeout {
            debug!(
                "{} not satisfied after {} poll(s); last observed: {}",
                description, polls, last_observed
            );
            return Err(E2eError::Timeout {
                condition: description.to_string(),
                timeout: config.timeout,
                last_observed,
            });
        }

        match &config.cancel {
            Some(token) => {
                tokio::select! {
                    _ = sleep(config.poll_interval) => {}
                    _ = token.cancelled() => {
                        return match timeout(config.poll_interval, condition()).await {
                            Ok(Ok(Observation::Satisfied(value))) => Ok(value),
                            _ => Err(E2eError::Cancelled(description.to_string())),
                        };
                    }
                }
            }
            None => sleep(config.poll_interval).await,
        }
    }
}

/// Wait until `element`'s visible text equals `expected`
pub async fn until_text_is<S: BrowserSession>(
    session: &S,
    element: &S::Element,
    expected: &str,
    config: &WaitConfig,
) -> E2eResult<String> {
    wait_for(
        || async move {
            let text = session.text(element).await?;
            Ok(if text == expected {
                Observation::Satisfied(text)
            } else {
                Observation::Unsatisfied(format!("text {:?}", text))
            })
        },
        config,
        &format!("element text to be {:?}", expected),
    )
    .await
}

/// Like [`until_text_is`], but looks the element up again on every poll so a
/// re-rendered node is picked up
pub async fn until_selector_text_is<S: BrowserSession>(
    session: &S,
    selector: &Selector,
    expected: &str,
    config: &WaitConfig,
) -> E2eResult<String> {
    wait_for(
        || async move {
            let element = session.find_element(selector).await?;
            let text = session.text(&element).await?;
            Ok(if text == expected {
                Observation::Satisfied(text)
            } else {
                Observation::Unsatisfied(format!("text {:?}", text))
            })
        },
        config,
        &format!("{} text to be {:?}", selector, expected),
    )
    .await
}

/// Wait until `element`'s visibility equals `displayed`
pub async fn until_displayed<S: BrowserSession>(
    session: &S,
    element: &S::Element,
    displayed: bool,
    config: &WaitConfig,
) -> E2eResult<()> {
    wait_for(
        || async move {
            let actual = session.is_displayed(element).await?;
            Ok(if actual == displayed {
                Observation::Satisfied(())
            } else {
                Observation::Unsatisfied(format!("displayed = {}", actual))
            })
        },
        config,
        &format!("element displayed = {}", displayed),
    )
    .await
}

/// Wait until `selector` matches something and return the first match
pub async fn until_present<S: BrowserSession>(
    session: &S,
    selector: &Selector,
    config: &WaitConfig,
) -> E2eResult<S::Element> {
    wait_for(
        || async move {
            Ok(match session.find_elements(selector).await?.into_iter().next() {
                Some(element) => Observation::Satisfied(element),
                None => Observation::Unsatisfied("no match".to_string()),
            })
        },
        config,
        &format!("{} to be present", selector),
    )
    .await
}
