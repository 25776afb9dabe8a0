//! Suite lifecycle: start once, run tests in order, stop once
//!
//! ```text
//!   NotStarted ──setup ok──▶ Running ──teardown──▶ Stopped
//!        │                                           ▲
//!        └──────────── setup failed, teardown ───────┘
//! ```
//!
//! A failing test never changes suite state; it only produces a failed
//! [`TestOutcome`] and one call into [`FailureCapture`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use crate::capture::{FailureCapture, TestIdentity};
use crate::error::{E2eError, E2eResult};
use crate::locators::{Locators, UiSelectors};
use crate::server::AppRunner;
use crate::session::BrowserSession;
use crate::wait::WaitConfig;

/// Everything a test may touch, passed explicitly
pub struct TestContext<'a, S: BrowserSession> {
    pub session: &'a S,
    pub base_url: &'a str,
    pub wait: &'a WaitConfig,
    pub selectors: &'a UiSelectors,
}

impl<'a, S: BrowserSession> TestContext<'a, S> {
    pub fn locators(&self) -> Locators<'a, S> {
        Locators::new(self.session, self.base_url, self.selectors, self.wait)
    }

    /// Absolute URL for a path under the instance's base URL
    pub fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    pub async fn navigate(&self, path: &str) -> E2eResult<()> {
        self.session.navigate(&self.url(path)).await
    }
}

/// One test case of a suite
#[async_trait]
pub trait TestCase<S: BrowserSession>: Send + Sync {
    fn title(&self) -> &str;

    async fn run(&self, ctx: &TestContext<'_, S>) -> E2eResult<()>;
}

/// A titled list of tests sharing one application profile
pub struct Suite<S: BrowserSession> {
    pub title: String,
    pub profile: String,
    pub tests: Vec<Box<dyn TestCase<S>>>,
}

impl<S: BrowserSession> Suite<S> {
    pub fn new(title: impl Into<String>, profile: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            profile: profile.into(),
            tests: Vec::new(),
        }
    }

    pub fn with_test(mut self, test: impl TestCase<S> + 'static) -> Self {
        self.tests.push(Box::new(test));
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SuiteState {
    NotStarted,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestStatus {
    Passed,
    Failed,
}

/// Result of running a single test
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestOutcome {
    pub identity: TestIdentity,
    pub status: TestStatus,
    pub duration_ms: u64,
    pub error: Option<String>,
    pub screenshot: Option<PathBuf>,
}

impl TestOutcome {
    pub fn passed(&self) -> bool {
        self.status == TestStatus::Passed
    }
}

/// Result of running a suite
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuiteReport {
    pub title: String,
    pub profile: String,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Set when the application never came up; no tests ran
    pub setup_error: Option<String>,
    /// Set when stopping the application failed; test outcomes stand
    pub teardown_error: Option<String>,
    pub outcomes: Vec<TestOutcome>,
}

impl SuiteReport {
    pub fn passed(&self) -> usize {
        self.outcomes.iter().filter(|o| o.passed()).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.len() - self.passed()
    }

    pub fn is_success(&self) -> bool {
        self.setup_error.is_none() && self.failed() == 0
    }
}

/// Binds an [`AppRunner`] and a [`FailureCapture`] to suite-level hooks
pub struct ScenarioLifecycle<R: AppRunner> {
    runner: R,
    capture: FailureCapture,
    wait: WaitConfig,
    selectors: UiSelectors,
    state: SuiteState,
}

impl<R: AppRunner> ScenarioLifecycle<R> {
    pub fn new(runner: R, capture: FailureCapture) -> Self {
        Self {
            runner,
            capture,
            wait: WaitConfig::default(),
            selectors: UiSelectors::default(),
            state: SuiteState::NotStarted,
        }
    }

    pub fn with_wait(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_selectors(mut self, selectors: UiSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn state(&self) -> SuiteState {
        self.state
    }

    pub fn runner(&self) -> &R {
        &self.runner
    }

    pub fn into_runner(self) -> R {
        self.runner
    }

    /// Suite `before` hook: start the application
    pub async fn setup(&mut self, profile: &str) -> E2eResult<()> {
        if self.state != SuiteState::NotStarted {
            return Err(E2eError::Startup(format!(
                "suite cannot be set up from state {:?}",
                self.state
            )));
        }

        self.runner.start(profile).await?;
        self.state = SuiteState::Running;
        Ok(())
    }

    /// Run one test; on failure, capture once and report
    pub async fn run_test<S: BrowserSession>(
        &self,
        suite_title: &str,
        test: &dyn TestCase<S>,
        session: &S,
    ) -> TestOutcome {
        let identity = TestIdentity::new(suite_title, test.title());
        let start = Instant::now();
        debug!("Running test: {}", identity);

        let result = match (self.state, self.runner.base_url()) {
            (SuiteState::Running, Ok(base_url)) => {
                let ctx = TestContext {
                    session,
                    base_url,
                    wait: &self.wait,
                    selectors: &self.selectors,
                };
                match AssertUnwindSafe(test.run(&ctx)).catch_unwind().await {
                    Ok(result) => result,
                    Err(panic) => Err(E2eError::AssertionFailed(panic_message(panic))),
                }
            }
            (SuiteState::Running, Err(e)) => Err(e),
            _ => Err(E2eError::NotRunning),
        };

        let duration_ms = start.elapsed().as_millis() as u64;

        match result {
            Ok(()) => {
                info!("✓ {} ({} ms)", identity, duration_ms);
                TestOutcome {
                    identity,
                    status: TestStatus::Passed,
                    duration_ms,
                    error: None,
                    screenshot: None,
                }
            }
            Err(e) => {
                error!("✗ {} - {}", identity, e);
                let artifact = self.capture.on_test_failure(&identity, session).await;
                TestOutcome {
                    identity,
                    status: TestStatus::Failed,
                    duration_ms,
                    error: Some(e.to_string()),
                    screenshot: artifact.map(|a| a.path),
                }
            }
        }
    }

    /// Suite `after` hook: stop the application whatever happened before
    pub async fn teardown(&mut self) -> E2eResult<()> {
        let result = self.runner.stop().await;
        self.state = SuiteState::Stopped;
        result
    }

    /// Setup, every test in order, teardown.
    ///
    /// If this future is dropped half way the runner's own `Drop` still
    /// kills the application.
    pub async fn run_suite<S: BrowserSession>(&mut self, suite: &Suite<S>, session: &S) -> SuiteReport {
        let started_at = Utc::now();
        let start = Instant::now();
        let mut outcomes = Vec::with_capacity(suite.tests.len());

        info!(
            "Suite '{}' ({} test(s), profile '{}')",
            suite.title,
            suite.tests.len(),
            suite.profile
        );

        let setup_error = match self.setup(&suite.profile).await {
            Ok(()) => {
                for test in &suite.tests {
                    outcomes.push(self.run_test(&suite.title, test.as_ref(), session).await);
                }
                None
            }
            Err(e) => {
                error!("Suite '{}' aborted during setup: {}", suite.title, e);
                Some(e.to_string())
            }
        };

        let teardown_error = match self.teardown().await {
            Ok(()) => None,
            Err(e) => {
                warn!("Suite '{}' teardown failed: {}", suite.title, e);
                Some(e.to_string())
            }
        };

        let report = SuiteReport {
            title: suite.title.clone(),
            profile: suite.profile.clone(),
            started_at,
            duration_ms: start.elapsed().as_millis() as u64,
            setup_error,
            teardown_error,
            outcomes,
        };

        info!(
            "Suite '{}': {} passed, {} failed ({} ms)",
            report.title,
            report.passed(),
            report.failed(),
            report.duration_ms
        );

        report
    }
}

fn panic_message(panic: Box<dyn Any + Send>) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        format!("panicked: {}", s)
    } else if let Some(s) = panic.downcast_ref::<String>() {
        format!("panicked: {}", s)
    } else {
        "panicked".to_string()
    }
}
