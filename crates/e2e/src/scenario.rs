//! Declarative YAML scenarios
//!
//! A scenario file is a suite: a title, the profile to start the application
//! with, and tests made of steps. Each file compiles into a [`Suite`] and runs
//! under the same lifecycle as suites written in Rust.
//!
//! ```yaml
//! name: "config: subpath"
//! profile: subpath
//! tests:
//!   - name: Page title
//!     steps:
//!       - action: navigate
//!         path: /
//!       - action: expect_title
//!         title: OliveTin
//! ```

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{E2eError, E2eResult};
use crate::lifecycle::{Suite, TestCase, TestContext};
use crate::locators::{NamedRegion, UiSelectors};
use crate::session::{BrowserSession, Selector};
use crate::wait::{until_displayed, until_present, until_selector_text_is};
use crate::{ensure, ensure_eq};

/// A scenario file parsed from YAML
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioFile {
    /// Suite title
    pub name: String,

    #[serde(default)]
    pub description: String,

    /// Configuration profile the application is started with
    pub profile: String,

    #[serde(default)]
    pub tags: Vec<String>,

    pub tests: Vec<ScenarioTest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioTest {
    pub name: String,
    pub steps: Vec<ScenarioStep>,
}

/// What a step acts on. Exactly one field must be set.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Target {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub css: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Action button by title
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action_button: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<NamedRegion>,
}

impl Target {
    fn resolve(&self, selectors: &UiSelectors) -> E2eResult<Selector> {
        match (&self.css, &self.id, &self.action_button, self.region) {
            (Some(css), None, None, None) => Ok(Selector::css(css.clone())),
            (None, Some(id), None, None) => Ok(Selector::id(id.clone())),
            (None, None, Some(title), None) => Ok(selectors.action_button(title)),
            (None, None, None, Some(region)) => Ok(selectors.region(region).clone()),
            _ => Err(E2eError::ScenarioParse(format!(
                "target must set exactly one of css, id, action_button, region: {:?}",
                self
            ))),
        }
    }
}

/// A single step in a test
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum ScenarioStep {
    /// Navigate to a path under the base URL
    Navigate {
        #[serde(default = "default_path")]
        path: String,
    },

    /// Navigate to the root and wait for the UI to finish loading
    OpenRoot,

    ExpectTitle {
        title: String,
    },

    /// Number of elements matching a target
    ExpectCount {
        target: Target,
        count: usize,
    },

    /// Click the single element matching a target
    Click {
        target: Target,
    },

    /// Visibility right now, no waiting
    ExpectDisplayed {
        target: Target,
        #[serde(default = "default_true")]
        displayed: bool,
    },

    WaitForText {
        target: Target,
        text: String,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    WaitForDisplayed {
        target: Target,
        #[serde(default = "default_true")]
        displayed: bool,
        #[serde(default)]
        timeout_ms: Option<u64>,
    },

    Log {
        message: String,
    },
}

fn default_path() -> String {
    "/".to_string()
}

fn default_true() -> bool {
    true
}

impl ScenarioStep {
    fn targets(&self) -> Option<&Target> {
        match self {
            ScenarioStep::ExpectCount { target, .. }
            | ScenarioStep::Click { target }
            | ScenarioStep::ExpectDisplayed { target, .. }
            | ScenarioStep::WaitForText { target, .. }
            | ScenarioStep::WaitForDisplayed { target, .. } => Some(target),
            _ => None,
        }
    }

    async fn execute<S: BrowserSession>(&self, ctx: &TestContext<'_, S>) -> E2eResult<()> {
        match self {
            ScenarioStep::Navigate { path } => ctx.navigate(path).await,
            ScenarioStep::OpenRoot => ctx.locators().root_and_wait().await.map(|_| ()),
            ScenarioStep::ExpectTitle { title } => {
                let actual = ctx.session.title().await?;
                ensure_eq!(actual, *title);
                Ok(())
            }
            ScenarioStep::ExpectCount { target, count } => {
                let selector = target.resolve(ctx.selectors)?;
                let found = ctx.session.find_elements(&selector).await?.len();
                ensure!(
                    found == *count,
                    "expected {} element(s) matching {}, found {}",
                    count,
                    selector,
                    found
                );
                Ok(())
            }
            ScenarioStep::Click { target } => {
                let selector = target.resolve(ctx.selectors)?;
                let element = ctx.session.find_element(&selector).await?;
                ctx.session.click(&element).await
            }
            ScenarioStep::ExpectDisplayed { target, displayed } => {
                let selector = target.resolve(ctx.selectors)?;
                let element = ctx.session.find_element(&selector).await?;
                let actual = ctx.session.is_displayed(&element).await?;
                ensure!(
                    actual == *displayed,
                    "expected {} displayed = {}, was {}",
                    selector,
                    displayed,
                    actual
                );
                Ok(())
            }
            ScenarioStep::WaitForText {
                target,
                text,
                timeout_ms,
            } => {
                let selector = target.resolve(ctx.selectors)?;
                let wait = step_wait(ctx, *timeout_ms);
                until_selector_text_is(ctx.session, &selector, text, &wait)
                    .await
                    .map(|_| ())
            }
            ScenarioStep::WaitForDisplayed {
                target,
                displayed,
                timeout_ms,
            } => {
                let selector = target.resolve(ctx.selectors)?;
                let wait = step_wait(ctx, *timeout_ms);
                let element = until_present(ctx.session, &selector, &wait).await?;
                until_displayed(ctx.session, &element, *displayed, &wait).await
            }
            ScenarioStep::Log { message } => {
                info!("[SCENARIO] {}", message);
                Ok(())
            }
        }
    }
}

fn step_wait<S: BrowserSession>(
    ctx: &TestContext<'_, S>,
    timeout_ms: Option<u64>,
) -> crate::wait::WaitConfig {
    match timeout_ms {
        Some(ms) => ctx.wait.with_timeout(Duration::from_millis(ms)),
        None => ctx.wait.clone(),
    }
}

/// A scenario test, runnable under the lifecycle
pub struct DeclarativeTest {
    test: ScenarioTest,
}

#[async_trait]
impl<S: BrowserSession> TestCase<S> for DeclarativeTest {
    fn title(&self) -> &str {
        &self.test.name
    }

    async fn run(&self, ctx: &TestContext<'_, S>) -> E2eResult<()> {
        for (i, step) in self.test.steps.iter().enumerate() {
            step.execute(ctx).await.map_err(|e| match e {
                E2eError::AssertionFailed(msg) => {
                    E2eError::AssertionFailed(format!("step {}: {}", i + 1, msg))
                }
                other => other,
            })?;
        }
        Ok(())
    }
}

impl ScenarioFile {
    /// Parse a scenario from a YAML string
    pub fn from_yaml(yaml: &str) -> E2eResult<Self> {
        let scenario: Self = serde_yaml::from_str(yaml)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Parse a scenario from a YAML file
    pub fn from_file(path: &Path) -> E2eResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_yaml(&content)
            .map_err(|e| E2eError::ScenarioParse(format!("{}: {}", path.display(), e)))
    }

    /// Load every `.yaml`/`.yml` scenario under `dir`, ordered by path
    pub fn load_all(dir: &Path) -> E2eResult<Vec<Self>> {
        let mut paths: Vec<_> = walkdir::WalkDir::new(dir)
            .into_iter()
            .filter_map(|e| e.ok())
            .map(|e| e.into_path())
            .filter(|p| {
                p.extension()
                    .map(|ext| ext == "yaml" || ext == "yml")
                    .unwrap_or(false)
            })
            .collect();
        paths.sort();

        paths.iter().map(|p| Self::from_file(p)).collect()
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }

    fn validate(&self) -> E2eResult<()> {
        if self.profile.trim().is_empty() {
            return Err(E2eError::ScenarioParse(format!(
                "scenario '{}' has no profile",
                self.name
            )));
        }
        if self.tests.is_empty() {
            return Err(E2eError::ScenarioParse(format!(
                "scenario '{}' has no tests",
                self.name
            )));
        }

        // Check targets against the default selectors so shape errors
        // surface at load time rather than mid-suite
        let selectors = UiSelectors::default();
        for test in &self.tests {
            for step in &test.steps {
                if let Some(target) = step.targets() {
                    target.resolve(&selectors).map_err(|e| {
                        E2eError::ScenarioParse(format!("test '{}': {}", test.name, e))
                    })?;
                }
            }
        }
        Ok(())
    }

    pub fn into_suite<S: BrowserSession>(self) -> Suite<S> {
        self.tests
            .into_iter()
            .fold(Suite::new(self.name, self.profile), |suite, test| {
                suite.with_test(DeclarativeTest { test })
            })
    }
}
