//! Browser session abstraction and its WebDriver implementation
//!
//! The harness never speaks the WebDriver wire protocol itself. Everything it
//! needs from a browser goes through [`BrowserSession`]; [`WebDriverSession`]
//! backs that with a fantoccini client talking to chromedriver or geckodriver.

use async_trait::async_trait;
use fantoccini::elements::Element;
use fantoccini::{Client, ClientBuilder, Locator};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::fmt;
use tracing::{debug, info};

use crate::error::{E2eError, E2eResult};

/// How to find elements on the page
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Selector {
    Css(String),
    Id(String),
}

impl Selector {
    pub fn css(selector: impl Into<String>) -> Self {
        Selector::Css(selector.into())
    }

    pub fn id(id: impl Into<String>) -> Self {
        Selector::Id(id.into())
    }

    /// `[attr="value"]` with the value escaped for a CSS string
    pub fn attribute_equals(attr: &str, value: &str) -> Self {
        let escaped = value.replace('\\', "\\\\").replace('"', "\\\"");
        Selector::Css(format!("[{}=\"{}\"]", attr, escaped))
    }

    fn locator(&self) -> Locator<'_> {
        match self {
            Selector::Css(css) => Locator::Css(css),
            Selector::Id(id) => Locator::Id(id),
        }
    }
}

impl fmt::Display for Selector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Selector::Css(css) => write!(f, "css `{}`", css),
            Selector::Id(id) => write!(f, "#{}", id),
        }
    }
}

/// A live, interactive browser.
///
/// Element handles are only meaningful to the session that produced them and
/// must not be kept across navigations.
#[async_trait]
pub trait BrowserSession: Send + Sync {
    type Element: Clone + Send + Sync;

    async fn navigate(&self, url: &str) -> E2eResult<()>;

    async fn title(&self) -> E2eResult<String>;

    /// All matches in document order; empty when nothing matches
    async fn find_elements(&self, selector: &Selector) -> E2eResult<Vec<Self::Element>>;

    /// First match, or `ElementNotFound`
    async fn find_element(&self, selector: &Selector) -> E2eResult<Self::Element> {
        self.find_elements(selector)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| E2eError::ElementNotFound {
                selector: selector.to_string(),
            })
    }

    async fn text(&self, element: &Self::Element) -> E2eResult<String>;

    async fn is_displayed(&self, element: &Self::Element) -> E2eResult<bool>;

    async fn click(&self, element: &Self::Element) -> E2eResult<()>;

    /// PNG bytes of the current viewport
    async fn screenshot(&self) -> E2eResult<Vec<u8>>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Browser {
    #[default]
    Chrome,
    Firefox,
}

impl Browser {
    pub fn as_str(&self) -> &'static str {
        match self {
            Browser::Chrome => "chrome",
            Browser::Firefox => "firefox",
        }
    }
}

impl std::str::FromStr for Browser {
    type Err = E2eError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "chrome" | "chromium" => Ok(Browser::Chrome),
            "firefox" => Ok(Browser::Firefox),
            other => Err(E2eError::Config(format!("unsupported browser: {}", other))),
        }
    }
}

/// Configuration for the WebDriver connection
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebDriverConfig {
    /// WebDriver endpoint (chromedriver, geckodriver, selenium)
    pub url: String,
    pub browser: Browser,
    pub headless: bool,
    pub window_width: u32,
    pub window_height: u32,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:4444".to_string(),
            browser: Browser::Chrome,
            headless: true,
            window_width: 1280,
            window_height: 800,
        }
    }
}

impl WebDriverConfig {
    /// New-session capabilities for the configured browser
    pub fn capabilities(&self) -> Map<String, Value> {
        let mut caps = Map::new();
        caps.insert("browserName".to_string(), json!(self.browser.as_str()));

        match self.browser {
            Browser::Chrome => {
                let mut args = vec![
                    format!("--window-size={},{}", self.window_width, self.window_height),
                    // Containers rarely have user namespaces or a large /dev/shm
                    "--no-sandbox".to_string(),
                    "--disable-dev-shm-usage".to_string(),
                ];
                if self.headless {
                    args.push("--headless=new".to_string());
                }
                caps.insert("goog:chromeOptions".to_string(), json!({ "args": args }));
            }
            Browser::Firefox => {
                let mut args = vec![
                    "-width".to_string(),
                    self.window_width.to_string(),
                    "-height".to_string(),
                    self.window_height.to_string(),
                ];
                if self.headless {
                    args.push("-headless".to_string());
                }
                caps.insert("moz:firefoxOptions".to_string(), json!({ "args": args }));
            }
        }

        caps
    }
}

fn session_error(context: &str, e: impl fmt::Display) -> E2eError {
    E2eError::Session(format!("{}: {}", context, e))
}

/// [`BrowserSession`] over a fantoccini WebDriver client
pub struct WebDriverSession {
    client: Client,
}

impl WebDriverSession {
    /// Open a new WebDriver session
    pub async fn connect(config: &WebDriverConfig) -> E2eResult<Self> {
        info!(
            "Connecting to {} WebDriver at {}",
            config.browser.as_str(),
            config.url
        );

        let client = ClientBuilder::native()
            .capabilities(config.capabilities())
            .connect(&config.url)
            .await
            .map_err(|e| session_error("failed to open WebDriver session", e))?;

        Ok(Self { client })
    }

    /// End the WebDriver session and close the browser
    pub async fn close(self) -> E2eResult<()> {
        debug!("Closing WebDriver session");
        self.client
            .close()
            .await
            .map_err(|e| session_error("failed to close session", e))
    }
}

#[async_trait]
impl BrowserSession for WebDriverSession {
    type Element = Element;

    async fn navigate(&self, url: &str) -> E2eResult<()> {
        debug!("Navigating to {}", url);
        self.client
            .goto(url)
            .await
            .map_err(|e| session_error(&format!("navigation to {} failed", url), e))
    }

    async fn title(&self) -> E2eResult<String> {
        self.client
            .title()
            .await
            .map_err(|e| session_error("failed to read title", e))
    }

    async fn find_elements(&self, selector: &Selector) -> E2eResult<Vec<Element>> {
        self.client
            .find_all(selector.locator())
            .await
            .map_err(|e| session_error(&format!("lookup of {} failed", selector), e))
    }

    async fn text(&self, element: &Element) -> E2eResult<String> {
        element
            .text()
            .await
            .map_err(|e| session_error("failed to read element text", e))
    }

    async fn is_displayed(&self, element: &Element) -> E2eResult<bool> {
        element
            .is_displayed()
            .await
            .map_err(|e| session_error("failed to read element visibility", e))
    }

    async fn click(&self, element: &Element) -> E2eResult<()> {
        element
            .click()
            .await
            .map(|_| ())
            .map_err(|e| session_error("click failed", e))
    }

    async fn screenshot(&self) -> E2eResult<Vec<u8>> {
        self.client
            .screenshot()
            .await
            .map_err(|e| session_error("screenshot failed", e))
    }
}
