//! Named queries for the regions of the OliveTin UI

use serde::{Deserialize, Serialize};

use crate::error::E2eResult;
use crate::session::{BrowserSession, Selector};
use crate::wait::{until_present, WaitConfig};

/// Selectors for the page regions the suites talk about.
///
/// Defaults match the stock OliveTin web UI; override them in the harness
/// config when testing a themed build.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct UiSelectors {
    /// Present once the UI has finished its first load
    pub root_ready: Selector,
    /// Attribute that carries an action button's title
    pub action_title_attribute: String,
    pub results_dialog: Selector,
    pub dialog_title: Selector,
    pub error_region: Selector,
}

impl Default for UiSelectors {
    fn default() -> Self {
        Self {
            root_ready: Selector::css("body[initial-marshal-complete]"),
            action_title_attribute: "title".to_string(),
            results_dialog: Selector::id("execution-results-popup"),
            dialog_title: Selector::id("execution-dialog-title"),
            error_region: Selector::id("big-error"),
        }
    }
}

/// Page regions that can be referred to by name in scenario files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NamedRegion {
    Root,
    ResultsDialog,
    DialogTitle,
    ErrorRegion,
}

impl UiSelectors {
    pub fn region(&self, region: NamedRegion) -> &Selector {
        match region {
            NamedRegion::Root => &self.root_ready,
            NamedRegion::ResultsDialog => &self.results_dialog,
            NamedRegion::DialogTitle => &self.dialog_title,
            NamedRegion::ErrorRegion => &self.error_region,
        }
    }

    /// Buttons whose title attribute equals `title`
    pub fn action_button(&self, title: &str) -> Selector {
        Selector::attribute_equals(&self.action_title_attribute, title)
    }
}

/// Locators bound to one session and one running instance
pub struct Locators<'a, S: BrowserSession> {
    session: &'a S,
    base_url: &'a str,
    selectors: &'a UiSelectors,
    wait: &'a WaitConfig,
}

impl<'a, S: BrowserSession> Locators<'a, S> {
    pub fn new(
        session: &'a S,
        base_url: &'a str,
        selectors: &'a UiSelectors,
        wait: &'a WaitConfig,
    ) -> Self {
        Self {
            session,
            base_url,
            selectors,
            wait,
        }
    }

    /// Load the application root and wait for the first render to finish
    pub async fn root_and_wait(&self) -> E2eResult<S::Element> {
        self.session.navigate(&format!("{}/", self.base_url)).await?;
        until_present(self.session, &self.selectors.root_ready, self.wait).await
    }

    /// Every action button titled `title`, in page order
    pub async fn action_buttons(&self, title: &str) -> E2eResult<Vec<S::Element>> {
        self.session
            .find_elements(&self.selectors.action_button(title))
            .await
    }

    pub async fn action_button(&self, title: &str) -> E2eResult<S::Element> {
        self.session
            .find_element(&self.selectors.action_button(title))
            .await
    }

    pub async fn results_dialog(&self) -> E2eResult<S::Element> {
        self.session.find_element(&self.selectors.results_dialog).await
    }

    pub async fn dialog_title(&self) -> E2eResult<S::Element> {
        self.session.find_element(&self.selectors.dialog_title).await
    }

    pub async fn error_region(&self) -> E2eResult<S::Element> {
        self.session.find_element(&self.selectors.error_region).await
    }
}
