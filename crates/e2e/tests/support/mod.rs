//! In-memory stand-ins for the browser and the application process.
//!
//! `FakeSession` keeps a flat list of nodes, each matching a fixed set of
//! selectors. Mutations can be scheduled against the tokio clock, so tests
//! running with paused time see the page change exactly when they expect.

#![allow(dead_code)]

use async_trait::async_trait;
use olivetin_e2e::locators::UiSelectors;
use olivetin_e2e::{AppRunner, BrowserSession, E2eError, E2eResult, Selector};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

pub const BASE_URL: &str = "http://localhost:1337/subpath";

/// Bytes handed out as a screenshot
pub const FAKE_PNG: &[u8] = b"\x89PNG\r\n\x1a\nfake";

pub type Effect = Arc<dyn Fn(&mut Dom) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct Node {
    pub key: String,
    pub matches: Vec<Selector>,
    pub text: String,
    pub displayed: bool,
}

#[derive(Default)]
pub struct Dom {
    pub title: String,
    pub nodes: Vec<Node>,
}

impl Dom {
    pub fn add(&mut self, key: &str, matches: &[Selector], text: &str, displayed: bool) {
        self.nodes.push(Node {
            key: key.to_string(),
            matches: matches.to_vec(),
            text: text.to_string(),
            displayed,
        });
    }

    pub fn remove(&mut self, key: &str) {
        self.nodes.retain(|n| n.key != key);
    }

    pub fn set_text(&mut self, key: &str, text: &str) {
        if let Some(node) = self.node_mut(key) {
            node.text = text.to_string();
        }
    }

    pub fn set_displayed(&mut self, key: &str, displayed: bool) {
        if let Some(node) = self.node_mut(key) {
            node.displayed = displayed;
        }
    }

    fn node(&self, key: &str) -> Option<&Node> {
        self.nodes.iter().find(|n| n.key == key)
    }

    fn node_mut(&mut self, key: &str) -> Option<&mut Node> {
        self.nodes.iter_mut().find(|n| n.key == key)
    }
}

#[derive(Default)]
struct State {
    dom: Dom,
    pending: Vec<(Instant, Effect)>,
    on_navigate: Vec<(Duration, Effect)>,
    on_click: HashMap<String, Vec<(Duration, Effect)>>,
    visited: Vec<String>,
    clicks: Vec<String>,
    screenshots: usize,
    fail_screenshots: bool,
}

impl State {
    /// Apply every scheduled mutation whose time has come
    fn settle(&mut self) {
        let now = Instant::now();
        let mut due = Vec::new();
        self.pending.retain(|(at, effect)| {
            if *at <= now {
                due.push((*at, effect.clone()));
                false
            } else {
                true
            }
        });
        due.sort_by_key(|(at, _)| *at);
        for (_, effect) in due {
            effect(&mut self.dom);
        }
    }

    fn schedule(&mut self, effects: Vec<(Duration, Effect)>) {
        let now = Instant::now();
        for (delay, effect) in effects {
            self.pending.push((now + delay, effect));
        }
        self.settle();
    }

    fn live(&self, key: &str) -> E2eResult<&Node> {
        self.dom
            .node(key)
            .ok_or_else(|| E2eError::Session(format!("stale element reference: {}", key)))
    }
}

pub struct FakeSession {
    state: Mutex<State>,
}

impl FakeSession {
    pub fn new(title: &str) -> Self {
        let session = Self {
            state: Mutex::new(State::default()),
        };
        session.state.lock().dom.title = title.to_string();
        session
    }

    pub fn with_node(self, key: &str, matches: &[Selector], text: &str, displayed: bool) -> Self {
        self.state.lock().dom.add(key, matches, text, displayed);
        self
    }

    /// Run `effect` `delay` after every navigation
    pub fn on_navigate(self, delay: Duration, effect: impl Fn(&mut Dom) + Send + Sync + 'static) -> Self {
        self.state.lock().on_navigate.push((delay, Arc::new(effect)));
        self
    }

    /// Run `effect` `delay` after every click on `key`
    pub fn on_click(
        self,
        key: &str,
        delay: Duration,
        effect: impl Fn(&mut Dom) + Send + Sync + 'static,
    ) -> Self {
        self.state
            .lock()
            .on_click
            .entry(key.to_string())
            .or_default()
            .push((delay, Arc::new(effect)));
        self
    }

    pub fn failing_screenshots(self) -> Self {
        self.state.lock().fail_screenshots = true;
        self
    }

    pub fn mutate(&self, f: impl FnOnce(&mut Dom)) {
        f(&mut self.state.lock().dom);
    }

    pub fn visited(&self) -> Vec<String> {
        self.state.lock().visited.clone()
    }

    pub fn clicks(&self) -> Vec<String> {
        self.state.lock().clicks.clone()
    }

    pub fn screenshots(&self) -> usize {
        self.state.lock().screenshots
    }
}

#[async_trait]
impl BrowserSession for FakeSession {
    type Element = String;

    async fn navigate(&self, url: &str) -> E2eResult<()> {
        let mut state = self.state.lock();
        state.visited.push(url.to_string());
        let effects = state.on_navigate.clone();
        state.schedule(effects);
        Ok(())
    }

    async fn title(&self) -> E2eResult<String> {
        let mut state = self.state.lock();
        state.settle();
        Ok(state.dom.title.clone())
    }

    async fn find_elements(&self, selector: &Selector) -> E2eResult<Vec<String>> {
        let mut state = self.state.lock();
        state.settle();
        Ok(state
            .dom
            .nodes
            .iter()
            .filter(|n| n.matches.contains(selector))
            .map(|n| n.key.clone())
            .collect())
    }

    async fn text(&self, element: &String) -> E2eResult<String> {
        let mut state = self.state.lock();
        state.settle();
        Ok(state.live(element)?.text.clone())
    }

    async fn is_displayed(&self, element: &String) -> E2eResult<bool> {
        let mut state = self.state.lock();
        state.settle();
        Ok(state.live(element)?.displayed)
    }

    async fn click(&self, element: &String) -> E2eResult<()> {
        let mut state = self.state.lock();
        state.settle();
        state.live(element)?;
        state.clicks.push(element.clone());
        let effects = state.on_click.get(element).cloned().unwrap_or_default();
        state.schedule(effects);
        Ok(())
    }

    async fn screenshot(&self) -> E2eResult<Vec<u8>> {
        let mut state = self.state.lock();
        state.screenshots += 1;
        if state.fail_screenshots {
            return Err(E2eError::Session("screenshot failed: window gone".to_string()));
        }
        Ok(FAKE_PNG.to_vec())
    }
}

/// The OliveTin UI as the subpath suite expects it.
///
/// The first render completes 300ms after navigation. Clicking `dir-popup`
/// opens the results dialog after 100ms; its title fills in after 400ms.
pub fn olivetin_page() -> FakeSession {
    let ui = UiSelectors::default();
    FakeSession::new("OliveTin")
        .with_node("dir-popup", &[ui.action_button("dir-popup")], "dir-popup", true)
        .with_node("dialog", &[ui.results_dialog.clone()], "", false)
        .with_node("dialog-title", &[ui.dialog_title.clone()], "", true)
        .with_node("big-error", &[ui.error_region.clone()], "", false)
        .on_navigate(Duration::from_millis(300), move |dom| {
            dom.remove("body");
            dom.add("body", &[UiSelectors::default().root_ready], "", true);
        })
        .on_click("dir-popup", Duration::from_millis(100), |dom| {
            dom.set_displayed("dialog", true)
        })
        .on_click("dir-popup", Duration::from_millis(400), |dom| {
            dom.set_text("dialog-title", "dir-popup")
        })
}

/// Application runner that only records what it was asked to do
pub struct FakeRunner {
    pub base_url: String,
    pub running: bool,
    pub starts: Vec<String>,
    pub stops: usize,
    pub fail_start: bool,
    pub fail_stop: bool,
}

impl FakeRunner {
    pub fn new() -> Self {
        Self::with_base_url(BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Self {
        Self {
            base_url: base_url.to_string(),
            running: false,
            starts: Vec::new(),
            stops: 0,
            fail_start: false,
            fail_stop: false,
        }
    }

    pub fn failing_start() -> Self {
        Self {
            fail_start: true,
            ..Self::new()
        }
    }

    pub fn failing_stop() -> Self {
        Self {
            fail_stop: true,
            ..Self::new()
        }
    }
}

#[async_trait]
impl AppRunner for FakeRunner {
    async fn start(&mut self, profile: &str) -> E2eResult<()> {
        self.starts.push(profile.to_string());
        if self.fail_start {
            return Err(E2eError::Startup(format!(
                "process exited with exit status: 1 before becoming ready (profile {})",
                profile
            )));
        }
        self.running = true;
        Ok(())
    }

    fn base_url(&self) -> E2eResult<&str> {
        if self.running {
            Ok(&self.base_url)
        } else {
            Err(E2eError::NotRunning)
        }
    }

    async fn stop(&mut self) -> E2eResult<()> {
        self.stops += 1;
        let was_running = std::mem::replace(&mut self.running, false);
        if self.fail_stop && was_running {
            return Err(E2eError::Io(std::io::Error::new(
                std::io::ErrorKind::Other,
                "kill failed",
            )));
        }
        Ok(())
    }
}
