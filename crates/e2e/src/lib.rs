//! OliveTin E2E Test Harness
//!
//! This crate drives OliveTin through a real browser under different
//! deployment profiles:
//! - Starts OliveTin as a subprocess with a named configuration profile
//! - Talks to the browser through a WebDriver session
//! - Waits for asynchronous UI state with bounded polling
//! - Saves a screenshot for every failed test
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                  ScenarioLifecycle (Rust)                   │
//! ├─────────────────────────────────────────────────────────────┤
//! │  setup()     -> ProcessRunner::start(profile)               │
//! │  run_test()  -> TestCase::run(&TestContext)                 │
//! │                   ├── Locators   (root, buttons, dialog)    │
//! │                   └── wait_for   (bounded polling)          │
//! │              -> FailureCapture::on_test_failure (failed)    │
//! │  teardown()  -> ProcessRunner::stop()                       │
//! ├─────────────────────────────────────────────────────────────┤
//! │  Suites                                                     │
//! │    ├── built in: suites::subpath                            │
//! │    └── YAML: ScenarioFile -> Suite                          │
//! └─────────────────────────────────────────────────────────────┘
//! ```

pub mod capture;
pub mod config;
pub mod error;
pub mod lifecycle;
pub mod locators;
pub mod profile;
pub mod scenario;
pub mod server;
pub mod session;
pub mod suites;
pub mod wait;

pub use capture::{FailureCapture, TestIdentity};
pub use config::HarnessConfig;
pub use error::{E2eError, E2eResult};
pub use lifecycle::{ScenarioLifecycle, Suite, SuiteReport, TestCase, TestContext};
pub use server::{AppRunner, ProcessRunner};
pub use session::{BrowserSession, Selector, WebDriverSession};
pub use wait::{wait_for, Observation, WaitConfig};
