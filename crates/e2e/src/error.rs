//! Error types for the E2E harness

use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum E2eError {
    /// The application under test never became ready. Fatal to the suite.
    #[error("Application failed to start: {0}")]
    Startup(String),

    #[error("Configuration profile not found: {name} (looked in {path})")]
    ProfileNotFound { name: String, path: String },

    /// `base_url()` was queried before a successful start.
    #[error("Application is not running")]
    NotRunning,

    /// An expected UI state never appeared.
    #[error("Timeout waiting for {condition} after {timeout:?} (last observed: {last_observed})")]
    Timeout {
        condition: String,
        timeout: Duration,
        last_observed: String,
    },

    #[error("Wait for {0} was cancelled")]
    Cancelled(String),

    #[error("Element not found: {selector}")]
    ElementNotFound { selector: String },

    #[error("Assertion failed: {0}")]
    AssertionFailed(String),

    #[error("Browser session error: {0}")]
    Session(String),

    #[error("Scenario parse error: {0}")]
    ScenarioParse(String),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("TOML error: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

pub type E2eResult<T> = Result<T, E2eError>;

/// Fails the current test with `AssertionFailed` when `cond` is false.
#[macro_export]
macro_rules! ensure {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::error::E2eError::AssertionFailed(format!($($arg)+)));
        }
    };
}

/// Fails the current test when the two values differ.
#[macro_export]
macro_rules! ensure_eq {
    ($left:expr, $right:expr) => {{
        let (left, right) = (&$left, &$right);
        if left != right {
            return Err($crate::error::E2eError::AssertionFailed(format!(
                "expected {:?}, got {:?} ({})",
                right,
                left,
                stringify!($left)
            )));
        }
    }};
}
