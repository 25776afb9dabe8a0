//! Harness configuration
//!
//! Layered: defaults, then an optional TOML file, then `OLIVETIN_E2E_*`
//! environment variables. The runner applies CLI flags last.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::error::{E2eError, E2eResult};
use crate::locators::UiSelectors;
use crate::server::ServerConfig;
use crate::session::WebDriverConfig;
use crate::wait::WaitConfig;

/// Prefix for environment overrides
pub const ENV_PREFIX: &str = "OLIVETIN_E2E_";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HarnessConfig {
    pub server: ServerConfig,
    pub webdriver: WebDriverConfig,
    pub wait: WaitSettings,
    pub selectors: UiSelectors,

    /// Directory containing scenario YAML files
    pub scenarios_dir: PathBuf,

    /// Output directory for the JSON report
    pub output_dir: PathBuf,

    /// Where failure screenshots go
    pub diagnostics_dir: PathBuf,

    /// Capture a screenshot when a test fails
    pub capture_failures: bool,
}

impl Default for HarnessConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            webdriver: WebDriverConfig::default(),
            wait: WaitSettings::default(),
            selectors: UiSelectors::default(),
            scenarios_dir: PathBuf::from("scenarios"),
            output_dir: PathBuf::from("test-results"),
            diagnostics_dir: PathBuf::from("test-results/screenshots"),
            capture_failures: true,
        }
    }
}

/// Default wait timing, in milliseconds for readable TOML
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct WaitSettings {
    pub timeout_ms: u64,
    pub poll_interval_ms: u64,
}

impl Default for WaitSettings {
    fn default() -> Self {
        Self {
            timeout_ms: 5_000,
            poll_interval_ms: 100,
        }
    }
}

impl WaitSettings {
    pub fn to_wait_config(self) -> WaitConfig {
        WaitConfig::new(
            Duration::from_millis(self.timeout_ms),
            Duration::from_millis(self.poll_interval_ms),
        )
    }
}

impl HarnessConfig {
    /// Defaults, overlaid with `path` if given, overlaid with the environment
    pub fn load(path: Option<&Path>) -> E2eResult<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> E2eResult<Self> {
        debug!("Loading harness config from {}", path.display());
        let content = std::fs::read_to_string(path)?;
        Ok(toml::from_str(&content)?)
    }

    /// Apply `OLIVETIN_E2E_*` overrides using `lookup` to read variables
    pub fn apply_env<F>(&mut self, lookup: F) -> E2eResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{}{}", ENV_PREFIX, name));

        if let Some(v) = var("BINARY") {
            self.server.binary_path = PathBuf::from(v);
        }
        if let Some(v) = var("CONFIGS_DIR") {
            self.server.configs_dir = PathBuf::from(v);
        }
        if let Some(v) = var("PORT") {
            self.server.base_port = parse_env("PORT", &v)?;
        }
        if let Some(v) = var("STARTUP_TIMEOUT_MS") {
            self.server.startup_timeout_ms = parse_env("STARTUP_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = var("WEBDRIVER_URL") {
            self.webdriver.url = v;
        }
        if let Some(v) = var("BROWSER") {
            self.webdriver.browser = v.parse()?;
        }
        if let Some(v) = var("HEADLESS") {
            self.webdriver.headless = parse_env("HEADLESS", &v)?;
        }
        if let Some(v) = var("WAIT_TIMEOUT_MS") {
            self.wait.timeout_ms = parse_env("WAIT_TIMEOUT_MS", &v)?;
        }
        if let Some(v) = var("DIAGNOSTICS_DIR") {
            self.diagnostics_dir = PathBuf::from(v);
        }
        Ok(())
    }

    pub fn validate(&self) -> E2eResult<()> {
        if self.wait.poll_interval_ms == 0 {
            return Err(E2eError::Config("wait.poll_interval_ms must be > 0".to_string()));
        }
        if self.wait.poll_interval_ms > self.wait.timeout_ms {
            return Err(E2eError::Config(
                "wait.poll_interval_ms must not exceed wait.timeout_ms".to_string(),
            ));
        }
        if self.server.startup_timeout_ms == 0 {
            return Err(E2eError::Config(
                "server.startup_timeout_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

fn parse_env<T: std::str::FromStr>(name: &str, value: &str) -> E2eResult<T> {
    value.trim().parse().map_err(|_| {
        E2eError::Config(format!("invalid value for {}{}: {:?}", ENV_PREFIX, name, value))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::{Browser, Selector};
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = HarnessConfig::default();
        assert_eq!(config.server.base_port, 1337);
        assert_eq!(config.webdriver.url, "http://localhost:4444");
        assert!(config.capture_failures);
        config.validate().unwrap();
    }

    #[test]
    fn test_partial_toml() {
        let config: HarnessConfig = toml::from_str(
            r##"
            diagnostics_dir = "out/shots"

            [server]
            binary_path = "/usr/local/bin/OliveTin"
            configs_dir = "integration-tests/configs"

            [webdriver]
            browser = "firefox"

            [wait]
            timeout_ms = 2000

            [selectors]
            root_ready = { css = "#app[ready]" }
            "##,
        )
        .unwrap();

        assert_eq!(config.server.binary_path, PathBuf::from("/usr/local/bin/OliveTin"));
        assert_eq!(config.server.base_port, 1337);
        assert_eq!(config.webdriver.browser, Browser::Firefox);
        assert_eq!(config.wait.timeout_ms, 2000);
        assert_eq!(config.wait.poll_interval_ms, 100);
        assert_eq!(config.selectors.root_ready, Selector::css("#app[ready]"));
        assert_eq!(config.diagnostics_dir, PathBuf::from("out/shots"));
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = [
            ("OLIVETIN_E2E_PORT", "4337"),
            ("OLIVETIN_E2E_BROWSER", "firefox"),
            ("OLIVETIN_E2E_HEADLESS", "false"),
            ("OLIVETIN_E2E_WEBDRIVER_URL", "http://selenium:4444"),
        ]
        .into_iter()
        .collect();

        let mut config = HarnessConfig::default();
        config
            .apply_env(|k| env.get(k).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.base_port, 4337);
        assert_eq!(config.webdriver.browser, Browser::Firefox);
        assert!(!config.webdriver.headless);
        assert_eq!(config.webdriver.url, "http://selenium:4444");
    }

    #[test]
    fn test_bad_env_value() {
        let mut config = HarnessConfig::default();
        let err = config
            .apply_env(|k| (k == "OLIVETIN_E2E_PORT").then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(err, E2eError::Config(ref msg) if msg.contains("OLIVETIN_E2E_PORT")));
    }

    #[test]
    fn test_validate_rejects_zero_interval() {
        let mut config = HarnessConfig::default();
        config.wait.poll_interval_ms = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_file() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("harness.toml");
        std::fs::write(&path, "output_dir = \"custom\"\n").unwrap();

        let config = HarnessConfig::from_file(&path).unwrap();
        assert_eq!(config.output_dir, PathBuf::from("custom"));
    }
}
