//! Configuration profiles - named OliveTin config directories

use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::error::{E2eError, E2eResult};

/// File OliveTin reads from its `-configdir`
pub const CONFIG_FILE_NAME: &str = "config.yaml";

/// A resolved configuration profile.
///
/// A profile named `subpath` lives in `<configs_dir>/subpath/config.yaml`.
/// Only the settings that decide where the application can be reached are
/// read here; the rest of the file is OliveTin's business.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigurationProfile {
    pub name: String,

    /// Directory passed to the application as `-configdir`
    pub config_dir: PathBuf,

    /// URL subpath, normalized to `/segment` or empty
    pub subpath: String,

    /// Single HTTP frontend listen address, if the profile pins one
    pub listen_address: Option<String>,
}

/// The subset of OliveTin's `config.yaml` the harness cares about
#[derive(Debug, Default, Deserialize)]
struct AppConfigFile {
    #[serde(default, alias = "Subpath")]
    subpath: Option<String>,

    #[serde(
        default,
        rename = "listenAddressSingleHTTPFrontend",
        alias = "ListenAddressSingleHTTPFrontend",
        alias = "listenaddresssinglehttpfrontend"
    )]
    listen_address: Option<String>,
}

impl ConfigurationProfile {
    /// Resolve a profile by name under `configs_dir`
    pub fn resolve(configs_dir: &Path, name: &str) -> E2eResult<Self> {
        if name.is_empty()
            || name.contains(['/', '\\'])
            || name == "."
            || name == ".."
        {
            return Err(E2eError::Config(format!("invalid profile name: {:?}", name)));
        }

        let config_dir = configs_dir.join(name);
        let config_file = config_dir.join(CONFIG_FILE_NAME);

        if !config_file.is_file() {
            return Err(E2eError::ProfileNotFound {
                name: name.to_string(),
                path: config_file.display().to_string(),
            });
        }

        let content = std::fs::read_to_string(&config_file)?;
        // An empty file is a valid OliveTin config
        let parsed: AppConfigFile = if content.trim().is_empty() {
            AppConfigFile::default()
        } else {
            serde_yaml::from_str(&content)?
        };

        let profile = Self {
            name: name.to_string(),
            config_dir,
            subpath: normalize_subpath(parsed.subpath.as_deref().unwrap_or_default()),
            listen_address: parsed
                .listen_address
                .map(|a| a.trim().to_string())
                .filter(|a| !a.is_empty()),
        };

        debug!("Resolved profile {:?}", profile);
        Ok(profile)
    }

    /// Root URL the browser should use, including the subpath, without a
    /// trailing slash.
    ///
    /// Without a pinned listen address OliveTin binds `0.0.0.0:<base_port>`.
    pub fn base_url(&self, base_port: u16) -> E2eResult<String> {
        let (host, port) = match &self.listen_address {
            Some(addr) => split_listen_address(addr)?,
            None => ("localhost".to_string(), base_port),
        };

        Ok(format!("http://{}:{}{}", host, port, self.subpath))
    }
}

/// `subpath/`, `/subpath/` and `/subpath` all become `/subpath`; `/` becomes empty
fn normalize_subpath(raw: &str) -> String {
    let trimmed = raw.trim().trim_matches('/');
    if trimmed.is_empty() {
        String::new()
    } else {
        format!("/{}", trimmed)
    }
}

/// Split `host:port`, mapping wildcard binds to `localhost`
fn split_listen_address(addr: &str) -> E2eResult<(String, u16)> {
    let (host, port) = addr
        .rsplit_once(':')
        .ok_or_else(|| E2eError::Config(format!("listen address without port: {}", addr)))?;

    let port: u16 = port
        .parse()
        .map_err(|_| E2eError::Config(format!("invalid port in listen address: {}", addr)))?;

    let host = match host.trim_start_matches('[').trim_end_matches(']') {
        "" | "0.0.0.0" | "::" => "localhost".to_string(),
        _ => host.to_string(),
    };

    Ok((host, port))
}
