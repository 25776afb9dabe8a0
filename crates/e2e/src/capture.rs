//! Screenshot capture for failed tests

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::E2eResult;
use crate::session::BrowserSession;

/// Which test a result or artifact belongs to
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TestIdentity {
    pub suite: String,
    pub title: String,
}

impl TestIdentity {
    pub fn new(suite: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            suite: suite.into(),
            title: title.into(),
        }
    }

    /// Suite and test title joined, as a reporter would print them
    pub fn full_title(&self) -> String {
        format!("{} {}", self.suite, self.title)
    }

    /// Filesystem-safe form of the full title
    pub fn file_stem(&self) -> String {
        let mut stem = String::new();
        for c in self.full_title().chars() {
            if c.is_ascii_alphanumeric() || c == '_' {
                stem.push(c);
            } else if !stem.ends_with('-') {
                stem.push('-');
            }
        }

        let stem = stem.trim_matches('-');
        if stem.is_empty() {
            "unnamed".to_string()
        } else {
            stem.to_string()
        }
    }
}

impl fmt::Display for TestIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.full_title())
    }
}

/// A screenshot written for a failed test
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapturedArtifact {
    pub path: PathBuf,
    pub sha256: String,
    pub size: usize,
}

/// Writes one screenshot per failed test into the diagnostics directory.
///
/// Capture is best-effort. Whatever goes wrong here is logged and swallowed
/// so the test's own failure stays the reported one.
#[derive(Debug, Clone)]
pub struct FailureCapture {
    dir: PathBuf,
    enabled: bool,
}

impl FailureCapture {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            enabled: true,
        }
    }

    /// A capture that never touches the session or the filesystem
    pub fn disabled() -> Self {
        Self {
            dir: PathBuf::new(),
            enabled: false,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path the screenshot for `identity` is written to
    pub fn artifact_path(&self, identity: &TestIdentity) -> PathBuf {
        self.dir.join(format!("{}.png", identity.file_stem()))
    }

    /// Snapshot the browser for a failed test
    pub async fn on_test_failure<S: BrowserSession>(
        &self,
        identity: &TestIdentity,
        session: &S,
    ) -> Option<CapturedArtifact> {
        if !self.enabled {
            return None;
        }

        match self.capture(identity, session).await {
            Ok(artifact) => {
                info!(
                    "Saved failure screenshot for '{}' to {} (sha256 {})",
                    identity,
                    artifact.path.display(),
                    &artifact.sha256[..12]
                );
                Some(artifact)
            }
            Err(e) => {
                warn!("Could not capture screenshot for '{}': {}", identity, e);
                None
            }
        }
    }

    async fn capture<S: BrowserSession>(
        &self,
        identity: &TestIdentity,
        session: &S,
    ) -> E2eResult<CapturedArtifact> {
        let png = session.screenshot().await?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.artifact_path(identity);
        tokio::fs::write(&path, &png).await?;

        Ok(CapturedArtifact {
            path,
            sha256: hex::encode(Sha256::digest(&png)),
            size: png.len(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_case::test_case;

    #[test_case("config: subpath", "Page title", "config-subpath-Page-title")]
    #[test_case("config: subpath", "Start dir action (popup)", "config-subpath-Start-dir-action-popup")]
    #[test_case("suite", "snake_case stays", "suite-snake_case-stays")]
    #[test_case("", "///", "unnamed")]
    fn test_file_stem(suite: &str, title: &str, expected: &str) {
        assert_eq!(TestIdentity::new(suite, title).file_stem(), expected);
    }

    #[test]
    fn test_artifact_path() {
        let capture = FailureCapture::new("diagnostics");
        let identity = TestIdentity::new("config: subpath", "Page title");
        assert_eq!(
            capture.artifact_path(&identity),
            PathBuf::from("diagnostics/config-subpath-Page-title.png")
        );
    }

    #[test]
    fn test_full_title() {
        let identity = TestIdentity::new("config: subpath", "Page title");
        assert_eq!(identity.to_string(), "config: subpath Page title");
    }
}
