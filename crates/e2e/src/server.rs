//! Application management - spawning and health checking OliveTin

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpStream;
use tokio::process::{Child, Command};
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::error::{E2eError, E2eResult};
use crate::profile::ConfigurationProfile;

/// Placeholder in `ServerConfig::args` replaced by the profile directory
pub const CONFIGDIR_PLACEHOLDER: &str = "{configdir}";

/// Lines of application output kept for startup diagnostics
const OUTPUT_TAIL_LINES: usize = 40;

const READINESS_POLL_INTERVAL: Duration = Duration::from_millis(100);
const READINESS_REQUEST_TIMEOUT: Duration = Duration::from_secs(2);
const PORT_CHECK_TIMEOUT: Duration = Duration::from_millis(500);

/// Lifecycle of the application under test, keyed by profile name.
///
/// `ScenarioLifecycle` drives this; `ProcessRunner` is the real
/// implementation.
#[async_trait]
pub trait AppRunner: Send {
    /// Start the application with the named profile and block until ready
    async fn start(&mut self, profile: &str) -> E2eResult<()>;

    /// Root URL of the running instance, subpath included
    fn base_url(&self) -> E2eResult<&str>;

    /// Stop the instance. A no-op when nothing is running.
    async fn stop(&mut self) -> E2eResult<()>;
}

/// Configuration for spawning the application
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Path to the OliveTin binary
    pub binary_path: PathBuf,

    /// Arguments; `{configdir}` expands to the profile directory
    pub args: Vec<String>,

    /// Directory holding one sub-directory per profile
    pub configs_dir: PathBuf,

    /// Exported as `PORT`; used when a profile pins no listen address
    pub base_port: u16,

    /// Path probed for readiness, relative to the base URL
    pub readiness_path: String,

    /// Timeout for the application to become ready
    pub startup_timeout_ms: u64,

    /// Grace period between SIGTERM and a forced kill
    pub stop_timeout_ms: u64,

    /// Extra environment for the child
    pub env: BTreeMap<String, String>,
}

impl ServerConfig {
    pub fn startup_timeout(&self) -> Duration {
        Duration::from_millis(self.startup_timeout_ms)
    }

    pub fn stop_timeout(&self) -> Duration {
        Duration::from_millis(self.stop_timeout_ms)
    }

    fn expand_args(&self, profile: &ConfigurationProfile) -> Vec<String> {
        let dir = profile.config_dir.to_string_lossy();
        self.args
            .iter()
            .map(|arg| arg.replace(CONFIGDIR_PLACEHOLDER, &dir))
            .collect()
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            binary_path: PathBuf::from("OliveTin"),
            args: vec!["-configdir".to_string(), CONFIGDIR_PLACEHOLDER.to_string()],
            configs_dir: PathBuf::from("configs"),
            base_port: 1337,
            readiness_path: "/".to_string(),
            startup_timeout_ms: 30_000,
            stop_timeout_ms: 5_000,
            env: BTreeMap::new(),
        }
    }
}

/// Bounded tail of the child's stdout/stderr
#[derive(Debug, Clone)]
pub struct OutputTail {
    lines: Arc<Mutex<VecDeque<String>>>,
    capacity: usize,
}

impl OutputTail {
    fn new(capacity: usize) -> Self {
        Self {
            lines: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    fn push(&self, line: String) {
        let mut lines = self.lines.lock();
        if lines.len() == self.capacity {
            lines.pop_front();
        }
        lines.push_back(line);
    }

    /// Snapshot of the most recent lines, oldest first
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().iter().cloned().collect()
    }

    /// Forward a child stream into tracing, keeping the tail
    fn forward<R>(&self, stream: R, source: &'static str)
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let tail = self.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(stream).lines();
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "olivetin_e2e::app", stream = source, "{}", line);
                tail.push(line);
            }
        });
    }

    fn render(&self) -> String {
        let lines = self.lines();
        if lines.is_empty() {
            "(no output)".to_string()
        } else {
            lines.join("\n")
        }
    }
}

/// The live application process and where to reach it
pub struct RunningInstance {
    profile: ConfigurationProfile,
    child: Child,
    base_url: String,
    output: OutputTail,
}

impl RunningInstance {
    pub fn profile(&self) -> &ConfigurationProfile {
        &self.profile
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.id()
    }

    /// Most recent application output, oldest first
    pub fn recent_output(&self) -> Vec<String> {
        self.output.lines()
    }

    /// Wait for the readiness URL to answer with a success status
    async fn wait_until_ready(&mut self, readiness_path: &str, deadline: Duration) -> E2eResult<()> {
        let readiness_url = format!(
            "{}/{}",
            self.base_url,
            readiness_path.trim_start_matches('/')
        );
        let client = reqwest::Client::builder().build()?;

        let start = Instant::now();
        let mut attempts = 0;

        while start.elapsed() < deadline {
            attempts += 1;

            if let Some(status) = self.child.try_wait()? {
                return Err(self.exited_early(status));
            }

            let remaining = deadline.saturating_sub(start.elapsed());
            match client
                .get(&readiness_url)
                .timeout(remaining.min(READINESS_REQUEST_TIMEOUT))
                .send()
                .await
            {
                Ok(resp) if resp.status().is_success() => {
                    // Something answered; make sure our child is still the one serving
                    if let Some(status) = self.child.try_wait()? {
                        return Err(self.exited_early(status));
                    }
                    debug!("Readiness reached after {} attempt(s)", attempts);
                    return Ok(());
                }
                Ok(resp) => {
                    warn!("Readiness check returned {}", resp.status());
                }
                Err(e) => {
                    if attempts == 1 {
                        info!("Waiting for {} to become ready...", readiness_url);
                    }
                    // Connection refused is expected while the app is starting
                    if !e.is_connect() && !e.is_timeout() {
                        warn!("Readiness check error: {}", e);
                    }
                }
            }

            sleep(READINESS_POLL_INTERVAL).await;
        }

        if let Some(status) = self.child.try_wait()? {
            return Err(self.exited_early(status));
        }

        Err(E2eError::Startup(format!(
            "{} not ready after {:?} ({} attempts); last output:\n{}",
            readiness_url,
            deadline,
            attempts,
            self.output.render()
        )))
    }

    fn exited_early(&self, status: ExitStatus) -> E2eError {
        E2eError::Startup(format!(
            "process exited with {} before becoming ready; last output:\n{}",
            status,
            self.output.render()
        ))
    }

    /// Terminate the process, gracefully if it allows
    async fn terminate(&mut self, grace: Duration) -> E2eResult<()> {
        if let Some(status) = self.child.try_wait()? {
            debug!("Application already exited with {}", status);
            return Ok(());
        }

        #[cfg(unix)]
        {
            use nix::sys::signal::{kill, Signal};
            use nix::unistd::Pid;

            if let Some(pid) = self.child.id() {
                if kill(Pid::from_raw(pid as i32), Signal::SIGTERM).is_ok() {
                    match timeout(grace, self.child.wait()).await {
                        Ok(Ok(status)) => {
                            debug!("Application exited with {}", status);
                            return Ok(());
                        }
                        Ok(Err(e)) => return Err(e.into()),
                        Err(_) => warn!("Application ignored SIGTERM for {:?}, killing", grace),
                    }
                }
            }
        }

        #[cfg(not(unix))]
        let _ = grace;

        self.child.kill().await?;
        Ok(())
    }
}

/// Starts and stops OliveTin for one suite at a time
pub struct ProcessRunner {
    config: ServerConfig,
    instance: Option<RunningInstance>,
}

impl ProcessRunner {
    pub fn new(config: ServerConfig) -> Self {
        Self {
            config,
            instance: None,
        }
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    pub fn instance(&self) -> Option<&RunningInstance> {
        self.instance.as_ref()
    }

    pub fn is_running(&self) -> bool {
        self.instance.is_some()
    }

    fn spawn(&self, profile: ConfigurationProfile, base_url: String) -> E2eResult<RunningInstance> {
        info!(
            "Spawning {} for profile '{}' at {}",
            self.config.binary_path.display(),
            profile.name,
            base_url
        );

        let mut cmd = Command::new(&self.config.binary_path);
        cmd.args(self.config.expand_args(&profile))
            .env("PORT", self.config.base_port.to_string())
            .envs(&self.config.env)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd.spawn().map_err(|e| {
            E2eError::Startup(format!(
                "Failed to spawn {}: {}",
                self.config.binary_path.display(),
                e
            ))
        })?;

        let output = OutputTail::new(OUTPUT_TAIL_LINES);
        if let Some(stdout) = child.stdout.take() {
            output.forward(stdout, "stdout");
        }
        if let Some(stderr) = child.stderr.take() {
            output.forward(stderr, "stderr");
        }

        Ok(RunningInstance {
            profile,
            child,
            base_url,
            output,
        })
    }
}

#[async_trait]
impl AppRunner for ProcessRunner {
    async fn start(&mut self, profile_name: &str) -> E2eResult<()> {
        if let Some(instance) = &self.instance {
            if instance.profile.name == profile_name {
                return Ok(()); // Already running
            }
            return Err(E2eError::Startup(format!(
                "cannot start '{}': profile '{}' is still running",
                profile_name, instance.profile.name
            )));
        }

        let profile = ConfigurationProfile::resolve(&self.config.configs_dir, profile_name)
            .map_err(|e| E2eError::Startup(e.to_string()))?;

        let base_url = profile
            .base_url(self.config.base_port)
            .map_err(|e| E2eError::Startup(e.to_string()))?;
        ensure_port_free(&base_url).await?;

        let mut instance = self.spawn(profile, base_url)?;

        match instance
            .wait_until_ready(&self.config.readiness_path, self.config.startup_timeout())
            .await
        {
            Ok(()) => {
                info!("Application is ready at {}", instance.base_url);
                self.instance = Some(instance);
                Ok(())
            }
            Err(e) => {
                // Reap whatever did start before reporting
                if let Err(stop_err) = instance.terminate(self.config.stop_timeout()).await {
                    warn!("Cleanup after failed start also failed: {}", stop_err);
                }
                Err(e)
            }
        }
    }

    fn base_url(&self) -> E2eResult<&str> {
        self.instance
            .as_ref()
            .map(RunningInstance::base_url)
            .ok_or(E2eError::NotRunning)
    }

    async fn stop(&mut self) -> E2eResult<()> {
        let Some(mut instance) = self.instance.take() else {
            return Ok(());
        };

        info!(
            "Stopping application for profile '{}' (pid: {:?})",
            instance.profile.name,
            instance.pid()
        );
        instance.terminate(self.config.stop_timeout()).await
    }
}

/// Fail if something already accepts connections where the instance will
/// listen. Its answers would otherwise pass for our child's readiness.
async fn ensure_port_free(base_url: &str) -> E2eResult<()> {
    let url = reqwest::Url::parse(base_url)
        .map_err(|e| E2eError::Startup(format!("invalid base URL {}: {}", base_url, e)))?;
    let host = url
        .host_str()
        .ok_or_else(|| E2eError::Startup(format!("base URL without host: {}", base_url)))?
        .trim_start_matches('[')
        .trim_end_matches(']')
        .to_string();
    let port = url.port_or_known_default().unwrap_or(80);

    match timeout(PORT_CHECK_TIMEOUT, TcpStream::connect((host.as_str(), port))).await {
        Ok(Ok(_)) => Err(E2eError::Startup(format!(
            "port already in use: {}:{} accepts connections before the application started",
            host, port
        ))),
        _ => Ok(()),
    }
}

impl Drop for ProcessRunner {
    fn drop(&mut self) {
        if let Some(instance) = self.instance.as_mut() {
            warn!("ProcessRunner dropped while running - killing application");
            let _ = instance.child.start_kill();
        }
    }
}
