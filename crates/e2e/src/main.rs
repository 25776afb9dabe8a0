//! OliveTin E2E runner
//!
//! Starts OliveTin once per suite, drives it through WebDriver and writes a
//! JSON report. Exit code: 0 all passed, 1 a test or suite failed, 2 the
//! harness itself could not run.

use clap::Parser;
use serde::Serialize;
use std::path::PathBuf;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use olivetin_e2e::lifecycle::{ScenarioLifecycle, Suite, SuiteReport};
use olivetin_e2e::scenario::ScenarioFile;
use olivetin_e2e::session::WebDriverSession;
use olivetin_e2e::suites::{self, BUILTIN_SUITES};
use olivetin_e2e::{E2eError, E2eResult, FailureCapture, HarnessConfig, ProcessRunner};

#[derive(Parser, Debug)]
#[command(name = "olivetin-e2e")]
#[command(about = "Browser end-to-end tests for OliveTin")]
#[command(version)]
struct Args {
    /// Harness configuration file (TOML)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Run only the suite with this title or built-in name
    #[arg(short, long)]
    name: Option<String>,

    /// Run only YAML scenarios carrying this tag
    #[arg(short, long)]
    tag: Option<String>,

    /// Directory of YAML scenarios
    #[arg(short, long)]
    scenarios: Option<PathBuf>,

    /// Skip the suites compiled into the runner
    #[arg(long)]
    no_builtin: bool,

    /// Path to the OliveTin binary
    #[arg(long)]
    binary: Option<PathBuf>,

    /// Directory of configuration profiles
    #[arg(long)]
    configs_dir: Option<PathBuf>,

    /// WebDriver endpoint
    #[arg(long)]
    webdriver: Option<String>,

    /// Show the browser window
    #[arg(long)]
    visible: bool,

    /// Output directory for results
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Enable debug logging
    #[arg(short, long)]
    debug: bool,
}

/// Everything the run produced
#[derive(Debug, Serialize)]
struct RunReport {
    total: usize,
    passed: usize,
    failed: usize,
    suites: Vec<SuiteReport>,
}

impl RunReport {
    fn new(suites: Vec<SuiteReport>) -> Self {
        let passed: usize = suites.iter().map(SuiteReport::passed).sum();
        let failed: usize = suites.iter().map(SuiteReport::failed).sum();
        Self {
            total: passed + failed,
            passed,
            failed,
            suites,
        }
    }

    fn is_success(&self) -> bool {
        self.suites.iter().all(SuiteReport::is_success)
    }
}

fn main() {
    let args = Args::parse();

    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };

    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(filter)
        .init();

    let rt = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Error: failed to create tokio runtime: {}", e);
            std::process::exit(2);
        }
    };

    match rt.block_on(async_main(args)) {
        Ok(true) => std::process::exit(0),
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{:#}", e);
            std::process::exit(2);
        }
    }
}

fn load_config(args: &Args) -> E2eResult<HarnessConfig> {
    let mut config = HarnessConfig::load(args.config.as_deref())?;

    if let Some(binary) = &args.binary {
        config.server.binary_path = binary.clone();
    }
    if let Some(dir) = &args.configs_dir {
        config.server.configs_dir = dir.clone();
    }
    if let Some(url) = &args.webdriver {
        config.webdriver.url = url.clone();
    }
    if let Some(dir) = &args.scenarios {
        config.scenarios_dir = dir.clone();
    }
    if let Some(dir) = &args.output {
        config.output_dir = dir.clone();
    }
    if args.visible {
        config.webdriver.headless = false;
    }
    Ok(config)
}

fn collect_suites(args: &Args, config: &HarnessConfig) -> E2eResult<Vec<Suite<WebDriverSession>>> {
    let mut found = Vec::new();

    if !args.no_builtin {
        found.extend(BUILTIN_SUITES.iter().filter_map(|name| suites::builtin(name)));
    }

    if config.scenarios_dir.is_dir() {
        for scenario in ScenarioFile::load_all(&config.scenarios_dir)? {
            if args.tag.as_deref().map_or(true, |tag| scenario.has_tag(tag)) {
                found.push(scenario.into_suite());
            }
        }
    } else if args.scenarios.is_some() {
        return Err(E2eError::Config(format!(
            "scenarios directory not found: {}",
            config.scenarios_dir.display()
        )));
    }

    if let Some(name) = &args.name {
        let builtin_title = suites::builtin::<WebDriverSession>(name).map(|s| s.title);
        found.retain(|s| &s.title == name || Some(&s.title) == builtin_title.as_ref());
        if found.is_empty() {
            return Err(E2eError::Config(format!("no suite named '{}'", name)));
        }
    }

    Ok(found)
}

async fn async_main(args: Args) -> anyhow::Result<bool> {
    let config = load_config(&args)?;
    let suites = collect_suites(&args, &config)?;
    info!("Running {} suite(s)", suites.len());

    let session = WebDriverSession::connect(&config.webdriver).await?;

    let capture = if config.capture_failures {
        FailureCapture::new(&config.diagnostics_dir)
    } else {
        FailureCapture::disabled()
    };

    let mut reports = Vec::with_capacity(suites.len());
    for suite in &suites {
        // One application instance per suite
        let mut lifecycle =
            ScenarioLifecycle::new(ProcessRunner::new(config.server.clone()), capture.clone())
                .with_wait(config.wait.to_wait_config())
                .with_selectors(config.selectors.clone());
        reports.push(lifecycle.run_suite(suite, &session).await);
    }

    if let Err(e) = session.close().await {
        warn!("{}", e);
    }

    let report = RunReport::new(reports);
    info!(
        "Test Results: {} passed, {} failed of {}",
        report.passed, report.failed, report.total
    );

    std::fs::create_dir_all(&config.output_dir)?;
    let path = config.output_dir.join("test-results.json");
    std::fs::write(&path, serde_json::to_string_pretty(&report)?)?;
    info!("Results written to: {}", path.display());

    Ok(report.is_success())
}
