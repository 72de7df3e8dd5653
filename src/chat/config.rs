//! Configuration types for the chat application.
//!
//! This module provides CLI argument parsing via `arrrg` and configuration
//! structures for connecting to a deployment.  Values resolve in this order:
//! command line, then an optional YAML file, then the `CONVEX_URL`
//! environment variable and built-in defaults.

use std::env;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Duration;

use arrrg_derive::CommandLine;
use serde::Deserialize;

use crate::client::{ConvexHttpClient, DEPLOYMENT_URL_ENV};
use crate::error::{Error, Result};

/// Default interval between subscription polls, in milliseconds.
const DEFAULT_POLL_INTERVAL_MS: u64 = 1_000;

/// Default per-request timeout, in seconds.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Command-line arguments for the livechat tool.
#[derive(CommandLine, Debug, Default, PartialEq, Eq)]
pub struct ChatArgs {
    /// Deployment URL.
    #[arrrg(optional, "Deployment URL (default: $CONVEX_URL)", "URL")]
    pub url: Option<String>,

    /// YAML configuration file.
    #[arrrg(optional, "Read settings from a YAML file", "PATH")]
    pub config: Option<String>,

    /// File that keeps the session (and its name) across runs.
    #[arrrg(optional, "Persist the session in this JSON file", "PATH")]
    pub session: Option<String>,

    /// Subscription poll interval.
    #[arrrg(optional, "Poll interval in milliseconds (default: 1000)", "MS")]
    pub poll_interval_ms: Option<u64>,

    /// Request timeout.
    #[arrrg(optional, "Request timeout in seconds (default: 30)", "SECS")]
    pub timeout_secs: Option<u64>,

    /// Disable ANSI colors and styles.
    #[arrrg(flag, "Disable ANSI colors/styles")]
    pub no_color: bool,
}

/// Configuration for a chat session.
///
/// This struct holds the resolved configuration values.  Every field is
/// optional in a YAML file; absent fields keep their defaults.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ChatConfig {
    /// The deployment URL.
    pub url: Option<String>,

    /// Where to persist the session.  `None` keeps it in memory.
    pub session_path: Option<PathBuf>,

    /// Milliseconds between subscription polls.
    pub poll_interval_ms: u64,

    /// Seconds before a request times out.
    pub timeout_secs: u64,

    /// Whether to use ANSI colors and styles in output.
    pub use_color: bool,
}

impl ChatConfig {
    /// Creates a new ChatConfig with default values.
    ///
    /// Defaults:
    /// - URL: none
    /// - Session: in memory
    /// - Poll interval: 1000 ms
    /// - Timeout: 30 s
    /// - Color: enabled
    pub fn new() -> Self {
        Self {
            url: None,
            session_path: None,
            poll_interval_ms: DEFAULT_POLL_INTERVAL_MS,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            use_color: true,
        }
    }

    /// Loads a configuration file.
    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|err| {
            Error::io(format!("failed to open config file {}", path.display()), err)
        })?;
        let config = serde_yaml::from_reader(BufReader::new(file))?;
        Ok(config)
    }

    /// Resolves the effective configuration for `args`.
    ///
    /// Loads `--config` if given, overlays the command line on top of it, and
    /// falls back to `CONVEX_URL` for the URL.  Fails if no URL is found.
    pub fn resolve(args: ChatArgs) -> Result<Self> {
        let base = match &args.config {
            Some(path) => Self::from_yaml_file(path)?,
            None => Self::new(),
        };
        let env_url = env::var(DEPLOYMENT_URL_ENV).ok().filter(|u| !u.is_empty());
        base.overlay(args, env_url)
    }

    fn overlay(mut self, args: ChatArgs, env_url: Option<String>) -> Result<Self> {
        self.url = args.url.or(self.url).or(env_url);
        if self.url.is_none() {
            return Err(Error::configuration(format!(
                "no deployment URL: pass --url, set `url` in the config file, or set {DEPLOYMENT_URL_ENV}"
            )));
        }
        if let Some(session) = args.session {
            self.session_path = Some(PathBuf::from(session));
        }
        if let Some(ms) = args.poll_interval_ms {
            self.poll_interval_ms = ms;
        }
        if let Some(secs) = args.timeout_secs {
            self.timeout_secs = secs;
        }
        if args.no_color {
            self.use_color = false;
        }
        Ok(self)
    }

    /// Sets the deployment URL.
    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the session file.
    pub fn with_session_path(mut self, path: Option<PathBuf>) -> Self {
        self.session_path = path;
        self
    }

    /// Sets the poll interval.
    pub fn with_poll_interval_ms(mut self, ms: u64) -> Self {
        self.poll_interval_ms = ms;
        self
    }

    /// Sets the request timeout.
    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    /// Disables ANSI color output.
    pub fn without_color(mut self) -> Self {
        self.use_color = false;
        self
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Builds a client for the configured deployment.
    pub fn connect(&self) -> Result<ConvexHttpClient> {
        ConvexHttpClient::with_options(
            self.url.clone(),
            Some(self.timeout()),
            Some(self.poll_interval()),
        )
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self::new()
    }
}
