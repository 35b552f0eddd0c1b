//! Configuration management
//!
//! Loads the TOML configuration describing known networks: their portal
//! URLs, scripted login/data actions, and lifecycle hooks. A `[fallback]`
//! section supplies defaults that individual networks inherit.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};

/// Default per-action timeout in seconds.
pub const DEFAULT_ACTION_TIMEOUT: f64 = 5.0;

/// Default sleep duration in seconds for a `sleep` action.
pub const DEFAULT_SLEEP: f64 = 0.25;

/// Root configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    /// Defaults shared by all networks (URL, driver, hooks, hook env)
    #[serde(default)]
    pub fallback: NetworkProfile,

    /// WebDriver remote end settings
    #[serde(default)]
    pub webdriver: WebDriverConfig,

    /// Daemon mode settings
    #[serde(default)]
    pub daemon: DaemonConfig,

    /// Logging settings
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Per-network configurations
    #[serde(default)]
    pub networks: Vec<NetworkProfile>,
}

impl Config {
    /// Find the profile for a connected network, matching SSIDs
    /// case-insensitively.
    pub fn profile_for(&self, ssid: &str) -> Option<&NetworkProfile> {
        self.networks.iter().find(|n| n.matches_ssid(ssid))
    }
}

/// Configuration for a single network, also used for the `[fallback]`
/// defaults (where `ssid` stays unset).
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct NetworkProfile {
    #[serde(default)]
    pub ssid: Option<String>,

    /// Captive portal login page
    #[serde(default)]
    pub url: Option<String>,

    /// URL probed to decide whether a login is needed
    #[serde(default)]
    pub test_url: Option<String>,

    /// Preferred browser engine for this network
    #[serde(default)]
    pub driver: Option<Driver>,

    /// Run login/post-login hooks even when the login itself was skipped
    #[serde(default)]
    pub always_run_hooks: bool,

    /// Extra environment passed to every hook (fallback section only)
    #[serde(default)]
    pub env: HashMap<String, String>,

    #[serde(default)]
    pub hooks: HookSet,

    /// Scripted actions performing the login
    #[serde(default)]
    pub login: Vec<Action>,

    /// Scripted actions reading remaining-data figures
    #[serde(default)]
    pub data: Vec<Action>,
}

impl NetworkProfile {
    pub fn matches_ssid(&self, name: &str) -> bool {
        self.ssid
            .as_deref()
            .is_some_and(|s| s.eq_ignore_ascii_case(name))
    }

    pub fn has_data(&self) -> bool {
        !self.data.is_empty()
    }
}

/// Browser engine preference for the automation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Driver {
    #[default]
    Auto,
    #[serde(alias = "chromium")]
    Chrome,
    Firefox,
    Edge,
}

/// Lifecycle hook lists, one per phase.
///
/// Each list is optional: an unset list falls back wholesale to the
/// `[fallback]` hook set, while an explicitly empty list stays empty.
#[derive(Debug, Deserialize, Clone, Default)]
#[serde(rename_all = "kebab-case")]
pub struct HookSet {
    #[serde(default)]
    pub pre_login: Option<Vec<Hook>>,
    #[serde(default)]
    pub login: Option<Vec<Hook>>,
    #[serde(default)]
    pub post_login: Option<Vec<Hook>>,
    #[serde(default)]
    pub data: Option<Vec<Hook>>,
    #[serde(default)]
    pub error: Option<Vec<Hook>>,
}

/// A conditional shell command tied to a lifecycle phase. Either a bare
/// command string (run on success) or a table with guards and filters.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Hook {
    Command(String),
    Detailed(HookSpec),
}

#[derive(Debug, Clone, Deserialize)]
pub struct HookSpec {
    pub hook: String,

    /// Run the hook only if this command exits zero
    #[serde(default)]
    pub r#if: Option<String>,

    /// Skip the hook if this command exits zero
    #[serde(default)]
    pub unless: Option<String>,

    #[serde(default)]
    pub when: HookWhen,

    /// Stop processing the remaining hooks once this one ran and exited zero
    #[serde(default, rename = "final")]
    pub final_: bool,
}

impl Hook {
    pub fn command(&self) -> &str {
        match self {
            Hook::Command(cmd) => cmd,
            Hook::Detailed(spec) => &spec.hook,
        }
    }

    pub fn guard_if(&self) -> Option<&str> {
        match self {
            Hook::Command(_) => None,
            Hook::Detailed(spec) => spec.r#if.as_deref(),
        }
    }

    pub fn guard_unless(&self) -> Option<&str> {
        match self {
            Hook::Command(_) => None,
            Hook::Detailed(spec) => spec.unless.as_deref(),
        }
    }

    pub fn when(&self) -> HookWhen {
        match self {
            Hook::Command(_) => HookWhen::Success,
            Hook::Detailed(spec) => spec.when,
        }
    }

    pub fn is_final(&self) -> bool {
        match self {
            Hook::Command(_) => false,
            Hook::Detailed(spec) => spec.final_,
        }
    }
}

/// Outcome filter deciding whether a hook applies to an invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum HookWhen {
    #[default]
    Success,
    Failure,
    Always,
}

/// One step of a login or data-read script. Either a bare CSS selector
/// (clicked) or a table describing the action in full.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Action {
    Selector(String),
    Detailed(ActionSpec),
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct ActionSpec {
    #[serde(default)]
    pub action: Option<ActionKind>,

    /// Redirect the action at a native page dialog instead of an element
    #[serde(default)]
    pub dialog: bool,

    /// CSS selector of the target element
    #[serde(default)]
    pub element: Option<String>,

    /// Text sent by an `input` action
    #[serde(default)]
    pub input: Option<String>,

    /// Script body for a `script` action
    #[serde(default)]
    pub script: Option<String>,

    /// Extraction pattern for an `acquire` action
    #[serde(default)]
    pub regex: Option<String>,

    /// Sleep duration in seconds
    #[serde(default)]
    pub sleep: Option<f64>,

    /// Per-action timeout in seconds
    #[serde(default)]
    pub timeout: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActionKind {
    Click,
    Input,
    Submit,
    Script,
    Sleep,
    Settle,
    Acquire,

    // Dialog-unique action
    Dismiss,
}

impl Action {
    /// The action kind, inferred from the populated keys when no explicit
    /// `action` was configured.
    pub fn kind(&self) -> ActionKind {
        let Action::Detailed(spec) = self else {
            return ActionKind::Click;
        };

        if let Some(kind) = spec.action {
            return kind;
        }

        if spec.script.is_some() {
            ActionKind::Script
        } else if spec.input.is_some() {
            ActionKind::Input
        } else if spec.sleep.is_some() {
            ActionKind::Sleep
        } else if spec.regex.is_some() {
            ActionKind::Acquire
        } else {
            ActionKind::Click
        }
    }

    pub fn element(&self) -> Option<&str> {
        match self {
            Action::Selector(sel) => Some(sel),
            Action::Detailed(spec) => spec.element.as_deref(),
        }
    }

    pub fn input(&self) -> Option<&str> {
        match self {
            Action::Selector(_) => None,
            Action::Detailed(spec) => spec.input.as_deref(),
        }
    }

    pub fn script(&self) -> Option<&str> {
        match self {
            Action::Selector(_) => None,
            Action::Detailed(spec) => spec.script.as_deref(),
        }
    }

    pub fn regex(&self) -> Option<&str> {
        match self {
            Action::Selector(_) => None,
            Action::Detailed(spec) => spec.regex.as_deref(),
        }
    }

    pub fn dialog(&self) -> bool {
        match self {
            Action::Selector(_) => false,
            Action::Detailed(spec) => spec.dialog,
        }
    }

    pub fn sleep_duration(&self) -> Duration {
        let secs = match self {
            Action::Selector(_) => DEFAULT_SLEEP,
            Action::Detailed(spec) => spec.sleep.unwrap_or(DEFAULT_SLEEP),
        };
        Duration::from_secs_f64(secs)
    }

    pub fn timeout(&self) -> Duration {
        let secs = match self {
            Action::Selector(_) => DEFAULT_ACTION_TIMEOUT,
            Action::Detailed(spec) => spec.timeout.unwrap_or(DEFAULT_ACTION_TIMEOUT),
        };
        Duration::from_secs_f64(secs)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct WebDriverConfig {
    /// WebDriver remote end the session provider talks to
    #[serde(default = "default_webdriver_url")]
    pub url: String,
}

impl Default for WebDriverConfig {
    fn default() -> Self {
        Self {
            url: default_webdriver_url(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct DaemonConfig {
    /// Poll interval in seconds for backends without native change events
    #[serde(default = "default_poll_interval")]
    pub poll_interval: u64,
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

// Default value functions
fn default_webdriver_url() -> String {
    "http://localhost:4444".to_string()
}

fn default_poll_interval() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

/// A loaded configuration plus enough state to notice on-disk changes.
///
/// The daemon calls [`ConfigHandle::current`] once per change
/// notification; an advanced mtime triggers a reload, a failed reload
/// keeps the previous configuration.
pub struct ConfigHandle {
    path: Option<PathBuf>,
    modified: Option<SystemTime>,
    config: Config,
}

impl ConfigHandle {
    pub fn load(explicit: Option<PathBuf>) -> Result<Self> {
        let path = resolve_path(explicit)?;

        let config = match &path {
            Some(p) => load_from(p)?,
            None => {
                tracing::debug!("No config file found, using defaults");
                Config::default()
            }
        };

        let modified = path.as_deref().and_then(mtime);
        Ok(Self {
            path,
            modified,
            config,
        })
    }

    pub fn current(&mut self) -> &Config {
        if let Some(path) = &self.path {
            let now = mtime(path);
            if now != self.modified {
                tracing::info!("Configuration change detected, reloading.");
                match load_from(path) {
                    Ok(config) => {
                        self.config = config;
                        self.modified = now;
                    }
                    Err(err) => {
                        tracing::warn!(
                            "Failed to reload configuration, keeping previous: {:#}",
                            err
                        );
                    }
                }
            }
        }

        &self.config
    }
}

fn load_from(path: &Path) -> Result<Config> {
    tracing::debug!("Loading config from: {}", path.display());
    let contents = std::fs::read_to_string(path).context("Failed to read config file")?;
    toml::from_str(&contents).context("Failed to parse config file")
}

fn mtime(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

fn resolve_path(explicit: Option<PathBuf>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        anyhow::ensure!(path.exists(), "config file {} does not exist", path.display());
        return Ok(Some(path));
    }

    let mut candidates = vec![PathBuf::from("autoportal.toml")];
    if let Some(dir) = dirs::config_dir() {
        candidates.push(dir.join("autoportal/config.toml"));
    }
    candidates.push(PathBuf::from("/etc/autoportal/config.toml"));

    Ok(candidates.into_iter().find(|p| p.exists()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_full_network_profile() {
        let config: Config = toml::from_str(
            r##"
            [fallback]
            url = "http://fallback.example/portal"
            driver = "chromium"

            [[networks]]
            ssid = "Coffee Wifi"
            url = "http://portal.example/login"
            test-url = "http://portal.example/ping"
            always-run-hooks = true
            login = [
                "#accept-tos",
                { input = "guest", element = "#user" },
                { action = "submit", element = "form" },
                { sleep = 1.5 },
                { action = "settle", timeout = 20 },
            ]
            data = [
                { element = "#quota", regex = '(?P<avail_mb>\d+) MB' },
            ]
            "##,
        )
        .unwrap();

        assert_eq!(config.fallback.driver, Some(Driver::Chrome));

        let network = &config.networks[0];
        assert!(network.matches_ssid("coffee wifi"));
        assert!(network.always_run_hooks);
        assert!(network.has_data());

        let kinds: Vec<ActionKind> = network.login.iter().map(Action::kind).collect();
        assert_eq!(
            kinds,
            vec![
                ActionKind::Click,
                ActionKind::Input,
                ActionKind::Submit,
                ActionKind::Sleep,
                ActionKind::Settle,
            ]
        );

        assert_eq!(network.login[0].element(), Some("#accept-tos"));
        assert_eq!(network.login[1].input(), Some("guest"));
        assert_eq!(network.login[4].timeout(), Duration::from_secs(20));
        assert_eq!(network.data[0].kind(), ActionKind::Acquire);
    }

    #[test]
    fn action_kind_inferred_from_keys() {
        let action: ActionSpec = toml::from_str(r#"script = "window.scrollTo(0, 0);""#).unwrap();
        assert_eq!(Action::Detailed(action).kind(), ActionKind::Script);

        let action: ActionSpec = toml::from_str(r#"regex = '(?P<used_gb>\d+)'"#).unwrap();
        assert_eq!(Action::Detailed(action).kind(), ActionKind::Acquire);
    }

    #[test]
    fn hooks_parse_as_string_or_table() {
        let set: HookSet = toml::from_str(
            r#"
            login = [
                "notify-send 'logged in'",
                { hook = "logger done", when = "always", final = true, if = "true" },
            ]
            post-login = []
            "#,
        )
        .unwrap();

        let login = set.login.as_deref().unwrap();
        assert_eq!(login[0].command(), "notify-send 'logged in'");
        assert_eq!(login[0].when(), HookWhen::Success);
        assert!(!login[0].is_final());

        assert_eq!(login[1].when(), HookWhen::Always);
        assert!(login[1].is_final());
        assert_eq!(login[1].guard_if(), Some("true"));

        // Explicitly empty stays Some([]), unset stays None.
        assert!(set.post_login.as_deref().is_some_and(|h| h.is_empty()));
        assert!(set.pre_login.is_none());
    }

    #[test]
    fn defaults_apply_without_config() {
        let config = Config::default();
        assert_eq!(config.webdriver.url, "http://localhost:4444");
        assert_eq!(config.daemon.poll_interval, 10);
        assert_eq!(config.logging.level, "info");
        assert!(config.profile_for("anything").is_none());
    }
}
