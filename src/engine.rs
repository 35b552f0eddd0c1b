//! Login and data-read orchestration for a single network.
//!
//! Owns the browser session for the duration of one invocation, runs the
//! configured action script through the interpreter, and converts the
//! outcome into the matching hook invocations.

use crate::actions::Interpreter;
use crate::config::{Config, Driver, HookWhen, NetworkProfile};
use crate::connectivity::ConnectivityProbe;
use crate::data::NetworkData;
use crate::error::SessionError;
use crate::hooks::{self, HookPhase};
use crate::session::{Session, SessionProvider};
use anyhow::{Context, Result};
use std::collections::HashMap;
use std::time::{Duration, Instant};

/// Navigated to when neither the network nor the fallback configures a
/// portal URL. Loading it unredirected means the network is already open.
pub const OPEN_NETWORK_PROBE_URL: &str = "http://example.com/";

const POST_LOGIN_SETTLE_TIMEOUT: Duration = Duration::from_secs(5);

pub struct Engine<'a> {
    config: &'a Config,
    provider: &'a dyn SessionProvider,
    probe: &'a ConnectivityProbe,
}

impl<'a> Engine<'a> {
    pub fn new(
        config: &'a Config,
        provider: &'a dyn SessionProvider,
        probe: &'a ConnectivityProbe,
    ) -> Self {
        Self {
            config,
            provider,
            probe,
        }
    }

    fn driver_for(&self, profile: &NetworkProfile) -> Driver {
        profile
            .driver
            .or(self.config.fallback.driver)
            .unwrap_or_default()
    }

    /// Create a session and navigate it to `url`. A driver-level fault on
    /// the first navigation discards the session and retries once with a
    /// fresh one; any later fault propagates.
    async fn open_session(
        &self,
        profile: &NetworkProfile,
        url: &str,
    ) -> Result<Box<dyn Session>, SessionError> {
        let driver = self.driver_for(profile);
        let mut session = self.provider.create(driver).await?;

        tracing::debug!("Navigating to {}", url);
        if let Err(err) = session.navigate(url).await {
            if !err.is_driver_fault() {
                let _ = session.close().await;
                return Err(err);
            }

            tracing::debug!("Session unusable, recreating - {}", err);
            let _ = session.close().await;
            session = self.provider.create(driver).await?;
            session.navigate(url).await?;
        }

        Ok(session)
    }

    /// Log in to the network and run the login/post-login/error hooks
    /// according to the outcome.
    pub async fn login(&self, profile: &NetworkProfile) -> Result<()> {
        tracing::info!(
            "Logging in to {}...",
            profile.ssid.as_deref().unwrap_or("<unknown network>")
        );

        let outcome = self.try_login(profile).await;
        let no_env = HashMap::new();

        match outcome {
            Ok(()) => {
                hooks::run_hooks(self.config, profile, HookPhase::Login, HookWhen::Always, &no_env)
                    .await;
                hooks::run_hooks(
                    self.config,
                    profile,
                    HookPhase::PostLogin,
                    HookWhen::Success,
                    &no_env,
                )
                .await;
                Ok(())
            }
            Err(err) => {
                tracing::error!("Login failed: {:#}", err);
                hooks::run_hooks(self.config, profile, HookPhase::Login, HookWhen::Always, &no_env)
                    .await;
                hooks::run_hooks(
                    self.config,
                    profile,
                    HookPhase::PostLogin,
                    HookWhen::Failure,
                    &no_env,
                )
                .await;

                let env = HashMap::from([("ERROR".to_string(), format!("{err:#}"))]);
                hooks::run_hooks(self.config, profile, HookPhase::Error, HookWhen::Always, &env)
                    .await;
                Err(err)
            }
        }
    }

    async fn try_login(&self, profile: &NetworkProfile) -> Result<()> {
        let url = profile
            .url
            .as_deref()
            .or(self.config.fallback.url.as_deref())
            .unwrap_or(OPEN_NETWORK_PROBE_URL);

        let mut session = self
            .open_session(profile, url)
            .await
            .context("failed to open a browser session")?;

        let result = self.drive_login(session.as_mut(), profile, url).await;
        let _ = session.close().await;
        result
    }

    async fn drive_login(
        &self,
        session: &mut dyn Session,
        profile: &NetworkProfile,
        url: &str,
    ) -> Result<()> {
        if url == OPEN_NETWORK_PROBE_URL {
            if let Ok(current) = session.current_url().await {
                if current.trim_end_matches('/') == OPEN_NETWORK_PROBE_URL.trim_end_matches('/') {
                    tracing::info!("Navigation to fallback URL succeeded, assuming working network.");
                    return Ok(());
                }
            }
        }

        let mut interpreter = Interpreter::new(session);
        interpreter
            .run(&profile.login)
            .await
            .context("login script failed")?;

        tracing::debug!("Allowing page to settle after login...");
        interpreter
            .settle(POST_LOGIN_SETTLE_TIMEOUT, Instant::now())
            .await;

        // The session stays alive through this check to cover any delayed
        // effect of the login.
        if !self.probe.profile_connected(self.config, profile).await {
            anyhow::bail!("unable to verify connection after login");
        }

        Ok(())
    }

    /// Scrape remaining-data figures. Returns `None` when the network has
    /// no data page to read.
    pub async fn read_data(&self, profile: &NetworkProfile) -> Result<Option<NetworkData>> {
        let Some(url) = profile.url.as_deref().or(self.config.fallback.url.as_deref()) else {
            tracing::info!("No data information for network, skipping.");
            return Ok(None);
        };

        match self.try_read_data(profile, url).await {
            Ok(data) => {
                hooks::run_hooks(
                    self.config,
                    profile,
                    HookPhase::Data,
                    HookWhen::Success,
                    &data_env(&data),
                )
                .await;
                Ok(Some(data))
            }
            Err(err) => {
                tracing::error!("Reading network data failed: {:#}", err);
                hooks::run_hooks(
                    self.config,
                    profile,
                    HookPhase::Data,
                    HookWhen::Failure,
                    &HashMap::new(),
                )
                .await;

                let env = HashMap::from([("ERROR".to_string(), format!("{err:#}"))]);
                hooks::run_hooks(self.config, profile, HookPhase::Error, HookWhen::Always, &env)
                    .await;
                Err(err)
            }
        }
    }

    async fn try_read_data(&self, profile: &NetworkProfile, url: &str) -> Result<NetworkData> {
        let mut session = self
            .open_session(profile, url)
            .await
            .context("failed to open a browser session")?;

        let mut interpreter = Interpreter::new(session.as_mut());
        let result = interpreter.run(&profile.data).await;
        let data = interpreter.into_data();
        let _ = session.close().await;

        result.context("data script failed")?;
        Ok(data)
    }
}

/// Hook environment describing scraped quota figures.
fn data_env(data: &NetworkData) -> HashMap<String, String> {
    let mut env = HashMap::new();

    if data.is_infinite() {
        env.insert("DATA_INFINITE".to_string(), "1".to_string());
        return env;
    }

    if let Some(available) = data.remaining_mb() {
        env.insert("DATA_AVAILABLE".to_string(), available.to_string());
    }
    if let Some(used) = data.used_mb {
        env.insert("DATA_USED".to_string(), used.to_string());
    }
    if let Some(total) = data.total_mb {
        env.insert("DATA_TOTAL".to_string(), total.to_string());
    }

    env
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_env_for_metered_network() {
        let data = NetworkData {
            available_mb: None,
            used_mb: Some(700.0),
            total_mb: Some(1000.0),
        };

        let env = data_env(&data);
        assert_eq!(env.get("DATA_AVAILABLE").map(String::as_str), Some("300"));
        assert_eq!(env.get("DATA_USED").map(String::as_str), Some("700"));
        assert_eq!(env.get("DATA_TOTAL").map(String::as_str), Some("1000"));
        assert!(!env.contains_key("DATA_INFINITE"));
    }

    #[test]
    fn data_env_for_unmetered_network() {
        let env = data_env(&NetworkData::default());
        assert_eq!(env.get("DATA_INFINITE").map(String::as_str), Some("1"));
        assert!(!env.contains_key("DATA_AVAILABLE"));
    }
}
