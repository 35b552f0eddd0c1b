//! Connectivity probe deciding whether a captive login is required.

use crate::config::{Config, NetworkProfile};
use anyhow::Result;
use reqwest::redirect::Policy;
use std::time::Duration;

/// Probed when a network configures no test URL of its own.
pub const DEFAULT_PROBE_URL: &str = "http://detectportal.firefox.com/canonical.html";

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct ConnectivityProbe {
    http: reqwest::Client,
}

impl ConnectivityProbe {
    pub fn new() -> Result<Self> {
        // Redirects stay visible: a captive portal answering our probe
        // with a redirect is exactly what we are looking for.
        let http = reqwest::Client::builder()
            .redirect(Policy::none())
            .timeout(PROBE_TIMEOUT)
            .build()?;

        Ok(Self { http })
    }

    /// A network counts as open when the probe URL answers 2xx without
    /// steering us anywhere else. Timeouts and transport errors count
    /// as "not connected", never as failures.
    pub async fn is_connected(&self, url: &str) -> bool {
        tracing::debug!("< GET {}", url);

        match self.http.get(url).send().await {
            Ok(response) => {
                let status = response.status();
                let redirected = response.headers().contains_key(reqwest::header::LOCATION);
                tracing::debug!("> {}", status);
                status.is_success() && !redirected
            }
            Err(err) => {
                tracing::debug!("Connectivity probe failed: {}", err);
                false
            }
        }
    }

    /// Connectivity check against the profile's test URL (or the global
    /// default).
    pub async fn profile_connected(&self, config: &Config, profile: &NetworkProfile) -> bool {
        let url = profile
            .test_url
            .as_deref()
            .or(config.fallback.test_url.as_deref())
            .unwrap_or(DEFAULT_PROBE_URL);

        self.is_connected(url).await
    }

    /// Whether the network needs an interactive login. A profile without
    /// login actions never does, regardless of connectivity.
    pub async fn needs_login(&self, config: &Config, profile: &NetworkProfile) -> bool {
        if profile.login.is_empty() {
            return false;
        }

        !self.profile_connected(config, profile).await
    }
}
