//! Auth server configuration.
//!
//! Supports loading from YAML files with environment variable overrides.

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Server configuration loaded from YAML with environment overrides.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Port to bind the HTTP server to.
    /// Override: `ENCORE_BIND_PORT`
    pub bind_port: u16,

    /// Application client ID registered with the provider.
    /// Override: `SPOTIFY_CLIENT_ID`
    pub client_id: String,

    /// Application client secret. Never leaves this process.
    /// Override: `SPOTIFY_CLIENT_SECRET`
    pub client_secret: String,

    /// Redirect URI registered with the provider; must route to `/api/spotify/callback`.
    /// Override: `SPOTIFY_REDIRECT_URI`
    pub redirect_uri: String,

    /// Frontend the callback redirects to, with credentials in the fragment.
    /// Override: `FRONTEND_URL`
    pub frontend_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_port: 49500,
            client_id: String::new(),
            client_secret: String::new(),
            redirect_uri: "http://localhost:49500/api/spotify/callback".to_string(),
            frontend_url: "http://localhost:3000".to_string(),
        }
    }
}

impl ServerConfig {
    /// Loads configuration from a YAML file, then applies environment overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = if let Some(path) = path {
            let content = std::fs::read_to_string(path)
                .with_context(|| format!("Failed to read config file: {}", path.display()))?;
            serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse config file: {}", path.display()))?
        } else {
            Self::default()
        };

        config.apply_env_overrides();
        Ok(config)
    }

    /// Applies environment variable overrides to the configuration.
    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("ENCORE_BIND_PORT") {
            if let Ok(port) = val.parse() {
                self.bind_port = port;
            }
        }

        let strings = [
            ("SPOTIFY_CLIENT_ID", &mut self.client_id),
            ("SPOTIFY_CLIENT_SECRET", &mut self.client_secret),
            ("SPOTIFY_REDIRECT_URI", &mut self.redirect_uri),
            ("FRONTEND_URL", &mut self.frontend_url),
        ];
        for (key, field) in strings {
            if let Ok(val) = std::env::var(key) {
                *field = val;
            }
        }
    }

    /// Checks that the provider credentials are present.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() || self.client_secret.is_empty() {
            bail!("SPOTIFY_CLIENT_ID and SPOTIFY_CLIENT_SECRET must be set");
        }
        url::Url::parse(&self.frontend_url)
            .with_context(|| format!("FRONTEND_URL is not a URL: {}", self.frontend_url))?;
        Ok(())
    }
}
