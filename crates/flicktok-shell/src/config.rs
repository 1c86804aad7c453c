//! Shell configuration.
//!
//! Loaded from a TOML file. Every section has defaults matching a local
//! development setup (backend on :8000, UI dev server on :8001), so a missing
//! or empty file is valid.

use crate::backend::WindowSpec;
use crate::view::BroadcastPolicy;
use flicktok_client::Backoff;
use flicktok_core::{ContentSize, Layout, LayoutError};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub server: ServerConfig,
    pub client: ClientConfig,
    pub readiness: ReadinessConfig,
    pub link: LinkConfig,
    pub window: WindowConfig,
    pub layout: LayoutConfig,
    pub surfaces: SurfacesConfig,
}

/// The backend service.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub health_path: String,
    pub link_path: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 8000,
            health_path: "/api/healthcheck".into(),
            link_path: "/ws".into(),
        }
    }
}

/// The server hosting the UI pages.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ClientConfig {
    pub host: String,
    pub port: u16,
    pub overlay_path: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            host: "localhost".into(),
            port: 8001,
            overlay_path: "/overlay".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ReadinessConfig {
    pub poll_interval_ms: u64,
}

impl Default for ReadinessConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 250,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LinkConfig {
    pub backoff_initial_ms: u64,
    pub backoff_max_ms: u64,
    pub backoff_multiplier: f64,
}

impl Default for LinkConfig {
    fn default() -> Self {
        Self {
            backoff_initial_ms: 500,
            backoff_max_ms: 10_000,
            backoff_multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct WindowConfig {
    pub title: String,
    pub width: u32,
    pub height: u32,
    pub min_width: u32,
    pub min_height: u32,
    pub max_width: u32,
    pub max_height: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            title: "FlickTok".into(),
            width: 800,
            height: 600,
            min_width: 400,
            min_height: 300,
            max_width: 800,
            max_height: 600,
        }
    }
}

/// Header and footer bands are the parts of the host UI the overlay must
/// leave uncovered.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LayoutConfig {
    pub external_width: f64,
    pub external_height: f64,
    pub overlay_width: f64,
    pub header_px: u32,
    pub footer_px: u32,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            external_width: 0.8,
            external_height: 0.8,
            overlay_width: 1.0,
            header_px: 64,
            footer_px: 64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SurfacesConfig {
    pub external_receives_broadcasts: bool,
    pub overlay_receives_broadcasts: bool,
    pub reload_delay_ms: u64,
}

impl Default for SurfacesConfig {
    fn default() -> Self {
        Self {
            external_receives_broadcasts: true,
            overlay_receives_broadcasts: false,
            reload_delay_ms: 1000,
        }
    }
}

impl Config {
    /// Load and validate a config file. `None` means defaults.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                })?;
                Self::parse(&text)?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, host) in [("server.host", &self.server.host), ("client.host", &self.client.host)] {
            if host.trim().is_empty() {
                return Err(ConfigError::Invalid(format!("{name} cannot be empty")));
            }
        }
        for (name, port) in [("server.port", self.server.port), ("client.port", self.client.port)] {
            if port == 0 {
                return Err(ConfigError::Invalid(format!("{name} cannot be 0")));
            }
        }
        for (name, path) in [
            ("server.health_path", &self.server.health_path),
            ("server.link_path", &self.server.link_path),
            ("client.overlay_path", &self.client.overlay_path),
        ] {
            if !path.starts_with('/') {
                return Err(ConfigError::Invalid(format!("{name} must start with '/'")));
            }
        }

        if self.readiness.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "readiness.poll_interval_ms must be positive".into(),
            ));
        }
        if self.link.backoff_initial_ms == 0 {
            return Err(ConfigError::Invalid(
                "link.backoff_initial_ms must be positive".into(),
            ));
        }

        let w = &self.window;
        if w.width == 0 || w.height == 0 {
            return Err(ConfigError::Invalid("window size cannot be zero".into()));
        }
        if w.min_width > w.max_width || w.min_height > w.max_height {
            return Err(ConfigError::Invalid(
                "window minimum size exceeds maximum size".into(),
            ));
        }
        if !(w.min_width..=w.max_width).contains(&w.width)
            || !(w.min_height..=w.max_height).contains(&w.height)
        {
            return Err(ConfigError::Invalid(
                "window size must lie between minimum and maximum".into(),
            ));
        }

        self.layout()?;
        Ok(())
    }

    pub fn server_url(&self) -> String {
        format!("http://{}:{}", self.server.host, self.server.port)
    }

    pub fn health_url(&self) -> String {
        format!("{}{}", self.server_url(), self.server.health_path)
    }

    pub fn link_url(&self) -> String {
        format!(
            "ws://{}:{}{}",
            self.server.host, self.server.port, self.server.link_path
        )
    }

    pub fn client_url(&self) -> String {
        format!("http://{}:{}/", self.client.host, self.client.port)
    }

    pub fn overlay_url(&self) -> String {
        format!(
            "http://{}:{}{}",
            self.client.host, self.client.port, self.client.overlay_path
        )
    }

    pub fn layout(&self) -> Result<Layout, ConfigError> {
        let l = &self.layout;
        Ok(Layout::new(
            l.external_width,
            l.external_height,
            l.overlay_width,
            l.header_px,
            l.footer_px,
        )?)
    }

    pub fn backoff(&self) -> Backoff {
        Backoff::new(
            Duration::from_millis(self.link.backoff_initial_ms),
            Duration::from_millis(self.link.backoff_max_ms),
            self.link.backoff_multiplier,
        )
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.readiness.poll_interval_ms)
    }

    pub fn reload_delay(&self) -> Duration {
        Duration::from_millis(self.surfaces.reload_delay_ms)
    }

    pub fn broadcast_policy(&self) -> BroadcastPolicy {
        BroadcastPolicy {
            external: self.surfaces.external_receives_broadcasts,
            overlay: self.surfaces.overlay_receives_broadcasts,
        }
    }

    /// The host window starts hidden.
    pub fn window_spec(&self) -> WindowSpec {
        let w = &self.window;
        WindowSpec {
            title: w.title.clone(),
            size: ContentSize::new(w.width, w.height),
            min_size: ContentSize::new(w.min_width, w.min_height),
            max_size: ContentSize::new(w.max_width, w.max_height),
            visible: false,
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
    #[error("invalid layout: {0}")]
    Layout(#[from] LayoutError),
}
