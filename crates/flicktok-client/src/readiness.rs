//! Readiness barrier over local development services.
//!
//! The gate polls every endpoint with a plain HTTP GET until each one has
//! answered with a success status at least once, then flips to `Ready`.
//! There is no retry limit: locally spawned services can take a while to
//! boot and refused connections are expected in the meantime.

use flicktok_core::ReadinessState;
use reqwest::Url;
use std::fmt;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(5);

/// Proof that the barrier has opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ready;

/// An HTTP endpoint that counts as healthy once a GET returns 2xx.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    url: Url,
}

impl Endpoint {
    /// Parse an absolute `http` or `https` URL.
    pub fn parse(url: &str) -> Result<Self, ConfigurationError> {
        let parsed = Url::parse(url).map_err(|e| ConfigurationError::Malformed {
            url: url.to_string(),
            reason: e.to_string(),
        })?;

        match parsed.scheme() {
            "http" | "https" => Ok(Self { url: parsed }),
            other => Err(ConfigurationError::UnsupportedScheme {
                url: url.to_string(),
                scheme: other.to_string(),
            }),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn check(&self, client: &reqwest::Client) -> bool {
        match client.get(self.url.clone()).send().await {
            Ok(response) if response.status().is_success() => true,
            Ok(response) => {
                tracing::debug!("{} answered {}", self.url, response.status());
                false
            }
            Err(e) => {
                tracing::debug!("{} not reachable yet: {}", self.url, e);
                false
            }
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.url.as_str())
    }
}

/// One-shot barrier that opens when every endpoint has responded healthy.
pub struct ReadinessGate {
    endpoints: Vec<Endpoint>,
    poll_interval: Duration,
    client: reqwest::Client,
    state: watch::Sender<ReadinessState>,
}

impl ReadinessGate {
    pub fn new(
        endpoints: Vec<Endpoint>,
        poll_interval: Duration,
    ) -> Result<Self, ConfigurationError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .no_proxy()
            .build()
            .map_err(ConfigurationError::HttpClient)?;
        let (state, _) = watch::channel(ReadinessState::Waiting);

        Ok(Self {
            endpoints,
            poll_interval,
            client,
            state,
        })
    }

    /// Build a gate from raw URLs. Malformed URLs fail here instead of
    /// being polled forever.
    pub fn from_urls<I, S>(urls: I, poll_interval: Duration) -> Result<Self, ConfigurationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let endpoints = urls
            .into_iter()
            .map(|u| Endpoint::parse(u.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(endpoints, poll_interval)
    }

    /// Wait until every URL has answered healthy once.
    pub async fn await_all<I, S>(urls: I, poll_interval: Duration) -> Result<Ready, ConfigurationError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let gate = Self::from_urls(urls, poll_interval)?;
        Ok(gate.wait_ready().await)
    }

    pub fn endpoints(&self) -> &[Endpoint] {
        &self.endpoints
    }

    /// Current state. Late observers see `Ready` once the gate has opened.
    pub fn state(&self) -> ReadinessState {
        *self.state.borrow()
    }

    pub fn subscribe(&self) -> watch::Receiver<ReadinessState> {
        self.state.subscribe()
    }

    /// Poll until all endpoints have succeeded, then open the gate.
    ///
    /// An endpoint that has succeeded once is not polled again. Returns
    /// immediately if the gate is already open.
    pub async fn wait_ready(&self) -> Ready {
        if self.state() == ReadinessState::Ready {
            return Ready;
        }

        let mut pending: Vec<&Endpoint> = self.endpoints.iter().collect();
        let mut ticker = tokio::time::interval(self.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        tracing::info!("Waiting on {} endpoint(s)", pending.len());

        while !pending.is_empty() {
            ticker.tick().await;

            let results =
                futures_util::future::join_all(pending.iter().map(|e| e.check(&self.client)))
                    .await;

            pending = pending
                .into_iter()
                .zip(results)
                .filter_map(|(endpoint, healthy)| {
                    if healthy {
                        tracing::info!("{} is up", endpoint);
                        None
                    } else {
                        Some(endpoint)
                    }
                })
                .collect();
        }

        let opened = self.state.send_if_modified(|state| {
            if *state == ReadinessState::Waiting {
                *state = ReadinessState::Ready;
                true
            } else {
                false
            }
        });
        if opened {
            tracing::info!("All endpoints ready");
        }

        Ready
    }
}

/// Unrecoverable readiness configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigurationError {
    #[error("malformed endpoint {url}: {reason}")]
    Malformed { url: String, reason: String },
    #[error("endpoint {url} must use http or https, got {scheme}")]
    UnsupportedScheme { url: String, scheme: String },
    #[error("failed to build HTTP client: {0}")]
    HttpClient(reqwest::Error),
}
