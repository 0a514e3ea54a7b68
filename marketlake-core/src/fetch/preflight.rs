//! Connectivity preflight.
//!
//! Before spending any retry budget, the ingestion run issues one cheap
//! request to a known upstream host. A transport failure means the network
//! cannot succeed at all and the run short-circuits with a distinguished
//! "no egress" outcome. An HTTP error response still counts as reachable.

use super::provider::FetchError;
use std::time::Duration;

/// Capability to verify outbound connectivity.
pub trait Preflight: Send + Sync {
    /// `Err(FetchError::NoEgress)` means the upstream host cannot be reached.
    fn check(&self) -> Result<(), FetchError>;
}

/// Preflight that issues a lightweight GET against a known upstream URL.
pub struct HttpPreflight {
    client: reqwest::blocking::Client,
    url: String,
}

impl HttpPreflight {
    pub fn new(url: impl Into<String>) -> Self {
        let client = reqwest::blocking::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .expect("failed to build HTTP client");
        Self {
            client,
            url: url.into(),
        }
    }
}

impl Default for HttpPreflight {
    fn default() -> Self {
        Self::new("https://query2.finance.yahoo.com")
    }
}

impl Preflight for HttpPreflight {
    fn check(&self) -> Result<(), FetchError> {
        // Any response, even a 4xx/5xx, proves the network path works.
        match self.client.get(&self.url).send() {
            Ok(_) => Ok(()),
            Err(e) => Err(FetchError::NoEgress(e.to_string())),
        }
    }
}

/// Preflight that always passes. Used with synthetic data and in tests.
pub struct AlwaysReachable;

impl Preflight for AlwaysReachable {
    fn check(&self) -> Result<(), FetchError> {
        Ok(())
    }
}
