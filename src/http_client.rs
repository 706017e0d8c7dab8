use anyhow::{Context, Result};
use rand::Rng;
use reqwest::blocking::{Client, ClientBuilder, Response};
use reqwest::header::{HeaderValue, RANGE, USER_AGENT};
use std::io::Read;
use std::time::Duration;
use thiserror::Error;

use crate::constants::{MAX_REDIRECTS, MAX_RESPONSE_SIZE, RANGE_HEADER_VALUE, TRANSPORT_RETRIES};

// Per-probe failures are values, never log lines; callers decide what to
// swallow.
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("network error: {0}")]
    Network(String),
    #[error("unexpected status: {0}")]
    Status(u16),
    #[error("response exceeds size cap")]
    TooLarge,
    #[error("empty response body")]
    Empty,
}

pub struct HttpClient {
    client: Client,
}

// Realistic desktop user agents, one picked at random per request
const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/122.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:122.0) Gecko/20100101 Firefox/122.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:123.0) Gecko/20100101 Firefox/123.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10.15; rv:122.0) Gecko/20100101 Firefox/122.0",
    "Mozilla/5.0 (X11; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
    "Mozilla/5.0 (X11; Linux x86_64; rv:122.0) Gecko/20100101 Firefox/122.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/121.0.0.0 Safari/537.36 Edg/121.0.0.0",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.1 Safari/605.1.15",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.3 Safari/605.1.15",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36 OPR/105.0.0.0",
    "Mozilla/5.0 (X11; Ubuntu; Linux x86_64; rv:121.0) Gecko/20100101 Firefox/121.0",
];

impl HttpClient {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = ClientBuilder::new()
            .timeout(timeout)
            // Targets routinely present broken certificate chains; the scan
            // must still reach them.
            .danger_accept_invalid_certs(true)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self { client })
    }

    /// Single-shot GET returning a size-capped body or a typed failure.
    pub fn get(&self, url: &str) -> Result<String, ProbeError> {
        let mut last_error = String::new();

        for _ in 0..=TRANSPORT_RETRIES {
            match self.send(url) {
                Ok(response) => return Self::read_body(response),
                Err(e) => last_error = e.to_string(),
            }
        }

        Err(ProbeError::Network(last_error))
    }

    fn send(&self, url: &str) -> Result<Response, reqwest::Error> {
        self.client
            .get(url)
            .header(USER_AGENT, Self::random_user_agent())
            // Hint servers to stop early; the hard cap below still applies
            // when they ignore it.
            .header(RANGE, HeaderValue::from_static(RANGE_HEADER_VALUE))
            .send()
    }

    fn read_body(response: Response) -> Result<String, ProbeError> {
        let status = response.status();
        if !status.is_success() {
            return Err(ProbeError::Status(status.as_u16()));
        }

        let mut buffer = Vec::new();
        response
            .take(MAX_RESPONSE_SIZE as u64)
            .read_to_end(&mut buffer)
            .map_err(|e| ProbeError::Network(e.to_string()))?;

        if buffer.len() >= MAX_RESPONSE_SIZE {
            return Err(ProbeError::TooLarge);
        }
        if buffer.is_empty() {
            return Err(ProbeError::Empty);
        }

        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    fn random_user_agent() -> &'static str {
        let idx = rand::thread_rng().gen_range(0..USER_AGENTS.len());
        USER_AGENTS[idx]
    }
}
