//! HTTP readiness and content checks against routed endpoints.
//!
//! Routes are name-based, so checks target the router's IP with an
//! explicit `Host` header. Connection-level failures mean the endpoint is
//! not up yet and are retried; a response the client cannot decode is a
//! hard failure.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::HOST;
use reqwest::{Client, StatusCode};
use thiserror::Error;
use tracing::debug;

use crate::probe::{Outcome, Probe};

/// Errors from HTTP checks.
#[derive(Debug, Error)]
pub enum HttpError {
    /// The shared client could not be constructed.
    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),

    /// The request failed at the transport or protocol level.
    #[error("GET {url} failed: {source}")]
    Request {
        /// The URL that was fetched.
        url: String,
        /// The underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The endpoint rejected the supplied credentials.
    #[error("GET {url} was denied ({status})")]
    Denied {
        /// The URL that was fetched.
        url: String,
        /// The 401/403 status returned.
        status: StatusCode,
    },

    /// A response carried an unexpected status where one specific status
    /// was required.
    #[error("GET {url} returned {status}, expected {expected} (attempt {attempt} of {count})")]
    UnexpectedStatus {
        /// The URL that was fetched.
        url: String,
        /// The status observed.
        status: StatusCode,
        /// The status required.
        expected: StatusCode,
        /// Which attempt in the repeated check failed (1-based).
        attempt: usize,
        /// Total attempts requested.
        count: usize,
    },
}

/// Checker for plain HTTP GETs.
#[derive(Debug, Clone)]
pub struct HttpCheck {
    client: Client,
}

impl HttpCheck {
    /// Build a checker with short connect/read budgets; the poller owns
    /// the overall wait, not the client.
    pub fn new() -> Result<Self, HttpError> {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(5))
            .timeout(Duration::from_secs(15))
            .danger_accept_invalid_certs(true)
            .build()
            .map_err(HttpError::Client)?;
        Ok(Self { client })
    }

    async fn get(
        &self,
        url: &str,
        host: Option<&str>,
    ) -> Result<(StatusCode, String), reqwest::Error> {
        let mut request = self.client.get(url);
        if let Some(host) = host {
            request = request.header(HOST, host);
        }
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        Ok((status, body))
    }

    /// Probe satisfied when `url` answers `expected` and, if given, the
    /// body contains `body_substring`.
    pub fn response_probe(
        &self,
        url: impl Into<String>,
        host: Option<&str>,
        expected: StatusCode,
        body_substring: Option<&str>,
    ) -> ResponseProbe {
        ResponseProbe {
            check: self.clone(),
            url: url.into(),
            host: host.map(str::to_string),
            expected,
            body_substring: body_substring.map(str::to_string),
        }
    }

    /// Issue `count` sequential GETs and require every response to carry
    /// `expected`. Used once an endpoint has already converged, to assert
    /// the steady state holds across repeated requests.
    pub async fn expect_status_repeated(
        &self,
        url: &str,
        host: Option<&str>,
        expected: StatusCode,
        count: usize,
    ) -> Result<(), HttpError> {
        for attempt in 1..=count {
            let (status, _) = self
                .get(url, host)
                .await
                .map_err(|source| HttpError::Request {
                    url: url.to_string(),
                    source,
                })?;
            if status != expected {
                return Err(HttpError::UnexpectedStatus {
                    url: url.to_string(),
                    status,
                    expected,
                    attempt,
                    count,
                });
            }
        }
        Ok(())
    }

    /// Fetch the delimited stats report guarded by basic auth, returning
    /// the raw text for [`crate::stats::parse_stats`]. Rejected
    /// credentials are a hard error, not an eventual condition.
    pub async fn fetch_stats(
        &self,
        url: &str,
        host: Option<&str>,
        user: &str,
        password: &str,
    ) -> Result<String, HttpError> {
        let mut request = self.client.get(url).basic_auth(user, Some(password));
        if let Some(host) = host {
            request = request.header(HOST, host);
        }
        let response = request
            .send()
            .await
            .map_err(|source| HttpError::Request {
                url: url.to_string(),
                source,
            })?;
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            return Err(HttpError::Denied {
                url: url.to_string(),
                status,
            });
        }
        response.text().await.map_err(|source| HttpError::Request {
            url: url.to_string(),
            source,
        })
    }
}

/// Probe over a GET's status and body.
pub struct ResponseProbe {
    check: HttpCheck,
    url: String,
    host: Option<String>,
    expected: StatusCode,
    body_substring: Option<String>,
}

#[async_trait]
impl Probe for ResponseProbe {
    async fn evaluate(&self) -> Outcome {
        match self.check.get(&self.url, self.host.as_deref()).await {
            Ok((status, body)) => {
                if status != self.expected {
                    return Outcome::pending(format!(
                        "{} returned {status}, waiting for {}",
                        self.url, self.expected
                    ));
                }
                match &self.body_substring {
                    Some(needle) if !body.contains(needle.as_str()) => Outcome::pending(format!(
                        "{} answered {status} but body lacks {needle:?}",
                        self.url
                    )),
                    _ => Outcome::Satisfied,
                }
            }
            Err(error) if error.is_connect() || error.is_timeout() => {
                debug!(url = %self.url, error = %error, "endpoint not reachable yet");
                Outcome::pending(format!("{} not reachable yet: {error}", self.url))
            }
            Err(error) if error.is_decode() => {
                Outcome::failed(format!("{} returned an undecodable response: {error}", self.url))
            }
            Err(error) => Outcome::failed(format!("GET {} failed: {error}", self.url)),
        }
    }
}
