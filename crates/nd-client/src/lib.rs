//! HTTP client for the course server.
//!
//! Three endpoints are used:
//! - `GET /api/courses/names` for autocomplete
//! - `GET /api/courses/lookup?name=` for full course data
//! - `POST /api/autoschedule` for optimizer plans
//!
//! Name and course lookups degrade to empty results when the server cannot be
//! reached. The optimizer call reports exactly how it failed.

use std::fmt;
use std::time::Duration;

use nd_core::course::Course;
use nd_core::optimizer::{AutoscheduleOutcome, AutoscheduleRequest, AutoscheduleResponse};
use thiserror::Error;

/// Default request timeout for API calls.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
const NAMES_PATH: &str = "/api/courses/names";
const LOOKUP_PATH: &str = "/api/courses/lookup";
const AUTOSCHEDULE_PATH: &str = "/api/autoschedule";

/// Course server client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// The configured base URL is unusable.
    #[error("invalid server URL: {reason}")]
    InvalidBaseUrl { reason: &'static str },
    /// Failed to build HTTP client.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
    /// HTTP request failed.
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    /// Server returned a non-success status.
    #[error("server returned status {status}")]
    Status { status: u16 },
    /// Failed to parse response.
    #[error("invalid response: {0}")]
    InvalidResponse(#[from] serde_json::Error),
}

/// Course server client.
///
/// # Thread Safety
///
/// The client is safe to clone and share across threads. Each clone shares
/// the underlying HTTP connection pool.
#[derive(Clone)]
pub struct Client {
    http: reqwest::Client,
    base_url: String,
}

impl fmt::Debug for Client {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Client")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl Client {
    /// Creates a client for the server at `base_url`.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is blank or not http(s), or if the HTTP
    /// client fails to build.
    pub fn new(base_url: impl Into<String>) -> Result<Self, ClientError> {
        let base_url = base_url.into().trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            return Err(ClientError::InvalidBaseUrl {
                reason: "server URL cannot be empty",
            });
        }
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(ClientError::InvalidBaseUrl {
                reason: "server URL must start with http:// or https://",
            });
        }

        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .build()
            .map_err(ClientError::ClientBuild)?;

        Ok(Self { http, base_url })
    }

    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    /// All course names the server knows.
    pub async fn try_names(&self) -> Result<Vec<String>, ClientError> {
        let body = self.get_text(&self.endpoint(NAMES_PATH), &[]).await?;
        parse_names(&body)
    }

    /// All course names, or an empty list when the server is unavailable.
    pub async fn names(&self) -> Vec<String> {
        match self.try_names().await {
            Ok(names) => names,
            Err(err) => {
                tracing::warn!(error = %err, "course name lookup failed");
                Vec::new()
            }
        }
    }

    /// The course matching `name`, if the server has one.
    pub async fn try_lookup(&self, name: &str) -> Result<Option<Course>, ClientError> {
        let body = self
            .get_text(&self.endpoint(LOOKUP_PATH), &[("name", name)])
            .await?;
        parse_lookup(&body)
    }

    /// The course matching `name`, or `None` when not found or unreachable.
    pub async fn lookup(&self, name: &str) -> Option<Course> {
        match self.try_lookup(name).await {
            Ok(course) => course,
            Err(err) => {
                tracing::warn!(error = %err, name, "course lookup failed");
                None
            }
        }
    }

    /// Asks the optimizer for plans. Never retries.
    pub async fn autoschedule(&self, request: &AutoscheduleRequest) -> AutoscheduleOutcome {
        let response = match self
            .http
            .post(self.endpoint(AUTOSCHEDULE_PATH))
            .json(request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) => return AutoscheduleOutcome::TransportFailure(err.to_string()),
        };

        let status = response.status().as_u16();
        match response.text().await {
            Ok(body) => interpret_autoschedule(status, &body),
            Err(err) => AutoscheduleOutcome::TransportFailure(err.to_string()),
        }
    }

    async fn get_text(&self, url: &str, query: &[(&str, &str)]) -> Result<String, ClientError> {
        let response = self.http.get(url).query(query).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
            });
        }
        Ok(response.text().await?)
    }
}

fn parse_names(body: &str) -> Result<Vec<String>, ClientError> {
    Ok(serde_json::from_str(body)?)
}

/// The lookup endpoint answers with a list holding zero or one course.
fn parse_lookup(body: &str) -> Result<Option<Course>, ClientError> {
    let courses: Vec<Course> = serde_json::from_str(body)?;
    Ok(courses.into_iter().next().map(|mut course| {
        course.ensure_type_index();
        course
    }))
}

fn interpret_autoschedule(status: u16, body: &str) -> AutoscheduleOutcome {
    if !(200..300).contains(&status) {
        return AutoscheduleOutcome::Rejected { status };
    }
    match serde_json::from_str::<AutoscheduleResponse>(body) {
        Ok(response) => response.into_outcome(),
        Err(err) => AutoscheduleOutcome::TransportFailure(format!("unreadable response: {err}")),
    }
}
