pub mod dto;

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::AppError;
use crate::models::CourseListing;

pub use dto::{Roster, Subject};

pub const DEFAULT_ROSTER_API_URL: &str = "https://classes.cornell.edu/api/2.0";

#[derive(Clone, Debug)]
pub struct RosterConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
}

impl Default for RosterConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_ROSTER_API_URL.to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 3,
            retry_base_delay: Duration::from_millis(500),
        }
    }
}

/// Remote source of truth for terms, subjects and courses.
#[async_trait]
pub trait RosterClient: Send + Sync {
    /// Returns `None` when the remote source has no such term.
    async fn get_roster(&self, term: &str) -> Result<Option<Roster>, AppError>;

    async fn get_subjects(&self, term: &str) -> Result<Vec<Subject>, AppError>;

    async fn get_courses(&self, term: &str, subject: &str) -> Result<Vec<CourseListing>, AppError>;
}

pub struct RosterHttpClient {
    client: Client,
    config: RosterConfig,
}

enum RequestFailure {
    Retryable(AppError),
    Fatal(AppError),
}

impl RosterHttpClient {
    pub fn new(config: RosterConfig) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!("chequerd/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| AppError::Remote(format!("Failed to build http client: {}", e)))?;
        Ok(Self { client, config })
    }

    fn endpoint(&self, path: &str, params: &[(&str, &str)]) -> Result<Url, AppError> {
        let base = self.config.base_url.trim_end_matches('/');
        let url = format!("{}/{}", base, path);
        let parsed = if params.is_empty() {
            Url::parse(&url)
        } else {
            Url::parse_with_params(&url, params)
        };
        parsed.map_err(|e| AppError::Remote(format!("Invalid roster url: {}", e)))
    }

    async fn get_json<T: DeserializeOwned>(&self, url: Url) -> Result<T, AppError> {
        with_retries(&self.config, url.as_str(), || self.try_get_json(&url)).await
    }

    async fn try_get_json<T: DeserializeOwned>(&self, url: &Url) -> Result<T, RequestFailure> {
        debug!(%url, "GET");

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| RequestFailure::Retryable(e.into()))?;

        let status = response.status();
        if is_retryable(status) {
            return Err(RequestFailure::Retryable(AppError::Remote(format!(
                "{} returned {}",
                url, status
            ))));
        }

        let body: dto::ApiResponse<T> = response.json().await.map_err(|e| {
            RequestFailure::Fatal(AppError::Remote(format!(
                "Failed to parse roster response ({}): {}",
                status, e
            )))
        })?;

        body.into_data().map_err(RequestFailure::Fatal)
    }
}

/// Server errors and rate limiting are worth another attempt.
fn is_retryable(status: StatusCode) -> bool {
    status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS
}

/// Runs `attempt` until it succeeds, fails fatally, or has been retried
/// `max_retries` times, doubling the delay after each retryable failure.
async fn with_retries<T, F, Fut>(
    config: &RosterConfig,
    url: &str,
    mut attempt: F,
) -> Result<T, AppError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RequestFailure>>,
{
    let mut retries = 0;
    loop {
        match attempt().await {
            Ok(data) => return Ok(data),
            Err(RequestFailure::Retryable(e)) if retries < config.max_retries => {
                let delay = config.retry_base_delay * 2u32.saturating_pow(retries);
                warn!(
                    %url,
                    attempt = retries + 1,
                    "Roster request failed, retrying in {:?}: {}",
                    delay,
                    e
                );
                tokio::time::sleep(delay).await;
                retries += 1;
            }
            Err(RequestFailure::Retryable(e)) | Err(RequestFailure::Fatal(e)) => return Err(e),
        }
    }
}

#[async_trait]
impl RosterClient for RosterHttpClient {
    async fn get_roster(&self, term: &str) -> Result<Option<Roster>, AppError> {
        let url = self.endpoint("config/rosters.json", &[])?;
        let data: dto::RostersData = self.get_json(url).await?;

        Ok(data
            .rosters
            .into_iter()
            .find(|r| r.slug.eq_ignore_ascii_case(term)))
    }

    async fn get_subjects(&self, term: &str) -> Result<Vec<Subject>, AppError> {
        let url = self.endpoint("config/subjects.json", &[("roster", term)])?;
        let data: dto::SubjectsData = self.get_json(url).await?;
        Ok(data.subjects)
    }

    async fn get_courses(&self, term: &str, subject: &str) -> Result<Vec<CourseListing>, AppError> {
        let url = self.endpoint("search/classes.json", &[("roster", term), ("subject", subject)])?;
        let data: dto::ClassesData = self.get_json(url).await?;

        data.classes
            .into_iter()
            .map(CourseListing::try_from)
            .collect()
    }
}

/// Knows no terms. Used when no roster source is configured.
pub struct NoopRosterClient;

#[async_trait]
impl RosterClient for NoopRosterClient {
    async fn get_roster(&self, _term: &str) -> Result<Option<Roster>, AppError> {
        Ok(None)
    }

    async fn get_subjects(&self, _term: &str) -> Result<Vec<Subject>, AppError> {
        Ok(Vec::new())
    }

    async fn get_courses(
        &self,
        _term: &str,
        _subject: &str,
    ) -> Result<Vec<CourseListing>, AppError> {
        Ok(Vec::new())
    }
}
