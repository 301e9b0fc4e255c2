//! HTTP client construction and error classification
//!
//! Mirrors the request discipline the archives tolerate well: an honest
//! identifying user agent, conservative timeouts, and compressed transfer.
//! Failures are classified into the error kinds the backoff policy and the
//! run summary operate on.

use crate::config::UserAgentConfig;
use crate::model::{FetchTask, TaskKind};
use reqwest::{Client, StatusCode};
use std::borrow::Cow;
use std::time::Duration;

/// Classified fetch failure kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchErrorKind {
    /// Timeout, connection reset, 408/429, or 5xx; worth retrying
    TransientNetwork,

    /// 401/403; the host refuses this client, retrying cannot help
    PermanentDenied,

    /// 404/410; the resource does not exist
    PermanentNotFound,

    /// Any other non-success response or unreadable body
    PermanentOther,

    /// The run's cancellation signal fired before the task finished
    Cancelled,
}

impl FetchErrorKind {
    /// Returns true if the failure may succeed on retry
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::TransientNetwork)
    }

    /// Stable label used in the run summary
    pub fn label(&self) -> &'static str {
        match self {
            Self::TransientNetwork => "transient-network",
            Self::PermanentDenied => "permanent-denied",
            Self::PermanentNotFound => "permanent-not-found",
            Self::PermanentOther => "permanent-other",
            Self::Cancelled => "cancelled",
        }
    }
}

/// A terminally failed fetch
#[derive(Debug, Clone)]
pub struct FetchFailure {
    pub kind: FetchErrorKind,
    pub message: String,
}

impl FetchFailure {
    pub fn new(kind: FetchErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }
}

/// A successfully fetched resource
#[derive(Debug, Clone)]
pub struct FetchedPage {
    /// URL after redirects
    pub final_url: String,

    /// HTTP status code
    pub status: u16,

    /// Content-Type header value, may be empty
    pub content_type: String,

    /// Response body; empty for HEAD probes
    pub bytes: Vec<u8>,
}

impl FetchedPage {
    /// Body as text, lossy on invalid UTF-8
    pub fn text(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.bytes)
    }
}

/// Builds the shared HTTP client with proper identification
///
/// User agent format: `CrawlerName/Version (+ContactURL; ContactEmail)`
pub fn build_http_client(config: &UserAgentConfig) -> Result<Client, reqwest::Error> {
    let user_agent = format!(
        "{}/{} (+{}; {})",
        config.crawler_name, config.crawler_version, config.contact_url, config.contact_email
    );

    Client::builder()
        .user_agent(user_agent)
        .timeout(Duration::from_secs(30))
        .connect_timeout(Duration::from_secs(10))
        .redirect(reqwest::redirect::Policy::limited(10))
        .gzip(true)
        .brotli(true)
        .build()
}

/// Classifies a non-success HTTP status
pub fn classify_status(status: StatusCode) -> FetchErrorKind {
    match status.as_u16() {
        401 | 403 => FetchErrorKind::PermanentDenied,
        404 | 410 => FetchErrorKind::PermanentNotFound,
        408 | 429 => FetchErrorKind::TransientNetwork,
        s if s >= 500 => FetchErrorKind::TransientNetwork,
        _ => FetchErrorKind::PermanentOther,
    }
}

/// Performs one request for a task, without retry
///
/// Probes use HEAD; everything else uses GET. Retry is the scheduler's job.
pub async fn perform(client: &Client, task: &FetchTask) -> Result<FetchedPage, FetchFailure> {
    let request = match task.kind {
        TaskKind::Probe => client.head(task.url.as_str()),
        _ => client.get(task.url.as_str()),
    };

    let response = request.send().await.map_err(classify_reqwest_error)?;

    let status = response.status();
    if !status.is_success() {
        return Err(FetchFailure::new(
            classify_status(status),
            format!("HTTP {} for {}", status.as_u16(), task.url),
        ));
    }

    let final_url = response.url().to_string();
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_string();

    let bytes = if task.kind == TaskKind::Probe {
        Vec::new()
    } else {
        response
            .bytes()
            .await
            .map_err(classify_reqwest_error)?
            .to_vec()
    };

    Ok(FetchedPage {
        final_url,
        status: status.as_u16(),
        content_type,
        bytes,
    })
}

fn classify_reqwest_error(error: reqwest::Error) -> FetchFailure {
    let kind = if error.is_timeout() || error.is_connect() {
        FetchErrorKind::TransientNetwork
    } else {
        FetchErrorKind::PermanentOther
    };
    FetchFailure::new(kind, error.to_string())
}
