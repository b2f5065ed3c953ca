use std::sync::Arc;
use std::time::Duration;

use engine_logging::engine_debug;
use futures_util::StreamExt;
use harvester_core::{is_block_status, BlockSignal, DetailOutcome, Locator, SearchOutcome};
use reqwest::header::CONTENT_TYPE;
use reqwest::StatusCode;

use crate::collab::{CollaboratorError, DetailFetcher, Searcher};
use crate::decode::decode_body;
use crate::parse::RecordParser;

#[derive(Debug, Clone)]
pub struct HttpSettings {
    /// Search URL; `{label}` is replaced by the percent-encoded work item.
    pub search_url: String,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub redirect_limit: usize,
    pub max_bytes: u64,
    pub allowed_content_types: Vec<String>,
    /// Body text that marks a page served in place of the record while blocked.
    pub block_marker: Option<String>,
    pub user_agent: String,
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            search_url: String::new(),
            connect_timeout: Duration::from_secs(10),
            request_timeout: Duration::from_secs(30),
            redirect_limit: 5,
            max_bytes: 5 * 1024 * 1024,
            allowed_content_types: vec![
                "application/json".to_string(),
                "text/html".to_string(),
                "application/xhtml+xml".to_string(),
                "text/plain".to_string(),
            ],
            block_marker: None,
            user_agent: concat!("harvester/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

/// Resolves work items over HTTP: the search URL answers with (or redirects
/// to) the detail page, whose body goes through a [`RecordParser`].
pub struct HttpResolver {
    client: reqwest::Client,
    settings: HttpSettings,
    parser: Arc<dyn RecordParser>,
}

impl HttpResolver {
    pub fn new(
        settings: HttpSettings,
        parser: Arc<dyn RecordParser>,
    ) -> Result<Self, reqwest::Error> {
        let redirect_limit = settings.redirect_limit;
        let policy = reqwest::redirect::Policy::custom(move |attempt| {
            if attempt.previous().len() >= redirect_limit {
                attempt.error("redirect limit exceeded")
            } else {
                attempt.follow()
            }
        });
        let client = reqwest::Client::builder()
            .connect_timeout(settings.connect_timeout)
            .timeout(settings.request_timeout)
            .redirect(policy)
            .user_agent(settings.user_agent.clone())
            .build()?;
        Ok(Self {
            client,
            settings,
            parser,
        })
    }

    pub fn search_url_for(&self, label: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(label.as_bytes()).collect();
        self.settings.search_url.replace("{label}", &encoded)
    }

    fn is_content_type_allowed(&self, content_type: &str) -> bool {
        let ct = content_type.split(';').next().unwrap_or(content_type).trim();
        self.settings
            .allowed_content_types
            .iter()
            .any(|allowed| allowed.eq_ignore_ascii_case(ct))
    }

    async fn read_body(&self, response: reqwest::Response) -> Result<Vec<u8>, BodyError> {
        if let Some(len) = response.content_length() {
            if len > self.settings.max_bytes {
                return Err(BodyError::TooLarge(len));
            }
        }
        let mut bytes = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.map_err(|err| BodyError::Transport(map_reqwest_error(err)))?;
            let next_len = bytes.len() as u64 + chunk.len() as u64;
            if next_len > self.settings.max_bytes {
                return Err(BodyError::TooLarge(next_len));
            }
            bytes.extend_from_slice(&chunk);
        }
        Ok(bytes)
    }

    fn is_block_page(&self, text: &str) -> bool {
        self.settings
            .block_marker
            .as_deref()
            .is_some_and(|marker| !marker.is_empty() && text.contains(marker))
    }
}

enum BodyError {
    TooLarge(u64),
    Transport(CollaboratorError),
}

#[async_trait::async_trait]
impl Searcher for HttpResolver {
    async fn search(
        &self,
        label: &str,
        delay: Duration,
    ) -> Result<SearchOutcome, CollaboratorError> {
        pause(delay).await;
        let url = self.search_url_for(label);
        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        engine_debug!("search {:?} -> {} ({})", label, status.as_u16(), response.url());
        if status == StatusCode::NOT_FOUND {
            return Ok(SearchOutcome::NotFound);
        }
        if is_block_status(status.as_u16()) {
            return Ok(SearchOutcome::Blocked(BlockSignal::Status(status.as_u16())));
        }
        if !status.is_success() {
            return Ok(SearchOutcome::Error(format!("search returned {status}")));
        }
        Ok(SearchOutcome::Found(Locator::new(response.url().as_str())))
    }
}

#[async_trait::async_trait]
impl DetailFetcher for HttpResolver {
    async fn fetch_detail(
        &self,
        locator: &Locator,
        delay: Duration,
    ) -> Result<DetailOutcome, CollaboratorError> {
        pause(delay).await;
        let response = self
            .client
            .get(locator.as_str())
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if is_block_status(status.as_u16()) {
            return Ok(DetailOutcome::Blocked(BlockSignal::Status(status.as_u16())));
        }
        if !status.is_success() {
            return Ok(DetailOutcome::Error {
                message: format!("detail returned {status}"),
                status: Some(status.as_u16()),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .map(ToOwned::to_owned);
        if let Some(ct) = content_type.as_deref() {
            if !self.is_content_type_allowed(ct) {
                return Ok(error(format!("unsupported content type {ct}")));
            }
        }

        let bytes = match self.read_body(response).await {
            Ok(bytes) => bytes,
            Err(BodyError::TooLarge(len)) => {
                return Ok(error(format!(
                    "response too large ({len} > {} bytes)",
                    self.settings.max_bytes
                )))
            }
            Err(BodyError::Transport(err)) => return Err(err),
        };
        let decoded = match decode_body(&bytes, content_type.as_deref()) {
            Ok(decoded) => decoded,
            Err(err) => return Ok(error(err.to_string())),
        };
        if self.is_block_page(&decoded.text) {
            return Ok(DetailOutcome::Blocked(BlockSignal::Marker));
        }

        match self.parser.parse(locator, &decoded.text) {
            Ok(record) => Ok(DetailOutcome::Record(record)),
            Err(err) => Ok(error(err.to_string())),
        }
    }
}

async fn pause(delay: Duration) {
    if !delay.is_zero() {
        tokio::time::sleep(delay).await;
    }
}

fn error(message: String) -> DetailOutcome {
    DetailOutcome::Error {
        message,
        status: None,
    }
}

fn map_reqwest_error(err: reqwest::Error) -> CollaboratorError {
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        return CollaboratorError::Network(err.to_string());
    }
    CollaboratorError::Other(err.to_string())
}
